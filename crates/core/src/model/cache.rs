use crate::model::ModelLoadError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Loaded,
    LoadFailed,
}

impl ModelState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Loading,
            2 => Self::Loaded,
            3 => Self::LoadFailed,
            _ => Self::Unloaded,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unloaded => 0,
            Self::Loading => 1,
            Self::Loaded => 2,
            Self::LoadFailed => 3,
        }
    }
}

enum Slot<M> {
    Unloaded,
    Loaded(Arc<M>),
    Failed(ModelLoadError),
}

/// Poison-tolerant, exactly-once slot for the loaded model.
///
/// The first caller runs the loader while holding the lock; concurrent
/// callers wait for it and then share the outcome. Both outcomes are final:
/// a loaded model is handed out for the rest of the process, and a failed
/// load keeps returning the same error.
///
/// The observable [`ModelState`] is kept beside the slot and only written
/// while the lock is held, so readers never block and a final state is never
/// reported as anything else.
pub struct ModelCache<M> {
    slot: Mutex<Slot<M>>,
    state: AtomicU8,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Unloaded),
            state: AtomicU8::new(ModelState::Unloaded.as_u8()),
        }
    }

    pub fn get_or_try_load(
        &self,
        init: impl FnOnce() -> Result<M, ModelLoadError>,
    ) -> Result<Arc<M>, ModelLoadError> {
        let mut guard = match self.slot.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("model cache lock was poisoned; recovering and continuing");
                poisoned.into_inner()
            }
        };

        match &*guard {
            Slot::Loaded(model) => return Ok(Arc::clone(model)),
            Slot::Failed(e) => return Err(e.clone()),
            Slot::Unloaded => {}
        }

        // NOTE: `init` runs at most once per cache; the lock is held until the slot is final.
        self.set_state(ModelState::Loading);
        match init() {
            Ok(model) => {
                let model = Arc::new(model);
                *guard = Slot::Loaded(Arc::clone(&model));
                self.set_state(ModelState::Loaded);
                Ok(model)
            }
            Err(e) => {
                *guard = Slot::Failed(e.clone());
                self.set_state(ModelState::LoadFailed);
                Err(e)
            }
        }
    }

    pub fn state(&self) -> ModelState {
        ModelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ModelState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}
