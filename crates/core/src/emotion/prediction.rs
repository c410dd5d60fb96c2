use crate::emotion::{Emotion, EMOTION_COUNT};
use serde::ser::{Serialize, SerializeMap, Serializer};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvalidScores {
    #[error("expected {expected} scores, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("score for {label} is not a probability: {value}")]
    NotAProbability { label: Emotion, value: f32 },
}

/// Probability distribution over [`Emotion::ALL`], indexed by position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    probabilities: [f32; EMOTION_COUNT],
}

impl Prediction {
    pub fn from_scores(scores: &[f32]) -> Result<Self, InvalidScores> {
        let probabilities: [f32; EMOTION_COUNT] =
            scores.try_into().map_err(|_| InvalidScores::WrongLength {
                expected: EMOTION_COUNT,
                actual: scores.len(),
            })?;

        for (label, &value) in Emotion::ALL.iter().zip(probabilities.iter()) {
            if !value.is_finite() || value < 0.0 {
                return Err(InvalidScores::NotAProbability {
                    label: *label,
                    value,
                });
            }
        }

        Ok(Self { probabilities })
    }

    pub fn probabilities(&self) -> &[f32; EMOTION_COUNT] {
        &self.probabilities
    }

    pub fn probability(&self, emotion: Emotion) -> f32 {
        self.probabilities[emotion.index()]
    }

    /// Arg-max label; the first label wins on ties.
    pub fn top(&self) -> Emotion {
        let mut best = 0;
        for (i, &p) in self.probabilities.iter().enumerate().skip(1) {
            if p > self.probabilities[best] {
                best = i;
            }
        }
        Emotion::ALL[best]
    }

    pub fn top_probability(&self) -> f32 {
        self.probability(self.top())
    }

    /// Label/probability pairs, always in [`Emotion::ALL`] order.
    pub fn distribution(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        Emotion::ALL
            .iter()
            .copied()
            .zip(self.probabilities.iter().copied())
    }

    pub fn total(&self) -> f32 {
        self.probabilities.iter().sum()
    }
}

// Serialized as a map so JSON consumers see labels in table order.
impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(EMOTION_COUNT))?;
        for (emotion, p) in self.distribution() {
            map.serialize_entry(emotion.as_str(), &p)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCORES: [f32; 8] = [0.05, 0.05, 0.1, 0.05, 0.6, 0.05, 0.05, 0.05];

    #[test]
    fn top_label_is_argmax() {
        let p = Prediction::from_scores(&SCORES).expect("valid scores");
        assert_eq!(p.top(), Emotion::Angry);
        assert!((p.top_probability() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn ties_resolve_to_first_label() {
        let p = Prediction::from_scores(&[0.125; 8]).expect("valid scores");
        assert_eq!(p.top(), Emotion::Neutral);
    }

    #[test]
    fn distribution_keeps_label_order_regardless_of_winner() {
        let mut scores = [0.0f32; 8];
        scores[7] = 1.0;
        let p = Prediction::from_scores(&scores).expect("valid scores");
        let labels: Vec<Emotion> = p.distribution().map(|(e, _)| e).collect();
        assert_eq!(labels, Emotion::ALL.to_vec());
        assert_eq!(p.top(), Emotion::Surprised);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Prediction::from_scores(&[0.5, 0.5]).unwrap_err();
        assert_eq!(
            err,
            InvalidScores::WrongLength {
                expected: 8,
                actual: 2
            }
        );
    }

    #[test]
    fn rejects_negative_and_nan() {
        let mut scores = SCORES;
        scores[3] = -0.1;
        assert!(matches!(
            Prediction::from_scores(&scores),
            Err(InvalidScores::NotAProbability {
                label: Emotion::Sad,
                ..
            })
        ));

        scores[3] = f32::NAN;
        assert!(Prediction::from_scores(&scores).is_err());
    }

    #[test]
    fn json_object_lists_labels_in_order() {
        let p = Prediction::from_scores(&SCORES).expect("valid scores");
        let json = serde_json::to_string(&p).expect("serializable");
        let positions: Vec<usize> = Emotion::ALL
            .iter()
            .map(|e| json.find(&format!("\"{}\"", e.as_str())).expect("label present"))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }
}
