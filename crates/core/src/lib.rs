#![deny(warnings)]

pub mod config;
pub mod decode;
pub mod emotion;
pub mod features;
pub mod model;
pub mod pipeline;
