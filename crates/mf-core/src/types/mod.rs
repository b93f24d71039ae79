//! Core data types flowing through the pipeline.

pub mod key;
pub mod market_data;

pub use key::*;
pub use market_data::*;
