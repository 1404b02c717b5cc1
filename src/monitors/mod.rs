//! Detection logic, free of scheduling concerns
//!
//! - [`trend`]: pure classification of a sample window
//! - [`release`]: forge lookup of the last tag build

pub mod release;
pub mod trend;
