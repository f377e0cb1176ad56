//! Domain models for concept mapping.

mod concept;
mod mapping;

pub use concept::*;
pub use mapping::*;
