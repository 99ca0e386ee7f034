//! Target format for generated code
//!
//! Artifacts are made of routines running on a stack machine with numbered local slots, fields
//! on the artifact instance, and an exception table per routine. Runtime services are reached
//! through [`crate::abi::RuntimeHelper`] calls.

mod access_flags;
pub mod code;
mod descriptors;
mod errors;
pub mod model;
mod names;

pub use access_flags::*;
pub use code::*;
pub use descriptors::*;
pub use errors::*;
pub use model::*;
pub use names::*;
