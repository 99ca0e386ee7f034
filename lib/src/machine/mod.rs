//! Reference runtime executing compiled artifacts
//!
//! The machine interprets the routines of an [`Artifact`](crate::vm::Artifact) and implements
//! every [`RuntimeHelper`](crate::abi::RuntimeHelper) generated code calls: method dispatch with
//! per-site caches, blocks and procs, scopes, constants with their switch points, and a small
//! core class library. Non-local control flow travels as [`Unwind`] signals that exception
//! tables in generated code catch by [`CatchType`](crate::abi::CatchType).

mod builtins;
mod dispatch;
mod errors;
mod frame;
mod helpers;
mod instance;
mod interpreter;
mod module;
mod runtime;
mod value;

pub use errors::*;
pub use frame::*;
pub use instance::{Instance, Slot};
pub use module::*;
pub use runtime::{CoreClasses, Runtime};
pub use value::*;
