//! Compiler from the annotated syntax tree of a script to an [`Artifact`](crate::vm::Artifact)

mod body;
pub mod cache;
mod errors;
mod inspector;
pub mod ir;
mod script;
mod settings;
pub mod variables;

pub use body::{
    BlockSource, BodyCompiler, LoopLabels, Operand, RoutineSpec, ScopingKind, Transfer,
};
pub use errors::*;
pub use inspector::*;
pub use script::*;
pub use settings::*;
