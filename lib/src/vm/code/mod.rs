mod code;
mod code_builder;
mod code_builder_exts;
mod instructions;
mod label;

pub use code::*;
pub use code_builder::*;
pub use code_builder_exts::*;
pub use instructions::*;
pub use label::*;
