mod artifact;
mod field;
mod routine;

pub use artifact::*;
pub use field::*;
pub use routine::*;
