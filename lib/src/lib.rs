pub mod abi;
pub mod compiler;
pub mod machine;
pub mod vm;
