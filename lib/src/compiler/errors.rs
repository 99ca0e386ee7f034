use crate::vm;
use std::fmt;

/// Source position attached to compile-time faults
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourcePosition {
    pub file: String,
    pub line: u32,
}

#[derive(Debug)]
pub enum Error {
    /// Failure building the generated code (indicates a bug in the compiler)
    BytecodeGen(vm::Error),

    /// A construct the compiler deliberately does not support
    NotCompilable {
        construct: String,
        position: Option<SourcePosition>,
    },

    /// A construct that needs its own routine appeared in a body whose variables live in
    /// routine-local slots (and so can't be shared with another routine)
    UnsupportedStorage {
        construct: String,
        position: Option<SourcePosition>,
    },

    MalformedName(String),
}

impl From<vm::Error> for Error {
    fn from(err: vm::Error) -> Error {
        Error::BytecodeGen(err)
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BytecodeGen(err) => write!(f, "code generation failed: {}", err),
            Error::NotCompilable {
                construct,
                position: Some(position),
            } => write!(f, "{}: not compilable: {}", position, construct),
            Error::NotCompilable {
                construct,
                position: None,
            } => write!(f, "not compilable: {}", construct),
            Error::UnsupportedStorage {
                construct,
                position,
            } => {
                if let Some(position) = position {
                    write!(f, "{}: ", position)?;
                }
                write!(
                    f,
                    "{} needs a separate routine but the enclosing body keeps its variables in local slots",
                    construct
                )
            }
            Error::MalformedName(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BytecodeGen(err) => Some(err),
            _ => None,
        }
    }
}
