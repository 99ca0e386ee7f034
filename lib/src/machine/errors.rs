use super::Value;
use std::fmt;

/// Host-level failure: the artifact or the generated code broke the calling convention
///
/// These never come from well-formed programs, so no handler in generated code can catch them.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    MissingRoutine(String),
    MissingField(String),
    MissingDescriptor(usize),

    /// A slot held something other than what the instruction or helper expects
    SlotMismatch {
        expected: &'static str,
        found: String,
    },
    StackUnderflow(String),

    /// Execution ran past the last operation of a routine
    FellOffEnd(String),
    MalformedStaticScope(String),
    UnknownCallType(i64),

    /// A helper needing the current frame or scope ran without one
    NoFrame,
    NoScope,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingRoutine(name) => write!(f, "no routine named {}", name),
            Error::MissingField(name) => write!(f, "no field named {}", name),
            Error::MissingDescriptor(idx) => write!(f, "no descriptor at index {}", idx),
            Error::SlotMismatch { expected, found } => {
                write!(f, "expected {} but found {}", expected, found)
            }
            Error::StackUnderflow(insn) => write!(f, "{} underflows the operand stack", insn),
            Error::FellOffEnd(routine) => write!(f, "execution fell off the end of {}", routine),
            Error::MalformedStaticScope(encoded) => {
                write!(f, "malformed static scope {:?}", encoded)
            }
            Error::UnknownCallType(value) => write!(f, "unknown call type {}", value),
            Error::NoFrame => f.write_str("no active frame"),
            Error::NoScope => f.write_str("no active scope"),
        }
    }
}

impl std::error::Error for Error {}

/// Why execution of a routine stopped before returning normally
///
/// Everything except `Fault` is a signal generated code may catch through its exception table.
#[derive(Clone, Debug)]
pub enum Unwind {
    /// A raised exception object
    Raise(Value),

    /// `break`, tagged with the block it breaks out of (`None` for loops)
    Break { tag: Option<usize>, value: Value },
    Next(Value),
    Redo,
    Retry,

    /// Non-local `return`, tagged with the frame it returns from
    Return { frame: usize, value: Value },
    Fault(Error),
}

impl Unwind {
    /// Value carried by the signal, if any
    pub fn value(&self) -> Option<&Value> {
        match self {
            Unwind::Raise(value)
            | Unwind::Break { value, .. }
            | Unwind::Next(value)
            | Unwind::Return { value, .. } => Some(value),
            Unwind::Redo | Unwind::Retry | Unwind::Fault(_) => None,
        }
    }

    /// The raised exception, if this is a raise
    pub fn exception(&self) -> Option<&Value> {
        match self {
            Unwind::Raise(exception) => Some(exception),
            _ => None,
        }
    }
}

impl From<Error> for Unwind {
    fn from(err: Error) -> Unwind {
        Unwind::Fault(err)
    }
}

impl fmt::Display for Unwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unwind::Raise(exception) => write!(f, "raised {:?}", exception),
            Unwind::Break { .. } => f.write_str("break from proc-closure"),
            Unwind::Next(_) => f.write_str("next outside of a block or loop"),
            Unwind::Redo => f.write_str("redo outside of a block or loop"),
            Unwind::Retry => f.write_str("retry outside of rescue clause"),
            Unwind::Return { .. } => f.write_str("unexpected return"),
            Unwind::Fault(err) => write!(f, "machine fault: {}", err),
        }
    }
}
