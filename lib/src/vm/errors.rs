use super::{Frame, MemberName, Signature, SynLabel};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    MethodCodeNotFinished {
        pending_block: Option<SynLabel>,
        unplaced_labels: Vec<SynLabel>,
    },

    /// Two blocks claim to have the same label (indicates a bug)
    DuplicateLabel(SynLabel),

    /// A label is reached with two different stack depths
    IncompatibleFrames(SynLabel, Frame, Frame),

    /// An instruction needs more stack values than are available
    StackUnderflow { instruction: String, depth: usize },

    /// Return instruction doesn't match the return type of the routine
    InvalidReturn {
        instruction: String,
        signature: Signature,
    },

    /// A try region refers to a marker that was never placed
    UnplacedMarker(SynLabel),

    /// Routine has more operations than the format allows
    RoutineTooLarge(usize),

    /// Two members of an artifact share a name
    DuplicateMember(MemberName),

    MissingMember(MemberName),
    MalformedName(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MethodCodeNotFinished {
                pending_block,
                unplaced_labels,
            } => write!(
                f,
                "routine code not finished (pending block {:?}, unplaced labels {:?})",
                pending_block, unplaced_labels
            ),
            Error::DuplicateLabel(label) => write!(f, "label {:?} placed twice", label),
            Error::IncompatibleFrames(label, found, expected) => write!(
                f,
                "label {:?} reached with stack depth {} and {}",
                label, found.stack_depth, expected.stack_depth
            ),
            Error::StackUnderflow { instruction, depth } => {
                write!(f, "{} underflows a stack of depth {}", instruction, depth)
            }
            Error::InvalidReturn {
                instruction,
                signature,
            } => write!(f, "{} in a routine of signature {}", instruction, signature),
            Error::UnplacedMarker(label) => write!(f, "marker {:?} never placed", label),
            Error::RoutineTooLarge(size) => write!(f, "routine has {} operations", size),
            Error::DuplicateMember(name) => write!(f, "duplicate member {}", name),
            Error::MissingMember(name) => write!(f, "missing member {}", name),
            Error::MalformedName(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}
