//! Calling convention shared between generated code and the runtime
//!
//! Every routine generated for a body takes `(this, context, self, args.., block)`: the artifact
//! instance, the thread context, the receiver, either the required arguments one per slot
//! (specific arity) or one host array of arguments (boxed), and the block. Fixed local slots
//! follow the parameters, then named locals and temporaries.

mod bootstrap;
mod descriptor;
mod helpers;

pub use bootstrap::*;
pub use descriptor::*;
pub use helpers::*;

use crate::vm::{Signature, SlotType};

/// Slot of the artifact instance
pub const THIS: u16 = 0;

/// Slot of the thread context
pub const CONTEXT: u16 = 1;

/// Slot of `self`
pub const SELF: u16 = 2;

/// First argument slot
pub const ARGS: u16 = 3;

/// Largest required-argument count that gets a specific-arity routine
pub const MAX_SPECIFIC_ARITY: usize = 3;

/// Layout of the fixed local slots of a body routine, which depends on how many slots the
/// arguments take
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SlotLayout {
    arg_params: u16,
}

impl SlotLayout {
    pub const fn new(arg_params: u16) -> SlotLayout {
        SlotLayout { arg_params }
    }

    /// Number of parameter slots taken by arguments
    pub const fn arg_params(&self) -> u16 {
        self.arg_params
    }

    /// Block parameter
    pub const fn closure(&self) -> u16 {
        ARGS + self.arg_params
    }

    /// Heap scope of the body (heap-backed storage only)
    pub const fn dynamic_scope(&self) -> u16 {
        self.closure() + 1
    }

    /// Values array of the heap scope, for fast indexed access
    pub const fn vars_array(&self) -> u16 {
        self.closure() + 2
    }

    /// First slot available for named locals and temporaries
    pub const fn first_temp(&self) -> u16 {
        self.closure() + 3
    }

    /// Signature of a body routine with this layout
    ///
    /// `boxed` layouts take one host array of arguments, the others take one slot per argument.
    pub fn signature(&self, boxed: bool) -> Signature {
        let mut parameters = vec![SlotType::Artifact, SlotType::Context, SlotType::Object];
        if boxed {
            parameters.push(SlotType::Objects);
        } else {
            parameters.extend((0..self.arg_params).map(|_| SlotType::Object));
        }
        parameters.push(SlotType::Block);
        Signature::new(parameters, Some(SlotType::Object))
    }
}

/// How a call site dispatches
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CallType {
    /// Explicit receiver: only public methods
    Normal,

    /// Implicit receiver with arguments: private methods are visible
    Functional,

    /// Bare identifier that could have been a local variable
    Variable,
}

impl CallType {
    pub const fn as_int(&self) -> i64 {
        match self {
            CallType::Normal => 0,
            CallType::Functional => 1,
            CallType::Variable => 2,
        }
    }

    pub const fn from_int(value: i64) -> Option<CallType> {
        match value {
            0 => Some(CallType::Normal),
            1 => Some(CallType::Functional),
            2 => Some(CallType::Variable),
            _ => None,
        }
    }

    /// Can a call of this type reach private methods?
    pub const fn allows_private(&self) -> bool {
        !matches!(self, CallType::Normal)
    }
}

/// What the runtime must set up around a method invocation
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CallConfiguration {
    FrameFullScopeFull,
    FrameFullScopeNone,
    FrameNoneScopeFull,
    FrameNoneScopeNone,
}

impl CallConfiguration {
    pub const fn new(frame: bool, scope: bool) -> CallConfiguration {
        match (frame, scope) {
            (true, true) => CallConfiguration::FrameFullScopeFull,
            (true, false) => CallConfiguration::FrameFullScopeNone,
            (false, true) => CallConfiguration::FrameNoneScopeFull,
            (false, false) => CallConfiguration::FrameNoneScopeNone,
        }
    }

    pub const fn needs_frame(&self) -> bool {
        matches!(
            self,
            CallConfiguration::FrameFullScopeFull | CallConfiguration::FrameFullScopeNone
        )
    }

    pub const fn needs_scope(&self) -> bool {
        matches!(
            self,
            CallConfiguration::FrameFullScopeFull | CallConfiguration::FrameNoneScopeFull
        )
    }
}

/// Which thrown signals an exception-table entry catches
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CatchType {
    /// Everything, including raised exceptions
    Any,

    /// Raised language-level exceptions only
    Raise,

    /// Every control transfer that isn't a raised exception
    FlowControl,

    Break,
    Next,
    Redo,
    Retry,
    Return,
}

/// Required/optional/rest argument shape of a callable
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Arity {
    pub required: usize,
    pub optional: usize,
    pub rest: bool,
}

impl Arity {
    pub const fn fixed(required: usize) -> Arity {
        Arity {
            required,
            optional: 0,
            rest: false,
        }
    }

    /// Exactly `required` arguments, no more and no less
    pub const fn is_fixed(&self) -> bool {
        self.optional == 0 && !self.rest
    }

    /// Should a method of this arity get a specific-arity routine?
    pub const fn is_specific(&self) -> bool {
        self.is_fixed() && self.required <= MAX_SPECIFIC_ARITY
    }

    /// Upper bound on arguments, `-1` if unbounded
    pub const fn max(&self) -> i64 {
        if self.rest {
            -1
        } else {
            (self.required + self.optional) as i64
        }
    }

    pub const fn accepts(&self, count: usize) -> bool {
        count >= self.required && (self.rest || count <= self.required + self.optional)
    }

    /// Traditional single-integer arity (negative when there are optional or rest arguments)
    pub const fn value(&self) -> i64 {
        if self.is_fixed() {
            self.required as i64
        } else {
            -(self.required as i64) - 1
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slot_layout() {
        let specific = SlotLayout::new(2);
        assert_eq!(specific.closure(), 5);
        assert_eq!(specific.first_temp(), 8);
        assert_eq!(specific.signature(false).render(), "(ACOOOB)O");

        let boxed = SlotLayout::new(1);
        assert_eq!(boxed.signature(true).render(), "(ACO[B)O");
    }

    #[test]
    fn arities() {
        let two = Arity::fixed(2);
        assert!(two.is_specific());
        assert!(two.accepts(2) && !two.accepts(1) && !two.accepts(3));
        assert_eq!(two.value(), 2);

        let opt = Arity {
            required: 1,
            optional: 2,
            rest: false,
        };
        assert!(!opt.is_specific());
        assert_eq!(opt.max(), 3);
        assert_eq!(opt.value(), -2);
        assert!(!Arity::fixed(4).is_specific());
    }
}
