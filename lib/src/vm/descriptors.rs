use std::fmt;

/// Type of a value occupying one operand-stack or local slot
///
/// The machine is dynamically typed, but signatures still record what kind of value each slot
/// holds so that generated code can be inspected (and so that stack effects of calls are known).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SlotType {
    /// The artifact instance (`this`)
    Artifact,

    /// The thread context
    Context,

    /// A language-level object
    Object,

    /// A host array of language-level objects
    Objects,

    /// Host integer
    Int,

    /// Host boolean
    Bool,

    /// Host double
    Float,

    /// Host string
    Str,

    /// Heap scope holding captured variables
    Scope,

    /// Runtime static scope descriptor
    StaticScope,

    /// Block (possibly null)
    Block,

    /// Block body, shared by every block created from one closure
    BlockBody,

    /// Dispatch handle for one call site
    CallSite,

    /// A thrown signal (raised exception or control transfer)
    Signal,
}

impl SlotType {
    /// One character code used when rendering signatures
    pub const fn code(&self) -> char {
        match self {
            SlotType::Artifact => 'A',
            SlotType::Context => 'C',
            SlotType::Object => 'O',
            SlotType::Objects => '[',
            SlotType::Int => 'I',
            SlotType::Bool => 'Z',
            SlotType::Float => 'D',
            SlotType::Str => 'S',
            SlotType::Scope => 'E',
            SlotType::StaticScope => 'Q',
            SlotType::Block => 'B',
            SlotType::BlockBody => 'Y',
            SlotType::CallSite => 'L',
            SlotType::Signal => 'X',
        }
    }
}

/// Parameter and return types of a routine
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Signature {
    pub parameters: Vec<SlotType>,
    pub return_type: Option<SlotType>,
}

impl Signature {
    pub fn new(parameters: Vec<SlotType>, return_type: Option<SlotType>) -> Signature {
        Signature {
            parameters,
            return_type,
        }
    }

    /// Number of stack slots consumed when this signature is called
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Render in the `(params)ret` form, with `V` standing for no return value
    pub fn render(&self) -> String {
        let mut rendered = String::from("(");
        rendered.extend(self.parameters.iter().map(SlotType::code));
        rendered.push(')');
        rendered.push(self.return_type.as_ref().map_or('V', SlotType::code));
        rendered
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rendering() {
        let sig = Signature::new(
            vec![
                SlotType::Artifact,
                SlotType::Context,
                SlotType::Object,
                SlotType::Objects,
                SlotType::Block,
            ],
            Some(SlotType::Object),
        );
        assert_eq!(sig.render(), "(ACO[B)O");
        assert_eq!(Signature::new(vec![SlotType::Artifact], None).render(), "(A)V");
    }
}
