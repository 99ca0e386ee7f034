use super::{Arity, CallConfiguration};
use crate::vm::MemberName;

/// Variable layout of a body, in the form the runtime needs to build scopes
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ScopeDescriptor {
    pub names: Vec<String>,
    pub required: usize,
    pub optional: usize,

    /// Index of the rest argument variable
    pub rest: Option<usize>,
}

impl ScopeDescriptor {
    /// Compact string form, used as the cache key and link-time constant for static scopes
    ///
    /// The shape is `names;separated;by;semicolons|required|optional|rest` where `rest` is `-1`
    /// when there is no rest argument.
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.names.join(";"),
            self.required,
            self.optional,
            self.rest.map_or(-1, |idx| idx as i64)
        )
    }

    /// Inverse of [`ScopeDescriptor::encode`]
    pub fn decode(encoded: &str) -> Option<ScopeDescriptor> {
        let mut parts = encoded.split('|');
        let names = parts.next()?;
        let required = parts.next()?.parse().ok()?;
        let optional = parts.next()?.parse().ok()?;
        let rest: i64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(ScopeDescriptor {
            names: if names.is_empty() {
                vec![]
            } else {
                names.split(';').map(String::from).collect()
            },
            required,
            optional,
            rest: if rest < 0 { None } else { Some(rest as usize) },
        })
    }
}

/// Everything the runtime needs to register a compiled method in a dispatch table
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodDescriptor {
    /// Source-level method name
    pub name: String,

    /// Routine taking boxed arguments; used for dynamic dispatch
    pub routine: MemberName,

    /// Routine taking the required arguments in slots, for methods of specific arity
    pub fast_routine: Option<MemberName>,

    pub arity: Arity,
    pub scope: ScopeDescriptor,
    pub file: String,
    pub line: u32,
    pub call_config: CallConfiguration,
}

/// Source construct a closure was compiled from
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BlockKind {
    Block,
    Lambda,

    /// `for` loop body: shares the enclosing scope instead of pushing its own
    For,

    /// `BEGIN { }`
    Begin,

    /// `END { }`
    End,
}

impl BlockKind {
    /// Suffix used when naming the routine of the closure
    pub const fn routine_suffix(&self) -> &'static str {
        match self {
            BlockKind::Block | BlockKind::Lambda => "__block__",
            BlockKind::For => "__for__",
            BlockKind::Begin => "__begin__",
            BlockKind::End => "__end__",
        }
    }

    pub const fn shares_scope(&self) -> bool {
        matches!(self, BlockKind::For)
    }
}

/// Everything the runtime needs to build a block body for a compiled closure
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockDescriptor {
    pub routine: MemberName,
    pub kind: BlockKind,
    pub arity: Arity,
    pub scope: ScopeDescriptor,
    pub file: String,
    pub line: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Descriptor {
    Method(MethodDescriptor),
    Block(BlockDescriptor),
}

impl Descriptor {
    pub fn routine(&self) -> &MemberName {
        match self {
            Descriptor::Method(method) => &method.routine,
            Descriptor::Block(block) => &block.routine,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scope_encoding() {
        let scope = ScopeDescriptor {
            names: vec!["a".into(), "b".into(), "rest".into()],
            required: 1,
            optional: 1,
            rest: Some(2),
        };
        assert_eq!(scope.encode(), "a;b;rest|1|1|2");
        assert_eq!(ScopeDescriptor::decode(&scope.encode()), Some(scope));

        let empty = ScopeDescriptor {
            names: vec![],
            required: 0,
            optional: 0,
            rest: None,
        };
        assert_eq!(empty.encode(), "|0|0|-1");
        assert_eq!(ScopeDescriptor::decode("|0|0|-1"), Some(empty));
        assert_eq!(ScopeDescriptor::decode("a|x|0|-1"), None);
    }
}
