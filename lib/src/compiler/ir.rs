//! Tree the compiler consumes
//!
//! The parser and analyzer are external: they hand over nodes already annotated with static
//! scopes (variable layout and capture flags), variable indices/depths and source positions.

use crate::abi::{Arity, ScopeDescriptor};
use typed_arena::Arena;

/// Arena owning the static scopes of one compilation unit
pub type ScopeArena<'s> = Arena<StaticScope<'s>>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct Position {
    pub line: u32,
}

impl Position {
    pub const fn line(line: u32) -> Position {
        Position { line }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScopeKind {
    /// Method, class body or top-level script: variable lookups stop here
    Local,

    /// Closure: depth-1 variables come from the parent scope
    Block,
}

/// Lexical variable layout of a body
#[derive(Debug)]
pub struct StaticScope<'s> {
    kind: ScopeKind,
    variables: Vec<String>,
    captured: Vec<bool>,
    required: usize,
    optional: usize,
    rest: Option<usize>,
    parent: Option<&'s StaticScope<'s>>,
}

impl<'s> StaticScope<'s> {
    /// Scope of a method, class body or script
    pub fn local(variables: &[&str]) -> StaticScope<'s> {
        StaticScope {
            kind: ScopeKind::Local,
            variables: variables.iter().map(|v| v.to_string()).collect(),
            captured: vec![false; variables.len()],
            required: 0,
            optional: 0,
            rest: None,
            parent: None,
        }
    }

    /// Scope of a closure nested in `parent`
    pub fn block(parent: &'s StaticScope<'s>, variables: &[&str]) -> StaticScope<'s> {
        StaticScope {
            kind: ScopeKind::Block,
            parent: Some(parent),
            ..StaticScope::local(variables)
        }
    }

    /// Record the argument shape (arguments are the leading variables)
    pub fn with_args(mut self, required: usize, optional: usize, rest: Option<usize>) -> Self {
        self.required = required;
        self.optional = optional;
        self.rest = rest;
        self
    }

    /// Flag variables referenced from nested closures
    pub fn with_captured(mut self, indices: &[usize]) -> Self {
        for idx in indices {
            if let Some(flag) = self.captured.get_mut(*idx) {
                *flag = true;
            }
        }
        self
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<&'s StaticScope<'s>> {
        self.parent
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn is_captured(&self, index: usize) -> bool {
        self.captured.get(index).copied().unwrap_or(false)
    }

    pub fn has_captured_variables(&self) -> bool {
        self.captured.iter().any(|c| *c)
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn descriptor(&self) -> ScopeDescriptor {
        ScopeDescriptor {
            names: self.variables.clone(),
            required: self.required,
            optional: self.optional,
            rest: self.rest,
        }
    }
}

/// Rest parameter of a method
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Rest {
    None,

    /// `*` without a name: extra arguments are accepted and dropped
    Anonymous,
    Named(usize),
}

/// Parameters of a method
#[derive(Debug)]
pub struct ArgsSpec<'s> {
    /// Variable indices of required parameters
    pub required: Vec<usize>,

    /// Variable index and default value of optional parameters
    pub optional: Vec<(usize, Node<'s>)>,

    pub rest: Rest,

    /// Variable index of the `&block` parameter
    pub block: Option<usize>,
}

impl<'s> ArgsSpec<'s> {
    pub fn none() -> ArgsSpec<'s> {
        ArgsSpec::required(0)
    }

    /// `count` required parameters stored in the first variables
    pub fn required(count: usize) -> ArgsSpec<'s> {
        ArgsSpec {
            required: (0..count).collect(),
            optional: vec![],
            rest: Rest::None,
            block: None,
        }
    }

    pub fn arity(&self) -> Arity {
        Arity {
            required: self.required.len(),
            optional: self.optional.len(),
            rest: self.rest != Rest::None,
        }
    }

    /// Variable indices bound by the parameters themselves
    pub fn bound_variables(&self) -> Vec<usize> {
        let mut bound = self.required.clone();
        bound.extend(self.optional.iter().map(|(idx, _)| *idx));
        if let Rest::Named(idx) = self.rest {
            bound.push(idx);
        }
        bound.extend(self.block);
        bound
    }
}

/// Parameters of a closure (`|a, b, *c, &d|`), each an assignment target
#[derive(Debug, Default)]
pub struct BlockArgs<'s> {
    pub targets: Vec<Node<'s>>,
    pub rest: Option<Box<Node<'s>>>,
    pub block: Option<usize>,
}

impl<'s> BlockArgs<'s> {
    pub fn none() -> BlockArgs<'s> {
        BlockArgs::default()
    }

    /// Closure parameters that are plain variables of the closure's own scope
    pub fn locals(indices: &[usize]) -> BlockArgs<'s> {
        BlockArgs {
            targets: indices
                .iter()
                .map(|idx| Node::LocalAsgn {
                    index: *idx,
                    depth: 0,
                    value: None,
                })
                .collect(),
            rest: None,
            block: None,
        }
    }

    pub fn arity(&self) -> Arity {
        Arity {
            required: self.targets.len(),
            optional: 0,
            rest: self.rest.is_some(),
        }
    }
}

/// Lexical path naming a class, module or constant
#[derive(Debug)]
pub enum ConstPath<'s> {
    /// `Foo`: relative to the current lexical module
    Unscoped(String),

    /// `Outer::Foo`
    Scoped(Box<Node<'s>>, String),

    /// `::Foo`
    TopLevel(String),
}

impl<'s> ConstPath<'s> {
    pub fn name(&self) -> &str {
        match self {
            ConstPath::Unscoped(name) | ConstPath::Scoped(_, name) | ConstPath::TopLevel(name) => {
                name
            }
        }
    }
}

#[derive(Debug)]
pub struct RescueClause<'s> {
    /// Exception classes; empty means `StandardError`
    pub exceptions: Vec<Node<'s>>,
    pub body: Option<Box<Node<'s>>>,
}

#[derive(Debug)]
pub struct When<'s> {
    pub values: Vec<Node<'s>>,
    pub body: Option<Box<Node<'s>>>,
}

/// Closure literal
#[derive(Debug)]
pub struct Closure<'s> {
    pub scope: &'s StaticScope<'s>,
    pub args: BlockArgs<'s>,
    pub body: Option<Box<Node<'s>>>,
    pub position: Position,
}

/// Method definition (shared by `def` and `def recv.name`)
#[derive(Debug)]
pub struct MethodDef<'s> {
    pub name: String,
    pub scope: &'s StaticScope<'s>,
    pub args: ArgsSpec<'s>,
    pub body: Option<Box<Node<'s>>>,
    pub position: Position,
}

#[derive(Debug)]
pub enum Node<'s> {
    Nil,
    True,
    False,
    SelfRef,
    Fixnum(i64),

    /// Integer literal too large for a fixnum, in decimal
    Bignum(String),
    Float(f64),
    Str(String),

    /// Interpolated string
    DStr(Vec<Node<'s>>),
    Symbol(String),

    /// Interpolated symbol
    DSymbol(Vec<Node<'s>>),
    Regexp {
        pattern: String,
        options: i64,
    },

    /// Interpolated regexp (`once` regexps are built the first time they are evaluated)
    DRegexp {
        parts: Vec<Node<'s>>,
        options: i64,
        once: bool,
    },
    Array(Vec<Node<'s>>),

    /// `[]`
    ZArray,
    Hash(Vec<(Node<'s>, Node<'s>)>),
    Range {
        begin: Box<Node<'s>>,
        end: Box<Node<'s>>,
        exclusive: bool,
    },

    LocalVar {
        index: usize,
        depth: usize,
    },

    /// Assignment to a local variable (with no value when it is an assignment target)
    LocalAsgn {
        index: usize,
        depth: usize,
        value: Option<Box<Node<'s>>>,
    },
    InstVar(String),
    InstAsgn {
        name: String,
        value: Option<Box<Node<'s>>>,
    },
    GlobalVar(String),
    GlobalAsgn {
        name: String,
        value: Option<Box<Node<'s>>>,
    },
    ClassVar(String),
    ClassVarAsgn {
        name: String,
        value: Option<Box<Node<'s>>>,
    },
    Const(String),
    Colon2 {
        scope: Box<Node<'s>>,
        name: String,
    },
    Colon3(String),
    ConstDecl {
        path: ConstPath<'s>,
        value: Option<Box<Node<'s>>>,
    },

    /// Sequence of expressions, valued as the last one
    Block(Vec<Node<'s>>),

    /// `begin ... end` without rescue or ensure clauses
    Begin(Box<Node<'s>>),

    /// Statement starting a new source line
    Newline {
        position: Position,
        node: Box<Node<'s>>,
    },

    If {
        cond: Box<Node<'s>>,
        then_branch: Option<Box<Node<'s>>>,
        else_branch: Option<Box<Node<'s>>>,
    },
    And(Box<Node<'s>>, Box<Node<'s>>),
    Or(Box<Node<'s>>, Box<Node<'s>>),
    Not(Box<Node<'s>>),

    /// `while`/`until` loop
    ///
    /// `check_first` is false for `begin ... end while cond`. `nonlocal_flow` is set when the body
    /// contains closures or other constructs from which break/next/redo arrive as signals.
    While {
        cond: Box<Node<'s>>,
        body: Option<Box<Node<'s>>>,
        check_first: bool,
        until: bool,
        nonlocal_flow: bool,
    },

    /// `for var in iter`: the body shares the enclosing scope
    For {
        var: Box<Node<'s>>,
        iter: Box<Node<'s>>,
        body: Option<Box<Node<'s>>>,
        position: Position,
    },
    Case {
        subject: Option<Box<Node<'s>>>,
        whens: Vec<When<'s>>,
        else_branch: Option<Box<Node<'s>>>,
    },

    Break(Option<Box<Node<'s>>>),
    Next(Option<Box<Node<'s>>>),
    Redo,
    Retry,
    Return(Option<Box<Node<'s>>>),

    Rescue {
        body: Option<Box<Node<'s>>>,
        clauses: Vec<RescueClause<'s>>,
        else_branch: Option<Box<Node<'s>>>,
    },
    Ensure {
        body: Option<Box<Node<'s>>>,
        ensure: Option<Box<Node<'s>>>,
    },

    /// Call with an explicit receiver
    Call {
        receiver: Box<Node<'s>>,
        name: String,
        args: Vec<Node<'s>>,
        iter: Option<Box<Node<'s>>>,
    },

    /// Call with an implicit receiver and arguments (or a block)
    FCall {
        name: String,
        args: Vec<Node<'s>>,
        iter: Option<Box<Node<'s>>>,
    },

    /// Bare identifier call
    VCall(String),

    /// `recv.name = value` or `recv[args] = value`; `args` ends with the value
    AttrAssign {
        receiver: Box<Node<'s>>,
        name: String,
        args: Vec<Node<'s>>,
    },

    /// `recv.attr op= value` (including `||=` and `&&=`)
    OpAsgn {
        receiver: Box<Node<'s>>,
        attr: String,
        operator: String,
        value: Box<Node<'s>>,
    },

    /// `recv[args] op= value` (including `||=` and `&&=`)
    OpElementAsgn {
        receiver: Box<Node<'s>>,
        args: Vec<Node<'s>>,
        operator: String,
        value: Box<Node<'s>>,
    },

    /// `var ||= value`: `read` is the variable, `assign` the assignment
    OpAsgnOr {
        read: Box<Node<'s>>,
        assign: Box<Node<'s>>,
    },

    /// `var &&= value`
    OpAsgnAnd {
        read: Box<Node<'s>>,
        assign: Box<Node<'s>>,
    },

    Super {
        args: Vec<Node<'s>>,
        iter: Option<Box<Node<'s>>>,
    },

    /// `super` without arguments: passes the current method's arguments
    ZSuper {
        iter: Option<Box<Node<'s>>>,
    },
    Yield(Vec<Node<'s>>),

    /// `&value` passed as the block of a call
    BlockPass(Box<Node<'s>>),

    /// `*value` in an argument list or array literal
    Splat(Box<Node<'s>>),

    /// `head, *rest`: array of `head` concatenated with the splatted `rest`
    ArgsCat(Box<Node<'s>>, Box<Node<'s>>),

    /// `*head, value`: array of the splatted `head` with `value` appended
    ArgsPush(Box<Node<'s>>, Box<Node<'s>>),

    /// `a, b, *c = value` (without a value when nested as a target)
    MultipleAsgn {
        targets: Vec<Node<'s>>,
        rest: Option<Box<Node<'s>>>,
        value: Option<Box<Node<'s>>>,
    },

    /// `*` as a multiple-assignment rest target: values are dropped
    AnonymousRest,

    Iter(Closure<'s>),
    Lambda(Closure<'s>),

    Defn(MethodDef<'s>),
    Defs {
        receiver: Box<Node<'s>>,
        def: MethodDef<'s>,
    },
    Class {
        path: ConstPath<'s>,
        superclass: Option<Box<Node<'s>>>,
        scope: &'s StaticScope<'s>,
        body: Option<Box<Node<'s>>>,
        position: Position,
    },
    SClass {
        receiver: Box<Node<'s>>,
        scope: &'s StaticScope<'s>,
        body: Option<Box<Node<'s>>>,
        position: Position,
    },
    Module {
        path: ConstPath<'s>,
        scope: &'s StaticScope<'s>,
        body: Option<Box<Node<'s>>>,
        position: Position,
    },
    Alias {
        new_name: String,
        old_name: String,
    },
    Undef(String),

    Defined(Box<Node<'s>>),

    /// `BEGIN { }`
    PreExe(Closure<'s>),

    /// `END { }`
    PostExe(Closure<'s>),

    /// `$~`, `$&`, `` $` ``, `$'` or `$+`
    Backref(char),

    /// `$1`, `$2`, ...
    NthRef(usize),

    /// `/regexp/ =~ value`
    Match2 {
        regexp: Box<Node<'s>>,
        value: Box<Node<'s>>,
    },

    /// `value =~ /regexp/`
    Match3 {
        value: Box<Node<'s>>,
        regexp: Box<Node<'s>>,
    },
}

impl<'s> Node<'s> {
    pub fn boxed(self) -> Box<Node<'s>> {
        Box::new(self)
    }

    /// Statement at a source line
    pub fn newline(line: u32, node: Node<'s>) -> Node<'s> {
        Node::Newline {
            position: Position::line(line),
            node: Box::new(node),
        }
    }

    pub fn str(value: &str) -> Node<'s> {
        Node::Str(value.to_string())
    }

    pub fn sym(value: &str) -> Node<'s> {
        Node::Symbol(value.to_string())
    }

    pub fn local(index: usize) -> Node<'s> {
        Node::LocalVar { index, depth: 0 }
    }

    pub fn assign(index: usize, value: Node<'s>) -> Node<'s> {
        Node::LocalAsgn {
            index,
            depth: 0,
            value: Some(Box::new(value)),
        }
    }

    pub fn call(receiver: Node<'s>, name: &str, args: Vec<Node<'s>>) -> Node<'s> {
        Node::Call {
            receiver: Box::new(receiver),
            name: name.to_string(),
            args,
            iter: None,
        }
    }

    pub fn fcall(name: &str, args: Vec<Node<'s>>) -> Node<'s> {
        Node::FCall {
            name: name.to_string(),
            args,
            iter: None,
        }
    }

    /// Is this a literal whose construction doesn't depend on variables, `self` or the block?
    pub fn is_literal(&self) -> bool {
        match self {
            Node::Nil
            | Node::True
            | Node::False
            | Node::Fixnum(_)
            | Node::Bignum(_)
            | Node::Float(_)
            | Node::Str(_)
            | Node::Symbol(_)
            | Node::ZArray
            | Node::Regexp { .. } => true,
            Node::Array(elements) => elements.iter().all(Node::is_literal),
            Node::Hash(pairs) => pairs.iter().all(|(k, v)| k.is_literal() && v.is_literal()),
            Node::Range { begin, end, .. } => begin.is_literal() && end.is_literal(),
            _ => false,
        }
    }

    /// Short name of the node kind, used in error messages
    pub fn describe(&self) -> &'static str {
        match self {
            Node::LocalVar { .. } | Node::LocalAsgn { .. } => "local variable",
            Node::InstVar(_) | Node::InstAsgn { .. } => "instance variable",
            Node::GlobalVar(_) | Node::GlobalAsgn { .. } => "global variable",
            Node::ClassVar(_) | Node::ClassVarAsgn { .. } => "class variable",
            Node::Const(_) | Node::Colon2 { .. } | Node::Colon3(_) | Node::ConstDecl { .. } => {
                "constant"
            }
            Node::Call { .. } | Node::FCall { .. } | Node::VCall(_) => "method call",
            Node::AttrAssign { .. } => "attribute assignment",
            Node::MultipleAsgn { .. } => "multiple assignment",
            Node::Splat(_) => "splat",
            Node::BlockPass(_) => "block argument",
            Node::Iter(_) | Node::Lambda(_) => "closure",
            _ => "expression",
        }
    }
}
