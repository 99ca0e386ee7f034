use super::ir::{Closure, Node};
use crate::abi::CallConfiguration;
use bitflags::bitflags;

bitflags! {
    /// Features of a body that constrain how it gets compiled
    pub struct InspectorFlags: u32 {
        /// A closure literal appears in the body
        const CLOSURE = 0x0001;

        /// Something reflects over (or shares) the variables of the body, so they must live in a
        /// heap scope
        const SCOPE_AWARE = 0x0002;

        /// Something reads the caller frame (block, method name, backrefs)
        const FRAME_AWARE = 0x0004;

        /// `rescue` or `ensure` appears in the body
        const EXCEPTION_REGIONS = 0x0008;

        /// `super` or argument-less `super`
        const SUPER = 0x0010;

        /// `yield` or `block_given?`
        const BLOCK_ACCESS = 0x0020;
    }
}

/// Methods whose presence means local variables may be inspected or captured by name
const SCOPE_AWARE_METHODS: &[&str] = &["binding", "eval", "local_variables"];

/// Methods which look at the caller's frame
const FRAME_AWARE_METHODS: &[&str] = &["block_given?", "iterator?", "__method__"];

/// Precomputed summary of one body, used to pick a variable storage strategy and the calling
/// convention the runtime sets up around invocations
///
/// The walk stops at nested method and class definitions (those are separate bodies) but
/// descends into closures, since closures share the variables of the enclosing body.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct AstInspector {
    flags: InspectorFlags,
}

impl Default for InspectorFlags {
    fn default() -> Self {
        InspectorFlags::empty()
    }
}

impl AstInspector {
    pub fn new(flags: InspectorFlags) -> AstInspector {
        AstInspector { flags }
    }

    /// Inspect a body (parameter defaults included)
    pub fn inspect<'s>(nodes: &[&Node<'s>]) -> AstInspector {
        let mut inspector = AstInspector::default();
        for node in nodes {
            inspector.visit(node);
        }
        inspector
    }

    pub fn flags(&self) -> InspectorFlags {
        self.flags
    }

    /// Give up on any optimization: every flag is set
    pub fn disable(&mut self) {
        self.flags = InspectorFlags::all();
    }

    pub fn has_closure(&self) -> bool {
        self.flags.contains(InspectorFlags::CLOSURE)
    }

    pub fn has_scope_aware_methods(&self) -> bool {
        self.flags.contains(InspectorFlags::SCOPE_AWARE)
    }

    pub fn has_frame_aware_methods(&self) -> bool {
        self.flags.intersects(
            InspectorFlags::FRAME_AWARE | InspectorFlags::SUPER | InspectorFlags::BLOCK_ACCESS,
        )
    }

    pub fn has_exception_regions(&self) -> bool {
        self.flags.contains(InspectorFlags::EXCEPTION_REGIONS)
    }

    /// Does a body with this summary need a heap scope?
    pub fn needs_heap_scope(&self) -> bool {
        self.flags
            .intersects(InspectorFlags::SCOPE_AWARE | InspectorFlags::CLOSURE)
    }

    pub fn call_configuration(&self) -> CallConfiguration {
        CallConfiguration::new(
            self.has_frame_aware_methods() || self.has_closure(),
            self.needs_heap_scope(),
        )
    }

    fn call_name(&mut self, name: &str) {
        if SCOPE_AWARE_METHODS.contains(&name) {
            self.flags.insert(InspectorFlags::SCOPE_AWARE);
        }
        if FRAME_AWARE_METHODS.contains(&name) {
            self.flags.insert(InspectorFlags::FRAME_AWARE);
        }
        if name == "block_given?" || name == "iterator?" {
            self.flags.insert(InspectorFlags::BLOCK_ACCESS);
        }
    }

    fn visit_closure(&mut self, closure: &Closure<'_>) {
        self.flags.insert(InspectorFlags::CLOSURE);
        for target in &closure.args.targets {
            self.visit(target);
        }
        self.visit_opt(closure.args.rest.as_deref());
        self.visit_opt(closure.body.as_deref());
    }

    fn visit_opt(&mut self, node: Option<&Node<'_>>) {
        if let Some(node) = node {
            self.visit(node);
        }
    }

    fn visit_all(&mut self, nodes: &[Node<'_>]) {
        for node in nodes {
            self.visit(node);
        }
    }

    fn visit(&mut self, node: &Node<'_>) {
        match node {
            Node::Nil
            | Node::True
            | Node::False
            | Node::SelfRef
            | Node::Fixnum(_)
            | Node::Bignum(_)
            | Node::Float(_)
            | Node::Str(_)
            | Node::Symbol(_)
            | Node::Regexp { .. }
            | Node::ZArray
            | Node::LocalVar { .. }
            | Node::InstVar(_)
            | Node::GlobalVar(_)
            | Node::ClassVar(_)
            | Node::Const(_)
            | Node::Colon3(_)
            | Node::Redo
            | Node::Retry
            | Node::AnonymousRest
            | Node::Alias { .. }
            | Node::Undef(_) => (),

            Node::Backref(_) | Node::NthRef(_) => self.flags.insert(InspectorFlags::FRAME_AWARE),

            Node::DStr(parts) | Node::DSymbol(parts) | Node::DRegexp { parts, .. } => {
                self.visit_all(parts)
            }
            Node::Array(elements) | Node::Block(elements) => self.visit_all(elements),
            Node::Yield(args) => {
                self.flags.insert(InspectorFlags::BLOCK_ACCESS);
                self.visit_all(args)
            }
            Node::Hash(pairs) => {
                for (key, value) in pairs {
                    self.visit(key);
                    self.visit(value);
                }
            }
            Node::Range { begin, end, .. } => {
                self.visit(begin);
                self.visit(end);
            }

            Node::LocalAsgn { value, .. }
            | Node::InstAsgn { value, .. }
            | Node::GlobalAsgn { value, .. }
            | Node::ClassVarAsgn { value, .. } => self.visit_opt(value.as_deref()),
            Node::Colon2 { scope, .. } => self.visit(scope),
            Node::ConstDecl { path, value } => {
                if let super::ir::ConstPath::Scoped(scope, _) = path {
                    self.visit(scope);
                }
                self.visit_opt(value.as_deref());
            }

            Node::Begin(inner)
            | Node::Not(inner)
            | Node::Splat(inner)
            | Node::BlockPass(inner)
            | Node::Defined(inner) => self.visit(inner),
            Node::Newline { node, .. } => self.visit(node),
            Node::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.visit(cond);
                self.visit_opt(then_branch.as_deref());
                self.visit_opt(else_branch.as_deref());
            }
            Node::And(lhs, rhs)
            | Node::Or(lhs, rhs)
            | Node::ArgsCat(lhs, rhs)
            | Node::ArgsPush(lhs, rhs) => {
                self.visit(lhs);
                self.visit(rhs);
            }
            Node::Match2 { regexp, value } | Node::Match3 { value, regexp } => {
                self.flags.insert(InspectorFlags::FRAME_AWARE);
                self.visit(regexp);
                self.visit(value);
            }
            // loops that may be outlined need variables the outlined routine can reach
            Node::While {
                cond,
                body,
                nonlocal_flow,
                ..
            } => {
                if *nonlocal_flow {
                    self.flags.insert(InspectorFlags::SCOPE_AWARE);
                }
                self.visit(cond);
                self.visit_opt(body.as_deref());
            }

            // The body of a `for` runs as a closure sharing this body's variables
            Node::For {
                var, iter, body, ..
            } => {
                self.flags
                    .insert(InspectorFlags::CLOSURE | InspectorFlags::SCOPE_AWARE);
                self.visit(var);
                self.visit(iter);
                self.visit_opt(body.as_deref());
            }
            Node::Case {
                subject,
                whens,
                else_branch,
            } => {
                self.visit_opt(subject.as_deref());
                for when in whens {
                    self.visit_all(&when.values);
                    self.visit_opt(when.body.as_deref());
                }
                self.visit_opt(else_branch.as_deref());
            }
            Node::Break(value) | Node::Next(value) | Node::Return(value) => {
                self.visit_opt(value.as_deref())
            }

            // Exception regions may be outlined, which needs variables shared between routines
            Node::Rescue {
                body,
                clauses,
                else_branch,
            } => {
                self.disable();
                self.visit_opt(body.as_deref());
                for clause in clauses {
                    self.visit_all(&clause.exceptions);
                    self.visit_opt(clause.body.as_deref());
                }
                self.visit_opt(else_branch.as_deref());
            }
            Node::Ensure { body, ensure } => {
                self.disable();
                self.visit_opt(body.as_deref());
                self.visit_opt(ensure.as_deref());
            }

            Node::Call {
                receiver,
                name,
                args,
                iter,
            } => {
                self.call_name(name);
                self.visit(receiver);
                self.visit_all(args);
                self.visit_opt(iter.as_deref());
            }
            Node::FCall { name, args, iter } => {
                self.call_name(name);
                self.visit_all(args);
                self.visit_opt(iter.as_deref());
            }
            Node::VCall(name) => self.call_name(name),
            Node::AttrAssign { receiver, args, .. } => {
                self.visit(receiver);
                self.visit_all(args);
            }
            Node::OpAsgn {
                receiver, value, ..
            } => {
                self.visit(receiver);
                self.visit(value);
            }
            Node::OpElementAsgn {
                receiver,
                args,
                value,
                ..
            } => {
                self.visit(receiver);
                self.visit_all(args);
                self.visit(value);
            }
            Node::OpAsgnOr { read, assign } | Node::OpAsgnAnd { read, assign } => {
                self.visit(read);
                self.visit(assign);
            }
            Node::Super { args, iter } => {
                self.flags.insert(InspectorFlags::SUPER);
                self.visit_all(args);
                self.visit_opt(iter.as_deref());
            }
            Node::ZSuper { iter } => {
                self.flags.insert(InspectorFlags::SUPER);
                self.visit_opt(iter.as_deref());
            }
            Node::MultipleAsgn {
                targets,
                rest,
                value,
            } => {
                self.visit_all(targets);
                self.visit_opt(rest.as_deref());
                self.visit_opt(value.as_deref());
            }

            Node::Iter(closure)
            | Node::Lambda(closure)
            | Node::PreExe(closure)
            | Node::PostExe(closure) => self.visit_closure(closure),

            // Separate bodies: only what gets evaluated here matters
            Node::Defn(_) => (),
            Node::Defs { receiver, .. } => self.visit(receiver),
            Node::Class {
                path, superclass, ..
            } => {
                if let super::ir::ConstPath::Scoped(scope, _) = path {
                    self.visit(scope);
                }
                self.visit_opt(superclass.as_deref());
            }
            Node::SClass { receiver, .. } => self.visit(receiver),
            Node::Module { path, .. } => {
                if let super::ir::ConstPath::Scoped(scope, _) = path {
                    self.visit(scope);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_body_needs_nothing() {
        let body = Node::Block(vec![
            Node::assign(0, Node::Fixnum(1)),
            Node::call(Node::local(0), "+", vec![Node::Fixnum(2)]),
        ]);
        let inspector = AstInspector::inspect(&[&body]);
        assert!(!inspector.has_closure());
        assert!(!inspector.needs_heap_scope());
        assert_eq!(
            inspector.call_configuration(),
            CallConfiguration::FrameNoneScopeNone
        );
    }

    #[test]
    fn exception_regions_disable_everything() {
        let body = Node::Ensure {
            body: Some(Node::fcall("foo", vec![]).boxed()),
            ensure: None,
        };
        let inspector = AstInspector::inspect(&[&body]);
        assert!(inspector.has_scope_aware_methods());
        assert!(inspector.has_exception_regions());
        assert_eq!(
            inspector.call_configuration(),
            CallConfiguration::FrameFullScopeFull
        );
    }

    #[test]
    fn frame_aware_calls() {
        let body = Node::fcall("block_given?", vec![]);
        let inspector = AstInspector::inspect(&[&body]);
        assert!(inspector.has_frame_aware_methods());
        assert!(!inspector.needs_heap_scope());
    }

    #[test]
    fn loops_with_non_local_flow_need_a_heap_scope() {
        let tight = Node::While {
            cond: Node::True.boxed(),
            body: Some(Node::Break(None).boxed()),
            check_first: true,
            until: false,
            nonlocal_flow: true,
        };
        assert!(AstInspector::inspect(&[&tight]).has_scope_aware_methods());

        let plain = Node::While {
            cond: Node::True.boxed(),
            body: Some(Node::Break(None).boxed()),
            check_first: true,
            until: false,
            nonlocal_flow: false,
        };
        assert!(!AstInspector::inspect(&[&plain]).has_scope_aware_methods());
    }
}
