//! Compiler for one logical body (script, method, closure or class body)
//!
//! A [`BodyCompiler`] owns the code builder of the routine under construction and walks IR
//! nodes, emitting code that leaves each expression's value on the operand stack. Bodies that
//! get split across several routines (chained statements, outlined exception regions, literal
//! builders) get one [`BodyCompiler`] per routine, all sharing the script's counters and cache.

mod args;
mod assign;
mod control;
mod defined;
mod definitions;
mod invoke;
mod literals;
mod outline;

use super::cache::CacheKey;
use super::errors::SourcePosition;
use super::ir::{Node, StaticScope};
use super::script::ScriptCompiler;
use super::variables::VariableCompiler;
use super::Error;
use crate::abi::{RuntimeHelper, SlotLayout, ARGS, CONTEXT, SELF, THIS};
use crate::vm::{
    CodeBuilder, CodeBuilderExts, Instruction, MemberName, Routine, RoutineAccessFlags,
    Signature, SynLabel,
};

pub use invoke::{BlockSource, Operand};

/// What a body is, which decides how jumps out of it resolve
///
/// Routines continuing a body (chained statements, outlined regions) carry the kind of the body
/// they continue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScopingKind {
    /// Top-level script
    Root,
    Method,
    Closure,

    /// Class, singleton class or module body
    ClassBody,
    Chained(Box<ScopingKind>),
}

impl ScopingKind {
    /// Kind of the body this routine belongs to
    pub fn origin(&self) -> &ScopingKind {
        match self {
            ScopingKind::Chained(inner) => inner.origin(),
            kind => kind,
        }
    }

    pub fn chained(&self) -> ScopingKind {
        ScopingKind::Chained(Box::new(self.origin().clone()))
    }
}

/// How a control transfer leaves the current position
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Transfer {
    /// Jump or return within the routine
    Direct,

    /// Throw a control-transfer signal for some enclosing routine or invocation to catch
    Signal,
}

/// Jump targets of the innermost loop of the routine
#[derive(Copy, Clone, Debug)]
pub struct LoopLabels {
    /// Expects the discarded body value on the stack
    pub next: SynLabel,

    /// Top of the body
    pub redo: SynLabel,

    /// End of the loop; expects the loop value on the stack
    pub brk: SynLabel,

    /// Operand stack depth when the loop was entered
    pub base: usize,
}

/// Shape and identity of a routine about to be compiled
#[derive(Clone, Debug)]
pub struct RoutineSpec {
    pub name: MemberName,

    /// Source-level name, used when naming routines chained from this one
    pub source_name: String,
    pub layout: SlotLayout,
    pub boxed_args: bool,
    pub kind: ScopingKind,

    /// Set for routines outlined from a body, where jumps have to be signals
    pub synthetic: bool,

    /// Overrides the signature implied by the layout (literal builders)
    pub signature: Option<Signature>,
}

impl RoutineSpec {
    pub fn new(name: MemberName, source_name: &str, layout: SlotLayout, kind: ScopingKind) -> Self {
        RoutineSpec {
            name,
            source_name: source_name.to_string(),
            layout,
            boxed_args: false,
            kind,
            synthetic: false,
            signature: None,
        }
    }

    pub fn boxed(mut self) -> Self {
        self.boxed_args = true;
        self
    }

    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn signature(&self) -> Signature {
        self.signature
            .clone()
            .unwrap_or_else(|| self.layout.signature(self.boxed_args))
    }
}

pub struct BodyCompiler<'c, 's> {
    pub(crate) script: &'c mut ScriptCompiler,
    pub(crate) code: CodeBuilder,
    spec: RoutineSpec,
    scope: &'s StaticScope<'s>,
    pub(crate) storage: Box<dyn VariableCompiler>,
    loop_labels: Option<LoopLabels>,

    /// Start of a closure body, after argument binding
    redo_label: Option<SynLabel>,

    /// Nesting of inline rescue/ensure regions around the current position
    region_depth: usize,

    /// Line of the statement being compiled
    line: Option<u32>,

    /// Last line marker emitted
    last_line: Option<u32>,
}

impl<'c, 's> BodyCompiler<'c, 's> {
    pub fn new(
        script: &'c mut ScriptCompiler,
        spec: RoutineSpec,
        scope: &'s StaticScope<'s>,
        storage: Box<dyn VariableCompiler>,
    ) -> BodyCompiler<'c, 's> {
        log::debug!("compiling {} ({:?})", spec.name, spec.kind);
        let mut code = CodeBuilder::new(spec.signature());
        storage.declare_locals(&mut code, scope);
        BodyCompiler {
            script,
            code,
            spec,
            scope,
            storage,
            loop_labels: None,
            redo_label: None,
            region_depth: 0,
            line: None,
            last_line: None,
        }
    }

    pub fn name(&self) -> &MemberName {
        &self.spec.name
    }

    pub fn kind(&self) -> &ScopingKind {
        &self.spec.kind
    }

    pub fn layout(&self) -> SlotLayout {
        self.spec.layout
    }

    pub fn scope(&self) -> &'s StaticScope<'s> {
        self.scope
    }

    /// Add the finished routine to the artifact, handing back the script compiler
    pub fn finish(mut self) -> Result<&'c mut ScriptCompiler, Error> {
        debug_assert_eq!(
            self.storage.temps().live(),
            0,
            "temporaries still reserved at the end of {}",
            self.spec.name
        );
        let access_flags = if self.spec.synthetic {
            RoutineAccessFlags::PRIVATE | RoutineAccessFlags::SYNTHETIC
        } else {
            RoutineAccessFlags::PUBLIC
        };
        let signature = self.spec.signature();
        let code = self.code.result()?;
        self.script.artifact.add_routine(Routine {
            access_flags,
            name: self.spec.name,
            signature,
            code,
        })?;
        Ok(self.script)
    }

    /// Position of the construct being compiled, for error messages
    pub(crate) fn position(&self) -> Option<SourcePosition> {
        self.line.map(|line| SourcePosition {
            file: self.script.settings.source_file.clone(),
            line,
        })
    }

    pub(crate) fn not_compilable(&self, construct: impl Into<String>) -> Error {
        Error::NotCompilable {
            construct: construct.into(),
            position: self.position(),
        }
    }

    pub(crate) fn unsupported_storage(&self, construct: impl Into<String>) -> Error {
        Error::UnsupportedStorage {
            construct: construct.into(),
            position: self.position(),
        }
    }

    /// Current operand stack depth (unreachable code counts as empty)
    pub(crate) fn depth(&self) -> usize {
        self.code.current_depth().unwrap_or(0)
    }

    /// Record the line of the statement being compiled
    pub(crate) fn set_line(&mut self, line: u32) -> Result<(), Error> {
        self.line = Some(line);
        if self.script.settings.line_numbers && self.last_line != Some(line) {
            self.code.push_instruction(Instruction::Line(line))?;
            self.last_line = Some(line);
        }
        Ok(())
    }

    /// Identity of a source site, for cache entries that must not be shared between sites
    pub(crate) fn site(node: &Node<'_>) -> usize {
        node as *const Node<'_> as usize
    }

    /// Push a cached value
    pub(crate) fn load_cached(&mut self, key: CacheKey) -> Result<(), Error> {
        let entry = self.script.cached(key)?;
        entry.load(&mut self.code)
    }

    pub(crate) fn load_nil(&mut self) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::GetNil)?;
        Ok(())
    }

    /// Push the block of the current method (closures reach it through their frame)
    pub(crate) fn load_block(&mut self) -> Result<(), Error> {
        if *self.spec.kind.origin() == ScopingKind::Closure {
            self.code.get_local(CONTEXT)?;
            self.code.invoke(RuntimeHelper::GetFrameBlock)?;
        } else {
            self.code.get_local(self.spec.layout.closure())?;
        }
        Ok(())
    }

    /// Call another routine taking the same parameters as this one, passing them all through
    pub(crate) fn invoke_sibling(&mut self, name: MemberName) -> Result<(), Error> {
        self.code.get_local(THIS)?;
        self.code.get_local(CONTEXT)?;
        self.code.get_local(SELF)?;
        let arg_slots = if self.spec.boxed_args {
            1
        } else {
            self.spec.layout.arg_params()
        };
        for slot in 0..arg_slots {
            self.code.get_local(ARGS + slot)?;
        }
        self.code.get_local(self.spec.layout.closure())?;
        self.code.invoke_routine(name, self.spec.signature())?;
        Ok(())
    }

    /// Pop the stack down to `base` values, keeping the top value if `keep_top`
    pub(crate) fn unwind_stack(&mut self, base: usize, keep_top: bool) -> Result<(), Error> {
        let depth = self.depth();
        if keep_top {
            let extras = depth.saturating_sub(base + 1);
            if extras > 0 {
                let temp = self.storage.grab_temp();
                self.code.set_local(temp)?;
                for _ in 0..extras {
                    self.code.pop()?;
                }
                self.code.get_local(temp)?;
                self.storage.release_temp(temp);
            }
        } else {
            for _ in base..depth {
                self.code.pop()?;
            }
        }
        Ok(())
    }

    /// Are control transfers forced through signals at this position?
    fn signals_forced(&self) -> bool {
        self.spec.synthetic || self.region_depth > 0
    }

    pub(crate) fn return_transfer(&self) -> Transfer {
        match self.spec.kind.origin() {
            ScopingKind::Root | ScopingKind::Method if !self.signals_forced() => Transfer::Direct,
            _ => Transfer::Signal,
        }
    }

    /// How `next` and `redo` outside of a loop resolve
    pub(crate) fn next_transfer(&self) -> Transfer {
        match self.spec.kind.origin() {
            ScopingKind::Closure if !self.signals_forced() => Transfer::Direct,
            _ => Transfer::Signal,
        }
    }

    /// Compile a node, leaving its value on the stack only if `expr`
    pub fn compile(&mut self, node: &Node<'s>, expr: bool) -> Result<(), Error> {
        match node {
            Node::Newline { position, node } => {
                self.set_line(position.line)?;
                self.compile(node, expr)
            }
            Node::Block(nodes) => self.compile_sequence(nodes, expr),
            Node::Begin(inner) => self.compile(inner, expr),
            Node::MultipleAsgn {
                targets,
                rest,
                value: Some(value),
            } => self.compile_multiple_assignment(targets, rest.as_deref(), value, expr),
            _ => {
                self.compile_value(node)?;
                if !expr {
                    self.code.pop()?;
                }
                Ok(())
            }
        }
    }

    /// Compile an optional node, defaulting to `nil`
    pub fn compile_opt(&mut self, node: Option<&Node<'s>>, expr: bool) -> Result<(), Error> {
        match node {
            Some(node) => self.compile(node, expr),
            None if expr => self.load_nil(),
            None => Ok(()),
        }
    }

    fn compile_sequence(&mut self, nodes: &[Node<'s>], expr: bool) -> Result<(), Error> {
        match nodes.split_last() {
            None => self.compile_opt(None, expr),
            Some((last, init)) => {
                for node in init {
                    self.compile(node, false)?;
                }
                self.compile(last, expr)
            }
        }
    }

    /// Compile a node, leaving its value on the stack
    pub fn compile_value(&mut self, node: &Node<'s>) -> Result<(), Error> {
        match node {
            Node::Nil => self.load_nil(),
            Node::True => {
                self.code.get_local(CONTEXT)?;
                self.code.invoke(RuntimeHelper::GetTrue)?;
                Ok(())
            }
            Node::False => {
                self.code.get_local(CONTEXT)?;
                self.code.invoke(RuntimeHelper::GetFalse)?;
                Ok(())
            }
            Node::SelfRef => {
                self.code.get_local(SELF)?;
                Ok(())
            }
            Node::Fixnum(value) => self.compile_fixnum(*value),
            Node::Bignum(digits) => self.load_cached(CacheKey::Bignum(digits.clone())),
            Node::Float(value) => self.load_cached(CacheKey::Float(value.to_bits())),
            Node::Str(value) => self.compile_string(value),
            Node::DStr(parts) => self.compile_dstr(parts),
            Node::Symbol(name) => self.load_cached(CacheKey::Symbol(name.clone())),
            Node::DSymbol(parts) => self.compile_dsymbol(parts),
            Node::Regexp { pattern, options } => self.load_cached(CacheKey::Regexp {
                pattern: pattern.clone(),
                options: *options,
            }),
            Node::DRegexp {
                parts,
                options,
                once,
            } => self.compile_dregexp(Self::site(node), parts, *options, *once),
            Node::Array(elements) => self.compile_array(elements),
            Node::ZArray => self.compile_array(&[]),
            Node::Hash(pairs) => self.compile_hash(pairs),
            Node::Range {
                begin,
                end,
                exclusive,
            } => self.compile_range(begin, end, *exclusive),

            Node::LocalVar { index, depth } => {
                self.storage.retrieve(&mut self.code, *index, *depth)
            }
            Node::LocalAsgn { .. }
            | Node::InstAsgn { .. }
            | Node::GlobalAsgn { .. }
            | Node::ClassVarAsgn { .. }
            | Node::ConstDecl { .. } => self.compile_assignment(node),
            Node::InstVar(name) => {
                self.code.get_local(CONTEXT)?;
                self.code.get_local(SELF)?;
                self.code.const_string(name.as_str())?;
                self.code.invoke(RuntimeHelper::GetInstanceVariable)?;
                Ok(())
            }
            Node::GlobalVar(name) => {
                self.code.get_local(CONTEXT)?;
                self.code.const_string(name.as_str())?;
                self.code.invoke(RuntimeHelper::GetGlobal)?;
                Ok(())
            }
            Node::ClassVar(name) => {
                self.code.get_local(CONTEXT)?;
                self.code.const_string(name.as_str())?;
                self.code.invoke(RuntimeHelper::GetClassVariable)?;
                Ok(())
            }
            Node::Const(name) => self.load_cached(CacheKey::Constant {
                name: name.clone(),
                site: Self::site(node),
            }),
            Node::Colon2 { scope, name } => {
                self.code.get_local(CONTEXT)?;
                self.compile_value(scope)?;
                self.code.const_string(name.as_str())?;
                self.code.invoke(RuntimeHelper::GetConstantFrom)?;
                Ok(())
            }
            Node::Colon3(name) => {
                self.code.get_local(CONTEXT)?;
                self.code.get_local(CONTEXT)?;
                self.code.invoke(RuntimeHelper::GetObjectClass)?;
                self.code.const_string(name.as_str())?;
                self.code.invoke(RuntimeHelper::GetConstantFrom)?;
                Ok(())
            }

            Node::Block(_)
            | Node::Newline { .. }
            | Node::Begin(_)
            | Node::MultipleAsgn { value: Some(_), .. } => self.compile(node, true),
            Node::MultipleAsgn { value: None, .. } => {
                Err(self.not_compilable("multiple assignment without a value"))
            }
            Node::If {
                cond,
                then_branch,
                else_branch,
            } => self.compile_if(cond, then_branch.as_deref(), else_branch.as_deref()),
            Node::And(lhs, rhs) => self.compile_short_circuit(lhs, rhs, true),
            Node::Or(lhs, rhs) => self.compile_short_circuit(lhs, rhs, false),
            Node::Not(inner) => self.compile_not(inner),
            Node::While {
                cond,
                body,
                check_first,
                until,
                nonlocal_flow,
            } => self.compile_while(cond, body.as_deref(), *check_first, *until, *nonlocal_flow),
            Node::For {
                var,
                iter,
                body,
                position,
            } => self.compile_for(node, var, iter, body.as_deref(), *position),
            Node::Case {
                subject,
                whens,
                else_branch,
            } => self.compile_case(subject.as_deref(), whens, else_branch.as_deref()),

            Node::Break(value) => self.compile_break(value.as_deref()),
            Node::Next(value) => self.compile_next(value.as_deref()),
            Node::Redo => self.compile_redo(),
            Node::Retry => self.compile_retry(),
            Node::Return(value) => self.compile_return(value.as_deref()),

            Node::Rescue { .. } => self.compile_rescue(node),
            Node::Ensure { .. } => self.compile_ensure(node),

            Node::Call {
                receiver,
                name,
                args,
                iter,
            } => self.compile_call(
                node,
                Operand::Node(receiver),
                name,
                args,
                iter.as_deref(),
            ),
            Node::FCall { name, args, iter } => {
                self.compile_call(node, Operand::SelfRef, name, args, iter.as_deref())
            }
            Node::VCall(name) => self.compile_call(node, Operand::SelfRef, name, &[], None),
            Node::AttrAssign {
                receiver,
                name,
                args,
            } => self.compile_attr_assign(node, receiver, name, args),
            Node::OpAsgn {
                receiver,
                attr,
                operator,
                value,
            } => self.compile_op_asgn(node, receiver, attr, operator, value),
            Node::OpElementAsgn {
                receiver,
                args,
                operator,
                value,
            } => self.compile_op_element_asgn(node, receiver, args, operator, value),
            Node::OpAsgnOr { read, assign } => self.compile_op_asgn_or(read, assign),
            Node::OpAsgnAnd { read, assign } => self.compile_op_asgn_and(read, assign),
            Node::Super { args, iter } => self.compile_super(args, iter.as_deref()),
            Node::ZSuper { iter } => self.compile_zsuper(iter.as_deref()),
            Node::Yield(args) => self.compile_yield(args),
            Node::Match2 { regexp, value } => self.compile_call(
                node,
                Operand::Node(regexp),
                "=~",
                std::slice::from_ref(value.as_ref()),
                None,
            ),
            Node::Match3 { value, regexp } => self.compile_call(
                node,
                Operand::Node(value),
                "=~",
                std::slice::from_ref(regexp.as_ref()),
                None,
            ),
            Node::Splat(inner) => {
                self.compile_value(inner)?;
                self.code.get_local(CONTEXT)?;
                self.code.swap()?;
                self.code.invoke(RuntimeHelper::SplatValue)?;
                Ok(())
            }
            Node::ArgsCat(head, rest) => self.compile_args_cat(head, rest),
            Node::ArgsPush(head, value) => self.compile_args_push(head, value),
            Node::BlockPass(_) | Node::AnonymousRest => {
                Err(self.not_compilable(format!("{} outside of a call", node.describe())))
            }

            Node::Iter(closure) => {
                self.compile_closure(closure, crate::abi::BlockKind::Block)?;
                self.code.get_local(CONTEXT)?;
                self.code.swap()?;
                self.code.invoke(RuntimeHelper::BlockToProc)?;
                Ok(())
            }
            Node::Lambda(closure) => self.compile_lambda(closure),
            Node::PreExe(closure) => self.compile_pre_exe(closure),
            Node::PostExe(closure) => self.compile_post_exe(closure),
            Node::Defn(def) => self.compile_defn(def),
            Node::Defs { receiver, def } => self.compile_defs(receiver, def),
            Node::Class {
                path,
                superclass,
                scope,
                body,
                position,
            } => self.compile_class(path, superclass.as_deref(), scope, body.as_deref(), *position),
            Node::SClass {
                receiver,
                scope,
                body,
                position,
            } => self.compile_sclass(receiver, scope, body.as_deref(), *position),
            Node::Module {
                path,
                scope,
                body,
                position,
            } => self.compile_module(path, scope, body.as_deref(), *position),
            Node::Alias { new_name, old_name } => {
                self.code.get_local(CONTEXT)?;
                self.code.const_string(new_name.as_str())?;
                self.code.const_string(old_name.as_str())?;
                self.code.invoke(RuntimeHelper::Alias)?;
                Ok(())
            }
            Node::Undef(name) => {
                self.code.get_local(CONTEXT)?;
                self.code.const_string(name.as_str())?;
                self.code.invoke(RuntimeHelper::Undef)?;
                Ok(())
            }

            Node::Defined(inner) => self.compile_defined(inner),
            Node::Backref(kind) => self.compile_backref(*kind),
            Node::NthRef(index) => {
                self.code.get_local(CONTEXT)?;
                self.code.const_int(*index as i64)?;
                self.code.invoke(RuntimeHelper::NthRef)?;
                Ok(())
            }
        }
    }
}
