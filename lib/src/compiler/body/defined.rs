//! `defined?` and regexp backrefs

use super::control::RegionPlacement;
use super::BodyCompiler;
use crate::abi::{CatchType, RuntimeHelper, CONTEXT, SELF};
use crate::compiler::cache::CacheKey;
use crate::compiler::ir::Node;
use crate::compiler::script::Counter;
use crate::compiler::Error;
use crate::vm::CodeBuilderExts;

/// Backrefs, in the order the runtime numbers them
const BACKREFS: &str = "~&`'+";

impl<'c, 's> BodyCompiler<'c, 's> {
    /// Push a description of what `node` is, or `nil` if it isn't defined
    pub(crate) fn compile_defined(&mut self, node: &Node<'s>) -> Result<(), Error> {
        match node {
            Node::Newline { node, .. } | Node::Begin(node) => self.compile_defined(node),
            Node::SelfRef => self.load_description("self"),
            Node::Nil => self.load_description("expression"),
            Node::True | Node::False => self.load_description("expression"),
            Node::LocalVar { .. } => self.load_description("local-variable"),
            Node::LocalAsgn { .. }
            | Node::InstAsgn { .. }
            | Node::GlobalAsgn { .. }
            | Node::ClassVarAsgn { .. }
            | Node::ConstDecl { .. }
            | Node::MultipleAsgn { .. }
            | Node::OpAsgn { .. }
            | Node::OpElementAsgn { .. }
            | Node::OpAsgnOr { .. }
            | Node::OpAsgnAnd { .. }
            | Node::AttrAssign { .. } => self.load_description("assignment"),
            Node::InstVar(name) => {
                self.code.get_local(CONTEXT)?;
                self.code.get_local(SELF)?;
                self.code.const_string(name.as_str())?;
                self.code.invoke(RuntimeHelper::DefinedInstanceVariable)?;
                Ok(())
            }
            Node::GlobalVar(name) => self.defined_named(RuntimeHelper::DefinedGlobal, name),
            Node::ClassVar(name) => self.defined_named(RuntimeHelper::DefinedClassVariable, name),
            Node::Const(name) => self.defined_named(RuntimeHelper::DefinedConstant, name),
            Node::Colon2 { scope, name } => self.probe(|body| {
                body.code.get_local(CONTEXT)?;
                body.compile_value(scope)?;
                body.code.const_string(name.as_str())?;
                body.code.invoke(RuntimeHelper::DefinedConstantFrom)?;
                Ok(())
            }),
            Node::Colon3(name) => {
                self.code.get_local(CONTEXT)?;
                self.code.get_local(CONTEXT)?;
                self.code.invoke(RuntimeHelper::GetObjectClass)?;
                self.code.const_string(name.as_str())?;
                self.code.invoke(RuntimeHelper::DefinedConstantFrom)?;
                Ok(())
            }
            Node::Call { receiver, name, .. } => self.probe(|body| {
                body.code.get_local(CONTEXT)?;
                body.compile_value(receiver)?;
                body.code.const_string(name.as_str())?;
                body.code.const_bool(false)?;
                body.code.invoke(RuntimeHelper::DefinedMethod)?;
                Ok(())
            }),
            Node::FCall { name, .. } | Node::VCall(name) => {
                self.code.get_local(CONTEXT)?;
                self.code.get_local(SELF)?;
                self.code.const_string(name.as_str())?;
                self.code.const_bool(true)?;
                self.code.invoke(RuntimeHelper::DefinedMethod)?;
                Ok(())
            }
            Node::Yield(_) => {
                self.code.get_local(CONTEXT)?;
                self.load_block()?;
                self.code.invoke(RuntimeHelper::DefinedYield)?;
                Ok(())
            }
            Node::Super { .. } | Node::ZSuper { .. } => {
                self.code.get_local(CONTEXT)?;
                self.code.invoke(RuntimeHelper::DefinedSuper)?;
                Ok(())
            }
            Node::Backref(_) | Node::NthRef(_) => self.load_description("global-variable"),
            _ => self.load_description("expression"),
        }
    }

    fn load_description(&mut self, description: &str) -> Result<(), Error> {
        self.load_cached(CacheKey::Str(description.to_string()))
    }

    fn defined_named(&mut self, helper: RuntimeHelper, name: &str) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.const_string(name)?;
        self.code.invoke(helper)?;
        Ok(())
    }

    /// Evaluate code that may raise, yielding `nil` if it does
    fn probe<F>(&mut self, body: F) -> Result<(), Error>
    where
        F: for<'x> FnOnce(&mut BodyCompiler<'x, 's>) -> Result<(), Error>,
    {
        match self.region_placement() {
            RegionPlacement::Outline => {
                self.outline("rescue_", Counter::Rescue, "__probe__", |outlined| {
                    outlined.probe_inline(body)
                })
            }
            RegionPlacement::Inline => self.probe_inline(body),
            RegionPlacement::Unsupported => Err(self.unsupported_storage("defined?")),
        }
    }

    fn probe_inline<F>(&mut self, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let start = self.code.fresh_label();
        let end = self.code.fresh_label();
        let handler = self.code.fresh_label();
        let done = self.code.fresh_label();

        self.code.place_marker(start)?;
        body(self)?;
        self.code.place_marker(end)?;
        self.code.goto(done)?;

        self.code.add_try_region(start, end, handler, CatchType::Any)?;
        self.code.place_label(handler)?;
        self.code.pop()?;
        self.load_nil()?;
        self.code.place_label(done)?;
        Ok(())
    }

    pub(super) fn compile_backref(&mut self, kind: char) -> Result<(), Error> {
        match BACKREFS.find(kind) {
            Some(index) => {
                self.code.get_local(CONTEXT)?;
                self.code.const_int(index as i64)?;
                self.code.invoke(RuntimeHelper::Backref)?;
                Ok(())
            }
            None => Err(self.not_compilable(format!("unknown backref ${}", kind))),
        }
    }
}
