//! Assignments, multiple assignment and `||=`/`&&=`

use super::invoke::{BlockSource, Operand};
use super::literals::is_splat;
use super::BodyCompiler;
use crate::abi::{CallType, RuntimeHelper, CONTEXT, SELF};
use crate::compiler::ir::{ConstPath, Node};
use crate::compiler::Error;
use crate::vm::{CodeBuilderExts, Test};

/// Most values that can be reordered on the operand stack
const MAX_REVERSE: usize = 10;

impl<'c, 's> BodyCompiler<'c, 's> {
    /// Single assignment, valued as the assigned value
    pub(super) fn compile_assignment(&mut self, node: &Node<'s>) -> Result<(), Error> {
        let value = match node {
            Node::LocalAsgn { value, .. }
            | Node::InstAsgn { value, .. }
            | Node::GlobalAsgn { value, .. }
            | Node::ClassVarAsgn { value, .. }
            | Node::ConstDecl { value, .. } => value.as_deref(),
            _ => None,
        };
        let value = match value {
            Some(value) => value,
            None => {
                return Err(self.not_compilable(format!("{} without a value", node.describe())))
            }
        };

        // scoped constant declarations evaluate the scope before the value
        if let Node::ConstDecl {
            path: ConstPath::Scoped(scope, name),
            ..
        } = node
        {
            self.code.get_local(CONTEXT)?;
            self.compile_value(value)?;
            self.code.dup()?;
            let stash = self.storage.grab_temp();
            self.code.set_local(stash)?;
            self.compile_value(scope)?;
            self.code.const_string(name.as_str())?;
            self.code.invoke(RuntimeHelper::SetConstantIn)?;
            self.code.pop()?;
            self.code.get_local(stash)?;
            self.storage.release_temp(stash);
            return Ok(());
        }

        self.compile_value(value)?;
        self.code.dup()?;
        self.assign_target(node)
    }

    /// Pop the value on top of the stack into an assignment target
    pub(crate) fn assign_target(&mut self, target: &Node<'s>) -> Result<(), Error> {
        match target {
            Node::LocalAsgn { index, depth, .. } => {
                self.storage.assign(&mut self.code, *index, *depth)?;
            }
            Node::InstAsgn { name, .. } => {
                self.code.get_local(CONTEXT)?;
                self.code.swap()?;
                self.code.get_local(SELF)?;
                self.code.const_string(name.as_str())?;
                self.code.invoke(RuntimeHelper::SetInstanceVariable)?;
                self.code.pop()?;
            }
            Node::GlobalAsgn { name, .. } => {
                self.set_named(RuntimeHelper::SetGlobal, name)?;
            }
            Node::ClassVarAsgn { name, .. } => {
                self.set_named(RuntimeHelper::SetClassVariable, name)?;
            }
            Node::ConstDecl { path, .. } => match path {
                ConstPath::Unscoped(name) => self.set_named(RuntimeHelper::SetConstant, name)?,
                ConstPath::Scoped(scope, name) => {
                    self.code.get_local(CONTEXT)?;
                    self.code.swap()?;
                    self.compile_value(scope)?;
                    self.code.const_string(name.as_str())?;
                    self.code.invoke(RuntimeHelper::SetConstantIn)?;
                    self.code.pop()?;
                }
                ConstPath::TopLevel(name) => {
                    self.code.get_local(CONTEXT)?;
                    self.code.swap()?;
                    self.code.get_local(CONTEXT)?;
                    self.code.invoke(RuntimeHelper::GetObjectClass)?;
                    self.code.const_string(name.as_str())?;
                    self.code.invoke(RuntimeHelper::SetConstantIn)?;
                    self.code.pop()?;
                }
            },
            Node::AttrAssign {
                receiver,
                name,
                args,
            } => {
                if args.iter().any(is_splat) {
                    return Err(self.not_compilable("splat in attribute assignment target"));
                }
                let value_slot = self.storage.grab_temp();
                self.code.set_local(value_slot)?;
                let mut operands: Vec<Operand<'_, 's>> = args.iter().map(Operand::Node).collect();
                operands.push(Operand::Temp(value_slot));
                let call_type = match receiver.as_ref() {
                    Node::SelfRef => CallType::Functional,
                    _ => CallType::Normal,
                };
                self.compile_invocation(
                    Self::site(target),
                    name,
                    call_type,
                    Operand::Node(receiver),
                    &operands,
                    BlockSource::None,
                )?;
                self.code.pop()?;
                self.storage.release_temp(value_slot);
            }
            Node::MultipleAsgn {
                targets,
                rest,
                value: None,
            } => {
                self.code.get_local(CONTEXT)?;
                self.code.swap()?;
                self.code.invoke(RuntimeHelper::EnsureArray)?;
                self.destructure(targets, rest.as_deref())?;
            }
            Node::Splat(inner) => {
                // `*a` as a target inside a nested pattern collects into an array
                self.assign_target(inner)?;
            }
            other => {
                return Err(self.not_compilable(format!(
                    "invalid multiple assignment target: {}",
                    other.describe()
                )))
            }
        }
        Ok(())
    }

    /// Value on the stack, then `helper(context, value, name)`, discarding the result
    fn set_named(&mut self, helper: RuntimeHelper, name: &str) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.swap()?;
        self.code.const_string(name)?;
        self.code.invoke(helper)?;
        self.code.pop()?;
        Ok(())
    }

    pub(super) fn compile_multiple_assignment(
        &mut self,
        targets: &[Node<'s>],
        rest: Option<&Node<'s>>,
        value: &Node<'s>,
        expr: bool,
    ) -> Result<(), Error> {
        // `a, b = b, a` as a statement needs no intermediate array
        if let Node::Array(values) = value {
            let count = values.len();
            if !expr
                && rest.is_none()
                && count == targets.len()
                && (2..=MAX_REVERSE).contains(&count)
                && !values.iter().any(is_splat)
            {
                for value in values {
                    self.compile_value(value)?;
                }
                self.reverse_values(count)?;
                for target in targets {
                    self.assign_target(target)?;
                }
                return Ok(());
            }
        }

        self.code.get_local(CONTEXT)?;
        self.compile_value(value)?;
        self.code.invoke(RuntimeHelper::EnsureArray)?;
        if expr {
            self.code.dup()?;
        }
        self.destructure(targets, rest)
    }

    /// Assign the entries of the array on top of the stack to targets, popping it
    fn destructure(&mut self, targets: &[Node<'s>], rest: Option<&Node<'s>>) -> Result<(), Error> {
        let array = self.storage.grab_temp();
        self.code.set_local(array)?;
        for (idx, target) in targets.iter().enumerate() {
            self.code.get_local(CONTEXT)?;
            self.code.get_local(array)?;
            self.code.const_int(idx as i64)?;
            self.code.invoke(RuntimeHelper::ArrayEntryOrNil)?;
            self.assign_target(target)?;
        }
        match rest {
            None | Some(Node::AnonymousRest) => (),
            Some(rest) => {
                self.code.get_local(CONTEXT)?;
                self.code.get_local(array)?;
                self.code.const_int(targets.len() as i64)?;
                self.code.invoke(RuntimeHelper::SubarrayOrEmpty)?;
                self.assign_target(rest)?;
            }
        }
        self.storage.release_temp(array);
        Ok(())
    }

    /// Reverse the order of the top `count` stack values
    pub(crate) fn reverse_values(&mut self, count: usize) -> Result<(), Error> {
        match count {
            0 | 1 => Ok(()),
            2 => Ok(self.code.swap()?),
            _ if count > MAX_REVERSE => {
                Err(self.not_compilable("can't reverse more than ten values on the stack"))
            }
            _ => {
                let slots: Vec<u16> = (0..count).map(|_| self.storage.grab_temp()).collect();
                for slot in &slots {
                    self.code.set_local(*slot)?;
                }
                for slot in &slots {
                    self.code.get_local(*slot)?;
                }
                for slot in slots.into_iter().rev() {
                    self.storage.release_temp(slot);
                }
                Ok(())
            }
        }
    }

    /// `var ||= value`; constants, class variables and globals are checked with `defined?`
    /// first, since reading them when undefined is an error or a warning
    pub(super) fn compile_op_asgn_or(
        &mut self,
        read: &Node<'s>,
        assign: &Node<'s>,
    ) -> Result<(), Error> {
        let assign_label = self.code.fresh_label();
        let done = self.code.fresh_label();

        let check_defined = matches!(
            read,
            Node::Const(_) | Node::Colon2 { .. } | Node::Colon3(_) | Node::ClassVar(_) | Node::GlobalVar(_)
        );
        if check_defined {
            self.compile_defined(read)?;
            self.code.invoke(RuntimeHelper::IsTrue)?;
            self.code.branch_if(Test::False, assign_label)?;
        }
        self.compile_value(read)?;
        self.code.dup()?;
        self.code.invoke(RuntimeHelper::IsTrue)?;
        self.code.branch_if(Test::True, done)?;
        self.code.pop()?;
        self.code.place_label(assign_label)?;
        self.compile_value(assign)?;
        self.code.place_label(done)?;
        Ok(())
    }

    pub(super) fn compile_op_asgn_and(
        &mut self,
        read: &Node<'s>,
        assign: &Node<'s>,
    ) -> Result<(), Error> {
        let done = self.code.fresh_label();
        self.compile_value(read)?;
        self.code.dup()?;
        self.code.invoke(RuntimeHelper::IsTrue)?;
        self.code.branch_if(Test::False, done)?;
        self.code.pop()?;
        self.compile_value(assign)?;
        self.code.place_label(done)?;
        Ok(())
    }
}
