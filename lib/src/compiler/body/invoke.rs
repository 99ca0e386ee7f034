//! Method calls, `super` and `yield`

use super::literals::is_splat;
use super::BodyCompiler;
use crate::abi::{BlockKind, CallType, RuntimeHelper, CONTEXT, MAX_SPECIFIC_ARITY, SELF};
use crate::compiler::cache::CacheKey;
use crate::compiler::ir::Node;
use crate::compiler::Error;
use crate::vm::{CodeBuilderExts, Instruction, Test};

/// Where a receiver or argument value comes from
#[derive(Copy, Clone, Debug)]
pub enum Operand<'n, 's> {
    Node(&'n Node<'s>),

    /// Value already evaluated into a temporary slot
    Temp(u16),
    SelfRef,
}

/// Where the block passed to a call comes from
#[derive(Copy, Clone, Debug)]
pub enum BlockSource<'n, 's> {
    None,

    /// A closure literal or `&value` argument
    Node(&'n Node<'s>),

    /// Block already created into a temporary slot
    Temp(u16),
}

impl<'n, 's> Operand<'n, 's> {
    fn is_splat(&self) -> bool {
        match self {
            Operand::Node(node) => is_splat(node),
            _ => false,
        }
    }
}

impl<'c, 's> BodyCompiler<'c, 's> {
    /// Compile a call node (`Call`, `FCall`, `VCall` and the matching operators)
    pub(super) fn compile_call(
        &mut self,
        node: &Node<'s>,
        receiver: Operand<'_, 's>,
        name: &str,
        args: &[Node<'s>],
        iter: Option<&Node<'s>>,
    ) -> Result<(), Error> {
        let call_type = match node {
            Node::FCall { .. } => CallType::Functional,
            Node::VCall(_) => CallType::Variable,
            _ => CallType::Normal,
        };
        let args: Vec<Operand<'_, 's>> = args.iter().map(Operand::Node).collect();
        let block = match iter {
            Some(iter) => BlockSource::Node(iter),
            None => BlockSource::None,
        };
        self.compile_invocation(Self::site(node), name, call_type, receiver, &args, block)
    }

    /// Emit a dynamic dispatch through a cached call site, leaving the result on the stack
    pub(crate) fn compile_invocation(
        &mut self,
        site: usize,
        name: &str,
        call_type: CallType,
        receiver: Operand<'_, 's>,
        args: &[Operand<'_, 's>],
        block: BlockSource<'_, 's>,
    ) -> Result<(), Error> {
        log::trace!("call site {} ({:?}, {} args)", name, call_type, args.len());
        self.load_cached(CacheKey::CallSite {
            name: name.to_string(),
            call_type,
            site,
        })?;
        self.code.get_local(CONTEXT)?;
        self.code.get_local(SELF)?;
        self.load_operand(receiver)?;

        let has_splat = args.iter().any(Operand::is_splat);
        if !has_splat && args.len() <= MAX_SPECIFIC_ARITY {
            for arg in args {
                self.load_operand(*arg)?;
            }
            self.load_block_source(block)?;
            self.code.invoke(RuntimeHelper::Call(args.len() as u8))?;
        } else {
            self.compile_host_args(args)?;
            self.load_block_source(block)?;
            self.code.invoke(RuntimeHelper::CallBoxed)?;
        }
        Ok(())
    }

    pub(crate) fn load_operand(&mut self, operand: Operand<'_, 's>) -> Result<(), Error> {
        match operand {
            Operand::Node(node) => self.compile_value(node),
            Operand::Temp(slot) => Ok(self.code.get_local(slot)?),
            Operand::SelfRef => Ok(self.code.get_local(SELF)?),
        }
    }

    /// Push the arguments as one host array, flattening splats
    fn compile_host_args(&mut self, args: &[Operand<'_, 's>]) -> Result<(), Error> {
        if args.iter().any(Operand::is_splat) {
            self.code.get_local(CONTEXT)?;
            self.code.get_local(CONTEXT)?;
            self.code.invoke(RuntimeHelper::ConstructArray(0))?;
            for arg in args {
                match arg {
                    Operand::Node(node) => self.append_to_array(node)?,
                    other => {
                        self.code.get_local(CONTEXT)?;
                        self.code.swap()?;
                        self.load_operand(*other)?;
                        self.code.invoke(RuntimeHelper::ArrayAppend)?;
                    }
                }
            }
            self.code.invoke(RuntimeHelper::ToHostArray)?;
        } else {
            self.code.const_int(args.len() as i64)?;
            self.code.push_instruction(Instruction::NewArray)?;
            for (idx, arg) in args.iter().enumerate() {
                self.code.dup()?;
                self.code.const_int(idx as i64)?;
                self.load_operand(*arg)?;
                self.code.push_instruction(Instruction::ArrayStore)?;
            }
        }
        Ok(())
    }

    fn load_block_source(&mut self, block: BlockSource<'_, 's>) -> Result<(), Error> {
        match block {
            BlockSource::None => self.code.const_null()?,
            BlockSource::Temp(slot) => self.code.get_local(slot)?,
            BlockSource::Node(Node::Iter(closure)) => {
                self.compile_closure(closure, BlockKind::Block)?
            }
            BlockSource::Node(Node::BlockPass(value)) => {
                self.code.get_local(CONTEXT)?;
                self.compile_value(value)?;
                self.code.invoke(RuntimeHelper::ProcToBlock)?;
            }
            BlockSource::Node(other) => {
                return Err(self.not_compilable(format!("{} passed as a block", other.describe())))
            }
        }
        Ok(())
    }

    /// Block passed implicitly by `super`: an explicit one, or the current method's
    fn load_super_block(&mut self, iter: Option<&Node<'s>>) -> Result<(), Error> {
        match iter {
            Some(iter) => self.load_block_source(BlockSource::Node(iter)),
            None => self.load_block(),
        }
    }

    pub(super) fn compile_super(
        &mut self,
        args: &[Node<'s>],
        iter: Option<&Node<'s>>,
    ) -> Result<(), Error> {
        let args: Vec<Operand<'_, 's>> = args.iter().map(Operand::Node).collect();
        self.code.get_local(CONTEXT)?;
        self.code.get_local(SELF)?;
        self.compile_host_args(&args)?;
        self.load_super_block(iter)?;
        self.code.invoke(RuntimeHelper::CallSuper)?;
        Ok(())
    }

    pub(super) fn compile_zsuper(&mut self, iter: Option<&Node<'s>>) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.get_local(SELF)?;
        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::ZSuperArgs)?;
        self.load_super_block(iter)?;
        self.code.invoke(RuntimeHelper::CallSuper)?;
        Ok(())
    }

    pub(super) fn compile_yield(&mut self, args: &[Node<'s>]) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.load_block()?;
        match args {
            [] => {
                self.load_nil()?;
                self.code.const_bool(false)?;
            }
            [single] if !is_splat(single) => {
                self.compile_value(single)?;
                self.code.const_bool(false)?;
            }
            _ => {
                self.compile_array(args)?;
                self.code.const_bool(true)?;
            }
        }
        self.code.invoke(RuntimeHelper::Yield)?;
        Ok(())
    }

    /// `head, *rest` as one array
    pub(super) fn compile_args_cat(
        &mut self,
        head: &Node<'s>,
        rest: &Node<'s>,
    ) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.compile_value(head)?;
        self.compile_value(rest)?;
        self.code.invoke(RuntimeHelper::ArrayConcat)?;
        Ok(())
    }

    /// `*head, value` as one array
    pub(super) fn compile_args_push(
        &mut self,
        head: &Node<'s>,
        value: &Node<'s>,
    ) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.compile_value(head)?;
        self.compile_value(value)?;
        self.code.invoke(RuntimeHelper::ArrayAppend)?;
        Ok(())
    }

    /// `recv.name = value` and `recv[args] = value`, valued as the assigned value
    pub(super) fn compile_attr_assign(
        &mut self,
        node: &Node<'s>,
        receiver: &Node<'s>,
        name: &str,
        args: &[Node<'s>],
    ) -> Result<(), Error> {
        if args.iter().any(is_splat) {
            return Err(self.not_compilable("splat in attribute assignment"));
        }
        let call_type = attr_call_type(receiver);

        let mut temps = Vec::with_capacity(args.len() + 1);
        self.compile_value(receiver)?;
        let receiver_slot = self.storage.grab_temp();
        self.code.set_local(receiver_slot)?;
        temps.push(receiver_slot);
        for arg in args {
            self.compile_value(arg)?;
            let slot = self.storage.grab_temp();
            self.code.set_local(slot)?;
            temps.push(slot);
        }

        let operands: Vec<Operand<'_, 's>> = temps[1..].iter().map(|t| Operand::Temp(*t)).collect();
        self.compile_invocation(
            Self::site(node),
            name,
            call_type,
            Operand::Temp(receiver_slot),
            &operands,
            BlockSource::None,
        )?;
        self.code.pop()?;
        match temps.last() {
            Some(value_slot) if temps.len() > 1 => self.code.get_local(*value_slot)?,
            _ => self.load_nil()?,
        }
        for slot in temps.into_iter().rev() {
            self.storage.release_temp(slot);
        }
        Ok(())
    }

    /// `recv.attr op= value`
    pub(super) fn compile_op_asgn(
        &mut self,
        node: &Node<'s>,
        receiver: &Node<'s>,
        attr: &str,
        operator: &str,
        value: &Node<'s>,
    ) -> Result<(), Error> {
        let site = Self::site(node);
        let call_type = attr_call_type(receiver);
        let setter = format!("{}=", attr);

        self.compile_value(receiver)?;
        let receiver_slot = self.storage.grab_temp();
        self.code.set_local(receiver_slot)?;
        self.compile_invocation(
            site,
            attr,
            call_type,
            Operand::Temp(receiver_slot),
            &[],
            BlockSource::None,
        )?;
        self.compile_op_and_store(site, operator, value, |body, new_value| {
            body.compile_invocation(
                site + 2,
                &setter,
                call_type,
                Operand::Temp(receiver_slot),
                &[Operand::Temp(new_value)],
                BlockSource::None,
            )
        })?;
        self.storage.release_temp(receiver_slot);
        Ok(())
    }

    /// `recv[args] op= value`
    pub(super) fn compile_op_element_asgn(
        &mut self,
        node: &Node<'s>,
        receiver: &Node<'s>,
        args: &[Node<'s>],
        operator: &str,
        value: &Node<'s>,
    ) -> Result<(), Error> {
        if args.iter().any(is_splat) {
            return Err(self.not_compilable("splat in element operator assignment"));
        }
        let site = Self::site(node);
        let call_type = attr_call_type(receiver);

        self.compile_value(receiver)?;
        let receiver_slot = self.storage.grab_temp();
        self.code.set_local(receiver_slot)?;
        let mut arg_slots = Vec::with_capacity(args.len());
        for arg in args {
            self.compile_value(arg)?;
            let slot = self.storage.grab_temp();
            self.code.set_local(slot)?;
            arg_slots.push(slot);
        }
        let index_operands: Vec<Operand<'_, 's>> =
            arg_slots.iter().map(|slot| Operand::Temp(*slot)).collect();

        self.compile_invocation(
            site,
            "[]",
            call_type,
            Operand::Temp(receiver_slot),
            &index_operands,
            BlockSource::None,
        )?;
        self.compile_op_and_store(site, operator, value, |body, new_value| {
            let mut setter_operands = index_operands.clone();
            setter_operands.push(Operand::Temp(new_value));
            body.compile_invocation(
                site + 2,
                "[]=",
                call_type,
                Operand::Temp(receiver_slot),
                &setter_operands,
                BlockSource::None,
            )
        })?;

        for slot in arg_slots.into_iter().rev() {
            self.storage.release_temp(slot);
        }
        self.storage.release_temp(receiver_slot);
        Ok(())
    }

    /// With the current value on the stack, compute the new value and store it with `store`
    /// (which gets the slot holding the new value and must push one value). Leaves the result
    /// of the whole operator assignment.
    fn compile_op_and_store<F>(
        &mut self,
        site: usize,
        operator: &str,
        value: &Node<'s>,
        store: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut Self, u16) -> Result<(), Error>,
    {
        let short_circuit = match operator {
            "||" => Some(true),
            "&&" => Some(false),
            _ => None,
        };

        let done = self.code.fresh_label();
        match short_circuit {
            Some(skip_when_true) => {
                self.code.dup()?;
                self.code.invoke(RuntimeHelper::IsTrue)?;
                let test = if skip_when_true { Test::True } else { Test::False };
                self.code.branch_if(test, done)?;
                self.code.pop()?;
                self.compile_value(value)?;
            }
            None => {
                let old_slot = self.storage.grab_temp();
                self.code.set_local(old_slot)?;
                self.compile_invocation(
                    site + 1,
                    operator,
                    CallType::Normal,
                    Operand::Temp(old_slot),
                    &[Operand::Node(value)],
                    BlockSource::None,
                )?;
                self.storage.release_temp(old_slot);
            }
        }

        let new_slot = self.storage.grab_temp();
        self.code.set_local(new_slot)?;
        store(self, new_slot)?;
        self.code.pop()?;
        self.code.get_local(new_slot)?;
        self.storage.release_temp(new_slot);
        self.code.place_label(done)?;
        Ok(())
    }
}

/// Calls on an implicit or explicit `self` may reach private setters
fn attr_call_type(receiver: &Node<'_>) -> CallType {
    match receiver {
        Node::SelfRef => CallType::Functional,
        _ => CallType::Normal,
    }
}
