//! Binding of method and closure parameters to variables

use super::BodyCompiler;
use crate::abi::{RuntimeHelper, ARGS, CONTEXT};
use crate::compiler::ir::{ArgsSpec, Node, Rest};
use crate::compiler::Error;
use crate::vm::{BranchInstruction, CodeBuilderExts, Instruction, OrdComparison};

impl<'c, 's> BodyCompiler<'c, 's> {
    /// Required arguments arrive one per slot (arity was checked by the caller)
    pub(super) fn bind_specific_args(&mut self, args: &ArgsSpec<'s>) -> Result<(), Error> {
        self.storage
            .begin_method(&mut self.code, &args.bound_variables())?;
        for (slot, index) in args.required.iter().enumerate() {
            self.code.get_local(ARGS + slot as u16)?;
            self.storage.assign(&mut self.code, *index, 0)?;
        }
        self.bind_block_arg(args.block)
    }

    /// Arguments arrive as one host array, checked against the arity here
    pub(super) fn bind_boxed_args(&mut self, args: &ArgsSpec<'s>) -> Result<(), Error> {
        let arity = args.arity();
        self.code.get_local(CONTEXT)?;
        self.code.get_local(ARGS)?;
        self.code.const_int(arity.required as i64)?;
        self.code.const_int(arity.max())?;
        self.code.invoke(RuntimeHelper::CheckArity)?;

        self.storage
            .begin_method(&mut self.code, &args.bound_variables())?;
        for (position, index) in args.required.iter().enumerate() {
            self.load_arg(position)?;
            self.storage.assign(&mut self.code, *index, 0)?;
        }

        for (offset, (index, default)) in args.optional.iter().enumerate() {
            let position = args.required.len() + offset;
            let use_default = self.code.fresh_label();
            let assign = self.code.fresh_label();

            self.code.get_local(ARGS)?;
            self.code.push_instruction(Instruction::ArrayLength)?;
            self.code.const_int(position as i64)?;
            self.code.push_branch_instruction(BranchInstruction::IfICmp(
                OrdComparison::LE,
                use_default,
                (),
            ))?;
            self.load_arg(position)?;
            self.code.goto(assign)?;
            self.code.place_label(use_default)?;
            self.compile_value(default)?;
            self.code.place_label(assign)?;
            self.storage.assign(&mut self.code, *index, 0)?;
        }

        if let Rest::Named(index) = args.rest {
            self.code.get_local(CONTEXT)?;
            self.code.get_local(ARGS)?;
            self.code
                .const_int((args.required.len() + args.optional.len()) as i64)?;
            self.code.invoke(RuntimeHelper::HostSubarray)?;
            self.storage.assign(&mut self.code, index, 0)?;
        }
        self.bind_block_arg(args.block)
    }

    /// Closure parameters are assignment targets, filled from the (normalized) yielded values
    pub(super) fn bind_block_params(
        &mut self,
        targets: &[Node<'s>],
        rest: Option<&Node<'s>>,
        block: Option<usize>,
    ) -> Result<(), Error> {
        let mut bound: Vec<usize> = targets
            .iter()
            .filter_map(|target| match target {
                Node::LocalAsgn {
                    index, depth: 0, ..
                } => Some(*index),
                _ => None,
            })
            .collect();
        bound.extend(block);
        self.storage.begin_closure(&mut self.code, &bound)?;

        if !targets.is_empty() || rest.is_some() {
            let values = self.storage.grab_temp();
            self.code.get_local(CONTEXT)?;
            self.code.get_local(ARGS)?;
            self.code.const_int(targets.len() as i64)?;
            self.code.const_bool(targets.len() > 1 || rest.is_some())?;
            self.code.invoke(RuntimeHelper::PrepareBlockArgs)?;
            self.code.set_local(values)?;

            for (position, target) in targets.iter().enumerate() {
                self.code.get_local(CONTEXT)?;
                self.code.get_local(values)?;
                self.code.const_int(position as i64)?;
                self.code.invoke(RuntimeHelper::HostEntryOrNil)?;
                self.assign_target(target)?;
            }
            match rest {
                None | Some(Node::AnonymousRest) => (),
                Some(rest) => {
                    self.code.get_local(CONTEXT)?;
                    self.code.get_local(values)?;
                    self.code.const_int(targets.len() as i64)?;
                    self.code.invoke(RuntimeHelper::HostSubarray)?;
                    self.assign_target(rest)?;
                }
            }
            self.storage.release_temp(values);
        }
        self.bind_block_arg(block)
    }

    /// Push the argument at `position` of the boxed arguments, or `nil`
    fn load_arg(&mut self, position: usize) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.get_local(ARGS)?;
        self.code.const_int(position as i64)?;
        self.code.invoke(RuntimeHelper::HostEntryOrNil)?;
        Ok(())
    }

    fn bind_block_arg(&mut self, block: Option<usize>) -> Result<(), Error> {
        if let Some(index) = block {
            self.code.get_local(CONTEXT)?;
            self.code.get_local(self.spec.layout.closure())?;
            self.code.invoke(RuntimeHelper::BlockToProc)?;
            self.storage.assign(&mut self.code, index, 0)?;
        }
        Ok(())
    }
}
