//! Conditionals, loops, jumps and exception regions

use super::{BodyCompiler, LoopLabels, Transfer};
use crate::abi::{CallType, CatchType, RuntimeHelper, CONTEXT};
use crate::compiler::ir::{Node, RescueClause, When};
use crate::compiler::script::Counter;
use crate::compiler::{AstInspector, Error};
use crate::vm::{CodeBuilderExts, Frame, Instruction, SynLabel, Test};

use super::invoke::{BlockSource, Operand};

/// Where an exception region gets compiled
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum RegionPlacement {
    Inline,

    /// In a routine of its own, sharing the body's heap scope
    Outline,
    Unsupported,
}

impl<'c, 's> BodyCompiler<'c, 's> {
    /// Decide where a rescue, ensure or `defined?` probe region goes
    pub(crate) fn region_placement(&self) -> RegionPlacement {
        let depth = self.depth();
        let heap_backed = self.storage.is_heap_backed();
        if heap_backed && (self.script.settings.outline_exception_regions || depth != 0) {
            RegionPlacement::Outline
        } else if depth == 0 {
            RegionPlacement::Inline
        } else {
            RegionPlacement::Unsupported
        }
    }

    /// Enter an inline region: jumps out of it must go through signals so that handlers run
    fn enter_region(&mut self) -> Option<LoopLabels> {
        self.region_depth += 1;
        self.loop_labels.take()
    }

    fn leave_region(&mut self, saved: Option<LoopLabels>) {
        self.region_depth -= 1;
        self.loop_labels = saved;
    }

    /// Push the host boolean truthiness of a node
    fn compile_condition(&mut self, cond: &Node<'s>) -> Result<(), Error> {
        self.compile_value(cond)?;
        self.code.invoke(RuntimeHelper::IsTrue)?;
        Ok(())
    }

    pub(super) fn compile_if(
        &mut self,
        cond: &Node<'s>,
        then_branch: Option<&Node<'s>>,
        else_branch: Option<&Node<'s>>,
    ) -> Result<(), Error> {
        match static_truthiness(cond) {
            Some(true) => return self.compile_opt(then_branch, true),
            Some(false) => return self.compile_opt(else_branch, true),
            None => (),
        }

        let else_label = self.code.fresh_label();
        let end_label = self.code.fresh_label();
        self.compile_condition(cond)?;
        self.code.branch_if(Test::False, else_label)?;
        self.compile_opt(then_branch, true)?;
        self.code.goto(end_label)?;
        self.code.place_label(else_label)?;
        self.compile_opt(else_branch, true)?;
        self.code.place_label(end_label)?;
        Ok(())
    }

    /// `and` (`when_true` continues to the right-hand side) and `or`
    pub(super) fn compile_short_circuit(
        &mut self,
        lhs: &Node<'s>,
        rhs: &Node<'s>,
        is_and: bool,
    ) -> Result<(), Error> {
        let end_label = self.code.fresh_label();
        self.compile_value(lhs)?;
        self.code.dup()?;
        self.code.invoke(RuntimeHelper::IsTrue)?;
        let skip = if is_and { Test::False } else { Test::True };
        self.code.branch_if(skip, end_label)?;
        self.code.pop()?;
        self.compile_value(rhs)?;
        self.code.place_label(end_label)?;
        Ok(())
    }

    pub(super) fn compile_not(&mut self, inner: &Node<'s>) -> Result<(), Error> {
        let false_label = self.code.fresh_label();
        let end_label = self.code.fresh_label();
        self.compile_condition(inner)?;
        self.code.branch_if(Test::True, false_label)?;
        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::GetTrue)?;
        self.code.goto(end_label)?;
        self.code.place_label(false_label)?;
        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::GetFalse)?;
        self.code.place_label(end_label)?;
        Ok(())
    }

    pub(super) fn compile_case(
        &mut self,
        subject: Option<&Node<'s>>,
        whens: &[When<'s>],
        else_branch: Option<&Node<'s>>,
    ) -> Result<(), Error> {
        let subject_slot = match subject {
            Some(subject) => {
                self.compile_value(subject)?;
                let slot = self.storage.grab_temp();
                self.code.set_local(slot)?;
                Some(slot)
            }
            None => None,
        };

        let end_label = self.code.fresh_label();
        for when in whens {
            let body_label = self.code.fresh_label();
            let next_label = self.code.fresh_label();
            for value in &when.values {
                match (value, subject_slot) {
                    (Node::Splat(values), subject) => {
                        self.code.get_local(CONTEXT)?;
                        self.compile_value(values)?;
                        match subject {
                            Some(slot) => self.code.get_local(slot)?,
                            None => self.code.const_null()?,
                        }
                        self.code.invoke(RuntimeHelper::WhenSplat)?;
                    }
                    (_, Some(slot)) => {
                        self.compile_invocation(
                            Self::site(value),
                            "===",
                            CallType::Normal,
                            Operand::Node(value),
                            &[Operand::Temp(slot)],
                            BlockSource::None,
                        )?;
                        self.code.invoke(RuntimeHelper::IsTrue)?;
                    }
                    (_, None) => self.compile_condition(value)?,
                }
                self.code.branch_if(Test::True, body_label)?;
            }
            self.code.goto(next_label)?;
            self.code.place_label(body_label)?;
            self.compile_opt(when.body.as_deref(), true)?;
            self.code.goto(end_label)?;
            self.code.place_label(next_label)?;
        }
        self.compile_opt(else_branch, true)?;
        self.code.place_label(end_label)?;

        if let Some(slot) = subject_slot {
            self.storage.release_temp(slot);
        }
        Ok(())
    }

    pub(super) fn compile_while(
        &mut self,
        cond: &Node<'s>,
        body: Option<&Node<'s>>,
        check_first: bool,
        until: bool,
        nonlocal_flow: bool,
    ) -> Result<(), Error> {
        let needs_regions = nonlocal_flow
            || body.map_or(false, |body| {
                AstInspector::inspect(&[body]).has_exception_regions()
            });
        let base = self.depth();

        // catching a signal clears the operand stack
        if needs_regions && base != 0 {
            if self.storage.is_heap_backed() {
                log::debug!("outlining loop entered with {} stack values", base);
                return self.outline("rescue_", Counter::Rescue, "__loop__", |body_compiler| {
                    body_compiler.compile_while(cond, body, check_first, until, nonlocal_flow)
                });
            }
            return Err(self.unsupported_storage("loop with non-local control flow"));
        }

        let top = self.code.fresh_label();
        let cond_check = self.code.fresh_label();
        let end_of_body = self.code.fresh_label();
        let done = self.code.fresh_label();
        let body_start = self.code.fresh_label();
        let body_end = self.code.fresh_label();

        if check_first {
            self.code.goto(cond_check)?;
        }
        self.code
            .place_label_with_frame(top, Frame { stack_depth: base })?;

        let saved = self.loop_labels.replace(LoopLabels {
            next: end_of_body,
            redo: top,
            brk: done,
            base,
        });
        self.code.place_marker(body_start)?;
        self.compile_opt(body, true)?;
        self.code.place_marker(body_end)?;
        self.loop_labels = saved;

        self.code.place_label(end_of_body)?;
        self.code.pop()?;
        self.code.place_label_with_frame(cond_check, Frame { stack_depth: base })?;
        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::PollThreadEvents)?;
        self.compile_condition(cond)?;
        let again = if until { Test::False } else { Test::True };
        self.code.branch_if(again, top)?;
        self.load_nil()?;
        self.code.goto(done)?;

        if needs_regions {
            let next_handler = self.code.fresh_label();
            let break_handler = self.code.fresh_label();
            let redo_handler = self.code.fresh_label();
            self.code
                .add_try_region(body_start, body_end, next_handler, CatchType::Next)?;
            self.code
                .add_try_region(body_start, body_end, break_handler, CatchType::Break)?;
            self.code
                .add_try_region(body_start, body_end, redo_handler, CatchType::Redo)?;

            self.code.place_label(next_handler)?;
            self.code.pop()?;
            self.code.goto(cond_check)?;

            self.code.place_label(break_handler)?;
            self.code.invoke(RuntimeHelper::SignalValue)?;
            self.code.goto(done)?;

            self.code.place_label(redo_handler)?;
            self.code.pop()?;
            self.code.goto(top)?;
        }

        self.code.place_label(done)?;
        Ok(())
    }

    pub(super) fn compile_break(&mut self, value: Option<&Node<'s>>) -> Result<(), Error> {
        match self.loop_labels {
            Some(labels) => {
                self.compile_opt(value, true)?;
                self.unwind_stack(labels.base, true)?;
                self.code.goto(labels.brk)?;
            }
            None => {
                self.code.get_local(CONTEXT)?;
                self.compile_opt(value, true)?;
                self.code.invoke(RuntimeHelper::BreakJump)?;
                self.code.throw()?;
            }
        }
        Ok(())
    }

    pub(super) fn compile_next(&mut self, value: Option<&Node<'s>>) -> Result<(), Error> {
        if let Some(labels) = self.loop_labels {
            self.compile_opt(value, true)?;
            self.unwind_stack(labels.base, true)?;
            self.code.goto(labels.next)?;
            return Ok(());
        }
        match self.next_transfer() {
            Transfer::Direct => {
                self.compile_opt(value, true)?;
                self.code.return_value()?;
            }
            Transfer::Signal => {
                self.code.get_local(CONTEXT)?;
                self.compile_opt(value, true)?;
                self.code.invoke(RuntimeHelper::NextJump)?;
                self.code.throw()?;
            }
        }
        Ok(())
    }

    pub(super) fn compile_redo(&mut self) -> Result<(), Error> {
        if let Some(labels) = self.loop_labels {
            self.unwind_stack(labels.base, false)?;
            self.code.goto(labels.redo)?;
            return Ok(());
        }
        match (self.next_transfer(), self.redo_label) {
            (Transfer::Direct, Some(redo_label)) => {
                self.unwind_stack(0, false)?;
                self.code.goto(redo_label)?;
            }
            _ => {
                self.code.get_local(CONTEXT)?;
                self.code.invoke(RuntimeHelper::RedoJump)?;
                self.code.throw()?;
            }
        }
        Ok(())
    }

    /// `retry` always goes through the rescue region's handler
    pub(super) fn compile_retry(&mut self) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::RetryJump)?;
        self.code.throw()?;
        Ok(())
    }

    pub(super) fn compile_return(&mut self, value: Option<&Node<'s>>) -> Result<(), Error> {
        match self.return_transfer() {
            Transfer::Direct => {
                self.compile_opt(value, true)?;
                self.code.return_value()?;
            }
            Transfer::Signal => {
                self.code.get_local(CONTEXT)?;
                self.compile_opt(value, true)?;
                self.code.invoke(RuntimeHelper::ReturnJump)?;
                self.code.throw()?;
            }
        }
        Ok(())
    }

    pub(super) fn compile_rescue(&mut self, node: &Node<'s>) -> Result<(), Error> {
        let (body, clauses, else_branch) = match node {
            Node::Rescue {
                body,
                clauses,
                else_branch,
            } => (body.as_deref(), clauses, else_branch.as_deref()),
            other => return Err(self.not_compilable(other.describe())),
        };
        match self.region_placement() {
            RegionPlacement::Outline => {
                self.outline("rescue_", Counter::Rescue, "__rescue__", |outlined| {
                    outlined.compile_rescue_inline(body, clauses, else_branch)
                })
            }
            RegionPlacement::Inline => self.compile_rescue_inline(body, clauses, else_branch),
            RegionPlacement::Unsupported => Err(self.unsupported_storage("rescue")),
        }
    }

    fn compile_rescue_inline(
        &mut self,
        body: Option<&Node<'s>>,
        clauses: &[RescueClause<'s>],
        else_branch: Option<&Node<'s>>,
    ) -> Result<(), Error> {
        let previous = self.storage.grab_temp();
        let exception = self.storage.grab_temp();

        let before_body = self.code.fresh_label();
        let body_start = self.code.fresh_label();
        let body_end = self.code.fresh_label();
        let clauses_start = self.code.fresh_label();
        let clauses_end = self.code.fresh_label();
        let flow_handler = self.code.fresh_label();
        let raise_handler = self.code.fresh_label();
        let retry_handler = self.code.fresh_label();
        let any_handler = self.code.fresh_label();
        let exit = self.code.fresh_label();

        self.code.get_local(CONTEXT)?;
        self.code.invoke(RuntimeHelper::GetErrorInfo)?;
        self.code.set_local(previous)?;
        self.code.place_label_with_frame(before_body, Frame::EMPTY)?;

        let saved = self.enter_region();
        self.code.place_marker(body_start)?;
        self.compile_opt(body, true)?;
        self.code.place_marker(body_end)?;
        self.leave_region(saved);
        if let Some(else_branch) = else_branch {
            self.code.pop()?;
            self.compile(else_branch, true)?;
        }
        self.code.goto(exit)?;

        self.code
            .add_try_region(body_start, body_end, flow_handler, CatchType::FlowControl)?;
        self.code
            .add_try_region(body_start, body_end, raise_handler, CatchType::Raise)?;

        // control transfers pass through, restoring `$!` on the way
        self.code.place_label(flow_handler)?;
        self.rethrow_restoring(exception, previous)?;

        self.code.place_label(raise_handler)?;
        self.code.set_local(exception)?;
        let saved = self.enter_region();
        self.code.place_marker(clauses_start)?;
        for clause in clauses {
            let next_clause = self.code.fresh_label();
            self.code.get_local(CONTEXT)?;
            self.code.get_local(exception)?;
            self.compile_exception_list(&clause.exceptions)?;
            self.code.invoke(RuntimeHelper::IsExceptionHandled)?;
            self.code.branch_if(Test::False, next_clause)?;
            self.code.get_local(exception)?;
            self.code.get_local(CONTEXT)?;
            self.code.invoke(RuntimeHelper::StoreExceptionInErrorInfo)?;
            self.compile_opt(clause.body.as_deref(), true)?;
            self.code.goto(exit)?;
            self.code.place_label(next_clause)?;
        }
        self.code.get_local(exception)?;
        self.code.throw()?;
        self.code.place_marker(clauses_end)?;
        self.leave_region(saved);

        self.code
            .add_try_region(clauses_start, clauses_end, retry_handler, CatchType::Retry)?;
        self.code
            .add_try_region(clauses_start, clauses_end, any_handler, CatchType::Any)?;

        self.code.place_label(retry_handler)?;
        self.code.pop()?;
        self.restore_error_info(previous)?;
        self.code.goto(before_body)?;

        self.code.place_label(any_handler)?;
        self.rethrow_restoring(exception, previous)?;

        self.code.place_label(exit)?;
        self.restore_error_info(previous)?;

        self.storage.release_temp(exception);
        self.storage.release_temp(previous);
        Ok(())
    }

    /// Push the host array of exception classes a rescue clause handles
    fn compile_exception_list(&mut self, exceptions: &[Node<'s>]) -> Result<(), Error> {
        if exceptions.is_empty() {
            self.code.const_int(1)?;
            self.code.push_instruction(Instruction::NewArray)?;
            self.code.dup()?;
            self.code.const_int(0)?;
            self.code.get_local(CONTEXT)?;
            self.code.invoke(RuntimeHelper::GetStandardError)?;
            self.code.push_instruction(Instruction::ArrayStore)?;
        } else if exceptions.iter().any(super::literals::is_splat) {
            self.code.get_local(CONTEXT)?;
            self.compile_array(exceptions)?;
            self.code.invoke(RuntimeHelper::ToHostArray)?;
        } else {
            self.compile_host_array(exceptions)?;
        }
        Ok(())
    }

    fn restore_error_info(&mut self, previous: u16) -> Result<(), Error> {
        self.code.get_local(CONTEXT)?;
        self.code.get_local(previous)?;
        self.code.invoke(RuntimeHelper::SetErrorInfo)?;
        Ok(())
    }

    /// In a handler: stash the signal, restore `$!` and throw the signal again
    fn rethrow_restoring(&mut self, exception: u16, previous: u16) -> Result<(), Error> {
        self.code.set_local(exception)?;
        self.restore_error_info(previous)?;
        self.code.get_local(exception)?;
        self.code.throw()?;
        Ok(())
    }

    pub(super) fn compile_ensure(&mut self, node: &Node<'s>) -> Result<(), Error> {
        let (body, ensure) = match node {
            Node::Ensure { body, ensure } => (body.as_deref(), ensure.as_deref()),
            other => return Err(self.not_compilable(other.describe())),
        };
        match self.region_placement() {
            RegionPlacement::Outline => {
                self.outline("ensure_", Counter::Ensure, "__ensure__", |outlined| {
                    outlined.compile_ensure_inline(body, ensure)
                })
            }
            RegionPlacement::Inline => self.compile_ensure_inline(body, ensure),
            RegionPlacement::Unsupported => Err(self.unsupported_storage("ensure")),
        }
    }

    fn compile_ensure_inline(
        &mut self,
        body: Option<&Node<'s>>,
        ensure: Option<&Node<'s>>,
    ) -> Result<(), Error> {
        let body_start = self.code.fresh_label();
        let body_end = self.code.fresh_label();
        let handler = self.code.fresh_label();
        let exit = self.code.fresh_label();
        let stash = self.storage.grab_temp();

        let saved = self.enter_region();
        self.code.place_marker(body_start)?;
        self.compile_opt(body, true)?;
        self.code.place_marker(body_end)?;
        self.leave_region(saved);

        // cleanup runs with an empty stack, so it may hold regions of its own
        self.code.set_local(stash)?;
        self.compile_opt(ensure, false)?;
        self.code.get_local(stash)?;
        self.code.goto(exit)?;

        self.code
            .add_try_region(body_start, body_end, handler, CatchType::Any)?;
        self.code.place_label(handler)?;
        self.code.set_local(stash)?;
        self.compile_opt(ensure, false)?;
        self.code.get_local(stash)?;
        self.code.throw()?;

        self.code.place_label(exit)?;
        self.storage.release_temp(stash);
        Ok(())
    }

    /// Mark the restart point of a closure body
    pub(crate) fn place_redo_label(&mut self) -> Result<SynLabel, Error> {
        let label = self.code.fresh_label();
        self.code.place_label_with_frame(label, Frame::EMPTY)?;
        self.redo_label = Some(label);
        Ok(label)
    }
}

/// Truthiness of conditions known at compile time
fn static_truthiness(cond: &Node<'_>) -> Option<bool> {
    match cond {
        Node::Nil | Node::False => Some(false),
        Node::True
        | Node::Fixnum(_)
        | Node::Float(_)
        | Node::Str(_)
        | Node::Symbol(_)
        | Node::ZArray => Some(true),
        _ => None,
    }
}
