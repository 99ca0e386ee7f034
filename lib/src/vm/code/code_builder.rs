use super::{
    BranchInstruction, Code, Handler, Instruction, LabelCounter, LocalHome, LocalVariable, Op,
    SynLabel,
};
use crate::abi::CatchType;
use crate::vm::{Error, Signature};
use std::collections::HashMap;

/// Largest number of operations a single routine may contain
pub const MAX_ROUTINE_OPS: usize = 65_535;

/// Operand stack state at the start of a block (or at a jump to it)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub stack_depth: usize,
}

impl Frame {
    pub const EMPTY: Frame = Frame { stack_depth: 0 };

    /// Frame at the start of an exception handler (just the caught signal)
    pub const HANDLER: Frame = Frame { stack_depth: 1 };
}

/// Try region awaiting resolution into a [`Handler`]
#[derive(Copy, Clone, Debug)]
struct TryRegion {
    start: SynLabel,
    end: SynLabel,
    handler: SynLabel,
    catch: CatchType,
}

/// Closed basic block
struct BasicBlock {
    label: SynLabel,
    frame: Frame,
    instructions: Vec<Instruction>,
    branch_end: BranchInstruction<SynLabel, SynLabel>,
}

/// This provides a slightly simplified interface for building up routine bodies. It does
/// internal bookeeping to track stack depths, labels, reachability, and try regions.
///
/// ### Stack depths
///
/// The machine doesn't require type-level verification, but every label must be reached with
/// the same operand stack depth from every jump and fall-through. Depths are computed right from
/// the start (no fixpoint iteration): the first reference to a label fixes its frame and every
/// later reference must agree.
///
/// ### Tracking reachability
///
/// Instructions pushed while there is no current block (eg. right after a `goto`) are dead and
/// silently dropped. Placing a label that was never jumped to while in dead code leaves the
/// builder in dead code.
///
/// ### Try regions
///
/// Region boundaries are markers rather than blocks, so they can be placed anywhere (including in
/// dead code). Handlers are kept in registration order, which is also their matching priority.
pub struct CodeBuilder {
    signature: Signature,

    /// Closed blocks, in layout order
    blocks: Vec<BasicBlock>,

    /// Entry frames of blocks that have been placed (current block included)
    placed_labels: HashMap<SynLabel, Frame>,

    /// Labels which have been referenced in blocks so far, but not placed yet
    unplaced_labels: HashMap<SynLabel, Frame>,

    /// Block currently under construction
    current_block: Option<CurrentBlock>,

    /// Position of placed markers: index of the enclosing block and offset into it
    markers: HashMap<SynLabel, (usize, usize)>,

    regions: Vec<TryRegion>,
    labels: LabelCounter,
    max_stack: usize,
    max_locals: u16,
    locals: Vec<LocalVariable>,
}

impl CodeBuilder {
    /// Create a builder for a new routine (parameters occupy the first local slots)
    pub fn new(signature: Signature) -> CodeBuilder {
        let start = SynLabel::ENTRY;
        let max_locals = signature.parameter_count() as u16;

        let mut placed_labels = HashMap::new();
        placed_labels.insert(start, Frame::EMPTY);

        CodeBuilder {
            signature,
            blocks: vec![],
            placed_labels,
            unplaced_labels: HashMap::new(),
            current_block: Some(CurrentBlock::new(start, Frame::EMPTY)),
            markers: HashMap::new(),
            regions: vec![],
            labels: LabelCounter::new(),
            max_stack: 0,
            max_locals,
            locals: vec![],
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> SynLabel {
        self.labels.fresh()
    }

    /// Current operand stack depth, or `None` if the current position is unreachable
    pub fn current_depth(&self) -> Option<usize> {
        self.current_block
            .as_ref()
            .map(|block| block.latest_frame.stack_depth)
    }

    /// Is the current position reachable?
    pub fn is_reachable(&self) -> bool {
        self.current_block.is_some()
    }

    /// Make sure the routine reserves local slots up to (and excluding) `slot`
    pub fn reserve_locals(&mut self, slot: u16) {
        self.max_locals = self.max_locals.max(slot);
    }

    /// Record where a named variable lives (a later entry for the same name replaces it)
    pub fn declare_local(&mut self, name: &str, home: LocalHome) {
        match self.locals.iter_mut().find(|local| local.name == name) {
            Some(local) => local.home = home,
            None => self.locals.push(LocalVariable {
                name: name.to_string(),
                home,
            }),
        }
    }

    /// Query the expected frame for a label that has already been referred to or placed
    pub fn lookup_frame(&self, label: SynLabel) -> Option<Frame> {
        self.placed_labels
            .get(&label)
            .or_else(|| self.unplaced_labels.get(&label))
            .copied()
    }

    /// Check that the label has a certain frame. If the frame is already being tracked, we
    /// assert that the frames match. Otherwise, we start tracking the frame.
    fn assert_frame_for_label(&mut self, label: SynLabel, expected: Frame) -> Result<(), Error> {
        match self.lookup_frame(label) {
            Some(found) if found != expected => {
                Err(Error::IncompatibleFrames(label, found, expected))
            }
            Some(_) => Ok(()),
            None => {
                let _ = self.unplaced_labels.insert(label, expected);
                Ok(())
            }
        }
    }

    /// Push a new instruction to the current block
    pub fn push_instruction(&mut self, insn: Instruction) -> Result<(), Error> {
        if let Some(current_block) = self.current_block.as_mut() {
            let (pops, pushes) = insn.stack_effect();
            let depth = current_block.latest_frame.stack_depth;
            if depth < pops {
                return Err(Error::StackUnderflow {
                    instruction: format!("{:?}", insn),
                    depth,
                });
            }
            current_block.latest_frame.stack_depth = depth - pops + pushes;
            self.max_stack = self.max_stack.max(depth + pushes);
            if let Some(slot) = insn.local_slot() {
                self.max_locals = self.max_locals.max(slot + 1);
            }
            current_block.instructions.push(insn);
        }
        Ok(())
    }

    /// Push a new branch instruction to close the current block and possibly open a new one
    pub fn push_branch_instruction(
        &mut self,
        insn: BranchInstruction<SynLabel, ()>,
    ) -> Result<(), Error> {
        if let Some(current_block) = self.current_block.take() {
            let depth = current_block.latest_frame.stack_depth;
            let pops = insn.stack_pops();
            if depth < pops {
                return Err(Error::StackUnderflow {
                    instruction: format!("{:?}", insn),
                    depth,
                });
            }
            let returns_value = self.signature.return_type.is_some();
            if matches!(
                (&insn, returns_value),
                (BranchInstruction::AReturn, false) | (BranchInstruction::Return, true)
            ) {
                return Err(Error::InvalidReturn {
                    instruction: format!("{:?}", insn),
                    signature: self.signature.clone(),
                });
            }

            let after = Frame {
                stack_depth: depth - pops,
            };
            if let Some(jump_label) = insn.jump_target() {
                self.assert_frame_for_label(jump_label, after)?;
            }

            let next_label = self.fresh_label();
            let branch_end = insn.map_labels(|lbl| *lbl, |()| next_label);
            let next_block = current_block.close(branch_end, after, &mut self.blocks);
            if let Some(next) = &next_block {
                self.placed_labels.insert(next.label, next.entry_frame);
            }
            self.current_block = next_block;
        }
        Ok(())
    }

    /// Start a new block with the given label, ending the current block (if there is one) with a
    /// fallthrough. This can fail if:
    ///
    ///   * the label was already placed
    ///   * the label was already jumped to from elsewhere, and the frames don't match
    ///
    pub fn place_label(&mut self, label: SynLabel) -> Result<(), Error> {
        if self.placed_labels.contains_key(&label) {
            return Err(Error::DuplicateLabel(label));
        }

        if let Some(current_block) = self.current_block.take() {
            let frame = current_block.latest_frame;
            self.assert_frame_for_label(label, frame)?;
            let _ = self.unplaced_labels.remove(&label);
            current_block.close(BranchInstruction::FallThrough(label), frame, &mut self.blocks);
            self.placed_labels.insert(label, frame);
            self.current_block = Some(CurrentBlock::new(label, frame));
        } else if let Some(frame) = self.unplaced_labels.remove(&label) {
            self.placed_labels.insert(label, frame);
            self.current_block = Some(CurrentBlock::new(label, frame));
        } else {
            log::trace!("label {:?} placed in unreachable code", label);
        }

        Ok(())
    }

    /// Like `place_label`, but specifies an explicit frame. This makes it possible to place a
    /// label that is only jumped to backwards (eg. the top of a loop) after dead code.
    pub fn place_label_with_frame(&mut self, label: SynLabel, frame: Frame) -> Result<(), Error> {
        self.assert_frame_for_label(label, frame)?;
        self.place_label(label)
    }

    /// Record the current position under a label, without starting a new block
    pub fn place_marker(&mut self, marker: SynLabel) -> Result<(), Error> {
        let position = match &self.current_block {
            Some(block) => (self.blocks.len(), block.instructions.len()),
            None => (self.blocks.len(), 0),
        };
        if self.markers.insert(marker, position).is_some() {
            return Err(Error::DuplicateLabel(marker));
        }
        Ok(())
    }

    /// Register a try region between two markers, handled at `handler`
    ///
    /// The handler label will be entered with just the caught signal on the stack.
    pub fn add_try_region(
        &mut self,
        start: SynLabel,
        end: SynLabel,
        handler: SynLabel,
        catch: CatchType,
    ) -> Result<(), Error> {
        self.assert_frame_for_label(handler, Frame::HANDLER)?;
        self.regions.push(TryRegion {
            start,
            end,
            handler,
            catch,
        });
        Ok(())
    }

    /// Turn the builder into the finished routine code
    pub fn result(self) -> Result<Code, Error> {
        if self.current_block.is_some() || !self.unplaced_labels.is_empty() {
            return Err(Error::MethodCodeNotFinished {
                pending_block: self.current_block.as_ref().map(|block| block.label),
                unplaced_labels: self.unplaced_labels.keys().cloned().collect(),
            });
        }

        // Offsets of every block (plus one for the end of the code)
        let mut block_starts = Vec::with_capacity(self.blocks.len() + 1);
        let mut block_index: HashMap<SynLabel, usize> = HashMap::new();
        let mut offset = 0;
        for (idx, block) in self.blocks.iter().enumerate() {
            block_starts.push(offset);
            block_index.insert(block.label, idx);
            offset += block.instructions.len();
            if !matches!(block.branch_end, BranchInstruction::FallThrough(_)) {
                offset += 1;
            }
        }
        block_starts.push(offset);

        if offset > MAX_ROUTINE_OPS {
            return Err(Error::RoutineTooLarge(offset));
        }

        let label_offset = |label: SynLabel| -> Result<usize, Error> {
            block_index
                .get(&label)
                .map(|idx| block_starts[*idx])
                .ok_or(Error::MethodCodeNotFinished {
                    pending_block: None,
                    unplaced_labels: vec![label],
                })
        };
        let marker_offset = |marker: SynLabel| -> Result<usize, Error> {
            let (idx, within) = self
                .markers
                .get(&marker)
                .copied()
                .ok_or(Error::UnplacedMarker(marker))?;
            Ok(block_starts[idx] + within)
        };

        let mut handlers = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            handlers.push(Handler {
                start: marker_offset(region.start)?,
                end: marker_offset(region.end)?,
                target: label_offset(region.handler)?,
                catch: region.catch,
            });
        }

        let mut ops = Vec::with_capacity(offset);
        for block in self.blocks {
            ops.extend(block.instructions.into_iter().map(Op::Insn));
            let branch = match block.branch_end {
                BranchInstruction::FallThrough(_) => continue,
                BranchInstruction::Goto(lbl) => BranchInstruction::Goto(label_offset(lbl)?),
                BranchInstruction::If(test, lbl, _) => {
                    BranchInstruction::If(test, label_offset(lbl)?, ())
                }
                BranchInstruction::IfICmp(op, lbl, _) => {
                    BranchInstruction::IfICmp(op, label_offset(lbl)?, ())
                }
                BranchInstruction::AReturn => BranchInstruction::AReturn,
                BranchInstruction::Return => BranchInstruction::Return,
                BranchInstruction::Throw => BranchInstruction::Throw,
            };
            ops.push(Op::Branch(branch));
        }

        Ok(Code {
            ops,
            handlers,
            max_stack: self.max_stack.min(u16::MAX as usize) as u16,
            max_locals: self.max_locals,
            locals: self.locals,
        })
    }
}

/// Just like `BasicBlock`, but not closed off yet
struct CurrentBlock {
    label: SynLabel,

    /// State of the frame at the start of `instructions`
    entry_frame: Frame,

    /// Tracks the state of the frame at the end of `instructions`
    latest_frame: Frame,

    instructions: Vec<Instruction>,
}

impl CurrentBlock {
    fn new(label: SynLabel, entry_frame: Frame) -> CurrentBlock {
        CurrentBlock {
            label,
            entry_frame,
            latest_frame: entry_frame,
            instructions: vec![],
        }
    }

    /// Seal the current block, returning the block that follows it by fall-through (if any)
    fn close(
        self,
        branch_end: BranchInstruction<SynLabel, SynLabel>,
        after: Frame,
        blocks: &mut Vec<BasicBlock>,
    ) -> Option<CurrentBlock> {
        let fallthrough = match branch_end {
            BranchInstruction::FallThrough(_) => None,
            _ => branch_end.fallthrough_target(),
        };
        blocks.push(BasicBlock {
            label: self.label,
            frame: self.entry_frame,
            instructions: self.instructions,
            branch_end,
        });
        fallthrough.map(|label| CurrentBlock::new(label, after))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::code::{Constant, Test};
    use crate::vm::SlotType;

    fn builder() -> CodeBuilder {
        CodeBuilder::new(Signature::new(
            vec![SlotType::Artifact, SlotType::Context],
            Some(SlotType::Object),
        ))
    }

    #[test]
    fn straight_line_and_branches() -> Result<(), Error> {
        let mut code = builder();
        let else_lbl = code.fresh_label();
        let end_lbl = code.fresh_label();

        code.push_instruction(Instruction::Ldc(Constant::Bool(true)))?;
        code.push_branch_instruction(BranchInstruction::If(Test::False, else_lbl, ()))?;
        code.push_instruction(Instruction::Load(1))?;
        code.push_branch_instruction(BranchInstruction::Goto(end_lbl))?;
        code.push_instruction(Instruction::Pop)?; // dead, dropped
        code.place_label(else_lbl)?;
        code.push_instruction(Instruction::AConstNull)?;
        code.place_label(end_lbl)?;
        code.push_branch_instruction(BranchInstruction::AReturn)?;

        let code = code.result()?;
        assert_eq!(code.ops.len(), 6);
        assert_eq!(code.ops[1], Op::Branch(BranchInstruction::If(Test::False, 4, ())));
        assert_eq!(code.ops[3], Op::Branch(BranchInstruction::Goto(5)));
        assert_eq!(code.max_stack, 1);
        Ok(())
    }

    #[test]
    fn mismatched_depths_are_rejected() -> Result<(), Error> {
        let mut code = builder();
        let lbl = code.fresh_label();
        code.push_instruction(Instruction::AConstNull)?;
        code.push_branch_instruction(BranchInstruction::If(Test::Null, lbl, ()))?;
        code.push_instruction(Instruction::AConstNull)?;
        assert!(matches!(
            code.place_label(lbl),
            Err(Error::IncompatibleFrames(_, _, _))
        ));
        Ok(())
    }

    #[test]
    fn try_regions_resolve_markers() -> Result<(), Error> {
        let mut code = builder();
        let start = code.fresh_label();
        let end = code.fresh_label();
        let handler = code.fresh_label();
        let done = code.fresh_label();

        code.place_marker(start)?;
        code.push_instruction(Instruction::AConstNull)?;
        code.place_marker(end)?;
        code.push_branch_instruction(BranchInstruction::Goto(done))?;
        code.add_try_region(start, end, handler, CatchType::Any)?;
        code.place_label(handler)?;
        code.push_instruction(Instruction::Pop)?;
        code.push_instruction(Instruction::AConstNull)?;
        code.place_label(done)?;
        code.push_branch_instruction(BranchInstruction::AReturn)?;

        let code = code.result()?;
        assert_eq!(
            code.handlers,
            vec![Handler {
                start: 0,
                end: 1,
                target: 2,
                catch: CatchType::Any
            }]
        );
        Ok(())
    }

    #[test]
    fn unfinished_code() {
        let code = builder();
        assert!(matches!(
            code.result(),
            Err(Error::MethodCodeNotFinished { .. })
        ));
    }
}
