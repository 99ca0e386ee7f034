use super::{BranchInstruction, Instruction};
use crate::abi::CatchType;

/// One executable operation of finished routine code
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Insn(Instruction),

    /// Branch whose jump target is an index into the routine's operations. Conditional branches
    /// fall through to the next operation.
    Branch(BranchInstruction<usize, ()>),
}

/// Exception table entry
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Handler {
    /// First covered operation
    pub start: usize,

    /// First operation after the covered range
    pub end: usize,

    /// Operation where the handler starts (with the caught signal as the only stack value)
    pub target: usize,

    /// Which signals are caught
    pub catch: CatchType,
}

/// Where a named variable of the source lives while a routine runs
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LocalHome {
    /// Local slot of the routine
    Slot(u16),

    /// Index into the heap scope of the routine's body
    Heap(usize),
}

/// Debug entry mapping a source variable name to its storage
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub home: LocalHome,
}

/// Finished routine code: a flat list of operations plus the exception table
///
/// Handlers are ordered: when a signal is thrown, the first handler whose range covers the
/// faulting operation and whose catch type matches wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Code {
    pub ops: Vec<Op>,
    pub handlers: Vec<Handler>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub locals: Vec<LocalVariable>,
}

impl Code {
    /// Find the handler for a signal thrown while executing `pc`
    pub fn find_handler(&self, pc: usize, matches: impl Fn(CatchType) -> bool) -> Option<&Handler> {
        self.handlers
            .iter()
            .find(|handler| handler.start <= pc && pc < handler.end && matches(handler.catch))
    }

    /// Storage of a named variable, according to the routine's debug entries
    pub fn local_home(&self, name: &str) -> Option<LocalHome> {
        self.locals
            .iter()
            .find(|local| local.name == name)
            .map(|local| local.home)
    }

    /// Straight-line instructions, skipping branches
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.ops.iter().filter_map(|op| match op {
            Op::Insn(insn) => Some(insn),
            Op::Branch(_) => None,
        })
    }
}
