use crate::abi::{Bootstrap, RuntimeHelper};
use crate::vm::{MemberName, Signature};
use std::rc::Rc;

/// Constant which can be pushed with [`Instruction::Ldc`]
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<str>),
}

/// Target of a plain (statically linked) invocation
#[derive(Clone, Debug, PartialEq)]
pub enum Callee {
    /// Runtime service, provided by whoever loads the artifact
    Helper(RuntimeHelper),

    /// Another routine in the same artifact
    Routine(MemberName, Signature),
}

impl Callee {
    pub fn signature(&self) -> Signature {
        match self {
            Callee::Helper(helper) => helper.signature(),
            Callee::Routine(_, signature) => signature.clone(),
        }
    }
}

/// Dynamically linked call: the bootstrap gets resolved on first execution and the result is
/// bound to the call site from then on (until invalidated)
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicCall {
    pub bootstrap: Bootstrap,
    pub signature: Signature,
}

/// Straight-line instructions (anything that can't branch)
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,

    /// Marks the source line for the following instructions
    Line(u32),

    AConstNull,
    Ldc(Constant),
    Load(u16),
    Store(u16),

    Pop,
    Pop2,
    Dup,
    Dup2,
    DupX1,
    DupX2,
    Dup2X2,
    Swap,

    /// Allocate a host array of `null`s, length taken from the stack
    NewArray,
    ArrayLoad,
    ArrayStore,
    ArrayLength,

    /// Read a field of the artifact instance on the stack
    GetField(MemberName),

    /// Write a field of the artifact instance (instance then value on the stack)
    PutField(MemberName),

    Invoke(Callee),
    InvokeDynamic(DynamicCall),
}

impl Instruction {
    /// How many stack slots the instruction reads, and how many it leaves behind
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Instruction::Nop | Instruction::Line(_) => (0, 0),
            Instruction::AConstNull | Instruction::Ldc(_) | Instruction::Load(_) => (0, 1),
            Instruction::Store(_) | Instruction::Pop => (1, 0),
            Instruction::Pop2 => (2, 0),
            Instruction::Dup => (1, 2),
            Instruction::Dup2 => (2, 4),
            Instruction::DupX1 => (2, 3),
            Instruction::DupX2 => (3, 4),
            Instruction::Dup2X2 => (4, 6),
            Instruction::Swap => (2, 2),
            Instruction::NewArray | Instruction::ArrayLength | Instruction::GetField(_) => (1, 1),
            Instruction::ArrayLoad => (2, 1),
            Instruction::ArrayStore => (3, 0),
            Instruction::PutField(_) => (2, 0),
            Instruction::Invoke(callee) => {
                let signature = callee.signature();
                (
                    signature.parameter_count(),
                    signature.return_type.is_some() as usize,
                )
            }
            Instruction::InvokeDynamic(call) => (
                call.signature.parameter_count(),
                call.signature.return_type.is_some() as usize,
            ),
        }
    }

    /// Local slot touched by the instruction, if any
    pub fn local_slot(&self) -> Option<u16> {
        match self {
            Instruction::Load(slot) | Instruction::Store(slot) => Some(*slot),
            _ => None,
        }
    }
}

/// Comparison of two host integers
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OrdComparison {
    EQ,
    NE,
    LT,
    GE,
    GT,
    LE,
}

impl OrdComparison {
    pub fn holds(&self, lhs: i64, rhs: i64) -> bool {
        match self {
            OrdComparison::EQ => lhs == rhs,
            OrdComparison::NE => lhs != rhs,
            OrdComparison::LT => lhs < rhs,
            OrdComparison::GE => lhs >= rhs,
            OrdComparison::GT => lhs > rhs,
            OrdComparison::LE => lhs <= rhs,
        }
    }
}

/// Single-value test
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Test {
    /// Host boolean is `true`
    True,

    /// Host boolean is `false`
    False,

    /// Reference is `null`
    Null,

    /// Reference is not `null`
    NonNull,
}

/// Instructions that end a basic block
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum BranchInstruction<Lbl, LblNext> {
    If(Test, Lbl, LblNext),
    IfICmp(OrdComparison, Lbl, LblNext),
    Goto(Lbl),
    AReturn,
    Return,
    Throw,

    /// Synthetic marker used to end a block which just falls through to the next block
    FallThrough(LblNext),
}

impl<Lbl: Copy, LblNext: Copy> BranchInstruction<Lbl, LblNext> {
    /// If the instruction can fall through to the next block, get that next block
    pub fn fallthrough_target(&self) -> Option<LblNext> {
        match self {
            BranchInstruction::Goto(_)
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::Throw => None,

            BranchInstruction::If(_, _, lbl)
            | BranchInstruction::IfICmp(_, _, lbl)
            | BranchInstruction::FallThrough(lbl) => Some(*lbl),
        }
    }

    /// If the instruction can jump to another block (non-fallthrough), get that block
    pub fn jump_target(&self) -> Option<Lbl> {
        match self {
            BranchInstruction::If(_, lbl, _)
            | BranchInstruction::IfICmp(_, lbl, _)
            | BranchInstruction::Goto(lbl) => Some(*lbl),
            _ => None,
        }
    }

    /// How many stack slots are consumed by the branch
    pub fn stack_pops(&self) -> usize {
        match self {
            BranchInstruction::If(..) | BranchInstruction::AReturn | BranchInstruction::Throw => 1,
            BranchInstruction::IfICmp(..) => 2,
            BranchInstruction::Goto(_)
            | BranchInstruction::Return
            | BranchInstruction::FallThrough(_) => 0,
        }
    }

    pub fn map_labels<Lbl2, LblNext2>(
        &self,
        map_label: impl FnOnce(&Lbl) -> Lbl2,
        map_next_label: impl FnOnce(&LblNext) -> LblNext2,
    ) -> BranchInstruction<Lbl2, LblNext2> {
        use BranchInstruction::*;

        match self {
            If(test, lbl, next) => If(*test, map_label(lbl), map_next_label(next)),
            IfICmp(op, lbl, next) => IfICmp(*op, map_label(lbl), map_next_label(next)),
            Goto(lbl) => Goto(map_label(lbl)),
            AReturn => AReturn,
            Return => Return,
            Throw => Throw,
            FallThrough(next) => FallThrough(map_next_label(next)),
        }
    }
}
