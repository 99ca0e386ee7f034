use super::{
    BranchInstruction, Callee, CodeBuilder, Constant, DynamicCall, Instruction, SynLabel, Test,
};
use crate::abi::{Bootstrap, RuntimeHelper};
use crate::vm::{Error, MemberName, Signature};
use std::rc::Rc;

pub trait CodeBuilderExts {
    /// Push an integer constant onto the stack
    fn const_int(&mut self, integer: i64) -> Result<(), Error>;

    /// Push a boolean constant onto the stack
    fn const_bool(&mut self, boolean: bool) -> Result<(), Error>;

    /// Push a float constant onto the stack
    fn const_float(&mut self, float: f64) -> Result<(), Error>;

    /// Push a constant string to the stack
    fn const_string(&mut self, string: impl Into<Rc<str>>) -> Result<(), Error>;

    /// Push `null` onto the stack
    fn const_null(&mut self) -> Result<(), Error>;

    /// Get a local at a particular slot
    fn get_local(&mut self, slot: u16) -> Result<(), Error>;

    /// Set a local at a particular slot
    fn set_local(&mut self, slot: u16) -> Result<(), Error>;

    fn dup(&mut self) -> Result<(), Error>;
    fn pop(&mut self) -> Result<(), Error>;
    fn swap(&mut self) -> Result<(), Error>;

    /// Call a runtime helper
    fn invoke(&mut self, helper: RuntimeHelper) -> Result<(), Error>;

    /// Call a routine of the artifact being generated
    fn invoke_routine(&mut self, name: MemberName, signature: Signature) -> Result<(), Error>;

    /// Emit a dynamically linked call site
    fn invoke_dynamic(&mut self, bootstrap: Bootstrap, signature: Signature) -> Result<(), Error>;

    /// Unconditional jump
    fn goto(&mut self, label: SynLabel) -> Result<(), Error>;

    /// Conditional jump
    fn branch_if(&mut self, test: Test, label: SynLabel) -> Result<(), Error>;

    /// Return the value on top of the stack
    fn return_value(&mut self) -> Result<(), Error>;

    /// Throw the signal on top of the stack
    fn throw(&mut self) -> Result<(), Error>;
}

impl CodeBuilderExts for CodeBuilder {
    fn const_int(&mut self, integer: i64) -> Result<(), Error> {
        self.push_instruction(Instruction::Ldc(Constant::Int(integer)))
    }

    fn const_bool(&mut self, boolean: bool) -> Result<(), Error> {
        self.push_instruction(Instruction::Ldc(Constant::Bool(boolean)))
    }

    fn const_float(&mut self, float: f64) -> Result<(), Error> {
        self.push_instruction(Instruction::Ldc(Constant::Float(float)))
    }

    fn const_string(&mut self, string: impl Into<Rc<str>>) -> Result<(), Error> {
        self.push_instruction(Instruction::Ldc(Constant::Str(string.into())))
    }

    fn const_null(&mut self) -> Result<(), Error> {
        self.push_instruction(Instruction::AConstNull)
    }

    fn get_local(&mut self, slot: u16) -> Result<(), Error> {
        self.push_instruction(Instruction::Load(slot))
    }

    fn set_local(&mut self, slot: u16) -> Result<(), Error> {
        self.push_instruction(Instruction::Store(slot))
    }

    fn dup(&mut self) -> Result<(), Error> {
        self.push_instruction(Instruction::Dup)
    }

    fn pop(&mut self) -> Result<(), Error> {
        self.push_instruction(Instruction::Pop)
    }

    fn swap(&mut self) -> Result<(), Error> {
        self.push_instruction(Instruction::Swap)
    }

    fn invoke(&mut self, helper: RuntimeHelper) -> Result<(), Error> {
        self.push_instruction(Instruction::Invoke(Callee::Helper(helper)))
    }

    fn invoke_routine(&mut self, name: MemberName, signature: Signature) -> Result<(), Error> {
        self.push_instruction(Instruction::Invoke(Callee::Routine(name, signature)))
    }

    fn invoke_dynamic(&mut self, bootstrap: Bootstrap, signature: Signature) -> Result<(), Error> {
        self.push_instruction(Instruction::InvokeDynamic(DynamicCall {
            bootstrap,
            signature,
        }))
    }

    fn goto(&mut self, label: SynLabel) -> Result<(), Error> {
        self.push_branch_instruction(BranchInstruction::Goto(label))
    }

    fn branch_if(&mut self, test: Test, label: SynLabel) -> Result<(), Error> {
        self.push_branch_instruction(BranchInstruction::If(test, label, ()))
    }

    fn return_value(&mut self) -> Result<(), Error> {
        self.push_branch_instruction(BranchInstruction::AReturn)
    }

    fn throw(&mut self) -> Result<(), Error> {
        self.push_branch_instruction(BranchInstruction::Throw)
    }
}
