use super::instance::Link;
use super::{BlockBody, CallSite, Error, Instance, RString, Runtime, Slot, Unwind, Value};
use crate::abi::{Bootstrap, CatchType, Descriptor, ScopeDescriptor};
use crate::vm::{BranchInstruction, Callee, Constant, DynamicCall, Instruction, Name, Op, Test};
use std::rc::Rc;

enum Flow {
    Next,
    Jump(usize),
    Return(Slot),
}

/// Does an exception-table entry catch this signal?
///
/// Breaks are only caught by loops of the frame the break was raised for. Host faults are never
/// caught.
fn catches(catch: CatchType, unwind: &Unwind, running_block: Option<usize>) -> bool {
    match (catch, unwind) {
        (_, Unwind::Fault(_)) => false,
        (CatchType::Any, _) => true,
        (CatchType::Raise, Unwind::Raise(_)) => true,
        (CatchType::FlowControl, Unwind::Raise(_)) => false,
        (CatchType::FlowControl, _) => true,
        (CatchType::Break, Unwind::Break { tag, .. }) => *tag == running_block,
        (CatchType::Next, Unwind::Next(_))
        | (CatchType::Redo, Unwind::Redo)
        | (CatchType::Retry, Unwind::Retry)
        | (CatchType::Return, Unwind::Return { .. }) => true,
        _ => false,
    }
}

fn pop(stack: &mut Vec<Slot>, routine: &str) -> Result<Slot, Error> {
    stack
        .pop()
        .ok_or_else(|| Error::StackUnderflow(routine.to_string()))
}

fn pop_n(stack: &mut Vec<Slot>, count: usize, routine: &str) -> Result<Vec<Slot>, Error> {
    if stack.len() < count {
        return Err(Error::StackUnderflow(routine.to_string()));
    }
    Ok(stack.split_off(stack.len() - count))
}

fn host_index(slot: Slot) -> Result<usize, Error> {
    let index = slot.into_int()?;
    usize::try_from(index).map_err(|_| Error::SlotMismatch {
        expected: "array index",
        found: index.to_string(),
    })
}

impl Runtime {
    /// Run one routine of an instance to completion
    pub(crate) fn execute(
        &mut self,
        instance: &Rc<Instance>,
        routine: usize,
        args: Vec<Slot>,
    ) -> Result<Slot, Unwind> {
        let definition = instance
            .artifact()
            .routines()
            .get(routine)
            .ok_or_else(|| Error::MissingRoutine(format!("#{}", routine)))?;
        let name = definition.name.as_str();
        let code = &definition.code;
        log::trace!("entering {}", name);

        let mut locals = args;
        let local_count = locals.len().max(code.max_locals as usize);
        locals.resize(local_count, Slot::Null);
        let mut stack: Vec<Slot> = Vec::with_capacity(code.max_stack as usize);

        let mut pc = 0;
        loop {
            let op = code
                .ops
                .get(pc)
                .ok_or_else(|| Error::FellOffEnd(name.to_string()))?;
            let flow = match op {
                Op::Insn(insn) => self
                    .step(instance, routine, pc, name, insn, &mut stack, &mut locals)
                    .map(|()| Flow::Next),
                Op::Branch(branch) => Self::branch(branch, name, &mut stack),
            };
            match flow {
                Ok(Flow::Next) => pc += 1,
                Ok(Flow::Jump(target)) => pc = target,
                Ok(Flow::Return(slot)) => return Ok(slot),
                Err(unwind) => {
                    let running_block = self.frames.last().and_then(|frame| frame.running_block);
                    match code.find_handler(pc, |catch| catches(catch, &unwind, running_block)) {
                        Some(handler) => {
                            log::trace!("{}: {} caught at {} -> {}", name, unwind, pc, handler.target);
                            stack.clear();
                            stack.push(Slot::Signal(unwind));
                            pc = handler.target;
                        }
                        None => return Err(unwind),
                    }
                }
            }
        }
    }

    fn branch(
        branch: &BranchInstruction<usize, ()>,
        name: &str,
        stack: &mut Vec<Slot>,
    ) -> Result<Flow, Unwind> {
        let jump_if = |condition: bool, target: usize| {
            if condition {
                Flow::Jump(target)
            } else {
                Flow::Next
            }
        };
        Ok(match branch {
            BranchInstruction::If(test, target, ()) => {
                let slot = pop(stack, name)?;
                let holds = match (test, slot) {
                    (Test::Null, slot) => matches!(slot, Slot::Null),
                    (Test::NonNull, slot) => !matches!(slot, Slot::Null),
                    (Test::True, Slot::Bool(value)) => value,
                    (Test::False, Slot::Bool(value)) => !value,
                    (_, other) => return Err(other.mismatch("bool").into()),
                };
                jump_if(holds, *target)
            }
            BranchInstruction::IfICmp(comparison, target, ()) => {
                let rhs = pop(stack, name)?.into_int()?;
                let lhs = pop(stack, name)?.into_int()?;
                jump_if(comparison.holds(lhs, rhs), *target)
            }
            BranchInstruction::Goto(target) => Flow::Jump(*target),
            BranchInstruction::AReturn => Flow::Return(pop(stack, name)?),
            BranchInstruction::Return => Flow::Return(Slot::Null),
            BranchInstruction::Throw => match pop(stack, name)? {
                Slot::Signal(unwind) => return Err(unwind),
                Slot::Value(exception) => return Err(Unwind::Raise(exception)),
                other => return Err(other.mismatch("signal").into()),
            },
            BranchInstruction::FallThrough(()) => Flow::Next,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &mut self,
        instance: &Rc<Instance>,
        routine: usize,
        pc: usize,
        name: &str,
        insn: &Instruction,
        stack: &mut Vec<Slot>,
        locals: &mut [Slot],
    ) -> Result<(), Unwind> {
        match insn {
            Instruction::Nop | Instruction::Line(_) => (),
            Instruction::AConstNull => stack.push(Slot::Null),
            Instruction::Ldc(constant) => stack.push(match constant {
                Constant::Int(value) => Slot::Int(*value),
                Constant::Float(value) => Slot::Float(*value),
                Constant::Bool(value) => Slot::Bool(*value),
                Constant::Str(value) => Slot::Str(value.clone()),
            }),
            Instruction::Load(slot) => {
                let value = locals
                    .get(*slot as usize)
                    .cloned()
                    .ok_or_else(|| Error::StackUnderflow(format!("{} local {}", name, slot)))?;
                stack.push(value);
            }
            Instruction::Store(slot) => {
                let value = pop(stack, name)?;
                let local = locals
                    .get_mut(*slot as usize)
                    .ok_or_else(|| Error::StackUnderflow(format!("{} local {}", name, slot)))?;
                *local = value;
            }

            Instruction::Pop => {
                pop(stack, name)?;
            }
            Instruction::Pop2 => {
                pop_n(stack, 2, name)?;
            }
            Instruction::Dup => {
                let top = pop(stack, name)?;
                stack.push(top.clone());
                stack.push(top);
            }
            Instruction::Dup2 => {
                let top = pop_n(stack, 2, name)?;
                stack.extend(top.iter().cloned());
                stack.extend(top);
            }
            Instruction::DupX1 => {
                let b = pop(stack, name)?;
                let a = pop(stack, name)?;
                stack.extend([b.clone(), a, b]);
            }
            Instruction::DupX2 => {
                let c = pop(stack, name)?;
                let ab = pop_n(stack, 2, name)?;
                stack.push(c.clone());
                stack.extend(ab);
                stack.push(c);
            }
            Instruction::Dup2X2 => {
                let cd = pop_n(stack, 2, name)?;
                let ab = pop_n(stack, 2, name)?;
                stack.extend(cd.iter().cloned());
                stack.extend(ab);
                stack.extend(cd);
            }
            Instruction::Swap => {
                let b = pop(stack, name)?;
                let a = pop(stack, name)?;
                stack.push(b);
                stack.push(a);
            }

            Instruction::NewArray => {
                let length = host_index(pop(stack, name)?)?;
                stack.push(Slot::objects(vec![Value::Nil; length]));
            }
            Instruction::ArrayLoad => {
                let index = host_index(pop(stack, name)?)?;
                let array = pop(stack, name)?.into_objects()?;
                let value = array.borrow().get(index).cloned().ok_or_else(|| {
                    Error::SlotMismatch {
                        expected: "index in bounds",
                        found: index.to_string(),
                    }
                })?;
                stack.push(Slot::Value(value));
            }
            Instruction::ArrayStore => {
                let value = match pop(stack, name)? {
                    Slot::Null => Value::Nil,
                    other => other.into_value()?,
                };
                let index = host_index(pop(stack, name)?)?;
                let array = pop(stack, name)?.into_objects()?;
                let mut array = array.borrow_mut();
                if index >= array.len() {
                    array.resize(index + 1, Value::Nil);
                }
                array[index] = value;
            }
            Instruction::ArrayLength => {
                let array = pop(stack, name)?.into_objects()?;
                let length = array.borrow().len();
                stack.push(Slot::Int(length as i64));
            }

            Instruction::GetField(field) => {
                let target = pop(stack, name)?.into_instance()?;
                stack.push(target.get_field(field)?);
            }
            Instruction::PutField(field) => {
                let value = pop(stack, name)?;
                let target = pop(stack, name)?.into_instance()?;
                target.put_field(field, value)?;
            }

            Instruction::Invoke(callee) => {
                let signature = callee.signature();
                let args = pop_n(stack, signature.parameter_count(), name)?;
                let result = match callee {
                    Callee::Helper(helper) => self.call_helper(*helper, args)?,
                    Callee::Routine(target, _) => {
                        let index = instance.routine_index(target)?;
                        Some(self.execute(instance, index, args)?)
                    }
                };
                if signature.return_type.is_some() {
                    stack.push(result.unwrap_or(Slot::Null));
                }
            }
            Instruction::InvokeDynamic(call) => {
                pop_n(stack, call.signature.parameter_count(), name)?;
                let target = self.linked_target(instance, (routine, pc), call)?;
                if call.signature.return_type.is_some() {
                    stack.push(target);
                }
            }
        }
        Ok(())
    }

    /// Value bound to a dynamically linked site, (re)linking it when needed
    fn linked_target(
        &mut self,
        instance: &Rc<Instance>,
        site: (usize, usize),
        call: &DynamicCall,
    ) -> Result<Slot, Unwind> {
        if let Some(link) = instance.link(site) {
            let valid = match &link.guard {
                Some((name, version)) => self.constant_version(name) == *version,
                None => true,
            };
            if valid {
                return Ok(link.target);
            }
            log::trace!("site {:?} invalidated, relinking", site);
        }
        let link = self.bootstrap(instance, &call.bootstrap)?;
        let target = link.target.clone();
        instance.bind(site, link);
        Ok(target)
    }

    fn bootstrap(&mut self, instance: &Rc<Instance>, bootstrap: &Bootstrap) -> Result<Link, Unwind> {
        let unguarded = |target: Slot| Link {
            target,
            guard: None,
        };
        Ok(match bootstrap {
            Bootstrap::Fixnum(value) => unguarded(Slot::Value(Value::Fixnum(*value))),
            Bootstrap::Float(value) => unguarded(Slot::Value(Value::Float(*value))),
            Bootstrap::Bignum(digits) => unguarded(Slot::Value(Runtime::parse_bignum(digits))),
            Bootstrap::Symbol(name) => unguarded(Slot::Value(Value::symbol(name))),
            Bootstrap::Str(value) => unguarded(Slot::Value(Value::Str(Rc::new(RString::frozen(
                value.clone(),
            ))))),
            Bootstrap::Regexp { pattern, options } => {
                unguarded(Slot::Value(Runtime::new_regexp(pattern, *options)))
            }
            Bootstrap::Constant(name) => {
                let version = self.constant_version(name);
                let value = self.constant_or_raise(name)?;
                Link {
                    target: Slot::Value(value),
                    guard: Some((Rc::from(name.as_str()), version)),
                }
            }
            Bootstrap::CallSite { name, call_type } => {
                unguarded(Slot::CallSite(Rc::new(CallSite::new(name, *call_type))))
            }
            Bootstrap::StaticScope(encoded) => unguarded(Slot::StaticScope(Rc::new(
                Runtime::decode_scope(encoded)?,
            ))),
            Bootstrap::BlockBody(index) => {
                unguarded(Slot::BlockBody(Runtime::new_block_body(instance, *index)?))
            }
        })
    }

    pub(crate) fn decode_scope(encoded: &str) -> Result<ScopeDescriptor, Error> {
        ScopeDescriptor::decode(encoded).ok_or_else(|| Error::MalformedStaticScope(encoded.to_string()))
    }

    pub(crate) fn new_block_body(instance: &Rc<Instance>, index: usize) -> Result<Rc<BlockBody>, Error> {
        let descriptor = match instance.artifact().descriptor(index) {
            Some(Descriptor::Block(descriptor)) => descriptor.clone(),
            _ => return Err(Error::MissingDescriptor(index)),
        };
        let routine = instance.routine_index(&descriptor.routine)?;
        Ok(Rc::new(BlockBody {
            instance: instance.clone(),
            scope: Rc::new(descriptor.scope.clone()),
            descriptor,
            routine,
        }))
    }

    /// Integer from a decimal literal too large for the compiler to keep as a fixnum
    ///
    /// There are no arbitrary precision integers here: values beyond 64 bits become floats.
    pub(crate) fn parse_bignum(digits: &str) -> Value {
        let digits: String = digits.chars().filter(|c| *c != '_').collect();
        match digits.parse::<i64>() {
            Ok(value) => Value::Fixnum(value),
            Err(_) => Value::Float(digits.parse::<f64>().unwrap_or(f64::NAN)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn catch_types() {
        let raise = Unwind::Raise(Value::Nil);
        let brk = Unwind::Break {
            tag: Some(3),
            value: Value::Nil,
        };
        assert!(catches(CatchType::Any, &raise, None));
        assert!(catches(CatchType::Raise, &raise, None));
        assert!(!catches(CatchType::FlowControl, &raise, None));
        assert!(catches(CatchType::FlowControl, &brk, None));
        assert!(catches(CatchType::Break, &brk, Some(3)));
        assert!(!catches(CatchType::Break, &brk, None));
        assert!(!catches(CatchType::Any, &Unwind::Fault(Error::NoFrame), None));
    }

    #[test]
    fn bignums_degrade_to_floats() {
        assert!(matches!(Runtime::parse_bignum("1_000"), Value::Fixnum(1000)));
        match Runtime::parse_bignum("100000000000000000000") {
            Value::Float(value) => assert_eq!(value, 1e20),
            other => panic!("unexpected {:?}", other),
        }
    }
}
