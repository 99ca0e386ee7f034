use crate::machine::{Block, Runtime, Unwind, Value};
use std::rc::Rc;

pub(super) fn install(runtime: &mut Runtime) {
    let proc_class = runtime.core().proc_class.clone();
    proc_class.define_builtin("call", call);
    proc_class.define_builtin("()", call);
    proc_class.define_builtin("yield", call);
    proc_class.define_builtin("[]", call);
    proc_class.define_builtin("===", call);
    proc_class.define_builtin("arity", arity);
    proc_class.define_builtin("lambda?", |_, receiver, _, _| {
        Ok(Value::bool(matches!(receiver, Value::Proc(block) if block.lambda)))
    });
    proc_class.define_builtin("to_proc", |_, receiver, _, _| Ok(receiver.clone()));
}

fn block_of(rt: &mut Runtime, receiver: &Value) -> Result<Rc<Block>, Unwind> {
    match receiver {
        Value::Proc(block) => Ok(block.clone()),
        other => {
            let message = format!("{:?} is not a Proc", other);
            Err(rt.type_error(message))
        }
    }
}

/// `break` out of a proc that is not running under its iterator has nowhere to go
fn call(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let target = block_of(rt, receiver)?;
    match rt.yield_block(&target, args.to_vec(), block.cloned()) {
        Err(Unwind::Break { tag: Some(tag), .. }) if tag == target.id && !target.lambda => {
            Err(rt.local_jump_error("break from proc-closure"))
        }
        result => result,
    }
}

fn arity(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::Fixnum(block_of(rt, receiver)?.arity_value()))
}
