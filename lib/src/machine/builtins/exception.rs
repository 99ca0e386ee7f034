use super::arg;
use crate::machine::{Block, Runtime, Unwind, Value};
use std::rc::Rc;

pub(super) fn install(runtime: &mut Runtime) {
    let exception = runtime.core().exception.clone();
    exception.define_builtin("initialize", initialize);
    exception.define_builtin("message", message);
    exception.define_builtin("to_s", message);
    exception.define_builtin("inspect", inspect);
    exception.define_builtin("backtrace", |_, _, _, _| Ok(Value::Nil));
    exception.define_builtin("full_message", full_message);
    if let Some(entry) = exception.own_method("initialize") {
        let mut entry = (*entry).clone();
        entry.visibility = crate::machine::Visibility::Private;
        exception.define_method("initialize", Rc::new(entry));
    }
}

/// Message defaults to the class name
fn initialize(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let message = match arg(args, 0) {
        Value::Nil => Value::str(rt.real_class_of(receiver).name()),
        other => other,
    };
    rt.set_instance_variable(receiver, "@message", message)?;
    Ok(Value::Nil)
}

fn message(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::str(rt.exception_message(receiver)))
}

/// `#<RuntimeError: boom>`, or just the class name when the message is the default
fn inspect(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let class = rt.real_class_of(receiver).name();
    let message = rt.exception_message(receiver);
    Ok(Value::str(if message.is_empty() || message == class {
        class
    } else {
        format!("#<{}: {}>", class, message)
    }))
}

fn full_message(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let class = rt.real_class_of(receiver).name();
    let message = rt.exception_message(receiver);
    Ok(Value::str(format!("{} ({})", message, class)))
}
