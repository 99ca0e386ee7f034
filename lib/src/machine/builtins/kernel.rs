use super::arg;
use crate::machine::{Block, Object, Runtime, Unwind, Value, Visibility};
use std::rc::Rc;

pub(super) fn install(runtime: &mut Runtime) {
    let kernel = runtime.core().kernel.clone();
    kernel.define_builtin("puts", puts);
    kernel.define_builtin("print", print);
    kernel.define_builtin("p", p);
    kernel.define_builtin("raise", raise);
    kernel.define_builtin("class", class);
    kernel.define_builtin("==", identical);
    kernel.define_builtin("equal?", identical);
    kernel.define_builtin("eql?", identical);
    kernel.define_builtin("===", case_equal);
    kernel.define_builtin("!=", not_equal);
    kernel.define_builtin("!", not);
    kernel.define_builtin("nil?", |_, _, _, _| Ok(Value::False));
    kernel.define_builtin("is_a?", is_a);
    kernel.define_builtin("kind_of?", is_a);
    kernel.define_builtin("instance_of?", instance_of);
    kernel.define_builtin("respond_to?", respond_to);
    kernel.define_builtin("to_s", to_s);
    kernel.define_builtin("inspect", inspect);
    kernel.define_builtin("send", send);
    kernel.define_builtin("__send__", send);
    kernel.define_builtin("public_send", public_send);
    kernel.define_builtin("block_given?", block_given);
    kernel.define_builtin("lambda", lambda);
    kernel.define_builtin("proc", proc);
    kernel.define_builtin("loop", repeat);
    kernel.define_builtin("tap", tap);
    kernel.define_builtin("instance_variable_get", instance_variable_get);
    kernel.define_builtin("instance_variable_set", instance_variable_set);
    kernel.define_builtin("instance_variables", instance_variables);
    kernel.define_builtin("extend", extend);
    kernel.define_builtin("freeze", freeze);
    kernel.define_builtin("frozen?", frozen);
    kernel.define_builtin("dup", dup);
    kernel.define_builtin("Integer", integer);
    kernel.define_builtin("initialize", |_, _, _, _| Ok(Value::Nil));

    let private_methods = [
        "puts",
        "print",
        "p",
        "raise",
        "lambda",
        "proc",
        "loop",
        "block_given?",
        "Integer",
        "initialize",
    ];
    for private in private_methods {
        if let Some(entry) = kernel.own_method(private) {
            let mut entry = (*entry).clone();
            entry.visibility = Visibility::Private;
            kernel.define_method(private, Rc::new(entry));
        }
    }
}

fn puts(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    fn lines(rt: &mut Runtime, value: &Value, out: &mut String) -> Result<(), Unwind> {
        match value {
            Value::Array(elements) => {
                let elements = elements.borrow().clone();
                for element in &elements {
                    lines(rt, element, out)?;
                }
            }
            other => {
                let text = rt.to_s(other)?;
                out.push_str(&text);
                if !text.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        Ok(())
    }

    let mut out = String::new();
    if args.is_empty() {
        out.push('\n');
    }
    for value in args {
        lines(rt, value, &mut out)?;
    }
    rt.write(&out);
    Ok(Value::Nil)
}

fn print(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    for value in args {
        let text = rt.to_s(value)?;
        rt.write(&text);
    }
    Ok(Value::Nil)
}

fn p(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    for value in args {
        let text = rt.inspect(value)?;
        rt.write(&text);
        rt.write("\n");
    }
    Ok(match args {
        [] => Value::Nil,
        [single] => single.clone(),
        many => Value::array(many.to_vec()),
    })
}

/// `raise`, `raise message`, `raise Class`, `raise Class, message` or `raise exception`
fn raise(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let exception = match args {
        [] => match rt.error_info.clone() {
            Value::Nil => {
                let class = rt.core().runtime_error.clone();
                rt.new_exception(&class, "unhandled exception")
            }
            current => current,
        },
        [Value::Str(message)] => {
            let class = rt.core().runtime_error.clone();
            rt.new_exception(&class, message.to_string())
        }
        [class @ Value::Module(_), rest @ ..] => {
            rt.call_method(class, "new", rest.iter().take(1).cloned().collect(), None, false)?
        }
        [exception @ Value::Object(_), ..] => exception.clone(),
        [other, ..] => {
            let message = format!("exception class/object expected, got {:?}", other);
            return Err(rt.type_error(message));
        }
    };
    let exception_class = rt.core().exception.clone();
    if !rt.is_a(&exception, &exception_class) {
        return Err(rt.type_error("exception object expected"));
    }
    log::trace!("raising {}", rt.exception_message(&exception));
    Err(Unwind::Raise(exception))
}

fn class(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::Module(rt.real_class_of(receiver)))
}

fn identical(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(receiver.same(&arg(args, 0))))
}

fn case_equal(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(rt.equals(receiver, &arg(args, 0))?))
}

fn not_equal(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let equal = rt.call_method(receiver, "==", vec![arg(args, 0)], None, true)?;
    Ok(Value::bool(!equal.is_truthy()))
}

fn not(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(!receiver.is_truthy()))
}

fn is_a(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match arg(args, 0) {
        Value::Module(module) => Ok(Value::bool(rt.is_a(receiver, &module))),
        _ => Err(rt.type_error("class or module required")),
    }
}

fn instance_of(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match arg(args, 0) {
        Value::Module(module) => Ok(Value::bool(rt.real_class_of(receiver).id == module.id)),
        _ => Err(rt.type_error("class or module required")),
    }
}

fn respond_to(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let name = rt.to_s(&arg(args, 0))?;
    let include_private = arg(args, 1).is_truthy();
    Ok(Value::bool(rt.responds_to(receiver, &name, include_private)))
}

fn to_s(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::str(rt.default_to_s(receiver)))
}

/// `#<Point @x=1, @y=2>`
fn inspect(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let object = match receiver {
        Value::Object(object) if !receiver.same(rt.main()) => object.clone(),
        other => {
            let text = rt.to_s(other)?;
            return Ok(Value::str(text));
        }
    };
    let ivars = object.ivars();
    if ivars.is_empty() {
        return Ok(Value::str(rt.default_to_s(receiver)));
    }
    let mut parts = Vec::with_capacity(ivars.len());
    for (name, value) in &ivars {
        parts.push(format!("{}={}", name, rt.inspect(value)?));
    }
    Ok(Value::str(format!(
        "#<{} {}>",
        object.class.name(),
        parts.join(", ")
    )))
}

fn send(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let name = rt.to_s(&arg(args, 0))?;
    let rest = args.iter().skip(1).cloned().collect();
    rt.send_packed(receiver, &name, rest, block.cloned(), true)
}

fn public_send(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let name = rt.to_s(&arg(args, 0))?;
    let rest = args.iter().skip(1).cloned().collect();
    rt.send_packed(receiver, &name, rest, block.cloned(), false)
}

fn block_given(rt: &mut Runtime, _: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let frame = rt.current_frame()?;
    Ok(Value::bool(frame.block.is_some()))
}

fn lambda(rt: &mut Runtime, _: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match block {
        Some(block) => {
            let mut lambda = (**block).clone();
            lambda.lambda = true;
            Ok(Value::Proc(Rc::new(lambda)))
        }
        None => Err(rt.argument_error("tried to create Proc object without a block")),
    }
}

pub(super) fn proc(rt: &mut Runtime, _: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match block {
        Some(block) => Ok(Value::Proc(block.clone())),
        None => Err(rt.argument_error("tried to create Proc object without a block")),
    }
}

/// `loop { }`: runs until the block breaks
fn repeat(rt: &mut Runtime, _: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    loop {
        rt.call_block(block, vec![])?;
        rt.poll();
    }
}

fn tap(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    rt.call_block(block, vec![receiver.clone()])?;
    Ok(receiver.clone())
}

fn instance_variable_get(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let name = rt.to_s(&arg(args, 0))?;
    Ok(Runtime::instance_variable(receiver, &name).unwrap_or(Value::Nil))
}

fn instance_variable_set(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let name = rt.to_s(&arg(args, 0))?;
    let assigned = arg(args, 1);
    rt.set_instance_variable(receiver, &name, assigned.clone())?;
    Ok(assigned)
}

fn instance_variables(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let names = match receiver {
        Value::Object(object) => object
            .ivars()
            .into_iter()
            .map(|(name, _)| Value::symbol(&name))
            .collect(),
        _ => vec![],
    };
    Ok(Value::array(names))
}

fn extend(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let singleton = rt.singleton_class(receiver)?;
    for module in args {
        match module {
            Value::Module(module) if !module.is_class() => singleton.include(module.clone()),
            _ => return Err(rt.type_error("wrong argument type (expected Module)")),
        }
    }
    rt.methods_changed();
    Ok(receiver.clone())
}

fn freeze(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    if let Value::Str(string) = receiver {
        string.freeze();
    }
    Ok(receiver.clone())
}

fn frozen(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(match receiver {
        Value::Str(string) => string.is_frozen(),
        Value::Nil
        | Value::True
        | Value::False
        | Value::Fixnum(_)
        | Value::Float(_)
        | Value::Symbol(_)
        | Value::Range(_) => true,
        _ => false,
    }))
}

/// Shallow copy; copies of strings are never frozen
fn dup(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match receiver {
        Value::Str(string) => Value::str(string.to_string()),
        Value::Array(elements) => Value::array(elements.borrow().clone()),
        Value::Hash(hash) => Value::hash(hash.borrow().clone()),
        Value::Object(object) => {
            let copy = Object::new(object.class.clone());
            for (name, value) in object.ivars() {
                copy.set_ivar(&name, value);
            }
            Value::Object(Rc::new(copy))
        }
        other => other.clone(),
    })
}

fn integer(rt: &mut Runtime, _: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match arg(args, 0) {
        fixnum @ Value::Fixnum(_) => Ok(fixnum),
        Value::Float(value) => Ok(Value::Fixnum(value.trunc() as i64)),
        Value::Str(text) => {
            let parsed = text.borrow().trim().replace('_', "").parse::<i64>();
            match parsed {
                Ok(value) => Ok(Value::Fixnum(value)),
                Err(_) => {
                    let message = format!("invalid value for Integer(): {:?}", text.to_string());
                    Err(rt.argument_error(message))
                }
            }
        }
        other => {
            let message = format!(
                "can't convert {} into Integer",
                rt.real_class_of(&other).name()
            );
            Err(rt.type_error(message))
        }
    }
}
