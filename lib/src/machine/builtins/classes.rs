use super::arg;
use crate::machine::{
    Block, HashValue, MethodBody, MethodEntry, Module, ModuleKind, Object, Runtime, Unwind,
    Value, Visibility,
};
use std::rc::Rc;

pub(super) fn install(runtime: &mut Runtime) {
    let module = runtime.core().module.clone();
    module.define_builtin("name", name);
    module.define_builtin("to_s", name_or_placeholder);
    module.define_builtin("inspect", name_or_placeholder);
    module.define_builtin("===", case_equal);
    module.define_builtin("ancestors", ancestors);
    module.define_builtin("attr_reader", attr_reader);
    module.define_builtin("attr_writer", attr_writer);
    module.define_builtin("attr_accessor", attr_accessor);
    module.define_builtin("include", include);
    module.define_builtin("include?", includes);
    module.define_builtin("private", private);
    module.define_builtin("public", public);
    module.define_builtin("instance_methods", instance_methods);
    module.define_builtin("method_defined?", method_defined);
    module.define_builtin("const_get", const_get);
    module.define_builtin("alias_method", alias_method);

    let class = runtime.core().class.clone();
    class.define_builtin("new", new);
    class.define_builtin("allocate", allocate);
    class.define_builtin("superclass", superclass);
}

fn module_of(rt: &mut Runtime, receiver: &Value) -> Result<Rc<Module>, Unwind> {
    match receiver {
        Value::Module(module) => Ok(module.clone()),
        other => {
            let message = format!("{:?} is not a class/module", other);
            Err(rt.type_error(message))
        }
    }
}

fn name(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let module = module_of(rt, receiver)?;
    Ok(if module.has_name() {
        Value::str(module.name())
    } else {
        Value::Nil
    })
}

fn name_or_placeholder(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::str(module_of(rt, receiver)?.name()))
}

fn case_equal(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let module = module_of(rt, receiver)?;
    Ok(Value::bool(rt.is_a(&arg(args, 0), &module)))
}

fn ancestors(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let module = module_of(rt, receiver)?;
    Ok(Value::array(
        module.ancestors().into_iter().map(Value::Module).collect(),
    ))
}

fn define_accessors(
    rt: &mut Runtime,
    receiver: &Value,
    names: &[Value],
    reader: bool,
    writer: bool,
) -> Result<Value, Unwind> {
    let module = module_of(rt, receiver)?;
    let visibility = rt.current_frame()?.default_visibility.get();
    for name in names {
        let name = rt.to_s(name)?;
        let ivar = format!("@{}", name);
        if reader {
            let entry = MethodEntry {
                visibility,
                body: MethodBody::AttrReader(ivar.clone()),
            };
            module.define_method(&name, Rc::new(entry));
        }
        if writer {
            let entry = MethodEntry {
                visibility,
                body: MethodBody::AttrWriter(ivar),
            };
            module.define_method(&format!("{}=", name), Rc::new(entry));
        }
    }
    rt.methods_changed();
    Ok(Value::Nil)
}

fn attr_reader(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    define_accessors(rt, receiver, args, true, false)
}

fn attr_writer(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    define_accessors(rt, receiver, args, false, true)
}

fn attr_accessor(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    define_accessors(rt, receiver, args, true, true)
}

fn include(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let target = module_of(rt, receiver)?;
    for included in args {
        match included {
            Value::Module(module) if module.kind == ModuleKind::Module => {
                target.include(module.clone())
            }
            other => {
                let message = format!("wrong argument type {:?} (expected Module)", other);
                return Err(rt.type_error(message));
            }
        }
    }
    rt.methods_changed();
    Ok(receiver.clone())
}

fn includes(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let target = module_of(rt, receiver)?;
    Ok(Value::bool(match arg(args, 0) {
        Value::Module(module) => module.kind == ModuleKind::Module && target.is_kind_of(&module),
        _ => false,
    }))
}

/// With no arguments, later definitions in the body get the visibility; with names, those
/// methods get it
fn set_visibility(
    rt: &mut Runtime,
    receiver: &Value,
    names: &[Value],
    visibility: Visibility,
) -> Result<Value, Unwind> {
    let module = module_of(rt, receiver)?;
    if names.is_empty() {
        rt.current_frame()?.default_visibility.set(visibility);
        return Ok(Value::Nil);
    }
    for name in names {
        let name = rt.to_s(name)?;
        match module.find_method(&name) {
            Some((_, entry)) => {
                let mut entry = (*entry).clone();
                entry.visibility = visibility;
                module.define_method(&name, Rc::new(entry));
            }
            None => {
                let message = format!(
                    "undefined method `{}' for class `{}'",
                    name,
                    module.name()
                );
                return Err(rt.name_error(message));
            }
        }
    }
    rt.methods_changed();
    Ok(Value::Nil)
}

fn private(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    set_visibility(rt, receiver, args, Visibility::Private)
}

fn public(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    set_visibility(rt, receiver, args, Visibility::Public)
}

fn instance_methods(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let module = module_of(rt, receiver)?;
    let names = module
        .own_method_names()
        .into_iter()
        .filter(|name| {
            module
                .own_method(name)
                .map_or(false, |entry| entry.visibility == Visibility::Public)
        })
        .map(|name| Value::symbol(&name))
        .collect();
    Ok(Value::array(names))
}

fn method_defined(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let module = module_of(rt, receiver)?;
    let name = rt.to_s(&arg(args, 0))?;
    Ok(Value::bool(module.find_method(&name).map_or(false, |(_, entry)| {
        entry.visibility == Visibility::Public
    })))
}

fn const_get(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let module = module_of(rt, receiver)?;
    let name = rt.to_s(&arg(args, 0))?;
    match module.find_constant(&name) {
        Some(found) => Ok(found),
        None => {
            let message = format!("uninitialized constant {}::{}", module.name(), name);
            Err(rt.name_error(message))
        }
    }
}

fn alias_method(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let module = module_of(rt, receiver)?;
    let new_name = rt.to_s(&arg(args, 0))?;
    let old_name = rt.to_s(&arg(args, 1))?;
    rt.alias_method(&module, &new_name, &old_name)?;
    Ok(Value::symbol(&new_name))
}

/// Fresh instance of a class, before `initialize`
fn instantiate(rt: &mut Runtime, class: &Rc<Module>, args: &[Value]) -> Result<Value, Unwind> {
    let core = rt.core();
    Ok(if class.is_kind_of(&core.string) {
        match arg(args, 0) {
            Value::Str(source) => Value::str(source.to_string()),
            _ => Value::str(""),
        }
    } else if class.is_kind_of(&core.array) {
        let length = arg(args, 0).as_fixnum().unwrap_or(0).max(0) as usize;
        Value::array(vec![arg(args, 1); length])
    } else if class.is_kind_of(&core.hash) {
        Value::hash(HashValue::new())
    } else if class.id == core.class.id {
        let superclass = match arg(args, 0) {
            Value::Module(superclass) if superclass.is_class() => superclass,
            _ => core.object.clone(),
        };
        Value::Module(rt.new_module(ModuleKind::Class, Some(superclass)))
    } else if class.id == core.module.id {
        Value::Module(rt.new_module(ModuleKind::Module, None))
    } else if class.is_kind_of(&core.proc_class)
        || class.is_kind_of(&core.integer)
        || class.is_kind_of(&core.float)
        || class.is_kind_of(&core.symbol)
    {
        let message = format!("allocator undefined for {}", class.name());
        return Err(rt.type_error(message));
    } else {
        Value::Object(Rc::new(Object::new(class.clone())))
    })
}

/// `Class#new`: allocate, then run the private `initialize`
fn new(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let class = module_of(rt, receiver)?;
    if class.kind == ModuleKind::Singleton {
        return Err(rt.type_error("can't create instance of singleton class"));
    }
    if class.is_kind_of(&rt.core().proc_class) {
        return super::kernel::proc(rt, receiver, args, block);
    }
    let instance = instantiate(rt, &class, args)?;
    if let Value::Object(_) = instance {
        rt.call_method(&instance, "initialize", args.to_vec(), block.cloned(), true)?;
    }
    Ok(instance)
}

fn allocate(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let class = module_of(rt, receiver)?;
    instantiate(rt, &class, &[])
}

fn superclass(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let class = module_of(rt, receiver)?;
    Ok(class.superclass().map_or(Value::Nil, Value::Module))
}
