use super::builtins;
use super::{
    Block, Cref, DynamicScope, Error, Frame, Instance, MethodBody, MethodEntry, Module, ModuleKind,
    Object, Slot, Unwind, Value, Visibility,
};
use crate::abi::MethodDescriptor;
use crate::vm::MemberName;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// Classes the runtime itself needs to reach
pub struct CoreClasses {
    pub object: Rc<Module>,
    pub module: Rc<Module>,
    pub class: Rc<Module>,
    pub kernel: Rc<Module>,
    pub integer: Rc<Module>,
    pub float: Rc<Module>,
    pub string: Rc<Module>,
    pub symbol: Rc<Module>,
    pub array: Rc<Module>,
    pub hash: Rc<Module>,
    pub range: Rc<Module>,
    pub regexp: Rc<Module>,
    pub proc_class: Rc<Module>,
    pub nil: Rc<Module>,
    pub true_class: Rc<Module>,
    pub false_class: Rc<Module>,
    pub exception: Rc<Module>,
    pub standard_error: Rc<Module>,
    pub runtime_error: Rc<Module>,
    pub frozen_error: Rc<Module>,
    pub argument_error: Rc<Module>,
    pub name_error: Rc<Module>,
    pub no_method_error: Rc<Module>,
    pub type_error: Rc<Module>,
    pub zero_division_error: Rc<Module>,
    pub local_jump_error: Rc<Module>,
    pub index_error: Rc<Module>,
}

/// Most recent successful match, for the backref globals
#[derive(Clone, Debug)]
pub(crate) struct LastMatch {
    pub pre: String,
    pub matched: String,
    pub post: String,
}

/// Single-threaded runtime executing loaded artifacts
///
/// The runtime is the thread context generated code passes around: it owns the frame and scope
/// stacks, globals, `$!`, the constant generation and the per-name constant switch points.
pub struct Runtime {
    pub(crate) core: CoreClasses,
    main: Value,
    globals: HashMap<String, Value>,
    pub(crate) frames: Vec<Rc<Frame>>,
    pub(crate) scopes: Vec<Rc<DynamicScope>>,
    pub(crate) error_info: Value,
    pub(crate) last_match: Option<LastMatch>,
    output: String,
    end_blocks: Vec<Rc<Block>>,
    constant_generation: i64,
    constant_versions: HashMap<String, u64>,
    pub(crate) method_serial: u64,
    next_id: usize,
    polls: usize,
}

impl Runtime {
    pub fn new() -> Runtime {
        let mut next_id = 0;
        let mut fresh = || {
            next_id += 1;
            next_id
        };
        let class = |id: usize, name: &str, superclass: &Rc<Module>| {
            Module::new(
                id,
                ModuleKind::Class,
                Some(name.to_string()),
                Some(superclass.clone()),
            )
        };

        let object = Module::new(fresh(), ModuleKind::Class, Some("Object".into()), None);
        let module = class(fresh(), "Module", &object);
        let class_class = class(fresh(), "Class", &module);
        let kernel = Module::new(fresh(), ModuleKind::Module, Some("Kernel".into()), None);
        object.include(kernel.clone());

        let exception = class(fresh(), "Exception", &object);
        let standard_error = class(fresh(), "StandardError", &exception);
        let runtime_error = class(fresh(), "RuntimeError", &standard_error);
        let name_error = class(fresh(), "NameError", &standard_error);
        let core = CoreClasses {
            integer: class(fresh(), "Integer", &object),
            float: class(fresh(), "Float", &object),
            string: class(fresh(), "String", &object),
            symbol: class(fresh(), "Symbol", &object),
            array: class(fresh(), "Array", &object),
            hash: class(fresh(), "Hash", &object),
            range: class(fresh(), "Range", &object),
            regexp: class(fresh(), "Regexp", &object),
            proc_class: class(fresh(), "Proc", &object),
            nil: class(fresh(), "NilClass", &object),
            true_class: class(fresh(), "TrueClass", &object),
            false_class: class(fresh(), "FalseClass", &object),
            frozen_error: class(fresh(), "FrozenError", &runtime_error),
            argument_error: class(fresh(), "ArgumentError", &standard_error),
            no_method_error: class(fresh(), "NoMethodError", &name_error),
            type_error: class(fresh(), "TypeError", &standard_error),
            zero_division_error: class(fresh(), "ZeroDivisionError", &standard_error),
            local_jump_error: class(fresh(), "LocalJumpError", &standard_error),
            index_error: class(fresh(), "IndexError", &standard_error),
            object,
            module,
            class: class_class,
            kernel,
            exception,
            standard_error,
            runtime_error,
            name_error,
        };

        let main = Value::Object(Rc::new(Object::new(core.object.clone())));
        let mut runtime = Runtime {
            core,
            main,
            globals: HashMap::new(),
            frames: vec![],
            scopes: vec![],
            error_info: Value::Nil,
            last_match: None,
            output: String::new(),
            end_blocks: vec![],
            constant_generation: 0,
            constant_versions: HashMap::new(),
            method_serial: 0,
            next_id,
            polls: 0,
        };
        runtime.register_core_constants();
        builtins::install(&mut runtime);
        runtime
    }

    fn register_core_constants(&mut self) {
        let core = &self.core;
        let classes = [
            &core.object,
            &core.module,
            &core.class,
            &core.kernel,
            &core.integer,
            &core.float,
            &core.string,
            &core.symbol,
            &core.array,
            &core.hash,
            &core.range,
            &core.regexp,
            &core.proc_class,
            &core.nil,
            &core.true_class,
            &core.false_class,
            &core.exception,
            &core.standard_error,
            &core.runtime_error,
            &core.frozen_error,
            &core.argument_error,
            &core.name_error,
            &core.no_method_error,
            &core.type_error,
            &core.zero_division_error,
            &core.local_jump_error,
            &core.index_error,
        ];
        for class in classes {
            core.object
                .set_constant(&class.name(), Value::Module(class.clone()));
        }
    }

    /// Create an instance of an artifact and run its constructor
    pub fn load(&mut self, artifact: crate::vm::Artifact) -> Result<Rc<Instance>, Unwind> {
        log::debug!(
            "loading {:?} ({} routines, {} fields)",
            artifact.name,
            artifact.routines().len(),
            artifact.fields().len()
        );
        let instance = Rc::new(Instance::new(artifact));
        let init = instance.routine_index(&MemberName::INIT)?;
        self.execute(&instance, init, vec![Slot::Instance(instance.clone())])?;
        Ok(instance)
    }

    /// Run the entry routine of a loaded artifact with the top-level `self`, then the `END`
    /// blocks it registered
    pub fn run(&mut self, instance: &Rc<Instance>) -> Result<Value, Unwind> {
        log::debug!("running {:?}", instance.artifact().name);
        let load = instance.routine_index(&MemberName::LOAD)?;
        let frame = self.top_frame();
        let frame_id = frame.id;
        self.frames.push(frame);
        let args = vec![
            Slot::Instance(instance.clone()),
            Slot::Context,
            Slot::Value(self.main.clone()),
        ];
        let result = match self.execute(instance, load, args) {
            Ok(slot) => slot.into_value().map_err(Unwind::from),
            Err(Unwind::Return { frame, value }) if frame == frame_id => Ok(value),
            Err(unwind) => Err(unwind),
        };
        let result = result.and_then(|value| {
            self.run_end_blocks()?;
            Ok(value)
        });
        self.frames.pop();
        if let Err(unwind) = &result {
            log::debug!("run of {:?} unwound: {}", instance.artifact().name, unwind);
        }
        result
    }

    fn run_end_blocks(&mut self) -> Result<(), Unwind> {
        while let Some(block) = self.end_blocks.pop() {
            self.yield_block(&block, vec![], None)?;
        }
        Ok(())
    }

    /// Call a method on a receiver the way an implicit-receiver call would
    pub fn call(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value, Unwind> {
        let pushed = self.frames.is_empty();
        if pushed {
            let frame = self.top_frame();
            self.frames.push(frame);
        }
        let result = self.call_method(receiver, name, args, None, true);
        if pushed {
            self.frames.pop();
        }
        result
    }

    /// Text written by `puts`, `print` and `p`
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub(crate) fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// The top-level `self`
    pub fn main(&self) -> &Value {
        &self.main
    }

    pub fn core(&self) -> &CoreClasses {
        &self.core
    }

    pub fn global(&self, name: &str) -> Value {
        match name {
            "$!" => self.error_info.clone(),
            _ => self.globals.get(name).cloned().unwrap_or(Value::Nil),
        }
    }

    pub(crate) fn is_global_defined(&self, name: &str) -> bool {
        name == "$!" || self.globals.contains_key(name)
    }

    pub(crate) fn set_global(&mut self, name: &str, value: Value) {
        if name == "$!" {
            self.error_info = value;
        } else {
            self.globals.insert(name.to_string(), value);
        }
    }

    /// Top-level constant, by name
    pub fn constant(&self, name: &str) -> Option<Value> {
        self.core.object.own_constant(name)
    }

    pub fn constant_generation(&self) -> i64 {
        self.constant_generation
    }

    /// Version of the switch point guarding constants with this name
    pub fn constant_version(&self, name: &str) -> u64 {
        self.constant_versions.get(name).copied().unwrap_or(0)
    }

    /// How many times loops polled for thread events
    pub fn polls(&self) -> usize {
        self.polls
    }

    pub(crate) fn poll(&mut self) {
        self.polls += 1;
    }

    pub(crate) fn register_end_block(&mut self, block: Rc<Block>) {
        self.end_blocks.push(block);
    }

    pub(crate) fn fresh_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn top_frame(&mut self) -> Rc<Frame> {
        let id = self.fresh_id();
        Rc::new(Frame {
            id,
            home: id,
            self_value: self.main.clone(),
            method: None,
            block: None,
            cref: Cref::top(self.core.object.clone()),
            running_block: None,
            pushed_scope: false,
            default_visibility: Cell::new(Visibility::Public),
        })
    }

    pub(crate) fn current_frame(&self) -> Result<Rc<Frame>, Error> {
        self.frames.last().cloned().ok_or(Error::NoFrame)
    }

    pub(crate) fn current_scope(&self) -> Result<Rc<DynamicScope>, Error> {
        self.scopes.last().cloned().ok_or(Error::NoScope)
    }

    pub(crate) fn new_module(&mut self, kind: ModuleKind, superclass: Option<Rc<Module>>) -> Rc<Module> {
        let id = self.fresh_id();
        Module::new(id, kind, None, superclass)
    }

    /// Class used for method dispatch (singleton classes included)
    pub fn class_of(&self, value: &Value) -> Rc<Module> {
        match value {
            Value::Object(object) => match &*object.singleton.borrow() {
                Some(singleton) => singleton.clone(),
                None => object.class.clone(),
            },
            Value::Module(module) => match &*module.metaclass.borrow() {
                Some(metaclass) => metaclass.clone(),
                None => self.real_class_of(value),
            },
            _ => self.real_class_of(value),
        }
    }

    /// Class as reported by `class` (singleton classes skipped)
    pub fn real_class_of(&self, value: &Value) -> Rc<Module> {
        let core = &self.core;
        match value {
            Value::Nil => core.nil.clone(),
            Value::True => core.true_class.clone(),
            Value::False => core.false_class.clone(),
            Value::Fixnum(_) => core.integer.clone(),
            Value::Float(_) => core.float.clone(),
            Value::Symbol(_) => core.symbol.clone(),
            Value::Str(_) => core.string.clone(),
            Value::Array(_) => core.array.clone(),
            Value::Hash(_) => core.hash.clone(),
            Value::Range(_) => core.range.clone(),
            Value::Regexp(_) => core.regexp.clone(),
            Value::Proc(_) => core.proc_class.clone(),
            Value::Module(module) if module.is_class() => core.class.clone(),
            Value::Module(_) => core.module.clone(),
            Value::Object(object) => object.class.clone(),
        }
    }

    pub fn is_a(&self, value: &Value, module: &Module) -> bool {
        self.class_of(value).is_kind_of(module)
    }

    /// Singleton class of a value, created on first use
    pub(crate) fn singleton_class(&mut self, value: &Value) -> Result<Rc<Module>, Unwind> {
        match value {
            Value::Object(object) => {
                if let Some(singleton) = &*object.singleton.borrow() {
                    return Ok(singleton.clone());
                }
                let singleton = self.new_module(ModuleKind::Singleton, Some(object.class.clone()));
                singleton.set_name(format!("#<Class:#<{}>>", object.class.name()));
                *object.singleton.borrow_mut() = Some(singleton.clone());
                Ok(singleton)
            }
            Value::Module(module) => self.metaclass(module),
            other => {
                let message = format!("can't define singleton for {:?}", other);
                Err(self.type_error(message))
            }
        }
    }

    fn metaclass(&mut self, module: &Rc<Module>) -> Result<Rc<Module>, Unwind> {
        if let Some(metaclass) = &*module.metaclass.borrow() {
            return Ok(metaclass.clone());
        }
        let superclass = match module.superclass() {
            Some(superclass) if module.is_class() => self.metaclass(&superclass)?,
            _ if module.is_class() => self.core.class.clone(),
            _ => self.core.module.clone(),
        };
        let metaclass = self.new_module(ModuleKind::Singleton, Some(superclass));
        metaclass.set_name(format!("#<Class:{}>", module.name()));
        *module.metaclass.borrow_mut() = Some(metaclass.clone());
        Ok(metaclass)
    }

    /// Lexical constant lookup from the current frame
    pub(crate) fn lookup_constant(&self, name: &str) -> Result<Option<Value>, Error> {
        let cref = self.current_frame()?.cref.clone();
        for module in cref.lexical_modules() {
            if let Some(value) = module.own_constant(name) {
                return Ok(Some(value));
            }
        }
        Ok(cref
            .module
            .find_constant(name)
            .or_else(|| self.core.object.own_constant(name)))
    }

    /// Define a constant, invalidating every cached lookup of it
    pub(crate) fn define_constant(&mut self, module: &Rc<Module>, name: &str, value: Value) {
        if let Value::Module(defined) = &value {
            if !defined.has_name() {
                defined.set_name(self.qualified_name(module, name));
            }
        }
        module.set_constant(name, value);
        self.constant_generation += 1;
        *self.constant_versions.entry(name.to_string()).or_insert(0) += 1;
        log::trace!(
            "constant {}::{} defined, generation {}",
            module.name(),
            name,
            self.constant_generation
        );
    }

    fn qualified_name(&self, namespace: &Module, name: &str) -> String {
        if namespace.id == self.core.object.id {
            name.to_string()
        } else {
            format!("{}::{}", namespace.name(), name)
        }
    }

    /// Register a compiled method
    pub(crate) fn define_compiled_method(
        &mut self,
        target: &Rc<Module>,
        instance: &Rc<Instance>,
        descriptor: &MethodDescriptor,
        visibility: Visibility,
    ) -> Result<(), Unwind> {
        let cref = self.current_frame()?.cref.clone();
        let visibility = if descriptor.name == "initialize" {
            Visibility::Private
        } else {
            visibility
        };
        log::trace!("defining {}#{}", target.name(), descriptor.name);
        target.define_method(
            &descriptor.name,
            Rc::new(MethodEntry {
                visibility,
                body: MethodBody::Compiled {
                    instance: instance.clone(),
                    descriptor: Rc::new(descriptor.clone()),
                    cref,
                },
            }),
        );
        self.methods_changed();
        Ok(())
    }

    /// Invalidate every call-site cache
    pub(crate) fn methods_changed(&mut self) {
        self.method_serial += 1;
    }

    /// Fresh exception instance with a message
    pub fn new_exception(&mut self, class: &Rc<Module>, message: impl Into<String>) -> Value {
        let exception = Object::new(class.clone());
        exception.set_ivar("@message", Value::str(message));
        Value::Object(Rc::new(exception))
    }

    pub(crate) fn raise(&mut self, class: &Rc<Module>, message: impl Into<String>) -> Unwind {
        Unwind::Raise(self.new_exception(class, message))
    }

    pub(crate) fn argument_error(&mut self, message: impl Into<String>) -> Unwind {
        let class = self.core.argument_error.clone();
        self.raise(&class, message)
    }

    pub(crate) fn type_error(&mut self, message: impl Into<String>) -> Unwind {
        let class = self.core.type_error.clone();
        self.raise(&class, message)
    }

    pub(crate) fn name_error(&mut self, message: impl Into<String>) -> Unwind {
        let class = self.core.name_error.clone();
        self.raise(&class, message)
    }

    pub(crate) fn local_jump_error(&mut self, message: impl Into<String>) -> Unwind {
        let class = self.core.local_jump_error.clone();
        self.raise(&class, message)
    }

    /// `wrong number of arguments` unless `min <= given <= max` (`max` of `None` is unbounded)
    pub(crate) fn check_arity(
        &mut self,
        given: usize,
        min: usize,
        max: Option<usize>,
    ) -> Result<(), Unwind> {
        if given >= min && max.map_or(true, |max| given <= max) {
            return Ok(());
        }
        let expected = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{}..{}", min, max),
            None => format!("{}+", min),
        };
        Err(self.argument_error(format!(
            "wrong number of arguments (given {}, expected {})",
            given, expected
        )))
    }

    /// Message of an exception object
    pub fn exception_message(&self, exception: &Value) -> String {
        match exception {
            Value::Object(object) => match object.ivar("@message") {
                Some(Value::Str(message)) => message.to_string(),
                _ => object.class.name(),
            },
            other => format!("{:?}", other),
        }
    }
}

impl Default for Runtime {
    fn default() -> Runtime {
        Runtime::new()
    }
}
