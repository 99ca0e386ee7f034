//! Method dispatch, block invocation and `super`

use super::{
    Block, BlockCode, CachedMethod, CallSite, Cref, DynamicScope, Frame, Instance, MethodBody,
    MethodContext, MethodEntry, Module, Runtime, Slot, Unwind, Value, Visibility,
};
use crate::abi::{CallType, MethodDescriptor};
use std::cell::Cell;
use std::rc::Rc;

impl Runtime {
    /// Dispatch a call through a call site, caching the target per receiver class
    pub(crate) fn call_site_dispatch(
        &mut self,
        site: &CallSite,
        caller_self: &Value,
        receiver: &Value,
        args: Vec<Value>,
        block: Option<Rc<Block>>,
    ) -> Result<Value, Unwind> {
        let class = self.class_of(receiver);
        let serial = self.method_serial;
        let found = match site.cached(class.id, serial) {
            Some(cached) => Some((cached.owner, cached.entry)),
            None => {
                let found = class.find_method(&site.name);
                if let Some((owner, entry)) = &found {
                    *site.cache.borrow_mut() = Some(CachedMethod {
                        class_id: class.id,
                        serial,
                        owner: owner.clone(),
                        entry: entry.clone(),
                    });
                }
                found
            }
        };
        let (owner, entry) = match found {
            Some(found) => found,
            None => return Err(self.method_missing(receiver, &site.name, site.call_type)),
        };
        let private_allowed = site.call_type.allows_private() || receiver.same(caller_self);
        if entry.visibility == Visibility::Private && !private_allowed {
            return Err(self.private_method_error(receiver, &site.name));
        }
        let result =
            self.invoke_method(receiver, &site.name, &owner, &entry, args, block.clone(), false);
        Self::catch_break(result, block.as_ref())
    }

    /// Call a method by name, from builtin code
    pub fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        block: Option<Rc<Block>>,
        functional: bool,
    ) -> Result<Value, Unwind> {
        self.call_by_name(receiver, name, args, block, functional, false)
    }

    /// Call a method with arguments that arrive as one packed list (`send` and friends)
    ///
    /// Compiled methods are entered through their boxed routine, even when a specific-arity
    /// routine would take the arguments.
    pub(crate) fn send_packed(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        block: Option<Rc<Block>>,
        functional: bool,
    ) -> Result<Value, Unwind> {
        self.call_by_name(receiver, name, args, block, functional, true)
    }

    fn call_by_name(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        block: Option<Rc<Block>>,
        functional: bool,
        packed: bool,
    ) -> Result<Value, Unwind> {
        let class = self.class_of(receiver);
        let (owner, entry) = match class.find_method(name) {
            Some(found) => found,
            None => {
                let call_type = if functional {
                    CallType::Functional
                } else {
                    CallType::Normal
                };
                return Err(self.method_missing(receiver, name, call_type));
            }
        };
        if entry.visibility == Visibility::Private && !functional {
            return Err(self.private_method_error(receiver, name));
        }
        let result =
            self.invoke_method(receiver, name, &owner, &entry, args, block.clone(), packed);
        Self::catch_break(result, block.as_ref())
    }

    /// A `break` out of the block passed to a call ends that call
    fn catch_break(
        result: Result<Value, Unwind>,
        block: Option<&Rc<Block>>,
    ) -> Result<Value, Unwind> {
        match (result, block) {
            (Err(Unwind::Break { tag: Some(tag), value }), Some(block)) if tag == block.id => {
                Ok(value)
            }
            (result, _) => result,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn invoke_method(
        &mut self,
        receiver: &Value,
        name: &str,
        owner: &Rc<Module>,
        entry: &MethodEntry,
        args: Vec<Value>,
        block: Option<Rc<Block>>,
        packed: bool,
    ) -> Result<Value, Unwind> {
        match &entry.body {
            MethodBody::Builtin(builtin) => builtin(self, receiver, &args, block.as_ref()),
            MethodBody::AttrReader(ivar) => {
                self.check_arity(args.len(), 0, Some(0))?;
                Ok(Runtime::instance_variable(receiver, ivar).unwrap_or(Value::Nil))
            }
            MethodBody::AttrWriter(ivar) => {
                self.check_arity(args.len(), 1, Some(1))?;
                let assigned = args.into_iter().next().unwrap_or(Value::Nil);
                self.set_instance_variable(receiver, ivar, assigned.clone())?;
                Ok(assigned)
            }
            MethodBody::Compiled {
                instance,
                descriptor,
                cref,
            } => {
                let method = Rc::new(MethodContext {
                    name: Rc::from(name),
                    owner: owner.clone(),
                    args: args.clone(),
                });
                self.invoke_compiled(
                    instance, descriptor, cref, method, receiver, args, block, packed,
                )
            }
            MethodBody::Undefined => Err(self.method_missing(receiver, name, CallType::Normal)),
        }
    }

    /// Run a compiled method in a fresh frame
    ///
    /// Unpacked arguments take the fast routine when their count fits it.
    #[allow(clippy::too_many_arguments)]
    fn invoke_compiled(
        &mut self,
        instance: &Rc<Instance>,
        descriptor: &MethodDescriptor,
        cref: &Rc<Cref>,
        method: Rc<MethodContext>,
        receiver: &Value,
        args: Vec<Value>,
        block: Option<Rc<Block>>,
        packed: bool,
    ) -> Result<Value, Unwind> {
        let id = self.fresh_id();
        let needs_scope = descriptor.call_config.needs_scope();
        let depth = (self.frames.len(), self.scopes.len());
        self.frames.push(Rc::new(Frame {
            id,
            home: id,
            self_value: receiver.clone(),
            method: Some(method),
            block: block.clone(),
            cref: cref.clone(),
            running_block: None,
            pushed_scope: needs_scope,
            default_visibility: Cell::new(Visibility::Public),
        }));
        if needs_scope {
            self.scopes
                .push(DynamicScope::new(Rc::new(descriptor.scope.clone()), None));
        }

        let mut slots = vec![
            Slot::Instance(instance.clone()),
            Slot::Context,
            Slot::Value(receiver.clone()),
        ];
        let routine = match &descriptor.fast_routine {
            Some(fast) if !packed && args.len() == descriptor.arity.required => {
                slots.extend(args.into_iter().map(Slot::Value));
                instance.routine_index(fast)
            }
            _ => {
                slots.push(Slot::objects(args));
                instance.routine_index(&descriptor.routine)
            }
        };
        slots.push(Slot::block(block));
        let result = match routine {
            Ok(routine) => self.execute(instance, routine, slots),
            Err(err) => Err(err.into()),
        };

        self.frames.truncate(depth.0);
        self.scopes.truncate(depth.1);
        match result {
            Ok(slot) => Ok(slot_value(slot)),
            Err(Unwind::Return { frame, value }) if frame == id => Ok(value),
            Err(unwind) => Err(unwind),
        }
    }

    /// Run a block with the given arguments
    ///
    /// `next` ends the block with its value and `redo` restarts it. Lambdas also catch their own
    /// `return` and `break`, and check their arity.
    pub(crate) fn yield_block(
        &mut self,
        block: &Rc<Block>,
        args: Vec<Value>,
        block_arg: Option<Rc<Block>>,
    ) -> Result<Value, Unwind> {
        let body = match &block.code {
            BlockCode::Compiled(body) => body.clone(),
            BlockCode::Symbol(name) => {
                let mut args = args.into_iter();
                let receiver = match args.next() {
                    Some(receiver) => receiver,
                    None => return Err(self.argument_error("no receiver given")),
                };
                return self.call_method(&receiver, name, args.collect(), block_arg, false);
            }
        };
        if block.lambda {
            let arity = body.descriptor.arity;
            let max = if arity.rest {
                None
            } else {
                Some(arity.required + arity.optional)
            };
            self.check_arity(args.len(), arity.required, max)?;
        }

        let id = self.fresh_id();
        let creator = &block.frame;
        let depth = (self.frames.len(), self.scopes.len());
        self.frames.push(Rc::new(Frame {
            id,
            home: if block.lambda { id } else { creator.home },
            self_value: block.self_value.clone(),
            method: creator.method.clone(),
            block: creator.block.clone(),
            cref: creator.cref.clone(),
            running_block: Some(block.id),
            pushed_scope: true,
            default_visibility: Cell::new(creator.default_visibility.get()),
        }));
        let scope = match (&block.scope, block.shares_scope) {
            (Some(captured), true) => captured.clone(),
            (captured, _) => DynamicScope::new(body.scope.clone(), captured.clone()),
        };
        self.scopes.push(scope);

        let args = Slot::objects(args);
        let result = loop {
            let slots = vec![
                Slot::Instance(body.instance.clone()),
                Slot::Context,
                Slot::Value(block.self_value.clone()),
                args.clone(),
                Slot::block(block_arg.clone()),
            ];
            match self.execute(&body.instance, body.routine, slots) {
                Err(Unwind::Redo) => continue,
                other => break other,
            }
        };

        self.frames.truncate(depth.0);
        self.scopes.truncate(depth.1);
        match result {
            Ok(slot) => Ok(slot_value(slot)),
            Err(Unwind::Next(value)) => Ok(value),
            Err(Unwind::Return { frame, value }) if block.lambda && frame == id => Ok(value),
            Err(Unwind::Break { tag: Some(tag), value }) if block.lambda && tag == block.id => {
                Ok(value)
            }
            Err(unwind) => Err(unwind),
        }
    }

    /// Call the next implementation of the current method
    pub(crate) fn call_super(
        &mut self,
        self_value: &Value,
        args: Vec<Value>,
        block: Option<Rc<Block>>,
    ) -> Result<Value, Unwind> {
        let frame = self.current_frame()?;
        let method = match &frame.method {
            Some(method) => method.clone(),
            None => {
                let class = self.core.runtime_error.clone();
                return Err(self.raise(&class, "super called outside of method"));
            }
        };
        let class = self.class_of(self_value);
        match class.find_super_method(&method.owner, &method.name) {
            Some((owner, entry)) => {
                let result = self.invoke_method(
                    self_value,
                    &method.name,
                    &owner,
                    &entry,
                    args,
                    block.clone(),
                    false,
                );
                Self::catch_break(result, block.as_ref())
            }
            None => {
                let class = self.core.no_method_error.clone();
                let message = format!(
                    "super: no superclass method `{}' for {}",
                    method.name,
                    self.describe_receiver(self_value)
                );
                Err(self.raise(&class, message))
            }
        }
    }

    /// Would a call of `name` on the receiver find a method it is allowed to call?
    pub(crate) fn responds_to(&self, receiver: &Value, name: &str, include_private: bool) -> bool {
        match self.class_of(receiver).find_method(name) {
            Some((_, entry)) => include_private || entry.visibility == Visibility::Public,
            None => false,
        }
    }

    pub(crate) fn method_missing(&mut self, receiver: &Value, name: &str, call_type: CallType) -> Unwind {
        let described = self.describe_receiver(receiver);
        if call_type == CallType::Variable {
            let message = format!("undefined local variable or method `{}' for {}", name, described);
            return self.name_error(message);
        }
        let class = self.core.no_method_error.clone();
        let message = format!("undefined method `{}' for {}", name, described);
        self.raise(&class, message)
    }

    fn private_method_error(&mut self, receiver: &Value, name: &str) -> Unwind {
        let class = self.core.no_method_error.clone();
        let message = format!(
            "private method `{}' called for {}",
            name,
            self.describe_receiver(receiver)
        );
        self.raise(&class, message)
    }

    /// Receiver as it appears in dispatch error messages
    fn describe_receiver(&self, receiver: &Value) -> String {
        match receiver {
            Value::Nil => "nil:NilClass".to_string(),
            Value::True => "true:TrueClass".to_string(),
            Value::False => "false:FalseClass".to_string(),
            Value::Module(module) => {
                let kind = if module.is_class() { "Class" } else { "Module" };
                format!("{}:{}", module.name(), kind)
            }
            main if main.same(self.main()) => "main:Object".to_string(),
            other => format!("an instance of {}", self.real_class_of(other).name()),
        }
    }
}

fn slot_value(slot: Slot) -> Value {
    match slot {
        Slot::Value(value) => value,
        _ => Value::Nil,
    }
}
