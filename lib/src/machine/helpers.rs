use super::{
    Block, BlockBody, BlockCode, CallSite, Cref, DynamicScope, Error, Frame, Instance,
    MethodBody, MethodEntry, Module, ModuleKind, RString, RangeValue, RegexpValue, Runtime,
    Slot, Unwind, Value, Visibility,
};
use crate::abi::{CallType, Descriptor, RuntimeHelper, ScopeDescriptor};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Typed reader over the arguments popped for a helper call
struct HelperArgs {
    slots: std::vec::IntoIter<Slot>,
}

impl HelperArgs {
    fn next(&mut self) -> Result<Slot, Error> {
        self.slots
            .next()
            .ok_or_else(|| Error::StackUnderflow("helper arguments".to_string()))
    }

    fn context(&mut self) -> Result<(), Error> {
        match self.next()? {
            Slot::Context => Ok(()),
            other => Err(other.mismatch("context")),
        }
    }

    /// Language-level value (`null` reads as `nil`)
    fn value(&mut self) -> Result<Value, Error> {
        Ok(self.optional_value()?.unwrap_or(Value::Nil))
    }

    fn optional_value(&mut self) -> Result<Option<Value>, Error> {
        match self.next()? {
            Slot::Null => Ok(None),
            Slot::Value(value) => Ok(Some(value)),
            other => Err(other.mismatch("value")),
        }
    }

    fn int(&mut self) -> Result<i64, Error> {
        self.next()?.into_int()
    }

    fn index(&mut self) -> Result<usize, Error> {
        let index = self.int()?;
        Ok(index.max(0) as usize)
    }

    fn bool(&mut self) -> Result<bool, Error> {
        match self.next()? {
            Slot::Bool(value) => Ok(value),
            other => Err(other.mismatch("bool")),
        }
    }

    fn float(&mut self) -> Result<f64, Error> {
        match self.next()? {
            Slot::Float(value) => Ok(value),
            other => Err(other.mismatch("float")),
        }
    }

    fn str(&mut self) -> Result<Rc<str>, Error> {
        match self.next()? {
            Slot::Str(value) => Ok(value),
            other => Err(other.mismatch("string")),
        }
    }

    fn objects(&mut self) -> Result<Rc<RefCell<Vec<Value>>>, Error> {
        self.next()?.into_objects()
    }

    fn scope(&mut self) -> Result<Rc<DynamicScope>, Error> {
        match self.next()? {
            Slot::Scope(scope) => Ok(scope),
            other => Err(other.mismatch("scope")),
        }
    }

    fn static_scope(&mut self) -> Result<Rc<ScopeDescriptor>, Error> {
        match self.next()? {
            Slot::StaticScope(scope) => Ok(scope),
            other => Err(other.mismatch("static scope")),
        }
    }

    fn block(&mut self) -> Result<Option<Rc<Block>>, Error> {
        match self.next()? {
            Slot::Null => Ok(None),
            Slot::Block(block) => Ok(Some(block)),
            other => Err(other.mismatch("block")),
        }
    }

    fn block_body(&mut self) -> Result<Rc<BlockBody>, Error> {
        match self.next()? {
            Slot::BlockBody(body) => Ok(body),
            other => Err(other.mismatch("block body")),
        }
    }

    fn call_site(&mut self) -> Result<Rc<CallSite>, Error> {
        match self.next()? {
            Slot::CallSite(site) => Ok(site),
            other => Err(other.mismatch("call site")),
        }
    }

    fn signal(&mut self) -> Result<Unwind, Error> {
        match self.next()? {
            Slot::Signal(signal) => Ok(signal),
            other => Err(other.mismatch("signal")),
        }
    }

    fn instance(&mut self) -> Result<Rc<Instance>, Error> {
        self.next()?.into_instance()
    }

    /// The remaining arguments, as values
    fn rest(&mut self) -> Result<Vec<Value>, Error> {
        let mut values = vec![];
        while self.slots.len() > 0 {
            values.push(self.value()?);
        }
        Ok(values)
    }
}

fn value(value: Value) -> Result<Option<Slot>, Unwind> {
    Ok(Some(Slot::Value(value)))
}

fn described(defined: bool, description: &str) -> Result<Option<Slot>, Unwind> {
    value(if defined {
        Value::str(description)
    } else {
        Value::Nil
    })
}

const BACKREFS: &str = "~&`'+";

impl Runtime {
    /// Run a runtime helper on arguments popped from the operand stack
    pub(crate) fn call_helper(
        &mut self,
        helper: RuntimeHelper,
        args: Vec<Slot>,
    ) -> Result<Option<Slot>, Unwind> {
        use RuntimeHelper::*;

        let mut args = HelperArgs {
            slots: args.into_iter(),
        };
        match helper {
            IsTrue => Ok(Some(Slot::Bool(args.value()?.is_truthy()))),
            StoreExceptionInErrorInfo => {
                let signal = args.signal()?;
                args.context()?;
                if let Some(exception) = signal.exception() {
                    self.error_info = exception.clone();
                }
                Ok(None)
            }
            SignalValue => value(args.signal()?.value().cloned().unwrap_or(Value::Nil)),
            ScopeValues => Ok(Some(Slot::Objects(args.scope()?.values.clone()))),
            GetValueDepthZero(index) => value(args.scope()?.get(index as usize)),
            SetValueDepthZero(index) => {
                let scope = args.scope()?;
                scope.set(index as usize, args.value()?);
                Ok(None)
            }
            GetValue => {
                let scope = args.scope()?;
                let index = args.index()?;
                let depth = args.index()?;
                let scope = scope.ancestor(depth).ok_or(Error::NoScope)?;
                value(scope.get(index))
            }
            SetValue => {
                let scope = args.scope()?;
                let assigned = args.value()?;
                let index = args.index()?;
                let depth = args.index()?;
                let scope = scope.ancestor(depth).ok_or(Error::NoScope)?;
                scope.set(index, assigned);
                Ok(None)
            }
            Call(_) | CallBoxed => {
                let site = args.call_site()?;
                args.context()?;
                let caller_self = args.value()?;
                let receiver = args.value()?;
                let mut call_args = if helper == CallBoxed {
                    let objects = args.objects()?;
                    let values = objects.borrow().clone();
                    values
                } else {
                    vec![]
                };
                let mut remaining = args.slots.by_ref().collect::<Vec<Slot>>();
                let block = match remaining.pop() {
                    Some(Slot::Block(block)) => Some(block),
                    Some(Slot::Null) => None,
                    Some(other) => return Err(other.mismatch("block").into()),
                    None => return Err(Error::StackUnderflow("call arguments".into()).into()),
                };
                for slot in remaining {
                    call_args.push(match slot {
                        Slot::Null => Value::Nil,
                        other => other.into_value()?,
                    });
                }
                value(self.call_site_dispatch(&site, &caller_self, &receiver, call_args, block)?)
            }
            _ => {
                args.context()?;
                self.call_context_helper(helper, args)
            }
        }
    }

    /// Helpers whose first argument is the thread context
    fn call_context_helper(
        &mut self,
        helper: RuntimeHelper,
        mut args: HelperArgs,
    ) -> Result<Option<Slot>, Unwind> {
        use RuntimeHelper::*;

        match helper {
            GetNil => value(Value::Nil),
            GetTrue => value(Value::True),
            GetFalse => value(Value::False),
            GetStandardError => value(Value::Module(self.core.standard_error.clone())),
            GetObjectClass => value(Value::Module(self.core.object.clone())),
            GetErrorInfo => value(self.error_info.clone()),
            NewBoolean => value(Value::bool(args.bool()?)),
            NewFixnum => value(Value::Fixnum(args.int()?)),
            NewFloat => value(Value::Float(args.float()?)),
            NewBignum => value(Runtime::parse_bignum(&args.str()?)),
            NewSymbol => value(Value::symbol(&args.str()?)),
            NewFrozenString => value(Value::Str(Rc::new(RString::frozen(
                args.str()?.to_string(),
            )))),
            NewString => value(Value::str(args.str()?.to_string())),
            StrDup => match args.value()? {
                Value::Str(string) => value(Value::str(string.to_string())),
                other => value(other),
            },
            AppendAsString => {
                let target = args.value()?;
                let appended = args.value()?;
                let text = self.to_s(&appended)?;
                match &target {
                    Value::Str(string) => {
                        if !string.push_str(&text) {
                            return Err(self.frozen_error(&target));
                        }
                    }
                    other => {
                        let message = format!("can't append to {:?}", other);
                        return Err(self.type_error(message));
                    }
                }
                value(target)
            }
            ToSymbol => {
                let source = args.value()?;
                let name = self.to_s(&source)?;
                value(Value::symbol(&name))
            }
            NewRegexp => {
                let pattern = args.str()?;
                let options = args.int()?;
                value(Runtime::new_regexp(&pattern, options))
            }
            RegexpFromString => {
                let source = args.value()?;
                let options = args.int()?;
                let pattern = self.to_s(&source)?;
                value(Runtime::new_regexp(&pattern, options))
            }

            NewArray => {
                let objects = args.objects()?;
                let elements = objects.borrow().clone();
                value(Value::array(elements))
            }
            ConstructArray(_) => value(Value::array(args.rest()?)),
            ArrayAppend => {
                let array = args.value()?;
                let element = args.value()?;
                self.array_mut(&array)?.borrow_mut().push(element);
                value(array)
            }
            ArrayConcat => {
                let array = args.value()?;
                let splatted = args.value()?;
                let elements = self.splat(&splatted);
                self.array_mut(&array)?.borrow_mut().extend(elements);
                value(array)
            }
            SplatValue => {
                let splatted = args.value()?;
                value(Value::array(self.splat(&splatted)))
            }
            ToHostArray => {
                let splatted = args.value()?;
                Ok(Some(Slot::objects(self.splat(&splatted))))
            }
            EnsureArray => match args.value()? {
                array @ Value::Array(_) => value(array),
                other => value(Value::array(vec![other])),
            },
            ArrayEntryOrNil => {
                let array = args.value()?;
                let index = args.index()?;
                let element = match &array {
                    Value::Array(elements) => elements.borrow().get(index).cloned(),
                    _ => None,
                };
                value(element.unwrap_or(Value::Nil))
            }
            SubarrayOrEmpty => {
                let array = args.value()?;
                let start = args.index()?;
                let tail = match &array {
                    Value::Array(elements) => elements.borrow().iter().skip(start).cloned().collect(),
                    _ => vec![],
                };
                value(Value::array(tail))
            }
            NewHash => value(Value::hash(Default::default())),
            HashStore => {
                let hash = args.value()?;
                let key = args.value()?;
                let stored = args.value()?;
                match &hash {
                    Value::Hash(table) => table.borrow_mut().insert(key, stored),
                    other => return Err(Error::SlotMismatch {
                        expected: "hash",
                        found: format!("{:?}", other),
                    }
                    .into()),
                }
                value(hash)
            }
            ConstructHash(_) => {
                let mut hash = super::HashValue::new();
                let mut entries = args.rest()?.into_iter();
                while let (Some(key), Some(stored)) = (entries.next(), entries.next()) {
                    hash.insert(key, stored);
                }
                value(Value::hash(hash))
            }
            NewRange => {
                let begin = args.value()?;
                let end = args.value()?;
                let exclusive = args.bool()?;
                value(Value::Range(Rc::new(RangeValue {
                    begin,
                    end,
                    exclusive,
                })))
            }

            CheckArity => {
                let given = args.objects()?.borrow().len();
                let min = args.index()?;
                let max = args.int()?;
                let max = if max < 0 { None } else { Some(max as usize) };
                self.check_arity(given, min, max)?;
                Ok(None)
            }
            HostEntryOrNil => {
                let objects = args.objects()?;
                let index = args.index()?;
                let entry = objects.borrow().get(index).cloned();
                value(entry.unwrap_or(Value::Nil))
            }
            HostSubarray => {
                let objects = args.objects()?;
                let start = args.index()?;
                let tail = objects.borrow().iter().skip(start).cloned().collect();
                value(Value::array(tail))
            }
            BlockToProc => value(args.block()?.map_or(Value::Nil, Value::Proc)),
            PrepareBlockArgs => {
                let objects = args.objects()?;
                let _targets = args.int()?;
                let autosplat = args.bool()?;
                let values = objects.borrow().clone();
                let values = match values.as_slice() {
                    [Value::Array(elements)] if autosplat => elements.borrow().clone(),
                    _ => values,
                };
                Ok(Some(Slot::objects(values)))
            }
            GetCurrentScope => Ok(Some(Slot::Scope(self.current_scope()?))),

            SetErrorInfo => {
                self.error_info = args.value()?;
                Ok(None)
            }
            IsExceptionHandled => {
                let signal = args.signal()?;
                let classes = args.objects()?.borrow().clone();
                let exception = match signal.exception() {
                    Some(exception) => exception.clone(),
                    None => return Ok(Some(Slot::Bool(false))),
                };
                for class in classes {
                    match class {
                        Value::Module(module) => {
                            if self.is_a(&exception, &module) {
                                return Ok(Some(Slot::Bool(true)));
                            }
                        }
                        _ => {
                            return Err(self.type_error("class or module required for rescue clause"))
                        }
                    }
                }
                Ok(Some(Slot::Bool(false)))
            }
            BreakJump => {
                let tag = self.current_frame()?.running_block;
                let carried = args.value()?;
                Ok(Some(Slot::Signal(Unwind::Break {
                    tag,
                    value: carried,
                })))
            }
            NextJump => Ok(Some(Slot::Signal(Unwind::Next(args.value()?)))),
            RedoJump => Ok(Some(Slot::Signal(Unwind::Redo))),
            RetryJump => Ok(Some(Slot::Signal(Unwind::Retry))),
            ReturnJump => {
                let frame = self.current_frame()?.home;
                let carried = args.value()?;
                Ok(Some(Slot::Signal(Unwind::Return {
                    frame,
                    value: carried,
                })))
            }
            PollThreadEvents => {
                self.poll();
                Ok(None)
            }

            PrepareSuperClass => match args.value()? {
                Value::Module(module) if module.is_class() => value(Value::Module(module)),
                other => {
                    let message = format!("superclass must be a Class ({:?} given)", other);
                    Err(self.type_error(message))
                }
            },
            PrepareClassNamespace => match args.value()? {
                namespace @ Value::Module(_) => value(namespace),
                other => {
                    let message = format!("{:?} is not a class/module", other);
                    Err(self.type_error(message))
                }
            },
            DefineClassUnder => {
                let namespace = self.namespace(args.optional_value()?)?;
                let name = args.str()?;
                let superclass = match args.optional_value()? {
                    Some(Value::Module(superclass)) => Some(superclass),
                    _ => None,
                };
                value(Value::Module(self.define_class(&namespace, &name, superclass)?))
            }
            DefineModuleUnder => {
                let namespace = self.namespace(args.optional_value()?)?;
                let name = args.str()?;
                value(Value::Module(self.define_module(&namespace, &name)?))
            }
            GetSingletonClass => {
                let target = args.value()?;
                value(Value::Module(self.singleton_class(&target)?))
            }
            PreCompiledClass => {
                let module = match args.value()? {
                    Value::Module(module) => module,
                    other => return Err(Slot::Value(other).mismatch("module").into()),
                };
                let scope = args.static_scope()?;
                let needs_scope = args.bool()?;
                self.enter_class_body(module, scope, needs_scope)?;
                Ok(None)
            }
            PostCompiledClass => {
                self.leave_frame();
                Ok(None)
            }
            Def | Defs => {
                let target = args.value()?;
                let instance = args.instance()?;
                let index = args.index()?;
                let descriptor = match instance.artifact().descriptor(index) {
                    Some(Descriptor::Method(descriptor)) => descriptor.clone(),
                    _ => return Err(Error::MissingDescriptor(index).into()),
                };
                if helper == Defs {
                    let singleton = self.singleton_class(&target)?;
                    self.define_compiled_method(&singleton, &instance, &descriptor, Visibility::Public)?;
                } else {
                    let frame = self.current_frame()?;
                    let module = frame.cref.module.clone();
                    let visibility = frame.default_visibility.get();
                    self.define_compiled_method(&module, &instance, &descriptor, visibility)?;
                }
                value(Value::symbol(&descriptor.name))
            }
            Alias => {
                let new_name = args.str()?;
                let old_name = args.str()?;
                let module = self.current_frame()?.cref.module.clone();
                self.alias_method(&module, &new_name, &old_name)?;
                value(Value::Nil)
            }
            Undef => {
                let name = args.str()?;
                let module = self.current_frame()?.cref.module.clone();
                if module.find_method(&name).is_none() {
                    let message = format!(
                        "undefined method `{}' for class `{}'",
                        name,
                        module.name()
                    );
                    return Err(self.name_error(message));
                }
                module.define_method(&name, MethodEntry::public(MethodBody::Undefined));
                self.methods_changed();
                value(Value::Nil)
            }
            NewStaticScope => Ok(Some(Slot::StaticScope(Rc::new(Runtime::decode_scope(
                &args.str()?,
            )?)))),
            NewBlockBody => {
                let instance = args.instance()?;
                let index = args.index()?;
                Ok(Some(Slot::BlockBody(Runtime::new_block_body(&instance, index)?)))
            }
            CreateBlock | CreateSharedScopeBlock => {
                let self_value = args.value()?;
                let body = args.block_body()?;
                let block = self.create_block(self_value, body, helper == CreateSharedScopeBlock)?;
                Ok(Some(Slot::Block(block)))
            }
            NewLambda => match args.block()? {
                Some(block) => {
                    let mut lambda = (*block).clone();
                    lambda.lambda = true;
                    value(Value::Proc(Rc::new(lambda)))
                }
                None => Err(self.argument_error("tried to create Proc object without a block")),
            },
            GetFrameBlock => Ok(Some(Slot::block(self.current_frame()?.block.clone()))),
            ProcToBlock => {
                let source = args.value()?;
                Ok(Some(Slot::block(self.to_block(&source)?)))
            }
            RunBeginBlock => match args.block()? {
                Some(block) => value(self.yield_block(&block, vec![], None)?),
                None => value(Value::Nil),
            },
            RegisterEndBlock => {
                if let Some(block) = args.block()? {
                    self.register_end_block(block);
                }
                Ok(None)
            }
            DefinedYield => described(args.block()?.is_some(), "yield"),
            NewCallSite => {
                let name = args.str()?;
                let raw = args.int()?;
                let call_type = CallType::from_int(raw).ok_or(Error::UnknownCallType(raw))?;
                Ok(Some(Slot::CallSite(Rc::new(CallSite::new(&name, call_type)))))
            }
            CallSuper => {
                let self_value = args.value()?;
                let call_args = args.objects()?.borrow().clone();
                let block = args.block()?;
                value(self.call_super(&self_value, call_args, block)?)
            }
            ZSuperArgs => {
                let frame = self.current_frame()?;
                match &frame.method {
                    Some(method) => Ok(Some(Slot::objects(method.args.clone()))),
                    None => {
                        let class = self.core.runtime_error.clone();
                        Err(self.raise(&class, "super called outside of method"))
                    }
                }
            }
            Yield => {
                let block = args.block()?;
                let yielded = args.value()?;
                let splat = args.bool()?;
                let block = match block {
                    Some(block) => block,
                    None => return Err(self.local_jump_error("no block given (yield)")),
                };
                let yield_args = if splat {
                    self.splat(&yielded)
                } else {
                    vec![yielded]
                };
                value(self.yield_block(&block, yield_args, None)?)
            }

            GetInstanceVariable => {
                let target = args.value()?;
                let name = args.str()?;
                value(Runtime::instance_variable(&target, &name).unwrap_or(Value::Nil))
            }
            SetInstanceVariable => {
                let assigned = args.value()?;
                let target = args.value()?;
                let name = args.str()?;
                self.set_instance_variable(&target, &name, assigned.clone())?;
                value(assigned)
            }
            DefinedInstanceVariable => {
                let target = args.value()?;
                let name = args.str()?;
                described(
                    Runtime::instance_variable(&target, &name).is_some(),
                    "instance-variable",
                )
            }
            GetGlobal => value(self.global(&args.str()?)),
            SetGlobal => {
                let assigned = args.value()?;
                let name = args.str()?;
                self.set_global(&name, assigned.clone());
                value(assigned)
            }
            DefinedGlobal => {
                let name = args.str()?;
                described(self.is_global_defined(&name), "global-variable")
            }
            GetClassVariable => {
                let name = args.str()?;
                let module = self.class_variable_base()?;
                match module.class_variable(&name) {
                    Some(found) => value(found),
                    None => {
                        let message = format!(
                            "uninitialized class variable {} in {}",
                            name,
                            module.name()
                        );
                        Err(self.name_error(message))
                    }
                }
            }
            SetClassVariable => {
                let assigned = args.value()?;
                let name = args.str()?;
                let module = self.class_variable_base()?;
                let owner = module.class_variable_owner(&name).unwrap_or(module);
                owner.set_class_variable(&name, assigned.clone());
                value(assigned)
            }
            DefinedClassVariable => {
                let name = args.str()?;
                let module = self.class_variable_base()?;
                described(module.class_variable(&name).is_some(), "class variable")
            }

            GetConstant => {
                let name = args.str()?;
                value(self.constant_or_raise(&name)?)
            }
            ConstantGeneration => Ok(Some(Slot::Int(self.constant_generation()))),
            GetConstantFrom => {
                let namespace = self.namespace_value(args.value()?)?;
                let name = args.str()?;
                match namespace.find_constant(&name) {
                    Some(found) => value(found),
                    None => {
                        let message =
                            format!("uninitialized constant {}::{}", namespace.name(), name);
                        Err(self.name_error(message))
                    }
                }
            }
            DefinedConstant => {
                let name = args.str()?;
                described(self.lookup_constant(&name)?.is_some(), "constant")
            }
            DefinedConstantFrom => {
                let namespace = self.namespace_value(args.value()?)?;
                let name = args.str()?;
                described(namespace.find_constant(&name).is_some(), "constant")
            }
            SetConstant => {
                let assigned = args.value()?;
                let name = args.str()?;
                let module = self.current_frame()?.cref.module.clone();
                self.define_constant(&module, &name, assigned.clone());
                value(assigned)
            }
            SetConstantIn => {
                let assigned = args.value()?;
                let module = self.namespace_value(args.value()?)?;
                let name = args.str()?;
                self.define_constant(&module, &name, assigned.clone());
                value(assigned)
            }

            DefinedMethod => {
                let receiver = args.value()?;
                let name = args.str()?;
                let functional = args.bool()?;
                described(self.responds_to(&receiver, &name, functional), "method")
            }
            DefinedSuper => {
                let frame = self.current_frame()?;
                let found = match &frame.method {
                    Some(method) => self
                        .class_of(&frame.self_value)
                        .find_super_method(&method.owner, &method.name)
                        .is_some(),
                    None => false,
                };
                described(found, "super")
            }
            Backref => {
                let index = args.index()?;
                let found = self.last_match.as_ref().and_then(|last| {
                    match BACKREFS.chars().nth(index)? {
                        '~' | '&' => Some(last.matched.clone()),
                        '`' => Some(last.pre.clone()),
                        '\'' => Some(last.post.clone()),
                        _ => None,
                    }
                });
                value(found.map_or(Value::Nil, Value::str))
            }
            NthRef => {
                let _group = args.int()?;
                value(Value::Nil)
            }
            WhenSplat => {
                let candidates = args.value()?;
                let subject = args.optional_value()?;
                for candidate in self.splat(&candidates) {
                    let matched = match &subject {
                        Some(subject) => self
                            .call_method(&candidate, "===", vec![subject.clone()], None, false)?
                            .is_truthy(),
                        None => candidate.is_truthy(),
                    };
                    if matched {
                        return Ok(Some(Slot::Bool(true)));
                    }
                }
                Ok(Some(Slot::Bool(false)))
            }
            PreLoad => {
                let scope = args.static_scope()?;
                self.scopes.push(DynamicScope::new(scope, None));
                Ok(None)
            }
            PostLoad => {
                self.scopes.pop();
                Ok(None)
            }

            IsTrue | StoreExceptionInErrorInfo | SignalValue | ScopeValues | GetValueDepthZero(_)
            | SetValueDepthZero(_) | GetValue | SetValue | Call(_) | CallBoxed => {
                Err(Error::SlotMismatch {
                    expected: "helper taking a context",
                    found: helper.name().to_string(),
                }
                .into())
            }
        }
    }

    /// Elements a value contributes when splatted
    pub(crate) fn splat(&self, splatted: &Value) -> Vec<Value> {
        match splatted {
            Value::Array(elements) => elements.borrow().clone(),
            Value::Nil => vec![],
            Value::Hash(hash) => hash
                .borrow()
                .entries()
                .iter()
                .map(|(key, value)| Value::array(vec![key.clone(), value.clone()]))
                .collect(),
            other => vec![other.clone()],
        }
    }

    fn array_mut(&mut self, array: &Value) -> Result<Rc<RefCell<Vec<Value>>>, Error> {
        match array {
            Value::Array(elements) => Ok(elements.clone()),
            other => Err(Slot::Value(other.clone()).mismatch("array")),
        }
    }

    pub(crate) fn new_regexp(pattern: &str, options: i64) -> Value {
        Value::Regexp(Rc::new(RegexpValue {
            pattern: pattern.to_string(),
            options,
        }))
    }

    pub(crate) fn frozen_error(&mut self, target: &Value) -> Unwind {
        let class = self.core.frozen_error.clone();
        let message = format!("can't modify frozen {}", self.real_class_of(target).name());
        self.raise(&class, message)
    }

    pub(crate) fn constant_or_raise(&mut self, name: &str) -> Result<Value, Unwind> {
        match self.lookup_constant(name)? {
            Some(found) => Ok(found),
            None => Err(self.name_error(format!("uninitialized constant {}", name))),
        }
    }

    /// Module a class or module is defined under: the given one or the lexical one
    fn namespace(&mut self, given: Option<Value>) -> Result<Rc<Module>, Unwind> {
        match given {
            Some(given) => self.namespace_value(given),
            None => Ok(self.current_frame()?.cref.module.clone()),
        }
    }

    fn namespace_value(&mut self, given: Value) -> Result<Rc<Module>, Unwind> {
        match given {
            Value::Module(module) => Ok(module),
            other => {
                let message = format!("{:?} is not a class/module", other);
                Err(self.type_error(message))
            }
        }
    }

    fn define_class(
        &mut self,
        namespace: &Rc<Module>,
        name: &str,
        superclass: Option<Rc<Module>>,
    ) -> Result<Rc<Module>, Unwind> {
        if let Some(existing) = namespace.own_constant(name) {
            let class = match existing {
                Value::Module(module) if module.is_class() => module,
                _ => return Err(self.type_error(format!("{} is not a class", name))),
            };
            if let Some(superclass) = superclass {
                let matches = class
                    .superclass()
                    .map_or(false, |current| current.id == superclass.id);
                if !matches {
                    let message = format!("superclass mismatch for class {}", name);
                    return Err(self.type_error(message));
                }
            }
            return Ok(class);
        }
        let superclass = superclass.unwrap_or_else(|| self.core.object.clone());
        let class = self.new_module(ModuleKind::Class, Some(superclass.clone()));
        self.define_constant(namespace, name, Value::Module(class.clone()));
        let parent = Value::Module(superclass);
        if let Some((_, entry)) = self.class_of(&parent).find_method("inherited") {
            if matches!(entry.body, MethodBody::Compiled { .. }) {
                let child = Value::Module(class.clone());
                self.call_method(&parent, "inherited", vec![child], None, true)?;
            }
        }
        Ok(class)
    }

    fn define_module(&mut self, namespace: &Rc<Module>, name: &str) -> Result<Rc<Module>, Unwind> {
        if let Some(existing) = namespace.own_constant(name) {
            return match existing {
                Value::Module(module) if !module.is_class() => Ok(module),
                _ => Err(self.type_error(format!("{} is not a module", name))),
            };
        }
        let module = self.new_module(ModuleKind::Module, None);
        self.define_constant(namespace, name, Value::Module(module.clone()));
        Ok(module)
    }

    fn enter_class_body(
        &mut self,
        module: Rc<Module>,
        scope: Rc<ScopeDescriptor>,
        needs_scope: bool,
    ) -> Result<(), Unwind> {
        let cref = Cref::nest(&self.current_frame()?.cref, module.clone());
        let id = self.fresh_id();
        log::trace!("entering body of {}", module.name());
        self.frames.push(Rc::new(Frame {
            id,
            home: id,
            self_value: Value::Module(module),
            method: None,
            block: None,
            cref,
            running_block: None,
            pushed_scope: needs_scope,
            default_visibility: Cell::new(Visibility::Public),
        }));
        if needs_scope {
            self.scopes.push(DynamicScope::new(scope, None));
        }
        Ok(())
    }

    /// Pop the current frame, and the scope it pushed
    pub(crate) fn leave_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            if frame.pushed_scope {
                self.scopes.pop();
            }
        }
    }

    pub(crate) fn alias_method(&mut self, module: &Rc<Module>, new_name: &str, old_name: &str) -> Result<(), Unwind> {
        match module.find_method(old_name) {
            Some((_, entry)) => {
                module.define_method(new_name, entry);
                self.methods_changed();
                Ok(())
            }
            None => {
                let message = format!(
                    "undefined method `{}' for class `{}'",
                    old_name,
                    module.name()
                );
                Err(self.name_error(message))
            }
        }
    }

    fn create_block(
        &mut self,
        self_value: Value,
        body: Rc<BlockBody>,
        shares_scope: bool,
    ) -> Result<Rc<Block>, Unwind> {
        let frame = self.current_frame()?;
        let id = self.fresh_id();
        Ok(Rc::new(Block {
            id,
            code: BlockCode::Compiled(body),
            self_value,
            scope: self.scopes.last().cloned(),
            frame,
            shares_scope,
            lambda: false,
        }))
    }

    /// Block for a `&value` argument
    pub(crate) fn to_block(&mut self, source: &Value) -> Result<Option<Rc<Block>>, Unwind> {
        match source {
            Value::Nil => Ok(None),
            Value::Proc(block) => Ok(Some(block.clone())),
            Value::Symbol(name) => {
                let frame = self.current_frame()?;
                let id = self.fresh_id();
                Ok(Some(Rc::new(Block {
                    id,
                    code: BlockCode::Symbol(name.clone()),
                    self_value: Value::Nil,
                    scope: None,
                    frame,
                    shares_scope: false,
                    lambda: false,
                })))
            }
            other => {
                let message = format!(
                    "wrong argument type {} (expected Proc)",
                    self.real_class_of(other).name()
                );
                Err(self.type_error(message))
            }
        }
    }

    pub(crate) fn instance_variable(target: &Value, name: &str) -> Option<Value> {
        match target {
            Value::Object(object) => object.ivar(name),
            Value::Module(module) => module.ivar(name),
            _ => None,
        }
    }

    pub(crate) fn set_instance_variable(
        &mut self,
        target: &Value,
        name: &str,
        assigned: Value,
    ) -> Result<(), Unwind> {
        match target {
            Value::Object(object) => object.set_ivar(name, assigned),
            Value::Module(module) => module.set_ivar(name, assigned),
            other => return Err(self.frozen_error(other)),
        }
        Ok(())
    }

    /// Module class variables are looked up from: the lexical class, skipping singletons
    fn class_variable_base(&self) -> Result<Rc<Module>, Error> {
        let frame = self.current_frame()?;
        let mut cref = Some(frame.cref.clone());
        while let Some(current) = cref {
            if current.module.kind != ModuleKind::Singleton {
                return Ok(current.module.clone());
            }
            cref = current.parent.clone();
        }
        Ok(self.core.object.clone())
    }
}
