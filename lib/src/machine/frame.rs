use super::{Cref, Instance, MethodEntry, Module, Value, Visibility};
use crate::abi::{BlockDescriptor, CallType, ScopeDescriptor};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Method being executed by a frame, for `super` and argument-less `super`
pub struct MethodContext {
    pub name: Rc<str>,
    pub owner: Rc<Module>,
    pub args: Vec<Value>,
}

/// Activation record of a method, block or class body
pub struct Frame {
    pub id: usize,

    /// Frame a `return` from this frame returns from: the frame itself for methods and
    /// lambdas, the defining method's frame for other blocks
    pub home: usize,
    pub self_value: Value,
    pub method: Option<Rc<MethodContext>>,

    /// Block passed to the method
    pub block: Option<Rc<Block>>,
    pub cref: Rc<Cref>,

    /// Identity of the block this frame runs, if any
    pub running_block: Option<usize>,

    /// The frame pushed a scope that must be popped with it
    pub pushed_scope: bool,

    /// Visibility given to methods defined from this frame
    pub default_visibility: Cell<Visibility>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("home", &self.home)
            .field("self", &self.self_value)
            .field("method", &self.method.as_ref().map(|m| m.name.clone()))
            .finish_non_exhaustive()
    }
}

/// Runtime scope: the values of one body's variables, linked to the enclosing scope
pub struct DynamicScope {
    pub descriptor: Rc<ScopeDescriptor>,
    pub values: Rc<RefCell<Vec<Value>>>,
    pub parent: Option<Rc<DynamicScope>>,
}

impl DynamicScope {
    /// Fresh scope with every variable `nil`
    pub fn new(descriptor: Rc<ScopeDescriptor>, parent: Option<Rc<DynamicScope>>) -> Rc<DynamicScope> {
        let values = vec![Value::Nil; descriptor.names.len()];
        Rc::new(DynamicScope {
            descriptor,
            values: Rc::new(RefCell::new(values)),
            parent,
        })
    }

    /// Scope `depth` levels up (0 is this scope)
    pub fn ancestor(self: &Rc<DynamicScope>, depth: usize) -> Option<Rc<DynamicScope>> {
        let mut scope = self.clone();
        for _ in 0..depth {
            scope = scope.parent.clone()?;
        }
        Some(scope)
    }

    pub fn get(&self, index: usize) -> Value {
        self.values
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or(Value::Nil)
    }

    pub fn set(&self, index: usize, value: Value) {
        let mut values = self.values.borrow_mut();
        if index >= values.len() {
            values.resize(index + 1, Value::Nil);
        }
        values[index] = value;
    }

    /// Value of a variable by name
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let index = self.descriptor.names.iter().position(|n| n == name)?;
        Some(self.get(index))
    }
}

impl fmt::Debug for DynamicScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicScope")
            .field("names", &self.descriptor.names)
            .field("values", &self.values.borrow())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Code shared by every block created from one closure
pub struct BlockBody {
    pub instance: Rc<Instance>,
    pub descriptor: BlockDescriptor,
    pub routine: usize,
    pub scope: Rc<ScopeDescriptor>,
}

impl fmt::Debug for BlockBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockBody")
            .field("routine", &self.descriptor.routine)
            .field("kind", &self.descriptor.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub enum BlockCode {
    Compiled(Rc<BlockBody>),

    /// `&:name`: calls the named method on the first argument
    Symbol(Rc<str>),
}

/// Block: closure code bound to `self`, the defining scope and the defining frame
#[derive(Clone)]
pub struct Block {
    pub id: usize,
    pub code: BlockCode,
    pub self_value: Value,
    pub scope: Option<Rc<DynamicScope>>,
    pub frame: Rc<Frame>,

    /// Runs in the defining scope instead of a fresh child scope (`for` loops)
    pub shares_scope: bool,
    pub lambda: bool,
}

impl Block {
    pub fn arity_value(&self) -> i64 {
        match &self.code {
            BlockCode::Compiled(body) => body.descriptor.arity.value(),
            BlockCode::Symbol(_) => -2,
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("lambda", &self.lambda)
            .field("shares_scope", &self.shares_scope)
            .finish_non_exhaustive()
    }
}

/// Monomorphic inline cache entry of a call site
#[derive(Clone)]
pub struct CachedMethod {
    pub class_id: usize,
    pub serial: u64,
    pub owner: Rc<Module>,
    pub entry: Rc<MethodEntry>,
}

/// Dispatch handle of one call site
pub struct CallSite {
    pub name: Rc<str>,
    pub call_type: CallType,
    pub(crate) cache: RefCell<Option<CachedMethod>>,
}

impl CallSite {
    pub fn new(name: &str, call_type: CallType) -> CallSite {
        CallSite {
            name: Rc::from(name),
            call_type,
            cache: RefCell::new(None),
        }
    }

    /// Cached target, if it was looked up for this class since the last method definition
    pub fn cached(&self, class_id: usize, serial: u64) -> Option<CachedMethod> {
        self.cache
            .borrow()
            .as_ref()
            .filter(|cached| cached.class_id == class_id && cached.serial == serial)
            .cloned()
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("name", &self.name)
            .field("call_type", &self.call_type)
            .finish_non_exhaustive()
    }
}
