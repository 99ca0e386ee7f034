use super::{Block, BlockBody, CallSite, DynamicScope, Error, Unwind, Value};
use crate::abi::ScopeDescriptor;
use crate::vm::{Artifact, MemberName, SlotType};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Content of an operand-stack slot, local slot or field
#[derive(Clone, Debug)]
pub enum Slot {
    Null,
    Instance(Rc<Instance>),
    Context,
    Value(Value),
    Objects(Rc<RefCell<Vec<Value>>>),
    Int(i64),
    Bool(bool),
    Float(f64),
    Str(Rc<str>),
    Scope(Rc<DynamicScope>),
    StaticScope(Rc<ScopeDescriptor>),
    Block(Rc<Block>),
    BlockBody(Rc<BlockBody>),
    CallSite(Rc<CallSite>),
    Signal(Unwind),
}

impl Slot {
    pub fn objects(values: Vec<Value>) -> Slot {
        Slot::Objects(Rc::new(RefCell::new(values)))
    }

    pub fn block(block: Option<Rc<Block>>) -> Slot {
        block.map_or(Slot::Null, Slot::Block)
    }

    fn describe(&self) -> String {
        match self {
            Slot::Null => "null".to_string(),
            Slot::Instance(_) => "artifact instance".to_string(),
            Slot::Context => "context".to_string(),
            Slot::Value(value) => format!("value {:?}", value),
            Slot::Objects(_) => "host array".to_string(),
            Slot::Int(value) => format!("int {}", value),
            Slot::Bool(value) => format!("bool {}", value),
            Slot::Float(value) => format!("float {}", value),
            Slot::Str(value) => format!("string {:?}", value),
            Slot::Scope(_) => "scope".to_string(),
            Slot::StaticScope(_) => "static scope".to_string(),
            Slot::Block(_) => "block".to_string(),
            Slot::BlockBody(_) => "block body".to_string(),
            Slot::CallSite(_) => "call site".to_string(),
            Slot::Signal(_) => "signal".to_string(),
        }
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> Error {
        Error::SlotMismatch {
            expected,
            found: self.describe(),
        }
    }

    pub fn into_value(self) -> Result<Value, Error> {
        match self {
            Slot::Value(value) => Ok(value),
            other => Err(other.mismatch("value")),
        }
    }

    pub fn into_int(self) -> Result<i64, Error> {
        match self {
            Slot::Int(value) => Ok(value),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn into_objects(self) -> Result<Rc<RefCell<Vec<Value>>>, Error> {
        match self {
            Slot::Objects(values) => Ok(values),
            other => Err(other.mismatch("host array")),
        }
    }

    pub fn into_instance(self) -> Result<Rc<Instance>, Error> {
        match self {
            Slot::Instance(instance) => Ok(instance),
            other => Err(other.mismatch("artifact instance")),
        }
    }
}

/// Binding of a dynamically linked site
#[derive(Clone)]
pub(crate) struct Link {
    pub target: Slot,

    /// Constant name and the version of its switch point when the site was linked
    pub guard: Option<(Rc<str>, u64)>,
}

/// Loaded artifact: its code, the values of its fields and its linked sites
pub struct Instance {
    artifact: Artifact,
    fields: RefCell<Vec<Slot>>,
    links: RefCell<HashMap<(usize, usize), Link>>,
}

impl Instance {
    pub(crate) fn new(artifact: Artifact) -> Instance {
        let fields = artifact
            .fields()
            .iter()
            .map(|field| match field.slot_type {
                SlotType::Int => Slot::Int(0),
                SlotType::Bool => Slot::Bool(false),
                SlotType::Float => Slot::Float(0.0),
                _ => Slot::Null,
            })
            .collect();
        Instance {
            artifact,
            fields: RefCell::new(fields),
            links: RefCell::new(HashMap::new()),
        }
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub(crate) fn routine_index(&self, name: &MemberName) -> Result<usize, Error> {
        self.artifact
            .routine_position(name)
            .ok_or_else(|| Error::MissingRoutine(name.to_string()))
    }

    pub(crate) fn get_field(&self, name: &MemberName) -> Result<Slot, Error> {
        let position = self
            .artifact
            .field_position(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))?;
        Ok(self.fields.borrow()[position].clone())
    }

    pub(crate) fn put_field(&self, name: &MemberName, value: Slot) -> Result<(), Error> {
        let position = self
            .artifact
            .field_position(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))?;
        self.fields.borrow_mut()[position] = value;
        Ok(())
    }

    /// Current content of a field, by name
    pub fn field(&self, name: &str) -> Option<Slot> {
        let position = self
            .artifact
            .fields()
            .iter()
            .position(|field| field.name.as_ref() == name)?;
        Some(self.fields.borrow()[position].clone())
    }

    pub(crate) fn link(&self, site: (usize, usize)) -> Option<Link> {
        self.links.borrow().get(&site).cloned()
    }

    pub(crate) fn bind(&self, site: (usize, usize), link: Link) {
        self.links.borrow_mut().insert(site, link);
    }

    /// Number of dynamically linked sites bound so far
    pub fn linked_sites(&self) -> usize {
        self.links.borrow().len()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("artifact", &self.artifact.name)
            .field("linked_sites", &self.linked_sites())
            .finish_non_exhaustive()
    }
}
