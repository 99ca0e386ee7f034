use super::{Block, Instance, Runtime, Unwind, Value};
use crate::abi::MethodDescriptor;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Natively implemented method: `(runtime, receiver, arguments, block)`
pub type Builtin = fn(&mut Runtime, &Value, &[Value], Option<&Rc<Block>>) -> Result<Value, Unwind>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Clone)]
pub enum MethodBody {
    /// Method compiled into an artifact
    Compiled {
        instance: Rc<Instance>,
        descriptor: Rc<MethodDescriptor>,
        cref: Rc<Cref>,
    },
    Builtin(Builtin),
    AttrReader(String),
    AttrWriter(String),

    /// Stops method lookup (`undef`)
    Undefined,
}

#[derive(Clone)]
pub struct MethodEntry {
    pub visibility: Visibility,
    pub body: MethodBody,
}

impl MethodEntry {
    pub fn public(body: MethodBody) -> Rc<MethodEntry> {
        Rc::new(MethodEntry {
            visibility: Visibility::Public,
            body,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModuleKind {
    Class,
    Module,

    /// Singleton class of one object (or metaclass of a module)
    Singleton,
}

/// Class or module: method table, constants, class variables and ancestry
pub struct Module {
    pub id: usize,
    pub kind: ModuleKind,
    name: RefCell<Option<String>>,
    superclass: RefCell<Option<Rc<Module>>>,
    includes: RefCell<Vec<Rc<Module>>>,
    methods: RefCell<HashMap<String, Rc<MethodEntry>>>,
    constants: RefCell<HashMap<String, Value>>,
    class_variables: RefCell<HashMap<String, Value>>,
    ivars: RefCell<HashMap<String, Value>>,
    pub(crate) metaclass: RefCell<Option<Rc<Module>>>,
}

impl Module {
    pub fn new(
        id: usize,
        kind: ModuleKind,
        name: Option<String>,
        superclass: Option<Rc<Module>>,
    ) -> Rc<Module> {
        Rc::new(Module {
            id,
            kind,
            name: RefCell::new(name),
            superclass: RefCell::new(superclass),
            includes: RefCell::new(vec![]),
            methods: RefCell::new(HashMap::new()),
            constants: RefCell::new(HashMap::new()),
            class_variables: RefCell::new(HashMap::new()),
            ivars: RefCell::new(HashMap::new()),
            metaclass: RefCell::new(None),
        })
    }

    pub fn is_class(&self) -> bool {
        !matches!(self.kind, ModuleKind::Module)
    }

    /// Name, or an anonymous placeholder
    pub fn name(&self) -> String {
        match &*self.name.borrow() {
            Some(name) => name.clone(),
            None => format!("#<{}:{}>", if self.is_class() { "Class" } else { "Module" }, self.id),
        }
    }

    pub fn has_name(&self) -> bool {
        self.name.borrow().is_some()
    }

    pub fn set_name(&self, name: String) {
        *self.name.borrow_mut() = Some(name);
    }

    pub fn superclass(&self) -> Option<Rc<Module>> {
        self.superclass.borrow().clone()
    }

    pub fn include(&self, module: Rc<Module>) {
        let mut includes = self.includes.borrow_mut();
        if !includes.iter().any(|m| m.id == module.id) {
            includes.push(module);
        }
    }

    /// Method resolution order: each class, then its included modules (latest first)
    pub fn ancestors(self: &Rc<Module>) -> Vec<Rc<Module>> {
        let mut ancestors = vec![];
        let mut current = Some(self.clone());
        while let Some(module) = current {
            ancestors.push(module.clone());
            ancestors.extend(module.includes.borrow().iter().rev().cloned());
            current = module.superclass();
        }
        ancestors
    }

    pub fn is_kind_of(self: &Rc<Module>, other: &Module) -> bool {
        self.ancestors().iter().any(|ancestor| ancestor.id == other.id)
    }

    pub fn define_method(&self, name: &str, entry: Rc<MethodEntry>) {
        self.methods.borrow_mut().insert(name.to_string(), entry);
    }

    pub fn define_builtin(&self, name: &str, builtin: Builtin) {
        self.define_method(name, MethodEntry::public(MethodBody::Builtin(builtin)));
    }

    pub fn own_method(&self, name: &str) -> Option<Rc<MethodEntry>> {
        self.methods.borrow().get(name).cloned()
    }

    /// Names of the methods defined directly on this module
    pub fn own_method_names(&self) -> Vec<String> {
        let methods = self.methods.borrow();
        let mut names: Vec<String> = methods
            .iter()
            .filter(|(_, entry)| !matches!(entry.body, MethodBody::Undefined))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Find a method along the ancestors, returning it with the module that defines it
    pub fn find_method(self: &Rc<Module>, name: &str) -> Option<(Rc<Module>, Rc<MethodEntry>)> {
        Self::search(self.ancestors().into_iter(), name)
    }

    /// Find the method `super` reaches from a method defined in `owner`
    pub fn find_super_method(
        self: &Rc<Module>,
        owner: &Module,
        name: &str,
    ) -> Option<(Rc<Module>, Rc<MethodEntry>)> {
        let ancestors = self.ancestors();
        let after_owner = ancestors
            .into_iter()
            .skip_while(|module| module.id != owner.id)
            .skip(1);
        Self::search(after_owner, name)
    }

    fn search(
        mut modules: impl Iterator<Item = Rc<Module>>,
        name: &str,
    ) -> Option<(Rc<Module>, Rc<MethodEntry>)> {
        modules.find_map(|module| {
            let entry = module.own_method(name)?;
            Some((module, entry))
        })
        .and_then(|(module, entry)| match entry.body {
            MethodBody::Undefined => None,
            _ => Some((module, entry)),
        })
    }

    pub fn own_constant(&self, name: &str) -> Option<Value> {
        self.constants.borrow().get(name).cloned()
    }

    pub fn set_constant(&self, name: &str, value: Value) {
        self.constants.borrow_mut().insert(name.to_string(), value);
    }

    /// Look a constant up in this module and its ancestors
    pub fn find_constant(self: &Rc<Module>, name: &str) -> Option<Value> {
        self.ancestors()
            .iter()
            .find_map(|module| module.own_constant(name))
    }

    /// Module among the ancestors that holds a class variable
    pub fn class_variable_owner(self: &Rc<Module>, name: &str) -> Option<Rc<Module>> {
        self.ancestors()
            .into_iter()
            .find(|module| module.class_variables.borrow().contains_key(name))
    }

    pub fn class_variable(self: &Rc<Module>, name: &str) -> Option<Value> {
        let owner = self.class_variable_owner(name)?;
        let value = owner.class_variables.borrow().get(name).cloned();
        value
    }

    pub fn set_class_variable(&self, name: &str, value: Value) {
        self.class_variables
            .borrow_mut()
            .insert(name.to_string(), value);
    }

    pub fn ivar(&self, name: &str) -> Option<Value> {
        self.ivars.borrow().get(name).cloned()
    }

    pub fn set_ivar(&self, name: &str, value: Value) {
        self.ivars.borrow_mut().insert(name.to_string(), value);
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Lexical module nesting, used for constant lookup and as the target of `def`
pub struct Cref {
    pub module: Rc<Module>,
    pub parent: Option<Rc<Cref>>,
}

impl Cref {
    pub fn top(object_class: Rc<Module>) -> Rc<Cref> {
        Rc::new(Cref {
            module: object_class,
            parent: None,
        })
    }

    pub fn nest(parent: &Rc<Cref>, module: Rc<Module>) -> Rc<Cref> {
        Rc::new(Cref {
            module,
            parent: Some(parent.clone()),
        })
    }

    /// Lexically enclosing modules, innermost first (the top level excluded)
    pub fn lexical_modules(&self) -> Vec<Rc<Module>> {
        let mut modules = vec![];
        let mut current = Some(self);
        while let Some(cref) = current {
            if cref.parent.is_some() {
                modules.push(cref.module.clone());
            }
            current = cref.parent.as_deref();
        }
        modules
    }
}
