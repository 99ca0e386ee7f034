use super::{Block, Module};
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// Language-level value
///
/// Immediates are stored inline, everything else is shared through `Rc` so that copies of a
/// value alias the same object.
#[derive(Clone)]
pub enum Value {
    Nil,
    True,
    False,
    Fixnum(i64),
    Float(f64),
    Symbol(Rc<str>),
    Str(Rc<RString>),
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<HashValue>>),
    Range(Rc<RangeValue>),
    Regexp(Rc<RegexpValue>),
    Proc(Rc<Block>),
    Module(Rc<Module>),
    Object(Rc<Object>),
}

impl Value {
    pub fn bool(value: bool) -> Value {
        if value {
            Value::True
        } else {
            Value::False
        }
    }

    pub fn str(value: impl Into<String>) -> Value {
        Value::Str(Rc::new(RString::new(value.into())))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Rc::from(name))
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    pub fn hash(hash: HashValue) -> Value {
        Value::Hash(Rc::new(RefCell::new(hash)))
    }

    /// Everything except `nil` and `false` is true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::False)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_fixnum(&self) -> Option<i64> {
        match self {
            Value::Fixnum(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&Rc<Module>> {
        match self {
            Value::Module(module) => Some(module),
            _ => None,
        }
    }

    /// Contents of a string or the name of a symbol
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Str(string) => Some(string.to_string()),
            Value::Symbol(name) => Some(name.to_string()),
            _ => None,
        }
    }

    /// Snapshot of the elements of an array
    pub fn array_elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(elements) => Some(elements.borrow().clone()),
            _ => None,
        }
    }

    /// Object identity (`equal?`)
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::True, Value::True) | (Value::False, Value::False) => {
                true
            }
            (Value::Fixnum(a), Value::Fixnum(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => Rc::ptr_eq(a, b),
            (Value::Regexp(a), Value::Regexp(b)) => Rc::ptr_eq(a, b),
            (Value::Proc(a), Value::Proc(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality of the builtin value types, identity for everything else
    ///
    /// This is `eql?`: hash keys compare this way, and `==` starts from it.
    pub fn eql(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => *a.borrow() == *b.borrow(),
            (Value::Array(a), Value::Array(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eql(y))
                }
            }
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Range(a), Value::Range(b)) => {
                a.exclusive == b.exclusive && a.begin.eql(&b.begin) && a.end.eql(&b.end)
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            _ => self.same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::True => f.write_str("true"),
            Value::False => f.write_str("false"),
            Value::Fixnum(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:?}", value),
            Value::Symbol(name) => write!(f, ":{}", name),
            Value::Str(string) => write!(f, "{:?}", &*string.borrow()),
            Value::Array(elements) => f.debug_list().entries(elements.borrow().iter()).finish(),
            Value::Hash(hash) => f
                .debug_map()
                .entries(hash.borrow().entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Value::Range(range) => {
                let dots = if range.exclusive { "..." } else { ".." };
                write!(f, "{:?}{}{:?}", range.begin, dots, range.end)
            }
            Value::Regexp(regexp) => write!(f, "/{}/", regexp.pattern),
            Value::Proc(block) => write!(f, "#<Proc:{}>", block.id),
            Value::Module(module) => f.write_str(&module.name()),
            Value::Object(object) => write!(f, "#<{}>", object.class.name()),
        }
    }
}

/// Mutable string, frozen when it is the prototype of a literal
pub struct RString {
    value: RefCell<String>,
    frozen: Cell<bool>,
}

impl RString {
    pub fn new(value: String) -> RString {
        RString {
            value: RefCell::new(value),
            frozen: Cell::new(false),
        }
    }

    pub fn frozen(value: String) -> RString {
        let string = RString::new(value);
        string.freeze();
        string
    }

    pub fn borrow(&self) -> Ref<'_, String> {
        self.value.borrow()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    /// Append, unless the string is frozen (in which case `false` is returned)
    pub fn push_str(&self, tail: &str) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.value.borrow_mut().push_str(tail);
        true
    }
}

impl fmt::Display for RString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value.borrow())
    }
}

/// Insertion-ordered hash table with `eql?` keys
#[derive(Clone, Default)]
pub struct HashValue {
    entries: Vec<(Value, Value)>,
}

impl HashValue {
    pub fn new() -> HashValue {
        HashValue::default()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.eql(key))
            .map(|(_, value)| value)
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| k.eql(&key)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k.eql(key))?;
        Some(self.entries.remove(position).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }
}

impl PartialEq for HashValue {
    fn eq(&self, other: &HashValue) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(key, value)| other.get(key).map_or(false, |v| v.eql(value)))
    }
}

pub struct RangeValue {
    pub begin: Value,
    pub end: Value,
    pub exclusive: bool,
}

impl RangeValue {
    /// Integer bounds as a half-open interval, if both ends are fixnums
    pub fn fixnum_bounds(&self) -> Option<(i64, i64)> {
        let begin = self.begin.as_fixnum()?;
        let end = self.end.as_fixnum()?;
        Some((begin, if self.exclusive { end } else { end + 1 }))
    }
}

/// Compiled regular expression
///
/// Patterns are matched literally: the machine carries no regular expression engine.
pub struct RegexpValue {
    pub pattern: String,
    pub options: i64,
}

impl RegexpValue {
    /// Byte offset of the first match in `haystack`
    pub fn find(&self, haystack: &str) -> Option<usize> {
        if self.options & 1 != 0 {
            haystack
                .to_lowercase()
                .find(&self.pattern.to_lowercase())
        } else {
            haystack.find(&self.pattern)
        }
    }
}

/// Instance of a user-defined class (exceptions included)
pub struct Object {
    pub class: Rc<Module>,
    ivars: RefCell<Vec<(String, Value)>>,
    pub(crate) singleton: RefCell<Option<Rc<Module>>>,
}

impl Object {
    pub fn new(class: Rc<Module>) -> Object {
        Object {
            class,
            ivars: RefCell::new(vec![]),
            singleton: RefCell::new(None),
        }
    }

    pub fn ivar(&self, name: &str) -> Option<Value> {
        self.ivars
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.clone())
    }

    pub fn set_ivar(&self, name: &str, value: Value) {
        let mut ivars = self.ivars.borrow_mut();
        match ivars.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => ivars.push((name.to_string(), value)),
        }
    }

    /// Instance variables in assignment order
    pub fn ivars(&self) -> Vec<(String, Value)> {
        self.ivars.borrow().clone()
    }
}
