//! Natively implemented core methods
//!
//! Every builtin has the [`Builtin`](super::Builtin) signature. Builtins push no frame of their
//! own, so "the current frame" inside one is the caller's.

mod classes;
mod collections;
mod exception;
mod kernel;
mod numeric;
mod proc;
mod string;

use super::{Block, Runtime, Unwind, Value};
use std::cmp::Ordering;
use std::rc::Rc;

pub(crate) fn install(runtime: &mut Runtime) {
    kernel::install(runtime);
    classes::install(runtime);
    numeric::install(runtime);
    string::install(runtime);
    collections::install(runtime);
    proc::install(runtime);
    exception::install(runtime);
}

/// Argument `index`, or `nil`
fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Nil)
}

/// Float the way `Float#to_s` prints it
pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// String literal form, with the usual escapes
pub(crate) fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            '\u{1b}' => quoted.push_str("\\e"),
            c if c.is_control() => quoted.push_str(&format!("\\x{:02X}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

impl Runtime {
    /// `to_s` of a value, dispatching only for objects that may override it
    pub(crate) fn to_s(&mut self, value: &Value) -> Result<String, Unwind> {
        match value {
            Value::Str(string) => Ok(string.to_string()),
            Value::Symbol(name) => Ok(name.to_string()),
            Value::Fixnum(number) => Ok(number.to_string()),
            Value::Float(number) => Ok(format_float(*number)),
            Value::Nil => Ok(String::new()),
            Value::True => Ok("true".to_string()),
            Value::False => Ok("false".to_string()),
            other => {
                let converted = self.call_method(other, "to_s", vec![], None, true)?;
                match converted {
                    Value::Str(string) => Ok(string.to_string()),
                    _ => Ok(self.default_to_s(other)),
                }
            }
        }
    }

    /// `#<ClassName>`, or `main` for the top-level object
    pub(crate) fn default_to_s(&self, value: &Value) -> String {
        if value.same(self.main()) {
            return "main".to_string();
        }
        match value {
            Value::Module(module) => module.name(),
            other => format!("#<{}>", self.real_class_of(other).name()),
        }
    }

    /// `inspect` of a value
    pub fn inspect(&mut self, value: &Value) -> Result<String, Unwind> {
        Ok(match value {
            Value::Nil => "nil".to_string(),
            Value::True | Value::False | Value::Fixnum(_) | Value::Float(_) => self.to_s(value)?,
            Value::Str(string) => quote(&string.borrow()),
            Value::Symbol(name) => format!(":{}", name),
            Value::Module(module) => module.name(),
            Value::Array(elements) => {
                let elements = elements.borrow().clone();
                let mut parts = Vec::with_capacity(elements.len());
                for element in &elements {
                    parts.push(self.inspect(element)?);
                }
                format!("[{}]", parts.join(", "))
            }
            Value::Hash(hash) => {
                let entries = hash.borrow().entries().to_vec();
                if entries.is_empty() {
                    return Ok("{}".to_string());
                }
                let mut parts = Vec::with_capacity(entries.len());
                for (key, stored) in &entries {
                    parts.push(format!("{}=>{}", self.inspect(key)?, self.inspect(stored)?));
                }
                format!("{{{}}}", parts.join(", "))
            }
            Value::Range(range) => {
                let dots = if range.exclusive { "..." } else { ".." };
                let begin = self.inspect(&range.begin)?;
                let end = self.inspect(&range.end)?;
                format!("{}{}{}", begin, dots, end)
            }
            Value::Regexp(regexp) => format!("/{}/", regexp.pattern),
            Value::Proc(block) => {
                let lambda = if block.lambda { " (lambda)" } else { "" };
                format!("#<Proc:{}{}>", block.id, lambda)
            }
            Value::Object(_) => {
                let inspected = self.call_method(value, "inspect", vec![], None, true)?;
                match inspected {
                    Value::Str(string) => string.to_string(),
                    _ => self.default_to_s(value),
                }
            }
        })
    }

    /// `==`, without dispatch for the builtin value types
    pub(crate) fn equals(&mut self, lhs: &Value, rhs: &Value) -> Result<bool, Unwind> {
        match (lhs, rhs) {
            (Value::Fixnum(a), Value::Float(b)) | (Value::Float(b), Value::Fixnum(a)) => {
                Ok(*a as f64 == *b)
            }
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !self.equals(x, y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Object(_), _) => Ok(self
                .call_method(lhs, "==", vec![rhs.clone()], None, true)?
                .is_truthy()),
            _ => Ok(lhs.eql(rhs)),
        }
    }

    /// `<=>` for sorting; `None` when the values don't compare
    pub(crate) fn compare(&mut self, lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, Unwind> {
        Ok(match (lhs, rhs) {
            (Value::Fixnum(a), Value::Fixnum(b)) => Some(a.cmp(b)),
            (Value::Fixnum(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Fixnum(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.borrow().as_str().cmp(b.borrow().as_str())),
            (Value::Symbol(a), Value::Symbol(b)) => Some(a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                for (x, y) in a.iter().zip(b.iter()) {
                    match self.compare(x, y)? {
                        Some(Ordering::Equal) => continue,
                        other => return Ok(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (Value::Object(_), _) => {
                match self.call_method(lhs, "<=>", vec![rhs.clone()], None, true)? {
                    Value::Fixnum(order) => Some(order.cmp(&0)),
                    _ => None,
                }
            }
            _ => None,
        })
    }

    /// `<=>`, raising when the values don't compare
    pub(crate) fn compare_or_raise(&mut self, lhs: &Value, rhs: &Value) -> Result<Ordering, Unwind> {
        match self.compare(lhs, rhs)? {
            Some(order) => Ok(order),
            None => {
                let message = format!(
                    "comparison of {} with {} failed",
                    self.real_class_of(lhs).name(),
                    self.inspect(rhs)?
                );
                Err(self.argument_error(message))
            }
        }
    }

    /// Yield to the block a builtin was given, which must be there
    pub(crate) fn call_block(
        &mut self,
        block: Option<&Rc<Block>>,
        args: Vec<Value>,
    ) -> Result<Value, Unwind> {
        match block {
            Some(block) => self.yield_block(block, args, None),
            None => Err(self.local_jump_error("no block given (yield)")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn floats_print_like_floats() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(-0.125), "-0.125");
        assert_eq!(format_float(f64::INFINITY), "Infinity");
    }

    #[test]
    fn quoting() {
        assert_eq!(quote("a\"b\n"), "\"a\\\"b\\n\"");
    }
}
