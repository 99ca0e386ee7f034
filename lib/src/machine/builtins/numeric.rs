use super::{arg, format_float};
use crate::machine::{Block, Runtime, Unwind, Value};
use std::cmp::Ordering;
use std::rc::Rc;

pub(super) fn install(runtime: &mut Runtime) {
    let integer = runtime.core().integer.clone();
    integer.define_builtin("+", add);
    integer.define_builtin("-", subtract);
    integer.define_builtin("*", multiply);
    integer.define_builtin("/", divide);
    integer.define_builtin("div", divide);
    integer.define_builtin("%", modulo);
    integer.define_builtin("modulo", modulo);
    integer.define_builtin("**", power);
    integer.define_builtin("-@", negate);
    integer.define_builtin("==", equal);
    integer.define_builtin("===", equal);
    integer.define_builtin("<", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_lt));
    integer.define_builtin("<=", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_le));
    integer.define_builtin(">", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_gt));
    integer.define_builtin(">=", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_ge));
    integer.define_builtin("<=>", spaceship);
    integer.define_builtin("to_s", to_s);
    integer.define_builtin("inspect", to_s);
    integer.define_builtin("to_i", |_, receiver, _, _| Ok(receiver.clone()));
    integer.define_builtin("to_f", to_f);
    integer.define_builtin("times", times);
    integer.define_builtin("upto", upto);
    integer.define_builtin("downto", downto);
    integer.define_builtin("zero?", zero);
    integer.define_builtin("even?", even);
    integer.define_builtin("odd?", odd);
    integer.define_builtin("abs", abs);
    integer.define_builtin("succ", succ);
    integer.define_builtin("next", succ);
    integer.define_builtin("pred", pred);
    integer.define_builtin("hash", |_, receiver, _, _| Ok(receiver.clone()));

    let float = runtime.core().float.clone();
    float.define_builtin("+", add);
    float.define_builtin("-", subtract);
    float.define_builtin("*", multiply);
    float.define_builtin("/", divide);
    float.define_builtin("%", modulo);
    float.define_builtin("**", power);
    float.define_builtin("-@", negate);
    float.define_builtin("==", equal);
    float.define_builtin("<", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_lt));
    float.define_builtin("<=", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_le));
    float.define_builtin(">", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_gt));
    float.define_builtin(">=", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_ge));
    float.define_builtin("<=>", spaceship);
    float.define_builtin("to_s", to_s);
    float.define_builtin("inspect", to_s);
    float.define_builtin("to_f", |_, receiver, _, _| Ok(receiver.clone()));
    float.define_builtin("to_i", truncate);
    float.define_builtin("truncate", truncate);
    float.define_builtin("round", round);
    float.define_builtin("floor", floor);
    float.define_builtin("ceil", ceil);
    float.define_builtin("zero?", zero);
    float.define_builtin("abs", abs);
    float.define_builtin("nan?", |_, receiver, _, _| {
        Ok(Value::bool(matches!(receiver, Value::Float(value) if value.is_nan())))
    });
}

/// Operands of a binary operator, after numeric coercion
enum Operands {
    Fixnums(i64, i64),
    Floats(f64, f64),
}

fn operands(rt: &mut Runtime, lhs: &Value, rhs: &Value) -> Result<Operands, Unwind> {
    match (lhs, rhs) {
        (Value::Fixnum(a), Value::Fixnum(b)) => Ok(Operands::Fixnums(*a, *b)),
        (Value::Fixnum(a), Value::Float(b)) => Ok(Operands::Floats(*a as f64, *b)),
        (Value::Float(a), Value::Fixnum(b)) => Ok(Operands::Floats(*a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Operands::Floats(*a, *b)),
        (receiver, other) => {
            let target = if let Value::Float(_) = receiver {
                "Float"
            } else {
                "Integer"
            };
            let described = match other {
                Value::Nil => "nil".to_string(),
                Value::True => "true".to_string(),
                Value::False => "false".to_string(),
                other => rt.real_class_of(other).name(),
            };
            let message = format!("{} can't be coerced into {}", described, target);
            Err(rt.type_error(message))
        }
    }
}

/// Fixnum result, degrading to a float on overflow
fn checked(result: Option<i64>, fallback: f64) -> Value {
    match result {
        Some(value) => Value::Fixnum(value),
        None => Value::Float(fallback),
    }
}

fn add(rt: &mut Runtime, lhs: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match operands(rt, lhs, &arg(args, 0))? {
        Operands::Fixnums(a, b) => checked(a.checked_add(b), a as f64 + b as f64),
        Operands::Floats(a, b) => Value::Float(a + b),
    })
}

fn subtract(rt: &mut Runtime, lhs: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match operands(rt, lhs, &arg(args, 0))? {
        Operands::Fixnums(a, b) => checked(a.checked_sub(b), a as f64 - b as f64),
        Operands::Floats(a, b) => Value::Float(a - b),
    })
}

fn multiply(rt: &mut Runtime, lhs: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match operands(rt, lhs, &arg(args, 0))? {
        Operands::Fixnums(a, b) => checked(a.checked_mul(b), a as f64 * b as f64),
        Operands::Floats(a, b) => Value::Float(a * b),
    })
}

fn zero_division(rt: &mut Runtime) -> Unwind {
    let class = rt.core().zero_division_error.clone();
    rt.raise(&class, "divided by 0")
}

/// Integer division rounds toward negative infinity
fn divide(rt: &mut Runtime, lhs: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match operands(rt, lhs, &arg(args, 0))? {
        Operands::Fixnums(_, 0) => Err(zero_division(rt)),
        Operands::Fixnums(a, b) => Ok(match a.checked_div(b) {
            Some(quotient) if a % b != 0 && ((a < 0) != (b < 0)) => Value::Fixnum(quotient - 1),
            Some(quotient) => Value::Fixnum(quotient),
            None => Value::Float(a as f64 / b as f64),
        }),
        Operands::Floats(a, b) => Ok(Value::Float(a / b)),
    }
}

/// Modulo takes the sign of the divisor
fn modulo(rt: &mut Runtime, lhs: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match operands(rt, lhs, &arg(args, 0))? {
        Operands::Fixnums(_, 0) => Err(zero_division(rt)),
        Operands::Fixnums(a, b) => {
            let remainder = a.checked_rem(b).unwrap_or(0);
            Ok(Value::Fixnum(if remainder != 0 && ((remainder < 0) != (b < 0)) {
                remainder + b
            } else {
                remainder
            }))
        }
        Operands::Floats(a, b) => {
            let remainder = a % b;
            Ok(Value::Float(if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
                remainder + b
            } else {
                remainder
            }))
        }
    }
}

fn power(rt: &mut Runtime, lhs: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match operands(rt, lhs, &arg(args, 0))? {
        Operands::Fixnums(a, b) if b >= 0 => {
            let exact = u32::try_from(b).ok().and_then(|b| a.checked_pow(b));
            checked(exact, (a as f64).powf(b as f64))
        }
        Operands::Fixnums(a, b) => Value::Float((a as f64).powf(b as f64)),
        Operands::Floats(a, b) => Value::Float(a.powf(b)),
    })
}

fn negate(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match receiver {
        Value::Fixnum(value) => checked(value.checked_neg(), -(*value as f64)),
        Value::Float(value) => Value::Float(-value),
        other => other.clone(),
    })
}

fn equal(rt: &mut Runtime, lhs: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(rt.equals(lhs, &arg(args, 0))?))
}

fn ordered(
    rt: &mut Runtime,
    lhs: &Value,
    args: &[Value],
    test: fn(Ordering) -> bool,
) -> Result<Value, Unwind> {
    let rhs = arg(args, 0);
    match (lhs, &rhs) {
        (Value::Fixnum(_) | Value::Float(_), Value::Fixnum(_) | Value::Float(_)) => {
            Ok(Value::bool(rt.compare(lhs, &rhs)?.map_or(false, test)))
        }
        _ => {
            let order = rt.compare_or_raise(lhs, &rhs)?;
            Ok(Value::bool(test(order)))
        }
    }
}

fn spaceship(rt: &mut Runtime, lhs: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match rt.compare(lhs, &arg(args, 0))? {
        Some(Ordering::Less) => Value::Fixnum(-1),
        Some(Ordering::Equal) => Value::Fixnum(0),
        Some(Ordering::Greater) => Value::Fixnum(1),
        None => Value::Nil,
    })
}

fn to_s(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match (receiver, arg(args, 0)) {
        (Value::Fixnum(value), Value::Fixnum(radix)) if (2..=36).contains(&radix) => {
            Ok(Value::str(to_radix(*value, radix as u32)))
        }
        (Value::Fixnum(_), Value::Fixnum(radix)) => {
            Err(rt.argument_error(format!("invalid radix {}", radix)))
        }
        (Value::Float(value), _) => Ok(Value::str(format_float(*value))),
        (other, _) => Ok(Value::str(rt.to_s(other)?)),
    }
}

fn to_radix(value: i64, radix: u32) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut magnitude = value.unsigned_abs();
    let mut digits = vec![];
    while magnitude > 0 {
        let digit = (magnitude % radix as u64) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('?'));
        magnitude /= radix as u64;
    }
    if value < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn to_f(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match receiver {
        Value::Fixnum(value) => Value::Float(*value as f64),
        other => other.clone(),
    })
}

fn fixnum(rt: &mut Runtime, value: &Value) -> Result<i64, Unwind> {
    match value {
        Value::Fixnum(value) => Ok(*value),
        Value::Float(value) => Ok(value.trunc() as i64),
        other => {
            let message = format!(
                "no implicit conversion of {} into Integer",
                rt.real_class_of(other).name()
            );
            Err(rt.type_error(message))
        }
    }
}

fn times(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let count = fixnum(rt, receiver)?;
    for i in 0..count {
        rt.call_block(block, vec![Value::Fixnum(i)])?;
    }
    Ok(receiver.clone())
}

fn upto(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let from = fixnum(rt, receiver)?;
    let to = fixnum(rt, &arg(args, 0))?;
    for i in from..=to {
        rt.call_block(block, vec![Value::Fixnum(i)])?;
    }
    Ok(receiver.clone())
}

fn downto(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let from = fixnum(rt, receiver)?;
    let to = fixnum(rt, &arg(args, 0))?;
    for i in (to..=from).rev() {
        rt.call_block(block, vec![Value::Fixnum(i)])?;
    }
    Ok(receiver.clone())
}

fn zero(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(match receiver {
        Value::Fixnum(value) => *value == 0,
        Value::Float(value) => *value == 0.0,
        _ => false,
    }))
}

fn even(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(fixnum(rt, receiver)? % 2 == 0))
}

fn odd(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(fixnum(rt, receiver)? % 2 != 0))
}

fn abs(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match receiver {
        Value::Fixnum(value) => checked(value.checked_abs(), (*value as f64).abs()),
        Value::Float(value) => Value::Float(value.abs()),
        other => other.clone(),
    })
}

fn succ(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let value = fixnum(rt, receiver)?;
    Ok(checked(value.checked_add(1), value as f64 + 1.0))
}

fn pred(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let value = fixnum(rt, receiver)?;
    Ok(checked(value.checked_sub(1), value as f64 - 1.0))
}

fn float_of(receiver: &Value) -> f64 {
    match receiver {
        Value::Float(value) => *value,
        Value::Fixnum(value) => *value as f64,
        _ => 0.0,
    }
}

/// Float to integer, raising for values no integer holds
fn integral(rt: &mut Runtime, value: f64) -> Result<Value, Unwind> {
    if value.is_nan() || value.is_infinite() {
        let class = rt.core().runtime_error.clone();
        return Err(rt.raise(&class, format_float(value)));
    }
    if value.abs() < 9.2e18 {
        Ok(Value::Fixnum(value as i64))
    } else {
        Ok(Value::Float(value))
    }
}

fn truncate(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    integral(rt, float_of(receiver).trunc())
}

/// `round`, or `round(digits)` giving a float
fn round(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let value = float_of(receiver);
    match arg(args, 0) {
        Value::Fixnum(digits) if digits > 0 => {
            let scale = 10f64.powi(digits.min(15) as i32);
            Ok(Value::Float((value * scale).round() / scale))
        }
        _ => integral(rt, value.round()),
    }
}

fn floor(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    integral(rt, float_of(receiver).floor())
}

fn ceil(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    integral(rt, float_of(receiver).ceil())
}

#[cfg(test)]
mod test {
    use super::to_radix;

    #[test]
    fn radix_conversion() {
        assert_eq!(to_radix(255, 16), "ff");
        assert_eq!(to_radix(-5, 2), "-101");
        assert_eq!(to_radix(0, 8), "0");
    }
}
