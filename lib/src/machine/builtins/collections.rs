use super::arg;
use crate::machine::{Block, HashValue, RString, RangeValue, Runtime, Unwind, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

pub(super) fn install(runtime: &mut Runtime) {
    let array = runtime.core().array.clone();
    array.define_builtin("[]", array_index);
    array.define_builtin("[]=", array_store);
    array.define_builtin("<<", push);
    array.define_builtin("push", push);
    array.define_builtin("pop", pop);
    array.define_builtin("shift", shift);
    array.define_builtin("unshift", unshift);
    array.define_builtin("first", first);
    array.define_builtin("last", last);
    array.define_builtin("length", length);
    array.define_builtin("size", length);
    array.define_builtin("empty?", empty);
    array.define_builtin("each", array_each);
    array.define_builtin("each_with_index", each_with_index);
    array.define_builtin("map", map);
    array.define_builtin("collect", map);
    array.define_builtin("select", |rt, a, _, b| filter(rt, a, b, true));
    array.define_builtin("filter", |rt, a, _, b| filter(rt, a, b, true));
    array.define_builtin("reject", |rt, a, _, b| filter(rt, a, b, false));
    array.define_builtin("inject", inject);
    array.define_builtin("reduce", inject);
    array.define_builtin("include?", include);
    array.define_builtin("index", position);
    array.define_builtin("join", join);
    array.define_builtin("reverse", reverse);
    array.define_builtin("sort", sort);
    array.define_builtin("sort_by", sort_by);
    array.define_builtin("min", |rt, a, _, _| extreme(rt, a, Ordering::Less));
    array.define_builtin("max", |rt, a, _, _| extreme(rt, a, Ordering::Greater));
    array.define_builtin("sum", sum);
    array.define_builtin("to_a", |_, receiver, _, _| Ok(receiver.clone()));
    array.define_builtin("inspect", inspect);
    array.define_builtin("to_s", inspect);
    array.define_builtin("==", equal);
    array.define_builtin("+", plus);
    array.define_builtin("-", minus);
    array.define_builtin("*", times);
    array.define_builtin("concat", concat);
    array.define_builtin("flatten", flatten);
    array.define_builtin("compact", compact);
    array.define_builtin("uniq", uniq);
    array.define_builtin("count", count);
    array.define_builtin("any?", |rt, a, _, b| quantify(rt, a, b, Quantifier::Any));
    array.define_builtin("all?", |rt, a, _, b| quantify(rt, a, b, Quantifier::All));
    array.define_builtin("none?", |rt, a, _, b| quantify(rt, a, b, Quantifier::None));
    array.define_builtin("find", find);
    array.define_builtin("detect", find);
    array.define_builtin("zip", zip);
    array.define_builtin("take", take);
    array.define_builtin("drop", drop);
    array.define_builtin("clear", clear);
    array.define_builtin("delete", delete);

    let hash = runtime.core().hash.clone();
    hash.define_builtin("[]", hash_get);
    hash.define_builtin("[]=", hash_store);
    hash.define_builtin("store", hash_store);
    hash.define_builtin("fetch", fetch);
    hash.define_builtin("key?", has_key);
    hash.define_builtin("has_key?", has_key);
    hash.define_builtin("include?", has_key);
    hash.define_builtin("member?", has_key);
    hash.define_builtin("keys", keys);
    hash.define_builtin("values", values);
    hash.define_builtin("length", length);
    hash.define_builtin("size", length);
    hash.define_builtin("empty?", empty);
    hash.define_builtin("each", hash_each);
    hash.define_builtin("each_pair", hash_each);
    hash.define_builtin("map", map);
    hash.define_builtin("select", hash_select);
    hash.define_builtin("reject", hash_reject);
    hash.define_builtin("to_a", to_a);
    hash.define_builtin("delete", hash_delete);
    hash.define_builtin("inspect", inspect);
    hash.define_builtin("to_s", inspect);
    hash.define_builtin("==", equal);
    hash.define_builtin("merge", merge);
    hash.define_builtin("count", count);
    hash.define_builtin("any?", |rt, a, _, b| quantify(rt, a, b, Quantifier::Any));

    let range = runtime.core().range.clone();
    range.define_builtin("each", range_each);
    range.define_builtin("to_a", to_a);
    range.define_builtin("map", map);
    range.define_builtin("collect", map);
    range.define_builtin("select", |rt, a, _, b| filter(rt, a, b, true));
    range.define_builtin("reject", |rt, a, _, b| filter(rt, a, b, false));
    range.define_builtin("include?", covers);
    range.define_builtin("member?", covers);
    range.define_builtin("===", covers);
    range.define_builtin("first", first);
    range.define_builtin("last", last);
    range.define_builtin("begin", |_, receiver, _, _| Ok(bounds(receiver).0));
    range.define_builtin("end", |_, receiver, _, _| Ok(bounds(receiver).1));
    range.define_builtin("exclude_end?", |_, receiver, _, _| {
        Ok(Value::bool(matches!(receiver, Value::Range(range) if range.exclusive)))
    });
    range.define_builtin("size", length);
    range.define_builtin("count", count);
    range.define_builtin("sum", sum);
    range.define_builtin("inject", inject);
    range.define_builtin("reduce", inject);
    range.define_builtin("inspect", inspect);
    range.define_builtin("to_s", range_to_s);
    range.define_builtin("==", equal);

    let nil = runtime.core().nil.clone();
    nil.define_builtin("to_s", |_, _, _, _| Ok(Value::str("")));
    nil.define_builtin("to_a", |_, _, _, _| Ok(Value::array(vec![])));
    nil.define_builtin("to_i", |_, _, _, _| Ok(Value::Fixnum(0)));
    nil.define_builtin("inspect", |_, _, _, _| Ok(Value::str("nil")));
    nil.define_builtin("nil?", |_, _, _, _| Ok(Value::True));
    nil.define_builtin("&", |_, _, _, _| Ok(Value::False));
    nil.define_builtin("|", |_, _, args, _| Ok(Value::bool(arg(args, 0).is_truthy())));

    let true_class = runtime.core().true_class.clone();
    true_class.define_builtin("to_s", |_, _, _, _| Ok(Value::str("true")));
    true_class.define_builtin("inspect", |_, _, _, _| Ok(Value::str("true")));
    true_class.define_builtin("&", |_, _, args, _| Ok(Value::bool(arg(args, 0).is_truthy())));
    true_class.define_builtin("|", |_, _, _, _| Ok(Value::True));
    true_class.define_builtin("^", |_, _, args, _| Ok(Value::bool(!arg(args, 0).is_truthy())));

    let false_class = runtime.core().false_class.clone();
    false_class.define_builtin("to_s", |_, _, _, _| Ok(Value::str("false")));
    false_class.define_builtin("inspect", |_, _, _, _| Ok(Value::str("false")));
    false_class.define_builtin("&", |_, _, _, _| Ok(Value::False));
    false_class.define_builtin("|", |_, _, args, _| Ok(Value::bool(arg(args, 0).is_truthy())));
    false_class.define_builtin("^", |_, _, args, _| Ok(Value::bool(arg(args, 0).is_truthy())));
}

fn cell(receiver: &Value) -> Option<Rc<RefCell<Vec<Value>>>> {
    match receiver {
        Value::Array(elements) => Some(elements.clone()),
        _ => None,
    }
}

fn bounds(receiver: &Value) -> (Value, Value) {
    match receiver {
        Value::Range(range) => (range.begin.clone(), range.end.clone()),
        _ => (Value::Nil, Value::Nil),
    }
}

/// Integers a range covers
fn range_fixnums(rt: &mut Runtime, range: &RangeValue) -> Result<std::ops::Range<i64>, Unwind> {
    match range.fixnum_bounds() {
        Some((begin, end)) => Ok(begin..end.max(begin)),
        None => {
            let message = format!(
                "can't iterate from {}",
                rt.real_class_of(&range.begin).name()
            );
            Err(rt.type_error(message))
        }
    }
}

/// Snapshot of what an enumerable yields: elements, `[key, value]` pairs, or range members
fn members(rt: &mut Runtime, receiver: &Value) -> Result<Vec<Value>, Unwind> {
    Ok(match receiver {
        Value::Array(elements) => elements.borrow().clone(),
        Value::Hash(hash) => hash
            .borrow()
            .entries()
            .iter()
            .map(|(key, value)| Value::array(vec![key.clone(), value.clone()]))
            .collect(),
        Value::Range(range) => range_fixnums(rt, range)?.map(Value::Fixnum).collect(),
        _ => vec![],
    })
}

fn array_arg(rt: &mut Runtime, value: &Value) -> Result<Vec<Value>, Unwind> {
    match value {
        Value::Array(elements) => Ok(elements.borrow().clone()),
        other => {
            let message = format!(
                "no implicit conversion of {} into Array",
                rt.real_class_of(other).name()
            );
            Err(rt.type_error(message))
        }
    }
}

/// Resolve a possibly negative index against `length`
fn resolve(index: i64, length: usize) -> Option<usize> {
    let resolved = if index < 0 {
        length as i64 + index
    } else {
        index
    };
    usize::try_from(resolved).ok()
}

/// `[index]`, `[start, length]` or `[range]`
fn array_index(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let elements = receiver.array_elements().unwrap_or_default();
    let slice = |start: usize, count: usize| -> Value {
        if start > elements.len() {
            return Value::Nil;
        }
        let end = (start + count).min(elements.len());
        Value::array(elements[start..end].to_vec())
    };
    Ok(match (arg(args, 0), args.get(1)) {
        (Value::Fixnum(at), None) => resolve(at, elements.len())
            .and_then(|at| elements.get(at).cloned())
            .unwrap_or(Value::Nil),
        (Value::Fixnum(start), Some(Value::Fixnum(count))) if *count >= 0 => {
            match resolve(start, elements.len()) {
                Some(start) => slice(start, *count as usize),
                None => Value::Nil,
            }
        }
        (Value::Range(range), None) => {
            let begin = range.begin.as_fixnum().unwrap_or(0);
            let end = range.end.as_fixnum().unwrap_or(-1);
            match (resolve(begin, elements.len()), resolve(end, elements.len())) {
                (Some(start), Some(end)) => {
                    let end = if range.exclusive { end } else { end + 1 };
                    slice(start, end.saturating_sub(start))
                }
                _ => Value::Nil,
            }
        }
        _ => Value::Nil,
    })
}

fn array_store(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let elements = match cell(receiver) {
        Some(elements) => elements,
        None => return Ok(Value::Nil),
    };
    let assigned = arg(args, 1);
    let length = elements.borrow().len();
    let at = match arg(args, 0) {
        Value::Fixnum(at) => match resolve(at, length) {
            Some(at) => at,
            None => {
                let message = format!("index {} too small for array; minimum: -{}", at, length);
                let class = rt.core().index_error.clone();
                return Err(rt.raise(&class, message));
            }
        },
        _ => return Err(rt.type_error("no implicit conversion into Integer")),
    };
    let mut elements = elements.borrow_mut();
    if at >= elements.len() {
        elements.resize(at + 1, Value::Nil);
    }
    elements[at] = assigned.clone();
    Ok(assigned)
}

fn push(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    if let Some(elements) = cell(receiver) {
        elements.borrow_mut().extend(args.iter().cloned());
    }
    Ok(receiver.clone())
}

fn pop(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(cell(receiver)
        .and_then(|elements| elements.borrow_mut().pop())
        .unwrap_or(Value::Nil))
}

fn shift(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(cell(receiver)
        .and_then(|elements| {
            let mut elements = elements.borrow_mut();
            if elements.is_empty() {
                None
            } else {
                Some(elements.remove(0))
            }
        })
        .unwrap_or(Value::Nil))
}

fn unshift(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    if let Some(elements) = cell(receiver) {
        let mut elements = elements.borrow_mut();
        for (i, value) in args.iter().enumerate() {
            elements.insert(i, value.clone());
        }
    }
    Ok(receiver.clone())
}

/// `first` or `first(n)`
fn first(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    if let Value::Range(range) = receiver {
        if args.is_empty() {
            return Ok(range.begin.clone());
        }
    }
    let members = members(rt, receiver)?;
    Ok(match arg(args, 0) {
        Value::Fixnum(count) => Value::array(members.into_iter().take(count.max(0) as usize).collect()),
        _ => members.into_iter().next().unwrap_or(Value::Nil),
    })
}

/// `last` or `last(n)`
fn last(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    if let Value::Range(range) = receiver {
        if args.is_empty() {
            return Ok(range.end.clone());
        }
    }
    let members = members(rt, receiver)?;
    Ok(match arg(args, 0) {
        Value::Fixnum(count) => {
            let skip = members.len().saturating_sub(count.max(0) as usize);
            Value::array(members.into_iter().skip(skip).collect())
        }
        _ => members.last().cloned().unwrap_or(Value::Nil),
    })
}

fn length(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::Fixnum(match receiver {
        Value::Array(elements) => elements.borrow().len() as i64,
        Value::Hash(hash) => hash.borrow().len() as i64,
        Value::Range(range) => {
            let covered = range_fixnums(rt, range)?;
            covered.end - covered.start
        }
        _ => 0,
    }))
}

fn empty(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let length = length(rt, receiver, args, block)?;
    Ok(Value::bool(length.as_fixnum() == Some(0)))
}

/// Iterates by index so elements appended by the block are visited too
fn array_each(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let elements = match cell(receiver) {
        Some(elements) => elements,
        None => return Ok(receiver.clone()),
    };
    let mut i = 0;
    loop {
        let element = match elements.borrow().get(i) {
            Some(element) => element.clone(),
            None => break,
        };
        rt.call_block(block, vec![element])?;
        i += 1;
    }
    Ok(receiver.clone())
}

fn each_with_index(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    for (i, member) in members(rt, receiver)?.into_iter().enumerate() {
        rt.call_block(block, vec![member, Value::Fixnum(i as i64)])?;
    }
    Ok(receiver.clone())
}

fn map(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let members = members(rt, receiver)?;
    let mut mapped = Vec::with_capacity(members.len());
    for member in members {
        mapped.push(rt.call_block(block, vec![member])?);
    }
    Ok(Value::array(mapped))
}

fn filter(rt: &mut Runtime, receiver: &Value, block: Option<&Rc<Block>>, keep: bool) -> Result<Value, Unwind> {
    let mut kept = vec![];
    for member in members(rt, receiver)? {
        if rt.call_block(block, vec![member.clone()])?.is_truthy() == keep {
            kept.push(member);
        }
    }
    Ok(Value::array(kept))
}

/// `inject { }`, `inject(initial) { }`, `inject(:+)` or `inject(initial, :+)`
fn inject(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut members = members(rt, receiver)?.into_iter();
    let (initial, operator) = match args {
        [Value::Symbol(operator)] if block.is_none() => (None, Some(operator.clone())),
        [initial, Value::Symbol(operator)] => (Some(initial.clone()), Some(operator.clone())),
        [initial, ..] => (Some(initial.clone()), None),
        [] => (None, None),
    };
    let mut accumulated = match initial.or_else(|| members.next()) {
        Some(initial) => initial,
        None => return Ok(Value::Nil),
    };
    for member in members {
        accumulated = match &operator {
            Some(operator) => rt.call_method(&accumulated, operator, vec![member], None, false)?,
            None => rt.call_block(block, vec![accumulated, member])?,
        };
    }
    Ok(accumulated)
}

fn include(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let needle = arg(args, 0);
    for element in receiver.array_elements().unwrap_or_default() {
        if rt.equals(&element, &needle)? {
            return Ok(Value::True);
        }
    }
    Ok(Value::False)
}

fn position(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let needle = arg(args, 0);
    for (i, element) in receiver.array_elements().unwrap_or_default().into_iter().enumerate() {
        let found = match (args.is_empty(), block) {
            (true, Some(_)) => rt.call_block(block, vec![element])?.is_truthy(),
            _ => rt.equals(&element, &needle)?,
        };
        if found {
            return Ok(Value::Fixnum(i as i64));
        }
    }
    Ok(Value::Nil)
}

fn join(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let separator = match arg(args, 0) {
        Value::Nil => String::new(),
        other => rt.to_s(&other)?,
    };
    let mut parts = vec![];
    for element in receiver.array_elements().unwrap_or_default() {
        parts.push(match &element {
            Value::Array(_) => {
                let nested = join(rt, &element, args, None)?;
                rt.to_s(&nested)?
            }
            other => rt.to_s(other)?,
        });
    }
    Ok(Value::str(parts.join(&separator)))
}

fn reverse(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut elements = receiver.array_elements().unwrap_or_default();
    elements.reverse();
    Ok(Value::array(elements))
}

/// Insertion sort through `<=>` (or the block), so comparison failures propagate
fn sorted(
    rt: &mut Runtime,
    members: Vec<Value>,
    block: Option<&Rc<Block>>,
) -> Result<Vec<Value>, Unwind> {
    let mut sorted: Vec<Value> = Vec::with_capacity(members.len());
    for member in members {
        let mut at = sorted.len();
        while at > 0 {
            let order = match block {
                Some(block) => {
                    let result = rt.yield_block(block, vec![sorted[at - 1].clone(), member.clone()], None)?;
                    result.as_fixnum().unwrap_or(0).cmp(&0)
                }
                None => rt.compare_or_raise(&sorted[at - 1], &member)?,
            };
            if order != Ordering::Greater {
                break;
            }
            at -= 1;
        }
        sorted.insert(at, member);
    }
    Ok(sorted)
}

fn sort(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let members = members(rt, receiver)?;
    Ok(Value::array(sorted(rt, members, block)?))
}

fn sort_by(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut keyed = vec![];
    for member in members(rt, receiver)? {
        let key = rt.call_block(block, vec![member.clone()])?;
        keyed.push(Value::array(vec![key, member]));
    }
    let keyed = sorted(rt, keyed, None)?;
    Ok(Value::array(
        keyed
            .into_iter()
            .filter_map(|pair| pair.array_elements().and_then(|pair| pair.get(1).cloned()))
            .collect(),
    ))
}

fn extreme(rt: &mut Runtime, receiver: &Value, wanted: Ordering) -> Result<Value, Unwind> {
    let mut best: Option<Value> = None;
    for member in members(rt, receiver)? {
        best = Some(match best {
            Some(current) if rt.compare_or_raise(&member, &current)? != wanted => current,
            _ => member,
        });
    }
    Ok(best.unwrap_or(Value::Nil))
}

fn sum(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut total = args.get(0).cloned().unwrap_or(Value::Fixnum(0));
    for member in members(rt, receiver)? {
        let member = match block {
            Some(_) => rt.call_block(block, vec![member])?,
            None => member,
        };
        total = rt.call_method(&total, "+", vec![member], None, false)?;
    }
    Ok(total)
}

fn inspect(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::str(rt.inspect(receiver)?))
}

fn range_to_s(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let (begin, end) = bounds(receiver);
    let dots = match receiver {
        Value::Range(range) if range.exclusive => "...",
        _ => "..",
    };
    Ok(Value::str(format!("{}{}{}", rt.to_s(&begin)?, dots, rt.to_s(&end)?)))
}

fn equal(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(rt.equals(receiver, &arg(args, 0))?))
}

fn plus(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut elements = receiver.array_elements().unwrap_or_default();
    elements.extend(array_arg(rt, &arg(args, 0))?);
    Ok(Value::array(elements))
}

fn minus(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let removed = array_arg(rt, &arg(args, 0))?;
    let mut kept = vec![];
    for element in receiver.array_elements().unwrap_or_default() {
        if !removed.iter().any(|other| other.eql(&element)) {
            kept.push(element);
        }
    }
    Ok(Value::array(kept))
}

/// `* n` repeats; `* separator` joins
fn times(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match arg(args, 0) {
        Value::Fixnum(count) if count >= 0 => {
            let elements = receiver.array_elements().unwrap_or_default();
            let mut repeated = Vec::with_capacity(elements.len() * count as usize);
            for _ in 0..count {
                repeated.extend(elements.iter().cloned());
            }
            Ok(Value::array(repeated))
        }
        Value::Fixnum(_) => Err(rt.argument_error("negative argument")),
        _ => join(rt, receiver, args, block),
    }
}

fn concat(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut appended = vec![];
    for other in args {
        appended.extend(array_arg(rt, other)?);
    }
    if let Some(elements) = cell(receiver) {
        elements.borrow_mut().extend(appended);
    }
    Ok(receiver.clone())
}

fn flatten(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    fn flatten_into(elements: Vec<Value>, out: &mut Vec<Value>) {
        for element in elements {
            match element.array_elements() {
                Some(nested) => flatten_into(nested, out),
                None => out.push(element),
            }
        }
    }
    let mut flat = vec![];
    flatten_into(receiver.array_elements().unwrap_or_default(), &mut flat);
    Ok(Value::array(flat))
}

fn compact(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let elements = receiver.array_elements().unwrap_or_default();
    Ok(Value::array(elements.into_iter().filter(|e| !e.is_nil()).collect()))
}

fn uniq(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut unique: Vec<Value> = vec![];
    for element in receiver.array_elements().unwrap_or_default() {
        if !unique.iter().any(|seen| seen.eql(&element)) {
            unique.push(element);
        }
    }
    Ok(Value::array(unique))
}

/// `count`, `count(value)` or `count { }`
fn count(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut counted = 0;
    for member in members(rt, receiver)? {
        let matched = match (args.first(), block) {
            (Some(needle), _) => rt.equals(&member, needle)?,
            (None, Some(_)) => rt.call_block(block, vec![member])?.is_truthy(),
            (None, None) => true,
        };
        if matched {
            counted += 1;
        }
    }
    Ok(Value::Fixnum(counted))
}

#[derive(Copy, Clone, PartialEq)]
enum Quantifier {
    Any,
    All,
    None,
}

fn quantify(
    rt: &mut Runtime,
    receiver: &Value,
    block: Option<&Rc<Block>>,
    quantifier: Quantifier,
) -> Result<Value, Unwind> {
    for member in members(rt, receiver)? {
        let truthy = match block {
            Some(_) => rt.call_block(block, vec![member])?.is_truthy(),
            None => member.is_truthy(),
        };
        match quantifier {
            Quantifier::Any if truthy => return Ok(Value::True),
            Quantifier::All if !truthy => return Ok(Value::False),
            Quantifier::None if truthy => return Ok(Value::False),
            _ => {}
        }
    }
    Ok(Value::bool(quantifier != Quantifier::Any))
}

fn find(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    for member in members(rt, receiver)? {
        if rt.call_block(block, vec![member.clone()])?.is_truthy() {
            return Ok(member);
        }
    }
    Ok(Value::Nil)
}

fn zip(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut others = vec![];
    for other in args {
        others.push(array_arg(rt, other)?);
    }
    let zipped = receiver
        .array_elements()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, element)| {
            let mut row = vec![element];
            row.extend(others.iter().map(|other| other.get(i).cloned().unwrap_or(Value::Nil)));
            Value::array(row)
        })
        .collect();
    Ok(Value::array(zipped))
}

fn take(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let count = arg(args, 0).as_fixnum().unwrap_or(0).max(0) as usize;
    let elements = receiver.array_elements().unwrap_or_default();
    Ok(Value::array(elements.into_iter().take(count).collect()))
}

fn drop(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let count = arg(args, 0).as_fixnum().unwrap_or(0).max(0) as usize;
    let elements = receiver.array_elements().unwrap_or_default();
    Ok(Value::array(elements.into_iter().skip(count).collect()))
}

fn clear(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match receiver {
        Value::Array(elements) => elements.borrow_mut().clear(),
        Value::Hash(hash) => *hash.borrow_mut() = HashValue::new(),
        _ => {}
    }
    Ok(receiver.clone())
}

fn delete(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let needle = arg(args, 0);
    let elements = match cell(receiver) {
        Some(elements) => elements,
        None => return Ok(Value::Nil),
    };
    let mut elements = elements.borrow_mut();
    let before = elements.len();
    elements.retain(|element| !element.eql(&needle));
    Ok(if elements.len() == before {
        Value::Nil
    } else {
        needle
    })
}

fn hash_cell(receiver: &Value) -> Option<Rc<RefCell<HashValue>>> {
    match receiver {
        Value::Hash(hash) => Some(hash.clone()),
        _ => None,
    }
}

fn hash_get(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(hash_cell(receiver)
        .and_then(|hash| hash.borrow().get(&arg(args, 0)).cloned())
        .unwrap_or(Value::Nil))
}

/// String keys are copied and frozen, so later mutation of the caller's string can't move them
fn hash_store(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let key = match arg(args, 0) {
        Value::Str(key) if !key.is_frozen() => Value::Str(Rc::new(RString::frozen(key.to_string()))),
        key => key,
    };
    let assigned = arg(args, 1);
    if let Some(hash) = hash_cell(receiver) {
        hash.borrow_mut().insert(key, assigned.clone());
    }
    Ok(assigned)
}

/// `fetch(key)`, `fetch(key, default)` or `fetch(key) { |key| }`
fn fetch(rt: &mut Runtime, receiver: &Value, args: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let key = arg(args, 0);
    let found = hash_cell(receiver).and_then(|hash| hash.borrow().get(&key).cloned());
    match (found, args.get(1), block) {
        (Some(found), _, _) => Ok(found),
        (None, _, Some(_)) => rt.call_block(block, vec![key]),
        (None, Some(default), None) => Ok(default.clone()),
        (None, None, None) => {
            let message = format!("key not found: {}", rt.inspect(&key)?);
            let class = rt.core().index_error.clone();
            Err(rt.raise(&class, message))
        }
    }
}

fn has_key(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(
        hash_cell(receiver).map_or(false, |hash| hash.borrow().get(&arg(args, 0)).is_some()),
    ))
}

fn keys(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let keys = hash_cell(receiver).map_or_else(Vec::new, |hash| {
        hash.borrow().entries().iter().map(|(key, _)| key.clone()).collect()
    });
    Ok(Value::array(keys))
}

fn values(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let values = hash_cell(receiver).map_or_else(Vec::new, |hash| {
        hash.borrow().entries().iter().map(|(_, value)| value.clone()).collect()
    });
    Ok(Value::array(values))
}

/// Yields `[key, value]` pairs, which blocks taking two parameters destructure
fn hash_each(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    for pair in members(rt, receiver)? {
        rt.call_block(block, vec![pair])?;
    }
    Ok(receiver.clone())
}

fn hash_filter(rt: &mut Runtime, receiver: &Value, block: Option<&Rc<Block>>, keep: bool) -> Result<Value, Unwind> {
    let entries = hash_cell(receiver).map_or_else(Vec::new, |hash| hash.borrow().entries().to_vec());
    let mut kept = HashValue::new();
    for (key, value) in entries {
        let pair = Value::array(vec![key.clone(), value.clone()]);
        if rt.call_block(block, vec![pair])?.is_truthy() == keep {
            kept.insert(key, value);
        }
    }
    Ok(Value::hash(kept))
}

fn hash_select(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    hash_filter(rt, receiver, block, true)
}

fn hash_reject(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    hash_filter(rt, receiver, block, false)
}

fn to_a(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::array(members(rt, receiver)?))
}

fn hash_delete(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(hash_cell(receiver)
        .and_then(|hash| hash.borrow_mut().remove(&arg(args, 0)))
        .unwrap_or(Value::Nil))
}

fn merge(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let mut merged = hash_cell(receiver).map_or_else(HashValue::new, |hash| hash.borrow().clone());
    for other in args {
        match other {
            Value::Hash(other) => {
                for (key, value) in other.borrow().entries() {
                    merged.insert(key.clone(), value.clone());
                }
            }
            other => {
                let message = format!(
                    "no implicit conversion of {} into Hash",
                    rt.real_class_of(other).name()
                );
                return Err(rt.type_error(message));
            }
        }
    }
    Ok(Value::hash(merged))
}

fn range_each(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    if let Value::Range(range) = receiver {
        for i in range_fixnums(rt, range)? {
            rt.call_block(block, vec![Value::Fixnum(i)])?;
        }
    }
    Ok(receiver.clone())
}

fn covers(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let range = match receiver {
        Value::Range(range) => range.clone(),
        _ => return Ok(Value::False),
    };
    let candidate = arg(args, 0);
    let above = matches!(
        rt.compare(&range.begin, &candidate)?,
        Some(Ordering::Less | Ordering::Equal)
    );
    let below = match rt.compare(&candidate, &range.end)? {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) => !range.exclusive,
        _ => false,
    };
    Ok(Value::bool(above && below))
}

#[cfg(test)]
mod test {
    use super::resolve;

    #[test]
    fn negative_indices_resolve_from_the_end() {
        assert_eq!(resolve(-1, 4), Some(3));
        assert_eq!(resolve(2, 4), Some(2));
        assert_eq!(resolve(-5, 4), None);
    }
}
