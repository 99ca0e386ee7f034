use super::{arg, quote};
use crate::machine::runtime::LastMatch;
use crate::machine::{Block, RString, RegexpValue, Runtime, Unwind, Value};
use std::cmp::Ordering;
use std::rc::Rc;

pub(super) fn install(runtime: &mut Runtime) {
    let string = runtime.core().string.clone();
    string.define_builtin("+", concat);
    string.define_builtin("*", repeat);
    string.define_builtin("==", equal);
    string.define_builtin("eql?", equal);
    string.define_builtin("===", equal);
    string.define_builtin("<=>", spaceship);
    string.define_builtin("<", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_lt));
    string.define_builtin(">", |rt, lhs, args, _| ordered(rt, lhs, args, Ordering::is_gt));
    string.define_builtin("<<", append);
    string.define_builtin("concat", append);
    string.define_builtin("length", length);
    string.define_builtin("size", length);
    string.define_builtin("upcase", |rt, s, _, _| map_text(rt, s, |text| text.to_uppercase()));
    string.define_builtin("downcase", |rt, s, _, _| map_text(rt, s, |text| text.to_lowercase()));
    string.define_builtin("capitalize", |rt, s, _, _| map_text(rt, s, capitalize));
    string.define_builtin("reverse", |rt, s, _, _| map_text(rt, s, |text| text.chars().rev().collect()));
    string.define_builtin("strip", |rt, s, _, _| map_text(rt, s, |text| text.trim().to_string()));
    string.define_builtin("include?", include);
    string.define_builtin("start_with?", start_with);
    string.define_builtin("end_with?", end_with);
    string.define_builtin("to_s", |_, receiver, _, _| Ok(receiver.clone()));
    string.define_builtin("to_str", |_, receiver, _, _| Ok(receiver.clone()));
    string.define_builtin("to_sym", to_sym);
    string.define_builtin("to_i", to_i);
    string.define_builtin("to_f", to_f);
    string.define_builtin("inspect", inspect);
    string.define_builtin("empty?", empty);
    string.define_builtin("split", split);
    string.define_builtin("chars", chars);
    string.define_builtin("each_char", each_char);
    string.define_builtin("[]", index);
    string.define_builtin("=~", string_match);
    string.define_builtin("match?", matches);
    string.define_builtin("sub", |rt, s, args, _| substitute(rt, s, args, false));
    string.define_builtin("gsub", |rt, s, args, _| substitute(rt, s, args, true));
    string.define_builtin("ljust", |rt, s, args, _| justify(rt, s, args, false));
    string.define_builtin("rjust", |rt, s, args, _| justify(rt, s, args, true));
    string.define_builtin("hash", hash);

    let symbol = runtime.core().symbol.clone();
    symbol.define_builtin("to_s", symbol_name);
    symbol.define_builtin("id2name", symbol_name);
    symbol.define_builtin("name", symbol_name);
    symbol.define_builtin("to_sym", |_, receiver, _, _| Ok(receiver.clone()));
    symbol.define_builtin("to_proc", to_proc);
    symbol.define_builtin("inspect", |rt, receiver, _, _| Ok(Value::str(rt.inspect(receiver)?)));
    symbol.define_builtin("length", length);
    symbol.define_builtin("size", length);
    symbol.define_builtin("<=>", spaceship);

    let regexp = runtime.core().regexp.clone();
    regexp.define_builtin("=~", regexp_match);
    regexp.define_builtin("match?", regexp_matches);
    regexp.define_builtin("===", regexp_matches);
    regexp.define_builtin("source", source);
    regexp.define_builtin("to_s", regexp_to_s);
    regexp.define_builtin("inspect", |rt, receiver, _, _| Ok(Value::str(rt.inspect(receiver)?)));
}

/// Text of a string or symbol receiver
fn text(value: &Value) -> String {
    value.as_text().unwrap_or_default()
}

/// Text of a string argument, raising for anything else
fn string_arg(rt: &mut Runtime, value: &Value) -> Result<String, Unwind> {
    match value {
        Value::Str(string) => Ok(string.to_string()),
        other => {
            let message = format!(
                "no implicit conversion of {} into String",
                describe(rt, other)
            );
            Err(rt.type_error(message))
        }
    }
}

fn describe(rt: &Runtime, value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::True => "true".to_string(),
        Value::False => "false".to_string(),
        other => rt.real_class_of(other).name(),
    }
}

fn concat(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let tail = string_arg(rt, &arg(args, 0))?;
    Ok(Value::str(text(receiver) + &tail))
}

fn repeat(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match arg(args, 0) {
        Value::Fixnum(count) if count >= 0 => Ok(Value::str(text(receiver).repeat(count as usize))),
        Value::Fixnum(_) => Err(rt.argument_error("negative argument")),
        other => {
            let message = format!("no implicit conversion of {} into Integer", describe(rt, &other));
            Err(rt.type_error(message))
        }
    }
}

fn equal(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(receiver.eql(&arg(args, 0))))
}

fn spaceship(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match rt.compare(receiver, &arg(args, 0))? {
        Some(order) => Value::Fixnum(order as i64),
        None => Value::Nil,
    })
}

fn ordered(
    rt: &mut Runtime,
    receiver: &Value,
    args: &[Value],
    test: fn(Ordering) -> bool,
) -> Result<Value, Unwind> {
    let order = rt.compare_or_raise(receiver, &arg(args, 0))?;
    Ok(Value::bool(test(order)))
}

/// `<<`: appends in place, stringifying integers as code points
fn append(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let string = match receiver {
        Value::Str(string) => string.clone(),
        other => return Ok(other.clone()),
    };
    let tail = match arg(args, 0) {
        Value::Fixnum(code) => match u32::try_from(code).ok().and_then(std::char::from_u32) {
            Some(c) => c.to_string(),
            None => return Err(rt.argument_error(format!("{} out of char range", code))),
        },
        other => string_arg(rt, &other)?,
    };
    if !string.push_str(&tail) {
        return Err(rt.frozen_error(receiver));
    }
    Ok(receiver.clone())
}

fn length(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::Fixnum(text(receiver).chars().count() as i64))
}

fn map_text(
    _: &mut Runtime,
    receiver: &Value,
    transform: fn(&str) -> String,
) -> Result<Value, Unwind> {
    Ok(Value::str(transform(&text(receiver))))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}

fn include(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let needle = string_arg(rt, &arg(args, 0))?;
    Ok(Value::bool(text(receiver).contains(&needle)))
}

fn start_with(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let haystack = text(receiver);
    for prefix in args {
        if haystack.starts_with(&string_arg(rt, prefix)?) {
            return Ok(Value::True);
        }
    }
    Ok(Value::False)
}

fn end_with(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let haystack = text(receiver);
    for suffix in args {
        if haystack.ends_with(&string_arg(rt, suffix)?) {
            return Ok(Value::True);
        }
    }
    Ok(Value::False)
}

fn to_sym(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::symbol(&text(receiver)))
}

/// Leading integer, `0` when there is none
fn to_i(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let text = text(receiver);
    let trimmed = text.trim_start();
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    Ok(Value::Fixnum(trimmed[..end].parse().unwrap_or(0)))
}

/// Longest leading float, `0.0` when there is none
fn to_f(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let text = text(receiver);
    let trimmed = text.trim();
    let parsed = (1..=trimmed.len())
        .rev()
        .filter(|end| trimmed.is_char_boundary(*end))
        .find_map(|end| trimmed[..end].parse::<f64>().ok());
    Ok(Value::Float(parsed.unwrap_or(0.0)))
}

fn inspect(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::str(quote(&text(receiver))))
}

fn empty(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(text(receiver).is_empty()))
}

/// `split`, on whitespace runs by default; trailing empty fields are dropped
fn split(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let text = text(receiver);
    let fields: Vec<String> = match arg(args, 0) {
        Value::Nil => text.split_whitespace().map(str::to_string).collect(),
        Value::Str(separator) if separator.borrow().as_str() == " " => {
            text.split_whitespace().map(str::to_string).collect()
        }
        Value::Str(separator) if separator.borrow().is_empty() => {
            text.chars().map(|c| c.to_string()).collect()
        }
        Value::Str(separator) => {
            let separator = separator.to_string();
            let mut fields: Vec<String> = text.split(separator.as_str()).map(str::to_string).collect();
            while fields.last().map_or(false, |last| last.is_empty()) {
                fields.pop();
            }
            fields
        }
        Value::Regexp(regexp) => {
            let mut fields: Vec<String> =
                text.split(regexp.pattern.as_str()).map(str::to_string).collect();
            while fields.last().map_or(false, |last| last.is_empty()) {
                fields.pop();
            }
            fields
        }
        other => {
            let message = format!("wrong argument type {} (expected Regexp)", describe(rt, &other));
            return Err(rt.type_error(message));
        }
    };
    Ok(Value::array(fields.into_iter().map(Value::str).collect()))
}

fn chars(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::array(
        text(receiver).chars().map(|c| Value::str(c.to_string())).collect(),
    ))
}

fn each_char(rt: &mut Runtime, receiver: &Value, _: &[Value], block: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    for c in text(receiver).chars() {
        rt.call_block(block, vec![Value::str(c.to_string())])?;
    }
    Ok(receiver.clone())
}

/// Character index resolving negative positions from the end
fn position(index: i64, length: usize) -> Option<usize> {
    let resolved = if index < 0 {
        length as i64 + index
    } else {
        index
    };
    if (0..=length as i64).contains(&resolved) {
        Some(resolved as usize)
    } else {
        None
    }
}

/// `[index]`, `[start, length]`, `[range]` or `[substring]`
fn index(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let chars: Vec<char> = text(receiver).chars().collect();
    let slice = |start: usize, count: usize| -> Value {
        let end = (start + count).min(chars.len());
        Value::str(chars[start..end].iter().collect::<String>())
    };
    Ok(match (arg(args, 0), args.get(1)) {
        (Value::Fixnum(at), None) => match position(at, chars.len()) {
            Some(at) if at < chars.len() => Value::str(chars[at].to_string()),
            _ => Value::Nil,
        },
        (Value::Fixnum(start), Some(Value::Fixnum(count))) if *count >= 0 => {
            match position(start, chars.len()) {
                Some(start) => slice(start, *count as usize),
                None => Value::Nil,
            }
        }
        (Value::Range(range), None) => {
            let begin = range.begin.as_fixnum().unwrap_or(0);
            let end = range.end.as_fixnum().unwrap_or(-1);
            match (position(begin, chars.len()), position(end, chars.len())) {
                (Some(start), Some(end)) => {
                    let end = if range.exclusive { end } else { end + 1 };
                    slice(start, end.saturating_sub(start))
                }
                (Some(start), None) if end >= 0 => slice(start, chars.len()),
                _ => Value::Nil,
            }
        }
        (Value::Str(needle), None) => {
            if text(receiver).contains(needle.borrow().as_str()) {
                Value::str(needle.to_string())
            } else {
                Value::Nil
            }
        }
        _ => Value::Nil,
    })
}

/// Match `haystack` against a pattern, recording the match for `$~` and friends
fn record_match(rt: &mut Runtime, regexp: &RegexpValue, haystack: &str) -> Value {
    let found = regexp.find(haystack).and_then(|start| {
        let end = start + regexp.pattern.len();
        Some((start, haystack.get(..start)?, haystack.get(start..end)?, haystack.get(end..)?))
    });
    match found {
        Some((start, pre, matched, post)) => {
            rt.last_match = Some(LastMatch {
                pre: pre.to_string(),
                matched: matched.to_string(),
                post: post.to_string(),
            });
            Value::Fixnum(haystack[..start].chars().count() as i64)
        }
        None => {
            rt.last_match = None;
            Value::Nil
        }
    }
}

fn string_match(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match arg(args, 0) {
        Value::Regexp(regexp) => Ok(record_match(rt, &regexp, &text(receiver))),
        Value::Str(_) => Err(rt.type_error("wrong argument type String (expected Regexp)")),
        other => rt.call_method(&other, "=~", vec![receiver.clone()], None, false),
    }
}

fn matches(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let haystack = text(receiver);
    Ok(Value::bool(match arg(args, 0) {
        Value::Regexp(regexp) => regexp.find(&haystack).is_some(),
        other => haystack.contains(&string_arg(rt, &other)?),
    }))
}

/// `sub`/`gsub` with a string or literal pattern and a string replacement
fn substitute(rt: &mut Runtime, receiver: &Value, args: &[Value], global: bool) -> Result<Value, Unwind> {
    let haystack = text(receiver);
    let replacement = string_arg(rt, &arg(args, 1))?;
    let (pattern, ignore_case) = match arg(args, 0) {
        Value::Regexp(regexp) => (regexp.pattern.clone(), regexp.options & 1 != 0),
        other => (string_arg(rt, &other)?, false),
    };
    if pattern.is_empty() {
        return Ok(Value::str(haystack));
    }
    let searched = if ignore_case {
        haystack.to_lowercase()
    } else {
        haystack.clone()
    };
    let needle = if ignore_case {
        pattern.to_lowercase()
    } else {
        pattern
    };
    if searched.len() != haystack.len() {
        // case folding changed byte offsets; fall back to exact matching
        return Ok(Value::str(if global {
            haystack.replace(&needle, &replacement)
        } else {
            haystack.replacen(&needle, &replacement, 1)
        }));
    }
    let mut result = String::with_capacity(haystack.len());
    let mut copied = 0;
    for (start, _) in searched.match_indices(needle.as_str()) {
        result.push_str(&haystack[copied..start]);
        result.push_str(&replacement);
        copied = start + needle.len();
        if !global {
            break;
        }
    }
    result.push_str(&haystack[copied..]);
    Ok(Value::str(result))
}

fn justify(rt: &mut Runtime, receiver: &Value, args: &[Value], right: bool) -> Result<Value, Unwind> {
    let text = text(receiver);
    let width = arg(args, 0).as_fixnum().unwrap_or(0).max(0) as usize;
    let pad = match args.get(1) {
        Some(pad) => string_arg(rt, pad)?,
        None => " ".to_string(),
    };
    let length = text.chars().count();
    if pad.is_empty() || width <= length {
        return Ok(Value::str(text));
    }
    let padding: String = pad.chars().cycle().take(width - length).collect();
    Ok(Value::str(if right {
        padding + &text
    } else {
        text + &padding
    }))
}

fn hash(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let hashed = text(receiver)
        .bytes()
        .fold(5381i64, |hash, byte| hash.wrapping_mul(33) ^ byte as i64);
    Ok(Value::Fixnum(hashed))
}

fn symbol_name(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::Str(Rc::new(RString::new(text(receiver)))))
}

/// `:name.to_proc`: a block calling `name` on its first argument
fn to_proc(rt: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    match rt.to_block(receiver)? {
        Some(block) => Ok(Value::Proc(block)),
        None => Ok(Value::Nil),
    }
}

fn regexp_match(rt: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    let regexp = match receiver {
        Value::Regexp(regexp) => regexp.clone(),
        _ => return Ok(Value::Nil),
    };
    match arg(args, 0) {
        Value::Nil => {
            rt.last_match = None;
            Ok(Value::Nil)
        }
        Value::Symbol(name) => Ok(record_match(rt, &regexp, &name)),
        other => {
            let haystack = string_arg(rt, &other)?;
            Ok(record_match(rt, &regexp, &haystack))
        }
    }
}

fn regexp_matches(_: &mut Runtime, receiver: &Value, args: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(Value::bool(match (receiver, arg(args, 0)) {
        (Value::Regexp(regexp), Value::Str(haystack)) => regexp.find(&haystack.borrow()).is_some(),
        (Value::Regexp(regexp), Value::Symbol(name)) => regexp.find(&name).is_some(),
        _ => false,
    }))
}

fn source(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match receiver {
        Value::Regexp(regexp) => Value::str(regexp.pattern.clone()),
        _ => Value::Nil,
    })
}

fn regexp_to_s(_: &mut Runtime, receiver: &Value, _: &[Value], _: Option<&Rc<Block>>) -> Result<Value, Unwind> {
    Ok(match receiver {
        Value::Regexp(regexp) => {
            let flags = if regexp.options & 1 != 0 { "i" } else { "" };
            Value::str(format!("(?{}-mix:{})", flags, regexp.pattern))
        }
        _ => Value::Nil,
    })
}

#[cfg(test)]
mod test {
    use super::{capitalize, position};

    #[test]
    fn capitalizes_first_letter_only() {
        assert_eq!(capitalize("hELLO"), "Hello");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn negative_positions_count_from_the_end() {
        assert_eq!(position(-1, 3), Some(2));
        assert_eq!(position(3, 3), Some(3));
        assert_eq!(position(-4, 3), None);
    }
}
