//! String methods with UTF-16 indexing semantics: lengths, slices and
//! character positions count UTF-16 code units, not bytes or scalars.

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::context::Context;
use crate::runtime::operations::{to_display_string, to_number};
use crate::runtime::value::{throw_type_error, NativeFn, Thrown, Value};

pub(super) fn lookup(name: &str) -> Option<(&'static str, NativeFn)> {
    Some(match name {
        "slice" => ("slice", slice),
        "substring" => ("substring", substring),
        "charAt" => ("charAt", char_at),
        "charCodeAt" => ("charCodeAt", char_code_at),
        "at" => ("at", at),
        "indexOf" => ("indexOf", index_of),
        "includes" => ("includes", includes),
        "startsWith" => ("startsWith", starts_with),
        "endsWith" => ("endsWith", ends_with),
        "padStart" => ("padStart", pad_start),
        "padEnd" => ("padEnd", pad_end),
        "toUpperCase" => ("toUpperCase", to_upper),
        "toLowerCase" => ("toLowerCase", to_lower),
        "split" => ("split", split),
        "trim" => ("trim", trim),
        "repeat" => ("repeat", repeat),
        "concat" => ("concat", concat),
        "replace" => ("replace", replace),
        "toString" => ("toString", to_string),
        _ => return None,
    })
}

fn this_units(this: &Value) -> Result<Vec<u16>, Thrown> {
    match this {
        Value::Str(s) => Ok(s.encode_utf16().collect()),
        _ => Err(throw_type_error("string method called on a non-string")),
    }
}

fn this_string(this: &Value) -> Result<Rc<String>, Thrown> {
    match this {
        Value::Str(s) => Ok(s.clone()),
        _ => Err(throw_type_error("string method called on a non-string")),
    }
}

fn from_units(units: &[u16]) -> Value {
    Value::str(String::from_utf16_lossy(units))
}

/// Resolve a possibly-negative index against `len`, clamping into range.
fn resolve_index(raw: f64, len: usize) -> usize {
    if raw.is_nan() {
        return 0;
    }
    if raw < 0.0 {
        let back = (-raw) as usize;
        len.saturating_sub(back)
    } else {
        (raw as usize).min(len)
    }
}

fn slice(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let units = this_units(&this)?;
    let len = units.len();
    let start = resolve_index(args.first().map(to_number).unwrap_or(0.0), len);
    let end = match args.get(1) {
        None | Some(Value::Undefined) => len,
        Some(value) => resolve_index(to_number(value), len),
    };
    if start >= end {
        return Ok(Value::str(""));
    }
    Ok(from_units(&units[start..end]))
}

fn substring(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let units = this_units(&this)?;
    let len = units.len();
    let a = (args.first().map(to_number).unwrap_or(0.0).max(0.0) as usize).min(len);
    let b = match args.get(1) {
        None | Some(Value::Undefined) => len,
        Some(value) => (to_number(value).max(0.0) as usize).min(len),
    };
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    Ok(from_units(&units[start..end]))
}

fn char_at(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let units = this_units(&this)?;
    let index = args.first().map(to_number).unwrap_or(0.0);
    if index < 0.0 || index >= units.len() as f64 || index.is_nan() {
        return Ok(Value::str(""));
    }
    let index = index as usize;
    Ok(from_units(&units[index..=index]))
}

/// Out-of-range positions are `NaN`.
fn char_code_at(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let units = this_units(&this)?;
    let index = args.first().map(to_number).unwrap_or(0.0);
    if index < 0.0 || index.is_nan() || index >= units.len() as f64 {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(units[index as usize] as f64))
}

/// Negative indices count from the end; out-of-range is `null`.
fn at(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let units = this_units(&this)?;
    let raw = args.first().map(to_number).unwrap_or(0.0);
    let len = units.len() as f64;
    let index = if raw < 0.0 { len + raw } else { raw };
    if index < 0.0 || index >= len || index.is_nan() {
        return Ok(Value::Null);
    }
    let index = index as usize;
    Ok(from_units(&units[index..=index]))
}

fn find_sub(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

fn index_of(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let units = this_units(&this)?;
    let needle: Vec<u16> = args
        .first()
        .map(to_display_string)
        .unwrap_or_default()
        .encode_utf16()
        .collect();
    match find_sub(&units, &needle, 0) {
        Some(index) => Ok(Value::Number(index as f64)),
        None => Ok(Value::Number(-1.0)),
    }
}

fn includes(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let units = this_units(&this)?;
    let needle: Vec<u16> = args
        .first()
        .map(to_display_string)
        .unwrap_or_default()
        .encode_utf16()
        .collect();
    Ok(Value::Bool(find_sub(&units, &needle, 0).is_some()))
}

fn starts_with(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = this_string(&this)?;
    let needle = args.first().map(to_display_string).unwrap_or_default();
    Ok(Value::Bool(s.starts_with(&needle)))
}

fn ends_with(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = this_string(&this)?;
    let needle = args.first().map(to_display_string).unwrap_or_default();
    Ok(Value::Bool(s.ends_with(&needle)))
}

fn pad(this: Value, args: &[Value], at_start: bool) -> Result<Value, Thrown> {
    let units = this_units(&this)?;
    let target = args.first().map(to_number).unwrap_or(0.0).max(0.0) as usize;
    let filler = match args.get(1) {
        None | Some(Value::Undefined) => " ".to_string(),
        Some(value) => to_display_string(value),
    };
    let fill_units: Vec<u16> = filler.encode_utf16().collect();
    if units.len() >= target || fill_units.is_empty() {
        return Ok(from_units(&units));
    }
    let mut padding = vec![];
    while units.len() + padding.len() < target {
        let remaining = target - units.len() - padding.len();
        padding.extend_from_slice(&fill_units[..fill_units.len().min(remaining)]);
    }
    let mut result = vec![];
    if at_start {
        result.extend_from_slice(&padding);
        result.extend_from_slice(&units);
    } else {
        result.extend_from_slice(&units);
        result.extend_from_slice(&padding);
    }
    Ok(from_units(&result))
}

fn pad_start(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    pad(this, args, true)
}

fn pad_end(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    pad(this, args, false)
}

fn to_upper(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::str(this_string(&this)?.to_uppercase()))
}

fn to_lower(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::str(this_string(&this)?.to_lowercase()))
}

fn split(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = this_string(&this)?;
    let parts: Vec<Value> = match args.first() {
        None | Some(Value::Undefined) => vec![Value::Str(s)],
        Some(separator) => {
            let separator = to_display_string(separator);
            if separator.is_empty() {
                s.chars().map(|c| Value::str(c.to_string())).collect()
            } else {
                s.split(separator.as_str()).map(Value::str).collect()
            }
        }
    };
    Ok(Value::Array(Rc::new(RefCell::new(parts))))
}

fn trim(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::str(this_string(&this)?.trim()))
}

fn repeat(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = this_string(&this)?;
    let count = args.first().map(to_number).unwrap_or(0.0);
    if count < 0.0 || count.is_infinite() {
        return Err(crate::runtime::value::throw_range_error(
            "Invalid count value",
        ));
    }
    Ok(Value::str(s.repeat(count as usize)))
}

fn concat(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let mut result = this_string(&this)?.as_ref().clone();
    for arg in args {
        result.push_str(&to_display_string(arg));
    }
    Ok(Value::str(result))
}

/// First-occurrence replacement with a string pattern.
fn replace(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = this_string(&this)?;
    let pattern = args.first().map(to_display_string).unwrap_or_default();
    let replacement = args.get(1).map(to_display_string).unwrap_or_default();
    Ok(Value::str(s.replacen(&pattern, &replacement, 1)))
}

fn to_string(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Str(this_string(&this)?))
}
