//! Host routines shared by the interpreter and the compiled back-end:
//! coercions, equality, display conversion, property resolution and the
//! iteration protocol. Keeping these in one place is what makes the two
//! execution modes observationally equivalent.

use std::cell::RefCell;
use std::rc::Rc;

use crate::interpreter::call_function;
use crate::parser::ast::BinaryOp;

use super::context::Context;
use super::symbol::{well_known, SymbolValue};
use super::value::{
    new_error, throw_type_error, ErrorKind, NativeIter, Property, Thrown, Value,
};

// ---------------------------------------------------------------------------
// conversions
// ---------------------------------------------------------------------------

/// Numbers print without trailing zero decimals; integers have no decimal
/// point at all.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

/// The string conversion used by `console.log`, template literals and
/// string concatenation.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        Value::Str(s) => s.as_ref().clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Undefined => "undefined".to_string(),
        Value::Symbol(symbol) => symbol.to_display(),
        Value::Array(items) => {
            let items = items.borrow();
            items
                .iter()
                .map(|item| match item {
                    Value::Null | Value::Undefined => String::new(),
                    other => to_display_string(other),
                })
                .collect::<Vec<_>>()
                .join(",")
        }
        Value::Object(_) => "[object Object]".to_string(),
        Value::Function(func) => {
            let name = func.name.borrow();
            if name.is_empty() {
                "[Function (anonymous)]".to_string()
            } else {
                format!("[Function: {name}]")
            }
        }
        Value::Class(class) => format!("[class {}]", class.name),
        Value::Builtin(builtin) => format!("[Function: {}]", builtin.name),
        Value::Generator(_) => "[object Generator]".to_string(),
        Value::Promise(_) => "[object Promise]".to_string(),
        Value::Error(err) => err.borrow().to_display(),
        Value::Map(_) => "[object Map]".to_string(),
        Value::Set(_) => "[object Set]".to_string(),
        Value::WeakMap(_) => "[object WeakMap]".to_string(),
        Value::WeakSet(_) => "[object WeakSet]".to_string(),
        Value::Regex(regex) => format!("/{}/{}", regex.pattern, regex.flags),
        Value::NativeIter(_) => "[object Object]".to_string(),
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !s.is_empty(),
        Value::Bool(b) => *b,
        Value::Null | Value::Undefined => false,
        _ => true,
    }
}

pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        Value::Null => 0.0,
        Value::Undefined => f64::NAN,
        Value::Str(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN)
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

fn is_numeric_like(value: &Value) -> bool {
    matches!(
        value,
        Value::Number(_) | Value::Bool(_) | Value::Null | Value::Undefined
    )
}

// ---------------------------------------------------------------------------
// equality
// ---------------------------------------------------------------------------

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) => true,
        (Value::Undefined, Value::Undefined) => true,
        (Value::Symbol(x), Value::Symbol(y)) => Rc::ptr_eq(x, y),
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => Rc::ptr_eq(x, y),
        (Value::Generator(x), Value::Generator(y)) => Rc::ptr_eq(x, y),
        (Value::Promise(x), Value::Promise(y)) => Rc::ptr_eq(x, y),
        (Value::Error(x), Value::Error(y)) => Rc::ptr_eq(x, y),
        (Value::Map(x), Value::Map(y)) => Rc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
        (Value::WeakMap(x), Value::WeakMap(y)) => Rc::ptr_eq(x, y),
        (Value::WeakSet(x), Value::WeakSet(y)) => Rc::ptr_eq(x, y),
        (Value::Regex(x), Value::Regex(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
        (Value::Number(_), Value::Number(_))
        | (Value::Str(_), Value::Str(_))
        | (Value::Bool(_), Value::Bool(_)) => strict_equals(a, b),
        (Value::Number(x), Value::Str(_)) => *x == to_number(b),
        (Value::Str(_), Value::Number(y)) => to_number(a) == *y,
        (Value::Bool(_), _) => {
            let x = to_number(a);
            loose_equals(&Value::Number(x), b)
        }
        (_, Value::Bool(_)) => {
            let y = to_number(b);
            loose_equals(a, &Value::Number(y))
        }
        _ => strict_equals(a, b),
    }
}

// ---------------------------------------------------------------------------
// binary operators
// ---------------------------------------------------------------------------

/// Binary operators without observable side effects. `instanceof` and `in`
/// dispatch separately because they can run user code.
pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, Thrown> {
    let value = match op {
        BinaryOp::Add => {
            if is_numeric_like(lhs) && is_numeric_like(rhs) {
                Value::Number(to_number(lhs) + to_number(rhs))
            } else {
                Value::str(format!(
                    "{}{}",
                    to_display_string(lhs),
                    to_display_string(rhs)
                ))
            }
        }
        BinaryOp::Sub => Value::Number(to_number(lhs) - to_number(rhs)),
        BinaryOp::Mul => Value::Number(to_number(lhs) * to_number(rhs)),
        BinaryOp::Div => Value::Number(to_number(lhs) / to_number(rhs)),
        BinaryOp::Rem => Value::Number(to_number(lhs) % to_number(rhs)),
        BinaryOp::EqLoose => Value::Bool(loose_equals(lhs, rhs)),
        BinaryOp::NeqLoose => Value::Bool(!loose_equals(lhs, rhs)),
        BinaryOp::EqStrict => Value::Bool(strict_equals(lhs, rhs)),
        BinaryOp::NeqStrict => Value::Bool(!strict_equals(lhs, rhs)),
        BinaryOp::Lt => compare(lhs, rhs, |ord| ord == std::cmp::Ordering::Less),
        BinaryOp::LtEq => compare(lhs, rhs, |ord| ord != std::cmp::Ordering::Greater),
        BinaryOp::Gt => compare(lhs, rhs, |ord| ord == std::cmp::Ordering::Greater),
        BinaryOp::GtEq => compare(lhs, rhs, |ord| ord != std::cmp::Ordering::Less),
        BinaryOp::Instanceof | BinaryOp::In => {
            unreachable!("instanceof/in are dispatched through their own routines")
        }
    };
    Ok(value)
}

fn compare(lhs: &Value, rhs: &Value, pick: fn(std::cmp::Ordering) -> bool) -> Value {
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Value::Bool(pick(a.cmp(b)));
    }
    let (a, b) = (to_number(lhs), to_number(rhs));
    match a.partial_cmp(&b) {
        Some(ord) => Value::Bool(pick(ord)),
        None => Value::Bool(false),
    }
}

pub fn instanceof(ctx: &mut Context, lhs: &Value, rhs: &Value) -> Result<bool, Thrown> {
    match rhs {
        Value::Class(class) => {
            match lhs {
                Value::Object(obj) => {
                    let instance_class = obj.borrow().class.clone();
                    Ok(instance_class.is_some_and(|c| c.derives_from(class)))
                }
                _ => Ok(false),
            }
        }
        Value::Builtin(builtin) => match builtin.ctor {
            Some(super::value::NativeCtor::Error(kind)) => match lhs {
                Value::Error(err) => {
                    let actual = err.borrow().kind;
                    Ok(actual == kind || kind == ErrorKind::Error)
                }
                _ => Ok(false),
            },
            Some(super::value::NativeCtor::Map) => Ok(matches!(lhs, Value::Map(_))),
            Some(super::value::NativeCtor::Set) => Ok(matches!(lhs, Value::Set(_))),
            Some(super::value::NativeCtor::WeakMap) => Ok(matches!(lhs, Value::WeakMap(_))),
            Some(super::value::NativeCtor::WeakSet) => Ok(matches!(lhs, Value::WeakSet(_))),
            None => Err(throw_type_error(
                "Right-hand side of 'instanceof' is not callable",
            )),
        },
        Value::Object(obj) => {
            let custom = obj.borrow().get_symbol(&well_known().has_instance);
            match custom {
                Some(custom) => {
                    let result = call_function(ctx, &custom, Some(rhs.clone()), vec![lhs.clone()])?;
                    Ok(truthy(&result))
                }
                None => Err(throw_type_error(
                    "Right-hand side of 'instanceof' is not callable",
                )),
            }
        }
        _ => Err(throw_type_error(
            "Right-hand side of 'instanceof' is not callable",
        )),
    }
}

pub fn in_operator(lhs: &Value, rhs: &Value) -> Result<bool, Thrown> {
    let key = to_property_key(lhs)?;
    match rhs {
        Value::Object(obj) => {
            let obj = obj.borrow();
            match &key {
                PropertyKey::Str(name) => {
                    if obj.properties.contains_key(name) {
                        return Ok(true);
                    }
                    if let Some(class) = &obj.class {
                        return Ok(class.find_method(name).is_some()
                            || class.find_getter(name).is_some());
                    }
                    Ok(false)
                }
                PropertyKey::Symbol(symbol) => Ok(obj.get_symbol(symbol).is_some()),
            }
        }
        Value::Array(items) => match &key {
            PropertyKey::Str(name) => match name.parse::<usize>() {
                Ok(index) => Ok(index < items.borrow().len()),
                Err(_) => Ok(name == "length"),
            },
            PropertyKey::Symbol(_) => Ok(false),
        },
        _ => Err(throw_type_error(format!(
            "Cannot use 'in' operator to search for '{}' in {}",
            to_display_string(lhs),
            to_display_string(rhs)
        ))),
    }
}

// ---------------------------------------------------------------------------
// property access
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum PropertyKey {
    Str(String),
    Symbol(Rc<SymbolValue>),
}

impl PropertyKey {
    pub fn name(&self) -> String {
        match self {
            PropertyKey::Str(name) => name.clone(),
            PropertyKey::Symbol(symbol) => symbol.to_display(),
        }
    }
}

pub fn to_property_key(value: &Value) -> Result<PropertyKey, Thrown> {
    match value {
        Value::Symbol(symbol) => Ok(PropertyKey::Symbol(symbol.clone())),
        other => Ok(PropertyKey::Str(to_display_string(other))),
    }
}

/// Property resolution: own string-keyed map, own symbol side map, class
/// method table (walking the inheritance chain), built-in method table for
/// the value's tag, then `undefined`.
pub fn get_property(ctx: &mut Context, target: &Value, key: &PropertyKey) -> Result<Value, Thrown> {
    if let PropertyKey::Symbol(symbol) = key {
        return get_symbol_property(ctx, target, symbol);
    }
    let PropertyKey::Str(name) = key else {
        unreachable!()
    };

    match target {
        Value::Object(obj) => {
            let found = {
                let data = obj.borrow();
                data.properties.get(name.as_str()).cloned()
            };
            if let Some(property) = found {
                if let Some(getter) = &property.getter {
                    return call_function(ctx, getter, Some(target.clone()), vec![]);
                }
                if property.is_accessor() {
                    // setter-only property reads as undefined
                    return Ok(Value::Undefined);
                }
                return Ok(property.value.clone());
            }
            let class = obj.borrow().class.clone();
            if let Some(class) = class {
                if let Some(getter) = class.find_getter(name) {
                    return call_function(
                        ctx,
                        &Value::Function(getter),
                        Some(target.clone()),
                        vec![],
                    );
                }
                if let Some(method) = class.find_method(name) {
                    return Ok(Value::Function(method));
                }
            }
            Ok(super::builtins::object_method(name, target))
        }
        Value::Str(s) => {
            if name == "length" {
                return Ok(Value::Number(s.encode_utf16().count() as f64));
            }
            if let Ok(index) = name.parse::<usize>() {
                let units: Vec<u16> = s.encode_utf16().collect();
                return Ok(match units.get(index) {
                    Some(_) => Value::str(String::from_utf16_lossy(&units[index..=index])),
                    None => Value::Undefined,
                });
            }
            Ok(super::builtins::string_method(name, target))
        }
        Value::Array(items) => {
            if name == "length" {
                return Ok(Value::Number(items.borrow().len() as f64));
            }
            if let Ok(index) = name.parse::<usize>() {
                return Ok(items.borrow().get(index).cloned().unwrap_or(Value::Undefined));
            }
            Ok(super::builtins::array_method(name, target))
        }
        Value::Number(_) => Ok(super::builtins::number_method(name, target)),
        Value::Error(err) => {
            {
                let data = err.borrow();
                match name.as_str() {
                    "name" => return Ok(Value::str(data.name.clone())),
                    "message" => return Ok(Value::str(data.message.clone())),
                    "stack" => return Ok(Value::str(data.stack.clone())),
                    _ => {}
                }
                if let Some(value) = data.extra.get(name.as_str()) {
                    return Ok(value.clone());
                }
            }
            Ok(super::builtins::error_method(name, target))
        }
        Value::Class(class) => {
            if name == "name" {
                return Ok(Value::str(class.name.clone()));
            }
            Ok(class.find_static(name).unwrap_or(Value::Undefined))
        }
        Value::Map(map) => {
            if name == "size" {
                return Ok(Value::Number(map.borrow().entries.len() as f64));
            }
            Ok(super::builtins::map_method(name, target))
        }
        Value::Set(set) => {
            if name == "size" {
                return Ok(Value::Number(set.borrow().entries.len() as f64));
            }
            Ok(super::builtins::set_method(name, target))
        }
        Value::WeakMap(_) => Ok(super::builtins::weak_map_method(name, target)),
        Value::WeakSet(_) => Ok(super::builtins::weak_set_method(name, target)),
        Value::Generator(_) => Ok(crate::compiler::vm::generator_method(name, target)),
        Value::Symbol(symbol) => match name.as_str() {
            "description" => Ok(symbol
                .description
                .clone()
                .map(Value::str)
                .unwrap_or(Value::Undefined)),
            _ => Ok(super::builtins::symbol_method(name, target)),
        },
        Value::Function(func) => match name.as_str() {
            "name" => Ok(Value::str(func.name.borrow().clone())),
            "length" => Ok(Value::Number(
                func.func.params.iter().filter(|p| !p.optional && !p.rest && p.default.is_none()).count() as f64,
            )),
            _ => Ok(Value::Undefined),
        },
        Value::Regex(regex) => match name.as_str() {
            "source" => Ok(Value::str(regex.pattern.clone())),
            "flags" => Ok(Value::str(regex.flags.clone())),
            _ => Ok(super::builtins::regex_method(name, target)),
        },
        Value::Builtin(builtin) => Ok(super::builtins::builtin_static(builtin.name, name)),
        Value::Null | Value::Undefined => Err(throw_type_error(format!(
            "Cannot read properties of {} (reading '{name}')",
            to_display_string(target)
        ))),
        _ => Ok(Value::Undefined),
    }
}

fn get_symbol_property(
    ctx: &mut Context,
    target: &Value,
    symbol: &Rc<SymbolValue>,
) -> Result<Value, Thrown> {
    let _ = ctx;
    match target {
        Value::Object(obj) => Ok(obj.borrow().get_symbol(symbol).unwrap_or(Value::Undefined)),
        Value::Generator(_) => {
            if Rc::ptr_eq(symbol, &well_known().iterator) {
                Ok(crate::compiler::vm::generator_method("__self_iterator__", target))
            } else {
                Ok(Value::Undefined)
            }
        }
        Value::Null | Value::Undefined => Err(throw_type_error(format!(
            "Cannot read properties of {}",
            to_display_string(target)
        ))),
        _ => Ok(Value::Undefined),
    }
}

/// Assignment through a property reference, honoring frozen/sealed flags,
/// accessor slots and strict-vs-sloppy silence.
pub fn set_property(
    ctx: &mut Context,
    target: &Value,
    key: &PropertyKey,
    value: Value,
    strict: bool,
) -> Result<(), Thrown> {
    match target {
        Value::Object(obj) => {
            if let PropertyKey::Symbol(symbol) = key {
                if obj.borrow().frozen {
                    return frozen_write_error(strict, &key.name());
                }
                obj.borrow_mut().set_symbol(symbol.clone(), value);
                return Ok(());
            }
            let PropertyKey::Str(name) = key else {
                unreachable!()
            };

            let (frozen, sealed, existing, class) = {
                let data = obj.borrow();
                (
                    data.frozen,
                    data.sealed,
                    data.properties.get(name.as_str()).cloned(),
                    data.class.clone(),
                )
            };

            if let Some(property) = &existing {
                if property.is_accessor() {
                    return match &property.setter {
                        Some(setter) => {
                            call_function(ctx, setter, Some(target.clone()), vec![value])?;
                            Ok(())
                        }
                        None => {
                            if strict {
                                Err(throw_type_error(format!(
                                    "Cannot set property {name} of #<Object> which has only a getter"
                                )))
                            } else {
                                Ok(())
                            }
                        }
                    };
                }
                if frozen {
                    return frozen_write_error(strict, name);
                }
                obj.borrow_mut()
                    .properties
                    .insert(name.clone(), Property::plain(value));
                return Ok(());
            }

            if let Some(class) = &class {
                if let Some(setter) = class.find_setter(name) {
                    call_function(ctx, &Value::Function(setter), Some(target.clone()), vec![value])?;
                    return Ok(());
                }
                if class.find_getter(name).is_some() {
                    return if strict {
                        Err(throw_type_error(format!(
                            "Cannot set property {name} of #<Object> which has only a getter"
                        )))
                    } else {
                        Ok(())
                    };
                }
            }

            if frozen || sealed {
                return if strict {
                    Err(throw_type_error(format!(
                        "Cannot add property {name}, object is not extensible"
                    )))
                } else {
                    Ok(())
                };
            }
            obj.borrow_mut()
                .properties
                .insert(name.clone(), Property::plain(value));
            Ok(())
        }
        Value::Array(items) => {
            let PropertyKey::Str(name) = key else {
                return Ok(());
            };
            if name == "length" {
                let new_len = to_number(&value) as usize;
                items.borrow_mut().resize(new_len, Value::Undefined);
                return Ok(());
            }
            if let Ok(index) = name.parse::<usize>() {
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
            }
            Ok(())
        }
        Value::Error(err) => {
            let PropertyKey::Str(name) = key else {
                return Ok(());
            };
            let mut data = err.borrow_mut();
            match name.as_str() {
                "name" => data.name = to_display_string(&value),
                "message" => data.message = to_display_string(&value),
                "stack" => data.stack = to_display_string(&value),
                _ => {
                    data.extra.insert(name.clone(), value);
                }
            }
            Ok(())
        }
        Value::Class(class) => {
            let PropertyKey::Str(name) = key else {
                return Ok(());
            };
            class.statics.borrow_mut().insert(name.clone(), value);
            Ok(())
        }
        Value::Null | Value::Undefined => Err(throw_type_error(format!(
            "Cannot set properties of {}",
            to_display_string(target)
        ))),
        _ => {
            if strict {
                Err(throw_type_error(format!(
                    "Cannot create property '{}' on {}",
                    key.name(),
                    target.type_of()
                )))
            } else {
                Ok(())
            }
        }
    }
}

fn frozen_write_error(strict: bool, name: &str) -> Result<(), Thrown> {
    if strict {
        Err(throw_type_error(format!(
            "Cannot assign to read only property '{name}' of object"
        )))
    } else {
        Ok(())
    }
}

/// `delete target[key]`. Returns the expression's boolean result.
pub fn delete_property(target: &Value, key: &PropertyKey, strict: bool) -> Result<bool, Thrown> {
    match target {
        Value::Object(obj) => {
            let PropertyKey::Str(name) = key else {
                return Ok(true);
            };
            let (locked, exists) = {
                let data = obj.borrow();
                (
                    data.frozen || data.sealed,
                    data.properties.contains_key(name.as_str()),
                )
            };
            if !exists {
                return Ok(true);
            }
            if locked {
                return if strict {
                    Err(throw_type_error(format!(
                        "Cannot delete property '{name}' of #<Object>"
                    )))
                } else {
                    Ok(false)
                };
            }
            obj.borrow_mut().properties.shift_remove(name.as_str());
            Ok(true)
        }
        Value::Array(items) => {
            let PropertyKey::Str(name) = key else {
                return Ok(true);
            };
            if let Ok(index) = name.parse::<usize>() {
                let mut items = items.borrow_mut();
                if index < items.len() {
                    items[index] = Value::Undefined;
                }
            }
            Ok(true)
        }
        _ => Ok(true),
    }
}

// ---------------------------------------------------------------------------
// iteration protocol
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum IterStep {
    Value(Value),
    /// Exhausted; carries the iterator's return value (the value of a
    /// delegating `yield*` expression).
    Done(Value),
}

/// Produce an iterator handle for `for-of`, spread and `yield*`.
pub fn get_iterator(ctx: &mut Context, value: &Value) -> Result<Value, Thrown> {
    let iter = match value {
        Value::Array(items) => NativeIter::Values {
            items: items.borrow().clone(),
            index: 0,
        },
        Value::Str(s) => NativeIter::Values {
            items: s.chars().map(|c| Value::str(c.to_string())).collect(),
            index: 0,
        },
        Value::Map(map) => NativeIter::Values {
            items: map
                .borrow()
                .entries
                .iter()
                .map(|(k, v)| {
                    Value::Array(Rc::new(RefCell::new(vec![k.clone(), v.clone()])))
                })
                .collect(),
            index: 0,
        },
        Value::Set(set) => NativeIter::Values {
            items: set.borrow().entries.clone(),
            index: 0,
        },
        Value::Generator(gen) => NativeIter::Generator(gen.clone()),
        Value::Object(obj) => {
            let custom = obj.borrow().get_symbol(&well_known().iterator);
            match custom {
                Some(method) => {
                    let iterator = call_function(ctx, &method, Some(value.clone()), vec![])?;
                    match iterator {
                        Value::Generator(gen) => NativeIter::Generator(gen),
                        other => NativeIter::Protocol { target: other },
                    }
                }
                None => {
                    // an object with a `next` method satisfies the protocol
                    let has_next = obj.borrow().properties.contains_key("next")
                        || obj
                            .borrow()
                            .class
                            .as_ref()
                            .is_some_and(|c| c.find_method("next").is_some());
                    if has_next {
                        NativeIter::Protocol {
                            target: value.clone(),
                        }
                    } else {
                        return Err(throw_type_error(format!(
                            "{} is not iterable",
                            to_display_string(value)
                        )));
                    }
                }
            }
        }
        other => {
            return Err(throw_type_error(format!(
                "{} is not iterable",
                to_display_string(other)
            )))
        }
    };
    Ok(Value::NativeIter(Rc::new(RefCell::new(iter))))
}

/// Advance an iterator handle one step.
pub fn iter_next(ctx: &mut Context, iterator: &Value) -> Result<IterStep, Thrown> {
    let Value::NativeIter(iter) = iterator else {
        return Err(throw_type_error("value is not an iterator"));
    };

    enum Plan {
        Snapshot(Option<Value>),
        Generator(Rc<RefCell<super::value::GeneratorState>>),
        Protocol(Value),
    }

    let plan = {
        let mut iter = iter.borrow_mut();
        match &mut *iter {
            NativeIter::Values { items, index } => {
                let item = items.get(*index).cloned();
                if item.is_some() {
                    *index += 1;
                }
                Plan::Snapshot(item)
            }
            NativeIter::Generator(gen) => Plan::Generator(gen.clone()),
            NativeIter::Protocol { target } => Plan::Protocol(target.clone()),
        }
    };

    match plan {
        Plan::Snapshot(Some(item)) => Ok(IterStep::Value(item)),
        Plan::Snapshot(None) => Ok(IterStep::Done(Value::Undefined)),
        Plan::Generator(gen) => {
            let result = crate::compiler::vm::resume_generator(
                ctx,
                &gen,
                crate::compiler::vm::ResumeMode::Next(Value::Undefined),
            )?;
            if result.done {
                Ok(IterStep::Done(result.value))
            } else {
                Ok(IterStep::Value(result.value))
            }
        }
        Plan::Protocol(target) => {
            let next = get_property(ctx, &target, &PropertyKey::Str("next".into()))?;
            if !next.is_callable() {
                return Err(throw_type_error("iterator has no next method"));
            }
            let step = call_function(ctx, &next, Some(target), vec![])?;
            let done = get_property(ctx, &step, &PropertyKey::Str("done".into()))?;
            let value = get_property(ctx, &step, &PropertyKey::Str("value".into()))?;
            if truthy(&done) {
                Ok(IterStep::Done(value))
            } else {
                Ok(IterStep::Value(value))
            }
        }
    }
}

/// Collect every remaining value of an iterable (spread positions).
pub fn iterate_to_vec(ctx: &mut Context, value: &Value) -> Result<Vec<Value>, Thrown> {
    let iterator = get_iterator(ctx, value)?;
    let mut out = vec![];
    loop {
        match iter_next(ctx, &iterator)? {
            IterStep::Value(item) => out.push(item),
            IterStep::Done(_) => return Ok(out),
        }
    }
}

/// Enumerable string keys for `for-in`.
pub fn enumerate_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => obj.borrow().properties.keys().cloned().collect(),
        Value::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        Value::Error(err) => err.borrow().extra.keys().cloned().collect(),
        _ => vec![],
    }
}

/// Wrap a value into an already-settled promise unless it is one.
pub fn to_promise(value: Value) -> Rc<RefCell<super::value::PromiseData>> {
    match value {
        Value::Promise(promise) => promise,
        other => super::value::PromiseData::fulfilled(other),
    }
}

/// The message surfaced when an uncaught value terminates the program:
/// the JS error name followed by the detail.
pub fn uncaught_to_message(value: &Value) -> String {
    match value {
        Value::Error(err) => err.borrow().to_display(),
        other => format!("Error: {}", to_display_string(other)),
    }
}

pub fn type_error_value(message: impl Into<String>) -> Value {
    new_error(ErrorKind::TypeError, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(15.0), "15");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_loose_equality_of_null_and_undefined() {
        assert!(loose_equals(&Value::Undefined, &Value::Null));
        assert!(!strict_equals(&Value::Undefined, &Value::Null));
        assert!(!loose_equals(&Value::Undefined, &Value::Number(0.0)));
    }

    #[test]
    fn test_string_number_loose_equality() {
        assert!(loose_equals(&Value::str("5"), &Value::Number(5.0)));
        assert!(!loose_equals(&Value::str("5"), &Value::Number(6.0)));
        assert!(loose_equals(&Value::Bool(true), &Value::Number(1.0)));
    }

    #[test]
    fn test_array_display_is_comma_joined() {
        let array = Value::Array(Rc::new(RefCell::new(vec![
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
        ])));
        assert_eq!(to_display_string(&array), "1,2,3");
    }

    #[test]
    fn test_add_concatenates_when_either_side_is_string() {
        let result = binary(BinaryOp::Add, &Value::str("a"), &Value::Number(1.0)).unwrap();
        assert!(matches!(result, Value::Str(s) if s.as_str() == "a1"));
        let result = binary(BinaryOp::Add, &Value::Number(1.0), &Value::Null).unwrap();
        assert!(matches!(result, Value::Number(n) if n == 1.0));
    }
}
