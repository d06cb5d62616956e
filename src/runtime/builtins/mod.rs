//! The global scope and the built-in method tables for primitive tags.
//!
//! Each table maps a method name to a host function; property resolution
//! binds the receiver into a [`BuiltinMethod`] value on lookup.

mod array;
mod math;
mod object;
mod string;

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::context::Context;
use crate::runtime::env::Environment;
use crate::runtime::operations::{to_display_string, to_number};
use crate::runtime::symbol::{new_symbol, well_known};
use crate::runtime::value::{
    new_error, new_object, throw_type_error, BuiltinMethod, ErrorKind, MapData, NativeCtor,
    NativeFn, Property, SetData, Thrown, Value, WeakMapData, WeakSetData,
};

/// Install the ambient globals into the global scope. Called once per
/// execution context, before any user code runs.
pub fn install_globals(global: &Environment) {
    global.define("undefined", Value::Undefined, false);
    global.define("NaN", Value::Number(f64::NAN), false);
    global.define("Infinity", Value::Number(f64::INFINITY), false);
    global.define("globalThis", Value::Undefined, true);

    global.define("console", make_console(), false);
    global.define("Math", math::make_math(), false);
    global.define("Object", object::make_object_namespace(), false);
    global.define("Buffer", make_buffer(), false);

    global.define("Symbol", make_ctor("Symbol", symbol_factory, None), false);
    global.define("Map", make_ctor("Map", map_ctor, Some(NativeCtor::Map)), false);
    global.define("Set", make_ctor("Set", set_ctor, Some(NativeCtor::Set)), false);
    global.define(
        "WeakMap",
        make_ctor("WeakMap", weak_map_ctor, Some(NativeCtor::WeakMap)),
        false,
    );
    global.define(
        "WeakSet",
        make_ctor("WeakSet", weak_set_ctor, Some(NativeCtor::WeakSet)),
        false,
    );

    global.define(
        "Error",
        make_ctor("Error", error_ctor, Some(NativeCtor::Error(ErrorKind::Error))),
        false,
    );
    global.define(
        "TypeError",
        make_ctor(
            "TypeError",
            type_error_ctor,
            Some(NativeCtor::Error(ErrorKind::TypeError)),
        ),
        false,
    );
    global.define(
        "RangeError",
        make_ctor(
            "RangeError",
            range_error_ctor,
            Some(NativeCtor::Error(ErrorKind::RangeError)),
        ),
        false,
    );
    global.define(
        "ReferenceError",
        make_ctor(
            "ReferenceError",
            reference_error_ctor,
            Some(NativeCtor::Error(ErrorKind::ReferenceError)),
        ),
        false,
    );
    global.define(
        "SyntaxError",
        make_ctor(
            "SyntaxError",
            syntax_error_ctor,
            Some(NativeCtor::Error(ErrorKind::SyntaxError)),
        ),
        false,
    );
    global.define(
        "URIError",
        make_ctor(
            "URIError",
            uri_error_ctor,
            Some(NativeCtor::Error(ErrorKind::UriError)),
        ),
        false,
    );
    global.define(
        "EvalError",
        make_ctor(
            "EvalError",
            eval_error_ctor,
            Some(NativeCtor::Error(ErrorKind::EvalError)),
        ),
        false,
    );
    global.define(
        "AggregateError",
        make_ctor(
            "AggregateError",
            aggregate_error_ctor,
            Some(NativeCtor::Error(ErrorKind::AggregateError)),
        ),
        false,
    );

    global.define("Number", make_number_namespace(), false);
}

fn make_ctor(name: &'static str, func: NativeFn, ctor: Option<NativeCtor>) -> Value {
    Value::Builtin(Rc::new(BuiltinMethod {
        name,
        min_arity: 0,
        max_arity: None,
        this: Value::Undefined,
        func,
        ctor,
    }))
}

// ---------------------------------------------------------------------------
// method table dispatchers
// ---------------------------------------------------------------------------

fn bind(entry: Option<(&'static str, NativeFn)>, target: &Value) -> Value {
    match entry {
        Some((name, func)) => BuiltinMethod::bound(name, target.clone(), func),
        None => Value::Undefined,
    }
}

pub fn string_method(name: &str, target: &Value) -> Value {
    bind(string::lookup(name), target)
}

pub fn array_method(name: &str, target: &Value) -> Value {
    bind(array::lookup(name), target)
}

pub fn number_method(name: &str, target: &Value) -> Value {
    bind(
        match name {
            "toFixed" => Some(("toFixed", number_to_fixed as NativeFn)),
            "toString" => Some(("toString", number_to_string as NativeFn)),
            _ => None,
        },
        target,
    )
}

pub fn object_method(name: &str, target: &Value) -> Value {
    bind(
        match name {
            "hasOwnProperty" => Some(("hasOwnProperty", object_has_own as NativeFn)),
            "toString" => Some(("toString", any_to_string as NativeFn)),
            _ => None,
        },
        target,
    )
}

pub fn error_method(name: &str, target: &Value) -> Value {
    bind(
        match name {
            "toString" => Some(("toString", error_to_string as NativeFn)),
            _ => None,
        },
        target,
    )
}

pub fn symbol_method(name: &str, target: &Value) -> Value {
    bind(
        match name {
            "toString" => Some(("toString", any_to_string as NativeFn)),
            _ => None,
        },
        target,
    )
}

pub fn map_method(name: &str, target: &Value) -> Value {
    bind(object::map_lookup(name), target)
}

pub fn set_method(name: &str, target: &Value) -> Value {
    bind(object::set_lookup(name), target)
}

pub fn weak_map_method(name: &str, target: &Value) -> Value {
    bind(object::weak_map_lookup(name), target)
}

pub fn weak_set_method(name: &str, target: &Value) -> Value {
    bind(object::weak_set_lookup(name), target)
}

pub fn regex_method(name: &str, target: &Value) -> Value {
    bind(
        match name {
            "test" => Some(("test", regex_test as NativeFn)),
            "toString" => Some(("toString", any_to_string as NativeFn)),
            _ => None,
        },
        target,
    )
}

/// Static properties of the callable built-ins (`Symbol.iterator`, …).
pub fn builtin_static(ctor_name: &str, property: &str) -> Value {
    match (ctor_name, property) {
        ("Symbol", "iterator") => Value::Symbol(well_known().iterator),
        ("Symbol", "asyncIterator") => Value::Symbol(well_known().async_iterator),
        ("Symbol", "toStringTag") => Value::Symbol(well_known().to_string_tag),
        ("Symbol", "hasInstance") => Value::Symbol(well_known().has_instance),
        ("Symbol", "toPrimitive") => Value::Symbol(well_known().to_primitive),
        _ => Value::Undefined,
    }
}

// ---------------------------------------------------------------------------
// console & misc globals
// ---------------------------------------------------------------------------

fn make_console() -> Value {
    let console = new_object();
    if let Value::Object(obj) = &console {
        let mut data = obj.borrow_mut();
        data.properties.insert(
            "log".into(),
            Property::plain(BuiltinMethod::function("log", 0, console_log)),
        );
        data.properties.insert(
            "error".into(),
            Property::plain(BuiltinMethod::function("error", 0, console_log)),
        );
        data.properties.insert(
            "warn".into(),
            Property::plain(BuiltinMethod::function("warn", 0, console_log)),
        );
    }
    console
}

/// `console.log(x)` writes the string conversion of each argument, joined
/// by spaces, followed by a newline.
fn console_log(ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let line = args
        .iter()
        .map(to_display_string)
        .collect::<Vec<_>>()
        .join(" ");
    ctx.write_line(&line);
    Ok(Value::Undefined)
}

fn make_buffer() -> Value {
    let buffer = new_object();
    if let Value::Object(obj) = &buffer {
        let mut data = obj.borrow_mut();
        data.properties.insert(
            "from".into(),
            Property::plain(BuiltinMethod::function("from", 1, buffer_from)),
        );
        data.properties.insert(
            "byteLength".into(),
            Property::plain(BuiltinMethod::function("byteLength", 1, buffer_byte_length)),
        );
    }
    buffer
}

fn buffer_from(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let text = args.first().map(to_display_string).unwrap_or_default();
    let bytes = text
        .bytes()
        .map(|b| Value::Number(b as f64))
        .collect::<Vec<_>>();
    Ok(Value::Array(Rc::new(RefCell::new(bytes))))
}

fn buffer_byte_length(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let text = args.first().map(to_display_string).unwrap_or_default();
    Ok(Value::Number(text.len() as f64))
}

fn make_number_namespace() -> Value {
    let number = new_object();
    if let Value::Object(obj) = &number {
        let mut data = obj.borrow_mut();
        data.properties.insert(
            "isInteger".into(),
            Property::plain(BuiltinMethod::function("isInteger", 1, number_is_integer)),
        );
        data.properties.insert(
            "isNaN".into(),
            Property::plain(BuiltinMethod::function("isNaN", 1, number_is_nan)),
        );
        data.properties
            .insert("NaN".into(), Property::plain(Value::Number(f64::NAN)));
    }
    number
}

fn number_is_integer(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Bool(matches!(
        args.first(),
        Some(Value::Number(n)) if n.fract() == 0.0 && n.is_finite()
    )))
}

fn number_is_nan(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Bool(matches!(
        args.first(),
        Some(Value::Number(n)) if n.is_nan()
    )))
}

// ---------------------------------------------------------------------------
// constructors
// ---------------------------------------------------------------------------

fn symbol_factory(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let description = match args.first() {
        None | Some(Value::Undefined) => None,
        Some(value) => Some(to_display_string(value)),
    };
    Ok(Value::Symbol(new_symbol(description)))
}

fn map_ctor(ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let mut data = MapData::default();
    if let Some(iterable) = args.first() {
        if !matches!(iterable, Value::Undefined | Value::Null) {
            for entry in crate::runtime::operations::iterate_to_vec(ctx, iterable)? {
                let Value::Array(pair) = &entry else {
                    return Err(throw_type_error("iterator value is not an entry object"));
                };
                let pair = pair.borrow();
                let key = pair.first().cloned().unwrap_or(Value::Undefined);
                let value = pair.get(1).cloned().unwrap_or(Value::Undefined);
                object::map_set_entry(&mut data, key, value);
            }
        }
    }
    Ok(Value::Map(Rc::new(RefCell::new(data))))
}

fn set_ctor(ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let mut data = SetData::default();
    if let Some(iterable) = args.first() {
        if !matches!(iterable, Value::Undefined | Value::Null) {
            for entry in crate::runtime::operations::iterate_to_vec(ctx, iterable)? {
                object::set_add_entry(&mut data, entry);
            }
        }
    }
    Ok(Value::Set(Rc::new(RefCell::new(data))))
}

fn weak_map_ctor(_ctx: &mut Context, _this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::WeakMap(Rc::new(RefCell::new(WeakMapData::default()))))
}

fn weak_set_ctor(_ctx: &mut Context, _this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::WeakSet(Rc::new(RefCell::new(WeakSetData::default()))))
}

fn error_message(args: &[Value]) -> String {
    match args.first() {
        None | Some(Value::Undefined) => String::new(),
        Some(value) => to_display_string(value),
    }
}

macro_rules! error_ctor_fn {
    ($name:ident, $kind:expr) => {
        fn $name(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
            Ok(new_error($kind, error_message(args)))
        }
    };
}

error_ctor_fn!(error_ctor, ErrorKind::Error);
error_ctor_fn!(type_error_ctor, ErrorKind::TypeError);
error_ctor_fn!(range_error_ctor, ErrorKind::RangeError);
error_ctor_fn!(reference_error_ctor, ErrorKind::ReferenceError);
error_ctor_fn!(syntax_error_ctor, ErrorKind::SyntaxError);
error_ctor_fn!(uri_error_ctor, ErrorKind::UriError);
error_ctor_fn!(eval_error_ctor, ErrorKind::EvalError);

fn aggregate_error_ctor(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let message = match args.get(1) {
        None | Some(Value::Undefined) => String::new(),
        Some(value) => to_display_string(value),
    };
    let error = new_error(ErrorKind::AggregateError, message);
    if let (Value::Error(data), Some(errors)) = (&error, args.first()) {
        data.borrow_mut().extra.insert("errors".into(), errors.clone());
    }
    Ok(error)
}

// ---------------------------------------------------------------------------
// shared small natives
// ---------------------------------------------------------------------------

fn number_to_fixed(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Value::Number(n) = this else {
        return Err(throw_type_error("toFixed called on a non-number"));
    };
    let digits = args.first().map(to_number).unwrap_or(0.0) as usize;
    Ok(Value::str(format!("{n:.digits$}")))
}

fn number_to_string(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::str(to_display_string(&this)))
}

fn any_to_string(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::str(to_display_string(&this)))
}

fn error_to_string(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    match this {
        Value::Error(err) => Ok(Value::str(err.borrow().to_display())),
        other => Ok(Value::str(to_display_string(&other))),
    }
}

fn object_has_own(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let name = args.first().map(to_display_string).unwrap_or_default();
    match this {
        Value::Object(obj) => Ok(Value::Bool(obj.borrow().properties.contains_key(&name))),
        _ => Ok(Value::Bool(false)),
    }
}

fn regex_test(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Value::Regex(regex) = &this else {
        return Err(throw_type_error("test called on a non-regex"));
    };
    let input = args.first().map(to_display_string).unwrap_or_default();
    // substring match is enough for the literal patterns the engine accepts
    Ok(Value::Bool(input.contains(regex.pattern.as_str())))
}
