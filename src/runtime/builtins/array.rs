use std::cell::RefCell;
use std::rc::Rc;

use crate::interpreter::call_function;
use crate::runtime::context::Context;
use crate::runtime::operations::{strict_equals, to_display_string, to_number, truthy};
use crate::runtime::value::{throw_type_error, NativeFn, Thrown, Value};

pub(super) fn lookup(name: &str) -> Option<(&'static str, NativeFn)> {
    Some(match name {
        "push" => ("push", push),
        "pop" => ("pop", pop),
        "shift" => ("shift", shift),
        "unshift" => ("unshift", unshift),
        "slice" => ("slice", slice),
        "indexOf" => ("indexOf", index_of),
        "includes" => ("includes", includes),
        "join" => ("join", join),
        "concat" => ("concat", concat),
        "map" => ("map", map),
        "filter" => ("filter", filter),
        "forEach" => ("forEach", for_each),
        "reduce" => ("reduce", reduce),
        "find" => ("find", find),
        "some" => ("some", some),
        "every" => ("every", every),
        "toString" => ("toString", to_string),
        _ => return None,
    })
}

fn this_array(this: &Value) -> Result<Rc<RefCell<Vec<Value>>>, Thrown> {
    match this {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(throw_type_error("array method called on a non-array")),
    }
}

fn push(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    items.borrow_mut().extend(args.iter().cloned());
    let len = items.borrow().len();
    Ok(Value::Number(len as f64))
}

fn pop(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let popped = items.borrow_mut().pop();
    Ok(popped.unwrap_or(Value::Undefined))
}

fn shift(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let mut items = items.borrow_mut();
    if items.is_empty() {
        return Ok(Value::Undefined);
    }
    Ok(items.remove(0))
}

fn unshift(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let mut items = items.borrow_mut();
    for (offset, arg) in args.iter().enumerate() {
        items.insert(offset, arg.clone());
    }
    Ok(Value::Number(items.len() as f64))
}

fn resolve_index(raw: f64, len: usize) -> usize {
    if raw.is_nan() {
        return 0;
    }
    if raw < 0.0 {
        len.saturating_sub((-raw) as usize)
    } else {
        (raw as usize).min(len)
    }
}

fn slice(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let items = items.borrow();
    let len = items.len();
    let start = resolve_index(args.first().map(to_number).unwrap_or(0.0), len);
    let end = match args.get(1) {
        None | Some(Value::Undefined) => len,
        Some(value) => resolve_index(to_number(value), len),
    };
    let result = if start < end {
        items[start..end].to_vec()
    } else {
        vec![]
    };
    Ok(Value::Array(Rc::new(RefCell::new(result))))
}

fn index_of(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let needle = args.first().cloned().unwrap_or(Value::Undefined);
    let found = items
        .borrow()
        .iter()
        .position(|item| strict_equals(item, &needle));
    Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
}

fn includes(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let needle = args.first().cloned().unwrap_or(Value::Undefined);
    let found = items.borrow().iter().any(|item| strict_equals(item, &needle));
    Ok(Value::Bool(found))
}

fn join(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let separator = match args.first() {
        None | Some(Value::Undefined) => ",".to_string(),
        Some(value) => to_display_string(value),
    };
    let joined = items
        .borrow()
        .iter()
        .map(|item| match item {
            Value::Null | Value::Undefined => String::new(),
            other => to_display_string(other),
        })
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(Value::str(joined))
}

fn concat(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let mut result = items.borrow().clone();
    for arg in args {
        match arg {
            Value::Array(other) => result.extend(other.borrow().iter().cloned()),
            other => result.push(other.clone()),
        }
    }
    Ok(Value::Array(Rc::new(RefCell::new(result))))
}

fn map(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let callback = callback_arg(args)?;
    let snapshot = items.borrow().clone();
    let mut result = Vec::with_capacity(snapshot.len());
    for (index, item) in snapshot.into_iter().enumerate() {
        result.push(call_function(
            ctx,
            &callback,
            None,
            vec![item, Value::Number(index as f64), this.clone()],
        )?);
    }
    Ok(Value::Array(Rc::new(RefCell::new(result))))
}

fn filter(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let callback = callback_arg(args)?;
    let snapshot = items.borrow().clone();
    let mut result = vec![];
    for (index, item) in snapshot.into_iter().enumerate() {
        let keep = call_function(
            ctx,
            &callback,
            None,
            vec![item.clone(), Value::Number(index as f64), this.clone()],
        )?;
        if truthy(&keep) {
            result.push(item);
        }
    }
    Ok(Value::Array(Rc::new(RefCell::new(result))))
}

fn for_each(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let callback = callback_arg(args)?;
    let snapshot = items.borrow().clone();
    for (index, item) in snapshot.into_iter().enumerate() {
        call_function(
            ctx,
            &callback,
            None,
            vec![item, Value::Number(index as f64), this.clone()],
        )?;
    }
    Ok(Value::Undefined)
}

fn reduce(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let callback = callback_arg(args)?;
    let snapshot = items.borrow().clone();
    let mut iter = snapshot.into_iter().enumerate();

    let mut accumulator = match args.get(1) {
        Some(seed) => seed.clone(),
        None => match iter.next() {
            Some((_, first)) => first,
            None => {
                return Err(throw_type_error("Reduce of empty array with no initial value"))
            }
        },
    };
    for (index, item) in iter {
        accumulator = call_function(
            ctx,
            &callback,
            None,
            vec![accumulator, item, Value::Number(index as f64), this.clone()],
        )?;
    }
    Ok(accumulator)
}

fn find(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let callback = callback_arg(args)?;
    let snapshot = items.borrow().clone();
    for (index, item) in snapshot.into_iter().enumerate() {
        let hit = call_function(
            ctx,
            &callback,
            None,
            vec![item.clone(), Value::Number(index as f64), this.clone()],
        )?;
        if truthy(&hit) {
            return Ok(item);
        }
    }
    Ok(Value::Undefined)
}

fn some(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let callback = callback_arg(args)?;
    let snapshot = items.borrow().clone();
    for (index, item) in snapshot.into_iter().enumerate() {
        let hit = call_function(
            ctx,
            &callback,
            None,
            vec![item, Value::Number(index as f64), this.clone()],
        )?;
        if truthy(&hit) {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn every(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let items = this_array(&this)?;
    let callback = callback_arg(args)?;
    let snapshot = items.borrow().clone();
    for (index, item) in snapshot.into_iter().enumerate() {
        let hit = call_function(
            ctx,
            &callback,
            None,
            vec![item, Value::Number(index as f64), this.clone()],
        )?;
        if !truthy(&hit) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn to_string(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::str(to_display_string(&this)))
}

fn callback_arg(args: &[Value]) -> Result<Value, Thrown> {
    match args.first() {
        Some(callback) if callback.is_callable() => Ok(callback.clone()),
        _ => Err(throw_type_error("callback is not a function")),
    }
}
