use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::context::Context;
use crate::runtime::operations::strict_equals;
use crate::runtime::value::{
    new_object, throw_type_error, BuiltinMethod, MapData, NativeFn, Property, SetData, Thrown,
    Value,
};

pub(super) fn make_object_namespace() -> Value {
    let namespace = new_object();
    if let Value::Object(obj) = &namespace {
        let mut data = obj.borrow_mut();
        for (name, func) in [
            ("freeze", freeze as NativeFn),
            ("seal", seal),
            ("isFrozen", is_frozen),
            ("isSealed", is_sealed),
            ("keys", keys),
            ("values", values),
            ("entries", entries),
            ("assign", assign),
            ("getOwnPropertyNames", keys),
        ] {
            data.properties
                .insert(name.into(), Property::plain(BuiltinMethod::function(name, 1, func)));
        }
    }
    namespace
}

/// `Object.freeze` is idempotent; re-freezing is a no-op.
fn freeze(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let target = args.first().cloned().unwrap_or(Value::Undefined);
    if let Value::Object(obj) = &target {
        let mut data = obj.borrow_mut();
        data.frozen = true;
        data.sealed = true;
    }
    Ok(target)
}

fn seal(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let target = args.first().cloned().unwrap_or(Value::Undefined);
    if let Value::Object(obj) = &target {
        obj.borrow_mut().sealed = true;
    }
    Ok(target)
}

fn is_frozen(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    match args.first() {
        Some(Value::Object(obj)) => Ok(Value::Bool(obj.borrow().frozen)),
        // primitives are trivially frozen
        Some(_) | None => Ok(Value::Bool(true)),
    }
}

fn is_sealed(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    match args.first() {
        Some(Value::Object(obj)) => Ok(Value::Bool(obj.borrow().sealed)),
        Some(_) | None => Ok(Value::Bool(true)),
    }
}

fn keys(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let keys = crate::runtime::operations::enumerate_keys(
        args.first().unwrap_or(&Value::Undefined),
    );
    Ok(Value::Array(Rc::new(RefCell::new(
        keys.into_iter().map(Value::str).collect(),
    ))))
}

fn values(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let mut out = vec![];
    if let Some(Value::Object(obj)) = args.first() {
        for property in obj.borrow().properties.values() {
            if !property.is_accessor() {
                out.push(property.value.clone());
            }
        }
    }
    Ok(Value::Array(Rc::new(RefCell::new(out))))
}

fn entries(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let mut out = vec![];
    if let Some(Value::Object(obj)) = args.first() {
        for (key, property) in obj.borrow().properties.iter() {
            if !property.is_accessor() {
                out.push(Value::Array(Rc::new(RefCell::new(vec![
                    Value::str(key.clone()),
                    property.value.clone(),
                ]))));
            }
        }
    }
    Ok(Value::Array(Rc::new(RefCell::new(out))))
}

fn assign(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Some(target @ Value::Object(target_obj)) = args.first() else {
        return Err(throw_type_error("Object.assign target must be an object"));
    };
    for source in &args[1..] {
        if let Value::Object(source_obj) = source {
            let source_props: Vec<(String, Property)> = source_obj
                .borrow()
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut data = target_obj.borrow_mut();
            for (key, property) in source_props {
                if !property.is_accessor() {
                    data.properties.insert(key, Property::plain(property.value));
                }
            }
        }
    }
    Ok(target.clone())
}

// ---------------------------------------------------------------------------
// Map / Set
// ---------------------------------------------------------------------------

pub(super) fn map_set_entry(data: &mut MapData, key: Value, value: Value) {
    for entry in data.entries.iter_mut() {
        if strict_equals(&entry.0, &key) {
            entry.1 = value;
            return;
        }
    }
    data.entries.push((key, value));
}

pub(super) fn set_add_entry(data: &mut SetData, value: Value) {
    if !data.entries.iter().any(|entry| strict_equals(entry, &value)) {
        data.entries.push(value);
    }
}

pub(super) fn map_lookup(name: &str) -> Option<(&'static str, NativeFn)> {
    Some(match name {
        "get" => ("get", map_get),
        "set" => ("set", map_set),
        "has" => ("has", map_has),
        "delete" => ("delete", map_delete),
        "clear" => ("clear", map_clear),
        "keys" => ("keys", map_keys),
        "values" => ("values", map_values),
        "entries" => ("entries", map_entries),
        _ => return None,
    })
}

fn this_map(this: &Value) -> Result<Rc<RefCell<MapData>>, Thrown> {
    match this {
        Value::Map(map) => Ok(map.clone()),
        _ => Err(throw_type_error("Map method called on a non-Map")),
    }
}

fn map_get(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let map = this_map(&this)?;
    let key = args.first().cloned().unwrap_or(Value::Undefined);
    let found = map
        .borrow()
        .entries
        .iter()
        .find(|(k, _)| strict_equals(k, &key))
        .map(|(_, v)| v.clone());
    Ok(found.unwrap_or(Value::Undefined))
}

fn map_set(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let map = this_map(&this)?;
    let key = args.first().cloned().unwrap_or(Value::Undefined);
    let value = args.get(1).cloned().unwrap_or(Value::Undefined);
    map_set_entry(&mut map.borrow_mut(), key, value);
    Ok(this)
}

fn map_has(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let map = this_map(&this)?;
    let key = args.first().cloned().unwrap_or(Value::Undefined);
    let found = map.borrow().entries.iter().any(|(k, _)| strict_equals(k, &key));
    Ok(Value::Bool(found))
}

fn map_delete(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let map = this_map(&this)?;
    let key = args.first().cloned().unwrap_or(Value::Undefined);
    let mut data = map.borrow_mut();
    let before = data.entries.len();
    data.entries.retain(|(k, _)| !strict_equals(k, &key));
    Ok(Value::Bool(data.entries.len() != before))
}

fn map_clear(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    let map = this_map(&this)?;
    map.borrow_mut().entries.clear();
    Ok(Value::Undefined)
}

fn map_keys(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    let map = this_map(&this)?;
    let keys = map.borrow().entries.iter().map(|(k, _)| k.clone()).collect();
    Ok(Value::Array(Rc::new(RefCell::new(keys))))
}

fn map_values(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    let map = this_map(&this)?;
    let values = map.borrow().entries.iter().map(|(_, v)| v.clone()).collect();
    Ok(Value::Array(Rc::new(RefCell::new(values))))
}

fn map_entries(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    let map = this_map(&this)?;
    let entries = map
        .borrow()
        .entries
        .iter()
        .map(|(k, v)| Value::Array(Rc::new(RefCell::new(vec![k.clone(), v.clone()]))))
        .collect();
    Ok(Value::Array(Rc::new(RefCell::new(entries))))
}

pub(super) fn set_lookup(name: &str) -> Option<(&'static str, NativeFn)> {
    Some(match name {
        "add" => ("add", set_add),
        "has" => ("has", set_has),
        "delete" => ("delete", set_delete),
        "clear" => ("clear", set_clear),
        "values" => ("values", set_values),
        _ => return None,
    })
}

fn this_set(this: &Value) -> Result<Rc<RefCell<SetData>>, Thrown> {
    match this {
        Value::Set(set) => Ok(set.clone()),
        _ => Err(throw_type_error("Set method called on a non-Set")),
    }
}

fn set_add(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let set = this_set(&this)?;
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    set_add_entry(&mut set.borrow_mut(), value);
    Ok(this)
}

fn set_has(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let set = this_set(&this)?;
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    let found = set.borrow().entries.iter().any(|entry| strict_equals(entry, &value));
    Ok(Value::Bool(found))
}

fn set_delete(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let set = this_set(&this)?;
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    let mut data = set.borrow_mut();
    let before = data.entries.len();
    data.entries.retain(|entry| !strict_equals(entry, &value));
    Ok(Value::Bool(data.entries.len() != before))
}

fn set_clear(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    let set = this_set(&this)?;
    set.borrow_mut().entries.clear();
    Ok(Value::Undefined)
}

fn set_values(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    let set = this_set(&this)?;
    let values = set.borrow().entries.clone();
    Ok(Value::Array(Rc::new(RefCell::new(values))))
}

// ---------------------------------------------------------------------------
// WeakMap / WeakSet
// ---------------------------------------------------------------------------

fn require_weak_key(value: &Value) -> Result<(), Thrown> {
    match value {
        Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Class(_) => Ok(()),
        _ => Err(throw_type_error("Invalid value used as weak map key")),
    }
}

pub(super) fn weak_map_lookup(name: &str) -> Option<(&'static str, NativeFn)> {
    Some(match name {
        "get" => ("get", weak_map_get),
        "set" => ("set", weak_map_set),
        "has" => ("has", weak_map_has),
        "delete" => ("delete", weak_map_delete),
        _ => return None,
    })
}

fn weak_map_get(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Value::WeakMap(map) = &this else {
        return Err(throw_type_error("WeakMap method called on a non-WeakMap"));
    };
    let key = args.first().cloned().unwrap_or(Value::Undefined);
    let found = map
        .borrow()
        .entries
        .iter()
        .find(|(k, _)| strict_equals(k, &key))
        .map(|(_, v)| v.clone());
    Ok(found.unwrap_or(Value::Undefined))
}

fn weak_map_set(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Value::WeakMap(map) = &this else {
        return Err(throw_type_error("WeakMap method called on a non-WeakMap"));
    };
    let key = args.first().cloned().unwrap_or(Value::Undefined);
    require_weak_key(&key)?;
    let value = args.get(1).cloned().unwrap_or(Value::Undefined);
    let mut data = map.borrow_mut();
    for entry in data.entries.iter_mut() {
        if strict_equals(&entry.0, &key) {
            entry.1 = value;
            return Ok(this.clone());
        }
    }
    data.entries.push((key, value));
    drop(data);
    Ok(this)
}

fn weak_map_has(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Value::WeakMap(map) = &this else {
        return Err(throw_type_error("WeakMap method called on a non-WeakMap"));
    };
    let key = args.first().cloned().unwrap_or(Value::Undefined);
    let found = map.borrow().entries.iter().any(|(k, _)| strict_equals(k, &key));
    Ok(Value::Bool(found))
}

fn weak_map_delete(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Value::WeakMap(map) = &this else {
        return Err(throw_type_error("WeakMap method called on a non-WeakMap"));
    };
    let key = args.first().cloned().unwrap_or(Value::Undefined);
    let mut data = map.borrow_mut();
    let before = data.entries.len();
    data.entries.retain(|(k, _)| !strict_equals(k, &key));
    Ok(Value::Bool(data.entries.len() != before))
}

pub(super) fn weak_set_lookup(name: &str) -> Option<(&'static str, NativeFn)> {
    Some(match name {
        "add" => ("add", weak_set_add),
        "has" => ("has", weak_set_has),
        "delete" => ("delete", weak_set_delete),
        _ => return None,
    })
}

fn weak_set_add(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Value::WeakSet(set) = &this else {
        return Err(throw_type_error("WeakSet method called on a non-WeakSet"));
    };
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    require_weak_key(&value)?;
    let mut data = set.borrow_mut();
    if !data.entries.iter().any(|entry| strict_equals(entry, &value)) {
        data.entries.push(value);
    }
    drop(data);
    Ok(this)
}

fn weak_set_has(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Value::WeakSet(set) = &this else {
        return Err(throw_type_error("WeakSet method called on a non-WeakSet"));
    };
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    let found = set.borrow().entries.iter().any(|entry| strict_equals(entry, &value));
    Ok(Value::Bool(found))
}

fn weak_set_delete(_ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let Value::WeakSet(set) = &this else {
        return Err(throw_type_error("WeakSet method called on a non-WeakSet"));
    };
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    let mut data = set.borrow_mut();
    let before = data.entries.len();
    data.entries.retain(|entry| !strict_equals(entry, &value));
    Ok(Value::Bool(data.entries.len() != before))
}
