use crate::runtime::context::Context;
use crate::runtime::operations::to_number;
use crate::runtime::value::{new_object, BuiltinMethod, Property, Thrown, Value};

pub(super) fn make_math() -> Value {
    let math = new_object();
    if let Value::Object(obj) = &math {
        let mut data = obj.borrow_mut();
        data.properties
            .insert("PI".into(), Property::plain(Value::Number(std::f64::consts::PI)));
        data.properties
            .insert("E".into(), Property::plain(Value::Number(std::f64::consts::E)));
        for (name, func) in [
            ("min", math_min as crate::runtime::value::NativeFn),
            ("max", math_max),
            ("abs", math_abs),
            ("floor", math_floor),
            ("ceil", math_ceil),
            ("round", math_round),
            ("trunc", math_trunc),
            ("sqrt", math_sqrt),
            ("pow", math_pow),
        ] {
            data.properties
                .insert(name.into(), Property::plain(BuiltinMethod::function(name, 0, func)));
        }
    }
    math
}

/// `Math.min()` with no arguments is `+Infinity`.
fn math_min(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let mut min = f64::INFINITY;
    for arg in args {
        let n = to_number(arg);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if n < min {
            min = n;
        }
    }
    Ok(Value::Number(min))
}

/// `Math.max()` with no arguments is `-Infinity`.
fn math_max(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let mut max = f64::NEG_INFINITY;
    for arg in args {
        let n = to_number(arg);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if n > max {
            max = n;
        }
    }
    Ok(Value::Number(max))
}

fn math_abs(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Number(arg(args).abs()))
}

fn math_floor(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Number(arg(args).floor()))
}

fn math_ceil(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Number(arg(args).ceil()))
}

fn math_round(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    // JS rounds half-way cases towards +Infinity
    let n = arg(args);
    Ok(Value::Number((n + 0.5).floor()))
}

fn math_trunc(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Number(arg(args).trunc()))
}

fn math_sqrt(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Number(arg(args).sqrt()))
}

fn math_pow(_ctx: &mut Context, _this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let base = args.first().map(to_number).unwrap_or(f64::NAN);
    let exponent = args.get(1).map(to_number).unwrap_or(f64::NAN);
    Ok(Value::Number(base.powf(exponent)))
}

fn arg(args: &[Value]) -> f64 {
    args.first().map(to_number).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::operations::strict_equals;

    fn call(func: crate::runtime::value::NativeFn, args: &[Value]) -> Value {
        let sink = std::rc::Rc::new(std::cell::RefCell::new(
            crate::runtime::context::BufferSink::default(),
        ));
        let mut ctx = Context::new(crate::runtime::context::ExecMode::Interpret, sink);
        func(&mut ctx, Value::Undefined, args).unwrap()
    }

    #[test]
    fn test_min_and_max_of_nothing() {
        assert!(strict_equals(
            &call(math_min, &[]),
            &Value::Number(f64::INFINITY)
        ));
        assert!(strict_equals(
            &call(math_max, &[]),
            &Value::Number(f64::NEG_INFINITY)
        ));
    }

    #[test]
    fn test_round_half_goes_up() {
        assert!(strict_equals(
            &call(math_round, &[Value::Number(2.5)]),
            &Value::Number(3.0)
        ));
        assert!(strict_equals(
            &call(math_round, &[Value::Number(-2.5)]),
            &Value::Number(-2.0)
        ));
    }
}
