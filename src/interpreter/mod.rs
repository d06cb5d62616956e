//! Tree-walking evaluator. Expressions evaluate against an environment
//! chain; statements may install bindings, transfer control or mutate the
//! environment. Generator and async function bodies are delegated to the
//! shared suspension machinery in the compiled back-end so that both modes
//! use one model for paused frames.

use std::cell::RefCell;
use std::rc::Rc;

use crate::parser::ast::*;
use crate::runtime::context::{Context, ExecMode};
use crate::runtime::env::{AssignOutcome, Environment};
use crate::runtime::operations::{
    self, get_property, in_operator, instanceof, iter_next, iterate_to_vec, set_property,
    strict_equals, to_display_string, to_number, to_property_key, truthy, IterStep, PropertyKey,
};
use crate::runtime::value::{
    new_object, throw_reference_error, throw_type_error, ClassValue, FunctionValue, ObjectData,
    Property, Thrown, Value,
};

/// Control transfer raised by statement execution.
#[derive(Debug)]
pub enum Signal {
    Break,
    Continue,
    Return(Value),
    Throw(Value),
}

impl From<Thrown> for Signal {
    fn from(thrown: Thrown) -> Self {
        Signal::Throw(thrown.0)
    }
}

pub type Exec = Result<(), Signal>;
pub type Eval = Result<Value, Signal>;

pub(crate) fn signal_to_thrown(signal: Signal) -> Thrown {
    match signal {
        Signal::Throw(value) => Thrown(value),
        other => Thrown(operations::type_error_value(format!(
            "illegal control flow escaped a function body: {other:?}"
        ))),
    }
}

fn to_thrown(signal: Signal) -> Thrown {
    signal_to_thrown(signal)
}

/// Execute a whole program body against `env`.
pub fn run_program(ctx: &mut Context, program: &Program, env: &Environment) -> Result<(), Thrown> {
    exec_statements_hoisted(ctx, env, &program.body).map_err(to_thrown)
}

// ---------------------------------------------------------------------------
// calls
// ---------------------------------------------------------------------------

/// The single call path used by the interpreter, the VM and every builtin
/// that invokes user callbacks.
pub fn call_function(
    ctx: &mut Context,
    callee: &Value,
    this: Option<Value>,
    args: Vec<Value>,
) -> Result<Value, Thrown> {
    match callee {
        Value::Builtin(builtin) => {
            let receiver = this.unwrap_or_else(|| builtin.this.clone());
            (builtin.func)(ctx, receiver, &args)
        }
        Value::Function(func) => {
            if func.func.is_generator {
                return crate::compiler::vm::make_generator(ctx, func, this, args);
            }
            if func.func.is_async {
                return crate::compiler::vm::start_async(ctx, func, this, args);
            }
            match ctx.mode {
                ExecMode::Interpret => call_interpreted(ctx, func, this, args),
                ExecMode::Compile => crate::compiler::vm::call_compiled(ctx, func, this, args),
            }
        }
        Value::Class(class) => Err(throw_type_error(format!(
            "Class constructor {} cannot be invoked without 'new'",
            class.name
        ))),
        other => Err(throw_type_error(format!(
            "{} is not a function",
            to_display_string(other)
        ))),
    }
}

fn call_interpreted(
    ctx: &mut Context,
    func: &Rc<FunctionValue>,
    this: Option<Value>,
    args: Vec<Value>,
) -> Result<Value, Thrown> {
    let env = prepare_call_env(func, this);
    bind_params(ctx, &env, &func.func.params, &args).map_err(to_thrown)?;

    match &func.func.body {
        FunctionBody::Block(stmts) => match exec_statements_hoisted(ctx, &env, stmts) {
            Ok(()) => Ok(Value::Undefined),
            Err(Signal::Return(value)) => Ok(value),
            Err(other) => Err(to_thrown(other)),
        },
        FunctionBody::Expr(expr) => eval_expression(ctx, &env, expr).map_err(to_thrown),
    }
}

/// Build the activation scope for a call: strictness, `this`, the home
/// class for `super`, and the own-name binding of named function
/// expressions (held by name lookup, not by strong capture).
pub fn prepare_call_env(func: &Rc<FunctionValue>, this: Option<Value>) -> Environment {
    let env = func.env.child(func.func.strict);
    if !func.func.is_arrow {
        env.set_this(this.unwrap_or(Value::Undefined));
    }
    if let Some(home) = func.home_class() {
        env.set_home_class(home);
    }
    if !func.func.is_arrow {
        if let Some(name) = &func.func.name {
            if !name.is_empty() {
                env.define(name, Value::Function(func.clone()), false);
            }
        }
    }
    env
}

/// Bind call arguments to parameters: positional, defaults, rest.
pub fn bind_params(
    ctx: &mut Context,
    env: &Environment,
    params: &[Param],
    args: &[Value],
) -> Exec {
    for (index, param) in params.iter().enumerate() {
        let value = if param.rest {
            let rest: Vec<Value> = args.get(index..).unwrap_or(&[]).to_vec();
            Value::Array(Rc::new(RefCell::new(rest)))
        } else {
            let mut value = args.get(index).cloned().unwrap_or(Value::Undefined);
            if matches!(value, Value::Undefined) {
                if let Some(default) = &param.default {
                    value = eval_expression(ctx, env, default)?;
                }
            }
            value
        };
        bind_pattern(ctx, env, &param.pattern, value, true)?;
    }
    Ok(())
}

/// Destructure `value` into `pattern`, installing bindings in `env`.
pub fn bind_pattern(
    ctx: &mut Context,
    env: &Environment,
    pattern: &Pattern,
    value: Value,
    mutable: bool,
) -> Exec {
    match pattern {
        Pattern::Ident { name, .. } => {
            // an anonymous function or class adopts the binding name
            if let Value::Function(func) = &value {
                if func.name.borrow().is_empty() {
                    *func.name.borrow_mut() = name.clone();
                }
            }
            env.define(name, value, mutable);
            Ok(())
        }
        Pattern::Array { elements, .. } => {
            let items: Vec<Value> = match &value {
                Value::Array(items) => items.borrow().clone(),
                other => iterate_to_vec(ctx, other)?,
            };
            let mut index = 0usize;
            for element in elements {
                let Some(element) = element else {
                    // a hole skips its positional slot
                    index += 1;
                    continue;
                };
                if element.rest {
                    let rest: Vec<Value> = items.get(index..).unwrap_or(&[]).to_vec();
                    bind_pattern(
                        ctx,
                        env,
                        &element.pattern,
                        Value::Array(Rc::new(RefCell::new(rest))),
                        mutable,
                    )?;
                    break;
                }
                let mut item = items.get(index).cloned().unwrap_or(Value::Undefined);
                if matches!(item, Value::Undefined) {
                    if let Some(default) = &element.default {
                        item = eval_expression(ctx, env, default)?;
                    }
                }
                bind_pattern(ctx, env, &element.pattern, item, mutable)?;
                index += 1;
            }
            Ok(())
        }
        Pattern::Object { props, rest, .. } => {
            let mut used = vec![];
            for prop in props {
                let key = PropertyKey::Str(prop.key.clone());
                let mut item = get_property(ctx, &value, &key)?;
                if matches!(item, Value::Undefined) {
                    if let Some(default) = &prop.default {
                        item = eval_expression(ctx, env, default)?;
                    }
                }
                used.push(prop.key.clone());
                bind_pattern(ctx, env, &prop.value, item, mutable)?;
            }
            if let Some(rest_name) = rest {
                let rest_obj = new_object();
                if let (Value::Object(source), Value::Object(target)) = (&value, &rest_obj) {
                    let remaining: Vec<(String, Value)> = source
                        .borrow()
                        .properties
                        .iter()
                        .filter(|(key, prop)| !used.contains(key) && !prop.is_accessor())
                        .map(|(key, prop)| (key.clone(), prop.value.clone()))
                        .collect();
                    let mut target = target.borrow_mut();
                    for (key, item) in remaining {
                        target.properties.insert(key, Property::plain(item));
                    }
                }
                env.define(rest_name, rest_obj, mutable);
            }
            Ok(())
        }
    }
}

/// `new` expressions and everything the host constructs on their behalf.
pub fn construct(ctx: &mut Context, callee: &Value, args: Vec<Value>) -> Result<Value, Thrown> {
    match callee {
        Value::Class(class) => {
            if class.is_abstract {
                return Err(throw_type_error(format!(
                    "Cannot instantiate abstract class '{}'",
                    class.name
                )));
            }
            let instance = Value::Object(Rc::new(RefCell::new(ObjectData {
                class: Some(class.clone()),
                ..ObjectData::default()
            })));
            init_instance_fields(ctx, class, &instance)?;
            if let Some(ctor) = class.find_method("constructor") {
                call_function(ctx, &Value::Function(ctor), Some(instance.clone()), args)?;
            }
            Ok(instance)
        }
        Value::Builtin(builtin) => {
            let receiver = builtin.this.clone();
            (builtin.func)(ctx, receiver, &args)
        }
        other => Err(throw_type_error(format!(
            "{} is not a constructor",
            to_display_string(other)
        ))),
    }
}

/// Initialize instance fields, base classes first.
fn init_instance_fields(
    ctx: &mut Context,
    class: &Rc<ClassValue>,
    instance: &Value,
) -> Result<(), Thrown> {
    if let Some(parent) = &class.parent {
        init_instance_fields(ctx, parent, instance)?;
    }
    for member in &class.decl.members {
        if member.is_static {
            continue;
        }
        if let ClassMemberKind::Field { init, .. } = &member.kind {
            let env = class.env.child(false);
            env.set_this(instance.clone());
            env.set_home_class(class.clone());
            let value = match init {
                Some(init) => eval_expression(ctx, &env, init).map_err(to_thrown)?,
                None => Value::Undefined,
            };
            if let Value::Object(obj) = instance {
                obj.borrow_mut()
                    .properties
                    .insert(member.name.clone(), Property::plain(value));
            }
        }
    }
    Ok(())
}

/// Evaluate a class declaration or expression into a class value.
pub fn build_class(
    ctx: &mut Context,
    env: &Environment,
    decl: &Rc<ClassDecl>,
) -> Result<Value, Thrown> {
    let parent = match &decl.superclass {
        Some(expr) => match eval_expression(ctx, env, expr).map_err(to_thrown)? {
            Value::Class(parent) => Some(parent),
            other => {
                return Err(throw_type_error(format!(
                    "Class extends value {} is not a constructor",
                    to_display_string(&other)
                )))
            }
        },
        None => None,
    };

    let class = Rc::new(ClassValue {
        name: decl.name.clone().unwrap_or_default(),
        decl: decl.clone(),
        parent,
        methods: RefCell::new(indexmap::IndexMap::new()),
        getters: RefCell::new(indexmap::IndexMap::new()),
        setters: RefCell::new(indexmap::IndexMap::new()),
        statics: RefCell::new(indexmap::IndexMap::new()),
        is_abstract: decl.is_abstract,
        env: env.clone(),
    });

    // methods first, so static blocks and field initializers can call them
    for member in &decl.members {
        let (func, table) = match &member.kind {
            ClassMemberKind::Method(func) => (func, 0),
            ClassMemberKind::Getter(func) => (func, 1),
            ClassMemberKind::Setter(func) => (func, 2),
            _ => continue,
        };
        let method = Rc::new(FunctionValue::new(Rc::new(func.clone()), env.clone()));
        *method.home_class.borrow_mut() = Some(Rc::downgrade(&class));
        if member.is_static {
            class
                .statics
                .borrow_mut()
                .insert(member.name.clone(), Value::Function(method));
            continue;
        }
        let map = match table {
            0 => &class.methods,
            1 => &class.getters,
            _ => &class.setters,
        };
        map.borrow_mut().insert(member.name.clone(), method);
    }

    // static fields and static blocks run in declaration order, with the
    // class's own name already visible
    let class_value = Value::Class(class.clone());
    let body_env = env.child(false);
    if let Some(name) = &decl.name {
        body_env.define(name, class_value.clone(), false);
    }
    for member in &decl.members {
        match &member.kind {
            ClassMemberKind::Field { init, .. } if member.is_static => {
                let field_env = body_env.child(false);
                field_env.set_this(class_value.clone());
                field_env.set_home_class(class.clone());
                let value = match init {
                    Some(init) => eval_expression(ctx, &field_env, init).map_err(to_thrown)?,
                    None => Value::Undefined,
                };
                class.statics.borrow_mut().insert(member.name.clone(), value);
            }
            ClassMemberKind::StaticBlock(body) => {
                let block_env = body_env.child(false);
                block_env.set_this(class_value.clone());
                block_env.set_home_class(class.clone());
                exec_statements(ctx, &block_env, body).map_err(to_thrown)?;
            }
            _ => {}
        }
    }

    Ok(class_value)
}

// ---------------------------------------------------------------------------
// statements
// ---------------------------------------------------------------------------

/// Execute statements with function declarations hoisted to the top of the
/// scope, so mutually recursive functions resolve.
pub fn exec_statements_hoisted(
    ctx: &mut Context,
    env: &Environment,
    stmts: &[Statement],
) -> Exec {
    for stmt in stmts {
        let decl = match &stmt.kind {
            StmtKind::FunctionDecl(func) => Some(func),
            StmtKind::Export(inner) => match &inner.kind {
                StmtKind::FunctionDecl(func) => Some(func),
                _ => None,
            },
            _ => None,
        };
        if let Some(func) = decl {
            if !func.is_signature {
                declare_function(env, func);
            }
        }
    }
    for stmt in stmts {
        exec_statement(ctx, env, stmt)?;
    }
    Ok(())
}

pub fn exec_statements(ctx: &mut Context, env: &Environment, stmts: &[Statement]) -> Exec {
    for stmt in stmts {
        exec_statement(ctx, env, stmt)?;
    }
    Ok(())
}

fn declare_function(env: &Environment, func: &FunctionLit) {
    let value = Rc::new(FunctionValue::new(Rc::new(func.clone()), env.clone()));
    let name = func.name.clone().unwrap_or_default();
    env.define(&name, Value::Function(value), true);
}

pub fn exec_statement(ctx: &mut Context, env: &Environment, stmt: &Statement) -> Exec {
    match &stmt.kind {
        StmtKind::VarDecl { kind, declarations } => {
            for declarator in declarations {
                let value = match &declarator.init {
                    Some(init) => eval_expression(ctx, env, init)?,
                    None => Value::Undefined,
                };
                bind_pattern(
                    ctx,
                    env,
                    &declarator.pattern,
                    value,
                    *kind != DeclKind::Const,
                )?;
            }
            Ok(())
        }
        StmtKind::FunctionDecl(_) => Ok(()), // hoisted
        StmtKind::ClassDecl(decl) => {
            let class = build_class(ctx, env, &Rc::new((**decl).clone()))?;
            env.define(decl.name.as_deref().unwrap_or_default(), class, false);
            Ok(())
        }
        StmtKind::InterfaceDecl(_) | StmtKind::TypeAlias { .. } => Ok(()),
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => {
            let cond = eval_expression(ctx, env, cond)?;
            if truthy(&cond) {
                exec_statement(ctx, env, then)
            } else if let Some(otherwise) = otherwise {
                exec_statement(ctx, env, otherwise)
            } else {
                Ok(())
            }
        }
        StmtKind::While { cond, body } => {
            loop {
                let test = eval_expression(ctx, env, cond)?;
                if !truthy(&test) {
                    break;
                }
                match exec_statement(ctx, env, body) {
                    Ok(()) | Err(Signal::Continue) => {}
                    Err(Signal::Break) => break,
                    Err(other) => return Err(other),
                }
            }
            Ok(())
        }
        StmtKind::For {
            init,
            test,
            update,
            body,
        } => {
            let loop_env = env.child(false);
            if let Some(init) = init {
                exec_statement(ctx, &loop_env, init)?;
            }
            loop {
                if let Some(test) = test {
                    let keep = eval_expression(ctx, &loop_env, test)?;
                    if !truthy(&keep) {
                        break;
                    }
                }
                match exec_statement(ctx, &loop_env, body) {
                    Ok(()) | Err(Signal::Continue) => {}
                    Err(Signal::Break) => break,
                    Err(other) => return Err(other),
                }
                if let Some(update) = update {
                    eval_expression(ctx, &loop_env, update)?;
                }
            }
            Ok(())
        }
        StmtKind::ForOf {
            pattern, iterable, body, ..
        } => {
            let iterable = eval_expression(ctx, env, iterable)?;
            let iterator = operations::get_iterator(ctx, &iterable)?;
            loop {
                let step = iter_next(ctx, &iterator)?;
                let IterStep::Value(item) = step else {
                    break;
                };
                let iteration_env = env.child(false);
                bind_pattern(ctx, &iteration_env, pattern, item, true)?;
                match exec_statement(ctx, &iteration_env, body) {
                    Ok(()) | Err(Signal::Continue) => {}
                    Err(Signal::Break) => break,
                    Err(other) => return Err(other),
                }
            }
            Ok(())
        }
        StmtKind::ForIn {
            name, object, body, ..
        } => {
            let object = eval_expression(ctx, env, object)?;
            for key in operations::enumerate_keys(&object) {
                let iteration_env = env.child(false);
                iteration_env.define(name, Value::str(key), true);
                match exec_statement(ctx, &iteration_env, body) {
                    Ok(()) | Err(Signal::Continue) => {}
                    Err(Signal::Break) => break,
                    Err(other) => return Err(other),
                }
            }
            Ok(())
        }
        StmtKind::Return(argument) => {
            let value = match argument {
                Some(argument) => eval_expression(ctx, env, argument)?,
                None => Value::Undefined,
            };
            Err(Signal::Return(value))
        }
        StmtKind::Throw(argument) => {
            let value = eval_expression(ctx, env, argument)?;
            Err(Signal::Throw(value))
        }
        StmtKind::Try {
            block,
            catch,
            finally,
        } => {
            let block_env = env.child(false);
            let mut result = exec_statements(ctx, &block_env, block);

            if let (Err(Signal::Throw(error)), Some(catch)) = (&result, catch) {
                let catch_env = env.child(false);
                let error = error.clone();
                let outcome = match &catch.param {
                    Some(param) => bind_pattern(ctx, &catch_env, param, error, true),
                    None => Ok(()),
                };
                result = outcome.and_then(|()| exec_statements(ctx, &catch_env, &catch.body));
            }

            if let Some(finally) = finally {
                let finally_env = env.child(false);
                // an abrupt completion in finally wins over the try result
                exec_statements(ctx, &finally_env, finally)?;
            }
            result
        }
        StmtKind::Break => Err(Signal::Break),
        StmtKind::Continue => Err(Signal::Continue),
        StmtKind::Switch {
            discriminant,
            cases,
        } => {
            let discriminant = eval_expression(ctx, env, discriminant)?;
            let mut start = None;
            for (index, case) in cases.iter().enumerate() {
                if let Some(test) = &case.test {
                    let test = eval_expression(ctx, env, test)?;
                    if strict_equals(&discriminant, &test) {
                        start = Some(index);
                        break;
                    }
                }
            }
            if start.is_none() {
                start = cases.iter().position(|case| case.test.is_none());
            }
            let Some(start) = start else {
                return Ok(());
            };
            let switch_env = env.child(false);
            for case in &cases[start..] {
                match exec_statements(ctx, &switch_env, &case.body) {
                    Ok(()) => {}
                    Err(Signal::Break) => return Ok(()),
                    Err(other) => return Err(other),
                }
            }
            Ok(())
        }
        StmtKind::Block(stmts) => {
            let block_env = env.child(false);
            exec_statements_hoisted(ctx, &block_env, stmts)
        }
        StmtKind::Expression(expr) => {
            eval_expression(ctx, env, expr)?;
            Ok(())
        }
        StmtKind::Import { .. } => Ok(()), // bindings are installed by the loader
        StmtKind::Export(inner) => match &inner.kind {
            StmtKind::FunctionDecl(_) => Ok(()), // hoisted
            _ => exec_statement(ctx, env, inner),
        },
        StmtKind::Empty => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// expressions
// ---------------------------------------------------------------------------

pub fn eval_expression(ctx: &mut Context, env: &Environment, expr: &Expression) -> Eval {
    match &expr.kind {
        ExprKind::Number(n) => Ok(Value::Number(*n)),
        ExprKind::Str(s) => Ok(Value::str(s.clone())),
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::Null => Ok(Value::Null),
        ExprKind::Undefined => Ok(Value::Undefined),
        ExprKind::Regex { pattern, flags } => Ok(Value::Regex(Rc::new(
            crate::runtime::value::RegexValue {
                pattern: pattern.clone(),
                flags: flags.clone(),
            },
        ))),
        ExprKind::Template { quasis, exprs } => {
            let mut out = String::new();
            for (index, quasi) in quasis.iter().enumerate() {
                out.push_str(quasi);
                if let Some(expr) = exprs.get(index) {
                    let value = eval_expression(ctx, env, expr)?;
                    out.push_str(&to_display_string(&value));
                }
            }
            Ok(Value::str(out))
        }
        ExprKind::Ident(name) => match env.get(name) {
            Some(value) => Ok(value),
            None => Err(throw_reference_error(format!("{name} is not defined")).into()),
        },
        ExprKind::This => Ok(env.lookup_this().unwrap_or(Value::Undefined)),
        ExprKind::Super => Err(throw_type_error("'super' is only valid inside class members").into()),
        ExprKind::Grouping(inner) => eval_expression(ctx, env, inner),
        ExprKind::Unary { op, operand } => eval_unary(ctx, env, *op, operand),
        ExprKind::Update {
            prefix,
            increment,
            target,
        } => eval_update(ctx, env, *prefix, *increment, target),
        ExprKind::Binary { op, lhs, rhs } => {
            let lhs_value = eval_expression(ctx, env, lhs)?;
            let rhs_value = eval_expression(ctx, env, rhs)?;
            match op {
                BinaryOp::Instanceof => {
                    Ok(Value::Bool(instanceof(ctx, &lhs_value, &rhs_value)?))
                }
                BinaryOp::In => Ok(Value::Bool(in_operator(&lhs_value, &rhs_value)?)),
                other => Ok(operations::binary(*other, &lhs_value, &rhs_value)?),
            }
        }
        ExprKind::Logical { op, lhs, rhs } => {
            let lhs_value = eval_expression(ctx, env, lhs)?;
            let take_rhs = match op {
                LogicalOp::And => truthy(&lhs_value),
                LogicalOp::Or => !truthy(&lhs_value),
                LogicalOp::Nullish => matches!(lhs_value, Value::Null | Value::Undefined),
            };
            if take_rhs {
                eval_expression(ctx, env, rhs)
            } else {
                Ok(lhs_value)
            }
        }
        ExprKind::Assign { op, target, value } => eval_assign(ctx, env, *op, target, value),
        ExprKind::Conditional {
            cond,
            then,
            otherwise,
        } => {
            let cond = eval_expression(ctx, env, cond)?;
            if truthy(&cond) {
                eval_expression(ctx, env, then)
            } else {
                eval_expression(ctx, env, otherwise)
            }
        }
        ExprKind::Call { callee, args } => eval_call(ctx, env, callee, args),
        ExprKind::New { callee, args, .. } => {
            let callee = eval_expression(ctx, env, callee)?;
            let args = eval_arguments(ctx, env, args)?;
            Ok(construct(ctx, &callee, args)?)
        }
        ExprKind::Member { object, property } => {
            if matches!(object.kind, ExprKind::Super) {
                let (this, home) = super_context(env)?;
                let parent = home
                    .parent
                    .clone()
                    .ok_or_else(|| throw_type_error("'super' used in a class without a base"))?;
                let MemberKey::Dot(name) = property else {
                    return Err(throw_type_error("'super' members must be accessed by name").into());
                };
                if let Some(getter) = parent.find_getter(name) {
                    return Ok(call_function(ctx, &Value::Function(getter), Some(this), vec![])?);
                }
                if let Some(method) = parent.find_method(name) {
                    return Ok(Value::Function(method));
                }
                return Ok(Value::Undefined);
            }
            let object = eval_expression(ctx, env, object)?;
            let key = eval_member_key(ctx, env, property)?;
            Ok(get_property(ctx, &object, &key)?)
        }
        ExprKind::ArrayLit(items) => {
            let mut values = vec![];
            for item in items {
                match item {
                    ArrayItem::Hole => values.push(Value::Undefined),
                    ArrayItem::Item { spread, expr } => {
                        let value = eval_expression(ctx, env, expr)?;
                        if *spread {
                            values.extend(iterate_to_vec(ctx, &value)?);
                        } else {
                            values.push(value);
                        }
                    }
                }
            }
            Ok(Value::Array(Rc::new(RefCell::new(values))))
        }
        ExprKind::ObjectLit(props) => eval_object_literal(ctx, env, props),
        ExprKind::Function(func) => {
            Ok(make_closure(env, func))
        }
        ExprKind::Arrow(func) => Ok(make_closure(env, func)),
        ExprKind::ClassExpr(decl) => Ok(build_class(ctx, env, &Rc::new((**decl).clone()))?),
        ExprKind::TypeAssertion { expr, .. } => eval_expression(ctx, env, expr),
        ExprKind::NonNull(expr) => eval_expression(ctx, env, expr),
        ExprKind::Yield { .. } => {
            Err(throw_type_error("'yield' is only valid inside generator bodies").into())
        }
        ExprKind::Await(_) => {
            Err(throw_type_error("'await' is only valid inside async bodies").into())
        }
    }
}

pub fn make_closure(env: &Environment, func: &FunctionLit) -> Value {
    Value::Function(Rc::new(FunctionValue::new(
        Rc::new(func.clone()),
        env.clone(),
    )))
}

fn eval_member_key(
    ctx: &mut Context,
    env: &Environment,
    property: &MemberKey,
) -> Result<PropertyKey, Signal> {
    match property {
        MemberKey::Dot(name) => Ok(PropertyKey::Str(name.clone())),
        MemberKey::Bracket(expr) => {
            let key = eval_expression(ctx, env, expr)?;
            Ok(to_property_key(&key)?)
        }
    }
}

fn super_context(env: &Environment) -> Result<(Value, Rc<ClassValue>), Signal> {
    let this = env
        .lookup_this()
        .ok_or_else(|| throw_type_error("'super' is only valid inside class members"))?;
    let home = env
        .lookup_home_class()
        .ok_or_else(|| throw_type_error("'super' is only valid inside class members"))?;
    Ok((this, home))
}

fn eval_arguments(
    ctx: &mut Context,
    env: &Environment,
    args: &[Argument],
) -> Result<Vec<Value>, Signal> {
    let mut out = vec![];
    for arg in args {
        let value = eval_expression(ctx, env, &arg.expr)?;
        if arg.spread {
            out.extend(iterate_to_vec(ctx, &value)?);
        } else {
            out.push(value);
        }
    }
    Ok(out)
}

fn eval_call(
    ctx: &mut Context,
    env: &Environment,
    callee: &Expression,
    args: &[Argument],
) -> Eval {
    // unwrap `(obj.m)()` so the receiver binding survives grouping
    let callee = match &callee.kind {
        ExprKind::Grouping(inner) => inner.as_ref(),
        _ => callee,
    };

    match &callee.kind {
        ExprKind::Super => {
            let (this, home) = super_context(env)?;
            let parent = home
                .parent
                .clone()
                .ok_or_else(|| throw_type_error("'super' used in a class without a base"))?;
            let args = eval_arguments(ctx, env, args)?;
            if let Some(ctor) = parent.find_method("constructor") {
                call_function(ctx, &Value::Function(ctor), Some(this), args)?;
            }
            Ok(Value::Undefined)
        }
        ExprKind::Member { object, property } if matches!(object.kind, ExprKind::Super) => {
            let (this, home) = super_context(env)?;
            let parent = home
                .parent
                .clone()
                .ok_or_else(|| throw_type_error("'super' used in a class without a base"))?;
            let MemberKey::Dot(name) = property else {
                return Err(throw_type_error("'super' members must be accessed by name").into());
            };
            let method = parent.find_method(name).ok_or_else(|| {
                throw_type_error(format!("super.{name} is not a function"))
            })?;
            let args = eval_arguments(ctx, env, args)?;
            Ok(call_function(ctx, &Value::Function(method), Some(this), args)?)
        }
        ExprKind::Member { object, property } => {
            let receiver = eval_expression(ctx, env, object)?;
            let key = eval_member_key(ctx, env, property)?;
            let func = get_property(ctx, &receiver, &key)?;
            if !func.is_callable() {
                return Err(throw_type_error(format!(
                    "{}.{} is not a function",
                    to_display_string(&receiver),
                    key.name()
                ))
                .into());
            }
            let args = eval_arguments(ctx, env, args)?;
            Ok(call_function(ctx, &func, Some(receiver), args)?)
        }
        _ => {
            let func = eval_expression(ctx, env, callee)?;
            let args = eval_arguments(ctx, env, args)?;
            Ok(call_function(ctx, &func, None, args)?)
        }
    }
}

fn eval_object_literal(ctx: &mut Context, env: &Environment, props: &[ObjectProp]) -> Eval {
    let object = new_object();
    let Value::Object(obj) = &object else {
        unreachable!()
    };

    for prop in props {
        match prop {
            ObjectProp::KeyValue { key, value } => {
                let value = eval_expression(ctx, env, value)?;
                match eval_prop_key(ctx, env, key)? {
                    PropertyKey::Str(name) => {
                        if let Value::Function(func) = &value {
                            if func.name.borrow().is_empty() {
                                *func.name.borrow_mut() = name.clone();
                            }
                        }
                        obj.borrow_mut().properties.insert(name, Property::plain(value));
                    }
                    PropertyKey::Symbol(symbol) => {
                        obj.borrow_mut().set_symbol(symbol, value);
                    }
                }
            }
            ObjectProp::Shorthand(name) => {
                let value = match env.get(name) {
                    Some(value) => value,
                    None => {
                        return Err(
                            throw_reference_error(format!("{name} is not defined")).into()
                        )
                    }
                };
                obj.borrow_mut()
                    .properties
                    .insert(name.clone(), Property::plain(value));
            }
            ObjectProp::Spread(expr) => {
                let source = eval_expression(ctx, env, expr)?;
                if let Value::Object(source) = &source {
                    let entries: Vec<(String, Property)> = source
                        .borrow()
                        .properties
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    let mut data = obj.borrow_mut();
                    for (key, property) in entries {
                        if !property.is_accessor() {
                            data.properties.insert(key, Property::plain(property.value));
                        }
                    }
                }
            }
            ObjectProp::Getter { key, func } | ObjectProp::Setter { key, func } => {
                let accessor = make_closure(env, func);
                let is_getter = matches!(prop, ObjectProp::Getter { .. });
                if let PropertyKey::Str(name) = eval_prop_key(ctx, env, key)? {
                    let mut data = obj.borrow_mut();
                    let slot = data.properties.entry(name).or_insert(Property {
                        value: Value::Undefined,
                        getter: None,
                        setter: None,
                    });
                    if is_getter {
                        slot.getter = Some(accessor);
                    } else {
                        slot.setter = Some(accessor);
                    }
                }
            }
        }
    }
    Ok(object)
}

fn eval_prop_key(
    ctx: &mut Context,
    env: &Environment,
    key: &PropKey,
) -> Result<PropertyKey, Signal> {
    match key {
        PropKey::Ident(name) | PropKey::Str(name) => Ok(PropertyKey::Str(name.clone())),
        PropKey::Number(n) => Ok(PropertyKey::Str(operations::format_number(*n))),
        PropKey::Computed(expr) => {
            let value = eval_expression(ctx, env, expr)?;
            Ok(to_property_key(&value)?)
        }
    }
}

fn eval_unary(ctx: &mut Context, env: &Environment, op: UnaryOp, operand: &Expression) -> Eval {
    if op == UnaryOp::Typeof {
        if let ExprKind::Ident(name) = &operand.kind {
            if !env.has(name) {
                return Ok(Value::str("undefined"));
            }
        }
    }
    if op == UnaryOp::Delete {
        return eval_delete(ctx, env, operand);
    }

    let value = eval_expression(ctx, env, operand)?;
    let result = match op {
        UnaryOp::Minus => Value::Number(-to_number(&value)),
        UnaryOp::Plus => Value::Number(to_number(&value)),
        UnaryOp::Not => Value::Bool(!truthy(&value)),
        UnaryOp::Typeof => Value::str(value.type_of()),
        UnaryOp::Void => Value::Undefined,
        UnaryOp::Delete => unreachable!(),
    };
    Ok(result)
}

fn eval_delete(ctx: &mut Context, env: &Environment, operand: &Expression) -> Eval {
    match &operand.kind {
        ExprKind::Member { object, property } => {
            let target = eval_expression(ctx, env, object)?;
            let key = eval_member_key(ctx, env, property)?;
            let strict = env.strict();
            Ok(Value::Bool(operations::delete_property(
                &target, &key, strict,
            )?))
        }
        ExprKind::Ident(_) => Ok(Value::Bool(false)),
        _ => {
            eval_expression(ctx, env, operand)?;
            Ok(Value::Bool(true))
        }
    }
}

fn eval_update(
    ctx: &mut Context,
    env: &Environment,
    prefix: bool,
    increment: bool,
    target: &Expression,
) -> Eval {
    let old = to_number(&eval_expression(ctx, env, target)?);
    let new = if increment { old + 1.0 } else { old - 1.0 };
    assign_to_target(ctx, env, target, Value::Number(new))?;
    Ok(Value::Number(if prefix { new } else { old }))
}

fn eval_assign(
    ctx: &mut Context,
    env: &Environment,
    op: AssignOp,
    target: &Expression,
    value: &Expression,
) -> Eval {
    let new_value = match op {
        AssignOp::Assign => eval_expression(ctx, env, value)?,
        compound => {
            let current = eval_expression(ctx, env, target)?;
            let rhs = eval_expression(ctx, env, value)?;
            let binary_op = match compound {
                AssignOp::Add => BinaryOp::Add,
                AssignOp::Sub => BinaryOp::Sub,
                AssignOp::Mul => BinaryOp::Mul,
                AssignOp::Div => BinaryOp::Div,
                AssignOp::Rem => BinaryOp::Rem,
                AssignOp::Assign => unreachable!(),
            };
            operations::binary(binary_op, &current, &rhs)?
        }
    };
    assign_to_target(ctx, env, target, new_value.clone())?;
    Ok(new_value)
}

/// Assignment to an identifier or member reference, with the strict-mode
/// semantics for const bindings and frozen/sealed objects.
fn assign_to_target(
    ctx: &mut Context,
    env: &Environment,
    target: &Expression,
    value: Value,
) -> Result<(), Signal> {
    match &target.kind {
        ExprKind::Ident(name) => Ok(assign_var(ctx, env, name, value)?),
        ExprKind::Member { object, property } => {
            let target_value = eval_expression(ctx, env, object)?;
            let key = eval_member_key(ctx, env, property)?;
            let strict = env.strict();
            set_property(ctx, &target_value, &key, value, strict)?;
            Ok(())
        }
        ExprKind::Grouping(inner) => assign_to_target(ctx, env, inner, value),
        _ => Err(throw_type_error("invalid assignment target").into()),
    }
}

/// Assignment to a named binding. A const write is a `TypeError` in strict
/// mode and silently dropped otherwise; an unresolved name is a
/// `ReferenceError` in strict mode and creates a global in sloppy mode.
pub fn assign_var(
    ctx: &mut Context,
    env: &Environment,
    name: &str,
    value: Value,
) -> Result<(), Thrown> {
    match env.assign(name, value.clone()) {
        AssignOutcome::Assigned => Ok(()),
        AssignOutcome::ConstWrite => {
            if env.strict() {
                Err(throw_type_error("Assignment to constant variable."))
            } else {
                Ok(())
            }
        }
        AssignOutcome::NotFound => {
            if env.strict() {
                Err(throw_reference_error(format!("{name} is not defined")))
            } else {
                ctx.global.define(name, value, true);
                Ok(())
            }
        }
    }
}
