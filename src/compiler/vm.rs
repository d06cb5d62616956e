//! The stack machine executing compiled [`Code`], and the suspension
//! machinery behind generators and async functions. A suspended frame keeps
//! its instruction cursor, operand stack, scratch stack, environment and
//! try-handler stack; both execution modes resume through the same paths.

use std::cell::RefCell;
use std::rc::Rc;

use crate::interpreter::{
    self, bind_params, build_class, call_function, construct, make_closure, prepare_call_env,
};
use crate::parser::ast::UnaryOp;
use crate::runtime::context::{Context, Job};
use crate::runtime::env::Environment;
use crate::runtime::operations::{
    self, get_property, in_operator, instanceof, iter_next, iterate_to_vec, set_property,
    to_display_string, to_number, to_promise, truthy, IterStep, PropertyKey,
};
use crate::runtime::value::{
    new_error, new_object, throw_type_error, AsyncTask, ErrorKind, FunctionValue, GeneratorState,
    Property, PromiseData, PromiseStatus, Thrown, Value,
};

use super::instruction::{Code, Instruction};

#[derive(Debug)]
pub struct Handler {
    pub catch: Option<usize>,
    pub finally: Option<usize>,
    pub stack_len: usize,
    pub scratch_len: usize,
    pub env: Environment,
}

#[derive(Debug)]
pub enum Pending {
    Throw(Value),
    Return(Value),
}

/// One activation of compiled code. Owned by the Rust call stack while
/// running, and by a generator or async task while suspended.
#[derive(Debug)]
pub struct Frame {
    pub code: Rc<Code>,
    pub pc: usize,
    pub stack: Vec<Value>,
    pub scratch: Vec<Value>,
    pub env: Environment,
    pub handlers: Vec<Handler>,
    pub pending: Option<Pending>,
    pub started: bool,
}

impl Frame {
    pub fn new(code: Rc<Code>, env: Environment) -> Self {
        Frame {
            code,
            pc: 0,
            stack: vec![],
            scratch: vec![],
            env,
            handlers: vec![],
            pending: None,
            started: false,
        }
    }
}

#[derive(Debug)]
pub enum FrameResult {
    Done(Value),
    Yielded(Value),
    Awaited(Rc<RefCell<PromiseData>>),
}

#[derive(Debug)]
pub enum ResumeMode {
    Next(Value),
    Throw(Value),
    Return(Value),
}

#[derive(Debug)]
pub struct StepResult {
    pub value: Value,
    pub done: bool,
}

/// Unwind a thrown value through the frame's handler stack. Returns the
/// value back when no handler remains.
fn unwind(frame: &mut Frame, error: Value) -> Option<Thrown> {
    while let Some(handler) = frame.handlers.pop() {
        frame.stack.truncate(handler.stack_len);
        frame.scratch.truncate(handler.scratch_len);
        frame.env = handler.env.clone();
        if let Some(catch) = handler.catch {
            frame.stack.push(error);
            frame.pc = catch;
            return None;
        }
        if let Some(finally) = handler.finally {
            frame.pending = Some(Pending::Throw(error));
            frame.pc = finally;
            return None;
        }
    }
    Some(Thrown(error))
}

/// Unwind a return completion through any finally handlers. Returns the
/// final value when the frame is done.
fn return_unwind(frame: &mut Frame, value: Value) -> Option<Value> {
    while let Some(handler) = frame.handlers.pop() {
        if let Some(finally) = handler.finally {
            frame.stack.truncate(handler.stack_len);
            frame.scratch.truncate(handler.scratch_len);
            frame.env = handler.env.clone();
            frame.pending = Some(Pending::Return(value));
            frame.pc = finally;
            return None;
        }
    }
    Some(value)
}

pub fn run_frame(ctx: &mut Context, frame: &mut Frame) -> Result<FrameResult, Thrown> {
    macro_rules! vm_try {
        ($result:expr) => {
            match $result {
                Ok(value) => value,
                Err(thrown) => match unwind(frame, thrown.0) {
                    None => continue,
                    Some(thrown) => return Err(thrown),
                },
            }
        };
    }

    loop {
        let Some(instruction) = frame.code.instructions.get(frame.pc).cloned() else {
            return Ok(FrameResult::Done(Value::Undefined));
        };
        frame.pc += 1;

        match instruction {
            Instruction::Const(index) => {
                frame.stack.push(frame.code.constants[index as usize].clone());
            }
            Instruction::LoadVar(index) => {
                let name = &frame.code.names[index as usize];
                match frame.env.get(name) {
                    Some(value) => frame.stack.push(value),
                    None => {
                        let error = crate::runtime::value::throw_reference_error(format!(
                            "{name} is not defined"
                        ));
                        match unwind(frame, error.0) {
                            None => continue,
                            Some(thrown) => return Err(thrown),
                        }
                    }
                }
            }
            Instruction::StoreVar(index) => {
                let name = frame.code.names[index as usize].clone();
                let value = frame.stack.last().cloned().unwrap_or(Value::Undefined);
                vm_try!(interpreter::assign_var(ctx, &frame.env, &name, value));
            }
            Instruction::DeclareVar { name, mutable } => {
                let name = frame.code.names[name as usize].clone();
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                frame.env.define(&name, value, mutable);
            }
            Instruction::Destructure { pattern, mutable } => {
                let pattern = frame.code.patterns[pattern as usize].clone();
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                let env = frame.env.clone();
                vm_try!(interpreter::bind_pattern(ctx, &env, &pattern, value, mutable)
                    .map_err(interpreter::signal_to_thrown));
            }
            Instruction::LoadThis => {
                frame
                    .stack
                    .push(frame.env.lookup_this().unwrap_or(Value::Undefined));
            }
            Instruction::PushScope => {
                frame.env = frame.env.child(false);
            }
            Instruction::PopScope => {
                if let Some(parent) = frame.env.parent() {
                    frame.env = parent;
                }
            }
            Instruction::Pop => {
                frame.stack.pop();
            }
            Instruction::Dup => {
                let top = frame.stack.last().cloned().unwrap_or(Value::Undefined);
                frame.stack.push(top);
            }
            Instruction::Dup2 => {
                let len = frame.stack.len();
                let a = frame
                    .stack
                    .get(len.wrapping_sub(2))
                    .cloned()
                    .unwrap_or(Value::Undefined);
                let b = frame.stack.last().cloned().unwrap_or(Value::Undefined);
                frame.stack.push(a);
                frame.stack.push(b);
            }
            Instruction::Stash => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                frame.scratch.push(value);
            }
            Instruction::Unstash => {
                let value = frame.scratch.pop().unwrap_or(Value::Undefined);
                frame.stack.push(value);
            }
            Instruction::ToNumber => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                frame.stack.push(Value::Number(to_number(&value)));
            }
            Instruction::Jump(target) => {
                frame.pc = target;
            }
            Instruction::JumpIfFalse(target) => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                if !truthy(&value) {
                    frame.pc = target;
                }
            }
            Instruction::JumpIfTrue(target) => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                if truthy(&value) {
                    frame.pc = target;
                }
            }
            Instruction::JumpKeepIfFalsy(target) => {
                let keep = !truthy(frame.stack.last().unwrap_or(&Value::Undefined));
                if keep {
                    frame.pc = target;
                } else {
                    frame.stack.pop();
                }
            }
            Instruction::JumpKeepIfTruthy(target) => {
                let keep = truthy(frame.stack.last().unwrap_or(&Value::Undefined));
                if keep {
                    frame.pc = target;
                } else {
                    frame.stack.pop();
                }
            }
            Instruction::JumpKeepIfNotNullish(target) => {
                let keep = !matches!(
                    frame.stack.last().unwrap_or(&Value::Undefined),
                    Value::Null | Value::Undefined
                );
                if keep {
                    frame.pc = target;
                } else {
                    frame.stack.pop();
                }
            }
            Instruction::Unary(op) => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                let result = match op {
                    UnaryOp::Minus => Value::Number(-to_number(&value)),
                    UnaryOp::Plus => Value::Number(to_number(&value)),
                    UnaryOp::Not => Value::Bool(!truthy(&value)),
                    UnaryOp::Typeof => Value::str(value.type_of()),
                    UnaryOp::Void => Value::Undefined,
                    UnaryOp::Delete => Value::Bool(true),
                };
                frame.stack.push(result);
            }
            Instruction::TypeofVar(index) => {
                let name = &frame.code.names[index as usize];
                let result = match frame.env.get(name) {
                    Some(value) => Value::str(value.type_of()),
                    None => Value::str("undefined"),
                };
                frame.stack.push(result);
            }
            Instruction::Binary(op) => {
                let rhs = frame.stack.pop().unwrap_or(Value::Undefined);
                let lhs = frame.stack.pop().unwrap_or(Value::Undefined);
                let result = match op {
                    crate::parser::ast::BinaryOp::Instanceof => {
                        Value::Bool(vm_try!(instanceof(ctx, &lhs, &rhs)))
                    }
                    crate::parser::ast::BinaryOp::In => {
                        Value::Bool(vm_try!(in_operator(&lhs, &rhs)))
                    }
                    other => vm_try!(operations::binary(other, &lhs, &rhs)),
                };
                frame.stack.push(result);
            }
            Instruction::GetProp(index) => {
                let name = frame.code.names[index as usize].clone();
                let object = frame.stack.pop().unwrap_or(Value::Undefined);
                let value = vm_try!(get_property(ctx, &object, &PropertyKey::Str(name)));
                frame.stack.push(value);
            }
            Instruction::SetProp(index) => {
                let name = frame.code.names[index as usize].clone();
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                let object = frame.stack.pop().unwrap_or(Value::Undefined);
                let strict = frame.env.strict();
                vm_try!(set_property(
                    ctx,
                    &object,
                    &PropertyKey::Str(name),
                    value.clone(),
                    strict
                ));
                frame.stack.push(value);
            }
            Instruction::GetIndex => {
                let key = frame.stack.pop().unwrap_or(Value::Undefined);
                let object = frame.stack.pop().unwrap_or(Value::Undefined);
                let key = vm_try!(operations::to_property_key(&key));
                let value = vm_try!(get_property(ctx, &object, &key));
                frame.stack.push(value);
            }
            Instruction::SetIndex => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                let key = frame.stack.pop().unwrap_or(Value::Undefined);
                let object = frame.stack.pop().unwrap_or(Value::Undefined);
                let key = vm_try!(operations::to_property_key(&key));
                let strict = frame.env.strict();
                vm_try!(set_property(ctx, &object, &key, value.clone(), strict));
                frame.stack.push(value);
            }
            Instruction::DeleteProp(index) => {
                let name = frame.code.names[index as usize].clone();
                let object = frame.stack.pop().unwrap_or(Value::Undefined);
                let strict = frame.env.strict();
                let result = vm_try!(operations::delete_property(
                    &object,
                    &PropertyKey::Str(name),
                    strict
                ));
                frame.stack.push(Value::Bool(result));
            }
            Instruction::DeleteIndex => {
                let key = frame.stack.pop().unwrap_or(Value::Undefined);
                let object = frame.stack.pop().unwrap_or(Value::Undefined);
                let key = vm_try!(operations::to_property_key(&key));
                let strict = frame.env.strict();
                let result = vm_try!(operations::delete_property(&object, &key, strict));
                frame.stack.push(Value::Bool(result));
            }
            Instruction::NewArray => {
                frame.stack.push(Value::Array(Rc::new(RefCell::new(vec![]))));
            }
            Instruction::ArrayPush => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                if let Some(Value::Array(items)) = frame.stack.last() {
                    items.borrow_mut().push(value);
                }
            }
            Instruction::ArrayExtend => {
                let iterable = frame.stack.pop().unwrap_or(Value::Undefined);
                let values = vm_try!(iterate_to_vec(ctx, &iterable));
                if let Some(Value::Array(items)) = frame.stack.last() {
                    items.borrow_mut().extend(values);
                }
            }
            Instruction::NewObject => {
                frame.stack.push(new_object());
            }
            Instruction::ObjectSpread => {
                let source = frame.stack.pop().unwrap_or(Value::Undefined);
                if let (Some(Value::Object(target)), Value::Object(source)) =
                    (frame.stack.last(), &source)
                {
                    let entries: Vec<(String, Property)> = source
                        .borrow()
                        .properties
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    let mut data = target.borrow_mut();
                    for (key, property) in entries {
                        if !property.is_accessor() {
                            data.properties.insert(key, Property::plain(property.value));
                        }
                    }
                }
            }
            Instruction::DefineAccessor { name, getter, func } => {
                let name = frame.code.names[name as usize].clone();
                let template = frame.code.functions[func as usize].clone();
                let accessor = make_closure(&frame.env, &template);
                if let Some(Value::Object(obj)) = frame.stack.last() {
                    let mut data = obj.borrow_mut();
                    let slot = data.properties.entry(name).or_insert(Property {
                        value: Value::Undefined,
                        getter: None,
                        setter: None,
                    });
                    if getter {
                        slot.getter = Some(accessor);
                    } else {
                        slot.setter = Some(accessor);
                    }
                }
            }
            Instruction::MakeFunction(index) => {
                let template = frame.code.functions[index as usize].clone();
                frame.stack.push(make_closure(&frame.env, &template));
            }
            Instruction::MakeClass(index) => {
                let decl = frame.code.classes[index as usize].clone();
                let env = frame.env.clone();
                let class = vm_try!(build_class(ctx, &env, &decl));
                frame.stack.push(class);
            }
            Instruction::Call => {
                let args = pop_args(frame);
                let callee = frame.stack.pop().unwrap_or(Value::Undefined);
                let result = vm_try!(call_function(ctx, &callee, None, args));
                frame.stack.push(result);
            }
            Instruction::CallMethod => {
                let args = pop_args(frame);
                let func = frame.stack.pop().unwrap_or(Value::Undefined);
                let receiver = frame.stack.pop().unwrap_or(Value::Undefined);
                if !func.is_callable() {
                    let error = throw_type_error(format!(
                        "{} is not a function",
                        to_display_string(&func)
                    ));
                    match unwind(frame, error.0) {
                        None => continue,
                        Some(thrown) => return Err(thrown),
                    }
                }
                let result = vm_try!(call_function(ctx, &func, Some(receiver), args));
                frame.stack.push(result);
            }
            Instruction::New => {
                let args = pop_args(frame);
                let callee = frame.stack.pop().unwrap_or(Value::Undefined);
                let result = vm_try!(construct(ctx, &callee, args));
                frame.stack.push(result);
            }
            Instruction::SuperCall => {
                let args = pop_args(frame);
                let result = vm_try!(super_call(ctx, frame, None, args));
                frame.stack.push(result);
            }
            Instruction::SuperGet(index) => {
                let name = frame.code.names[index as usize].clone();
                let value = vm_try!(super_get(ctx, frame, &name));
                frame.stack.push(value);
            }
            Instruction::SuperCallMethod(index) => {
                let name = frame.code.names[index as usize].clone();
                let args = pop_args(frame);
                let result = vm_try!(super_call(ctx, frame, Some(&name), args));
                frame.stack.push(result);
            }
            Instruction::Return => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                match return_unwind(frame, value) {
                    Some(value) => return Ok(FrameResult::Done(value)),
                    None => continue,
                }
            }
            Instruction::Throw => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                match unwind(frame, value) {
                    None => continue,
                    Some(thrown) => return Err(thrown),
                }
            }
            Instruction::Yield => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                return Ok(FrameResult::Yielded(value));
            }
            Instruction::Await => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                return Ok(FrameResult::Awaited(to_promise(value)));
            }
            Instruction::EnumKeys => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                let keys: Vec<Value> = operations::enumerate_keys(&value)
                    .into_iter()
                    .map(Value::str)
                    .collect();
                frame.stack.push(Value::Array(Rc::new(RefCell::new(keys))));
            }
            Instruction::GetIter => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                let iterator = vm_try!(operations::get_iterator(ctx, &value));
                frame.stack.push(iterator);
            }
            Instruction::IterNext { done } => {
                let iterator = frame.stack.last().cloned().unwrap_or(Value::Undefined);
                match vm_try!(iter_next(ctx, &iterator)) {
                    IterStep::Value(value) => frame.stack.push(value),
                    IterStep::Done(value) => {
                        frame.stack.pop();
                        frame.stack.push(value);
                        frame.pc = done;
                    }
                }
            }
            Instruction::TryPush { catch, finally } => {
                frame.handlers.push(Handler {
                    catch,
                    finally,
                    stack_len: frame.stack.len(),
                    scratch_len: frame.scratch.len(),
                    env: frame.env.clone(),
                });
            }
            Instruction::TryPop => {
                frame.handlers.pop();
            }
            Instruction::EndFinally => match frame.pending.take() {
                None => {}
                Some(Pending::Throw(error)) => match unwind(frame, error) {
                    None => continue,
                    Some(thrown) => return Err(thrown),
                },
                Some(Pending::Return(value)) => match return_unwind(frame, value) {
                    Some(value) => return Ok(FrameResult::Done(value)),
                    None => continue,
                },
            },
            Instruction::Nop => {}
        }
    }
}

fn pop_args(frame: &mut Frame) -> Vec<Value> {
    match frame.stack.pop() {
        Some(Value::Array(items)) => items.borrow().clone(),
        _ => vec![],
    }
}

fn super_context(frame: &Frame) -> Result<(Value, Rc<crate::runtime::value::ClassValue>), Thrown> {
    let this = frame
        .env
        .lookup_this()
        .ok_or_else(|| throw_type_error("'super' is only valid inside class members"))?;
    let home = frame
        .env
        .lookup_home_class()
        .ok_or_else(|| throw_type_error("'super' is only valid inside class members"))?;
    Ok((this, home))
}

fn super_get(ctx: &mut Context, frame: &Frame, name: &str) -> Result<Value, Thrown> {
    let (this, home) = super_context(frame)?;
    let parent = home
        .parent
        .clone()
        .ok_or_else(|| throw_type_error("'super' used in a class without a base"))?;
    if let Some(getter) = parent.find_getter(name) {
        return call_function(ctx, &Value::Function(getter), Some(this), vec![]);
    }
    if let Some(method) = parent.find_method(name) {
        return Ok(Value::Function(method));
    }
    Ok(Value::Undefined)
}

fn super_call(
    ctx: &mut Context,
    frame: &Frame,
    method: Option<&str>,
    args: Vec<Value>,
) -> Result<Value, Thrown> {
    let (this, home) = super_context(frame)?;
    let parent = home
        .parent
        .clone()
        .ok_or_else(|| throw_type_error("'super' used in a class without a base"))?;
    match method {
        None => {
            if let Some(ctor) = parent.find_method("constructor") {
                call_function(ctx, &Value::Function(ctor), Some(this), args)?;
            }
            Ok(Value::Undefined)
        }
        Some(name) => {
            let method = parent
                .find_method(name)
                .ok_or_else(|| throw_type_error(format!("super.{name} is not a function")))?;
            call_function(ctx, &Value::Function(method), Some(this), args)
        }
    }
}

// ---------------------------------------------------------------------------
// compiled calls
// ---------------------------------------------------------------------------

/// Compile a function body on first use, caching the result on the value.
pub fn get_or_compile(func: &FunctionValue) -> Result<Rc<Code>, Thrown> {
    func.compiled
        .get_or_try_init(|| {
            super::compile_function(&func.func)
                .map(Rc::new)
                .map_err(|error| Thrown(new_error(ErrorKind::SyntaxError, error.to_string())))
        })
        .cloned()
}

/// Execute an already-compiled unit (the whole-program entry point of the
/// compiled mode).
pub fn run_code(ctx: &mut Context, code: Rc<Code>, env: &Environment) -> Result<Value, Thrown> {
    let mut frame = Frame::new(code, env.clone());
    frame.started = true;
    match run_frame(ctx, &mut frame)? {
        FrameResult::Done(value) => Ok(value),
        _ => Err(throw_type_error("top-level code cannot suspend")),
    }
}

pub fn call_compiled(
    ctx: &mut Context,
    func: &Rc<FunctionValue>,
    this: Option<Value>,
    args: Vec<Value>,
) -> Result<Value, Thrown> {
    let code = get_or_compile(func)?;
    let env = prepare_call_env(func, this);
    bind_params(ctx, &env, &func.func.params, &args).map_err(interpreter::signal_to_thrown)?;
    let mut frame = Frame::new(code, env);
    frame.started = true;
    match run_frame(ctx, &mut frame)? {
        FrameResult::Done(value) => Ok(value),
        _ => Err(throw_type_error("a non-generator function cannot suspend")),
    }
}

// ---------------------------------------------------------------------------
// generators
// ---------------------------------------------------------------------------

/// Calling a generator function returns a paused generator object.
pub fn make_generator(
    ctx: &mut Context,
    func: &Rc<FunctionValue>,
    this: Option<Value>,
    args: Vec<Value>,
) -> Result<Value, Thrown> {
    let code = get_or_compile(func)?;
    let env = prepare_call_env(func, this);
    bind_params(ctx, &env, &func.func.params, &args).map_err(interpreter::signal_to_thrown)?;
    let frame = Frame::new(code, env);
    Ok(Value::Generator(Rc::new(RefCell::new(GeneratorState {
        frame: Some(frame),
        done: false,
        is_async: func.func.is_async,
    }))))
}

/// Resume a suspended generator with a `next`, `throw` or `return`
/// completion.
pub fn resume_generator(
    ctx: &mut Context,
    gen: &Rc<RefCell<GeneratorState>>,
    mode: ResumeMode,
) -> Result<StepResult, Thrown> {
    let frame = {
        let mut state = gen.borrow_mut();
        if state.done {
            return match mode {
                ResumeMode::Next(_) => Ok(StepResult {
                    value: Value::Undefined,
                    done: true,
                }),
                ResumeMode::Return(value) => Ok(StepResult { value, done: true }),
                ResumeMode::Throw(error) => Err(Thrown(error)),
            };
        }
        state.frame.take()
    };
    let Some(mut frame) = frame else {
        return Err(throw_type_error("generator is already running"));
    };

    match mode {
        ResumeMode::Next(value) => {
            if frame.started {
                frame.stack.push(value);
            } else {
                frame.started = true;
            }
        }
        ResumeMode::Throw(error) => {
            if !frame.started {
                gen.borrow_mut().done = true;
                return Err(Thrown(error));
            }
            match unwind(&mut frame, error) {
                None => {}
                Some(thrown) => {
                    gen.borrow_mut().done = true;
                    return Err(thrown);
                }
            }
        }
        ResumeMode::Return(value) => {
            if !frame.started {
                gen.borrow_mut().done = true;
                return Ok(StepResult { value, done: true });
            }
            match return_unwind(&mut frame, value) {
                Some(value) => {
                    gen.borrow_mut().done = true;
                    return Ok(StepResult { value, done: true });
                }
                None => {}
            }
        }
    }

    match run_frame(ctx, &mut frame) {
        Ok(FrameResult::Yielded(value)) => {
            gen.borrow_mut().frame = Some(frame);
            Ok(StepResult { value, done: false })
        }
        Ok(FrameResult::Done(value)) => {
            gen.borrow_mut().done = true;
            Ok(StepResult { value, done: true })
        }
        Ok(FrameResult::Awaited(_)) => {
            gen.borrow_mut().done = true;
            Err(throw_type_error(
                "a synchronous generator cannot await; use an async generator",
            ))
        }
        Err(thrown) => {
            gen.borrow_mut().done = true;
            Err(thrown)
        }
    }
}

/// The `{ value, done }` object returned by generator resumptions.
fn iter_result_object(value: Value, done: bool) -> Value {
    let object = new_object();
    if let Value::Object(obj) = &object {
        let mut data = obj.borrow_mut();
        data.properties.insert("value".into(), Property::plain(value));
        data.properties
            .insert("done".into(), Property::plain(Value::Bool(done)));
    }
    object
}

pub fn generator_method(name: &str, target: &Value) -> Value {
    let entry: Option<(&'static str, crate::runtime::value::NativeFn)> = match name {
        "next" => Some(("next", gen_next)),
        "return" => Some(("return", gen_return)),
        "throw" => Some(("throw", gen_throw)),
        "__self_iterator__" => Some(("[Symbol.iterator]", gen_self)),
        _ => None,
    };
    match entry {
        Some((name, func)) => {
            crate::runtime::value::BuiltinMethod::bound(name, target.clone(), func)
        }
        None => Value::Undefined,
    }
}

fn this_generator(this: &Value) -> Result<Rc<RefCell<GeneratorState>>, Thrown> {
    match this {
        Value::Generator(gen) => Ok(gen.clone()),
        _ => Err(throw_type_error("generator method called on a non-generator")),
    }
}

fn gen_next(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let gen = this_generator(&this)?;
    let input = args.first().cloned().unwrap_or(Value::Undefined);
    if gen.borrow().is_async {
        return drive_async_generator(ctx, &gen, Ok(input));
    }
    let step = resume_generator(ctx, &gen, ResumeMode::Next(input))?;
    Ok(iter_result_object(step.value, step.done))
}

fn gen_return(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let gen = this_generator(&this)?;
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    if gen.borrow().is_async {
        gen.borrow_mut().done = true;
        return Ok(Value::Promise(PromiseData::fulfilled(iter_result_object(
            value, true,
        ))));
    }
    let step = resume_generator(ctx, &gen, ResumeMode::Return(value))?;
    Ok(iter_result_object(step.value, step.done))
}

fn gen_throw(ctx: &mut Context, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let gen = this_generator(&this)?;
    let error = args.first().cloned().unwrap_or(Value::Undefined);
    if gen.borrow().is_async {
        return drive_async_generator(ctx, &gen, Err(error));
    }
    let step = resume_generator(ctx, &gen, ResumeMode::Throw(error))?;
    Ok(iter_result_object(step.value, step.done))
}

fn gen_self(_ctx: &mut Context, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(this)
}

// ---------------------------------------------------------------------------
// async execution
// ---------------------------------------------------------------------------

/// Call an async function: run eagerly to the first suspension point and
/// return the promise it will settle.
pub fn start_async(
    ctx: &mut Context,
    func: &Rc<FunctionValue>,
    this: Option<Value>,
    args: Vec<Value>,
) -> Result<Value, Thrown> {
    let code = get_or_compile(func)?;
    let env = prepare_call_env(func, this);
    bind_params(ctx, &env, &func.func.params, &args).map_err(interpreter::signal_to_thrown)?;
    let frame = Frame::new(code, env);
    let promise = PromiseData::pending();
    let task = Rc::new(RefCell::new(AsyncTask {
        frame: Some(frame),
        promise: promise.clone(),
        generator: None,
    }));
    resume_task(ctx, &task, Ok(Value::Undefined));
    Ok(Value::Promise(promise))
}

/// One resumption of an async generator: each `next`/`throw` settles a
/// fresh promise of `{ value, done }`.
fn drive_async_generator(
    ctx: &mut Context,
    gen: &Rc<RefCell<GeneratorState>>,
    input: Result<Value, Value>,
) -> Result<Value, Thrown> {
    let promise = PromiseData::pending();
    if gen.borrow().done {
        settle_fulfill(ctx, &promise, iter_result_object(Value::Undefined, true));
        return Ok(Value::Promise(promise));
    }
    let frame = gen.borrow_mut().frame.take();
    let Some(frame) = frame else {
        return Err(throw_type_error("async generator is already running"));
    };
    let task = Rc::new(RefCell::new(AsyncTask {
        frame: Some(frame),
        promise: promise.clone(),
        generator: Some(gen.clone()),
    }));
    resume_task(ctx, &task, input);
    Ok(Value::Promise(promise))
}

/// Resume a suspended async task with a settled input and run it until it
/// suspends again or completes, settling promises and scheduling follow-up
/// jobs as it goes.
pub fn resume_task(ctx: &mut Context, task: &Rc<RefCell<AsyncTask>>, input: Result<Value, Value>) {
    let frame = task.borrow_mut().frame.take();
    let Some(mut frame) = frame else {
        return;
    };
    let (promise, generator) = {
        let task = task.borrow();
        (task.promise.clone(), task.generator.clone())
    };

    match input {
        Ok(value) => {
            if frame.started {
                frame.stack.push(value);
            } else {
                frame.started = true;
            }
        }
        Err(error) => {
            if let Some(thrown) = unwind(&mut frame, error) {
                if let Some(gen) = &generator {
                    gen.borrow_mut().done = true;
                }
                settle_reject(ctx, &promise, thrown.0);
                return;
            }
            frame.started = true;
        }
    }

    match run_frame(ctx, &mut frame) {
        Ok(FrameResult::Done(value)) => {
            match &generator {
                Some(gen) => {
                    gen.borrow_mut().done = true;
                    settle_fulfill(ctx, &promise, iter_result_object(value, true));
                }
                None => settle_fulfill(ctx, &promise, value),
            };
        }
        Ok(FrameResult::Yielded(value)) => match &generator {
            Some(gen) => {
                gen.borrow_mut().frame = Some(frame);
                settle_fulfill(ctx, &promise, iter_result_object(value, false));
            }
            None => {
                settle_reject(
                    ctx,
                    &promise,
                    operations::type_error_value("an async function cannot yield"),
                );
            }
        },
        Ok(FrameResult::Awaited(awaited)) => {
            task.borrow_mut().frame = Some(frame);
            attach(ctx, &awaited, task);
        }
        Err(thrown) => {
            if let Some(gen) = &generator {
                gen.borrow_mut().done = true;
            }
            settle_reject(ctx, &promise, thrown.0);
        }
    }
}

/// Register a task to resume when `promise` settles. Already-settled
/// promises schedule the resumption in FIFO order behind earlier
/// settlements.
fn attach(ctx: &mut Context, promise: &Rc<RefCell<PromiseData>>, task: &Rc<RefCell<AsyncTask>>) {
    let status = promise.borrow().status.clone();
    match status {
        PromiseStatus::Pending => {
            promise.borrow_mut().reactions.push(task.clone());
        }
        PromiseStatus::Fulfilled(value) => {
            ctx.enqueue(Job {
                task: task.clone(),
                input: Ok(value),
            });
        }
        PromiseStatus::Rejected(error) => {
            ctx.rejected.retain(|p| !Rc::ptr_eq(p, promise));
            ctx.enqueue(Job {
                task: task.clone(),
                input: Err(error),
            });
        }
    }
}

fn settle_fulfill(
    ctx: &mut Context,
    promise: &Rc<RefCell<PromiseData>>,
    value: Value,
) {
    let reactions = {
        let mut data = promise.borrow_mut();
        data.status = PromiseStatus::Fulfilled(value.clone());
        std::mem::take(&mut data.reactions)
    };
    for task in reactions {
        ctx.enqueue(Job {
            task,
            input: Ok(value.clone()),
        });
    }
}

fn settle_reject(ctx: &mut Context, promise: &Rc<RefCell<PromiseData>>, error: Value) {
    let reactions = {
        let mut data = promise.borrow_mut();
        data.status = PromiseStatus::Rejected(error.clone());
        std::mem::take(&mut data.reactions)
    };
    if reactions.is_empty() {
        ctx.rejected.push(promise.clone());
        return;
    }
    for task in reactions {
        ctx.enqueue(Job {
            task,
            input: Err(error.clone()),
        });
    }
}

/// Service pending async resumptions in FIFO settlement order, then surface
/// the first unhandled rejection, if any.
pub fn drain_jobs(ctx: &mut Context) -> Result<(), Thrown> {
    while let Some(job) = ctx.jobs.pop_front() {
        resume_task(ctx, &job.task, job.input);
    }
    for promise in std::mem::take(&mut ctx.rejected) {
        let data = promise.borrow();
        if let PromiseStatus::Rejected(error) = &data.status {
            if data.reactions.is_empty() {
                return Err(Thrown(error.clone()));
            }
        }
    }
    Ok(())
}
