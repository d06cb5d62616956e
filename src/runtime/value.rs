use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::compiler::vm::Frame;
use crate::compiler::Code;
use crate::parser::ast::{ClassDecl, FunctionLit};

use super::env::Environment;
use super::symbol::SymbolValue;

/// A thrown runtime value unwinding towards the nearest `catch`.
#[derive(Debug, Clone)]
pub struct Thrown(pub Value);

pub type NativeFn = fn(&mut crate::runtime::Context, Value, &[Value]) -> Result<Value, Thrown>;

/// The runtime value model shared by the interpreter and the compiled
/// back-end.
#[derive(Clone)]
pub enum Value {
    Number(f64),
    Str(Rc<String>),
    Bool(bool),
    Null,
    Undefined,
    Symbol(Rc<SymbolValue>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<ObjectData>>),
    Function(Rc<FunctionValue>),
    Class(Rc<ClassValue>),
    Builtin(Rc<BuiltinMethod>),
    Generator(Rc<RefCell<GeneratorState>>),
    Promise(Rc<RefCell<PromiseData>>),
    Error(Rc<RefCell<ErrorData>>),
    Map(Rc<RefCell<MapData>>),
    Set(Rc<RefCell<SetData>>),
    WeakMap(Rc<RefCell<WeakMapData>>),
    WeakSet(Rc<RefCell<WeakSetData>>),
    Regex(Rc<RegexValue>),
    /// Internal iterator handle used by compiled `for-of` loops and
    /// `yield*` delegation. Never observable from user code.
    NativeIter(Rc<RefCell<NativeIter>>),
}

impl Value {
    pub fn str(text: impl Into<String>) -> Value {
        Value::Str(Rc::new(text.into()))
    }

    /// The `typeof` tag for this value.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Undefined => "undefined",
            Value::Symbol(_) => "symbol",
            Value::Function(_) | Value::Class(_) | Value::Builtin(_) => "function",
            _ => "object",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Class(_) | Value::Builtin(_)
        )
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Null => write!(f, "Null"),
            Value::Undefined => write!(f, "Undefined"),
            Value::Symbol(s) => write!(f, "Symbol({:?})", s.description),
            Value::Array(_) => write!(f, "Array"),
            Value::Object(_) => write!(f, "Object"),
            Value::Function(func) => write!(f, "Function({})", func.name.borrow()),
            Value::Class(class) => write!(f, "Class({})", class.name),
            Value::Builtin(builtin) => write!(f, "Builtin({})", builtin.name),
            Value::Generator(_) => write!(f, "Generator"),
            Value::Promise(_) => write!(f, "Promise"),
            Value::Error(err) => {
                let err = err.borrow();
                write!(f, "Error({}: {})", err.name, err.message)
            }
            Value::Map(_) => write!(f, "Map"),
            Value::Set(_) => write!(f, "Set"),
            Value::WeakMap(_) => write!(f, "WeakMap"),
            Value::WeakSet(_) => write!(f, "WeakSet"),
            Value::Regex(regex) => write!(f, "Regex(/{}/{})", regex.pattern, regex.flags),
            Value::NativeIter(_) => write!(f, "NativeIter"),
        }
    }
}

// ---------------------------------------------------------------------------
// objects
// ---------------------------------------------------------------------------

/// One named property slot. Accessor properties carry getter/setter
/// functions and ignore `value`.
#[derive(Debug, Clone)]
pub struct Property {
    pub value: Value,
    pub getter: Option<Value>,
    pub setter: Option<Value>,
}

impl Property {
    pub fn plain(value: Value) -> Self {
        Property {
            value,
            getter: None,
            setter: None,
        }
    }

    pub fn is_accessor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }
}

#[derive(Debug, Default)]
pub struct ObjectData {
    /// Insertion-ordered string-keyed properties.
    pub properties: IndexMap<String, Property>,
    /// Symbol-keyed side map, identity keyed.
    pub symbol_props: Vec<(Rc<SymbolValue>, Value)>,
    /// Set for class instances.
    pub class: Option<Rc<ClassValue>>,
    pub frozen: bool,
    pub sealed: bool,
}

impl ObjectData {
    pub fn get_symbol(&self, symbol: &Rc<SymbolValue>) -> Option<Value> {
        self.symbol_props
            .iter()
            .find(|(key, _)| Rc::ptr_eq(key, symbol))
            .map(|(_, value)| value.clone())
    }

    pub fn set_symbol(&mut self, symbol: Rc<SymbolValue>, value: Value) {
        for entry in self.symbol_props.iter_mut() {
            if Rc::ptr_eq(&entry.0, &symbol) {
                entry.1 = value;
                return;
            }
        }
        self.symbol_props.push((symbol, value));
    }
}

pub fn new_object() -> Value {
    Value::Object(Rc::new(RefCell::new(ObjectData::default())))
}

// ---------------------------------------------------------------------------
// functions & classes
// ---------------------------------------------------------------------------

pub struct FunctionValue {
    pub name: RefCell<String>,
    pub func: Rc<FunctionLit>,
    /// The environment the closure was created in.
    pub env: Environment,
    /// The class whose body defined this method, for `super` resolution.
    pub home_class: RefCell<Option<Weak<ClassValue>>>,
    /// Lazily compiled body, shared between calls.
    pub compiled: OnceCell<Rc<Code>>,
}

impl FunctionValue {
    pub fn new(func: Rc<FunctionLit>, env: Environment) -> Self {
        let name = func.name.clone().unwrap_or_default();
        FunctionValue {
            name: RefCell::new(name),
            func,
            env,
            home_class: RefCell::new(None),
            compiled: OnceCell::new(),
        }
    }

    pub fn home_class(&self) -> Option<Rc<ClassValue>> {
        self.home_class.borrow().as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionValue({})", self.name.borrow())
    }
}

pub struct ClassValue {
    pub name: String,
    pub decl: Rc<ClassDecl>,
    pub parent: Option<Rc<ClassValue>>,
    pub methods: RefCell<IndexMap<String, Rc<FunctionValue>>>,
    pub getters: RefCell<IndexMap<String, Rc<FunctionValue>>>,
    pub setters: RefCell<IndexMap<String, Rc<FunctionValue>>>,
    /// Static fields and methods, looked up on the constructor value.
    pub statics: RefCell<IndexMap<String, Value>>,
    pub is_abstract: bool,
    /// The environment the class was declared in, used for field
    /// initializers and static blocks.
    pub env: Environment,
}

impl ClassValue {
    /// Walk the inheritance chain for an instance method.
    pub fn find_method(self: &Rc<Self>, name: &str) -> Option<Rc<FunctionValue>> {
        if let Some(method) = self.methods.borrow().get(name) {
            return Some(method.clone());
        }
        self.parent.as_ref()?.find_method(name)
    }

    pub fn find_getter(self: &Rc<Self>, name: &str) -> Option<Rc<FunctionValue>> {
        if let Some(getter) = self.getters.borrow().get(name) {
            return Some(getter.clone());
        }
        self.parent.as_ref()?.find_getter(name)
    }

    pub fn find_setter(self: &Rc<Self>, name: &str) -> Option<Rc<FunctionValue>> {
        if let Some(setter) = self.setters.borrow().get(name) {
            return Some(setter.clone());
        }
        self.parent.as_ref()?.find_setter(name)
    }

    pub fn find_static(self: &Rc<Self>, name: &str) -> Option<Value> {
        if let Some(value) = self.statics.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref()?.find_static(name)
    }

    /// Is `ancestor` reachable through the parent chain (inclusive)?
    pub fn derives_from(self: &Rc<Self>, ancestor: &Rc<ClassValue>) -> bool {
        let mut current = Some(self.clone());
        while let Some(class) = current {
            if Rc::ptr_eq(&class, ancestor) {
                return true;
            }
            current = class.parent.clone();
        }
        false
    }
}

impl fmt::Debug for ClassValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassValue({})", self.name)
    }
}

/// A host-implemented method: name, arity bounds and the native entry point.
pub struct BuiltinMethod {
    pub name: &'static str,
    pub min_arity: usize,
    pub max_arity: Option<usize>,
    /// Bound receiver; `Undefined` for free functions.
    pub this: Value,
    pub func: NativeFn,
    pub ctor: Option<NativeCtor>,
}

/// Constructor behavior for built-ins that support `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCtor {
    Error(ErrorKind),
    Map,
    Set,
    WeakMap,
    WeakSet,
}

impl BuiltinMethod {
    pub fn function(name: &'static str, min_arity: usize, func: NativeFn) -> Value {
        Value::Builtin(Rc::new(BuiltinMethod {
            name,
            min_arity,
            max_arity: None,
            this: Value::Undefined,
            func,
            ctor: None,
        }))
    }

    pub fn bound(name: &'static str, this: Value, func: NativeFn) -> Value {
        Value::Builtin(Rc::new(BuiltinMethod {
            name,
            min_arity: 0,
            max_arity: None,
            this,
            func,
            ctor: None,
        }))
    }
}

impl fmt::Debug for BuiltinMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinMethod({})", self.name)
    }
}

// ---------------------------------------------------------------------------
// errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    UriError,
    EvalError,
    AggregateError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::UriError => "URIError",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::AggregateError => "AggregateError",
        }
    }
}

#[derive(Debug)]
pub struct ErrorData {
    pub kind: ErrorKind,
    pub name: String,
    pub message: String,
    pub stack: String,
    pub extra: IndexMap<String, Value>,
}

impl ErrorData {
    /// `"name: message"`, or just the name when the message is empty.
    pub fn to_display(&self) -> String {
        if self.message.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.message)
        }
    }
}

/// Construct an error value with a captured stack string.
pub fn new_error(kind: ErrorKind, message: impl Into<String>) -> Value {
    let message = message.into();
    let stack = if message.is_empty() {
        format!("{}\n    at <anonymous>", kind.name())
    } else {
        format!("{}: {}\n    at <anonymous>", kind.name(), message)
    };
    Value::Error(Rc::new(RefCell::new(ErrorData {
        kind,
        name: kind.name().to_string(),
        message,
        stack,
        extra: IndexMap::new(),
    })))
}

pub fn throw_type_error(message: impl Into<String>) -> Thrown {
    Thrown(new_error(ErrorKind::TypeError, message))
}

pub fn throw_reference_error(message: impl Into<String>) -> Thrown {
    Thrown(new_error(ErrorKind::ReferenceError, message))
}

pub fn throw_range_error(message: impl Into<String>) -> Thrown {
    Thrown(new_error(ErrorKind::RangeError, message))
}

// ---------------------------------------------------------------------------
// collections
// ---------------------------------------------------------------------------

/// Insertion-ordered map keyed by strict equality.
#[derive(Debug, Default)]
pub struct MapData {
    pub entries: Vec<(Value, Value)>,
}

#[derive(Debug, Default)]
pub struct SetData {
    pub entries: Vec<Value>,
}

/// Identity-keyed map; keys must be objects.
#[derive(Debug, Default)]
pub struct WeakMapData {
    pub entries: Vec<(Value, Value)>,
}

#[derive(Debug, Default)]
pub struct WeakSetData {
    pub entries: Vec<Value>,
}

#[derive(Debug)]
pub struct RegexValue {
    pub pattern: String,
    pub flags: String,
}

// ---------------------------------------------------------------------------
// suspension state
// ---------------------------------------------------------------------------

/// A paused generator: the suspended frame keeps the local environment,
/// operand stack, instruction cursor and try-handler stack alive between
/// resumptions.
pub struct GeneratorState {
    pub frame: Option<Frame>,
    pub done: bool,
    pub is_async: bool,
}

impl fmt::Debug for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GeneratorState(done: {})", self.done)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

impl PartialEq for Value {
    /// Structural identity for internal bookkeeping only; user-visible
    /// equality lives in `operations::strict_equals`.
    fn eq(&self, other: &Self) -> bool {
        super::operations::strict_equals(self, other)
    }
}

pub struct PromiseData {
    pub status: PromiseStatus,
    /// Async tasks to resume, in registration order, when this settles.
    pub reactions: Vec<Rc<RefCell<AsyncTask>>>,
}

impl PromiseData {
    pub fn pending() -> Rc<RefCell<PromiseData>> {
        Rc::new(RefCell::new(PromiseData {
            status: PromiseStatus::Pending,
            reactions: vec![],
        }))
    }

    pub fn fulfilled(value: Value) -> Rc<RefCell<PromiseData>> {
        Rc::new(RefCell::new(PromiseData {
            status: PromiseStatus::Fulfilled(value),
            reactions: vec![],
        }))
    }
}

impl fmt::Debug for PromiseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            PromiseStatus::Pending => write!(f, "Promise(pending)"),
            PromiseStatus::Fulfilled(_) => write!(f, "Promise(fulfilled)"),
            PromiseStatus::Rejected(_) => write!(f, "Promise(rejected)"),
        }
    }
}

/// A suspended async function body and the promise it settles. Async
/// generator resumptions carry a back-pointer so the frame returns to the
/// generator when it yields.
pub struct AsyncTask {
    pub frame: Option<Frame>,
    pub promise: Rc<RefCell<PromiseData>>,
    pub generator: Option<Rc<RefCell<GeneratorState>>>,
}

impl fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsyncTask")
    }
}

/// Iteration source for `for-of`, `yield*` and spread.
pub enum NativeIter {
    /// Snapshot iteration over already-materialized values.
    Values { items: Vec<Value>, index: usize },
    /// An object implementing the iterator protocol via `next()`.
    Protocol { target: Value },
    /// A generator object, driven through its resume machinery.
    Generator(Rc<RefCell<GeneratorState>>),
}

impl fmt::Debug for NativeIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeIter::Values { items, index } => {
                write!(f, "NativeIter::Values({index}/{})", items.len())
            }
            NativeIter::Protocol { .. } => write!(f, "NativeIter::Protocol"),
            NativeIter::Generator(_) => write!(f, "NativeIter::Generator"),
        }
    }
}
