use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::value::{ClassValue, Value};

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

/// One scope frame. Bindings are insertion-ordered; shadowing an outer
/// binding is only possible by introducing a new scope.
#[derive(Debug)]
pub struct Scope {
    bindings: RefCell<IndexMap<String, Binding>>,
    parent: Option<Environment>,
    strict: Cell<bool>,
    /// The `this` value installed by a function call. Arrow functions never
    /// set it, so lookups fall through to the enclosing scope.
    this: RefCell<Option<Value>>,
    /// The class a method belongs to, for `super` resolution.
    home_class: RefCell<Option<Rc<ClassValue>>>,
}

/// A lexically-scoped environment chain, shared by closures.
#[derive(Debug, Clone)]
pub struct Environment(Rc<Scope>);

/// Outcome of assigning through the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    ConstWrite,
    NotFound,
}

impl Environment {
    pub fn global() -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(IndexMap::new()),
            parent: None,
            strict: Cell::new(false),
            this: RefCell::new(None),
            home_class: RefCell::new(None),
        }))
    }

    pub fn child(&self, strict: bool) -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(IndexMap::new()),
            parent: Some(self.clone()),
            strict: Cell::new(self.0.strict.get() || strict),
            this: RefCell::new(None),
            home_class: RefCell::new(None),
        }))
    }

    pub fn strict(&self) -> bool {
        self.0.strict.get()
    }

    /// Scripts share the global scope; each one's directive prologue sets
    /// the strictness of that scope for the duration of its body.
    pub fn set_strict(&self, strict: bool) {
        self.0.strict.set(strict);
    }

    pub fn parent(&self) -> Option<Environment> {
        self.0.parent.clone()
    }

    /// Create a binding in this scope, shadowing any outer one.
    pub fn define(&self, name: &str, value: Value, mutable: bool) {
        self.0
            .bindings
            .borrow_mut()
            .insert(name.to_owned(), Binding { value, mutable });
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.0.bindings.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.0.parent.as_ref()?.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        if self.0.bindings.borrow().contains_key(name) {
            return true;
        }
        self.0.parent.as_ref().is_some_and(|p| p.has(name))
    }

    /// Assign to the nearest binding with this name.
    pub fn assign(&self, name: &str, value: Value) -> AssignOutcome {
        let mut bindings = self.0.bindings.borrow_mut();
        if let Some(binding) = bindings.get_mut(name) {
            if !binding.mutable {
                return AssignOutcome::ConstWrite;
            }
            binding.value = value;
            return AssignOutcome::Assigned;
        }
        drop(bindings);
        match &self.0.parent {
            Some(parent) => parent.assign(name, value),
            None => AssignOutcome::NotFound,
        }
    }

    pub fn set_this(&self, this: Value) {
        *self.0.this.borrow_mut() = Some(this);
    }

    /// The nearest `this` binding, honoring arrow-function transparency.
    pub fn lookup_this(&self) -> Option<Value> {
        if let Some(this) = self.0.this.borrow().as_ref() {
            return Some(this.clone());
        }
        self.0.parent.as_ref()?.lookup_this()
    }

    pub fn set_home_class(&self, class: Rc<ClassValue>) {
        *self.0.home_class.borrow_mut() = Some(class);
    }

    pub fn lookup_home_class(&self) -> Option<Rc<ClassValue>> {
        if let Some(class) = self.0.home_class.borrow().as_ref() {
            return Some(class.clone());
        }
        self.0.parent.as_ref()?.lookup_home_class()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let env = Environment::global();
        env.define("x", Value::Number(42.0), true);
        assert!(matches!(env.get("x"), Some(Value::Number(n)) if n == 42.0));
        assert!(env.get("y").is_none());
    }

    #[test]
    fn test_shadowing_through_child_scope() {
        let parent = Environment::global();
        parent.define("x", Value::Number(1.0), true);
        let child = parent.child(false);
        child.define("x", Value::Number(2.0), true);

        assert!(matches!(child.get("x"), Some(Value::Number(n)) if n == 2.0));
        assert!(matches!(parent.get("x"), Some(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn test_assign_walks_the_chain() {
        let parent = Environment::global();
        parent.define("x", Value::Number(1.0), true);
        let child = parent.child(false);

        assert_eq!(child.assign("x", Value::Number(5.0)), AssignOutcome::Assigned);
        assert!(matches!(parent.get("x"), Some(Value::Number(n)) if n == 5.0));
        assert_eq!(child.assign("y", Value::Null), AssignOutcome::NotFound);
    }

    #[test]
    fn test_const_binding_rejects_write() {
        let env = Environment::global();
        env.define("c", Value::Bool(true), false);
        assert_eq!(env.assign("c", Value::Bool(false)), AssignOutcome::ConstWrite);
    }

    #[test]
    fn test_strict_flag_inherits() {
        let env = Environment::global();
        let strict = env.child(true);
        let nested = strict.child(false);
        assert!(!env.strict());
        assert!(nested.strict());
    }
}
