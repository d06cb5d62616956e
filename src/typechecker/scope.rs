use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::types::Type;

#[derive(Debug, Clone)]
pub struct Variable {
    pub ty: Type,
    pub is_mutable: bool,
}

#[derive(Default, Debug)]
struct ScopeFrame {
    variables: HashMap<String, Variable>,
    type_defs: HashMap<String, Type>,
}

type ScopeFrameReference = Rc<RefCell<ScopeFrame>>;

/// Scope stack for the checker: identifier types and named type
/// definitions, innermost frame last.
#[derive(Default, Debug, Clone)]
pub struct TypeScope {
    scope_stack: Vec<ScopeFrameReference>,
}

impl TypeScope {
    pub fn new() -> Self {
        let mut scope = TypeScope::default();
        scope.push();
        scope
    }

    pub fn push(&mut self) {
        self.scope_stack.push(ScopeFrameReference::default());
    }

    pub fn pop(&mut self) {
        self.scope_stack.pop();
    }

    /// Find a variable by walking the scopes from innermost to outermost.
    pub fn find_variable(&self, name: &str) -> Option<Variable> {
        for scope in self.scope_stack.iter().rev() {
            if let Some(variable) = scope.borrow().variables.get(name) {
                return Some(variable.clone());
            }
        }
        None
    }

    pub fn contains_in_current_scope(&self, name: &str) -> bool {
        let Some(last) = self.scope_stack.last() else {
            return false;
        };
        last.borrow().variables.contains_key(name)
    }

    pub fn set_variable(&mut self, name: &str, ty: Type, is_mutable: bool) {
        if let Some(scope) = self.scope_stack.last() {
            scope
                .borrow_mut()
                .variables
                .insert(name.to_owned(), Variable { ty, is_mutable });
        }
    }

    pub fn add_type_def(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scope_stack.last() {
            scope.borrow_mut().type_defs.insert(name.to_owned(), ty);
        }
    }

    pub fn get_type_def(&self, name: &str) -> Option<Type> {
        for scope in self.scope_stack.iter().rev() {
            if let Some(ty) = scope.borrow().type_defs.get(name) {
                return Some(ty.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_shadowing_needs_a_new_frame() {
        let mut scope = TypeScope::new();
        scope.set_variable("x", Type::Number, true);
        scope.push();
        scope.set_variable("x", Type::String, true);
        assert!(matches!(scope.find_variable("x"), Some(Variable { ty: Type::String, .. })));
        scope.pop();
        assert!(matches!(scope.find_variable("x"), Some(Variable { ty: Type::Number, .. })));
    }

    #[test]
    fn test_type_defs_resolve_through_the_stack() {
        let mut scope = TypeScope::new();
        scope.add_type_def("ID", Type::Number);
        scope.push();
        assert_eq!(scope.get_type_def("ID"), Some(Type::Number));
    }
}
