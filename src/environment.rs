use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindingError {
    #[error("Undefined variable '{0}'")]
    Undefined(String),

    #[error("Cannot assign to constant '{0}'")]
    ConstantReassignment(String),

    #[error("Constant '{0}' is already defined in this scope")]
    ConstantRedefinition(String),
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub constant: bool,
}

/// One scope in the chain. Scopes are shared through `Rc<RefCell<_>>` so a
/// closure keeps its defining scope alive after the call that created it.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Binding>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Self {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Convenience for creating a fresh child scope already wrapped for sharing.
    pub fn child_of(enclosing: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Self::with_enclosing(Rc::clone(enclosing))))
    }

    /// Binds `name` in this scope only, replacing a mutable binding of the same name.
    pub fn define(&mut self, name: &str, value: Value, constant: bool) -> Result<(), BindingError> {
        if let Some(existing) = self.values.get(name) {
            if existing.constant {
                return Err(BindingError::ConstantRedefinition(name.to_string()));
            }
        }

        self.values
            .insert(name.to_string(), Binding { value, constant });
        Ok(())
    }

    /// Looks `name` up here, then outward through the enclosing scopes.
    pub fn get(&self, name: &str) -> Result<Value, BindingError> {
        if let Some(binding) = self.values.get(name) {
            Ok(binding.value.clone())
        } else if let Some(ref enclosing) = self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(BindingError::Undefined(name.to_string()))
        }
    }

    /// Whether the innermost binding of `name` is constant, if there is one.
    pub fn is_constant(&self, name: &str) -> Option<bool> {
        if let Some(binding) = self.values.get(name) {
            Some(binding.constant)
        } else if let Some(ref enclosing) = self.enclosing {
            enclosing.borrow().is_constant(name)
        } else {
            None
        }
    }

    /// Names bound directly in this scope (not its parents).
    pub fn contains_local(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Rebinds the innermost existing `name`; never creates a binding.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), BindingError> {
        if let Some(binding) = self.values.get_mut(name) {
            if binding.constant {
                return Err(BindingError::ConstantReassignment(name.to_string()));
            }
            binding.value = value;
            Ok(())
        } else if let Some(ref enclosing) = self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(BindingError::Undefined(name.to_string()))
        }
    }
}
