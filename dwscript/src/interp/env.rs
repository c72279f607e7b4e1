//! Environment for variable bindings
//!
//! Names are stored normalized; lookups are case-insensitive like the language.

use super::Value;
use crate::util::normalize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Shared reference to an environment
pub type EnvRef = Rc<RefCell<Environment>>;

/// Environment holding variable bindings
#[derive(Clone, Default)]
pub struct Environment {
    /// Variable bindings in this scope
    bindings: HashMap<String, Value>,
    /// Parent environment for lexical scoping
    parent: Option<EnvRef>,
}

impl Environment {
    /// Create a new global environment
    pub fn new() -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: None,
        }
    }

    /// Create a new environment with a parent
    pub fn with_parent(parent: EnvRef) -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Wrap in Rc<RefCell<>>
    pub fn into_ref(self) -> EnvRef {
        Rc::new(RefCell::new(self))
    }

    pub fn parent(&self) -> Option<&EnvRef> {
        self.parent.as_ref()
    }

    /// Define (or redefine) a variable in the current scope
    pub fn define(&mut self, name: &str, value: Value) {
        self.bindings.insert(normalize(name), value);
    }

    /// Look up a variable in the scope chain
    pub fn get(&self, name: &str) -> Option<Value> {
        self.get_normalized(&normalize(name))
    }

    fn get_normalized(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.bindings.get(key) {
            Some(value.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().get_normalized(key)
        } else {
            None
        }
    }

    /// Look up a variable in this scope only
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.bindings.get(&normalize(name)).cloned()
    }

    /// Rebind an existing variable somewhere in the scope chain
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        self.set_normalized(normalize(name), value)
    }

    fn set_normalized(&mut self, key: String, value: Value) -> bool {
        if let Some(slot) = self.bindings.get_mut(&key) {
            *slot = value;
            true
        } else if let Some(parent) = &self.parent {
            parent.borrow_mut().set_normalized(key, value)
        } else {
            false
        }
    }

    /// Check if a variable exists in the scope chain
    pub fn contains(&self, name: &str) -> bool {
        let key = normalize(name);
        self.contains_normalized(&key)
    }

    fn contains_normalized(&self, key: &str) -> bool {
        if self.bindings.contains_key(key) {
            true
        } else if let Some(parent) = &self.parent {
            parent.borrow().contains_normalized(key)
        } else {
            false
        }
    }

    /// Every visible name, innermost scope first (for suggestions)
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.keys().cloned().collect();
        if let Some(parent) = &self.parent {
            names.extend(parent.borrow().visible_names());
        }
        names
    }

    /// Get all bindings (for debugging)
    pub fn bindings(&self) -> &HashMap<String, Value> {
        &self.bindings
    }
}

// Bindings can hold closures over this very scope; print names only.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Create a child environment from a parent reference
pub fn child_env(parent: &EnvRef) -> EnvRef {
    Environment::with_parent(Rc::clone(parent)).into_ref()
}

/// The scope in the chain that actually binds `name`
pub fn find_owner(env: &EnvRef, name: &str) -> Option<EnvRef> {
    let key = normalize(name);
    let mut current = Some(Rc::clone(env));
    while let Some(scope) = current {
        if scope.borrow().bindings.contains_key(&key) {
            return Some(scope);
        }
        current = scope.borrow().parent.clone();
    }
    None
}
