// The interpreter's scope chain. Two flags drive unwinding: `broken`
// stops the enclosing executors, and loops own `breakable` scopes that
// absorb a `break`. An early return from `try` stores its value at the
// nearest function-root scope.

use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Scope(Rc<RefCell<ScopeData>>);

#[derive(Debug)]
struct ScopeData {
    vars: HashMap<String, Value>,
    parent: Option<Scope>,
    breakable: bool,
    broken: bool,
    function_root: bool,
    early: Option<Value>,
}

impl Scope {
    pub fn root() -> Scope {
        Scope(Rc::new(RefCell::new(ScopeData {
            vars: HashMap::new(),
            parent: None,
            breakable: false,
            broken: false,
            function_root: true,
            early: None,
        })))
    }

    pub fn child(&self) -> Scope {
        self.child_with(false, false)
    }

    pub fn child_breakable(&self) -> Scope {
        self.child_with(true, false)
    }

    pub fn child_function(&self) -> Scope {
        self.child_with(false, true)
    }

    fn child_with(&self, breakable: bool, function_root: bool) -> Scope {
        Scope(Rc::new(RefCell::new(ScopeData {
            vars: HashMap::new(),
            parent: Some(self.clone()),
            breakable,
            broken: false,
            function_root,
            early: None,
        })))
    }

    pub fn define(&self, name: &str, value: Value) {
        self.0.borrow_mut().vars.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let data = self.0.borrow();
        if let Some(value) = data.vars.get(name) {
            return Some(value.clone());
        }
        data.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Assign to an existing binding somewhere in the chain.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut data = self.0.borrow_mut();
        if let Some(slot) = data.vars.get_mut(name) {
            *slot = value;
            return true;
        }
        match &data.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }

    pub fn broken(&self) -> bool {
        self.0.borrow().broken
    }

    fn clear_broken(&self) {
        self.0.borrow_mut().broken = false;
    }

    /// `break`: mark every scope up to and including the nearest
    /// breakable one.
    pub fn break_loop(&self) {
        let mut data = self.0.borrow_mut();
        data.broken = true;
        if data.breakable {
            return;
        }
        if let Some(parent) = data.parent.clone() {
            drop(data);
            parent.break_loop();
        }
    }

    /// Early return from `try`: mark every scope up to and including
    /// the function root, which records the value.
    pub fn early_return(&self, value: Value) {
        let mut data = self.0.borrow_mut();
        data.broken = true;
        if data.function_root {
            data.early = Some(value);
            return;
        }
        if let Some(parent) = data.parent.clone() {
            drop(data);
            parent.early_return(value);
        }
    }

    /// Consume a loop-level break: clears this scope's flag so
    /// execution resumes after the loop.
    pub fn consume_break(&self) {
        self.clear_broken();
    }

    /// The early-return value recorded at this function root, if any.
    pub fn take_early(&self) -> Option<Value> {
        self.0.borrow_mut().early.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_lookup_and_shadowing() {
        let root = Scope::root();
        root.define("x", Value::Int(1));
        let inner = root.child();
        assert_eq!(inner.get("x"), Some(Value::Int(1)));
        inner.define("x", Value::Int(2));
        assert_eq!(inner.get("x"), Some(Value::Int(2)));
        assert_eq!(root.get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn assignment_walks_the_chain() {
        let root = Scope::root();
        root.define("x", Value::Int(1));
        let inner = root.child();
        assert!(inner.assign("x", Value::Int(5)));
        assert_eq!(root.get("x"), Some(Value::Int(5)));
        assert!(!inner.assign("missing", Value::Void));
    }

    #[test]
    fn break_stops_at_breakable_scope() {
        let root = Scope::root();
        let loop_scope = root.child_breakable();
        let body = loop_scope.child();
        body.break_loop();
        assert!(body.broken());
        assert!(loop_scope.broken());
        assert!(!root.broken());
        loop_scope.consume_break();
        assert!(!loop_scope.broken());
    }

    #[test]
    fn early_return_reaches_function_root() {
        let root = Scope::root();
        let function = root.child_function();
        let loop_scope = function.child_breakable();
        let body = loop_scope.child();
        body.early_return(Value::Int(9));
        assert!(loop_scope.broken());
        assert!(function.broken());
        assert!(!root.broken());
        assert_eq!(function.take_early(), Some(Value::Int(9)));
    }
}
