// Runtime values. Aggregates share storage through Rc; observational
// immutability of `let` bindings comes from the deep copy the checker
// inserts at bind time, not from freezing the storage.

use crate::error::RuntimeError;
use crate::fiber::FiberState;
use crate::scope::Scope;
use ard_checker::ir::{Block, ClosureParam};
use ard_checker::types::{EnumType, Type};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Null sentinel; also the empty case of a Maybe.
    Void,
    List(Rc<RefCell<Vec<Value>>>),
    /// Keys are stored stringified; iteration reconstructs them at the
    /// map's declared key type.
    Map(Rc<RefCell<IndexMap<String, Value>>>),
    Struct {
        name: Rc<str>,
        fields: Rc<RefCell<IndexMap<String, Value>>>,
    },
    Enum {
        def: Rc<EnumType>,
        variant: u8,
    },
    Result {
        ok: bool,
        inner: Box<Value>,
    },
    /// Captured-environment closure used by the tree-walking engine.
    TreeClosure(Rc<TreeClosure>),
    /// Function-index closure used by the bytecode engine.
    FlatClosure(Rc<FlatClosure>),
    Fiber(Rc<RefCell<FiberState>>),
}

#[derive(Debug)]
pub struct TreeClosure {
    pub params: Vec<ClosureParam>,
    pub body: Rc<Block>,
    pub env: Scope,
    /// Names captured from the defining scope. Fiber `start` snapshots
    /// these with a deep copy to isolate the worker.
    pub captures: Vec<String>,
    /// Name of the module-level function this closure wraps, if any;
    /// used by cross-engine bridges (fiber workers).
    pub function_name: Option<String>,
}

#[derive(Debug)]
pub struct FlatClosure {
    pub function: usize,
    pub captures: Vec<Value>,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn structure(name: &str, fields: IndexMap<String, Value>) -> Value {
        Value::Struct {
            name: Rc::from(name),
            fields: Rc::new(RefCell::new(fields)),
        }
    }

    pub fn ok(inner: Value) -> Value {
        Value::Result {
            ok: true,
            inner: Box::new(inner),
        }
    }

    pub fn err(inner: Value) -> Value {
        Value::Result {
            ok: false,
            inner: Box::new(inner),
        }
    }

    /// Structural deep copy. Aggregates get fresh storage; closures
    /// and fibers stay shared handles.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::List(items) => Value::list(
                items.borrow().iter().map(Value::deep_copy).collect(),
            ),
            Value::Map(entries) => Value::Map(Rc::new(RefCell::new(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ))),
            Value::Struct { name, fields } => Value::Struct {
                name: name.clone(),
                fields: Rc::new(RefCell::new(
                    fields
                        .borrow()
                        .iter()
                        .map(|(k, v)| (k.clone(), v.deep_copy()))
                        .collect(),
                )),
            },
            Value::Result { ok, inner } => Value::Result {
                ok: *ok,
                inner: Box::new(inner.deep_copy()),
            },
            other => other.clone(),
        }
    }

    pub fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(RuntimeError::internal(format!(
                "expected Bool, found {}",
                other.kind_name()
            ))),
        }
    }

    pub fn as_int(&self) -> Result<i64, RuntimeError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(RuntimeError::internal(format!(
                "expected Int, found {}",
                other.kind_name()
            ))),
        }
    }

    pub fn as_float(&self) -> Result<f64, RuntimeError> {
        match self {
            Value::Float(f) => Ok(*f),
            other => Err(RuntimeError::internal(format!(
                "expected Float, found {}",
                other.kind_name()
            ))),
        }
    }

    pub fn as_str(&self) -> Result<&str, RuntimeError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(RuntimeError::internal(format!(
                "expected Str, found {}",
                other.kind_name()
            ))),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "Str",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Bool(_) => "Bool",
            Value::Void => "Void",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Struct { .. } => "Struct",
            Value::Enum { .. } => "Enum",
            Value::Result { .. } => "Result",
            Value::TreeClosure(_) | Value::FlatClosure(_) => "Fn",
            Value::Fiber(_) => "Fiber",
        }
    }

    /// Runtime type test used by union dispatch: does this value
    /// inhabit the named type shape?
    pub fn matches_type(&self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Dynamic) => true,
            (Value::Str(_), Type::Str) => true,
            (Value::Int(_), Type::Int) => true,
            (Value::Float(_), Type::Float) => true,
            (Value::Bool(_), Type::Bool) => true,
            (Value::Void, Type::Void) => true,
            (Value::List(_), Type::List(_)) => true,
            (Value::Map(_), Type::Map(_, _)) => true,
            (Value::Struct { name, .. }, Type::Struct(def)) => **name == *def.name,
            (Value::Enum { def, .. }, Type::Enum(expected)) => def.name == expected.name,
            (Value::Result { .. }, Type::Result(_, _)) => true,
            (Value::TreeClosure(_) | Value::FlatClosure(_), Type::Function(_)) => true,
            (Value::Fiber(_), Type::Fiber) => true,
            (_, Type::Maybe(inner)) => {
                matches!(self, Value::Void) || self.matches_type(inner)
            }
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Void, Value::Void) => true,
            (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
            (Value::Map(a), Value::Map(b)) => *a.borrow() == *b.borrow(),
            (
                Value::Struct {
                    name: an,
                    fields: af,
                },
                Value::Struct {
                    name: bn,
                    fields: bf,
                },
            ) => an == bn && *af.borrow() == *bf.borrow(),
            (
                Value::Enum { def: ad, variant: av },
                Value::Enum { def: bd, variant: bv },
            ) => ad.name == bd.name && av == bv,
            (
                Value::Result { ok: ao, inner: ai },
                Value::Result { ok: bo, inner: bi },
            ) => ao == bo && ai == bi,
            _ => false,
        }
    }
}

/// Display follows one convention everywhere: floats print with fixed
/// two-decimal precision, lists and maps print their elements
/// recursively, strings print bare.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:.2}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Void => f.write_str("void"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("[")?;
                for (i, (key, value)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("]")
            }
            Value::Struct { name, fields } => {
                write!(f, "{} {{ ", name)?;
                for (i, (field, value)) in fields.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", field, value)?;
                }
                f.write_str(" }")
            }
            Value::Enum { def, variant } => {
                let name = def
                    .variants
                    .get(*variant as usize)
                    .map(|s| s.as_str())
                    .unwrap_or("?");
                write!(f, "{}::{}", def.name, name)
            }
            Value::Result { ok, inner } => {
                if *ok {
                    write!(f, "ok({})", inner)
                } else {
                    write!(f, "err({})", inner)
                }
            }
            Value::TreeClosure(_) | Value::FlatClosure(_) => f.write_str("<fn>"),
            Value::Fiber(_) => f.write_str("<fiber>"),
        }
    }
}

/// Map keys are stored stringified by display form.
pub fn value_key(value: &Value) -> String {
    value.to_string()
}

/// Reconstruct a map key at the declared key type from its stringified
/// form. Unparseable keys fall back to the string itself.
pub fn map_key_to_value(key: &str, key_type: &Type) -> Value {
    match key_type {
        Type::Int => key
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Str(key.to_string())),
        Type::Float => key
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Str(key.to_string())),
        Type::Bool => match key {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Str(key.to_string()),
        },
        _ => Value::Str(key.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_copy_detaches_lists() {
        let original = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let copy = original.deep_copy();
        if let Value::List(items) = &original {
            items.borrow_mut().push(Value::Int(3));
        }
        if let Value::List(items) = &copy {
            assert_eq!(items.borrow().len(), 2);
        } else {
            panic!("expected list");
        }
    }

    #[test]
    fn deep_copy_detaches_nested_aggregates() {
        let inner = Value::list(vec![Value::Int(1)]);
        let outer = Value::list(vec![inner]);
        let copy = outer.deep_copy();
        if let Value::List(items) = &outer {
            if let Value::List(inner) = &items.borrow()[0] {
                inner.borrow_mut().push(Value::Int(2));
            }
        }
        if let Value::List(items) = &copy {
            if let Value::List(inner) = &items.borrow()[0] {
                assert_eq!(inner.borrow().len(), 1);
            }
        }
    }

    #[test]
    fn float_display_uses_two_decimals() {
        assert_eq!(Value::Float(1.5).to_string(), "1.50");
        assert_eq!(Value::Float(2.0).to_string(), "2.00");
    }

    #[test]
    fn map_keys_round_trip_through_strings() {
        let key = value_key(&Value::Int(42));
        assert_eq!(key, "42");
        assert_eq!(map_key_to_value(&key, &Type::Int), Value::Int(42));
    }

    #[test]
    fn structural_equality() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Int(1)]);
        assert_eq!(a, b);
        assert_ne!(a, Value::list(vec![Value::Int(2)]));
    }
}
