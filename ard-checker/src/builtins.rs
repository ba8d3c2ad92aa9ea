// Contracts for builtin packages and builtin methods. The checker
// types calls against these signatures; the runtime provides the
// implementations (or reports a package unavailable).

use crate::ir::Symbol;
use crate::types::{FunctionType, ParamType, Type};
use indexmap::IndexMap;
use std::rc::Rc;

pub const BUILTIN_PACKAGES: &[&str] = &["ard/io", "ard/json", "ard/async", "ard/http", "ard/sqlite"];

pub fn is_builtin_package(path: &str) -> bool {
    BUILTIN_PACKAGES.contains(&path)
}

fn sig(name: &str, params: Vec<(&str, Type)>, ret: Type) -> Symbol {
    let params = params
        .into_iter()
        .map(|(n, ty)| ParamType {
            name: n.to_string(),
            ty,
            mutable: false,
        })
        .collect();
    Symbol {
        ty: Type::Function(Rc::new(FunctionType::new(name, params, ret))),
        public: true,
    }
}

/// Symbol table of a builtin package.
pub fn builtin_package_symbols(path: &str) -> Option<IndexMap<String, Symbol>> {
    let mut symbols = IndexMap::new();
    match path {
        "ard/io" => {
            symbols.insert(
                "print".to_string(),
                sig("print", vec![("value", Type::Dynamic)], Type::Void),
            );
            symbols.insert("read_line".to_string(), sig("read_line", vec![], Type::Str));
        }
        "ard/json" => {
            symbols.insert(
                "encode".to_string(),
                sig(
                    "encode",
                    vec![("value", Type::Dynamic)],
                    Type::Result(Box::new(Type::Str), Box::new(Type::Str)),
                ),
            );
            symbols.insert(
                "decode".to_string(),
                sig(
                    "decode",
                    vec![("text", Type::Str)],
                    Type::Result(Box::new(Type::Dynamic), Box::new(Type::Str)),
                ),
            );
        }
        "ard/async" => {
            symbols.insert(
                "start".to_string(),
                sig(
                    "start",
                    vec![(
                        "worker",
                        Type::Function(Rc::new(FunctionType::new("worker", vec![], Type::Void))),
                    )],
                    Type::Fiber,
                ),
            );
        }
        // External collaborators: calls type as Dynamic results; the
        // runtime reports them unavailable.
        "ard/http" => {
            symbols.insert(
                "get".to_string(),
                sig(
                    "get",
                    vec![("url", Type::Str)],
                    Type::Result(Box::new(Type::Dynamic), Box::new(Type::Str)),
                ),
            );
            symbols.insert(
                "post".to_string(),
                sig(
                    "post",
                    vec![("url", Type::Str), ("body", Type::Dynamic)],
                    Type::Result(Box::new(Type::Dynamic), Box::new(Type::Str)),
                ),
            );
        }
        "ard/sqlite" => {
            symbols.insert(
                "open".to_string(),
                sig(
                    "open",
                    vec![("path", Type::Str)],
                    Type::Result(Box::new(Type::Dynamic), Box::new(Type::Str)),
                ),
            );
            symbols.insert(
                "query".to_string(),
                sig(
                    "query",
                    vec![("db", Type::Dynamic), ("sql", Type::Str)],
                    Type::Result(
                        Box::new(Type::List(Box::new(Type::Dynamic))),
                        Box::new(Type::Str),
                    ),
                ),
            );
            symbols.insert(
                "execute".to_string(),
                sig(
                    "execute",
                    vec![("db", Type::Dynamic), ("sql", Type::Str)],
                    Type::Result(Box::new(Type::Void), Box::new(Type::Str)),
                ),
            );
        }
        _ => return None,
    }
    Some(symbols)
}

fn method(name: &str, params: Vec<(&str, Type)>, ret: Type, mutates: bool) -> Rc<FunctionType> {
    let params = params
        .into_iter()
        .map(|(n, ty)| ParamType {
            name: n.to_string(),
            ty,
            mutable: false,
        })
        .collect();
    Rc::new(FunctionType {
        name: name.to_string(),
        type_params: Vec::new(),
        params,
        return_type: ret,
        mutates,
    })
}

/// Builtin method signature for a receiver type, instantiated at the
/// receiver's concrete element types.
pub fn builtin_method(receiver: &Type, name: &str) -> Option<Rc<FunctionType>> {
    match receiver {
        Type::Str => match name {
            "size" => Some(method("size", vec![], Type::Int, false)),
            "to_str" => Some(method("to_str", vec![], Type::Str, false)),
            "contains" => Some(method("contains", vec![("needle", Type::Str)], Type::Bool, false)),
            "starts_with" => Some(method(
                "starts_with",
                vec![("prefix", Type::Str)],
                Type::Bool,
                false,
            )),
            "at" => Some(method(
                "at",
                vec![("index", Type::Int)],
                Type::Maybe(Box::new(Type::Str)),
                false,
            )),
            "split" => Some(method(
                "split",
                vec![("separator", Type::Str)],
                Type::List(Box::new(Type::Str)),
                false,
            )),
            "trim" => Some(method("trim", vec![], Type::Str, false)),
            "to_int" => Some(method("to_int", vec![], Type::Maybe(Box::new(Type::Int)), false)),
            _ => None,
        },
        Type::Int => match name {
            "to_str" => Some(method("to_str", vec![], Type::Str, false)),
            "abs" => Some(method("abs", vec![], Type::Int, false)),
            _ => None,
        },
        Type::Float => match name {
            // Fixed two-decimal convention; see runtime value display.
            "to_str" => Some(method("to_str", vec![], Type::Str, false)),
            "floor" => Some(method("floor", vec![], Type::Int, false)),
            "ceil" => Some(method("ceil", vec![], Type::Int, false)),
            _ => None,
        },
        Type::Bool => match name {
            "to_str" => Some(method("to_str", vec![], Type::Str, false)),
            _ => None,
        },
        Type::List(item) => {
            let item = (**item).clone();
            match name {
                "size" => Some(method("size", vec![], Type::Int, false)),
                "push" => Some(method("push", vec![("item", item)], Type::Void, true)),
                "pop" => Some(method("pop", vec![], Type::Maybe(Box::new(item)), true)),
                "at" => Some(method(
                    "at",
                    vec![("index", Type::Int)],
                    Type::Maybe(Box::new(item)),
                    false,
                )),
                "contains" if item.is_equatable() => {
                    Some(method("contains", vec![("item", item)], Type::Bool, false))
                }
                "to_str" => Some(method("to_str", vec![], Type::Str, false)),
                _ => None,
            }
        }
        Type::Map(key, value) => {
            let key = (**key).clone();
            let value = (**value).clone();
            match name {
                "size" => Some(method("size", vec![], Type::Int, false)),
                "get" => Some(method(
                    "get",
                    vec![("key", key)],
                    Type::Maybe(Box::new(value)),
                    false,
                )),
                "set" => Some(method(
                    "set",
                    vec![("key", key), ("value", value)],
                    Type::Void,
                    true,
                )),
                "has" => Some(method("has", vec![("key", key)], Type::Bool, false)),
                "delete" => Some(method("delete", vec![("key", key)], Type::Void, true)),
                // Keys are stored stringified; iteration reconstructs
                // typed keys, the method exposes the stored form.
                "keys" => Some(method("keys", vec![], Type::List(Box::new(Type::Str)), false)),
                _ => None,
            }
        }
        Type::Maybe(inner) => {
            let inner = (**inner).clone();
            match name {
                "or" => Some(method("or", vec![("fallback", inner.clone())], inner, false)),
                "is_some" => Some(method("is_some", vec![], Type::Bool, false)),
                _ => None,
            }
        }
        Type::Result(ok, _) => {
            let ok = (**ok).clone();
            match name {
                "expect" => Some(method("expect", vec![("message", Type::Str)], ok, false)),
                "or" => Some(method("or", vec![("fallback", ok.clone())], ok, false)),
                "is_ok" => Some(method("is_ok", vec![], Type::Bool, false)),
                _ => None,
            }
        }
        Type::Fiber => match name {
            "join" => Some(method("join", vec![], Type::Void, false)),
            _ => None,
        },
        // Untyped data supports any call at Dynamic.
        Type::Dynamic => Some(method(name, vec![], Type::Dynamic, false)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_contract() {
        let io = builtin_package_symbols("ard/io").expect("ard/io");
        assert!(io.contains_key("print"));
        assert!(io.contains_key("read_line"));
        assert!(builtin_package_symbols("ard/nope").is_none());
    }

    #[test]
    fn list_methods_are_instantiated() {
        let list = Type::List(Box::new(Type::Int));
        let push = builtin_method(&list, "push").expect("push");
        assert!(push.mutates);
        assert_eq!(push.params[0].ty, Type::Int);
        let pop = builtin_method(&list, "pop").expect("pop");
        assert_eq!(pop.return_type, Type::Maybe(Box::new(Type::Int)));
    }

    #[test]
    fn mutating_methods_are_marked() {
        let map = Type::Map(Box::new(Type::Str), Box::new(Type::Int));
        assert!(builtin_method(&map, "set").expect("set").mutates);
        assert!(!builtin_method(&map, "get").expect("get").mutates);
    }
}
