// Builtin package implementations and builtin method dispatch. Both
// engines call into these; `ard/async` is handled by the engines
// themselves because running a worker needs an evaluator.

use crate::error::RuntimeError;
use crate::value::{value_key, Value};
use indexmap::IndexMap;
use log::trace;
use std::io::{BufRead, Write};

/// Dispatch a builtin package call. `ard/http` and `ard/sqlite` are
/// external collaborators and report unavailable.
pub fn call_builtin_package(
    path: &str,
    function: &str,
    args: &[Value],
    out: &mut dyn Write,
) -> Result<Value, RuntimeError> {
    trace!("builtin call {}::{}", path, function);
    match (path, function) {
        ("ard/io", "print") => {
            let value = args.first().cloned().unwrap_or(Value::Void);
            writeln!(out, "{}", value)
                .map_err(|e| RuntimeError::internal(format!("io::print failed: {}", e)))?;
            Ok(Value::Void)
        }
        ("ard/io", "read_line") => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| RuntimeError::fault(format!("io::read_line failed: {}", e)))?;
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            Ok(Value::Str(line))
        }
        ("ard/json", "encode") => {
            let value = args.first().cloned().unwrap_or(Value::Void);
            match value_to_json(&value) {
                Ok(json) => Ok(Value::ok(Value::Str(json.to_string()))),
                Err(message) => Ok(Value::err(Value::Str(message))),
            }
        }
        ("ard/json", "decode") => {
            let text = args.first().map(|v| v.as_str()).transpose()?.unwrap_or("");
            match serde_json::from_str::<serde_json::Value>(text) {
                Ok(json) => Ok(Value::ok(json_to_value(&json))),
                Err(error) => Ok(Value::err(Value::Str(error.to_string()))),
            }
        }
        ("ard/http", _) | ("ard/sqlite", _) => {
            Err(RuntimeError::PackageUnavailable(path.to_string()))
        }
        _ => Err(RuntimeError::internal(format!(
            "unknown builtin {}::{}",
            path, function
        ))),
    }
}

fn value_to_json(value: &Value) -> Result<serde_json::Value, String> {
    use serde_json::Value as Json;
    Ok(match value {
        Value::Str(s) => Json::String(s.clone()),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| format!("cannot encode float {}", f))?,
        Value::Bool(b) => Json::Bool(*b),
        Value::Void => Json::Null,
        Value::List(items) => Json::Array(
            items
                .borrow()
                .iter()
                .map(value_to_json)
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(entries) => Json::Object(
            entries
                .borrow()
                .iter()
                .map(|(k, v)| value_to_json(v).map(|v| (k.clone(), v)))
                .collect::<Result<_, _>>()?,
        ),
        Value::Struct { fields, .. } => Json::Object(
            fields
                .borrow()
                .iter()
                .map(|(k, v)| value_to_json(v).map(|v| (k.clone(), v)))
                .collect::<Result<_, _>>()?,
        ),
        other => return Err(format!("cannot encode a {} as json", other.kind_name())),
    })
}

fn json_to_value(json: &serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::Void,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        Json::Object(entries) => Value::map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        ),
    }
}

/// Builtin method dispatch by receiver shape. Mutating methods write
/// through the receiver's shared storage; the checker has already
/// guaranteed the receiver is a `mut` binding.
pub fn builtin_method_call(
    receiver: &Value,
    method: &str,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match receiver {
        Value::Str(s) => str_method(s, method, args),
        Value::Int(i) => match method {
            "to_str" => Ok(Value::Str(i.to_string())),
            "abs" => Ok(Value::Int(i.wrapping_abs())),
            _ => no_such_method("Int", method),
        },
        Value::Float(f) => match method {
            "to_str" => Ok(Value::Str(format!("{:.2}", f))),
            "floor" => Ok(Value::Int(f.floor() as i64)),
            "ceil" => Ok(Value::Int(f.ceil() as i64)),
            _ => no_such_method("Float", method),
        },
        Value::Bool(b) => match method {
            "to_str" => Ok(Value::Str(b.to_string())),
            _ => no_such_method("Bool", method),
        },
        Value::List(items) => list_method(items, method, args),
        Value::Map(entries) => map_method(entries, method, args),
        // Maybe values are the inner value or Void.
        Value::Void => match method {
            "or" => Ok(args.first().cloned().unwrap_or(Value::Void)),
            "is_some" => Ok(Value::Bool(false)),
            _ => no_such_method("Maybe", method),
        },
        Value::Result { ok, inner } => match method {
            "expect" => {
                if *ok {
                    Ok((**inner).clone())
                } else {
                    let message = args
                        .first()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "expect on err".to_string());
                    Err(RuntimeError::fault(format!("{}: {}", message, inner)))
                }
            }
            "or" => {
                if *ok {
                    Ok((**inner).clone())
                } else {
                    Ok(args.first().cloned().unwrap_or(Value::Void))
                }
            }
            "is_ok" => Ok(Value::Bool(*ok)),
            _ => no_such_method("Result", method),
        },
        // A non-Void receiver typed Maybe at check time.
        other => match method {
            "or" => Ok(other.clone()),
            "is_some" => Ok(Value::Bool(true)),
            _ => no_such_method(other.kind_name(), method),
        },
    }
}

fn str_method(s: &str, method: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match method {
        "size" => Ok(Value::Int(s.chars().count() as i64)),
        "to_str" => Ok(Value::Str(s.to_string())),
        "contains" => {
            let needle = args.first().map(|v| v.as_str()).transpose()?.unwrap_or("");
            Ok(Value::Bool(s.contains(needle)))
        }
        "starts_with" => {
            let prefix = args.first().map(|v| v.as_str()).transpose()?.unwrap_or("");
            Ok(Value::Bool(s.starts_with(prefix)))
        }
        "at" => {
            let index = args.first().map(|v| v.as_int()).transpose()?.unwrap_or(0);
            if index < 0 {
                return Ok(Value::Void);
            }
            Ok(s.chars()
                .nth(index as usize)
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or(Value::Void))
        }
        "split" => {
            let separator = args.first().map(|v| v.as_str()).transpose()?.unwrap_or("");
            let parts: Vec<Value> = if separator.is_empty() {
                s.chars().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(separator)
                    .map(|part| Value::Str(part.to_string()))
                    .collect()
            };
            Ok(Value::list(parts))
        }
        "trim" => Ok(Value::Str(s.trim().to_string())),
        "to_int" => Ok(s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or(Value::Void)),
        _ => no_such_method("Str", method),
    }
}

fn list_method(
    items: &std::rc::Rc<std::cell::RefCell<Vec<Value>>>,
    method: &str,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match method {
        "size" => Ok(Value::Int(items.borrow().len() as i64)),
        "push" => {
            let item = args.first().cloned().unwrap_or(Value::Void);
            items.borrow_mut().push(item);
            Ok(Value::Void)
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Void)),
        "at" => {
            let index = args.first().map(|v| v.as_int()).transpose()?.unwrap_or(0);
            if index < 0 {
                return Ok(Value::Void);
            }
            Ok(items
                .borrow()
                .get(index as usize)
                .cloned()
                .unwrap_or(Value::Void))
        }
        "contains" => {
            let needle = args.first().cloned().unwrap_or(Value::Void);
            Ok(Value::Bool(items.borrow().iter().any(|v| v == &needle)))
        }
        "to_str" => Ok(Value::Str(Value::List(items.clone()).to_string())),
        _ => no_such_method("List", method),
    }
}

fn map_method(
    entries: &std::rc::Rc<std::cell::RefCell<IndexMap<String, Value>>>,
    method: &str,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match method {
        "size" => Ok(Value::Int(entries.borrow().len() as i64)),
        "get" => {
            let key = value_key(&args.first().cloned().unwrap_or(Value::Void));
            Ok(entries.borrow().get(&key).cloned().unwrap_or(Value::Void))
        }
        "set" => {
            let key = value_key(&args.first().cloned().unwrap_or(Value::Void));
            let value = args.get(1).cloned().unwrap_or(Value::Void);
            entries.borrow_mut().insert(key, value);
            Ok(Value::Void)
        }
        "has" => {
            let key = value_key(&args.first().cloned().unwrap_or(Value::Void));
            Ok(Value::Bool(entries.borrow().contains_key(&key)))
        }
        "delete" => {
            let key = value_key(&args.first().cloned().unwrap_or(Value::Void));
            entries.borrow_mut().shift_remove(&key);
            Ok(Value::Void)
        }
        "keys" => Ok(Value::list(
            entries
                .borrow()
                .keys()
                .map(|k| Value::Str(k.clone()))
                .collect(),
        )),
        _ => no_such_method("Map", method),
    }
}

fn no_such_method(kind: &str, method: &str) -> Result<Value, RuntimeError> {
    Err(RuntimeError::internal(format!(
        "{} has no method '{}'",
        kind, method
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_writes_display_form() {
        let mut out = Vec::new();
        call_builtin_package("ard/io", "print", &[Value::Int(7)], &mut out).expect("print");
        assert_eq!(String::from_utf8(out).expect("utf8"), "7\n");
    }

    #[test]
    fn json_round_trip() {
        let mut out = Vec::new();
        let value = Value::list(vec![Value::Int(1), Value::Str("two".into())]);
        let encoded = call_builtin_package("ard/json", "encode", &[value], &mut out)
            .expect("encode");
        let Value::Result { ok: true, inner } = encoded else {
            panic!("expected ok result");
        };
        let decoded =
            call_builtin_package("ard/json", "decode", &[*inner], &mut out).expect("decode");
        let Value::Result { ok: true, inner } = decoded else {
            panic!("expected ok result");
        };
        assert_eq!(
            *inner,
            Value::list(vec![Value::Int(1), Value::Str("two".into())])
        );
    }

    #[test]
    fn json_decode_error_is_an_err_value() {
        let mut out = Vec::new();
        let decoded =
            call_builtin_package("ard/json", "decode", &[Value::Str("{bad".into())], &mut out)
                .expect("call succeeds");
        assert!(matches!(decoded, Value::Result { ok: false, .. }));
    }

    #[test]
    fn http_is_unavailable() {
        let mut out = Vec::new();
        let error = call_builtin_package("ard/http", "get", &[], &mut out).unwrap_err();
        assert!(matches!(error, RuntimeError::PackageUnavailable(_)));
    }

    #[test]
    fn list_methods() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        if let Value::List(items) = &list {
            builtin_method_call(&list, "push", &[Value::Int(4)]).expect("push");
            assert_eq!(items.borrow().len(), 4);
        }
        assert_eq!(
            builtin_method_call(&list, "size", &[]).expect("size"),
            Value::Int(4)
        );
        assert_eq!(
            builtin_method_call(&list, "at", &[Value::Int(9)]).expect("at"),
            Value::Void
        );
    }

    #[test]
    fn maybe_methods_on_sentinel() {
        assert_eq!(
            builtin_method_call(&Value::Void, "or", &[Value::Int(5)]).expect("or"),
            Value::Int(5)
        );
        assert_eq!(
            builtin_method_call(&Value::Int(2), "or", &[Value::Int(5)]).expect("or"),
            Value::Int(2)
        );
    }

    #[test]
    fn result_expect() {
        let ok = Value::ok(Value::Int(1));
        assert_eq!(
            builtin_method_call(&ok, "expect", &[Value::Str("m".into())]).expect("expect"),
            Value::Int(1)
        );
        let err = Value::err(Value::Str("bad".into()));
        assert!(builtin_method_call(&err, "expect", &[Value::Str("m".into())]).is_err());
    }
}
