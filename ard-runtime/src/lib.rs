// Shared runtime for both execution engines: the value representation,
// the scope chain, builtin package implementations, and fibers.

mod builtins;
mod error;
mod fiber;
mod scope;
mod value;

pub use builtins::{builtin_method_call, call_builtin_package};
pub use error::RuntimeError;
pub use fiber::FiberState;
pub use scope::Scope;
pub use value::{map_key_to_value, value_key, FlatClosure, TreeClosure, Value};
