// Tree-walking interpreter over the typed IR. Dispatch is on the IR
// node's concrete variant; the specialized operator nodes work on the
// underlying representation with no runtime type tests.

mod interpreter;

pub use interpreter::{interpret, interpret_with_output, Interpreter};
