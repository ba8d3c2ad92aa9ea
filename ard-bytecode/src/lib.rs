// Bytecode back end: emitter, verifier, stack VM, and the self-framed
// binary program format. Shares the typed IR and runtime values with
// the tree-walking interpreter.

mod emit;
mod opcode;
mod program;
mod serialize;
mod verify;
mod vm;

pub use emit::{emit, EmitError};
pub use opcode::{Op, UnknownOpcode};
pub use program::{Constant, Function, Instruction, Program, TypeEntry};
pub use serialize::{deserialize, serialize, DecodeError, MAGIC, VERSION};
pub use verify::{verify, VerifyError};
pub use vm::{run, run_with_output, Vm};
