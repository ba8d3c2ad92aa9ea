// Fibers are cooperatively scheduled: `start` stores the worker
// closure, `join` runs it on the calling thread the first time and
// caches completion. The engine that owns the fiber performs the
// actual invocation; this is only the shared state.

use crate::value::Value;

#[derive(Debug)]
pub struct FiberState {
    /// Pending worker; taken by the engine on first join.
    pub worker: Option<Value>,
    pub completed: bool,
}

impl FiberState {
    pub fn new(worker: Value) -> Self {
        Self {
            worker: Some(worker),
            completed: false,
        }
    }
}
