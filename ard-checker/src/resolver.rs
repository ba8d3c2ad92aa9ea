// Module resolution is injected: the checker asks for `Module`s by
// import path and stays ignorant of how paths map to files. Builtin
// packages never reach the resolver.

use crate::ir::Module;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Module not found: {0}")]
    NotFound(String),
    #[error("Cyclic import: {0}")]
    Cyclic(String),
    #[error("Module '{path}' failed to check: {reason}")]
    Failed { path: String, reason: String },
}

pub trait ModuleResolver {
    fn resolve(&self, path: &str) -> Result<Rc<Module>, ResolveError>;
}

/// Resolver for single-file programs: every import fails.
pub struct NullResolver;

impl ModuleResolver for NullResolver {
    fn resolve(&self, path: &str) -> Result<Rc<Module>, ResolveError> {
        Err(ResolveError::NotFound(path.to_string()))
    }
}
