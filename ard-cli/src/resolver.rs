// Filesystem module resolver: `use some/pkg` maps to
// `<base>/some/pkg.ard` relative to the importing file. Modules are
// parsed and checked once, cached, and cyclic imports are a hard
// error.

use ard_checker::ir::Module;
use ard_checker::{ModuleResolver, ResolveError};
use log::debug;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub struct FsResolver {
    base: PathBuf,
    cache: RefCell<HashMap<String, Rc<Module>>>,
    in_progress: RefCell<HashSet<String>>,
}

impl FsResolver {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
            cache: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
        }
    }
}

impl ModuleResolver for FsResolver {
    fn resolve(&self, path: &str) -> Result<Rc<Module>, ResolveError> {
        if let Some(module) = self.cache.borrow().get(path) {
            return Ok(module.clone());
        }
        if self.in_progress.borrow().contains(path) {
            return Err(ResolveError::Cyclic(path.to_string()));
        }

        let file = self.base.join(format!("{}.ard", path));
        let source = std::fs::read_to_string(&file)
            .map_err(|_| ResolveError::NotFound(path.to_string()))?;
        debug!("resolving module {} from {}", path, file.display());

        self.in_progress.borrow_mut().insert(path.to_string());
        let parsed = ard_parser::parse(&source);
        if !parsed.errors.is_empty() {
            self.in_progress.borrow_mut().remove(path);
            return Err(ResolveError::Failed {
                path: path.to_string(),
                reason: format!("{} syntax error(s)", parsed.errors.len()),
            });
        }
        let result = ard_checker::check(&parsed.program, self, &file.display().to_string());
        self.in_progress.borrow_mut().remove(path);

        if let Some(first) = result.diagnostics.iter().find(|d| d.is_error()) {
            return Err(ResolveError::Failed {
                path: path.to_string(),
                reason: first.message.clone(),
            });
        }
        let module = result.module.ok_or_else(|| ResolveError::Failed {
            path: path.to_string(),
            reason: "checker produced no module".to_string(),
        })?;
        self.cache
            .borrow_mut()
            .insert(path.to_string(), module.clone());
        Ok(module)
    }
}
