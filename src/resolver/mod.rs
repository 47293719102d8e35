//! Module resolution for `import`
//!
//! The runtime never touches the file system itself. `import <path>` asks a
//! [`ModuleResolver`] for the module stored at an absolute, normalized path;
//! the runtime then evaluates that module in a fresh root context whose base
//! directory is the module's directory.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::{EvalError, EvalResult};
use crate::evaluator::path::normalize_path;
use crate::evaluator::{EvalCtx, Value};

/// A loaded module: evaluates to a value given its root context
pub type Module = Rc<dyn Fn(&EvalCtx) -> EvalResult<Value>>;

/// Finds the module stored at a path
pub trait ModuleResolver {
    /// Resolve an absolute, normalized path to a module
    fn resolve(&self, path: &str) -> EvalResult<Module>;
}

/// Resolver used when the host provides none; every import fails
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

impl ModuleResolver for NoResolver {
    fn resolve(&self, _path: &str) -> EvalResult<Module> {
        Err(EvalError::unimplemented("import"))
    }
}

/// A resolver over in-memory modules
#[derive(Default)]
pub struct VirtualResolver {
    modules: RefCell<HashMap<String, Module>>,
}

impl VirtualResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `path`
    pub fn add_module(
        &self,
        path: &str,
        module: impl Fn(&EvalCtx) -> EvalResult<Value> + 'static,
    ) {
        self.modules
            .borrow_mut()
            .insert(normalize_path(path), Rc::new(module));
    }

    /// Register a module that evaluates to a fixed value
    pub fn add_value(&self, path: &str, value: Value) {
        self.add_module(path, move |_| Ok(value.clone()));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.modules.borrow().contains_key(&normalize_path(path))
    }
}

impl ModuleResolver for VirtualResolver {
    fn resolve(&self, path: &str) -> EvalResult<Module> {
        self.modules
            .borrow()
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| {
                EvalError::other(
                    format!("Cannot import '{}': no such module", path),
                    "import-not-found",
                )
            })
    }
}
