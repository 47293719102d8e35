//! Evaluation runtime
//!
//! The runtime provides everything code produced by a front end needs at
//! execution time:
//! - the value model and its operators
//! - memoized thunks
//! - scope chains with shadowing and `with` layers
//! - lazy, possibly self-referential attrset construction
//! - the builtins table
//!
//! A [`Runtime`] owns the configuration and host collaborators (module
//! resolver, debug sink) and hands out root contexts that share one global
//! scope.

pub mod attrset;
pub mod builtins;
pub mod debug;
pub mod lambda;
pub mod merge;
pub mod ops;
pub mod path;
pub mod scope;
pub mod thunk;
pub mod value;

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{EvalError, EvalResult};
use crate::resolver::{ModuleResolver, NoResolver};

pub use attrset::{AttrEntries, AttrMap, AttrPath, Attrset, AttrsetBody};
pub use debug::{DebugSink, MemorySink, TracingSink};
pub use lambda::{param_lambda, pattern_lambda, recursive_strict, Formal, ScopedBody};
pub use merge::disjoint_merge;
pub use path::{base_name_of, dir_of, is_absolute_path, join_paths, normalize_path, to_path};
pub use scope::{let_in, with_expr, EvalCtx, Scope};
pub use thunk::Thunk;
pub use value::{Lambda, Value, ValueType};

/// Maximum number of nested thunk forces before evaluation bails out.
///
/// A chain this deep fits in a 2 MiB thread stack (the default for spawned
/// threads and `cargo test`) in unoptimized builds. Hosts that evaluate on a
/// larger stack can raise [`RuntimeConfig::max_force_depth`] accordingly.
pub const DEFAULT_MAX_FORCE_DEPTH: usize = 200;

/// Builtins that are also reachable without the `builtins.` prefix
pub const DEFAULT_GLOBAL_BUILTINS: &[&str] = &[
    "abort",
    "baseNameOf",
    "derivation",
    "dirOf",
    "fetchGit",
    "fetchTarball",
    "fetchTree",
    "fromTOML",
    "import",
    "isNull",
    "map",
    "placeholder",
    "removeAttrs",
    "throw",
    "toString",
];

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum nesting of thunk forces
    pub max_force_depth: usize,
    /// Builtins promoted into the global scope
    pub global_builtins: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_force_depth: DEFAULT_MAX_FORCE_DEPTH,
            global_builtins: DEFAULT_GLOBAL_BUILTINS
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

/// Shared state of one evaluation
pub struct Runtime {
    config: RuntimeConfig,
    resolver: Rc<dyn ModuleResolver>,
    debug_sink: Rc<dyn DebugSink>,
    /// Built on first use, then shared by every root context
    globals: OnceCell<Rc<AttrMap>>,
    /// Current nesting of thunk forces
    depth: Cell<usize>,
    /// Modules currently being imported, outermost first
    import_stack: RefCell<Vec<String>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    /// Create a runtime with no module resolver and a `tracing` debug sink
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            resolver: Rc::new(NoResolver),
            debug_sink: Rc::new(TracingSink),
            globals: OnceCell::new(),
            depth: Cell::new(0),
            import_stack: RefCell::new(Vec::new()),
        }
    }

    /// Set the resolver used by `import`
    pub fn with_resolver(mut self, resolver: Rc<dyn ModuleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the sink receiving `builtins.trace` output
    pub fn with_debug_sink(mut self, sink: Rc<dyn DebugSink>) -> Self {
        self.debug_sink = sink;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn debug_sink(&self) -> &Rc<dyn DebugSink> {
        &self.debug_sink
    }

    fn globals(self: &Rc<Self>) -> Rc<AttrMap> {
        self.globals
            .get_or_init(|| {
                debug!(
                    promoted = self.config.global_builtins.len(),
                    "building global scope"
                );
                Rc::new(builtins::global_scope(self))
            })
            .clone()
    }

    /// A fresh root context resolving relative paths against `base_dir`
    pub fn root_context(self: &Rc<Self>, base_dir: &str) -> EvalCtx {
        EvalCtx::root(self.clone(), base_dir, self.globals())
    }

    /// Evaluate `module` in a fresh root context
    pub fn evaluate(
        self: &Rc<Self>,
        base_dir: &str,
        module: impl FnOnce(&EvalCtx) -> EvalResult<Value>,
    ) -> EvalResult<Value> {
        module(&self.root_context(base_dir))
    }

    /// Evaluate the module stored at the absolute `path`.
    ///
    /// The module sees a root context whose base directory is the directory
    /// containing it.
    pub fn import(self: &Rc<Self>, path: &str) -> EvalResult<Value> {
        if !is_absolute_path(path) {
            return Err(EvalError::other(
                format!("Cannot import '{}': path is not absolute", path),
                "builtins-import-non-absolute-path",
            ));
        }
        let path = normalize_path(path);

        if self.import_stack.borrow().contains(&path) {
            let mut chain = self.import_stack.borrow().clone();
            chain.push(path);
            return Err(EvalError::other(
                format!("Import cycle detected: {}", chain.join(" -> ")),
                "import-cycle",
            ));
        }

        debug!(path = %path, "importing module");
        let module = self.resolver.resolve(&path)?;
        let ctx = self.root_context(dir_of(&path));

        self.import_stack.borrow_mut().push(path);
        let result = module(&ctx);
        self.import_stack.borrow_mut().pop();
        result
    }

    /// Current nesting of thunk forces
    pub fn force_depth(&self) -> usize {
        self.depth.get()
    }

    /// Run `f` one force level deeper, failing once the configured limit is
    /// reached
    pub(crate) fn enter_force<T>(&self, f: impl FnOnce() -> EvalResult<T>) -> EvalResult<T> {
        let depth = self.depth.get();
        if depth >= self.config.max_force_depth {
            return Err(EvalError::other(
                format!(
                    "Maximum force depth of {} exceeded",
                    self.config.max_force_depth
                ),
                "recursion-limit-exceeded",
            ));
        }
        self.depth.set(depth + 1);
        let result = f();
        self.depth.set(depth);
        result
    }
}
