//! Variable scoping
//!
//! An [`EvalCtx`] carries two chains of scope layers:
//! - the shadowing chain (let bindings, function parameters, `rec` self
//!   binding, globals), where the innermost layer wins
//! - the non-shadowing chain (`with` namespaces), consulted only after every
//!   shadowing layer failed
//!
//! Contexts are immutable; adding a layer returns a new context that shares
//! the rest of the chain.

use std::fmt;
use std::rc::Rc;

use crate::errors::{EvalError, EvalResult};

use super::attrset::{AttrMap, Attrset};
use super::value::{Value, ValueType};
use super::Runtime;

/// Anything that can answer a variable lookup
pub trait Scope {
    /// Look up `name`, returning `None` when this scope does not bind it
    fn lookup(&self, name: &str) -> EvalResult<Option<Value>>;
}

impl Scope for AttrMap {
    fn lookup(&self, name: &str) -> EvalResult<Option<Value>> {
        Ok(self.get(name).cloned())
    }
}

impl Scope for Attrset {
    fn lookup(&self, name: &str) -> EvalResult<Option<Value>> {
        self.get(name)
    }
}

/// A `with` namespace. The value is forced, and must be an attrset, only when
/// a lookup actually reaches it.
struct Namespace(Value);

impl Scope for Namespace {
    fn lookup(&self, name: &str) -> EvalResult<Option<Value>> {
        match self.0.to_strict()? {
            Value::Attrset(attrs) => attrs.get(name),
            other => Err(EvalError::type_mismatch(
                vec![ValueType::Set],
                other.type_of()?,
            )),
        }
    }
}

/// One layer of a scope chain
struct ScopeLayer {
    scope: Rc<dyn Scope>,
    parent: Option<Rc<ScopeLayer>>,
}

fn lookup_chain(mut layer: Option<&Rc<ScopeLayer>>, name: &str) -> EvalResult<Option<Value>> {
    while let Some(current) = layer {
        if let Some(value) = current.scope.lookup(name)? {
            return Ok(Some(value));
        }
        layer = current.parent.as_ref();
    }
    Ok(None)
}

struct CtxInner {
    runtime: Rc<Runtime>,
    base_dir: Rc<str>,
    shadowing: Option<Rc<ScopeLayer>>,
    non_shadowing: Option<Rc<ScopeLayer>>,
}

/// Immutable evaluation context
#[derive(Clone)]
pub struct EvalCtx(Rc<CtxInner>);

impl EvalCtx {
    /// A context whose only scope is `globals`
    pub(crate) fn root(
        runtime: Rc<Runtime>,
        base_dir: impl Into<Rc<str>>,
        globals: Rc<dyn Scope>,
    ) -> Self {
        EvalCtx(Rc::new(CtxInner {
            runtime,
            base_dir: base_dir.into(),
            shadowing: Some(Rc::new(ScopeLayer {
                scope: globals,
                parent: None,
            })),
            non_shadowing: None,
        }))
    }

    /// Directory relative paths are resolved against
    pub fn base_dir(&self) -> &str {
        &self.0.base_dir
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.0.runtime
    }

    /// New context where `scope` shadows every existing binding
    pub fn with_shadowing_scope(&self, scope: Rc<dyn Scope>) -> EvalCtx {
        EvalCtx(Rc::new(CtxInner {
            runtime: self.0.runtime.clone(),
            base_dir: self.0.base_dir.clone(),
            shadowing: Some(Rc::new(ScopeLayer {
                scope,
                parent: self.0.shadowing.clone(),
            })),
            non_shadowing: self.0.non_shadowing.clone(),
        }))
    }

    /// New context where `scope` is consulted only after all shadowing scopes,
    /// but before outer non-shadowing scopes
    pub fn with_non_shadowing_scope(&self, scope: Rc<dyn Scope>) -> EvalCtx {
        EvalCtx(Rc::new(CtxInner {
            runtime: self.0.runtime.clone(),
            base_dir: self.0.base_dir.clone(),
            shadowing: self.0.shadowing.clone(),
            non_shadowing: Some(Rc::new(ScopeLayer {
                scope,
                parent: self.0.non_shadowing.clone(),
            })),
        }))
    }

    /// Look up a variable, returning `None` when no scope binds it
    pub fn try_lookup(&self, name: &str) -> EvalResult<Option<Value>> {
        if let Some(value) = lookup_chain(self.0.shadowing.as_ref(), name)? {
            return Ok(Some(value));
        }
        lookup_chain(self.0.non_shadowing.as_ref(), name)
    }

    /// Look up a variable (searches shadowing then non-shadowing scopes)
    pub fn lookup(&self, name: &str) -> EvalResult<Value> {
        self.try_lookup(name)?
            .ok_or_else(|| EvalError::couldnt_find_variable(name))
    }
}

impl fmt::Debug for EvalCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalCtx")
            .field("base_dir", &self.0.base_dir)
            .finish_non_exhaustive()
    }
}

/// `let <scope> in <body>`
pub fn let_in(
    ctx: &EvalCtx,
    scope: Rc<dyn Scope>,
    body: impl FnOnce(&EvalCtx) -> EvalResult<Value>,
) -> EvalResult<Value> {
    body(&ctx.with_shadowing_scope(scope))
}

/// `with <namespace>; <body>`
pub fn with_expr(
    ctx: &EvalCtx,
    namespace: Value,
    body: impl FnOnce(&EvalCtx) -> EvalResult<Value>,
) -> EvalResult<Value> {
    body(&ctx.with_non_shadowing_scope(Rc::new(Namespace(namespace))))
}
