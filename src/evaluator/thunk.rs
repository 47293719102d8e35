//! Memoized deferred computations
//!
//! A [`Thunk`] starts out pending: it owns the context it was created in and
//! a body to run against that context. The first [`Thunk::force`] runs the
//! body, flattens any thunk it returns into a strict value, memoizes the
//! outcome and drops both body and context. Every clone of a thunk shares the
//! same slot, so all holders observe the one result.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::errors::{EvalError, EvalResult};

use super::scope::EvalCtx;
use super::value::Value;

/// Computation run the first time a thunk is forced
pub type ThunkBody = Box<dyn FnOnce(&EvalCtx) -> EvalResult<Value>>;

enum ThunkState {
    Pending { ctx: EvalCtx, body: ThunkBody },
    /// Currently being forced. Forcing again means the value depends on itself.
    Forcing,
    Forced(Value),
    Failed(EvalError),
}

impl ThunkState {
    fn settled(&self) -> Option<EvalResult<Value>> {
        match self {
            ThunkState::Forced(value) => Some(Ok(value.clone())),
            ThunkState::Failed(err) => Some(Err(err.clone())),
            ThunkState::Pending { .. } | ThunkState::Forcing => None,
        }
    }
}

/// A shared, single-assignment lazy value
#[derive(Clone)]
pub struct Thunk(Rc<RefCell<ThunkState>>);

impl Thunk {
    /// Create a pending thunk capturing `ctx`
    pub fn new(
        ctx: &EvalCtx,
        body: impl FnOnce(&EvalCtx) -> EvalResult<Value> + 'static,
    ) -> Self {
        Thunk(Rc::new(RefCell::new(ThunkState::Pending {
            ctx: ctx.clone(),
            body: Box::new(body),
        })))
    }

    /// Wrap an already computed value
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Lazy(thunk) => thunk,
            value => Thunk(Rc::new(RefCell::new(ThunkState::Forced(value)))),
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(&*self.0.borrow(), ThunkState::Forced(_))
    }

    /// The memoized value, if forcing already succeeded
    pub fn peek(&self) -> Option<Value> {
        match &*self.0.borrow() {
            ThunkState::Forced(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Force the thunk, running its body at most once.
    pub fn force(&self) -> EvalResult<Value> {
        let (ctx, body) = {
            let mut state = self.0.borrow_mut();
            match mem::replace(&mut *state, ThunkState::Forcing) {
                ThunkState::Pending { ctx, body } => (ctx, body),
                ThunkState::Forcing => return Err(infinite_recursion()),
                settled => {
                    let result = settled.settled();
                    *state = settled;
                    return result.unwrap_or_else(|| Err(infinite_recursion()));
                }
            }
        };

        trace!(depth = ctx.runtime().force_depth(), "forcing thunk");
        let result = ctx
            .runtime()
            .enter_force(|| body(&ctx))
            .and_then(|value| value.to_strict());
        drop(ctx);

        *self.0.borrow_mut() = match &result {
            Ok(value) => ThunkState::Forced(value.clone()),
            Err(err) => ThunkState::Failed(err.clone()),
        };
        result
    }
}

fn infinite_recursion() -> EvalError {
    EvalError::other(
        "Infinite recursion encountered while forcing a value",
        "infinite-recursion",
    )
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.borrow() {
            ThunkState::Pending { .. } => f.write_str("Thunk(<pending>)"),
            ThunkState::Forcing => f.write_str("Thunk(<forcing>)"),
            ThunkState::Forced(value) => f.debug_tuple("Thunk").field(value).finish(),
            ThunkState::Failed(err) => f.debug_tuple("Thunk").field(err).finish(),
        }
    }
}
