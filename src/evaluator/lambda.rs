//! Function construction and deep forcing
//!
//! Front ends build functions with [`param_lambda`] (`x: body`) and
//! [`pattern_lambda`] (`{ a, b ? 1 }@args: body`). Both bind their
//! parameters in a new shadowing scope on top of the defining context.

use std::rc::Rc;

use crate::errors::{EvalError, EvalResult};

use super::attrset::{AttrEntries, AttrMap, Attrset};
use super::scope::EvalCtx;
use super::thunk::Thunk;
use super::value::{Value, ValueType};

/// Body of a function or default value, evaluated in the call's scope
pub type ScopedBody = Rc<dyn Fn(&EvalCtx) -> EvalResult<Value>>;

/// One formal parameter of a pattern lambda
#[derive(Clone)]
pub struct Formal {
    pub name: String,
    /// Evaluated lazily, with every parameter of the call in scope
    pub default: Option<ScopedBody>,
}

impl Formal {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        default: impl Fn(&EvalCtx) -> EvalResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            default: Some(Rc::new(default)),
        }
    }
}

enum Binding {
    Given(Value),
    Default(ScopedBody),
}

/// `param: body`
pub fn param_lambda(
    ctx: &EvalCtx,
    param: impl Into<String>,
    body: impl Fn(&EvalCtx) -> EvalResult<Value> + 'static,
) -> Value {
    let ctx = ctx.clone();
    let param = param.into();
    Value::lambda(move |arg| {
        let scope = AttrMap::from([(param.clone(), arg)]);
        body(&ctx.with_shadowing_scope(Rc::new(scope)))
    })
}

/// `{ formals }@args_binding: body`
///
/// The argument must be an attrset. A formal without a default that the
/// argument lacks fails the call. Defaults can refer to any other formal.
pub fn pattern_lambda(
    ctx: &EvalCtx,
    args_binding: Option<String>,
    formals: Vec<Formal>,
    body: impl Fn(&EvalCtx) -> EvalResult<Value> + 'static,
) -> Value {
    let ctx = ctx.clone();
    Value::lambda(move |arg| {
        let args = match arg.to_strict()? {
            Value::Attrset(attrs) => attrs,
            other => {
                return Err(EvalError::type_mismatch(
                    vec![ValueType::Set],
                    other.type_of()?,
                ))
            }
        };

        let mut bindings = Vec::with_capacity(formals.len());
        for formal in &formals {
            let binding = match (args.get(&formal.name)?, &formal.default) {
                (Some(value), _) => Binding::Given(value),
                (None, Some(default)) => Binding::Default(default.clone()),
                (None, None) => {
                    return Err(EvalError::function_call_without_argument(&formal.name))
                }
            };
            bindings.push((formal.name.clone(), binding));
        }

        let args_binding = args_binding.clone();
        let scope = Attrset::recursive(&ctx, move |scope_ctx| {
            let mut entries: AttrEntries = bindings
                .into_iter()
                .map(|(name, binding)| {
                    let value = match binding {
                        Binding::Given(value) => value,
                        Binding::Default(default) => {
                            Value::Lazy(Thunk::new(scope_ctx, move |ctx| default(ctx)))
                        }
                    };
                    (vec![Value::from(name)], value)
                })
                .collect();
            if let Some(name) = args_binding {
                entries.push((vec![Value::from(name)], Value::Attrset(args)));
            }
            Ok(entries)
        });
        body(&ctx.with_shadowing_scope(Rc::new(scope)))
    })
}

/// Force `value` and everything reachable from it
pub fn recursive_strict(value: &Value) -> EvalResult<Value> {
    match value.to_strict()? {
        Value::List(items) => Ok(Value::list(
            items
                .iter()
                .map(recursive_strict)
                .collect::<EvalResult<_>>()?,
        )),
        Value::Attrset(attrs) => {
            let mut map = AttrMap::new();
            for (name, value) in attrs.to_map()? {
                map.insert(name, recursive_strict(&value)?);
            }
            Ok(Value::attrset(map))
        }
        strict => Ok(strict),
    }
}
