// Rust 1.93+ triggers false positives on thiserror/miette derive macro fields
#![allow(unused_assignments)]

//! nixrt: runtime for a lazily evaluated, Nix-style configuration language
//!
//! This crate is the execution-time half of the language. A front end
//! translates source code into calls against the API exposed here: it builds
//! values, thunks, scopes, attrsets and functions, and applies the operators
//! and builtins defined on [`Value`].
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use nixrt::{Attrset, Runtime, Thunk, Value};
//!
//! // rec { a = b + 1; b = 1; }.a
//! let runtime = Rc::new(Runtime::default());
//! let result = runtime
//!     .evaluate("/", |ctx| {
//!         let attrs = Attrset::recursive(ctx, |ctx| {
//!             let a = Value::Lazy(Thunk::new(ctx, |ctx| {
//!                 ctx.lookup("b")?.add(&Value::Int(1))
//!             }));
//!             Ok(vec![
//!                 (vec![Value::from("a")], a),
//!                 (vec![Value::from("b")], Value::Int(1)),
//!             ])
//!         });
//!         Value::Attrset(attrs)
//!             .select(&[Value::from("a")], None)?
//!             .to_strict()
//!     })
//!     .unwrap();
//! assert!(matches!(result, Value::Int(2)));
//! ```

pub mod errors;
pub mod evaluator;
pub mod resolver;

pub use errors::{ErrorKind, ErrorMessage, EvalError, EvalResult, MessagePart};
pub use evaluator::{
    base_name_of, dir_of, disjoint_merge, is_absolute_path, join_paths, let_in, normalize_path,
    param_lambda, pattern_lambda, recursive_strict, to_path, with_expr, AttrMap, Attrset,
    DebugSink, EvalCtx, Formal, Lambda, MemorySink, Runtime, RuntimeConfig, Scope, Thunk,
    TracingSink, Value, ValueType,
};
pub use resolver::{Module, ModuleResolver, NoResolver, VirtualResolver};
