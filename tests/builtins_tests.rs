//! Tests for the builtins table as a front end sees it: through the global
//! scope and the `builtins` attrset.

use std::rc::Rc;

use nixrt::evaluator::builtins::UNIMPLEMENTED_BUILTINS;
use nixrt::evaluator::DEFAULT_GLOBAL_BUILTINS;
use nixrt::{
    param_lambda, EvalCtx, EvalResult, MemorySink, Runtime, RuntimeConfig, Thunk, Value,
    ValueType,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn ctx() -> EvalCtx {
    Rc::new(Runtime::default()).root_context("/")
}

/// `builtins.<name> arg1 arg2 ...`
fn call(ctx: &EvalCtx, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    let mut f = ctx
        .lookup("builtins")?
        .select(&[Value::from(name)], None)?;
    for arg in args {
        f = f.apply(arg)?;
    }
    f.to_strict()
}

fn to_json(value: EvalResult<Value>) -> serde_json::Value {
    value.and_then(|v| v.to_serde_json()).unwrap()
}

#[test]
fn test_promoted_builtins_are_global() {
    let ctx = ctx();
    for name in DEFAULT_GLOBAL_BUILTINS {
        let global = ctx.lookup(name).unwrap();
        assert!(
            matches!(global.type_of(), Ok(ValueType::Lambda)),
            "{} should be a global function",
            name
        );
    }
    assert!(ctx.lookup("head").is_err());
    assert!(call(&ctx, "head", vec![Value::from(vec![1])]).is_ok());
}

#[test]
fn test_constants() {
    let ctx = ctx();
    assert_eq!(to_json(ctx.lookup("true")), json!(true));
    assert_eq!(to_json(ctx.lookup("false")), json!(false));
    assert_eq!(to_json(ctx.lookup("null")), json!(null));
    let inner = ctx
        .lookup("builtins")
        .and_then(|b| b.select(&[Value::from("null")], None));
    assert_eq!(to_json(inner), json!(null));
}

#[test]
fn test_every_unimplemented_builtin_is_registered() {
    let ctx = ctx();
    for name in UNIMPLEMENTED_BUILTINS {
        let err = call(&ctx, name, vec![Value::Null]).unwrap_err();
        assert_eq!(err.code(), "unimplemented", "{}", name);
        assert_eq!(
            err.to_string(),
            format!("The builtin '{}' is not implemented", name)
        );
    }
}

#[test]
fn test_head_errors() {
    let ctx = ctx();
    let err = call(&ctx, "head", vec![Value::list(vec![])]).unwrap_err();
    assert_eq!(err.code(), "builtins-head-on-empty-list");
    let err = call(&ctx, "head", vec![Value::Int(1)]).unwrap_err();
    assert_eq!(err.code(), "type-mismatch");
}

#[test]
fn test_attr_names_and_values() {
    // builtins.attrNames { c = 3; a = 1; b = 2; }
    let ctx = ctx();
    let set = Value::attrset(
        [("c", 3), ("a", 1), ("b", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::Int(v)))
            .collect(),
    );
    assert_eq!(
        to_json(call(&ctx, "attrNames", vec![set.clone()])),
        json!(["a", "b", "c"])
    );
    assert_eq!(
        to_json(call(&ctx, "attrValues", vec![set])),
        json!([1, 2, 3])
    );
}

#[test]
fn test_map_with_front_end_lambda() {
    // map (x: x + 1) [ 1 2 3 ]
    let ctx = ctx();
    let inc = param_lambda(&ctx, "x", |ctx| ctx.lookup("x")?.add(&Value::Int(1)));
    let result = ctx
        .lookup("map")
        .and_then(|map| map.apply(inc))
        .and_then(|f| f.apply(Value::from(vec![1, 2, 3])));
    assert_eq!(to_json(result), json!([2, 3, 4]));
}

#[test]
fn test_fold_with_front_end_lambda() {
    // builtins.foldl' (acc: x: acc + x) 0 [ 1 2 3 4 ]
    let ctx = ctx();
    let plus = param_lambda(&ctx, "acc", |ctx| {
        Ok(param_lambda(ctx, "x", |ctx| {
            ctx.lookup("acc")?.add(&ctx.lookup("x")?)
        }))
    });
    let result = call(
        &ctx,
        "foldl'",
        vec![plus, Value::Int(0), Value::from(vec![1, 2, 3, 4])],
    );
    assert_eq!(to_json(result), json!(10));
}

#[test]
fn test_abort_message() {
    let ctx = ctx();
    let err = ctx
        .lookup("abort")
        .and_then(|abort| abort.apply(Value::from("boom")))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Evaluation aborted with the following error message: 'boom'"
    );
}

#[test]
fn test_throw_inside_lazy_value_is_deferred() {
    // let x = throw "later"; in builtins.length [ x ]
    let ctx = ctx();
    let x = Value::Lazy(Thunk::new(&ctx, |ctx| {
        ctx.lookup("throw")?.apply(Value::from("later"))
    }));
    let list = Value::list(vec![x.clone()]);
    assert_eq!(to_json(call(&ctx, "length", vec![list])), json!(1));
    assert_eq!(x.to_strict().unwrap_err().code(), "throw");
}

#[test]
fn test_trace_reaches_sink() {
    let sink = Rc::new(MemorySink::new());
    let runtime = Rc::new(Runtime::default().with_debug_sink(sink.clone()));
    let ctx = runtime.root_context("/");
    let value = Value::attrset(
        [("a".to_string(), Value::Int(1))].into_iter().collect(),
    );
    let result = call(&ctx, "trace", vec![value, Value::Int(2)]);
    assert_eq!(to_json(result), json!(2));
    assert_eq!(sink.messages(), vec!["trace: { a = 1; }"]);
}

#[test]
fn test_custom_global_builtins() {
    let config = RuntimeConfig {
        global_builtins: vec!["length".into(), "doesNotExist".into()],
        ..RuntimeConfig::default()
    };
    let ctx = Rc::new(Runtime::new(config)).root_context("/");
    let length = ctx
        .lookup("length")
        .and_then(|f| f.apply(Value::from(vec![1, 2])));
    assert_eq!(to_json(length), json!(2));
    assert_eq!(
        ctx.lookup("doesNotExist").unwrap_err().code(),
        "couldnt-find-variable"
    );
    assert!(ctx.lookup("map").is_err());
}

#[test]
fn test_to_string_and_type_of() {
    let ctx = ctx();
    assert_eq!(
        to_json(call(&ctx, "toString", vec![Value::path("/a/b")])),
        json!("/a/b")
    );
    assert_eq!(
        to_json(call(&ctx, "typeOf", vec![Value::path("/a/b")])),
        json!("path")
    );
    assert_eq!(
        to_json(call(&ctx, "typeOf", vec![Value::Float(1.0)])),
        json!("float")
    );
}
