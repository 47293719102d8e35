//! Built-in functions
//!
//! Every builtin is a curried [`Lambda`] registered under a fixed name in the
//! `builtins` attrset; a configurable subset is also promoted into the global
//! scope. Builtins force their operands before inspecting them and report
//! wrong operand types as type mismatches naming the builtin.
//!
//! Builtins that need I/O, hashing or serialization are registered too, but
//! fail with an "unimplemented" error when called.

use std::rc::{Rc, Weak};

use crate::errors::{ErrorMessage, EvalError, EvalResult};

use super::attrset::{AttrMap, Attrset};
use super::lambda::recursive_strict;
use super::path::{base_name_of, dir_of};
use super::scope::EvalCtx;
use super::thunk::Thunk;
use super::value::{Lambda, Value, ValueType};
use super::Runtime;

/// Builtins that exist in the language but need capabilities this runtime
/// does not have
pub const UNIMPLEMENTED_BUILTINS: &[&str] = &[
    "compareVersions",
    "convertHash",
    "derivation",
    "fetchClosure",
    "fetchGit",
    "fetchTarball",
    "fetchTree",
    "fetchurl",
    "filterSource",
    "findFile",
    "fromJSON",
    "fromTOML",
    "functionArgs",
    "genericClosure",
    "getContext",
    "getEnv",
    "getFlake",
    "hasContext",
    "hashFile",
    "hashString",
    "match",
    "parseDrvName",
    "path",
    "pathExists",
    "placeholder",
    "readDir",
    "readFile",
    "readFileType",
    "replaceStrings",
    "split",
    "splitVersion",
    "storePath",
    "toFile",
    "toJSON",
    "toXML",
    "tryEval",
    "unsafeDiscardOutputDependency",
    "zipAttrsWith",
];

/// Handle on the runtime owning the builtins table. Weak, since the runtime
/// owns the table.
#[derive(Clone)]
struct Env {
    runtime: Weak<Runtime>,
}

impl Env {
    fn runtime(&self) -> EvalResult<Rc<Runtime>> {
        self.runtime.upgrade().ok_or_else(|| {
            EvalError::other(
                "The runtime owning this builtin no longer exists",
                "runtime-dropped",
            )
        })
    }

    /// Context for thunks created by builtins
    fn ctx(&self) -> EvalResult<EvalCtx> {
        Ok(self.runtime()?.root_context("/"))
    }
}

fn unary(f: impl Fn(Value) -> EvalResult<Value> + 'static) -> Value {
    Value::lambda(f)
}

fn binary(f: impl Fn(Value, Value) -> EvalResult<Value> + 'static) -> Value {
    let f = Rc::new(f);
    Value::lambda(move |a| {
        let f = f.clone();
        Ok(Value::lambda(move |b| f(a.clone(), b)))
    })
}

fn ternary(f: impl Fn(Value, Value, Value) -> EvalResult<Value> + 'static) -> Value {
    let f = Rc::new(f);
    Value::lambda(move |a| {
        let f = f.clone();
        Ok(Value::lambda(move |b| {
            let f = f.clone();
            let a = a.clone();
            Ok(Value::lambda(move |c| f(a.clone(), b.clone(), c)))
        }))
    })
}

fn unimplemented(name: &'static str) -> Value {
    Value::lambda(move |_| Err(EvalError::unimplemented(name)))
}

/// The `builtins` attrset
pub(crate) fn builtins_table(runtime: &Rc<Runtime>) -> AttrMap {
    let env = Env {
        runtime: Rc::downgrade(runtime),
    };
    let mut table = AttrMap::new();

    for name in UNIMPLEMENTED_BUILTINS {
        table.insert(name.to_string(), unimplemented(name));
    }

    let mut define = |name: &str, value: Value| {
        table.insert(name.to_string(), value);
    };

    // control
    define("abort", unary(builtin_abort));
    define("throw", unary(builtin_throw));
    define("seq", binary(builtin_seq));
    define("deepSeq", binary(builtin_deep_seq));
    let trace_env = env.clone();
    define("trace", binary(move |e1, e2| builtin_trace(&trace_env, e1, e2)));
    let import_env = env.clone();
    define("import", unary(move |path| builtin_import(&import_env, path)));

    // arithmetic
    define("add", binary(|a, b| arithmetic("add", a, b, Value::add)));
    define("sub", binary(|a, b| arithmetic("sub", a, b, Value::sub)));
    define("mul", binary(|a, b| arithmetic("mul", a, b, Value::mul)));
    define("div", binary(|a, b| arithmetic("div", a, b, Value::div)));
    define("lessThan", binary(builtin_less_than));
    define("bitAnd", binary(|a, b| bitwise("bitAnd", a, b, |x, y| x & y)));
    define("bitOr", binary(|a, b| bitwise("bitOr", a, b, |x, y| x | y)));
    define("bitXor", binary(|a, b| bitwise("bitXor", a, b, |x, y| x ^ y)));
    define("ceil", unary(|n| rounding("ceil", n, f64::ceil)));
    define("floor", unary(|n| rounding("floor", n, f64::floor)));

    // lists
    define("head", unary(builtin_head));
    define("tail", unary(builtin_tail));
    define("length", unary(builtin_length));
    define("elemAt", binary(builtin_elem_at));
    define("elem", binary(builtin_elem));
    define("all", binary(builtin_all));
    define("any", binary(builtin_any));
    let map_env = env.clone();
    define("map", binary(move |f, list| builtin_map(&map_env, f, list)));
    define("filter", binary(builtin_filter));
    define("foldl'", ternary(builtin_foldl_strict));
    define("concatLists", unary(builtin_concat_lists));
    define("concatMap", binary(builtin_concat_map));
    let gen_env = env.clone();
    define("genList", binary(move |f, n| builtin_gen_list(&gen_env, f, n)));
    define("sort", binary(builtin_sort));
    define("partition", binary(builtin_partition));
    define("groupBy", binary(builtin_group_by));

    // attrsets
    define("attrNames", unary(builtin_attr_names));
    define("attrValues", unary(builtin_attr_values));
    define("hasAttr", binary(builtin_has_attr));
    define("getAttr", binary(builtin_get_attr));
    define("removeAttrs", binary(builtin_remove_attrs));
    define("intersectAttrs", binary(builtin_intersect_attrs));
    define("listToAttrs", unary(builtin_list_to_attrs));
    let map_attrs_env = env.clone();
    define(
        "mapAttrs",
        binary(move |f, set| builtin_map_attrs(&map_attrs_env, f, set)),
    );
    define("catAttrs", binary(builtin_cat_attrs));

    // types
    define("typeOf", unary(|v| Ok(Value::string(v.type_of()?.type_name()))));
    define("isAttrs", type_predicate(ValueType::Set));
    define("isBool", type_predicate(ValueType::Bool));
    define("isFloat", type_predicate(ValueType::Float));
    define("isFunction", type_predicate(ValueType::Lambda));
    define("isInt", type_predicate(ValueType::Int));
    define("isList", type_predicate(ValueType::List));
    define("isNull", type_predicate(ValueType::Null));
    define("isPath", type_predicate(ValueType::Path));
    define("isString", type_predicate(ValueType::String));

    // strings and paths
    define("baseNameOf", unary(builtin_base_name_of));
    define("dirOf", unary(builtin_dir_of));
    define("stringLength", unary(builtin_string_length));
    define("substring", ternary(builtin_substring));
    define("concatStringsSep", binary(builtin_concat_strings_sep));
    define("toString", unary(builtin_to_string));

    // constants
    define("true", Value::Bool(true));
    define("false", Value::Bool(false));
    define("null", Value::Null);

    table
}

/// The global scope: `builtins`, the promoted builtins and the constants
pub(crate) fn global_scope(runtime: &Rc<Runtime>) -> AttrMap {
    let builtins = builtins_table(runtime);
    let mut scope = AttrMap::new();
    for name in &runtime.config().global_builtins {
        if let Some(value) = builtins.get(name) {
            scope.insert(name.clone(), value.clone());
        }
    }
    for name in ["true", "false", "null"] {
        if let Some(value) = builtins.get(name) {
            scope.insert(name.to_string(), value.clone());
        }
    }
    scope.insert("builtins".to_string(), Value::attrset(builtins));
    scope
}

// Helper functions

const NUMBERS: [ValueType; 2] = [ValueType::Int, ValueType::Float];

/// Operand types `lessThan` can order
const COMPARABLE: [ValueType; 5] = [
    ValueType::Int,
    ValueType::Float,
    ValueType::String,
    ValueType::Path,
    ValueType::List,
];

/// Types `toString` accepts besides attrsets with `outPath` or `__toString`
const COERCIBLE: [ValueType; 7] = [
    ValueType::String,
    ValueType::Path,
    ValueType::Int,
    ValueType::Float,
    ValueType::Bool,
    ValueType::Null,
    ValueType::List,
];

fn type_error(name: &str, expected: &[ValueType], got: ValueType) -> EvalError {
    EvalError::type_mismatch_with(
        expected.to_vec(),
        got,
        ErrorMessage::new()
            .plain(format!("{} expects ", name))
            .value_types(expected)
            .plain(", got ")
            .value_type(got)
            .plain("."),
    )
}

fn expect_int(name: &str, value: &Value) -> EvalResult<i64> {
    match value.to_strict()? {
        Value::Int(n) => Ok(n),
        other => Err(type_error(name, &[ValueType::Int], other.type_of()?)),
    }
}

fn expect_number(name: &str, value: &Value) -> EvalResult<Value> {
    match value.to_strict()? {
        n @ (Value::Int(_) | Value::Float(_)) => Ok(n),
        other => Err(type_error(name, &NUMBERS, other.type_of()?)),
    }
}

fn expect_string(name: &str, value: &Value) -> EvalResult<Rc<str>> {
    match value.to_strict()? {
        Value::String(s) => Ok(s),
        other => Err(type_error(name, &[ValueType::String], other.type_of()?)),
    }
}

fn expect_list(name: &str, value: &Value) -> EvalResult<Rc<[Value]>> {
    match value.to_strict()? {
        Value::List(items) => Ok(items),
        other => Err(type_error(name, &[ValueType::List], other.type_of()?)),
    }
}

fn expect_attrset(name: &str, value: &Value) -> EvalResult<Attrset> {
    match value.to_strict()? {
        Value::Attrset(attrs) => Ok(attrs),
        other => Err(type_error(name, &[ValueType::Set], other.type_of()?)),
    }
}

fn expect_lambda(name: &str, value: &Value) -> EvalResult<Lambda> {
    match value.to_strict()? {
        Value::Lambda(lambda) => Ok(lambda),
        other => Err(type_error(name, &[ValueType::Lambda], other.type_of()?)),
    }
}

/// Text of a string or path operand
fn expect_text(name: &str, value: &Value) -> EvalResult<Rc<str>> {
    match value.to_strict()? {
        Value::String(s) | Value::Path(s) => Ok(s),
        other => Err(type_error(
            name,
            &[ValueType::String, ValueType::Path],
            other.type_of()?,
        )),
    }
}

fn type_predicate(ty: ValueType) -> Value {
    unary(move |value| Ok(Value::Bool(value.type_of()? == ty)))
}

fn set_of(pairs: Vec<(&str, Value)>) -> Value {
    Value::attrset(
        pairs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

// control

fn builtin_abort(message: Value) -> EvalResult<Value> {
    Err(EvalError::abort(expect_text("abort", &message)?.to_string()))
}

fn builtin_throw(message: Value) -> EvalResult<Value> {
    Err(EvalError::other(
        expect_text("throw", &message)?.to_string(),
        "throw",
    ))
}

fn builtin_seq(e1: Value, e2: Value) -> EvalResult<Value> {
    e1.to_strict()?;
    Ok(e2)
}

fn builtin_deep_seq(e1: Value, e2: Value) -> EvalResult<Value> {
    recursive_strict(&e1)?;
    Ok(e2)
}

fn builtin_trace(env: &Env, e1: Value, e2: Value) -> EvalResult<Value> {
    let shown = recursive_strict(&e1)?;
    env.runtime()?
        .debug_sink()
        .debug(&format!("trace: {}", shown));
    Ok(e2)
}

fn builtin_import(env: &Env, path: Value) -> EvalResult<Value> {
    let path = expect_text("import", &path)?;
    env.runtime()?.import(&path)
}

// arithmetic

fn arithmetic(
    name: &str,
    lhs: Value,
    rhs: Value,
    op: fn(&Value, &Value) -> EvalResult<Value>,
) -> EvalResult<Value> {
    let lhs = expect_number(name, &lhs)?;
    let rhs = expect_number(name, &rhs)?;
    op(&lhs, &rhs)
}

fn bitwise(name: &str, lhs: Value, rhs: Value, op: fn(i64, i64) -> i64) -> EvalResult<Value> {
    Ok(Value::Int(op(expect_int(name, &lhs)?, expect_int(name, &rhs)?)))
}

fn builtin_less_than(lhs: Value, rhs: Value) -> EvalResult<Value> {
    let lhs = lhs.to_strict()?;
    let rhs = rhs.to_strict()?;
    let (lhs_type, rhs_type) = (lhs.type_of()?, rhs.type_of()?);
    let expected: &[ValueType] = match lhs_type {
        ValueType::Int | ValueType::Float => &NUMBERS,
        ValueType::String => &[ValueType::String],
        ValueType::Path => &[ValueType::Path],
        ValueType::List => &[ValueType::List],
        _ => return Err(type_error("lessThan", &COMPARABLE, lhs_type)),
    };
    if !expected.contains(&rhs_type) {
        return Err(type_error("lessThan", expected, rhs_type));
    }
    Ok(Value::Bool(lhs.less(&rhs)?))
}

fn rounding(name: &str, n: Value, round: fn(f64) -> f64) -> EvalResult<Value> {
    match expect_number(name, &n)? {
        Value::Float(f) => {
            let rounded = round(f);
            // 2^63 is the first float past i64::MAX
            if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
                Ok(Value::Int(rounded as i64))
            } else {
                Err(EvalError::other(
                    format!("{} cannot convert {} to an integer.", name, f),
                    format!("builtins-{}-out-of-range", name),
                ))
            }
        }
        int => Ok(int),
    }
}

// lists

fn builtin_head(list: Value) -> EvalResult<Value> {
    match list.to_strict()? {
        Value::List(items) => items.first().cloned().ok_or_else(|| {
            EvalError::other(
                "Cannot fetch the first element in an empty list.",
                "builtins-head-on-empty-list",
            )
        }),
        other => {
            let got = other.type_of()?;
            Err(EvalError::type_mismatch_with(
                vec![ValueType::List],
                got,
                ErrorMessage::new()
                    .plain("Cannot apply the 'head' function on '")
                    .value_type(got)
                    .plain("', expected ")
                    .value_type(ValueType::List)
                    .plain("."),
            ))
        }
    }
}

fn builtin_tail(list: Value) -> EvalResult<Value> {
    let items = expect_list("tail", &list)?;
    if items.is_empty() {
        return Err(EvalError::other(
            "Cannot fetch the tail of an empty list.",
            "builtins-tail-on-empty-list",
        ));
    }
    Ok(Value::list(items[1..].to_vec()))
}

fn builtin_length(list: Value) -> EvalResult<Value> {
    Ok(Value::Int(expect_list("length", &list)?.len() as i64))
}

fn builtin_elem_at(list: Value, index: Value) -> EvalResult<Value> {
    let items = expect_list("elemAt", &list)?;
    let index = expect_int("elemAt", &index)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i).cloned())
        .ok_or_else(|| {
            EvalError::other(
                format!(
                    "Index {} is out of bounds for a list of length {}.",
                    index,
                    items.len()
                ),
                "builtins-elemat-out-of-bounds",
            )
        })
}

fn builtin_elem(x: Value, list: Value) -> EvalResult<Value> {
    for item in expect_list("elem", &list)?.iter() {
        if item.eq(&x)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn builtin_all(pred: Value, list: Value) -> EvalResult<Value> {
    let pred = expect_lambda("all", &pred)?;
    for item in expect_list("all", &list)?.iter() {
        if !pred.call(item.clone())?.as_boolean()? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn builtin_any(pred: Value, list: Value) -> EvalResult<Value> {
    let pred = expect_lambda("any", &pred)?;
    for item in expect_list("any", &list)?.iter() {
        if pred.call(item.clone())?.as_boolean()? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn builtin_map(env: &Env, f: Value, list: Value) -> EvalResult<Value> {
    let f = expect_lambda("map", &f)?;
    let items = expect_list("map", &list)?;
    let ctx = env.ctx()?;
    Ok(Value::list(
        items
            .iter()
            .map(|item| {
                let (f, item) = (f.clone(), item.clone());
                Value::Lazy(Thunk::new(&ctx, move |_| f.call(item)))
            })
            .collect(),
    ))
}

fn builtin_filter(pred: Value, list: Value) -> EvalResult<Value> {
    let pred = expect_lambda("filter", &pred)?;
    let mut kept = Vec::new();
    for item in expect_list("filter", &list)?.iter() {
        if pred.call(item.clone())?.as_boolean()? {
            kept.push(item.clone());
        }
    }
    Ok(Value::list(kept))
}

fn builtin_foldl_strict(op: Value, nul: Value, list: Value) -> EvalResult<Value> {
    let op = expect_lambda("foldl'", &op)?;
    let mut acc = nul.to_strict()?;
    for item in expect_list("foldl'", &list)?.iter() {
        let step = op.call(acc)?;
        acc = step.apply(item.clone())?.to_strict()?;
    }
    Ok(acc)
}

fn builtin_concat_lists(lists: Value) -> EvalResult<Value> {
    let mut joined = Vec::new();
    for list in expect_list("concatLists", &lists)?.iter() {
        joined.extend(expect_list("concatLists", list)?.iter().cloned());
    }
    Ok(Value::list(joined))
}

fn builtin_concat_map(f: Value, list: Value) -> EvalResult<Value> {
    let f = expect_lambda("concatMap", &f)?;
    let mut joined = Vec::new();
    for item in expect_list("concatMap", &list)?.iter() {
        let mapped = f.call(item.clone())?;
        joined.extend(expect_list("concatMap", &mapped)?.iter().cloned());
    }
    Ok(Value::list(joined))
}

fn builtin_gen_list(env: &Env, f: Value, length: Value) -> EvalResult<Value> {
    let f = expect_lambda("genList", &f)?;
    let length = expect_int("genList", &length)?;
    if length < 0 {
        return Err(EvalError::other(
            format!("Cannot create a list of negative length ({}).", length),
            "builtins-genlist-negative-length",
        ));
    }
    let ctx = env.ctx()?;
    Ok(Value::list(
        (0..length)
            .map(|i| {
                let f = f.clone();
                Value::Lazy(Thunk::new(&ctx, move |_| f.call(Value::Int(i))))
            })
            .collect(),
    ))
}

/// Stable merge sort with a fallible "less than" comparator
fn merge_sort(
    mut items: Vec<Value>,
    less: &dyn Fn(&Value, &Value) -> EvalResult<bool>,
) -> EvalResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, less)?;
    let right = merge_sort(right, less)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        // take from the right only when strictly smaller, keeping equal
        // elements in their original order
        if less(r, l)? {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

fn builtin_sort(comparator: Value, list: Value) -> EvalResult<Value> {
    let comparator = expect_lambda("sort", &comparator)?;
    let items = expect_list("sort", &list)?.to_vec();
    let less = |a: &Value, b: &Value| comparator.call(a.clone())?.apply(b.clone())?.as_boolean();
    Ok(Value::list(merge_sort(items, &less)?))
}

fn builtin_partition(pred: Value, list: Value) -> EvalResult<Value> {
    let pred = expect_lambda("partition", &pred)?;
    let (mut right, mut wrong) = (Vec::new(), Vec::new());
    for item in expect_list("partition", &list)?.iter() {
        if pred.call(item.clone())?.as_boolean()? {
            right.push(item.clone());
        } else {
            wrong.push(item.clone());
        }
    }
    Ok(set_of(vec![
        ("right", Value::list(right)),
        ("wrong", Value::list(wrong)),
    ]))
}

fn builtin_group_by(f: Value, list: Value) -> EvalResult<Value> {
    let f = expect_lambda("groupBy", &f)?;
    let mut groups: indexmap::IndexMap<String, Vec<Value>> = indexmap::IndexMap::new();
    for item in expect_list("groupBy", &list)?.iter() {
        let key = expect_string("groupBy", &f.call(item.clone())?)?;
        groups.entry(key.to_string()).or_default().push(item.clone());
    }
    Ok(Value::attrset(
        groups
            .into_iter()
            .map(|(key, items)| (key, Value::list(items)))
            .collect(),
    ))
}

// attrsets

fn builtin_attr_names(set: Value) -> EvalResult<Value> {
    let attrs = expect_attrset("attrNames", &set)?;
    Ok(Value::list(
        attrs.sorted_keys()?.into_iter().map(Value::from).collect(),
    ))
}

fn builtin_attr_values(set: Value) -> EvalResult<Value> {
    let attrs = expect_attrset("attrValues", &set)?;
    Ok(Value::list(
        attrs
            .sorted_entries()?
            .into_iter()
            .map(|(_, value)| value)
            .collect(),
    ))
}

fn builtin_has_attr(name: Value, set: Value) -> EvalResult<Value> {
    let name = expect_string("hasAttr", &name)?;
    let attrs = expect_attrset("hasAttr", &set)?;
    Ok(Value::Bool(attrs.contains(&name)?))
}

fn builtin_get_attr(name: Value, set: Value) -> EvalResult<Value> {
    let name = expect_string("getAttr", &name)?;
    let attrs = expect_attrset("getAttr", &set)?;
    attrs
        .get(&name)?
        .ok_or_else(|| EvalError::missing_attribute(vec![name.to_string()]))
}

fn builtin_remove_attrs(set: Value, names: Value) -> EvalResult<Value> {
    let mut map = expect_attrset("removeAttrs", &set)?.to_map()?;
    for name in expect_list("removeAttrs", &names)?.iter() {
        map.shift_remove(&*expect_string("removeAttrs", name)?);
    }
    Ok(Value::attrset(map))
}

fn builtin_intersect_attrs(e1: Value, e2: Value) -> EvalResult<Value> {
    let names = expect_attrset("intersectAttrs", &e1)?;
    let source = expect_attrset("intersectAttrs", &e2)?;
    let mut map = AttrMap::new();
    for (name, value) in source.to_map()? {
        if names.contains(&name)? {
            map.insert(name, value);
        }
    }
    Ok(Value::attrset(map))
}

fn builtin_list_to_attrs(list: Value) -> EvalResult<Value> {
    let mut map = AttrMap::new();
    for item in expect_list("listToAttrs", &list)?.iter() {
        let entry = expect_attrset("listToAttrs", item)?;
        let name = entry
            .get("name")?
            .ok_or_else(|| EvalError::missing_attribute(vec!["name".into()]))?;
        let value = entry
            .get("value")?
            .ok_or_else(|| EvalError::missing_attribute(vec!["value".into()]))?;
        // the first definition of a name wins
        map.entry(expect_string("listToAttrs", &name)?.to_string())
            .or_insert(value);
    }
    Ok(Value::attrset(map))
}

fn builtin_map_attrs(env: &Env, f: Value, set: Value) -> EvalResult<Value> {
    let f = expect_lambda("mapAttrs", &f)?;
    let attrs = expect_attrset("mapAttrs", &set)?;
    let ctx = env.ctx()?;
    let mut map = AttrMap::new();
    for (name, value) in attrs.to_map()? {
        let f = f.clone();
        let key = Value::from(name.as_str());
        let mapped = Value::Lazy(Thunk::new(&ctx, move |_| f.call(key)?.apply(value)));
        map.insert(name, mapped);
    }
    Ok(Value::attrset(map))
}

fn builtin_cat_attrs(name: Value, list: Value) -> EvalResult<Value> {
    let name = expect_string("catAttrs", &name)?;
    let mut found = Vec::new();
    for item in expect_list("catAttrs", &list)?.iter() {
        if let Some(value) = expect_attrset("catAttrs", item)?.get(&name)? {
            found.push(value);
        }
    }
    Ok(Value::list(found))
}

// strings and paths

fn builtin_base_name_of(path: Value) -> EvalResult<Value> {
    let path = expect_text("baseNameOf", &path)?;
    Ok(Value::from(base_name_of(&path)))
}

fn builtin_dir_of(path: Value) -> EvalResult<Value> {
    match path.to_strict()? {
        Value::Path(p) => Ok(Value::path(dir_of(&p))),
        Value::String(s) => Ok(Value::from(dir_of(&s))),
        other => Err(type_error(
            "dirOf",
            &[ValueType::String, ValueType::Path],
            other.type_of()?,
        )),
    }
}

fn builtin_string_length(s: Value) -> EvalResult<Value> {
    Ok(Value::Int(expect_text("stringLength", &s)?.len() as i64))
}

fn builtin_substring(start: Value, length: Value, s: Value) -> EvalResult<Value> {
    let start = expect_int("substring", &start)?;
    let length = expect_int("substring", &length)?;
    let s = expect_text("substring", &s)?;
    let start = usize::try_from(start).map_err(|_| {
        EvalError::other(
            format!("Negative start position ({}) in substring.", start),
            "builtins-substring-negative-start",
        )
    })?;
    let bytes = s.as_bytes();
    let start = start.min(bytes.len());
    // a negative length takes the rest of the string
    let end = match usize::try_from(length) {
        Ok(length) => start.saturating_add(length).min(bytes.len()),
        Err(_) => bytes.len(),
    };
    Ok(Value::string(
        String::from_utf8_lossy(&bytes[start..end]).into_owned(),
    ))
}

fn builtin_concat_strings_sep(sep: Value, list: Value) -> EvalResult<Value> {
    let sep = expect_string("concatStringsSep", &sep)?;
    let parts = expect_list("concatStringsSep", &list)?
        .iter()
        .map(|item| Ok(expect_text("concatStringsSep", item)?.to_string()))
        .collect::<EvalResult<Vec<String>>>()?;
    Ok(Value::string(parts.join(&sep)))
}

fn coerce_to_string(value: &Value) -> EvalResult<String> {
    Ok(match value.to_strict()? {
        Value::String(s) | Value::Path(s) => s.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => format!("{:.6}", f),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) | Value::Null => String::new(),
        Value::List(items) => items
            .iter()
            .map(coerce_to_string)
            .collect::<EvalResult<Vec<_>>>()?
            .join(" "),
        Value::Attrset(attrs) => {
            if let Some(out_path) = attrs.get("outPath")? {
                coerce_to_string(&out_path)?
            } else if let Some(to_string) = attrs.get("__toString")? {
                let shown = to_string.apply(Value::Attrset(attrs))?;
                coerce_to_string(&shown)?
            } else {
                return Err(type_error("toString", &COERCIBLE, ValueType::Set));
            }
        }
        other => return Err(type_error("toString", &COERCIBLE, other.type_of()?)),
    })
}

fn builtin_to_string(value: Value) -> EvalResult<Value> {
    Ok(Value::string(coerce_to_string(&value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn builtin(runtime: &Rc<Runtime>, name: &str) -> Value {
        runtime
            .root_context("/")
            .lookup("builtins")
            .and_then(|b| b.select(&[Value::from(name)], None))
            .unwrap()
    }

    fn call(name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let runtime = Rc::new(Runtime::default());
        let mut f = builtin(&runtime, name);
        for arg in args {
            f = f.apply(arg)?;
        }
        f.to_strict()
    }

    fn json(value: EvalResult<Value>) -> serde_json::Value {
        value.and_then(|v| v.to_serde_json()).unwrap()
    }

    fn ints(items: &[i64]) -> Value {
        Value::from(items.to_vec())
    }

    fn set(pairs: &[(&str, Value)]) -> Value {
        Value::attrset(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_abort() {
        let err = call("abort", vec![Value::from("foo")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Evaluation aborted with the following error message: 'foo'"
        );
    }

    #[test]
    fn test_throw() {
        let err = call("throw", vec![Value::from("bad")]).unwrap_err();
        assert_eq!(err.code(), "throw");
        assert_eq!(err.to_string(), "bad");
    }

    #[test]
    fn test_add() {
        assert_eq!(json(call("add", vec![Value::Int(1), Value::Int(2)])), json!(3));
        assert_eq!(
            json(call("add", vec![Value::Int(1), Value::Float(2.5)])),
            json!(3.5)
        );
        let err = call("add", vec![Value::from("a"), Value::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "add expects an int or a float, got a string.");
    }

    #[test]
    fn test_head() {
        assert_eq!(json(call("head", vec![ints(&[1, 2])])), json!(1));

        let err = call("head", vec![Value::list(vec![])]).unwrap_err();
        assert_eq!(err.code(), "builtins-head-on-empty-list");

        let err = call("head", vec![Value::Int(1)]).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::TypeMismatch {
                expected: vec![ValueType::List],
                got: ValueType::Int
            }
        );
        assert_eq!(
            err.to_string(),
            "Cannot apply the 'head' function on 'an int', expected a list."
        );
    }

    #[test]
    fn test_tail_length_elem_at() {
        assert_eq!(json(call("tail", vec![ints(&[1, 2, 3])])), json!([2, 3]));
        assert_eq!(
            call("tail", vec![Value::list(vec![])]).unwrap_err().code(),
            "builtins-tail-on-empty-list"
        );
        assert_eq!(json(call("length", vec![ints(&[1, 2, 3])])), json!(3));
        assert_eq!(
            json(call("elemAt", vec![ints(&[1, 2, 3]), Value::Int(1)])),
            json!(2)
        );
        assert_eq!(
            call("elemAt", vec![ints(&[1]), Value::Int(1)])
                .unwrap_err()
                .code(),
            "builtins-elemat-out-of-bounds"
        );
        assert!(call("elemAt", vec![ints(&[1]), Value::Int(-1)]).is_err());
    }

    #[test]
    fn test_all_any() {
        let is_even = Value::lambda(|v| Ok(Value::Bool(matches!(v.to_strict()?, Value::Int(n) if n % 2 == 0))));
        assert_eq!(
            json(call("all", vec![is_even.clone(), ints(&[2, 4])])),
            json!(true)
        );
        assert_eq!(
            json(call("all", vec![is_even.clone(), ints(&[2, 3])])),
            json!(false)
        );
        assert_eq!(
            json(call("any", vec![is_even.clone(), ints(&[1, 3])])),
            json!(false)
        );
        assert_eq!(json(call("any", vec![is_even, ints(&[1, 2])])), json!(true));
        let err = call("all", vec![Value::Int(1), ints(&[])]).unwrap_err();
        assert_eq!(err.to_string(), "all expects a lambda, got an int.");
    }

    #[test]
    fn test_map_is_lazy() {
        let runtime = Rc::new(Runtime::default());
        let abort = builtin(&runtime, "abort");
        let mapped = builtin(&runtime, "map")
            .apply(abort)
            .and_then(|f| f.apply(Value::from(vec!["x"])))
            .unwrap();
        let length = builtin(&runtime, "length").apply(mapped.clone()).unwrap();
        assert!(matches!(length, Value::Int(1)));
        assert!(mapped.to_serde_json().is_err());
    }

    #[test]
    fn test_filter_fold_concat() {
        let positive = Value::lambda(|v| v.less(&Value::Int(0)).map(|b| Value::Bool(!b)));
        assert_eq!(
            json(call("filter", vec![positive, ints(&[-1, 2, -3, 4])])),
            json!([2, 4])
        );
        let plus = Value::lambda(|a| Ok(Value::lambda(move |b| a.add(&b))));
        assert_eq!(
            json(call("foldl'", vec![plus, Value::Int(0), ints(&[1, 2, 3])])),
            json!(6)
        );
        assert_eq!(
            json(call(
                "concatLists",
                vec![Value::list(vec![ints(&[1]), ints(&[2, 3])])]
            )),
            json!([1, 2, 3])
        );
        let twice = Value::lambda(|v| Ok(Value::list(vec![v.clone(), v])));
        assert_eq!(
            json(call("concatMap", vec![twice, ints(&[1, 2])])),
            json!([1, 1, 2, 2])
        );
    }

    #[test]
    fn test_gen_list_and_sort() {
        let square = Value::lambda(|v| v.mul(&v));
        assert_eq!(
            json(call("genList", vec![square, Value::Int(4)])),
            json!([0, 1, 4, 9])
        );
        assert_eq!(
            call("genList", vec![Value::lambda(Ok), Value::Int(-1)])
                .unwrap_err()
                .code(),
            "builtins-genlist-negative-length"
        );

        let less = Value::lambda(|a| Ok(Value::lambda(move |b| Ok(Value::Bool(a.less(&b)?)))));
        assert_eq!(
            json(call("sort", vec![less, ints(&[3, 1, 2, 1])])),
            json!([1, 1, 2, 3])
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let by_first = Value::lambda(|a| {
            Ok(Value::lambda(move |b| {
                let x = a.select(&[Value::from("k")], None)?;
                let y = b.select(&[Value::from("k")], None)?;
                Ok(Value::Bool(x.less(&y)?))
            }))
        });
        let items = Value::list(vec![
            set(&[("k", Value::Int(1)), ("v", Value::from("a"))]),
            set(&[("k", Value::Int(0)), ("v", Value::from("b"))]),
            set(&[("k", Value::Int(1)), ("v", Value::from("c"))]),
        ]);
        assert_eq!(
            json(call("sort", vec![by_first, items])),
            json!([{ "k": 0, "v": "b" }, { "k": 1, "v": "a" }, { "k": 1, "v": "c" }])
        );
    }

    #[test]
    fn test_partition_and_group_by() {
        let big = Value::lambda(|v| Ok(Value::Bool(Value::Int(2).less(&v)?)));
        assert_eq!(
            json(call("partition", vec![big, ints(&[1, 3, 2, 4])])),
            json!({ "right": [3, 4], "wrong": [1, 2] })
        );
        let parity = Value::lambda(|v| match v.to_strict()? {
            Value::Int(n) if n % 2 == 0 => Ok(Value::from("even")),
            _ => Ok(Value::from("odd")),
        });
        assert_eq!(
            json(call("groupBy", vec![parity, ints(&[1, 2, 3])])),
            json!({ "even": [2], "odd": [1, 3] })
        );
    }

    #[test]
    fn test_attr_names_and_values_are_sorted() {
        let value = set(&[
            ("b", Value::Int(2)),
            ("a", Value::Int(1)),
            ("c", Value::Int(3)),
        ]);
        assert_eq!(
            json(call("attrNames", vec![value.clone()])),
            json!(["a", "b", "c"])
        );
        assert_eq!(json(call("attrValues", vec![value])), json!([1, 2, 3]));
        let err = call("attrNames", vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "attrNames expects a set, got an int.");
    }

    #[test]
    fn test_attr_access_builtins() {
        let value = set(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        assert_eq!(
            json(call("hasAttr", vec![Value::from("a"), value.clone()])),
            json!(true)
        );
        assert_eq!(
            json(call("getAttr", vec![Value::from("b"), value.clone()])),
            json!(2)
        );
        assert_eq!(
            call("getAttr", vec![Value::from("z"), value.clone()])
                .unwrap_err()
                .code(),
            "missing-attribute"
        );
        assert_eq!(
            json(call(
                "removeAttrs",
                vec![value.clone(), Value::from(vec!["a", "x"])]
            )),
            json!({ "b": 2 })
        );
        assert_eq!(
            json(call(
                "intersectAttrs",
                vec![set(&[("a", Value::Null)]), value.clone()]
            )),
            json!({ "a": 1 })
        );
        assert_eq!(
            json(call(
                "catAttrs",
                vec![Value::from("a"), Value::list(vec![value, set(&[])])]
            )),
            json!([1])
        );
    }

    #[test]
    fn test_list_to_attrs_first_wins() {
        let entry = |name: &str, value: i64| {
            set(&[("name", Value::from(name)), ("value", Value::Int(value))])
        };
        let list = Value::list(vec![entry("a", 1), entry("b", 2), entry("a", 3)]);
        assert_eq!(
            json(call("listToAttrs", vec![list])),
            json!({ "a": 1, "b": 2 })
        );
    }

    #[test]
    fn test_map_attrs() {
        let f = Value::lambda(|name| {
            Ok(Value::lambda(move |value| {
                name.add(&Value::from("="))?.add(&builtin_to_string(value)?)
            }))
        });
        assert_eq!(
            json(call("mapAttrs", vec![f, set(&[("a", Value::Int(1))])])),
            json!({ "a": "a=1" })
        );
    }

    #[test]
    fn test_type_builtins() {
        assert_eq!(json(call("typeOf", vec![Value::Int(1)])), json!("int"));
        assert_eq!(json(call("typeOf", vec![set(&[])])), json!("set"));
        assert_eq!(json(call("isNull", vec![Value::Null])), json!(true));
        assert_eq!(json(call("isString", vec![Value::path("/a")])), json!(false));
        assert_eq!(json(call("isPath", vec![Value::path("/a")])), json!(true));
        assert_eq!(json(call("isFunction", vec![Value::lambda(Ok)])), json!(true));
    }

    #[test]
    fn test_base_name_of() {
        assert_eq!(
            json(call("baseNameOf", vec![Value::from("/foo/bar/baz/")])),
            json!("baz")
        );
        assert_eq!(
            json(call("baseNameOf", vec![Value::from("/foo/bar/baz//")])),
            json!("")
        );
        let result = call("baseNameOf", vec![Value::path("/foo/bar")]).unwrap();
        assert!(matches!(result, Value::String(s) if &*s == "bar"));
    }

    #[test]
    fn test_dir_of() {
        let result = call("dirOf", vec![Value::path("/foo/bar")]).unwrap();
        assert!(matches!(result, Value::Path(p) if &*p == "/foo"));
        let result = call("dirOf", vec![Value::from("foo/bar")]).unwrap();
        assert!(matches!(result, Value::String(s) if &*s == "foo"));
    }

    #[test]
    fn test_string_builtins() {
        assert_eq!(json(call("stringLength", vec![Value::from("abc")])), json!(3));
        assert_eq!(
            json(call(
                "substring",
                vec![Value::Int(1), Value::Int(2), Value::from("hello")]
            )),
            json!("el")
        );
        assert_eq!(
            json(call(
                "substring",
                vec![Value::Int(3), Value::Int(-1), Value::from("hello")]
            )),
            json!("lo")
        );
        assert_eq!(
            json(call(
                "substring",
                vec![Value::Int(10), Value::Int(2), Value::from("hello")]
            )),
            json!("")
        );
        assert_eq!(
            call(
                "substring",
                vec![Value::Int(-1), Value::Int(2), Value::from("hello")]
            )
            .unwrap_err()
            .code(),
            "builtins-substring-negative-start"
        );
        assert_eq!(
            json(call(
                "concatStringsSep",
                vec![Value::from(", "), Value::from(vec!["a", "b"])]
            )),
            json!("a, b")
        );
    }

    #[test]
    fn test_to_string() {
        assert_eq!(json(call("toString", vec![Value::Int(42)])), json!("42"));
        assert_eq!(json(call("toString", vec![Value::Bool(true)])), json!("1"));
        assert_eq!(json(call("toString", vec![Value::Null])), json!(""));
        assert_eq!(json(call("toString", vec![Value::Float(1.5)])), json!("1.500000"));
        assert_eq!(
            json(call("toString", vec![Value::list(vec![ints(&[1, 2]), Value::from("x")])])),
            json!("1 2 x")
        );
        assert_eq!(
            json(call("toString", vec![set(&[("outPath", Value::from("/out"))])])),
            json!("/out")
        );
        assert!(call("toString", vec![set(&[])]).is_err());
        assert!(call("toString", vec![Value::lambda(Ok)]).is_err());
    }

    #[test]
    fn test_bitwise_and_rounding() {
        assert_eq!(json(call("bitAnd", vec![Value::Int(6), Value::Int(3)])), json!(2));
        assert_eq!(json(call("bitOr", vec![Value::Int(6), Value::Int(3)])), json!(7));
        assert_eq!(json(call("bitXor", vec![Value::Int(6), Value::Int(3)])), json!(5));
        assert_eq!(json(call("ceil", vec![Value::Float(1.2)])), json!(2));
        assert_eq!(json(call("floor", vec![Value::Float(-1.2)])), json!(-2));
        assert_eq!(json(call("floor", vec![Value::Int(3)])), json!(3));
    }

    #[test]
    fn test_rounding_rejects_unrepresentable_floats() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1.0e19, -1.0e19] {
            let err = call("ceil", vec![Value::Float(f)]).unwrap_err();
            assert_eq!(err.code(), "builtins-ceil-out-of-range");
            let err = call("floor", vec![Value::Float(f)]).unwrap_err();
            assert_eq!(err.code(), "builtins-floor-out-of-range");
        }
        assert_eq!(
            json(call("floor", vec![Value::Float(-9.0e18)])),
            json!(-9_000_000_000_000_000_000i64)
        );
    }

    #[test]
    fn test_type_errors_name_the_builtin() {
        let err = call("lessThan", vec![Value::Int(1), Value::from("a")]).unwrap_err();
        assert_eq!(err.to_string(), "lessThan expects an int or a float, got a string.");
        let err = call("lessThan", vec![Value::Null, Value::Int(1)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "lessThan expects an int, a float, a string, a path, or a list, got a null."
        );
        assert_eq!(
            json(call("lessThan", vec![Value::from("a"), Value::from("b")])),
            json!(true)
        );

        let err = call("abort", vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "abort expects a string or a path, got an int.");
        let err = call("throw", vec![Value::Null]).unwrap_err();
        assert_eq!(err.to_string(), "throw expects a string or a path, got a null.");

        let err = call("toString", vec![Value::lambda(Ok)]).unwrap_err();
        assert!(err.to_string().starts_with("toString expects a string, a path,"));
        assert!(err.to_string().ends_with("got a lambda."));
        let err = call("toString", vec![set(&[])]).unwrap_err();
        assert!(err.to_string().ends_with("got a set."));
    }

    #[test]
    fn test_seq() {
        let runtime = Rc::new(Runtime::default());
        let ctx = runtime.root_context("/");
        let boom = Value::Lazy(Thunk::new(&ctx, |_| Err(EvalError::abort("x"))));
        assert!(builtin(&runtime, "seq")
            .apply(boom.clone())
            .and_then(|f| f.apply(Value::Int(1)))
            .is_err());
        let nested = set(&[("a", boom)]);
        assert!(builtin(&runtime, "seq")
            .apply(nested.clone())
            .and_then(|f| f.apply(Value::Int(1)))
            .is_ok());
        assert!(builtin(&runtime, "deepSeq")
            .apply(nested)
            .and_then(|f| f.apply(Value::Int(1)))
            .is_err());
    }

    #[test]
    fn test_trace_uses_debug_sink() {
        let sink = Rc::new(crate::evaluator::MemorySink::new());
        let runtime = Rc::new(Runtime::default().with_debug_sink(sink.clone()));
        let result = builtin(&runtime, "trace")
            .apply(Value::from("hello"))
            .and_then(|f| f.apply(Value::Int(1)))
            .unwrap();
        assert!(matches!(result, Value::Int(1)));
        assert_eq!(sink.messages(), vec!["trace: \"hello\""]);
    }

    #[test]
    fn test_unimplemented_builtins() {
        for name in ["readFile", "fetchurl", "hashString", "toJSON", "fromJSON"] {
            let err = call(name, vec![Value::from("x")]).unwrap_err();
            assert_eq!(
                err.kind,
                ErrorKind::Unimplemented {
                    builtin: name.to_string()
                }
            );
        }
    }

    #[test]
    fn test_import_without_resolver() {
        let err = call("import", vec![Value::path("/a.nix")]).unwrap_err();
        assert_eq!(err.code(), "unimplemented");
        let err = call("import", vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "import expects a string or a path, got an int.");
    }
}
