//! Merging of attribute sets
//!
//! Two operations combine attrsets:
//! - disjoint recursive merge, used when an attrset literal defines the same
//!   attribute more than once (`{ a.b = 1; a.c = 2; }`); only attrsets may
//!   be defined twice, and their keys merge depth first
//! - update (`//`), where the right-hand side wins on every collision

use crate::errors::{EvalError, EvalResult};

use super::attrset::Attrset;
use super::scope::EvalCtx;
use super::thunk::Thunk;
use super::value::Value;

/// A thunk merging `existing` and `new`, defined at `attr_path`
pub(crate) fn merge_thunk(
    ctx: &EvalCtx,
    existing: Value,
    new: Value,
    attr_path: Vec<String>,
) -> Value {
    Value::Lazy(Thunk::new(ctx, move |ctx| {
        disjoint_merge(ctx, existing, new, attr_path)
    }))
}

/// Force a value about to be merged; anything but an attrset is a duplicate
/// definition of `attr_path`
fn mergeable(value: &Value, attr_path: &[String]) -> EvalResult<Attrset> {
    match value.to_strict()? {
        Value::Attrset(attrs) => Ok(attrs),
        _ => Err(EvalError::attribute_already_defined(attr_path.to_vec())),
    }
}

/// Merge two definitions of the attribute at `attr_path`.
///
/// Keys present on one side only are copied; keys present on both sides
/// become thunks merging the nested values with the path extended by that key.
pub fn disjoint_merge(
    ctx: &EvalCtx,
    existing: Value,
    new: Value,
    attr_path: Vec<String>,
) -> EvalResult<Value> {
    let existing = mergeable(&existing, &attr_path)?;
    let new = mergeable(&new, &attr_path)?;

    let mut merged = existing.to_map()?;
    for (name, new_value) in new.to_map()? {
        let value = match merged.get(&name) {
            Some(old_value) => {
                let mut nested_path = attr_path.clone();
                nested_path.push(name.clone());
                merge_thunk(ctx, old_value.clone(), new_value, nested_path)
            }
            None => new_value,
        };
        merged.insert(name, value);
    }
    Ok(Value::attrset(merged))
}

/// `lhs // rhs`: a new attrset where `rhs` wins on collisions
pub fn update(lhs: &Attrset, rhs: &Attrset) -> EvalResult<Attrset> {
    let mut merged = lhs.to_map()?;
    for (name, value) in rhs.to_map()? {
        merged.insert(name, value);
    }
    Ok(Attrset::strict(merged))
}
