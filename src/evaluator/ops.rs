//! Operators on values
//!
//! Every operator forces its operands first and then matches on the pair of
//! variants. Unsupported pairs fail with a type mismatch naming the types the
//! operator would have accepted.

use std::rc::Rc;

use crate::errors::{ErrorMessage, EvalError, EvalResult};

use super::attrset::{attr_name, Attrset};
use super::merge;
use super::path::{join_paths, normalize_path};
use super::value::{Value, ValueType};

const NUMBERS: [ValueType; 2] = [ValueType::Int, ValueType::Float];

enum Numbers {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numbers(lhs: &Value, rhs: &Value) -> Option<Numbers> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(Numbers::Ints(*a, *b)),
        (Value::Int(a), Value::Float(b)) => Some(Numbers::Floats(*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Some(Numbers::Floats(*a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Some(Numbers::Floats(*a, *b)),
        _ => None,
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_))
}

/// Type mismatch for an arithmetic operator other than `+`: the first
/// non-numeric operand is the offender.
fn arithmetic_error(
    lhs: &Value,
    rhs: &Value,
    message: impl FnOnce(ValueType, ValueType) -> ErrorMessage,
) -> EvalResult<EvalError> {
    let lhs_type = lhs.type_of()?;
    let rhs_type = rhs.type_of()?;
    let got = if is_number(lhs) { rhs_type } else { lhs_type };
    Ok(EvalError::type_mismatch_with(
        NUMBERS.to_vec(),
        got,
        message(lhs_type, rhs_type),
    ))
}

fn division_by_zero() -> EvalError {
    EvalError::other("Division by zero", "division-by-zero")
}

impl Value {
    /// `lhs + rhs`: numbers, string concatenation and path joining
    pub fn add(&self, rhs: &Value) -> EvalResult<Value> {
        let lhs = self.to_strict()?;
        let rhs = rhs.to_strict()?;
        if let Some(nums) = numbers(&lhs, &rhs) {
            return Ok(match nums {
                Numbers::Ints(a, b) => Value::Int(a.wrapping_add(b)),
                Numbers::Floats(a, b) => Value::Float(a + b),
            });
        }
        match (&lhs, &rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::string(format!("{}{}", a, b))),
            (Value::String(a), Value::Path(b)) => {
                Ok(Value::string(normalize_path(&format!("{}{}", a, b))))
            }
            (Value::Path(a), Value::Path(b)) => Ok(Value::path(normalize_path(&join_paths(a, b)))),
            (Value::Path(a), Value::String(b)) => {
                Ok(Value::path(normalize_path(&format!("{}{}", a, b))))
            }
            _ => {
                let lhs_type = lhs.type_of()?;
                let rhs_type = rhs.type_of()?;
                let (expected, got) = match lhs_type {
                    ValueType::Int | ValueType::Float => (NUMBERS.to_vec(), rhs_type),
                    ValueType::String => (vec![ValueType::String, ValueType::Path], rhs_type),
                    ValueType::Path => (vec![ValueType::Path, ValueType::String], rhs_type),
                    _ => (
                        vec![
                            ValueType::Int,
                            ValueType::Float,
                            ValueType::String,
                            ValueType::Path,
                        ],
                        lhs_type,
                    ),
                };
                let message = ErrorMessage::new()
                    .plain("Cannot add ")
                    .value_type(rhs_type)
                    .plain(" to ")
                    .value_type(lhs_type);
                Err(EvalError::type_mismatch_with(expected, got, message))
            }
        }
    }

    /// `lhs - rhs`
    pub fn sub(&self, rhs: &Value) -> EvalResult<Value> {
        let lhs = self.to_strict()?;
        let rhs = rhs.to_strict()?;
        match numbers(&lhs, &rhs) {
            Some(Numbers::Ints(a, b)) => Ok(Value::Int(a.wrapping_sub(b))),
            Some(Numbers::Floats(a, b)) => Ok(Value::Float(a - b)),
            None => Err(arithmetic_error(&lhs, &rhs, |l, r| {
                ErrorMessage::new()
                    .plain("Cannot subtract ")
                    .value_type(r)
                    .plain(" from ")
                    .value_type(l)
            })?),
        }
    }

    /// `lhs * rhs`
    pub fn mul(&self, rhs: &Value) -> EvalResult<Value> {
        let lhs = self.to_strict()?;
        let rhs = rhs.to_strict()?;
        match numbers(&lhs, &rhs) {
            Some(Numbers::Ints(a, b)) => Ok(Value::Int(a.wrapping_mul(b))),
            Some(Numbers::Floats(a, b)) => Ok(Value::Float(a * b)),
            None => Err(arithmetic_error(&lhs, &rhs, |l, r| {
                ErrorMessage::new()
                    .plain("Cannot multiply ")
                    .value_type(l)
                    .plain(" with ")
                    .value_type(r)
            })?),
        }
    }

    /// `lhs / rhs`. Integer division truncates toward zero.
    pub fn div(&self, rhs: &Value) -> EvalResult<Value> {
        let lhs = self.to_strict()?;
        let rhs = rhs.to_strict()?;
        match numbers(&lhs, &rhs) {
            Some(Numbers::Ints(_, 0)) => Err(division_by_zero()),
            Some(Numbers::Ints(a, b)) => Ok(Value::Int(a.wrapping_div(b))),
            Some(Numbers::Floats(_, b)) if b == 0.0 => Err(division_by_zero()),
            Some(Numbers::Floats(a, b)) => Ok(Value::Float(a / b)),
            None => Err(arithmetic_error(&lhs, &rhs, |l, r| {
                ErrorMessage::new()
                    .plain("Cannot divide ")
                    .value_type(l)
                    .plain(" by ")
                    .value_type(r)
            })?),
        }
    }

    /// `-value`
    pub fn neg(&self) -> EvalResult<Value> {
        match self.to_strict()? {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => {
                let got = other.type_of()?;
                Err(EvalError::type_mismatch_with(
                    NUMBERS.to_vec(),
                    got,
                    ErrorMessage::new().plain("Cannot negate ").value_type(got),
                ))
            }
        }
    }

    /// The boolean this value holds
    pub fn as_boolean(&self) -> EvalResult<bool> {
        match self.to_strict()? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::type_mismatch(
                vec![ValueType::Bool],
                other.type_of()?,
            )),
        }
    }

    /// The text of a string or path
    pub fn as_string(&self) -> EvalResult<Rc<str>> {
        match self.to_strict()? {
            Value::String(s) | Value::Path(s) => Ok(s),
            other => Err(EvalError::type_mismatch(
                vec![ValueType::String, ValueType::Path],
                other.type_of()?,
            )),
        }
    }

    /// `lhs && rhs`; `rhs` is not inspected when `lhs` is false
    pub fn and(&self, rhs: &Value) -> EvalResult<Value> {
        Ok(Value::Bool(self.as_boolean()? && rhs.as_boolean()?))
    }

    /// `lhs || rhs`; `rhs` is not inspected when `lhs` is true
    pub fn or(&self, rhs: &Value) -> EvalResult<Value> {
        Ok(Value::Bool(self.as_boolean()? || rhs.as_boolean()?))
    }

    /// `lhs -> rhs`; `rhs` is not inspected when `lhs` is false
    pub fn implication(&self, rhs: &Value) -> EvalResult<Value> {
        Ok(Value::Bool(!self.as_boolean()? || rhs.as_boolean()?))
    }

    /// `!value`
    pub fn invert(&self) -> EvalResult<Value> {
        Ok(Value::Bool(!self.as_boolean()?))
    }

    /// Structural equality. Never fails on types; only forcing can fail.
    pub fn eq(&self, rhs: &Value) -> EvalResult<bool> {
        let lhs = self.to_strict()?;
        let rhs = rhs.to_strict()?;
        if let Some(nums) = numbers(&lhs, &rhs) {
            return Ok(match nums {
                Numbers::Ints(a, b) => a == b,
                Numbers::Floats(a, b) => a == b,
            });
        }
        Ok(match (&lhs, &rhs) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Path(a), Value::Path(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.eq(y)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Attrset(a), Value::Attrset(b)) => {
                if a.len()? != b.len()? {
                    return Ok(false);
                }
                for (name, x) in a.sorted_entries()? {
                    match b.get(&name)? {
                        Some(y) if x.eq(&y)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            _ => false,
        })
    }

    /// `lhs != rhs`
    pub fn neq(&self, rhs: &Value) -> EvalResult<bool> {
        Ok(!self.eq(rhs)?)
    }

    /// `lhs < rhs` for numbers, strings, paths and lists
    pub fn less(&self, rhs: &Value) -> EvalResult<bool> {
        let lhs = self.to_strict()?;
        let rhs = rhs.to_strict()?;
        if let Some(nums) = numbers(&lhs, &rhs) {
            return Ok(match nums {
                Numbers::Ints(a, b) => a < b,
                Numbers::Floats(a, b) => a < b,
            });
        }
        match (&lhs, &rhs) {
            (Value::String(a), Value::String(b)) => Ok(a < b),
            (Value::Path(a), Value::Path(b)) => Ok(a < b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let x = x.to_strict()?;
                    let y = y.to_strict()?;
                    // equal booleans and nulls are skipped without ordering them
                    match (&x, &y) {
                        (Value::Bool(p), Value::Bool(q)) if p == q => continue,
                        (Value::Null, Value::Null) => continue,
                        _ => {}
                    }
                    if x.less(&y)? {
                        return Ok(true);
                    }
                    if y.less(&x)? {
                        return Ok(false);
                    }
                }
                Ok(a.len() < b.len())
            }
            _ => {
                let lhs_type = lhs.type_of()?;
                let rhs_type = rhs.type_of()?;
                let (expected, got) = match lhs_type {
                    ValueType::Int | ValueType::Float => (NUMBERS.to_vec(), rhs_type),
                    ValueType::String | ValueType::Path | ValueType::List => {
                        (vec![lhs_type], rhs_type)
                    }
                    _ => (
                        vec![
                            ValueType::Int,
                            ValueType::Float,
                            ValueType::String,
                            ValueType::Path,
                            ValueType::List,
                        ],
                        lhs_type,
                    ),
                };
                let message = ErrorMessage::new()
                    .plain("Cannot compare ")
                    .value_type(lhs_type)
                    .plain(" with ")
                    .value_type(rhs_type);
                Err(EvalError::type_mismatch_with(expected, got, message))
            }
        }
    }

    /// `lhs <= rhs`
    pub fn less_eq(&self, rhs: &Value) -> EvalResult<bool> {
        Ok(!rhs.less(self)?)
    }

    /// `lhs > rhs`
    pub fn more(&self, rhs: &Value) -> EvalResult<bool> {
        rhs.less(self)
    }

    /// `lhs >= rhs`
    pub fn more_eq(&self, rhs: &Value) -> EvalResult<bool> {
        Ok(!self.less(rhs)?)
    }

    /// `lhs ++ rhs`
    pub fn concat(&self, rhs: &Value) -> EvalResult<Value> {
        let lhs = self.to_strict()?;
        let rhs = rhs.to_strict()?;
        match (&lhs, &rhs) {
            (Value::List(a), Value::List(b)) => {
                Ok(Value::list(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => {
                let lhs_type = lhs.type_of()?;
                let rhs_type = rhs.type_of()?;
                let got = if lhs_type == ValueType::List {
                    rhs_type
                } else {
                    lhs_type
                };
                let message = ErrorMessage::new()
                    .plain("Cannot concatenate ")
                    .value_type(lhs_type)
                    .plain(" and ")
                    .value_type(rhs_type);
                Err(EvalError::type_mismatch_with(
                    vec![ValueType::List],
                    got,
                    message,
                ))
            }
        }
    }

    /// `lhs // rhs`
    pub fn update(&self, rhs: &Value) -> EvalResult<Value> {
        let lhs = self.to_strict()?;
        let rhs = rhs.to_strict()?;
        match (&lhs, &rhs) {
            (Value::Attrset(a), Value::Attrset(b)) => Ok(Value::Attrset(merge::update(a, b)?)),
            _ => {
                let lhs_type = lhs.type_of()?;
                let rhs_type = rhs.type_of()?;
                let got = if lhs_type == ValueType::Set {
                    rhs_type
                } else {
                    lhs_type
                };
                let message = ErrorMessage::new()
                    .plain("Cannot merge ")
                    .value_type(lhs_type)
                    .plain(" with ")
                    .value_type(rhs_type);
                Err(EvalError::type_mismatch_with(
                    vec![ValueType::Set],
                    got,
                    message,
                ))
            }
        }
    }

    /// `value ? a.b.c`. A missing link or a non-attrset anywhere yields false.
    pub fn has(&self, attr_path: &[Value]) -> EvalResult<bool> {
        let mut current = self.clone();
        for name in attr_path {
            let attrs = match current.to_strict()? {
                Value::Attrset(attrs) => attrs,
                _ => return Ok(false),
            };
            match attrs.get_value(name)? {
                Some(value) => current = value,
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// `value.a.b.c` or `value.a.b.c or default`.
    ///
    /// The returned value is not forced.
    pub fn select(&self, attr_path: &[Value], default: Option<Value>) -> EvalResult<Value> {
        let names = attr_path
            .iter()
            .map(attr_name)
            .collect::<EvalResult<Vec<String>>>()?;

        let mut current = self.clone();
        for (i, name) in names.iter().enumerate() {
            let attrs: Attrset = match current.to_strict()? {
                Value::Attrset(attrs) => attrs,
                other => {
                    return match default {
                        Some(default) => Ok(default),
                        None if i == 0 => {
                            let got = other.type_of()?;
                            Err(EvalError::type_mismatch_with(
                                vec![ValueType::Set],
                                got,
                                ErrorMessage::new()
                                    .plain("Cannot select attribute from ")
                                    .value_type(got),
                            ))
                        }
                        None => Err(EvalError::missing_attribute(names.clone())),
                    }
                }
            };
            match attrs.get(name)? {
                Some(value) => current = value,
                None => {
                    return default.ok_or_else(|| EvalError::missing_attribute(names.clone()))
                }
            }
        }
        Ok(current)
    }

    /// Call this value with `arg`
    pub fn apply(&self, arg: Value) -> EvalResult<Value> {
        match self.to_strict()? {
            Value::Lambda(lambda) => lambda.call(arg),
            other => {
                let got = other.type_of()?;
                Err(EvalError::type_mismatch_with(
                    vec![ValueType::Lambda],
                    got,
                    ErrorMessage::new()
                        .plain("Attempt to call something which is not a function but is ")
                        .value_type(got),
                ))
            }
        }
    }
}
