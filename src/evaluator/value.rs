//! Runtime values
//!
//! A [`Value`] is either strict (already computed) or [`Value::Lazy`], a
//! shared thunk that produces a strict value the first time it is forced.
//! Lists and attrsets are shared immutable structures; "modifying" one always
//! allocates a new value.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{EvalError, EvalResult};

use super::attrset::{AttrMap, Attrset};
use super::thunk::Thunk;

/// The type of a strict value, as reported by `typeOf` and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Float,
    String,
    Path,
    List,
    Set,
    Lambda,
}

impl ValueType {
    /// Name returned by `builtins.typeOf`
    pub fn type_name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Path => "path",
            ValueType::List => "list",
            ValueType::Set => "set",
            ValueType::Lambda => "lambda",
        }
    }

    /// Name used in error messages ("an int", "a set")
    pub fn human_readable(self) -> &'static str {
        match self {
            ValueType::Null => "a null",
            ValueType::Bool => "a boolean",
            ValueType::Int => "an int",
            ValueType::Float => "a float",
            ValueType::String => "a string",
            ValueType::Path => "a path",
            ValueType::List => "a list",
            ValueType::Set => "a set",
            ValueType::Lambda => "a lambda",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A single-argument function. Multi-argument functions are curried.
#[derive(Clone)]
pub struct Lambda(Rc<dyn Fn(Value) -> EvalResult<Value>>);

impl Lambda {
    pub fn new(f: impl Fn(Value) -> EvalResult<Value> + 'static) -> Self {
        Lambda(Rc::new(f))
    }

    pub fn call(&self, arg: Value) -> EvalResult<Value> {
        (self.0)(arg)
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<LAMBDA>")
    }
}

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// 64-bit signed integer with wrapping arithmetic
    Int(i64),
    Float(f64),
    String(Rc<str>),
    /// Absolute, normalized path
    Path(Rc<str>),
    List(Rc<[Value]>),
    Attrset(Attrset),
    Lambda(Lambda),
    /// Deferred computation, forced on demand
    Lazy(Thunk),
}

impl Value {
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        Value::String(text.into())
    }

    pub fn path(text: impl Into<Rc<str>>) -> Self {
        Value::Path(text.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(items.into())
    }

    pub fn lambda(f: impl Fn(Value) -> EvalResult<Value> + 'static) -> Self {
        Value::Lambda(Lambda::new(f))
    }

    /// A strict attrset from a ready mapping
    pub fn attrset(map: AttrMap) -> Self {
        Value::Attrset(Attrset::strict(map))
    }

    /// Force this value. Strict values are returned unchanged; thunks are
    /// forced (once) and their memoized result returned.
    pub fn to_strict(&self) -> EvalResult<Value> {
        match self {
            Value::Lazy(thunk) => thunk.force(),
            other => Ok(other.clone()),
        }
    }

    /// Type of the forced value
    pub fn type_of(&self) -> EvalResult<ValueType> {
        Ok(match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Path(_) => ValueType::Path,
            Value::List(_) => ValueType::List,
            Value::Attrset(_) => ValueType::Set,
            Value::Lambda(_) => ValueType::Lambda,
            Value::Lazy(thunk) => return thunk.force()?.type_of(),
        })
    }

    /// Check if this value is null (without forcing)
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert to a JSON value, forcing everything reachable.
    /// Attrset keys come out sorted.
    pub fn to_serde_json(&self) -> EvalResult<serde_json::Value> {
        Ok(match self.to_strict()? {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::Number(serde_json::Number::from(n)),
            Value::Float(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) | Value::Path(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_serde_json)
                    .collect::<EvalResult<_>>()?,
            ),
            Value::Attrset(attrs) => {
                let mut map = serde_json::Map::new();
                for (key, value) in attrs.sorted_entries()? {
                    map.insert(key, value.to_serde_json()?);
                }
                serde_json::Value::Object(map)
            }
            Value::Lambda(_) => {
                return Err(EvalError::other(
                    "Cannot convert a lambda to JSON",
                    "json-lambda",
                ))
            }
            Value::Lazy(thunk) => return thunk.force()?.to_serde_json(),
        })
    }

    /// Convert a serde_json::Value into a strict value
    pub fn from_serde_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(arr) => {
                Value::list(arr.into_iter().map(Value::from_serde_json).collect())
            }
            serde_json::Value::Object(obj) => Value::attrset(
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from_serde_json(v)))
                    .collect(),
            ),
        }
    }
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '$' => f.write_str("\\$")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

/// Renders what is already evaluated; nothing is forced.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write_string(f, s),
            Value::Path(p) => write!(f, "{}", p),
            Value::List(items) => {
                write!(f, "[ ")?;
                for item in items.iter() {
                    write!(f, "{} ", item)?;
                }
                write!(f, "]")
            }
            Value::Attrset(attrs) => match attrs.peek_map() {
                Some(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    write!(f, "{{ ")?;
                    for key in keys {
                        write!(f, "{} = {}; ", key, map[key])?;
                    }
                    write!(f, "}}")
                }
                None => write!(f, "<LAZY ATTRSET>"),
            },
            Value::Lambda(_) => write!(f, "<LAMBDA>"),
            Value::Lazy(thunk) => match thunk.peek() {
                Some(value) => write!(f, "{}", value),
                None => write!(f, "<CODE>"),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::attrset(m)
    }
}

impl From<Attrset> for Value {
    fn from(attrs: Attrset) -> Self {
        Value::Attrset(attrs)
    }
}

impl From<Thunk> for Value {
    fn from(thunk: Thunk) -> Self {
        Value::Lazy(thunk)
    }
}
