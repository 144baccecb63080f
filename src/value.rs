// used to print out readable forms of a value
use std::fmt;
// comparisons return an ordering, or nothing when one side is null
use std::cmp::Ordering;

// values are part of the archived plan (literal parameters)
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::rowset::{RowId, RowSet};

/// A runtime value held by a variable in the data space.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Unsigned(RowId),
    Float(f64),
    Text(String),
    RowSet(RowSet),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Unsigned(_) => "unsigned",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::RowSet(_) => "rowset",
        }
    }
    /// A null of the same shape. Row sets stay row sets so that holders
    /// checked at initialize time remain valid after a reset.
    pub fn null_like(&self) -> Value {
        match self {
            Value::RowSet(_) => Value::RowSet(RowSet::new()),
            _ => Value::Null,
        }
    }
    pub fn as_row_id(&self) -> Option<RowId> {
        match self {
            Value::Unsigned(u) => Some(*u),
            Value::Integer(i) => RowId::try_from(*i).ok(),
            _ => None,
        }
    }
    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Unsigned(u) => Some(f64::from(*u)),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Three-way comparison. `Ok(None)` when either side is null; numeric
    /// kinds compare with each other, everything else only with its own kind.
    pub fn compare_to(&self, other: &Value, predicate: &'static str) -> Result<Option<Ordering>> {
        let ordering = match (self, other) {
            (Value::Null, _) | (_, Value::Null) => return Ok(None),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Unsigned(a), Value::Unsigned(b)) => a.cmp(b),
            (Value::Integer(a), Value::Unsigned(b)) => a.cmp(&i64::from(*b)),
            (Value::Unsigned(a), Value::Integer(b)) => i64::from(*a).cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                    KernelError::InvalidArgumentType { predicate, found: "NaN".into() }
                })?,
                _ => {
                    return Err(KernelError::InvalidArgumentType {
                        predicate,
                        found: format!("{} and {}", a.type_name(), b.type_name()),
                    });
                }
            },
        };
        Ok(Some(ordering))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "(null)"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Unsigned(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::RowSet(r) => write!(f, "{}", r),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Integer(i) }
}
impl From<u32> for Value {
    fn from(u: u32) -> Self { Value::Unsigned(u) }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Boolean(b) }
}
impl From<f64> for Value {
    fn from(x: f64) -> Self { Value::Float(x) }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Text(s.to_owned()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::Text(s) }
}
impl From<RowSet> for Value {
    fn from(r: RowSet) -> Self { Value::RowSet(r) }
}
