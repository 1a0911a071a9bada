//! The dynamic value model flowing through task ports.
//!
//! Every port carries a [`Value`]. Values are handed between tasks as
//! [`Shared`] pointers, so a value produced once upstream is observed by all
//! of its consumers without being copied. Consumers treat shared values as
//! read-only; operations always build a fresh value.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ValueError;

/// A value shared between tasks.
pub type Shared = Arc<Value>;

/// Longest string (in bytes) or list a repetition may produce.
pub const MAX_REPEAT_LEN: usize = 1 << 24;

/// A dynamically typed datum.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

impl Value {
    /// Short name of the value's type, used in error messages and by the
    /// `type_name` script builtin.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.numeric().map(Num::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn numeric(&self) -> Option<Num> {
        match self {
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    fn unsupported(&self, method: &'static str, other: &Value) -> ValueError {
        ValueError::UnsupportedOperands {
            method,
            left: self.type_name(),
            right: other.type_name(),
        }
    }

    fn arith(
        &self,
        other: &Value,
        method: &'static str,
        int: fn(i64, i64) -> Option<i64>,
        float: fn(f64, f64) -> f64,
    ) -> Result<Value, ValueError> {
        match (self.numeric(), other.numeric()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => {
                int(a, b).map(Value::Int).ok_or(ValueError::Overflow(method))
            }
            (Some(a), Some(b)) => Ok(Value::Float(float(a.as_f64(), b.as_f64()))),
            _ => Err(self.unsupported(method, other)),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, ValueError> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => self.arith(other, "add", i64::checked_add, |a, b| a + b),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value, ValueError> {
        self.arith(other, "sub", i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value, ValueError> {
        match (self, other) {
            (Value::Str(s), Value::Int(n)) => Ok(Value::Str(s.repeat(repeat_count(s.len(), *n)?))),
            (Value::List(l), Value::Int(n)) => {
                let n = repeat_count(l.len(), *n)?;
                Ok(Value::List(
                    std::iter::repeat_n(l.iter(), n).flatten().cloned().collect(),
                ))
            }
            _ => self.arith(other, "mul", i64::checked_mul, |a, b| a * b),
        }
    }

    /// True division, always producing a float.
    pub fn truediv(&self, other: &Value) -> Result<Value, ValueError> {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => {
                let b = b.as_f64();
                if b == 0.0 {
                    return Err(ValueError::ZeroDivision);
                }
                Ok(Value::Float(a.as_f64() / b))
            }
            _ => Err(self.unsupported("truediv", other)),
        }
    }

    /// Division rounding towards negative infinity.
    pub fn floordiv(&self, other: &Value) -> Result<Value, ValueError> {
        match (self.numeric(), other.numeric()) {
            (Some(_), Some(b)) if b.as_f64() == 0.0 => Err(ValueError::ZeroDivision),
            (Some(Num::Int(a)), Some(Num::Int(b))) => {
                let q = a.checked_div(b).ok_or(ValueError::Overflow("floordiv"))?;
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    Ok(Value::Int(q - 1))
                } else {
                    Ok(Value::Int(q))
                }
            }
            (Some(a), Some(b)) => Ok(Value::Float((a.as_f64() / b.as_f64()).floor())),
            _ => Err(self.unsupported("floordiv", other)),
        }
    }

    /// Remainder taking the sign of the divisor.
    pub fn rem(&self, other: &Value) -> Result<Value, ValueError> {
        match (self.numeric(), other.numeric()) {
            (Some(_), Some(b)) if b.as_f64() == 0.0 => Err(ValueError::ZeroDivision),
            (Some(Num::Int(_)), Some(Num::Int(-1))) => Ok(Value::Int(0)),
            (Some(Num::Int(a)), Some(Num::Int(b))) => {
                let r = a.checked_rem(b).ok_or(ValueError::Overflow("mod"))?;
                if r != 0 && ((r < 0) != (b < 0)) {
                    Ok(Value::Int(r + b))
                } else {
                    Ok(Value::Int(r))
                }
            }
            (Some(a), Some(b)) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                Ok(Value::Float(a - b * (a / b).floor()))
            }
            _ => Err(self.unsupported("mod", other)),
        }
    }

    pub fn neg(&self) -> Result<Value, ValueError> {
        match self {
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(ValueError::Overflow("neg")),
            Value::Float(f) => Ok(Value::Float(-f)),
            _ => Err(ValueError::UnsupportedOperand {
                method: "neg",
                operand: self.type_name(),
            }),
        }
    }

    /// Equality with numeric promotion, so `1 == 1.0`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self.numeric(), other.numeric()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
            _ => match (self, other) {
                (Value::List(a), Value::List(b)) => {
                    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
                }
                (Value::Map(a), Value::Map(b)) => {
                    a.len() == b.len()
                        && a.iter()
                            .zip(b)
                            .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
                }
                _ => self == other,
            },
        }
    }

    /// Ordering between numbers or between strings.
    pub fn compare(&self, other: &Value, method: &'static str) -> Result<Ordering, ValueError> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => match (self.numeric(), other.numeric()) {
                (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(a.cmp(&b)),
                (Some(a), Some(b)) => a
                    .as_f64()
                    .partial_cmp(&b.as_f64())
                    .ok_or_else(|| self.unsupported(method, other)),
                _ => Err(self.unsupported(method, other)),
            },
        }
    }

    /// Subscript access: list by (possibly negative) integer, map by string.
    pub fn index(&self, key: &Value) -> Result<Value, ValueError> {
        match (self, key) {
            (Value::List(items), Value::Int(i)) => {
                let len = items.len();
                let at = if *i < 0 { len as i64 + i } else { *i };
                usize::try_from(at)
                    .ok()
                    .and_then(|at| items.get(at))
                    .cloned()
                    .ok_or(ValueError::IndexOutOfRange { index: *i, len })
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len();
                let at = if *i < 0 { len as i64 + i } else { *i };
                usize::try_from(at)
                    .ok()
                    .and_then(|at| chars.get(at))
                    .map(|c| Value::Str(c.to_string()))
                    .ok_or(ValueError::IndexOutOfRange { index: *i, len })
            }
            (Value::Map(map), Value::Str(k)) => map
                .get(k)
                .cloned()
                .ok_or_else(|| ValueError::MissingKey(k.clone())),
            _ => Err(ValueError::NotIndexable {
                container: self.type_name(),
                key: key.type_name(),
            }),
        }
    }

    /// Python-like representation, quoting strings.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{s:?}"),
            other => other.to_string(),
        }
    }

    /// The JSON form of the value. NaN and the infinities have none.
    pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        Ok(match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or(ValueError::NotJsonCompliant(*f))?,
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => {
                serde_json::Value::Array(l.iter().map(Value::to_json).collect::<Result<_, _>>()?)
            }
            Value::Map(m) => serde_json::Value::Object(
                m.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_, ValueError>>()?,
            ),
        })
    }
}

/// Number of copies for `sequence * n`, with negative counts meaning none.
fn repeat_count(len: usize, n: i64) -> Result<usize, ValueError> {
    let n = usize::try_from(n.max(0)).map_err(|_| ValueError::Overflow("mul"))?;
    match len.checked_mul(n) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(n),
        _ => Err(ValueError::Overflow("mul")),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{x:.1}")
            }
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {}", v.repr())?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(Value::Int(2).add(&Value::Int(3)), Ok(Value::Int(5)));
        assert_eq!(Value::Int(2).add(&Value::Float(0.5)), Ok(Value::Float(2.5)));
        assert_eq!(Value::Int(6).truediv(&Value::Int(3)), Ok(Value::Float(2.0)));
        assert_eq!(Value::Int(7).truediv(&Value::Int(0)), Err(ValueError::ZeroDivision));
    }

    #[test]
    fn test_floor_semantics() {
        assert_eq!(Value::Int(-7).floordiv(&Value::Int(2)), Ok(Value::Int(-4)));
        assert_eq!(Value::Int(7).floordiv(&Value::Int(-2)), Ok(Value::Int(-4)));
        assert_eq!(Value::Int(-7).rem(&Value::Int(3)), Ok(Value::Int(2)));
        assert_eq!(Value::Int(7).rem(&Value::Int(-3)), Ok(Value::Int(-2)));
        assert_eq!(Value::Int(i64::MIN).rem(&Value::Int(-1)), Ok(Value::Int(0)));
        assert_eq!(
            Value::Int(i64::MIN).floordiv(&Value::Int(-1)),
            Err(ValueError::Overflow("floordiv"))
        );
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert_eq!(
            Value::Int(i64::MAX).add(&Value::Int(1)),
            Err(ValueError::Overflow("add"))
        );
        assert_eq!(
            Value::from("ab").mul(&Value::Int(i64::MAX)),
            Err(ValueError::Overflow("mul"))
        );
        assert_eq!(
            Value::List(vec![Value::None]).mul(&Value::Int(MAX_REPEAT_LEN as i64 + 1)),
            Err(ValueError::Overflow("mul"))
        );
        assert_eq!(
            Value::from("a").mul(&Value::Int(MAX_REPEAT_LEN as i64)).map(|s| s.to_string().len()),
            Ok(MAX_REPEAT_LEN)
        );
        assert_eq!(Value::from("ab").mul(&Value::Int(-3)), Ok(Value::from("")));
    }

    #[test]
    fn test_sequences() {
        let s = Value::from("ab");
        assert_eq!(s.mul(&Value::Int(3)), Ok(Value::from("ababab")));
        assert_eq!(s.add(&Value::from("c")), Ok(Value::from("abc")));
        assert!(s.sub(&Value::from("a")).is_err());

        let l = Value::List(vec![Value::Int(1)]);
        assert_eq!(
            l.mul(&Value::Int(2)),
            Ok(Value::List(vec![Value::Int(1), Value::Int(1)]))
        );
        assert_eq!(l.index(&Value::Int(-1)), Ok(Value::Int(1)));
        assert!(l.index(&Value::Int(4)).is_err());
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).loose_eq(&Value::from("1")));
        assert!(Value::None.loose_eq(&Value::None));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(
            Value::List(vec![Value::from("a"), Value::Int(1)]).to_string(),
            r#"["a", 1]"#
        );
    }

    #[test]
    fn test_json_bridge() {
        let json = serde_json::json!({"type": "Point", "coordinates": [1, 2.5]});
        let value = Value::from(json.clone());
        assert_eq!(value.index(&Value::from("type")), Ok(Value::from("Point")));
        assert_eq!(value.to_json(), Ok(json));
        assert!(matches!(
            Value::List(vec![Value::Float(f64::NAN)]).to_json(),
            Err(ValueError::NotJsonCompliant(f)) if f.is_nan()
        ));
        assert_eq!(
            Value::Float(f64::INFINITY).to_json(),
            Err(ValueError::NotJsonCompliant(f64::INFINITY))
        );
    }
}
