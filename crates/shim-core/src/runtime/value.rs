// Host values exchanged with rewritten code

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{BinaryOp, UnaryOp};

/// Handle to a host object; only its unit matters to the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub unit: String,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Object(ObjectRef),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("unsupported operand types: {left} {op} {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported operand type for {op}: {operand}")]
    UnaryMismatch {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in {op}")]
    Overflow { op: &'static str },
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Object(obj) => write!(f, "{}#{}", obj.unit, obj.id),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl Value {
    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty() && s != "0",
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Unit name of an object value
    pub fn unit(&self) -> Option<&str> {
        match self {
            Value::Object(obj) => Some(&obj.unit),
            _ => None,
        }
    }

    /// Key under which this value indexes a map
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(n) => Some(n.to_string()),
            Value::Boolean(b) => Some(i64::from(*b).to_string()),
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, ValueError> {
        match (op, operand) {
            (UnaryOp::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
            (UnaryOp::Minus, Value::Integer(n)) => n
                .checked_neg()
                .map(Value::Integer)
                .ok_or(ValueError::Overflow { op: "-" }),
            (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Minus, other) => Err(ValueError::UnaryMismatch {
                op: "-",
                operand: other.type_name(),
            }),
        }
    }

    pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ValueError> {
        let mismatch = || ValueError::TypeMismatch {
            op: op.symbol(),
            left: left.type_name(),
            right: right.type_name(),
        };

        match op {
            BinaryOp::And => Ok(Value::Boolean(left.is_truthy() && right.is_truthy())),
            BinaryOp::Or => Ok(Value::Boolean(left.is_truthy() || right.is_truthy())),
            BinaryOp::Equal => Ok(Value::Boolean(loose_eq(left, right))),
            BinaryOp::NotEqual => Ok(Value::Boolean(!loose_eq(left, right))),
            BinaryOp::LessThan
            | BinaryOp::LessEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterEqual => {
                let ordering = match (left, right) {
                    (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                    _ => left
                        .as_float()
                        .zip(right.as_float())
                        .and_then(|(a, b)| a.partial_cmp(&b)),
                }
                .ok_or_else(mismatch)?;
                let result = match op {
                    BinaryOp::LessThan => ordering.is_lt(),
                    BinaryOp::LessEqual => ordering.is_le(),
                    BinaryOp::GreaterThan => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Boolean(result))
            }
            BinaryOp::Add => match (left, right) {
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
                (Value::List(a), Value::List(b)) => {
                    Ok(Value::List(a.iter().chain(b).cloned().collect()))
                }
                _ => arithmetic(op, left, right).ok_or_else(mismatch)?,
            },
            BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
                arithmetic(op, left, right).ok_or_else(mismatch)?
            }
        }
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            left.as_float() == right.as_float()
        }
        _ => left == right,
    }
}

/// Numeric arithmetic; `None` when the operands are not numbers
fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Option<Result<Value, ValueError>> {
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
                return Some(Err(ValueError::DivisionByZero))
            }
            BinaryOp::Divide if a % b != 0 => return Some(Ok(Value::Float(a as f64 / b as f64))),
            BinaryOp::Divide => a.checked_div(b),
            BinaryOp::Modulo => a.checked_rem(b),
            _ => return None,
        };
        return Some(
            result
                .map(Value::Integer)
                .ok_or(ValueError::Overflow { op: op.symbol() }),
        );
    }

    let (a, b) = (left.as_float()?, right.as_float()?);
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => {
            return Some(Err(ValueError::DivisionByZero))
        }
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        _ => return None,
    };
    Some(Ok(Value::Float(result)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let add = Value::binary(BinaryOp::Add, &Value::from(2i64), &Value::from(3i64));
        assert_eq!(add, Ok(Value::Integer(5)));
        let div = Value::binary(BinaryOp::Divide, &Value::from(7i64), &Value::from(2i64));
        assert_eq!(div, Ok(Value::Float(3.5)));
        let div = Value::binary(BinaryOp::Divide, &Value::from(8i64), &Value::from(2i64));
        assert_eq!(div, Ok(Value::Integer(4)));
        assert_eq!(
            Value::binary(BinaryOp::Modulo, &Value::from(1i64), &Value::from(0i64)),
            Err(ValueError::DivisionByZero)
        );
        assert_eq!(
            Value::binary(BinaryOp::Add, &Value::from("a"), &Value::from("b")),
            Ok(Value::from("ab"))
        );
    }

    #[test]
    fn test_type_mismatch_names_operands() {
        let err = Value::binary(BinaryOp::Multiply, &Value::from("a"), &Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "unsupported operand types: string * null");
    }

    #[test]
    fn test_comparisons_and_truthiness() {
        assert_eq!(
            Value::binary(BinaryOp::LessThan, &Value::from(1i64), &Value::from(1.5)),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            Value::binary(BinaryOp::Equal, &Value::from(2i64), &Value::from(2.0)),
            Ok(Value::Boolean(true))
        );
        assert!(!Value::from("0").is_truthy());
        assert!(Value::from(vec![Value::Null]).is_truthy());
        assert_eq!(
            Value::unary(UnaryOp::Minus, &Value::from(i64::MIN)),
            Err(ValueError::Overflow { op: "-" })
        );
    }
}
