//! Expression evaluation engine.
//!
//! Evaluates expressions against a [`Namespace`].
//!
//! # Evaluation Semantics
//!
//! - Names resolve against the namespace; unknown names fail with
//!   `EvalError::UndefinedName`
//! - `and`/`or` short-circuit and return the deciding operand
//! - Integer arithmetic stays integral except `/`, which always yields a float
//! - `%` and `//` floor toward negative infinity
//! - Calls try the core builtins first, then the caller-supplied [`Builtins`]

use std::cmp::Ordering;

use crate::domain::error::EvalError;
use crate::domain::expr::{BinaryOp, Expr, UnaryOp, Value};
use crate::domain::expr_parser;
use crate::domain::namespace::Namespace;

/// Host-provided functions layered on top of the core builtins.
///
/// Returns `None` when the function name is not handled.
pub trait Builtins {
    fn call(&mut self, name: &str, args: &[Value]) -> Option<Result<Value, EvalError>>;
}

/// No functions beyond the core builtins.
pub struct CoreOnly;

impl Builtins for CoreOnly {
    fn call(&mut self, _name: &str, _args: &[Value]) -> Option<Result<Value, EvalError>> {
        None
    }
}

/// Parse and evaluate `text` with only the core builtins available.
pub fn eval_str(text: &str, namespace: &Namespace) -> Result<Value, EvalError> {
    let expr = expr_parser::parse(text)?;
    evaluate(&expr, namespace, &mut CoreOnly)
}

pub fn evaluate(
    expr: &Expr,
    namespace: &Namespace,
    host: &mut dyn Builtins,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Name(name) => namespace
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedName { name: name.clone() }),
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(evaluate(item, namespace, host)?);
            }
            Ok(Value::List(values))
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, namespace, host)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value {
                    Value::Int(i) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| EvalError::type_error("integer overflow")),
                    Value::Bool(b) => Ok(Value::Int(-(b as i64))),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(EvalError::type_error(format!(
                        "bad operand type for unary -: '{}'",
                        other.type_name()
                    ))),
                },
            }
        }
        Expr::Binary { op, left, right } => {
            let lhs = evaluate(left, namespace, host)?;
            match op {
                BinaryOp::And if !lhs.is_truthy() => return Ok(lhs),
                BinaryOp::Or if lhs.is_truthy() => return Ok(lhs),
                BinaryOp::And | BinaryOp::Or => return evaluate(right, namespace, host),
                _ => {}
            }
            let rhs = evaluate(right, namespace, host)?;
            apply_binary(*op, lhs, rhs)
        }
        Expr::Call { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, namespace, host)?);
            }
            if let Some(result) = call_core(function, &values) {
                return result;
            }
            host.call(function, &values)
                .unwrap_or_else(|| Err(EvalError::UnknownFunction {
                    name: function.clone(),
                }))
        }
    }
}

enum Numeric {
    Int(i64),
    Float(f64),
}

fn numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Bool(b) => Some(Numeric::Int(*b as i64)),
        Value::Int(i) => Some(Numeric::Int(*i)),
        Value::Float(f) => Some(Numeric::Float(*f)),
        _ => None,
    }
}

fn unsupported(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

/// Upper bound on strings built by repetition.
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

fn overflow() -> EvalError {
    EvalError::type_error("integer overflow")
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => return Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(&lhs, &rhs).ok_or_else(|| {
                EvalError::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    lhs.type_name(),
                    rhs.type_name()
                ))
            })?;
            let result = match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (&lhs, &rhs, op) {
        (Value::Str(a), Value::Str(b), BinaryOp::Add) => return Ok(Value::Str(format!("{a}{b}"))),
        (Value::List(a), Value::List(b), BinaryOp::Add) => {
            let mut joined = a.clone();
            joined.extend(b.iter().cloned());
            return Ok(Value::List(joined));
        }
        (Value::Str(s), Value::Int(n), BinaryOp::Mul) | (Value::Int(n), Value::Str(s), BinaryOp::Mul) => {
            return repeat_str(s, *n).map(Value::Str);
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (numeric(&lhs), numeric(&rhs)) else {
        return Err(unsupported(op, &lhs, &rhs));
    };

    match (a, b) {
        (Numeric::Int(a), Numeric::Int(b)) => int_op(op, a, b),
        (a, b) => {
            let to_f = |n: Numeric| match n {
                Numeric::Int(i) => i as f64,
                Numeric::Float(f) => f,
            };
            float_op(op, to_f(a), to_f(b))
        }
    }
}

fn repeat_str(s: &str, count: i64) -> Result<String, EvalError> {
    let count = usize::try_from(count.max(0)).map_err(|_| overflow())?;
    match s.len().checked_mul(count) {
        Some(length) if length <= MAX_STRING_LEN => Ok(s.repeat(count)),
        Some(length) => Err(EvalError::Memory { length }),
        None => Err(EvalError::Memory { length: usize::MAX }),
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> Result<Value, EvalError> {
    let value = match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinaryOp::Div => return float_op(op, a as f64, b as f64),
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(EvalError::ZeroDivision);
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (b < 0)) { q - 1 } else { q }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvalError::ZeroDivision);
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
        }
        BinaryOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(EvalError::ZeroDivision);
                }
                return float_op(op, a as f64, b as f64);
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
        _ => unreachable!("comparison and boolean operators are handled earlier"),
    };
    Ok(Value::Int(value))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvalError> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            a - b * (a / b).floor()
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            a.powf(b)
        }
        _ => unreachable!("comparison and boolean operators are handled earlier"),
    };
    Ok(Value::Float(value))
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => lhs == rhs,
        },
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                match compare(x, y)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
    }
}

pub(crate) fn arity(function: &str, expected: &str, found: usize) -> EvalError {
    EvalError::Arity {
        function: function.to_string(),
        expected: expected.to_string(),
        found,
    }
}

fn extremum(name: &str, args: &[Value], want: Ordering) -> Result<Value, EvalError> {
    let items: &[Value] = match args {
        [] => return Err(arity(name, "at least 1", 0)),
        [Value::List(items)] => items.as_slice(),
        many => many,
    };
    let mut best = items
        .first()
        .ok_or_else(|| EvalError::type_error(format!("{}() arg is an empty sequence", name)))?;
    for item in &items[1..] {
        let ord = compare(item, best).ok_or_else(|| {
            EvalError::type_error(format!(
                "'{}' and '{}' are not comparable",
                item.type_name(),
                best.type_name()
            ))
        })?;
        if ord == want {
            best = item;
        }
    }
    Ok(best.clone())
}

fn call_core(name: &str, args: &[Value]) -> Option<Result<Value, EvalError>> {
    let result = match name {
        "abs" => match args {
            [Value::Int(i)] => i.checked_abs().map(Value::Int).ok_or_else(overflow),
            [Value::Float(f)] => Ok(Value::Float(f.abs())),
            [Value::Bool(b)] => Ok(Value::Int(*b as i64)),
            [other] => Err(EvalError::type_error(format!(
                "bad operand type for abs(): '{}'",
                other.type_name()
            ))),
            _ => Err(arity(name, "1", args.len())),
        },
        "min" => extremum(name, args, Ordering::Less),
        "max" => extremum(name, args, Ordering::Greater),
        "len" => match args {
            [Value::Str(s)] => Ok(Value::Int(s.chars().count() as i64)),
            [Value::List(items)] => Ok(Value::Int(items.len() as i64)),
            [other] => Err(EvalError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
            _ => Err(arity(name, "1", args.len())),
        },
        "int" => match args {
            [Value::Int(i)] => Ok(Value::Int(*i)),
            [Value::Bool(b)] => Ok(Value::Int(*b as i64)),
            [Value::Float(f)] if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
            [Value::Str(s)] => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                EvalError::type_error(format!("invalid literal for int(): {:?}", s))
            }),
            [other] => Err(EvalError::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))),
            _ => Err(arity(name, "1", args.len())),
        },
        "float" => match args {
            [Value::Str(s)] => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                EvalError::type_error(format!("could not convert string to float: {:?}", s))
            }),
            [other] => other.as_f64().map(Value::Float).ok_or_else(|| {
                EvalError::type_error(format!(
                    "float() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))
            }),
            _ => Err(arity(name, "1", args.len())),
        },
        "str" => match args {
            [value] => Ok(Value::Str(value.to_string())),
            _ => Err(arity(name, "1", args.len())),
        },
        "bool" => match args {
            [value] => Ok(Value::Bool(value.is_truthy())),
            _ => Err(arity(name, "1", args.len())),
        },
        "round" => match args {
            [Value::Int(i)] => Ok(Value::Int(*i)),
            [Value::Float(f)] => Ok(Value::Int(f.round() as i64)),
            [value, Value::Int(digits)] => match value.as_f64() {
                Some(v) => {
                    let scale = 10f64.powi(*digits as i32);
                    Ok(Value::Float((v * scale).round() / scale))
                }
                None => Err(EvalError::type_error(format!(
                    "type {} doesn't define __round__",
                    value.type_name()
                ))),
            },
            [other] | [other, _] => Err(EvalError::type_error(format!(
                "type {} doesn't define __round__",
                other.type_name()
            ))),
            _ => Err(arity(name, "1 or 2", args.len())),
        },
        "sum" => match args {
            [Value::List(items)] => items
                .iter()
                .try_fold(Value::Int(0), |acc, item| apply_binary(BinaryOp::Add, acc, item.clone())),
            [other] => Err(EvalError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
            _ => Err(arity(name, "1", args.len())),
        },
        _ => return None,
    };
    Some(result)
}
