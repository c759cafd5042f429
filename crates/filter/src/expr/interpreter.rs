//! Tree-walking evaluation of a compiled expression against one task.

use std::borrow::Cow;
use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as Json;

use taskscope_core::Task;

use super::error::EvalError;
use super::value::{format_number, Value};
use super::{BinaryOp, Expr, Field, Literal, LogicalOp, Method, UnaryOp};

pub(crate) fn eval<'a>(expr: &'a Expr, task: &'a Task) -> Result<Value<'a>, EvalError> {
    match expr {
        Expr::Literal(lit) => Ok(literal(lit)),
        Expr::Field(field) => Ok(bind(*field, task)),
        Expr::Unary(op, operand) => unary(*op, eval(operand, task)?),
        Expr::Binary(op, lhs, rhs) => binary(*op, eval(lhs, task)?, eval(rhs, task)?),
        Expr::Logical(op, lhs, rhs) => {
            let left = eval(lhs, task)?;
            match (op, left.truthy()) {
                (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                _ => eval(rhs, task),
            }
        }
        Expr::Member(object, name) => member(eval(object, task)?, name),
        Expr::Index(object, key) => {
            let object = eval(object, task)?;
            index(object, eval(key, task)?)
        }
        Expr::Call(receiver, method, args) => {
            let receiver = eval(receiver, task)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, task))
                .collect::<Result<Vec<_>, _>>()?;
            call(*method, receiver, &args)
        }
    }
}

fn literal(lit: &Literal) -> Value<'_> {
    match lit {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::Str(s) => Value::Str(Cow::Borrowed(s.as_str())),
    }
}

// ── Variable binding ────────────────────────────────────────────────

fn text(s: &str) -> Value<'_> {
    Value::Str(Cow::Borrowed(s))
}

/// Timestamps are exposed as RFC 3339 strings so they order lexically.
fn timestamp(ts: Option<&DateTime<Utc>>) -> Value<'static> {
    match ts {
        Some(ts) => Value::Str(Cow::Owned(ts.to_rfc3339_opts(SecondsFormat::Secs, true))),
        None => Value::Null,
    }
}

fn bind(field: Field, task: &Task) -> Value<'_> {
    match field {
        Field::Id => text(&task.id),
        Field::Queue => text(&task.queue),
        Field::Type => text(&task.task_type),
        Field::State => text(task.state.as_str()),
        Field::StartTime => timestamp(task.start_time.as_ref()),
        Field::MaxRetry => Value::Number(task.max_retry as f64),
        Field::Retried => Value::Number(task.retried as f64),
        Field::LastFailedAt => timestamp(task.last_failed_at.as_ref()),
        Field::ErrorMessage => text(&task.error_message),
        Field::NextProcessAt => timestamp(task.next_process_at.as_ref()),
        Field::TimeoutSeconds => Value::Number(task.timeout_seconds as f64),
        Field::Deadline => timestamp(task.deadline.as_ref()),
        Field::Group => task.group.as_deref().map(text).unwrap_or(Value::Null),
        Field::CompletedAt => timestamp(task.completed_at.as_ref()),
        Field::TtlSeconds => Value::Number(task.ttl_seconds as f64),
        Field::IsOrphaned => Value::Bool(task.is_orphaned),
        Field::Payload => Value::from_json(&task.payload),
        Field::Result => task
            .result
            .as_ref()
            .map(Value::from_json)
            .unwrap_or(Value::Undefined),
    }
}

// ── Operators ───────────────────────────────────────────────────────

fn unary(op: UnaryOp, operand: Value<'_>) -> Result<Value<'_>, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
        UnaryOp::Neg => match operand {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(EvalError::InvalidOperand {
                op: "-",
                found: other.type_name(),
            }),
        },
    }
}

fn binary<'a>(op: BinaryOp, lhs: Value<'a>, rhs: Value<'a>) -> Result<Value<'a>, EvalError> {
    let ordered = |accept: fn(Ordering) -> bool| Value::Bool(lhs.compare(&rhs).is_some_and(accept));

    let value = match op {
        BinaryOp::Eq => Value::Bool(lhs.loose_eq(&rhs)),
        BinaryOp::NotEq => Value::Bool(!lhs.loose_eq(&rhs)),
        BinaryOp::StrictEq => Value::Bool(lhs.strict_eq(&rhs)),
        BinaryOp::StrictNotEq => Value::Bool(!lhs.strict_eq(&rhs)),
        BinaryOp::Lt => ordered(Ordering::is_lt),
        BinaryOp::Le => ordered(Ordering::is_le),
        BinaryOp::Gt => ordered(Ordering::is_gt),
        BinaryOp::Ge => ordered(Ordering::is_ge),
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                let mut out = lhs.to_text().into_owned();
                out.push_str(&rhs.to_text());
                Value::Str(Cow::Owned(out))
            }
            _ => return Err(mismatch(op, &lhs, &rhs)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Number(a), Value::Number(b)) = (&lhs, &rhs) else {
                return Err(mismatch(op, &lhs, &rhs));
            };
            let (a, b) = (*a, *b);
            match op {
                BinaryOp::Sub => Value::Number(a - b),
                BinaryOp::Mul => Value::Number(a * b),
                _ if b == 0.0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Div => Value::Number(a / b),
                _ => Value::Number(a % b),
            }
        }
    };
    Ok(value)
}

fn mismatch(op: BinaryOp, lhs: &Value<'_>, rhs: &Value<'_>) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol(),
        left: lhs.type_name(),
        right: rhs.type_name(),
    }
}

// ── Property access ─────────────────────────────────────────────────

fn member<'a>(object: Value<'a>, name: &str) -> Result<Value<'a>, EvalError> {
    if object.is_nullish() {
        return Err(EvalError::NullAccess {
            property: name.to_string(),
            on: object.type_name(),
        });
    }
    let value = match object {
        Value::Str(s) if name == "length" => Value::Number(s.chars().count() as f64),
        Value::Json(Json::Array(items)) if name == "length" => Value::Number(items.len() as f64),
        Value::Json(Json::Object(map)) => map.get(name).map(Value::from_json).unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    };
    Ok(value)
}

fn index<'a>(object: Value<'a>, key: Value<'_>) -> Result<Value<'a>, EvalError> {
    if object.is_nullish() {
        return Err(EvalError::NullAccess {
            property: key.to_text().into_owned(),
            on: object.type_name(),
        });
    }
    let position = match key {
        Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => Some(n as usize),
        _ => None,
    };

    match (object, position) {
        (Value::Json(Json::Array(items)), Some(i)) => {
            Ok(items.get(i).map(Value::from_json).unwrap_or(Value::Undefined))
        }
        (Value::Str(s), Some(i)) => Ok(s
            .chars()
            .nth(i)
            .map(|c| Value::Str(Cow::Owned(c.to_string())))
            .unwrap_or(Value::Undefined)),
        (object, _) => {
            let name = match &key {
                Value::Number(n) => format_number(*n),
                other => other.to_text().into_owned(),
            };
            member(object, &name)
        }
    }
}

// ── Methods ─────────────────────────────────────────────────────────

fn call<'a>(method: Method, receiver: Value<'a>, args: &[Value<'_>]) -> Result<Value<'a>, EvalError> {
    let not_callable = |receiver: &Value<'_>| EvalError::NotCallable {
        method: method.as_str(),
        on: receiver.type_name(),
    };

    match (&receiver, method) {
        (Value::Json(Json::Array(items)), Method::Includes) => {
            let needle = &args[0];
            Ok(Value::Bool(
                items.iter().any(|item| Value::from_json(item).strict_eq(needle)),
            ))
        }
        (Value::Str(s), Method::Includes | Method::StartsWith | Method::EndsWith) => {
            let needle = string_arg(method, &args[0])?;
            Ok(Value::Bool(match method {
                Method::Includes => s.contains(needle),
                Method::StartsWith => s.starts_with(needle),
                _ => s.ends_with(needle),
            }))
        }
        (Value::Str(s), Method::ToLowerCase) => Ok(Value::Str(Cow::Owned(s.to_lowercase()))),
        (Value::Str(s), Method::ToUpperCase) => Ok(Value::Str(Cow::Owned(s.to_uppercase()))),
        (Value::Str(s), Method::Trim) => Ok(Value::Str(Cow::Owned(s.trim().to_string()))),
        (Value::Undefined | Value::Null, _) => Err(EvalError::NullAccess {
            property: method.as_str().to_string(),
            on: receiver.type_name(),
        }),
        _ => Err(not_callable(&receiver)),
    }
}

fn string_arg<'v>(method: Method, arg: &'v Value<'_>) -> Result<&'v str, EvalError> {
    match arg {
        Value::Str(s) => Ok(s.as_ref()),
        other => Err(EvalError::ArgumentType {
            method: method.as_str(),
            expected: "string",
            found: other.type_name(),
        }),
    }
}
