//! Runtime values of the expression interpreter.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value as Json;

/// A value produced while evaluating an expression against one task.
///
/// Values borrow from the task (and the expression's literals) wherever
/// possible; only computed strings are owned. `Json` always holds an array
/// or object: scalars are lifted into the native variants.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value<'a> {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Cow<'a, str>),
    Json(&'a Json),
}

impl<'a> Value<'a> {
    pub(crate) fn from_json(json: &'a Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            // Integers beyond 2^53 lose precision, as they would in a browser.
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Str(Cow::Borrowed(s.as_str())),
            Json::Array(_) | Json::Object(_) => Value::Json(json),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Json(Json::Array(_)) => "array",
            Value::Json(_) => "object",
        }
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Json(_) => true,
        }
    }

    pub(crate) fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// `===`: same type and same value; arrays and objects compare deeply.
    pub(crate) fn strict_eq(&self, other: &Value<'_>) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => json_eq(a, b),
            _ => false,
        }
    }

    /// `==`: strict, except that `null` and `undefined` are equal to each other.
    pub(crate) fn loose_eq(&self, other: &Value<'_>) -> bool {
        (self.is_nullish() && other.is_nullish()) || self.strict_eq(other)
    }

    /// Ordering for `<`, `<=`, `>`, `>=`. `None` when the operands are not
    /// both numbers or both strings (or a number is NaN).
    pub(crate) fn compare(&self, other: &Value<'_>) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.as_ref().cmp(b.as_ref())),
            _ => None,
        }
    }

    /// String form used by `+` concatenation.
    pub(crate) fn to_text(&self) -> Cow<'_, str> {
        match self {
            Value::Undefined => Cow::Borrowed("undefined"),
            Value::Null => Cow::Borrowed("null"),
            Value::Bool(true) => Cow::Borrowed("true"),
            Value::Bool(false) => Cow::Borrowed("false"),
            Value::Number(n) => Cow::Owned(format_number(*n)),
            Value::Str(s) => Cow::Borrowed(s.as_ref()),
            Value::Json(json) => Cow::Owned(json.to_string()),
        }
    }
}

/// Deep equality that treats `1` and `1.0` as the same number.
fn json_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64() == y.as_f64(),
        (Json::Array(xs), Json::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Json::Object(xs), Json::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Render a number the way a browser would: no trailing `.0` on integers.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        // Also maps -0 to "0".
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
