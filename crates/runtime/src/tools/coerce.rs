//! Argument coercion against a tool schema.
//!
//! Models routinely send `"3"` for an integer or `"None"` for an optional
//! field they meant to leave out. Coercion turns the raw argument object into
//! one that matches the declared types before the handler ever sees it.

use super::{ArgumentError, ParamKind, ParamSpec, ToolSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// What to do with integer arguments outside a parameter's bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    /// Silently move the value to the nearest bound.
    #[default]
    Clamp,
    /// Fail with [`ArgumentError::OutOfRange`].
    Reject,
}

/// Coerce raw model arguments to the shape declared by `schema`.
///
/// Accepts an object, a JSON-encoded object string, or null. Defaults are
/// filled in, unknown keys are dropped.
pub fn coerce_arguments(
    schema: &ToolSchema,
    raw: &Value,
    policy: RangePolicy,
) -> Result<Map<String, Value>, ArgumentError> {
    let mut input = into_object(raw)?;
    let mut out = Map::new();

    for param in &schema.params {
        let value = input.remove(&param.name).filter(|v| !is_absent(param, v));
        match value {
            Some(value) => {
                out.insert(param.name.clone(), coerce_value(param, value, policy)?);
            }
            None => {
                if let Some(default) = &param.default {
                    out.insert(param.name.clone(), default.clone());
                } else if param.required {
                    return Err(ArgumentError::Missing(param.name.clone()));
                }
            }
        }
    }

    if !input.is_empty() {
        let extra: Vec<&String> = input.keys().collect();
        debug!(tool = %schema.name, ?extra, "dropping undeclared arguments");
    }

    Ok(out)
}

fn into_object(raw: &Value) -> Result<Map<String, Value>, ArgumentError> {
    match raw {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(ArgumentError::NotAnObject(describe(raw))),
        },
        other => Err(ArgumentError::NotAnObject(describe(other))),
    }
}

fn is_absent(param: &ParamSpec, value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty()
                || (!param.required
                    && ["none", "null", "undefined"].contains(&s.to_lowercase().as_str()))
        }
        _ => false,
    }
}

fn coerce_value(
    param: &ParamSpec,
    value: Value,
    policy: RangePolicy,
) -> Result<Value, ArgumentError> {
    let invalid = |value: &Value| ArgumentError::Invalid {
        param: param.name.clone(),
        expected: param.kind,
        got: describe(value),
    };

    match param.kind {
        ParamKind::String => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(invalid(&other)),
        },
        ParamKind::Integer => {
            let n = as_integer(&value).ok_or_else(|| invalid(&value))?;
            Ok(Value::from(apply_bounds(param, n, policy)?))
        }
        ParamKind::Boolean => as_boolean(&value)
            .map(Value::Bool)
            .ok_or_else(|| invalid(&value)),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    let integral = |f: f64| (f.is_finite() && f.fract() == 0.0).then_some(f as i64);
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn as_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "sí" | "si" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn apply_bounds(param: &ParamSpec, n: i64, policy: RangePolicy) -> Result<i64, ArgumentError> {
    let min = param.min.unwrap_or(i64::MIN);
    let max = param.max.unwrap_or(i64::MAX);
    if (min..=max).contains(&n) {
        return Ok(n);
    }
    match policy {
        RangePolicy::Clamp => {
            let clamped = n.clamp(min, max);
            warn!(param = %param.name, requested = n, clamped, "argument clamped to range");
            Ok(clamped)
        }
        RangePolicy::Reject => Err(ArgumentError::OutOfRange {
            param: param.name.clone(),
            value: n,
            min,
            max,
        }),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "an array".into(),
        Value::Object(_) => "an object".into(),
    }
}
