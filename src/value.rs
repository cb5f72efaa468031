//! Build-time values.
//!
//! A [`Value`] is what a prop expression evaluates to during pre-rendering.
//! Coercions follow JavaScript closely enough for markup output. Server values
//! are opaque: they can be concatenated into text, never inspected.

use indexmap::IndexMap;
use std::fmt;

/// Piece of text that is partly known only at serve time.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Slot(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// Text containing server-value slots, in order.
    Server(Vec<Segment>),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

/// A value operation with no build-time answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotComputable(pub String);

impl fmt::Display for NotComputable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Coerced<T> = Result<T, NotComputable>;

fn inspected<T>(operation: &str) -> Coerced<T> {
    Err(NotComputable(format!(
        "server values are only known at serve time and cannot be used in {}",
        operation
    )))
}

impl Value {
    pub fn server_slot(slot: impl Into<String>) -> Self {
        Value::Server(vec![Segment::Slot(slot.into())])
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) | Value::Server(_) => "string",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
        }
    }

    pub fn truthy(&self) -> Coerced<bool> {
        Ok(match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Server(_) => return inspected("conditions"),
            Value::Array(_) | Value::Object(_) => true,
        })
    }

    pub fn to_number(&self) -> Coerced<f64> {
        Ok(match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => parse_number(s),
            Value::Server(_) => return inspected("arithmetic"),
            Value::Array(_) | Value::Object(_) => parse_number(&self.to_js_string()?),
        })
    }

    /// `String(value)`.
    pub fn to_js_string(&self) -> Coerced<String> {
        Ok(match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Server(_) => return inspected("string operations"),
            Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()?
                    });
                }
                parts.join(",")
            }
            Value::Object(_) => "[object Object]".to_string(),
        })
    }

    /// String form that may carry server slots, used by `+` and template literals.
    pub fn to_segments(&self) -> Vec<Segment> {
        match self {
            Value::Server(segments) => segments.clone(),
            Value::Array(items) => {
                let mut out = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(Segment::Text(",".to_string()));
                    }
                    if !item.is_nullish() {
                        out.extend(item.to_segments());
                    }
                }
                out
            }
            other => vec![Segment::Text(other.to_js_string().unwrap_or_default())],
        }
    }

    /// Builds a string value, collapsing to `Str` when no slot is involved.
    pub fn from_segments(segments: Vec<Segment>) -> Value {
        let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment {
                Segment::Text(t) if t.is_empty() => {}
                Segment::Text(t) => {
                    if let Some(Segment::Text(prev)) = merged.last_mut() {
                        prev.push_str(&t);
                    } else {
                        merged.push(Segment::Text(t));
                    }
                }
                slot => merged.push(slot),
            }
        }

        if merged.iter().all(|s| matches!(s, Segment::Text(_))) {
            let text = merged
                .into_iter()
                .map(|s| match s {
                    Segment::Text(t) => t,
                    Segment::Slot(_) => String::new(),
                })
                .collect();
            Value::Str(text)
        } else {
            Value::Server(merged)
        }
    }

    fn is_stringish(&self) -> bool {
        matches!(
            self,
            Value::Str(_) | Value::Server(_) | Value::Array(_) | Value::Object(_)
        )
    }

    /// JavaScript `+`.
    pub fn add(&self, other: &Value) -> Coerced<Value> {
        if self.is_stringish() || other.is_stringish() {
            let mut segments = self.to_segments();
            segments.extend(other.to_segments());
            return Ok(Value::from_segments(segments));
        }
        Ok(Value::Number(self.to_number()? + other.to_number()?))
    }

    pub fn strict_equals(&self, other: &Value) -> Coerced<bool> {
        if matches!(self, Value::Server(_)) || matches!(other, Value::Server(_)) {
            return inspected("comparisons");
        }
        Ok(match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => false,
            (a, b) => a == b,
        })
    }

    pub fn loose_equals(&self, other: &Value) -> Coerced<bool> {
        if matches!(self, Value::Server(_)) || matches!(other, Value::Server(_)) {
            return inspected("comparisons");
        }
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => Ok(a.is_nullish() && b.is_nullish()),
            (Value::Str(_), Value::Str(_)) => self.strict_equals(other),
            (Value::Array(_) | Value::Object(_), Value::Array(_) | Value::Object(_)) => Ok(false),
            _ => Ok(self.to_number()? == other.to_number()?),
        }
    }

    /// Abstract relational comparison; `None` when either side is NaN.
    pub fn compare(&self, other: &Value) -> Coerced<Option<std::cmp::Ordering>> {
        if matches!(self, Value::Server(_)) || matches!(other, Value::Server(_)) {
            return inspected("comparisons");
        }
        if let (Value::Str(a), Value::Str(b)) = (self, other) {
            return Ok(Some(a.cmp(b)));
        }
        Ok(self.to_number()?.partial_cmp(&other.to_number()?))
    }

    /// `value.key` / `value[key]`.
    pub fn member(&self, key: &Value) -> Coerced<Value> {
        let name = key.to_js_string()?;
        Ok(match self {
            Value::Object(map) => map.get(&name).cloned().unwrap_or(Value::Undefined),
            Value::Array(items) => {
                if name == "length" {
                    Value::Number(items.len() as f64)
                } else {
                    name.parse::<usize>()
                        .ok()
                        .and_then(|i| items.get(i).cloned())
                        .unwrap_or(Value::Undefined)
                }
            }
            Value::Str(s) => {
                if name == "length" {
                    // JS lengths count UTF-16 code units
                    Value::Number(s.encode_utf16().count() as f64)
                } else {
                    // Indexed by UTF-16 code unit like `length`. A lone
                    // surrogate has no `String` form and becomes U+FFFD.
                    name.parse::<usize>()
                        .ok()
                        .and_then(|i| s.encode_utf16().nth(i))
                        .map(|unit| Value::Str(String::from_utf16_lossy(&[unit])))
                        .unwrap_or(Value::Undefined)
                }
            }
            Value::Server(_) => return inspected("member access"),
            Value::Bool(_) | Value::Number(_) => Value::Undefined,
            Value::Undefined | Value::Null => {
                return Err(NotComputable(format!(
                    "cannot read property `{}` of {}",
                    name,
                    self.to_js_string()?
                )))
            }
        })
    }
}

fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// `Number.prototype.toString()` for the values markup cares about.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        // `1e+21`, `1.5e-7`
        let exponent = format!("{:e}", n);
        match exponent.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => exponent,
        }
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(16.0), "16");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-2.5e30), "-2.5e+30");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(0.000001), "0.000001");
    }

    #[test]
    fn test_add_follows_js_coercion() {
        let one = Value::Number(1.0);
        assert_eq!(one.add(&Value::Number(2.0)).unwrap(), Value::Number(3.0));
        assert_eq!(
            one.add(&Value::Str("px".into())).unwrap(),
            Value::Str("1px".into())
        );
        assert_eq!(
            Value::Bool(true).add(&Value::Null).unwrap(),
            Value::Number(1.0)
        );
    }

    #[test]
    fn test_server_text_concatenation() {
        let greeting = Value::Str("Hello, ".into());
        let name = Value::server_slot("name");
        let joined = greeting.add(&name).unwrap().add(&Value::Str("!".into())).unwrap();
        assert_eq!(
            joined,
            Value::Server(vec![
                Segment::Text("Hello, ".into()),
                Segment::Slot("name".into()),
                Segment::Text("!".into()),
            ])
        );
    }

    #[test]
    fn test_server_values_cannot_be_inspected() {
        let server = Value::server_slot("flag");
        assert!(server.truthy().is_err());
        assert!(server.to_number().is_err());
        assert!(server.member(&Value::Str("length".into())).is_err());
        assert!(server.strict_equals(&Value::Null).is_err());
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined).unwrap());
        assert!(!Value::Null.strict_equals(&Value::Undefined).unwrap());
        assert!(Value::Str("1".into()).loose_equals(&Value::Number(1.0)).unwrap());
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)).unwrap());
    }

    #[test]
    fn test_member_access() {
        let items = Value::Array(vec![Value::Str("a".into()), Value::Str("b".into())]);
        assert_eq!(
            items.member(&Value::Str("length".into())).unwrap(),
            Value::Number(2.0)
        );
        assert_eq!(
            items.member(&Value::Number(1.0)).unwrap(),
            Value::Str("b".into())
        );
        assert_eq!(
            Value::Str("héllo".into()).member(&Value::Str("length".into())).unwrap(),
            Value::Number(5.0)
        );
    }

    #[test]
    fn test_string_index_counts_utf16_units() {
        let s = Value::Str("😀x".into());
        assert_eq!(s.member(&Value::Str("length".into())).unwrap(), Value::Number(3.0));
        assert_eq!(s.member(&Value::Number(2.0)).unwrap(), Value::Str("x".into()));
        assert_eq!(s.member(&Value::Number(1.0)).unwrap(), Value::Str("\u{FFFD}".into()));
        assert_eq!(s.member(&Value::Number(3.0)).unwrap(), Value::Undefined);
        assert_eq!(
            Value::Str("héllo".into()).member(&Value::Number(1.0)).unwrap(),
            Value::Str("é".into())
        );
    }

    #[test]
    fn test_array_to_string() {
        let items = Value::Array(vec![Value::Number(1.0), Value::Null, Value::Str("x".into())]);
        assert_eq!(items.to_js_string().unwrap(), "1,,x");
    }
}
