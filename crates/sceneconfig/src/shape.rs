use std::fmt;

use serde_json::Value;

/// One structural difference between a decoded tree and the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    /// Dotted path of the offending key.
    pub path: String,
    pub expected: String,
    pub found: String,
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, found {}",
            self.path, self.expected, self.found
        )
    }
}

/// Compares `candidate` against `template` key by key.
///
/// Only shape is compared: every template key must exist with the same JSON
/// type, and arrays must have the same length with element types matching.
/// Values themselves are never compared. Keys present only in `candidate` are
/// left to the typed conversion that follows.
pub fn check_shape(template: &Value, candidate: &Value) -> Vec<ShapeMismatch> {
    let mut mismatches = Vec::new();
    compare(template, candidate, &mut Vec::new(), &mut mismatches);
    mismatches
}

fn compare<'a>(
    template: &'a Value,
    candidate: &Value,
    path: &mut Vec<&'a str>,
    out: &mut Vec<ShapeMismatch>,
) {
    let mismatch = |path: &[&str], expected: String, found: String| ShapeMismatch {
        path: if path.is_empty() {
            "<root>".to_string()
        } else {
            path.join(".")
        },
        expected,
        found,
    };

    match (template, candidate) {
        (Value::Object(expected), Value::Object(found)) => {
            for (key, child) in expected {
                path.push(key.as_str());
                match found.get(key) {
                    Some(value) => compare(child, value, path, out),
                    None => out.push(mismatch(path.as_slice(), describe(child), "nothing".into())),
                }
                path.pop();
            }
        }
        (Value::Array(expected), Value::Array(found)) => {
            if expected.len() != found.len() {
                out.push(mismatch(
                    path.as_slice(),
                    format!("array of {}", expected.len()),
                    format!("array of {}", found.len()),
                ));
                return;
            }
            for (index, (left, right)) in expected.iter().zip(found).enumerate() {
                if kind(left) != kind(right) {
                    out.push(mismatch(
                        path.as_slice(),
                        format!("{} at index {index}", kind(left)),
                        kind(right).to_string(),
                    ));
                }
            }
        }
        (expected, found) if kind(expected) != kind(found) => {
            out.push(mismatch(path.as_slice(), describe(expected), describe(found)));
        }
        _ => {}
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "section",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("array of {}", items.len()),
        other => kind(other).to_string(),
    }
}
