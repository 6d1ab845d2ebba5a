use std::fmt;

use serde_json::{Map, Number, Value};

use crate::shape::check_shape;
use crate::{DecodeError, SceneConfig};

/// Comment line emitted at the top of every encoded document.
pub const SETTINGS_COMMENT: &str = "# Object Settings:";

const INDENT: &str = "  ";

/// A line the decoder could not use as written.
///
/// Issues never abort decoding on their own; they are reported next to the
/// accepted configuration so a typo cannot silently lose a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIssue {
    /// 1-based line number in the submitted text.
    pub line: usize,
    pub text: String,
    pub reason: String,
}

impl fmt::Display for LineIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line, self.reason, self.text)
    }
}

/// Result of a successful decode.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub config: SceneConfig,
    pub issues: Vec<LineIssue>,
}

/// Serialises a configuration into the sectioned text notation.
pub fn encode(config: &SceneConfig) -> String {
    let mut lines = vec![SETTINGS_COMMENT.to_string()];
    match serde_json::to_value(config) {
        Ok(value) => encode_node(&value, &mut Vec::new(), &mut lines),
        Err(err) => tracing::error!(error = %err, "scene configuration failed to serialise"),
    }
    lines.join("\n")
}

/// Emits nested sections first, then the leaves of the current section.
fn encode_node<'a>(node: &'a Value, path: &mut Vec<&'a str>, lines: &mut Vec<String>) {
    let Value::Object(map) = node else {
        return;
    };

    let mut content = Vec::new();
    for (key, value) in map {
        match value {
            Value::Object(_) => {
                path.push(key.as_str());
                encode_node(value, path, lines);
                path.pop();
            }
            Value::Null => {}
            leaf => content.push(format!("{INDENT}{key} = {}", encode_leaf(leaf))),
        }
    }

    if content.is_empty() {
        return;
    }
    if path.is_empty() {
        tracing::debug!(count = content.len(), "skipping top-level leaves without a section");
        return;
    }
    lines.push(format!("{}:", path.join(".")));
    lines.extend(content);
    lines.push(String::new());
}

fn encode_leaf(value: &Value) -> String {
    match value {
        Value::String(text) => format!("\"{text}\""),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::Number(number) => number.to_string(),
                    other => other.to_string(),
                })
                .collect();
            format!("[{}]", parts.join(", "))
        }
        other => other.to_string(),
    }
}

/// Decodes text, runs the shape check, and converts into a typed config.
///
/// A rejected document leaves the caller's current configuration untouched;
/// the caller only replaces its config with the returned value on `Ok`.
pub fn decode(text: &str) -> Result<Decoded, DecodeError> {
    let (tree, issues) = parse_tree(text);
    for issue in &issues {
        tracing::warn!(line = issue.line, reason = %issue.reason, "configuration line ignored");
    }

    let template = serde_json::to_value(SceneConfig::default())?;
    let mismatches = check_shape(&template, &tree);
    if !mismatches.is_empty() {
        return Err(DecodeError::Shape(mismatches));
    }

    let config: SceneConfig = serde_json::from_value(tree)?;
    Ok(Decoded { config, issues })
}

/// Line-oriented parse into an untyped tree.
///
/// Section headers (`a.b:`) set the current path; `key = value` lines are
/// inserted beneath it, creating intermediate maps as needed. Blank lines and
/// `#` / `//` comments are ignored.
pub fn parse_tree(text: &str) -> (Value, Vec<LineIssue>) {
    let mut root = Map::new();
    let mut issues = Vec::new();
    let mut current_path: Vec<String> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let issue = |reason: &str| LineIssue {
            line: index + 1,
            text: line.to_string(),
            reason: reason.to_string(),
        };

        if let Some(section) = parse_section(line) {
            current_path = section.split('.').map(str::to_string).collect();
            continue;
        }

        let Some((key, raw_value)) = parse_assignment(line) else {
            issues.push(issue("expected `section:` or `key = value`"));
            continue;
        };
        if current_path.is_empty() {
            issues.push(issue("assignment appears before any section header"));
            continue;
        }

        let value = match type_value(raw_value) {
            Typed::Value(value) => value,
            Typed::WithIssue(value, reason) => {
                issues.push(issue(reason));
                value
            }
        };

        if let Err(reason) = insert_at(&mut root, &current_path, key, value) {
            issues.push(issue(reason.as_str()));
        }
    }

    (Value::Object(root), issues)
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn parse_section(line: &str) -> Option<&str> {
    let body = line.strip_suffix(':')?;
    if body.is_empty() || !body.chars().all(|ch| is_word_char(ch) || ch == '.') {
        return None;
    }
    Some(body)
}

fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let key_len = line
        .char_indices()
        .find(|(_, ch)| !is_word_char(*ch))
        .map_or(line.len(), |(index, _)| index);
    if key_len == 0 {
        return None;
    }
    let (key, rest) = line.split_at(key_len);
    let value = rest.trim_start().strip_prefix('=')?.trim();
    if value.is_empty() {
        return None;
    }
    Some((key, value))
}

enum Typed {
    Value(Value),
    WithIssue(Value, &'static str),
}

/// Applies the typing order: boolean, quoted string, array, number, raw text.
fn type_value(raw: &str) -> Typed {
    match raw {
        "true" => return Typed::Value(Value::Bool(true)),
        "false" => return Typed::Value(Value::Bool(false)),
        _ => {}
    }

    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Typed::Value(Value::String(raw[1..raw.len() - 1].to_string()));
    }

    if raw.starts_with('[') && raw.ends_with(']') {
        return match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => Typed::Value(Value::Array(items)),
            _ => Typed::WithIssue(
                Value::Array(Vec::new()),
                "array is not valid JSON; using an empty array",
            ),
        };
    }

    if let Ok(integer) = raw.parse::<i64>() {
        return Typed::Value(Value::Number(integer.into()));
    }
    if let Ok(float) = raw.parse::<f64>() {
        return match Number::from_f64(float) {
            Some(number) => Typed::Value(Value::Number(number)),
            None => Typed::WithIssue(
                Value::String(raw.to_string()),
                "non-finite number kept as text",
            ),
        };
    }

    Typed::WithIssue(
        Value::String(raw.to_string()),
        "unquoted value kept as text",
    )
}

fn insert_at(
    root: &mut Map<String, Value>,
    path: &[String],
    key: &str,
    value: Value,
) -> Result<(), String> {
    let mut pointer = root;
    for segment in path {
        let entry = pointer
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        pointer = match entry {
            Value::Object(map) => map,
            _ => return Err(format!("section segment '{segment}' is already a value")),
        };
    }
    if matches!(pointer.get(key), Some(Value::Object(_))) {
        return Err(format!("key '{key}' is already a section"));
    }
    pointer.insert(key.to_string(), value);
    Ok(())
}
