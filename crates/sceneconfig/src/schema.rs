//! Static description of every configuration field.
//!
//! The schema is walked generically for editor completions and for typing
//! path-addressed patches, so neither needs a live [`crate::SceneConfig`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Integer,
    Bool,
    Choice(&'static [&'static str]),
    Vector3,
}

impl FieldKind {
    /// Text inserted after `key = ` when completing a field.
    pub fn placeholder(self) -> String {
        match self {
            FieldKind::Number => "0.0".to_string(),
            FieldKind::Integer => "1".to_string(),
            FieldKind::Bool => "false".to_string(),
            FieldKind::Choice(options) => format!("\"{}\"", options.first().unwrap_or(&"")),
            FieldKind::Vector3 => "[0, 0, 0]".to_string(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Number => f.write_str("number"),
            FieldKind::Integer => f.write_str("integer"),
            FieldKind::Bool => f.write_str("boolean"),
            FieldKind::Choice(options) => write!(f, "one of {}", options.join("|")),
            FieldKind::Vector3 => f.write_str("3-vector"),
        }
    }
}

#[derive(Debug)]
pub enum SchemaNode {
    Section(&'static [(&'static str, SchemaNode)]),
    Field {
        kind: FieldKind,
        required: bool,
        doc: &'static str,
    },
}

const fn required(kind: FieldKind, doc: &'static str) -> SchemaNode {
    SchemaNode::Field {
        kind,
        required: true,
        doc,
    }
}

const fn optional(kind: FieldKind, doc: &'static str) -> SchemaNode {
    SchemaNode::Field {
        kind,
        required: false,
        doc,
    }
}

pub static SCENE_SCHEMA: SchemaNode = SchemaNode::Section(&[
    (
        "object",
        SchemaNode::Section(&[
            (
                "rotation",
                SchemaNode::Section(&[
                    (
                        "axis",
                        required(FieldKind::Choice(&["x", "y", "z"]), "axis the mesh spins around"),
                    ),
                    ("speed", required(FieldKind::Number, "radians added per frame")),
                    (
                        "direction",
                        required(FieldKind::Integer, "signed multiplier applied to speed"),
                    ),
                    ("isRotating", required(FieldKind::Bool, "pause or resume rotation")),
                ]),
            ),
            ("scale", required(FieldKind::Vector3, "per-axis scale")),
            ("position", required(FieldKind::Vector3, "mesh translation")),
        ]),
    ),
    (
        "camera",
        SchemaNode::Section(&[
            ("fov", required(FieldKind::Number, "vertical field of view in degrees")),
            ("position", required(FieldKind::Vector3, "camera position")),
            ("near", optional(FieldKind::Number, "near clip plane")),
            ("far", optional(FieldKind::Number, "far clip plane")),
            ("aspect", optional(FieldKind::Number, "aspect ratio override")),
            ("zoom", optional(FieldKind::Number, "zoom factor")),
            ("focus", optional(FieldKind::Number, "focus distance")),
            ("filmOffset", optional(FieldKind::Number, "horizontal film offset")),
            ("rotation", optional(FieldKind::Vector3, "euler rotation in radians")),
            ("up", optional(FieldKind::Vector3, "up vector")),
        ]),
    ),
]);

/// Resolves a dotted path (`object.rotation.axis`) to its schema node.
pub fn lookup(path: &str) -> Option<&'static SchemaNode> {
    let mut node = &SCENE_SCHEMA;
    if path.is_empty() {
        return Some(node);
    }
    for segment in path.split('.') {
        let SchemaNode::Section(children) = node else {
            return None;
        };
        node = children
            .iter()
            .find(|(name, _)| *name == segment)
            .map(|(_, child)| child)?;
    }
    Some(node)
}

/// A completion entry for the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub label: String,
    pub insert_text: String,
    pub detail: String,
}

/// Lists what may be written inside `section` (an empty string is the root).
pub fn completions(section: &str) -> Vec<Completion> {
    let Some(SchemaNode::Section(children)) = lookup(section) else {
        return Vec::new();
    };

    children
        .iter()
        .map(|(name, node)| match node {
            SchemaNode::Section(_) => {
                let header = if section.is_empty() {
                    (*name).to_string()
                } else {
                    format!("{section}.{name}")
                };
                Completion {
                    label: (*name).to_string(),
                    insert_text: format!("{header}:"),
                    detail: "section".to_string(),
                }
            }
            SchemaNode::Field {
                kind,
                required,
                doc,
            } => Completion {
                label: (*name).to_string(),
                insert_text: format!("{name} = {}", kind.placeholder()),
                detail: if *required {
                    format!("{kind}: {doc}")
                } else {
                    format!("{kind} (optional): {doc}")
                },
            },
        })
        .collect()
}
