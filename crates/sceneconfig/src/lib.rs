//! Scene configuration model and its human-editable text notation.
//!
//! The editor shows the configuration as a sectioned `key = value` document:
//!
//! ```text
//! # Object Settings:
//! object.rotation:
//!   axis = "z"
//!   speed = 0.005
//!   direction = 1
//!   isRotating = true
//! ```
//!
//! - `codec` converts between [`SceneConfig`] and that text, collecting
//!   line-level issues instead of silently dropping malformed lines.
//! - `shape` compares an untyped decoded tree against the default instance
//!   before it is accepted.
//! - `patch` addresses single leaves (`object.rotation.direction`) with typed
//!   values so UI controls never need a full re-parse.
//! - `schema` describes every field once; completions and patch typing are
//!   derived from it rather than from a live config instance.
//! - `store` keeps the current configuration behind an `Arc` and swaps it
//!   wholesale on every accepted change.

mod codec;
mod patch;
mod schema;
mod shape;
mod store;

pub use codec::{decode, encode, parse_tree, Decoded, LineIssue, SETTINGS_COMMENT};
pub use patch::{apply_patch, FieldPath, FieldValue, PatchError};
pub use schema::{completions, lookup, Completion, FieldKind, SchemaNode, SCENE_SCHEMA};
pub use shape::{check_shape, ShapeMismatch};
pub use store::ConfigStore;

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("configuration does not match the expected shape: {}", format_mismatches(.0))]
    Shape(Vec<ShapeMismatch>),
    #[error("configuration values are invalid: {0}")]
    Convert(#[from] serde_json::Error),
}

fn format_mismatches(mismatches: &[ShapeMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Full scene configuration edited through the text notation.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct SceneConfig {
    pub object: ObjectSettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObjectSettings {
    pub rotation: RotationSettings,
    pub scale: [f64; 3],
    pub position: [f64; 3],
}

impl Default for ObjectSettings {
    fn default() -> Self {
        Self {
            rotation: RotationSettings::default(),
            scale: [1.0, 1.0, 1.0],
            position: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RotationSettings {
    pub axis: Axis,
    pub speed: f64,
    /// Signed multiplier applied to `speed` every frame. Conventionally -1, 0
    /// or 1 but deliberately left unclamped.
    pub direction: i32,
    #[serde(rename = "isRotating")]
    pub is_rotating: bool,
}

impl RotationSettings {
    /// Rotation increment applied on each frame while rotating.
    pub fn step(&self) -> f64 {
        self.speed * f64::from(self.direction)
    }
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            axis: Axis::Z,
            speed: 0.005,
            direction: 1,
            is_rotating: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "x" => Some(Axis::X),
            "y" => Some(Axis::Y),
            "z" => Some(Axis::Z),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("x"),
            Axis::Y => f.write_str("y"),
            Axis::Z => f.write_str("z"),
        }
    }
}

/// Camera parameters pushed into the active camera on every change.
///
/// Only `fov` and `position` are required; the remaining fields are applied
/// when present and otherwise leave the camera untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CameraSettings {
    pub fov: f64,
    pub position: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub near: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub far: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<f64>,
    #[serde(
        default,
        rename = "filmOffset",
        skip_serializing_if = "Option::is_none"
    )]
    pub film_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<[f64; 3]>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov: 75.0,
            position: [0.0, -3.0, 1.0],
            near: None,
            far: None,
            aspect: None,
            zoom: None,
            focus: None,
            film_offset: None,
            rotation: None,
            up: None,
        }
    }
}
