//! Typed single-leaf updates addressed by dotted path.
//!
//! UI controls (direction buttons, the speed slider, the pause toggle) patch a
//! single field without re-parsing the editor text. Paths are parsed into a
//! closed [`FieldPath`] set and values are checked against the schema before
//! the config is touched.

use std::fmt;
use std::str::FromStr;

use crate::schema::{lookup, FieldKind, SchemaNode};
use crate::{Axis, SceneConfig};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PatchError {
    #[error("unknown configuration path '{0}'")]
    UnknownPath(String),
    #[error("'{path}' expects {expected}, got {found}")]
    TypeMismatch {
        path: FieldPath,
        expected: String,
        found: String,
    },
    #[error("'{path}' value {value} is out of range")]
    OutOfRange { path: FieldPath, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPath {
    RotationAxis,
    RotationSpeed,
    RotationDirection,
    RotationIsRotating,
    ObjectScale,
    ObjectPosition,
    CameraFov,
    CameraPosition,
    CameraNear,
    CameraFar,
    CameraAspect,
    CameraZoom,
    CameraFocus,
    CameraFilmOffset,
    CameraRotation,
    CameraUp,
}

impl FieldPath {
    pub const ALL: [FieldPath; 16] = [
        FieldPath::RotationAxis,
        FieldPath::RotationSpeed,
        FieldPath::RotationDirection,
        FieldPath::RotationIsRotating,
        FieldPath::ObjectScale,
        FieldPath::ObjectPosition,
        FieldPath::CameraFov,
        FieldPath::CameraPosition,
        FieldPath::CameraNear,
        FieldPath::CameraFar,
        FieldPath::CameraAspect,
        FieldPath::CameraZoom,
        FieldPath::CameraFocus,
        FieldPath::CameraFilmOffset,
        FieldPath::CameraRotation,
        FieldPath::CameraUp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldPath::RotationAxis => "object.rotation.axis",
            FieldPath::RotationSpeed => "object.rotation.speed",
            FieldPath::RotationDirection => "object.rotation.direction",
            FieldPath::RotationIsRotating => "object.rotation.isRotating",
            FieldPath::ObjectScale => "object.scale",
            FieldPath::ObjectPosition => "object.position",
            FieldPath::CameraFov => "camera.fov",
            FieldPath::CameraPosition => "camera.position",
            FieldPath::CameraNear => "camera.near",
            FieldPath::CameraFar => "camera.far",
            FieldPath::CameraAspect => "camera.aspect",
            FieldPath::CameraZoom => "camera.zoom",
            FieldPath::CameraFocus => "camera.focus",
            FieldPath::CameraFilmOffset => "camera.filmOffset",
            FieldPath::CameraRotation => "camera.rotation",
            FieldPath::CameraUp => "camera.up",
        }
    }

    /// Semantic type of the addressed leaf, taken from the schema.
    pub fn kind(self) -> FieldKind {
        match lookup(self.as_str()) {
            Some(SchemaNode::Field { kind, .. }) => *kind,
            _ => FieldKind::Number,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldPath {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        FieldPath::ALL
            .into_iter()
            .find(|path| path.as_str() == trimmed)
            .ok_or_else(|| PatchError::UnknownPath(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Integer(i64),
    Text(String),
    Vector3([f64; 3]),
}

impl FieldValue {
    fn describe(&self) -> String {
        match self {
            FieldValue::Bool(value) => format!("boolean {value}"),
            FieldValue::Number(value) => format!("number {value}"),
            FieldValue::Integer(value) => format!("integer {value}"),
            FieldValue::Text(value) => format!("text \"{value}\""),
            FieldValue::Vector3(value) => format!("3-vector {value:?}"),
        }
    }
}

/// Applies one typed leaf update in place.
///
/// On error the config is left exactly as it was.
pub fn apply_patch(
    config: &mut SceneConfig,
    path: FieldPath,
    value: FieldValue,
) -> Result<(), PatchError> {
    let kind = path.kind();
    let mismatch = |value: &FieldValue| PatchError::TypeMismatch {
        path,
        expected: kind.to_string(),
        found: value.describe(),
    };
    let out_of_range = |value: String| PatchError::OutOfRange { path, value };

    let number = |value: &FieldValue| match value {
        FieldValue::Number(number) if number.is_finite() => Ok(*number),
        FieldValue::Number(number) => Err(out_of_range(number.to_string())),
        FieldValue::Integer(integer) => Ok(*integer as f64),
        other => Err(mismatch(other)),
    };
    let vector = |value: &FieldValue| match value {
        FieldValue::Vector3(components) if components.iter().all(|c| c.is_finite()) => {
            Ok(*components)
        }
        FieldValue::Vector3(components) => Err(out_of_range(format!("{components:?}"))),
        other => Err(mismatch(other)),
    };

    let rotation = &mut config.object.rotation;
    let camera = &mut config.camera;
    match path {
        FieldPath::RotationAxis => match &value {
            FieldValue::Text(raw) => {
                rotation.axis = Axis::parse(raw).ok_or_else(|| out_of_range(raw.clone()))?;
            }
            other => return Err(mismatch(other)),
        },
        FieldPath::RotationSpeed => rotation.speed = number(&value)?,
        FieldPath::RotationDirection => match value {
            FieldValue::Integer(direction) => {
                rotation.direction = i32::try_from(direction)
                    .map_err(|_| out_of_range(direction.to_string()))?;
            }
            ref other => return Err(mismatch(other)),
        },
        FieldPath::RotationIsRotating => match value {
            FieldValue::Bool(flag) => rotation.is_rotating = flag,
            ref other => return Err(mismatch(other)),
        },
        FieldPath::ObjectScale => config.object.scale = vector(&value)?,
        FieldPath::ObjectPosition => config.object.position = vector(&value)?,
        FieldPath::CameraFov => camera.fov = number(&value)?,
        FieldPath::CameraPosition => camera.position = vector(&value)?,
        FieldPath::CameraNear => camera.near = Some(number(&value)?),
        FieldPath::CameraFar => camera.far = Some(number(&value)?),
        FieldPath::CameraAspect => camera.aspect = Some(number(&value)?),
        FieldPath::CameraZoom => camera.zoom = Some(number(&value)?),
        FieldPath::CameraFocus => camera.focus = Some(number(&value)?),
        FieldPath::CameraFilmOffset => camera.film_offset = Some(number(&value)?),
        FieldPath::CameraRotation => camera.rotation = Some(vector(&value)?),
        FieldPath::CameraUp => camera.up = Some(vector(&value)?),
    }

    tracing::debug!(%path, "configuration field patched");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_path_has_a_schema_leaf() {
        for path in FieldPath::ALL {
            assert!(
                matches!(lookup(path.as_str()), Some(SchemaNode::Field { .. })),
                "{path} missing from schema"
            );
        }
    }

    #[test]
    fn parses_dotted_paths() {
        let path: FieldPath = "object.rotation.direction".parse().unwrap();
        assert_eq!(path, FieldPath::RotationDirection);
        assert!(matches!(
            "object.rotation.spin".parse::<FieldPath>(),
            Err(PatchError::UnknownPath(_))
        ));
    }

    #[test]
    fn patches_direction_without_touching_other_fields() {
        let mut config = SceneConfig::default();
        apply_patch(
            &mut config,
            FieldPath::RotationDirection,
            FieldValue::Integer(-1),
        )
        .unwrap();
        let mut expected = SceneConfig::default();
        expected.object.rotation.direction = -1;
        assert_eq!(config, expected);
    }

    #[test]
    fn rejects_wrong_type_and_leaves_config_intact() {
        let mut config = SceneConfig::default();
        let err = apply_patch(
            &mut config,
            FieldPath::RotationIsRotating,
            FieldValue::Number(1.0),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::TypeMismatch { .. }));
        assert_eq!(config, SceneConfig::default());
    }

    #[test]
    fn rejects_non_finite_speed() {
        let mut config = SceneConfig::default();
        let err = apply_patch(
            &mut config,
            FieldPath::RotationSpeed,
            FieldValue::Number(f64::NAN),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::OutOfRange { .. }));
    }

    #[test]
    fn axis_accepts_letters_only() {
        let mut config = SceneConfig::default();
        apply_patch(&mut config, FieldPath::RotationAxis, FieldValue::Text("x".into())).unwrap();
        assert_eq!(config.object.rotation.axis, Axis::X);
        assert!(apply_patch(&mut config, FieldPath::RotationAxis, FieldValue::Text("q".into()))
            .is_err());
    }

    #[test]
    fn optional_camera_fields_become_present() {
        let mut config = SceneConfig::default();
        apply_patch(&mut config, FieldPath::CameraUp, FieldValue::Vector3([0.0, 0.0, 1.0]))
            .unwrap();
        apply_patch(&mut config, FieldPath::CameraNear, FieldValue::Integer(1)).unwrap();
        assert_eq!(config.camera.up, Some([0.0, 0.0, 1.0]));
        assert_eq!(config.camera.near, Some(1.0));
    }
}
