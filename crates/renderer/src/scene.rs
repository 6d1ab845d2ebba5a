//! The displayed mesh and the camera, driven by [`sceneconfig::SceneConfig`].

use glam::{EulerRot, Mat4, Quat, Vec3};
use sceneconfig::{Axis, CameraSettings, ObjectSettings, RotationSettings};

use crate::geometry::{generate_uvs, Bounds, Geometry};

/// Mesh transform state; rotation accumulates frame by frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneObject {
    geometry: Geometry,
    bounds: Option<Bounds>,
    /// Euler angles in radians, applied X then Y then Z.
    pub rotation: Vec3,
    pub scale: Vec3,
    pub position: Vec3,
}

impl SceneObject {
    /// Prepares a loaded mesh: generates UVs and normals it lacks.
    pub fn new(mut geometry: Geometry) -> Self {
        if geometry.uvs.is_none() && !generate_uvs(&mut geometry) {
            tracing::warn!("mesh has no uvs and none could be generated");
        }
        if geometry.normals.is_none() {
            geometry.compute_normals();
        }
        let bounds = geometry.bounds();
        if let Some(bounds) = bounds {
            tracing::debug!(
                vertices = geometry.vertex_count(),
                min = ?bounds.min,
                max = ?bounds.max,
                center = ?bounds.center(),
                "mesh attached"
            );
        }
        Self {
            geometry,
            bounds,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            position: Vec3::ZERO,
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Copies scale and position; rotation keeps accumulating.
    pub fn apply_settings(&mut self, settings: &ObjectSettings) {
        self.scale = to_vec3(settings.scale);
        self.position = to_vec3(settings.position);
    }

    /// Advances one frame of rotation.
    pub fn advance(&mut self, rotation: &RotationSettings) {
        if !rotation.is_rotating {
            return;
        }
        let step = rotation.step() as f32;
        match rotation.axis {
            Axis::X => self.rotation.x += step,
            Axis::Y => self.rotation.y += step,
            Axis::Z => self.rotation.z += step,
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

/// Why one camera field was left unchanged.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("camera.{field} = {value} ignored: {reason}")]
pub struct CameraFieldError {
    pub field: &'static str,
    pub value: String,
    pub reason: &'static str,
}

const FILM_GAUGE: f32 = 35.0;

/// Perspective camera.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
    pub zoom: f32,
    pub focus: f32,
    pub film_offset: f32,
    /// Explicit orientation; when absent the camera looks at the origin.
    pub rotation: Option<Vec3>,
    pub up: Vec3,
    projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            position: Vec3::new(0.0, -3.0, 1.0),
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            aspect: 1.0,
            zoom: 1.0,
            focus: 10.0,
            film_offset: 0.0,
            rotation: None,
            up: Vec3::Y,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }
}

impl Camera {
    /// Applies `settings` field by field.
    ///
    /// Position is applied first, then every other present field. A field
    /// whose value is unusable is logged and skipped without affecting the
    /// others; the projection is recomputed at the end regardless.
    pub fn apply_settings(&mut self, settings: &CameraSettings) -> Vec<CameraFieldError> {
        let mut skipped = Vec::new();
        let mut check = |field: &'static str, value: String, reason: Option<&'static str>| {
            if let Some(reason) = reason {
                let err = CameraFieldError {
                    field,
                    value,
                    reason,
                };
                tracing::warn!(error = %err, "camera field skipped");
                skipped.push(err);
                false
            } else {
                true
            }
        };

        let position = to_vec3(settings.position);
        if check("position", format!("{position}"), finite_vec(position)) {
            self.position = position;
        }

        let fov = settings.fov as f32;
        let fov_reason = if !(fov > 0.0 && fov < 180.0) {
            Some("must be between 0 and 180 degrees")
        } else {
            None
        };
        if check("fov", fov.to_string(), fov_reason) {
            self.fov = fov;
        }

        if let Some(near) = settings.near.map(|near| near as f32) {
            let reason = (!(near > 0.0)).then_some("must be positive");
            if check("near", near.to_string(), reason) {
                self.near = near;
            }
        }
        if let Some(far) = settings.far.map(|far| far as f32) {
            let reason = (!(far > self.near)).then_some("must be beyond the near plane");
            if check("far", far.to_string(), reason) {
                self.far = far;
            }
        }
        if let Some(aspect) = settings.aspect.map(|aspect| aspect as f32) {
            let reason = (!(aspect > 0.0)).then_some("must be positive");
            if check("aspect", aspect.to_string(), reason) {
                self.aspect = aspect;
            }
        }
        if let Some(zoom) = settings.zoom.map(|zoom| zoom as f32) {
            let reason = (!(zoom > 0.0)).then_some("must be positive");
            if check("zoom", zoom.to_string(), reason) {
                self.zoom = zoom;
            }
        }
        if let Some(focus) = settings.focus.map(|focus| focus as f32) {
            let reason = (!focus.is_finite()).then_some("must be finite");
            if check("focus", focus.to_string(), reason) {
                self.focus = focus;
            }
        }
        if let Some(offset) = settings.film_offset.map(|offset| offset as f32) {
            let reason = (!offset.is_finite()).then_some("must be finite");
            if check("filmOffset", offset.to_string(), reason) {
                self.film_offset = offset;
            }
        }
        if let Some(rotation) = settings.rotation.map(to_vec3) {
            if check("rotation", format!("{rotation}"), finite_vec(rotation)) {
                self.rotation = Some(rotation);
            }
        }
        if let Some(up) = settings.up.map(to_vec3) {
            let reason = finite_vec(up).or_else(|| (up.length_squared() == 0.0).then_some("must not be zero"));
            if check("up", format!("{up}"), reason) {
                self.up = up.normalize();
            }
        }

        self.update_projection_matrix();
        skipped
    }

    /// Sets the aspect ratio from a viewport size.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
            self.update_projection_matrix();
        }
    }

    /// Right-handed projection with a `[0, 1]` depth range.
    pub fn update_projection_matrix(&mut self) {
        let top = self.near * (self.fov.to_radians() * 0.5).tan() / self.zoom;
        let height = 2.0 * top;
        let width = self.aspect * height;
        let mut left = -0.5 * width;
        if self.film_offset != 0.0 {
            let film_width = FILM_GAUGE * self.aspect.min(1.0);
            left += self.near * self.film_offset / film_width;
        }
        let right = left + width;
        let bottom = top - height;

        let (n, f) = (self.near, self.far);
        self.projection = Mat4::from_cols(
            [2.0 * n / (right - left), 0.0, 0.0, 0.0].into(),
            [0.0, 2.0 * n / (top - bottom), 0.0, 0.0].into(),
            [
                (right + left) / (right - left),
                (top + bottom) / (top - bottom),
                f / (n - f),
                -1.0,
            ]
            .into(),
            [0.0, 0.0, n * f / (n - f), 0.0].into(),
        );
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        match self.rotation {
            Some(rotation) => {
                let orientation =
                    Quat::from_euler(EulerRot::XYZ, rotation.x, rotation.y, rotation.z);
                Mat4::from_rotation_translation(orientation, self.position).inverse()
            }
            None if self.position.length_squared() > 0.0 => {
                Mat4::look_at_rh(self.position, Vec3::ZERO, self.up)
            }
            None => Mat4::IDENTITY,
        }
    }
}

fn to_vec3(value: [f64; 3]) -> Vec3 {
    Vec3::new(value[0] as f32, value[1] as f32, value[2] as f32)
}

fn finite_vec(value: Vec3) -> Option<&'static str> {
    (!value.is_finite()).then_some("must be finite")
}
