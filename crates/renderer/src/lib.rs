//! Live shader and texture pipeline for a single-mesh scene editor.
//!
//! Editor input flows through a handful of small owners, all driven from one
//! render loop:
//!
//! ```text
//!   config text ──▶ ConfigStore ──▶ SceneObject / Camera
//!   shader text ──▶ MaterialManager ──▶ ShaderValidator ──▶ GpuBackend::create_program
//!   texture set ──▶ TextureLoader (decode thread) ──▶ UniformSet ──▶ MaterialManager::rebind
//!                                   │
//!                     RenderLoop::frame() ──▶ GpuBackend::draw
//! ```
//!
//! User shaders are plain GLSL bodies. [`compile`] wraps them with a prelude
//! that declares the scene uniforms, vertex attributes and one sampler per
//! bound texture slot, so a program is always validated against the texture
//! layout it will actually be drawn with. Failed edits never replace the
//! program on screen; they surface as [`notify::Notification`]s instead.
//!
//! [`gpu::WgpuBackend`] renders offscreen through `wgpu` for previews and
//! tests with real hardware; every other module only sees [`gpu::GpuBackend`].

pub mod compile;
pub mod geometry;
pub mod gpu;
pub mod material;
pub mod notify;
pub mod runtime;
pub mod scene;
pub mod textures;
pub mod types;
pub mod uniforms;
pub mod validate;

pub use compile::ShaderSources;
pub use geometry::{generate_uvs, unit_cube, Bounds, Geometry};
pub use gpu::{GpuBackend, HeadlessOptions, WgpuBackend};
pub use material::{MaterialManager, ProgramStatus};
pub use notify::{Notification, NotificationKind, Notifier, Severity};
pub use runtime::{FrameClock, FrameStats, RenderLoop};
pub use scene::{Camera, SceneObject};
pub use textures::{TextureLoadError, TextureLoader};
pub use types::{
    ImageBlob, RendererOptions, TextureEntry, TextureMapping, TextureParams, TextureSet,
    TextureSlot,
};
pub use uniforms::{ProgramLayout, UniformSet};
pub use validate::{ShaderValidator, ValidationError, ValidationStage};
