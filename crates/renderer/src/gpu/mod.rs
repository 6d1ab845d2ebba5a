//! GPU seam.
//!
//! Everything above this module talks to [`GpuBackend`]; resource handles
//! are plain ids so ownership and disposal stay explicit:
//! - `context` brings up a headless `wgpu` device.
//! - `channels` turns decoded textures into texture/view/sampler triples.
//! - `pipeline` builds render pipelines from wrapped GLSL and a
//!   [`ProgramLayout`](crate::uniforms::ProgramLayout).
//! - `headless` implements [`GpuBackend`] on top of the three and renders
//!   into an offscreen target.

mod channels;
mod context;
mod headless;
mod pipeline;
#[cfg(test)]
pub(crate) mod tracking;

use anyhow::Result;

use crate::geometry::Geometry;
use crate::textures::DecodedTexture;
use crate::uniforms::{SceneBlock, TransformBlock, UniformSet};
use crate::validate::ValidatedProgram;

pub use context::{AdapterProfile, GpuPowerPreference};
pub use headless::{HeadlessOptions, WgpuBackend};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(pub u64);

/// Everything one draw needs.
pub struct DrawCall<'a> {
    pub program: ProgramId,
    pub mesh: MeshId,
    pub scene: &'a SceneBlock,
    pub transforms: &'a TransformBlock,
    pub uniforms: &'a UniformSet,
}

pub trait GpuBackend {
    fn create_texture(&mut self, texture: &DecodedTexture) -> Result<TextureId>;
    fn dispose_texture(&mut self, id: TextureId);
    fn create_program(&mut self, program: &ValidatedProgram) -> Result<ProgramId>;
    fn dispose_program(&mut self, id: ProgramId);
    fn upload_mesh(&mut self, geometry: &Geometry) -> Result<MeshId>;
    fn dispose_mesh(&mut self, id: MeshId);
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()>;
}
