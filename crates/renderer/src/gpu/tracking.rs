use std::collections::BTreeSet;

use anyhow::{bail, Result};

use super::{DrawCall, GpuBackend, MeshId, ProgramId, TextureId};
use crate::geometry::Geometry;
use crate::textures::DecodedTexture;
use crate::validate::ValidatedProgram;

/// Records resource lifetimes instead of touching a GPU.
#[derive(Default)]
pub(crate) struct TrackingBackend {
    next_id: u64,
    pub live_textures: BTreeSet<TextureId>,
    pub live_programs: BTreeSet<ProgramId>,
    pub live_meshes: BTreeSet<MeshId>,
    pub texture_creates: usize,
    pub program_creates: usize,
    /// Fragment sources of every program created, in order.
    pub program_sources: Vec<String>,
    /// `(program, time)` per draw.
    pub draws: Vec<(ProgramId, f32)>,
    pub fail_programs: bool,
}

impl TrackingBackend {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl GpuBackend for TrackingBackend {
    fn create_texture(&mut self, _texture: &DecodedTexture) -> Result<TextureId> {
        let id = TextureId(self.next());
        self.texture_creates += 1;
        self.live_textures.insert(id);
        Ok(id)
    }

    fn dispose_texture(&mut self, id: TextureId) {
        assert!(self.live_textures.remove(&id), "double dispose of {id:?}");
    }

    fn create_program(&mut self, program: &ValidatedProgram) -> Result<ProgramId> {
        if self.fail_programs {
            bail!("pipeline creation refused");
        }
        let id = ProgramId(self.next());
        self.program_creates += 1;
        self.program_sources.push(program.sources.fragment.clone());
        self.live_programs.insert(id);
        Ok(id)
    }

    fn dispose_program(&mut self, id: ProgramId) {
        assert!(self.live_programs.remove(&id), "double dispose of {id:?}");
    }

    fn upload_mesh(&mut self, _geometry: &Geometry) -> Result<MeshId> {
        let id = MeshId(self.next());
        self.live_meshes.insert(id);
        Ok(id)
    }

    fn dispose_mesh(&mut self, id: MeshId) {
        self.live_meshes.remove(&id);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        assert!(self.live_programs.contains(&call.program));
        for (slot, _) in call.uniforms.layout().bindings() {
            if let Some(id) = call.uniforms.sampler(*slot) {
                assert!(self.live_textures.contains(&id), "draw samples disposed {id:?}");
            }
        }
        self.draws.push((call.program, call.scene.time[0]));
        Ok(())
    }
}
