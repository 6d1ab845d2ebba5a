use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::gpu::TextureId;
use crate::types::{TextureParams, TextureSlot, SLOT_COUNT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextureKind {
    Texture2d,
    Cube,
}

/// Which slots a program samples and with which texture dimension.
///
/// Kept sorted by slot so equal sets always compare and hash equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProgramLayout {
    bindings: Vec<(TextureSlot, TextureKind)>,
}

impl ProgramLayout {
    /// Later duplicates of a slot replace earlier ones.
    pub fn new(bindings: impl IntoIterator<Item = (TextureSlot, TextureKind)>) -> Self {
        let map: BTreeMap<_, _> = bindings.into_iter().collect();
        Self {
            bindings: map.into_iter().collect(),
        }
    }

    pub fn bindings(&self) -> &[(TextureSlot, TextureKind)] {
        &self.bindings
    }

    pub fn kind(&self, slot: TextureSlot) -> Option<TextureKind> {
        self.bindings
            .iter()
            .find(|(bound, _)| *bound == slot)
            .map(|(_, kind)| *kind)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A texture resident on the GPU and attached to a slot.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundTexture {
    pub id: TextureId,
    pub name: String,
    pub slot: TextureSlot,
    pub kind: TextureKind,
    pub params: TextureParams,
    pub size: [u32; 2],
}

/// UV transform applied through `transformUV` in shaders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureTransform {
    pub repeat: [f32; 2],
    pub offset: [f32; 2],
    pub center: [f32; 2],
    pub rotation: f32,
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            repeat: [1.0, 1.0],
            offset: [0.0, 0.0],
            center: [0.0, 0.0],
            rotation: 0.0,
        }
    }
}

impl From<&TextureParams> for TextureTransform {
    fn from(params: &TextureParams) -> Self {
        Self {
            repeat: params.repeat,
            offset: params.offset,
            center: params.center,
            rotation: params.rotation,
        }
    }
}

/// Named values fed to the active program each frame.
///
/// Rebuilt from scratch whenever the bound texture set changes, so a slot
/// never outlives the texture it pointed at.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformSet {
    time: f32,
    samplers: BTreeMap<TextureSlot, (TextureId, TextureKind)>,
    transforms: BTreeMap<TextureSlot, TextureTransform>,
}

impl UniformSet {
    pub fn from_textures(textures: &[BoundTexture]) -> Self {
        let mut set = Self::default();
        for texture in textures {
            if let Some((previous, _)) = set
                .samplers
                .insert(texture.slot, (texture.id, texture.kind))
            {
                tracing::warn!(
                    slot = %texture.slot,
                    texture = %texture.name,
                    ?previous,
                    "several textures target one slot; the last one wins"
                );
            }
            set.transforms
                .insert(texture.slot, TextureTransform::from(&texture.params));
        }
        set
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    pub fn sampler(&self, slot: TextureSlot) -> Option<TextureId> {
        self.samplers.get(&slot).map(|(id, _)| *id)
    }

    pub fn transform(&self, slot: TextureSlot) -> Option<&TextureTransform> {
        self.transforms.get(&slot)
    }

    pub fn layout(&self) -> ProgramLayout {
        ProgramLayout::new(self.samplers.iter().map(|(slot, (_, kind))| (*slot, *kind)))
    }

    /// Shader-visible names in a deterministic order.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec!["uTime".to_string()];
        for slot in self.samplers.keys() {
            let base = slot.uniform_name();
            names.push(format!("{base}_repeat"));
            names.push(format!("{base}_offset"));
            names.push(format!("{base}_center"));
            names.push(format!("{base}_rotation"));
            names.push(base);
        }
        names
    }

    pub fn transform_block(&self) -> TransformBlock {
        let mut block = TransformBlock::zeroed();
        for slot in TextureSlot::ALL {
            let transform = self.transforms.get(&slot).copied().unwrap_or_default();
            block.slots[slot.index()] = [
                transform.repeat[0],
                transform.repeat[1],
                transform.offset[0],
                transform.offset[1],
                transform.center[0],
                transform.center[1],
                transform.rotation,
                0.0,
            ];
        }
        block
    }
}

/// std140 image of `SceneUniforms`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneBlock {
    pub projection: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub time: [f32; 4],
}

impl SceneBlock {
    pub fn new(projection: Mat4, view: Mat4, model: Mat4, camera_position: Vec3, time: f32) -> Self {
        let model_view = view * model;
        let normal = Mat3::from_mat4(model_view).inverse().transpose();
        Self {
            projection: projection.to_cols_array_2d(),
            model_view: model_view.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            normal: Mat4::from_mat3(normal).to_cols_array_2d(),
            camera_position: camera_position.extend(1.0).to_array(),
            time: [time, 0.0, 0.0, 0.0],
        }
    }
}

/// std140 image of `TextureTransforms`: two vec4 per slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformBlock {
    pub slots: [[f32; 8]; SLOT_COUNT],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureParams;

    fn bound(id: u64, slot: TextureSlot, kind: TextureKind) -> BoundTexture {
        BoundTexture {
            id: TextureId(id),
            name: format!("tex{id}"),
            slot,
            kind,
            params: TextureParams::default(),
            size: [1, 1],
        }
    }

    #[test]
    fn block_sizes_match_glsl_layout() {
        assert_eq!(std::mem::size_of::<SceneBlock>(), 5 * 64 + 2 * 16);
        assert_eq!(std::mem::size_of::<TransformBlock>(), SLOT_COUNT * 32);
    }

    #[test]
    fn rebuilt_set_drops_removed_slots() {
        let first = UniformSet::from_textures(&[
            bound(1, TextureSlot::Map, TextureKind::Texture2d),
            bound(2, TextureSlot::EnvMap, TextureKind::Cube),
        ]);
        assert_eq!(first.layout().bindings().len(), 2);

        let second = UniformSet::from_textures(&[bound(3, TextureSlot::Map, TextureKind::Texture2d)]);
        assert_eq!(second.sampler(TextureSlot::EnvMap), None);
        assert_eq!(second.sampler(TextureSlot::Map), Some(TextureId(3)));
        assert!(second.transform(TextureSlot::EnvMap).is_none());
    }

    #[test]
    fn names_are_deterministic() {
        let set = UniformSet::from_textures(&[
            bound(2, TextureSlot::NormalMap, TextureKind::Texture2d),
            bound(1, TextureSlot::Map, TextureKind::Texture2d),
        ]);
        let names = set.names();
        assert_eq!(names[0], "uTime");
        assert_eq!(names[1], "u_map_repeat");
        assert_eq!(names[5], "u_map");
        assert_eq!(names[10], "u_normalMap");
    }

    #[test]
    fn transform_block_defaults_unbound_slots() {
        let mut texture = bound(1, TextureSlot::AoMap, TextureKind::Texture2d);
        texture.params.repeat = [2.0, 3.0];
        texture.params.rotation = 0.25;
        let block = UniformSet::from_textures(&[texture]).transform_block();
        assert_eq!(
            block.slots[TextureSlot::AoMap.index()],
            [2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.25, 0.0]
        );
        assert_eq!(
            block.slots[TextureSlot::Map.index()],
            [1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn duplicate_slot_keeps_last_texture() {
        let set = UniformSet::from_textures(&[
            bound(1, TextureSlot::Map, TextureKind::Texture2d),
            bound(2, TextureSlot::Map, TextureKind::Texture2d),
        ]);
        assert_eq!(set.sampler(TextureSlot::Map), Some(TextureId(2)));
    }
}
