use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Named texture role; decides which sampler a texture binds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextureSlot {
    Map,
    NormalMap,
    RoughnessMap,
    MetalnessMap,
    AoMap,
    DisplacementMap,
    EnvMap,
    AlphaMap,
    Hdri,
}

/// Number of texture slots; bindings are laid out per slot index.
pub const SLOT_COUNT: usize = 9;

impl TextureSlot {
    pub const ALL: [TextureSlot; SLOT_COUNT] = [
        TextureSlot::Map,
        TextureSlot::NormalMap,
        TextureSlot::RoughnessMap,
        TextureSlot::MetalnessMap,
        TextureSlot::AoMap,
        TextureSlot::DisplacementMap,
        TextureSlot::EnvMap,
        TextureSlot::AlphaMap,
        TextureSlot::Hdri,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TextureSlot::Map => "map",
            TextureSlot::NormalMap => "normalMap",
            TextureSlot::RoughnessMap => "roughnessMap",
            TextureSlot::MetalnessMap => "metalnessMap",
            TextureSlot::AoMap => "aoMap",
            TextureSlot::DisplacementMap => "displacementMap",
            TextureSlot::EnvMap => "envMap",
            TextureSlot::AlphaMap => "alphaMap",
            TextureSlot::Hdri => "hdri",
        }
    }

    /// Position in [`TextureSlot::ALL`]; stable across builds.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Sampler uniform name exposed to fragment shaders (`u_map`).
    pub fn uniform_name(self) -> String {
        format!("u_{}", self.as_str())
    }
}

impl fmt::Display for TextureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextureSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TextureSlot::ALL
            .into_iter()
            .find(|slot| slot.as_str() == s.trim())
            .ok_or_else(|| format!("unknown texture slot '{s}'"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WrapMode {
    Repeat,
    #[default]
    ClampToEdge,
    MirroredRepeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MagFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MinFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapNearest,
    #[default]
    LinearMipmapLinear,
}

impl MinFilter {
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, MinFilter::Nearest | MinFilter::Linear)
    }
}

/// Colour encoding of the stored texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextureEncoding {
    #[default]
    Linear,
    Srgb,
    Gamma,
    Rgbe,
    Rgbm,
    Rgbd,
    LogLuv,
}

/// How a texture is projected onto the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextureMapping {
    #[default]
    Uv,
    CubeReflection,
    CubeRefraction,
    EquirectangularReflection,
    EquirectangularRefraction,
    SphericalReflection,
}

impl TextureMapping {
    /// Cube mappings sample a six-face cube texture.
    pub fn is_cube(self) -> bool {
        matches!(
            self,
            TextureMapping::CubeReflection | TextureMapping::CubeRefraction
        )
    }

    pub const ALL: [TextureMapping; 6] = [
        TextureMapping::Uv,
        TextureMapping::CubeReflection,
        TextureMapping::CubeRefraction,
        TextureMapping::EquirectangularReflection,
        TextureMapping::EquirectangularRefraction,
        TextureMapping::SphericalReflection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TextureMapping::Uv => "uv",
            TextureMapping::CubeReflection => "cube-reflection",
            TextureMapping::CubeRefraction => "cube-refraction",
            TextureMapping::EquirectangularReflection => "equirect-reflection",
            TextureMapping::EquirectangularRefraction => "equirect-refraction",
            TextureMapping::SphericalReflection => "spherical-reflection",
        }
    }
}

impl fmt::Display for TextureMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextureMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TextureMapping::ALL
            .into_iter()
            .find(|mapping| mapping.as_str() == s.trim())
            .ok_or_else(|| format!("unknown texture mapping '{s}'"))
    }
}

/// Channel layout the decoded image is expanded into before upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Rgba,
    Rgb,
    Alpha,
    Luminance,
    LuminanceAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TexelType {
    #[default]
    UnsignedByte,
    HalfFloat,
}

/// Every user-tunable texture parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureParams {
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub mag_filter: MagFilter,
    pub min_filter: MinFilter,
    pub encoding: TextureEncoding,
    pub mapping: TextureMapping,
    pub format: PixelFormat,
    pub texel_type: TexelType,
    pub repeat: [f32; 2],
    pub offset: [f32; 2],
    pub center: [f32; 2],
    /// Radians; not wrapped or clamped.
    pub rotation: f32,
    /// Advisory; the backend caps it to what the hardware supports.
    pub anisotropy: u16,
    pub flip_y: bool,
}

impl Default for TextureParams {
    fn default() -> Self {
        Self {
            wrap_s: WrapMode::default(),
            wrap_t: WrapMode::default(),
            mag_filter: MagFilter::default(),
            min_filter: MinFilter::default(),
            encoding: TextureEncoding::default(),
            mapping: TextureMapping::default(),
            format: PixelFormat::default(),
            texel_type: TexelType::default(),
            repeat: [1.0, 1.0],
            offset: [0.0, 0.0],
            center: [0.0, 0.0],
            rotation: 0.0,
            anisotropy: 1,
            flip_y: true,
        }
    }
}

impl TextureParams {
    /// Anisotropy clamped to the supported `[1, 16]` range.
    pub fn clamped_anisotropy(&self) -> u16 {
        self.anisotropy.clamp(1, 16)
    }
}

/// One uploaded image file.
#[derive(Clone, Debug)]
pub struct ImageBlob {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

impl ImageBlob {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    fn same_blob(&self, other: &ImageBlob) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

/// A texture the user uploaded, keyed by `name` in a [`TextureSet`].
///
/// Cube mappings carry six blobs (+x, -x, +y, -y, +z, -z); everything else
/// carries one.
#[derive(Clone, Debug)]
pub struct TextureEntry {
    pub name: String,
    pub files: Vec<ImageBlob>,
    pub slot: TextureSlot,
    pub params: TextureParams,
}

impl TextureEntry {
    pub fn new(name: impl Into<String>, file: ImageBlob, slot: TextureSlot) -> Self {
        Self {
            name: name.into(),
            files: vec![file],
            slot,
            params: TextureParams::default(),
        }
    }

    /// True when `other` describes the same texture with the same parameters
    /// and the very same uploaded blobs.
    pub fn same_as(&self, other: &TextureEntry) -> bool {
        self.slot == other.slot
            && self.params == other.params
            && self.files.len() == other.files.len()
            && self
                .files
                .iter()
                .zip(&other.files)
                .all(|(left, right)| left.same_blob(right))
    }
}

/// Active texture collection; names are unique by construction.
pub type TextureSet = BTreeMap<String, TextureEntry>;

/// Returns true if the two sets differ in membership or in any entry.
pub fn texture_sets_differ(current: &TextureSet, previous: &TextureSet) -> bool {
    current.len() != previous.len()
        || current.iter().any(|(name, entry)| {
            previous
                .get(name)
                .map_or(true, |previous| !entry.same_as(previous))
        })
}

/// Renderer-wide knobs.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererOptions {
    /// How long a success notification stays visible.
    pub success_ttl: Duration,
    /// How long an error notification stays visible.
    pub error_ttl: Duration,
    /// Upper bound applied to requested anisotropy.
    pub max_anisotropy: u16,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            success_ttl: Duration::from_secs(3),
            error_ttl: Duration::from_secs(10),
            max_anisotropy: 16,
        }
    }
}
