//! Wraps user GLSL with the scene prelude.
//!
//! Users write Vulkan-flavoured GLSL 450 bodies. Before validation and
//! pipeline creation each stage is prefixed with:
//!
//! 1. the `SceneUniforms` block and macro aliases for the matrices,
//!    `cameraPosition` and `uTime`;
//! 2. vertex attributes (`position`, `normal`, `uv`) for the vertex stage;
//! 3. for the fragment stage, a `precision` statement, the
//!    `TextureTransforms` block, one texture/sampler pair per bound slot
//!    exposed as `u_<slot>`, and the `transformUV` helper.
//!
//! Redundant declarations users carry over from WebGL (`#version`,
//! `precision`, `uniform float uTime;`, `attribute vec3 position;`) are
//! blanked out rather than removed so compiler line numbers still match the
//! editor.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::types::{TextureMapping, TextureSlot};
use crate::uniforms::{ProgramLayout, TextureKind};

/// Names the prelude defines; user re-declarations of these are dropped.
const SCENE_NAMES: [&str; 7] = [
    "projectionMatrix",
    "modelViewMatrix",
    "modelMatrix",
    "viewMatrix",
    "normalMatrix",
    "cameraPosition",
    "uTime",
];

/// Vertex inputs declared by the vertex prelude only.
const ATTRIBUTE_NAMES: [&str; 3] = ["position", "normal", "uv"];

/// A stage source ready for the compiler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrappedShader {
    pub source: String,
    /// Lines injected ahead of the first user line.
    pub user_line_offset: u32,
}

impl WrappedShader {
    /// Maps a 1-based line in [`WrappedShader::source`] back to the user's text.
    ///
    /// Returns `None` for lines inside the prelude.
    pub fn user_line(&self, wrapped_line: u32) -> Option<u32> {
        wrapped_line
            .checked_sub(self.user_line_offset)
            .filter(|line| *line > 0)
    }
}

/// User-authored vertex/fragment pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Ready-made program that samples `u_map` with the given mapping.
    pub fn for_mapping(mapping: TextureMapping) -> Self {
        Self::new(MAPPED_VERTEX, mapped_fragment(mapping))
    }

    /// Layout [`ShaderSources::for_mapping`] expects.
    pub fn mapping_layout(mapping: TextureMapping) -> ProgramLayout {
        let kind = if mapping.is_cube() {
            TextureKind::Cube
        } else {
            TextureKind::Texture2d
        };
        ProgramLayout::new([(TextureSlot::Map, kind)])
    }
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self::new(DEFAULT_VERTEX, DEFAULT_FRAGMENT)
    }
}

pub fn wrap_vertex(user: &str) -> WrappedShader {
    let mut prelude = String::from("#version 450\n");
    prelude.push_str(SCENE_BLOCK);
    prelude.push_str(VERTEX_ATTRIBUTES);
    let attribute_names: BTreeSet<String> =
        ATTRIBUTE_NAMES.iter().map(|name| name.to_string()).collect();
    assemble(prelude, user, &attribute_names)
}

pub fn wrap_fragment(user: &str, layout: &ProgramLayout) -> WrappedShader {
    let mut prelude = String::from("#version 450\nprecision mediump float;\n");
    prelude.push_str(SCENE_BLOCK);
    prelude.push_str(&transforms_block());
    prelude.push_str(&sampler_bindings(layout));
    prelude.push_str(TRANSFORM_UV);

    let slot_names = TextureSlot::ALL
        .into_iter()
        .flat_map(|slot| {
            let name = slot.uniform_name();
            [
                format!("{name}_repeat"),
                format!("{name}_offset"),
                format!("{name}_center"),
                format!("{name}_rotation"),
                name,
            ]
        })
        .collect();
    assemble(prelude, user, &slot_names)
}

fn assemble(prelude: String, user: &str, extra_names: &BTreeSet<String>) -> WrappedShader {
    let user_line_offset = prelude.matches('\n').count() as u32;
    let mut source = prelude;
    for line in user.lines() {
        if !is_redundant_declaration(line, extra_names) {
            source.push_str(line);
        }
        source.push('\n');
    }
    WrappedShader {
        source,
        user_line_offset,
    }
}

fn is_redundant_declaration(line: &str, extra_names: &BTreeSet<String>) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("#version") || trimmed.starts_with("precision ") {
        return true;
    }
    let declares = ["uniform ", "attribute ", "in "]
        .iter()
        .any(|keyword| trimmed.starts_with(keyword));
    if !declares || trimmed.contains('{') {
        return false;
    }
    trimmed
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| SCENE_NAMES.contains(&token) || extra_names.contains(token))
}

fn transforms_block() -> String {
    let mut block =
        String::from("layout(std140, set = 0, binding = 1) uniform TextureTransforms {\n");
    for slot in TextureSlot::ALL {
        let _ = writeln!(block, "    vec4 _{slot}_repeatOffset;");
        let _ = writeln!(block, "    vec4 _{slot}_centerRotation;");
    }
    block.push_str("} transforms;\n");
    for slot in TextureSlot::ALL {
        let name = slot.uniform_name();
        let _ = writeln!(block, "#define {name}_repeat transforms._{slot}_repeatOffset.xy");
        let _ = writeln!(block, "#define {name}_offset transforms._{slot}_repeatOffset.zw");
        let _ = writeln!(block, "#define {name}_center transforms._{slot}_centerRotation.xy");
        let _ = writeln!(block, "#define {name}_rotation transforms._{slot}_centerRotation.z");
    }
    block
}

/// Set 1 binding indices for a slot: texture at `2i`, sampler at `2i + 1`.
pub fn slot_bindings(slot: TextureSlot) -> (u32, u32) {
    let base = slot.index() as u32 * 2;
    (base, base + 1)
}

fn sampler_bindings(layout: &ProgramLayout) -> String {
    let mut out = String::new();
    for (slot, kind) in layout.bindings() {
        let (texture, sampler) = slot_bindings(*slot);
        let (texture_type, sampler_type) = match kind {
            TextureKind::Texture2d => ("texture2D", "sampler2D"),
            TextureKind::Cube => ("textureCube", "samplerCube"),
        };
        let _ = writeln!(
            out,
            "layout(set = 1, binding = {texture}) uniform {texture_type} _{slot}_texture;"
        );
        let _ = writeln!(
            out,
            "layout(set = 1, binding = {sampler}) uniform sampler _{slot}_sampler;"
        );
        let _ = writeln!(
            out,
            "#define {} {sampler_type}(_{slot}_texture, _{slot}_sampler)",
            slot.uniform_name()
        );
    }
    out
}

const SCENE_BLOCK: &str = r"layout(std140, set = 0, binding = 0) uniform SceneUniforms {
    mat4 _projectionMatrix;
    mat4 _modelViewMatrix;
    mat4 _modelMatrix;
    mat4 _viewMatrix;
    mat4 _normalMatrix;
    vec4 _cameraPosition;
    vec4 _time;
} scene;
#define projectionMatrix scene._projectionMatrix
#define modelViewMatrix scene._modelViewMatrix
#define modelMatrix scene._modelMatrix
#define viewMatrix scene._viewMatrix
#define normalMatrix mat3(scene._normalMatrix)
#define cameraPosition scene._cameraPosition.xyz
#define uTime scene._time.x
";

const VERTEX_ATTRIBUTES: &str = r"layout(location = 0) in vec3 position;
layout(location = 1) in vec3 normal;
layout(location = 2) in vec2 uv;
";

const TRANSFORM_UV: &str = r"vec2 transformUV(vec2 coord, vec2 repeatBy, vec2 offsetBy, vec2 pivot, float angle) {
    vec2 p = coord - pivot;
    float c = cos(angle);
    float s = sin(angle);
    p = vec2(p.x * c - p.y * s, p.x * s + p.y * c);
    return p * repeatBy + offsetBy + pivot;
}
";

/// Vertex half of the built-in program.
pub const DEFAULT_VERTEX: &str = r"layout(location = 0) out vec2 vUv;

void main() {
    vUv = uv;
    gl_Position = projectionMatrix * modelViewMatrix * vec4(position, 1.0);
}
";

/// Fragment half of the built-in program; cycles colours over time.
pub const DEFAULT_FRAGMENT: &str = r"layout(location = 0) in vec2 vUv;
layout(location = 0) out vec4 fragColor;

void main() {
    vec3 color = 0.5 + 0.5 * cos(uTime + vUv.xyx + vec3(0.0, 2.0, 4.0));
    fragColor = vec4(color, 1.0);
}
";

const MAPPED_VERTEX: &str = r"layout(location = 0) out vec2 vUv;
layout(location = 1) out vec3 vWorldNormal;
layout(location = 2) out vec3 vWorldPosition;

void main() {
    vUv = uv;
    vec4 world = modelMatrix * vec4(position, 1.0);
    vWorldPosition = world.xyz;
    vWorldNormal = normalize(mat3(modelMatrix) * normal);
    gl_Position = projectionMatrix * modelViewMatrix * vec4(position, 1.0);
}
";

const MAPPED_INPUTS: &str = r"layout(location = 0) in vec2 vUv;
layout(location = 1) in vec3 vWorldNormal;
layout(location = 2) in vec3 vWorldPosition;
layout(location = 0) out vec4 fragColor;

const float PI = 3.14159265359;
const float REFRACTION_RATIO = 0.66;
";

fn mapped_fragment(mapping: TextureMapping) -> String {
    let direction = match mapping {
        TextureMapping::CubeRefraction | TextureMapping::EquirectangularRefraction => {
            "refract(incident, n, REFRACTION_RATIO)"
        }
        _ => "reflect(incident, n)",
    };
    let sample = match mapping {
        TextureMapping::Uv => {
            "vec2 st = transformUV(vUv, u_map_repeat, u_map_offset, u_map_center, u_map_rotation);\n    fragColor = texture(u_map, st);"
        }
        TextureMapping::CubeReflection | TextureMapping::CubeRefraction => {
            "fragColor = texture(u_map, dir);"
        }
        TextureMapping::EquirectangularReflection | TextureMapping::EquirectangularRefraction => {
            "vec2 st = vec2(atan(dir.z, dir.x) / (2.0 * PI) + 0.5, asin(clamp(dir.y, -1.0, 1.0)) / PI + 0.5);\n    fragColor = texture(u_map, st);"
        }
        TextureMapping::SphericalReflection => {
            "float m = 2.0 * sqrt(dir.x * dir.x + dir.y * dir.y + (dir.z + 1.0) * (dir.z + 1.0));\n    vec2 st = dir.xy / max(m, 0.00001) + 0.5;\n    fragColor = texture(u_map, st);"
        }
    };
    format!(
        "{MAPPED_INPUTS}
void main() {{
    vec3 n = normalize(vWorldNormal);
    vec3 incident = normalize(vWorldPosition - cameraPosition);
    vec3 dir = {direction};
    {sample}
}}
"
    )
}
