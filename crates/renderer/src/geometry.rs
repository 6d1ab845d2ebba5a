//! Mesh data plus planar UV generation for meshes that arrive without UVs.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Axis-aligned bounds of a position set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Returns `None` for an empty position list.
    pub fn from_positions(positions: &[[f32; 3]]) -> Option<Self> {
        let (first, rest) = positions.split_first()?;
        let mut bounds = Bounds {
            min: Vec3::from(*first),
            max: Vec3::from(*first),
        };
        for position in rest {
            let point = Vec3::from(*position);
            bounds.min = bounds.min.min(point);
            bounds.max = bounds.max.max(point);
        }
        Some(bounds)
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Indexed triangle mesh. `normals` and `uvs`, when present, are per vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    /// Empty means the positions are already a triangle list.
    pub indices: Vec<u32>,
}

/// Interleaved vertex as laid out in the GPU vertex buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_positions(&self.positions)
    }

    /// Number of indices (or vertices, when unindexed) to draw.
    pub fn draw_count(&self) -> u32 {
        if self.indices.is_empty() {
            self.positions.len() as u32
        } else {
            self.indices.len() as u32
        }
    }

    /// Packs the attributes into [`Vertex`] records; absent attributes read as zero.
    pub fn interleaved(&self) -> Vec<Vertex> {
        self.positions
            .iter()
            .enumerate()
            .map(|(index, position)| Vertex {
                position: *position,
                normal: self
                    .normals
                    .as_ref()
                    .and_then(|normals| normals.get(index).copied())
                    .unwrap_or_default(),
                uv: self
                    .uvs
                    .as_ref()
                    .and_then(|uvs| uvs.get(index).copied())
                    .unwrap_or_default(),
            })
            .collect()
    }

    fn triangles(&self) -> Vec<[usize; 3]> {
        if self.indices.is_empty() {
            (0..self.positions.len() / 3)
                .map(|tri| [tri * 3, tri * 3 + 1, tri * 3 + 2])
                .collect()
        } else {
            self.indices
                .chunks_exact(3)
                .map(|tri| [tri[0] as usize, tri[1] as usize, tri[2] as usize])
                .collect()
        }
    }

    /// Recomputes smooth per-vertex normals by summing area-weighted face normals.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for [a, b, c] in self.triangles() {
            let (Some(pa), Some(pb), Some(pc)) = (
                self.positions.get(a),
                self.positions.get(b),
                self.positions.get(c),
            ) else {
                continue;
            };
            let (pa, pb, pc) = (Vec3::from(*pa), Vec3::from(*pb), Vec3::from(*pc));
            let face = (pb - pa).cross(pc - pa);
            for index in [a, b, c] {
                normals[index] += face;
            }
        }
        self.normals = Some(
            normals
                .into_iter()
                .map(|normal| normal.normalize_or_zero().to_array())
                .collect(),
        );
    }
}

/// Writes planar UVs projected along the Y axis: `u` from Z, `v` from X.
///
/// The mapping is normalised to the mesh bounding box, so every generated
/// coordinate lies in `[0, 1]`. A mesh that is flat along X or Z cannot be
/// projected; it is left untouched and `false` is returned.
pub fn generate_uvs(geometry: &mut Geometry) -> bool {
    let Some(bounds) = geometry.bounds() else {
        return false;
    };
    let size = bounds.size();
    if size.x == 0.0 || size.z == 0.0 {
        tracing::debug!(
            size_x = size.x,
            size_z = size.z,
            "mesh is flat along a projection axis; skipping uv generation"
        );
        return false;
    }

    let uvs = geometry
        .positions
        .iter()
        .map(|[x, _, z]| [(z - bounds.min.z) / size.z, (x - bounds.min.x) / size.x])
        .collect();
    geometry.uvs = Some(uvs);
    true
}

/// Axis-aligned cube of edge 1 centred on the origin, with flat normals and no UVs.
pub fn unit_cube() -> Geometry {
    // (normal, tangent u, tangent v) per face; corners wind counter-clockwise.
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut geometry = Geometry::default();
    let mut normals = Vec::with_capacity(24);
    for (normal, u, v) in FACES {
        let (n, u, v) = (Vec3::from(normal), Vec3::from(u), Vec3::from(v));
        let base = geometry.positions.len() as u32;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            geometry
                .positions
                .push((n * 0.5 + u * su + v * sv).to_array());
            normals.push(normal);
        }
        geometry
            .indices
            .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    geometry.normals = Some(normals);
    geometry
}
