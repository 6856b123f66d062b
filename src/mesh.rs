//! Vertex format, CPU-side geometry and backend mesh handles.
//!
//! Geometry is built on the CPU as [`MeshData`] (raw vertices and indices, or one
//! of the procedural primitives) and uploaded through
//! [`RenderBackend::upload_mesh`](crate::RenderBackend::upload_mesh), which returns
//! a [`Mesh`] handle. The handle is `Copy`, so any number of entities can share the
//! same uploaded geometry.
//!
//! # Vertex Layout
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | normal    | Float32x3 | 12     | 1               |
//! | uv        | Float32x2 | 24     | 2               |
//! | tangent   | Float32x3 | 32     | 3               |
//!
//! The tangent points along increasing `u` and, with the normal, spans the
//! tangent space normal maps are authored in.
//! All primitives use counter-clockwise winding for front faces.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::gpu::GpuContext;

/// Vertex with position, normal, texture coordinates and tangent (44 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 3],
}

impl Vertex3d {
    /// Vertex buffer layout for pipelines reading [`Vertex3d`].
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32x3,
            2 => Float32x2,
            3 => Float32x3,
        ],
    };

    /// A vertex with some tangent perpendicular to `normal`. Use
    /// [`with_tangent`](Self::with_tangent) when the uv layout is known.
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        let tangent = Vec3::from(normal).any_orthonormal_vector();
        Self {
            position,
            normal,
            uv,
            tangent: tangent.to_array(),
        }
    }

    pub fn with_tangent(mut self, tangent: [f32; 3]) -> Self {
        self.tangent = tangent;
        self
    }
}

/// Backend-assigned identity of uploaded geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) u32);

impl MeshId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Handle to geometry living in a backend.
///
/// Cheap to copy; the backend owns the buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mesh {
    id: MeshId,
    index_count: u32,
}

impl Mesh {
    /// Called by backends after uploading geometry.
    pub fn new(id: MeshId, index_count: u32) -> Self {
        Self { id, index_count }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    /// Number of indices submitted per draw.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Vertex and index buffers on the GPU.
#[derive(Debug)]
pub(crate) struct GpuMesh {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
}

impl GpuMesh {
    pub(crate) fn upload(gpu: &GpuContext, label: &str, data: &MeshData) -> Self {
        use wgpu::util::DeviceExt;

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Vertex Buffer")),
                contents: bytemuck::cast_slice(&data.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} Index Buffer")),
                contents: bytemuck::cast_slice(&data.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
        }
    }
}

/// Indexed triangle list waiting to be uploaded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex3d>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex3d>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// True when every index points at an existing vertex.
    pub fn indices_in_bounds(&self) -> bool {
        let count = self.vertices.len() as u32;
        self.indices.iter().all(|&index| index < count)
    }

    /// Unit cube centered at the origin, four vertices per face for flat normals.
    pub fn cube() -> Self {
        // (normal, u axis, v axis) per face; corners are n/2 ± u/2 ± v/2.
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ];
        const CORNERS: [(f32, f32); 4] = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (face, (normal, u_axis, v_axis)) in FACES.iter().enumerate() {
            for (u, v) in CORNERS {
                let position = std::array::from_fn(|i| {
                    normal[i] * 0.5 + u_axis[i] * (u - 0.5) + v_axis[i] * (v - 0.5)
                });
                vertices.push(Vertex3d::new(position, *normal, [u, v]).with_tangent(*u_axis));
            }
            let base = face as u32 * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self::new(vertices, indices)
    }

    /// UV sphere of radius 0.5 centered at the origin.
    ///
    /// `segments` divides the equator, `rings` runs pole to pole. Both are
    /// clamped to at least 3 and 2.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);

        for ring in 0..=rings {
            let phi = PI * ring as f32 / rings as f32;
            let (ring_radius, y) = phi.sin_cos();

            for seg in 0..=segments {
                let theta = TAU * seg as f32 / segments as f32;
                let (sin, cos) = theta.sin_cos();
                let normal = [ring_radius * cos, y, -ring_radius * sin];
                let position = normal.map(|c| c * 0.5);
                let uv = [seg as f32 / segments as f32, ring as f32 / rings as f32];
                let tangent = [-sin, 0.0, -cos];
                vertices.push(Vertex3d::new(position, normal, uv).with_tangent(tangent));
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let top = ring * (segments + 1) + seg;
                let bottom = top + segments + 1;
                indices.extend_from_slice(&[top, bottom, top + 1, top + 1, bottom, bottom + 1]);
            }
        }

        Self::new(vertices, indices)
    }

    /// Square on the XZ plane facing +Y, `size` units on a side.
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        let up = [0.0, 1.0, 0.0];
        let vertex = |x: f32, z: f32, uv| Vertex3d::new([x, 0.0, z], up, uv).with_tangent([1.0, 0.0, 0.0]);
        let vertices = vec![
            vertex(-half, half, [0.0, 1.0]),
            vertex(half, half, [1.0, 1.0]),
            vertex(half, -half, [1.0, 0.0]),
            vertex(-half, -half, [0.0, 0.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_normal(data: &MeshData, tri: usize) -> Vec3 {
        let [a, b, c] = [0, 1, 2]
            .map(|k| Vec3::from(data.vertices[data.indices[tri * 3 + k] as usize].position));
        (b - a).cross(c - a).normalize()
    }

    #[test]
    fn vertex_is_forty_four_bytes() {
        assert_eq!(std::mem::size_of::<Vertex3d>(), 44);
        assert_eq!(Vertex3d::LAYOUT.array_stride, 44);
    }

    /// Tangent is unit length, perpendicular to the normal and points where `u`
    /// grows along the triangle.
    fn assert_tangents_follow_u(data: &MeshData) {
        for tri in data.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| data.vertices[tri[k] as usize]);
            for v in [a, b, c] {
                let (n, t) = (Vec3::from(v.normal), Vec3::from(v.tangent));
                assert!((t.length() - 1.0).abs() < 1e-4, "{v:?}");
                assert!(t.dot(n).abs() < 1e-4, "{v:?}");
            }
            // Position change along the edge with the larger u step.
            let (from, to) = if (b.uv[0] - a.uv[0]).abs() >= (c.uv[0] - a.uv[0]).abs() {
                (a, b)
            } else {
                (a, c)
            };
            let du = to.uv[0] - from.uv[0];
            if du.abs() < 1e-6 {
                continue;
            }
            let edge = Vec3::from(to.position) - Vec3::from(from.position);
            assert!(edge.dot(Vec3::from(from.tangent)) * du >= -1e-5, "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn primitives_carry_tangents_along_u() {
        assert_tangents_follow_u(&MeshData::cube());
        assert_tangents_follow_u(&MeshData::sphere(16, 8));
        assert_tangents_follow_u(&MeshData::plane(2.0));
    }

    #[test]
    fn default_tangent_is_perpendicular() {
        let v = Vertex3d::new([0.0; 3], [0.0, 0.0, 1.0], [0.0; 2]);
        assert!(Vec3::from(v.tangent).dot(Vec3::Z).abs() < 1e-6);
        assert!((Vec3::from(v.tangent).length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cube_has_flat_faces() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.index_count(), 36);
        assert!(cube.indices_in_bounds());
        assert!(cube
            .vertices
            .iter()
            .all(|v| v.position.iter().all(|c| c.abs() <= 0.5)));
    }

    #[test]
    fn cube_winding_matches_normals() {
        let cube = MeshData::cube();
        for tri in 0..12 {
            let stored = Vec3::from(cube.vertices[cube.indices[tri * 3] as usize].normal);
            assert!(face_normal(&cube, tri).abs_diff_eq(stored, 1e-5), "triangle {tri}");
        }
    }

    #[test]
    fn sphere_counts_and_radius() {
        let sphere = MeshData::sphere(16, 8);
        assert_eq!(sphere.vertices.len(), 17 * 9);
        assert_eq!(sphere.index_count(), 16 * 8 * 6);
        assert!(sphere.indices_in_bounds());
        for v in &sphere.vertices {
            assert!((Vec3::from(v.position).length() - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn sphere_faces_outward() {
        let sphere = MeshData::sphere(16, 8);
        // A triangle away from the poles: ring 3, segment 2.
        let tri = (3 * 16 + 2) * 2;
        let center = (0..3)
            .map(|k| Vec3::from(sphere.vertices[sphere.indices[tri * 3 + k] as usize].position))
            .sum::<Vec3>()
            / 3.0;
        assert!(face_normal(&sphere, tri).dot(center) > 0.0);
    }

    #[test]
    fn plane_faces_up() {
        let plane = MeshData::plane(4.0);
        assert!(face_normal(&plane, 0).abs_diff_eq(Vec3::Y, 1e-6));
        assert!(face_normal(&plane, 1).abs_diff_eq(Vec3::Y, 1e-6));
        assert_eq!(plane.vertices[1].position, [2.0, 0.0, 2.0]);
    }
}
