//! Texture data, samplers and their GPU counterparts.
//!
//! [`TextureData`] is plain RGBA8 pixel data on the CPU, either supplied raw or
//! produced by one of the procedural generators. Backends turn it into a
//! [`TextureId`]. A cube texture stores its six faces back to back in the order
//! +X, -X, +Y, -Y, +Z, -Z.
//!
//! Color textures are sRGB encoded. Data that is not a color, such as a normal
//! map, is marked [`linear`](TextureData::linear) so sampling returns the
//! stored values unchanged.

use glam::Vec3;

use crate::backend::BackendError;
use crate::gpu::GpuContext;
use crate::shader::TextureDimension;

/// Backend-assigned identity of a texture resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Backend-assigned identity of a sampler state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub(crate) u32);

/// RGBA8 pixels for a 2D or cube texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub pixels: Vec<u8>,
    /// Stored values are not sRGB encoded.
    pub linear: bool,
}

impl TextureData {
    /// Wraps raw RGBA pixels for a 2D texture.
    pub fn from_rgba(
        label: impl Into<String>,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Result<Self, BackendError> {
        Self::checked(label.into(), width, height, TextureDimension::D2, pixels)
    }

    /// Joins six square faces (+X, -X, +Y, -Y, +Z, -Z) into a cube texture.
    pub fn cube_from_faces(
        label: impl Into<String>,
        size: u32,
        faces: [Vec<u8>; 6],
    ) -> Result<Self, BackendError> {
        let pixels = faces.concat();
        Self::checked(label.into(), size, size, TextureDimension::Cube, pixels)
    }

    fn checked(
        label: String,
        width: u32,
        height: u32,
        dimension: TextureDimension,
        pixels: Vec<u8>,
    ) -> Result<Self, BackendError> {
        let data = Self {
            label,
            width,
            height,
            dimension,
            pixels,
            linear: false,
        };
        data.validate()?;
        Ok(data)
    }

    /// Checks the pixel buffer against the declared size. Fields are public, so
    /// backends call this again before uploading.
    pub(crate) fn validate(&self) -> Result<(), BackendError> {
        let expected = self.width as usize * self.height as usize * 4 * self.layers() as usize;
        if self.width == 0 || self.height == 0 || self.pixels.len() != expected {
            return Err(BackendError::InvalidTexture {
                label: self.label.clone(),
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }

    /// Marks the data as linear (not sRGB).
    pub fn linear(mut self) -> Self {
        self.linear = true;
        self
    }

    /// Number of array layers (1 for 2D, 6 for cube).
    pub fn layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }

    /// A single-color 1x1 texture. Handy as a neutral specular map.
    pub fn solid(label: impl Into<String>, rgba: [u8; 4]) -> Self {
        Self {
            label: label.into(),
            width: 1,
            height: 1,
            dimension: TextureDimension::D2,
            pixels: rgba.to_vec(),
            linear: false,
        }
    }

    /// A 1x1 normal map pointing straight out of the surface.
    pub fn flat_normal() -> Self {
        Self::solid("Flat Normal Map", [128, 128, 255, 255]).linear()
    }

    /// Normal map of `cells` x `cells` rounded bumps. `strength` scales how far
    /// normals tilt at a bump's edge.
    pub fn bumps(size: u32, cells: u32, strength: f32) -> Self {
        let cell = (size / cells.max(1)).max(1) as f32;
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                // Position inside the cell in [-1, 1].
                let u = ((x as f32 + 0.5) % cell) / cell * 2.0 - 1.0;
                let v = ((y as f32 + 0.5) % cell) / cell * 2.0 - 1.0;
                let normal = Vec3::new(u * strength, v * strength, 1.0).normalize();
                let encoded = (normal * 0.5 + 0.5) * 255.0;
                pixels.extend_from_slice(&[encoded.x as u8, encoded.y as u8, encoded.z as u8, 255]);
            }
        }
        Self {
            label: "Bump Normal Map".to_string(),
            width: size,
            height: size,
            dimension: TextureDimension::D2,
            pixels,
            linear: true,
        }
    }

    /// Checkerboard of `cells` x `cells` squares alternating between two colors.
    pub fn checker(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = (size / cells.max(1)).max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let even = ((x / cell) + (y / cell)) % 2 == 0;
                pixels.extend_from_slice(if even { &a } else { &b });
            }
        }
        Self {
            label: "Checker Texture".to_string(),
            width: size,
            height: size,
            dimension: TextureDimension::D2,
            pixels,
            linear: false,
        }
    }

    /// Blocky value noise picking from `palette`, with a little per-pixel jitter.
    pub fn noise(size: u32, seed: u32, palette: &[[u8; 3]]) -> Self {
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let base = match palette.len() {
                    0 => [128, 128, 128],
                    len => palette[(hash(x, y, seed) % len as u32) as usize],
                };
                let jitter = (hash(x + 1000, y + 1000, seed) % 30) as i32 - 15;
                pixels.extend(base.map(|c| (c as i32 + jitter).clamp(0, 255) as u8));
                pixels.push(255);
            }
        }
        Self {
            label: "Noise Texture".to_string(),
            width: size,
            height: size,
            dimension: TextureDimension::D2,
            pixels,
            linear: false,
        }
    }

    /// Cube map shading from `ground` below the horizon through `horizon` to
    /// `zenith` straight up.
    pub fn gradient_sky(size: u32, zenith: Vec3, horizon: Vec3, ground: Vec3) -> Self {
        let size = size.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4 * 6) as usize);
        for face in 0..6 {
            for y in 0..size {
                for x in 0..size {
                    let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                    let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                    let up = cube_direction(face, u, v).normalize().y;
                    let color = if up >= 0.0 {
                        horizon.lerp(zenith, up.sqrt())
                    } else {
                        horizon.lerp(ground, (-up).sqrt())
                    };
                    let rgb = color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
                    pixels.extend_from_slice(&[rgb.x as u8, rgb.y as u8, rgb.z as u8, 255]);
                }
            }
        }
        Self {
            label: "Gradient Sky".to_string(),
            width: size,
            height: size,
            dimension: TextureDimension::Cube,
            pixels,
            linear: false,
        }
    }
}

/// Direction through texel `(u, v)` in [-1, 1] of a cube face, following the
/// D3D/wgpu face conventions (v grows downwards).
fn cube_direction(face: u32, u: f32, v: f32) -> Vec3 {
    match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    }
}

fn hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_add(x.wrapping_mul(374761393));
    h = h.wrapping_add(y.wrapping_mul(668265263));
    h ^= h >> 13;
    h = h.wrapping_mul(1274126177);
    h ^= h >> 16;
    h
}

/// Texel filtering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Behavior outside the [0, 1] texture coordinate range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressMode {
    #[default]
    Repeat,
    Mirror,
    Clamp,
}

/// Sampler state description.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub address: AddressMode,
}

impl SamplerDesc {
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn address(mut self, address: AddressMode) -> Self {
        self.address = address;
        self
    }
}

/// A texture living on the GPU.
#[derive(Debug)]
pub(crate) struct GpuTexture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) dimension: TextureDimension,
}

impl GpuTexture {
    pub(crate) fn upload(gpu: &GpuContext, data: &TextureData) -> Self {
        use wgpu::util::DeviceExt;

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(&data.label),
                size: wgpu::Extent3d {
                    width: data.width,
                    height: data.height,
                    depth_or_array_layers: data.layers(),
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: if data.linear {
                    wgpu::TextureFormat::Rgba8Unorm
                } else {
                    wgpu::TextureFormat::Rgba8UnormSrgb
                },
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data.pixels,
        );

        let view_dimension = match data.dimension {
            TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{} View", data.label)),
            dimension: Some(view_dimension),
            ..Default::default()
        });

        Self {
            texture,
            view,
            dimension: data.dimension,
        }
    }
}

pub(crate) fn create_sampler(gpu: &GpuContext, desc: &SamplerDesc) -> wgpu::Sampler {
    let filter = match desc.filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    };
    let address = match desc.address {
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
    };
    gpu.device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Tessera Sampler"),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: filter,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgba_checks_pixel_count() {
        assert!(TextureData::from_rgba("ok", 2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureData::from_rgba("short", 2, 2, vec![0; 15]),
            Err(BackendError::InvalidTexture { expected: 16, actual: 15, .. })
        ));
        assert!(TextureData::from_rgba("empty", 0, 2, Vec::new()).is_err());
    }

    #[test]
    fn cube_from_faces_needs_six_full_faces() {
        let face = vec![255u8; 4 * 4 * 4];
        let cube = TextureData::cube_from_faces("cube", 4, std::array::from_fn(|_| face.clone()))
            .unwrap();
        assert_eq!(cube.layers(), 6);
        assert_eq!(cube.pixels.len(), 6 * 64);

        let mut faces: [Vec<u8>; 6] = std::array::from_fn(|_| face.clone());
        faces[5].pop();
        assert!(TextureData::cube_from_faces("broken", 4, faces).is_err());
    }

    #[test]
    fn checker_alternates() {
        let tex = TextureData::checker(4, 2, [255; 4], [0, 0, 0, 255]);
        assert_eq!(&tex.pixels[0..4], &[255; 4]);
        // x = 2 is the second cell on the first row.
        assert_eq!(&tex.pixels[8..12], &[0, 0, 0, 255]);
        assert_eq!(tex.pixels.len(), 4 * 4 * 4);
    }

    #[test]
    fn noise_is_deterministic_and_opaque() {
        let palette = [[139, 90, 43], [128, 128, 128]];
        let a = TextureData::noise(8, 7, &palette);
        let b = TextureData::noise(8, 7, &palette);
        assert_eq!(a, b);
        assert!(a.pixels.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn normal_maps_are_linear_and_face_outward() {
        let flat = TextureData::flat_normal();
        assert!(flat.linear);
        assert_eq!(flat.pixels, vec![128, 128, 255, 255]);

        let bumps = TextureData::bumps(8, 2, 1.0);
        assert!(bumps.linear);
        assert!(bumps.validate().is_ok());
        // Every encoded normal keeps a positive z.
        assert!(bumps.pixels.chunks_exact(4).all(|px| px[2] > 128));
        // Left edge of a bump tilts towards -x, right edge towards +x.
        assert!(bumps.pixels[0] < 128);
        assert!(bumps.pixels[3 * 4] > 128);
    }

    #[test]
    fn gradient_sky_is_brighter_at_zenith() {
        let sky = TextureData::gradient_sky(8, Vec3::new(0.2, 0.4, 1.0), Vec3::ONE, Vec3::ZERO);
        assert_eq!(sky.dimension, TextureDimension::Cube);
        assert_eq!(sky.pixels.len(), 8 * 8 * 4 * 6);

        let face_len = 8 * 8 * 4;
        let top_center = 2 * face_len + (4 * 8 + 4) * 4;
        let bottom_center = 3 * face_len + (4 * 8 + 4) * 4;
        // Zenith is mostly blue, the ground is nearly black.
        assert!(sky.pixels[top_center + 2] > sky.pixels[top_center]);
        assert!(sky.pixels[bottom_center..bottom_center + 3].iter().all(|&c| c < 10));
    }
}
