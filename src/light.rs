//! Scene lights and their GPU upload layout.
//!
//! A [`Light`] is a tagged descriptor: the [`LightKind`] decides which fields the
//! shader reads. Every light is uploaded as the same fixed-size [`LightRecord`],
//! so a whole [`LightSet`] is one contiguous block regardless of its mix of kinds.
//!
//! # GPU Layout
//!
//! [`LightRecord`] is 64 bytes and matches this WGSL struct in a uniform buffer:
//!
//! ```wgsl
//! struct Light {
//!     direction: vec3<f32>,    // offset 0
//!     range: f32,              // offset 12
//!     position: vec3<f32>,     // offset 16
//!     intensity: f32,          // offset 28
//!     color: vec3<f32>,        // offset 32
//!     spot_falloff: f32,       // offset 44
//!     kind: u32,               // offset 48
//!     // 12 bytes padding
//! }
//! ```

use glam::Vec3;

/// Shader-side tag for directional lights.
pub const LIGHT_TYPE_DIRECTIONAL: u32 = 0;
/// Shader-side tag for point lights.
pub const LIGHT_TYPE_POINT: u32 = 1;
/// Shader-side tag for spot lights.
pub const LIGHT_TYPE_SPOT: u32 = 2;

/// Which fields of a [`Light`] are meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Parallel rays along `direction` (sunlight).
    Directional,
    /// Omnidirectional from `position`, fading out at `range`.
    Point,
    /// A cone from `position` along `direction`, narrowed by `spot_falloff`.
    Spot,
}

impl LightKind {
    /// The tag written into [`LightRecord::kind`].
    pub fn tag(self) -> u32 {
        match self {
            LightKind::Directional => LIGHT_TYPE_DIRECTIONAL,
            LightKind::Point => LIGHT_TYPE_POINT,
            LightKind::Spot => LIGHT_TYPE_SPOT,
        }
    }
}

/// A single light source.
///
/// Fields not used by `kind` are ignored by shading but still uploaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    /// Direction the light travels (directional, spot).
    pub direction: Vec3,
    /// World position (point, spot).
    pub position: Vec3,
    /// Attenuation distance (point, spot).
    pub range: f32,
    /// Linear RGB color.
    pub color: Vec3,
    pub intensity: f32,
    /// Cone sharpness exponent (spot).
    pub spot_falloff: f32,
}

impl Light {
    /// Creates a directional light.
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            direction: direction.normalize_or_zero(),
            position: Vec3::ZERO,
            range: 0.0,
            color,
            intensity,
            spot_falloff: 0.0,
        }
    }

    /// Creates a point light.
    pub fn point(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Point,
            direction: Vec3::ZERO,
            position,
            range,
            color,
            intensity,
            spot_falloff: 0.0,
        }
    }

    /// Creates a spot light.
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        spot_falloff: f32,
        color: Vec3,
        intensity: f32,
    ) -> Self {
        Self {
            kind: LightKind::Spot,
            direction: direction.normalize_or_zero(),
            position,
            range,
            color,
            intensity,
            spot_falloff,
        }
    }

    /// Packs this light into its upload layout.
    pub fn to_record(&self) -> LightRecord {
        LightRecord {
            direction: self.direction.to_array(),
            range: self.range,
            position: self.position.to_array(),
            intensity: self.intensity,
            color: self.color.to_array(),
            spot_falloff: self.spot_falloff,
            kind: self.kind.tag(),
            _padding: [0; 3],
        }
    }
}

/// Fixed-layout GPU record for one light. See the module docs for the WGSL side.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightRecord {
    pub direction: [f32; 3],
    pub range: f32,
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub spot_falloff: f32,
    pub kind: u32,
    pub _padding: [u32; 3],
}

impl LightRecord {
    /// Size of one record in bytes.
    pub const SIZE: usize = std::mem::size_of::<LightRecord>();
}

/// The ordered collection of lights shading a scene, plus its ambient term.
///
/// Order is significant only as upload order.
#[derive(Clone, Debug)]
pub struct LightSet {
    lights: Vec<Light>,
    ambient: Vec3,
    records: Vec<LightRecord>,
}

impl Default for LightSet {
    fn default() -> Self {
        Self {
            lights: Vec::new(),
            ambient: Vec3::new(0.1, 0.1, 0.25),
            records: Vec::new(),
        }
    }
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a light and returns its index.
    pub fn push(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    /// Builder-style variant of [`LightSet::push`].
    pub fn with(mut self, light: Light) -> Self {
        self.push(light);
        self
    }

    pub fn get(&self, index: usize) -> Option<&Light> {
        self.lights.get(index)
    }

    /// Mutable access for live controls (moving a point light, recoloring).
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Light> {
        self.lights.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    pub fn set_ambient(&mut self, color: Vec3) {
        self.ambient = color;
    }

    /// Number of lights of the given kind.
    pub fn count_of(&self, kind: LightKind) -> usize {
        self.lights.iter().filter(|light| light.kind == kind).count()
    }

    /// Repacks every light and returns the upload block.
    ///
    /// The block is always `len() * LightRecord::SIZE` bytes.
    pub fn upload_bytes(&mut self) -> &[u8] {
        self.records.clear();
        self.records
            .extend(self.lights.iter().map(Light::to_record));
        bytemuck::cast_slice(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_lights() -> LightSet {
        LightSet::new()
            .with(Light::directional(Vec3::X, Vec3::ONE, 1.0))
            .with(Light::directional(Vec3::NEG_Y, Vec3::Y, 0.0))
            .with(Light::directional(Vec3::Z, Vec3::Z, 0.0))
            .with(Light::point(Vec3::new(2.5, -2.5, 0.0), 20.0, Vec3::new(1.0, 0.0, 1.0), 0.0))
            .with(Light::point(Vec3::new(-2.5, 2.5, 0.0), 20.0, Vec3::new(1.0, 1.0, 0.0), 0.0))
    }

    fn read_records(bytes: &[u8]) -> Vec<LightRecord> {
        bytes
            .chunks_exact(LightRecord::SIZE)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    #[test]
    fn record_is_sixty_four_bytes() {
        assert_eq!(LightRecord::SIZE, 64);
        assert_eq!(std::mem::offset_of!(LightRecord, position), 16);
        assert_eq!(std::mem::offset_of!(LightRecord, color), 32);
        assert_eq!(std::mem::offset_of!(LightRecord, kind), 48);
    }

    #[test]
    fn upload_block_size_ignores_kind_mix() {
        let mut lights = five_lights();
        assert_eq!(lights.count_of(LightKind::Directional), 3);
        assert_eq!(lights.count_of(LightKind::Point), 2);
        assert_eq!(lights.upload_bytes().len(), 5 * LightRecord::SIZE);
    }

    #[test]
    fn upload_preserves_order_and_tags() {
        let mut lights = five_lights();
        let bytes = lights.upload_bytes().to_vec();
        let records = read_records(&bytes);

        assert_eq!(records[0].kind, LIGHT_TYPE_DIRECTIONAL);
        assert_eq!(records[0].direction, [1.0, 0.0, 0.0]);
        assert_eq!(records[3].kind, LIGHT_TYPE_POINT);
        assert_eq!(records[3].position, [2.5, -2.5, 0.0]);
        assert_eq!(records[4].range, 20.0);
    }

    #[test]
    fn live_edits_show_up_in_next_upload() {
        let mut lights = five_lights();
        if let Some(light) = lights.get_mut(3) {
            light.position = Vec3::new(0.0, 5.0, 0.0);
        }
        let bytes = lights.upload_bytes().to_vec();
        let records = read_records(&bytes);
        assert_eq!(records[3].position, [0.0, 5.0, 0.0]);
    }

    #[test]
    fn directional_direction_is_normalized() {
        let light = Light::directional(Vec3::new(0.0, -4.0, 0.0), Vec3::ONE, 1.0);
        assert_eq!(light.direction, Vec3::NEG_Y);
    }
}
