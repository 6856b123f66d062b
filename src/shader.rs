//! Shader programs and their named parameter blocks.
//!
//! A [`ShaderProgram`] is one pipeline stage (vertex or pixel) together with the
//! parameters it expects: a constant-buffer layout of named values, plus named
//! texture and sampler slots. Programs are described with a [`ShaderDesc`] and
//! created by a [`RenderBackend`](crate::RenderBackend), which returns them as
//! `Rc<ShaderProgram>` so any number of materials can share one program.
//!
//! Parameters are written by name into a [`ParameterBlock`], the CPU staging copy
//! of one stage's constant buffer, and the block is handed to the backend in one
//! commit.
//!
//! # Layout Rules
//!
//! [`ConstantLayout`] places fields in declaration order using WGSL uniform
//! address-space alignment, so a layout declared in Rust matches the WGSL struct
//! with the same members in the same order:
//!
//! | Kind                 | Align | Size              |
//! |----------------------|-------|-------------------|
//! | `Float`/`Int`/`UInt` | 4     | 4                 |
//! | `Float2`             | 8     | 8                 |
//! | `Float3`             | 16    | 12                |
//! | `Float4`             | 16    | 16                |
//! | `Mat4`               | 16    | 64                |
//! | `Array`              | 16    | stride × capacity |
//!
//! The total size is rounded up to a multiple of 16.

use std::borrow::Cow;
use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Parameter names the frame renderer fills in on every draw.
///
/// A program may declare any of these without a material supplying them.
pub mod names {
    pub const WORLD: &str = "world";
    pub const WORLD_INVERSE_TRANSPOSE: &str = "worldInverseTranspose";
    pub const VIEW: &str = "view";
    pub const PROJECTION: &str = "projection";
    pub const COLOR_TINT: &str = "colorTint";
    pub const ROUGHNESS: &str = "roughness";
    pub const CAMERA_POSITION: &str = "cameraPosition";
    pub const AMBIENT_COLOR: &str = "ambientColor";
    pub const LIGHT_COUNT: &str = "lightCount";
    pub const LIGHTS: &str = "lights";
    pub const TOTAL_TIME: &str = "totalTime";

    /// Everything the renderer supplies when drawing an entity.
    pub const ENTITY_PROVIDED: &[&str] = &[
        WORLD,
        WORLD_INVERSE_TRANSPOSE,
        VIEW,
        PROJECTION,
        COLOR_TINT,
        ROUGHNESS,
        CAMERA_POSITION,
        AMBIENT_COLOR,
        LIGHT_COUNT,
        LIGHTS,
        TOTAL_TIME,
    ];

    /// Everything the renderer supplies when drawing the sky.
    pub const SKY_PROVIDED: &[&str] = &[VIEW, PROJECTION, CAMERA_POSITION, TOTAL_TIME];
}

/// Pipeline stage a program runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Backend-assigned identity of a loaded program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub(crate) u32);

impl ShaderId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Type of a named constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Int,
    UInt,
    Float2,
    Float3,
    Float4,
    Mat4,
    /// Fixed-capacity array of opaque records, written as raw bytes.
    Array { stride: u32, capacity: u32 },
}

impl ParamKind {
    pub fn align(self) -> u32 {
        match self {
            ParamKind::Float | ParamKind::Int | ParamKind::UInt => 4,
            ParamKind::Float2 => 8,
            ParamKind::Float3 | ParamKind::Float4 | ParamKind::Mat4 => 16,
            ParamKind::Array { .. } => 16,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            ParamKind::Float | ParamKind::Int | ParamKind::UInt => 4,
            ParamKind::Float2 => 8,
            ParamKind::Float3 => 12,
            ParamKind::Float4 => 16,
            ParamKind::Mat4 => 64,
            ParamKind::Array { stride, capacity } => align_to(stride, 16) * capacity,
        }
    }
}

/// A typed scalar, vector or matrix parameter value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Mat4(Mat4),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::UInt(_) => ParamKind::UInt,
            ParamValue::Float2(_) => ParamKind::Float2,
            ParamValue::Float3(_) => ParamKind::Float3,
            ParamValue::Float4(_) => ParamKind::Float4,
            ParamValue::Mat4(_) => ParamKind::Mat4,
        }
    }

    fn write_to(&self, out: &mut [u8]) {
        match self {
            ParamValue::Float(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::Int(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::UInt(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            ParamValue::Float2(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            ParamValue::Float3(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            ParamValue::Float4(v) => out.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            ParamValue::Mat4(m) => out.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array())),
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::UInt(v)
    }
}

impl From<Vec2> for ParamValue {
    fn from(v: Vec2) -> Self {
        ParamValue::Float2(v)
    }
}

impl From<Vec3> for ParamValue {
    fn from(v: Vec3) -> Self {
        ParamValue::Float3(v)
    }
}

impl From<Vec4> for ParamValue {
    fn from(v: Vec4) -> Self {
        ParamValue::Float4(v)
    }
}

impl From<Mat4> for ParamValue {
    fn from(m: Mat4) -> Self {
        ParamValue::Mat4(m)
    }
}

/// Errors from writing into a [`ParameterBlock`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParamError {
    #[error("parameter '{0}' is not declared by this program")]
    Unknown(String),
    #[error("parameter '{name}' is declared as {expected:?}, got {found:?}")]
    KindMismatch {
        name: String,
        expected: ParamKind,
        found: ParamKind,
    },
    #[error("parameter '{name}' holds {capacity} bytes, got {len}")]
    Overflow {
        name: String,
        capacity: usize,
        len: usize,
    },
}

/// One named constant and where it lives in the buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamField {
    pub name: String,
    pub kind: ParamKind,
    pub offset: u32,
}

impl ParamField {
    fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.kind.size() as usize
    }
}

/// Ordered constant-buffer layout of one program.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantLayout {
    fields: Vec<ParamField>,
    end: u32,
}

impl ConstantLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field at the next offset that satisfies its alignment.
    pub fn with(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        let offset = align_to(self.end, kind.align());
        self.end = offset + kind.size();
        self.fields.push(ParamField {
            name: name.into(),
            kind,
            offset,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&ParamField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn fields(&self) -> &[ParamField] {
        &self.fields
    }

    /// Buffer size in bytes, rounded up to 16.
    pub fn size(&self) -> u32 {
        align_to(self.end, 16)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Dimensionality of a texture slot or texture resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    Cube,
}

/// A named texture binding expected by a program.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureSlot {
    pub name: String,
    pub dimension: TextureDimension,
}

/// Depth behavior of pipelines built from a vertex program.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthMode {
    /// Depth test `Less`, depth writes on, back faces culled.
    #[default]
    Standard,
    /// Depth test `LessEqual`, no depth writes, front faces culled.
    /// For geometry placed on the far plane from the inside (skyboxes).
    Background,
}

/// Description of a program to load.
///
/// # Example
///
/// ```
/// use tessera::{ShaderDesc, ParamKind};
///
/// let desc = ShaderDesc::vertex("my vs", "/* wgsl */")
///     .constant("world", ParamKind::Mat4)
///     .constant("view", ParamKind::Mat4)
///     .constant("projection", ParamKind::Mat4);
/// assert_eq!(desc.constants.size(), 192);
/// ```
#[derive(Clone, Debug)]
pub struct ShaderDesc {
    pub label: String,
    pub stage: ShaderStage,
    /// WGSL source handed to the backend untouched.
    pub source: Cow<'static, str>,
    pub entry_point: String,
    pub constants: ConstantLayout,
    pub textures: Vec<TextureSlot>,
    pub samplers: Vec<String>,
    pub depth: DepthMode,
}

impl ShaderDesc {
    pub fn vertex(label: impl Into<String>, source: impl Into<Cow<'static, str>>) -> Self {
        Self::new(label.into(), ShaderStage::Vertex, source.into(), "vs")
    }

    pub fn pixel(label: impl Into<String>, source: impl Into<Cow<'static, str>>) -> Self {
        Self::new(label.into(), ShaderStage::Pixel, source.into(), "fs")
    }

    fn new(label: String, stage: ShaderStage, source: Cow<'static, str>, entry: &str) -> Self {
        Self {
            label,
            stage,
            source,
            entry_point: entry.to_string(),
            constants: ConstantLayout::new(),
            textures: Vec::new(),
            samplers: Vec::new(),
            depth: DepthMode::Standard,
        }
    }

    pub fn entry_point(mut self, entry: impl Into<String>) -> Self {
        self.entry_point = entry.into();
        self
    }

    pub fn constant(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.constants = self.constants.with(name, kind);
        self
    }

    pub fn texture(mut self, name: impl Into<String>, dimension: TextureDimension) -> Self {
        self.textures.push(TextureSlot {
            name: name.into(),
            dimension,
        });
        self
    }

    pub fn sampler(mut self, name: impl Into<String>) -> Self {
        self.samplers.push(name.into());
        self
    }

    pub fn depth_mode(mut self, depth: DepthMode) -> Self {
        self.depth = depth;
        self
    }

    /// The built-in vertex program: world/view/projection transform with
    /// world-space normals.
    pub fn basic_vertex() -> Self {
        Self::vertex("basic vertex", include_str!("shaders/basic.vert.wgsl"))
            .constant(names::WORLD, ParamKind::Mat4)
            .constant(names::WORLD_INVERSE_TRANSPOSE, ParamKind::Mat4)
            .constant(names::VIEW, ParamKind::Mat4)
            .constant(names::PROJECTION, ParamKind::Mat4)
    }

    /// The built-in lit pixel program: tinted surface texture, specular map,
    /// tangent-space normal map, up to [`MAX_LIGHTS`] lights plus ambient.
    /// Materials must supply the `uvScale` parameter and a `NormalMap`
    /// ([`TextureData::flat_normal`](crate::TextureData::flat_normal) for
    /// unbumped surfaces).
    pub fn lit_pixel() -> Self {
        Self::pixel("lit pixel", include_str!("shaders/lit.frag.wgsl"))
            .constant(names::COLOR_TINT, ParamKind::Float3)
            .constant(names::ROUGHNESS, ParamKind::Float)
            .constant(names::CAMERA_POSITION, ParamKind::Float3)
            .constant(names::LIGHT_COUNT, ParamKind::UInt)
            .constant(names::AMBIENT_COLOR, ParamKind::Float3)
            .constant("uvScale", ParamKind::Float2)
            .constant(
                names::LIGHTS,
                ParamKind::Array {
                    stride: crate::light::LightRecord::SIZE as u32,
                    capacity: MAX_LIGHTS,
                },
            )
            .texture("SurfaceTexture", TextureDimension::D2)
            .texture("SpecularTexture", TextureDimension::D2)
            .texture("NormalMap", TextureDimension::D2)
            .sampler("BasicSampler")
    }

    /// The built-in sky vertex program. Places the cube on the far plane.
    pub fn sky_vertex() -> Self {
        Self::vertex("sky vertex", include_str!("shaders/sky.vert.wgsl"))
            .constant(names::VIEW, ParamKind::Mat4)
            .constant(names::PROJECTION, ParamKind::Mat4)
            .depth_mode(DepthMode::Background)
    }

    /// The built-in sky pixel program: samples a cube map by view direction.
    pub fn sky_pixel() -> Self {
        Self::pixel("sky pixel", include_str!("shaders/sky.frag.wgsl"))
            .texture("CubeMap", TextureDimension::Cube)
            .sampler("BasicSampler")
    }
}

/// Light capacity of the built-in lit pixel program.
pub const MAX_LIGHTS: u32 = 8;

/// A loaded program: its identity, stage and declared parameters.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ShaderId,
    label: String,
    stage: ShaderStage,
    constants: ConstantLayout,
    textures: Vec<TextureSlot>,
    samplers: Vec<String>,
    depth: DepthMode,
}

impl ShaderProgram {
    /// Called by backends once the program exists on their side.
    pub fn from_desc(id: ShaderId, desc: &ShaderDesc) -> Self {
        Self {
            id,
            label: desc.label.clone(),
            stage: desc.stage,
            constants: desc.constants.clone(),
            textures: desc.textures.clone(),
            samplers: desc.samplers.clone(),
            depth: desc.depth,
        }
    }

    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn constants(&self) -> &ConstantLayout {
        &self.constants
    }

    pub fn textures(&self) -> &[TextureSlot] {
        &self.textures
    }

    pub fn samplers(&self) -> &[String] {
        &self.samplers
    }

    pub fn depth_mode(&self) -> DepthMode {
        self.depth
    }

    pub fn has_constant(&self, name: &str) -> bool {
        self.constants.contains(name)
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.textures.iter().any(|slot| slot.name == name)
    }

    pub fn has_sampler(&self, name: &str) -> bool {
        self.samplers.iter().any(|slot| slot == name)
    }

    /// Fresh zeroed staging block for this program.
    pub fn new_block(&self) -> ParameterBlock {
        ParameterBlock::new(self.id, self.constants.clone())
    }
}

/// CPU staging copy of one program's constant buffer.
///
/// Unwritten bytes stay zero. The block remembers which fields were written since
/// the last [`reset`](ParameterBlock::reset) and how many bytes each write
/// covered.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterBlock {
    shader: ShaderId,
    layout: ConstantLayout,
    data: Vec<u8>,
    written: HashMap<String, usize>,
}

impl ParameterBlock {
    pub fn new(shader: ShaderId, layout: ConstantLayout) -> Self {
        let data = vec![0; layout.size() as usize];
        Self {
            shader,
            layout,
            data,
            written: HashMap::new(),
        }
    }

    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    pub fn layout(&self) -> &ConstantLayout {
        &self.layout
    }

    /// Zeroes the buffer and forgets previous writes.
    pub fn reset(&mut self) {
        self.data.fill(0);
        self.written.clear();
    }

    /// Writes a typed value. The kind must match the declaration exactly.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<(), ParamError> {
        let value = value.into();
        let field = self
            .layout
            .field(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        if field.kind != value.kind() {
            return Err(ParamError::KindMismatch {
                name: name.to_string(),
                expected: field.kind,
                found: value.kind(),
            });
        }
        let range = field.range();
        let len = range.len();
        value.write_to(&mut self.data[range]);
        self.written.insert(name.to_string(), len);
        Ok(())
    }

    /// Copies raw bytes to the start of a field, leaving the rest of it zeroed.
    pub fn set_data(&mut self, name: &str, bytes: &[u8]) -> Result<(), ParamError> {
        let field = self
            .layout
            .field(name)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        let range = field.range();
        if bytes.len() > range.len() {
            return Err(ParamError::Overflow {
                name: name.to_string(),
                capacity: range.len(),
                len: bytes.len(),
            });
        }
        let slot = &mut self.data[range];
        slot.fill(0);
        slot[..bytes.len()].copy_from_slice(bytes);
        self.written.insert(name.to_string(), bytes.len());
        Ok(())
    }

    /// Bytes covered by the last write to `name`, if it was written.
    pub fn written_len(&self, name: &str) -> Option<usize> {
        self.written.get(name).copied()
    }

    pub fn is_written(&self, name: &str) -> bool {
        self.written.contains_key(name)
    }

    /// Declared fields nobody wrote since the last reset.
    pub fn unwritten(&self) -> impl Iterator<Item = &str> {
        self.layout
            .fields()
            .iter()
            .filter(|field| !self.written.contains_key(&field.name))
            .map(|field| field.name.as_str())
    }

    /// Raw bytes of one field.
    pub fn field_bytes(&self, name: &str) -> Option<&[u8]> {
        self.layout.field(name).map(|field| &self.data[field.range()])
    }

    /// Reads a `Mat4` field back.
    pub fn mat4(&self, name: &str) -> Option<Mat4> {
        let field = self.layout.field(name)?;
        if field.kind != ParamKind::Mat4 {
            return None;
        }
        let cols: [f32; 16] = bytemuck::pod_read_unaligned(&self.data[field.range()]);
        Some(Mat4::from_cols_array(&cols))
    }

    /// Reads a `Float3` field back.
    pub fn float3(&self, name: &str) -> Option<Vec3> {
        let field = self.layout.field(name)?;
        if field.kind != ParamKind::Float3 {
            return None;
        }
        let v: [f32; 3] = bytemuck::pod_read_unaligned(&self.data[field.range()]);
        Some(Vec3::from_array(v))
    }

    /// Reads a `Float` field back.
    pub fn float(&self, name: &str) -> Option<f32> {
        let field = self.layout.field(name)?;
        if field.kind != ParamKind::Float {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(&self.data[field.range()]))
    }

    /// The whole buffer, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

pub(crate) fn align_to(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_wgsl_alignment() {
        let layout = ConstantLayout::new()
            .with("colorTint", ParamKind::Float3)
            .with("roughness", ParamKind::Float)
            .with("cameraPosition", ParamKind::Float3)
            .with("lightCount", ParamKind::UInt)
            .with("ambientColor", ParamKind::Float3)
            .with("uvScale", ParamKind::Float2)
            .with(
                "lights",
                ParamKind::Array {
                    stride: 64,
                    capacity: 8,
                },
            );

        let offsets: Vec<u32> = layout.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 12, 16, 28, 32, 48, 64]);
        assert_eq!(layout.size(), 64 + 8 * 64);
    }

    #[test]
    fn size_rounds_up_to_sixteen() {
        let layout = ConstantLayout::new().with("time", ParamKind::Float);
        assert_eq!(layout.size(), 16);
        assert_eq!(ConstantLayout::new().size(), 0);
    }

    #[test]
    fn set_checks_name_and_kind() {
        let layout = ConstantLayout::new().with("world", ParamKind::Mat4);
        let mut block = ParameterBlock::new(ShaderId(0), layout);

        assert_eq!(
            block.set("missing", 1.0),
            Err(ParamError::Unknown("missing".to_string()))
        );
        assert!(matches!(
            block.set("world", 1.0),
            Err(ParamError::KindMismatch { .. })
        ));

        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        block.set("world", m).unwrap();
        assert_eq!(block.mat4("world"), Some(m));
        assert_eq!(block.written_len("world"), Some(64));
    }

    #[test]
    fn set_data_tracks_length_and_rejects_overflow() {
        let layout = ConstantLayout::new().with(
            "lights",
            ParamKind::Array {
                stride: 64,
                capacity: 2,
            },
        );
        let mut block = ParameterBlock::new(ShaderId(0), layout);

        block.set_data("lights", &[1u8; 64]).unwrap();
        assert_eq!(block.written_len("lights"), Some(64));
        assert_eq!(&block.field_bytes("lights").unwrap()[64..], &[0u8; 64][..]);

        assert!(matches!(
            block.set_data("lights", &[0u8; 192]),
            Err(ParamError::Overflow { capacity: 128, len: 192, .. })
        ));
    }

    #[test]
    fn reset_clears_values_and_write_tracking() {
        let layout = ConstantLayout::new()
            .with("colorTint", ParamKind::Float3)
            .with("roughness", ParamKind::Float);
        let mut block = ParameterBlock::new(ShaderId(0), layout);

        block.set("colorTint", Vec3::ONE).unwrap();
        assert_eq!(block.unwritten().collect::<Vec<_>>(), vec!["roughness"]);

        block.reset();
        assert_eq!(block.float3("colorTint"), Some(Vec3::ZERO));
        assert_eq!(block.unwritten().count(), 2);
    }

    #[test]
    fn builtin_lit_layout_matches_light_capacity() {
        let desc = ShaderDesc::lit_pixel();
        let lights = desc.constants.field(names::LIGHTS).unwrap();
        assert_eq!(lights.offset, 64);
        assert_eq!(lights.kind.size(), 64 * MAX_LIGHTS);
    }
}
