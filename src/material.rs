//! Surface appearance shared between entities.
//!
//! A [`Material`] pairs a vertex program with a pixel program and carries the
//! values those programs need that the frame does not provide: color tint,
//! roughness, custom named parameters and named textures and samplers.
//!
//! Materials are validated when built. Every constant, texture and sampler slot
//! the two programs declare must be either filled by the frame renderer (see
//! [`names::ENTITY_PROVIDED`]) or supplied by the material, with a matching
//! type. A material that would leave a slot unbound never exists. Custom
//! parameters may not reuse a frame-provided name, since the renderer owns
//! those values for every entity.
//!
//! ```
//! use tessera::{Material, MaterialError, RecordingBackend, RenderBackend, ShaderDesc};
//!
//! let mut backend = RecordingBackend::new();
//! let vs = backend.load_shader(ShaderDesc::basic_vertex()).unwrap();
//! let ps = backend.load_shader(ShaderDesc::lit_pixel()).unwrap();
//!
//! // The lit program samples three textures and needs a uvScale.
//! let missing = Material::builder("bare", vs.clone(), ps.clone()).build();
//! assert!(matches!(missing, Err(MaterialError::MissingParameter { .. })));
//! ```

use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec3;

use crate::light::LightRecord;
use crate::shader::{ParamError, ParamKind, ParamValue, ShaderProgram, ShaderStage, names};
use crate::texture::{SamplerId, TextureId};

/// Index of a material inside its owning [`Scene`](crate::Scene), tagged with
/// that scene so ids cannot be mixed between scenes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId {
    pub(crate) scene: u32,
    pub(crate) index: usize,
}

/// Why a material (or sky) could not be built or changed.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MaterialError {
    #[error("program '{program}' expects parameter '{name}', which nothing provides")]
    MissingParameter { program: String, name: String },
    #[error("program '{program}' samples texture '{name}', which nothing provides")]
    MissingTexture { program: String, name: String },
    #[error("program '{program}' uses sampler '{name}', which nothing provides")]
    MissingSampler { program: String, name: String },
    #[error("program '{program}' is a {found:?} program, expected {expected:?}")]
    StageMismatch {
        program: String,
        expected: ShaderStage,
        found: ShaderStage,
    },
    #[error("program '{program}' expects '{name}', which the renderer cannot provide")]
    Unsupported { program: String, name: String },
    #[error("'{0}' is written by the renderer and cannot be a material parameter")]
    ReservedName(String),
    #[error(transparent)]
    ParameterKind(#[from] ParamError),
}

/// A shader pair plus the values it renders with.
#[derive(Clone, Debug)]
pub struct Material {
    label: String,
    vertex: Rc<ShaderProgram>,
    pixel: Rc<ShaderProgram>,
    color_tint: Vec3,
    roughness: f32,
    params: Vec<(String, ParamValue)>,
    textures: BTreeMap<String, TextureId>,
    samplers: BTreeMap<String, SamplerId>,
}

impl Material {
    pub fn builder(
        label: impl Into<String>,
        vertex: Rc<ShaderProgram>,
        pixel: Rc<ShaderProgram>,
    ) -> MaterialBuilder {
        MaterialBuilder {
            material: Material {
                label: label.into(),
                vertex,
                pixel,
                color_tint: Vec3::ONE,
                roughness: 0.5,
                params: Vec::new(),
                textures: BTreeMap::new(),
                samplers: BTreeMap::new(),
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_shader(&self) -> &Rc<ShaderProgram> {
        &self.vertex
    }

    pub fn pixel_shader(&self) -> &Rc<ShaderProgram> {
        &self.pixel
    }

    pub fn color_tint(&self) -> Vec3 {
        self.color_tint
    }

    pub fn set_color_tint(&mut self, tint: Vec3) {
        self.color_tint = tint;
    }

    pub fn roughness(&self) -> f32 {
        self.roughness
    }

    pub fn set_roughness(&mut self, roughness: f32) {
        self.roughness = roughness;
    }

    pub fn param(&self, name: &str) -> Option<ParamValue> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }

    /// Custom parameters in insertion order.
    pub fn params(&self) -> impl Iterator<Item = (&str, ParamValue)> {
        self.params.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Replaces a custom parameter. The value must have the type the programs
    /// declare for `name`, and `name` must not be one the renderer fills in.
    pub fn set_param(
        &mut self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), MaterialError> {
        check_not_reserved(name)?;
        let value = value.into();
        if let Some(expected) = self.declared_kind(name) {
            if expected != value.kind() {
                return Err(ParamError::KindMismatch {
                    name: name.to_string(),
                    expected,
                    found: value.kind(),
                }
                .into());
            }
        } else {
            tracing::debug!(material = %self.label, name, "parameter not declared by either program");
        }
        insert_param(&mut self.params, name, value);
        Ok(())
    }

    /// Adds or replaces the texture bound to slot `name`.
    pub fn add_texture_srv(&mut self, name: impl Into<String>, texture: TextureId) {
        let name = name.into();
        if !self.vertex.has_texture(&name) && !self.pixel.has_texture(&name) {
            tracing::debug!(material = %self.label, %name, "texture slot not declared; it will never be bound");
        }
        self.textures.insert(name, texture);
    }

    /// Adds or replaces the sampler bound to slot `name`.
    pub fn add_sampler(&mut self, name: impl Into<String>, sampler: SamplerId) {
        let name = name.into();
        if !self.vertex.has_sampler(&name) && !self.pixel.has_sampler(&name) {
            tracing::debug!(material = %self.label, %name, "sampler slot not declared; it will never be bound");
        }
        self.samplers.insert(name, sampler);
    }

    pub fn texture(&self, name: &str) -> Option<TextureId> {
        self.textures.get(name).copied()
    }

    pub fn sampler(&self, name: &str) -> Option<SamplerId> {
        self.samplers.get(name).copied()
    }

    pub fn textures(&self) -> impl Iterator<Item = (&str, TextureId)> {
        self.textures.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn samplers(&self) -> impl Iterator<Item = (&str, SamplerId)> {
        self.samplers.iter().map(|(name, id)| (name.as_str(), *id))
    }

    fn declared_kind(&self, name: &str) -> Option<ParamKind> {
        [&self.vertex, &self.pixel]
            .into_iter()
            .find_map(|program| program.constants().field(name).map(|field| field.kind))
    }
}

/// Chained construction for [`Material`]. Validation happens in
/// [`build`](MaterialBuilder::build).
#[derive(Debug)]
pub struct MaterialBuilder {
    material: Material,
}

impl MaterialBuilder {
    pub fn color_tint(mut self, tint: Vec3) -> Self {
        self.material.color_tint = tint;
        self
    }

    pub fn roughness(mut self, roughness: f32) -> Self {
        self.material.roughness = roughness;
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        insert_param(&mut self.material.params, name, value.into());
        self
    }

    pub fn texture(mut self, name: impl Into<String>, texture: TextureId) -> Self {
        self.material.textures.insert(name.into(), texture);
        self
    }

    pub fn sampler(mut self, name: impl Into<String>, sampler: SamplerId) -> Self {
        self.material.samplers.insert(name.into(), sampler);
        self
    }

    pub fn build(self) -> Result<Material, MaterialError> {
        let material = self.material;
        expect_stage(&material.vertex, ShaderStage::Vertex)?;
        expect_stage(&material.pixel, ShaderStage::Pixel)?;
        for (name, _) in &material.params {
            check_not_reserved(name)?;
        }

        let bindings = Bindings {
            provided: names::ENTITY_PROVIDED,
            params: &material.params,
            textures: &material.textures,
            samplers: &material.samplers,
        };
        bindings.check(&material.vertex)?;
        bindings.check(&material.pixel)?;

        for (name, _) in &material.params {
            if !material.vertex.has_constant(name) && !material.pixel.has_constant(name) {
                tracing::debug!(material = %material.label, %name, "parameter not declared by either program");
            }
        }

        tracing::debug!(
            material = %material.label,
            vertex = material.vertex.label(),
            pixel = material.pixel.label(),
            "built material"
        );
        Ok(material)
    }
}

fn insert_param(params: &mut Vec<(String, ParamValue)>, name: &str, value: ParamValue) {
    match params.iter_mut().find(|(key, _)| key == name) {
        Some((_, slot)) => *slot = value,
        None => params.push((name.to_string(), value)),
    }
}

fn check_not_reserved(name: &str) -> Result<(), MaterialError> {
    if names::ENTITY_PROVIDED.contains(&name) {
        Err(MaterialError::ReservedName(name.to_string()))
    } else {
        Ok(())
    }
}

pub(crate) fn expect_stage(
    program: &ShaderProgram,
    expected: ShaderStage,
) -> Result<(), MaterialError> {
    if program.stage() == expected {
        Ok(())
    } else {
        Err(MaterialError::StageMismatch {
            program: program.label().to_string(),
            expected,
            found: program.stage(),
        })
    }
}

/// Everything available to satisfy a program's declarations.
pub(crate) struct Bindings<'a> {
    pub provided: &'a [&'a str],
    pub params: &'a [(String, ParamValue)],
    pub textures: &'a BTreeMap<String, TextureId>,
    pub samplers: &'a BTreeMap<String, SamplerId>,
}

impl Bindings<'_> {
    pub(crate) fn check(&self, program: &ShaderProgram) -> Result<(), MaterialError> {
        for field in program.constants().fields() {
            let name = field.name.as_str();
            if self.provided.contains(&name) {
                let Some(expected) = provided_kind(name, field.kind) else {
                    return Err(MaterialError::Unsupported {
                        program: program.label().to_string(),
                        name: name.to_string(),
                    });
                };
                if expected != field.kind {
                    return Err(ParamError::KindMismatch {
                        name: name.to_string(),
                        expected,
                        found: field.kind,
                    }
                    .into());
                }
                continue;
            }
            match self.params.iter().find(|(key, _)| key == name) {
                Some((_, value)) if value.kind() != field.kind => {
                    return Err(ParamError::KindMismatch {
                        name: name.to_string(),
                        expected: field.kind,
                        found: value.kind(),
                    }
                    .into());
                }
                Some(_) => {}
                None => {
                    return Err(MaterialError::MissingParameter {
                        program: program.label().to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }

        for slot in program.textures() {
            if !self.textures.contains_key(&slot.name) {
                return Err(MaterialError::MissingTexture {
                    program: program.label().to_string(),
                    name: slot.name.clone(),
                });
            }
        }
        for slot in program.samplers() {
            if !self.samplers.contains_key(slot) {
                return Err(MaterialError::MissingSampler {
                    program: program.label().to_string(),
                    name: slot.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The type the renderer writes for a frame-provided name. `None` when the
/// renderer has no value of that name.
fn provided_kind(name: &str, declared: ParamKind) -> Option<ParamKind> {
    let kind = match name {
        names::WORLD | names::WORLD_INVERSE_TRANSPOSE | names::VIEW | names::PROJECTION => {
            ParamKind::Mat4
        }
        names::COLOR_TINT | names::CAMERA_POSITION | names::AMBIENT_COLOR => ParamKind::Float3,
        names::ROUGHNESS | names::TOTAL_TIME => ParamKind::Float,
        names::LIGHT_COUNT => ParamKind::UInt,
        names::LIGHTS => {
            // Any capacity works; records have a fixed size.
            let capacity = match declared {
                ParamKind::Array { capacity, .. } => capacity,
                _ => 0,
            };
            ParamKind::Array {
                stride: LightRecord::SIZE as u32,
                capacity,
            }
        }
        _ => return None,
    };
    Some(kind)
}
