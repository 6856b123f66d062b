//! Background drawn behind everything else.
//!
//! A [`Sky`] is a mesh (usually a cube) with its own program pair. The renderer
//! draws it after all entities with a view matrix stripped of translation, so it
//! stays centered on the eye. The built-in sky vertex program writes depth 1.0
//! and is loaded with [`DepthMode::Background`](crate::DepthMode::Background),
//! so the sky only fills pixels no entity covered.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::material::{Bindings, MaterialError, expect_stage};
use crate::mesh::Mesh;
use crate::shader::{ShaderProgram, ShaderStage, names};
use crate::texture::{SamplerId, TextureId};

#[derive(Clone, Debug)]
pub struct Sky {
    mesh: Mesh,
    vertex: Rc<ShaderProgram>,
    pixel: Rc<ShaderProgram>,
    textures: BTreeMap<String, TextureId>,
    samplers: BTreeMap<String, SamplerId>,
}

impl Sky {
    pub fn builder(mesh: Mesh, vertex: Rc<ShaderProgram>, pixel: Rc<ShaderProgram>) -> SkyBuilder {
        SkyBuilder {
            sky: Sky {
                mesh,
                vertex,
                pixel,
                textures: BTreeMap::new(),
                samplers: BTreeMap::new(),
            },
        }
    }

    pub fn mesh(&self) -> Mesh {
        self.mesh
    }

    pub fn vertex_shader(&self) -> &Rc<ShaderProgram> {
        &self.vertex
    }

    pub fn pixel_shader(&self) -> &Rc<ShaderProgram> {
        &self.pixel
    }

    pub fn textures(&self) -> impl Iterator<Item = (&str, TextureId)> {
        self.textures.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn samplers(&self) -> impl Iterator<Item = (&str, SamplerId)> {
        self.samplers.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Swaps the cube map (or any other texture) at runtime.
    pub fn set_texture(&mut self, name: impl Into<String>, texture: TextureId) {
        self.textures.insert(name.into(), texture);
    }
}

#[derive(Debug)]
pub struct SkyBuilder {
    sky: Sky,
}

impl SkyBuilder {
    pub fn texture(mut self, name: impl Into<String>, texture: TextureId) -> Self {
        self.sky.textures.insert(name.into(), texture);
        self
    }

    pub fn sampler(mut self, name: impl Into<String>, sampler: SamplerId) -> Self {
        self.sky.samplers.insert(name.into(), sampler);
        self
    }

    /// Checks that the programs only ask for what a sky pass provides: the
    /// view and projection matrices, camera position, time, and the textures
    /// and samplers given here.
    pub fn build(self) -> Result<Sky, MaterialError> {
        let sky = self.sky;
        expect_stage(&sky.vertex, ShaderStage::Vertex)?;
        expect_stage(&sky.pixel, ShaderStage::Pixel)?;

        let bindings = Bindings {
            provided: names::SKY_PROVIDED,
            params: &[],
            textures: &sky.textures,
            samplers: &sky.samplers,
        };
        bindings.check(&sky.vertex)?;
        bindings.check(&sky.pixel)?;
        Ok(sky)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordingBackend, RenderBackend};
    use crate::mesh::MeshData;
    use crate::shader::{ParamKind, ShaderDesc};
    use crate::texture::{SamplerDesc, TextureData};
    use glam::Vec3;

    #[test]
    fn builtin_sky_programs_build() {
        let mut backend = RecordingBackend::new();
        let mesh = backend.upload_mesh("sky cube", &MeshData::cube()).unwrap();
        let vs = backend.load_shader(ShaderDesc::sky_vertex()).unwrap();
        let ps = backend.load_shader(ShaderDesc::sky_pixel()).unwrap();
        let cube = backend
            .create_texture(&TextureData::gradient_sky(4, Vec3::Z, Vec3::ONE, Vec3::ZERO))
            .unwrap();
        let sampler = backend.create_sampler(&SamplerDesc::default()).unwrap();

        let sky = Sky::builder(mesh, vs.clone(), ps.clone())
            .texture("CubeMap", cube)
            .sampler("BasicSampler", sampler)
            .build()
            .unwrap();
        assert_eq!(sky.mesh(), mesh);

        let missing = Sky::builder(mesh, vs, ps).sampler("BasicSampler", sampler).build();
        assert!(matches!(missing, Err(MaterialError::MissingTexture { .. })));
    }

    #[test]
    fn sky_cannot_use_entity_parameters() {
        let mut backend = RecordingBackend::new();
        let mesh = backend.upload_mesh("sky cube", &MeshData::cube()).unwrap();
        let vs = backend
            .load_shader(ShaderDesc::vertex("world sky", "").constant(names::WORLD, ParamKind::Mat4))
            .unwrap();
        let ps = backend.load_shader(ShaderDesc::pixel("plain", "")).unwrap();

        let result = Sky::builder(mesh, vs, ps).build();
        assert_eq!(
            result.unwrap_err(),
            MaterialError::MissingParameter {
                program: "world sky".to_string(),
                name: names::WORLD.to_string(),
            }
        );
    }
}
