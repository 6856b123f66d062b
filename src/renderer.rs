//! Per-frame draw orchestration.
//!
//! [`FrameRenderer::draw`] walks a [`Scene`] and drives a [`RenderBackend`]:
//!
//! 1. `begin_frame` with the scene's clear color.
//! 2. For every entity, in spawn order:
//!    - fill the vertex program's block (world, inverse-transpose world, view,
//!      projection and any declared custom parameters) and commit it;
//!    - fill the pixel program's block (tint, roughness, camera position,
//!      ambient, light count and the light records as one block, custom
//!      parameters), bind the material's textures and samplers, commit it;
//!    - activate the vertex program, then the pixel program;
//!    - submit the mesh.
//! 3. The sky, if any, the same way with a translation-free view.
//! 4. `end_frame`.
//!
//! Every frame value is written to whichever stage declares it, so a custom
//! vertex program may read `cameraPosition` or a pixel program `world`.
//! Values a program does not declare are skipped. Consecutive entities sharing
//! a material still get their own commits and activations.

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use crate::backend::{BackendError, RenderBackend};
use crate::light::LightRecord;
use crate::material::Material;
use crate::scene::{Scene, SceneError};
use crate::shader::{ParamKind, ParamValue, ParameterBlock, ShaderId, ShaderProgram, names};
use crate::texture::{SamplerId, TextureId};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Counters for one drawn frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draws: u32,
    pub commits: u32,
    /// Declared parameters nothing wrote (left zeroed).
    pub unresolved: u32,
}

/// Values shared by every draw of a frame.
struct FrameValues<'a> {
    view: Mat4,
    projection: Mat4,
    camera_position: Vec3,
    ambient: Vec3,
    total_time: f32,
    lights: &'a [u8],
}

/// Values that belong to one entity.
struct DrawValues<'a> {
    world: Mat4,
    world_inverse_transpose: Mat4,
    material: &'a Material,
}

/// Drives the frame protocol. Keeps one staging block per program between
/// frames so drawing does not allocate once warmed up. A cached block whose
/// layout no longer matches the program is replaced.
#[derive(Debug, Default)]
pub struct FrameRenderer {
    blocks: HashMap<ShaderId, ParameterBlock>,
    stats: FrameStats,
}

impl FrameRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws one frame of `scene` through `backend`.
    pub fn draw<B: RenderBackend + ?Sized>(
        &mut self,
        scene: &mut Scene,
        backend: &mut B,
        dt: f32,
        total: f32,
    ) -> Result<FrameStats, RenderError> {
        self.stats = FrameStats::default();
        tracing::trace!(dt, total, entities = scene.entities.len(), "drawing frame");

        backend.begin_frame(scene.clear_color())?;

        let view = scene.camera.view_matrix();
        let frame = FrameValues {
            view,
            projection: scene.camera.projection_matrix(),
            camera_position: scene.camera.position(),
            ambient: scene.lights.ambient(),
            total_time: total,
            lights: scene.lights.upload_bytes(),
        };

        for entity in scene.entities.iter_mut() {
            let id = entity.material();
            let material = (id.scene == scene.token)
                .then(|| scene.materials.get(id.index))
                .flatten()
                .ok_or(SceneError::InvalidComposition("material does not belong to this scene"))?;
            let draw = DrawValues {
                world: entity.transform_mut().world_matrix(),
                world_inverse_transpose: entity.transform_mut().world_inverse_transpose_matrix(),
                material,
            };

            let vertex = material.vertex_shader();
            let pixel = material.pixel_shader();
            self.stage(backend, vertex, &frame, Some(&draw), material.textures(), material.samplers())?;
            self.stage(backend, pixel, &frame, Some(&draw), material.textures(), material.samplers())?;
            backend.activate(vertex)?;
            backend.activate(pixel)?;
            backend.draw_indexed(entity.mesh())?;
            self.stats.draws += 1;
        }

        if let Some(sky) = &scene.sky {
            let frame = FrameValues {
                view: scene.camera.view_rotation_only(),
                ..frame
            };
            let vertex = sky.vertex_shader();
            let pixel = sky.pixel_shader();
            self.stage(backend, vertex, &frame, None, sky.textures(), sky.samplers())?;
            self.stage(backend, pixel, &frame, None, sky.textures(), sky.samplers())?;
            backend.activate(vertex)?;
            backend.activate(pixel)?;
            backend.draw_indexed(sky.mesh())?;
            self.stats.draws += 1;
        }

        backend.end_frame()?;
        Ok(self.stats)
    }

    /// Fills, binds and commits one program's parameters.
    fn stage<'a, B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        program: &ShaderProgram,
        frame: &FrameValues<'_>,
        draw: Option<&DrawValues<'_>>,
        textures: impl Iterator<Item = (&'a str, TextureId)>,
        samplers: impl Iterator<Item = (&'a str, SamplerId)>,
    ) -> Result<(), BackendError> {
        let block = self
            .blocks
            .entry(program.id())
            .or_insert_with(|| program.new_block());
        // Ids are per backend; a renderer reused across backends can see the
        // same id with another layout.
        if block.layout() != program.constants() {
            *block = program.new_block();
        }
        block.reset();

        put(block, names::VIEW, frame.view);
        put(block, names::PROJECTION, frame.projection);
        put(block, names::CAMERA_POSITION, frame.camera_position);
        put(block, names::AMBIENT_COLOR, frame.ambient);
        put(block, names::TOTAL_TIME, frame.total_time);
        put_lights(block, program, frame.lights);

        if let Some(draw) = draw {
            put(block, names::WORLD, draw.world);
            put(block, names::WORLD_INVERSE_TRANSPOSE, draw.world_inverse_transpose);
            put(block, names::COLOR_TINT, draw.material.color_tint());
            put(block, names::ROUGHNESS, draw.material.roughness());
            for (name, value) in draw.material.params() {
                put(block, name, value);
            }
        }

        for name in block.unwritten() {
            tracing::warn!(program = program.label(), name, "parameter left unresolved");
            self.stats.unresolved += 1;
        }

        for (slot, texture) in textures {
            if program.has_texture(slot) {
                backend.bind_texture(program, slot, texture)?;
            }
        }
        for (slot, sampler) in samplers {
            if program.has_sampler(slot) {
                backend.bind_sampler(program, slot, sampler)?;
            }
        }

        backend.commit_constants(program, block)?;
        self.stats.commits += 1;
        Ok(())
    }
}

/// Writes `value` if the block declares `name`.
fn put(block: &mut ParameterBlock, name: &str, value: impl Into<ParamValue>) {
    if !block.layout().contains(name) {
        return;
    }
    if let Err(err) = block.set(name, value) {
        tracing::warn!(%err, "skipping parameter");
    }
}

/// Writes the light records, truncated to what the program has room for, and
/// the number of records written. A program that declares only `lightCount`
/// gets the size of the whole set.
fn put_lights(block: &mut ParameterBlock, program: &ShaderProgram, lights: &[u8]) {
    let available = lights.len() / LightRecord::SIZE;
    let count = match program.constants().field(names::LIGHTS).map(|field| field.kind) {
        None => available,
        Some(ParamKind::Array { capacity, .. }) => {
            let count = available.min(capacity as usize);
            if count < available {
                tracing::warn!(
                    program = program.label(),
                    lights = available,
                    capacity,
                    "too many lights; extra lights are ignored"
                );
            }
            match block.set_data(names::LIGHTS, &lights[..count * LightRecord::SIZE]) {
                Ok(()) => count,
                Err(err) => {
                    tracing::warn!(%err, "skipping light block");
                    0
                }
            }
        }
        Some(_) => {
            tracing::warn!(program = program.label(), "'lights' is not an array; skipping");
            0
        }
    };
    put(block, names::LIGHT_COUNT, count as u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::backend::{Command, RecordingBackend};
    use crate::camera::{Camera, CameraConfig};
    use crate::light::Light;
    use crate::material::MaterialId;
    use crate::mesh::{Mesh, MeshData};
    use crate::shader::{ShaderDesc, ShaderStage};
    use crate::sky::Sky;
    use crate::texture::{SamplerDesc, TextureData};
    use glam::Vec2;

    struct Fixture {
        backend: RecordingBackend,
        scene: Scene,
        vs: Rc<ShaderProgram>,
        ps: Rc<ShaderProgram>,
        material: MaterialId,
        meshes: [Mesh; 3],
    }

    fn fixture() -> Fixture {
        let mut backend = RecordingBackend::new();
        let vs = backend.load_shader(ShaderDesc::basic_vertex()).unwrap();
        let ps = backend.load_shader(ShaderDesc::lit_pixel()).unwrap();
        let surface = backend
            .create_texture(&TextureData::solid("surface", [255; 4]))
            .unwrap();
        let specular = backend
            .create_texture(&TextureData::solid("specular", [0; 4]))
            .unwrap();
        let normal = backend.create_texture(&TextureData::flat_normal()).unwrap();
        let sampler = backend.create_sampler(&SamplerDesc::default()).unwrap();
        let material = Material::builder("lit", vs.clone(), ps.clone())
            .param("uvScale", Vec2::ONE)
            .texture("SurfaceTexture", surface)
            .texture("SpecularTexture", specular)
            .texture("NormalMap", normal)
            .sampler("BasicSampler", sampler)
            .build()
            .unwrap();

        let meshes = [
            backend.upload_mesh("cube", &MeshData::cube()).unwrap(),
            backend.upload_mesh("sphere", &MeshData::sphere(8, 4)).unwrap(),
            backend.upload_mesh("plane", &MeshData::plane(1.0)).unwrap(),
        ];

        let mut scene = Scene::new(Camera::new(CameraConfig::new().aspect(1.0)));
        let material = scene.add_material(material);
        Fixture {
            backend,
            scene,
            vs,
            ps,
            material,
            meshes,
        }
    }

    fn spawn_row(f: &mut Fixture) {
        for (i, mesh) in f.meshes.into_iter().enumerate() {
            let id = f.scene.spawn(mesh, f.material).unwrap();
            let x = (i + 1) as f32;
            f.scene.entity_mut(id).unwrap().transform_mut().set_position(x, 0.0, 0.0);
        }
    }

    fn translation(block: &ParameterBlock) -> Vec3 {
        block.mat4(names::WORLD).unwrap().w_axis.truncate()
    }

    #[test]
    fn entities_draw_in_spawn_order_with_their_own_world() {
        let mut f = fixture();
        spawn_row(&mut f);
        let mut renderer = FrameRenderer::new();
        let stats = renderer.draw(&mut f.scene, &mut f.backend, 0.016, 1.0).unwrap();

        let draws: Vec<_> = f.backend.draws().collect();
        assert_eq!(draws, f.meshes.map(|m| m.id()).to_vec());

        let worlds: Vec<Vec3> = f.backend.commits_for(f.vs.id()).map(translation).collect();
        assert_eq!(
            worlds,
            vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0)]
        );
        assert_eq!(stats.draws, 3);
        assert_eq!(stats.commits, 6);
        assert_eq!(stats.unresolved, 0);
    }

    #[test]
    fn commits_precede_activation_precedes_draw() {
        let mut f = fixture();
        spawn_row(&mut f);
        FrameRenderer::new()
            .draw(&mut f.scene, &mut f.backend, 0.016, 1.0)
            .unwrap();

        let commands = f.backend.commands();
        assert!(matches!(commands.first(), Some(Command::BeginFrame(_))));
        assert!(matches!(commands.last(), Some(Command::EndFrame)));

        let mut start = 1;
        for (index, command) in commands.iter().enumerate() {
            if !matches!(command, Command::DrawIndexed { .. }) {
                continue;
            }
            let span = &commands[start..index];
            let first = |pred: fn(&Command, &Fixture) -> bool| {
                span.iter().position(|c| pred(c, &f)).unwrap()
            };

            let vs_commit = first(|c, f| matches!(c, Command::CommitConstants { shader, .. } if *shader == f.vs.id()));
            let ps_commit = first(|c, f| matches!(c, Command::CommitConstants { shader, .. } if *shader == f.ps.id()));
            let vs_active = first(|c, _| matches!(c, Command::Activate { stage: ShaderStage::Vertex, .. }));
            let ps_active = first(|c, _| matches!(c, Command::Activate { stage: ShaderStage::Pixel, .. }));
            let last_bind = span
                .iter()
                .rposition(|c| matches!(c, Command::BindTexture { .. } | Command::BindSampler { .. }))
                .unwrap();

            assert!(vs_commit < vs_active && ps_commit < vs_active);
            assert!(vs_active < ps_active);
            assert!(last_bind < vs_active);
            assert_eq!(
                span.iter()
                    .filter(|c| matches!(c, Command::CommitConstants { .. }))
                    .count(),
                2
            );
            start = index + 1;
        }
    }

    #[test]
    fn five_lights_upload_as_one_block() {
        let mut f = fixture();
        spawn_row(&mut f);
        let lights = f.scene.lights_mut();
        lights.push(Light::directional(Vec3::X, Vec3::ONE, 1.0));
        lights.push(Light::directional(Vec3::NEG_Y, Vec3::Y, 0.0));
        lights.push(Light::directional(Vec3::Z, Vec3::Z, 0.0));
        lights.push(Light::point(Vec3::new(2.5, -2.5, 0.0), 20.0, Vec3::X, 0.0));
        lights.push(Light::point(Vec3::new(-2.5, 2.5, 0.0), 20.0, Vec3::Y, 0.0));

        FrameRenderer::new()
            .draw(&mut f.scene, &mut f.backend, 0.016, 1.0)
            .unwrap();

        for block in f.backend.commits_for(f.ps.id()) {
            assert_eq!(block.written_len(names::LIGHTS), Some(5 * 64));
            let count = block.field_bytes(names::LIGHT_COUNT).unwrap();
            assert_eq!(count, &5u32.to_ne_bytes());
        }
    }

    #[test]
    fn excess_lights_are_truncated() {
        let mut f = fixture();
        spawn_row(&mut f);
        for i in 0..12 {
            f.scene
                .lights_mut()
                .push(Light::point(Vec3::splat(i as f32), 5.0, Vec3::ONE, 1.0));
        }

        let stats = FrameRenderer::new()
            .draw(&mut f.scene, &mut f.backend, 0.016, 1.0)
            .unwrap();
        let block = f.backend.commits_for(f.ps.id()).next().unwrap();
        assert_eq!(
            block.written_len(names::LIGHTS),
            Some(crate::shader::MAX_LIGHTS as usize * 64)
        );
        assert_eq!(stats.draws, 3);
    }

    #[test]
    fn light_count_is_written_without_a_light_array() {
        let mut f = fixture();
        let ps = f
            .backend
            .load_shader(ShaderDesc::pixel("count only", "").constant("lightCount", ParamKind::UInt))
            .unwrap();
        let material = Material::builder("count", f.vs.clone(), ps.clone()).build().unwrap();
        let material = f.scene.add_material(material);
        f.scene.spawn(f.meshes[0], material).unwrap();
        for i in 0..3 {
            f.scene
                .lights_mut()
                .push(Light::point(Vec3::splat(i as f32), 5.0, Vec3::ONE, 1.0));
        }

        let stats = FrameRenderer::new()
            .draw(&mut f.scene, &mut f.backend, 0.016, 1.0)
            .unwrap();
        let block = f.backend.commits_for(ps.id()).next().unwrap();
        assert_eq!(block.field_bytes(names::LIGHT_COUNT).unwrap(), &3u32.to_ne_bytes());
        assert_eq!(stats.unresolved, 0);
    }

    #[test]
    fn cached_blocks_follow_the_program_layout() {
        let mut f = fixture();
        spawn_row(&mut f);
        let mut renderer = FrameRenderer::new();
        renderer.draw(&mut f.scene, &mut f.backend, 0.016, 1.0).unwrap();

        // A second backend hands out the same ids for different programs.
        let mut other = RecordingBackend::new();
        let vs = other
            .load_shader(ShaderDesc::vertex("world only", "").constant(names::WORLD, ParamKind::Mat4))
            .unwrap();
        let ps = other
            .load_shader(ShaderDesc::pixel("tint only", "").constant(names::COLOR_TINT, ParamKind::Float3))
            .unwrap();
        assert_eq!(vs.id(), f.vs.id());
        let mesh = other.upload_mesh("cube", &MeshData::cube()).unwrap();
        let mut scene = Scene::new(Camera::default());
        let material = scene.add_material(Material::builder("plain", vs.clone(), ps).build().unwrap());
        scene.spawn(mesh, material).unwrap();

        let stats = renderer.draw(&mut scene, &mut other, 0.016, 1.0).unwrap();
        let block = other.commits_for(vs.id()).next().unwrap();
        assert_eq!(block.layout(), vs.constants());
        assert_eq!(block.mat4(names::WORLD), Some(Mat4::IDENTITY));
        assert_eq!(stats.unresolved, 0);
    }

    #[test]
    fn shared_material_edit_reaches_every_entity() {
        let mut f = fixture();
        spawn_row(&mut f);
        let mut renderer = FrameRenderer::new();
        renderer.draw(&mut f.scene, &mut f.backend, 0.016, 1.0).unwrap();

        f.scene
            .material_mut(f.material)
            .unwrap()
            .set_color_tint(Vec3::new(1.0, 0.0, 0.0));
        f.backend.clear();
        renderer.draw(&mut f.scene, &mut f.backend, 0.016, 1.016).unwrap();

        let tints: Vec<Vec3> = f
            .backend
            .commits_for(f.ps.id())
            .map(|b| b.float3(names::COLOR_TINT).unwrap())
            .collect();
        assert_eq!(tints, vec![Vec3::X; 3]);
    }

    #[test]
    fn static_transforms_are_not_recomputed() {
        let mut f = fixture();
        spawn_row(&mut f);
        let mut renderer = FrameRenderer::new();
        for frame in 0..3 {
            renderer
                .draw(&mut f.scene, &mut f.backend, 0.016, frame as f32)
                .unwrap();
        }
        for (_, entity) in f.scene.entities() {
            assert_eq!(entity.transform().recompute_count(), 1);
        }
    }

    #[test]
    fn view_and_projection_come_from_the_camera() {
        let mut f = fixture();
        spawn_row(&mut f);
        FrameRenderer::new()
            .draw(&mut f.scene, &mut f.backend, 0.016, 1.0)
            .unwrap();

        let view = f.scene.camera_mut().view_matrix();
        let projection = f.scene.camera().projection_matrix();
        let block = f.backend.commits_for(f.vs.id()).next().unwrap();
        assert_eq!(block.mat4(names::VIEW), Some(view));
        assert_eq!(block.mat4(names::PROJECTION), Some(projection));

        let ps_block = f.backend.commits_for(f.ps.id()).next().unwrap();
        assert_eq!(
            ps_block.float3(names::CAMERA_POSITION),
            Some(f.scene.camera().position())
        );
        assert_eq!(ps_block.float3(names::AMBIENT_COLOR), Some(f.scene.lights().ambient()));
    }

    #[test]
    fn sky_draws_last_without_translation() {
        let mut f = fixture();
        spawn_row(&mut f);
        f.scene
            .camera_mut()
            .transform_mut()
            .set_position(10.0, 20.0, 30.0);

        let sky_mesh = f.backend.upload_mesh("sky", &MeshData::cube()).unwrap();
        let sky_vs = f.backend.load_shader(ShaderDesc::sky_vertex()).unwrap();
        let sky_ps = f.backend.load_shader(ShaderDesc::sky_pixel()).unwrap();
        let cube = f
            .backend
            .create_texture(&TextureData::gradient_sky(2, Vec3::Z, Vec3::ONE, Vec3::ZERO))
            .unwrap();
        let sampler = f.backend.create_sampler(&SamplerDesc::default()).unwrap();
        let sky = Sky::builder(sky_mesh, sky_vs.clone(), sky_ps)
            .texture("CubeMap", cube)
            .sampler("BasicSampler", sampler)
            .build()
            .unwrap();
        f.scene.set_sky(Some(sky));

        FrameRenderer::new()
            .draw(&mut f.scene, &mut f.backend, 0.016, 1.0)
            .unwrap();

        assert_eq!(f.backend.draws().last(), Some(sky_mesh.id()));
        let sky_block = f.backend.commits_for(sky_vs.id()).next().unwrap();
        let view = sky_block.mat4(names::VIEW).unwrap();
        assert_eq!(view.w_axis, glam::Vec4::W);

        let entity_view = f.backend.commits_for(f.vs.id()).next().unwrap();
        assert_ne!(entity_view.mat4(names::VIEW).unwrap().w_axis, glam::Vec4::W);
    }
}
