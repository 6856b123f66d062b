//! Demo scene: five lit objects in a row under a procedural sky.
//!
//! WASD/Space/Shift fly, hold the left mouse button to look, Ctrl to go fast,
//! Escape to quit. `RUST_LOG=tessera=debug` shows resource creation.

use tessera::{
    AppConfig, AppError, CameraConfig, EntityId, Frame, Light, Material, MeshData, RenderBackend,
    SamplerDesc, Scene, ShaderDesc, Sky, TextureData, Vec2, Vec3,
};
use tracing_subscriber::EnvFilter;

const PURPLE_LIGHT: usize = 3;

fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tessera::run(AppConfig::new().title("Tessera Demo"), |ctx| {
        let backend = &mut *ctx.backend;

        let vertex = backend.load_shader(ShaderDesc::basic_vertex())?;
        let pixel = backend.load_shader(ShaderDesc::lit_pixel())?;

        let checker = backend.create_texture(&TextureData::checker(
            256,
            8,
            [220, 220, 220, 255],
            [60, 60, 70, 255],
        ))?;
        let stone = backend.create_texture(&TextureData::noise(
            64,
            7,
            &[[120, 120, 125], [100, 100, 108], [140, 138, 130]],
        ))?;
        let shiny = backend.create_texture(&TextureData::solid("full specular", [255; 4]))?;
        let dull = backend.create_texture(&TextureData::solid("faint specular", [40, 40, 40, 255]))?;
        let flat = backend.create_texture(&TextureData::flat_normal())?;
        let bumps = backend.create_texture(&TextureData::bumps(128, 8, 0.6))?;
        let sampler = backend.create_sampler(&SamplerDesc::default())?;

        let rough = Material::builder("rough checker", vertex.clone(), pixel.clone())
            .roughness(1.0)
            .param("uvScale", Vec2::ONE)
            .texture("SurfaceTexture", checker)
            .texture("SpecularTexture", dull)
            .texture("NormalMap", flat)
            .sampler("BasicSampler", sampler)
            .build()?;
        let polished = Material::builder("polished stone", vertex, pixel)
            .roughness(0.5)
            .param("uvScale", Vec2::splat(2.0))
            .texture("SurfaceTexture", stone)
            .texture("SpecularTexture", shiny)
            .texture("NormalMap", bumps)
            .sampler("BasicSampler", sampler)
            .build()?;

        let cube = backend.upload_mesh("cube", &MeshData::cube())?;
        let sphere = backend.upload_mesh("sphere", &MeshData::sphere(32, 16))?;
        let coarse_sphere = backend.upload_mesh("coarse sphere", &MeshData::sphere(8, 4))?;
        let plane = backend.upload_mesh("plane", &MeshData::plane(2.0))?;

        let sky_mesh = backend.upload_mesh("sky cube", &MeshData::cube())?;
        let sky_cube = backend.create_texture(&TextureData::gradient_sky(
            64,
            Vec3::new(0.15, 0.3, 0.65),
            Vec3::new(0.75, 0.82, 0.9),
            Vec3::new(0.2, 0.18, 0.16),
        ))?;
        let sky = Sky::builder(
            sky_mesh,
            backend.load_shader(ShaderDesc::sky_vertex())?,
            backend.load_shader(ShaderDesc::sky_pixel())?,
        )
        .texture("CubeMap", sky_cube)
        .sampler("BasicSampler", sampler)
        .build()?;

        let mut scene = Scene::new(ctx.camera(CameraConfig::new().position(Vec3::new(0.0, 0.0, 5.0))));
        let rough = scene.add_material(rough);
        let polished = scene.add_material(polished);

        let row = [
            (cube, rough, 0.0),
            (coarse_sphere, polished, 5.0),
            (plane, rough, 10.0),
            (sphere, polished, -5.0),
            (cube, rough, -10.0),
        ];
        let mut spinning = Vec::with_capacity(row.len());
        for (mesh, material, x) in row {
            let id = scene.spawn(mesh, material)?;
            scene.entity_mut(id)?.transform_mut().set_position(x, 0.0, 0.0);
            spinning.push(id);
        }
        let first = spinning[0];
        scene
            .entity_mut(first)?
            .transform_mut()
            .set_rotation(std::f32::consts::FRAC_PI_4, std::f32::consts::FRAC_PI_4, 0.0);
        scene
            .entity_mut(spinning[2])?
            .transform_mut()
            .set_rotation(std::f32::consts::FRAC_PI_2, 0.0, 0.0);

        let lights = scene.lights_mut();
        lights.push(Light::directional(Vec3::X, Vec3::ONE, 1.0));
        lights.push(Light::directional(Vec3::NEG_Y, Vec3::new(0.0, 1.0, 0.0), 0.2));
        lights.push(Light::directional(Vec3::Z, Vec3::new(0.0, 0.0, 1.0), 0.2));
        lights.push(Light::point(Vec3::new(2.5, -2.5, 0.0), 20.0, Vec3::new(1.0, 0.0, 1.0), 1.0));
        lights.push(Light::point(Vec3::new(-2.5, 2.5, 0.0), 20.0, Vec3::new(1.0, 1.0, 0.0), 1.0));

        scene.set_sky(Some(sky));
        Ok((scene, animate(first)))
    })
}

/// Spins the first cube and swings the purple light around the row.
fn animate(cube: EntityId) -> impl FnMut(&mut Frame) {
    let mut since_report = 0.0;
    move |frame| {
        if let Ok(entity) = frame.scene.entity_mut(cube) {
            entity.transform_mut().rotate(0.0, 0.5 * frame.dt, 0.0);
        }
        if let Some(light) = frame.scene.lights_mut().get_mut(PURPLE_LIGHT) {
            light.position = Vec3::new(10.0 * frame.time.sin(), -2.5, 2.0 * frame.time.cos());
        }

        since_report += frame.dt;
        if since_report >= 1.0 {
            since_report = 0.0;
            tracing::debug!(fps = frame.fps(), draws = frame.stats.draws, "frame stats");
        }
    }
}
