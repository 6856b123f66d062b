//! # Tessera
//!
//! **Scene model and frame orchestration for a small real-time 3D renderer.**
//!
//! Tessera keeps track of what is in a scene and drives the per-frame draw
//! protocol: entities with cached transforms, materials that pair a vertex
//! and a pixel program with parameters and textures, a free-look camera, a
//! light set, and an optional sky. Drawing goes through the
//! [`RenderBackend`] trait; [`WgpuBackend`] draws into a window and
//! [`RecordingBackend`] records calls for tests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tessera::*;
//!
//! fn spin(frame: &mut Frame) {
//!     let dt = frame.dt;
//!     for (_, entity) in frame.scene.entities_mut() {
//!         entity.transform_mut().rotate(0.0, dt, 0.0);
//!     }
//! }
//!
//! fn main() -> Result<(), AppError> {
//!     run(AppConfig::new().title("cube"), |ctx| {
//!         let vs = ctx.backend.load_shader(ShaderDesc::basic_vertex())?;
//!         let ps = ctx.backend.load_shader(ShaderDesc::lit_pixel())?;
//!         let surface = ctx.backend.create_texture(&TextureData::checker(64, 8, [255; 4], [40, 40, 40, 255]))?;
//!         let specular = ctx.backend.create_texture(&TextureData::solid("specular", [255; 4]))?;
//!         let normal = ctx.backend.create_texture(&TextureData::flat_normal())?;
//!         let sampler = ctx.backend.create_sampler(&SamplerDesc::default())?;
//!         let cube = ctx.backend.upload_mesh("cube", &MeshData::cube())?;
//!
//!         let material = Material::builder("checker", vs, ps)
//!             .param("uvScale", Vec2::ONE)
//!             .texture("SurfaceTexture", surface)
//!             .texture("SpecularTexture", specular)
//!             .texture("NormalMap", normal)
//!             .sampler("BasicSampler", sampler)
//!             .build()?;
//!
//!         let mut scene = Scene::new(ctx.camera(CameraConfig::new()));
//!         let material = scene.add_material(material);
//!         scene.spawn(cube, material)?;
//!         scene.lights_mut().push(Light::directional(Vec3::new(1.0, -1.0, -1.0), Vec3::ONE, 1.0));
//!         Ok((scene, spin))
//!     })
//! }
//! ```
//!
//! ## Frame protocol
//!
//! [`FrameRenderer::draw`] begins the frame, then for every entity in spawn
//! order writes its parameters into the vertex and pixel programs' blocks,
//! binds the material's textures and samplers, commits both blocks,
//! activates both programs and submits the mesh. The sky goes last. See the
//! [`renderer`] module for details.

mod app;
mod backend;
mod camera;
mod color;
mod entity;
mod gpu;
mod input;
mod light;
mod material;
mod mesh;
pub mod renderer;
mod scene;
mod shader;
mod sky;
mod texture;
mod transform;
mod wgpu_backend;

pub use app::{AppConfig, AppError, Frame, SetupContext, run};
pub use backend::{BackendError, Command, RecordingBackend, RenderBackend};
pub use camera::{Camera, CameraConfig, Projection};
pub use color::Color;
pub use entity::{Entity, EntityId};
pub use gpu::GpuContext;
pub use input::Input;
pub use light::{
    LIGHT_TYPE_DIRECTIONAL, LIGHT_TYPE_POINT, LIGHT_TYPE_SPOT, Light, LightKind, LightRecord,
    LightSet,
};
pub use material::{Material, MaterialBuilder, MaterialError, MaterialId};
pub use mesh::{Mesh, MeshData, MeshId, Vertex3d};
pub use renderer::{FrameRenderer, FrameStats, RenderError};
pub use scene::{Scene, SceneError};
pub use shader::{
    ConstantLayout, DepthMode, MAX_LIGHTS, ParamError, ParamField, ParamKind, ParamValue,
    ParameterBlock, ShaderDesc, ShaderId, ShaderProgram, ShaderStage, TextureDimension,
    TextureSlot, names,
};
pub use sky::{Sky, SkyBuilder};
pub use texture::{AddressMode, Filter, SamplerDesc, SamplerId, TextureData, TextureId};
pub use transform::Transform;
pub use wgpu_backend::WgpuBackend;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

// Re-export commonly used winit types for convenience
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;
