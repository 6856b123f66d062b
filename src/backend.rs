//! The seam between the scene layer and whatever draws pixels.
//!
//! [`RenderBackend`] is the protocol the [`FrameRenderer`](crate::FrameRenderer)
//! speaks: create resources once, then every frame bind textures and samplers,
//! commit constant blocks, activate programs and submit indexed draws.
//!
//! [`RecordingBackend`] implements the protocol by writing every call into a
//! [`Command`] log. It never touches a GPU, so it runs in tests and headless
//! tools; `WgpuBackend` in `wgpu_backend` is the real thing.

use std::rc::Rc;

use crate::color::Color;
use crate::mesh::{Mesh, MeshData, MeshId};
use crate::shader::{ParameterBlock, ShaderDesc, ShaderId, ShaderProgram, ShaderStage};
use crate::texture::{SamplerDesc, SamplerId, TextureData, TextureId};

/// Errors raised by backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("failed to acquire surface texture: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("shader '{label}' failed to compile: {message}")]
    ShaderCompile { label: String, message: String },
    #[error("mesh '{0}' is invalid: {1}")]
    InvalidMesh(String, &'static str),
    #[error("texture '{label}' needs {expected} bytes of RGBA data, got {actual}")]
    InvalidTexture {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("cannot bind '{slot}' of '{program}': {reason}")]
    InvalidBinding {
        program: String,
        slot: String,
        reason: &'static str,
    },
    #[error("draw submitted without an active {0:?} program")]
    NoActiveProgram(ShaderStage),
    #[error("{0} was not created by this backend")]
    UnknownResource(String),
    #[error("'{0}' called outside begin_frame/end_frame")]
    NotInFrame(&'static str),
    #[error("'{0}' called while a frame is already in progress")]
    FrameInProgress(&'static str),
}

pub(crate) fn invalid_binding(program: &ShaderProgram, slot: &str, reason: &'static str) -> BackendError {
    BackendError::InvalidBinding {
        program: program.label().to_string(),
        slot: slot.to_string(),
        reason,
    }
}

/// Operations the frame renderer needs from a graphics backend.
pub trait RenderBackend {
    /// Uploads geometry and returns a shareable handle.
    fn upload_mesh(&mut self, label: &str, data: &MeshData) -> Result<Mesh, BackendError>;

    fn create_texture(&mut self, data: &TextureData) -> Result<TextureId, BackendError>;

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, BackendError>;

    /// Compiles a program. The returned `Rc` may be shared by any number of
    /// materials.
    fn load_shader(&mut self, desc: ShaderDesc) -> Result<Rc<ShaderProgram>, BackendError>;

    /// Starts a frame, clearing color and depth.
    fn begin_frame(&mut self, clear: Color) -> Result<(), BackendError>;

    /// Binds a texture to a named slot of `program` for the next draw.
    fn bind_texture(
        &mut self,
        program: &ShaderProgram,
        slot: &str,
        texture: TextureId,
    ) -> Result<(), BackendError>;

    /// Binds a sampler to a named slot of `program` for the next draw.
    fn bind_sampler(
        &mut self,
        program: &ShaderProgram,
        slot: &str,
        sampler: SamplerId,
    ) -> Result<(), BackendError>;

    /// Transfers a staged constant block to the program's constant buffer.
    fn commit_constants(
        &mut self,
        program: &ShaderProgram,
        block: &ParameterBlock,
    ) -> Result<(), BackendError>;

    /// Makes `program` current for its stage.
    fn activate(&mut self, program: &ShaderProgram) -> Result<(), BackendError>;

    /// Draws `mesh` with whatever is currently bound, committed and active.
    fn draw_indexed(&mut self, mesh: Mesh) -> Result<(), BackendError>;

    /// Finishes and presents the frame.
    fn end_frame(&mut self) -> Result<(), BackendError>;
}

/// Rejects geometry no backend can draw.
pub(crate) fn check_mesh(label: &str, data: &MeshData) -> Result<(), BackendError> {
    if data.indices.is_empty() {
        return Err(BackendError::InvalidMesh(label.to_string(), "no indices"));
    }
    if !data.indices_in_bounds() {
        return Err(BackendError::InvalidMesh(label.to_string(), "index out of bounds"));
    }
    Ok(())
}

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BeginFrame(Color),
    BindTexture {
        shader: ShaderId,
        slot: String,
        texture: TextureId,
    },
    BindSampler {
        shader: ShaderId,
        slot: String,
        sampler: SamplerId,
    },
    /// Snapshot of the block as it was when committed.
    CommitConstants {
        shader: ShaderId,
        block: ParameterBlock,
    },
    Activate {
        shader: ShaderId,
        stage: ShaderStage,
    },
    DrawIndexed {
        mesh: MeshId,
        index_count: u32,
    },
    EndFrame,
}

/// Backend that records calls instead of drawing.
///
/// Checks the same protocol rules as the GPU backend: per-frame calls only
/// inside a frame, bindings only to declared slots, committed blocks matching
/// the program's layout, and both stages active before a draw.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<Command>,
    meshes: u32,
    textures: u32,
    samplers: u32,
    shaders: u32,
    in_frame: bool,
    frames: u64,
    vertex: Option<ShaderId>,
    pixel: Option<ShaderId>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command since creation or the last [`clear`](Self::clear).
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Completed frames.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Recorded draws, in submission order.
    pub fn draws(&self) -> impl Iterator<Item = MeshId> + '_ {
        self.commands.iter().filter_map(|command| match command {
            Command::DrawIndexed { mesh, .. } => Some(*mesh),
            _ => None,
        })
    }

    /// Committed blocks for `shader`, in commit order.
    pub fn commits_for(&self, shader: ShaderId) -> impl Iterator<Item = &ParameterBlock> + '_ {
        self.commands.iter().filter_map(move |command| match command {
            Command::CommitConstants { shader: id, block } if *id == shader => Some(block),
            _ => None,
        })
    }

    fn require_frame(&self, call: &'static str) -> Result<(), BackendError> {
        if self.in_frame {
            Ok(())
        } else {
            Err(BackendError::NotInFrame(call))
        }
    }
}

impl RenderBackend for RecordingBackend {
    fn upload_mesh(&mut self, label: &str, data: &MeshData) -> Result<Mesh, BackendError> {
        check_mesh(label, data)?;
        let id = MeshId(self.meshes);
        self.meshes += 1;
        Ok(Mesh::new(id, data.index_count()))
    }

    fn create_texture(&mut self, data: &TextureData) -> Result<TextureId, BackendError> {
        data.validate()?;
        let id = TextureId(self.textures);
        self.textures += 1;
        Ok(id)
    }

    fn create_sampler(&mut self, _desc: &SamplerDesc) -> Result<SamplerId, BackendError> {
        let id = SamplerId(self.samplers);
        self.samplers += 1;
        Ok(id)
    }

    fn load_shader(&mut self, desc: ShaderDesc) -> Result<Rc<ShaderProgram>, BackendError> {
        let id = ShaderId(self.shaders);
        self.shaders += 1;
        Ok(Rc::new(ShaderProgram::from_desc(id, &desc)))
    }

    fn begin_frame(&mut self, clear: Color) -> Result<(), BackendError> {
        if self.in_frame {
            return Err(BackendError::FrameInProgress("begin_frame"));
        }
        self.in_frame = true;
        self.vertex = None;
        self.pixel = None;
        self.commands.push(Command::BeginFrame(clear));
        Ok(())
    }

    fn bind_texture(
        &mut self,
        program: &ShaderProgram,
        slot: &str,
        texture: TextureId,
    ) -> Result<(), BackendError> {
        self.require_frame("bind_texture")?;
        if !program.has_texture(slot) {
            return Err(invalid_binding(program, slot, "slot is not declared"));
        }
        self.commands.push(Command::BindTexture {
            shader: program.id(),
            slot: slot.to_string(),
            texture,
        });
        Ok(())
    }

    fn bind_sampler(
        &mut self,
        program: &ShaderProgram,
        slot: &str,
        sampler: SamplerId,
    ) -> Result<(), BackendError> {
        self.require_frame("bind_sampler")?;
        if !program.has_sampler(slot) {
            return Err(invalid_binding(program, slot, "slot is not declared"));
        }
        self.commands.push(Command::BindSampler {
            shader: program.id(),
            slot: slot.to_string(),
            sampler,
        });
        Ok(())
    }

    fn commit_constants(
        &mut self,
        program: &ShaderProgram,
        block: &ParameterBlock,
    ) -> Result<(), BackendError> {
        self.require_frame("commit_constants")?;
        if block.layout() != program.constants() {
            return Err(invalid_binding(program, "constants", "block does not match the program's layout"));
        }
        self.commands.push(Command::CommitConstants {
            shader: program.id(),
            block: block.clone(),
        });
        Ok(())
    }

    fn activate(&mut self, program: &ShaderProgram) -> Result<(), BackendError> {
        self.require_frame("activate")?;
        match program.stage() {
            ShaderStage::Vertex => self.vertex = Some(program.id()),
            ShaderStage::Pixel => self.pixel = Some(program.id()),
        }
        self.commands.push(Command::Activate {
            shader: program.id(),
            stage: program.stage(),
        });
        Ok(())
    }

    fn draw_indexed(&mut self, mesh: Mesh) -> Result<(), BackendError> {
        self.require_frame("draw_indexed")?;
        if self.vertex.is_none() {
            return Err(BackendError::NoActiveProgram(ShaderStage::Vertex));
        }
        if self.pixel.is_none() {
            return Err(BackendError::NoActiveProgram(ShaderStage::Pixel));
        }
        self.commands.push(Command::DrawIndexed {
            mesh: mesh.id(),
            index_count: mesh.index_count(),
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        self.require_frame("end_frame")?;
        self.in_frame = false;
        self.frames += 1;
        self.commands.push(Command::EndFrame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ParamKind;

    #[test]
    fn ids_are_sequential() {
        let mut backend = RecordingBackend::new();
        let a = backend.upload_mesh("a", &MeshData::cube()).unwrap();
        let b = backend.upload_mesh("b", &MeshData::plane(1.0)).unwrap();
        assert_eq!(a.id().index(), 0);
        assert_eq!(b.id().index(), 1);
        assert_eq!(b.index_count(), 6);

        let vs = backend.load_shader(ShaderDesc::basic_vertex()).unwrap();
        let ps = backend.load_shader(ShaderDesc::lit_pixel()).unwrap();
        assert_ne!(vs.id(), ps.id());
        assert_eq!(ps.stage(), ShaderStage::Pixel);
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let mut backend = RecordingBackend::new();
        let mut data = MeshData::plane(1.0);
        data.indices.push(99);
        assert!(matches!(
            backend.upload_mesh("broken", &data),
            Err(BackendError::InvalidMesh(_, "index out of bounds"))
        ));
        assert!(matches!(
            backend.upload_mesh("empty", &MeshData::default()),
            Err(BackendError::InvalidMesh(_, "no indices"))
        ));
    }

    #[test]
    fn per_frame_calls_need_an_open_frame() {
        let mut backend = RecordingBackend::new();
        let mesh = backend.upload_mesh("cube", &MeshData::cube()).unwrap();
        assert!(matches!(
            backend.draw_indexed(mesh),
            Err(BackendError::NotInFrame("draw_indexed"))
        ));

        let vs = backend.load_shader(ShaderDesc::basic_vertex()).unwrap();
        let ps = backend.load_shader(ShaderDesc::pixel("flat", "")).unwrap();

        backend.begin_frame(Color::BLACK).unwrap();
        assert!(backend.begin_frame(Color::BLACK).is_err());
        backend.activate(&vs).unwrap();
        backend.activate(&ps).unwrap();
        backend.draw_indexed(mesh).unwrap();
        backend.end_frame().unwrap();

        assert_eq!(backend.frames(), 1);
        assert_eq!(backend.draws().collect::<Vec<_>>(), vec![mesh.id()]);
    }

    #[test]
    fn draws_need_both_stages_active() {
        let mut backend = RecordingBackend::new();
        let mesh = backend.upload_mesh("cube", &MeshData::cube()).unwrap();
        let vs = backend.load_shader(ShaderDesc::basic_vertex()).unwrap();
        let ps = backend.load_shader(ShaderDesc::pixel("flat", "")).unwrap();

        backend.begin_frame(Color::BLACK).unwrap();
        assert!(matches!(
            backend.draw_indexed(mesh),
            Err(BackendError::NoActiveProgram(ShaderStage::Vertex))
        ));
        backend.activate(&vs).unwrap();
        assert!(matches!(
            backend.draw_indexed(mesh),
            Err(BackendError::NoActiveProgram(ShaderStage::Pixel))
        ));
        backend.activate(&ps).unwrap();
        backend.draw_indexed(mesh).unwrap();
        backend.end_frame().unwrap();

        // Activations do not carry over into the next frame.
        backend.begin_frame(Color::BLACK).unwrap();
        assert!(backend.draw_indexed(mesh).is_err());
        assert_eq!(backend.draws().count(), 1);
    }

    #[test]
    fn bindings_must_target_declared_slots() {
        let mut backend = RecordingBackend::new();
        let vs = backend.load_shader(ShaderDesc::basic_vertex()).unwrap();
        let ps = backend.load_shader(ShaderDesc::lit_pixel()).unwrap();
        let texture = backend.create_texture(&TextureData::flat_normal()).unwrap();
        let sampler = backend.create_sampler(&SamplerDesc::default()).unwrap();

        backend.begin_frame(Color::BLACK).unwrap();
        assert!(matches!(
            backend.bind_texture(&vs, "no_such_slot", texture),
            Err(BackendError::InvalidBinding { reason: "slot is not declared", .. })
        ));
        assert!(matches!(
            backend.bind_sampler(&vs, "BasicSampler", sampler),
            Err(BackendError::InvalidBinding { .. })
        ));
        backend.bind_texture(&ps, "NormalMap", texture).unwrap();
        backend.bind_sampler(&ps, "BasicSampler", sampler).unwrap();
        assert!(matches!(
            backend.commit_constants(&ps, &vs.new_block()),
            Err(BackendError::InvalidBinding { .. })
        ));
        assert_eq!(backend.commands().len(), 3);
    }

    #[test]
    fn commit_snapshots_the_block() {
        let mut backend = RecordingBackend::new();
        let program = backend
            .load_shader(ShaderDesc::pixel("tint", "").constant("colorTint", ParamKind::Float3))
            .unwrap();
        let mut block = program.new_block();

        backend.begin_frame(Color::BLACK).unwrap();
        block.set("colorTint", glam::Vec3::X).unwrap();
        backend.commit_constants(&program, &block).unwrap();
        block.set("colorTint", glam::Vec3::Y).unwrap();
        backend.commit_constants(&program, &block).unwrap();
        backend.end_frame().unwrap();

        let tints: Vec<_> = backend
            .commits_for(program.id())
            .map(|b| b.float3("colorTint").unwrap())
            .collect();
        assert_eq!(tints, vec![glam::Vec3::X, glam::Vec3::Y]);
    }
}
