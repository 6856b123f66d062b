//! [`RenderBackend`] on top of wgpu.
//!
//! Per-frame calls are recorded rather than executed. Each committed constant
//! block is appended to one frame-wide uniform buffer at an offset aligned to
//! the device's `min_uniform_buffer_offset_alignment`, and each draw remembers
//! the offsets and resource bind groups that were current when it was
//! submitted. `end_frame` uploads the packed constants with a single write,
//! replays the draws in one render pass and presents.
//!
//! # Bind groups
//!
//! Every pipeline is built from a vertex and a pixel program and uses four
//! groups:
//!
//! | Group | Contents                                                      |
//! |-------|---------------------------------------------------------------|
//! | 0     | vertex program constants at `@binding(0)`                      |
//! | 1     | pixel program constants at `@binding(0)`                       |
//! | 2     | pixel program textures, then its samplers, in declaration order |
//! | 3     | vertex program textures, then its samplers                     |
//!
//! A program that declares no constants or resources gets an empty group.
//! Slots left unbound fall back to a white texture and a linear sampler.
//!
//! Resource groups are cached across frames by program and by what is bound
//! to each slot, so a steady scene creates no bind groups after its first
//! frame.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::rc::Rc;
use std::sync::Arc;

use winit::window::Window;

use crate::backend::{BackendError, RenderBackend, check_mesh, invalid_binding};
use crate::color::Color;
use crate::gpu::GpuContext;
use crate::mesh::{GpuMesh, Mesh, MeshData, MeshId, Vertex3d};
use crate::shader::{
    DepthMode, ParameterBlock, ShaderDesc, ShaderId, ShaderProgram, ShaderStage, TextureDimension,
    TextureSlot, align_to,
};
use crate::texture::{GpuTexture, SamplerDesc, SamplerId, TextureData, TextureId, create_sampler};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const MIN_CONSTANTS_CAPACITY: u64 = 64 * 1024;

/// A compiled program plus the layouts derived from its declarations.
struct GpuProgram {
    label: String,
    module: wgpu::ShaderModule,
    entry_point: String,
    constants_size: u32,
    textures: Vec<TextureSlot>,
    samplers: Vec<String>,
    depth: DepthMode,
    constants_layout: wgpu::BindGroupLayout,
    resources_layout: wgpu::BindGroupLayout,
    /// Rebuilt whenever the frame constant buffer is reallocated.
    constants_group: Option<wgpu::BindGroup>,
}

/// Everything a recorded draw needs at replay time.
struct DrawRecord {
    mesh: MeshId,
    index_count: u32,
    vertex: ShaderId,
    pixel: ShaderId,
    vertex_offset: u32,
    pixel_offset: u32,
    vertex_resources: wgpu::BindGroup,
    pixel_resources: wgpu::BindGroup,
}

/// A program's resource group, identified by what each declared slot holds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ResourceKey {
    shader: ShaderId,
    textures: Vec<Option<TextureId>>,
    samplers: Vec<Option<SamplerId>>,
}

/// State between `begin_frame` and `end_frame`.
struct Frame {
    output: wgpu::SurfaceTexture,
    clear: Color,
    constants: Vec<u8>,
    offsets: HashMap<ShaderId, u32>,
    textures: HashMap<(ShaderId, String), TextureId>,
    samplers: HashMap<(ShaderId, String), SamplerId>,
    vertex: Option<ShaderId>,
    pixel: Option<ShaderId>,
    draws: Vec<DrawRecord>,
}

impl Frame {
    /// Appends a block and returns its offset.
    fn push_constants(&mut self, bytes: &[u8], alignment: u32) -> u32 {
        let offset = align_to(self.constants.len() as u32, alignment);
        self.constants.resize(offset as usize, 0);
        self.constants.extend_from_slice(bytes);
        offset
    }
}

struct Fallbacks {
    white: GpuTexture,
    white_cube: GpuTexture,
    sampler: wgpu::Sampler,
}

/// Draws through wgpu into a window surface.
pub struct WgpuBackend {
    gpu: GpuContext,
    meshes: Vec<GpuMesh>,
    textures: Vec<GpuTexture>,
    samplers: Vec<wgpu::Sampler>,
    programs: Vec<GpuProgram>,
    pipelines: HashMap<(ShaderId, ShaderId), wgpu::RenderPipeline>,
    resource_groups: HashMap<ResourceKey, wgpu::BindGroup>,
    constants_buffer: wgpu::Buffer,
    constants_capacity: u64,
    offset_alignment: u32,
    depth_view: wgpu::TextureView,
    depth_size: (u32, u32),
    fallbacks: Fallbacks,
    frame: Option<Frame>,
}

impl WgpuBackend {
    /// Creates the GPU context for `window` and the shared resources.
    pub fn new(window: Arc<Window>, vsync: bool) -> Result<Self, BackendError> {
        let gpu = GpuContext::new(window, vsync)?;

        let offset_alignment = gpu.device.limits().min_uniform_buffer_offset_alignment;
        let constants_buffer = create_constants_buffer(&gpu, MIN_CONSTANTS_CAPACITY);
        let depth_view = create_depth_view(&gpu);

        let white = GpuTexture::upload(&gpu, &TextureData::solid("Default White Texture", [255; 4]));
        let faces = std::array::from_fn(|_| vec![255; 4]);
        let white_cube = GpuTexture::upload(
            &gpu,
            &TextureData::cube_from_faces("Default White Cube", 1, faces)?,
        );
        let sampler = create_sampler(&gpu, &SamplerDesc::default());

        Ok(Self {
            depth_size: (gpu.width(), gpu.height()),
            gpu,
            meshes: Vec::new(),
            textures: Vec::new(),
            samplers: Vec::new(),
            programs: Vec::new(),
            pipelines: HashMap::new(),
            resource_groups: HashMap::new(),
            constants_buffer,
            constants_capacity: MIN_CONSTANTS_CAPACITY,
            offset_alignment,
            depth_view,
            fallbacks: Fallbacks {
                white,
                white_cube,
                sampler,
            },
            frame: None,
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Follows a window resize. The depth buffer is rebuilt on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }

    fn ensure_constants_capacity(&mut self, needed: u64) {
        if needed <= self.constants_capacity {
            return;
        }
        let capacity = needed.next_power_of_two().max(MIN_CONSTANTS_CAPACITY);
        tracing::debug!(capacity, "growing frame constant buffer");
        self.constants_buffer = create_constants_buffer(&self.gpu, capacity);
        self.constants_capacity = capacity;
        for program in &mut self.programs {
            program.constants_group = None;
        }
    }

    fn ensure_constants_groups(&mut self) {
        for program in &mut self.programs {
            if program.constants_group.is_none() {
                program.constants_group = Some(create_constants_group(
                    &self.gpu,
                    &self.constants_buffer,
                    program,
                ));
            }
        }
    }

    fn ensure_depth_size(&mut self) {
        let size = (self.gpu.width(), self.gpu.height());
        if self.depth_size != size {
            self.depth_view = create_depth_view(&self.gpu);
            self.depth_size = size;
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn upload_mesh(&mut self, label: &str, data: &MeshData) -> Result<Mesh, BackendError> {
        check_mesh(label, data)?;
        let id = MeshId(self.meshes.len() as u32);
        self.meshes.push(GpuMesh::upload(&self.gpu, label, data));
        tracing::debug!(mesh = label, indices = data.index_count(), "uploaded mesh");
        Ok(Mesh::new(id, data.index_count()))
    }

    fn create_texture(&mut self, data: &TextureData) -> Result<TextureId, BackendError> {
        data.validate()?;
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(GpuTexture::upload(&self.gpu, data));
        tracing::debug!(texture = %data.label, width = data.width, height = data.height, "uploaded texture");
        Ok(id)
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, BackendError> {
        let id = SamplerId(self.samplers.len() as u32);
        self.samplers.push(create_sampler(&self.gpu, desc));
        Ok(id)
    }

    fn load_shader(&mut self, desc: ShaderDesc) -> Result<Rc<ShaderProgram>, BackendError> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.clone()),
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(BackendError::ShaderCompile {
                label: desc.label.clone(),
                message: error.to_string(),
            });
        }

        let constants_size = desc.constants.size();
        self.ensure_constants_capacity(constants_size as u64);

        let id = ShaderId(self.programs.len() as u32);
        let program = GpuProgram {
            label: desc.label.clone(),
            constants_layout: create_constants_layout(&self.gpu, &desc.label, desc.stage, constants_size),
            resources_layout: create_resources_layout(&self.gpu, &desc),
            module,
            entry_point: desc.entry_point.clone(),
            constants_size,
            textures: desc.textures.clone(),
            samplers: desc.samplers.clone(),
            depth: desc.depth,
            constants_group: None,
        };
        self.programs.push(program);
        tracing::debug!(shader = %desc.label, stage = ?desc.stage, constants = constants_size, "loaded shader");
        Ok(Rc::new(ShaderProgram::from_desc(id, &desc)))
    }

    fn begin_frame(&mut self, clear: Color) -> Result<(), BackendError> {
        if self.frame.is_some() {
            return Err(BackendError::FrameInProgress("begin_frame"));
        }
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated; reconfiguring");
                self.gpu.reconfigure();
                self.gpu.surface.get_current_texture()?
            }
            Err(err) => return Err(err.into()),
        };
        self.frame = Some(Frame {
            output,
            clear,
            constants: Vec::new(),
            offsets: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashMap::new(),
            vertex: None,
            pixel: None,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn bind_texture(
        &mut self,
        program: &ShaderProgram,
        slot: &str,
        texture: TextureId,
    ) -> Result<(), BackendError> {
        let frame = self.frame.as_mut().ok_or(BackendError::NotInFrame("bind_texture"))?;
        let gpu_program = lookup_program(&self.programs, program)?;
        let declared = gpu_program
            .textures
            .iter()
            .find(|declared| declared.name == slot)
            .ok_or_else(|| invalid_binding(program, slot, "slot is not declared"))?;
        let gpu_texture = self
            .textures
            .get(texture.0 as usize)
            .ok_or_else(|| BackendError::UnknownResource(format!("{texture:?}")))?;
        if gpu_texture.dimension != declared.dimension {
            return Err(invalid_binding(program, slot, "texture dimension does not match the slot"));
        }
        frame.textures.insert((program.id(), slot.to_string()), texture);
        Ok(())
    }

    fn bind_sampler(
        &mut self,
        program: &ShaderProgram,
        slot: &str,
        sampler: SamplerId,
    ) -> Result<(), BackendError> {
        let frame = self.frame.as_mut().ok_or(BackendError::NotInFrame("bind_sampler"))?;
        let gpu_program = lookup_program(&self.programs, program)?;
        if !gpu_program.samplers.iter().any(|declared| declared == slot) {
            return Err(invalid_binding(program, slot, "slot is not declared"));
        }
        if sampler.0 as usize >= self.samplers.len() {
            return Err(BackendError::UnknownResource(format!("{sampler:?}")));
        }
        frame.samplers.insert((program.id(), slot.to_string()), sampler);
        Ok(())
    }

    fn commit_constants(
        &mut self,
        program: &ShaderProgram,
        block: &ParameterBlock,
    ) -> Result<(), BackendError> {
        let frame = self.frame.as_mut().ok_or(BackendError::NotInFrame("commit_constants"))?;
        let gpu_program = lookup_program(&self.programs, program)?;
        if block.as_bytes().len() != gpu_program.constants_size as usize {
            return Err(invalid_binding(program, "constants", "block does not match the program's layout"));
        }
        let offset = frame.push_constants(block.as_bytes(), self.offset_alignment);
        frame.offsets.insert(program.id(), offset);
        Ok(())
    }

    fn activate(&mut self, program: &ShaderProgram) -> Result<(), BackendError> {
        let frame = self.frame.as_mut().ok_or(BackendError::NotInFrame("activate"))?;
        lookup_program(&self.programs, program)?;
        match program.stage() {
            ShaderStage::Vertex => frame.vertex = Some(program.id()),
            ShaderStage::Pixel => frame.pixel = Some(program.id()),
        }
        Ok(())
    }

    fn draw_indexed(&mut self, mesh: Mesh) -> Result<(), BackendError> {
        let frame = self.frame.as_mut().ok_or(BackendError::NotInFrame("draw_indexed"))?;
        let vertex = frame.vertex.ok_or(BackendError::NoActiveProgram(ShaderStage::Vertex))?;
        let pixel = frame.pixel.ok_or(BackendError::NoActiveProgram(ShaderStage::Pixel))?;
        if mesh.id().index() as usize >= self.meshes.len() {
            return Err(BackendError::UnknownResource(format!("{:?}", mesh.id())));
        }

        let vertex_program = &self.programs[vertex.index() as usize];
        let pixel_program = &self.programs[pixel.index() as usize];

        let gpu = &self.gpu;
        self.pipelines
            .entry((vertex, pixel))
            .or_insert_with(|| create_pipeline(gpu, vertex_program, pixel_program));

        let mut offset_of = |id: ShaderId, program: &GpuProgram| match frame.offsets.get(&id).copied() {
            Some(offset) => offset,
            None => {
                tracing::warn!(shader = %program.label, "drawing without committed constants; using zeros");
                let zeros = vec![0; program.constants_size as usize];
                let offset = frame.push_constants(&zeros, self.offset_alignment);
                frame.offsets.insert(id, offset);
                offset
            }
        };
        let vertex_offset = offset_of(vertex, vertex_program);
        let pixel_offset = offset_of(pixel, pixel_program);

        let resources = Resources {
            textures: &self.textures,
            samplers: &self.samplers,
            fallbacks: &self.fallbacks,
        };
        let mut resource_group = |id: ShaderId, program: &GpuProgram| {
            let key = resource_key(
                &frame.textures,
                &frame.samplers,
                id,
                program.textures.iter().map(|slot| slot.name.as_str()),
                program.samplers.iter().map(String::as_str),
            );
            self.resource_groups
                .entry(key)
                .or_insert_with_key(|key| resources.bind_group(gpu, key, program))
                .clone()
        };
        let vertex_resources = resource_group(vertex, vertex_program);
        let pixel_resources = resource_group(pixel, pixel_program);

        frame.draws.push(DrawRecord {
            mesh: mesh.id(),
            index_count: mesh.index_count(),
            vertex,
            pixel,
            vertex_offset,
            pixel_offset,
            vertex_resources,
            pixel_resources,
        });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let frame = self.frame.take().ok_or(BackendError::NotInFrame("end_frame"))?;

        self.ensure_constants_capacity(frame.constants.len() as u64);
        self.ensure_constants_groups();
        self.ensure_depth_size();
        if !frame.constants.is_empty() {
            self.gpu
                .queue
                .write_buffer(&self.constants_buffer, 0, &frame.constants);
        }

        let view = frame
            .output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(frame.clear.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &frame.draws {
                // Every id below was checked when the draw was recorded.
                let (Some(pipeline), Some(vertex), Some(pixel), Some(mesh)) = (
                    self.pipelines.get(&(draw.vertex, draw.pixel)),
                    self.programs.get(draw.vertex.index() as usize),
                    self.programs.get(draw.pixel.index() as usize),
                    self.meshes.get(draw.mesh.index() as usize),
                ) else {
                    continue;
                };

                pass.set_pipeline(pipeline);
                set_constants(&mut pass, 0, vertex, draw.vertex_offset);
                set_constants(&mut pass, 1, pixel, draw.pixel_offset);
                pass.set_bind_group(2, &draw.pixel_resources, &[]);
                pass.set_bind_group(3, &draw.vertex_resources, &[]);
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.output.present();
        tracing::trace!(draws = frame.draws.len(), constants = frame.constants.len(), "presented frame");
        Ok(())
    }
}

fn lookup_program<'a>(
    programs: &'a [GpuProgram],
    program: &ShaderProgram,
) -> Result<&'a GpuProgram, BackendError> {
    programs
        .get(program.id().index() as usize)
        .ok_or_else(|| BackendError::UnknownResource(format!("shader '{}'", program.label())))
}

fn set_constants(pass: &mut wgpu::RenderPass, index: u32, program: &GpuProgram, offset: u32) {
    if let Some(group) = &program.constants_group {
        if program.constants_size == 0 {
            pass.set_bind_group(index, group, &[]);
        } else {
            pass.set_bind_group(index, group, &[offset]);
        }
    }
}

fn visibility(stage: ShaderStage) -> wgpu::ShaderStages {
    match stage {
        ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
        ShaderStage::Pixel => wgpu::ShaderStages::FRAGMENT,
    }
}

fn create_constants_buffer(gpu: &GpuContext, size: u64) -> wgpu::Buffer {
    gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Frame Constants"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_constants_layout(
    gpu: &GpuContext,
    label: &str,
    stage: ShaderStage,
    size: u32,
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::new();
    if size > 0 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: visibility(stage),
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(size as u64),
            },
            count: None,
        });
    }
    gpu.device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label} Constants Layout")),
            entries: &entries,
        })
}

fn create_constants_group(
    gpu: &GpuContext,
    buffer: &wgpu::Buffer,
    program: &GpuProgram,
) -> wgpu::BindGroup {
    let mut entries = Vec::new();
    if program.constants_size > 0 {
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(program.constants_size as u64),
            }),
        });
    }
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{} Constants", program.label)),
        layout: &program.constants_layout,
        entries: &entries,
    })
}

fn create_resources_layout(gpu: &GpuContext, desc: &ShaderDesc) -> wgpu::BindGroupLayout {
    let visibility = visibility(desc.stage);
    let textures = desc.textures.iter().map(|slot| wgpu::BindingType::Texture {
        sample_type: wgpu::TextureSampleType::Float { filterable: true },
        view_dimension: match slot.dimension {
            TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
        },
        multisampled: false,
    });
    let samplers = desc
        .samplers
        .iter()
        .map(|_| wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering));

    let entries: Vec<_> = textures
        .chain(samplers)
        .enumerate()
        .map(|(binding, ty)| wgpu::BindGroupLayoutEntry {
            binding: binding as u32,
            visibility,
            ty,
            count: None,
        })
        .collect();

    gpu.device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} Resources Layout", desc.label)),
            entries: &entries,
        })
}

/// What is bound to each declared slot of program `shader`, in declaration
/// order. Unbound slots are `None`.
fn resource_key<'a>(
    textures: &HashMap<(ShaderId, String), TextureId>,
    samplers: &HashMap<(ShaderId, String), SamplerId>,
    shader: ShaderId,
    texture_slots: impl Iterator<Item = &'a str>,
    sampler_slots: impl Iterator<Item = &'a str>,
) -> ResourceKey {
    ResourceKey {
        shader,
        textures: texture_slots
            .map(|slot| textures.get(&(shader, slot.to_string())).copied())
            .collect(),
        samplers: sampler_slots
            .map(|slot| samplers.get(&(shader, slot.to_string())).copied())
            .collect(),
    }
}

/// Resource tables needed to build resource bind groups.
struct Resources<'a> {
    textures: &'a [GpuTexture],
    samplers: &'a [wgpu::Sampler],
    fallbacks: &'a Fallbacks,
}

impl Resources<'_> {
    fn bind_group(&self, gpu: &GpuContext, key: &ResourceKey, program: &GpuProgram) -> wgpu::BindGroup {
        let mut entries = Vec::with_capacity(program.textures.len() + program.samplers.len());

        for (slot, bound) in program.textures.iter().zip(&key.textures) {
            let bound = bound.and_then(|texture| self.textures.get(texture.0 as usize));
            let texture = bound.unwrap_or_else(|| {
                tracing::warn!(shader = %program.label, slot = %slot.name, "texture slot unbound; using fallback");
                match slot.dimension {
                    TextureDimension::D2 => &self.fallbacks.white,
                    TextureDimension::Cube => &self.fallbacks.white_cube,
                }
            });
            entries.push(wgpu::BindGroupEntry {
                binding: entries.len() as u32,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        }

        for (slot, bound) in program.samplers.iter().zip(&key.samplers) {
            let bound = bound.and_then(|sampler| self.samplers.get(sampler.0 as usize));
            let sampler = bound.unwrap_or_else(|| {
                tracing::warn!(shader = %program.label, slot = %slot, "sampler slot unbound; using fallback");
                &self.fallbacks.sampler
            });
            entries.push(wgpu::BindGroupEntry {
                binding: entries.len() as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Resources", program.label)),
            layout: &program.resources_layout,
            entries: &entries,
        })
    }
}

fn create_pipeline(
    gpu: &GpuContext,
    vertex: &GpuProgram,
    pixel: &GpuProgram,
) -> wgpu::RenderPipeline {
    let device = &gpu.device;
    let label = format!("{} + {}", vertex.label, pixel.label);
    tracing::debug!(pipeline = %label, "building pipeline");

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&label),
        bind_group_layouts: &[
            &vertex.constants_layout,
            &pixel.constants_layout,
            &pixel.resources_layout,
            &vertex.resources_layout,
        ],
        push_constant_ranges: &[],
    });

    let background = vertex.depth == DepthMode::Background || pixel.depth == DepthMode::Background;
    let (depth_write_enabled, depth_compare, cull_mode) = if background {
        (false, wgpu::CompareFunction::LessEqual, Some(wgpu::Face::Front))
    } else {
        (true, wgpu::CompareFunction::Less, Some(wgpu::Face::Back))
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &vertex.module,
            entry_point: Some(vertex.entry_point.as_str()),
            buffers: &[Vertex3d::LAYOUT],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &pixel.module,
            entry_point: Some(pixel.entry_point.as_str()),
            targets: &[Some(wgpu::ColorTargetState {
                format: gpu.config.format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode,
            front_face: wgpu::FrontFace::Ccw,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn create_depth_view(gpu: &GpuContext) -> wgpu::TextureView {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: gpu.width(),
            height: gpu.height(),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(
        shader: ShaderId,
        surface: u32,
        sampler: Option<u32>,
    ) -> (HashMap<(ShaderId, String), TextureId>, HashMap<(ShaderId, String), SamplerId>) {
        let textures = HashMap::from([((shader, "SurfaceTexture".to_string()), TextureId(surface))]);
        let samplers = sampler
            .map(|id| ((shader, "BasicSampler".to_string()), SamplerId(id)))
            .into_iter()
            .collect();
        (textures, samplers)
    }

    fn key(shader: ShaderId, surface: u32, sampler: Option<u32>) -> ResourceKey {
        let (textures, samplers) = bindings(shader, surface, sampler);
        resource_key(
            &textures,
            &samplers,
            shader,
            ["SurfaceTexture", "NormalMap"].into_iter(),
            ["BasicSampler"].into_iter(),
        )
    }

    #[test]
    fn resource_keys_follow_slot_contents() {
        let lit = ShaderId(1);
        let first = key(lit, 0, Some(0));
        assert_eq!(first.textures, vec![Some(TextureId(0)), None]);
        assert_eq!(first.samplers, vec![Some(SamplerId(0))]);

        // The same bindings in a later frame reuse the cached group.
        assert_eq!(key(lit, 0, Some(0)), first);

        assert_ne!(key(lit, 1, Some(0)), first);
        assert_ne!(key(lit, 0, None), first);
        assert_ne!(key(ShaderId(2), 0, Some(0)), first);
    }
}
