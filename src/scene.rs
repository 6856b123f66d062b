//! Everything that gets drawn in a frame.
//!
//! A [`Scene`] owns the camera, the light set, the materials, the entities and
//! an optional sky. Materials live in an arena addressed by [`MaterialId`];
//! entities refer to them by id, so editing a material through
//! [`Scene::material_mut`] changes every entity that uses it on the next draw.
//! Entities are drawn in the order they were spawned.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::camera::Camera;
use crate::color::Color;
use crate::entity::{Entity, EntityId};
use crate::input::Input;
use crate::light::LightSet;
use crate::material::{Material, MaterialId};
use crate::mesh::Mesh;
use crate::sky::Sky;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SceneError {
    #[error("cannot compose entity: {0}")]
    InvalidComposition(&'static str),
    #[error("no entity with id {0:?}")]
    UnknownEntity(EntityId),
}

static NEXT_SCENE: AtomicU32 = AtomicU32::new(0);

#[derive(Debug)]
pub struct Scene {
    pub(crate) token: u32,
    pub(crate) camera: Camera,
    pub(crate) lights: LightSet,
    pub(crate) materials: Vec<Material>,
    pub(crate) entities: Vec<Entity>,
    pub(crate) sky: Option<Sky>,
    clear_color: Color,
    frame: u64,
    total_time: f32,
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        Self {
            token: NEXT_SCENE.fetch_add(1, Ordering::Relaxed),
            camera,
            lights: LightSet::new(),
            materials: Vec::new(),
            entities: Vec::new(),
            sky: None,
            clear_color: Color::SKY_BLUE,
            frame: 0,
            total_time: 0.0,
        }
    }

    /// Registers a built material and returns its id.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        tracing::debug!(material = material.label(), id = self.materials.len(), "registered material");
        self.materials.push(material);
        MaterialId {
            scene: self.token,
            index: self.materials.len() - 1,
        }
    }

    /// `None` for ids handed out by another scene.
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        if id.scene != self.token {
            return None;
        }
        self.materials.get(id.index)
    }

    /// Mutable access to a shared material. Changes apply to every entity
    /// referencing it.
    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        if id.scene != self.token {
            return None;
        }
        self.materials.get_mut(id.index)
    }

    /// Creates an entity at the origin from a mesh and one of this scene's
    /// materials.
    pub fn spawn(&mut self, mesh: Mesh, material: MaterialId) -> Result<EntityId, SceneError> {
        if self.material(material).is_none() {
            return Err(SceneError::InvalidComposition("material does not belong to this scene"));
        }
        if mesh.index_count() == 0 {
            return Err(SceneError::InvalidComposition("mesh has no indices"));
        }
        self.entities.push(Entity::new(mesh, material));
        Ok(EntityId(self.entities.len() - 1))
    }

    pub fn entity(&self, id: EntityId) -> Result<&Entity, SceneError> {
        self.entities.get(id.0).ok_or(SceneError::UnknownEntity(id))
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, SceneError> {
        self.entities.get_mut(id.0).ok_or(SceneError::UnknownEntity(id))
    }

    /// Entities in draw order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (EntityId(index), entity))
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Entity)> {
        self.entities
            .iter_mut()
            .enumerate()
            .map(|(index, entity)| (EntityId(index), entity))
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightSet {
        &mut self.lights
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn sky(&self) -> Option<&Sky> {
        self.sky.as_ref()
    }

    pub fn sky_mut(&mut self) -> Option<&mut Sky> {
        self.sky.as_mut()
    }

    pub fn set_sky(&mut self, sky: Option<Sky>) {
        self.sky = sky;
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    /// Frames updated so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Seconds since start, as of the last update.
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Advances the scene by one frame: moves the camera from input.
    pub fn update(&mut self, input: &Input, dt: f32, total: f32) {
        self.camera.update(input, dt);
        self.total_time = total;
        self.frame += 1;
    }

    /// Follows a window resize. Zero-sized dimensions (minimized windows) are
    /// ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.camera.update_projection_matrix(width as f32 / height as f32);
    }
}
