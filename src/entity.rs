use crate::material::MaterialId;
use crate::mesh::Mesh;
use crate::transform::Transform;

/// Index of an entity inside its owning [`Scene`](crate::Scene).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) usize);

/// A drawable object: its own transform plus shared geometry and material.
///
/// Created through [`Scene::spawn`](crate::Scene::spawn), which checks that the
/// mesh and material resolve. Mesh and material never change afterwards.
#[derive(Clone, Debug)]
pub struct Entity {
    transform: Transform,
    mesh: Mesh,
    material: MaterialId,
}

impl Entity {
    pub(crate) fn new(mesh: Mesh, material: MaterialId) -> Self {
        Self {
            transform: Transform::new(),
            mesh,
            material,
        }
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn mesh(&self) -> Mesh {
        self.mesh
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }
}
