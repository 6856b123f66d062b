//! Spatial state for entities and cameras.
//!
//! [`Transform`] stores position, pitch/yaw/roll rotation and scale, and derives
//! the world matrix and its inverse-transpose on demand. Both matrices are cached
//! behind a dirty flag: every mutator marks the cache stale, every matrix accessor
//! rebuilds it first if needed.
//!
//! # Transformation Order
//!
//! A local point is **scaled**, then **rotated**, then **translated**. With glam's
//! column-vector convention the world matrix is `T * R * S`.
//!
//! ```
//! use tessera::{Transform, Vec3};
//!
//! let mut transform = Transform::new();
//! transform.set_position(10.0, 0.0, 0.0);
//! transform.set_scale(2.0, 1.0, 1.0);
//!
//! let world = transform.world_matrix();
//! assert_eq!(world.transform_point3(Vec3::X), Vec3::new(12.0, 0.0, 0.0));
//! ```
//!
//! # Rotation
//!
//! Rotation is stored as `(pitch, yaw, roll)` in radians: pitch about X, yaw about
//! Y, roll about Z. The object is rolled first, then pitched, then yawed
//! (`EulerRot::YXZ`). Angles are never wrapped or validated.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Position, rotation and scale with lazily rebuilt world matrices.
#[derive(Clone, Debug)]
pub struct Transform {
    position: Vec3,
    /// Pitch (X), yaw (Y), roll (Z) in radians.
    rotation: Vec3,
    scale: Vec3,
    world: Mat4,
    world_inverse_transpose: Mat4,
    dirty: bool,
    recomputes: u64,
    revision: u64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            world: Mat4::IDENTITY,
            world_inverse_transpose: Mat4::IDENTITY,
            dirty: true,
            recomputes: 0,
            revision: 0,
        }
    }
}

impl Transform {
    /// Creates an identity transform (origin, no rotation, unit scale).
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the position.
    pub fn set_position(&mut self, x: f32, y: f32, z: f32) {
        self.position = Vec3::new(x, y, z);
        self.invalidate();
    }

    /// Replaces the rotation with the given pitch, yaw and roll (radians).
    pub fn set_rotation(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.rotation = Vec3::new(pitch, yaw, roll);
        self.invalidate();
    }

    /// Replaces the scale factors.
    pub fn set_scale(&mut self, x: f32, y: f32, z: f32) {
        self.scale = Vec3::new(x, y, z);
        self.invalidate();
    }

    /// Offsets the position in world space.
    pub fn move_absolute(&mut self, dx: f32, dy: f32, dz: f32) {
        self.position += Vec3::new(dx, dy, dz);
        self.invalidate();
    }

    /// Offsets the position along the transform's own axes.
    ///
    /// `dz` is measured along local +Z, so moving "forward" is a negative `dz`
    /// (see [`Transform::forward`]).
    pub fn move_relative(&mut self, dx: f32, dy: f32, dz: f32) {
        self.position += self.orientation() * Vec3::new(dx, dy, dz);
        self.invalidate();
    }

    /// Adds to the current pitch, yaw and roll.
    pub fn rotate(&mut self, pitch: f32, yaw: f32, roll: f32) {
        self.rotation += Vec3::new(pitch, yaw, roll);
        self.invalidate();
    }

    /// Multiplies the current scale component-wise.
    pub fn scale(&mut self, x: f32, y: f32, z: f32) {
        self.scale *= Vec3::new(x, y, z);
        self.invalidate();
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Returns `(pitch, yaw, roll)` in radians.
    pub fn pitch_yaw_roll(&self) -> Vec3 {
        self.rotation
    }

    pub fn scale_factors(&self) -> Vec3 {
        self.scale
    }

    /// The rotation as a quaternion (roll, then pitch, then yaw).
    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.rotation.y, self.rotation.x, self.rotation.z)
    }

    /// Local forward axis in world space. Unrotated, this is -Z.
    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    /// Local right axis in world space. Unrotated, this is +X.
    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    /// Local up axis in world space. Unrotated, this is +Y.
    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::Y
    }

    /// The object-to-world matrix, rebuilt first if any component changed.
    pub fn world_matrix(&mut self) -> Mat4 {
        if self.dirty {
            self.update_matrices();
        }
        self.world
    }

    /// Inverse-transpose of the world matrix, for transforming normals.
    ///
    /// A zero scale component makes the world matrix singular; the result then
    /// contains non-finite values instead of failing.
    pub fn world_inverse_transpose_matrix(&mut self) -> Mat4 {
        if self.dirty {
            self.update_matrices();
        }
        self.world_inverse_transpose
    }

    /// True when the next matrix access will rebuild the cache.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of times the cached matrices have been rebuilt.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    /// Incremented by every mutator. Owners compare it to detect changes
    /// without touching the matrix cache.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn invalidate(&mut self) {
        self.dirty = true;
        self.revision = self.revision.wrapping_add(1);
    }

    fn update_matrices(&mut self) {
        let world = Mat4::from_scale_rotation_translation(
            self.scale,
            self.orientation(),
            self.position,
        );
        self.world = world;
        self.world_inverse_transpose = world.inverse().transpose();
        self.dirty = false;
        self.recomputes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx_eq(a: Vec3, b: Vec3) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn starts_as_identity() {
        let mut transform = Transform::new();
        assert_eq!(transform.position(), Vec3::ZERO);
        assert_eq!(transform.pitch_yaw_roll(), Vec3::ZERO);
        assert_eq!(transform.scale_factors(), Vec3::ONE);
        assert_eq!(transform.world_matrix(), Mat4::IDENTITY);
        assert_eq!(transform.world_inverse_transpose_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn cached_matrix_is_reused() {
        let mut transform = Transform::new();
        transform.set_position(1.0, 2.0, 3.0);
        transform.set_rotation(0.3, 0.7, -0.2);

        let first = transform.world_matrix();
        assert_eq!(transform.recompute_count(), 1);
        let second = transform.world_matrix();
        let _ = transform.world_inverse_transpose_matrix();

        assert_eq!(first.to_cols_array(), second.to_cols_array());
        assert_eq!(transform.recompute_count(), 1);
        assert!(!transform.is_dirty());
    }

    #[test]
    fn mutators_invalidate_the_cache() {
        let mut transform = Transform::new();
        let before = transform.world_matrix();

        transform.move_absolute(0.0, 1.0, 0.0);
        assert!(transform.is_dirty());
        let moved = transform.world_matrix();
        assert_ne!(before, moved);
        assert_eq!(moved.transform_point3(Vec3::ZERO), Vec3::Y);

        transform.rotate(0.0, 0.5, 0.0);
        let rotated = transform.world_matrix();
        assert_ne!(moved, rotated);

        transform.scale(2.0, 2.0, 2.0);
        let scaled = transform.world_matrix();
        assert_ne!(rotated, scaled);
        assert_eq!(transform.recompute_count(), 4);
    }

    #[test]
    fn scale_is_applied_before_translation() {
        let mut transform = Transform::new();
        transform.set_position(10.0, 0.0, 0.0);
        transform.set_scale(2.0, 1.0, 1.0);

        let world = transform.world_matrix();
        assert!(approx_eq(world.transform_point3(Vec3::X), Vec3::new(12.0, 0.0, 0.0)));
    }

    #[test]
    fn scale_then_rotate_then_translate() {
        let mut transform = Transform::new();
        transform.set_position(10.0, 0.0, 0.0);
        transform.set_rotation(0.0, FRAC_PI_2, 0.0);
        transform.set_scale(2.0, 1.0, 1.0);

        // (1,0,0) -> scaled (2,0,0) -> yawed 90 degrees (0,0,-2) -> translated.
        let world = transform.world_matrix();
        assert!(approx_eq(
            world.transform_point3(Vec3::X),
            Vec3::new(10.0, 0.0, -2.0)
        ));
    }

    #[test]
    fn inverse_transpose_keeps_orthogonal_normal() {
        let mut transform = Transform::new();
        transform.set_scale(2.0, 1.0, 1.0);

        let normal = transform
            .world_inverse_transpose_matrix()
            .transform_vector3(Vec3::Y)
            .normalize();
        assert!(approx_eq(normal, Vec3::Y));
    }

    #[test]
    fn inverse_transpose_corrects_skewed_normal() {
        let mut transform = Transform::new();
        transform.set_scale(2.0, 1.0, 1.0);

        // The surface x + y = 0 stretched along X becomes x/2 + y = 0.
        let normal = transform
            .world_inverse_transpose_matrix()
            .transform_vector3(Vec3::new(1.0, 1.0, 0.0))
            .normalize();
        assert!(approx_eq(normal, Vec3::new(0.5, 1.0, 0.0).normalize()));
    }

    #[test]
    fn zero_scale_yields_non_finite_inverse() {
        let mut transform = Transform::new();
        transform.set_scale(0.0, 1.0, 1.0);

        let inverse_transpose = transform.world_inverse_transpose_matrix();
        assert!(!inverse_transpose.is_finite());
    }

    #[test]
    fn move_relative_follows_orientation() {
        let mut transform = Transform::new();
        transform.set_rotation(0.0, FRAC_PI_2, 0.0);

        // Forward (-Z local) after a 90 degree yaw points along -X.
        transform.move_relative(0.0, 0.0, -1.0);
        assert!(approx_eq(transform.position(), Vec3::NEG_X));
        assert!(approx_eq(transform.forward(), Vec3::NEG_X));
        assert!(approx_eq(transform.right(), Vec3::NEG_Z));
    }

    #[test]
    fn revision_tracks_mutations() {
        let mut transform = Transform::new();
        let start = transform.revision();
        transform.set_position(1.0, 0.0, 0.0);
        transform.rotate(0.1, 0.0, 0.0);
        let _ = transform.world_matrix();
        assert_eq!(transform.revision(), start + 2);
    }
}
