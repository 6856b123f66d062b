//! A first-person free-fly camera.
//!
//! [`Camera`] owns a [`Transform`] and derives two matrices from it:
//!
//! - **view**: right-handed look-to from the transform's position along its
//!   forward axis (-Z unrotated), with world +Y as up. Cached and rebuilt only
//!   when the transform changed.
//! - **projection**: perspective (vertical field of view) or orthographic
//!   (fixed vertical extent). Rebuilt only at construction and by
//!   [`Camera::update_projection_matrix`], so reading it never changes it.
//!
//! # Controls
//!
//! [`Camera::update`] applies:
//!
//! | Input            | Effect                                  |
//! |------------------|-----------------------------------------|
//! | W / S            | Move along the view direction           |
//! | A / D            | Strafe along the camera's right axis    |
//! | Space / ShiftLeft| Move along world up / down              |
//! | Control (held)   | Multiply movement by `fast_multiplier`  |
//! | Mouse            | Yaw and pitch, pitch clamped below ±90° |
//!
//! Mouse look can be restricted to while a button is held, see
//! [`CameraConfig::mouse_look_button`].

use std::f32::consts::{FRAC_PI_2, FRAC_PI_3};

use glam::{Mat3, Mat4, Vec3};
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use crate::input::Input;
use crate::transform::Transform;

const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// How the camera maps view space to clip space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective,
    /// Orthographic with `height` world units visible vertically.
    Orthographic { height: f32 },
}

/// Initial state and tuning for a [`Camera`].
#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub aspect: f32,
    pub position: Vec3,
    /// Pitch, yaw, roll in radians.
    pub rotation: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// World units per second.
    pub move_speed: f32,
    /// Radians per pixel of mouse movement.
    pub look_speed: f32,
    pub fast_multiplier: f32,
    pub projection: Projection,
    /// When set, the mouse only turns the camera while this button is held.
    pub mouse_look_button: Option<MouseButton>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            aspect: 16.0 / 9.0,
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Vec3::ZERO,
            fov: FRAC_PI_3,
            near: 0.01,
            far: 1000.0,
            move_speed: 5.0,
            look_speed: 0.003,
            fast_multiplier: 4.0,
            projection: Projection::Perspective,
            mouse_look_button: Some(MouseButton::Left),
        }
    }
}

impl CameraConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn position(mut self, position: impl Into<Vec3>) -> Self {
        self.position = position.into();
        self
    }

    /// Initial pitch, yaw and roll in radians.
    pub fn rotation(mut self, pitch: f32, yaw: f32, roll: f32) -> Self {
        self.rotation = Vec3::new(pitch, yaw, roll);
        self
    }

    pub fn fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    pub fn clip_planes(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn move_speed(mut self, speed: f32) -> Self {
        self.move_speed = speed;
        self
    }

    pub fn look_speed(mut self, speed: f32) -> Self {
        self.look_speed = speed;
        self
    }

    pub fn fast_multiplier(mut self, multiplier: f32) -> Self {
        self.fast_multiplier = multiplier;
        self
    }

    pub fn orthographic(mut self, height: f32) -> Self {
        self.projection = Projection::Orthographic { height };
        self
    }

    /// `None` turns the camera with every mouse movement.
    pub fn mouse_look_button(mut self, button: Option<MouseButton>) -> Self {
        self.mouse_look_button = button;
        self
    }
}

/// First-person camera with cached view and projection matrices.
#[derive(Clone, Debug)]
pub struct Camera {
    transform: Transform,
    fov: f32,
    near: f32,
    far: f32,
    aspect: f32,
    move_speed: f32,
    look_speed: f32,
    fast_multiplier: f32,
    projection_kind: Projection,
    mouse_look_button: Option<MouseButton>,
    view: Mat4,
    view_revision: Option<u64>,
    projection: Mat4,
    projection_updates: u64,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraConfig::default())
    }
}

impl Camera {
    pub fn new(config: CameraConfig) -> Self {
        let mut transform = Transform::new();
        transform.set_position(config.position.x, config.position.y, config.position.z);
        transform.set_rotation(
            config.rotation.x.clamp(-PITCH_LIMIT, PITCH_LIMIT),
            config.rotation.y,
            config.rotation.z,
        );

        let mut camera = Self {
            transform,
            fov: config.fov,
            near: config.near,
            far: config.far,
            aspect: config.aspect,
            move_speed: config.move_speed,
            look_speed: config.look_speed,
            fast_multiplier: config.fast_multiplier,
            projection_kind: config.projection,
            mouse_look_button: config.mouse_look_button,
            view: Mat4::IDENTITY,
            view_revision: None,
            projection: Mat4::IDENTITY,
            projection_updates: 0,
        };
        camera.update_projection_matrix(config.aspect);
        camera
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Direct access for scripted movement. The view matrix follows on next read.
    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position()
    }

    /// Unit view direction.
    pub fn forward(&self) -> Vec3 {
        self.transform.forward()
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn projection_kind(&self) -> Projection {
        self.projection_kind
    }

    /// Integrates one frame of keyboard and mouse input.
    pub fn update(&mut self, input: &Input, dt: f32) {
        let look_enabled = self
            .mouse_look_button
            .is_none_or(|button| input.mouse_down(button));
        let delta = input.mouse_delta();
        if look_enabled && delta != glam::Vec2::ZERO {
            let rotation = self.transform.pitch_yaw_roll();
            let pitch = (rotation.x - delta.y * self.look_speed).clamp(-PITCH_LIMIT, PITCH_LIMIT);
            let yaw = rotation.y - delta.x * self.look_speed;
            self.transform.set_rotation(pitch, yaw, rotation.z);
        }

        let forward = self.transform.forward();
        let right = self.transform.right();
        let mut direction = Vec3::ZERO;
        if input.key_down(KeyCode::KeyW) {
            direction += forward;
        }
        if input.key_down(KeyCode::KeyS) {
            direction -= forward;
        }
        if input.key_down(KeyCode::KeyD) {
            direction += right;
        }
        if input.key_down(KeyCode::KeyA) {
            direction -= right;
        }
        if input.key_down(KeyCode::Space) {
            direction += Vec3::Y;
        }
        if input.key_down(KeyCode::ShiftLeft) {
            direction -= Vec3::Y;
        }

        if direction != Vec3::ZERO {
            let mut speed = self.move_speed;
            if input.key_down(KeyCode::ControlLeft) || input.key_down(KeyCode::ControlRight) {
                speed *= self.fast_multiplier;
            }
            let step = direction.normalize() * speed * dt;
            self.transform.move_absolute(step.x, step.y, step.z);
        }
    }

    /// Rebuilds the projection for a new aspect ratio (width / height).
    pub fn update_projection_matrix(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.projection = match self.projection_kind {
            Projection::Perspective => Mat4::perspective_rh(self.fov, aspect, self.near, self.far),
            Projection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        };
        self.projection_updates += 1;
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    /// Number of projection rebuilds, including the one at construction.
    pub fn projection_update_count(&self) -> u64 {
        self.projection_updates
    }

    /// The world-to-view matrix, rebuilt only if the transform changed.
    pub fn view_matrix(&mut self) -> Mat4 {
        let revision = self.transform.revision();
        if self.view_revision != Some(revision) {
            self.view = Mat4::look_to_rh(self.transform.position(), self.transform.forward(), Vec3::Y);
            self.view_revision = Some(revision);
        }
        self.view
    }

    /// The view matrix without its translation, for geometry that should
    /// stay centered on the eye (skyboxes).
    pub fn view_rotation_only(&mut self) -> Mat4 {
        Mat4::from_mat3(Mat3::from_mat4(self.view_matrix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec4};

    fn still(config: CameraConfig) -> Camera {
        Camera::new(config.mouse_look_button(None))
    }

    #[test]
    fn projection_is_stable_for_same_aspect() {
        let mut camera = Camera::default();
        camera.update_projection_matrix(1.5);
        let first = camera.projection_matrix();
        camera.update_projection_matrix(1.5);
        let second = camera.projection_matrix();
        assert_eq!(first.to_cols_array(), second.to_cols_array());
        assert_eq!(camera.projection_update_count(), 3);
    }

    #[test]
    fn aspect_changes_only_horizontal_scale() {
        let mut camera = Camera::default();
        camera.update_projection_matrix(1.0);
        let square = camera.projection_matrix().to_cols_array();
        camera.update_projection_matrix(2.0);
        let wide = camera.projection_matrix().to_cols_array();

        assert_ne!(square[0], wide[0]);
        assert!((square[0] / wide[0] - 2.0).abs() < 1e-6);
        for i in 1..16 {
            assert_eq!(square[i], wide[i], "element {i}");
        }
    }

    #[test]
    fn reading_matrices_does_not_rebuild_projection() {
        let mut camera = Camera::default();
        let _ = camera.view_matrix();
        let _ = camera.projection_matrix();
        assert_eq!(camera.projection_update_count(), 1);
    }

    #[test]
    fn view_is_cached_until_transform_changes() {
        let mut camera = Camera::default();
        let first = camera.view_matrix();
        let revision = camera.view_revision;
        let again = camera.view_matrix();
        assert_eq!(first, again);
        assert_eq!(camera.view_revision, revision);

        camera.transform_mut().move_absolute(1.0, 0.0, 0.0);
        let moved = camera.view_matrix();
        assert_ne!(first, moved);
    }

    #[test]
    fn default_camera_looks_at_origin() {
        let mut camera = Camera::default();
        let view = camera.view_matrix();
        let origin = view.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));

        let clip = camera.projection_matrix() * Vec4::from((origin, 1.0));
        assert!(clip.x.abs() < 1e-5 && clip.y.abs() < 1e-5);
        assert!(clip.z / clip.w > 0.0 && clip.z / clip.w < 1.0);
    }

    #[test]
    fn wasd_moves_along_view_direction() {
        let mut camera = still(CameraConfig::new().position(Vec3::ZERO).move_speed(2.0));
        let mut input = Input::new();
        input.press_key(KeyCode::KeyW);
        camera.update(&input, 0.5);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));

        input.release_key(KeyCode::KeyW);
        input.press_key(KeyCode::KeyD);
        camera.update(&input, 0.5);
        assert!(camera.position().abs_diff_eq(Vec3::new(1.0, 0.0, -1.0), 1e-5));

        input.press_key(KeyCode::ControlLeft);
        input.release_key(KeyCode::KeyD);
        input.press_key(KeyCode::Space);
        camera.update(&input, 0.5);
        assert!(camera.position().abs_diff_eq(Vec3::new(1.0, 4.0, -1.0), 1e-5));
    }

    #[test]
    fn mouse_right_turns_right() {
        let mut camera = still(CameraConfig::new().look_speed(0.01));
        let mut input = Input::new();
        input.move_cursor(Vec2::ZERO);
        input.move_cursor(Vec2::new(10.0, 0.0));
        camera.update(&input, 0.016);
        // Yaw went negative, so forward swung toward +X.
        assert!(camera.forward().x > 0.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = still(CameraConfig::new().look_speed(1.0));
        let mut input = Input::new();
        input.move_cursor(Vec2::ZERO);
        input.move_cursor(Vec2::new(0.0, -1000.0));
        camera.update(&input, 0.016);
        assert!((camera.transform().pitch_yaw_roll().x - PITCH_LIMIT).abs() < 1e-6);
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn look_button_gates_mouse() {
        let mut camera = Camera::new(CameraConfig::new().mouse_look_button(Some(MouseButton::Right)));
        let mut input = Input::new();
        input.move_cursor(Vec2::ZERO);
        input.move_cursor(Vec2::new(50.0, 0.0));
        camera.update(&input, 0.016);
        assert_eq!(camera.transform().pitch_yaw_roll(), Vec3::ZERO);

        input.press_button(MouseButton::Right);
        camera.update(&input, 0.016);
        assert_ne!(camera.transform().pitch_yaw_roll().y, 0.0);
    }

    #[test]
    fn rotation_only_view_drops_translation() {
        let mut camera = Camera::new(CameraConfig::new().position(Vec3::new(3.0, 4.0, 5.0)));
        let view = camera.view_rotation_only();
        assert_eq!(view.w_axis, Vec4::W);
        assert!(view.transform_point3(Vec3::ZERO).abs_diff_eq(Vec3::ZERO, 1e-6));
    }

    #[test]
    fn orthographic_uses_vertical_extent() {
        let camera = Camera::new(CameraConfig::new().aspect(2.0).orthographic(10.0));
        let projection = camera.projection_matrix();
        let corner = projection.transform_point3(Vec3::new(10.0, 5.0, -1.0));
        assert!((corner.x - 1.0).abs() < 1e-5);
        assert!((corner.y - 1.0).abs() < 1e-5);
    }
}
