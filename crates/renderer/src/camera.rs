//! Cameras the drawers classify objects against.

use engine_core::Transform;
use glam::{Mat4, Vec3, Vec4};

/// The three viewpoints an object is classified for each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraType {
    Player,
    /// Mirror camera of the water reflection pass.
    UwRefl,
    /// Light-space camera of the shadow pass.
    Shadow,
}

impl CameraType {
    pub const COUNT: usize = 3;
    /// Classification order. Shadow casting depends on the player result.
    pub const ALL: [CameraType; Self::COUNT] = [CameraType::Player, CameraType::UwRefl, CameraType::Shadow];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective { fov_degrees: f32, aspect: f32 },
    /// Used by the shadow camera.
    Orthographic { half_width: f32, half_height: f32 },
}

#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera transform (position and rotation).
    pub transform: Transform,
    pub projection: Projection,
    /// Near clipping plane.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            projection: Projection::Perspective {
                fov_degrees: 45.0,
                aspect: 16.0 / 9.0,
            },
            near: 1.0,
            far: 20000.0,
        }
    }
}

impl Camera {
    /// Create a new camera at the given position.
    pub fn new(position: Vec3) -> Self {
        Self {
            transform: Transform::from_position(position),
            ..Default::default()
        }
    }

    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let mut cam = Self::new(position);
        cam.transform.look_at(target, Vec3::Y);
        cam
    }

    pub fn orthographic(position: Vec3, target: Vec3, half_size: f32) -> Self {
        let mut cam = Self::looking_at(position, target);
        cam.projection = Projection::Orthographic {
            half_width: half_size,
            half_height: half_size,
        };
        cam
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        let eye = self.transform.position;
        let target = eye + self.transform.forward();
        Mat4::look_at_rh(eye, target, self.transform.up())
    }

    /// Get the projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_degrees, aspect } => {
                Mat4::perspective_rh(fov_degrees.to_radians(), aspect, self.near, self.far)
            }
            Projection::Orthographic { half_width, half_height } => Mat4::orthographic_rh(
                -half_width,
                half_width,
                -half_height,
                half_height,
                self.near,
                self.far,
            ),
        }
    }

    /// Get the combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get camera position.
    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    /// Get camera forward direction.
    pub fn forward(&self) -> Vec3 {
        self.transform.forward()
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection_matrix())
    }

    /// Sphere visibility test.
    pub fn in_view(&self, center: Vec3, radius: f32) -> bool {
        self.frustum().contains_sphere(center, radius)
    }

    /// Distance along the view direction, the metric LOD selection uses.
    pub fn projected_distance(&self, point: Vec3) -> f32 {
        (point - self.position()).dot(self.forward())
    }
}

/// Six clip planes `(normal, d)` with normals pointing inwards.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Planes extracted from a `[0, 1]` depth-range view-projection matrix.
    pub fn from_view_projection(m: &Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        let mut planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2];
        for p in &mut planes {
            let len = p.truncate().length();
            if len > 0.0 {
                *p /= len;
            }
        }
        Self { planes }
    }

    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes.iter().all(|p| p.truncate().dot(center) + p.w >= -radius)
    }
}

/// Player, reflection and shadow cameras of the current frame.
#[derive(Debug, Clone)]
pub struct CameraSet {
    cameras: [Camera; CameraType::COUNT],
}

impl CameraSet {
    pub fn new(player: Camera, uw_refl: Camera, shadow: Camera) -> Self {
        Self {
            cameras: [player, uw_refl, shadow],
        }
    }

    /// Reflection camera mirrored below the water plane, shadow camera straight above.
    pub fn from_player(player: Camera) -> Self {
        let mut refl = player.clone();
        refl.transform.position.y = -refl.transform.position.y;
        let fwd = player.forward();
        let target = refl.transform.position + Vec3::new(fwd.x, -fwd.y, fwd.z);
        refl.transform.look_at(target, Vec3::Y);

        let focus = player.position() + player.forward() * 500.0;
        let shadow = Camera::orthographic(focus + Vec3::new(0.0, 5000.0, 1.0), focus, 4000.0);
        Self::new(player, refl, shadow)
    }

    pub fn get(&self, cam_type: CameraType) -> &Camera {
        &self.cameras[cam_type.index()]
    }

    pub fn get_mut(&mut self, cam_type: CameraType) -> &mut Camera {
        &mut self.cameras[cam_type.index()]
    }
}

impl Default for CameraSet {
    fn default() -> Self {
        Self::from_player(Camera::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward_camera() -> Camera {
        Camera::looking_at(Vec3::new(0.0, 100.0, 0.0), Vec3::new(0.0, 100.0, -100.0))
    }

    #[test]
    fn sphere_ahead_is_in_view() {
        let cam = forward_camera();
        assert!(cam.in_view(Vec3::new(0.0, 100.0, -300.0), 10.0));
    }

    #[test]
    fn sphere_behind_is_culled() {
        let cam = forward_camera();
        assert!(!cam.in_view(Vec3::new(0.0, 100.0, 300.0), 10.0));
    }

    #[test]
    fn large_radius_straddling_a_plane_is_kept() {
        let cam = forward_camera();
        // Just behind the near plane, but the radius reaches into the frustum.
        assert!(cam.in_view(Vec3::new(0.0, 100.0, 5.0), 20.0));
    }

    #[test]
    fn projected_distance_runs_along_view_axis() {
        let cam = forward_camera();
        let d = cam.projected_distance(Vec3::new(50.0, 100.0, -200.0));
        assert!((d - 200.0).abs() < 1e-3);
    }

    #[test]
    fn orthographic_shadow_camera_sees_ground_below() {
        let shadow = Camera::orthographic(Vec3::new(0.0, 5000.0, 1.0), Vec3::ZERO, 1000.0);
        assert!(shadow.in_view(Vec3::new(200.0, 0.0, 200.0), 5.0));
        assert!(!shadow.in_view(Vec3::new(3000.0, 0.0, 0.0), 5.0));
    }
}
