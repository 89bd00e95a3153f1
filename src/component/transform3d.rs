use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3D {
    pub position: Vec3,
    pub scale: Vec3,
    pub rotation: Quat
}

impl Transform3D {
    pub fn default() -> Transform3D {
        Transform3D {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY
        }
    }

    pub fn with_position(self: &Self, new_position: Vec3) -> Transform3D {
        let mut result = *self;
        result.position = new_position;
        result
    }

    pub fn with_scale(self: &Self, new_scale: Vec3) -> Transform3D {
        let mut result = *self;
        result.scale = new_scale;
        result
    }

    pub fn with_rotation(self: &Self, new_rotation: Quat) -> Transform3D {
        let mut result = *self;
        result.rotation = new_rotation;
        result
    }

    /// Object to world matrix
    pub fn matrix(self: &Self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// World to view matrix, treating this transform as a camera (scale ignored)
    pub fn view_matrix(self: &Self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }
}
