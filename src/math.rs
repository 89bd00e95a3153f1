use glam::{Mat4, Quat, Vec3};

/// Above this quaternion dot product, slerp falls back to a normalized lerp
const NLERP_THRESHOLD: f32 = 0.95;

/// Translation, rotation & scale of a single bone
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Transform {
        Transform { translation, rotation, scale }
    }

    /// Local matrix of this transform: scale first, then rotation, then translation
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Interpolate towards `other` (lerp for translation & scale, shortest-path slerp for rotation)
    pub fn interpolate(&self, other: &Transform, alpha: f32) -> Transform {
        Transform {
            translation: self.translation.lerp(other.translation, alpha),
            rotation: slerp(self.rotation, other.rotation, alpha),
            scale: self.scale.lerp(other.scale, alpha),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::IDENTITY
    }
}

fn nlerp(from: Quat, to: Quat, amount: f32) -> Quat {
    (from + (to - from) * amount).normalize()
}

/// Spherical interpolation along the shortest arc between two unit quaternions
pub fn slerp(from: Quat, to: Quat, amount: f32) -> Quat {
    let mut to = to;
    let mut cos_half_theta = from.dot(to);

    if cos_half_theta < 0.0 {
        to = -to;
        cos_half_theta = -cos_half_theta;
    }

    if cos_half_theta >= 1.0 {
        return from;
    }

    if cos_half_theta > NLERP_THRESHOLD {
        return nlerp(from, to, amount);
    }

    let half_theta = cos_half_theta.acos();
    let sin_half_theta = (1.0 - cos_half_theta * cos_half_theta).sqrt();

    if sin_half_theta.abs() < f32::EPSILON {
        return from * 0.5 + to * 0.5;
    }

    let ratio_a = ((1.0 - amount) * half_theta).sin() / sin_half_theta;
    let ratio_b = (amount * half_theta).sin() / sin_half_theta;

    from * ratio_a + to * ratio_b
}

/// Build a matrix from its DMS file layout (stored row by row, translation in the last column)
pub fn matrix_from_file(values: &[f32; 16]) -> Mat4 {
    Mat4::from_cols_array(values).transpose()
}

/// Inverse of [`matrix_from_file`]
pub fn matrix_to_file(matrix: &Mat4) -> [f32; 16] {
    matrix.transpose().to_cols_array()
}
