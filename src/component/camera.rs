use glam::Mat4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn default() -> Camera {
        Camera {
            fov: 60.0,
            aspect: 640.0 / 480.0,
            near: 0.1,
            far: 1000.0,
        }
    }

    /// Right handed perspective projection, so clip-space w is the view-space depth
    pub fn projection(self: &Self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }
}
