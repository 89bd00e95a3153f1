//! Runtime & tooling for the DMS model format: loading/saving, skeletal animation,
//! CPU skinning, near-plane clipping and offline mesh optimization.

extern crate byteorder;

pub mod error;
pub mod math;
pub mod index_stream;
pub mod skeleton;
pub mod skinning;
pub mod dmsmesh;
pub mod dms_file;
pub mod clip;
pub mod renderer;
pub mod texture;
pub mod optimize;
#[cfg(feature = "convert")]
pub mod gltf_import;

pub mod component {
    pub mod camera;
    pub mod model;
    pub mod transform3d;
}

pub mod system {
    pub mod anim_system;
    pub mod render_system;
}

pub use dmsmesh::{DmsModel, Mesh, Vertex};
pub use error::{DmsError, DmsResult};
pub use renderer::{MeshRenderer, RenderConfig, VertexSink};
pub use skeleton::Skeleton;

/// Frame timing handed to the per-frame systems
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeData {
    pub delta_time: f32,
    pub total_time: f32,
}
