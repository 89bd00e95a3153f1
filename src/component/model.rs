use crate::dmsmesh::DmsModel;

/// Represents an animated or static DMS model placed in the world
pub struct ModelInstance {
    /// Each instance owns its model, so animation state is per instance
    pub model: DmsModel,
    /// ARGB colour applied to every vertex
    pub tint: u32,
}

impl ModelInstance {
    pub fn new(model: DmsModel) -> ModelInstance {
        ModelInstance {
            model,
            tint: 0xFFFF_FFFF,
        }
    }

    pub fn with_tint(self, tint: u32) -> ModelInstance {
        ModelInstance {
            tint,
            ..self
        }
    }
}
