use std::sync::Arc;

use log::{info, warn};

use crate::dmsmesh::DmsModel;

/// Pixel formats a texture loader may hand back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgb565,
    Argb1555,
    Argb4444,
    Rgba8888,
}

/// Represents a texture owned by the host's texture loader
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureInfo {
    /// Opaque handle understood by the rasterizer
    pub handle: u64,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Loads the textures a model refers to by slot number
pub trait TextureSource {
    fn load_slot(&mut self, slot: usize) -> Option<TextureInfo>;

    /// Texture substituted for slots which fail to load
    fn load_default(&mut self) -> Option<TextureInfo>;
}

/// Textures resolved for one model, indexed by mesh texture id
pub struct TextureTable {
    slots: Vec<Option<Arc<TextureInfo>>>,
    default: Option<Arc<TextureInfo>>,
}

impl TextureTable {
    pub fn empty() -> TextureTable {
        TextureTable {
            slots: Vec::new(),
            default: None,
        }
    }

    /// Load every texture slot the model references. Slots which fail to load share the default texture.
    pub fn load<T: TextureSource + ?Sized>(model: &DmsModel, source: &mut T) -> TextureTable {
        let slot_count = model.texture_slot_count();
        let mut table = TextureTable::empty();
        let mut default_tried = false;
        let mut loaded = 0;

        info!("Loading {} textures for model", slot_count);

        for slot in 0..slot_count {
            match source.load_slot(slot) {
                Some(tex) => {
                    table.slots.push(Some(Arc::new(tex)));
                    loaded += 1;
                }
                None => {
                    if !default_tried {
                        table.default = source.load_default().map(Arc::new);
                        default_tried = true;
                    }

                    warn!("Failed to load texture {}, {}", slot,
                        if table.default.is_some() { "using default" } else { "no default available" });
                    table.slots.push(table.default.clone());
                }
            }
        }

        info!("Loaded {}/{} textures", loaded, slot_count);

        table
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn default_texture(&self) -> Option<&TextureInfo> {
        self.default.as_deref()
    }

    /// Texture to bind for a mesh. Negative ids are untextured; unknown ids fall back to the default.
    pub fn resolve(&self, texture_id: i32) -> Option<&TextureInfo> {
        if texture_id < 0 {
            return None;
        }

        match self.slots.get(texture_id as usize) {
            Some(slot) => slot.as_deref().or(self.default.as_deref()),
            None => self.default.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::*;
    use crate::dmsmesh::{Mesh, Vertex};

    struct FakeSource {
        missing: Vec<usize>,
        has_default: bool,
        default_loads: usize,
    }

    fn tex(handle: u64) -> TextureInfo {
        TextureInfo { handle, width: 64, height: 64, format: TextureFormat::Rgb565 }
    }

    impl TextureSource for FakeSource {
        fn load_slot(&mut self, slot: usize) -> Option<TextureInfo> {
            if self.missing.contains(&slot) {
                None
            } else {
                Some(tex(slot as u64 + 1))
            }
        }

        fn load_default(&mut self) -> Option<TextureInfo> {
            self.default_loads += 1;
            if self.has_default { Some(tex(999)) } else { None }
        }
    }

    fn model_with_ids(ids: &[i32]) -> DmsModel {
        let meshes = ids.iter().map(|id| {
            let v = Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO);
            Mesh::new(vec![v; 3], vec![], *id)
        }).collect();
        DmsModel::new(meshes, None)
    }

    #[test]
    fn missing_slots_use_shared_default() {
        let model = model_with_ids(&[0, 3]);
        let mut source = FakeSource { missing: vec![1, 2], has_default: true, default_loads: 0 };
        let table = TextureTable::load(&model, &mut source);

        assert_eq!(table.slot_count(), 4);
        assert_eq!(source.default_loads, 1);
        assert_eq!(table.resolve(0).map(|t| t.handle), Some(1));
        assert_eq!(table.resolve(1).map(|t| t.handle), Some(999));
        assert_eq!(table.resolve(2).map(|t| t.handle), Some(999));
        assert_eq!(table.resolve(3).map(|t| t.handle), Some(4));
        assert_eq!(table.resolve(-1), None);
    }

    #[test]
    fn out_of_range_ids_fall_back_to_default() {
        let model = model_with_ids(&[0]);
        let mut source = FakeSource { missing: vec![0], has_default: false, default_loads: 0 };
        let table = TextureTable::load(&model, &mut source);

        assert_eq!(table.resolve(0), None);
        assert_eq!(table.resolve(7), None);
        assert_eq!(TextureTable::empty().resolve(0), None);
    }
}
