use glam::{Mat4, Vec3};

use crate::{clip::{clip_indexed, submit_indexed, ScreenVertex}, dmsmesh::{DmsModel, Mesh}, texture::{TextureInfo, TextureTable}};

/// Smallest |w| a projected vertex may have before it is pushed just behind the eye
const MIN_W: f32 = 1.0e-6;

/// Receives the vertex stream produced by [`MeshRenderer`]
pub trait VertexSink {
    /// Called before each mesh's vertices. `texture` is `None` for untextured meshes.
    fn begin_batch(&mut self, _texture: Option<&TextureInfo>) {}

    /// Append a vertex to the current strip. `end_of_strip` closes the strip after this vertex.
    fn submit(&mut self, vertex: &ScreenVertex, end_of_strip: bool);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderConfig {
    /// Distance of the near plane, compared against each vertex's w
    pub near_z: f32,
    /// ARGB colour given to every vertex
    pub color: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            near_z: 0.1,
            color: 0xFFFF_FFFF,
        }
    }
}

/// Counters for one or more draw calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub meshes_drawn: usize,
    pub meshes_culled: usize,
    pub meshes_clipped: usize,
    pub vertices_submitted: usize,
}

impl DrawStats {
    pub fn accumulate(self: &mut Self, other: &DrawStats) {
        self.meshes_drawn += other.meshes_drawn;
        self.meshes_culled += other.meshes_culled;
        self.meshes_clipped += other.meshes_clipped;
        self.vertices_submitted += other.vertices_submitted;
    }
}

/// Which path a mesh takes, decided by its bounding sphere against the near plane
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipDecision {
    Culled,
    Clipped,
    Unclipped,
}

/// Classify a bounding sphere given in model space. `w` varies across the sphere by at most
/// `radius * |mvp.row(3).xyz|`, so any scale in `mvp` widens the band.
pub fn classify_sphere(center: Vec3, radius: f32, mvp: &Mat4, near_z: f32) -> ClipDecision {
    let w = (*mvp * center.extend(1.0)).w;
    let w_radius = radius * mvp.row(3).truncate().length();

    if w + w_radius < near_z {
        ClipDecision::Culled
    } else if w - w_radius < near_z {
        ClipDecision::Clipped
    } else {
        ClipDecision::Unclipped
    }
}

/// Draws DMS models into a [`VertexSink`], clipping meshes which straddle the near plane
pub struct MeshRenderer {
    pub config: RenderConfig,
    scratch: Vec<ScreenVertex>,
}

impl MeshRenderer {
    pub fn new(config: RenderConfig) -> MeshRenderer {
        MeshRenderer {
            config,
            scratch: Vec::new(),
        }
    }

    /// Current capacity of the transformed-vertex arena
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    pub fn draw_model<S: VertexSink + ?Sized>(self: &mut Self, model: &DmsModel, mvp: &Mat4, textures: &TextureTable, sink: &mut S) -> DrawStats {
        let mut stats = DrawStats::default();

        for mesh in &model.meshes {
            let mesh_stats = self.draw_mesh(mesh, mvp, textures, sink);
            stats.accumulate(&mesh_stats);
        }

        stats
    }

    pub fn draw_mesh<S: VertexSink + ?Sized>(self: &mut Self, mesh: &Mesh, mvp: &Mat4, textures: &TextureTable, sink: &mut S) -> DrawStats {
        let mut stats = DrawStats::default();

        if mesh.is_empty() {
            return stats;
        }

        let near_z = self.config.near_z;
        let decision = classify_sphere(mesh.bounds.center, mesh.bounds.radius, mvp, near_z);

        if decision == ClipDecision::Culled {
            stats.meshes_culled = 1;
            return stats;
        }

        sink.begin_batch(textures.resolve(mesh.texture_id));
        self.transform_vertices(mesh, mvp);

        stats.meshes_drawn = 1;
        stats.vertices_submitted = if decision == ClipDecision::Clipped {
            stats.meshes_clipped = 1;
            clip_indexed(&self.scratch, &mesh.indices, near_z, sink)
        } else {
            submit_indexed(&self.scratch, &mesh.indices, sink)
        };

        stats
    }

    // project every vertex into the scratch arena (grown on demand, never shrunk)
    fn transform_vertices(self: &mut Self, mesh: &Mesh, mvp: &Mat4) {
        let color = self.config.color;

        self.scratch.clear();
        self.scratch.extend(mesh.render_vertices().iter().map(|v| {
            let clip = *mvp * v.position.extend(1.0);
            let mut w = clip.w;
            if w.abs() < MIN_W {
                w = -MIN_W;
            }

            ScreenVertex {
                position: Vec3::new(clip.x / w, clip.y / w, 1.0 / w),
                uv: v.uv,
                color,
            }
        }));
    }
}

/// A strip gathered by [`StripCollector`]
#[derive(Clone, Debug, PartialEq)]
pub struct CollectedStrip {
    pub texture: Option<u64>,
    pub vertices: Vec<ScreenVertex>,
}

/// [`VertexSink`] which buffers submitted geometry as a list of strips
#[derive(Default)]
pub struct StripCollector {
    pub strips: Vec<CollectedStrip>,
    texture: Option<u64>,
    current: Vec<ScreenVertex>,
}

impl StripCollector {
    pub fn new() -> StripCollector {
        StripCollector::default()
    }

    pub fn clear(self: &mut Self) {
        self.strips.clear();
        self.current.clear();
        self.texture = None;
    }

    pub fn vertex_count(&self) -> usize {
        self.strips.iter().map(|s| s.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.strips.iter().map(|s| s.vertices.len().saturating_sub(2)).sum()
    }
}

impl VertexSink for StripCollector {
    fn begin_batch(&mut self, texture: Option<&TextureInfo>) {
        self.texture = texture.map(|t| t.handle);
    }

    fn submit(&mut self, vertex: &ScreenVertex, end_of_strip: bool) {
        self.current.push(*vertex);

        if end_of_strip {
            self.strips.push(CollectedStrip {
                texture: self.texture,
                vertices: std::mem::take(&mut self.current),
            });
        }
    }
}
