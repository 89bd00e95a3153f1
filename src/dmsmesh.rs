use glam::{Vec2, Vec3};
use log::debug;

use crate::{index_stream, skeleton::Skeleton, skinning::skin_mesh};

pub const DMS_MAGIC: u32 = 0x5453_4D44;
pub const DMS_VERSION: u32 = 1;

/// Represents a single mesh vertex. Normals are packed to signed bytes (unit length = 127).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: [i8;3],
    pub uv: Vec2,
    pub bone_id: u8,
    pub bone_weight: f32,
}

impl Vertex {
    /// Construct an unskinned vertex
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Vertex {
        Vertex {
            position,
            normal: pack_normal(normal),
            uv,
            bone_id: 0,
            bone_weight: 0.0,
        }
    }

    pub fn with_bone(self: &Self, bone_id: u8, bone_weight: f32) -> Vertex {
        Vertex {
            bone_id,
            bone_weight,
            ..*self
        }
    }

    pub fn unpacked_normal(&self) -> Vec3 {
        Vec3::new(
            self.normal[0] as f32 / 127.0,
            self.normal[1] as f32 / 127.0,
            self.normal[2] as f32 / 127.0,
        )
    }
}

/// Pack a unit normal into three signed bytes
pub fn pack_normal(n: Vec3) -> [i8;3] {
    let pack = |v: f32| (v * 127.0).round().clamp(-127.0, 127.0) as i8;
    [pack(n.x), pack(n.y), pack(n.z)]
}

/// Sphere enclosing a mesh's bind pose
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Centered on the vertex average, radius reaching the farthest vertex
    pub fn from_vertices(vertices: &[Vertex]) -> BoundingSphere {
        if vertices.is_empty() {
            return BoundingSphere { center: Vec3::ZERO, radius: 0.0 };
        }

        let center = vertices.iter().map(|v| v.position).sum::<Vec3>() / vertices.len() as f32;
        let radius_sq = vertices.iter()
            .map(|v| v.position.distance_squared(center))
            .fold(0.0f32, f32::max);

        BoundingSphere { center, radius: radius_sq.sqrt() }
    }
}

/// Represents one mesh of a DMS model
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Bind pose vertices
    pub vertices: Vec<Vertex>,
    /// Skinned copy of `vertices`, rewritten on every animation update. Empty for static meshes.
    pub animated_vertices: Vec<Vertex>,
    /// Packed strip/triangle index stream
    pub indices: Vec<u32>,
    /// Texture slot, or negative if the mesh is untextured
    pub texture_id: i32,
    pub triangle_count: usize,
    pub bounds: BoundingSphere,
    /// Float normals exactly as a static-layout file stored them. Written back verbatim when the
    /// count still matches `vertices`, otherwise the packed normals are expanded instead.
    pub file_normals: Option<Vec<Vec3>>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>, texture_id: i32) -> Mesh {
        let triangle_count = index_stream::triangle_count(&indices, vertices.len());
        let bounds = BoundingSphere::from_vertices(&vertices);

        Mesh {
            vertices,
            animated_vertices: Vec::new(),
            indices,
            texture_id,
            triangle_count,
            bounds,
            file_normals: None,
        }
    }

    pub fn with_file_normals(self, normals: Vec<Vec3>) -> Mesh {
        Mesh {
            file_normals: Some(normals),
            ..self
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertices to draw: the skinned copy when there is one, otherwise the bind pose
    pub fn render_vertices(&self) -> &[Vertex] {
        if self.animated_vertices.len() == self.vertices.len() && !self.animated_vertices.is_empty() {
            &self.animated_vertices
        } else {
            &self.vertices
        }
    }
}

/// A model loaded from (or destined for) a DMS file
#[derive(Clone, Debug)]
pub struct DmsModel {
    pub version: u32,
    pub meshes: Vec<Mesh>,
    pub skeleton: Option<Skeleton>,
}

impl DmsModel {
    /// Assemble a model. Skinned models get their animated vertices prepared from the bind pose.
    pub fn new(meshes: Vec<Mesh>, skeleton: Option<Skeleton>) -> DmsModel {
        DmsModel::with_version(DMS_VERSION, meshes, skeleton)
    }

    pub fn with_version(version: u32, meshes: Vec<Mesh>, skeleton: Option<Skeleton>) -> DmsModel {
        let mut model = DmsModel { version, meshes, skeleton };
        model.skin_meshes();

        for (i, mesh) in model.meshes.iter().enumerate() {
            debug!("Mesh {}: {} vertices, {} indices, {} triangles, bounds center={:?} radius={:.2}",
                i, mesh.vertices.len(), mesh.indices.len(), mesh.triangle_count, mesh.bounds.center, mesh.bounds.radius);
        }

        model
    }

    pub fn is_animated(&self) -> bool {
        self.skeleton.is_some()
    }

    /// Number of texture slots referenced by the meshes (1 + highest texture id, or 0)
    pub fn texture_slot_count(&self) -> usize {
        self.meshes.iter()
            .map(|m| m.texture_id)
            .max()
            .filter(|id| *id >= 0)
            .map_or(0, |id| id as usize + 1)
    }

    pub fn animation_count(&self) -> usize {
        self.skeleton.as_ref().map_or(0, |s| s.animations.len())
    }

    pub fn animation_name(&self, index: usize) -> Option<&str> {
        self.skeleton.as_ref()?.animations.get(index).map(|a| a.name.as_str())
    }

    /// Index of the playing animation, or `None` for static models
    pub fn current_animation(&self) -> Option<usize> {
        self.skeleton.as_ref().map(|s| s.current_animation())
    }

    pub fn set_animation(self: &mut Self, index: usize) -> bool {
        match &mut self.skeleton {
            Some(skel) => skel.set_animation(index),
            None => false,
        }
    }

    pub fn set_animation_by_name(self: &mut Self, name: &str) -> bool {
        match &mut self.skeleton {
            Some(skel) => match skel.find_animation(name) {
                Some(index) => skel.set_animation(index),
                None => false,
            },
            None => false,
        }
    }

    /// Advance the current animation by `delta_time` seconds & reskin every mesh
    pub fn update_animation(self: &mut Self, delta_time: f32) {
        if let Some(skel) = &mut self.skeleton {
            skel.tick(delta_time);
        }
        self.skin_meshes();
    }

    /// Reskin every mesh against the skeleton's current pose. Static models are left untouched.
    pub fn skin_meshes(self: &mut Self) {
        if let Some(skel) = &self.skeleton {
            for mesh in &mut self.meshes {
                skin_mesh(mesh, skel);
            }
        }
    }
}
