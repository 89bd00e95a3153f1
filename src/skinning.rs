use crate::{dmsmesh::Mesh, skeleton::Skeleton};

/// Recompute a mesh's animated vertices from its bind pose using the skeleton's current bone palette.
///
/// Each vertex follows at most one bone. Vertices with no weight, or whose bone id is out of range,
/// keep their bind pose position. Normals are carried over unchanged.
pub fn skin_mesh(mesh: &mut Mesh, skeleton: &Skeleton) {
    let palette = skeleton.bone_palette();

    if mesh.animated_vertices.len() != mesh.vertices.len() {
        mesh.animated_vertices = mesh.vertices.clone();
    }

    for (src, dst) in mesh.vertices.iter().zip(mesh.animated_vertices.iter_mut()) {
        *dst = *src;

        if src.bone_weight > 0.0 {
            if let Some(skin_mat) = palette.get(src.bone_id as usize) {
                dst.position = skin_mat.transform_point3(src.position);
            }
        }
    }
}
