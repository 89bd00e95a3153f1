//! Offline mesh preparation: vertex welding, stripification & keyframe reduction.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::{dmsmesh::{DmsModel, Mesh, Vertex}, error::{DmsError, DmsResult}, index_stream::{encode_strip_index, MAX_VERTEX_INDEX, STRIP_ID_MASK}, math::Transform, skeleton::{Animation, Skeleton}};

const RESTART_INDEX: u32 = u32::MAX;

/// A mesh as it comes out of an importer: plain vertices & a triangle list
#[derive(Clone, Debug, Default)]
pub struct SourceMesh {
    pub vertices: Vec<Vertex>,
    /// Triangle list. Empty means every three vertices form a triangle.
    pub indices: Vec<u32>,
    pub texture_id: i32,
}

/// An imported model prior to optimization
#[derive(Clone, Debug, Default)]
pub struct SourceModel {
    pub meshes: Vec<SourceMesh>,
    pub skeleton: Option<Skeleton>,
}

/// Welded vertices plus the strips & loose triangles covering them
#[derive(Clone, Debug, Default)]
pub struct TriStrips {
    pub vertices: Vec<Vertex>,
    pub strips: Vec<Vec<u32>>,
    pub loose_triangles: Vec<[u32;3]>,
    pub texture_id: i32,
}

impl TriStrips {
    pub fn triangle_count(&self) -> usize {
        self.strips.iter().map(|s| s.len().saturating_sub(2)).sum::<usize>() + self.loose_triangles.len()
    }
}

/// Per-channel change a frame must exceed to be kept
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyframeThresholds {
    pub position: f32,
    /// Compared against `1 - |dot(q0, q1)|`
    pub rotation: f32,
    pub scale: f32,
}

impl Default for KeyframeThresholds {
    fn default() -> Self {
        KeyframeThresholds {
            position: 0.001,
            rotation: 0.001,
            scale: 0.001,
        }
    }
}

// vertices match when they print identically at six decimals
fn vertex_key(v: &Vertex) -> String {
    format!("{:.6},{:.6},{:.6}|{:.6},{:.6}|{},{},{}|{},{:.6}",
        v.position.x, v.position.y, v.position.z,
        v.uv.x, v.uv.y,
        v.normal[0], v.normal[1], v.normal[2],
        v.bone_id, v.bone_weight)
}

/// Weld duplicate vertices, stripify the triangle list & join strips which share an edge
pub fn extract_tri_strips(mesh: &SourceMesh) -> DmsResult<TriStrips> {
    let mut result = TriStrips {
        texture_id: mesh.texture_id,
        ..Default::default()
    };

    let source_indices: Vec<u32> = if mesh.indices.is_empty() {
        (0..(mesh.vertices.len() / 3 * 3) as u32).collect()
    } else {
        mesh.indices.clone()
    };

    let mut vertex_map: HashMap<String, u32> = HashMap::new();
    let mut triangles: Vec<u32> = Vec::with_capacity(source_indices.len());

    for tri in source_indices.chunks_exact(3) {
        if tri.iter().any(|&i| i as usize >= mesh.vertices.len()) {
            warn!("Skipping triangle with out of range index: {:?}", tri);
            continue;
        }

        for &i in tri {
            let v = &mesh.vertices[i as usize];
            let next = result.vertices.len() as u32;
            let welded = *vertex_map.entry(vertex_key(v)).or_insert(next);
            if welded == next {
                result.vertices.push(*v);
            }
            triangles.push(welded);
        }
    }

    if triangles.is_empty() {
        return Ok(result);
    }

    let stripped = meshopt::stripify(&triangles, result.vertices.len(), RESTART_INDEX)
        .map_err(|e| DmsError::Stripify(e.to_string()))?;

    let mut strips = Vec::new();
    for run in stripped.split(|&i| i == RESTART_INDEX) {
        match run.len() {
            0..=2 => {}
            3 => result.loose_triangles.push([run[0], run[1], run[2]]),
            _ => strips.push(run.to_vec()),
        }
    }

    result.strips = join_strips(strips);

    debug!("Stripified {} triangles into {} strips + {} loose triangles ({} vertices welded from {})",
        triangles.len() / 3, result.strips.len(), result.loose_triangles.len(),
        result.vertices.len(), mesh.vertices.len());

    Ok(result)
}

// appending `tail[2..]` to `head` must leave every appended triangle with its original winding
fn can_join(head: &[u32], tail: &[u32]) -> bool {
    let n = head.len();
    let (a, b) = (head[n - 2], head[n - 1]);
    let even = (n - 2) % 2 == 0;

    let same = a == tail[0] && b == tail[1];
    let swapped = a == tail[1] && b == tail[0];

    (same && even) || (swapped && !even && tail.len() == 3)
}

/// Greedily merge strips where one strip's last edge starts another
pub fn join_strips(strips: Vec<Vec<u32>>) -> Vec<Vec<u32>> {
    let mut strips: Vec<Option<Vec<u32>>> = strips.into_iter()
        .filter(|s| s.len() >= 3)
        .map(Some)
        .collect();

    let mut heads: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (i, s) in strips.iter().enumerate() {
        if let Some(s) = s {
            heads.entry((s[0], s[1])).or_default().push(i);
        }
    }

    for i in 0..strips.len() {
        loop {
            let s1 = match &strips[i] {
                Some(v) => v,
                None => break,
            };

            let n = s1.len();
            let edges = [(s1[n - 2], s1[n - 1]), (s1[n - 1], s1[n - 2])];
            let candidate = edges.iter()
                .filter_map(|e| heads.get(e))
                .flatten()
                .copied()
                .find(|&j| j != i && strips[j].as_ref().map_or(false, |s2| can_join(s1, s2)));

            let j = match candidate {
                Some(v) => v,
                None => break,
            };

            if let Some(s2) = strips[j].take() {
                if let Some(s1) = strips[i].as_mut() {
                    s1.extend_from_slice(&s2[2..]);
                }
            }
        }
    }

    strips.into_iter().flatten().collect()
}

/// Pack strips (cycling strip ids 1..=127) followed by loose triangles into one index stream
pub fn pack_indices(strips: &[Vec<u32>], loose_triangles: &[[u32;3]]) -> DmsResult<Vec<u32>> {
    let total = strips.iter().map(|s| s.len()).sum::<usize>() + loose_triangles.len() * 3;
    let mut packed = Vec::with_capacity(total);

    for (n, strip) in strips.iter().enumerate() {
        let id = (n % STRIP_ID_MASK as usize) as u8 + 1;
        for &index in strip {
            if index > MAX_VERTEX_INDEX {
                return Err(DmsError::IndexOverflow(index));
            }
            packed.push(encode_strip_index(id, index));
        }
    }

    for &index in loose_triangles.iter().flatten() {
        if index > MAX_VERTEX_INDEX {
            return Err(DmsError::IndexOverflow(index));
        }
        packed.push(index);
    }

    Ok(packed)
}

/// Turn an imported mesh into its optimized, packed form
pub fn build_mesh(source: &SourceMesh) -> DmsResult<Mesh> {
    let strips = extract_tri_strips(source)?;
    let indices = pack_indices(&strips.strips, &strips.loose_triangles)?;
    Ok(Mesh::new(strips.vertices, indices, strips.texture_id))
}

pub fn build_model(source: SourceModel) -> DmsResult<DmsModel> {
    let mut meshes = Vec::with_capacity(source.meshes.len());

    for (i, src) in source.meshes.iter().enumerate() {
        let mesh = build_mesh(src)?;
        info!("Mesh {}: {} -> {} vertices, {} indices, {} triangles",
            i, src.vertices.len(), mesh.vertices.len(), mesh.indices.len(), mesh.triangle_count);
        meshes.push(mesh);
    }

    Ok(DmsModel::new(meshes, source.skeleton))
}

fn keyframe_needed(current: &Transform, last: &Transform, thresholds: &KeyframeThresholds) -> bool {
    if (current.translation - last.translation).length() > thresholds.position {
        return true;
    }

    if 1.0 - current.rotation.dot(last.rotation).abs() > thresholds.rotation {
        return true;
    }

    (current.scale - last.scale).length() > thresholds.scale
}

/// Drop frames which barely differ from the last kept frame. The first & last frames are always kept.
/// `poses` is frame-major and is compacted in place; returns the reduced frame count.
pub fn reduce_keyframes(poses: &mut Vec<Transform>, frame_count: usize, bone_count: usize, thresholds: &KeyframeThresholds) -> usize {
    if bone_count == 0 || frame_count < 2 || poses.len() < frame_count * bone_count {
        return frame_count;
    }

    let mut kept = vec![0usize];

    for frame in 1..frame_count {
        let last = *kept.last().unwrap_or(&0);
        let is_final = frame == frame_count - 1;

        let needed = is_final || (0..bone_count).any(|bone| {
            keyframe_needed(&poses[frame * bone_count + bone], &poses[last * bone_count + bone], thresholds)
        });

        if needed {
            kept.push(frame);
        }
    }

    let mut reduced = Vec::with_capacity(kept.len() * bone_count);
    for &frame in &kept {
        reduced.extend_from_slice(&poses[frame * bone_count..(frame + 1) * bone_count]);
    }
    *poses = reduced;

    kept.len()
}

/// Reduce an animation's keyframes in place
pub fn reduce_animation(anim: &mut Animation, thresholds: &KeyframeThresholds) {
    let before = anim.frame_count;
    anim.frame_count = reduce_keyframes(&mut anim.poses, anim.frame_count, anim.bone_count, thresholds);
    info!("Animation '{}': reduced from {} to {} frames", anim.name, before, anim.frame_count);
}
