//! glTF import for the converter. Produces a [`SourceModel`] ready for [`crate::optimize::build_model`].

use std::{collections::HashMap, path::Path};

use glam::{Mat4, Quat, Vec2, Vec3};
use gltf::{animation::{util::ReadOutputs, Interpolation, Property}, buffer, mesh::Mode, Document};
use log::{info, warn};

use crate::{dmsmesh::Vertex, error::{DmsError, DmsResult}, math::{slerp, Transform}, optimize::{reduce_animation, KeyframeThresholds, SourceMesh, SourceModel}, skeleton::{Animation, Bone, Skeleton}};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImportOptions {
    /// Frames per second animations are resampled at
    pub sample_rate: f32,
    pub thresholds: KeyframeThresholds,
    pub reduce_keyframes: bool,
    /// Ignore skins & animations, producing a static model
    pub static_only: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            sample_rate: 30.0,
            thresholds: KeyframeThresholds::default(),
            reduce_keyframes: true,
            static_only: false,
        }
    }
}

/// Imported skeleton plus the mapping from skin joint slots to bone indices
struct ImportedSkeleton {
    skeleton: Skeleton,
    joint_to_bone: Vec<usize>,
}

/// Order joints so every parent comes before its children. `parents` holds each joint's parent joint.
/// Returns the new position of every joint.
fn order_joints(parents: &[Option<usize>]) -> Vec<usize> {
    let depth = |mut j: usize| {
        let mut d = 0;
        while let Some(p) = parents[j] {
            d += 1;
            j = p;
            // cyclic hierarchies can't come out of a valid glTF, but don't spin on one
            if d > parents.len() {
                break;
            }
        }
        d
    };

    let mut order: Vec<usize> = (0..parents.len()).collect();
    order.sort_by_key(|&j| depth(j));

    let mut new_index = vec![0; parents.len()];
    for (pos, &joint) in order.iter().enumerate() {
        new_index[joint] = pos;
    }
    new_index
}

/// Sample a keyframe track at `time`, clamping outside the keyed range
fn sample_track<T: Copy>(times: &[f32], values: &[T], interpolation: Interpolation, time: f32, lerp: impl Fn(T, T, f32) -> T) -> Option<T> {
    let count = times.len().min(values.len());
    if count == 0 {
        return None;
    }

    if time <= times[0] {
        return Some(values[0]);
    }
    if time >= times[count - 1] {
        return Some(values[count - 1]);
    }

    let k = times[..count].windows(2).position(|w| w[0] <= time && time <= w[1])?;
    let span = times[k + 1] - times[k];
    let alpha = if span > 0.0 { ((time - times[k]) / span).clamp(0.0, 1.0) } else { 0.0 };

    match interpolation {
        Interpolation::Step => Some(values[k]),
        _ => Some(lerp(values[k], values[k + 1], alpha)),
    }
}

// cubic spline outputs are (in-tangent, value, out-tangent) triples; keep only the values
fn keyframe_values<T: Copy>(values: Vec<T>, interpolation: Interpolation) -> Vec<T> {
    match interpolation {
        Interpolation::CubicSpline => values.chunks_exact(3).map(|c| c[1]).collect(),
        _ => values,
    }
}

fn node_parents(doc: &Document) -> HashMap<usize, usize> {
    let mut parents = HashMap::new();
    for node in doc.nodes() {
        for child in node.children() {
            parents.insert(child.index(), node.index());
        }
    }
    parents
}

fn import_skeleton(doc: &Document, buffers: &[buffer::Data], options: &ImportOptions) -> DmsResult<Option<ImportedSkeleton>> {
    let skin = match doc.skins().next() {
        Some(v) => v,
        None => return Ok(None),
    };

    let joints: Vec<gltf::Node> = skin.joints().collect();
    if joints.is_empty() {
        return Ok(None);
    }

    let node_to_joint: HashMap<usize, usize> = joints.iter().enumerate().map(|(j, n)| (n.index(), j)).collect();
    let parents = node_parents(doc);
    let joint_parents: Vec<Option<usize>> = joints.iter()
        .map(|n| parents.get(&n.index()).and_then(|p| node_to_joint.get(p)).copied())
        .collect();

    let joint_to_bone = order_joints(&joint_parents);

    let reader = skin.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));
    let inverse_binds: Vec<Mat4> = match reader.read_inverse_bind_matrices() {
        Some(iter) => iter.map(|m| Mat4::from_cols_array_2d(&m)).collect(),
        None => vec![Mat4::IDENTITY; joints.len()],
    };

    let mut bones: Vec<Option<Bone>> = vec![None; joints.len()];
    for (j, node) in joints.iter().enumerate() {
        let (t, r, s) = node.transform().decomposed();
        let bind_pose = Transform::new(Vec3::from(t), Quat::from_array(r), Vec3::from(s));
        let parent = joint_parents[j].map_or(-1, |p| joint_to_bone[p] as i32);
        let name = node.name().map(|n| n.to_string()).unwrap_or_else(|| format!("bone_{}", j));
        let inverse_bind = inverse_binds.get(j).copied().unwrap_or(Mat4::IDENTITY);

        bones[joint_to_bone[j]] = Some(Bone::new(&name, parent, bind_pose, inverse_bind));
    }
    let bones: Vec<Bone> = bones.into_iter().flatten().collect();

    let mut animations = Vec::new();
    for (i, anim) in doc.animations().enumerate() {
        let name = anim.name().map(|n| n.to_string()).unwrap_or_else(|| format!("anim_{}", i));

        // first pass for the clip length
        let mut duration = 0.0f32;
        for channel in anim.channels() {
            let reader = channel.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));
            if let Some(inputs) = reader.read_inputs() {
                if let Some(last) = inputs.last() {
                    duration = duration.max(last);
                }
            }
        }

        let frame_count = (duration * options.sample_rate) as usize + 1;
        let bone_count = bones.len();

        let mut poses = Vec::with_capacity(frame_count * bone_count);
        for _ in 0..frame_count {
            poses.extend(bones.iter().map(|b| b.bind_pose));
        }

        for channel in anim.channels() {
            let target = channel.target();
            let bone = match node_to_joint.get(&target.node().index()) {
                Some(&j) => joint_to_bone[j],
                None => continue,
            };

            let interpolation = channel.sampler().interpolation();
            let reader = channel.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));
            let times: Vec<f32> = match reader.read_inputs() {
                Some(v) => v.collect(),
                None => continue,
            };
            let outputs = match reader.read_outputs() {
                Some(v) => v,
                None => continue,
            };

            match (target.property(), outputs) {
                (Property::Translation, ReadOutputs::Translations(it)) => {
                    let values = keyframe_values(it.map(Vec3::from).collect(), interpolation);
                    for frame in 0..frame_count {
                        let time = frame as f32 / options.sample_rate;
                        if let Some(v) = sample_track(&times, &values, interpolation, time, |a, b, t| a.lerp(b, t)) {
                            poses[frame * bone_count + bone].translation = v;
                        }
                    }
                }
                (Property::Rotation, ReadOutputs::Rotations(it)) => {
                    let values = keyframe_values(it.into_f32().map(|q| Quat::from_array(q).normalize()).collect(), interpolation);
                    for frame in 0..frame_count {
                        let time = frame as f32 / options.sample_rate;
                        if let Some(v) = sample_track(&times, &values, interpolation, time, slerp) {
                            poses[frame * bone_count + bone].rotation = v;
                        }
                    }
                }
                (Property::Scale, ReadOutputs::Scales(it)) => {
                    let values = keyframe_values(it.map(Vec3::from).collect(), interpolation);
                    for frame in 0..frame_count {
                        let time = frame as f32 / options.sample_rate;
                        if let Some(v) = sample_track(&times, &values, interpolation, time, |a, b, t| a.lerp(b, t)) {
                            poses[frame * bone_count + bone].scale = v;
                        }
                    }
                }
                _ => {}
            }
        }

        let mut animation = Animation::new(&name, bone_count, frame_count, duration, poses);
        if options.reduce_keyframes {
            reduce_animation(&mut animation, &options.thresholds);
        }
        animations.push(animation);
    }

    info!("Imported skeleton: {} bones, {} animations", bones.len(), animations.len());

    Ok(Some(ImportedSkeleton {
        skeleton: Skeleton::new(bones, animations)?,
        joint_to_bone,
    }))
}

fn import_mesh(mesh: &gltf::Mesh, buffers: &[buffer::Data], joint_to_bone: Option<&[usize]>) -> SourceMesh {
    let mut result = SourceMesh {
        texture_id: -1,
        ..Default::default()
    };

    for prim in mesh.primitives() {
        if prim.mode() != Mode::Triangles {
            warn!("Skipping non-triangle primitive in mesh {}", mesh.index());
            continue;
        }

        if let Some(info) = prim.material().pbr_metallic_roughness().base_color_texture() {
            result.texture_id = info.texture().source().index() as i32;
        }

        let reader = prim.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));
        let positions: Vec<Vec3> = match reader.read_positions() {
            Some(v) => v.map(Vec3::from).collect(),
            None => continue,
        };
        let count = positions.len();

        let normals: Vec<Vec3> = reader.read_normals().map_or(Vec::new(), |n| n.map(Vec3::from).collect());
        let uvs: Vec<Vec2> = reader.read_tex_coords(0).map_or(Vec::new(), |t| t.into_f32().map(Vec2::from).collect());
        let joints: Vec<[u16;4]> = reader.read_joints(0).map_or(Vec::new(), |j| j.into_u16().collect());
        let weights: Vec<[f32;4]> = reader.read_weights(0).map_or(Vec::new(), |w| w.into_f32().collect());

        let base = result.vertices.len() as u32;

        for i in 0..count {
            let mut vertex = Vertex::new(
                positions[i],
                normals.get(i).copied().unwrap_or(Vec3::ZERO),
                uvs.get(i).copied().unwrap_or(Vec2::ZERO),
            );

            if let (Some(map), Some(j), Some(w)) = (joint_to_bone, joints.get(i), weights.get(i)) {
                let bone = map.get(j[0] as usize).copied().unwrap_or(j[0] as usize);
                let bone_id = if bone > u8::MAX as usize {
                    warn!("Joint {} exceeds the 8 bit bone id range, clamping", bone);
                    u8::MAX
                } else {
                    bone as u8
                };
                vertex = vertex.with_bone(bone_id, w[0]);
            }

            result.vertices.push(vertex);
        }

        match reader.read_indices() {
            Some(indices) => result.indices.extend(indices.into_u32().map(|i| i + base)),
            None => result.indices.extend(base..base + count as u32),
        }
    }

    info!("Loaded mesh {} with {} vertices and {} indices", mesh.index(), result.vertices.len(), result.indices.len());

    result
}

/// Build a source model from an already parsed glTF document
pub fn import_document(doc: &Document, buffers: &[buffer::Data], options: &ImportOptions) -> DmsResult<SourceModel> {
    let skeleton = if options.static_only {
        None
    } else {
        import_skeleton(doc, buffers, options)?
    };

    let joint_to_bone = skeleton.as_ref().map(|s| s.joint_to_bone.as_slice());
    let meshes: Vec<SourceMesh> = doc.meshes().map(|m| import_mesh(&m, buffers, joint_to_bone)).collect();

    if meshes.is_empty() {
        return Err(DmsError::Import("document contains no meshes".to_string()));
    }

    Ok(SourceModel {
        meshes,
        skeleton: skeleton.map(|s| s.skeleton),
    })
}

/// Load a glTF/GLB file from disk
pub fn import_gltf<P: AsRef<Path>>(path: P, options: &ImportOptions) -> DmsResult<SourceModel> {
    let path = path.as_ref();
    info!("Loading glTF: {}", path.display());

    let (doc, buffers, _images) = gltf::import(path)?;
    import_document(&doc, &buffers, options)
}
