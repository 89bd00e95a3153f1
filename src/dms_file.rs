use std::{fs::File, io::{BufReader, BufWriter, Read, Write}, path::Path};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec2, Vec3};
use log::{info, warn};

use crate::{dmsmesh::{pack_normal, DmsModel, Mesh, Vertex, DMS_MAGIC}, error::{DmsError, DmsResult}, index_stream, math::{matrix_from_file, matrix_to_file, Transform}, skeleton::{Animation, Bone, Skeleton}};

const BONE_NAME_LEN: usize = 64;
const ANIM_NAME_LEN: usize = 32;

// counts come straight from the file, so don't trust them for up-front allocation
const MAX_PREALLOC: usize = 1 << 16;

fn capacity(count: usize) -> usize {
    count.min(MAX_PREALLOC)
}

fn read_count<R: Read>(reader: &mut R, what: &'static str) -> DmsResult<usize> {
    let value = reader.read_i32::<LittleEndian>()?;
    if value < 0 {
        return Err(DmsError::NegativeCount { what, value });
    }
    Ok(value as usize)
}

fn read_fixed_str<R: Read, const N: usize>(reader: &mut R, what: &'static str) -> DmsResult<String> {
    let mut buf = [0u8;N];
    reader.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(N);
    String::from_utf8(buf[..end].to_vec()).map_err(|_| DmsError::InvalidName { what })
}

fn write_fixed_str<W: Write, const N: usize>(writer: &mut W, s: &str) -> DmsResult<()> {
    let mut buf = [0u8;N];
    let bytes = s.as_bytes();
    let len = bytes.len().min(N - 1);
    buf[..len].copy_from_slice(&bytes[..len]);
    writer.write_all(&buf)?;
    Ok(())
}

fn read_vec3<R: Read>(reader: &mut R) -> DmsResult<Vec3> {
    let x = reader.read_f32::<LittleEndian>()?;
    let y = reader.read_f32::<LittleEndian>()?;
    let z = reader.read_f32::<LittleEndian>()?;
    Ok(Vec3::new(x, y, z))
}

fn write_vec3<W: Write>(writer: &mut W, v: Vec3) -> DmsResult<()> {
    writer.write_f32::<LittleEndian>(v.x)?;
    writer.write_f32::<LittleEndian>(v.y)?;
    writer.write_f32::<LittleEndian>(v.z)?;
    Ok(())
}

fn read_transform<R: Read>(reader: &mut R) -> DmsResult<Transform> {
    let translation = read_vec3(reader)?;

    let mut q = [0.0f32;4];
    reader.read_f32_into::<LittleEndian>(&mut q)?;

    let scale = read_vec3(reader)?;

    Ok(Transform::new(translation, Quat::from_array(q), scale))
}

fn write_transform<W: Write>(writer: &mut W, transform: &Transform) -> DmsResult<()> {
    write_vec3(writer, transform.translation)?;
    for c in transform.rotation.to_array() {
        writer.write_f32::<LittleEndian>(c)?;
    }
    write_vec3(writer, transform.scale)?;
    Ok(())
}

fn read_bone<R: Read>(reader: &mut R) -> DmsResult<Bone> {
    let name = read_fixed_str::<R, BONE_NAME_LEN>(reader, "bone")?;
    let parent = reader.read_i32::<LittleEndian>()?;
    let bind_pose = read_transform(reader)?;

    let mut inv_bind = [0.0f32;16];
    reader.read_f32_into::<LittleEndian>(&mut inv_bind)?;

    Ok(Bone::new(&name, parent, bind_pose, matrix_from_file(&inv_bind)))
}

fn read_animation<R: Read>(reader: &mut R, skeleton_bones: usize) -> DmsResult<Animation> {
    let name = read_fixed_str::<R, ANIM_NAME_LEN>(reader, "animation")?;
    let bone_count = reader.read_i32::<LittleEndian>()?;

    if bone_count < 0 || bone_count as usize != skeleton_bones {
        return Err(DmsError::BoneCountMismatch { animation: name, expected: skeleton_bones, found: bone_count });
    }

    let frame_count = read_count(reader, "frame")?;
    let duration = reader.read_f32::<LittleEndian>()?;

    let pose_count = frame_count * skeleton_bones;
    let mut poses = Vec::with_capacity(capacity(pose_count));
    for _ in 0..pose_count {
        poses.push(read_transform(reader)?);
    }

    Ok(Animation::new(&name, skeleton_bones, frame_count, duration, poses))
}

fn read_animated_vertex<R: Read>(reader: &mut R) -> DmsResult<Vertex> {
    let position = read_vec3(reader)?;

    let mut normal = [0i8;3];
    reader.read_i8_into(&mut normal)?;
    reader.read_u8()?;

    let u = reader.read_f32::<LittleEndian>()?;
    let v = reader.read_f32::<LittleEndian>()?;

    let bone_id = reader.read_u8()?;
    let mut pad = [0u8;3];
    reader.read_exact(&mut pad)?;

    let bone_weight = reader.read_f32::<LittleEndian>()?;

    Ok(Vertex { position, normal, uv: Vec2::new(u, v), bone_id, bone_weight })
}

// converter output stores byte-scale normals (-127..127) as floats, other writers store unit normals
fn pack_file_normal(n: Vec3) -> [i8;3] {
    if n.abs().max_element() > 1.0 + 1.0e-3 {
        let pack = |v: f32| v.round().clamp(-127.0, 127.0) as i8;
        [pack(n.x), pack(n.y), pack(n.z)]
    } else {
        pack_normal(n)
    }
}

fn read_static_vertex<R: Read>(reader: &mut R) -> DmsResult<(Vertex, Vec3)> {
    let position = read_vec3(reader)?;
    let normal = read_vec3(reader)?;
    let u = reader.read_f32::<LittleEndian>()?;
    let v = reader.read_f32::<LittleEndian>()?;

    let vertex = Vertex {
        position,
        normal: pack_file_normal(normal),
        uv: Vec2::new(u, v),
        bone_id: 0,
        bone_weight: 0.0,
    };
    Ok((vertex, normal))
}

fn write_animated_vertex<W: Write>(writer: &mut W, vertex: &Vertex) -> DmsResult<()> {
    write_vec3(writer, vertex.position)?;
    for n in vertex.normal {
        writer.write_i8(n)?;
    }
    writer.write_u8(0)?;
    writer.write_f32::<LittleEndian>(vertex.uv.x)?;
    writer.write_f32::<LittleEndian>(vertex.uv.y)?;
    writer.write_u8(vertex.bone_id)?;
    writer.write_all(&[0u8;3])?;
    writer.write_f32::<LittleEndian>(vertex.bone_weight)?;
    Ok(())
}

fn write_static_vertex<W: Write>(writer: &mut W, vertex: &Vertex, normal: Vec3) -> DmsResult<()> {
    write_vec3(writer, vertex.position)?;
    write_vec3(writer, normal)?;
    writer.write_f32::<LittleEndian>(vertex.uv.x)?;
    writer.write_f32::<LittleEndian>(vertex.uv.y)?;
    Ok(())
}

fn read_mesh<R: Read>(reader: &mut R, mesh_index: usize, animated: bool) -> DmsResult<Mesh> {
    let vertex_count = reader.read_u32::<LittleEndian>()? as usize;
    let index_count = reader.read_u32::<LittleEndian>()? as usize;
    let texture_id = reader.read_i32::<LittleEndian>()?;

    let mut vertices = Vec::with_capacity(capacity(vertex_count));
    let mut file_normals = Vec::new();
    for _ in 0..vertex_count {
        if animated {
            vertices.push(read_animated_vertex(reader)?);
        } else {
            let (vertex, normal) = read_static_vertex(reader)?;
            vertices.push(vertex);
            file_normals.push(normal);
        }
    }

    let mut indices = Vec::with_capacity(capacity(index_count));
    for _ in 0..index_count {
        let raw = reader.read_u32::<LittleEndian>()?;
        let index = index_stream::vertex_index(raw);

        if index as usize >= vertex_count {
            return Err(DmsError::IndexOutOfRange { mesh: mesh_index, index, vertex_count });
        }

        indices.push(raw);
    }

    let mesh = Mesh::new(vertices, indices, texture_id);
    if animated {
        Ok(mesh)
    } else {
        Ok(mesh.with_file_normals(file_normals))
    }
}

/// Parse a DMS model from a byte stream
pub fn read<R: Read>(reader: &mut R) -> DmsResult<DmsModel> {
    // nothing gets allocated until the magic checks out
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != DMS_MAGIC {
        return Err(DmsError::BadMagic { found: magic });
    }

    let version = reader.read_u32::<LittleEndian>()?;
    let mesh_count = reader.read_u32::<LittleEndian>()? as usize;
    let bone_count = reader.read_u32::<LittleEndian>()? as usize;

    let skeleton = if bone_count > 0 {
        let mut bones = Vec::with_capacity(capacity(bone_count));
        for _ in 0..bone_count {
            bones.push(read_bone(reader)?);
        }

        let anim_count = reader.read_u32::<LittleEndian>()? as usize;
        let mut animations = Vec::with_capacity(capacity(anim_count));
        for _ in 0..anim_count {
            animations.push(read_animation(reader, bone_count)?);
        }

        Some(Skeleton::new(bones, animations)?)
    } else {
        // static files still carry an (empty) animation count
        let anim_count = reader.read_u32::<LittleEndian>()?;
        if anim_count != 0 {
            return Err(DmsError::UnexpectedAnimations(anim_count));
        }
        None
    };

    let animated = skeleton.is_some();
    let mut meshes = Vec::with_capacity(capacity(mesh_count));
    for i in 0..mesh_count {
        meshes.push(read_mesh(reader, i, animated)?);
    }

    Ok(DmsModel::with_version(version, meshes, skeleton))
}

/// Serialize a model in DMS format. Skinned models use the animated vertex layout.
pub fn write<W: Write>(writer: &mut W, model: &DmsModel) -> DmsResult<()> {
    writer.write_u32::<LittleEndian>(DMS_MAGIC)?;
    writer.write_u32::<LittleEndian>(model.version)?;
    writer.write_u32::<LittleEndian>(model.meshes.len() as u32)?;

    match &model.skeleton {
        Some(skel) => {
            writer.write_u32::<LittleEndian>(skel.bones.len() as u32)?;

            for bone in &skel.bones {
                write_fixed_str::<W, BONE_NAME_LEN>(writer, &bone.name)?;
                writer.write_i32::<LittleEndian>(bone.parent)?;
                write_transform(writer, &bone.bind_pose)?;
                for m in matrix_to_file(&bone.inverse_bind) {
                    writer.write_f32::<LittleEndian>(m)?;
                }
            }

            writer.write_u32::<LittleEndian>(skel.animations.len() as u32)?;

            for anim in &skel.animations {
                write_fixed_str::<W, ANIM_NAME_LEN>(writer, &anim.name)?;
                writer.write_i32::<LittleEndian>(anim.bone_count as i32)?;
                writer.write_i32::<LittleEndian>(anim.frame_count as i32)?;
                writer.write_f32::<LittleEndian>(anim.duration)?;
                for pose in &anim.poses {
                    write_transform(writer, pose)?;
                }
            }
        }
        None => {
            writer.write_u32::<LittleEndian>(0)?;
            writer.write_u32::<LittleEndian>(0)?;
        }
    }

    let animated = model.is_animated();

    for mesh in &model.meshes {
        writer.write_u32::<LittleEndian>(mesh.vertices.len() as u32)?;
        writer.write_u32::<LittleEndian>(mesh.indices.len() as u32)?;
        writer.write_i32::<LittleEndian>(mesh.texture_id)?;

        let file_normals = mesh.file_normals.as_deref().filter(|n| n.len() == mesh.vertices.len());

        for (i, vertex) in mesh.vertices.iter().enumerate() {
            if animated {
                write_animated_vertex(writer, vertex)?;
            } else {
                let normal = file_normals.map_or_else(|| vertex.unpacked_normal(), |n| n[i]);
                write_static_vertex(writer, vertex, normal)?;
            }
        }

        for index in &mesh.indices {
            writer.write_u32::<LittleEndian>(*index)?;
        }
    }

    Ok(())
}

/// Load a DMS model from disk
pub fn load<P: AsRef<Path>>(path: P) -> DmsResult<DmsModel> {
    let path = path.as_ref();
    info!("Loading model: {}", path.display());

    let result = File::open(path)
        .map_err(DmsError::Io)
        .and_then(|f| read(&mut BufReader::new(f)));

    match &result {
        Ok(model) => {
            info!("Loaded {} meshes, {} bones, {} animations",
                model.meshes.len(),
                model.skeleton.as_ref().map_or(0, |s| s.bone_count()),
                model.animation_count());
        }
        Err(e) => {
            warn!("\t FAILED: {}", e);
        }
    }

    result
}

/// Save a DMS model to disk
pub fn save<P: AsRef<Path>>(model: &DmsModel, path: P) -> DmsResult<()> {
    let path = path.as_ref();
    info!("Saving model: {}", path.display());

    let file = File::create(path).map_err(DmsError::Io)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer, model)?;
    writer.flush()?;

    Ok(())
}
