use std::io::Cursor;

use dms_engine::{dms_file, dmsmesh::{DmsModel, Mesh, Vertex}, error::DmsError, index_stream::encode_strip_index, math::Transform, skeleton::{Animation, Bone, Skeleton}};
use glam::{Mat4, Quat, Vec2, Vec3};

fn strip_quad(texture_id: i32) -> Mesh {
    let verts = vec![
        Vertex::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0), Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.6, 0.0, 0.8), Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(-1.0, 2.0, 0.0), Vec3::new(0.0, 0.6, 0.8), Vec2::new(0.0, 1.0)),
        Vertex::new(Vec3::new(1.0, 2.0, 0.0), Vec3::new(-0.6, 0.0, 0.8), Vec2::new(1.0, 1.0)),
    ];
    let indices = (0..4).map(|i| encode_strip_index(1, i)).collect();
    Mesh::new(verts, indices, texture_id)
}

fn skinned_model() -> DmsModel {
    let root_bind = Transform::IDENTITY;
    let child_bind = Transform::new(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, Vec3::ONE);
    let bones = vec![
        Bone::new("root", -1, root_bind, Mat4::IDENTITY),
        Bone::new("arm", 0, child_bind, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))),
    ];

    let raised = Transform::new(Vec3::new(0.0, 3.0, 0.0), Quat::from_rotation_z(0.5), Vec3::splat(1.5));
    let poses = vec![root_bind, child_bind, root_bind, raised];
    let animations = vec![
        Animation::new("raise", 2, 2, 1.0, poses.clone()),
        Animation::new("hold", 2, 1, 0.0, vec![root_bind, child_bind]),
    ];

    let mut mesh = strip_quad(0);
    for (i, v) in mesh.vertices.iter_mut().enumerate() {
        *v = v.with_bone((i / 2) as u8, 1.0);
    }
    let mesh = Mesh::new(mesh.vertices, mesh.indices, mesh.texture_id);

    DmsModel::new(vec![mesh, Mesh::new(vec![], vec![], -1)], Some(Skeleton::new(bones, animations).unwrap()))
}

fn to_bytes(model: &DmsModel) -> Vec<u8> {
    let mut bytes = Vec::new();
    dms_file::write(&mut bytes, model).unwrap();
    bytes
}

#[test]
fn animated_model_round_trips_byte_exact() {
    let model = skinned_model();
    let bytes = to_bytes(&model);

    let loaded = dms_file::read(&mut Cursor::new(&bytes)).unwrap();
    assert_eq!(loaded.meshes.len(), 2);
    assert_eq!(loaded.animation_count(), 2);
    assert_eq!(loaded.animation_name(1), Some("hold"));
    assert_eq!(loaded.current_animation(), Some(0));

    let skel = loaded.skeleton.as_ref().unwrap();
    assert_eq!(skel.bones[1].name, "arm");
    assert_eq!(skel.bones[1].parent, 0);
    assert!(skel.bones[1].inverse_bind.abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)), 1e-6));

    assert_eq!(loaded.meshes[0].vertices, model.meshes[0].vertices);
    assert_eq!(loaded.meshes[0].indices, model.meshes[0].indices);
    assert!(loaded.meshes[1].is_empty());

    assert_eq!(to_bytes(&loaded), bytes);
}

#[test]
fn static_model_round_trips_byte_exact() {
    let model = DmsModel::new(vec![strip_quad(2), strip_quad(-1)], None);
    let bytes = to_bytes(&model);

    // header + animCount + two meshes of 4 vertices & 4 indices
    assert_eq!(bytes.len(), 16 + 4 + 2 * (12 + 4 * 32 + 4 * 4));

    let loaded = dms_file::read(&mut Cursor::new(&bytes)).unwrap();
    assert!(!loaded.is_animated());
    assert_eq!(loaded.texture_slot_count(), 3);
    assert_eq!(loaded.meshes[0].vertices, model.meshes[0].vertices);
    assert_eq!(to_bytes(&loaded), bytes);
}

#[test]
fn file_round_trip_through_disk() {
    let path = std::env::temp_dir().join(format!("dms_roundtrip_{}.dms", std::process::id()));
    let model = skinned_model();

    dms_file::save(&model, &path).unwrap();
    let loaded = dms_file::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(to_bytes(&loaded), to_bytes(&model));
}

#[test]
fn missing_file_is_an_io_error() {
    let path = std::env::temp_dir().join("dms_roundtrip_does_not_exist.dms");
    assert!(matches!(dms_file::load(&path), Err(DmsError::Io(_))));
}

#[test]
fn every_truncation_is_rejected() {
    let bytes = to_bytes(&skinned_model());

    for len in [0, 3, 15, 16, 100, bytes.len() - 1] {
        let result = dms_file::read(&mut Cursor::new(&bytes[..len]));
        assert!(matches!(result, Err(DmsError::Truncated)), "length {}", len);
    }
}
