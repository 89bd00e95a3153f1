use hecs::World;

use crate::{component::model::ModelInstance, TimeData};

/// System which advances skeletal animation & reskins every animated model
pub fn anim_system_update(time: &TimeData, world: &mut World) {
    for (_, instance) in world.query_mut::<&mut ModelInstance>() {
        if instance.model.is_animated() {
            instance.model.update_animation(time.delta_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Quat, Vec2, Vec3};

    use super::*;
    use crate::{dmsmesh::{DmsModel, Mesh, Vertex}, math::Transform, skeleton::{Animation, Bone, Skeleton}};

    fn sliding_model() -> DmsModel {
        let bone = Bone::new("root", -1, Transform::IDENTITY, Mat4::IDENTITY);
        let poses = vec![
            Transform::IDENTITY,
            Transform::new(Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE),
        ];
        let anim = Animation::new("slide", 1, 2, 1.0, poses);
        let skeleton = Skeleton::new(vec![bone], vec![anim]).unwrap();

        let v = Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO).with_bone(0, 1.0);
        DmsModel::new(vec![Mesh::new(vec![v; 3], vec![], -1)], Some(skeleton))
    }

    #[test]
    fn animated_instances_are_ticked() {
        let mut world = World::new();
        let e = world.spawn((ModelInstance::new(sliding_model()),));

        anim_system_update(&TimeData { delta_time: 0.25, total_time: 0.25 }, &mut world);

        let instance = world.get::<&ModelInstance>(e).unwrap();
        let skel = instance.model.skeleton.as_ref().unwrap();
        assert!((skel.current_time() - 0.25).abs() < 1e-6);
        assert!((instance.model.meshes[0].render_vertices()[0].position.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn static_instances_are_untouched() {
        let mut world = World::new();
        let v = Vertex::new(Vec3::X, Vec3::Z, Vec2::ZERO);
        let e = world.spawn((ModelInstance::new(DmsModel::new(vec![Mesh::new(vec![v; 3], vec![], -1)], None)),));

        anim_system_update(&TimeData { delta_time: 1.0, total_time: 1.0 }, &mut world);

        let instance = world.get::<&ModelInstance>(e).unwrap();
        assert_eq!(instance.model.meshes[0].render_vertices()[0].position, Vec3::X);
    }
}
