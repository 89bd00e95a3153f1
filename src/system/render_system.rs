use hecs::World;

use crate::{component::{camera::Camera, model::ModelInstance, transform3d::Transform3D}, renderer::{DrawStats, MeshRenderer, VertexSink}, texture::TextureTable};

/// System which draws every model instance from every camera
pub fn render_system<S: VertexSink + ?Sized>(world: &mut World, renderer: &mut MeshRenderer, textures: &TextureTable, sink: &mut S) -> DrawStats {
    let mut stats = DrawStats::default();

    // gather cameras
    let mut camera_iter = world.query::<(&Transform3D, &Camera)>();
    let cameras = camera_iter
        .iter()
        .map(|(_, (t, c))| (*t, *c))
        .collect::<Vec<_>>();
    drop(camera_iter);

    let base_config = renderer.config;

    for (cam_transform, camera) in cameras {
        // build view & projection matrices
        let view_proj = camera.projection() * cam_transform.view_matrix();
        renderer.config.near_z = camera.near;

        for (_, (instance, transform)) in world.query_mut::<(&ModelInstance, &Transform3D)>() {
            let mvp = view_proj * transform.matrix();
            renderer.config.color = instance.tint;

            let model_stats = renderer.draw_model(&instance.model, &mvp, textures, sink);
            stats.accumulate(&model_stats);
        }
    }

    renderer.config = base_config;

    stats
}
