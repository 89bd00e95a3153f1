use glam::Mat4;

use crate::{error::{DmsError, DmsResult}, math::Transform};

/// Represents a single bone of a skeleton
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    /// Index of the parent bone, or -1 for a root. Always smaller than this bone's own index.
    pub parent: i32,
    pub bind_pose: Transform,
    pub inverse_bind: Mat4,
    /// Pose sampled by the last tick
    pub local_pose: Transform,
    /// Bone-to-model matrix for the current pose
    pub world_matrix: Mat4,
}

impl Bone {
    pub fn new(name: &str, parent: i32, bind_pose: Transform, inverse_bind: Mat4) -> Bone {
        Bone {
            name: name.to_string(),
            parent,
            bind_pose,
            inverse_bind,
            local_pose: bind_pose,
            world_matrix: Mat4::IDENTITY,
        }
    }

    fn parent_index(&self, own_index: usize) -> Option<usize> {
        if self.parent >= 0 && (self.parent as usize) < own_index {
            Some(self.parent as usize)
        } else {
            None
        }
    }
}

/// Represents a keyframed animation clip. Poses are stored frame-major in one contiguous buffer.
#[derive(Debug, Clone)]
pub struct Animation {
    pub name: String,
    pub bone_count: usize,
    pub frame_count: usize,
    /// Length of the clip in seconds
    pub duration: f32,
    pub poses: Vec<Transform>,
}

impl Animation {
    pub fn new(name: &str, bone_count: usize, frame_count: usize, duration: f32, poses: Vec<Transform>) -> Animation {
        Animation {
            name: name.to_string(),
            bone_count,
            frame_count,
            duration,
            poses,
        }
    }

    #[inline]
    pub fn pose_index(&self, frame: usize, bone: usize) -> usize {
        frame * self.bone_count + bone
    }

    pub fn pose(&self, frame: usize, bone: usize) -> Option<&Transform> {
        if frame >= self.frame_count || bone >= self.bone_count {
            return None;
        }
        self.poses.get(self.pose_index(frame, bone))
    }

    /// All bone poses of one frame
    pub fn frame(&self, frame: usize) -> Option<&[Transform]> {
        let start = self.pose_index(frame, 0);
        self.poses.get(start..start + self.bone_count)
    }
}

/// Represents a bone hierarchy, its animation clips & the playback state
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
    pub animations: Vec<Animation>,
    current_anim: usize,
    current_time: f32,
    bone_palette: Vec<Mat4>,
}

impl Skeleton {
    /// Construct a skeleton, checking that it has bones, that parents precede their children & that every clip
    /// carries a full pose for every bone. The skeleton starts out in its bind pose.
    pub fn new(bones: Vec<Bone>, animations: Vec<Animation>) -> DmsResult<Skeleton> {
        // a boneless skeleton can't be told apart from a static model on disk
        if bones.is_empty() {
            return Err(DmsError::EmptySkeleton);
        }

        for (i, bone) in bones.iter().enumerate() {
            if bone.parent < -1 || (bone.parent >= 0 && bone.parent as usize >= i) {
                return Err(DmsError::BoneOrder { bone: i, parent: bone.parent });
            }
        }

        for anim in &animations {
            if anim.bone_count != bones.len() {
                return Err(DmsError::BoneCountMismatch {
                    animation: anim.name.clone(),
                    expected: bones.len(),
                    found: anim.bone_count as i32,
                });
            }

            let expected = anim.frame_count * anim.bone_count;
            if anim.poses.len() != expected {
                return Err(DmsError::PoseCountMismatch {
                    animation: anim.name.clone(),
                    expected,
                    found: anim.poses.len(),
                });
            }
        }

        let bone_palette = vec![Mat4::IDENTITY; bones.len()];
        let mut skeleton = Skeleton {
            bones,
            animations,
            current_anim: 0,
            current_time: 0.0,
            bone_palette,
        };
        skeleton.reset_pose();

        Ok(skeleton)
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn current_animation(&self) -> usize {
        self.current_anim
    }

    pub fn current_time(&self) -> f32 {
        self.current_time
    }

    /// Skinning matrices (world * inverse bind) for the current pose, one per bone
    pub fn bone_palette(&self) -> &[Mat4] {
        &self.bone_palette
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn find_animation(&self, name: &str) -> Option<usize> {
        self.animations.iter().position(|a| a.name == name)
    }

    /// Select the animation to play & rewind it. Out-of-range indices leave the state untouched.
    pub fn set_animation(self: &mut Self, index: usize) -> bool {
        if index >= self.animations.len() {
            return false;
        }

        self.current_anim = index;
        self.current_time = 0.0;
        true
    }

    /// Put every bone back in its bind pose
    pub fn reset_pose(self: &mut Self) {
        for bone in &mut self.bones {
            bone.local_pose = bone.bind_pose;
        }
        self.update_world_matrices();
    }

    /// Advance the current animation by `delta_time` seconds & recompute the pose
    pub fn tick(self: &mut Self, delta_time: f32) {
        let anim = match self.animations.get(self.current_anim) {
            Some(v) => v,
            None => return,
        };

        if anim.frame_count == 0 {
            return;
        }

        let duration = anim.duration;
        let frame_count = anim.frame_count;

        // zero length clips hold their first frame
        if duration <= 0.0 || !duration.is_finite() {
            self.current_time = 0.0;
            self.sample(0, 0, 0.0);
            return;
        }

        let mut time = (self.current_time + delta_time).rem_euclid(duration);
        if !(time < duration) {
            time = 0.0;
        }
        self.current_time = time;

        // single frame clips keep their clock running but never leave frame 0
        if frame_count < 2 {
            self.sample(0, 0, 0.0);
            return;
        }

        let time_per_frame = duration / frame_count as f32;
        let frame = ((time / time_per_frame) as usize).min(frame_count - 1);
        let next_frame = (frame + 1) % frame_count;
        let alpha = ((time - frame as f32 * time_per_frame) / time_per_frame).clamp(0.0, 1.0);

        self.sample(frame, next_frame, alpha);
    }

    fn sample(self: &mut Self, frame: usize, next_frame: usize, alpha: f32) {
        let anim = &self.animations[self.current_anim];

        for (i, bone) in self.bones.iter_mut().enumerate() {
            bone.local_pose = match (anim.pose(frame, i), anim.pose(next_frame, i)) {
                (Some(a), Some(b)) => a.interpolate(b, alpha),
                _ => bone.bind_pose,
            };
        }

        self.update_world_matrices();
    }

    // parents always precede children, so a single forward pass is enough
    fn update_world_matrices(self: &mut Self) {
        for i in 0..self.bones.len() {
            let local = self.bones[i].local_pose.to_matrix();
            let world = match self.bones[i].parent_index(i) {
                Some(p) => self.bones[p].world_matrix * local,
                None => local,
            };

            self.bones[i].world_matrix = world;
            self.bone_palette[i] = world * self.bones[i].inverse_bind;
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;

    fn translation(x: f32, y: f32, z: f32) -> Transform {
        Transform::new(Vec3::new(x, y, z), Quat::IDENTITY, Vec3::ONE)
    }

    fn two_bone_skeleton(duration: f32) -> Skeleton {
        let root = Bone::new("root", -1, translation(0.0, 1.0, 0.0), Mat4::IDENTITY);
        let child = Bone::new("child", 0, translation(0.0, 2.0, 0.0), Mat4::IDENTITY);

        let poses = vec![
            translation(0.0, 0.0, 0.0),
            translation(1.0, 0.0, 0.0),
            translation(10.0, 0.0, 0.0),
            translation(1.0, 0.0, 0.0),
        ];
        let anim = Animation::new("walk", 2, 2, duration, poses);

        Skeleton::new(vec![root, child], vec![anim]).unwrap()
    }

    #[test]
    fn load_state_is_bind_pose() {
        let skel = two_bone_skeleton(2.0);
        assert!(skel.bones[0].world_matrix.abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)), 1e-6));
        assert!(skel.bones[1].world_matrix.abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0)), 1e-6));
    }

    #[test]
    fn time_wraps_around_duration() {
        let mut skel = two_bone_skeleton(2.0);
        skel.tick(2.0);
        skel.tick(3.0);
        assert!((skel.current_time() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_delta_is_idempotent() {
        let mut skel = two_bone_skeleton(2.0);
        skel.tick(0.4);
        let time = skel.current_time();
        let palette = skel.bone_palette().to_vec();

        skel.tick(0.0);
        assert_eq!(skel.current_time(), time);
        assert_eq!(skel.bone_palette(), palette.as_slice());
    }

    #[test]
    fn child_world_composes_parent() {
        let mut skel = two_bone_skeleton(2.0);
        // halfway between frame 0 and 1: root x = 5, child x = 1
        skel.tick(0.5);

        let root = skel.bones[0].local_pose.to_matrix();
        let child = skel.bones[1].local_pose.to_matrix();
        assert!(skel.bones[0].world_matrix.abs_diff_eq(root, 1e-6));
        assert!(skel.bones[1].world_matrix.abs_diff_eq(root * child, 1e-6));

        let p = skel.bones[1].world_matrix.transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(6.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn set_animation_is_bounds_checked() {
        let mut skel = two_bone_skeleton(2.0);
        skel.tick(0.7);

        assert!(!skel.set_animation(3));
        assert!((skel.current_time() - 0.7).abs() < 1e-6);

        assert!(skel.set_animation(0));
        assert_eq!(skel.current_time(), 0.0);
    }

    #[test]
    fn zero_duration_holds_first_frame() {
        let mut skel = two_bone_skeleton(0.0);
        skel.tick(1.0);
        assert_eq!(skel.current_time(), 0.0);
        let p = skel.bones[0].world_matrix.transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::ZERO, 1e-6));
    }

    #[test]
    fn single_frame_clip_keeps_time_running() {
        let bone = Bone::new("root", -1, Transform::IDENTITY, Mat4::IDENTITY);
        let anim = Animation::new("pose", 1, 1, 2.0, vec![translation(4.0, 0.0, 0.0)]);
        let mut skel = Skeleton::new(vec![bone], vec![anim]).unwrap();

        skel.tick(0.5);
        assert!((skel.current_time() - 0.5).abs() < 1e-6);
        skel.tick(2.0);
        assert!((skel.current_time() - 0.5).abs() < 1e-5);

        let p = skel.bones[0].world_matrix.transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(4.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn rejects_empty_skeleton() {
        let anim = Animation::new("none", 0, 2, 1.0, vec![]);
        assert!(matches!(Skeleton::new(vec![], vec![anim]), Err(DmsError::EmptySkeleton)));
    }

    #[test]
    fn rejects_child_before_parent() {
        let a = Bone::new("a", 1, Transform::IDENTITY, Mat4::IDENTITY);
        let b = Bone::new("b", -1, Transform::IDENTITY, Mat4::IDENTITY);
        assert!(matches!(Skeleton::new(vec![a, b], vec![]), Err(DmsError::BoneOrder { bone: 0, parent: 1 })));
    }

    #[test]
    fn rejects_mismatched_animation() {
        let a = Bone::new("a", -1, Transform::IDENTITY, Mat4::IDENTITY);
        let anim = Animation::new("bad", 3, 1, 1.0, vec![Transform::IDENTITY; 3]);
        assert!(matches!(Skeleton::new(vec![a], vec![anim]), Err(DmsError::BoneCountMismatch { .. })));
    }
}
