//! CPU-side skeletal mesh: the loader's output and its evaluation.

use corelib::transform::TransformStack;
use corelib::value::{Value, lerp_into};
use corelib::{DMat4, DVec3, WEAK_EPS};

/// Vertex in object space. `skinned_position` is refreshed by
/// [`Mesh::apply_skinning`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vertex {
    pub position: DVec3,
    pub skinned_position: DVec3,
}

/// One joint influence on a vertex. Weights of a vertex sum to one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointWeight {
    pub joint: usize,
    pub weight: f64,
}

/// Triangulated face group. Indices point into [`Mesh::vertices`].
#[derive(Clone, Debug, Default)]
pub struct Polylist {
    pub indices: Vec<u32>,
}

/// One skeleton joint with its local transform stack and skinning state.
#[derive(Clone, Debug)]
pub struct SkeletonJoint {
    pub parent_index: Option<usize>,
    pub children_indices: Vec<usize>,
    pub transform_stack: TransformStack,
    pub inverse_bind_matrix: DMat4,
    pub skinning_matrix: DMat4,
}

impl Default for SkeletonJoint {
    fn default() -> Self {
        SkeletonJoint {
            parent_index: None,
            children_indices: Vec::new(),
            transform_stack: TransformStack::default(),
            inverse_bind_matrix: DMat4::IDENTITY,
            skinning_matrix: DMat4::IDENTITY,
        }
    }
}

/// Keyframed animation of one transform of one joint.
#[derive(Clone, Debug)]
pub struct AnimationChannel {
    pub joint_index: usize,
    /// Index into the joint's transform stack.
    pub transform_index: usize,
    /// Component of the transform value this channel drives, `None` for
    /// the whole value.
    pub subvalue_index: Option<usize>,
    pub times: Vec<f64>,
    pub values: Vec<Value>,
}

impl AnimationChannel {
    /// Write the value for time `t` into the targeted transform. Times
    /// outside the keyframe range wrap around (the animation loops).
    pub fn apply_value(&self, joints: &mut [SkeletonJoint], t: f64) {
        if self.times.is_empty() {
            return;
        }
        let target =
            &mut joints[self.joint_index].transform_stack.transforms[self.transform_index].value;
        if self.times.len() == 1 {
            write_keyframe(target, &self.values[0], self.subvalue_index);
            return;
        }

        let first = self.times[0];
        let last = self.times[self.times.len() - 1];
        let span = last - first;
        let mut t = t;
        if span > 0.0 {
            while t > last {
                t -= span;
            }
            while t < first {
                t += span;
            }
        } else {
            t = first;
        }

        for i in 0..self.times.len() - 1 {
            if self.times[i] <= t + WEAK_EPS && self.times[i + 1] >= t - WEAK_EPS {
                let t_interp = (t - self.times[i]) / (self.times[i + 1] - self.times[i]);
                match self.subvalue_index {
                    Some(sub) => {
                        target.components[sub] = self.values[i].components[0] * (1.0 - t_interp)
                            + self.values[i + 1].components[0] * t_interp;
                    }
                    None => lerp_into(&self.values[i], &self.values[i + 1], target, t_interp),
                }
                return;
            }
        }
        debug_assert!(false, "no keyframe interval brackets t={t}");
    }
}

fn write_keyframe(target: &mut Value, value: &Value, subvalue: Option<usize>) {
    match subvalue {
        Some(sub) => target.components[sub] = value.components[0],
        None => target.components.clone_from_slice(&value.components),
    }
}

/// Skinned triangle mesh with its skeleton and animation channels.
#[derive(Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    /// Joint influences per vertex, parallel to `vertices`.
    pub vertex_weights: Vec<Vec<JointWeight>>,
    pub polylists: Vec<Polylist>,
    /// Joint 0 is the skeleton root; children always follow parents.
    pub joints: Vec<SkeletonJoint>,
    /// Transforms of the node above the skeleton root.
    pub armature_transform_stack: TransformStack,
    pub bind_shape_matrix: DMat4,
    pub animation_channels: Vec<AnimationChannel>,
}

impl Mesh {
    /// Returns `true` if the mesh carries any renderable geometry.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && self.polylists.iter().any(|p| !p.indices.is_empty())
    }

    pub fn triangle_count(&self) -> usize {
        self.polylists.iter().map(|p| p.indices.len() / 3).sum()
    }

    /// Drive all animation channels to time `t`, then refresh the joint
    /// skinning matrices.
    pub fn apply_animation(&mut self, t: f64) {
        let Mesh {
            animation_channels,
            joints,
            ..
        } = self;
        for channel in animation_channels.iter() {
            channel.apply_value(joints, t);
        }
        self.update_joint_matrices();
    }

    /// Recompute every joint's skinning matrix from the transform stacks.
    pub fn update_joint_matrices(&mut self) {
        if self.joints.is_empty() {
            return;
        }
        let mut root = DMat4::IDENTITY;
        self.armature_transform_stack.apply_to(&mut root);
        self.update_joint(0, root);
    }

    fn update_joint(&mut self, index: usize, parent: DMat4) {
        let mut world = parent;
        self.joints[index].transform_stack.apply_to(&mut world);
        self.joints[index].skinning_matrix = world * self.joints[index].inverse_bind_matrix;
        let children = self.joints[index].children_indices.clone();
        for child in children {
            self.update_joint(child, world);
        }
    }

    /// Recompute `skinned_position` for every vertex as the weighted sum
    /// of its joints' skinning matrices applied to the bind-pose position.
    pub fn apply_skinning(&mut self) {
        let Mesh {
            vertices,
            vertex_weights,
            joints,
            ..
        } = self;
        for (vertex, weights) in vertices.iter_mut().zip(vertex_weights.iter()) {
            let mut skinned = DVec3::ZERO;
            for influence in weights {
                skinned += joints[influence.joint]
                    .skinning_matrix
                    .transform_point3(vertex.position)
                    * influence.weight;
            }
            vertex.skinned_position = skinned;
        }
    }

    /// One-shot bake of the bind shape matrix into the vertex positions.
    /// Called once at the end of loading.
    pub(crate) fn premultiply_bind_shape(&mut self) {
        let bind_shape = self.bind_shape_matrix;
        for vertex in &mut self.vertices {
            vertex.position = bind_shape.transform_point3(vertex.position);
            vertex.skinned_position = vertex.position;
        }
    }
}
