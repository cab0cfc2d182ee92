//! Mesh extraction: walks the resolved element graph from the first
//! `instance_controller` and assembles the output mesh.

use std::collections::HashMap;

use corelib::value::ValueKind;
use log::debug;

use super::accessor::FloatAccessor;
use super::document::{Document, NodeId};
use super::elements::{ChannelTarget, ElementId, Elements, InputSource, SceneNodeType, resolved};
use super::error::{LoadError, Result};
use crate::mesh::{AnimationChannel, JointWeight, Mesh, Polylist, SkeletonJoint, Vertex};

pub(crate) fn extract_mesh(doc: &Document, elements: &Elements) -> Result<Mesh> {
    let node =
        find_instance_controller(doc, doc.root()).ok_or_else(|| LoadError::Unsupported {
            what: "documents without an instance_controller".to_string(),
        })?;
    let eid = elements
        .element_for_node(node)
        .ok_or_else(|| LoadError::NotRecreated {
            node: doc.node_path(node),
        })?;
    let extractor = Extractor { doc, elements };
    extractor.load_instance_controller(eid)
}

/// First `instance_controller` in document order.
fn find_instance_controller(doc: &Document, node: NodeId) -> Option<NodeId> {
    if doc.name(node) == "instance_controller" {
        return Some(node);
    }
    for &child in doc.children(node) {
        if let Some(found) = find_instance_controller(doc, child) {
            return Some(found);
        }
    }
    None
}

struct Extractor<'a> {
    doc: &'a Document,
    elements: &'a Elements,
}

impl Extractor<'_> {
    fn load_instance_controller(&self, eid: ElementId) -> Result<Mesh> {
        let instance = self.elements.instance_controller(self.doc, eid)?;
        let skeleton = resolved(instance.skeleton, "instance_controller skeleton")?;
        let armature = resolved(instance.armature, "instance_controller armature")?;
        let controller_eid = resolved(instance.controller, "instance_controller controller")?;
        let controller = self.elements.controller(self.doc, controller_eid)?;
        let skin_eid = controller.skin.ok_or_else(|| LoadError::Unsupported {
            what: format!(
                "non-skin controllers ('{}')",
                self.doc.node_path(self.elements.get(controller_eid).node)
            ),
        })?;
        let skin = self.elements.skin(self.doc, skin_eid)?;

        let mut joint_indices = HashMap::new();
        self.assign_joint_indices(skeleton, &mut joint_indices)?;
        let mut mesh = Mesh {
            joints: vec![SkeletonJoint::default(); joint_indices.len()],
            ..Mesh::default()
        };

        let armature_node = self.elements.scene_node(self.doc, armature)?;
        for &transform in &armature_node.transforms {
            mesh.armature_transform_stack
                .transforms
                .push(self.elements.transform(self.doc, transform)?.transform.clone());
        }

        self.load_joints(skeleton, &joint_indices, &mut mesh)?;
        self.load_channels(skeleton, &joint_indices, &mut mesh)?;
        self.load_inverse_bind_matrices(skin_eid, skeleton, &joint_indices, &mut mesh)?;
        let weights = self.load_vertex_weights(skin_eid, skeleton, &joint_indices)?;

        let geometry = self
            .elements
            .geometry(self.doc, resolved(skin.geometry, "skin geometry")?)?;
        let mesh_el = self
            .elements
            .mesh(self.doc, resolved(geometry.mesh, "geometry mesh")?)?;
        for &polylist in &mesh_el.polylists {
            self.load_polylist(polylist, &weights, &mut mesh)?;
        }

        let bind_shape = self
            .elements
            .transform(self.doc, resolved(skin.bind_shape, "skin bind shape")?)?;
        mesh.bind_shape_matrix = bind_shape.transform.value.as_mat4();
        mesh.premultiply_bind_shape();
        mesh.update_joint_matrices();
        Ok(mesh)
    }

    /// Pre-order index assignment: the skeleton root becomes joint 0 and
    /// children always follow their parent.
    fn assign_joint_indices(
        &self,
        eid: ElementId,
        table: &mut HashMap<ElementId, usize>,
    ) -> Result<()> {
        table.insert(eid, table.len());
        let node = self.elements.scene_node(self.doc, eid)?;
        if node.node_type != SceneNodeType::Joint {
            debug!(
                "skeleton node '{}' is not typed JOINT",
                self.doc.node_path(self.elements.get(eid).node)
            );
        }
        for &child in &node.children {
            self.assign_joint_indices(child, table)?;
        }
        Ok(())
    }

    fn joint_index(&self, table: &HashMap<ElementId, usize>, eid: ElementId) -> Result<usize> {
        table
            .get(&eid)
            .copied()
            .ok_or(LoadError::UnresolvedLink { what: "joint index" })
    }

    fn load_joints(
        &self,
        eid: ElementId,
        table: &HashMap<ElementId, usize>,
        mesh: &mut Mesh,
    ) -> Result<()> {
        let node = self.elements.scene_node(self.doc, eid)?;
        let index = self.joint_index(table, eid)?;
        let children_indices = node
            .children
            .iter()
            .map(|&child| self.joint_index(table, child))
            .collect::<Result<Vec<_>>>()?;
        let joint = &mut mesh.joints[index];
        // The skeleton root's parent is the armature, which has no index.
        joint.parent_index = node.parent.and_then(|p| table.get(&p).copied());
        joint.children_indices = children_indices;
        for &transform in &node.transforms {
            joint
                .transform_stack
                .transforms
                .push(self.elements.transform(self.doc, transform)?.transform.clone());
        }
        for &child in &node.children {
            self.load_joints(child, table, mesh)?;
        }
        Ok(())
    }

    fn load_channels(
        &self,
        eid: ElementId,
        table: &HashMap<ElementId, usize>,
        mesh: &mut Mesh,
    ) -> Result<()> {
        let node = self.elements.scene_node(self.doc, eid)?;
        let joint_index = self.joint_index(table, eid)?;
        for (transform_index, &transform) in node.transforms.iter().enumerate() {
            let transform = self.elements.transform(self.doc, transform)?;
            for &channel in &transform.attached_channels {
                self.load_channel(channel, joint_index, transform_index, mesh)?;
            }
        }
        for &child in &node.children {
            self.load_channels(child, table, mesh)?;
        }
        Ok(())
    }

    fn load_channel(
        &self,
        eid: ElementId,
        joint_index: usize,
        transform_index: usize,
        mesh: &mut Mesh,
    ) -> Result<()> {
        let channel = self.elements.channel(self.doc, eid)?;
        let (element, subvalue) = match channel.target {
            ChannelTarget::Transform { element, subvalue } => (element, subvalue),
            ChannelTarget::Unsupported => return Ok(()),
        };
        let sampler = self
            .elements
            .sampler(self.doc, resolved(channel.sampler, "channel sampler")?)?;
        let times_access = FloatAccessor::with_kind(
            self.doc,
            self.elements,
            self.source_accessor(resolved(sampler.input, "sampler input")?)?,
            ValueKind::Float,
        )?;
        let values_access = FloatAccessor::new(
            self.doc,
            self.elements,
            self.source_accessor(resolved(sampler.output, "sampler output")?)?,
        )?;
        if values_access.count() != times_access.count() {
            return Err(LoadError::CountMismatch {
                what: "sampler output keyframes",
                declared: times_access.count(),
                actual: values_access.count(),
                node: self.doc.node_path(self.elements.get(eid).node),
            });
        }
        if subvalue.is_none() {
            let target_kind = self
                .elements
                .transform(self.doc, element)?
                .transform
                .value
                .kind;
            if values_access.kind() != target_kind {
                return Err(LoadError::AccessorParams {
                    node: self.doc.node_path(self.elements.get(eid).node),
                    reason: "channel output arity does not match its target value",
                });
            }
        }

        let times = (0..times_access.count())
            .map(|i| times_access.value(i).as_f64())
            .collect();
        let values = (0..values_access.count())
            .map(|i| values_access.value(i))
            .collect();
        mesh.animation_channels.push(AnimationChannel {
            joint_index,
            transform_index,
            subvalue_index: subvalue,
            times,
            values,
        });
        Ok(())
    }

    /// Accessor behind an input that must reference a plain source.
    fn source_accessor(&self, input: ElementId) -> Result<ElementId> {
        let input_el = self.elements.input(self.doc, input)?;
        match resolved(input_el.source, "input source")? {
            InputSource::Source(source) => {
                let source_el = self.elements.source(self.doc, source)?;
                resolved(source_el.accessor, "source accessor")
            }
            InputSource::Vertices(_) => Err(LoadError::WrongElementType {
                expected: "source",
                node: self.doc.node_path(self.elements.get(input).node),
            }),
        }
    }

    /// Names from a joint input, mapped to mesh joint indices by
    /// scoped-ID lookup under the skeleton root.
    fn joint_index_list(
        &self,
        joint_input: ElementId,
        skeleton: ElementId,
        table: &HashMap<ElementId, usize>,
    ) -> Result<Vec<usize>> {
        let accessor_eid = self.source_accessor(joint_input)?;
        let accessor = self.elements.accessor(self.doc, accessor_eid)?;
        let names = self.elements.name_array(
            self.doc,
            resolved(accessor.source_array, "accessor source array")?,
        )?;
        let skeleton_node = self.elements.get(skeleton).node;
        names
            .values
            .iter()
            .map(|name| {
                let node = self.doc.find_child_by_sid(skeleton_node, name)?;
                let eid = self.elements.element_for_node(node).ok_or_else(|| {
                    LoadError::NotRecreated {
                        node: self.doc.node_path(node),
                    }
                })?;
                self.elements.scene_node(self.doc, eid)?;
                self.joint_index(table, eid)
            })
            .collect()
    }

    fn load_inverse_bind_matrices(
        &self,
        skin_eid: ElementId,
        skeleton: ElementId,
        table: &HashMap<ElementId, usize>,
        mesh: &mut Mesh,
    ) -> Result<()> {
        let skin = self.elements.skin(self.doc, skin_eid)?;
        let joints_eid = resolved(skin.joints, "skin joints")?;
        let joints_el = self.elements.joints(self.doc, joints_eid)?;
        let joint_indices = self.joint_index_list(
            resolved(joints_el.joint_input, "joints joint input")?,
            skeleton,
            table,
        )?;
        let matrices = FloatAccessor::with_kind(
            self.doc,
            self.elements,
            self.source_accessor(resolved(joints_el.inv_bind_input, "joints inv bind input")?)?,
            ValueKind::Float4x4,
        )?;
        if matrices.count() != joint_indices.len() {
            return Err(LoadError::CountMismatch {
                what: "inverse bind matrices",
                declared: joint_indices.len(),
                actual: matrices.count(),
                node: self.doc.node_path(self.elements.get(joints_eid).node),
            });
        }
        for (i, &joint) in joint_indices.iter().enumerate() {
            mesh.joints[joint].inverse_bind_matrix = matrices.value(i).as_mat4();
        }
        Ok(())
    }

    /// Joint influences per position, normalized so each vertex's weights
    /// sum to one.
    fn load_vertex_weights(
        &self,
        skin_eid: ElementId,
        skeleton: ElementId,
        table: &HashMap<ElementId, usize>,
    ) -> Result<Vec<Vec<JointWeight>>> {
        let skin = self.elements.skin(self.doc, skin_eid)?;
        let vw_eid = resolved(skin.vertex_weights, "skin vertex weights")?;
        let vw = self.elements.vertex_weights(self.doc, vw_eid)?;
        let joint_input = resolved(vw.joint_input, "vertex weights joint input")?;
        let weight_input = resolved(vw.weight_input, "vertex weights weight input")?;
        let joint_indices = self.joint_index_list(joint_input, skeleton, table)?;
        let weight_access = FloatAccessor::with_kind(
            self.doc,
            self.elements,
            self.source_accessor(weight_input)?,
            ValueKind::Float,
        )?;
        let joint_offset = self.elements.input(self.doc, joint_input)?.offset;
        let weight_offset = self.elements.input(self.doc, weight_input)?.offset;

        let mut all = Vec::with_capacity(vw.influence_counts.len());
        let mut cursor = 0;
        for &influences in &vw.influence_counts {
            let mut weights = Vec::with_capacity(influences);
            let mut total = 0.0;
            for _ in 0..influences {
                let joint_ref = *vw.indices.get(cursor + joint_offset).ok_or(
                    LoadError::IndexOutOfBounds {
                        what: "vertex weight",
                        index: cursor + joint_offset,
                        len: vw.indices.len(),
                    },
                )?;
                let weight_ref = *vw.indices.get(cursor + weight_offset).ok_or(
                    LoadError::IndexOutOfBounds {
                        what: "vertex weight",
                        index: cursor + weight_offset,
                        len: vw.indices.len(),
                    },
                )?;
                let joint = *joint_indices.get(joint_ref).ok_or(
                    LoadError::IndexOutOfBounds {
                        what: "joint name",
                        index: joint_ref,
                        len: joint_indices.len(),
                    },
                )?;
                if weight_ref >= weight_access.count() {
                    return Err(LoadError::IndexOutOfBounds {
                        what: "weight value",
                        index: weight_ref,
                        len: weight_access.count(),
                    });
                }
                let weight = weight_access.value(weight_ref).as_f64();
                total += weight;
                weights.push(JointWeight { joint, weight });
                cursor += 2;
            }
            for influence in &mut weights {
                influence.weight /= total;
            }
            all.push(weights);
        }
        Ok(all)
    }

    fn load_polylist(
        &self,
        eid: ElementId,
        weights: &[Vec<JointWeight>],
        mesh: &mut Mesh,
    ) -> Result<()> {
        let pl = self.elements.polylist(self.doc, eid)?;
        let vertex_input_eid = resolved(pl.vertex_input, "polylist vertex input")?;
        let vertex_input = self.elements.input(self.doc, vertex_input_eid)?;
        let InputSource::Vertices(vertices_eid) =
            resolved(vertex_input.source, "input source")?
        else {
            return Err(LoadError::WrongElementType {
                expected: "vertices",
                node: self.doc.node_path(self.elements.get(vertex_input_eid).node),
            });
        };
        let vertices = self.elements.vertices(self.doc, vertices_eid)?;
        let position_input = resolved(vertices.position, "vertices position input")?;
        let positions = FloatAccessor::with_kind(
            self.doc,
            self.elements,
            self.source_accessor(position_input)?,
            ValueKind::Float3,
        )?;

        let mut polylist = Polylist::default();
        let mut cursor = 0;
        for &face_size in &pl.vertex_counts {
            let base = mesh.vertices.len() as u32;
            for _ in 0..face_size {
                let position_index = *pl.indices.get(cursor + vertex_input.offset).ok_or(
                    LoadError::IndexOutOfBounds {
                        what: "polylist",
                        index: cursor + vertex_input.offset,
                        len: pl.indices.len(),
                    },
                )?;
                if position_index >= positions.count() {
                    return Err(LoadError::IndexOutOfBounds {
                        what: "vertex position",
                        index: position_index,
                        len: positions.count(),
                    });
                }
                let position = positions.value(position_index).as_vec3();
                mesh.vertices.push(Vertex {
                    position,
                    skinned_position: position,
                });
                mesh.vertex_weights.push(weights.get(position_index).cloned().ok_or(
                    LoadError::IndexOutOfBounds {
                        what: "vertex weights",
                        index: position_index,
                        len: weights.len(),
                    },
                )?);
                cursor += pl.index_block_size;
            }
            // Fan triangulation of the face.
            for k in 2..face_size {
                let k = k as u32;
                polylist.indices.extend([base, base + k - 1, base + k]);
            }
        }
        mesh.polylists.push(polylist);
        Ok(())
    }
}
