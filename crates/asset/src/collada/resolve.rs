//! Link resolution: a post-order pass over the document that connects
//! recreated elements to each other. Children resolve before parents, so
//! an element may rely on its subtree being fully linked.

use super::anim;
use super::document::{Document, NodeId};
use super::elements::{ChannelTarget, ElementData, ElementId, Elements, InputSource, resolved};
use super::error::{LoadError, Result};

/// Resolve a fragment URI (`#id`) to the node carrying that id.
pub(crate) fn resolve_uri_node(doc: &Document, elements: &Elements, uri: &str) -> Result<NodeId> {
    let Some(id) = uri.strip_prefix('#') else {
        return Err(LoadError::BadUri {
            uri: uri.to_string(),
            reason: "only fragment URIs beginning with '#' are supported",
        });
    };
    for c in id.chars() {
        if !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
            return Err(LoadError::BadUri {
                uri: uri.to_string(),
                reason: "unsupported character",
            });
        }
    }
    elements
        .node_by_id(id)
        .ok_or_else(|| LoadError::UnresolvedUri { id: id.to_string() })
}

pub(crate) fn run(doc: &Document, elements: &mut Elements) -> Result<()> {
    let mut resolver = Resolver { doc, elements };
    resolver.resolve_node(doc.root())
}

struct Resolver<'a> {
    doc: &'a Document,
    elements: &'a mut Elements,
}

#[derive(Clone, Copy)]
enum Kind {
    Accessor,
    Source,
    Input,
    Vertices,
    Polylist,
    Mesh,
    SceneNode,
    Geometry,
    Joints,
    VertexWeights,
    Skin,
    Controller,
    InstanceController,
    Channel,
    Sampler,
    /// Arrays, params and transforms have no outgoing links.
    Leaf,
}

fn kind_of(data: &ElementData) -> Kind {
    match data {
        ElementData::Accessor(_) => Kind::Accessor,
        ElementData::Source(_) => Kind::Source,
        ElementData::Input(_) => Kind::Input,
        ElementData::Vertices(_) => Kind::Vertices,
        ElementData::Polylist(_) => Kind::Polylist,
        ElementData::Mesh(_) => Kind::Mesh,
        ElementData::SceneNode(_) => Kind::SceneNode,
        ElementData::Geometry(_) => Kind::Geometry,
        ElementData::Joints(_) => Kind::Joints,
        ElementData::VertexWeights(_) => Kind::VertexWeights,
        ElementData::Skin(_) => Kind::Skin,
        ElementData::Controller(_) => Kind::Controller,
        ElementData::InstanceController(_) => Kind::InstanceController,
        ElementData::Channel(_) => Kind::Channel,
        ElementData::Sampler(_) => Kind::Sampler,
        ElementData::FloatArray(_)
        | ElementData::NameArray(_)
        | ElementData::Param(_)
        | ElementData::Transform(_) => Kind::Leaf,
    }
}

impl Resolver<'_> {
    fn resolve_node(&mut self, node: NodeId) -> Result<()> {
        for &child in self.doc.children(node) {
            self.resolve_node(child)?;
        }
        if let Some(eid) = self.elements.element_for_node(node) {
            self.resolve_element(eid, node)?;
        }
        Ok(())
    }

    fn resolve_element(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        match kind_of(&self.elements.get(eid).data) {
            Kind::Accessor => self.resolve_accessor(eid, node),
            Kind::Source => self.resolve_source(eid, node),
            Kind::Input => self.resolve_input(eid, node),
            Kind::Vertices => self.resolve_vertices(eid, node),
            Kind::Polylist => self.resolve_polylist(eid, node),
            Kind::Mesh => self.resolve_mesh(eid, node),
            Kind::SceneNode => self.resolve_scene_node(eid, node),
            Kind::Geometry => self.resolve_geometry(eid, node),
            Kind::Joints => self.resolve_joints(eid, node),
            Kind::VertexWeights => self.resolve_vertex_weights(eid, node),
            Kind::Skin => self.resolve_skin(eid, node),
            Kind::Controller => self.resolve_controller(eid, node),
            Kind::InstanceController => self.resolve_instance_controller(eid, node),
            Kind::Channel => self.resolve_channel(eid, node),
            Kind::Sampler => self.resolve_sampler(eid, node),
            Kind::Leaf => Ok(()),
        }
    }

    /// The element recreated for `node`; an error when the factory made none.
    fn require_element(&self, node: NodeId) -> Result<ElementId> {
        self.elements
            .element_for_node(node)
            .ok_or_else(|| LoadError::NotRecreated {
                node: self.doc.node_path(node),
            })
    }

    fn resolve_uri(&self, uri: &str) -> Result<ElementId> {
        let node = resolve_uri_node(self.doc, self.elements, uri)?;
        self.require_element(node)
    }

    fn attr_uri(&self, node: NodeId, attribute: &'static str) -> Result<ElementId> {
        let uri = self.doc.require_attr(node, attribute)?;
        self.resolve_uri(uri)
    }

    /// The one direct `input` child with the given semantic. Inputs
    /// resolve before their parents, so the recreated element is ready.
    fn input_with_semantic(&self, node: NodeId, semantic: &'static str) -> Result<ElementId> {
        let mut found = None;
        for child in self.doc.children_named(node, "input") {
            let input_eid = self.require_element(child)?;
            if self.elements.input(self.doc, input_eid)?.semantic == semantic {
                if found.is_some() {
                    return Err(LoadError::DuplicateInput {
                        semantic,
                        node: self.doc.node_path(node),
                    });
                }
                found = Some(input_eid);
            }
        }
        found.ok_or_else(|| LoadError::MissingInput {
            semantic,
            node: self.doc.node_path(node),
        })
    }

    fn resolve_accessor(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let array = self.attr_uri(node, "source")?;
        let mut params = Vec::new();
        for child in self.doc.children_named(node, "param") {
            let param = self.require_element(child)?;
            self.elements.param(self.doc, param)?;
            params.push(param);
        }
        let accessor = self.elements.accessor_mut(self.doc, eid)?;
        accessor.source_array = Some(array);
        accessor.params = params;
        Ok(())
    }

    fn resolve_source(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        // Sources must be addressable by URI.
        if self.elements.get(eid).id.is_none() {
            return Err(LoadError::MissingId {
                node: self.doc.node_path(node),
            });
        }
        let accessor = self.require_element(self.doc.single_child(node, "accessor")?)?;
        self.elements.accessor(self.doc, accessor)?;
        self.elements.source_mut(self.doc, eid)?.accessor = Some(accessor);
        Ok(())
    }

    fn resolve_input(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let target = self.attr_uri(node, "source")?;
        let source = match &self.elements.get(target).data {
            ElementData::Source(_) => InputSource::Source(target),
            ElementData::Vertices(_) => InputSource::Vertices(target),
            _ => {
                return Err(LoadError::WrongElementType {
                    expected: "source or vertices",
                    node: self.doc.node_path(self.elements.get(target).node),
                });
            }
        };
        self.elements.input_mut(self.doc, eid)?.source = Some(source);
        Ok(())
    }

    fn resolve_vertices(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let position = self.input_with_semantic(node, "position")?;
        self.elements.vertices_mut(self.doc, eid)?.position = Some(position);
        Ok(())
    }

    fn resolve_polylist(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let input = self.input_with_semantic(node, "vertex")?;
        let input_el = self.elements.input(self.doc, input)?;
        if input_el.offset != 0 {
            return Err(LoadError::Unsupported {
                what: format!(
                    "vertex inputs with a non-zero offset ('{}')",
                    self.doc.node_path(node)
                ),
            });
        }
        match resolved(input_el.source, "input source")? {
            InputSource::Vertices(_) => {}
            InputSource::Source(_) => {
                return Err(LoadError::WrongElementType {
                    expected: "vertices",
                    node: self.doc.node_path(node),
                });
            }
        }
        self.elements.polylist_mut(self.doc, eid)?.vertex_input = Some(input);
        Ok(())
    }

    fn resolve_mesh(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let vertices = self.require_element(self.doc.single_child(node, "vertices")?)?;
        self.elements.vertices(self.doc, vertices)?;
        let mut polylists = Vec::new();
        for tag in ["polylist", "triangles"] {
            for child in self.doc.children_named(node, tag) {
                let polylist = self.require_element(child)?;
                self.elements.polylist(self.doc, polylist)?;
                polylists.push(polylist);
            }
        }
        self.elements.mesh_mut(self.doc, eid)?.polylists = polylists;
        Ok(())
    }

    fn resolve_scene_node(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let mut children = Vec::new();
        let mut transforms = Vec::new();
        for &child in self.doc.children(node) {
            let Some(child_eid) = self.elements.element_for_node(child) else {
                continue;
            };
            match &self.elements.get(child_eid).data {
                ElementData::SceneNode(_) => children.push(child_eid),
                ElementData::Transform(_) => transforms.push(child_eid),
                _ => {}
            }
        }
        for &child in &children {
            self.elements.scene_node_mut(self.doc, child)?.parent = Some(eid);
        }
        let scene_node = self.elements.scene_node_mut(self.doc, eid)?;
        scene_node.children = children;
        scene_node.transforms = transforms;
        Ok(())
    }

    fn resolve_geometry(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        if self.elements.get(eid).id.is_none() {
            return Err(LoadError::MissingId {
                node: self.doc.node_path(node),
            });
        }
        let mesh = self.require_element(self.doc.single_child(node, "mesh")?)?;
        self.elements.mesh(self.doc, mesh)?;
        self.elements.geometry_mut(self.doc, eid)?.mesh = Some(mesh);
        Ok(())
    }

    fn resolve_joints(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let joint_input = self.input_with_semantic(node, "joint")?;
        let inv_bind_input = self.input_with_semantic(node, "inv_bind_matrix")?;
        let joints = self.elements.joints_mut(self.doc, eid)?;
        joints.joint_input = Some(joint_input);
        joints.inv_bind_input = Some(inv_bind_input);
        Ok(())
    }

    fn resolve_vertex_weights(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let joint_input = self.input_with_semantic(node, "joint")?;
        let weight_input = self.input_with_semantic(node, "weight")?;
        let weights = self.elements.vertex_weights_mut(self.doc, eid)?;
        weights.joint_input = Some(joint_input);
        weights.weight_input = Some(weight_input);
        Ok(())
    }

    fn resolve_skin(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let geometry = self.attr_uri(node, "source")?;
        self.elements.geometry(self.doc, geometry)?;
        let bind_shape = self.require_element(self.doc.single_child(node, "bind_shape_matrix")?)?;
        self.elements.transform(self.doc, bind_shape)?;
        let joints = self.require_element(self.doc.single_child(node, "joints")?)?;
        self.elements.joints(self.doc, joints)?;
        let vertex_weights =
            self.require_element(self.doc.single_child(node, "vertex_weights")?)?;
        self.elements.vertex_weights(self.doc, vertex_weights)?;
        let skin = self.elements.skin_mut(self.doc, eid)?;
        skin.geometry = Some(geometry);
        skin.bind_shape = Some(bind_shape);
        skin.joints = Some(joints);
        skin.vertex_weights = Some(vertex_weights);
        Ok(())
    }

    fn resolve_controller(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        // Only skin controllers are linked; anything else stays empty and
        // is rejected at extraction.
        if self.doc.children_named(node, "skin").next().is_some() {
            let skin = self.require_element(self.doc.single_child(node, "skin")?)?;
            self.elements.skin(self.doc, skin)?;
            self.elements.controller_mut(self.doc, eid)?.skin = Some(skin);
        }
        Ok(())
    }

    fn resolve_instance_controller(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let controller = self.attr_uri(node, "url")?;
        self.elements.controller(self.doc, controller)?;
        let skeleton_child = self
            .doc
            .children_named(node, "skeleton")
            .next()
            .ok_or_else(|| LoadError::MissingChild {
                child: "skeleton",
                node: self.doc.node_path(node),
            })?;
        let skeleton_uri = self.doc.text(skeleton_child).trim().to_string();
        let skeleton_node = resolve_uri_node(self.doc, self.elements, &skeleton_uri)?;
        let skeleton = self.require_element(skeleton_node)?;
        self.elements.scene_node(self.doc, skeleton)?;
        let armature_node = self.doc.parent(skeleton_node).ok_or_else(|| {
            LoadError::Unsupported {
                what: format!("a skeleton root without a parent node ('{skeleton_uri}')"),
            }
        })?;
        let armature = self.require_element(armature_node)?;
        self.elements.scene_node(self.doc, armature)?;
        let instance = self.elements.instance_controller_mut(self.doc, eid)?;
        instance.controller = Some(controller);
        instance.skeleton = Some(skeleton);
        instance.armature = Some(armature);
        Ok(())
    }

    fn resolve_channel(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let sampler = self.attr_uri(node, "source")?;
        self.elements.sampler(self.doc, sampler)?;
        let target_str = self.doc.require_attr(node, "target")?.to_string();
        let target = anim::resolve_channel_target(self.doc, self.elements, &target_str)?;
        if let ChannelTarget::Transform { element, .. } = target {
            self.elements
                .transform_mut(self.doc, element)?
                .attached_channels
                .push(eid);
        }
        let channel = self.elements.channel_mut(self.doc, eid)?;
        channel.sampler = Some(sampler);
        channel.target = target;
        Ok(())
    }

    fn resolve_sampler(&mut self, eid: ElementId, node: NodeId) -> Result<()> {
        let input = self.input_with_semantic(node, "input")?;
        let output = self.input_with_semantic(node, "output")?;
        // Required, but the interpolation mode itself is ignored; playback
        // is always linear.
        self.input_with_semantic(node, "interpolation")?;
        let sampler = self.elements.sampler_mut(self.doc, eid)?;
        sampler.input = Some(input);
        sampler.output = Some(output);
        Ok(())
    }
}
