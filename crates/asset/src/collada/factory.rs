//! Element factory: walks the raw tree, recreates typed elements for
//! recognized tags and splices wrapper tags out of the arena.

use corelib::transform::{Transform, TransformKind};
use corelib::value::Value;

use super::document::{Document, NodeId};
use super::elements::{
    AccessorElement, ChannelElement, ControllerElement, Element, ElementData, Elements, FloatArray,
    GeometryElement, InputElement, InstanceControllerElement, JointsElement, MeshElement,
    NameArray, ParamElement, PolylistElement, SamplerElement, SceneNodeElement, SceneNodeType,
    SkinElement, SourceElement, TransformElement, VertexWeightsElement, VerticesElement,
};
use super::error::{LoadError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ElementKind {
    FloatArray,
    NameArray,
    Param,
    Accessor,
    Source,
    Input,
    Vertices,
    Polylist,
    Mesh,
    Transform,
    SceneNode,
    Geometry,
    Joints,
    VertexWeights,
    Skin,
    Controller,
    InstanceController,
    Channel,
    Sampler,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TagAction {
    /// Recreate a typed element and keep walking.
    Build(ElementKind),
    /// Remove the node, splicing its children into its parent.
    Elide,
    /// Keep the node but do not descend into it.
    SkipSubtree,
    /// Nothing to recreate; keep walking.
    Walk,
}

fn classify(tag: &str) -> TagAction {
    let tag = tag.to_ascii_lowercase();
    if tag.starts_with("technique") || tag.starts_with("profile") {
        return TagAction::Elide;
    }
    let kind = match tag.as_str() {
        "sampler2d" => return TagAction::SkipSubtree,
        "float_array" => ElementKind::FloatArray,
        "name_array" | "idref_array" => ElementKind::NameArray,
        "param" => ElementKind::Param,
        "accessor" => ElementKind::Accessor,
        "source" => ElementKind::Source,
        "input" => ElementKind::Input,
        "vertices" => ElementKind::Vertices,
        "polylist" | "triangles" => ElementKind::Polylist,
        "mesh" => ElementKind::Mesh,
        "matrix" | "bind_shape_matrix" | "rotate" | "translate" | "scale" | "skew" | "lookat" => {
            ElementKind::Transform
        }
        "node" => ElementKind::SceneNode,
        "geometry" => ElementKind::Geometry,
        "joints" => ElementKind::Joints,
        "vertex_weights" => ElementKind::VertexWeights,
        "skin" => ElementKind::Skin,
        "controller" => ElementKind::Controller,
        "instance_controller" => ElementKind::InstanceController,
        "channel" => ElementKind::Channel,
        "sampler" => ElementKind::Sampler,
        _ => return TagAction::Walk,
    };
    TagAction::Build(kind)
}

/// Run the factory over the whole document. Returns (nodes visited,
/// elements recreated).
pub(crate) fn run(doc: &mut Document, elements: &mut Elements) -> Result<(usize, usize)> {
    let mut factory = Factory {
        doc,
        elements,
        visited: 0,
        recreated: 0,
    };
    let root = factory.doc.root();
    factory.process(root)?;
    Ok((factory.visited, factory.recreated))
}

struct Factory<'a> {
    doc: &'a mut Document,
    elements: &'a mut Elements,
    visited: usize,
    recreated: usize,
}

impl Factory<'_> {
    /// Process one node and its subtree. Returns true when the node must
    /// be elided by the caller.
    fn process(&mut self, node: NodeId) -> Result<bool> {
        self.visited += 1;
        let action = classify(self.doc.name(node));

        if let TagAction::Build(kind) = action {
            let data = parse_from_node(kind, self.doc, node)?;
            self.elements.insert(Element {
                id: self.doc.attr(node, "id").map(str::to_string),
                node,
                data,
            });
            self.recreated += 1;
        }
        // Ids are indexed even for nodes that end up elided or skipped.
        if let Some(id) = self.doc.attr(node, "id") {
            self.elements.record_id(id.to_string(), node);
        }

        if action != TagAction::SkipSubtree {
            let mut i = 0;
            while i < self.doc.children(node).len() {
                let child = self.doc.children(node)[i];
                if self.process(child)? {
                    // Grandchildren were already processed above; step
                    // past everything just spliced in.
                    let spliced = self.doc.splice_child_into_parent(node, i);
                    i += spliced;
                } else {
                    i += 1;
                }
            }
        }

        Ok(action == TagAction::Elide)
    }
}

fn parse_from_node(kind: ElementKind, doc: &Document, node: NodeId) -> Result<ElementData> {
    Ok(match kind {
        ElementKind::FloatArray => ElementData::FloatArray(parse_float_array(doc, node)?),
        ElementKind::NameArray => ElementData::NameArray(parse_name_array(doc, node)?),
        ElementKind::Param => ElementData::Param(ParamElement {
            param_type: doc.require_attr(node, "type")?.to_ascii_lowercase(),
        }),
        ElementKind::Accessor => ElementData::Accessor(AccessorElement {
            count: doc.parse_attr(node, "count")?,
            stride: doc.parse_attr(node, "stride")?,
            source_array: None,
            params: Vec::new(),
        }),
        ElementKind::Source => ElementData::Source(SourceElement::default()),
        ElementKind::Input => ElementData::Input(InputElement {
            semantic: doc.require_attr(node, "semantic")?.to_ascii_lowercase(),
            offset: doc.parse_attr_or(node, "offset", 0)?,
            source: None,
        }),
        ElementKind::Vertices => ElementData::Vertices(VerticesElement::default()),
        ElementKind::Polylist => ElementData::Polylist(parse_polylist(doc, node)?),
        ElementKind::Mesh => ElementData::Mesh(MeshElement::default()),
        ElementKind::Transform => ElementData::Transform(parse_transform(doc, node)?),
        ElementKind::SceneNode => ElementData::SceneNode(parse_scene_node(doc, node)?),
        ElementKind::Geometry => ElementData::Geometry(GeometryElement::default()),
        ElementKind::Joints => ElementData::Joints(JointsElement::default()),
        ElementKind::VertexWeights => ElementData::VertexWeights(parse_vertex_weights(doc, node)?),
        ElementKind::Skin => ElementData::Skin(SkinElement::default()),
        ElementKind::Controller => ElementData::Controller(ControllerElement::default()),
        ElementKind::InstanceController => {
            ElementData::InstanceController(InstanceControllerElement::default())
        }
        ElementKind::Channel => ElementData::Channel(ChannelElement::default()),
        ElementKind::Sampler => ElementData::Sampler(SamplerElement::default()),
    })
}

fn require_id(doc: &Document, node: NodeId) -> Result<()> {
    if doc.attr(node, "id").is_none() {
        return Err(LoadError::MissingId {
            node: doc.node_path(node),
        });
    }
    Ok(())
}

fn parse_float_array(doc: &Document, node: NodeId) -> Result<FloatArray> {
    require_id(doc, node)?;
    let declared: usize = doc.parse_attr(node, "count")?;
    let values: Vec<f64> = doc.parse_text(node)?;
    if values.len() != declared {
        return Err(LoadError::CountMismatch {
            what: "array values",
            declared,
            actual: values.len(),
            node: doc.node_path(node),
        });
    }
    Ok(FloatArray { values })
}

fn parse_name_array(doc: &Document, node: NodeId) -> Result<NameArray> {
    require_id(doc, node)?;
    let declared: usize = doc.parse_attr(node, "count")?;
    let values: Vec<String> = doc.parse_text(node)?;
    if values.len() != declared {
        return Err(LoadError::CountMismatch {
            what: "array values",
            declared,
            actual: values.len(),
            node: doc.node_path(node),
        });
    }
    Ok(NameArray { values })
}

fn parse_polylist(doc: &Document, node: NodeId) -> Result<PolylistElement> {
    let face_count: usize = doc.parse_attr(node, "count")?;
    // A `triangles` block is a polylist with an implied vcount of 3s.
    let vertex_counts: Vec<usize> = if doc.name(node).eq_ignore_ascii_case("triangles") {
        vec![3; face_count]
    } else {
        doc.parse_text(doc.single_child(node, "vcount")?)?
    };
    if vertex_counts.len() != face_count {
        return Err(LoadError::CountMismatch {
            what: "vcount entries",
            declared: face_count,
            actual: vertex_counts.len(),
            node: doc.node_path(node),
        });
    }
    let indices: Vec<usize> = doc.parse_text(doc.single_child(node, "p")?)?;
    let total_vertices: usize = vertex_counts.iter().sum();
    let index_block_size = if total_vertices == 0 {
        1
    } else {
        if indices.len() % total_vertices != 0 {
            return Err(LoadError::CountMismatch {
                what: "indices per face vertex",
                declared: total_vertices,
                actual: indices.len(),
                node: doc.node_path(node),
            });
        }
        indices.len() / total_vertices
    };
    Ok(PolylistElement {
        vertex_counts,
        indices,
        index_block_size,
        vertex_input: None,
    })
}

fn parse_transform(doc: &Document, node: NodeId) -> Result<TransformElement> {
    let name = doc.name(node).to_ascii_lowercase();
    let kind = match name.as_str() {
        "matrix" | "bind_shape_matrix" => TransformKind::Matrix,
        "rotate" => TransformKind::Rotate,
        "translate" => TransformKind::Translate,
        "scale" => TransformKind::Scale,
        _ => {
            return Err(LoadError::UnsupportedTransform {
                name,
                node: doc.node_path(node),
            });
        }
    };
    let values: Vec<f64> = doc.parse_text(node)?;
    let expected = kind.value_kind().component_count();
    if values.len() != expected {
        return Err(LoadError::CountMismatch {
            what: "transform components",
            declared: expected,
            actual: values.len(),
            node: doc.node_path(node),
        });
    }
    Ok(TransformElement {
        transform: Transform {
            kind,
            value: Value::new(kind.value_kind(), values),
        },
        attached_channels: Vec::new(),
    })
}

fn parse_scene_node(doc: &Document, node: NodeId) -> Result<SceneNodeElement> {
    let raw = doc.attr(node, "type").unwrap_or("NODE");
    let node_type = if raw.eq_ignore_ascii_case("joint") {
        SceneNodeType::Joint
    } else if raw.eq_ignore_ascii_case("node") {
        SceneNodeType::Node
    } else {
        return Err(LoadError::BadAttribute {
            attribute: "type",
            value: raw.to_string(),
            node: doc.node_path(node),
        });
    };
    Ok(SceneNodeElement {
        node_type,
        parent: None,
        children: Vec::new(),
        transforms: Vec::new(),
    })
}

fn parse_vertex_weights(doc: &Document, node: NodeId) -> Result<VertexWeightsElement> {
    let declared: usize = doc.parse_attr(node, "count")?;
    let influence_counts: Vec<usize> = doc.parse_text(doc.single_child(node, "vcount")?)?;
    if influence_counts.len() != declared {
        return Err(LoadError::CountMismatch {
            what: "vcount entries",
            declared,
            actual: influence_counts.len(),
            node: doc.node_path(node),
        });
    }
    let indices: Vec<usize> = doc.parse_text(doc.single_child(node, "v")?)?;
    let total_influences: usize = influence_counts.iter().sum();
    if indices.len() != 2 * total_influences {
        return Err(LoadError::CountMismatch {
            what: "vertex weight indices",
            declared: 2 * total_influences,
            actual: indices.len(),
            node: doc.node_path(node),
        });
    }
    Ok(VertexWeightsElement {
        influence_counts,
        indices,
        joint_input: None,
        weight_input: None,
    })
}
