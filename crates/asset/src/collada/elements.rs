//! Typed elements recreated from document nodes, and the registry that
//! overlays them on the raw tree.

use std::collections::HashMap;

use corelib::transform::Transform;

use super::document::{Document, NodeId};
use super::error::{LoadError, Result};

pub type ElementId = usize;

/// A recreated element: typed payload plus the node it came from.
#[derive(Debug)]
pub struct Element {
    pub id: Option<String>,
    pub node: NodeId,
    pub data: ElementData,
}

#[derive(Debug)]
pub enum ElementData {
    FloatArray(FloatArray),
    NameArray(NameArray),
    Param(ParamElement),
    Accessor(AccessorElement),
    Source(SourceElement),
    Input(InputElement),
    Vertices(VerticesElement),
    Polylist(PolylistElement),
    Mesh(MeshElement),
    Transform(TransformElement),
    SceneNode(SceneNodeElement),
    Geometry(GeometryElement),
    Joints(JointsElement),
    VertexWeights(VertexWeightsElement),
    Skin(SkinElement),
    Controller(ControllerElement),
    InstanceController(InstanceControllerElement),
    Channel(ChannelElement),
    Sampler(SamplerElement),
}

#[derive(Debug, Default)]
pub struct FloatArray {
    pub values: Vec<f64>,
}

/// Backs both `Name_array` and `IDREF_array`.
#[derive(Debug, Default)]
pub struct NameArray {
    pub values: Vec<String>,
}

#[derive(Debug)]
pub struct ParamElement {
    /// Lowercased type name, e.g. `float` or `float4x4`.
    pub param_type: String,
}

#[derive(Debug)]
pub struct AccessorElement {
    pub count: usize,
    pub stride: usize,
    pub source_array: Option<ElementId>,
    pub params: Vec<ElementId>,
}

#[derive(Debug, Default)]
pub struct SourceElement {
    pub accessor: Option<ElementId>,
}

/// What an input's `source` URI resolved to.
#[derive(Clone, Copy, Debug)]
pub enum InputSource {
    Source(ElementId),
    Vertices(ElementId),
}

#[derive(Debug)]
pub struct InputElement {
    /// Lowercased semantic name.
    pub semantic: String,
    pub offset: usize,
    pub source: Option<InputSource>,
}

#[derive(Debug, Default)]
pub struct VerticesElement {
    /// Input with the `position` semantic.
    pub position: Option<ElementId>,
}

/// Backs both `polylist` and `triangles`.
#[derive(Debug)]
pub struct PolylistElement {
    pub vertex_counts: Vec<usize>,
    pub indices: Vec<usize>,
    /// Indices per face vertex, derived from the index stream length.
    pub index_block_size: usize,
    /// Input with the `vertex` semantic.
    pub vertex_input: Option<ElementId>,
}

#[derive(Debug, Default)]
pub struct MeshElement {
    pub polylists: Vec<ElementId>,
}

#[derive(Debug)]
pub struct TransformElement {
    pub transform: Transform,
    /// Channels that animate this transform, filled during link resolution.
    pub attached_channels: Vec<ElementId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneNodeType {
    Node,
    Joint,
}

#[derive(Debug)]
pub struct SceneNodeElement {
    pub node_type: SceneNodeType,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    /// Transform children in document order.
    pub transforms: Vec<ElementId>,
}

#[derive(Debug, Default)]
pub struct GeometryElement {
    pub mesh: Option<ElementId>,
}

#[derive(Debug, Default)]
pub struct JointsElement {
    pub joint_input: Option<ElementId>,
    pub inv_bind_input: Option<ElementId>,
}

#[derive(Debug)]
pub struct VertexWeightsElement {
    /// Influences per vertex.
    pub influence_counts: Vec<usize>,
    pub indices: Vec<usize>,
    pub joint_input: Option<ElementId>,
    pub weight_input: Option<ElementId>,
}

#[derive(Debug, Default)]
pub struct SkinElement {
    pub geometry: Option<ElementId>,
    pub bind_shape: Option<ElementId>,
    pub joints: Option<ElementId>,
    pub vertex_weights: Option<ElementId>,
}

#[derive(Debug, Default)]
pub struct ControllerElement {
    pub skin: Option<ElementId>,
}

#[derive(Debug, Default)]
pub struct InstanceControllerElement {
    pub controller: Option<ElementId>,
    /// Root scene node of the skeleton.
    pub skeleton: Option<ElementId>,
    /// Parent scene node of the skeleton root.
    pub armature: Option<ElementId>,
}

#[derive(Debug, Default)]
pub enum ChannelTarget {
    /// The target path walked through a node the factory did not recreate;
    /// the channel is kept but never applied.
    #[default]
    Unsupported,
    Transform {
        element: ElementId,
        /// Component index within the transform's value, `None` for the
        /// whole value.
        subvalue: Option<usize>,
    },
}

#[derive(Debug, Default)]
pub struct ChannelElement {
    pub sampler: Option<ElementId>,
    pub target: ChannelTarget,
}

#[derive(Debug, Default)]
pub struct SamplerElement {
    pub input: Option<ElementId>,
    pub output: Option<ElementId>,
}

/// Unwrap a link that resolution must have filled in.
pub(crate) fn resolved<T: Copy>(link: Option<T>, what: &'static str) -> Result<T> {
    link.ok_or(LoadError::UnresolvedLink { what })
}

/// Registry of recreated elements, indexed by element id, node id and
/// document-wide `id` attribute.
pub struct Elements {
    items: Vec<Element>,
    /// Node -> element overlay, parallel to the document arena.
    by_node: Vec<Option<ElementId>>,
    /// `id` attribute -> node. Duplicates are not validated; the node
    /// visited last wins.
    ids: HashMap<String, NodeId>,
}

macro_rules! downcast {
    ($name:ident, $name_mut:ident, $variant:ident, $ty:ty, $tag:literal) => {
        pub fn $name(&self, doc: &Document, id: ElementId) -> Result<&$ty> {
            match &self.items[id].data {
                ElementData::$variant(inner) => Ok(inner),
                _ => Err(LoadError::WrongElementType {
                    expected: $tag,
                    node: doc.node_path(self.items[id].node),
                }),
            }
        }

        #[allow(dead_code)]
        pub fn $name_mut(&mut self, doc: &Document, id: ElementId) -> Result<&mut $ty> {
            let node = self.items[id].node;
            match &mut self.items[id].data {
                ElementData::$variant(inner) => Ok(inner),
                _ => Err(LoadError::WrongElementType {
                    expected: $tag,
                    node: doc.node_path(node),
                }),
            }
        }
    };
}

impl Elements {
    pub fn new(node_count: usize) -> Self {
        Elements {
            items: Vec::new(),
            by_node: vec![None; node_count],
            ids: HashMap::new(),
        }
    }

    pub fn insert(&mut self, element: Element) -> ElementId {
        let node = element.node;
        let id = self.items.len();
        self.items.push(element);
        self.by_node[node] = Some(id);
        id
    }

    pub fn record_id(&mut self, id: String, node: NodeId) {
        self.ids.insert(id, node);
    }

    pub fn get(&self, id: ElementId) -> &Element {
        &self.items[id]
    }

    pub fn element_for_node(&self, node: NodeId) -> Option<ElementId> {
        self.by_node[node]
    }

    pub fn node_by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    downcast!(float_array, float_array_mut, FloatArray, FloatArray, "float_array");
    downcast!(name_array, name_array_mut, NameArray, NameArray, "Name_array");
    downcast!(param, param_mut, Param, ParamElement, "param");
    downcast!(accessor, accessor_mut, Accessor, AccessorElement, "accessor");
    downcast!(source, source_mut, Source, SourceElement, "source");
    downcast!(input, input_mut, Input, InputElement, "input");
    downcast!(vertices, vertices_mut, Vertices, VerticesElement, "vertices");
    downcast!(polylist, polylist_mut, Polylist, PolylistElement, "polylist");
    downcast!(mesh, mesh_mut, Mesh, MeshElement, "mesh");
    downcast!(transform, transform_mut, Transform, TransformElement, "transform");
    downcast!(scene_node, scene_node_mut, SceneNode, SceneNodeElement, "node");
    downcast!(geometry, geometry_mut, Geometry, GeometryElement, "geometry");
    downcast!(joints, joints_mut, Joints, JointsElement, "joints");
    downcast!(
        vertex_weights,
        vertex_weights_mut,
        VertexWeights,
        VertexWeightsElement,
        "vertex_weights"
    );
    downcast!(skin, skin_mut, Skin, SkinElement, "skin");
    downcast!(controller, controller_mut, Controller, ControllerElement, "controller");
    downcast!(
        instance_controller,
        instance_controller_mut,
        InstanceController,
        InstanceControllerElement,
        "instance_controller"
    );
    downcast!(channel, channel_mut, Channel, ChannelElement, "channel");
    downcast!(sampler, sampler_mut, Sampler, SamplerElement, "sampler");
}
