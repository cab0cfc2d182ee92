//! End-to-end loading of a small skinned quad with a two-joint skeleton
//! and one animation channel.

use asset::mesh::JointWeight;
use asset::{LoadError, load_mesh_from_str};
use corelib::{dvec3, weak_eq};

const IDENTITY: &str = "1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1";

fn quad_document() -> String {
    format!(
        r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <library_geometries>
    <geometry id="quad-geom">
      <mesh>
        <source id="quad-pos">
          <float_array id="quad-pos-array" count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
          <technique_common>
            <accessor source="#quad-pos-array" count="4" stride="3">
              <param name="X" type="float"/>
              <param name="Y" type="float"/>
              <param name="Z" type="float"/>
            </accessor>
          </technique_common>
        </source>
        <vertices id="quad-verts">
          <input semantic="POSITION" source="#quad-pos"/>
        </vertices>
        <polylist count="1">
          <input semantic="VERTEX" source="#quad-verts" offset="0"/>
          <vcount>4</vcount>
          <p>0 1 2 3</p>
        </polylist>
      </mesh>
    </geometry>
  </library_geometries>
  <library_controllers>
    <controller id="quad-skin">
      <skin source="#quad-geom">
        <bind_shape_matrix>{IDENTITY}</bind_shape_matrix>
        <source id="skin-joints">
          <Name_array id="skin-joints-array" count="2">Root Tip</Name_array>
          <technique_common>
            <accessor source="#skin-joints-array" count="2" stride="1">
              <param name="JOINT" type="name"/>
            </accessor>
          </technique_common>
        </source>
        <source id="skin-ibm">
          <float_array id="skin-ibm-array" count="32">{IDENTITY} {IDENTITY}</float_array>
          <technique_common>
            <accessor source="#skin-ibm-array" count="2" stride="16">
              <param type="float4x4"/>
            </accessor>
          </technique_common>
        </source>
        <source id="skin-weights">
          <float_array id="skin-weights-array" count="3">1 0.25 0.75</float_array>
          <technique_common>
            <accessor source="#skin-weights-array" count="3" stride="1">
              <param type="float"/>
            </accessor>
          </technique_common>
        </source>
        <joints>
          <input semantic="JOINT" source="#skin-joints"/>
          <input semantic="INV_BIND_MATRIX" source="#skin-ibm"/>
        </joints>
        <vertex_weights count="4">
          <input semantic="JOINT" source="#skin-joints" offset="0"/>
          <input semantic="WEIGHT" source="#skin-weights" offset="1"/>
          <vcount>1 1 2 2</vcount>
          <v>0 0 0 0 0 1 1 2 0 1 1 2</v>
        </vertex_weights>
      </skin>
    </controller>
  </library_controllers>
  <library_animations>
    <animation id="spin-anim">
      <source id="anim-times">
        <float_array id="anim-times-array" count="3">0 1 2</float_array>
        <technique_common>
          <accessor source="#anim-times-array" count="3" stride="1">
            <param name="TIME" type="float"/>
          </accessor>
        </technique_common>
      </source>
      <source id="anim-values">
        <float_array id="anim-values-array" count="3">0 90 0</float_array>
        <technique_common>
          <accessor source="#anim-values-array" count="3" stride="1">
            <param type="float"/>
          </accessor>
        </technique_common>
      </source>
      <source id="anim-interp">
        <Name_array id="anim-interp-array" count="3">LINEAR LINEAR LINEAR</Name_array>
        <technique_common>
          <accessor source="#anim-interp-array" count="3" stride="1">
            <param name="INTERPOLATION" type="name"/>
          </accessor>
        </technique_common>
      </source>
      <sampler id="anim-sampler">
        <input semantic="INPUT" source="#anim-times"/>
        <input semantic="OUTPUT" source="#anim-values"/>
        <input semantic="INTERPOLATION" source="#anim-interp"/>
      </sampler>
      <channel source="#anim-sampler" target="root-joint/spin.ANGLE"/>
    </animation>
  </library_animations>
  <library_visual_scenes>
    <visual_scene id="scene">
      <node id="armature-node" type="NODE">
        <translate sid="arm-loc">0 0 1</translate>
        <node id="root-joint" sid="Root" type="JOINT">
          <translate sid="location">0 0 0</translate>
          <rotate sid="spin">0 0 1 0</rotate>
          <node id="tip-joint" sid="Tip" type="JOINT">
            <translate sid="tip-loc">1 0 0</translate>
          </node>
        </node>
      </node>
      <node id="mesh-node" type="NODE">
        <instance_controller url="#quad-skin">
          <skeleton>#root-joint</skeleton>
        </instance_controller>
      </node>
    </visual_scene>
  </library_visual_scenes>
</COLLADA>"##
    )
}

#[test]
fn quad_is_fan_triangulated() {
    let mesh = load_mesh_from_str(&quad_document()).unwrap();
    assert!(mesh.is_valid());
    assert_eq!(mesh.vertices.len(), 4);
    assert_eq!(mesh.polylists.len(), 1);
    assert_eq!(mesh.polylists[0].indices, vec![0, 1, 2, 0, 2, 3]);
    assert_eq!(mesh.triangle_count(), 2);
    assert_eq!(mesh.vertices[2].position, dvec3(1.0, 1.0, 0.0));
}

#[test]
fn vertex_weights_are_normalized() {
    let mesh = load_mesh_from_str(&quad_document()).unwrap();
    assert_eq!(
        mesh.vertex_weights[0],
        vec![JointWeight {
            joint: 0,
            weight: 1.0
        }]
    );
    let blended = &mesh.vertex_weights[2];
    assert_eq!(blended.len(), 2);
    assert_eq!(blended[0].joint, 0);
    assert!(weak_eq(blended[0].weight, 0.25));
    assert_eq!(blended[1].joint, 1);
    assert!(weak_eq(blended[1].weight, 0.75));
    for weights in &mesh.vertex_weights {
        let total: f64 = weights.iter().map(|w| w.weight).sum();
        assert!(weak_eq(total, 1.0));
    }
}

#[test]
fn skeleton_hierarchy_and_armature_are_loaded() {
    let mesh = load_mesh_from_str(&quad_document()).unwrap();
    assert_eq!(mesh.joints.len(), 2);
    assert_eq!(mesh.joints[0].parent_index, None);
    assert_eq!(mesh.joints[0].children_indices, vec![1]);
    assert_eq!(mesh.joints[0].transform_stack.transforms.len(), 2);
    assert_eq!(mesh.joints[1].parent_index, Some(0));
    assert_eq!(mesh.joints[1].transform_stack.transforms.len(), 1);
    assert_eq!(mesh.armature_transform_stack.transforms.len(), 1);
}

#[test]
fn rest_pose_skinning_follows_the_joint_world_matrices() {
    let mut mesh = load_mesh_from_str(&quad_document()).unwrap();
    mesh.apply_skinning();
    // Root-only vertices ride the armature translation.
    assert_eq!(mesh.vertices[0].skinned_position, dvec3(0.0, 0.0, 1.0));
    // Blended vertices also pick up 75% of the tip offset.
    let blended = mesh.vertices[2].skinned_position;
    let expected = dvec3(1.75, 1.0, 1.0);
    assert!((blended - expected).length() < 1e-9, "{blended:?}");
}

#[test]
fn animation_channel_targets_the_rotation_angle() {
    let mesh = load_mesh_from_str(&quad_document()).unwrap();
    assert_eq!(mesh.animation_channels.len(), 1);
    let channel = &mesh.animation_channels[0];
    assert_eq!(channel.joint_index, 0);
    assert_eq!(channel.transform_index, 1);
    assert_eq!(channel.subvalue_index, Some(3));
    assert_eq!(channel.times, vec![0.0, 1.0, 2.0]);
}

#[test]
fn animation_interpolates_and_wraps() {
    let mut mesh = load_mesh_from_str(&quad_document()).unwrap();
    let angle = |mesh: &asset::mesh::Mesh| {
        mesh.joints[0].transform_stack.transforms[1].value.components[3]
    };
    mesh.apply_animation(0.5);
    assert!(weak_eq(angle(&mesh), 45.0));
    mesh.apply_animation(1.0);
    assert!(weak_eq(angle(&mesh), 90.0));
    // Times beyond the keyframe span wrap around.
    mesh.apply_animation(2.5);
    assert!(weak_eq(angle(&mesh), 45.0));
    mesh.apply_animation(-0.5);
    assert!(weak_eq(angle(&mesh), 45.0));
}

#[test]
fn animated_pose_moves_skinned_vertices() {
    let mut mesh = load_mesh_from_str(&quad_document()).unwrap();
    mesh.apply_animation(1.0);
    mesh.apply_skinning();
    // At 90 degrees about Z the tip joint sits at (0, 1, 1); a vertex
    // fully bound to the root just rotates around it.
    let origin_bound = mesh.vertices[1].skinned_position;
    let expected = dvec3(0.0, 1.0, 1.0);
    assert!(
        (origin_bound - expected).length() < 1e-9,
        "{origin_bound:?}"
    );
}

#[test]
fn bind_shape_matrix_is_premultiplied_once() {
    let translated = quad_document().replace(
        &format!("<bind_shape_matrix>{IDENTITY}</bind_shape_matrix>"),
        "<bind_shape_matrix>1 0 0 10 0 1 0 0 0 0 1 0 0 0 0 1</bind_shape_matrix>",
    );
    let mesh = load_mesh_from_str(&translated).unwrap();
    assert_eq!(mesh.vertices[0].position, dvec3(10.0, 0.0, 0.0));
    assert_eq!(mesh.vertices[0].skinned_position, dvec3(10.0, 0.0, 0.0));
}

#[test]
fn unsupported_channel_targets_are_tolerated() {
    // Retarget the channel at a node the factory does not recreate; the
    // channel is dropped but the mesh still loads.
    let doc = quad_document().replace(
        r#"target="root-joint/spin.ANGLE""#,
        r#"target="root-joint/meta""#,
    );
    let doc = doc.replace(
        r#"<rotate sid="spin">0 0 1 0</rotate>"#,
        r#"<rotate sid="spin">0 0 1 0</rotate><extra sid="meta"/>"#,
    );
    let mesh = load_mesh_from_str(&doc).unwrap();
    assert!(mesh.animation_channels.is_empty());
    assert_eq!(mesh.vertices.len(), 4);
}

#[test]
fn missing_skeleton_is_an_error() {
    let doc = quad_document().replace("<skeleton>#root-joint</skeleton>", "");
    assert!(matches!(
        load_mesh_from_str(&doc),
        Err(LoadError::MissingChild {
            child: "skeleton",
            ..
        })
    ));
}

#[test]
fn dangling_controller_url_is_an_error() {
    let doc = quad_document().replace(r##"url="#quad-skin""##, r##"url="#missing""##);
    assert!(matches!(
        load_mesh_from_str(&doc),
        Err(LoadError::UnresolvedUri { .. })
    ));
}

#[test]
fn document_without_instance_controller_is_rejected() {
    let result = load_mesh_from_str("<COLLADA><library_geometries/></COLLADA>");
    assert!(matches!(result, Err(LoadError::Unsupported { .. })));
}

#[test]
fn skinned_position_starts_at_the_bind_pose() {
    let mesh = load_mesh_from_str(&quad_document()).unwrap();
    for vertex in &mesh.vertices {
        assert_eq!(vertex.position, vertex.skinned_position);
    }
    // The initial joint matrices are already usable without animation.
    assert_ne!(mesh.joints[0].skinning_matrix, corelib::DMat4::IDENTITY);
}
