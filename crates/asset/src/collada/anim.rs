//! Animation channel target grammar: `id/sid/.../sid.field(i)(j)` paths
//! resolved against the recreated element graph.

use corelib::transform::TransformKind;
use log::warn;

use super::document::Document;
use super::elements::{ChannelTarget, Elements, TransformElement};
use super::error::{LoadError, Result};
use super::resolve::resolve_uri_node;

/// Resolve a channel `target` attribute.
///
/// The head of the path is a document-wide id; every following segment is
/// a scoped ID looked up breadth-first under the previous node. A path
/// that walks through a node the factory did not recreate downgrades the
/// channel to [`ChannelTarget::Unsupported`] with a warning; a path that
/// does not parse, or that lands on anything but a transform, is an error.
pub(crate) fn resolve_channel_target(
    doc: &Document,
    elements: &Elements,
    target: &str,
) -> Result<ChannelTarget> {
    let (rest, index_path) = strip_index_path(target)?;
    let (path, field) = split_field(rest);

    let mut segments = path.split('/');
    let head = segments.next().unwrap_or("");
    let mut node = resolve_uri_node(doc, elements, &format!("#{head}"))?;
    let mut element = match elements.element_for_node(node) {
        Some(eid) => eid,
        None => {
            warn!("channel target '{target}' walks through an unsupported node; channel dropped");
            return Ok(ChannelTarget::Unsupported);
        }
    };
    for segment in segments {
        node = doc.find_child_by_sid(node, segment)?;
        element = match elements.element_for_node(node) {
            Some(eid) => eid,
            None => {
                warn!(
                    "channel target '{target}' walks through an unsupported node; channel dropped"
                );
                return Ok(ChannelTarget::Unsupported);
            }
        };
    }

    let transform = elements.transform(doc, element)?;
    let subvalue = subvalue_index(transform, field.as_deref(), &index_path, target)?;
    Ok(ChannelTarget::Transform { element, subvalue })
}

/// Strip trailing `(i)` groups, returning them in document order.
fn strip_index_path(target: &str) -> Result<(&str, Vec<usize>)> {
    let mut rest = target;
    let mut indices = Vec::new();
    while rest.ends_with(')') {
        let open = rest.rfind('(').ok_or_else(|| LoadError::BadChannelTarget {
            target: target.to_string(),
            reason: "unbalanced index path",
        })?;
        let inner = &rest[open + 1..rest.len() - 1];
        let index = inner.parse().map_err(|_| LoadError::BadChannelTarget {
            target: target.to_string(),
            reason: "index path entries must be non-negative integers",
        })?;
        indices.push(index);
        rest = &rest[..open];
    }
    indices.reverse();
    Ok((rest, indices))
}

/// Split a trailing `.field`, if the last `.` comes after the last `/`.
fn split_field(rest: &str) -> (&str, Option<String>) {
    match rest.rfind('.') {
        Some(dot) if rest.rfind('/').is_none_or(|slash| slash < dot) => {
            (&rest[..dot], Some(rest[dot + 1..].to_ascii_lowercase()))
        }
        _ => (rest, None),
    }
}

/// Map a field or index path to a component index of the target value.
/// An index path takes precedence over a field.
fn subvalue_index(
    transform: &TransformElement,
    field: Option<&str>,
    index_path: &[usize],
    target: &str,
) -> Result<Option<usize>> {
    let bad = |reason| LoadError::BadChannelTarget {
        target: target.to_string(),
        reason,
    };
    match *index_path {
        [] => {}
        [index] => {
            let len = transform.transform.value.components.len();
            if index >= len {
                return Err(bad("index out of bounds for the target value"));
            }
            return Ok(Some(index));
        }
        [column, row] => {
            if transform.transform.kind != TransformKind::Matrix {
                return Err(bad("two-index paths only address matrix targets"));
            }
            if column > 3 || row > 3 {
                return Err(bad("matrix index out of bounds"));
            }
            return Ok(Some(4 * row + column));
        }
        _ => return Err(bad("index paths deeper than two are not supported")),
    }

    let Some(field) = field else {
        return Ok(None);
    };
    match field {
        "angle" => {
            if transform.transform.kind != TransformKind::Rotate {
                return Err(bad("the 'angle' field only addresses rotations"));
            }
            Ok(Some(3))
        }
        "x" | "y" | "z" => {
            let supported = matches!(
                transform.transform.kind,
                TransformKind::Rotate | TransformKind::Translate | TransformKind::Scale
            );
            if !supported {
                return Err(bad("axis fields do not address matrix targets"));
            }
            Ok(Some((field.as_bytes()[0] - b'x') as usize))
        }
        _ => Err(bad("unknown field")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::elements::ChannelTarget;
    use crate::collada::test_support::resolve_document;

    fn target_of(xml: &str, target: &str) -> Result<ChannelTarget> {
        let (doc, elements) = resolve_document(xml)?;
        resolve_channel_target(&doc, &elements, target)
    }

    const SKELETON: &str = r#"
        <COLLADA>
          <node id="armature" type="NODE">
            <node id="bone" sid="bone" type="JOINT">
              <matrix sid="pose">1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</matrix>
              <translate sid="location">0 0 0</translate>
              <rotate sid="spin">0 0 1 0</rotate>
              <extra sid="meta"/>
            </node>
          </node>
        </COLLADA>
    "#;

    #[test]
    fn field_targets_map_to_component_indices() {
        let result = target_of(SKELETON, "bone/spin.ANGLE").unwrap();
        assert!(matches!(
            result,
            ChannelTarget::Transform {
                subvalue: Some(3),
                ..
            }
        ));
        let result = target_of(SKELETON, "bone/location.Y").unwrap();
        assert!(matches!(
            result,
            ChannelTarget::Transform {
                subvalue: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn whole_value_target_has_no_subvalue() {
        let result = target_of(SKELETON, "bone/pose").unwrap();
        assert!(matches!(
            result,
            ChannelTarget::Transform { subvalue: None, .. }
        ));
    }

    #[test]
    fn matrix_two_index_target_is_row_major_flat() {
        let result = target_of(SKELETON, "bone/pose(3)(1)").unwrap();
        // Component index 4 * second + first.
        assert!(matches!(
            result,
            ChannelTarget::Transform {
                subvalue: Some(7),
                ..
            }
        ));
    }

    #[test]
    fn single_index_target_is_bounds_checked() {
        let result = target_of(SKELETON, "bone/spin(2)").unwrap();
        assert!(matches!(
            result,
            ChannelTarget::Transform {
                subvalue: Some(2),
                ..
            }
        ));
        assert!(matches!(
            target_of(SKELETON, "bone/spin(7)"),
            Err(LoadError::BadChannelTarget { .. })
        ));
    }

    #[test]
    fn path_through_unsupported_node_downgrades_channel() {
        let result = target_of(SKELETON, "bone/meta").unwrap();
        assert!(matches!(result, ChannelTarget::Unsupported));
    }

    #[test]
    fn unresolvable_sid_is_an_error() {
        assert!(matches!(
            target_of(SKELETON, "bone/absent.X"),
            Err(LoadError::UnresolvedSid { .. })
        ));
    }

    #[test]
    fn non_transform_target_is_an_error() {
        assert!(matches!(
            target_of(SKELETON, "bone"),
            Err(LoadError::WrongElementType { .. })
        ));
    }

    #[test]
    fn angle_field_requires_a_rotation() {
        assert!(matches!(
            target_of(SKELETON, "bone/location.ANGLE"),
            Err(LoadError::BadChannelTarget { .. })
        ));
    }
}
