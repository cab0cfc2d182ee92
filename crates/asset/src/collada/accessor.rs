//! Typed float access over a resolved accessor element.

use corelib::value::{Value, ValueKind};

use super::document::Document;
use super::elements::{ElementId, Elements, resolved};
use super::error::{LoadError, Result};

/// View of a float array through its accessor: `count` values of a fixed
/// arity, validated against the accessor's params and stride.
pub(crate) struct FloatAccessor<'a> {
    kind: ValueKind,
    values: &'a [f64],
    stride: usize,
    count: usize,
}

impl<'a> FloatAccessor<'a> {
    pub fn new(doc: &Document, elements: &'a Elements, accessor: ElementId) -> Result<Self> {
        let node_path = || doc.node_path(elements.get(accessor).node);
        let acc = elements.accessor(doc, accessor)?;
        let array_id = resolved(acc.source_array, "accessor source array")?;
        let array = elements.float_array(doc, array_id)?;
        let array_name = elements
            .get(array_id)
            .id
            .clone()
            .unwrap_or_else(|| doc.node_path(elements.get(array_id).node));

        let params = acc
            .params
            .iter()
            .map(|&p| elements.param(doc, p))
            .collect::<Result<Vec<_>>>()?;
        let (kind, expected_stride) =
            if params.len() == 1 && params[0].param_type == "float4x4" {
                (ValueKind::Float4x4, 16)
            } else {
                if params.is_empty() {
                    return Err(LoadError::AccessorParams {
                        node: node_path(),
                        reason: "at least one param is required",
                    });
                }
                if params.len() > 4 {
                    return Err(LoadError::AccessorParams {
                        node: node_path(),
                        reason: "the widest supported float vector is float4",
                    });
                }
                for param in &params {
                    if param.param_type != "float" {
                        return Err(LoadError::AccessorParams {
                            node: node_path(),
                            reason: "params of a float vector accessor must be of type 'float'",
                        });
                    }
                }
                let kind = match params.len() {
                    1 => ValueKind::Float,
                    2 => ValueKind::Float2,
                    3 => ValueKind::Float3,
                    _ => ValueKind::Float4,
                };
                (kind, params.len())
            };

        if array.values.len() != acc.stride * acc.count {
            return Err(LoadError::AccessorSize {
                array: array_name,
                len: array.values.len(),
                count: acc.count,
                stride: acc.stride,
            });
        }
        if acc.stride != expected_stride {
            return Err(LoadError::AccessorStride {
                array: array_name,
                declared: acc.stride,
                expected: expected_stride,
            });
        }

        Ok(FloatAccessor {
            kind,
            values: &array.values,
            stride: acc.stride,
            count: acc.count,
        })
    }

    /// Like [`FloatAccessor::new`], but demanding a specific value arity.
    pub fn with_kind(
        doc: &Document,
        elements: &'a Elements,
        accessor: ElementId,
        expected: ValueKind,
    ) -> Result<Self> {
        let this = Self::new(doc, elements, accessor)?;
        if this.kind != expected {
            return Err(LoadError::AccessorParams {
                node: doc.node_path(elements.get(accessor).node),
                reason: "accessor params do not match the requested value arity",
            });
        }
        Ok(this)
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// The `index`-th value. Callers validate `index` against [`count`](Self::count).
    pub fn value(&self, index: usize) -> Value {
        debug_assert!(index < self.count);
        let base = index * self.stride;
        Value::new(self.kind, self.values[base..base + self.stride].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::test_support::resolve_document;

    fn source_doc(array: &str, count: usize, stride: usize, params: &str) -> String {
        format!(
            r##"<COLLADA>
                 <source id="s">
                   <float_array id="s-array" count="{n}">{array}</float_array>
                   <technique_common>
                     <accessor source="#s-array" count="{count}" stride="{stride}">
                       {params}
                     </accessor>
                   </technique_common>
                 </source>
               </COLLADA>"##,
            n = array.split_whitespace().count(),
        )
    }

    fn accessor_for(xml: &str) -> Result<(crate::collada::document::Document, Elements, ElementId)> {
        let (doc, elements) = resolve_document(xml)?;
        let source_node = elements.node_by_id("s").expect("source id");
        let source_eid = elements.element_for_node(source_node).expect("source");
        let accessor = elements.source(&doc, source_eid)?.accessor.expect("accessor");
        Ok((doc, elements, accessor))
    }

    #[test]
    fn reads_strided_float_vectors() {
        let xml = source_doc(
            "0 1 2 3 4 5",
            2,
            3,
            r#"<param name="X" type="float"/><param name="Y" type="float"/><param name="Z" type="float"/>"#,
        );
        let (doc, elements, accessor) = accessor_for(&xml).unwrap();
        let access = FloatAccessor::new(&doc, &elements, accessor).unwrap();
        assert_eq!(access.kind(), ValueKind::Float3);
        assert_eq!(access.count(), 2);
        assert_eq!(access.value(0).components, vec![0.0, 1.0, 2.0]);
        assert_eq!(access.value(1).components, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn one_float4x4_param_requires_stride_sixteen() {
        let values = (0..16).map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
        let xml = source_doc(&values, 1, 16, r#"<param type="float4x4"/>"#);
        let (doc, elements, accessor) = accessor_for(&xml).unwrap();
        let access = FloatAccessor::new(&doc, &elements, accessor).unwrap();
        assert_eq!(access.kind(), ValueKind::Float4x4);

        let xml = source_doc(&values, 4, 4, r#"<param type="float4x4"/>"#);
        let (doc, elements, accessor) = accessor_for(&xml).unwrap();
        assert!(matches!(
            FloatAccessor::new(&doc, &elements, accessor),
            Err(LoadError::AccessorStride { .. })
        ));
    }

    #[test]
    fn stride_must_match_param_count() {
        let xml = source_doc(
            "0 1 2 3",
            2,
            2,
            r#"<param type="float"/>"#,
        );
        let (doc, elements, accessor) = accessor_for(&xml).unwrap();
        assert!(matches!(
            FloatAccessor::new(&doc, &elements, accessor),
            Err(LoadError::AccessorStride { .. })
        ));
    }

    #[test]
    fn array_size_must_be_count_times_stride() {
        let xml = source_doc(
            "0 1 2 3 4 5",
            3,
            3,
            r#"<param type="float"/><param type="float"/><param type="float"/>"#,
        );
        let (doc, elements, accessor) = accessor_for(&xml).unwrap();
        assert!(matches!(
            FloatAccessor::new(&doc, &elements, accessor),
            Err(LoadError::AccessorSize { .. })
        ));
    }

    #[test]
    fn param_types_and_arity_are_validated() {
        let xml = source_doc("0", 1, 1, r#"<param type="int"/>"#);
        let (doc, elements, accessor) = accessor_for(&xml).unwrap();
        assert!(matches!(
            FloatAccessor::new(&doc, &elements, accessor),
            Err(LoadError::AccessorParams { .. })
        ));

        let xml = source_doc(
            "0 1",
            1,
            2,
            r#"<param type="float"/><param type="float"/>"#,
        );
        let (doc, elements, accessor) = accessor_for(&xml).unwrap();
        assert!(matches!(
            FloatAccessor::with_kind(&doc, &elements, accessor, ValueKind::Float3),
            Err(LoadError::AccessorParams { .. })
        ));
    }
}
