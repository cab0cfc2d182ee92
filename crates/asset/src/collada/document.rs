//! Raw document index: an arena copy of the parsed XML tree with typed
//! attribute access and scoped-ID search.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;

use xmltree::{Element, XMLNode};

use super::error::{LoadError, Result};

pub type NodeId = usize;

/// One element node of the raw tree.
#[derive(Debug)]
pub struct RawNode {
    pub name: String,
    pub attributes: HashMap<String, String>,
    /// Concatenated text and CDATA content of direct children.
    pub text: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Arena copy of a parsed document.
///
/// The `xmltree` tree is converted once and dropped; all later passes,
/// including the factory's splice surgery, work on this arena. Node ids
/// stay stable for the lifetime of the load.
pub struct Document {
    nodes: Vec<RawNode>,
    root: NodeId,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self> {
        let root = Element::parse(xml.as_bytes())?;
        if !root.name.eq_ignore_ascii_case("collada") {
            return Err(LoadError::WrongRoot { found: root.name });
        }
        let mut doc = Document {
            nodes: Vec::new(),
            root: 0,
        };
        doc.root = doc.add(&root, None);
        Ok(doc)
    }

    fn add(&mut self, elem: &Element, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        let mut text = String::new();
        for child in &elem.children {
            if let XMLNode::Text(s) | XMLNode::CData(s) = child {
                text.push_str(s);
            }
        }
        self.nodes.push(RawNode {
            name: elem.name.clone(),
            attributes: elem.attributes.clone(),
            text,
            parent,
            children: Vec::new(),
        });
        for child in &elem.children {
            if let XMLNode::Element(e) = child {
                let child_id = self.add(e, Some(id));
                self.nodes[id].children.push(child_id);
            }
        }
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id].name
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id].text
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id].attributes.get(name).map(String::as_str)
    }

    /// Slash-separated path from the root, with `#id` markers where present.
    /// Used for diagnostics only.
    pub fn node_path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            let node = &self.nodes[n];
            let mut part = node.name.clone();
            if let Some(id_attr) = node.attributes.get("id") {
                part.push('#');
                part.push_str(id_attr);
            }
            parts.push(part);
            current = node.parent;
        }
        parts.reverse();
        parts.join("/")
    }

    pub fn require_attr(&self, id: NodeId, name: &'static str) -> Result<&str> {
        self.attr(id, name).ok_or_else(|| LoadError::MissingAttribute {
            attribute: name,
            node: self.node_path(id),
        })
    }

    /// Required attribute parsed into `T`.
    pub fn parse_attr<T: FromStr>(&self, id: NodeId, name: &'static str) -> Result<T> {
        let raw = self.require_attr(id, name)?;
        raw.parse().map_err(|_| LoadError::BadAttribute {
            attribute: name,
            value: raw.to_string(),
            node: self.node_path(id),
        })
    }

    /// Optional attribute parsed into `T`, defaulting when absent.
    pub fn parse_attr_or<T: FromStr>(&self, id: NodeId, name: &'static str, default: T) -> Result<T> {
        match self.attr(id, name) {
            Some(raw) => raw.parse().map_err(|_| LoadError::BadAttribute {
                attribute: name,
                value: raw.to_string(),
                node: self.node_path(id),
            }),
            None => Ok(default),
        }
    }

    /// Whitespace-separated parse of the node's text content.
    pub fn parse_text<T: FromStr>(&self, id: NodeId) -> Result<Vec<T>> {
        self.nodes[id]
            .text
            .split_whitespace()
            .map(|token| {
                token.parse().map_err(|_| LoadError::BadValue {
                    token: token.to_string(),
                    node: self.node_path(id),
                })
            })
            .collect()
    }

    /// Direct children with the given tag name (case-insensitive).
    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(move |&c| self.nodes[c].name.eq_ignore_ascii_case(name))
    }

    /// The single child with the given tag; duplicates are an error.
    pub fn single_child(&self, id: NodeId, child: &'static str) -> Result<NodeId> {
        let mut found = None;
        for c in self.children_named(id, child) {
            if found.is_some() {
                return Err(LoadError::DuplicateChild {
                    child,
                    node: self.node_path(id),
                });
            }
            found = Some(c);
        }
        found.ok_or_else(|| LoadError::MissingChild {
            child,
            node: self.node_path(id),
        })
    }

    /// Breadth-first scoped-ID search of the subtree under `start`,
    /// including `start` itself. The shallowest match wins.
    pub fn find_child_by_sid(&self, start: NodeId, sid: &str) -> Result<NodeId> {
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            if self.attr(current, "sid") == Some(sid) {
                return Ok(current);
            }
            queue.extend(self.children(current).iter().copied());
        }
        Err(LoadError::UnresolvedSid {
            sid: sid.to_string(),
            node: self.node_path(start),
        })
    }

    /// Replace the `index`-th child of `parent` with that child's own
    /// children, reparenting them. Returns how many nodes were spliced in.
    pub(crate) fn splice_child_into_parent(&mut self, parent: NodeId, index: usize) -> usize {
        let child = self.nodes[parent].children[index];
        let grandchildren = std::mem::take(&mut self.nodes[child].children);
        for &g in &grandchildren {
            self.nodes[g].parent = Some(parent);
        }
        let count = grandchildren.len();
        self.nodes[parent].children.splice(index..=index, grandchildren);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
        <COLLADA>
          <library_geometries>
            <geometry id="quad">
              <mesh>
                <source id="positions">
                  <float_array id="positions-array" count="6">0 1 2 3 4 5</float_array>
                </source>
              </mesh>
            </geometry>
          </library_geometries>
          <node sid="outer">
            <node sid="inner"/>
            <node><node sid="deep"/></node>
          </node>
        </COLLADA>
    "#;

    fn find(doc: &Document, name: &str) -> NodeId {
        fn rec(doc: &Document, node: NodeId, name: &str) -> Option<NodeId> {
            if doc.name(node) == name {
                return Some(node);
            }
            for &c in doc.children(node) {
                if let Some(found) = rec(doc, c, name) {
                    return Some(found);
                }
            }
            None
        }
        rec(doc, doc.root(), name).unwrap()
    }

    #[test]
    fn rejects_wrong_root() {
        assert!(matches!(
            Document::parse("<scene/>"),
            Err(LoadError::WrongRoot { .. })
        ));
    }

    #[test]
    fn node_path_includes_ids() {
        let doc = Document::parse(DOC).unwrap();
        let array = find(&doc, "float_array");
        assert_eq!(
            doc.node_path(array),
            "COLLADA/library_geometries/geometry#quad/mesh/source#positions/float_array#positions-array"
        );
    }

    #[test]
    fn parses_text_and_attributes() {
        let doc = Document::parse(DOC).unwrap();
        let array = find(&doc, "float_array");
        assert_eq!(doc.parse_attr::<usize>(array, "count").unwrap(), 6);
        assert_eq!(
            doc.parse_text::<f64>(array).unwrap(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]
        );
        assert!(matches!(
            doc.parse_attr::<usize>(array, "missing"),
            Err(LoadError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn sid_search_is_breadth_first_and_inclusive() {
        let doc = Document::parse(DOC).unwrap();
        let outer = find(&doc, "node");
        assert_eq!(doc.find_child_by_sid(outer, "outer").unwrap(), outer);
        let deep = doc.find_child_by_sid(outer, "deep").unwrap();
        assert_eq!(doc.attr(deep, "sid"), Some("deep"));
        assert!(matches!(
            doc.find_child_by_sid(outer, "absent"),
            Err(LoadError::UnresolvedSid { .. })
        ));
    }

    #[test]
    fn sid_search_prefers_the_shallowest_match() {
        let doc = Document::parse(
            r#"<COLLADA>
                 <node><node sid="dup" id="deep"/></node>
                 <node sid="dup" id="shallow"/>
               </COLLADA>"#,
        )
        .unwrap();
        let found = doc.find_child_by_sid(doc.root(), "dup").unwrap();
        assert_eq!(doc.attr(found, "id"), Some("shallow"));
    }

    #[test]
    fn single_child_rejects_duplicates() {
        let doc = Document::parse("<COLLADA><a/><a/><b/></COLLADA>").unwrap();
        assert!(doc.single_child(doc.root(), "b").is_ok());
        assert!(matches!(
            doc.single_child(doc.root(), "a"),
            Err(LoadError::DuplicateChild { .. })
        ));
        assert!(matches!(
            doc.single_child(doc.root(), "c"),
            Err(LoadError::MissingChild { .. })
        ));
    }

    #[test]
    fn splice_replaces_child_with_grandchildren() {
        let doc_src = "<COLLADA><keep/><wrap><x/><y/></wrap><tail/></COLLADA>";
        let mut doc = Document::parse(doc_src).unwrap();
        let root = doc.root();
        let spliced = doc.splice_child_into_parent(root, 1);
        assert_eq!(spliced, 2);
        let names: Vec<_> = doc.children(root).iter().map(|&c| doc.name(c)).collect();
        assert_eq!(names, vec!["keep", "x", "y", "tail"]);
        let x = doc.children(root)[1];
        assert_eq!(doc.parent(x), Some(root));
    }
}
