//! Loader error taxonomy. Every variant carries enough context to point
//! at the offending part of the document.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse document")]
    Xml(#[from] xmltree::ParseError),

    #[error("expected document root 'COLLADA', found '{found}'")]
    WrongRoot { found: String },

    #[error("attribute '{attribute}' of '{node}' is required but not present")]
    MissingAttribute {
        attribute: &'static str,
        node: String,
    },

    #[error("failed to parse attribute '{attribute}'='{value}' of '{node}'")]
    BadAttribute {
        attribute: &'static str,
        value: String,
        node: String,
    },

    #[error("failed to parse value '{token}' in '{node}'")]
    BadValue { token: String, node: String },

    #[error("element '{node}' must have an id")]
    MissingId { node: String },

    #[error("expected child '{child}' of '{node}'")]
    MissingChild { child: &'static str, node: String },

    #[error("expected a single child '{child}' of '{node}', found more than one")]
    DuplicateChild { child: &'static str, node: String },

    #[error("{what} of '{node}': declared {declared}, found {actual}")]
    CountMismatch {
        what: &'static str,
        declared: usize,
        actual: usize,
        node: String,
    },

    #[error("unsupported URI '{uri}': {reason}")]
    BadUri { uri: String, reason: &'static str },

    #[error("failed to resolve URI '#{id}'")]
    UnresolvedUri { id: String },

    #[error("failed to resolve scoped ID '{sid}' under '{node}'")]
    UnresolvedSid { sid: String, node: String },

    #[error("the node '{node}' has no recreated element")]
    NotRecreated { node: String },

    #[error("element at '{node}' is not of the expected type '{expected}'")]
    WrongElementType {
        expected: &'static str,
        node: String,
    },

    #[error("no input with semantic '{semantic}' under '{node}'")]
    MissingInput {
        semantic: &'static str,
        node: String,
    },

    #[error("more than one input with semantic '{semantic}' under '{node}'")]
    DuplicateInput {
        semantic: &'static str,
        node: String,
    },

    #[error("size of array '{array}' ({len}) is not equal to count ({count}) * stride ({stride})")]
    AccessorSize {
        array: String,
        len: usize,
        count: usize,
        stride: usize,
    },

    #[error("stride of accessor for array '{array}' is {declared}, params require {expected}")]
    AccessorStride {
        array: String,
        declared: usize,
        expected: usize,
    },

    #[error("bad accessor params at '{node}': {reason}")]
    AccessorParams { node: String, reason: &'static str },

    #[error("transformation '{name}' at '{node}' is not supported")]
    UnsupportedTransform { name: String, node: String },

    #[error("bad animation channel target '{target}': {reason}")]
    BadChannelTarget { target: String, reason: &'static str },

    #[error("{what} index {index} out of bounds ({len})")]
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("loading of {what} is not supported")]
    Unsupported { what: String },

    #[error("internal link '{what}' was not resolved")]
    UnresolvedLink { what: &'static str },
}
