//! Error types for the compiler.

use std::path::PathBuf;

use thiserror::Error;

use crate::node::NodeId;

/// Result type alias using CompileError
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors that can occur while compiling a node graph.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A node id referenced by the graph does not exist in the collection
    #[error("unknown node id: {0}")]
    UnknownNode(NodeId),

    /// A node appeared in a position its kind is not valid in
    #[error("node {id} cannot appear as {context}")]
    MisplacedNode { id: NodeId, context: &'static str },

    /// An assignment or out-argument did not resolve to a variable declaration
    #[error("node {0} does not refer to a variable declaration")]
    NotAVariable(NodeId),

    /// A list-to-text node referenced something other than a list variable
    #[error("node {0} does not refer to a list variable")]
    NotAList(NodeId),

    /// Failed to read a library prologue file
    #[error("failed to read library '{path}': {source}")]
    LibraryRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write the output artifact
    #[error("failed to write artifact '{path}': {source}")]
    ArtifactWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}
