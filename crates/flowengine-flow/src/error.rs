use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("malformed flow JSON: {0}")]
    Malformed(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("duplicate connection label {label:?} on node {source}")]
    DuplicateLabel { source: String, label: String },

    #[error("connection {id} references unknown node: {node_id}")]
    DanglingConnection { id: String, node_id: String },
}

pub type Result<T> = std::result::Result<T, FlowError>;
