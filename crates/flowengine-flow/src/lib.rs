//! In-memory, immutable representation of a conversational flow graph.
//!
//! A [`Flow`] is parsed once from persisted JSON (either the "engine" form
//! or the authoring "canvas" form, see [`Flow::from_canvas`]) and then
//! shared read-only across every orchestrator turn — no interior mutability
//! is needed anywhere in this module.

pub mod canvas;
pub mod error;
pub mod model;

pub use error::{FlowError, Result};
pub use model::{Connection, Flow, Node, NodeType, Prompt, VariableExtraction, VariableType};
