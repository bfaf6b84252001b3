//! Wire types shared between the engine, the WS hub, and clients: the
//! realtime event taxonomy (§4.7) and the session-socket frame envelope.

pub mod event;
pub mod frames;

pub use event::{DecisionStep, Event, EventKind, FlowExecutionState, HistoryEntry, NodePromptSnapshot};
pub use frames::{parse_client_message, ClientMessage, PingFrame, ServerMessage};
