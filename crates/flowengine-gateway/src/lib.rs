//! Control-plane binary: HTTP admin API, realtime WS hub, and the Telegram
//! webhook bridge, all sharing one [`app::AppState`].

pub mod app;
pub mod bots;
pub mod conversation_store;
pub mod crypto;
pub mod flows;
pub mod http;
pub mod storage;
pub mod ws;

pub use app::{build_router, AppState};
