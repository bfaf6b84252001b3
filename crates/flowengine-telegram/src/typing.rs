//! Telegram typing indicator — sends `sendChatAction` every 4 seconds.
//!
//! Telegram's typing status expires after ~5 seconds, so we refresh every 4s.
//! `TypingHandle::stop()` aborts the loop immediately. `pause`/`resume`
//! (§4.9 step 5c) let the streaming loop silence the indicator around each
//! outbound send without tearing down and respawning the task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flowengine_core::config::TYPING_REFRESH_SECS;
use teloxide::prelude::*;
use teloxide::types::ChatAction;

/// Handle to a background typing indicator task.
///
/// Call `stop()` once the response is ready to abort the loop.
pub struct TypingHandle {
    join: tokio::task::JoinHandle<()>,
    paused: Arc<AtomicBool>,
}

impl TypingHandle {
    /// Spawn the typing indicator loop for `chat_id`.
    ///
    /// Sends `ChatAction::Typing` immediately, then every
    /// [`TYPING_REFRESH_SECS`] seconds, skipping sends while paused.
    pub fn start(bot: Bot, chat_id: ChatId) -> Self {
        let paused = Arc::new(AtomicBool::new(false));
        let loop_paused = paused.clone();
        let join = tokio::spawn(async move {
            loop {
                if !loop_paused.load(Ordering::Relaxed) {
                    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
                }
                tokio::time::sleep(Duration::from_secs(TYPING_REFRESH_SECS)).await;
            }
        });
        TypingHandle { join, paused }
    }

    /// Silence the indicator before an outbound send (§4.9 step 5c).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    /// Resume after a send, if the stream is still running.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    /// Abort the typing indicator loop.
    pub fn stop(self) {
        self.join.abort();
    }
}
