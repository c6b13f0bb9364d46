//! Per-session notification sink.
//!
//! Translates conversation callbacks into `session/update` notifications and
//! enqueues them on the client connection synchronously, inside the
//! callback. Everything a run cycle produces is therefore queued ahead of
//! any permission request or prompt response that follows it.

use std::sync::{Mutex, MutexGuard};

use tracing::{trace, warn};

use crate::acp::connection::Connection;
use crate::conversation::EventSink;
use crate::events::{EventTranslator, TokenStreamAggregator};
use crate::models::event::AgentEvent;
use crate::models::notification::{Notification, SessionUpdate};
use crate::models::stream::StreamChunk;

enum Translation {
    Batched(EventTranslator),
    Streaming(Mutex<TokenStreamAggregator>),
}

/// Event sink bound to one session.
pub struct NotificationSink {
    session_id: String,
    connection: Connection,
    translation: Translation,
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSink")
            .field("session_id", &self.session_id)
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

impl NotificationSink {
    /// Sink for `session_id`, batched or token-by-token.
    #[must_use]
    pub fn new(session_id: impl Into<String>, connection: Connection, streaming: bool) -> Self {
        let translation = if streaming {
            Translation::Streaming(Mutex::new(TokenStreamAggregator::new()))
        } else {
            Translation::Batched(EventTranslator)
        };
        Self {
            session_id: session_id.into(),
            connection,
            translation,
        }
    }

    /// Whether token deltas are translated.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self.translation, Translation::Streaming(_))
    }

    /// Send one update for this session.
    pub fn emit(&self, update: SessionUpdate) {
        let notification = Notification::new(self.session_id.clone(), update);
        if let Err(err) = self.connection.send_update(&notification) {
            warn!(session_id = %self.session_id, error = %err, "dropping session update");
        }
    }

    /// Replay a stored log in order. Always batched: there are no tokens to
    /// stream for history.
    pub fn replay(&self, events: &[AgentEvent]) -> usize {
        let updates = EventTranslator.translate_all(events);
        let count = updates.len();
        for update in updates {
            self.emit(update);
        }
        count
    }

    fn emit_all(&self, updates: Vec<SessionUpdate>) {
        for update in updates {
            self.emit(update);
        }
    }
}

impl EventSink for NotificationSink {
    fn on_event(&self, event: &AgentEvent) {
        trace!(session_id = %self.session_id, event_id = event.id(), "event received");
        let updates = match &self.translation {
            Translation::Batched(translator) => translator.translate(event),
            Translation::Streaming(aggregator) => lock(aggregator).on_event(event),
        };
        self.emit_all(updates);
    }

    fn on_token(&self, chunk: &StreamChunk) {
        match &self.translation {
            // Batched sessions render complete events only.
            Translation::Batched(_) => {}
            Translation::Streaming(aggregator) => {
                let updates = lock(aggregator).on_token(chunk);
                self.emit_all(updates);
            }
        }
    }
}

fn lock(aggregator: &Mutex<TokenStreamAggregator>) -> MutexGuard<'_, TokenStreamAggregator> {
    aggregator
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
