//! Conversation persistence interface
//!
//! The document store itself is an external collaborator; this module only
//! defines the boundary. Appends are fire-and-forget, with no
//! transactionality expected from the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{EventSink, SessionEvent};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

/// A message as persisted to the conversation store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Remote document store seam
pub trait ConversationStore: Send + Sync {
    /// Append a message to a conversation. Fire-and-forget; failures are
    /// the implementation's concern.
    fn append_message(&self, conversation_id: &str, message: StoredMessage);
}

/// Event sink that persists finished transcripts
///
/// Forwards the turn-bounded user and model transcripts into the store and
/// ignores every other notification, so it can sit next to a UI sink in a
/// fanout.
pub struct TranscriptRecorder<S> {
    store: S,
    conversation_id: String,
}

impl<S: ConversationStore> TranscriptRecorder<S> {
    pub fn new(store: S, conversation_id: impl Into<String>) -> Self {
        Self {
            store,
            conversation_id: conversation_id.into(),
        }
    }
}

impl<S: ConversationStore> EventSink for TranscriptRecorder<S> {
    fn emit(&self, event: SessionEvent) {
        match event {
            SessionEvent::UserFinishedSpeaking(text) => {
                self.store.append_message(
                    &self.conversation_id,
                    StoredMessage::new(MessageRole::User, text),
                );
            }
            SessionEvent::ModelFinishedSpeaking(text) => {
                self.store.append_message(
                    &self.conversation_id,
                    StoredMessage::new(MessageRole::Model, text),
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct MemoryStore {
        appended: Arc<Mutex<Vec<(String, StoredMessage)>>>,
    }

    impl ConversationStore for MemoryStore {
        fn append_message(&self, conversation_id: &str, message: StoredMessage) {
            self.appended
                .lock()
                .unwrap()
                .push((conversation_id.to_string(), message));
        }
    }

    #[test]
    fn test_finished_transcripts_are_persisted_in_order() {
        let store = MemoryStore::default();
        let recorder = TranscriptRecorder::new(store.clone(), "convo-1");

        recorder.emit(SessionEvent::UserFinishedSpeaking("oi".to_string()));
        recorder.emit(SessionEvent::ModelFinishedSpeaking("olá".to_string()));

        let appended = store.appended.lock().unwrap();
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0].0, "convo-1");
        assert_eq!(appended[0].1.role, MessageRole::User);
        assert_eq!(appended[0].1.text, "oi");
        assert_eq!(appended[1].1.role, MessageRole::Model);
        assert_eq!(appended[1].1.text, "olá");
    }

    #[test]
    fn test_other_events_are_ignored() {
        let store = MemoryStore::default();
        let recorder = TranscriptRecorder::new(store.clone(), "convo-1");

        recorder.emit(SessionEvent::Opened);
        recorder.emit(SessionEvent::ModelStartedSpeaking);
        recorder.emit(SessionEvent::TurnComplete);
        recorder.emit(SessionEvent::Closed);

        assert!(store.appended.lock().unwrap().is_empty());
    }

    #[test]
    fn test_message_role_serializes_lowercase() {
        let message = StoredMessage::new(MessageRole::Model, "texto");
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"role\":\"model\""));
    }
}
