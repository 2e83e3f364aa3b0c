//! Transcript accumulation for the live session
//!
//! The connection streams incremental transcript fragments for both speaker
//! directions while a turn is in flight. Fragments are appended per direction
//! and only surfaced as whole, turn-bounded strings when the server signals
//! the turn is complete. A partially accumulated transcript is never handed
//! to a consumer.

/// Transcripts flushed at a turn boundary
///
/// `user` flushes before `model`: consumers that log both in order preserve
/// the causal question-then-answer ordering of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnTranscripts {
    /// What the user said this turn, if anything was transcribed
    pub user: Option<String>,
    /// What the model said this turn, if anything was transcribed
    pub model: Option<String>,
}

/// Accumulates transcript fragments per speaker direction
///
/// One buffer per direction. Both are append-only within a turn and cleared
/// exactly when [`TranscriptAccumulator::take_turn`] hands their contents out.
#[derive(Debug, Clone, Default)]
pub struct TranscriptAccumulator {
    /// Outbound direction: the user's speech, transcribed by the server
    outbound: String,
    /// Inbound direction: the model's spoken reply
    inbound: String,
}

impl TranscriptAccumulator {
    /// Create a new accumulator with both buffers empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment of the user's transcribed speech
    pub fn append_outbound(&mut self, fragment: &str) {
        self.outbound.push_str(fragment);
    }

    /// Append a fragment of the model's transcribed speech
    pub fn append_inbound(&mut self, fragment: &str) {
        self.inbound.push_str(fragment);
    }

    /// Flush both buffers at a turn boundary
    ///
    /// An empty buffer yields `None` so consumers never record spurious
    /// empty messages. Both buffers are reset for the next turn.
    pub fn take_turn(&mut self) -> TurnTranscripts {
        let user = match std::mem::take(&mut self.outbound) {
            s if s.is_empty() => None,
            s => Some(s),
        };
        let model = match std::mem::take(&mut self.inbound) {
            s if s.is_empty() => None,
            s => Some(s),
        };
        TurnTranscripts { user, model }
    }

    /// True when neither direction has accumulated any text
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.inbound.is_empty()
    }
}
