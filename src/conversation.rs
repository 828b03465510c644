//! Append-only conversation log
//!
//! One entry per answered question, in chronological order. Entries are
//! immutable once appended; there is no deletion. The log lives for the
//! session only and is never persisted.

use chrono::{DateTime, Utc};

use crate::focus::Focus;

/// One question/answer exchange, with the focus it was asked from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
    /// Focus snapshot taken when the question was submitted
    pub focus: Focus,
}

#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The last `n` turns in chronological order, or fewer if the log is
    /// shorter.
    #[must_use]
    pub fn recent_turns(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
