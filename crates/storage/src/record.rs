//! Stored record types.

use chrono::{DateTime, Utc};
use conversation::{ChatTurn, NoteCard, OutlineSection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One row of the session list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub turn_count: usize,
    pub note_count: usize,
}

/// A turn as stored, with the quick replies shown alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTurn {
    /// Position in the transcript, starting at 0.
    pub seq: usize,
    pub turn: ChatTurn,
    pub options: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

/// A note card keyed by the transcript position of its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNote {
    pub answer_seq: usize,
    pub card: NoteCard,
}

/// The draft outline of a session and the template it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutline {
    pub template_id: String,
    pub sections: Vec<OutlineSection>,
    pub updated_at: DateTime<Utc>,
}
