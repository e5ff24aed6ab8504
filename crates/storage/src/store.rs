//! SQLite notebook implementation.

use crate::{DraftOutline, Error, Result, SessionId, SessionSummary, StoredNote, StoredTurn};
use chrono::{DateTime, SecondsFormat, Utc};
use conversation::{ChatTurn, NoteCard, OutlineSection, Role, truncate_chars};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

const EDITED_SUMMARY_CHARS: usize = 80;

/// SQLite-backed store for sessions, note cards and draft outlines.
pub struct Notebook {
    conn: Connection,
}

impl Notebook {
    /// Open or create a notebook at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory notebook (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS turns (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                options TEXT,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (session_id, seq)
            );
            CREATE TABLE IF NOT EXISTS note_cards (
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                answer_seq INTEGER NOT NULL,
                question TEXT NOT NULL,
                question_summary TEXT NOT NULL,
                answer TEXT NOT NULL,
                answer_summary TEXT NOT NULL,
                PRIMARY KEY (session_id, answer_seq)
            );
            CREATE TABLE IF NOT EXISTS outlines (
                session_id TEXT PRIMARY KEY REFERENCES sessions(id) ON DELETE CASCADE,
                template_id TEXT NOT NULL,
                sections TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Create an empty session.
    pub fn create_session(&self, title: &str) -> Result<SessionId> {
        let id = SessionId::new();
        let now = timestamp(Utc::now());
        self.conn.execute(
            "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![id.to_string(), title, now],
        )?;
        tracing::debug!(session = %id, "created session");
        Ok(id)
    }

    pub fn rename_session(&self, id: SessionId, title: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE sessions SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), title, timestamp(Utc::now())],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    /// Delete a session with its turns, note cards and outline.
    pub fn delete_session(&self, id: SessionId) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    /// All sessions, most recently updated first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.query_sessions("", params![])
    }

    /// Sessions whose id starts with `prefix`, most recently updated first.
    pub fn sessions_matching(&self, prefix: &str) -> Result<Vec<SessionSummary>> {
        let pattern = format!("{}%", prefix.replace(['%', '_'], ""));
        self.query_sessions("WHERE s.id LIKE ?1", [pattern])
    }

    fn query_sessions<P: rusqlite::Params>(&self, filter: &str, params: P) -> Result<Vec<SessionSummary>> {
        let sql = format!(
            "SELECT s.id, s.title, s.updated_at,
                    (SELECT COUNT(*) FROM turns t WHERE t.session_id = s.id),
                    (SELECT COUNT(*) FROM note_cards n WHERE n.session_id = s.id)
             FROM sessions s {filter}
             ORDER BY s.updated_at DESC, s.rowid DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, title, updated_at, turns, notes)| {
                Ok(SessionSummary {
                    id: parse_session_id(&id)?,
                    title,
                    updated_at: parse_timestamp(&updated_at)?,
                    turn_count: turns as usize,
                    note_count: notes as usize,
                })
            })
            .collect()
    }

    fn touch(&self, id: SessionId) -> Result<()> {
        self.conn.execute(
            "UPDATE sessions SET updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), timestamp(Utc::now())],
        )?;
        Ok(())
    }

    fn require_session(&self, id: SessionId) -> Result<()> {
        let exists = self
            .conn
            .query_row("SELECT 1 FROM sessions WHERE id = ?1", [id.to_string()], |_| Ok(()))
            .optional()?;
        exists.ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Turns
    // ─────────────────────────────────────────────────────────────────────

    /// Append a turn and return its position in the transcript.
    pub fn append_turn(
        &self,
        id: SessionId,
        turn: &ChatTurn,
        options: Option<&[String]>,
    ) -> Result<usize> {
        self.require_session(id)?;
        let seq = self.insert_turn(id, turn, options)?;
        self.touch(id)?;
        Ok(seq)
    }

    /// Append a user turn and the model's reply atomically.
    ///
    /// Returns the positions of both turns. Either both are stored or neither.
    pub fn append_exchange(
        &self,
        id: SessionId,
        user: &ChatTurn,
        model: &ChatTurn,
        options: Option<&[String]>,
    ) -> Result<(usize, usize)> {
        self.require_session(id)?;
        let tx = self.conn.unchecked_transaction()?;
        let user_seq = self.insert_turn(id, user, None)?;
        let model_seq = self.insert_turn(id, model, options)?;
        self.touch(id)?;
        tx.commit()?;
        Ok((user_seq, model_seq))
    }

    fn insert_turn(&self, id: SessionId, turn: &ChatTurn, options: Option<&[String]>) -> Result<usize> {
        let seq: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM turns WHERE session_id = ?1",
            [id.to_string()],
            |row| row.get(0),
        )?;
        let options = options.map(serde_json::to_string).transpose()?;
        self.conn.execute(
            "INSERT INTO turns (session_id, seq, role, text, options, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                seq,
                turn.role.as_str(),
                turn.text,
                options,
                timestamp(Utc::now()),
            ],
        )?;
        Ok(seq as usize)
    }

    /// Load a session's transcript in order.
    pub fn load_turns(&self, id: SessionId) -> Result<Vec<StoredTurn>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, role, text, options, timestamp FROM turns
             WHERE session_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([id.to_string()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(seq, role, text, options, ts)| {
                let role: Role = role.parse().map_err(Error::Corrupt)?;
                Ok(StoredTurn {
                    seq: seq as usize,
                    turn: ChatTurn { role, text },
                    options: options.as_deref().map(serde_json::from_str).transpose()?,
                    timestamp: parse_timestamp(&ts)?,
                })
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Note cards
    // ─────────────────────────────────────────────────────────────────────

    /// Store a note card for the answer at `answer_seq`.
    ///
    /// Returns `false` when that answer already has a card.
    pub fn add_note_card(&self, id: SessionId, answer_seq: usize, card: &NoteCard) -> Result<bool> {
        self.require_session(id)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO note_cards
                (session_id, answer_seq, question, question_summary, answer, answer_summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                answer_seq as i64,
                card.question,
                card.question_summary,
                card.answer,
                card.answer_summary,
            ],
        )?;
        if inserted > 0 {
            self.touch(id)?;
        }
        Ok(inserted > 0)
    }

    /// Replace the answer of the card at `answer_seq`.
    ///
    /// The transcript turn it came from is rewritten too, and the answer
    /// summary becomes an excerpt of the new text.
    pub fn update_note_answer(&self, id: SessionId, answer_seq: usize, answer: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = self.conn.execute(
            "UPDATE note_cards SET answer = ?3, answer_summary = ?4
             WHERE session_id = ?1 AND answer_seq = ?2",
            params![
                id.to_string(),
                answer_seq as i64,
                answer,
                truncate_chars(answer, EDITED_SUMMARY_CHARS),
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("note card {answer_seq} in session {id}")));
        }
        self.conn.execute(
            "UPDATE turns SET text = ?3 WHERE session_id = ?1 AND seq = ?2",
            params![id.to_string(), answer_seq as i64, answer],
        )?;
        self.touch(id)?;
        tx.commit()?;
        Ok(())
    }

    /// Load a session's note cards in transcript order.
    pub fn load_note_cards(&self, id: SessionId) -> Result<Vec<StoredNote>> {
        let mut stmt = self.conn.prepare(
            "SELECT answer_seq, question, question_summary, answer, answer_summary
             FROM note_cards WHERE session_id = ?1 ORDER BY answer_seq",
        )?;
        let notes = stmt
            .query_map([id.to_string()], |row| {
                Ok(StoredNote {
                    answer_seq: row.get::<_, i64>(0)? as usize,
                    card: NoteCard {
                        question: row.get(1)?,
                        question_summary: row.get(2)?,
                        answer: row.get(3)?,
                        answer_summary: row.get(4)?,
                    },
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Draft outline
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the session's draft outline.
    pub fn save_outline(
        &self,
        id: SessionId,
        template_id: &str,
        sections: &[OutlineSection],
    ) -> Result<()> {
        self.require_session(id)?;
        let now = timestamp(Utc::now());
        self.conn.execute(
            "INSERT INTO outlines (session_id, template_id, sections, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                template_id = excluded.template_id,
                sections = excluded.sections,
                updated_at = excluded.updated_at",
            params![id.to_string(), template_id, serde_json::to_string(sections)?, now],
        )?;
        self.touch(id)?;
        Ok(())
    }

    pub fn load_outline(&self, id: SessionId) -> Result<Option<DraftOutline>> {
        let row = self
            .conn
            .query_row(
                "SELECT template_id, sections, updated_at FROM outlines WHERE session_id = ?1",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(template_id, sections, updated_at)| {
            Ok(DraftOutline {
                template_id,
                sections: serde_json::from_str(&sections)?,
                updated_at: parse_timestamp(&updated_at)?,
            })
        })
        .transpose()
    }

    /// Drop the session's draft outline.
    ///
    /// Returns `false` when there was none.
    pub fn clear_outline(&self, id: SessionId) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM outlines WHERE session_id = ?1", [id.to_string()])?;
        if removed > 0 {
            self.touch(id)?;
        }
        Ok(removed > 0)
    }
}

// Fixed-width timestamps so string order matches time order.
fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("timestamp '{s}': {e}")))
}

fn parse_session_id(s: &str) -> Result<SessionId> {
    s.parse()
        .map_err(|e| Error::Corrupt(format!("session id '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(answer: &str) -> NoteCard {
        NoteCard {
            question: "Why?".into(),
            question_summary: "purpose".into(),
            answer: answer.into(),
            answer_summary: answer.into(),
        }
    }

    #[test]
    fn turns_load_in_order_with_options() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("New conversation").unwrap();

        let options = vec!["blog".to_string(), "talk".to_string()];
        assert_eq!(nb.append_turn(id, &ChatTurn::model("hi"), Some(&options)).unwrap(), 0);
        assert_eq!(nb.append_turn(id, &ChatTurn::user("hello"), None).unwrap(), 1);

        let turns = nb.load_turns(id).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].turn, ChatTurn::model("hi"));
        assert_eq!(turns[0].options.as_deref(), Some(options.as_slice()));
        assert_eq!(turns[1].turn, ChatTurn::user("hello"));
        assert_eq!(turns[1].options, None);
    }

    #[test]
    fn append_to_missing_session_fails() {
        let nb = Notebook::in_memory().unwrap();
        let err = nb
            .append_turn(SessionId::new(), &ChatTurn::user("x"), None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn note_cards_are_idempotent_per_answer() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("s").unwrap();

        assert!(nb.add_note_card(id, 3, &card("first")).unwrap());
        assert!(!nb.add_note_card(id, 3, &card("again")).unwrap());
        assert!(nb.add_note_card(id, 1, &card("earlier")).unwrap());

        let notes = nb.load_note_cards(id).unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].answer_seq, 1);
        assert_eq!(notes[1].card.answer, "first");
    }

    #[test]
    fn outline_round_trips_and_replaces() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("s").unwrap();
        assert_eq!(nb.load_outline(id).unwrap(), None);

        let first = vec![OutlineSection::new("pas-1", "Problem", "...")];
        nb.save_outline(id, "pas-framework", &first).unwrap();
        let second = vec![OutlineSection::new("pas-1", "Problem", "Tabs everywhere")];
        nb.save_outline(id, "pas-framework", &second).unwrap();

        let outline = nb.load_outline(id).unwrap().unwrap();
        assert_eq!(outline.template_id, "pas-framework");
        assert_eq!(outline.sections, second);

        assert!(nb.clear_outline(id).unwrap());
        assert_eq!(nb.load_outline(id).unwrap(), None);
        assert!(!nb.clear_outline(id).unwrap());
    }

    #[test]
    fn delete_removes_children() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("s").unwrap();
        nb.append_turn(id, &ChatTurn::user("x"), None).unwrap();
        nb.add_note_card(id, 0, &card("a")).unwrap();
        nb.save_outline(id, "story-arc", &[]).unwrap();

        nb.delete_session(id).unwrap();

        assert!(nb.list_sessions().unwrap().is_empty());
        assert!(nb.load_turns(id).unwrap().is_empty());
        assert!(nb.load_note_cards(id).unwrap().is_empty());
        assert_eq!(nb.load_outline(id).unwrap(), None);
        assert!(matches!(nb.delete_session(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn list_orders_by_last_update_with_counts() {
        let nb = Notebook::in_memory().unwrap();
        let older = nb.create_session("older").unwrap();
        let newer = nb.create_session("newer").unwrap();
        nb.append_turn(older, &ChatTurn::user("bump"), None).unwrap();

        let sessions = nb.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, older);
        assert_eq!(sessions[0].turn_count, 1);
        assert_eq!(sessions[1].id, newer);
        assert_eq!(sessions[1].note_count, 0);
    }

    #[test]
    fn prefix_matching() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("s").unwrap();
        let prefix = &id.to_string()[..8];

        let found = nb.sessions_matching(prefix).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert!(nb.sessions_matching("zzzz").unwrap().is_empty());
        assert_eq!(nb.sessions_matching("").unwrap().len(), 1);
    }

    #[test]
    fn rename_updates_title() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("New conversation").unwrap();
        nb.rename_session(id, "Burnout for new managers").unwrap();
        assert_eq!(nb.list_sessions().unwrap()[0].title, "Burnout for new managers");
        assert!(nb.rename_session(SessionId::new(), "x").is_err());
    }

    #[test]
    fn clearing_outline_bumps_session() {
        let nb = Notebook::in_memory().unwrap();
        let older = nb.create_session("older").unwrap();
        nb.save_outline(older, "story-arc", &[]).unwrap();
        nb.create_session("newer").unwrap();

        nb.clear_outline(older).unwrap();
        assert_eq!(nb.list_sessions().unwrap()[0].id, older);
    }

    #[test]
    fn exchange_is_stored_as_a_pair() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("s").unwrap();
        nb.append_turn(id, &ChatTurn::model("What's the idea?"), None).unwrap();

        let options = vec!["more".to_string()];
        let seqs = nb
            .append_exchange(id, &ChatTurn::user("burnout"), &ChatTurn::model("Why?"), Some(&options))
            .unwrap();
        assert_eq!(seqs, (1, 2));

        let turns = nb.load_turns(id).unwrap();
        assert_eq!(turns[1].turn, ChatTurn::user("burnout"));
        assert_eq!(turns[1].options, None);
        assert_eq!(turns[2].options.as_deref(), Some(options.as_slice()));
    }

    #[test]
    fn failed_reply_write_leaves_no_user_turn() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("s").unwrap();
        nb.conn
            .execute_batch(
                "CREATE TRIGGER reject_reply BEFORE INSERT ON turns WHEN NEW.text = 'rejected'
                 BEGIN SELECT RAISE(ABORT, 'reply rejected'); END;",
            )
            .unwrap();

        let result = nb.append_exchange(id, &ChatTurn::user("hello"), &ChatTurn::model("rejected"), None);
        assert!(result.is_err());
        assert!(nb.load_turns(id).unwrap().is_empty());

        let seqs = nb
            .append_exchange(id, &ChatTurn::user("hello"), &ChatTurn::model("fine"), None)
            .unwrap();
        assert_eq!(seqs, (0, 1));
    }

    #[test]
    fn editing_an_answer_rewrites_card_and_turn() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("s").unwrap();
        nb.append_turn(id, &ChatTurn::model("Who is it for?"), None).unwrap();
        let seq = nb.append_turn(id, &ChatTurn::user("managers"), None).unwrap();
        nb.add_note_card(id, seq, &card("managers")).unwrap();

        let answer = "x".repeat(100);
        nb.update_note_answer(id, seq, &answer).unwrap();

        let notes = nb.load_note_cards(id).unwrap();
        assert_eq!(notes[0].card.answer, answer);
        assert_eq!(notes[0].card.answer_summary, format!("{}...", "x".repeat(80)));
        assert_eq!(notes[0].card.question, "Why?");
        assert_eq!(nb.load_turns(id).unwrap()[1].turn.text, answer);

        let short = "new managers";
        nb.update_note_answer(id, seq, short).unwrap();
        assert_eq!(nb.load_note_cards(id).unwrap()[0].card.answer_summary, short);
    }

    #[test]
    fn editing_a_missing_card_fails_without_touching_turns() {
        let nb = Notebook::in_memory().unwrap();
        let id = nb.create_session("s").unwrap();
        nb.append_turn(id, &ChatTurn::user("keep me"), None).unwrap();

        let err = nb.update_note_answer(id, 0, "changed").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(nb.load_turns(id).unwrap()[0].turn.text, "keep me");
    }
}
