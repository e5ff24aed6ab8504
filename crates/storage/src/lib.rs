//! SQLite-backed notebook for Threadball sessions.
//!
//! Everything a brainstorming session produces outlives the process here: the
//! transcript with the quick replies shown next to each model turn, the note
//! cards harvested from answered questions, and the draft outline.
//!
//! # Overview
//!
//! - [`Notebook`] wraps one SQLite database. Deleting a session cascades to
//!   its turns, note cards and outline.
//! - [`SessionId`] is a UUID. It displays as a string and parses back, so the
//!   CLI can accept `--session 3f2a` style prefixes via
//!   [`Notebook::sessions_matching`].
//! - Every write bumps the session's `updated_at`, which is what
//!   [`Notebook::list_sessions`] orders by.
//!
//! # Example
//!
//! ```no_run
//! use conversation::ChatTurn;
//! use storage::Notebook;
//!
//! let notebook = Notebook::open("threadball.db")?;
//! let id = notebook.create_session("New conversation")?;
//!
//! notebook.append_turn(id, &ChatTurn::model("What do you want to write about?"), None)?;
//! notebook.append_turn(id, &ChatTurn::user("Burnout in first-time managers"), None)?;
//!
//! for stored in notebook.load_turns(id)? {
//!     println!("{}: {}", stored.turn.role, stored.turn.text);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod record;
mod store;

pub use error::{Error, Result};
pub use record::{DraftOutline, SessionId, SessionSummary, StoredNote, StoredTurn};
pub use store::Notebook;
