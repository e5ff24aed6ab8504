//! Threadball conversation adapter.
//!
//! This crate talks to the language model behind a Threadball brainstorming
//! session. It hides two very different backends behind one interface and
//! normalizes their replies.
//!
//! # Overview
//!
//! - **Conversation**: stateless front door. Takes the running history and a
//!   new message, returns a [`ModelReply`] with any suggested quick replies
//!   split out of the text.
//! - **Backend**: trait implemented by the managed provider and by any
//!   OpenAI-compatible chat-completions endpoint. [`Provider`] picks one from a
//!   [`ProviderConfig`].
//! - **Generation**: outline synthesis and note summarization, both of which
//!   expect JSON back and fail with [`ErrorKind::MalformedGenerationOutput`]
//!   rather than invent content.
//!
//! Failures are classified into [`ErrorKind`] so callers can tell a bad
//! credential from a dead network.
//!
//! # Example
//!
//! ```no_run
//! use conversation::{ChatTurn, Conversation, GenericHttpConfig, ProviderConfig, SystemPrompt};
//!
//! # async fn example() -> conversation::Result<()> {
//! let config = ProviderConfig::GenericHttp(GenericHttpConfig::new(
//!     "sk-...",
//!     "https://api.openai.com/v1",
//!     "gpt-4o-mini",
//! ));
//! let conv = Conversation::from_config(config, SystemPrompt::default());
//!
//! let greeting = conv.open().await?;
//! let history = vec![ChatTurn::model(greeting.text)];
//! let reply = conv.send(&history, "I want to write about burnout").await?;
//! println!("{}", reply.text);
//! # Ok(())
//! # }
//! ```

mod adapter;
mod backend;
mod error;
mod notes;
mod options;
mod prompt;
mod templates;
mod types;

pub use adapter::Conversation;

pub use backend::{
    Backend, ChatRequest, DEFAULT_MANAGED_BASE_URL, DEFAULT_MANAGED_MODEL, GenericHttpBackend,
    GenericHttpConfig, ManagedBackend, ManagedConfig, Provider, ProviderConfig, ProviderKind,
    SessionSeed, StructuredRequest, session_seed,
};

pub use error::{Error, ErrorKind, Result};

pub use notes::{QaPair, qa_pairs, truncate_chars};
pub use options::{ExtractedOptions, extract_options};
pub use prompt::{EMPTY_REPLY_FALLBACK, OPENING_FILLER, SystemPrompt, draft_request};
pub use templates::{OutlineTemplate, TEMPLATES, find_template, outline_markdown};
pub use types::{ChatTurn, ModelReply, NoteCard, NoteSummary, OutlineSection, Role};
