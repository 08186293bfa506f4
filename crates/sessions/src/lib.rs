//! Session state for wayfarer.
//!
//! Two stores live here: the session catalogue (saved flag, title, tagline)
//! and the append-only per-session message log that is the only source of
//! truth for conversation history.

pub mod store;
pub mod transcript;

pub use store::SessionStore;
pub use transcript::{to_context, validate_session_id, MessageStore, StoredMessage, TranscriptStore};
