use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persistent conversation thread.
///
/// A session starts temporary (`saved = false`) unless it was created through
/// the explicit saved entry point. The core never deletes sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub owner: String,
    #[serde(default)]
    pub saved: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, owner: impl Into<String>, saved: bool) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner: owner.into(),
            saved,
            title: None,
            tagline: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for listing an owner's sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Include temporary sessions. Ignored when `saved` is set.
    pub include_temporary: bool,
    /// Restrict to sessions whose saved flag equals this value.
    pub saved: Option<bool>,
}

impl ListOptions {
    pub fn matches(&self, session: &Session) -> bool {
        match self.saved {
            Some(flag) => session.saved == flag,
            None => self.include_temporary || session.saved,
        }
    }
}
