//! Session catalogue.
//!
//! Persists every [`Session`] in `sessions.json` under the configured state
//! path. The in-memory map is authoritative; each mutation is flushed to
//! disk before it returns, so a re-read always reflects the latest write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use wf_domain::error::{Error, Result};
use wf_domain::session::{ListOptions, Session};
use wf_domain::trace::TraceEvent;

/// Session store backed by a JSON file.
pub struct SessionStore {
    sessions_path: PathBuf,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;

        let sessions_path = state_path.join("sessions.json");
        let sessions = if sessions_path.exists() {
            let raw = std::fs::read_to_string(&sessions_path).map_err(Error::Io)?;
            match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(
                        path = %sessions_path.display(),
                        error = %e,
                        "sessions.json unreadable, starting empty"
                    );
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %sessions_path.display(),
            "session store loaded"
        );

        Ok(Self {
            sessions_path,
            sessions: RwLock::new(sessions),
        })
    }

    // ── Creation ──────────────────────────────────────────────────────

    /// Create a new session with a fresh id.
    pub fn create(&self, owner: &str, saved: bool) -> Result<Session> {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert(Session::new(id, owner, saved))
    }

    /// Create a session that starts out saved.
    pub fn create_saved(&self, owner: &str) -> Result<Session> {
        self.create(owner, true)
    }

    /// Resolve an existing session or create a temporary one under `id`.
    /// Returns `(session, is_new)`.
    pub fn resolve_or_create(&self, id: &str, owner: &str) -> Result<(Session, bool)> {
        if let Some(session) = self.sessions.read().get(id) {
            return Ok((session.clone(), false));
        }
        let session = self.insert(Session::new(id, owner, false))?;
        Ok((session, true))
    }

    fn insert(&self, session: Session) -> Result<Session> {
        {
            let mut sessions = self.sessions.write();
            if let Some(existing) = sessions.get(&session.id) {
                return Ok(existing.clone());
            }
            sessions.insert(session.id.clone(), session.clone());
        }
        self.flush()?;

        TraceEvent::SessionResolved {
            session_id: session.id.clone(),
            is_new: true,
        }
        .emit();

        Ok(session)
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Result<Session> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(id.to_owned()))
    }

    /// An owner's sessions matching `opts`, most recently updated first.
    pub fn list(&self, owner: &str, opts: ListOptions) -> Vec<Session> {
        let mut out: Vec<Session> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.owner == owner && opts.matches(s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    // ── Mutations ─────────────────────────────────────────────────────

    /// Flip a temporary session to saved. Fails if it is already saved.
    pub fn promote(&self, id: &str) -> Result<Session> {
        let session = self.update(id, |s| {
            if s.saved {
                return Err(Error::SessionAlreadySaved(s.id.clone()));
            }
            s.saved = true;
            Ok(())
        })?;
        emit_saved(&session);
        Ok(session)
    }

    /// Flip the saved flag regardless of its current value.
    pub fn toggle_saved(&self, id: &str) -> Result<Session> {
        let session = self.update(id, |s| {
            s.saved = !s.saved;
            Ok(())
        })?;
        emit_saved(&session);
        Ok(session)
    }

    /// Update whichever of `title` and `tagline` is supplied.
    pub fn rename(&self, id: &str, title: Option<&str>, tagline: Option<&str>) -> Result<Session> {
        if title.is_none() && tagline.is_none() {
            return Err(Error::InvalidInput("rename needs a title or a tagline".into()));
        }
        self.update(id, |s| {
            if let Some(t) = title {
                s.title = Some(t.to_owned());
            }
            if let Some(t) = tagline {
                s.tagline = Some(t.to_owned());
            }
            Ok(())
        })
    }

    /// Bump `updated_at`.
    pub fn touch(&self, id: &str) -> Result<Session> {
        self.update(id, |_| Ok(()))
    }

    fn update<F>(&self, id: &str, f: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let updated = {
            let mut sessions = self.sessions.write();
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| Error::SessionNotFound(id.to_owned()))?;
            f(session)?;
            session.updated_at = Utc::now();
            session.clone()
        };
        self.flush()?;
        Ok(updated)
    }

    /// Persist the current session state to disk.
    pub fn flush(&self) -> Result<()> {
        let json = {
            let sessions = self.sessions.read();
            serde_json::to_string_pretty(&*sessions)
                .map_err(|e| Error::Other(format!("serializing sessions: {e}")))?
        };
        std::fs::write(&self.sessions_path, json).map_err(Error::Io)?;
        Ok(())
    }
}

fn emit_saved(session: &Session) {
    TraceEvent::SessionSaved {
        session_id: session.id.clone(),
        saved: session.saved,
    }
    .emit();
}
