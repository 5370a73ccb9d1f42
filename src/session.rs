//! Per-session state for interactive front-ends.
//!
//! A session remembers the last upload, the last batch result and which
//! view (image preview or JSON tree) is showing. The reset rules are:
//!
//! * A new upload whose file list differs from the previous one clears the
//!   result and returns to [`ActiveView::Image`].
//! * Starting an extraction clears the previous result and switches to
//!   [`ActiveView::Json`]. Only one extraction per session runs at a time.
//! * [`ActiveView::Json`] can be selected only while a result exists.
//!
//! State is memory-resident and lost on restart.

use crate::extract::batch_artifact_name;
use crate::output::BatchOutput;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

/// Which pane a front-end shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    Image,
    Json,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session '{0}' not found")]
    NotFound(Uuid),

    #[error("No extraction result yet; run an extraction first")]
    NoResults,

    #[error("An extraction is already running for this session")]
    Busy,
}

/// State of one session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    pub results: Option<BatchOutput>,
    pub active_view: ActiveView,
    /// File names of the most recent upload, in upload order.
    pub last_uploaded: Vec<String>,
    /// An extraction is in flight.
    pub extracting: bool,
}

impl SessionState {
    /// Record an upload. Returns `true` when it reset the session.
    pub fn register_upload(&mut self, filenames: Vec<String>) -> bool {
        if self.last_uploaded == filenames {
            return false;
        }
        self.last_uploaded = filenames;
        self.results = None;
        self.active_view = ActiveView::Image;
        true
    }

    /// Register `filenames` as the upload and mark an extraction as running.
    ///
    /// Clears the previous result. Fails with [`SessionError::Busy`], leaving
    /// the session untouched, while another extraction is running.
    pub fn begin_extraction(&mut self, filenames: Vec<String>) -> Result<(), SessionError> {
        if self.extracting {
            return Err(SessionError::Busy);
        }
        self.register_upload(filenames);
        self.results = None;
        self.active_view = ActiveView::Json;
        self.extracting = true;
        Ok(())
    }

    /// Mark the running extraction as over without storing a result.
    pub fn end_extraction(&mut self) {
        self.extracting = false;
    }

    pub fn store_results(&mut self, output: BatchOutput) {
        self.results = Some(output);
        self.extracting = false;
    }

    pub fn set_view(&mut self, view: ActiveView) -> Result<(), SessionError> {
        if view == ActiveView::Json && self.results.is_none() {
            return Err(SessionError::NoResults);
        }
        self.active_view = view;
        Ok(())
    }

    /// Download name and JSON of the last result: the file's own document
    /// for a single upload, the consolidated array for a batch.
    pub fn download(&self) -> Result<(String, Value), SessionError> {
        let results = self.results.as_ref().ok_or(SessionError::NoResults)?;
        Ok((
            batch_artifact_name(&self.last_uploaded),
            results.to_download_value(),
        ))
    }
}

/// All live sessions, keyed by a random id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, SessionState>> {
        // A panic while holding the lock leaves plain data behind; keep serving.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().insert(id, SessionState::default());
        id
    }

    /// Snapshot of a session.
    pub fn get(&self, id: Uuid) -> Result<SessionState, SessionError> {
        self.lock().get(&id).cloned().ok_or(SessionError::NotFound(id))
    }

    /// Mutate a session in place.
    pub fn update<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> Result<R, SessionError> {
        let mut sessions = self.lock();
        let state = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        Ok(f(state))
    }

    pub fn remove(&self, id: Uuid) -> Result<(), SessionError> {
        self.lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(SessionError::NotFound(id))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
