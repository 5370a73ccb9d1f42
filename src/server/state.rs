use std::sync::Arc;

use crate::config::ExtractionConfig;
use crate::extract::Extractor;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ExtractionConfig>,
    pub extractor: Arc<dyn Extractor>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(config: ExtractionConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            config: Arc::new(config),
            extractor,
            sessions: Arc::new(SessionStore::new()),
        }
    }
}
