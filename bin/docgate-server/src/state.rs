//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::services::converter::Converter;
use crate::services::scratch::ScratchDir;

/// State shared across all HTTP handlers. Read-only after startup.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// External document converter.
    pub converter: Converter,
    /// Scratch storage for in-flight jobs.
    pub scratch: ScratchDir,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let converter = Converter::from_config(&config);
        let scratch = ScratchDir::new(config.scratch_dir.clone());
        Self {
            config: Arc::new(config),
            converter,
            scratch,
        }
    }
}
