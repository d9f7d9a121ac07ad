//! Application state for the API server

use crate::{Config, UrlDownloader};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
#[derive(Clone)]
pub struct AppState {
    /// The orchestrator behind every route
    pub downloader: Arc<UrlDownloader>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<UrlDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
