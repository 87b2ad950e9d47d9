//! Application state for the API server

use crate::{Archiver, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The archiver serving every request
    pub archiver: Arc<Archiver>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(archiver: Arc<Archiver>, config: Arc<Config>) -> Self {
        Self { archiver, config }
    }
}
