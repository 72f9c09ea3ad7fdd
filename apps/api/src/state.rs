use std::sync::Arc;

use crate::challenge::pipeline::ChallengePipeline;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
/// Holds no per-request data; concurrent submissions share only read-only clients.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChallengePipeline>,
    pub config: Config,
}
