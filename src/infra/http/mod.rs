mod admin;
mod middleware;
mod public;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub use admin::build_admin_router;
pub use middleware::log_responses;
pub use public::build_router;

use crate::application::error::ErrorReport;
use crate::cache::{ArtifactCache, DevCache};

/// Shared state for both listeners.
#[derive(Clone)]
pub struct HttpState {
    pub cache: Arc<ArtifactCache>,
    pub dev: DevCache,
}

impl HttpState {
    pub fn new(cache: Arc<ArtifactCache>) -> Self {
        let dev = DevCache::new(Arc::clone(&cache));
        Self { cache, dev }
    }
}

async fn cache_health_response(state: &HttpState, source: &'static str) -> Response {
    if state.cache.health_check().await {
        return StatusCode::NO_CONTENT.into_response();
    }

    let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
    ErrorReport::from_message(
        source,
        StatusCode::SERVICE_UNAVAILABLE,
        "cache store failed its probe round-trip",
    )
    .attach(&mut response);
    response
}
