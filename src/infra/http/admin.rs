use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    application::{
        error::HttpError,
        og_image::{self, OgParams},
    },
    cache::{
        Artifact, CacheMetrics, CacheOptions, EntryInfo, PreloadItem, PreloadReport, StoreStats,
        generate_key,
    },
};

use super::{HttpState, cache_health_response, middleware::log_responses};

const SOURCE: &str = "infra::http::admin";

pub fn build_admin_router(state: HttpState) -> Router {
    Router::new()
        .route("/_health", get(admin_health))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/metrics", get(cache_metrics))
        .route("/cache/entries/{key}", get(cache_entry))
        .route("/cache/invalidate", post(invalidate_cache))
        .route("/cache/clear", post(clear_cache))
        .route("/cache/warm", post(warm_cache))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InvalidateQuery {
    pattern: Option<String>,
}

#[derive(Debug, Serialize)]
struct Removed {
    removed: usize,
}

async fn admin_health(State(state): State<HttpState>) -> Response {
    cache_health_response(&state, "infra::http::admin_health").await
}

async fn cache_stats(State(state): State<HttpState>) -> Result<Json<StoreStats>, HttpError> {
    state
        .dev
        .stats()
        .await
        .map(Json)
        .map_err(|err| HttpError::from_cache(SOURCE, &err))
}

async fn cache_metrics(State(state): State<HttpState>) -> Result<Json<CacheMetrics>, HttpError> {
    state
        .cache
        .metrics()
        .await
        .map(Json)
        .map_err(|err| HttpError::from_cache(SOURCE, &err))
}

async fn cache_entry(
    State(state): State<HttpState>,
    Path(key): Path<String>,
) -> Result<Json<EntryInfo>, HttpError> {
    match state.dev.inspect(&key).await {
        Ok(Some(info)) => Ok(Json(info)),
        Ok(None) => Err(HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Entry not found",
            format!("no entry for `{key}`"),
        )),
        Err(err) => Err(HttpError::from_cache(SOURCE, &err)),
    }
}

/// `pattern` is a regex over full store keys, `prefix:<literal>`, or empty for
/// everything. Write `(?:prefix:)...` for a regex that starts with `prefix:`.
async fn invalidate_cache(
    State(state): State<HttpState>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<Removed>, HttpError> {
    let pattern = query.pattern.unwrap_or_default();
    state
        .dev
        .invalidate_pattern(&pattern)
        .await
        .map(|removed| Json(Removed { removed }))
        .map_err(|err| HttpError::from_cache(SOURCE, &err))
}

async fn clear_cache(State(state): State<HttpState>) -> Result<Json<Removed>, HttpError> {
    state
        .dev
        .clear()
        .await
        .map(|removed| Json(Removed { removed }))
        .map_err(|err| HttpError::from_cache(SOURCE, &err))
}

async fn warm_cache(
    State(state): State<HttpState>,
    Json(cards): Json<Vec<OgParams>>,
) -> Response {
    let mut items = Vec::with_capacity(cards.len());
    for card in cards {
        if let Err(err) = card.validate() {
            return HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid image parameters",
                &err,
            )
            .into_response();
        }
        let key = match generate_key(&card) {
            Ok(key) => key,
            Err(err) => return HttpError::from_cache(SOURCE, &err).into_response(),
        };
        items.push(PreloadItem::new(
            key.into_string(),
            move || async move { Ok::<_, Infallible>(Artifact::Text(og_image::render_card(&card))) },
            CacheOptions::default(),
        ));
    }

    let report: PreloadReport = state.dev.warm_up(items).await;
    Json(report).into_response()
}
