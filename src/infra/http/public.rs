use std::convert::Infallible;

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_TYPE, IF_NONE_MATCH},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::{
        error::HttpError,
        og_image::{self, OgParams},
    },
    cache::{Artifact, CacheOptions},
};

use super::{HttpState, cache_health_response, middleware::log_responses};

const SOURCE: &str = "infra::http::public";
const SVG_CONTENT_TYPE: &str = "image/svg+xml; charset=utf-8";
const OG_CACHE_TAG: &str = "og";

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/og", get(og_image))
        .route("/_health", get(public_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
}

async fn og_image(
    State(state): State<HttpState>,
    request_headers: HeaderMap,
    Query(params): Query<OgParams>,
) -> Result<Response, HttpError> {
    params.validate().map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid image parameters",
            &err,
        )
    })?;

    let options = CacheOptions {
        tags: vec![OG_CACHE_TAG.to_string()],
        ..Default::default()
    };
    let card = params.clone();
    let cached = state
        .cache
        .with_cache_params(
            &params,
            move || async move { Ok::<_, Infallible>(Artifact::Text(og_image::render_card(&card))) },
            &options,
        )
        .await
        .map_err(|err| HttpError::from_cache(SOURCE, &err))?;

    let not_modified = request_headers
        .get(IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|header| cached.etag.matches_if_none_match(header));
    if not_modified {
        return Ok((StatusCode::NOT_MODIFIED, cached.headers).into_response());
    }

    let mut response = (
        StatusCode::OK,
        cached.headers,
        Body::from(cached.data.to_bytes()),
    )
        .into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(SVG_CONTENT_TYPE));
    Ok(response)
}

async fn public_health(State(state): State<HttpState>) -> Response {
    cache_health_response(&state, "infra::http::public_health").await
}
