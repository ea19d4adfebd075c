use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use common::{ErrorMessage, MirrorError, MirrorValue, CACHE_UPDATE_HEADER, CACHE_UPDATE_VALUE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::service::{Answer, MirrorService};

pub type AppState = Arc<MirrorService>;

#[derive(Debug, Deserialize)]
pub struct KeysQuery {
    #[serde(default)]
    pub ids: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// GET /mirror/{key}
pub async fn get_value(
    State(service): State<AppState>,
    Path(key): Path<String>,
    uri: Uri,
) -> Response {
    debug!(%key, "point read");

    match service.get(&key).await {
        Ok(Answer {
            value: Some(value),
            forwarded,
        }) => value_response(value, forwarded),
        Ok(Answer {
            value: None,
            forwarded,
        }) => with_cache_update(
            error_response(&MirrorError::not_found(key), &uri),
            forwarded,
        ),
        Err(e) => error_response(&e, &uri),
    }
}

/// GET /mirror/keys?ids=a,b,c
pub async fn get_values(
    State(service): State<AppState>,
    Query(query): Query<KeysQuery>,
    uri: Uri,
) -> Response {
    let ids: Vec<String> = query
        .ids
        .unwrap_or_default()
        .split(',')
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    debug!(keys = ids.len(), "batched read");

    match service.get_many(&ids).await {
        Ok(answer) => value_response(answer.value, answer.forwarded),
        Err(e) => error_response(&e, &uri),
    }
}

/// GET /mirror
pub async fn get_all(State(service): State<AppState>) -> Response {
    let values = service.get_all();
    debug!(count = values.len(), "full read");
    value_response(values, false)
}

/// GET /mirror/range/{key}?from=..&to=..
pub async fn get_range(
    State(service): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<RangeQuery>,
    uri: Uri,
) -> Response {
    let (Some(from), Some(to)) = (query.from, query.to) else {
        let err = MirrorError::invalid_argument("query parameters 'from' and 'to' are required");
        return error_response(&err, &uri);
    };
    debug!(%key, %from, %to, "range read");

    match service.get_range(&key, &from, &to).await {
        Ok(answer) => value_response(answer.value, answer.forwarded),
        Err(e) => error_response(&e, &uri),
    }
}

/// GET /streams/partitions
pub async fn get_partitions(State(service): State<AppState>) -> Response {
    Json(service.partitions()).into_response()
}

/// Health check endpoint
pub async fn health_check(State(service): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "topic": service.topic(),
        "host": service.local_host().authority(),
        "records": service.store().len(),
    }))
    .into_response()
}

fn value_response<T: Serialize>(value: T, forwarded: bool) -> Response {
    with_cache_update(
        (StatusCode::OK, Json(MirrorValue::new(value))).into_response(),
        forwarded,
    )
}

fn with_cache_update(mut response: Response, forwarded: bool) -> Response {
    if forwarded {
        response.headers_mut().insert(
            CACHE_UPDATE_HEADER,
            HeaderValue::from_static(CACHE_UPDATE_VALUE),
        );
    }
    response
}

fn error_response(err: &MirrorError, uri: &Uri) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match status.as_u16() {
        404 => debug!(path = %uri.path(), error = %err, "not found"),
        400..=499 => warn!(path = %uri.path(), error = %err, "rejected request"),
        _ => error!(path = %uri.path(), error = %err, "request failed"),
    }

    let body = ErrorMessage::new(
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error"),
        err.to_string(),
    )
    .with_uri_path(uri.path());
    (status, Json(body)).into_response()
}
