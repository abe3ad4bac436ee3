#![warn(missing_docs)]
//! The HTTP adapter: exposes a [`Backend`] as the RDB wire protocol
//! (`spec.md` §4.8 / §6) — raw value endpoints, a bulk endpoint with three
//! cosmetic aliases, iteration endpoints, and a stats endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Form, Path as AxPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rdb_backend_core::{Backend, GetDefault, MultiDefault, validate_key};
use rdb_error::{ErrorKind, RdbError};
use serde::Deserialize;

/// Shared server state: the single process-wide backend instance
/// (`spec.md` §5: "the server's backend object is a single process-wide
/// instance").
#[derive(Clone)]
pub struct AppState {
    /// The backend every route dispatches to.
    pub backend: Arc<dyn Backend>,
}

/// Build the router with every route from `spec.md` §4.8.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/data/{*key}", get(get_data).put(put_data).delete(delete_data))
        .route("/_bulk", post(bulk))
        .route("/_bulk/{*rest}", post(bulk))
        .route("/_get_multi", post(bulk))
        .route("/_get_multi/{*rest}", post(bulk))
        .route("/_put_multi", post(bulk))
        .route("/_put_multi/{*rest}", post(bulk))
        .route("/_delete_multi", post(bulk))
        .route("/_delete_multi/{*rest}", post(bulk))
        .route("/_all_keys", get(all_keys))
        .route("/_all_data", get(all_data))
        .route("/_stats", get(stats))
        .with_state(state)
}

/// Map an [`RdbError`] to a response. Used for every error that is not the
/// route-specific `NotFound`/`BadWireFormat` handling called out in
/// `spec.md` §7.
fn error_response(err: &RdbError) -> Response {
    let status = match err.kind {
        ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadWireFormat => StatusCode::NOT_ACCEPTABLE,
        ErrorKind::InvalidKey | ErrorKind::TransportError | ErrorKind::BackendUnavailable => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({ "error": err.message }))).into_response()
}

async fn index() -> impl IntoResponse {
    let body = r#"<html>
 <body>
  <form method="POST" action="/_bulk">
   <table>
    <tr><th>method</th><th>example</th><th></th></tr>
    <tr><td>get</td><td>{"keys": ["bacon"]}</td><td><input name="get"/></td></tr>
    <tr><td>put</td><td>{"bacon": {"type": "object", "value": "is yummy"}}</td><td><input name="put"/></td></tr>
    <tr><td>delete</td><td>{"keys": ["bacon"]}</td><td><input name="delete"/></td></tr>
   </table>
   <input type="submit" />
  </form>
 </body>
</html>
"#;
    ([(header::CONTENT_TYPE, "text/html")], body)
}

async fn get_data(State(state): State<AppState>, AxPath(key): AxPath<String>) -> Response {
    let key = key.into_bytes();
    if let Err(e) = validate_key(&key) {
        return error_response(&e);
    }
    match state.backend.get(&key, GetDefault::NotFound).await {
        Ok(Some(bytes)) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Ok(None) => (
            [(header::CONTENT_TYPE, "application/json")],
            b"null".to_vec(),
        )
            .into_response(),
        Err(e) if e.is_not_found() => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}

async fn put_data(
    State(state): State<AppState>,
    AxPath(key): AxPath<String>,
    body: Bytes,
) -> Response {
    let key = key.into_bytes();
    if let Err(e) = validate_key(&key) {
        return error_response(&e);
    }
    if rdb_codec::from_bytes(&body).is_err() {
        return (StatusCode::NOT_ACCEPTABLE, "body is not a valid envelope").into_response();
    }
    match state.backend.put(&key, Some(&body)).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(&e),
    }
}

async fn delete_data(State(state): State<AppState>, AxPath(key): AxPath<String>) -> Response {
    let key = key.into_bytes();
    if let Err(e) = validate_key(&key) {
        return error_response(&e);
    }
    match state.backend.raw_delete(&key).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(&e),
    }
}

/// `{"keys": [...]}`, used by the bulk endpoint's `get` and `delete` fields.
#[derive(Deserialize)]
struct KeysField {
    keys: Vec<String>,
}

fn parse_keys(field: &str) -> Result<Vec<Vec<u8>>, RdbError> {
    let parsed: KeysField = serde_json::from_str(field)
        .map_err(|e| RdbError::bad_wire_format(format!("malformed keys field: {e}")))?;
    Ok(parsed.keys.into_iter().map(String::into_bytes).collect())
}

#[derive(Deserialize, Default)]
struct BulkForm {
    #[serde(default)]
    get: Option<String>,
    #[serde(default)]
    put: Option<String>,
    #[serde(default)]
    delete: Option<String>,
}

/// Handles `_bulk` and its three cosmetic aliases identically — the
/// operation name in the path is never inspected (`spec.md` §4.7/§4.8).
/// Reads the three optional form fields independently and executes
/// get → put → delete in that order, per request.
async fn bulk(State(state): State<AppState>, Form(form): Form<BulkForm>) -> Response {
    let mut response_map = serde_json::Map::new();

    if let Some(field) = form.get.as_deref() {
        let keys = match parse_keys(field) {
            Ok(k) => k,
            Err(e) => return error_response(&e),
        };
        match state.backend.get_multi(&keys, MultiDefault::NoInclude).await {
            Ok(found) => {
                for (key, value) in found {
                    let k = String::from_utf8_lossy(&key).into_owned();
                    let envelope = match value {
                        Some(bytes) => {
                            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
                        }
                        None => serde_json::Value::Null,
                    };
                    response_map.insert(k, envelope);
                }
            }
            Err(e) => return error_response(&e),
        }
    }

    if let Some(field) = form.put.as_deref() {
        let map: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(field) {
            Ok(m) => m,
            Err(e) => {
                return error_response(&RdbError::bad_wire_format(format!(
                    "malformed put field: {e}"
                )));
            }
        };
        let mut values: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        for (key, envelope) in map {
            let envelope: rdb_codec::Envelope = match serde_json::from_value(envelope) {
                Ok(e) => e,
                Err(e) => {
                    return error_response(&RdbError::bad_wire_format(format!(
                        "malformed envelope for key {key:?}: {e}"
                    )));
                }
            };
            values.insert(key.into_bytes(), Some(rdb_codec::to_bytes(&envelope)));
        }
        if let Err(e) = state.backend.put_multi(&values).await {
            return error_response(&e);
        }
    }

    if let Some(field) = form.delete.as_deref() {
        let keys = match parse_keys(field) {
            Ok(k) => k,
            Err(e) => return error_response(&e),
        };
        for key in keys {
            if let Err(e) = state.backend.raw_delete(&key).await {
                return error_response(&e);
            }
        }
    }

    (StatusCode::OK, Json(serde_json::Value::Object(response_map))).into_response()
}

async fn all_keys(State(state): State<AppState>) -> Response {
    if !state.backend.supports_iteration() {
        return StatusCode::NOT_IMPLEMENTED.into_response();
    }
    match state.backend.keys().await {
        Ok(keys) => {
            let list: Vec<String> = keys
                .into_iter()
                .map(|k| String::from_utf8_lossy(&k).into_owned())
                .collect();
            Json(list).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn all_data(State(state): State<AppState>) -> Response {
    if !state.backend.supports_iteration() {
        return StatusCode::NOT_IMPLEMENTED.into_response();
    }
    match state.backend.items().await {
        Ok(items) => {
            let mut out = serde_json::Map::new();
            for (key, value) in items {
                let k = String::from_utf8_lossy(&key).into_owned();
                let envelope = match value {
                    Some(bytes) => {
                        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
                    }
                    None => serde_json::Value::Null,
                };
                out.insert(k, envelope);
            }
            Json(serde_json::Value::Object(out)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn stats(State(state): State<AppState>) -> Response {
    match state.backend.stats().await {
        Ok(map) => {
            let obj: serde_json::Map<String, serde_json::Value> = map.into_iter().collect();
            Json(serde_json::Value::Object(obj)).into_response()
        }
        Err(e) => error_response(&e),
    }
}
