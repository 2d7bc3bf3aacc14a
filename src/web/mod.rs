use std::{path::Path, sync::Arc};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ModelError, UploadError};
use crate::model::Classifier;
use crate::session::{run_prediction, SessionStore};
use crate::table::SensorTable;

pub mod render;

pub const SESSION_COOKIE: &str = "engine_session";
pub const DOWNLOAD_NAME: &str = "predictions.csv";

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn Classifier>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<AppConfig>,
}

/// Full UI plus the JSON endpoints.
pub fn router(state: AppState) -> Router {
    let limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/predict", post(predict))
        .route("/download", get(download))
        .route("/api/predict", post(api_predict))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Served instead of `router` when the model failed to load: nothing but
/// the error, on every path.
pub fn unavailable_router(message: String) -> Router {
    let page = Arc::new(render::unavailable(&message));
    Router::new().fallback(move || {
        let page = page.clone();
        async move { (StatusCode::SERVICE_UNAVAILABLE, Html(page.as_str().to_owned())) }
    })
}

/// User-facing text for a model that failed to load at startup.
pub fn startup_error_message(err: &ModelError, model_path: &Path) -> String {
    match err {
        ModelError::NotFound(_) => format!(
            "Model file not found. Please place '{}' in the app folder.",
            model_path.display()
        ),
        other => format!("Failed to load model: {}", other),
    }
}

fn cookie_session(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|kv| kv.trim().split_once('='))
        .find(|(k, _)| *k == SESSION_COOKIE)
        .and_then(|(_, v)| Uuid::parse_str(v).ok())
}

fn session_cookie(id: Uuid) -> Option<HeaderValue> {
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
    HeaderValue::from_str(&cookie).ok()
}

/// Cookie id, if it names a session this server opened and that is still live.
fn live_session(headers: &HeaderMap, store: &SessionStore) -> Option<Uuid> {
    cookie_session(headers).filter(|id| store.contains(id))
}

fn with_cookie(resp: impl IntoResponse, cookie: Option<HeaderValue>) -> Response {
    let mut resp = resp.into_response();
    if let Some(c) = cookie {
        resp.headers_mut().insert(header::SET_COOKIE, c);
    }
    resp
}

/// Unknown ids render as an empty session and store nothing.
async fn index(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let session = cookie_session(&headers)
        .and_then(|id| state.sessions.get(&id))
        .unwrap_or_default();
    Html(render::page(&session, state.config.preview_rows))
}

/// The only place sessions are opened: a browser without a live session
/// gets one here, under a fresh server-minted id.
async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let outcome = read_upload(&mut multipart).await;

    let (id, cookie) = match live_session(&headers, &state.sessions) {
        Some(id) => (id, None),
        None => {
            let id = state.sessions.open();
            (id, session_cookie(id))
        }
    };

    state.sessions.with(id, |session| match outcome {
        Ok((file_name, table)) => {
            tracing::info!(
                "upload file={} rows={} columns={}",
                file_name,
                table.len(),
                table.headers().len()
            );
            session.upload(file_name, table);
        }
        Err(e) => {
            tracing::warn!("upload rejected: {}", e);
            session.reject_upload(e.user_message());
        }
    });

    with_cookie(Redirect::to("/"), cookie)
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, SensorTable), UploadError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.csv").to_string();
        if !file_name.to_ascii_lowercase().ends_with(".csv") {
            return Err(UploadError::NotCsv(file_name));
        }
        let data = field.bytes().await?;
        tracing::info!("received file: {} ({} bytes)", file_name, data.len());

        let table = SensorTable::from_csv_bytes(&data)?;
        return Ok((file_name, table));
    }
    Err(UploadError::NoFile)
}

/// Inference runs with the session lock released; the lock is taken only
/// to fetch the table and to store the outcome.
async fn predict(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    let home = Redirect::to("/");
    let Some(id) = cookie_session(&headers) else {
        return home;
    };

    let table = match state.sessions.with(id, |s| s.prediction_input()) {
        Some(Ok(table)) => table,
        Some(Err(e)) => {
            tracing::warn!("{}", e.user_message());
            return home;
        }
        None => {
            tracing::debug!("predict for unknown session {}", id);
            return home;
        }
    };

    let outcome = run_prediction(state.model.as_ref(), &table);

    match state.sessions.with(id, |s| s.finish_prediction(&table, outcome)) {
        Some(Some(Ok(report))) => {
            tracing::info!("predicted rows={} counts={:?}", report.rows, report.counts)
        }
        Some(Some(Err(e))) => tracing::warn!("{}", e.user_message()),
        _ => tracing::debug!("discarded prediction for replaced or expired upload"),
    }
    home
}

async fn download(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let report = cookie_session(&headers)
        .and_then(|id| state.sessions.get(&id))
        .and_then(|s| s.report().cloned());
    match report {
        Some(report) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", DOWNLOAD_NAME),
                ),
            ],
            report.csv.clone(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "no predictions to download").into_response(),
    }
}

/// Stateless: CSV body in, report JSON out.
async fn api_predict(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let unprocessable = |msg: String| {
        tracing::warn!("{}", msg);
        (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": msg })))
    };

    let table = SensorTable::from_csv_bytes(&body).map_err(|e| unprocessable(e.to_string()))?;
    let report = run_prediction(state.model.as_ref(), &table)
        .map_err(|e| unprocessable(e.user_message()))?;

    tracing::info!("api predicted rows={} counts={:?}", report.rows, report.counts);
    let mut out = serde_json::to_value(&report).map_err(|e| unprocessable(e.to_string()))?;
    out["csv"] = json!(report.csv_text());
    Ok(Json(out))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let schema = state.model.schema();
    Json(json!({
        "status": "ok",
        "model": state.model.kind(),
        "schema": schema.name,
        "version": schema.version,
        "features": schema.features,
    }))
}
