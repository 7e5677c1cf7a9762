use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use doclinker_types::{ItemId, Span};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::error::LinkError;
use crate::pipeline::{LinkOptions, Linker};
use crate::references::{Family, Reference};

pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub linker: Arc<Linker>,
    pub max_body_bytes: usize,
}

#[derive(Deserialize)]
pub struct LinkRequest {
    #[serde(default)]
    pub html: String,
    pub number: Option<String>,
    pub date: Option<String>,
    pub glossary: Option<bool>,
    pub references: Option<bool>,
    pub body_only: Option<bool>,
}

#[derive(Serialize)]
pub struct LinkResponse {
    html: String,
    glossary_links: usize,
    reference_links: usize,
}

#[derive(Deserialize)]
pub struct ReferencesRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Serialize)]
pub struct ReferenceView {
    kind: &'static str,
    family: Family,
    number: Option<String>,
    date: Option<String>,
    chapter: Option<String>,
    start: usize,
    end: usize,
    resolved_id: Option<ItemId>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/link", post(link))
        .route("/v1/references", post(references))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn link(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    if request.html.trim().is_empty() {
        return Err(ApiError::bad_request("html is required"));
    }
    let defaults = LinkOptions::default();
    let options = LinkOptions {
        glossary: request.glossary.unwrap_or(defaults.glossary),
        references: request.references.unwrap_or(defaults.references),
        body_only: request.body_only.unwrap_or(defaults.body_only),
        number: request.number,
        date: request.date,
    };

    let linker = Arc::clone(&state.linker);
    let html = request.html;
    let outcome = tokio::task::spawn_blocking(move || linker.link(&html, &options))
        .await
        .map_err(|err| {
            warn!("link task failed: {err}");
            ApiError::Internal
        })?
        .map_err(|err| match err {
            LinkError::MissingBody => ApiError::bad_request(err.to_string()),
            other => {
                warn!("link failed: {other}");
                ApiError::Internal
            }
        })?;

    Ok(Json(LinkResponse {
        html: outcome.html,
        glossary_links: outcome.glossary_links,
        reference_links: outcome.reference_links,
    }))
}

async fn references(
    State(state): State<AppState>,
    Json(request): Json<ReferencesRequest>,
) -> Result<Json<Vec<ReferenceView>>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::bad_request("text is required"));
    }
    let linker = Arc::clone(&state.linker);
    let text = request.text;
    let views: Vec<ReferenceView> = tokio::task::spawn_blocking(move || {
        linker
            .detect_references(&text)
            .into_iter()
            .map(ReferenceView::from)
            .collect()
    })
    .await
    .map_err(|err| {
        warn!("reference task failed: {err}");
        ApiError::Internal
    })?;
    Ok(Json(views))
}

impl From<Reference> for ReferenceView {
    fn from(reference: Reference) -> Self {
        let Span { start, end } = reference.span();
        match reference {
            Reference::Document(doc) => Self {
                kind: "document",
                family: doc.family,
                resolved_id: doc.resolved_id().cloned(),
                number: Some(doc.number),
                date: doc.date,
                chapter: None,
                start,
                end,
            },
            Reference::Chapter(chapter) => Self {
                kind: "chapter",
                family: Family::Chapter,
                number: None,
                date: None,
                chapter: Some(chapter.chapter),
                start,
                end,
                resolved_id: None,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                let body = Json(ErrorResponse { error: msg });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            ApiError::Internal => {
                let body = Json(json!({ "error": "internal server error" }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}
