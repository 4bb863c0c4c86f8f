//! Gateway routes.
//!
//! Every route takes a `service` query parameter naming the video service and
//! answers with a `{"success": bool, "response": ...}` envelope, except the
//! media routes, which stream the artifact itself unless the client asks for
//! JSON.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::AppContext;
use crate::catalog;
use crate::error::{ErrorClass, JayeError};
use crate::models::{VideoInfo, SERVICE_YOUTUBE};

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Params {
    pub service: Option<String>,
    pub id: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub response: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        response: data,
    })
}

/// Error answered to the client: a status and a sanitized message
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }
}

impl From<JayeError> for ApiError {
    fn from(err: JayeError) -> Self {
        let status = match err.class() {
            ErrorClass::Client => StatusCode::BAD_REQUEST,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Upstream => StatusCode::BAD_GATEWAY,
            ErrorClass::Server => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.public_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope {
            success: false,
            response: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Log the full error with its context, hand back the sanitized one
fn report(context: &str, subject: &str, err: JayeError) -> ApiError {
    error!("{} {}: {}", context, subject, err);
    ApiError::from(err)
}

// ============================================================================
// Parameter checks
// ============================================================================

fn require_service(params: &Params) -> Result<(), ApiError> {
    match params.service.as_deref() {
        None | Some("") => Err(ApiError::bad_request("service id not supplied")),
        Some(SERVICE_YOUTUBE) => Ok(()),
        Some(_) => Err(ApiError::bad_request("service not found")),
    }
}

fn require_id(params: &Params) -> Result<String, ApiError> {
    match params.id.as_deref().map(str::trim) {
        None | Some("") => Err(ApiError::bad_request("no id supplied")),
        Some(id) => Ok(id.to_string()),
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

/// `Content-Disposition` value with an ASCII fallback name and the exact
/// UTF-8 name in `filename*`
pub fn content_disposition(title: &str, extension: &str) -> String {
    let fallback: String = title
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::new();
    for byte in format!("{}.{}", title, extension).bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }

    format!(
        "inline; filename=\"{}.{}\"; filename*=UTF-8''{}",
        fallback, extension, encoded
    )
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> &'static str {
    "ok"
}

pub async fn search(
    State(ctx): State<AppContext>,
    Query(params): Query<Params>,
) -> Result<Json<Envelope<Vec<String>>>, ApiError> {
    require_service(&params)?;
    let query = match params.q.as_deref().map(str::trim) {
        None | Some("") => return Err(ApiError::bad_request("missing query parameter")),
        Some(q) => q.to_string(),
    };

    let ids = ctx
        .catalog
        .search(&query)
        .await
        .map_err(|e| report("Failed to search catalog for", &query, e))?;

    Ok(ok(ids))
}

pub async fn info(
    State(ctx): State<AppContext>,
    Query(params): Query<Params>,
) -> Result<Json<Envelope<VideoInfo>>, ApiError> {
    require_service(&params)?;
    let id = require_id(&params)?;

    let info = ctx
        .catalog
        .info(&id)
        .await
        .map_err(|e| report("Failed to retrieve video info for", &id, e))?;

    Ok(ok(info))
}

#[derive(Debug, Clone, Copy)]
enum Media {
    Video,
    Audio,
}

impl Media {
    fn extension(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Audio => "audio/mpeg",
        }
    }
}

async fn deliver(ctx: AppContext, params: Params, headers: HeaderMap, media: Media) -> Result<Response, ApiError> {
    require_service(&params)?;
    let id = require_id(&params)?;

    // Dropping this handler (client went away) cancels the pipeline.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let acquired = match media {
        Media::Video => ctx.acquirer.video_artifact(&id, &cancel).await,
        Media::Audio => ctx.acquirer.audio_artifact(&id, &cancel).await,
    };
    let file: File = acquired.map_err(|e| report("Failed to retrieve media file for", &id, e))?;

    let info = ctx
        .catalog
        .info(&id)
        .await
        .map_err(|e| report("Failed to retrieve video info for", &id, e))?;

    if wants_json(&headers) {
        return Ok(ok(info).into_response());
    }

    let length = file.metadata().await.ok().map(|m| m.len());
    let body = Body::from_stream(ReaderStream::new(file));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, media.content_type())
        .header(header::CONTENT_DISPOSITION, content_disposition(&info.title, media.extension()));
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder
        .body(body)
        .map_err(|e| report("Failed to build response for", &id, JayeError::Io(std::io::Error::other(e))))
}

pub async fn video(
    State(ctx): State<AppContext>,
    Query(params): Query<Params>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    deliver(ctx, params, headers, Media::Video).await
}

pub async fn audio(
    State(ctx): State<AppContext>,
    Query(params): Query<Params>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    deliver(ctx, params, headers, Media::Audio).await
}

pub async fn list(
    State(ctx): State<AppContext>,
    Query(params): Query<Params>,
) -> Result<Json<Envelope<Vec<VideoInfo>>>, ApiError> {
    require_service(&params)?;

    let videos = catalog::list(ctx.acquirer.store(), ctx.catalog.as_ref())
        .await
        .map_err(|e| report("Failed to list", "videos", e))?;

    Ok(ok(videos))
}
