//! axum routes for the receiver.
//!
//! | route | handler |
//! |---|---|
//! | `POST /upload` | one multipart chunk |
//! | `GET /sessions/{id}` | session status JSON |
//! | `GET /config` | advertised limits |

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use chunkferry_protocol::constants::{UPLOAD_ROUTE, fields};
use chunkferry_protocol::{ChunkMeta, ReceiverLimits, SessionStatus, parse_chunk_file_name};

use crate::ReceiverError;
use crate::receiver::{ChunkReceiver, ChunkUpload, ReceiveOutcome};

/// Body allowance on top of the chunk size for multipart framing and the
/// text fields.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Builds the receiver router.
pub fn router(receiver: Arc<ChunkReceiver>) -> Router {
    let body_limit = receiver.chunk_size().saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route(UPLOAD_ROUTE, post(upload_chunk))
        .route("/sessions/{id}", get(session_status))
        .route("/config", get(receiver_limits))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(receiver)
}

impl IntoResponse for ReceiverError {
    fn into_response(self) -> Response {
        let status = match &self {
            ReceiverError::Validation(_) => StatusCode::NOT_FOUND,
            ReceiverError::Save { .. } => StatusCode::BAD_REQUEST,
            ReceiverError::Assembly(_) => StatusCode::NOT_ACCEPTABLE,
            ReceiverError::SessionClosed { .. } => StatusCode::CONFLICT,
        };
        (status, self.to_string()).into_response()
    }
}

async fn upload_chunk(
    State(receiver): State<Arc<ChunkReceiver>>,
    multipart: Multipart,
) -> Result<&'static str, Response> {
    let upload = read_upload(multipart).await?;
    match receiver.receive_chunk(upload).await {
        Ok(ReceiveOutcome::Accepted { .. }) => Ok("chunk accepted"),
        Ok(ReceiveOutcome::Completed(_)) => Ok("upload complete"),
        Err(e) => {
            tracing::warn!(error = %e, "chunk rejected");
            Err(e.into_response())
        }
    }
}

async fn session_status(
    State(receiver): State<Arc<ChunkReceiver>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatus>, StatusCode> {
    receiver
        .session_status(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn receiver_limits(State(receiver): State<Arc<ChunkReceiver>>) -> Json<ReceiverLimits> {
    Json(receiver.limits())
}

/// Collects the multipart form. Framing errors keep axum's own status;
/// undecodable text fields are validation failures.
async fn read_upload(mut multipart: Multipart) -> Result<ChunkUpload, Response> {
    let mut form = HashMap::new();
    let mut part = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == fields::FILE {
            let part_name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(IntoResponse::into_response)?;
            part = Some((part_name, data.to_vec()));
        } else {
            let bytes = field.bytes().await.map_err(IntoResponse::into_response)?;
            let value = String::from_utf8(bytes.to_vec()).map_err(|_| {
                ReceiverError::Validation(format!("field {name} is not valid UTF-8")).into_response()
            })?;
            form.insert(name, value);
        }
    }

    parse_upload(&form, part).map_err(IntoResponse::into_response)
}

/// Builds a [`ChunkUpload`] from the text fields and the file part.
///
/// The ordinal comes from the part's file name (`{file}_chunk_{n}`), whose
/// prefix must match the `filename` field.
fn parse_upload(
    form: &HashMap<String, String>,
    part: Option<(String, Vec<u8>)>,
) -> Result<ChunkUpload, ReceiverError> {
    let (part_name, payload) =
        part.ok_or_else(|| ReceiverError::Validation("missing file part".into()))?;
    let session_id = required(form, fields::SESSION_ID)?;
    let file_name = required(form, fields::FILE_NAME)?;
    let total_chunks: u32 = parse_number(form, fields::TOTAL_CHUNKS)?;
    let total_size: u64 = parse_number(form, fields::TOTAL_SIZE)?;
    let is_last = match required(form, fields::IS_DONE)? {
        "true" => true,
        "false" => false,
        other => {
            return Err(ReceiverError::Validation(format!(
                "{} must be true or false, got {other:?}",
                fields::IS_DONE
            )));
        }
    };

    let (part_file, ordinal) =
        parse_chunk_file_name(&part_name).map_err(|e| ReceiverError::Validation(e.to_string()))?;
    if part_file != file_name {
        return Err(ReceiverError::Validation(format!(
            "part {part_name:?} does not belong to {file_name:?}"
        )));
    }

    Ok(ChunkUpload {
        meta: ChunkMeta {
            session_id: session_id.to_string(),
            file_name: file_name.to_string(),
            ordinal,
            total_chunks,
            total_size,
            is_last,
        },
        payload,
    })
}

fn required<'a>(form: &'a HashMap<String, String>, name: &str) -> Result<&'a str, ReceiverError> {
    form.get(name)
        .map(String::as_str)
        .ok_or_else(|| ReceiverError::Validation(format!("missing field {name}")))
}

fn parse_number<T: FromStr>(form: &HashMap<String, String>, name: &str) -> Result<T, ReceiverError> {
    let raw = required(form, name)?;
    raw.parse()
        .map_err(|_| ReceiverError::Validation(format!("{name} is not a number: {raw:?}")))
}
