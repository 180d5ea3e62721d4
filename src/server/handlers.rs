//! Route handlers

use super::{error::ApiError, AppState};
use crate::error::InpaintError;
use crate::tracing_config::spans;
use crate::types::DEFAULT_SIZE_LIMIT;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use std::sync::PoisonError;

/// Page served when no front-end build is present
const FALLBACK_INDEX: &str = include_str!("index.html");

/// Fields of a `POST /inpaint` form
#[derive(Debug)]
pub(super) struct InpaintForm {
    pub image: Vec<u8>,
    pub mask: Vec<u8>,
    pub size_limit: String,
}

impl InpaintForm {
    /// Collect `image`, `mask` and `sizeLimit`; unknown fields are ignored
    pub(super) async fn from_multipart(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut image = None;
        let mut mask = None;
        let mut size_limit = None;

        while let Some(field) = multipart.next_field().await? {
            match field.name().unwrap_or_default() {
                "image" => image = Some(field.bytes().await?.to_vec()),
                "mask" => mask = Some(field.bytes().await?.to_vec()),
                "sizeLimit" => size_limit = Some(field.text().await?),
                other => tracing::debug!(field = other, "ignoring multipart field"),
            }
        }

        Ok(Self {
            image: image.ok_or_else(|| ApiError::BadRequest("missing 'image' file".into()))?,
            mask: mask.ok_or_else(|| ApiError::BadRequest("missing 'mask' file".into()))?,
            size_limit: size_limit.unwrap_or_else(|| DEFAULT_SIZE_LIMIT.to_string()),
        })
    }
}

/// `POST /inpaint`
pub(super) async fn inpaint(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = InpaintForm::from_multipart(&mut multipart).await?;
    let span = spans::inpaint_request(form.image.len(), form.mask.len(), &form.size_limit);
    let processor = state.processor();

    let jpeg = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        // The model cache is released after every call, so a panicked
        // request leaves nothing to repair
        let mut processor = processor.lock().unwrap_or_else(PoisonError::into_inner);
        processor.process_to_jpeg(&form.image, &form.mask, &form.size_limit)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("inpaint task failed: {e}")))??;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"result.jpeg\"",
            ),
        ],
        jpeg,
    )
        .into_response())
}

/// `GET /`
pub(super) async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let path = state.config().build_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Ok(Html(page)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "front-end build missing, serving fallback page");
            Ok(Html(FALLBACK_INDEX.to_string()))
        },
        Err(e) => Err(InpaintError::file_io_error("read front-end page", &path, &e).into()),
    }
}

/// `GET /inputimage`
pub(super) async fn input_image(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(path) = &state.config().input_image else {
        return Ok("No Input Image".into_response());
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| InpaintError::file_io_error("read input image", path, &e))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}
