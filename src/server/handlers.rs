//! HTTP handlers for the form page, the shared resource and uploads.

use std::path::PathBuf;

use anyhow::Context;
use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::io::AsyncWriteExt;

use crate::common::AppError;
use crate::receive::PartialUpload;
use crate::server::download;
use crate::server::page::{form_response, Notice};
use crate::server::AppState;
use crate::share::DownloadAccess;
use crate::utils::security::upload_file_name;

struct StoredUpload {
    name: String,
    path: PathBuf,
    bytes: u64,
}

/// `GET /`
pub async fn index(State(state): State<AppState>) -> Response {
    form_response(&state, StatusCode::OK, Notice::None)
}

pub async fn favicon() -> StatusCode {
    StatusCode::NOT_FOUND
}

pub async fn not_found(State(state): State<AppState>) -> Response {
    form_response(&state, StatusCode::NOT_FOUND, Notice::DownloadNotFound)
}

/// `GET|HEAD /1`
///
/// HEAD answers from session state alone and never opens the file or touches counters.
pub async fn download(method: Method, State(state): State<AppState>) -> Response {
    let resource = match state.controller.download_access() {
        DownloadAccess::NotFound => {
            return form_response(&state, StatusCode::NOT_FOUND, Notice::DownloadNotFound)
        }
        DownloadAccess::Preparing => {
            return form_response(&state, StatusCode::ACCEPTED, Notice::PreparingDownload)
        }
        DownloadAccess::Ready(resource) => resource,
    };

    if method == Method::HEAD {
        return StatusCode::OK.into_response();
    }

    let name = resource.file_name();
    match download::serve(&state.controller, resource).await {
        Ok(response) => {
            tracing::info!("Serving download of '{name}'");
            response
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to handle download request for '{name}'");
            form_response(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                Notice::DownloadFailed,
            )
        }
    }
}

/// `POST /`
pub async fn upload(State(state): State<AppState>, request: Request) -> Response {
    if !state.controller.uploads_allowed() {
        tracing::debug!("Rejected upload: uploads are disabled");
        return form_response(&state, StatusCode::FORBIDDEN, Notice::None);
    }

    match receive_upload(&state, request).await {
        Ok(upload) => {
            // Counters move only after the file is fully on disk
            if let Some(dir) = upload.path.parent() {
                state.controller.record_upload(dir, upload.bytes);
            }
            tracing::info!(path = %upload.path.display(), bytes = upload.bytes, "Received upload {}", upload.name);
            form_response(&state, StatusCode::OK, Notice::UploadSucceeded)
        }
        Err(err) => {
            err.log();
            form_response(&state, err.status(), Notice::UploadFailed)
        }
    }
}

async fn receive_upload(state: &AppState, request: Request) -> Result<StoredUpload, AppError> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let mut field = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.body_text()))?
        .ok_or_else(|| AppError::BadRequest("multipart body contains no part".to_string()))?;

    let name = upload_file_name(field.file_name());

    let filer = state.filer.clone();
    let suggested = name.clone();
    let (path, file) = tokio::task::spawn_blocking(move || filer.create(&suggested))
        .await
        .context("upload filer task panicked")?
        .context("failed to create upload file")?;

    let partial = PartialUpload::new(path);
    let mut file = tokio::fs::File::from_std(file);
    let mut bytes = 0u64;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| AppError::BadRequest(err.body_text()))?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("failed writing {}", partial.path().display()))?;
        bytes += chunk.len() as u64;
    }
    file.flush()
        .await
        .with_context(|| format!("failed flushing {}", partial.path().display()))?;

    Ok(StoredUpload {
        name,
        path: partial.keep(),
        bytes,
    })
}
