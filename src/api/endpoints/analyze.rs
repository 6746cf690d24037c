//! `POST /api/v1/analyze`: multipart upload in, analysis report out.
//!
//! Fields: `file` (the image) and optional `document_type` (defaults to
//! "unknown"). The pipeline is CPU-bound, so it runs on the blocking pool.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::analysis::{AnalysisReport, AnalysisRequest, UNKNOWN_DOCUMENT_TYPE};

struct Upload {
    bytes: Bytes,
    content_type: Option<String>,
    filename: Option<String>,
}

pub async fn analyze(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisReport>, ApiError> {
    let mut upload: Option<Upload> = None;
    let mut document_type = UNKNOWN_DOCUMENT_TYPE.to_string();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let content_type = field.content_type().map(str::to_string);
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                upload = Some(Upload {
                    bytes,
                    content_type,
                    filename,
                });
            }
            "document_type" => {
                let value = field.text().await?;
                if !value.trim().is_empty() {
                    document_type = value.trim().to_string();
                }
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".into()))?;
    if !is_image_upload(upload.content_type.as_deref(), &upload.bytes) {
        return Err(ApiError::BadRequest("Only image files are supported".into()));
    }

    let mut request = AnalysisRequest::new(&document_type);
    if let Some(name) = upload.filename.as_deref() {
        request = request.with_filename(name);
    }
    tracing::info!(
        document_type = %request.document_type,
        bytes = upload.bytes.len(),
        "Analysis request received"
    );

    let analyzer = Arc::clone(&ctx.analyzer);
    let bytes = upload.bytes;
    let report = tokio::task::spawn_blocking(move || analyzer.analyze_bytes(&bytes, &request))
        .await
        .map_err(|e| ApiError::Internal(format!("Analysis task failed: {e}")))??;

    Ok(Json(report))
}

/// Declared `image/*` types pass. Without a declared type, sniff the bytes.
fn is_image_upload(content_type: Option<&str>, bytes: &[u8]) -> bool {
    match content_type {
        Some(ct) => ct.trim().to_ascii_lowercase().starts_with("image/"),
        None => image::guess_format(bytes).is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_image_types_pass() {
        assert!(is_image_upload(Some("image/jpeg"), b""));
        assert!(is_image_upload(Some("IMAGE/PNG"), b""));
        assert!(!is_image_upload(Some("application/pdf"), b"%PDF-1.7"));
        assert!(!is_image_upload(Some("text/plain"), b"hello"));
    }

    #[test]
    fn undeclared_type_is_sniffed() {
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert!(is_image_upload(None, &png_magic));
        assert!(!is_image_upload(None, b"plain text"));
    }
}
