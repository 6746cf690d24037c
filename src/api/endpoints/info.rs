use axum::extract::State;
use axum::Json;

use crate::api::types::{ApiContext, InfoResponse};
use crate::pipeline::analysis::UNKNOWN_DOCUMENT_TYPE;

/// `GET /info`: service capabilities.
pub async fn info(State(ctx): State<ApiContext>) -> Json<InfoResponse> {
    let config = ctx.analyzer.config();
    let mut supported_document_types: Vec<String> = config
        .profiles
        .iter()
        .map(|p| p.document_type.clone())
        .collect();
    supported_document_types.push(UNKNOWN_DOCUMENT_TYPE.to_string());

    Json(InfoResponse {
        service: crate::config::APP_NAME,
        version: crate::config::APP_VERSION,
        supported_document_types,
        policy_version: ctx.analyzer.policy().version,
        enabled_checks: config.checks.enabled_names(),
        ocr_available: cfg!(feature = "ocr"),
        max_upload_bytes: crate::config::MAX_UPLOAD_BYTES,
    })
}
