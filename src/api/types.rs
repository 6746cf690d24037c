use std::sync::Arc;

use serde::Serialize;

use crate::pipeline::analysis::DocumentAnalyzer;

/// Shared context for all API routes. Cheap to clone.
#[derive(Clone)]
pub struct ApiContext {
    pub analyzer: Arc<DocumentAnalyzer>,
}

impl ApiContext {
    pub fn new(analyzer: Arc<DocumentAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub supported_document_types: Vec<String>,
    pub policy_version: &'static str,
    pub enabled_checks: Vec<&'static str>,
    pub ocr_available: bool,
    pub max_upload_bytes: usize,
}
