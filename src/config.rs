use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::analysis::{
    AnomalyChecks, DocumentTypeProfile, FeatureProviderToggles, SignatureMode,
};

/// Application-level constants
pub const APP_NAME: &str = "veridoc";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var naming an optional JSON config override.
pub const CONFIG_ENV: &str = "VERIDOC_CONFIG";
/// Env var for the HTTP bind address.
pub const ADDR_ENV: &str = "VERIDOC_ADDR";
pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";

/// Maximum accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_OCR_TIMEOUT_MS: u64 = 30_000;

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "veridoc=info,veridoc_lib=info,tower_http=info"
}

/// HTTP bind address from the environment, or the default.
pub fn bind_addr() -> String {
    std::env::var(ADDR_ENV).unwrap_or_else(|_| DEFAULT_ADDR.to_string())
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ═══════════════════════════════════════════════════════════
// Keyword lists
// ═══════════════════════════════════════════════════════════

/// Static word lists injected into the analyzers. Matching is
/// case-insensitive substring search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordLists {
    pub filename: Vec<String>,
    pub text: Vec<String>,
    pub editing_software: Vec<String>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordLists {
    fn default() -> Self {
        Self {
            filename: owned(&[
                "fake",
                "fraud",
                "counterfeit",
                "forged",
                "sample",
                "test",
                "dummy",
                "specimen",
            ]),
            text: owned(&[
                "fake",
                "fraud",
                "counterfeit",
                "forged",
                "sample",
                "test",
                "dummy",
                "specimen",
                "copy",
                "not valid",
                "template",
            ]),
            editing_software: owned(&[
                "photoshop",
                "gimp",
                "paint.net",
                "canva",
                "pixlr",
                "photoscape",
                "snapseed",
            ]),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Analyzer configuration
// ═══════════════════════════════════════════════════════════

/// Immutable analyzer configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub profiles: Vec<DocumentTypeProfile>,
    pub keywords: KeywordLists,
    pub checks: AnomalyChecks,
    pub providers: FeatureProviderToggles,
    pub signature_mode: SignatureMode,
    pub ocr_timeout_ms: u64,
    /// Tesseract language string, e.g. "eng" or "eng+fra".
    pub ocr_language: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            profiles: DocumentTypeProfile::defaults(),
            keywords: KeywordLists::default(),
            checks: AnomalyChecks::default(),
            providers: FeatureProviderToggles::default(),
            signature_mode: SignatureMode::default(),
            ocr_timeout_ms: DEFAULT_OCR_TIMEOUT_MS,
            ocr_language: "eng".to_string(),
        }
    }
}

impl AnalyzerConfig {
    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr_timeout_ms)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.is_empty() {
            return Err(ConfigError::Invalid("profile table is empty".into()));
        }
        for p in &self.profiles {
            if p.document_type.trim().is_empty() {
                return Err(ConfigError::Invalid("profile with empty document_type".into()));
            }
            if p.min_width == 0 || p.min_height == 0 {
                return Err(ConfigError::Invalid(format!(
                    "profile {}: minimum dimensions must be positive",
                    p.document_type
                )));
            }
            if !(p.min_aspect_ratio > 0.0 && p.min_aspect_ratio <= p.max_aspect_ratio) {
                return Err(ConfigError::Invalid(format!(
                    "profile {}: aspect range {}..{} is not ordered",
                    p.document_type, p.min_aspect_ratio, p.max_aspect_ratio
                )));
            }
        }

        for (name, list) in [
            ("filename", &self.keywords.filename),
            ("text", &self.keywords.text),
            ("editing_software", &self.keywords.editing_software),
        ] {
            if list.is_empty() || list.iter().any(|k| k.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "keyword list '{name}' must be non-empty and contain no blank entries"
                )));
            }
        }

        if self.ocr_timeout_ms == 0 {
            return Err(ConfigError::Invalid("ocr_timeout_ms must be non-zero".into()));
        }
        if self.ocr_language.trim().is_empty() {
            return Err(ConfigError::Invalid("ocr_language is empty".into()));
        }
        Ok(())
    }

    /// Parse and validate a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overridden by the file named in `VERIDOC_CONFIG` if set.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                tracing::info!(path = %path, "Loading analyzer config override");
                Self::from_json_file(Path::new(&path))
            }
            _ => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }
}
