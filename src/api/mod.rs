//! HTTP transport for the analysis pipeline.
//!
//! Thin adapter: multipart upload in, `AnalysisReport` JSON out. All
//! verification logic lives in `pipeline::analysis`.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{run_until_ctrl_c, start_api_server, ApiServer, ApiSession};
pub use types::ApiContext;
