// src/client/mod.rs

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{HealthStatus, SegmentationOutcome, UploadRequest};

pub mod http;

pub use http::HttpSegmentationClient;

/// Message returned when a submission is attempted without a volume.
pub const NO_FILE_SELECTED: &str = "no file selected";

/// A common trait for segmentation backends.
///
/// The HTTP client is the production implementation; sessions only see this
/// trait so they can be driven by a test double.
#[async_trait]
pub trait SegmentationApi: Send + Sync {
    /// Submits one volume and returns the classified outcome.
    ///
    /// Never fails: validation, transport and protocol problems all come back
    /// as `SegmentationOutcome::Failure`.
    async fn submit(&self, request: UploadRequest) -> SegmentationOutcome;

    /// Probes service liveness and which modality models are loaded.
    async fn health(&self) -> Result<HealthStatus>;
}
