// src/client/http.rs

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use std::time::Instant;

use crate::classifier::{RawResponse, ResponseClassifier};
use crate::client::{NO_FILE_SELECTED, SegmentationApi};
use crate::config::ServiceConfig;
use crate::errors::{FailureKind, Result, SegError, bound_message, truncate_chars};
use crate::models::{HealthStatus, Modality, SegmentationOutcome, SelectedFile, UploadRequest};

/// A client for the hosted segmentation service.
pub struct HttpSegmentationClient {
    client: Client,
    config: ServiceConfig,
    classifier: ResponseClassifier,
}

impl HttpSegmentationClient {
    /// Creates a new `HttpSegmentationClient` with the built-in diagnostic rules.
    pub fn new(client: Client, config: ServiceConfig) -> Self {
        Self::with_classifier(client, config, ResponseClassifier::builtin())
    }

    pub fn with_classifier(client: Client, config: ServiceConfig, classifier: ResponseClassifier) -> Self {
        Self { client, config, classifier }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }
}

/// Builds the multipart body. `slice_idx` is only present when a slice was requested.
pub fn build_form(file: SelectedFile, modality: Modality, slice_index: Option<u32>) -> Result<Form> {
    let mime = file.mime_type();
    let (name, bytes) = file.into_parts();
    let part = Part::bytes(bytes).file_name(name).mime_str(&mime)?;

    let mut form = Form::new()
        .part("file", part)
        .text("modality", modality.as_str());
    if let Some(slice_index) = slice_index {
        form = form.text("slice_idx", slice_index.to_string());
    }
    Ok(form)
}

/// Captures status, content type and body text without interpreting them.
async fn capture(resp: reqwest::Response) -> reqwest::Result<RawResponse> {
    let status = resp.status().as_u16();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await?;
    Ok(RawResponse { status, content_type, body })
}

fn transport_failure(err: &reqwest::Error) -> SegmentationOutcome {
    error!("Segmentation request failed: {}", err);
    SegmentationOutcome::failure(FailureKind::Transport, bound_message(&err.to_string()))
}

#[async_trait]
impl SegmentationApi for HttpSegmentationClient {
    async fn submit(&self, request: UploadRequest) -> SegmentationOutcome {
        let Some(file) = request.file else {
            return SegmentationOutcome::failure(FailureKind::Validation, NO_FILE_SELECTED);
        };

        let url = self.endpoint("segment");
        info!(
            "Submitting {} ({} bytes, {}, slice {:?}) to {}",
            file.name(),
            file.len(),
            request.modality,
            request.slice_index,
            url
        );

        let form = match build_form(file, request.modality, request.slice_index) {
            Ok(form) => form,
            Err(e) => {
                return SegmentationOutcome::failure(FailureKind::Validation, bound_message(&e.to_string()));
            }
        };

        let start = Instant::now();
        let resp = match self.client.post(&url).multipart(form).send().await {
            Ok(resp) => resp,
            Err(e) => return transport_failure(&e),
        };
        let raw = match capture(resp).await {
            Ok(raw) => raw,
            Err(e) => return transport_failure(&e),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        info!("Segmentation response status: {} ({}ms)", raw.status, latency_ms);
        debug!("Segmentation response content type: {:?}", raw.content_type);

        self.classifier.classify(&raw)
    }

    async fn health(&self) -> Result<HealthStatus> {
        let url = self.endpoint("health");
        debug!("Health check: {}", url);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(SegError::ApiError {
                status: status.as_u16(),
                body: truncate_chars(&crate::classifier::strip_markup(&body), 200),
            });
        }

        let health: HealthStatus = resp.json().await?;
        info!(
            "Segmentation service {} on {} (T1 loaded: {}, T2 loaded: {})",
            health.status, health.device, health.model_t1_loaded, health.model_t2_loaded
        );
        Ok(health)
    }
}
