// src/classifier/mod.rs

//! Turns whatever the segmentation service sent back into a `SegmentationOutcome`.
//!
//! The hosted service answers with framework HTML pages while its model is
//! cold or a route is misconfigured, so nothing here assumes the body is JSON
//! until the content type says so, and no body text reaches the user without
//! markup being stripped and length being bounded.

pub mod rules;

use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

use crate::errors::{FailureKind, MAX_MESSAGE_CHARS, bound_message, truncate_chars};
use crate::models::{MedicalReport, SegmentationOutcome, SegmentationResult, Statistics};
pub use rules::{DiagnosticRule, DiagnosticRules};

pub const MALFORMED_DATA_MESSAGE: &str = "server returned malformed data";
pub const INCOMPLETE_DATA_MESSAGE: &str = "server response was incomplete";

/// Longest body excerpt included in a non-JSON diagnostic.
pub const MAX_SNIPPET_CHARS: usize = 200;
/// Bodies at least this long are never excerpted.
const SNIPPET_BODY_LIMIT: usize = 500;

static MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<!--.*?-->|<[^>]*>")
        .expect("markup pattern is valid")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// An HTTP response captured verbatim, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
                essence == "application/json" || essence.ends_with("+json")
            })
            .unwrap_or(false)
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Deserialize)]
struct SuccessPayload {
    overlay_image: String,
    #[serde(default)]
    segmentation_file: Option<String>,
    statistics: Statistics,
    #[serde(default)]
    medical_report: Option<MedicalReport>,
}

impl From<SuccessPayload> for SegmentationResult {
    fn from(payload: SuccessPayload) -> Self {
        let overlay_image = if payload.overlay_image.starts_with("data:") {
            payload.overlay_image
        } else {
            format!("data:image/png;base64,{}", payload.overlay_image)
        };
        SegmentationResult {
            overlay_image,
            segmentation_artifact: payload.segmentation_file.filter(|s| !s.is_empty()),
            statistics: payload.statistics,
            medical_report: payload.medical_report,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseClassifier {
    rules: DiagnosticRules,
}

impl ResponseClassifier {
    pub fn new(rules: DiagnosticRules) -> Self {
        Self { rules }
    }

    /// A classifier using the built-in diagnostic rules.
    pub fn builtin() -> Self {
        Self::new(DiagnosticRules::builtin())
    }

    pub fn rules(&self) -> &DiagnosticRules {
        &self.rules
    }

    pub fn classify(&self, raw: &RawResponse) -> SegmentationOutcome {
        if !raw.is_json() {
            return self.classify_non_json(raw);
        }

        let value: Value = match serde_json::from_str(&raw.body) {
            Ok(value) => value,
            Err(e) => {
                warn!("Malformed JSON from segmentation service (status {}): {}", raw.status, e);
                return SegmentationOutcome::failure(FailureKind::Protocol, MALFORMED_DATA_MESSAGE);
            }
        };

        let success = value.get("success").and_then(Value::as_bool).unwrap_or(false);
        if !raw.is_success_status() || !success {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .filter(|e| !e.trim().is_empty())
                .map(|e| truncate_chars(e, MAX_MESSAGE_CHARS))
                .unwrap_or_else(|| format!("Request failed with HTTP status {}", raw.status));
            debug!("Service reported failure (status {}): {}", raw.status, message);
            return SegmentationOutcome::failure(FailureKind::Application, message);
        }

        match serde_json::from_value::<SuccessPayload>(value) {
            Ok(payload) => SegmentationOutcome::Success(payload.into()),
            Err(e) => {
                warn!("Incomplete segmentation payload: {}", e);
                SegmentationOutcome::failure(
                    FailureKind::Protocol,
                    bound_message(&format!("{}: {}", INCOMPLETE_DATA_MESSAGE, e)),
                )
            }
        }
    }

    fn classify_non_json(&self, raw: &RawResponse) -> SegmentationOutcome {
        warn!(
            "Non-JSON response from segmentation service (status {}, content type {:?})",
            raw.status, raw.content_type
        );

        if let Some(rule) = self.rules.find(raw.status, &raw.body) {
            debug!("Matched diagnostic rule '{}'", rule.name());
            return SegmentationOutcome::failure(FailureKind::Protocol, rule.message());
        }

        let text = strip_markup(&raw.body);
        let message = if raw.body.chars().count() < SNIPPET_BODY_LIMIT && !text.is_empty() {
            format!("Server error: {}", truncate_chars(&text, MAX_SNIPPET_CHARS))
        } else {
            format!("Server returned non-JSON response ({})", raw.status)
        };
        SegmentationOutcome::failure(FailureKind::Protocol, message)
    }
}

/// Removes tags, scripts and comments and collapses whitespace.
pub fn strip_markup(body: &str) -> String {
    let without_tags = MARKUP.replace_all(body, " ");
    let stripped = WHITESPACE.replace_all(&without_tags, " ");
    stripped.trim().replace(['<', '>'], "")
}
