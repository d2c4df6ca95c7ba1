// src/errors.rs
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegError {
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Service request failed with status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Segmentation artifact is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("{0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SegError>;

/// Category of a failed segmentation, carried alongside the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected locally before any network use.
    Validation,
    /// The exchange with the service never produced a response.
    Transport,
    /// The service answered with something that is not the documented JSON shape.
    Protocol,
    /// Well-formed answer that reports failure, or an HTTP failure status.
    Application,
    /// The returned artifact could not be decoded.
    Decode,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Transport => "transport",
            FailureKind::Protocol => "protocol",
            FailureKind::Application => "application",
            FailureKind::Decode => "decode",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum length, in characters, of any message shown to the user.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Truncates `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

pub fn bound_message(text: &str) -> String {
    truncate_chars(text.trim(), MAX_MESSAGE_CHARS)
}
