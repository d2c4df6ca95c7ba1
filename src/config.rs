// src/config.rs
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::{DiagnosticRule, DiagnosticRules};
use crate::errors::{Result, SegError};

pub const DEFAULT_API_BASE: &str = "https://harshithreddy01-srmamamba-liver-segmentation.hf.space/api";

/// Where the segmentation service lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub api_base: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { api_base: DEFAULT_API_BASE.to_string() }
    }
}

/// Bind address and limits for the local web surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest volume accepted from the browser, in MiB.
    pub max_upload_mb: usize,
    /// Open sessions kept before the least recently used one is evicted.
    pub max_sessions: usize,
    /// Sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_upload_mb: 512,
            max_sessions: 64,
            session_idle_secs: 3600,
        }
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

/// A user-supplied diagnostic rule for non-JSON responses.
#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticRuleConfig {
    pub name: String,
    pub pattern: String,
    pub message: String,
    #[serde(default)]
    pub statuses: Vec<u16>,
}

/// High-level application configuration.
///
/// Built from defaults, then the TOML file named by `LIVERSEG_CONFIG`, then
/// environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub download_dir: Option<PathBuf>,
    pub diagnostics: Vec<DiagnosticRuleConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("LIVERSEG_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `LIVERSEG_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("LIVERSEG_API_BASE") {
            self.service.api_base = api_base;
        }
        if let Some(host) = lookup("LIVERSEG_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("LIVERSEG_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| SegError::Config(format!("LIVERSEG_PORT is not a port number: {}", port)))?;
        }
        if let Some(limit) = lookup("LIVERSEG_MAX_UPLOAD_MB") {
            self.server.max_upload_mb = limit.trim().parse().map_err(|_| {
                SegError::Config(format!("LIVERSEG_MAX_UPLOAD_MB is not a number: {}", limit))
            })?;
        }
        if let Some(max) = lookup("LIVERSEG_MAX_SESSIONS") {
            self.server.max_sessions = max.trim().parse().map_err(|_| {
                SegError::Config(format!("LIVERSEG_MAX_SESSIONS is not a number: {}", max))
            })?;
        }
        if let Some(secs) = lookup("LIVERSEG_SESSION_IDLE_SECS") {
            self.server.session_idle_secs = secs.trim().parse().map_err(|_| {
                SegError::Config(format!("LIVERSEG_SESSION_IDLE_SECS is not a number: {}", secs))
            })?;
        }
        if let Some(dir) = lookup("LIVERSEG_DOWNLOAD_DIR") {
            self.download_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.service.api_base.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SegError::Config(format!(
                "service api_base must be an http(s) URL, got '{}'",
                base
            )));
        }
        if self.server.max_upload_mb == 0 {
            return Err(SegError::Config("server max_upload_mb must be positive".to_string()));
        }
        if self.server.max_sessions == 0 {
            return Err(SegError::Config("server max_sessions must be positive".to_string()));
        }
        if self.server.session_idle_secs == 0 {
            return Err(SegError::Config("server session_idle_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Configured rules first, then the built-in ones.
    pub fn diagnostic_rules(&self) -> Result<DiagnosticRules> {
        let custom = self
            .diagnostics
            .iter()
            .map(|rule| {
                DiagnosticRule::new(&rule.name, &rule.pattern, &rule.message)
                    .map(|r| r.with_statuses(rule.statuses.iter().copied()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DiagnosticRules::builtin().prepend(custom))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
