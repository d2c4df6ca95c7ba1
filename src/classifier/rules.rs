// src/classifier/rules.rs
use regex::Regex;

use crate::errors::{Result, SegError};

pub const SERVER_ERROR_MESSAGE: &str = "Internal server error. The model may be loading or there was an error processing your file. Please try again in a moment.";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed. Please check the API endpoint.";

/// Maps a recognizable failure signature in a non-JSON response to a user message.
#[derive(Debug, Clone)]
pub struct DiagnosticRule {
    name: String,
    pattern: Regex,
    statuses: Vec<u16>,
    message: String,
}

impl DiagnosticRule {
    pub fn new(name: impl Into<String>, pattern: &str, message: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(pattern)
            .map_err(|e| SegError::Config(format!("invalid pattern for rule '{}': {}", name, e)))?;
        Ok(Self {
            name,
            pattern,
            statuses: Vec::new(),
            message: message.into(),
        })
    }

    /// Also matches responses carrying any of these HTTP statuses, whatever the body says.
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn matches(&self, status: u16, body: &str) -> bool {
        self.statuses.contains(&status) || self.pattern.is_match(body)
    }
}

/// Ordered rule list; the first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticRules {
    rules: Vec<DiagnosticRule>,
}

impl DiagnosticRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The signatures the hosted service is known to produce: framework error
    /// pages while the model is loading, and method mismatches.
    pub fn builtin() -> Self {
        let server_error = DiagnosticRule::new(
            "server_error",
            r"Internal Server Error|\b500\b",
            SERVER_ERROR_MESSAGE,
        )
        .map(|rule| rule.with_statuses([500, 502, 503, 504]));
        let method_not_allowed = DiagnosticRule::new(
            "method_not_allowed",
            r"Method Not Allowed|\b405\b",
            METHOD_NOT_ALLOWED_MESSAGE,
        )
        .map(|rule| rule.with_statuses([405]));

        Self {
            rules: [server_error, method_not_allowed]
                .into_iter()
                .filter_map(|rule| rule.ok())
                .collect(),
        }
    }

    pub fn push(&mut self, rule: DiagnosticRule) {
        self.rules.push(rule);
    }

    /// Returns these rules with `custom` consulted first.
    pub fn prepend(self, custom: Vec<DiagnosticRule>) -> Self {
        let mut rules = custom;
        rules.extend(self.rules);
        Self { rules }
    }

    pub fn find(&self, status: u16, body: &str) -> Option<&DiagnosticRule> {
        self.rules.iter().find(|rule| rule.matches(status, body))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagnosticRule> {
        self.rules.iter()
    }
}
