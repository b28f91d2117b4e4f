//! Public waitlist endpoints (no session required).
//!
//! `GET /api/waitlist/stats` and `POST /api/waitlist`.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend message for a duplicate signup.
const ALREADY_JOINED: &str = "Email already on waitlist";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

#[derive(Debug, Error)]
pub enum WaitlistError {
    #[error("This email is already on the waitlist")]
    AlreadyJoined,
    #[error("Waitlist signup rejected: {0}")]
    Rejected(String),
    #[error("Invalid signup: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response body: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WaitlistStats {
    pub total: u64,
}

/// Signup payload in the backend's camelCase schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistSignup {
    pub email: String,
    pub name: String,
    /// Comma-separated feature list
    pub interested_features: String,
    pub primary_usage: String,
    pub scheduling_frustration: String,
    pub current_calendar_tool: String,
    pub role_profession: String,
    pub company: String,
    pub referral_source: String,
    pub utm_source: String,
    pub timezone: String,
    pub timestamp: String,
}

impl WaitlistSignup {
    /// Creates a signup stamped at `now` with the remaining fields empty.
    pub fn new(email: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            interested_features: String::new(),
            primary_usage: String::new(),
            scheduling_frustration: String::new(),
            current_calendar_tool: String::new(),
            role_profession: String::new(),
            company: String::new(),
            referral_source: String::new(),
            utm_source: "direct".to_string(),
            timezone: "UTC".to_string(),
            timestamp: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }

    /// Sets the feature list from individual entries.
    #[must_use]
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.interested_features = features
            .into_iter()
            .map(|f| f.as_ref().trim().to_string())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        self
    }

    /// Returns one message per missing or malformed field.
    pub fn validate(&self) -> Result<(), WaitlistError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("Name is required".to_string());
        }
        if self.email.trim().is_empty() {
            problems.push("Email is required".to_string());
        } else if !EMAIL_RE.is_match(self.email.trim()) {
            problems.push("Please enter a valid email".to_string());
        }
        if self.interested_features.trim().is_empty() {
            problems.push("Please select at least one feature".to_string());
        }
        if self.primary_usage.trim().is_empty() {
            problems.push("Please select your primary usage".to_string());
        }
        if self.current_calendar_tool.trim().is_empty() {
            problems.push("Please select your current calendar system".to_string());
        }
        if self.role_profession.trim().is_empty() {
            problems.push("Please select your role/profession".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(WaitlistError::Invalid(problems))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignupResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the waitlist endpoints.
#[derive(Debug, Clone)]
pub struct WaitlistClient {
    base_url: String,
    http: reqwest::Client,
}

impl WaitlistClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Fetches the current signup count.
    pub async fn stats(&self) -> Result<WaitlistStats, WaitlistError> {
        let response = self
            .http
            .get(format!("{}/api/waitlist/stats", self.base_url))
            .send()
            .await
            .map_err(|e| WaitlistError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WaitlistError::Network(format!(
                "waitlist stats returned HTTP {}",
                response.status().as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| WaitlistError::Decode(e.to_string()))
    }

    /// Validates and submits a signup.
    pub async fn join(&self, signup: &WaitlistSignup) -> Result<(), WaitlistError> {
        signup.validate()?;

        let response = self
            .http
            .post(format!("{}/api/waitlist", self.base_url))
            .json(signup)
            .send()
            .await
            .map_err(|e| WaitlistError::Network(e.to_string()))?;
        let status = response.status();

        let body: SignupResponse = response.json().await.map_err(|e| {
            WaitlistError::Decode(format!("HTTP {}: {e}", status.as_u16()))
        })?;

        if status.is_success() && body.success {
            tracing::info!("joined waitlist");
            return Ok(());
        }

        Err(match (body.error, body.message) {
            (Some(error), _) if error == ALREADY_JOINED => WaitlistError::AlreadyJoined,
            (Some(error), _) => WaitlistError::Rejected(error),
            (None, Some(message)) => WaitlistError::Rejected(message),
            (None, None) => WaitlistError::Rejected(format!("HTTP {}", status.as_u16())),
        })
    }
}
