//! Immutable client configuration.
//!
//! # Design
//! A `Config` is built once, validated, and handed to `FlexibeeClient`. It is
//! never mutated afterwards: the `with_*` methods return modified copies. The
//! auth context and TLS relaxation are derived from it on every request so no
//! process-wide state exists.

use serde::Deserialize;

use crate::error::ConfigError;

/// Authentication context sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// Standard HTTP basic authentication.
    Basic { user: String, password: String },
    /// Token issued by an interactive login, sent as `X-authSessionId`.
    SessionToken(String),
}

/// Deserialized configs are validated the same way `Config::new` validates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ConfigFile")]
pub struct Config {
    url: String,
    company: String,
    user: String,
    password: String,
    evidence: String,
    self_signed_certificate: bool,
    auth_session_id: Option<String>,
}

/// On-disk shape of a `Config`, before validation.
#[derive(Deserialize)]
struct ConfigFile {
    url: String,
    company: String,
    user: String,
    password: String,
    evidence: String,
    #[serde(default)]
    self_signed_certificate: bool,
    #[serde(default)]
    auth_session_id: Option<String>,
}

impl TryFrom<ConfigFile> for Config {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let config = Config::new(&file.url, &file.company, &file.user, &file.password, &file.evidence)?
            .with_self_signed_certificate(file.self_signed_certificate);
        Ok(match file.auth_session_id {
            Some(session_id) => config.with_auth_session_id(&session_id),
            None => config,
        })
    }
}

impl Config {
    pub fn new(
        url: &str,
        company: &str,
        user: &str,
        password: &str,
        evidence: &str,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            url: url.trim_end_matches('/').to_string(),
            company: company.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            evidence: evidence.to_string(),
            self_signed_certificate: false,
            auth_session_id: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants `new` enforces. Useful after deserializing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if self.company.trim().is_empty() {
            return Err(ConfigError::EmptyCompany);
        }
        if self.evidence.trim().is_empty() {
            return Err(ConfigError::EmptyEvidence);
        }
        Ok(())
    }

    pub fn with_self_signed_certificate(mut self, enabled: bool) -> Self {
        self.self_signed_certificate = enabled;
        self
    }

    pub fn with_auth_session_id(mut self, session_id: &str) -> Self {
        self.auth_session_id = Some(session_id.to_string());
        self
    }

    /// Same connection settings, different evidence.
    pub fn with_evidence(mut self, evidence: &str) -> Result<Self, ConfigError> {
        self.evidence = evidence.to_string();
        self.validate()?;
        Ok(self)
    }

    pub fn url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn evidence(&self) -> &str {
        &self.evidence
    }

    pub fn self_signed_certificate(&self) -> bool {
        self.self_signed_certificate
    }

    pub fn auth_session_id(&self) -> Option<&str> {
        self.auth_session_id.as_deref()
    }

    pub fn auth(&self) -> Auth {
        match &self.auth_session_id {
            Some(token) => Auth::SessionToken(token.clone()),
            None => Auth::Basic {
                user: self.user.clone(),
                password: self.password.clone(),
            },
        }
    }

    /// Certificate checks are skipped for self-signed servers and in
    /// session-token mode.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.self_signed_certificate || self.auth_session_id.is_some()
    }
}
