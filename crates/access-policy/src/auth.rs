//! Credentials, principals and the authenticator.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use tree_common::DataError;

/// Authentication failures. All of them surface as `Unauthorized`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("credentials required")]
    MissingCredential,

    #[error("invalid credentials")]
    InvalidCredential,

    #[error("credentials for '{0}' have expired")]
    Expired(String),

    #[error("malformed authorization header")]
    MalformedHeader,
}

impl From<AuthError> for DataError {
    fn from(err: AuthError) -> Self {
        DataError::Unauthorized(err.to_string())
    }
}

/// A credential presented with a request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    ApiKey(String),
}

impl Credential {
    /// Parse an `Authorization` header value: `Bearer <token>` or
    /// `Apikey <key>`, scheme case-insensitive.
    pub fn from_authorization(header: &str) -> Result<Self, AuthError> {
        let (scheme, secret) = header
            .trim()
            .split_once(char::is_whitespace)
            .ok_or(AuthError::MalformedHeader)?;
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(AuthError::MalformedHeader);
        }
        match scheme.to_ascii_lowercase().as_str() {
            "bearer" => Ok(Credential::Bearer(secret.to_string())),
            "apikey" => Ok(Credential::ApiKey(secret.to_string())),
            _ => Err(AuthError::MalformedHeader),
        }
    }

    /// Pick the credential for a request. The header wins over an
    /// `api_key` query parameter.
    pub fn from_request(
        authorization: Option<&str>,
        api_key_param: Option<&str>,
    ) -> Result<Option<Self>, AuthError> {
        if let Some(header) = authorization {
            return Self::from_authorization(header).map(Some);
        }
        Ok(api_key_param
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| Credential::ApiKey(k.to_string())))
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Bearer(***)"),
            Credential::ApiKey(_) => f.write_str("ApiKey(***)"),
        }
    }
}

/// An authenticated identity. Built once per request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub scopes: BTreeSet<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn new<I, S>(id: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
            expires_at: None,
        }
    }

    pub fn anonymous<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ANONYMOUS, scopes)
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

pub const ANONYMOUS: &str = "anonymous";

/// One configured API key or bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    pub secret: String,
    pub principal: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// `auth` section of the service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub allow_anonymous: bool,
    pub anonymous_scopes: Vec<String>,
    pub api_keys: Vec<CredentialConfig>,
    pub tokens: Vec<CredentialConfig>,
}

/// Validates credentials against the configured keys and tokens.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    allow_anonymous: bool,
    anonymous_scopes: Vec<String>,
    api_keys: HashMap<String, Principal>,
    tokens: HashMap<String, Principal>,
}

fn grants(entries: &[CredentialConfig]) -> HashMap<String, Principal> {
    entries
        .iter()
        .map(|e| {
            let mut principal = Principal::new(e.principal.clone(), e.scopes.iter().cloned());
            principal.expires_at = e.expires_at;
            (e.secret.clone(), principal)
        })
        .collect()
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            allow_anonymous: config.allow_anonymous,
            anonymous_scopes: config.anonymous_scopes.clone(),
            api_keys: grants(&config.api_keys),
            tokens: grants(&config.tokens),
        }
    }

    pub fn allows_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    pub fn authenticate(&self, credential: Option<&Credential>) -> Result<Principal, AuthError> {
        self.authenticate_at(credential, Utc::now())
    }

    /// Authenticate as of `now`.
    pub fn authenticate_at(
        &self,
        credential: Option<&Credential>,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let principal = match credential {
            None if self.allow_anonymous => {
                return Ok(Principal::anonymous(self.anonymous_scopes.iter().cloned()))
            }
            None => return Err(AuthError::MissingCredential),
            Some(Credential::ApiKey(key)) => self.api_keys.get(key),
            Some(Credential::Bearer(token)) => self.tokens.get(token),
        };

        let principal = principal.ok_or(AuthError::InvalidCredential)?;
        if principal.is_expired(now) {
            debug!(principal = %principal.id, "Rejected expired credential");
            return Err(AuthError::Expired(principal.id.clone()));
        }
        Ok(principal.clone())
    }
}
