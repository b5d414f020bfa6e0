//! Authentication and authorization for the tree services.
//!
//! Every request passes through two gates before any adapter call or cache
//! lookup:
//!
//! 1. [`Authenticator::authenticate`] turns the presented [`Credential`]
//!    into a [`Principal`], or fails with `Unauthorized`.
//! 2. [`AccessPolicy::authorize`] decides whether that principal may perform
//!    an [`Action`] on a path, possibly with [`RedactionRule`]s attached.

pub mod auth;
pub mod pattern;
pub mod policy;
pub mod redaction;

pub use auth::{AuthConfig, AuthError, Authenticator, Credential, CredentialConfig, Principal, ANONYMOUS};
pub use pattern::{PathPattern, PatternError};
pub use policy::{AccessPolicy, Action, Decision, Effect, PolicyRule};
pub use redaction::{narrow_columns, redact_metadata, redacted_columns, RedactionRule};
