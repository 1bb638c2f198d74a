#![warn(missing_docs)]
//! # openid-login-auth
//!
//! ## Purpose
//! Implements the OpenID login handshake as a pluggable authentication
//! handler.
//!
//! ## Responsibilities
//! - Infer the handshake phase of each request from its shape.
//! - Delegate redirect construction and assertion verification to an
//!   injectable [`OpenidProtocolClient`].
//! - Resolve verified identities to local users through a [`UserDirectory`].
//! - Provide a default attribute-equality directory over any [`UserSource`].
//!
//! ## Data flow
//! Host request -> [`HandshakePhase::classify`] -> either
//! [`OpenidProtocolClient::begin_authentication`] (phase 1, redirect) or
//! [`OpenidProtocolClient::verify_response`] + [`UserDirectory::find_by_identity`]
//! (phase 2) -> [`AuthOutcome`].
//!
//! ## Ownership and lifetimes
//! The handler owns its settings and shares collaborators through `Arc`, so one
//! handler can serve concurrent requests when collaborators are `Send + Sync`.
//!
//! ## Error model
//! [`OpenidLoginHandler::authenticate`] never returns an error: every rejection
//! is an [`AuthOutcome::Failed`] so the host can try its next strategy.
//! Construction and collaborator failures use [`AuthError`].
//!
//! ## Security and privacy notes
//! Only identity URLs and provider messages are logged. Form bodies and user
//! record attributes are never written to logs.
//!
//! ## Example
//! ```rust
//! use openid_login_auth::HandshakePhase;
//! use openid_login_core::{HandlerSettings, HttpMethod, LoginAttempt};
//!
//! let attempt = LoginAttempt::new(HttpMethod::Get, "https", "example.com");
//! let phase = HandshakePhase::classify(&attempt, &HandlerSettings::default(), false);
//! assert_eq!(phase, HandshakePhase::Unrelated);
//! ```

use std::sync::Arc;

use openid_login_core::{
    AuthOutcome, CallbackUrls, CoreError, FailureReason, HandlerSettings, LoginAttempt,
    LoginResponse, ModelRecords, UserRecord, VerificationResult, VerificationStatus,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error};

/// Record attribute matched against verified identity URLs by default.
pub const DEFAULT_IDENTITY_ATTRIBUTE: &str = "openid";

/// External OpenID protocol implementation (discovery, association,
/// signature and nonce checks).
pub trait OpenidProtocolClient: Send + Sync {
    /// Returns `true` when `attempt` is a provider callback.
    fn is_callback_response(&self, attempt: &LoginAttempt) -> bool {
        attempt.is_openid_callback()
    }

    /// Starts the handshake for `identity_url`, writing the provider redirect
    /// into `response`.
    fn begin_authentication(
        &self,
        identity_url: &str,
        return_to: &str,
        realm: &str,
        response: &mut LoginResponse,
    ) -> Result<(), AuthError>;

    /// Verifies the provider assertion carried by `attempt`.
    fn verify_response(&self, attempt: &LoginAttempt, return_to: &str) -> VerificationResult;
}

/// Resolves verified identity URLs to local user records.
pub trait UserDirectory: Send + Sync {
    /// Looks up users by identity URL.
    ///
    /// Returns records keyed by model name; an empty map means no match.
    fn find_by_identity(&self, identity_url: &str) -> Result<ModelRecords, AuthError>;
}

/// Record storage queried by [`AttributeUserDirectory`].
pub trait UserSource: Send + Sync {
    /// Returns the first record whose attributes equal every condition.
    fn find_first(&self, conditions: &Map<String, Value>) -> Result<Option<UserRecord>, AuthError>;
}

/// Handshake phase inferred from one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Form submission asking to start federated login.
    Begin {
        /// User-supplied OpenID URL.
        identity_url: String,
    },
    /// Provider redirected back with an assertion.
    Callback,
    /// Not an OpenID login request.
    Unrelated,
}

impl HandshakePhase {
    /// Classifies `attempt`. A form submission wins only when the request is
    /// not also a callback.
    pub fn classify(attempt: &LoginAttempt, settings: &HandlerSettings, is_callback: bool) -> Self {
        if attempt.method.is_post()
            && !is_callback
            && let Some(identity_url) =
                attempt.form_value(&settings.user_model, &settings.identity_field)
        {
            return Self::Begin {
                identity_url: identity_url.to_string(),
            };
        }

        if is_callback {
            Self::Callback
        } else {
            Self::Unrelated
        }
    }
}

/// OpenID authentication handler plugged into the host pipeline.
#[derive(Clone)]
pub struct OpenidLoginHandler {
    settings: HandlerSettings,
    protocol: Arc<dyn OpenidProtocolClient>,
    directory: Arc<dyn UserDirectory>,
}

impl OpenidLoginHandler {
    /// Creates a handler with validated settings.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidSettings`] when a required setting is blank.
    pub fn new(
        settings: HandlerSettings,
        protocol: Arc<dyn OpenidProtocolClient>,
        directory: Arc<dyn UserDirectory>,
    ) -> Result<Self, AuthError> {
        settings.validate()?;
        Ok(Self {
            settings,
            protocol,
            directory,
        })
    }

    /// Runs one handshake step for `attempt`.
    ///
    /// Phase 1 writes the provider redirect into `response` and returns
    /// [`AuthOutcome::NotAttempted`]; the decision happens on the callback.
    pub fn authenticate(&self, attempt: &LoginAttempt, response: &mut LoginResponse) -> AuthOutcome {
        let is_callback = self.protocol.is_callback_response(attempt);
        let phase = HandshakePhase::classify(attempt, &self.settings, is_callback);
        if phase == HandshakePhase::Unrelated {
            return AuthOutcome::NotAttempted;
        }

        let urls = match CallbackUrls::for_attempt(attempt, &self.settings.login_path) {
            Ok(urls) => urls,
            Err(error) => {
                debug!(host = %attempt.host, %error, "cannot derive OpenID callback urls");
                return AuthOutcome::NotAttempted;
            }
        };

        match phase {
            HandshakePhase::Begin { identity_url } => self.begin(&identity_url, &urls, response),
            HandshakePhase::Callback => self.complete(attempt, &urls),
            HandshakePhase::Unrelated => AuthOutcome::NotAttempted,
        }
    }

    fn begin(&self, identity_url: &str, urls: &CallbackUrls, response: &mut LoginResponse) -> AuthOutcome {
        match self
            .protocol
            .begin_authentication(identity_url, &urls.return_to, &urls.realm, response)
        {
            Ok(()) => {
                debug!(identity_url, return_to = %urls.return_to, "redirecting to OpenID provider");
                AuthOutcome::NotAttempted
            }
            Err(error) => {
                error!(identity_url, %error, "OpenID authentication could not start");
                AuthOutcome::Failed(FailureReason::DiscoveryFailed)
            }
        }
    }

    fn complete(&self, attempt: &LoginAttempt, urls: &CallbackUrls) -> AuthOutcome {
        let result = self.protocol.verify_response(attempt, &urls.return_to);

        match &result.status {
            VerificationStatus::Success => self.find_user(&result.identity_url),
            VerificationStatus::Failure => {
                error!(
                    identity_url = %result.identity_url,
                    provider_message = %result.message,
                    "OpenID verification failed"
                );
                AuthOutcome::Failed(FailureReason::VerificationFailed)
            }
            VerificationStatus::Cancel => {
                error!(identity_url = %result.identity_url, "OpenID verification cancelled");
                AuthOutcome::Failed(FailureReason::Cancelled)
            }
            VerificationStatus::Other(status) => {
                debug!(%status, identity_url = %result.identity_url, "unrecognized OpenID status");
                AuthOutcome::Failed(FailureReason::UnrecognizedStatus)
            }
        }
    }

    fn find_user(&self, identity_url: &str) -> AuthOutcome {
        let mut records = match self.directory.find_by_identity(identity_url) {
            Ok(records) => records,
            Err(error) => {
                error!(identity_url, %error, "user directory lookup failed");
                return AuthOutcome::Failed(FailureReason::DirectoryUnavailable);
            }
        };

        match records.remove(&self.settings.user_model) {
            Some(record) if !record.is_empty() => AuthOutcome::Authenticated(record),
            _ => AuthOutcome::Failed(FailureReason::UserNotFound),
        }
    }
}

/// Default [`UserDirectory`]: equality lookup of the identity URL on one
/// record attribute, narrowed by optional scope conditions.
#[derive(Clone)]
pub struct AttributeUserDirectory {
    model: String,
    attribute: String,
    scope: Map<String, Value>,
    source: Arc<dyn UserSource>,
}

impl AttributeUserDirectory {
    /// Creates a directory returning matches under `model`, matching on the
    /// `openid` attribute.
    pub fn new(model: impl Into<String>, source: Arc<dyn UserSource>) -> Self {
        Self {
            model: model.into(),
            attribute: DEFAULT_IDENTITY_ATTRIBUTE.to_string(),
            scope: Map::new(),
            source,
        }
    }

    /// Creates a directory keyed and scoped by handler settings.
    pub fn from_settings(settings: &HandlerSettings, source: Arc<dyn UserSource>) -> Self {
        Self::new(settings.user_model.clone(), source).with_scope(settings.scope.clone())
    }

    /// Matches identity URLs against `attribute` instead of `openid`.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    /// Adds equality conditions every match must also satisfy.
    pub fn with_scope(mut self, scope: Map<String, Value>) -> Self {
        self.scope = scope;
        self
    }
}

impl UserDirectory for AttributeUserDirectory {
    fn find_by_identity(&self, identity_url: &str) -> Result<ModelRecords, AuthError> {
        let mut conditions = self.scope.clone();
        conditions.insert(
            self.attribute.clone(),
            Value::String(identity_url.to_string()),
        );

        let mut records = ModelRecords::new();
        if let Some(record) = self.source.find_first(&conditions)? {
            records.insert(self.model.clone(), record);
        }
        Ok(records)
    }
}

/// Vector-backed [`UserSource`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserSource {
    records: Vec<UserRecord>,
}

impl InMemoryUserSource {
    /// Creates a source over `records`.
    pub fn new(records: Vec<UserRecord>) -> Self {
        Self { records }
    }
}

impl UserSource for InMemoryUserSource {
    fn find_first(&self, conditions: &Map<String, Value>) -> Result<Option<UserRecord>, AuthError> {
        Ok(self
            .records
            .iter()
            .find(|record| {
                conditions
                    .iter()
                    .all(|(key, expected)| record.get(key) == Some(expected))
            })
            .cloned())
    }
}

/// Errors produced by handler construction and collaborators.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Settings failed presence validation.
    #[error("invalid handler settings: {0}")]
    InvalidSettings(#[from] CoreError),
    /// Protocol client failure (discovery, association, transport).
    #[error("openid protocol failure: {0}")]
    Protocol(String),
    /// User directory failure.
    #[error("user directory failure: {0}")]
    Directory(String),
}
