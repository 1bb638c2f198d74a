#![warn(missing_docs)]
//! # openid-login-pipeline
//!
//! ## Purpose
//! Plugs the OpenID handler into a host application's authentication chain.
//!
//! ## Responsibilities
//! - Define the [`AuthStrategy`] seam shared by every login method.
//! - Try strategies in order until one authenticates or takes over the
//!   response with a redirect.
//! - Load handler settings from JSON files and wire the default directory.
//! - Install the process-wide tracing subscriber.
//!
//! ## Data flow
//! Host request -> [`AuthPipeline::identify`] -> each [`AuthStrategy`] in
//! order -> [`PipelineOutcome`]; the host establishes a session from
//! [`PipelineOutcome::Authenticated`] or sends the redirect.
//!
//! ## Error model
//! Setup failures (settings file, subscriber install) are [`PipelineError`].
//! Per-request rejections are collected as [`StrategyFailure`] values.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use openid_login_auth::{
    AttributeUserDirectory, AuthError, OpenidLoginHandler, OpenidProtocolClient, UserSource,
};
use openid_login_core::{
    AuthOutcome, CoreError, FailureReason, HandlerSettings, LoginAttempt, LoginResponse,
    UserRecord,
};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Strategy name reported for [`OpenidLoginHandler`].
pub const OPENID_STRATEGY: &str = "openid";

/// One login method in the host authentication chain.
pub trait AuthStrategy: Send + Sync {
    /// Stable strategy name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Attempts to authenticate `attempt`, optionally writing to `response`.
    fn authenticate(&self, attempt: &LoginAttempt, response: &mut LoginResponse) -> AuthOutcome;
}

impl AuthStrategy for OpenidLoginHandler {
    fn name(&self) -> &str {
        OPENID_STRATEGY
    }

    fn authenticate(&self, attempt: &LoginAttempt, response: &mut LoginResponse) -> AuthOutcome {
        OpenidLoginHandler::authenticate(self, attempt, response)
    }
}

/// A rejection reported by one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    /// Strategy that rejected the request.
    pub strategy: String,
    /// Rejection reason.
    pub reason: FailureReason,
}

/// Result of running the whole chain for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// A strategy resolved the request to a user.
    Authenticated {
        /// Strategy that authenticated the request.
        strategy: String,
        /// Resolved user record.
        record: UserRecord,
    },
    /// A strategy wrote a redirect; the host must send the response as is.
    Redirected {
        /// Strategy that issued the redirect.
        strategy: String,
        /// Redirect target.
        location: String,
    },
    /// No strategy authenticated the request.
    Unauthenticated {
        /// Rejections in strategy order; empty when nothing was attempted.
        failures: Vec<StrategyFailure>,
    },
}

/// Ordered authentication chain.
#[derive(Clone, Default)]
pub struct AuthPipeline {
    strategies: Vec<Arc<dyn AuthStrategy>>,
}

impl AuthPipeline {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a strategy (builder style).
    pub fn with_strategy(mut self, strategy: Arc<dyn AuthStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Returns strategy names in evaluation order.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Returns `true` when no strategy is configured.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Tries each strategy in order.
    ///
    /// # Semantics
    /// - `Authenticated` stops the chain.
    /// - A strategy that sets or changes the redirect in `response` stops
    ///   the chain. A `Location` present before the strategy ran is ignored.
    /// - `Failed` is recorded and the next strategy runs.
    /// - `NotAttempted` is skipped silently.
    pub fn identify(&self, attempt: &LoginAttempt, response: &mut LoginResponse) -> PipelineOutcome {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            let location_before = response.redirect_location().map(str::to_string);
            let outcome = strategy.authenticate(attempt, response);
            match outcome {
                AuthOutcome::Authenticated(record) => {
                    info!(strategy = strategy.name(), "request authenticated");
                    return PipelineOutcome::Authenticated {
                        strategy: strategy.name().to_string(),
                        record,
                    };
                }
                AuthOutcome::Failed(reason) => {
                    debug!(strategy = strategy.name(), %reason, "strategy rejected request");
                    failures.push(StrategyFailure {
                        strategy: strategy.name().to_string(),
                        reason,
                    });
                }
                AuthOutcome::NotAttempted => {}
            }

            if let Some(location) = response.redirect_location()
                && location_before.as_deref() != Some(location)
            {
                debug!(strategy = strategy.name(), location, "strategy issued redirect");
                return PipelineOutcome::Redirected {
                    strategy: strategy.name().to_string(),
                    location: location.to_string(),
                };
            }
        }

        PipelineOutcome::Unauthenticated { failures }
    }
}

/// Reads and validates handler settings from a JSON file.
///
/// # Errors
/// Returns [`PipelineError::Io`] when the file cannot be read and
/// [`PipelineError::Settings`] when parsing or validation fails.
pub fn load_settings(path: impl AsRef<Path>) -> Result<HandlerSettings, PipelineError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(HandlerSettings::from_json_str(&raw)?)
}

/// Builds an OpenID handler backed by the default attribute directory over
/// `source`, keyed and scoped by `settings`.
///
/// # Errors
/// Returns [`PipelineError::Auth`] when settings fail validation.
pub fn openid_handler(
    settings: HandlerSettings,
    protocol: Arc<dyn OpenidProtocolClient>,
    source: Arc<dyn UserSource>,
) -> Result<OpenidLoginHandler, PipelineError> {
    let directory = Arc::new(AttributeUserDirectory::from_settings(&settings, source));
    Ok(OpenidLoginHandler::new(settings, protocol, directory)?)
}

/// Installs a global fmt subscriber. `RUST_LOG` overrides `default_directive`.
///
/// # Errors
/// Returns [`PipelineError::Tracing`] for an invalid directive or when a
/// global subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|error| PipelineError::Tracing(error.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| PipelineError::Tracing(error.to_string()))
}

/// Pipeline setup error type.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Settings file could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Io {
        /// Settings file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Settings failed to parse or validate.
    #[error("settings error: {0}")]
    Settings(#[from] CoreError),
    /// Handler construction failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// Subscriber installation failed.
    #[error("tracing init error: {0}")]
    Tracing(String),
}
