//! Shared strategies and protocol fakes for pipeline integration tests.

use std::sync::Mutex;

use openid_login_auth::{AuthError, OpenidProtocolClient};
use openid_login_core::{
    AuthOutcome, LoginAttempt, LoginResponse, VerificationResult, VerificationStatus,
};
use openid_login_pipeline::AuthStrategy;

/// Strategy returning a fixed outcome and counting invocations.
pub struct StaticStrategy {
    pub name: &'static str,
    pub outcome: AuthOutcome,
    pub calls: Mutex<usize>,
}

impl StaticStrategy {
    pub fn new(name: &'static str, outcome: AuthOutcome) -> Self {
        Self {
            name,
            outcome,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

impl AuthStrategy for StaticStrategy {
    fn name(&self) -> &str {
        self.name
    }

    fn authenticate(&self, _attempt: &LoginAttempt, _response: &mut LoginResponse) -> AuthOutcome {
        *self.calls.lock().expect("calls lock") += 1;
        self.outcome.clone()
    }
}

/// Protocol client redirecting to a fixed provider and trusting the
/// `openid.claimed_id` query parameter on callback.
pub struct TrustingProtocol;

impl OpenidProtocolClient for TrustingProtocol {
    fn begin_authentication(
        &self,
        identity_url: &str,
        return_to: &str,
        _realm: &str,
        response: &mut LoginResponse,
    ) -> Result<(), AuthError> {
        response.redirect(format!(
            "https://provider.test/checkid?identity={identity_url}&return_to={return_to}"
        ));
        Ok(())
    }

    fn verify_response(&self, attempt: &LoginAttempt, _return_to: &str) -> VerificationResult {
        match attempt.query.get("openid.claimed_id") {
            Some(identity) => VerificationResult::new(VerificationStatus::Success, identity.clone()),
            None => VerificationResult::new(VerificationStatus::Failure, "")
                .with_message("missing claimed id"),
        }
    }
}
