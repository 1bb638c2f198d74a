//! Shared fakes and log capture for handshake integration tests.

use std::io;
use std::sync::{Arc, Mutex};

use openid_login_auth::{AuthError, OpenidLoginHandler, OpenidProtocolClient, UserDirectory};
use openid_login_core::{
    FormData, HandlerSettings, HttpMethod, LoginAttempt, LoginResponse, ModelRecords,
    VerificationResult, VerificationStatus,
};
use tracing_subscriber::fmt::MakeWriter;

/// Arguments of one `begin_authentication` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginCall {
    pub identity_url: String,
    pub return_to: String,
    pub realm: String,
}

/// Scripted protocol client recording every call.
pub struct FakeProtocol {
    pub callback: bool,
    pub verification: VerificationResult,
    pub begin_error: Option<String>,
    pub begin_calls: Mutex<Vec<BeginCall>>,
    pub verify_calls: Mutex<Vec<String>>,
}

impl FakeProtocol {
    #[allow(dead_code)]
    pub fn idle() -> Self {
        Self::verifying(VerificationResult::new(VerificationStatus::Success, ""), false)
    }

    #[allow(dead_code)]
    pub fn callback(verification: VerificationResult) -> Self {
        Self::verifying(verification, true)
    }

    #[allow(dead_code)]
    fn verifying(verification: VerificationResult, callback: bool) -> Self {
        Self {
            callback,
            verification,
            begin_error: None,
            begin_calls: Mutex::new(Vec::new()),
            verify_calls: Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    pub fn begin_calls(&self) -> Vec<BeginCall> {
        self.begin_calls.lock().expect("begin calls lock").clone()
    }

    #[allow(dead_code)]
    pub fn verify_calls(&self) -> Vec<String> {
        self.verify_calls.lock().expect("verify calls lock").clone()
    }
}

impl OpenidProtocolClient for FakeProtocol {
    fn is_callback_response(&self, _attempt: &LoginAttempt) -> bool {
        self.callback
    }

    fn begin_authentication(
        &self,
        identity_url: &str,
        return_to: &str,
        realm: &str,
        response: &mut LoginResponse,
    ) -> Result<(), AuthError> {
        self.begin_calls
            .lock()
            .expect("begin calls lock")
            .push(BeginCall {
                identity_url: identity_url.to_string(),
                return_to: return_to.to_string(),
                realm: realm.to_string(),
            });
        if let Some(message) = &self.begin_error {
            return Err(AuthError::Protocol(message.clone()));
        }
        response.redirect(format!("https://provider.test/auth?return_to={return_to}"));
        Ok(())
    }

    fn verify_response(&self, _attempt: &LoginAttempt, return_to: &str) -> VerificationResult {
        self.verify_calls
            .lock()
            .expect("verify calls lock")
            .push(return_to.to_string());
        self.verification.clone()
    }
}

/// Directory returning a fixed lookup result.
pub struct FakeDirectory {
    pub result: Result<ModelRecords, String>,
    pub lookups: Mutex<Vec<String>>,
}

impl FakeDirectory {
    #[allow(dead_code)]
    pub fn returning(records: ModelRecords) -> Self {
        Self {
            result: Ok(records),
            lookups: Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().expect("lookups lock").clone()
    }
}

impl UserDirectory for FakeDirectory {
    fn find_by_identity(&self, identity_url: &str) -> Result<ModelRecords, AuthError> {
        self.lookups
            .lock()
            .expect("lookups lock")
            .push(identity_url.to_string());
        self.result.clone().map_err(AuthError::Directory)
    }
}

/// Builds a handler with default settings over the given fakes.
#[allow(dead_code)]
pub fn handler(protocol: &Arc<FakeProtocol>, directory: &Arc<FakeDirectory>) -> OpenidLoginHandler {
    OpenidLoginHandler::new(
        HandlerSettings::default(),
        protocol.clone(),
        directory.clone(),
    )
    .expect("default settings should be valid")
}

/// POST to the login endpoint carrying `User[openid]`.
#[allow(dead_code)]
pub fn login_post(identity_url: &str) -> LoginAttempt {
    LoginAttempt::new(HttpMethod::Post, "https", "rp.example.com")
        .with_form(FormData::new().with_field("User", "openid", identity_url))
}

/// Provider redirect back to the login endpoint.
#[allow(dead_code)]
pub fn provider_callback() -> LoginAttempt {
    LoginAttempt::new(HttpMethod::Get, "https", "rp.example.com").with_query("openid.mode", "id_res")
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Returns every captured line.
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().expect("log buffer lock");
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Returns captured ERROR lines.
    #[allow(dead_code)]
    pub fn error_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.contains("ERROR"))
            .collect()
    }
}

/// Writer handed out by [`LogBuffer`].
pub struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(self.0.clone())
    }
}

/// Runs `f` with a thread-local subscriber capturing all levels.
#[allow(dead_code)]
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, LogBuffer) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let output = tracing::subscriber::with_default(subscriber, f);
    (output, buffer)
}
