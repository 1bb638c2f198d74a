#![warn(missing_docs)]
//! # openid-login-core
//!
//! ## Purpose
//! Defines the pure data model shared by the `openid-login` workspace.
//!
//! ## Responsibilities
//! - Represent one inbound login request ([`LoginAttempt`]) and the response
//!   the protocol client writes its redirect into ([`LoginResponse`]).
//! - Derive the relying-party realm and return-to URL from request origin.
//! - Model verification results, user records, and handshake outcomes.
//! - Load and validate handler settings.
//!
//! ## Data flow
//! Host builds a [`LoginAttempt`] per request -> handler derives
//! [`CallbackUrls`] -> protocol client yields a [`VerificationResult`] ->
//! handler maps it to an [`AuthOutcome`].
//!
//! ## Ownership and lifetimes
//! Every value here is owned and request-scoped; nothing outlives the request
//! except [`HandlerSettings`], which is immutable after construction.
//!
//! ## Error model
//! Settings and origin validation failures return [`CoreError`]. Handshake
//! failures are not errors: they are [`AuthOutcome::Failed`] values.
//!
//! ## Security and privacy notes
//! Form values and identity URLs are treated as opaque strings and are never
//! normalized beyond whitespace checks.
//!
//! ## Example
//! ```rust
//! use openid_login_core::CallbackUrls;
//!
//! let urls = CallbackUrls::new("https", "example.com", "/users/login").unwrap();
//! assert_eq!(urls.realm, "https://example.com");
//! assert_eq!(urls.return_to, "https://example.com/users/login");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// Default name of the form field carrying the user-supplied OpenID URL.
pub const DEFAULT_IDENTITY_FIELD: &str = "openid";

/// Default user model (form field group and directory key).
pub const DEFAULT_USER_MODEL: &str = "User";

/// Default login endpoint path appended to the realm to form `return_to`.
pub const DEFAULT_LOGIN_PATH: &str = "/users/login";

/// Query parameter whose presence marks a provider callback.
pub const OPENID_MODE_PARAM: &str = "openid.mode";

/// HTTP method of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// Any other method token, upper-cased.
    Other(String),
}

impl HttpMethod {
    /// Parses a method token case-insensitively.
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Other(upper),
        }
    }

    /// Returns `true` for form submissions.
    pub fn is_post(&self) -> bool {
        matches!(self, Self::Post)
    }
}

/// Submitted form fields grouped by model name.
///
/// Keys shaped like `User[openid]` or `data[User][openid]` are stored under
/// group `User`, field `openid`. Keys without brackets use the empty group.
/// Deeper suffixes (`User[openid][]`) are ignored; the last value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormData {
    groups: BTreeMap<String, BTreeMap<String, String>>,
}

impl FormData {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` body.
    pub fn from_urlencoded(body: &str) -> Self {
        let mut form = Self::new();
        for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
            let (group, field) = split_form_key(&key);
            form.insert(group, field, value.into_owned());
        }
        form
    }

    /// Inserts or replaces one field value.
    pub fn insert(
        &mut self,
        group: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.groups
            .entry(group.into())
            .or_default()
            .insert(field.into(), value.into());
    }

    /// Builder-style variant of [`FormData::insert`].
    pub fn with_field(
        mut self,
        group: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(group, field, value);
        self
    }

    /// Returns a field value when it is present and not blank.
    pub fn non_empty_value(&self, group: &str, field: &str) -> Option<&str> {
        self.groups
            .get(group)
            .and_then(|fields| fields.get(field))
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

fn split_form_key(key: &str) -> (String, String) {
    let Some(open) = key.find('[') else {
        return (String::new(), key.to_string());
    };

    let mut segments = vec![&key[..open]];
    segments.extend(
        key[open..]
            .split('[')
            .skip(1)
            .map(|segment| segment.trim_end_matches(']')),
    );

    if segments.first() == Some(&"data") && segments.len() > 2 {
        segments.remove(0);
    }

    // Array or nested suffixes (`User[openid][]`) stay on the first field.
    match segments.as_slice() {
        [field] => (String::new(), (*field).to_string()),
        [group, field, ..] => ((*group).to_string(), (*field).to_string()),
        [] => (String::new(), String::new()),
    }
}

/// One inbound request as seen by the login handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    /// Request method.
    pub method: HttpMethod,
    /// Request scheme (`http` or `https`).
    pub scheme: String,
    /// Host header value, including port when present.
    pub host: String,
    /// Submitted form fields, absent for requests without a form body.
    pub form: Option<FormData>,
    /// Decoded query parameters.
    pub query: BTreeMap<String, String>,
}

impl LoginAttempt {
    /// Creates an attempt without form or query data.
    pub fn new(method: HttpMethod, scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            method,
            scheme: scheme.into(),
            host: host.into(),
            form: None,
            query: BTreeMap::new(),
        }
    }

    /// Attaches submitted form fields.
    pub fn with_form(mut self, form: FormData) -> Self {
        self.form = Some(form);
        self
    }

    /// Adds one query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Adds every parameter of a raw (undecoded) query string.
    pub fn with_query_string(mut self, raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        self.query.extend(
            url::form_urlencoded::parse(raw.as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned())),
        );
        self
    }

    /// Returns a non-blank form value under `group`/`field`.
    pub fn form_value(&self, group: &str, field: &str) -> Option<&str> {
        self.form
            .as_ref()
            .and_then(|form| form.non_empty_value(group, field))
    }

    /// Returns `true` when the query carries a provider callback marker.
    pub fn is_openid_callback(&self) -> bool {
        self.query
            .get(OPENID_MODE_PARAM)
            .is_some_and(|mode| !mode.trim().is_empty())
    }
}

/// Response handle the protocol client writes its redirect into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Response body (e.g. an auto-submitting form for large requests).
    pub body: String,
}

impl LoginResponse {
    /// Creates an untouched `200` response.
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Turns the response into a `302` redirect to `location`.
    pub fn redirect(&mut self, location: impl Into<String>) {
        self.status = 302;
        self.headers.insert("Location".to_string(), location.into());
    }

    /// Returns the redirect target, if one was set.
    pub fn redirect_location(&self) -> Option<&str> {
        self.headers.get("Location").map(String::as_str)
    }
}

impl Default for LoginResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Relying-party URLs presented to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrls {
    /// Origin of the request (`scheme://host[:port]`, no trailing slash).
    pub realm: String,
    /// Exact URL the provider redirects back to.
    pub return_to: String,
}

impl CallbackUrls {
    /// Derives realm and return-to URL from request origin.
    ///
    /// # Errors
    /// Returns [`CoreError::UnsupportedScheme`] for schemes other than
    /// `http`/`https`, [`CoreError::InvalidHost`] when `host` is not a bare
    /// authority, and [`CoreError::InvalidLoginPath`] when `login_path` fails
    /// [`validate_login_path`].
    pub fn new(scheme: &str, host: &str, login_path: &str) -> Result<Self, CoreError> {
        let scheme = scheme.trim().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(CoreError::UnsupportedScheme(scheme));
        }
        validate_login_path(login_path)?;

        let base = Url::parse(&format!("{scheme}://{}", host.trim()))
            .map_err(|error| CoreError::InvalidHost(format!("{host}: {error}")))?;
        if base.host_str().is_none()
            || base.path() != "/"
            || base.query().is_some()
            || base.fragment().is_some()
            || !base.username().is_empty()
        {
            return Err(CoreError::InvalidHost(host.to_string()));
        }

        let realm = base.origin().ascii_serialization();
        let return_to = format!("{realm}{login_path}");
        let parsed = Url::parse(&return_to)
            .map_err(|error| CoreError::InvalidLoginPath(format!("{login_path}: {error}")))?;
        if parsed.origin().ascii_serialization() != realm {
            return Err(CoreError::InvalidLoginPath(login_path.to_string()));
        }

        Ok(Self { realm, return_to })
    }

    /// Derives URLs for `attempt` using `login_path`.
    ///
    /// # Errors
    /// See [`CallbackUrls::new`].
    pub fn for_attempt(attempt: &LoginAttempt, login_path: &str) -> Result<Self, CoreError> {
        Self::new(&attempt.scheme, &attempt.host, login_path)
    }
}

/// Opaque user attributes supplied by a user directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRecord(Map<String, Value>);

impl UserRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns one attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` when the record has no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Directory lookup result keyed by model name.
pub type ModelRecords = BTreeMap<String, UserRecord>;

/// Status tag reported by the protocol client after verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Assertion verified.
    Success,
    /// Provider or signature check failed.
    Failure,
    /// User or provider cancelled.
    Cancel,
    /// Any other status (e.g. `setup_needed`).
    Other(String),
}

impl VerificationStatus {
    /// Maps a textual status tag, case-insensitively.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "failure" => Self::Failure,
            "cancel" => Self::Cancel,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the lower-case status tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancel => "cancel",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of verifying a provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// Verification status tag.
    pub status: VerificationStatus,
    /// Claimed identity URL, possibly empty on failure.
    pub identity_url: String,
    /// Provider-supplied message, possibly empty.
    pub message: String,
}

impl VerificationResult {
    /// Creates a result without a provider message.
    pub fn new(status: VerificationStatus, identity_url: impl Into<String>) -> Self {
        Self {
            status,
            identity_url: identity_url.into(),
            message: String::new(),
        }
    }

    /// Attaches a provider message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Why a login attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Provider reported a failed verification.
    VerificationFailed,
    /// User or provider cancelled.
    Cancelled,
    /// Verified identity has no local account.
    UserNotFound,
    /// Verification returned a status this handler does not act on.
    UnrecognizedStatus,
    /// Protocol client could not start the handshake.
    DiscoveryFailed,
    /// User directory lookup failed.
    DirectoryUnavailable,
}

impl FailureReason {
    /// Returns the human-readable reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerificationFailed => "verification failed",
            Self::Cancelled => "cancelled",
            Self::UserNotFound => "no matching user",
            Self::UnrecognizedStatus => "unrecognized status",
            Self::DiscoveryFailed => "discovery failed",
            Self::DirectoryUnavailable => "user directory unavailable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one handshake step.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// Login resolved to a local user.
    Authenticated(UserRecord),
    /// Request is not a completed OpenID login; try other strategies.
    NotAttempted,
    /// Login was attempted and rejected.
    Failed(FailureReason),
}

impl AuthOutcome {
    /// Returns `true` for [`AuthOutcome::Authenticated`].
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Returns the resolved user record.
    pub fn record(&self) -> Option<&UserRecord> {
        match self {
            Self::Authenticated(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the failure reason.
    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            Self::Failed(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Handler configuration supplied by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerSettings {
    /// Form field holding the user-supplied OpenID URL.
    pub identity_field: String,
    /// Model name: form field group and directory result key.
    pub user_model: String,
    /// Extra lookup conditions; not read by the handshake itself.
    pub scope: Map<String, Value>,
    /// Login endpoint path appended to the realm.
    pub login_path: String,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
            user_model: DEFAULT_USER_MODEL.to_string(),
            scope: Map::new(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }
}

impl HandlerSettings {
    /// Parses and validates settings from JSON. Missing keys take defaults.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] for malformed JSON or unknown keys and
    /// the [`HandlerSettings::validate`] errors otherwise.
    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that every required setting is present.
    ///
    /// # Errors
    /// Returns [`CoreError::MissingSetting`] for blank values and
    /// [`CoreError::InvalidLoginPath`] when `login_path` fails
    /// [`validate_login_path`].
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.identity_field.trim().is_empty() {
            return Err(CoreError::MissingSetting("identity_field"));
        }
        if self.user_model.trim().is_empty() {
            return Err(CoreError::MissingSetting("user_model"));
        }
        if self.login_path.trim().is_empty() {
            return Err(CoreError::MissingSetting("login_path"));
        }
        validate_login_path(&self.login_path)
    }
}

/// Checks that `login_path` is a plain absolute path on the realm's origin.
///
/// Rejects network-path references (`//host/...`), query or fragment parts,
/// backslashes, and `.`/`..` segments.
///
/// # Errors
/// Returns [`CoreError::InvalidLoginPath`] on any violation.
pub fn validate_login_path(login_path: &str) -> Result<(), CoreError> {
    let invalid = !login_path.starts_with('/')
        || login_path.starts_with("//")
        || login_path.contains(['?', '#', '\\'])
        || login_path.chars().any(char::is_whitespace)
        || login_path
            .split('/')
            .any(|segment| segment == "." || segment == "..");
    if invalid {
        return Err(CoreError::InvalidLoginPath(login_path.to_string()));
    }
    Ok(())
}

/// Error type for settings and origin validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Required setting is blank.
    #[error("missing setting: {0}")]
    MissingSetting(&'static str),
    /// Login path is not an absolute path.
    #[error("login path must be a plain absolute path: {0}")]
    InvalidLoginPath(String),
    /// Host is not a bare authority.
    #[error("invalid host: {0}")]
    InvalidHost(String),
    /// Scheme is neither http nor https.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// JSON decoding error.
    #[error("settings codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}
