//! Basic credential gate.
//!
//! The endpoint holds one pre-shared value: the base64 text a client sends
//! after `Basic `. Authentication is an exact comparison against it; the
//! username is only decoded after a match, for logging and auditing.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;

pub const BASIC_SCHEME: &str = "Basic";

/// The authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
}

/// Why a request was not authenticated. Displayed text is what gets logged.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("Authorization header missing")]
    MissingHeader,

    #[error("Authorization header value is incorrect")]
    MalformedHeader,

    #[error("Bad Authorization header scheme")]
    WrongScheme,

    #[error("Invalid username or password")]
    InvalidCredential,

    /// The configured value matched but is not base64 of UTF-8 text.
    #[error("configured credential is not base64-encoded UTF-8")]
    UndecodableCredential,
}

/// Gate bound to one endpoint's expected credential.
#[derive(Clone)]
pub struct BasicAuthGate {
    expected: String,
}

impl BasicAuthGate {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<Identity, AuthFailure> {
        authenticate(headers, &self.expected)
    }
}

impl std::fmt::Debug for BasicAuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthGate")
            .field("expected", &"<redacted>")
            .finish()
    }
}

/// Authenticate a request against the expected `Basic` parameter.
pub fn authenticate(headers: &HeaderMap, expected: &str) -> Result<Identity, AuthFailure> {
    let mut values = headers.get_all(AUTHORIZATION).iter();
    let value = values.next().ok_or(AuthFailure::MissingHeader)?;
    if values.next().is_some() {
        return Err(AuthFailure::MalformedHeader);
    }
    let value = value.to_str().map_err(|_| AuthFailure::MalformedHeader)?;
    let (scheme, parameter) = parse_header(value)?;

    if !scheme.eq_ignore_ascii_case(BASIC_SCHEME) {
        return Err(AuthFailure::WrongScheme);
    }
    let parameter = parameter.ok_or(AuthFailure::InvalidCredential)?;
    if !bool::from(parameter.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(AuthFailure::InvalidCredential);
    }

    let decoded = STANDARD
        .decode(parameter)
        .map_err(|_| AuthFailure::UndecodableCredential)?;
    let credentials = String::from_utf8(decoded).map_err(|_| AuthFailure::UndecodableCredential)?;
    let name = credentials.split(':').next().unwrap_or_default().to_string();
    Ok(Identity { name })
}

/// Split `scheme [SP parameter]`. The scheme must be an HTTP token.
fn parse_header(value: &str) -> Result<(&str, Option<&str>), AuthFailure> {
    let value = value.trim();
    let (scheme, rest) = match value.split_once(' ') {
        Some((scheme, rest)) => (scheme, rest.trim()),
        None => (value, ""),
    };
    if scheme.is_empty() || !scheme.bytes().all(is_token_char) {
        return Err(AuthFailure::MalformedHeader);
    }
    let parameter = (!rest.is_empty()).then_some(rest);
    Ok((scheme, parameter))
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
