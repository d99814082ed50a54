//! Request authorization
//!
//! The device key travels in the Uri-Query option as `key=<token>`. It is
//! extracted here and checked against the identity authority.

use std::fmt;

use crate::access::{AccessChecker, AccessError};
use crate::message::{Code, Message, OptionValue, URI_QUERY};

/// Name of the query parameter carrying the token
const KEY_PARAM: &str = "key";

// ============================================================================
// Errors
// ============================================================================

/// Authorization failures, each with its own response code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Query option missing or not a string
    BadRequest,
    /// Query option present but not `key=<value>`
    BadOption,
    /// Authority refused the token
    Unauthorized(String),
    /// Authority could not be reached
    ServiceUnavailable(String),
}

impl AuthError {
    /// Response code reported to the device
    pub fn code(&self) -> Code {
        match self {
            AuthError::BadRequest => Code::BAD_REQUEST,
            AuthError::BadOption => Code::BAD_OPTION,
            AuthError::Unauthorized(_) => Code::UNAUTHORIZED,
            AuthError::ServiceUnavailable(_) => Code::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::BadRequest => write!(f, "missing or non-string query option"),
            AuthError::BadOption => write!(f, "query option is not key=<value>"),
            AuthError::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            AuthError::ServiceUnavailable(msg) => write!(f, "service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AccessError> for AuthError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unreachable(msg) => AuthError::ServiceUnavailable(msg),
            AccessError::Denied(msg) => AuthError::Unauthorized(msg),
        }
    }
}

// ============================================================================
// Token Extraction
// ============================================================================

/// Extract the token from a Uri-Query option value.
///
/// `key=` yields an empty token; rejecting it is left to the authority.
pub fn extract_key(opt: Option<&OptionValue>) -> Result<&str, AuthError> {
    let val = opt
        .and_then(OptionValue::as_str)
        .ok_or(AuthError::BadRequest)?;

    let mut parts = val.split('=');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(token), None) if name.to_lowercase() == KEY_PARAM => Ok(token),
        _ => Err(AuthError::BadOption),
    }
}

// ============================================================================
// Authorization
// ============================================================================

/// Authorize `msg` for `resource_id` and return the publisher identity
pub fn authorize(
    checker: &dyn AccessChecker,
    msg: &Message,
    resource_id: &str,
) -> Result<String, AuthError> {
    let key = extract_key(msg.option(URI_QUERY))?;
    Ok(checker.can_access(resource_id, key)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    struct FixedChecker(Result<String, AccessError>);

    impl AccessChecker for FixedChecker {
        fn can_access(&self, _resource_id: &str, _token: &str) -> Result<String, AccessError> {
            self.0.clone()
        }
    }

    fn str_opt(s: &str) -> OptionValue {
        OptionValue::Str(s.to_string())
    }

    fn request_with_query(query: &str) -> Message {
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 1);
        msg.add_option(URI_QUERY, str_opt(query));
        msg
    }

    #[test]
    fn test_extract_key_missing() {
        assert_eq!(extract_key(None), Err(AuthError::BadRequest));
    }

    #[test]
    fn test_extract_key_not_a_string() {
        assert_eq!(
            extract_key(Some(&OptionValue::Uint(42))),
            Err(AuthError::BadRequest)
        );
        assert_eq!(
            extract_key(Some(&OptionValue::Opaque(vec![0xFF]))),
            Err(AuthError::BadRequest)
        );
    }

    #[test]
    fn test_extract_key_wrong_name() {
        assert_eq!(extract_key(Some(&str_opt("foo=bar"))), Err(AuthError::BadOption));
    }

    #[test]
    fn test_extract_key_wrong_shape() {
        assert_eq!(extract_key(Some(&str_opt("key"))), Err(AuthError::BadOption));
        assert_eq!(extract_key(Some(&str_opt("key=a=b"))), Err(AuthError::BadOption));
        assert_eq!(extract_key(Some(&str_opt(""))), Err(AuthError::BadOption));
    }

    #[test]
    fn test_extract_key_empty_value() {
        assert_eq!(extract_key(Some(&str_opt("key="))), Ok(""));
    }

    #[test]
    fn test_extract_key_valid() {
        assert_eq!(extract_key(Some(&str_opt("key=abc123"))), Ok("abc123"));
        assert_eq!(extract_key(Some(&str_opt("KEY=abc123"))), Ok("abc123"));
        assert_eq!(extract_key(Some(&str_opt("Key=abc123"))), Ok("abc123"));
    }

    #[test]
    fn test_authorize_success() {
        let checker = FixedChecker(Ok("thing-1".to_string()));
        let msg = request_with_query("key=abc");

        assert_eq!(authorize(&checker, &msg, "chan"), Ok("thing-1".to_string()));
    }

    #[test]
    fn test_authorize_maps_access_errors() {
        let msg = request_with_query("key=abc");

        let unreachable = FixedChecker(Err(AccessError::Unreachable("down".to_string())));
        let err = authorize(&unreachable, &msg, "chan").unwrap_err();
        assert_eq!(err.code(), Code::SERVICE_UNAVAILABLE);

        let denied = FixedChecker(Err(AccessError::Denied("nope".to_string())));
        let err = authorize(&denied, &msg, "chan").unwrap_err();
        assert_eq!(err.code(), Code::UNAUTHORIZED);
    }

    #[test]
    fn test_authorize_extraction_codes() {
        let checker = FixedChecker(Ok("thing-1".to_string()));

        let no_query = Message::new(MessageType::Confirmable, Code::GET, 1);
        assert_eq!(
            authorize(&checker, &no_query, "chan").unwrap_err().code(),
            Code::BAD_REQUEST
        );

        let bad_query = request_with_query("token=abc");
        assert_eq!(
            authorize(&checker, &bad_query, "chan").unwrap_err().code(),
            Code::BAD_OPTION
        );
    }
}
