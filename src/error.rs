//! Service-wide error type
//!
//! Each layer owns its error enum. `AppError` unifies them for the HTTP layer
//! and the task runner, and knows which status code each failure maps to.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use warp::http::StatusCode;

/// Main error type for marketplace operations
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Store error: {0}")]
    StoreError(#[from] crate::store::StoreError),

    #[error("Auth error: {0}")]
    AuthError(#[from] crate::auth::AuthError),

    #[error("LLM provider error: {0}")]
    LlmError(#[from] crate::llm::LlmError),

    #[error("Tool error: {0}")]
    ToolError(#[from] crate::tools::ToolError),

    #[error("Research error: {0}")]
    ResearchError(#[from] crate::research::ResearchError),

    #[error("Payment error: {0}")]
    PaymentError(#[from] crate::payments::PaymentError),

    #[error("Notification error: {0}")]
    NotifyError(#[from] crate::notify::NotifyError),
}

impl AppError {
    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Create not found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound(what.into())
    }

    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::StoreError(crate::store::StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::StoreError(crate::store::StoreError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to put in a response body or a persisted record
    pub fn public_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret|authorization)[=:]\s*\S+")
        .expect("secret pattern is valid")
});

static BEARER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(bearer|bot)\s+[A-Za-z0-9._\-]{8,}").expect("bearer pattern is valid"));

static SECRET_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_ERROR_LEN: usize = 500;

/// Redact credentials and secret file paths, and bound the length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();
    sanitized = BEARER_PATTERN.replace_all(&sanitized, "${1} ***").to_string();
    sanitized = SECRET_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_LEN {
        let suffix = "...[truncated]";
        let mut cut = MAX_ERROR_LEN - suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], suffix);
    }

    sanitized
}

/// Result type for marketplace operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::not_found("task").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Conflict("task running".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::invalid_input("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::internal_error("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_map_to_http() {
        let err: AppError = crate::store::StoreError::NotFound("task x".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: AppError = crate::store::StoreError::Conflict("email".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_message_sanitization() {
        let error =
            AppError::internal_error("Failed to authenticate: password=secret123 token=abc456");
        let message = error.public_message();

        assert!(!message.contains("secret123"));
        assert!(!message.contains("abc456"));
        assert!(message.contains("password=***"));
        assert!(message.contains("token=***"));
    }

    #[test]
    fn test_bearer_tokens_are_redacted() {
        let sanitized = sanitize_error_message("header was Bearer sk-live-0123456789abcdef");
        assert!(!sanitized.contains("sk-live-0123456789abcdef"));
        assert!(sanitized.contains("Bearer ***"));

        let sanitized = sanitize_error_message("Authorization Bot MTExMjIyMzMz.abc.def");
        assert!(!sanitized.contains("MTExMjIyMzMz"));
    }

    #[test]
    fn test_keypair_path_redaction() {
        let sanitized = sanitize_error_message("cannot open /srv/app/secrets/agenx-wallet.json");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("agenx-wallet.json"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= MAX_ERROR_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"é".repeat(400));
        assert!(sanitized.len() <= MAX_ERROR_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_exactly_limit_is_untouched() {
        let message = "x".repeat(MAX_ERROR_LEN);
        assert_eq!(sanitize_error_message(&message), message);
    }
}
