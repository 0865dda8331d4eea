//! Error handling for the vitals orchestration core.
//!
//! This module provides:
//! - An `ErrorCode` taxonomy with HTTP status mapping and severity
//! - `VitalsError`, carrying the failing probe's name, a context map, and the
//!   response time measured at the point of failure
//! - Conversion of any error into an `Unhealthy` check result, so probe
//!   failures surface as data instead of aborting a run
//!
//! # Usage
//!
//! ```rust,ignore
//! use vitals_core::error::{VitalsError, Result};
//!
//! fn lookup(name: &str) -> Result<()> {
//!     Err(VitalsError::probe_not_found(name))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::check::HealthCheckResult;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for vitals operations.
pub type Result<T> = std::result::Result<T, VitalsError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Probe errors (1000-1099)
    ProbeNotFound,
    InvalidProbe,
    DependencyFailed,
    DependencyCycle,
    CheckTimeout,
    CheckFailed,
    Misconfigured,

    // Store errors (2000-2099)
    CacheError,
    CacheConnectionFailed,
    SerializationError,

    // External service errors (3000-3099)
    DatabaseError,
    NetworkError,
    ExternalServiceError,

    // Validation errors (4000-4099)
    InvalidValue,

    // Configuration errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ProbeNotFound => 1000,
            Self::InvalidProbe => 1001,
            Self::DependencyFailed => 1002,
            Self::DependencyCycle => 1003,
            Self::CheckTimeout => 1004,
            Self::CheckFailed => 1005,
            Self::Misconfigured => 1006,

            Self::CacheError => 2000,
            Self::CacheConnectionFailed => 2001,
            Self::SerializationError => 2002,

            Self::DatabaseError => 3000,
            Self::NetworkError => 3001,
            Self::ExternalServiceError => 3002,

            Self::InvalidValue => 4000,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::ProbeNotFound => StatusCode::NOT_FOUND,

            Self::InvalidProbe | Self::InvalidValue | Self::DependencyCycle => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            Self::CheckTimeout => StatusCode::GATEWAY_TIMEOUT,

            Self::CheckFailed
            | Self::DependencyFailed
            | Self::DatabaseError
            | Self::ExternalServiceError
            | Self::CacheConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,

            Self::NetworkError => StatusCode::BAD_GATEWAY,

            Self::CacheError
            | Self::SerializationError
            | Self::Misconfigured
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if the failure class is worth retrying.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CheckTimeout
                | Self::CacheError
                | Self::CacheConnectionFailed
                | Self::DatabaseError
                | Self::NetworkError
                | Self::ExternalServiceError
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "probe",
            2000..=2099 => "store",
            3000..=3099 => "external_service",
            4000..=4099 => "validation",
            5000..=5099 => "configuration",
            _ => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors, affects logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// User errors (unknown probe names, bad input)
    Low,
    /// Operational issues (timeouts, failed checks)
    Medium,
    /// System errors (store failures, misconfiguration)
    High,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ProbeNotFound | ErrorCode::InvalidProbe | ErrorCode::InvalidValue => {
                Self::Low
            }

            ErrorCode::DependencyFailed
            | ErrorCode::DependencyCycle
            | ErrorCode::CheckTimeout
            | ErrorCode::CheckFailed
            | ErrorCode::NetworkError
            | ErrorCode::ExternalServiceError
            | ErrorCode::DatabaseError => Self::Medium,

            ErrorCode::CacheError
            | ErrorCode::CacheConnectionFailed
            | ErrorCode::SerializationError
            | ErrorCode::Misconfigured
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration
            | ErrorCode::InternalError => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the vitals core.
///
/// Beyond the usual message/source pair, a `VitalsError` can carry the name of
/// the probe it belongs to, a structured context map, and the elapsed time
/// measured when the failure occurred. `into_result` turns any error into the
/// `Unhealthy` check result the orchestrator reports for that probe.
#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct VitalsError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Error message (safe to expose to clients)
    message: Cow<'static, str>,

    /// The probe this error belongs to, if any
    probe: Option<String>,

    /// Additional structured context
    context: BTreeMap<String, serde_json::Value>,

    /// Response time measured when the failure occurred, in milliseconds
    response_time_ms: Option<f64>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl VitalsError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and message.
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        let err = Self {
            code,
            message: message.into(),
            probe: None,
            context: BTreeMap::new(),
            response_time_ms: None,
            source: None,
        };
        err.record_metrics();
        err
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Unknown probe name requested.
    pub fn probe_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::ProbeNotFound,
            format!("Health check not found: {name}"),
        )
        .with_probe(name)
    }

    /// Malformed probe registration.
    pub fn invalid_probe(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidProbe,
            format!("Invalid health check: {}", reason.into()),
        )
    }

    /// An upstream probe this probe depends on is not healthy.
    pub fn dependency_failure(
        name: impl Into<String>,
        dependency: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let dependency = dependency.into();
        Self::new(
            ErrorCode::DependencyFailed,
            format!(
                "Health check '{name}' failed: dependency '{dependency}' is unavailable - {}",
                reason.into()
            ),
        )
        .with_probe(name)
        .with_context("failed_dependency", dependency)
    }

    /// The dependency graph contains a cycle through this probe.
    pub fn dependency_cycle(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::DependencyCycle,
            format!("Health check '{name}' is part of a dependency cycle"),
        )
        .with_probe(name)
    }

    /// The probe exceeded its execution budget.
    pub fn timeout(name: impl Into<String>, timeout: std::time::Duration) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::CheckTimeout,
            format!(
                "Health check '{name}' timed out after {:.1} seconds",
                timeout.as_secs_f64()
            ),
        )
        .with_probe(name)
        .with_response_time(timeout.as_secs_f64() * 1000.0)
    }

    /// Any other runtime error inside a probe.
    pub fn execution_failure(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::CheckFailed,
            format!("Health check '{name}' failed: {reason}"),
        )
        .with_probe(name)
    }

    /// Missing or invalid probe configuration.
    pub fn misconfigured(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::Misconfigured,
            format!("Health check '{name}' is misconfigured: {}", reason.into()),
        )
        .with_probe(name)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach the owning probe's name.
    pub fn with_probe(mut self, name: impl Into<String>) -> Self {
        self.probe = Some(name.into());
        self
    }

    /// Attach a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach the response time measured at failure.
    pub fn with_response_time(mut self, ms: f64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the owning probe's name, if any.
    pub fn probe(&self) -> Option<&str> {
        self.probe.as_deref()
    }

    /// Get the context map.
    pub fn context(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.context
    }

    /// Get the response time measured at failure.
    pub fn response_time_ms(&self) -> Option<f64> {
        self.response_time_ms
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    /// Convert this error into an `Unhealthy` check result.
    ///
    /// `fallback_name` is used when the error does not carry a probe name.
    pub fn into_result(self, fallback_name: &str) -> HealthCheckResult {
        let name = self.probe.clone().unwrap_or_else(|| fallback_name.to_string());
        let mut result = HealthCheckResult::unhealthy(name)
            .with_response_time_ms(self.response_time_ms.unwrap_or(0.0))
            .with_metadata("error_code", self.code)
            .with_error(self.message.to_string());
        for (key, value) in self.context {
            result = result.with_metadata(key, value);
        }
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging and Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        match self.severity() {
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = self.code.category(),
                    probe = ?self.probe,
                    message = %self.message,
                    source = ?self.source,
                    "Health subsystem error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = self.code.category(),
                    probe = ?self.probe,
                    message = %self.message,
                    "Health check error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = self.code.category(),
                    message = %self.message,
                    "Health check error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "vitals_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response body for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// Error message
    pub error: String,

    /// The probe this error belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,

    /// Additional context
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&VitalsError> for ErrorResponse {
    fn from(err: &VitalsError) -> Self {
        Self {
            code: err.code,
            numeric_code: err.code.numeric_code(),
            error: err.message.to_string(),
            probe: err.probe.clone(),
            context: err.context.clone(),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl IntoResponse for VitalsError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.http_status();
        let body = ErrorResponse::from(&self);
        (status, Json(body)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for converting foreign errors with a message.
pub trait ErrorContext<T> {
    /// Wrap the error as an internal error with context.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Wrap the error under a specific error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| VitalsError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| VitalsError::new(code, e.to_string()).with_source(e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for VitalsError {
    fn from(error: sqlx::Error) -> Self {
        Self::new(ErrorCode::DatabaseError, error.to_string()).with_source(error)
    }
}

impl From<redis::RedisError> for VitalsError {
    fn from(error: redis::RedisError) -> Self {
        let code = if error.is_connection_refusal() || error.is_connection_dropped() {
            ErrorCode::CacheConnectionFailed
        } else {
            ErrorCode::CacheError
        };
        Self::new(code, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for VitalsError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string()).with_source(error)
    }
}

impl From<reqwest::Error> for VitalsError {
    fn from(error: reqwest::Error) -> Self {
        let code = if error.is_timeout() {
            ErrorCode::CheckTimeout
        } else if error.is_connect() {
            ErrorCode::NetworkError
        } else {
            ErrorCode::ExternalServiceError
        };
        Self::new(code, error.to_string()).with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for VitalsError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::new(ErrorCode::CheckTimeout, "Operation timed out").with_source(error)
    }
}

impl From<std::io::Error> for VitalsError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let code = match error.kind() {
            ErrorKind::TimedOut => ErrorCode::CheckTimeout,
            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => ErrorCode::NetworkError,
            _ => ErrorCode::InternalError,
        };
        Self::new(code, error.to_string()).with_source(error)
    }
}

impl From<config::ConfigError> for VitalsError {
    fn from(error: config::ConfigError) -> Self {
        let code = match &error {
            config::ConfigError::NotFound(_) => ErrorCode::MissingConfiguration,
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => {
                ErrorCode::InvalidConfiguration
            }
            _ => ErrorCode::ConfigurationError,
        };
        Self::new(code, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::HealthStatus;
    use std::time::Duration;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::ProbeNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::InvalidProbe.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::CheckTimeout.http_status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ErrorCode::CheckFailed.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::CheckTimeout.is_retryable());
        assert!(ErrorCode::CacheConnectionFailed.is_retryable());
        assert!(!ErrorCode::ProbeNotFound.is_retryable());
        assert!(!ErrorCode::InvalidProbe.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ErrorCode::ProbeNotFound.category(), "probe");
        assert_eq!(ErrorCode::CacheError.category(), "store");
        assert_eq!(ErrorCode::InvalidValue.category(), "validation");
        assert_eq!(ErrorCode::InternalError.category(), "internal");
    }

    #[test]
    fn test_probe_not_found() {
        let err = VitalsError::probe_not_found("mystery");
        assert_eq!(err.code(), ErrorCode::ProbeNotFound);
        assert_eq!(err.probe(), Some("mystery"));
        assert!(err.message().contains("mystery"));
    }

    #[test]
    fn test_dependency_failure_context() {
        let err = VitalsError::dependency_failure("broker", "database", "unhealthy");
        assert_eq!(err.code(), ErrorCode::DependencyFailed);
        assert_eq!(
            err.context()["failed_dependency"],
            serde_json::json!("database")
        );
    }

    #[test]
    fn test_timeout_carries_response_time() {
        let err = VitalsError::timeout("s3", Duration::from_secs(5));
        assert_eq!(err.code(), ErrorCode::CheckTimeout);
        assert_eq!(err.response_time_ms(), Some(5000.0));
        assert!(err.message().contains("timed out after 5.0 seconds"));
    }

    #[test]
    fn test_into_result_produces_unhealthy() {
        let result = VitalsError::execution_failure("redis", "boom").into_result("ignored");
        assert_eq!(result.name, "redis");
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.error.as_deref().unwrap().contains("boom"));
        assert_eq!(
            result.metadata["error_code"],
            serde_json::json!("CHECK_FAILED")
        );
    }

    #[test]
    fn test_into_result_fallback_name() {
        let result =
            VitalsError::new(ErrorCode::InternalError, "registry poisoned").into_result("database");
        assert_eq!(result.name, "database");
        assert!(result.is_unhealthy());
    }

    #[test]
    fn test_error_severity_mapping() {
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::ProbeNotFound),
            ErrorSeverity::Low
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::CheckTimeout),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::Misconfigured),
            ErrorSeverity::High
        );
    }

    #[test]
    fn test_error_response_serialization() {
        let err = VitalsError::misconfigured("s3", "bucket not set");
        let response = ErrorResponse::from(&err);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("MISCONFIGURED"));
        assert!(json.contains("bucket not set"));
    }

    #[test]
    fn test_error_context_trait() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        ));
        let err = result.context("reading cgroup stats").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert!(err.message().contains("reading cgroup stats"));
    }
}
