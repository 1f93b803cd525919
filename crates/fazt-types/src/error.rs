//! Error handling subsystem. Implements a custom Error type.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::prelude::*;

pub type FzResult<T> = std::result::Result<T, Error>;

/// Shaped JSON error body: `{"error":{"code","message"}}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
	pub code: String,
	pub message: String,
}

impl ErrorResponse {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		ErrorResponse { error: ErrorBody { code: code.into(), message: message.into() } }
	}
}

#[derive(Debug)]
pub enum Error {
	// Core errors
	NotFound,
	PermissionDenied, // 403 - authenticated but role/scope insufficient
	Unauthorized,     // 401 - missing/invalid/expired credential
	DbError,
	Parse,

	// Input validation and constraints
	ValidationError(String), // 400 - invalid input data, traversal, oversized archive
	Conflict(String),        // 409 - constraint violation (unique, swap on same alias, ...)
	RateLimited,             // 429 - login throttle or egress bucket empty

	// Network and external services
	NetworkError(String), // egress/upstream failures
	Timeout,              // 504 - handler or upstream exceeded its budget

	// System and configuration
	ConfigError(String),        // missing or invalid configuration
	ServiceUnavailable(String), // 503 - storage writer unavailable, cert issuance failure
	Internal(String),           // internal invariant violations, for debugging

	CryptoError(String), // cryptography/TLS configuration errors

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{:?}", self)
	}
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, code, message) = match self {
			Error::NotFound => (
				StatusCode::NOT_FOUND,
				"E-CORE-NOTFOUND".to_string(),
				"Resource not found".to_string(),
			),
			Error::PermissionDenied => (
				StatusCode::FORBIDDEN,
				"E-AUTH-NOPERM".to_string(),
				"You do not have permission to access this resource".to_string(),
			),
			Error::Unauthorized => (
				StatusCode::UNAUTHORIZED,
				"E-AUTH-UNAUTH".to_string(),
				"Authentication required or invalid credential".to_string(),
			),
			Error::ValidationError(msg) => (
				StatusCode::BAD_REQUEST,
				"E-VAL-INVALID".to_string(),
				format!("Request validation failed: {}", msg),
			),
			Error::Conflict(msg) => (
				StatusCode::CONFLICT,
				"E-CORE-CONFLICT".to_string(),
				format!("Resource conflict: {}", msg),
			),
			Error::RateLimited => (
				StatusCode::TOO_MANY_REQUESTS,
				"E-RATE-LIMITED".to_string(),
				"Too many requests".to_string(),
			),
			Error::Timeout => (
				StatusCode::GATEWAY_TIMEOUT,
				"E-NET-TIMEOUT".to_string(),
				"Operation exceeded its time budget".to_string(),
			),
			Error::ServiceUnavailable(msg) => (
				StatusCode::SERVICE_UNAVAILABLE,
				"E-SYS-UNAVAIL".to_string(),
				format!("Service temporarily unavailable: {}", msg),
			),
			// Server errors (5xx) - no message exposure for security
			Error::DbError => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CORE-DBERR".to_string(),
				"Internal server error".to_string(),
			),
			Error::Internal(msg) => {
				warn!("internal error: {}", msg);
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					"E-CORE-INTERNAL".to_string(),
					"Internal server error".to_string(),
				)
			}
			Error::Parse => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CORE-PARSE".to_string(),
				"Internal server error".to_string(),
			),
			Error::Io(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-SYS-IO".to_string(),
				"Internal server error".to_string(),
			),
			Error::NetworkError(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-NET-ERROR".to_string(),
				"Internal server error".to_string(),
			),
			Error::CryptoError(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CRYPT-FAIL".to_string(),
				"Internal server error".to_string(),
			),
			Error::ConfigError(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CONF-CFGERR".to_string(),
				"Internal server error".to_string(),
			),
		};

		let error_response = ErrorResponse::new(code, message);
		(status, Json(error_response)).into_response()
	}
}

impl From<std::num::ParseIntError> for Error {
	fn from(_err: std::num::ParseIntError) -> Self {
		warn!("parse int error: {}", _err);
		Error::Parse
	}
}

impl From<std::time::SystemTimeError> for Error {
	fn from(_err: std::time::SystemTimeError) -> Self {
		warn!("system time error: {}", _err);
		Error::ServiceUnavailable("system time error".into())
	}
}

impl From<axum::Error> for Error {
	fn from(_err: axum::Error) -> Self {
		warn!("axum error: {}", _err);
		Error::NetworkError("axum error".into())
	}
}

impl From<axum::http::Error> for Error {
	fn from(_err: axum::http::Error) -> Self {
		warn!("http error: {}", _err);
		Error::NetworkError("http error".into())
	}
}

impl From<axum::http::header::ToStrError> for Error {
	fn from(_err: axum::http::header::ToStrError) -> Self {
		warn!("header to str error: {}", _err);
		Error::Parse
	}
}

impl From<serde_json::Error> for Error {
	fn from(_err: serde_json::Error) -> Self {
		warn!("json error: {}", _err);
		Error::Parse
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(_err: tokio::task::JoinError) -> Self {
		warn!("tokio join error: {}", _err);
		Error::ServiceUnavailable("task execution failed".into())
	}
}

/// Helper macro for locking mutexes with automatic internal error handling.
///
/// Converts a poisoned-lock error to `Error::Internal`, optionally with
/// context about which mutex was poisoned.
#[macro_export]
macro_rules! lock {
	($mutex:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal("mutex poisoned".into()))
	};
	($mutex:expr, $context:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal(format!("mutex poisoned: {}", $context)))
	};
}

// vim: ts=4
