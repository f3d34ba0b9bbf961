// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::retry::RetryableError;

/// Result type alias for K8s operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug)]
pub enum K8sError {
	/// The API server answered with an error status.
	#[error("K8s API error ({code}): {message}")]
	Api { code: u16, message: String },

	#[error("Pod not found: {name}")]
	PodNotFound { name: String },

	/// Connection parameters could not be turned into a client.
	#[error("Invalid cluster configuration: {message}")]
	Config { message: String },

	/// The request never got an answer (connect, TLS, reset).
	#[error("K8s transport error: {message}")]
	Transport { message: String },

	#[error("Operation timed out")]
	Timeout,

	#[error("Stream error: {message}")]
	StreamError { message: String },

	#[error("Attach error: {message}")]
	AttachError { message: String },

	/// Any other client-side failure (serialization, request building).
	#[error("K8s request failed: {message}")]
	Request { message: String },
}

impl K8sError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, K8sError::PodNotFound { .. })
			|| matches!(self, K8sError::Api { code: 404, .. })
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		match err {
			kube::Error::Api(resp) => K8sError::Api {
				code: resp.code,
				message: resp.message,
			},
			kube::Error::HyperError(e) => K8sError::Transport {
				message: e.to_string(),
			},
			kube::Error::Service(e) => K8sError::Transport {
				message: e.to_string(),
			},
			other => K8sError::Request {
				message: other.to_string(),
			},
		}
	}
}

const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

impl RetryableError for K8sError {
	fn is_retryable(&self) -> bool {
		match self {
			K8sError::Api { code, .. } => RETRYABLE_STATUS_CODES.contains(code),
			K8sError::Transport { .. } | K8sError::Timeout | K8sError::AttachError { .. } => true,
			K8sError::PodNotFound { .. }
			| K8sError::Config { .. }
			| K8sError::StreamError { .. }
			| K8sError::Request { .. } => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn server_errors_are_retryable() {
		for code in [429, 500, 503] {
			let err = K8sError::Api {
				code,
				message: "busy".to_string(),
			};
			assert!(err.is_retryable(), "{code} should be retryable");
		}
	}

	#[test]
	fn client_errors_are_not_retryable() {
		for code in [400, 403, 404, 409, 422] {
			let err = K8sError::Api {
				code,
				message: "rejected".to_string(),
			};
			assert!(!err.is_retryable(), "{code} should not be retryable");
		}
		assert!(!K8sError::PodNotFound { name: "p".into() }.is_retryable());
	}

	#[test]
	fn transport_and_attach_errors_are_retryable() {
		assert!(K8sError::Timeout.is_retryable());
		assert!(K8sError::Transport {
			message: "connection reset".into()
		}
		.is_retryable());
		assert!(K8sError::AttachError {
			message: "upgrade failed".into()
		}
		.is_retryable());
	}

	#[test]
	fn not_found_covers_raw_404() {
		assert!(K8sError::Api {
			code: 404,
			message: "gone".into()
		}
		.is_not_found());
		assert!(!K8sError::Timeout.is_not_found());
	}
}
