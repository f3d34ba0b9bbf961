// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use thiserror::Error;

/// Result type alias for deployer operations.
pub type DeployerResult<T> = Result<T, DeployerError>;

/// Errors surfaced to the workflow engine by connectors and container handles.
#[derive(Error, Debug)]
pub enum DeployerError {
	/// Configuration is malformed or semantically invalid. Detected before any
	/// cluster call; never retried.
	#[error("Invalid configuration: {message}")]
	Config { message: String },

	/// The cluster rejected the workload (validation, quota, RBAC).
	#[error("Pod {pod} was rejected by the cluster: {message}")]
	Deployment { pod: String, message: String },

	#[error("Pod {pod} did not become ready within {timeout:?}")]
	StartupTimeout { pod: String, timeout: Duration },

	#[error("Pod {pod} failed: {reason}")]
	PodFailed { pod: String, reason: String },

	#[error("Failed to attach to pod {pod} after {attempts} attempt(s): {message}")]
	Attach { pod: String, attempts: u32, message: String },

	/// A single read or write failed. The handle stays open.
	#[error("Stream error on pod {pod}: {message}")]
	Stream { pod: String, message: String },

	/// The pod could not be deleted during close. The stream side is closed.
	#[error("Failed to delete pod {pod}: {message}")]
	Cleanup { pod: String, message: String },

	#[error("Operation cancelled (pod: {})", .pod.as_deref().unwrap_or("not created"))]
	Cancelled { pod: Option<String> },

	#[error("Unknown deployer backend: {name}")]
	UnknownBackend { name: String },
}

impl DeployerError {
	/// The pod this error concerns, when one had been named.
	pub fn pod(&self) -> Option<&str> {
		match self {
			DeployerError::Deployment { pod, .. }
			| DeployerError::StartupTimeout { pod, .. }
			| DeployerError::PodFailed { pod, .. }
			| DeployerError::Attach { pod, .. }
			| DeployerError::Stream { pod, .. }
			| DeployerError::Cleanup { pod, .. } => Some(pod),
			DeployerError::Cancelled { pod } => pod.as_deref(),
			DeployerError::Config { .. } | DeployerError::UnknownBackend { .. } => None,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, DeployerError::Cancelled { .. })
	}
}
