// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration error types.

use std::path::PathBuf;

use skein_deployer::DeployerError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// A field holds a value the cluster would reject. `path` is the JSON
	/// path of the field, e.g. `pod.spec.securityContext.seccompProfile.type`.
	#[error("Invalid value at {path}: {message}")]
	Validation { path: String, message: String },

	#[error("Malformed configuration: {source}")]
	Serialization {
		#[from]
		source: serde_json::Error,
	},

	#[error("Failed to load kubeconfig: {message}")]
	Kubeconfig { message: String },

	#[error("Invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("Failed to parse TOML config at {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Failed to parse JSON config at {path}: {source}")]
	JsonParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("Failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl ConfigError {
	pub(crate) fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
		ConfigError::Validation {
			path: path.into(),
			message: message.into(),
		}
	}
}

impl From<ConfigError> for DeployerError {
	fn from(err: ConfigError) -> Self {
		DeployerError::Config {
			message: err.to_string(),
		}
	}
}
