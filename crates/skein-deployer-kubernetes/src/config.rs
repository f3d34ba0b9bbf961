// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deployer configuration.
//!
//! Field names are camelCase on the wire, like Kubernetes manifests, so a pod
//! template can be pasted from an existing manifest. Credentials are
//! [`SecretString`]s: redacted in `Debug`, written in full by
//! [`Config::to_value`] so a config handed to another process round-trips.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use skein_common_secret::SecretString;
use skein_k8s::{Container, ObjectMeta, PodSpec, RetryConfig};

use crate::error::ConfigError;
use crate::validation;

pub const DEFAULT_API_PATH: &str = "/api";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_ATTACH_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTACH_BASE_DELAY_MS: u64 = 250;
const ATTACH_MAX_DELAY: Duration = Duration::from_secs(2);

/// Complete configuration of a Kubernetes connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	pub connection: Connection,
	#[serde(default)]
	pub pod: PodTemplate,
	#[serde(default)]
	pub timeouts: Timeouts,
	#[serde(default)]
	pub stream: StreamMode,
	#[serde(default)]
	pub attach: AttachPolicy,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default)]
	pub delete_grace_period_secs: u32,
}

impl Config {
	/// A configuration with defaults everywhere except the API server URL.
	pub fn new(host: impl Into<String>) -> Self {
		Self {
			connection: Connection {
				host: host.into(),
				..Default::default()
			},
			pod: PodTemplate::default(),
			timeouts: Timeouts::default(),
			stream: StreamMode::default(),
			attach: AttachPolicy::default(),
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			delete_grace_period_secs: 0,
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		validation::validate_config(self)
	}

	/// Deserialize then validate.
	pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
		let config: Config = serde_json::from_value(value)?;
		config.validate()?;
		Ok(config)
	}

	/// Validate then serialize. Credentials are written in full.
	pub fn to_value(&self) -> Result<serde_json::Value, ConfigError> {
		self.validate()?;
		Ok(serde_json::to_value(self)?)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	/// Namespace pods are created in when the template does not name one.
	pub fn namespace(&self) -> &str {
		if self.connection.namespace.is_empty() {
			DEFAULT_NAMESPACE
		} else {
			&self.connection.namespace
		}
	}
}

/// API server endpoint and credentials. Empty strings mean "not set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
	#[serde(default)]
	pub host: String,
	#[serde(default = "default_api_path")]
	pub api_path: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub username: String,
	#[serde(
		default,
		with = "skein_common_secret::exposed",
		skip_serializing_if = "SecretString::is_empty"
	)]
	pub password: SecretString,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub server_name: String,
	/// Client certificate, PEM.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub cert_data: String,
	/// Client private key, PEM.
	#[serde(
		default,
		with = "skein_common_secret::exposed",
		skip_serializing_if = "SecretString::is_empty"
	)]
	pub key_data: SecretString,
	/// CA bundle, PEM.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub ca_data: String,
	#[serde(
		default,
		with = "skein_common_secret::exposed",
		skip_serializing_if = "SecretString::is_empty"
	)]
	pub bearer_token: SecretString,
	#[serde(default)]
	pub qps: f32,
	#[serde(default)]
	pub burst: u32,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub namespace: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub user_agent: String,
}

impl Default for Connection {
	fn default() -> Self {
		Self {
			host: String::new(),
			api_path: default_api_path(),
			username: String::new(),
			password: SecretString::default(),
			server_name: String::new(),
			cert_data: String::new(),
			key_data: SecretString::default(),
			ca_data: String::new(),
			bearer_token: SecretString::default(),
			qps: 0.0,
			burst: 0,
			namespace: String::new(),
			user_agent: String::new(),
		}
	}
}

/// User-supplied partial pod manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
	#[serde(default)]
	pub metadata: ObjectMeta,
	#[serde(default)]
	pub spec: PodTemplateSpec,
}

/// Pod-level fields inline, plus the single container that runs the image.
///
/// `containers` and `pluginContainer.name` may be omitted; both are filled in
/// when the pod is assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "serde_json::Value")]
pub struct PodTemplateSpec {
	#[serde(flatten)]
	pub pod: PodSpec,
	#[serde(default)]
	pub plugin_container: Container,
}

impl TryFrom<serde_json::Value> for PodTemplateSpec {
	type Error = serde_json::Error;

	fn try_from(mut value: serde_json::Value) -> Result<Self, Self::Error> {
		#[derive(Deserialize)]
		#[serde(rename_all = "camelCase")]
		struct Raw {
			#[serde(flatten)]
			pod: PodSpec,
			#[serde(default)]
			plugin_container: Option<Container>,
		}

		if let Some(map) = value.as_object_mut() {
			map.entry("containers")
				.or_insert_with(|| serde_json::Value::Array(Vec::new()));
			if let Some(container) = map
				.get_mut("pluginContainer")
				.and_then(serde_json::Value::as_object_mut)
			{
				container
					.entry("name")
					.or_insert_with(|| serde_json::Value::String(String::new()));
			}
		}

		let raw: Raw = serde_json::from_value(value)?;
		Ok(Self {
			pod: raw.pod,
			plugin_container: raw.plugin_container.unwrap_or_default(),
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
	/// Upper bound for each API request.
	#[serde(default = "default_http_secs")]
	pub http_secs: u64,
	/// How long a pod may take to become ready.
	#[serde(default = "default_startup_secs")]
	pub startup_secs: u64,
}

impl Timeouts {
	pub fn http(&self) -> Duration {
		Duration::from_secs(self.http_secs)
	}

	pub fn startup(&self) -> Duration {
		Duration::from_secs(self.startup_secs)
	}
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			http_secs: DEFAULT_HTTP_TIMEOUT_SECS,
			startup_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
		}
	}
}

/// How the byte stream is opened once the pod is ready.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum StreamMode {
	/// Attach to the image entrypoint. The container is created with
	/// `stdinOnce`, so the entrypoint sees its stdin held open until the
	/// attach session starts and cannot finish before the caller is connected.
	///
	/// No keep-alive command is installed in this mode: the image's own
	/// process is the one on the other end of the stream, so plugins that
	/// read stdin from their entrypoint work unchanged. The cost is that a
	/// plugin which exits ends the pod with it; use [`StreamMode::Exec`] to
	/// keep the container alive independently of the streamed process.
	#[default]
	Attach,
	/// Replace the entrypoint with a keep-alive loop and run `command` with
	/// its stdin/stdout wired to the stream.
	Exec { command: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachPolicy {
	#[serde(default = "default_attach_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_attach_base_delay_ms")]
	pub base_delay_ms: u64,
}

impl AttachPolicy {
	pub fn retry_config(&self) -> RetryConfig {
		RetryConfig {
			max_attempts: self.max_attempts,
			base_delay: Duration::from_millis(self.base_delay_ms),
			max_delay: ATTACH_MAX_DELAY,
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

impl Default for AttachPolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_ATTACH_ATTEMPTS,
			base_delay_ms: DEFAULT_ATTACH_BASE_DELAY_MS,
		}
	}
}

fn default_api_path() -> String {
	DEFAULT_API_PATH.to_string()
}

fn default_http_secs() -> u64 {
	DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_startup_secs() -> u64 {
	DEFAULT_STARTUP_TIMEOUT_SECS
}

fn default_poll_interval_ms() -> u64 {
	DEFAULT_POLL_INTERVAL_MS
}

fn default_attach_attempts() -> u32 {
	DEFAULT_ATTACH_ATTEMPTS
}

fn default_attach_base_delay_ms() -> u64 {
	DEFAULT_ATTACH_BASE_DELAY_MS
}
