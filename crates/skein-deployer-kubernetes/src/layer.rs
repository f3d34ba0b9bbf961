// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration as produced by a single source.
//!
//! Every field is optional; [`ConfigLayer::merge`] lets a later layer
//! override what an earlier one set, and [`ConfigLayer::finalize`] fills the
//! gaps with defaults and validates the result.

use serde::Deserialize;
use skein_common_secret::SecretString;

use crate::config::{
	AttachPolicy, Config, Connection, PodTemplate, StreamMode, Timeouts, DEFAULT_API_PATH,
	DEFAULT_ATTACH_ATTEMPTS, DEFAULT_ATTACH_BASE_DELAY_MS, DEFAULT_HTTP_TIMEOUT_SECS,
	DEFAULT_POLL_INTERVAL_MS, DEFAULT_STARTUP_TIMEOUT_SECS,
};
use crate::error::ConfigError;

fn merge_option<T>(target: &mut Option<T>, source: Option<T>) {
	if source.is_some() {
		*target = source;
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigLayer {
	pub connection: Option<ConnectionLayer>,
	/// Replaced as a whole; templates are not merged field by field.
	pub pod: Option<PodTemplate>,
	pub timeouts: Option<TimeoutsLayer>,
	pub stream: Option<StreamMode>,
	pub attach: Option<AttachLayer>,
	pub poll_interval_ms: Option<u64>,
	pub delete_grace_period_secs: Option<u32>,
}

impl ConfigLayer {
	pub fn merge(&mut self, other: Self) {
		match (&mut self.connection, other.connection) {
			(Some(current), Some(next)) => current.merge(next),
			(current, next) => merge_option(current, next),
		}
		merge_option(&mut self.pod, other.pod);
		match (&mut self.timeouts, other.timeouts) {
			(Some(current), Some(next)) => current.merge(next),
			(current, next) => merge_option(current, next),
		}
		merge_option(&mut self.stream, other.stream);
		match (&mut self.attach, other.attach) {
			(Some(current), Some(next)) => current.merge(next),
			(current, next) => merge_option(current, next),
		}
		merge_option(&mut self.poll_interval_ms, other.poll_interval_ms);
		merge_option(
			&mut self.delete_grace_period_secs,
			other.delete_grace_period_secs,
		);
	}

	/// Resolve defaults and validate.
	pub fn finalize(self) -> Result<Config, ConfigError> {
		let config = Config {
			connection: self.connection.unwrap_or_default().finalize(),
			pod: self.pod.unwrap_or_default(),
			timeouts: self.timeouts.unwrap_or_default().finalize(),
			stream: self.stream.unwrap_or_default(),
			attach: self.attach.unwrap_or_default().finalize(),
			poll_interval_ms: self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
			delete_grace_period_secs: self.delete_grace_period_secs.unwrap_or(0),
		};
		config.validate()?;
		Ok(config)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionLayer {
	pub host: Option<String>,
	pub api_path: Option<String>,
	pub username: Option<String>,
	pub password: Option<SecretString>,
	pub server_name: Option<String>,
	pub cert_data: Option<String>,
	pub key_data: Option<SecretString>,
	pub ca_data: Option<String>,
	pub bearer_token: Option<SecretString>,
	pub qps: Option<f32>,
	pub burst: Option<u32>,
	pub namespace: Option<String>,
	pub user_agent: Option<String>,
}

impl ConnectionLayer {
	pub fn merge(&mut self, other: Self) {
		merge_option(&mut self.host, other.host);
		merge_option(&mut self.api_path, other.api_path);
		merge_option(&mut self.username, other.username);
		merge_option(&mut self.password, other.password);
		merge_option(&mut self.server_name, other.server_name);
		merge_option(&mut self.cert_data, other.cert_data);
		merge_option(&mut self.key_data, other.key_data);
		merge_option(&mut self.ca_data, other.ca_data);
		merge_option(&mut self.bearer_token, other.bearer_token);
		merge_option(&mut self.qps, other.qps);
		merge_option(&mut self.burst, other.burst);
		merge_option(&mut self.namespace, other.namespace);
		merge_option(&mut self.user_agent, other.user_agent);
	}

	pub fn finalize(self) -> Connection {
		Connection {
			host: self.host.unwrap_or_default(),
			api_path: self.api_path.unwrap_or_else(|| DEFAULT_API_PATH.to_string()),
			username: self.username.unwrap_or_default(),
			password: self.password.unwrap_or_default(),
			server_name: self.server_name.unwrap_or_default(),
			cert_data: self.cert_data.unwrap_or_default(),
			key_data: self.key_data.unwrap_or_default(),
			ca_data: self.ca_data.unwrap_or_default(),
			bearer_token: self.bearer_token.unwrap_or_default(),
			qps: self.qps.unwrap_or(0.0),
			burst: self.burst.unwrap_or(0),
			namespace: self.namespace.unwrap_or_default(),
			user_agent: self.user_agent.unwrap_or_default(),
		}
	}
}

/// Only the fields a connection actually sets; empty strings are left out so
/// they do not mask a lower layer.
impl From<Connection> for ConnectionLayer {
	fn from(c: Connection) -> Self {
		fn set(s: String) -> Option<String> {
			Some(s).filter(|s| !s.is_empty())
		}
		fn secret(s: SecretString) -> Option<SecretString> {
			Some(s).filter(|s| !s.is_empty())
		}
		Self {
			host: set(c.host),
			api_path: set(c.api_path),
			username: set(c.username),
			password: secret(c.password),
			server_name: set(c.server_name),
			cert_data: set(c.cert_data),
			key_data: secret(c.key_data),
			ca_data: set(c.ca_data),
			bearer_token: secret(c.bearer_token),
			qps: Some(c.qps).filter(|q| *q > 0.0),
			burst: Some(c.burst).filter(|b| *b > 0),
			namespace: set(c.namespace),
			user_agent: set(c.user_agent),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutsLayer {
	pub http_secs: Option<u64>,
	pub startup_secs: Option<u64>,
}

impl TimeoutsLayer {
	pub fn merge(&mut self, other: Self) {
		merge_option(&mut self.http_secs, other.http_secs);
		merge_option(&mut self.startup_secs, other.startup_secs);
	}

	pub fn finalize(self) -> Timeouts {
		Timeouts {
			http_secs: self.http_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
			startup_secs: self.startup_secs.unwrap_or(DEFAULT_STARTUP_TIMEOUT_SECS),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachLayer {
	pub max_attempts: Option<u32>,
	pub base_delay_ms: Option<u64>,
}

impl AttachLayer {
	pub fn merge(&mut self, other: Self) {
		merge_option(&mut self.max_attempts, other.max_attempts);
		merge_option(&mut self.base_delay_ms, other.base_delay_ms);
	}

	pub fn finalize(self) -> AttachPolicy {
		AttachPolicy {
			max_attempts: self.max_attempts.unwrap_or(DEFAULT_ATTACH_ATTEMPTS),
			base_delay_ms: self.base_delay_ms.unwrap_or(DEFAULT_ATTACH_BASE_DELAY_MS),
		}
	}
}
