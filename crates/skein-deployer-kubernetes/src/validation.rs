// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Semantic checks on a deserialized [`Config`].
//!
//! Kubernetes models many fields as free-form strings that only accept a
//! fixed set of constants. Those are checked here so a typo fails before any
//! cluster call, with the JSON path of the offending field.

use http::header::HeaderValue;
use http::Uri;
use skein_k8s::{AppArmorProfile, PodSecurityContext, SeccompProfile, SecurityContext};

use crate::config::{Config, Connection, PodTemplate, StreamMode};
use crate::error::ConfigError;

const PROFILE_TYPES: &[&str] = &["RuntimeDefault", "Unconfined", "Localhost"];
const RESTART_POLICIES: &[&str] = &["Always", "OnFailure", "Never"];
const IMAGE_PULL_POLICIES: &[&str] = &["Always", "IfNotPresent", "Never"];
const PROC_MOUNT_TYPES: &[&str] = &["Default", "Unmasked"];
const FS_GROUP_CHANGE_POLICIES: &[&str] = &["OnRootMismatch", "Always"];
const SUPPLEMENTAL_GROUPS_POLICIES: &[&str] = &["Merge", "Strict"];
const DNS_POLICIES: &[&str] = &["ClusterFirst", "ClusterFirstWithHostNet", "Default", "None"];
const PORT_PROTOCOLS: &[&str] = &["TCP", "UDP", "SCTP"];

const MAX_DNS_LABEL: usize = 63;
const MAX_DNS_SUBDOMAIN: usize = 253;

pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
	validate_connection(&config.connection)?;

	if config.timeouts.http_secs == 0 {
		return Err(ConfigError::validation("timeouts.httpSecs", "must be greater than zero"));
	}
	if config.timeouts.startup_secs == 0 {
		return Err(ConfigError::validation(
			"timeouts.startupSecs",
			"must be greater than zero",
		));
	}
	if config.poll_interval_ms == 0 {
		return Err(ConfigError::validation("pollIntervalMs", "must be greater than zero"));
	}
	if config.attach.max_attempts == 0 {
		return Err(ConfigError::validation("attach.maxAttempts", "must be at least 1"));
	}

	if let StreamMode::Exec { command } = &config.stream {
		if command.first().map_or(true, |c| c.is_empty()) {
			return Err(ConfigError::validation(
				"stream.command",
				"exec mode needs a command to run",
			));
		}
	}

	validate_pod_template(&config.pod)
}

fn validate_connection(connection: &Connection) -> Result<(), ConfigError> {
	let host = connection.host.trim();
	if host.is_empty() {
		return Err(ConfigError::validation("connection.host", "must not be empty"));
	}
	let uri: Uri = host
		.parse()
		.map_err(|e| ConfigError::validation("connection.host", format!("invalid URL {host:?}: {e}")))?;
	match uri.scheme_str() {
		Some("http") | Some("https") => {}
		_ => {
			return Err(ConfigError::validation(
				"connection.host",
				format!("{host:?} must start with http:// or https://"),
			))
		}
	}
	if uri.authority().is_none() {
		return Err(ConfigError::validation(
			"connection.host",
			format!("{host:?} has no host name"),
		));
	}

	if !connection.qps.is_finite() || connection.qps < 0.0 {
		return Err(ConfigError::validation(
			"connection.qps",
			format!("must be a non-negative number, got {}", connection.qps),
		));
	}

	match (connection.cert_data.is_empty(), connection.key_data.is_empty()) {
		(false, true) => {
			return Err(ConfigError::validation(
				"connection.keyData",
				"client certificate given without its private key",
			))
		}
		(true, false) => {
			return Err(ConfigError::validation(
				"connection.certData",
				"private key given without its client certificate",
			))
		}
		_ => {}
	}

	if !connection.user_agent.is_empty() && HeaderValue::from_str(&connection.user_agent).is_err() {
		return Err(ConfigError::validation(
			"connection.userAgent",
			"must be a valid HTTP header value",
		));
	}

	if !connection.namespace.is_empty() {
		check_dns_label("connection.namespace", &connection.namespace)?;
	}
	Ok(())
}

/// Check a pod template on its own. Also run by the assembler, so templates
/// built in code get the same checks as deserialized ones.
pub fn validate_pod_template(template: &PodTemplate) -> Result<(), ConfigError> {
	let metadata = &template.metadata;
	if let Some(name) = metadata.name.as_deref().filter(|n| !n.is_empty()) {
		check_dns_subdomain("pod.metadata.name", name)?;
	}
	if let Some(prefix) = metadata.generate_name.as_deref().filter(|n| !n.is_empty()) {
		check_name_chars("pod.metadata.generateName", prefix)?;
	}
	if let Some(namespace) = metadata.namespace.as_deref().filter(|n| !n.is_empty()) {
		check_dns_label("pod.metadata.namespace", namespace)?;
	}

	let spec = &template.spec.pod;
	if !spec.containers.is_empty() {
		return Err(ConfigError::validation(
			"pod.spec.containers",
			"additional containers are not supported; configure pod.spec.pluginContainer",
		));
	}
	one_of("pod.spec.restartPolicy", spec.restart_policy.as_deref(), RESTART_POLICIES)?;
	one_of("pod.spec.dnsPolicy", spec.dns_policy.as_deref(), DNS_POLICIES)?;
	if let Some(ctx) = &spec.security_context {
		check_pod_security_context("pod.spec.securityContext", ctx)?;
	}

	let container = &template.spec.plugin_container;
	let base = "pod.spec.pluginContainer";
	one_of(
		&format!("{base}.imagePullPolicy"),
		container.image_pull_policy.as_deref(),
		IMAGE_PULL_POLICIES,
	)?;
	for (i, port) in container.ports.iter().flatten().enumerate() {
		one_of(
			&format!("{base}.ports[{i}].protocol"),
			port.protocol.as_deref(),
			PORT_PROTOCOLS,
		)?;
	}
	if let Some(ctx) = &container.security_context {
		check_container_security_context(&format!("{base}.securityContext"), ctx)?;
	}
	Ok(())
}

fn check_pod_security_context(path: &str, ctx: &PodSecurityContext) -> Result<(), ConfigError> {
	if let Some(profile) = &ctx.seccomp_profile {
		check_seccomp(&format!("{path}.seccompProfile"), profile)?;
	}
	if let Some(profile) = &ctx.app_armor_profile {
		check_app_armor(&format!("{path}.appArmorProfile"), profile)?;
	}
	one_of(
		&format!("{path}.fsGroupChangePolicy"),
		ctx.fs_group_change_policy.as_deref(),
		FS_GROUP_CHANGE_POLICIES,
	)?;
	one_of(
		&format!("{path}.supplementalGroupsPolicy"),
		ctx.supplemental_groups_policy.as_deref(),
		SUPPLEMENTAL_GROUPS_POLICIES,
	)
}

fn check_container_security_context(path: &str, ctx: &SecurityContext) -> Result<(), ConfigError> {
	if let Some(profile) = &ctx.seccomp_profile {
		check_seccomp(&format!("{path}.seccompProfile"), profile)?;
	}
	if let Some(profile) = &ctx.app_armor_profile {
		check_app_armor(&format!("{path}.appArmorProfile"), profile)?;
	}
	one_of(
		&format!("{path}.procMount"),
		ctx.proc_mount.as_deref(),
		PROC_MOUNT_TYPES,
	)
}

fn check_seccomp(path: &str, profile: &SeccompProfile) -> Result<(), ConfigError> {
	check_profile(path, &profile.type_, profile.localhost_profile.as_deref())
}

fn check_app_armor(path: &str, profile: &AppArmorProfile) -> Result<(), ConfigError> {
	check_profile(path, &profile.type_, profile.localhost_profile.as_deref())
}

fn check_profile(path: &str, kind: &str, localhost: Option<&str>) -> Result<(), ConfigError> {
	one_of(&format!("{path}.type"), Some(kind), PROFILE_TYPES)?;
	let has_localhost = localhost.is_some_and(|p| !p.is_empty());
	match (kind, has_localhost) {
		("Localhost", false) => Err(ConfigError::validation(
			format!("{path}.localhostProfile"),
			"required when type is Localhost",
		)),
		(other, true) if other != "Localhost" => Err(ConfigError::validation(
			format!("{path}.localhostProfile"),
			format!("only allowed when type is Localhost, not {other}"),
		)),
		_ => Ok(()),
	}
}

fn one_of(path: &str, value: Option<&str>, allowed: &[&str]) -> Result<(), ConfigError> {
	match value {
		Some(v) if !allowed.contains(&v) => Err(ConfigError::validation(
			path,
			format!("unsupported value {v:?}; expected one of {}", allowed.join(", ")),
		)),
		_ => Ok(()),
	}
}

fn check_name_chars(path: &str, value: &str) -> Result<(), ConfigError> {
	if value
		.chars()
		.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
	{
		Ok(())
	} else {
		Err(ConfigError::validation(
			path,
			format!("{value:?} may only contain lowercase letters, digits, '-' and '.'"),
		))
	}
}

fn check_dns_subdomain(path: &str, value: &str) -> Result<(), ConfigError> {
	check_name_chars(path, value)?;
	check_edges(path, value, MAX_DNS_SUBDOMAIN)
}

fn check_dns_label(path: &str, value: &str) -> Result<(), ConfigError> {
	if value.contains('.') {
		return Err(ConfigError::validation(path, format!("{value:?} must not contain '.'")));
	}
	check_name_chars(path, value)?;
	check_edges(path, value, MAX_DNS_LABEL)
}

fn check_edges(path: &str, value: &str, max: usize) -> Result<(), ConfigError> {
	if value.len() > max {
		return Err(ConfigError::validation(
			path,
			format!("must be at most {max} characters"),
		));
	}
	let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
	if !alnum(value.chars().next()) || !alnum(value.chars().last()) {
		return Err(ConfigError::validation(
			path,
			format!("{value:?} must start and end with a letter or digit"),
		));
	}
	Ok(())
}
