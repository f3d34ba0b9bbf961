// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mapping between deployer configuration and API-server connection
//! parameters, including import of a context from a kubeconfig file.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use kube::config::{AuthInfo, Kubeconfig};
use secrecy::ExposeSecret;
use skein_common_secret::SecretString;
use skein_k8s::{AuthMode, ConnectionParams, RateLimit, TlsParams};
use tracing::{debug, warn};

use crate::config::{Config, Connection};
use crate::error::ConfigError;

/// Resolve the connection section of `config` into client parameters.
///
/// Credentials are chosen in this order: bearer token, basic auth, client
/// certificate. With none of them set the client connects anonymously.
pub fn build_connection_params(config: &Config) -> ConnectionParams {
	let conn = &config.connection;

	let auth = if !conn.bearer_token.is_empty() {
		AuthMode::BearerToken(conn.bearer_token.clone())
	} else if !conn.username.is_empty() {
		AuthMode::Basic {
			username: conn.username.clone(),
			password: conn.password.clone(),
		}
	} else if !conn.cert_data.is_empty() && !conn.key_data.is_empty() {
		AuthMode::ClientCertificate {
			cert_pem: conn.cert_data.clone(),
			key_pem: conn.key_data.clone(),
		}
	} else {
		AuthMode::Anonymous
	};

	ConnectionParams {
		host: conn.host.clone(),
		api_path: conn.api_path.clone(),
		auth,
		tls: TlsParams {
			ca_pem: non_empty(&conn.ca_data),
			server_name: non_empty(&conn.server_name),
		},
		rate_limit: RateLimit::new(conn.qps, conn.burst),
		timeout: config.timeouts.http(),
		namespace: config.namespace().to_string(),
		user_agent: if conn.user_agent.is_empty() {
			default_user_agent()
		} else {
			conn.user_agent.clone()
		},
	}
}

pub fn default_user_agent() -> String {
	format!("skein/{}", env!("CARGO_PKG_VERSION"))
}

fn non_empty(s: &str) -> Option<String> {
	if s.is_empty() {
		None
	} else {
		Some(s.to_string())
	}
}

/// Read the connection settings of one kubeconfig context.
///
/// `path` defaults to `$KUBECONFIG` or `~/.kube/config`; `context` defaults to
/// the file's current context. File references (`certificate-authority`,
/// `client-key`, `tokenFile`, ...) are read and inlined, relative paths being
/// resolved against the kubeconfig's directory.
pub fn from_kubeconfig(
	path: Option<&Path>,
	context: Option<&str>,
) -> Result<Connection, ConfigError> {
	let kubeconfig = match path {
		Some(path) => Kubeconfig::read_from(path),
		None => Kubeconfig::read(),
	}
	.map_err(|e| kubeconfig_error(e.to_string()))?;
	let base_dir = path.and_then(Path::parent).map(Path::to_path_buf);

	connection_from_kubeconfig(&kubeconfig, context, base_dir.as_deref())
}

fn connection_from_kubeconfig(
	kubeconfig: &Kubeconfig,
	context: Option<&str>,
	base_dir: Option<&Path>,
) -> Result<Connection, ConfigError> {
	let context_name = context
		.or(kubeconfig.current_context.as_deref())
		.filter(|s| !s.is_empty())
		.ok_or_else(|| kubeconfig_error("no context given and no current-context set"))?;

	let context = kubeconfig
		.contexts
		.iter()
		.find(|c| c.name == context_name)
		.and_then(|c| c.context.as_ref())
		.ok_or_else(|| kubeconfig_error(format!("context {context_name:?} not found")))?;

	let cluster_name = context.cluster.as_str();
	if cluster_name.is_empty() {
		return Err(kubeconfig_error(format!(
			"context {context_name:?} names no cluster"
		)));
	}
	let cluster = kubeconfig
		.clusters
		.iter()
		.find(|c| c.name == cluster_name)
		.and_then(|c| c.cluster.as_ref())
		.ok_or_else(|| kubeconfig_error(format!("cluster {cluster_name:?} not found")))?;

	let no_user = AuthInfo::default();
	let user = match context.user.as_deref().filter(|u| !u.is_empty()) {
		Some(user_name) => kubeconfig
			.auth_infos
			.iter()
			.find(|u| u.name == user_name)
			.and_then(|u| u.auth_info.as_ref())
			.ok_or_else(|| kubeconfig_error(format!("user {user_name:?} not found")))?,
		None => &no_user,
	};

	let host = set(&cluster.server)
		.ok_or_else(|| kubeconfig_error(format!("cluster {cluster_name:?} has no server")))?
		.to_string();

	if cluster.insecure_skip_tls_verify.unwrap_or(false) {
		warn!(cluster = cluster_name, "insecure-skip-tls-verify is not supported, verifying anyway");
	}
	if user.exec.is_some() || user.auth_provider.is_some() {
		warn!(
			context = %context_name,
			"credential plugins are not supported, connecting without them"
		);
	}

	let client_key_data = user
		.client_key_data
		.as_ref()
		.map(|key| key.expose_secret().to_string());

	let mut connection = Connection {
		host,
		server_name: set(&cluster.tls_server_name).unwrap_or_default().to_string(),
		ca_data: inline_pem(
			"certificate-authority",
			set(&cluster.certificate_authority_data),
			set(&cluster.certificate_authority),
			base_dir,
		)?
		.unwrap_or_default(),
		cert_data: inline_pem(
			"client-certificate",
			set(&user.client_certificate_data),
			set(&user.client_certificate),
			base_dir,
		)?
		.unwrap_or_default(),
		key_data: inline_pem(
			"client-key",
			set(&client_key_data),
			set(&user.client_key),
			base_dir,
		)?
		.map(SecretString::new)
		.unwrap_or_default(),
		username: set(&user.username).unwrap_or_default().to_string(),
		password: user
			.password
			.as_ref()
			.map(|p| SecretString::from(p.expose_secret()))
			.unwrap_or_default(),
		namespace: set(&context.namespace).unwrap_or_default().to_string(),
		..Default::default()
	};

	let token = user
		.token
		.as_ref()
		.map(|t| t.expose_secret())
		.filter(|t| !t.is_empty());
	if let Some(token) = token {
		connection.bearer_token = token.into();
	} else if let Some(file) = set(&user.token_file) {
		let token = read_file(&resolve(file, base_dir))?;
		connection.bearer_token = SecretString::new(token.trim().to_string());
	}

	debug!(
		context = %context_name,
		cluster = cluster_name,
		host = %connection.host,
		"Imported kubeconfig context"
	);
	Ok(connection)
}

fn set(value: &Option<String>) -> Option<&str> {
	value.as_deref().filter(|s| !s.is_empty())
}

/// Inline base64 data wins over a file reference.
fn inline_pem(
	field: &str,
	data: Option<&str>,
	file: Option<&str>,
	base_dir: Option<&Path>,
) -> Result<Option<String>, ConfigError> {
	if let Some(data) = data {
		let bytes = BASE64
			.decode(data.trim())
			.map_err(|e| kubeconfig_error(format!("{field}-data is not valid base64: {e}")))?;
		let pem = String::from_utf8(bytes)
			.map_err(|_| kubeconfig_error(format!("{field}-data is not valid UTF-8")))?;
		return Ok(Some(pem));
	}
	match file {
		Some(file) => read_file(&resolve(file, base_dir)).map(Some),
		None => Ok(None),
	}
}

fn resolve(file: &str, base_dir: Option<&Path>) -> PathBuf {
	let path = PathBuf::from(file);
	match base_dir {
		Some(base) if path.is_relative() => base.join(path),
		_ => path,
	}
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
	std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
		path: path.to_path_buf(),
		source,
	})
}

fn kubeconfig_error(message: impl Into<String>) -> ConfigError {
	ConfigError::Kubeconfig {
		message: message.into(),
	}
}
