// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Connection parameters for the API server and their translation into a
//! `kube` client configuration.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::header::{HeaderValue, USER_AGENT};
use kube::config::{KubeConfigOptions, Kubeconfig};
use serde_json::json;
use skein_common_secret::SecretString;

use crate::error::K8sError;
use crate::rate_limit::RateLimit;

/// Name used for the cluster, user and context entries of the generated
/// kubeconfig.
const CONTEXT_NAME: &str = "skein";

/// How the client identifies itself to the API server.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthMode {
	Anonymous,
	Basic {
		username: String,
		password: SecretString,
	},
	BearerToken(SecretString),
	ClientCertificate {
		cert_pem: String,
		key_pem: SecretString,
	},
}

impl AuthMode {
	pub fn kind(&self) -> &'static str {
		match self {
			AuthMode::Anonymous => "anonymous",
			AuthMode::Basic { .. } => "basic",
			AuthMode::BearerToken(_) => "bearer-token",
			AuthMode::ClientCertificate { .. } => "client-certificate",
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsParams {
	/// PEM bundle used to verify the server certificate.
	pub ca_pem: Option<String>,
	/// Overrides the name checked against the server certificate.
	pub server_name: Option<String>,
}

/// Everything needed to talk to one API server. Immutable once a client has
/// been built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
	pub host: String,
	pub api_path: String,
	pub auth: AuthMode,
	pub tls: TlsParams,
	pub rate_limit: RateLimit,
	/// Upper bound for every unary request.
	pub timeout: Duration,
	pub namespace: String,
	pub user_agent: String,
}

impl ConnectionParams {
	/// Cluster URL including any path prefix implied by a non-standard API
	/// path. `""` and `"/api"` mean the server root; `"/proxy/api"` and
	/// `"/proxy"` both mean the server lives under `/proxy`.
	pub fn cluster_url(&self) -> String {
		let host = self.host.trim_end_matches('/');
		let api_path = self.api_path.trim().trim_end_matches('/');
		let prefix = api_path.strip_suffix("/api").unwrap_or(api_path);
		if prefix.is_empty() {
			host.to_string()
		} else if prefix.starts_with('/') {
			format!("{host}{prefix}")
		} else {
			format!("{host}/{prefix}")
		}
	}

	/// Render the parameters as a single-context kubeconfig document.
	pub fn to_kubeconfig(&self) -> Result<Kubeconfig, K8sError> {
		let mut cluster = json!({ "server": self.cluster_url() });
		if let Some(ca) = &self.tls.ca_pem {
			cluster["certificate-authority-data"] = json!(BASE64.encode(ca));
		}
		if let Some(server_name) = &self.tls.server_name {
			cluster["tls-server-name"] = json!(server_name);
		}

		let user = match &self.auth {
			AuthMode::Anonymous => json!({}),
			AuthMode::Basic { username, password } => json!({
				"username": username,
				"password": password.expose(),
			}),
			AuthMode::BearerToken(token) => json!({ "token": token.expose() }),
			AuthMode::ClientCertificate { cert_pem, key_pem } => json!({
				"client-certificate-data": BASE64.encode(cert_pem),
				"client-key-data": BASE64.encode(key_pem.expose()),
			}),
		};

		let document = json!({
			"apiVersion": "v1",
			"kind": "Config",
			"clusters": [{ "name": CONTEXT_NAME, "cluster": cluster }],
			"users": [{ "name": CONTEXT_NAME, "user": user }],
			"contexts": [{
				"name": CONTEXT_NAME,
				"context": {
					"cluster": CONTEXT_NAME,
					"user": CONTEXT_NAME,
					"namespace": self.namespace,
				},
			}],
			"current-context": CONTEXT_NAME,
		});

		serde_json::from_value(document).map_err(|e| K8sError::Config {
			message: format!("failed to build kubeconfig: {e}"),
		})
	}

	/// Build the `kube` client configuration.
	///
	/// Only the connect timeout is set here. Read and write timeouts would
	/// also apply to upgraded attach connections and cut off a quiet plugin,
	/// so both are cleared; unary calls and the attach handshake are bounded
	/// by [`crate::KubeClient`] instead.
	pub async fn to_kube_config(&self) -> Result<kube::Config, K8sError> {
		let kubeconfig = self.to_kubeconfig()?;
		let options = KubeConfigOptions {
			context: Some(CONTEXT_NAME.to_string()),
			..Default::default()
		};
		let mut config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
			.await
			.map_err(|e| K8sError::Config {
				message: e.to_string(),
			})?;

		config.connect_timeout = Some(self.timeout);
		config.read_timeout = None;
		config.write_timeout = None;
		config.default_namespace = self.namespace.clone();
		if !self.user_agent.is_empty() {
			let value = HeaderValue::from_str(&self.user_agent).map_err(|e| K8sError::Config {
				message: format!("invalid user agent {:?}: {e}", self.user_agent),
			})?;
			config.headers.push((USER_AGENT, value));
		}
		Ok(config)
	}
}
