// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use skein_deployer::{
	Connector, ConnectorFactory, DeployerError, DeployerResult, DeploymentType, FactoryRegistry,
};
use skein_k8s::{K8sClient, KubeClient};
use tracing::{info, instrument};

use crate::config::{
	Config, DEFAULT_API_PATH, DEFAULT_ATTACH_ATTEMPTS, DEFAULT_ATTACH_BASE_DELAY_MS,
	DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_NAMESPACE, DEFAULT_POLL_INTERVAL_MS,
	DEFAULT_STARTUP_TIMEOUT_SECS,
};
use crate::connection::build_connection_params;
use crate::connector::KubernetesConnector;

pub const BACKEND_NAME: &str = "kubernetes";

/// Builds [`KubernetesConnector`]s from JSON configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct KubernetesFactory;

impl KubernetesFactory {
	pub fn new() -> Self {
		Self
	}

	/// Build a connector against a real cluster.
	#[instrument(skip_all, fields(host = %config.connection.host))]
	pub async fn create_connector(&self, config: Config) -> DeployerResult<KubernetesConnector> {
		config.validate()?;
		let params = build_connection_params(&config);
		let client = KubeClient::from_params(&params)
			.await
			.map_err(|e| DeployerError::Config {
				message: format!("failed to build Kubernetes client: {e}"),
			})?;
		info!(
			namespace = %params.namespace,
			auth = params.auth.kind(),
			"Kubernetes connector ready"
		);
		Ok(KubernetesConnector::new(config, Arc::new(client)))
	}

	/// Build a connector on top of an existing client, e.g. a
	/// [`skein_k8s::MockK8sClient`].
	pub fn create_with_client(
		&self,
		config: Config,
		client: Arc<dyn K8sClient>,
	) -> DeployerResult<KubernetesConnector> {
		config.validate()?;
		Ok(KubernetesConnector::new(config, client))
	}
}

#[async_trait]
impl ConnectorFactory for KubernetesFactory {
	fn name(&self) -> &str {
		BACKEND_NAME
	}

	fn deployment_type(&self) -> DeploymentType {
		DeploymentType::IMAGE
	}

	fn config_schema(&self) -> serde_json::Value {
		config_schema()
	}

	async fn create(&self, config: serde_json::Value) -> DeployerResult<Arc<dyn Connector>> {
		let config = Config::from_value(config)?;
		let connector = self.create_connector(config).await?;
		Ok(Arc::new(connector))
	}
}

/// Install the Kubernetes backend in `registry`.
pub fn register(registry: &mut FactoryRegistry) {
	registry.register(Arc::new(KubernetesFactory::new()));
}

fn secret(description: &str) -> serde_json::Value {
	json!({ "type": "string", "writeOnly": true, "description": description })
}

fn config_schema() -> serde_json::Value {
	json!({
		"$schema": "https://json-schema.org/draft/2020-12/schema",
		"title": "Kubernetes deployer",
		"type": "object",
		"required": ["connection"],
		"properties": {
			"connection": {
				"type": "object",
				"required": ["host"],
				"properties": {
					"host": { "type": "string", "format": "uri", "description": "API server URL" },
					"apiPath": { "type": "string", "default": DEFAULT_API_PATH },
					"username": { "type": "string" },
					"password": secret("Basic auth password"),
					"serverName": { "type": "string", "description": "TLS server name override" },
					"certData": { "type": "string", "description": "Client certificate, PEM" },
					"keyData": secret("Client private key, PEM"),
					"caData": { "type": "string", "description": "CA bundle, PEM" },
					"bearerToken": secret("Bearer token"),
					"qps": { "type": "number", "minimum": 0, "description": "0 selects the client default" },
					"burst": { "type": "integer", "minimum": 0, "description": "0 selects the client default" },
					"namespace": { "type": "string", "default": DEFAULT_NAMESPACE },
					"userAgent": { "type": "string" }
				}
			},
			"pod": {
				"type": "object",
				"description": "Partial pod manifest. spec.pluginContainer describes the container running the image.",
				"properties": {
					"metadata": { "type": "object" },
					"spec": { "type": "object" }
				}
			},
			"timeouts": {
				"type": "object",
				"properties": {
					"httpSecs": { "type": "integer", "minimum": 1, "default": DEFAULT_HTTP_TIMEOUT_SECS },
					"startupSecs": { "type": "integer", "minimum": 1, "default": DEFAULT_STARTUP_TIMEOUT_SECS }
				}
			},
			"stream": {
				"oneOf": [
					{
						"type": "object",
						"required": ["mode"],
						"properties": { "mode": { "const": "attach" } }
					},
					{
						"type": "object",
						"required": ["mode", "command"],
						"properties": {
							"mode": { "const": "exec" },
							"command": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
						}
					}
				]
			},
			"attach": {
				"type": "object",
				"properties": {
					"maxAttempts": { "type": "integer", "minimum": 1, "default": DEFAULT_ATTACH_ATTEMPTS },
					"baseDelayMs": { "type": "integer", "minimum": 0, "default": DEFAULT_ATTACH_BASE_DELAY_MS }
				}
			},
			"pollIntervalMs": { "type": "integer", "minimum": 1, "default": DEFAULT_POLL_INTERVAL_MS },
			"deleteGracePeriodSecs": { "type": "integer", "minimum": 0, "default": 0 }
		}
	})
}
