// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
	api::{Api, AttachParams, DeleteParams, PostParams},
	Client,
};
use tracing::{debug, instrument};

use crate::client::K8sClient;
use crate::connection::ConnectionParams;
use crate::error::K8sError;
use crate::rate_limit::{RateLimit, RateLimiter};
use crate::types::{AttachTarget, AttachedProcess};

/// Production K8s client implementation using the kube crate.
///
/// Every request first takes a token from the shared [`RateLimiter`]. Unary
/// calls are bounded by the configured request timeout.
pub struct KubeClient {
	client: Client,
	limiter: RateLimiter,
	timeout: Duration,
}

impl KubeClient {
	/// Build a client from explicit connection parameters.
	pub async fn from_params(params: &ConnectionParams) -> Result<Self, K8sError> {
		let config = params.to_kube_config().await?;
		let client = Client::try_from(config).map_err(|e| K8sError::Config {
			message: e.to_string(),
		})?;
		debug!(
			cluster_url = %params.cluster_url(),
			auth = params.auth.kind(),
			qps = params.rate_limit.qps,
			burst = params.rate_limit.burst,
			"K8s client initialized"
		);
		Ok(Self::with_client(client, params.rate_limit, params.timeout))
	}

	/// Wrap an already configured `kube` client.
	pub fn with_client(client: Client, rate_limit: RateLimit, timeout: Duration) -> Self {
		Self {
			client,
			limiter: RateLimiter::new(rate_limit),
			timeout,
		}
	}

	fn pods(&self, namespace: &str) -> Api<Pod> {
		Api::namespaced(self.client.clone(), namespace)
	}

	async fn bounded<T, F>(&self, request: F) -> Result<T, K8sError>
	where
		F: Future<Output = Result<T, kube::Error>>,
	{
		self.limiter.acquire().await;
		match tokio::time::timeout(self.timeout, request).await {
			Ok(result) => result.map_err(K8sError::from),
			Err(_) => Err(K8sError::Timeout),
		}
	}
}

fn not_found_as_pod(err: K8sError, name: &str) -> K8sError {
	if err.is_not_found() {
		K8sError::PodNotFound { name: name.into() }
	} else {
		err
	}
}

#[async_trait]
impl K8sClient for KubeClient {
	#[instrument(skip(self, pod), fields(pod = pod.metadata.name.as_deref().unwrap_or_default()))]
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError> {
		let pods = self.pods(namespace);
		self.bounded(pods.create(&PostParams::default(), &pod)).await
	}

	#[instrument(skip(self))]
	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		let pods = self.pods(namespace);
		self.bounded(pods.get(name))
			.await
			.map_err(|e| not_found_as_pod(e, name))
	}

	#[instrument(skip(self))]
	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		let pods = self.pods(namespace);
		let dp = DeleteParams {
			grace_period_seconds: Some(grace_period_seconds),
			..Default::default()
		};
		self.bounded(pods.delete(name, &dp))
			.await
			.map(|_| ())
			.map_err(|e| not_found_as_pod(e, name))
	}

	#[instrument(skip(self))]
	async fn exec_attach(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
		target: &AttachTarget,
	) -> Result<AttachedProcess, K8sError> {
		let pods = self.pods(namespace);
		let ap = AttachParams {
			container: Some(container.to_string()),
			stdin: true,
			stdout: true,
			stderr: false,
			tty: false,
			..Default::default()
		};

		let open = async {
			match target {
				AttachTarget::Attach => pods.attach(name, &ap).await,
				AttachTarget::Exec(command) => pods.exec(name, command.clone(), &ap).await,
			}
		};

		let mut attached = self.bounded(open).await.map_err(|e| match e {
			e if e.is_not_found() => K8sError::PodNotFound { name: name.into() },
			K8sError::Timeout => K8sError::Timeout,
			other => K8sError::AttachError {
				message: other.to_string(),
			},
		})?;

		let stdin = attached.stdin().ok_or_else(|| K8sError::AttachError {
			message: "stdin not available".into(),
		})?;
		let stdout = attached.stdout().ok_or_else(|| K8sError::AttachError {
			message: "stdout not available".into(),
		})?;
		debug!(pod = %name, "attached to container streams");

		Ok(AttachedProcess {
			stdin: Box::pin(stdin),
			stdout: Box::pin(stdout),
		})
	}
}
