// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deployment orchestration: submit the pod, wait for it to become ready,
//! attach to it, and hand back a [`PodStream`].

use std::sync::Arc;

use async_trait::async_trait;
use skein_deployer::{Connector, Container, DeployerError, DeployerResult};
use skein_k8s::{retry, AttachedProcess, K8sClient, K8sError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Span};

use crate::config::Config;
use crate::lifecycle::{observe, Lifecycle, Observation, PodEvent, PodState};
use crate::manifest::{AssembledPod, PodAssembler, PodIdentity};
use crate::stream::PodStream;

/// A configured Kubernetes backend. Cheap to share; every deploy creates its
/// own pod.
pub struct KubernetesConnector {
	client: Arc<dyn K8sClient>,
	config: Arc<Config>,
	assembler: PodAssembler,
}

impl KubernetesConnector {
	pub fn new(config: Config, client: Arc<dyn K8sClient>) -> Self {
		let assembler = PodAssembler::new(config.namespace(), config.stream.clone());
		Self {
			client,
			config: Arc::new(config),
			assembler,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Like [`Connector::deploy`], returning the concrete stream type.
	#[instrument(skip(self, cancel), fields(pod = tracing::field::Empty, namespace = tracing::field::Empty))]
	pub async fn deploy_pod(&self, image: &str, cancel: CancellationToken) -> DeployerResult<PodStream> {
		if cancel.is_cancelled() {
			return Err(DeployerError::Cancelled { pod: None });
		}

		let assembled = self.assembler.assemble(&self.config.pod, image)?;
		let mut identity = assembled.identity.clone();
		Span::current()
			.record("pod", identity.name.as_str())
			.record("namespace", identity.namespace.as_str());

		let mut lifecycle = Lifecycle::new();
		let result = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(DeployerError::Cancelled {
				pod: Some(assembled.identity.name.clone()),
			}),
			result = self.provision(&assembled, &mut identity, &mut lifecycle) => result,
		};

		match result {
			Ok(process) => {
				info!(uid = identity.uid.as_deref().unwrap_or_default(), "Pod attached");
				let stream = PodStream::new(
					identity,
					Arc::clone(&self.client),
					process,
					lifecycle,
					self.config.delete_grace_period_secs,
				);
				stream.close_on_cancel(cancel);
				Ok(stream)
			}
			Err(err) => {
				warn!(error = %err, "Deploy failed");
				self.abort(&identity, &mut lifecycle, &err).await;
				Err(err)
			}
		}
	}

	async fn provision(
		&self,
		assembled: &AssembledPod,
		identity: &mut PodIdentity,
		lifecycle: &mut Lifecycle,
	) -> DeployerResult<AttachedProcess> {
		let name = identity.name.clone();
		let namespace = identity.namespace.clone();

		transition(lifecycle, PodEvent::Submit);
		let created = match self.client.create_pod(&namespace, assembled.pod.clone()).await {
			Ok(pod) => pod,
			Err(e) => {
				// An API status means the server refused the pod. Anything else
				// leaves open whether it was stored.
				let event = if matches!(e, K8sError::Api { .. }) {
					PodEvent::Rejected
				} else {
					PodEvent::Fail
				};
				transition(lifecycle, event);
				return Err(DeployerError::Deployment {
					pod: name,
					message: e.to_string(),
				});
			}
		};
		identity.uid = created.metadata.uid;
		transition(lifecycle, PodEvent::Accepted);
		info!("Pod created");

		self.wait_ready(&name, &namespace, &assembled.container, lifecycle)
			.await?;

		let client = self.client.as_ref();
		let (pod, ns, container, target) = (
			name.as_str(),
			namespace.as_str(),
			assembled.container.as_str(),
			&assembled.target,
		);
		let process = retry(&self.config.attach.retry_config(), move |attempt| {
			debug!(attempt, "Opening stream");
			client.exec_attach(pod, ns, container, target)
		})
		.await
		.map_err(|(e, attempts)| DeployerError::Attach {
			pod: name.clone(),
			attempts,
			message: e.to_string(),
		})?;
		transition(lifecycle, PodEvent::Attached);

		Ok(process)
	}

	async fn wait_ready(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
		lifecycle: &mut Lifecycle,
	) -> DeployerResult<()> {
		let startup = self.config.timeouts.startup();
		let poll = self.config.poll_interval();
		let deadline = Instant::now() + startup;
		let timed_out = || DeployerError::StartupTimeout {
			pod: name.to_string(),
			timeout: startup,
		};

		loop {
			let polled = tokio::time::timeout_at(deadline, self.client.get_pod(name, namespace))
				.await
				.map_err(|_| timed_out())?;

			match polled {
				Ok(pod) => match observe(&pod, container) {
					Observation::Ready => {
						transition(lifecycle, PodEvent::BecameReady);
						return Ok(());
					}
					Observation::Failed(reason) => {
						return Err(DeployerError::PodFailed {
							pod: name.to_string(),
							reason,
						});
					}
					Observation::Pending { scheduled } => {
						if scheduled && lifecycle.state() == PodState::Created {
							transition(lifecycle, PodEvent::Scheduled);
						}
					}
				},
				Err(e) if e.is_not_found() => {
					return Err(DeployerError::PodFailed {
						pod: name.to_string(),
						reason: "pod was deleted before it became ready".to_string(),
					});
				}
				Err(e) => warn!(error = %e, "Failed to poll pod status, will retry"),
			}

			let now = Instant::now();
			if now >= deadline {
				return Err(timed_out());
			}
			tokio::time::sleep(poll.min(deadline - now)).await;
		}
	}

	/// Record the failure and delete the pod if it may exist.
	async fn abort(&self, identity: &PodIdentity, lifecycle: &mut Lifecycle, err: &DeployerError) {
		if !lifecycle.state().is_terminal() {
			let event = match err {
				DeployerError::Cancelled { .. } => PodEvent::Cancel,
				DeployerError::StartupTimeout { .. } => PodEvent::TimeOut,
				_ => PodEvent::Fail,
			};
			transition(lifecycle, event);
		}
		if !lifecycle.requires_cleanup() {
			return;
		}

		match self
			.client
			.delete_pod(
				&identity.name,
				&identity.namespace,
				self.config.delete_grace_period_secs,
			)
			.await
		{
			Ok(()) => {
				info!("Deleted pod of failed deploy");
				lifecycle.mark_deleted();
			}
			Err(e) if e.is_not_found() => lifecycle.mark_deleted(),
			Err(e) => warn!(
				error = %e,
				"Failed to delete pod of failed deploy, it may be left behind"
			),
		}
	}
}

fn transition(lifecycle: &mut Lifecycle, event: PodEvent) {
	if let Err(e) = lifecycle.advance(event) {
		warn!(error = %e, "Unexpected pod lifecycle event");
	}
}

#[async_trait]
impl Connector for KubernetesConnector {
	async fn deploy(
		&self,
		image: &str,
		cancel: CancellationToken,
	) -> DeployerResult<Box<dyn Container>> {
		let stream = self.deploy_pod(image, cancel).await?;
		Ok(Box::new(stream))
	}
}
