// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory cluster for tests and local experiments.
//!
//! [`MockK8sClient`] keeps pods in a map, advances their status on every
//! `get_pod`, and answers `exec_attach` with an in-process duplex stream
//! driven by a [`Responder`]. Deleting a pod ends its streams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
	ContainerState, ContainerStateWaiting, ContainerStatus, Pod, PodCondition, PodStatus,
};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio_util::sync::CancellationToken;

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::types::{AttachTarget, AttachedProcess};

const STREAM_BUFFER: usize = 64 * 1024;

/// What the fake container does with its stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Responder {
	/// Copy stdin to stdout unchanged.
	#[default]
	Echo,
	/// Answer every line with `This is what input was received: "<line>"`.
	InputReport,
	/// Read and discard stdin; never write.
	Silent,
}

/// How a pod's status evolves as it is polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodScript {
	/// Pending for `polls` status reads, then Running and Ready.
	ReadyAfter(u32),
	/// Pending forever.
	NeverReady,
	/// Phase `Failed` with the given reason.
	Fails { reason: String },
	/// Phase `Succeeded`: the process ran to completion.
	Completes,
	/// Pending with the container stuck waiting for `reason`.
	Waiting { reason: String },
}

impl Default for PodScript {
	fn default() -> Self {
		PodScript::ReadyAfter(0)
	}
}

struct MockPod {
	pod: Pod,
	polls: u32,
	streams: CancellationToken,
}

/// A fake cluster. See the module documentation.
#[derive(Default)]
pub struct MockK8sClient {
	pods: Mutex<HashMap<String, MockPod>>,
	created: Mutex<Vec<Pod>>,
	script: PodScript,
	responder: Responder,
	reject_create: Option<(u16, String)>,
	reject_delete: Option<(u16, String)>,
	create_latency: Option<Duration>,
	delete_latency: Option<Duration>,
	attach_failures: AtomicU32,
	create_calls: AtomicU32,
	get_calls: AtomicU32,
	delete_calls: AtomicU32,
	attach_calls: AtomicU32,
}

fn key(namespace: &str, name: &str) -> String {
	format!("{namespace}/{name}")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockK8sClient {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_script(mut self, script: PodScript) -> Self {
		self.script = script;
		self
	}

	pub fn with_responder(mut self, responder: Responder) -> Self {
		self.responder = responder;
		self
	}

	/// Reject every `create_pod` with the given API status.
	pub fn reject_creates(mut self, code: u16, message: impl Into<String>) -> Self {
		self.reject_create = Some((code, message.into()));
		self
	}

	/// Reject every `delete_pod` with the given API status.
	pub fn reject_deletes(mut self, code: u16, message: impl Into<String>) -> Self {
		self.reject_delete = Some((code, message.into()));
		self
	}

	/// Store the pod, then wait before answering `create_pod`. Models a
	/// request the server accepted but whose response is slow.
	pub fn with_create_latency(mut self, latency: Duration) -> Self {
		self.create_latency = Some(latency);
		self
	}

	/// Wait before removing the pod in `delete_pod`.
	pub fn with_delete_latency(mut self, latency: Duration) -> Self {
		self.delete_latency = Some(latency);
		self
	}

	/// Fail the next `count` attach attempts with a transport error.
	pub fn fail_attaches(self, count: u32) -> Self {
		self.attach_failures.store(count, Ordering::SeqCst);
		self
	}

	pub fn pod_count(&self) -> usize {
		lock(&self.pods).len()
	}

	pub fn pod_names(&self) -> Vec<String> {
		let mut names: Vec<String> = lock(&self.pods)
			.values()
			.filter_map(|p| p.pod.metadata.name.clone())
			.collect();
		names.sort();
		names
	}

	/// Every pod ever submitted, as received.
	pub fn created_pods(&self) -> Vec<Pod> {
		lock(&self.created).clone()
	}

	pub fn create_calls(&self) -> u32 {
		self.create_calls.load(Ordering::SeqCst)
	}

	pub fn get_calls(&self) -> u32 {
		self.get_calls.load(Ordering::SeqCst)
	}

	pub fn delete_calls(&self) -> u32 {
		self.delete_calls.load(Ordering::SeqCst)
	}

	pub fn attach_calls(&self) -> u32 {
		self.attach_calls.load(Ordering::SeqCst)
	}

	fn status_for(&self, pod: &Pod, polls: u32) -> PodStatus {
		let container = pod
			.spec
			.as_ref()
			.and_then(|s| s.containers.first())
			.map(|c| c.name.clone())
			.unwrap_or_default();
		let waiting = |reason: &str| ContainerStatus {
			name: container.clone(),
			image: String::new(),
			image_id: String::new(),
			ready: false,
			restart_count: 0,
			state: Some(ContainerState {
				waiting: Some(ContainerStateWaiting {
					reason: Some(reason.to_string()),
					message: Some(format!("container is waiting: {reason}")),
				}),
				..Default::default()
			}),
			..Default::default()
		};

		match &self.script {
			PodScript::ReadyAfter(n) if polls > *n => PodStatus {
				phase: Some("Running".to_string()),
				conditions: Some(vec![PodCondition {
					type_: "Ready".to_string(),
					status: "True".to_string(),
					..Default::default()
				}]),
				container_statuses: Some(vec![ContainerStatus {
					name: container.clone(),
					ready: true,
					..Default::default()
				}]),
				..Default::default()
			},
			PodScript::ReadyAfter(_) | PodScript::NeverReady => PodStatus {
				phase: Some("Pending".to_string()),
				container_statuses: Some(vec![waiting("ContainerCreating")]),
				..Default::default()
			},
			PodScript::Fails { reason } => PodStatus {
				phase: Some("Failed".to_string()),
				reason: Some(reason.clone()),
				message: Some(format!("pod failed: {reason}")),
				..Default::default()
			},
			PodScript::Completes => PodStatus {
				phase: Some("Succeeded".to_string()),
				..Default::default()
			},
			PodScript::Waiting { reason } => PodStatus {
				phase: Some("Pending".to_string()),
				container_statuses: Some(vec![waiting(reason)]),
				..Default::default()
			},
		}
	}
}

async fn respond(
	responder: Responder,
	stdin: DuplexStream,
	mut stdout: DuplexStream,
	stop: CancellationToken,
) {
	let work = async {
		match responder {
			Responder::Echo => {
				let mut stdin = stdin;
				let _ = tokio::io::copy(&mut stdin, &mut stdout).await;
			}
			Responder::InputReport => {
				let mut lines = BufReader::new(stdin).lines();
				while let Ok(Some(line)) = lines.next_line().await {
					let reply = format!("This is what input was received: \"{line}\"\n");
					if stdout.write_all(reply.as_bytes()).await.is_err() {
						break;
					}
				}
			}
			Responder::Silent => {
				let mut stdin = stdin;
				let _ = tokio::io::copy(&mut stdin, &mut tokio::io::sink()).await;
			}
		}
		let _ = stdout.shutdown().await;
	};
	tokio::select! {
		_ = stop.cancelled() => {}
		_ = work => {}
	}
}

#[async_trait]
impl K8sClient for MockK8sClient {
	async fn create_pod(&self, namespace: &str, mut pod: Pod) -> Result<Pod, K8sError> {
		self.create_calls.fetch_add(1, Ordering::SeqCst);
		lock(&self.created).push(pod.clone());

		if let Some((code, message)) = &self.reject_create {
			return Err(K8sError::Api {
				code: *code,
				message: message.clone(),
			});
		}

		let name = match (&pod.metadata.name, &pod.metadata.generate_name) {
			(Some(name), _) => name.clone(),
			(None, Some(prefix)) => format!("{prefix}{}", fastrand::u32(10_000..100_000)),
			(None, None) => {
				return Err(K8sError::Api {
					code: 422,
					message: "metadata.name: Required value".to_string(),
				})
			}
		};
		pod.metadata.name = Some(name.clone());
		pod.metadata.namespace = Some(namespace.to_string());
		pod.metadata.uid = Some(format!("{:032x}", fastrand::u128(..)));
		pod.status = Some(PodStatus {
			phase: Some("Pending".to_string()),
			..Default::default()
		});

		{
			let mut pods = lock(&self.pods);
			let key = key(namespace, &name);
			if pods.contains_key(&key) {
				return Err(K8sError::Api {
					code: 409,
					message: format!("pods \"{name}\" already exists"),
				});
			}
			pods.insert(
				key,
				MockPod {
					pod: pod.clone(),
					polls: 0,
					streams: CancellationToken::new(),
				},
			);
		}

		if let Some(latency) = self.create_latency {
			tokio::time::sleep(latency).await;
		}
		Ok(pod)
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		self.get_calls.fetch_add(1, Ordering::SeqCst);
		let mut pods = lock(&self.pods);
		let entry = pods
			.get_mut(&key(namespace, name))
			.ok_or_else(|| K8sError::PodNotFound {
				name: name.to_string(),
			})?;
		entry.polls += 1;
		let status = self.status_for(&entry.pod, entry.polls);
		entry.pod.status = Some(status);
		Ok(entry.pod.clone())
	}

	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		_grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		self.delete_calls.fetch_add(1, Ordering::SeqCst);
		if let Some(latency) = self.delete_latency {
			tokio::time::sleep(latency).await;
		}
		if let Some((code, message)) = &self.reject_delete {
			return Err(K8sError::Api {
				code: *code,
				message: message.clone(),
			});
		}
		match lock(&self.pods).remove(&key(namespace, name)) {
			Some(removed) => {
				removed.streams.cancel();
				Ok(())
			}
			None => Err(K8sError::PodNotFound {
				name: name.to_string(),
			}),
		}
	}

	async fn exec_attach(
		&self,
		name: &str,
		namespace: &str,
		_container: &str,
		_target: &AttachTarget,
	) -> Result<AttachedProcess, K8sError> {
		self.attach_calls.fetch_add(1, Ordering::SeqCst);
		let stop = lock(&self.pods)
			.get(&key(namespace, name))
			.map(|p| p.streams.clone())
			.ok_or_else(|| K8sError::PodNotFound {
				name: name.to_string(),
			})?;

		let remaining = self.attach_failures.load(Ordering::SeqCst);
		if remaining > 0 {
			self.attach_failures.store(remaining - 1, Ordering::SeqCst);
			return Err(K8sError::AttachError {
				message: "container not ready for attach".to_string(),
			});
		}

		let (stdin_client, stdin_server) = duplex(STREAM_BUFFER);
		let (stdout_server, stdout_client) = duplex(STREAM_BUFFER);
		tokio::spawn(respond(self.responder, stdin_server, stdout_server, stop));

		Ok(AttachedProcess {
			stdin: Box::pin(stdin_client),
			stdout: Box::pin(stdout_client),
		})
	}
}
