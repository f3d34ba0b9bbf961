// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The live handle on an attached pod.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use skein_deployer::{CloseOutcome, Container, DeployerError, DeployerResult};
use skein_k8s::{AttachedProcess, K8sClient};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::lifecycle::{Lifecycle, PodEvent, PodState};
use crate::manifest::PodIdentity;

/// How long `close` waits for the stdin half to shut down before dropping it.
const STDIN_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

type Writer = Pin<Box<dyn AsyncWrite + Send>>;
type Reader = Pin<Box<dyn AsyncRead + Send>>;

/// A deployed pod exposed as a byte stream.
///
/// Each direction sits behind its own async mutex so one task can write while
/// another reads. `close` fires the shutdown token before taking either lock,
/// which makes in-flight calls fail with [`DeployerError::Stream`] instead of
/// holding the lock forever. Close is single-flight: a caller that arrives
/// while another close is deleting the pod waits for it before reporting
/// [`CloseOutcome::AlreadyClosed`].
pub struct PodStream {
	inner: Arc<Shared>,
}

struct Shared {
	identity: PodIdentity,
	client: Arc<dyn K8sClient>,
	stdin: tokio::sync::Mutex<Option<Writer>>,
	stdout: tokio::sync::Mutex<Option<Reader>>,
	shutdown: CancellationToken,
	closed: AtomicBool,
	closing: tokio::sync::Mutex<()>,
	grace_period_secs: u32,
	lifecycle: Mutex<Lifecycle>,
}

impl PodStream {
	pub(crate) fn new(
		identity: PodIdentity,
		client: Arc<dyn K8sClient>,
		process: AttachedProcess,
		lifecycle: Lifecycle,
		grace_period_secs: u32,
	) -> Self {
		Self {
			inner: Arc::new(Shared {
				identity,
				client,
				stdin: tokio::sync::Mutex::new(Some(process.stdin)),
				stdout: tokio::sync::Mutex::new(Some(process.stdout)),
				shutdown: CancellationToken::new(),
				closed: AtomicBool::new(false),
				closing: tokio::sync::Mutex::new(()),
				grace_period_secs,
				lifecycle: Mutex::new(lifecycle),
			}),
		}
	}

	pub fn identity(&self) -> &PodIdentity {
		&self.inner.identity
	}

	pub fn state(&self) -> PodState {
		self.inner.lifecycle().state()
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	/// Shut down stdin so the container sees end of input. Stdout stays
	/// readable until the container exits or the handle is closed.
	pub async fn close_stdin(&self) -> DeployerResult<()> {
		let shared = &self.inner;
		let stdin = tokio::select! {
			biased;
			_ = shared.shutdown.cancelled() => return Err(shared.stream_error("stream closed")),
			mut guard = shared.stdin.lock() => guard.take(),
		};
		match stdin {
			Some(mut stdin) => stdin
				.shutdown()
				.await
				.map_err(|e| shared.stream_error(format!("failed to close stdin: {e}"))),
			None => Ok(()),
		}
	}

	/// Close this handle once `cancel` fires. The watcher holds only a weak
	/// reference and exits when the handle is closed another way.
	pub(crate) fn close_on_cancel(&self, cancel: CancellationToken) {
		let weak: Weak<Shared> = Arc::downgrade(&self.inner);
		let shutdown = self.inner.shutdown.clone();
		tokio::spawn(async move {
			tokio::select! {
				_ = shutdown.cancelled() => {}
				_ = cancel.cancelled() => {
					if let Some(shared) = weak.upgrade() {
						debug!(pod = %shared.identity.name, "Deploy token cancelled, closing stream");
						shared.close().await;
					}
				}
			}
		});
	}
}

impl std::fmt::Debug for PodStream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PodStream")
			.field("identity", &self.inner.identity)
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}

impl Shared {
	fn lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
		self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn stream_error(&self, message: impl Into<String>) -> DeployerError {
		DeployerError::Stream {
			pod: self.identity.name.clone(),
			message: message.into(),
		}
	}

	fn closed_error(&self) -> DeployerError {
		self.stream_error("stream closed")
	}

	async fn write(&self, buf: &[u8]) -> DeployerResult<usize> {
		if self.closed.load(Ordering::Acquire) {
			return Err(self.closed_error());
		}
		tokio::select! {
			biased;
			_ = self.shutdown.cancelled() => Err(self.closed_error()),
			result = async {
				let mut guard = self.stdin.lock().await;
				let stdin = guard
					.as_mut()
					.ok_or_else(|| self.stream_error("stdin already closed"))?;
				let n = stdin
					.write(buf)
					.await
					.map_err(|e| self.stream_error(format!("write failed: {e}")))?;
				stdin
					.flush()
					.await
					.map_err(|e| self.stream_error(format!("flush failed: {e}")))?;
				Ok(n)
			} => result,
		}
	}

	async fn read(&self, buf: &mut [u8]) -> DeployerResult<usize> {
		if self.closed.load(Ordering::Acquire) {
			return Err(self.closed_error());
		}
		tokio::select! {
			biased;
			_ = self.shutdown.cancelled() => Err(self.closed_error()),
			result = async {
				let mut guard = self.stdout.lock().await;
				match guard.as_mut() {
					Some(stdout) => stdout
						.read(buf)
						.await
						.map_err(|e| self.stream_error(format!("read failed: {e}"))),
					None => Err(self.closed_error()),
				}
			} => result,
		}
	}

	async fn close(&self) -> CloseOutcome {
		// Held until the delete has returned.
		let _closing = self.closing.lock().await;
		if self.closed.swap(true, Ordering::AcqRel) {
			return CloseOutcome::AlreadyClosed;
		}
		self.shutdown.cancel();

		let stdin = self.stdin.lock().await.take();
		if let Some(mut stdin) = stdin {
			match tokio::time::timeout(STDIN_SHUTDOWN_TIMEOUT, stdin.shutdown()).await {
				Ok(Ok(())) => {}
				Ok(Err(e)) => debug!(pod = %self.identity.name, error = %e, "stdin shutdown failed"),
				Err(_) => debug!(pod = %self.identity.name, "stdin shutdown timed out"),
			}
		}
		drop(self.stdout.lock().await.take());

		let PodIdentity {
			name, namespace, ..
		} = &self.identity;
		let outcome = match self
			.client
			.delete_pod(name, namespace, self.grace_period_secs)
			.await
		{
			Ok(()) => {
				info!(pod = %name, namespace = %namespace, "Pod deleted");
				CloseOutcome::Closed
			}
			Err(e) if e.is_not_found() => {
				debug!(pod = %name, namespace = %namespace, "Pod already gone");
				CloseOutcome::Closed
			}
			Err(e) => {
				warn!(pod = %name, namespace = %namespace, error = %e, "Failed to delete pod");
				CloseOutcome::CleanupPending(DeployerError::Cleanup {
					pod: name.clone(),
					message: e.to_string(),
				})
			}
		};

		let mut lifecycle = self.lifecycle();
		if let Err(e) = lifecycle.advance(PodEvent::Close) {
			debug!(pod = %name, error = %e, "Ignoring close transition");
		}
		if outcome.is_clean() {
			lifecycle.mark_deleted();
		}
		outcome
	}
}

#[async_trait]
impl Container for PodStream {
	fn id(&self) -> &str {
		&self.inner.identity.name
	}

	async fn write(&self, buf: &[u8]) -> DeployerResult<usize> {
		self.inner.write(buf).await
	}

	async fn read(&self, buf: &mut [u8]) -> DeployerResult<usize> {
		self.inner.read(buf).await
	}

	#[instrument(skip(self), fields(pod = %self.inner.identity.name))]
	async fn close(&self) -> DeployerResult<CloseOutcome> {
		Ok(self.inner.close().await)
	}
}

impl Drop for PodStream {
	fn drop(&mut self) {
		if self.inner.closed.load(Ordering::Acquire) {
			return;
		}
		let shared = Arc::clone(&self.inner);
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				debug!(pod = %shared.identity.name, "Stream dropped without close, cleaning up");
				handle.spawn(async move {
					shared.close().await;
				});
			}
			Err(_) => warn!(
				pod = %shared.identity.name,
				namespace = %shared.identity.namespace,
				"Stream dropped outside a runtime, pod was not deleted"
			),
		}
	}
}
