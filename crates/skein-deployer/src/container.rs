// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{DeployerError, DeployerResult};

/// How a [`Container::close`] call ended.
#[derive(Debug)]
pub enum CloseOutcome {
	/// Streams were shut down and the workload was deleted.
	Closed,
	/// The handle had already been closed; nothing was done.
	AlreadyClosed,
	/// Streams were shut down but the workload could not be deleted. It may
	/// linger in the cluster until removed by other means.
	CleanupPending(DeployerError),
}

impl CloseOutcome {
	/// True unless cleanup of the remote workload failed.
	pub fn is_clean(&self) -> bool {
		!matches!(self, CloseOutcome::CleanupPending(_))
	}

	pub fn cleanup_error(&self) -> Option<&DeployerError> {
		match self {
			CloseOutcome::CleanupPending(err) => Some(err),
			_ => None,
		}
	}
}

/// A running container exposed as a bidirectional byte stream.
///
/// Bytes written go to the container's standard input; bytes read come from
/// its standard output. Reads and writes may be issued concurrently from
/// different tasks, but at most one read and one write are in flight at a
/// time. Dropping an in-flight `read` or `write` future cancels it without
/// closing the handle.
#[async_trait]
pub trait Container: Send + Sync {
	/// Identifier of the underlying workload (the pod name for Kubernetes).
	fn id(&self) -> &str;

	/// Write some bytes to stdin. Returns how many were accepted.
	async fn write(&self, buf: &[u8]) -> DeployerResult<usize>;

	/// Read up to `buf.len()` bytes from stdout. `Ok(0)` means end of stream.
	async fn read(&self, buf: &mut [u8]) -> DeployerResult<usize>;

	/// Tear down the streams and delete the workload. Idempotent.
	///
	/// A failed delete does not reopen the streams: it is reported as
	/// [`CloseOutcome::CleanupPending`].
	async fn close(&self) -> DeployerResult<CloseOutcome>;

	async fn write_all(&self, buf: &[u8]) -> DeployerResult<()> {
		let mut remaining = buf;
		while !remaining.is_empty() {
			let n = self.write(remaining).await?;
			if n == 0 {
				return Err(DeployerError::Stream {
					pod: self.id().to_string(),
					message: "stdin accepted zero bytes".to_string(),
				});
			}
			remaining = &remaining[n..];
		}
		Ok(())
	}

	/// Read until end of stream, appending to `out`. Returns the number of
	/// bytes appended.
	async fn read_to_end(&self, out: &mut Vec<u8>) -> DeployerResult<usize> {
		let mut chunk = [0u8; 4096];
		let mut total = 0;
		loop {
			let n = self.read(&mut chunk).await?;
			if n == 0 {
				return Ok(total);
			}
			out.extend_from_slice(&chunk[..n]);
			total += n;
		}
	}

	async fn write_cancellable(
		&self,
		buf: &[u8],
		cancel: &CancellationToken,
	) -> DeployerResult<usize> {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(DeployerError::Cancelled { pod: Some(self.id().to_string()) }),
			result = self.write(buf) => result,
		}
	}

	async fn read_cancellable(
		&self,
		buf: &mut [u8],
		cancel: &CancellationToken,
	) -> DeployerResult<usize> {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(DeployerError::Cancelled { pod: Some(self.id().to_string()) }),
			result = self.read(buf) => result,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	/// Accepts at most `chunk` bytes per write and replays `output` in
	/// `chunk`-sized reads.
	struct Trickle {
		chunk: usize,
		written: Mutex<Vec<u8>>,
		output: Mutex<Vec<u8>>,
	}

	impl Trickle {
		fn new(chunk: usize, output: &[u8]) -> Self {
			Self {
				chunk,
				written: Mutex::new(Vec::new()),
				output: Mutex::new(output.to_vec()),
			}
		}
	}

	#[async_trait]
	impl Container for Trickle {
		fn id(&self) -> &str {
			"trickle"
		}

		async fn write(&self, buf: &[u8]) -> DeployerResult<usize> {
			let n = buf.len().min(self.chunk);
			self.written.lock().unwrap().extend_from_slice(&buf[..n]);
			Ok(n)
		}

		async fn read(&self, buf: &mut [u8]) -> DeployerResult<usize> {
			let mut output = self.output.lock().unwrap();
			let n = output.len().min(buf.len()).min(self.chunk);
			buf[..n].copy_from_slice(&output[..n]);
			output.drain(..n);
			Ok(n)
		}

		async fn close(&self) -> DeployerResult<CloseOutcome> {
			Ok(CloseOutcome::Closed)
		}
	}

	struct Stalled;

	#[async_trait]
	impl Container for Stalled {
		fn id(&self) -> &str {
			"stalled"
		}

		async fn write(&self, _buf: &[u8]) -> DeployerResult<usize> {
			std::future::pending().await
		}

		async fn read(&self, _buf: &mut [u8]) -> DeployerResult<usize> {
			std::future::pending().await
		}

		async fn close(&self) -> DeployerResult<CloseOutcome> {
			Ok(CloseOutcome::AlreadyClosed)
		}
	}

	#[tokio::test]
	async fn write_all_loops_over_short_writes() {
		let c = Trickle::new(3, b"");
		c.write_all(b"abcdefgh").await.unwrap();
		assert_eq!(c.written.lock().unwrap().as_slice(), b"abcdefgh");
	}

	#[tokio::test]
	async fn write_all_rejects_zero_progress() {
		let c = Trickle::new(0, b"");
		let err = c.write_all(b"x").await.unwrap_err();
		assert!(matches!(err, DeployerError::Stream { .. }));
	}

	#[tokio::test]
	async fn read_to_end_collects_all_chunks() {
		let c = Trickle::new(2, b"hello world");
		let mut out = Vec::new();
		let n = c.read_to_end(&mut out).await.unwrap();
		assert_eq!(n, 11);
		assert_eq!(out, b"hello world");
	}

	#[tokio::test]
	async fn cancelled_read_returns_cancelled() {
		let cancel = CancellationToken::new();
		cancel.cancel();
		let mut buf = [0u8; 8];
		let err = Stalled.read_cancellable(&mut buf, &cancel).await.unwrap_err();
		assert!(err.is_cancelled());
		assert_eq!(err.pod(), Some("stalled"));
	}

	#[tokio::test]
	async fn cancelled_write_returns_cancelled() {
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move { trigger.cancel() });
		let err = Stalled.write_cancellable(b"x", &cancel).await.unwrap_err();
		assert!(err.is_cancelled());
	}

	#[test]
	fn close_outcome_cleanliness() {
		assert!(CloseOutcome::Closed.is_clean());
		assert!(CloseOutcome::AlreadyClosed.is_clean());
		let pending = CloseOutcome::CleanupPending(DeployerError::Cleanup {
			pod: "p".to_string(),
			message: "forbidden".to_string(),
		});
		assert!(!pending.is_clean());
		assert!(pending.cleanup_error().is_some());
	}
}
