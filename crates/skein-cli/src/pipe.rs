// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Copies local stdin into the pod and the pod's stdout back out.

use anyhow::{Context, Result};
use skein_deployer::{CancellationToken, Container};
use skein_deployer_kubernetes::PodStream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const CHUNK: usize = 8 * 1024;

/// How a [`pump`] run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
	/// The container closed its stdout.
	Finished { received: u64 },
	/// The cancel token fired first.
	Interrupted,
}

/// Run until the container's stdout ends or `cancel` fires.
///
/// Local end of input closes the container's stdin; output keeps flowing
/// until the container closes its side.
pub async fn pump<R, W>(
	stream: &PodStream,
	mut input: R,
	mut output: W,
	cancel: &CancellationToken,
) -> Result<PumpEnd>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let upload = async {
		let mut buf = vec![0u8; CHUNK];
		let mut sent = 0u64;
		loop {
			let n = input.read(&mut buf).await.context("reading local input")?;
			if n == 0 {
				break;
			}
			stream.write_all(&buf[..n]).await?;
			sent += n as u64;
		}
		debug!(sent, "local input exhausted, closing container stdin");
		stream.close_stdin().await?;
		Ok::<_, anyhow::Error>(())
	};

	let download = async {
		let mut buf = vec![0u8; CHUNK];
		let mut received = 0u64;
		loop {
			let n = stream.read(&mut buf).await?;
			if n == 0 {
				return Ok::<_, anyhow::Error>(received);
			}
			output
				.write_all(&buf[..n])
				.await
				.context("writing local output")?;
			output.flush().await.context("flushing local output")?;
			received += n as u64;
		}
	};

	tokio::pin!(upload);
	tokio::pin!(download);
	let mut uploading = true;
	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return Ok(PumpEnd::Interrupted),
			result = &mut download => {
				return Ok(PumpEnd::Finished { received: result? });
			}
			result = &mut upload, if uploading => {
				result?;
				uploading = false;
			}
		}
	}
}
