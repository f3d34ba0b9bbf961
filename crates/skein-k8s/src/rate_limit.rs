// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Client-side request pacing.
//!
//! A single token bucket shared by every request a [`crate::KubeClient`]
//! makes. Callers wait for a token instead of being rejected, so a burst of
//! deploys is smoothed out rather than failed.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Requests per second used when the configured rate is zero.
pub const DEFAULT_QPS: f32 = 5.0;
/// Burst used when the configured burst is zero.
pub const DEFAULT_BURST: u32 = 10;

/// Rate limit settings for API-server requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
	pub qps: f32,
	pub burst: u32,
}

impl RateLimit {
	/// Zero values fall back to [`DEFAULT_QPS`] and [`DEFAULT_BURST`].
	pub fn new(qps: f32, burst: u32) -> Self {
		Self {
			qps: if qps > 0.0 { qps } else { DEFAULT_QPS },
			burst: if burst > 0 { burst } else { DEFAULT_BURST },
		}
	}
}

impl Default for RateLimit {
	fn default() -> Self {
		Self::new(DEFAULT_QPS, DEFAULT_BURST)
	}
}

#[derive(Debug)]
struct TokenBucket {
	tokens: f64,
	last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
	bucket: Mutex<TokenBucket>,
	refill_rate: f64, // tokens per second
	max_tokens: f64,
}

impl RateLimiter {
	pub fn new(limit: RateLimit) -> Self {
		let max_tokens = f64::from(limit.burst.max(1));
		Self {
			bucket: Mutex::new(TokenBucket {
				tokens: max_tokens,
				last_refill: Instant::now(),
			}),
			refill_rate: f64::from(limit.qps).max(f64::MIN_POSITIVE),
			max_tokens,
		}
	}

	/// Wait until a request may be sent.
	pub async fn acquire(&self) {
		loop {
			let wait = {
				let mut bucket = self.bucket.lock().await;
				let now = Instant::now();
				let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
				bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens);
				bucket.last_refill = now;

				if bucket.tokens >= 1.0 {
					bucket.tokens -= 1.0;
					return;
				}
				Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_rate)
			};
			tracing::trace!(wait_ms = wait.as_millis() as u64, "rate limited, waiting for token");
			tokio::time::sleep(wait).await;
		}
	}

	/// Tokens currently available, rounded down.
	pub async fn available(&self) -> u32 {
		let bucket = self.bucket.lock().await;
		let elapsed = Instant::now().duration_since(bucket.last_refill).as_secs_f64();
		(bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens) as u32
	}
}
