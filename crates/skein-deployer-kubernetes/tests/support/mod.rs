// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared fixtures for the deployer integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use skein_deployer::{CloseOutcome, Container};
use skein_deployer_kubernetes::{Config, KubernetesConnector, KubernetesFactory};
use skein_k8s::MockK8sClient;

pub const TEST_IMAGE: &str = "quay.io/joconnel/io-test-script";

/// A config with short intervals so tests run in milliseconds.
pub fn fast_config() -> Config {
	let mut config = Config::new("https://127.0.0.1:6443");
	config.poll_interval_ms = 5;
	config.attach.base_delay_ms = 1;
	config
}

pub fn connector_with(client: Arc<MockK8sClient>, config: Config) -> KubernetesConnector {
	KubernetesFactory::new()
		.create_with_client(config, client)
		.expect("valid test config")
}

pub fn connector(client: Arc<MockK8sClient>) -> KubernetesConnector {
	connector_with(client, fast_config())
}

/// Read until `expected` bytes have arrived or the stream ends.
pub async fn read_exactly(container: &dyn Container, expected: usize) -> Vec<u8> {
	let mut out = Vec::new();
	let mut buf = [0u8; 256];
	while out.len() < expected {
		let n = tokio::time::timeout(Duration::from_secs(5), container.read(&mut buf))
			.await
			.expect("read timed out")
			.expect("read failed");
		if n == 0 {
			break;
		}
		out.extend_from_slice(&buf[..n]);
	}
	out
}

pub async fn close_clean(container: &dyn Container) {
	let outcome = container.close().await.expect("close");
	assert!(matches!(outcome, CloseOutcome::Closed), "unexpected outcome {outcome:?}");
}
