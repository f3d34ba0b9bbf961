// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! End-to-end deploy tests against the in-memory cluster.
//!
//! This suite covers:
//! - Deploy, stream and close without leaking pods
//! - Cancellation before and after the pod is ready
//! - Startup failures (timeout, failed pod, fatal waiting reasons)
//! - Attach retries and cleanup failures

mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use skein_deployer::{CancellationToken, CloseOutcome, Connector, Container, DeployerError};
use skein_deployer_kubernetes::{KubernetesFactory, StreamMode};
use skein_k8s::{MockK8sClient, PodScript, Responder};
use support::{close_clean, connector, connector_with, fast_config, read_exactly, TEST_IMAGE};

/// Purpose: a deploy followed by close leaves nothing behind on the cluster.
#[tokio::test]
async fn test_deploy_then_close_leaves_no_pod() {
	let client = Arc::new(MockK8sClient::default());
	let connector = connector(client.clone());

	let container = connector
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.unwrap();
	assert_eq!(client.pod_count(), 1);

	close_clean(&*container).await;
	assert_eq!(client.pod_count(), 0);
	assert_eq!(client.create_calls(), 1);
}

/// Purpose: bytes reach the container in the order they were written.
#[tokio::test]
async fn test_echo_preserves_order() {
	let client = Arc::new(MockK8sClient::default().with_responder(Responder::Echo));
	let container = connector(client)
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.unwrap();

	let mut expected = Vec::new();
	for i in 0..20 {
		let chunk = format!("chunk-{i:02};");
		container.write_all(chunk.as_bytes()).await.unwrap();
		expected.extend_from_slice(chunk.as_bytes());
	}

	let echoed = read_exactly(&*container, expected.len()).await;
	assert_eq!(echoed, expected);
	close_clean(&*container).await;
}

/// Purpose: the reference plugin answers each input line.
#[tokio::test]
async fn test_input_report_scenario() {
	let client = Arc::new(MockK8sClient::default().with_responder(Responder::InputReport));
	let container = connector(client)
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.unwrap();

	container.write_all(b"abc\n").await.unwrap();
	let expected = b"This is what input was received: \"abc\"\n";
	let reply = read_exactly(&*container, expected.len()).await;
	assert_eq!(reply, expected);

	close_clean(&*container).await;
}

/// Purpose: closing twice is harmless and deletes the pod only once.
#[tokio::test]
async fn test_double_close_deletes_once() {
	let client = Arc::new(MockK8sClient::default());
	let container = connector(client.clone())
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.unwrap();

	close_clean(&*container).await;
	let second = container.close().await.unwrap();
	assert!(matches!(second, CloseOutcome::AlreadyClosed));
	assert_eq!(client.delete_calls(), 1);
}

/// Purpose: an out-of-enum seccomp profile type fails before any cluster call.
#[tokio::test]
async fn test_invalid_seccomp_type_never_reaches_cluster() {
	let client = Arc::new(MockK8sClient::default());

	let config = skein_deployer_kubernetes::Config::from_value(json!({
		"connection": { "host": "https://127.0.0.1:6443" },
		"pod": { "spec": { "pluginContainer": {
			"securityContext": { "seccompProfile": { "type": "not_working" } }
		}}}
	}));
	let err = config.unwrap_err();
	assert!(err.to_string().contains("seccompProfile.type"));

	// A template built in code is checked again at deploy time.
	let mut config = fast_config();
	config.pod.spec.plugin_container.security_context = Some(skein_k8s::SecurityContext {
		seccomp_profile: Some(skein_k8s::SeccompProfile {
			type_: "not_working".to_string(),
			localhost_profile: None,
		}),
		..Default::default()
	});
	let connector = skein_deployer_kubernetes::KubernetesConnector::new(config, client.clone());
	let err = connector
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.err()
		.unwrap();
	assert!(matches!(err, DeployerError::Config { .. }));
	assert_eq!(client.create_calls(), 0);
}

/// Purpose: the handle identifier is the pod name, non-empty and stable.
#[tokio::test]
async fn test_id_is_stable_pod_name() {
	let client = Arc::new(MockK8sClient::default());
	let container = connector(client.clone())
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.unwrap();

	let id = container.id().to_string();
	assert!(!id.is_empty());
	assert_eq!(client.pod_names(), vec![id.clone()]);
	container.write_all(b"x").await.unwrap();
	assert_eq!(container.id(), id);

	close_clean(&*container).await;
	assert_eq!(container.id(), id);
}

/// Purpose: cancelling while the pod is still starting removes it.
#[tokio::test]
async fn test_cancel_before_ready_leaves_no_pod() {
	let client = Arc::new(MockK8sClient::default().with_script(PodScript::NeverReady));
	let connector = connector(client.clone());
	let cancel = CancellationToken::new();

	let deploy = {
		let cancel = cancel.clone();
		async move { connector.deploy(TEST_IMAGE, cancel).await }
	};
	let handle = tokio::spawn(deploy);

	while client.get_calls() == 0 {
		tokio::time::sleep(Duration::from_millis(1)).await;
	}
	cancel.cancel();

	let err = handle.await.unwrap().err().unwrap();
	assert!(matches!(err, DeployerError::Cancelled { pod: Some(_) }));
	assert_eq!(client.pod_count(), 0);
}

/// Purpose: an already cancelled token fails fast without touching the cluster.
#[tokio::test]
async fn test_cancelled_token_creates_nothing() {
	let client = Arc::new(MockK8sClient::default());
	let cancel = CancellationToken::new();
	cancel.cancel();

	let err = connector(client.clone())
		.deploy(TEST_IMAGE, cancel)
		.await
		.err()
		.unwrap();
	assert!(matches!(err, DeployerError::Cancelled { pod: None }));
	assert_eq!(client.create_calls(), 0);
}

/// Purpose: cancelling the deploy token after deploy closes the handle.
#[tokio::test]
async fn test_cancel_after_deploy_closes_handle() {
	let client = Arc::new(MockK8sClient::default());
	let cancel = CancellationToken::new();
	let container = connector(client.clone())
		.deploy(TEST_IMAGE, cancel.clone())
		.await
		.unwrap();

	cancel.cancel();
	for _ in 0..100 {
		if client.pod_count() == 0 {
			break;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	assert_eq!(client.pod_count(), 0);
	assert!(matches!(
		container.close().await.unwrap(),
		CloseOutcome::AlreadyClosed
	));
	assert!(container.write(b"late").await.is_err());
}

/// Purpose: close after a cancelled deploy token returns only once the pod
/// is gone, even while the token-triggered close is still deleting it.
#[tokio::test]
async fn test_close_racing_cancel_waits_for_delete() {
	let client = Arc::new(
		MockK8sClient::default().with_delete_latency(Duration::from_millis(200)),
	);
	let cancel = CancellationToken::new();
	let container = connector(client.clone())
		.deploy(TEST_IMAGE, cancel.clone())
		.await
		.unwrap();

	cancel.cancel();
	tokio::time::sleep(Duration::from_millis(20)).await;

	let outcome = container.close().await.unwrap();
	assert!(outcome.is_clean());
	assert_eq!(client.pod_count(), 0, "close returned while the pod still exists");
	assert_eq!(client.delete_calls(), 1);
}

/// Purpose: a pod that never becomes ready times out and is deleted.
#[tokio::test(start_paused = true)]
async fn test_startup_timeout_deletes_pod() {
	let client = Arc::new(MockK8sClient::default().with_script(PodScript::NeverReady));
	let mut config = fast_config();
	config.timeouts.startup_secs = 3;
	config.poll_interval_ms = 500;

	let err = connector_with(client.clone(), config)
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.err()
		.unwrap();

	match err {
		DeployerError::StartupTimeout { timeout, .. } => {
			assert_eq!(timeout, Duration::from_secs(3))
		}
		other => panic!("expected StartupTimeout, got {other:?}"),
	}
	assert_eq!(client.pod_count(), 0);
	assert!(client.get_calls() >= 6);
}

/// Purpose: failed and completed pods surface as PodFailed.
#[tokio::test]
async fn test_failed_pods_are_reported() {
	let scripts = [
		PodScript::Fails {
			reason: "Evicted".to_string(),
		},
		PodScript::Completes,
		PodScript::Waiting {
			reason: "InvalidImageName".to_string(),
		},
	];

	for script in scripts {
		let client = Arc::new(MockK8sClient::default().with_script(script.clone()));
		let err = connector(client.clone())
			.deploy(TEST_IMAGE, CancellationToken::new())
			.await
			.err()
			.unwrap();
		assert!(
			matches!(err, DeployerError::PodFailed { .. }),
			"{script:?} gave {err:?}"
		);
		assert_eq!(client.pod_count(), 0, "{script:?} leaked a pod");
	}
}

/// Purpose: transient attach failures are retried.
#[tokio::test]
async fn test_attach_retries_transient_failures() {
	let client = Arc::new(MockK8sClient::default().fail_attaches(2));
	let container = connector(client.clone())
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.unwrap();
	assert_eq!(client.attach_calls(), 3);
	close_clean(&*container).await;
}

/// Purpose: attach gives up after the configured attempts and cleans up.
#[tokio::test]
async fn test_attach_exhaustion_deletes_pod() {
	let client = Arc::new(MockK8sClient::default().fail_attaches(10));
	let mut config = fast_config();
	config.attach.max_attempts = 2;

	let err = connector_with(client.clone(), config)
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.err()
		.unwrap();

	match err {
		DeployerError::Attach { attempts, .. } => assert_eq!(attempts, 2),
		other => panic!("expected Attach, got {other:?}"),
	}
	assert_eq!(client.attach_calls(), 2);
	assert_eq!(client.pod_count(), 0);
}

/// Purpose: a rejected create is a deployment error.
#[tokio::test]
async fn test_rejected_create() {
	let client = Arc::new(MockK8sClient::default().reject_creates(422, "spec is invalid"));
	let err = connector(client.clone())
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.err()
		.unwrap();
	assert!(matches!(err, DeployerError::Deployment { .. }));
	assert!(err.to_string().contains("spec is invalid"));
}

/// Purpose: a failed delete on close is reported, not raised.
#[tokio::test]
async fn test_cleanup_failure_is_reported() {
	let client = Arc::new(MockK8sClient::default().reject_deletes(500, "etcd unavailable"));
	let container = connector(client.clone())
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.unwrap();

	let outcome = container.close().await.unwrap();
	let err = outcome.cleanup_error().expect("cleanup error");
	assert!(matches!(err, DeployerError::Cleanup { .. }));
	assert!(err.to_string().contains(container.id()));
}

/// Purpose: exec mode replaces the entrypoint and still streams.
#[tokio::test]
async fn test_exec_mode_streams() {
	let client = Arc::new(MockK8sClient::default());
	let mut config = fast_config();
	config.stream = StreamMode::Exec {
		command: vec!["/plugin".to_string()],
	};
	let container = connector_with(client.clone(), config)
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.unwrap();

	let pod = &client.created_pods()[0];
	let command = pod.spec.as_ref().unwrap().containers[0].command.clone().unwrap();
	assert_eq!(command[0], "/bin/sh");

	container.write_all(b"ping\n").await.unwrap();
	assert_eq!(read_exactly(&*container, 5).await, b"ping\n");
	close_clean(&*container).await;
}

/// Purpose: concurrent readers and writers on one handle make progress.
#[tokio::test]
async fn test_concurrent_read_and_write() {
	let client = Arc::new(MockK8sClient::default());
	let container: Arc<dyn Container> = Arc::from(
		connector(client)
			.deploy(TEST_IMAGE, CancellationToken::new())
			.await
			.unwrap(),
	);

	let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
	let writer = {
		let container = Arc::clone(&container);
		let payload = payload.clone();
		tokio::spawn(async move { container.write_all(&payload).await })
	};

	let received = read_exactly(&*container, payload.len()).await;
	writer.await.unwrap().unwrap();
	assert_eq!(received, payload);
	close_clean(&*container).await;
}

/// Purpose: many deploys in parallel each get their own pod.
#[tokio::test]
async fn test_parallel_deploys_get_distinct_pods() {
	let client = Arc::new(MockK8sClient::default());
	let connector = Arc::new(connector(client.clone()));

	let handles: Vec<_> = (0..8)
		.map(|_| {
			let connector = Arc::clone(&connector);
			tokio::spawn(async move {
				connector
					.deploy(TEST_IMAGE, CancellationToken::new())
					.await
			})
		})
		.collect();

	let mut containers = Vec::new();
	for handle in handles {
		containers.push(handle.await.unwrap().unwrap());
	}
	assert_eq!(client.pod_count(), 8);

	for container in &containers {
		close_clean(&**container).await;
	}
	assert_eq!(client.pod_count(), 0);
}

/// Purpose: deploy against a real cluster from the local kubeconfig.
///
/// Run with `cargo test -p skein-deployer-kubernetes -- --ignored`.
#[tokio::test]
#[ignore = "requires a Kubernetes cluster"]
async fn test_live_cluster_input_report() {
	let config = skein_deployer_kubernetes::load_config(
		None,
		Some(skein_deployer_kubernetes::KubeconfigSource::default()),
		Default::default(),
	)
	.expect("kubeconfig");
	let connector = KubernetesFactory::new()
		.create_connector(config)
		.await
		.expect("connector");

	let container = connector
		.deploy(TEST_IMAGE, CancellationToken::new())
		.await
		.expect("deploy");
	container.write_all(b"abc\n").await.unwrap();

	let expected = b"This is what input was received: \"abc\"\n";
	let reply = read_exactly(&*container, expected.len()).await;
	assert_eq!(reply, expected);
	close_clean(&*container).await;
}
