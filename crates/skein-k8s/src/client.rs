// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::K8sError;
use crate::types::{AttachTarget, AttachedProcess, Pod};

/// Trait for K8s client operations.
///
/// The deployer needs exactly four calls; keeping the surface this small
/// makes the in-memory [`crate::MockK8sClient`] a faithful stand-in.
#[async_trait]
pub trait K8sClient: Send + Sync {
	/// Create a new pod in the specified namespace.
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError>;

	/// Get a specific pod by name from the specified namespace.
	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError>;

	/// Delete a pod by name. A missing pod is reported as
	/// [`K8sError::PodNotFound`].
	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError>;

	/// Open stdin/stdout of a running container, either by attaching to its
	/// main process or by executing a command in it.
	async fn exec_attach(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
		target: &AttachTarget,
	) -> Result<AttachedProcess, K8sError>;
}
