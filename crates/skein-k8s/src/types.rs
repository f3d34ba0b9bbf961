// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

pub use k8s_openapi::api::core::v1::{
	AppArmorProfile, Capabilities, Container, ContainerPort, ContainerState,
	ContainerStateTerminated, ContainerStateWaiting, ContainerStatus, EnvVar, Pod, PodCondition,
	PodSecurityContext, PodSpec, PodStatus, ResourceRequirements, SeccompProfile,
	SecurityContext, Toleration,
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// How a stream is opened against a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachTarget {
	/// Attach to the container's main process.
	Attach,
	/// Start `command` inside the container and stream its stdin/stdout.
	Exec(Vec<String>),
}

/// Bidirectional stream for container I/O via exec/attach.
pub struct AttachedProcess {
	pub stdin: Pin<Box<dyn AsyncWrite + Send>>,
	pub stdout: Pin<Box<dyn AsyncRead + Send>>,
}

impl std::fmt::Debug for AttachedProcess {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AttachedProcess").finish_non_exhaustive()
	}
}
