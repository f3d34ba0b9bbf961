// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! K8s client abstraction for the Skein pod deployer.
//!
//! This crate provides:
//! - A trait-based K8s client abstraction for testability
//! - Production implementation using the kube crate, built from explicit
//!   connection parameters and paced by a client-side rate limiter
//! - A bounded retry helper and an in-memory mock cluster

mod client;
mod connection;
mod error;
mod kube_client;
mod mock;
mod rate_limit;
mod retry;
mod types;

pub use client::K8sClient;
pub use connection::{AuthMode, ConnectionParams, TlsParams};
pub use error::{K8sError, K8sResult};
pub use kube_client::KubeClient;
pub use mock::{MockK8sClient, PodScript, Responder};
pub use rate_limit::{RateLimit, RateLimiter, DEFAULT_BURST, DEFAULT_QPS};
pub use retry::{retry, RetryConfig, RetryableError};
pub use types::{
	AppArmorProfile, AttachTarget, AttachedProcess, Capabilities, Container, ContainerPort,
	ContainerState, ContainerStateTerminated, ContainerStateWaiting, ContainerStatus, EnvVar,
	ObjectMeta, Pod, PodCondition, PodSecurityContext, PodSpec, PodStatus, ResourceRequirements,
	SeccompProfile, SecurityContext, Toleration,
};
