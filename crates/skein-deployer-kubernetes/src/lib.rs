// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Kubernetes backend for the Skein deployer.
//!
//! Each deploy creates one pod from a user-supplied template, waits until it
//! is ready, attaches to the container's stdin/stdout and returns the
//! connection as a [`PodStream`]. Closing the stream deletes the pod; so does
//! any failure or cancellation after the pod was submitted.
//!
//! # Usage
//!
//! ```ignore
//! use skein_deployer::{CancellationToken, FactoryRegistry};
//!
//! let mut registry = FactoryRegistry::new();
//! skein_deployer_kubernetes::register(&mut registry);
//!
//! let connector = registry.create("kubernetes", config_json).await?;
//! let container = connector.deploy("quay.io/org/plugin:1.0", CancellationToken::new()).await?;
//! container.write_all(b"hello\n").await?;
//! container.close().await?;
//! ```

pub mod config;
pub mod connection;
mod connector;
mod error;
mod factory;
pub mod layer;
pub mod lifecycle;
pub mod manifest;
pub mod sources;
mod stream;
mod validation;

pub use config::{AttachPolicy, Config, Connection, PodTemplate, PodTemplateSpec, StreamMode, Timeouts};
pub use connection::{build_connection_params, from_kubeconfig};
pub use connector::KubernetesConnector;
pub use error::ConfigError;
pub use factory::{register, KubernetesFactory, BACKEND_NAME};
pub use layer::ConfigLayer;
pub use lifecycle::{Lifecycle, PodEvent, PodState};
pub use manifest::{PodAssembler, PodIdentity};
pub use sources::{
	load_config, CliOverrides, ConfigRegistry, ConfigSource, DefaultsSource, EnvSource, FileSource,
	KubeconfigSource, Precedence,
};
pub use stream::PodStream;
pub use validation::validate_pod_template;
