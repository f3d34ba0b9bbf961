// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Deployer abstraction for Skein.
//!
//! A workflow engine runs plugins as containers and talks to them over their
//! standard streams. This crate defines the narrow surface it sees:
//!
//! - [`ConnectorFactory`]: one per deployment backend, registered by name in a
//!   [`FactoryRegistry`] at process start
//! - [`Connector`]: a configured backend that can deploy images
//! - [`Container`]: the live handle (`write`, `read`, `id`, `close`)
//!
//! Backends live in their own crates (see `skein-deployer-kubernetes`).

mod connector;
mod container;
mod error;
mod registry;

pub use connector::{Connector, ConnectorFactory, DeploymentType};
pub use container::{CloseOutcome, Container};
pub use error::{DeployerError, DeployerResult};
pub use registry::FactoryRegistry;

pub use tokio_util::sync::CancellationToken;
