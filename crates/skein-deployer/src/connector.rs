// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::container::Container;
use crate::error::DeployerResult;

/// The kind of artifact a backend deploys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeploymentType(Cow<'static, str>);

impl DeploymentType {
	/// Container images, addressed by an image reference.
	pub const IMAGE: DeploymentType = DeploymentType(Cow::Borrowed("image"));

	pub fn new(kind: impl Into<String>) -> Self {
		Self(Cow::Owned(kind.into()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for DeploymentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// A configured backend able to deploy workloads.
#[async_trait]
pub trait Connector: Send + Sync {
	/// Deploy `image` and return an attached handle.
	///
	/// Cancelling `cancel` aborts the deployment and removes anything that was
	/// created. After a handle has been returned, cancelling the same token
	/// closes the handle.
	async fn deploy(
		&self,
		image: &str,
		cancel: CancellationToken,
	) -> DeployerResult<Box<dyn Container>>;
}

/// Entry point for a deployment backend.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
	/// Registry key, e.g. `"kubernetes"`.
	fn name(&self) -> &str;

	fn deployment_type(&self) -> DeploymentType;

	/// JSON Schema describing the configuration accepted by [`Self::create`].
	fn config_schema(&self) -> serde_json::Value;

	/// Validate `config` and build a connector. Invalid configuration fails
	/// here, before any cluster call.
	async fn create(&self, config: serde_json::Value) -> DeployerResult<Arc<dyn Connector>>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn image_type_renders_as_image() {
		assert_eq!(DeploymentType::IMAGE.as_str(), "image");
		assert_eq!(DeploymentType::IMAGE.to_string(), "image");
		assert_eq!(DeploymentType::new("image"), DeploymentType::IMAGE);
	}
}
