// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::Arc;

use crate::connector::{Connector, ConnectorFactory};
use crate::error::{DeployerError, DeployerResult};

/// Deployment backends known to the process, keyed by factory name.
///
/// Populated once at startup and read afterwards; share it behind an `Arc`.
pub struct FactoryRegistry {
	factories: HashMap<String, Arc<dyn ConnectorFactory>>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			factories: HashMap::new(),
		}
	}

	/// Register a factory under its own name. A later registration with the
	/// same name replaces the earlier one.
	pub fn register(&mut self, factory: Arc<dyn ConnectorFactory>) {
		let name = factory.name().to_string();
		tracing::debug!(backend = %name, deployment_type = %factory.deployment_type(), "registering deployer backend");
		if self.factories.insert(name.clone(), factory).is_some() {
			tracing::warn!(backend = %name, "replaced previously registered deployer backend");
		}
	}

	pub fn get(&self, name: &str) -> Option<Arc<dyn ConnectorFactory>> {
		self.factories.get(name).cloned()
	}

	/// Registered backend names, sorted.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.factories.keys().cloned().collect();
		names.sort();
		names
	}

	/// Look up `name` and build a connector from `config`.
	pub async fn create(
		&self,
		name: &str,
		config: serde_json::Value,
	) -> DeployerResult<Arc<dyn Connector>> {
		let factory = self
			.get(name)
			.ok_or_else(|| DeployerError::UnknownBackend {
				name: name.to_string(),
			})?;
		factory.create(config).await
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}
