// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, kubeconfig import, config files,
//! environment variables and command-line overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use skein_common_secret::SecretString;
use tracing::{debug, trace};

use crate::config::StreamMode;
use crate::connection::from_kubeconfig;
use crate::error::ConfigError;
use crate::layer::{ConfigLayer, ConnectionLayer, TimeoutsLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	Kubeconfig = 15,
	ConfigFile = 20,
	Environment = 50,
	Cli = 60,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ConfigLayer::default())
	}
}

/// Connection settings taken from a kubeconfig context.
#[derive(Debug, Clone, Default)]
pub struct KubeconfigSource {
	path: Option<PathBuf>,
	context: Option<String>,
}

impl KubeconfigSource {
	/// `None` selects `$KUBECONFIG` or `~/.kube/config` and the current
	/// context respectively.
	pub fn new(path: Option<PathBuf>, context: Option<String>) -> Self {
		Self { path, context }
	}
}

impl ConfigSource for KubeconfigSource {
	fn name(&self) -> &'static str {
		"kubeconfig"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Kubeconfig
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!(path = ?self.path, context = ?self.context, "loading kubeconfig");
		let connection = from_kubeconfig(self.path.as_deref(), self.context.as_deref())?;
		Ok(ConfigLayer {
			connection: Some(ConnectionLayer::from(connection)),
			..Default::default()
		})
	}
}

/// A TOML or JSON config file. The format follows the extension; anything
/// other than `.json` is read as TOML.
pub struct FileSource {
	path: PathBuf,
	required: bool,
}

impl FileSource {
	/// A file that must exist.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			required: true,
		}
	}

	/// A file that is skipped when missing.
	pub fn optional(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			required: false,
		}
	}

	fn is_json(&self) -> bool {
		self.path
			.extension()
			.is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
	}
}

impl ConfigSource for FileSource {
	fn name(&self) -> &'static str {
		"config-file"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		if !self.required && !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer = if self.is_json() {
			serde_json::from_str(&content).map_err(|e| ConfigError::JsonParse {
				path: self.path.clone(),
				source: e,
			})?
		} else {
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?
		};

		trace!("parsed config layer from file");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: SKEIN_KUBE_<FIELD> for connection settings, SKEIN_<FIELD>
/// otherwise.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
	vars: Option<HashMap<String, String>>,
}

impl EnvSource {
	/// Read from the process environment.
	pub fn new() -> Self {
		Self::default()
	}

	/// Read from a fixed set of variables instead of the process environment.
	pub fn from_vars<I, K, V>(vars: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			vars: Some(
				vars.into_iter()
					.map(|(k, v)| (k.into(), v.into()))
					.collect(),
			),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		match &self.vars {
			Some(vars) => vars.get(name).cloned(),
			None => std::env::var(name).ok(),
		}
		.filter(|s| !s.is_empty())
	}

	fn parsed<T: std::str::FromStr>(&self, name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid {kind} value '{v}'"),
			}),
			None => Ok(None),
		}
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading environment variables");
		let connection = ConnectionLayer {
			host: self.var("SKEIN_KUBE_HOST"),
			bearer_token: self.var("SKEIN_KUBE_TOKEN").map(SecretString::new),
			username: self.var("SKEIN_KUBE_USERNAME"),
			password: self.var("SKEIN_KUBE_PASSWORD").map(SecretString::new),
			namespace: self.var("SKEIN_NAMESPACE"),
			qps: self.parsed("SKEIN_KUBE_QPS", "f32")?,
			burst: self.parsed("SKEIN_KUBE_BURST", "u32")?,
			..Default::default()
		};
		let timeouts = TimeoutsLayer {
			http_secs: self.parsed("SKEIN_HTTP_TIMEOUT_SECS", "u64")?,
			startup_secs: self.parsed("SKEIN_STARTUP_TIMEOUT_SECS", "u64")?,
		};

		Ok(ConfigLayer {
			connection: Some(connection),
			timeouts: Some(timeouts),
			..Default::default()
		})
	}
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub host: Option<String>,
	pub namespace: Option<String>,
	pub startup_timeout_secs: Option<u64>,
	pub exec_command: Option<Vec<String>>,
}

pub struct CliSource {
	overrides: CliOverrides,
}

impl CliSource {
	pub fn new(overrides: CliOverrides) -> Self {
		Self { overrides }
	}
}

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		let o = &self.overrides;
		Ok(ConfigLayer {
			connection: Some(ConnectionLayer {
				host: o.host.clone(),
				namespace: o.namespace.clone(),
				..Default::default()
			}),
			timeouts: Some(TimeoutsLayer {
				startup_secs: o.startup_timeout_secs,
				..Default::default()
			}),
			stream: o
				.exec_command
				.clone()
				.map(|command| StreamMode::Exec { command }),
			..Default::default()
		})
	}
}

/// Collects sources and resolves them into a validated [`crate::Config`].
#[derive(Default)]
pub struct ConfigRegistry {
	sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, source: Box<dyn ConfigSource>) {
		self.sources.push(source);
	}

	/// Merge all sources in precedence order, apply defaults and validate.
	pub fn load(mut self) -> Result<crate::Config, ConfigError> {
		self.sources.sort_by_key(|s| s.precedence());

		let mut merged = ConfigLayer::default();
		for source in &self.sources {
			debug!(source = source.name(), "loading configuration source");
			merged.merge(source.load()?);
		}

		let config = merged.finalize()?;
		debug!(
			host = %config.connection.host,
			namespace = config.namespace(),
			"Deployer configuration loaded"
		);
		Ok(config)
	}
}

/// Standard source stack: defaults, optional kubeconfig import, optional
/// config file, environment, command line.
pub fn load_config(
	file: Option<&Path>,
	kubeconfig: Option<KubeconfigSource>,
	cli: CliOverrides,
) -> Result<crate::Config, ConfigError> {
	let mut registry = ConfigRegistry::new();
	registry.register(Box::new(DefaultsSource));
	if let Some(kubeconfig) = kubeconfig {
		registry.register(Box::new(kubeconfig));
	}
	if let Some(file) = file {
		registry.register(Box::new(FileSource::new(file)));
	}
	registry.register(Box::new(EnvSource::new()));
	registry.register(Box::new(CliSource::new(cli)));
	registry.load()
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
		let path = dir.path().join(name);
		let mut file = std::fs::File::create(&path).unwrap();
		file.write_all(content.as_bytes()).unwrap();
		path
	}

	#[test]
	fn precedence_order() {
		assert!(Precedence::Defaults < Precedence::Kubeconfig);
		assert!(Precedence::Kubeconfig < Precedence::ConfigFile);
		assert!(Precedence::ConfigFile < Precedence::Environment);
		assert!(Precedence::Environment < Precedence::Cli);
	}

	#[test]
	fn toml_and_json_files_are_read() {
		let dir = tempfile::tempdir().unwrap();
		let toml_path = write_file(
			&dir,
			"skein.toml",
			"[connection]\nhost = \"https://toml.example.com\"\n",
		);
		let json_path = write_file(
			&dir,
			"skein.json",
			r#"{ "connection": { "host": "https://json.example.com" } }"#,
		);

		let layer = FileSource::new(&toml_path).load().unwrap();
		assert_eq!(
			layer.connection.unwrap().host.as_deref(),
			Some("https://toml.example.com")
		);
		let layer = FileSource::new(&json_path).load().unwrap();
		assert_eq!(
			layer.connection.unwrap().host.as_deref(),
			Some("https://json.example.com")
		);
	}

	#[test]
	fn missing_files() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("absent.toml");
		assert_eq!(
			FileSource::optional(&path).load().unwrap(),
			ConfigLayer::default()
		);
		assert!(matches!(
			FileSource::new(&path).load(),
			Err(ConfigError::FileRead { .. })
		));
	}

	#[test]
	fn parse_errors_name_the_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_file(&dir, "bad.toml", "[connection\nhost = 1");
		match FileSource::new(&path).load() {
			Err(ConfigError::TomlParse { path: p, .. }) => assert_eq!(p, path),
			other => panic!("expected TomlParse, got {other:?}"),
		}
	}

	#[test]
	fn env_source_reads_variables() {
		let layer = EnvSource::from_vars([
			("SKEIN_KUBE_HOST", "https://env.example.com"),
			("SKEIN_KUBE_TOKEN", "env-token"),
			("SKEIN_NAMESPACE", "plugins"),
			("SKEIN_KUBE_QPS", "2.5"),
			("SKEIN_STARTUP_TIMEOUT_SECS", "15"),
		])
		.load()
		.unwrap();

		let connection = layer.connection.unwrap();
		assert_eq!(connection.host.as_deref(), Some("https://env.example.com"));
		assert_eq!(connection.bearer_token.unwrap().expose(), "env-token");
		assert_eq!(connection.namespace.as_deref(), Some("plugins"));
		assert_eq!(connection.qps, Some(2.5));
		assert_eq!(layer.timeouts.unwrap().startup_secs, Some(15));
	}

	#[test]
	fn env_source_rejects_bad_numbers() {
		let err = EnvSource::from_vars([("SKEIN_KUBE_BURST", "many")])
			.load()
			.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "SKEIN_KUBE_BURST"));
	}

	#[test]
	fn later_sources_win() {
		let dir = tempfile::tempdir().unwrap();
		let path = write_file(
			&dir,
			"skein.toml",
			"[connection]\nhost = \"https://file.example.com\"\nnamespace = \"from-file\"\n\n[timeouts]\nstartupSecs = 60\n",
		);

		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(CliSource::new(CliOverrides {
			namespace: Some("from-cli".to_string()),
			exec_command: Some(vec!["/plugin".to_string()]),
			..Default::default()
		})));
		registry.register(Box::new(EnvSource::from_vars([(
			"SKEIN_KUBE_HOST",
			"https://env.example.com",
		)])));
		registry.register(Box::new(FileSource::new(&path)));
		registry.register(Box::new(DefaultsSource));

		let config = registry.load().unwrap();
		assert_eq!(config.connection.host, "https://env.example.com");
		assert_eq!(config.connection.namespace, "from-cli");
		assert_eq!(config.timeouts.startup_secs, 60);
		assert_eq!(
			config.stream,
			StreamMode::Exec {
				command: vec!["/plugin".to_string()]
			}
		);
	}

	#[test]
	fn kubeconfig_is_overridden_by_file() {
		let dir = tempfile::tempdir().unwrap();
		let kubeconfig = write_file(
			&dir,
			"kubeconfig",
			r#"apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev
  cluster:
    server: https://dev.example.com
contexts:
- name: dev
  context:
    cluster: dev
    user: dev
    namespace: team-a
users:
- name: dev
  user:
    token: kube-token
"#,
		);
		let file = write_file(&dir, "skein.toml", "[connection]\nnamespace = \"team-b\"\n");

		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(DefaultsSource));
		registry.register(Box::new(KubeconfigSource::new(Some(kubeconfig), None)));
		registry.register(Box::new(FileSource::new(&file)));

		let config = registry.load().unwrap();
		assert_eq!(config.connection.host, "https://dev.example.com");
		assert_eq!(config.connection.bearer_token.expose(), "kube-token");
		assert_eq!(config.connection.namespace, "team-b");
	}

	#[test]
	fn invalid_merged_config_is_rejected() {
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(EnvSource::from_vars([
			("SKEIN_KUBE_HOST", "https://env.example.com"),
			("SKEIN_STARTUP_TIMEOUT_SECS", "0"),
		])));
		assert!(matches!(
			registry.load(),
			Err(ConfigError::Validation { .. })
		));
	}
}
