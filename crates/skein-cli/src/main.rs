// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod pipe;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use skein_deployer::{CancellationToken, CloseOutcome, ConnectorFactory, Container};
use skein_deployer_kubernetes::{load_config, CliOverrides, KubeconfigSource, KubernetesFactory};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pipe::PumpEnd;

/// Skein - run a container image in Kubernetes and talk to it over stdio.
#[derive(Parser, Debug)]
#[command(name = "skein", about = "Run a container image in Kubernetes over stdio", version)]
struct Cli {
	/// Log filter used when RUST_LOG is unset
	#[arg(long, global = true, env = "SKEIN_LOG", default_value = "warn")]
	log_level: String,

	/// Emit logs as JSON lines
	#[arg(long, global = true)]
	json_logs: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Deploy IMAGE as a pod and connect local stdin/stdout to it
	Run(RunArgs),
	/// Print the JSON Schema of the deployer configuration
	Schema,
}

#[derive(Args, Debug)]
struct RunArgs {
	/// Container image to run
	image: String,

	/// Configuration file (TOML, or JSON when the extension is .json)
	#[arg(long, short = 'c', env = "SKEIN_CONFIG")]
	config: Option<PathBuf>,

	/// Import connection settings from the local kubeconfig
	#[arg(long)]
	use_kubeconfig: bool,

	/// Kubeconfig to import (implies --use-kubeconfig)
	#[arg(long)]
	kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to import (implies --use-kubeconfig)
	#[arg(long)]
	context: Option<String>,

	/// Kubernetes API server URL
	#[arg(long)]
	host: Option<String>,

	/// Namespace to create the pod in
	#[arg(long, short = 'n')]
	namespace: Option<String>,

	/// Seconds to wait for the pod to become ready
	#[arg(long)]
	startup_timeout: Option<u64>,

	/// Exec COMMAND in the container instead of attaching to its entrypoint
	#[arg(long, num_args = 1.., value_name = "COMMAND", allow_hyphen_values = true)]
	exec: Option<Vec<String>>,
}

impl RunArgs {
	fn kubeconfig_source(&self) -> Option<KubeconfigSource> {
		(self.use_kubeconfig || self.kubeconfig.is_some() || self.context.is_some())
			.then(|| KubeconfigSource::new(self.kubeconfig.clone(), self.context.clone()))
	}

	fn overrides(&self) -> CliOverrides {
		CliOverrides {
			host: self.host.clone(),
			namespace: self.namespace.clone(),
			startup_timeout_secs: self.startup_timeout,
			exec_command: self.exec.clone(),
		}
	}
}

fn init_tracing(level: &str, json: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
	let registry = tracing_subscriber::registry().with(filter);
	// stdout carries container output; logs go to stderr.
	if json {
		registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_writer(std::io::stderr),
			)
			.init();
	} else {
		registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init();
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing(&cli.log_level, cli.json_logs);

	match cli.command {
		Command::Run(args) => run(args).await,
		Command::Schema => {
			let schema = KubernetesFactory::new().config_schema();
			println!("{}", serde_json::to_string_pretty(&schema)?);
			Ok(())
		}
	}
}

async fn run(args: RunArgs) -> Result<()> {
	let config = load_config(
		args.config.as_deref(),
		args.kubeconfig_source(),
		args.overrides(),
	)
	.context("loading deployer configuration")?;

	let connector = KubernetesFactory::new()
		.create_connector(config)
		.await
		.context("creating Kubernetes connector")?;

	let cancel = CancellationToken::new();
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				tracing::info!("interrupt received, shutting down");
				cancel.cancel();
			}
		});
	}

	let stream = connector
		.deploy_pod(&args.image, cancel.child_token())
		.await
		.with_context(|| format!("deploying {}", args.image))?;
	tracing::info!(
		pod = %stream.identity().name,
		namespace = %stream.identity().namespace,
		"connected"
	);

	let pumped = pipe::pump(&stream, tokio::io::stdin(), tokio::io::stdout(), &cancel).await;

	match stream.close().await.context("closing pod stream")? {
		CloseOutcome::CleanupPending(err) => {
			tracing::warn!(error = %err, "pod was not deleted; remove it manually")
		}
		CloseOutcome::Closed | CloseOutcome::AlreadyClosed => {}
	}

	match pumped? {
		PumpEnd::Finished { received } => {
			tracing::debug!(received, "container closed its output");
			Ok(())
		}
		PumpEnd::Interrupted => anyhow::bail!("interrupted"),
	}
}
