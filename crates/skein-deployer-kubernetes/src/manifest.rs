// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pod manifest assembly.
//!
//! The caller's template is never modified: it is cloned, then the fields the
//! stream depends on are forced (image, stdin wiring, container name, restart
//! policy, management labels, name and namespace).

use std::collections::BTreeMap;

use skein_k8s::{AttachTarget, Pod, PodSpec};
use uuid::Uuid;

use crate::config::{PodTemplate, StreamMode};
use crate::error::ConfigError;
use crate::validation::validate_pod_template;

pub const CONTAINER_NAME: &str = "main";
pub const MANAGED_LABEL: &str = "skein.dev/managed";
pub const IMAGE_LABEL: &str = "skein.dev/image";
const NAME_PREFIX: &str = "skein-";
const NAME_SUFFIX_LEN: usize = 12;
const MAX_NAME_LENGTH: usize = 63;
const MAX_LABEL_LENGTH: usize = 63;
const DEFAULT_RESTART_POLICY: &str = "Never";

/// Keeps the container alive in exec mode until the pod is deleted.
pub const KEEP_ALIVE_COMMAND: [&str; 3] = [
	"/bin/sh",
	"-c",
	"trap 'exit 0' TERM; while true; do sleep 3600 & wait $!; done",
];

/// Where a deployed pod lives. The name is chosen before submission; the UID
/// is filled in once the cluster has accepted the pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodIdentity {
	pub name: String,
	pub namespace: String,
	pub uid: Option<String>,
}

/// A manifest ready for submission.
#[derive(Debug, Clone)]
pub struct AssembledPod {
	pub pod: Pod,
	pub identity: PodIdentity,
	pub container: String,
	pub target: AttachTarget,
}

/// Builds effective pod manifests from a template.
#[derive(Debug, Clone)]
pub struct PodAssembler {
	namespace: String,
	mode: StreamMode,
}

impl PodAssembler {
	/// `namespace` is used when the template does not name one.
	pub fn new(namespace: impl Into<String>, mode: StreamMode) -> Self {
		Self {
			namespace: namespace.into(),
			mode,
		}
	}

	pub fn assemble(&self, template: &PodTemplate, image: &str) -> Result<AssembledPod, ConfigError> {
		let image = image.trim();
		if image.is_empty() {
			return Err(ConfigError::validation("image", "must not be empty"));
		}
		validate_pod_template(template)?;

		let namespace = template
			.metadata
			.namespace
			.clone()
			.filter(|ns| !ns.is_empty())
			.unwrap_or_else(|| self.namespace.clone());
		let name = match template.metadata.name.as_deref().filter(|n| !n.is_empty()) {
			Some(name) => name.to_string(),
			None => generate_name(template.metadata.generate_name.as_deref()),
		};

		let mut container = template.spec.plugin_container.clone();
		if container.name.is_empty() {
			container.name = CONTAINER_NAME.to_string();
		}
		container.image = Some(image.to_string());
		container.stdin = Some(true);
		container.stdin_once = Some(true);
		container.tty = Some(false);

		// Only exec mode replaces the entrypoint; attach streams to it.
		let target = match &self.mode {
			StreamMode::Attach => AttachTarget::Attach,
			StreamMode::Exec { command } => {
				container.command = Some(KEEP_ALIVE_COMMAND.iter().map(|s| s.to_string()).collect());
				container.args = None;
				AttachTarget::Exec(command.clone())
			}
		};
		let container_name = container.name.clone();

		let mut metadata = template.metadata.clone();
		metadata.name = Some(name.clone());
		metadata.generate_name = None;
		metadata.namespace = Some(namespace.clone());
		let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
		labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
		labels.insert(IMAGE_LABEL.to_string(), sanitize_label_value(image));

		let spec = PodSpec {
			containers: vec![container],
			restart_policy: Some(
				template
					.spec
					.pod
					.restart_policy
					.clone()
					.unwrap_or_else(|| DEFAULT_RESTART_POLICY.to_string()),
			),
			..template.spec.pod.clone()
		};

		Ok(AssembledPod {
			pod: Pod {
				metadata,
				spec: Some(spec),
				status: None,
			},
			identity: PodIdentity {
				name,
				namespace,
				uid: None,
			},
			container: container_name,
			target,
		})
	}
}

/// `prefix` (or `skein-`) followed by 12 random hex characters, at most 63
/// characters in total.
pub fn generate_name(prefix: Option<&str>) -> String {
	let prefix = prefix.filter(|p| !p.is_empty()).unwrap_or(NAME_PREFIX);
	let suffix: String = Uuid::new_v4()
		.simple()
		.to_string()
		.chars()
		.take(NAME_SUFFIX_LEN)
		.collect();
	let mut keep = (MAX_NAME_LENGTH - NAME_SUFFIX_LEN).min(prefix.len());
	while !prefix.is_char_boundary(keep) {
		keep -= 1;
	}
	format!("{}{suffix}", &prefix[..keep])
}

/// Sanitize a string to be a valid Kubernetes label value.
///
/// K8s label values must:
/// - Be 63 characters or less
/// - Begin and end with an alphanumeric character
/// - Contain only alphanumeric characters, dashes, underscores, and dots
pub fn sanitize_label_value(value: &str) -> String {
	let sanitized: String = value
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
				c
			} else {
				'_'
			}
		})
		.collect();

	let trimmed = sanitized
		.trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
		.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());

	if trimmed.len() > MAX_LABEL_LENGTH {
		trimmed[..MAX_LABEL_LENGTH]
			.trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
			.to_string()
	} else {
		trimmed.to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use skein_k8s::{Container, ObjectMeta, SeccompProfile, SecurityContext};

	const IMAGE: &str = "quay.io/joconnel/io-test-script";

	fn template() -> PodTemplate {
		PodTemplate::default()
	}

	fn only_container(pod: &Pod) -> &Container {
		let containers = &pod.spec.as_ref().unwrap().containers;
		assert_eq!(containers.len(), 1);
		&containers[0]
	}

	#[test]
	fn forces_stream_fields() {
		let mut t = template();
		t.spec.plugin_container = Container {
			stdin: Some(false),
			stdin_once: Some(false),
			tty: Some(true),
			image: Some("ignored:latest".to_string()),
			..Default::default()
		};

		let assembled = PodAssembler::new("default", StreamMode::Attach)
			.assemble(&t, IMAGE)
			.unwrap();
		let c = only_container(&assembled.pod);

		assert_eq!(c.name, CONTAINER_NAME);
		assert_eq!(c.image.as_deref(), Some(IMAGE));
		assert_eq!(c.stdin, Some(true));
		assert_eq!(c.stdin_once, Some(true));
		assert_eq!(c.tty, Some(false));
		assert_eq!(assembled.container, CONTAINER_NAME);
		assert_eq!(assembled.target, AttachTarget::Attach);
	}

	#[test]
	fn template_is_not_mutated() {
		let mut t = template();
		t.metadata.labels = Some(BTreeMap::from([("team".to_string(), "ci".to_string())]));
		let before = t.clone();

		PodAssembler::new("default", StreamMode::Attach)
			.assemble(&t, IMAGE)
			.unwrap();

		assert_eq!(t, before);
	}

	#[test]
	fn labels_are_merged() {
		let mut t = template();
		t.metadata.labels = Some(BTreeMap::from([("team".to_string(), "ci".to_string())]));

		let assembled = PodAssembler::new("default", StreamMode::Attach)
			.assemble(&t, "docker.io/library/python:3.12")
			.unwrap();
		let labels = assembled.pod.metadata.labels.unwrap();

		assert_eq!(labels.get("team"), Some(&"ci".to_string()));
		assert_eq!(labels.get(MANAGED_LABEL), Some(&"true".to_string()));
		assert_eq!(
			labels.get(IMAGE_LABEL),
			Some(&"docker.io_library_python_3.12".to_string())
		);
	}

	#[test]
	fn namespace_resolution() {
		let assembler = PodAssembler::new("plugins", StreamMode::Attach);
		let assembled = assembler.assemble(&template(), IMAGE).unwrap();
		assert_eq!(assembled.identity.namespace, "plugins");
		assert_eq!(assembled.pod.metadata.namespace.as_deref(), Some("plugins"));

		let mut t = template();
		t.metadata.namespace = Some("ci".to_string());
		let assembled = assembler.assemble(&t, IMAGE).unwrap();
		assert_eq!(assembled.identity.namespace, "ci");
	}

	#[test]
	fn names_are_generated_unless_given() {
		let assembler = PodAssembler::new("default", StreamMode::Attach);

		let a = assembler.assemble(&template(), IMAGE).unwrap();
		let b = assembler.assemble(&template(), IMAGE).unwrap();
		assert!(a.identity.name.starts_with(NAME_PREFIX));
		assert_eq!(a.identity.name.len(), NAME_PREFIX.len() + NAME_SUFFIX_LEN);
		assert_ne!(a.identity.name, b.identity.name);
		assert_eq!(a.pod.metadata.name.as_deref(), Some(a.identity.name.as_str()));

		let mut t = template();
		t.metadata.generate_name = Some("plugin-".to_string());
		let c = assembler.assemble(&t, IMAGE).unwrap();
		assert!(c.identity.name.starts_with("plugin-"));
		assert!(c.pod.metadata.generate_name.is_none());

		let mut t = template();
		t.metadata = ObjectMeta {
			name: Some("fixed".to_string()),
			..Default::default()
		};
		assert_eq!(assembler.assemble(&t, IMAGE).unwrap().identity.name, "fixed");
	}

	#[test]
	fn restart_policy_defaults_to_never() {
		let assembler = PodAssembler::new("default", StreamMode::Attach);
		let pod = assembler.assemble(&template(), IMAGE).unwrap().pod;
		assert_eq!(pod.spec.unwrap().restart_policy.as_deref(), Some("Never"));

		let mut t = template();
		t.spec.pod.restart_policy = Some("OnFailure".to_string());
		let pod = assembler.assemble(&t, IMAGE).unwrap().pod;
		assert_eq!(pod.spec.unwrap().restart_policy.as_deref(), Some("OnFailure"));
	}

	#[test]
	fn exec_mode_installs_keep_alive() {
		let mut t = template();
		t.spec.plugin_container.command = Some(vec!["/entrypoint".to_string()]);
		t.spec.plugin_container.args = Some(vec!["--flag".to_string()]);
		let command = vec!["/plugin".to_string(), "serve".to_string()];

		let assembled = PodAssembler::new("default", StreamMode::Exec { command: command.clone() })
			.assemble(&t, IMAGE)
			.unwrap();
		let c = only_container(&assembled.pod);

		assert_eq!(c.command.as_ref().unwrap()[0], "/bin/sh");
		assert!(c.args.is_none());
		assert_eq!(assembled.target, AttachTarget::Exec(command));
	}

	#[test]
	fn attach_mode_keeps_entrypoint() {
		let mut t = template();
		t.spec.plugin_container.command = Some(vec!["/entrypoint".to_string()]);
		let assembled = PodAssembler::new("default", StreamMode::Attach)
			.assemble(&t, IMAGE)
			.unwrap();
		assert_eq!(
			only_container(&assembled.pod).command,
			Some(vec!["/entrypoint".to_string()])
		);
	}

	#[test]
	fn security_context_passes_through() {
		let mut t = template();
		let ctx = SecurityContext {
			run_as_non_root: Some(true),
			seccomp_profile: Some(SeccompProfile {
				type_: "RuntimeDefault".to_string(),
				localhost_profile: None,
			}),
			..Default::default()
		};
		t.spec.plugin_container.security_context = Some(ctx.clone());

		let assembled = PodAssembler::new("default", StreamMode::Attach)
			.assemble(&t, IMAGE)
			.unwrap();
		let got = only_container(&assembled.pod).security_context.clone().unwrap();
		assert_eq!(got, ctx);
		assert!(got.privileged.is_none());
	}

	#[test]
	fn invalid_template_is_rejected_without_defaults() {
		let mut t = template();
		t.spec.plugin_container.security_context = Some(SecurityContext {
			seccomp_profile: Some(SeccompProfile {
				type_: "not_working".to_string(),
				localhost_profile: None,
			}),
			..Default::default()
		});
		let err = PodAssembler::new("default", StreamMode::Attach)
			.assemble(&t, IMAGE)
			.unwrap_err();
		assert!(matches!(err, ConfigError::Validation { .. }));
	}

	#[test]
	fn empty_image_is_rejected() {
		let err = PodAssembler::new("default", StreamMode::Attach)
			.assemble(&template(), "  ")
			.unwrap_err();
		assert!(matches!(err, ConfigError::Validation { path, .. } if path == "image"));
	}

	#[test]
	fn long_prefixes_are_truncated() {
		let name = generate_name(Some(&"p".repeat(100)));
		assert_eq!(name.len(), MAX_NAME_LENGTH);
	}

	#[test]
	fn multibyte_prefixes_are_cut_on_a_char_boundary() {
		let name = generate_name(Some(&"é".repeat(40)));
		assert!(name.len() <= MAX_NAME_LENGTH);
		assert!(name.starts_with(&"é".repeat(25)));
		assert!(name.ends_with(|c: char| c.is_ascii_hexdigit()));
	}

	#[test]
	fn sanitize_label_value_examples() {
		assert_eq!(sanitize_label_value("python:3.12"), "python_3.12");
		assert_eq!(sanitize_label_value("--foo--"), "foo");
		assert_eq!(
			sanitize_label_value("ghcr.io/org/repo:latest"),
			"ghcr.io_org_repo_latest"
		);
	}
}
