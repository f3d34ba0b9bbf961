// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lifecycle of a single deployed pod.
//!
//! ```text
//! Pending -> Submitting -> Created -> Scheduled -> Ready -> Attached -> Closed
//!               |            |          |           |          |
//!               +------------+----------+-----------+----------+--> Failed | TimedOut | Canceled
//! ```
//!
//! Once a pod has been submitted it may exist on the cluster, and any path
//! into a failure state must then delete it.

use std::fmt;

use skein_k8s::Pod;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodState {
	Pending,
	Submitting,
	Created,
	Scheduled,
	Ready,
	Attached,
	Closed,
	Failed,
	TimedOut,
	Canceled,
}

impl PodState {
	pub fn is_terminal(self) -> bool {
		matches!(
			self,
			PodState::Closed | PodState::Failed | PodState::TimedOut | PodState::Canceled
		)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			PodState::Pending => "pending",
			PodState::Submitting => "submitting",
			PodState::Created => "created",
			PodState::Scheduled => "scheduled",
			PodState::Ready => "ready",
			PodState::Attached => "attached",
			PodState::Closed => "closed",
			PodState::Failed => "failed",
			PodState::TimedOut => "timed_out",
			PodState::Canceled => "canceled",
		}
	}
}

impl fmt::Display for PodState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodEvent {
	Submit,
	Accepted,
	Rejected,
	Scheduled,
	BecameReady,
	Attached,
	Close,
	Fail,
	TimeOut,
	Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pod transition: {event:?} in state {from}")]
pub struct TransitionError {
	pub from: PodState,
	pub event: PodEvent,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
	state: PodState,
	may_exist: bool,
}

impl Default for Lifecycle {
	fn default() -> Self {
		Self::new()
	}
}

impl Lifecycle {
	pub fn new() -> Self {
		Self {
			state: PodState::Pending,
			may_exist: false,
		}
	}

	pub fn state(&self) -> PodState {
		self.state
	}

	/// Whether a pod may exist on the cluster for this lifecycle.
	pub fn may_exist(&self) -> bool {
		self.may_exist
	}

	/// True when the lifecycle ended in failure while a pod may still exist.
	pub fn requires_cleanup(&self) -> bool {
		self.may_exist
			&& matches!(
				self.state,
				PodState::Failed | PodState::TimedOut | PodState::Canceled
			)
	}

	pub fn advance(&mut self, event: PodEvent) -> Result<PodState, TransitionError> {
		use PodEvent as E;
		use PodState as S;

		let next = match (self.state, event) {
			(S::Pending, E::Submit) => S::Submitting,
			(S::Submitting, E::Accepted) => S::Created,
			(S::Submitting, E::Rejected) => S::Failed,
			(S::Created, E::Scheduled) => S::Scheduled,
			(S::Created | S::Scheduled, E::BecameReady) => S::Ready,
			(S::Ready, E::Attached) => S::Attached,
			(S::Attached, E::Close) => S::Closed,
			(S::Submitting | S::Created | S::Scheduled | S::Ready | S::Attached, E::Fail) => S::Failed,
			(S::Created | S::Scheduled, E::TimeOut) => S::TimedOut,
			(
				S::Pending | S::Submitting | S::Created | S::Scheduled | S::Ready | S::Attached,
				E::Cancel,
			) => S::Canceled,
			(from, event) => return Err(TransitionError { from, event }),
		};

		match event {
			E::Submit => self.may_exist = true,
			E::Rejected => self.may_exist = false,
			_ => {}
		}

		debug!(from = %self.state, to = %next, ?event, "Pod state transition");
		self.state = next;
		Ok(next)
	}

	/// Record that the pod has been deleted.
	pub fn mark_deleted(&mut self) {
		self.may_exist = false;
	}
}

/// What a status poll says about readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
	Pending { scheduled: bool },
	Ready,
	Failed(String),
}

/// Waiting reasons the kubelet will not recover from on its own.
const FATAL_WAITING_REASONS: &[&str] = &[
	"ErrImageNeverPull",
	"InvalidImageName",
	"CreateContainerConfigError",
	"CreateContainerError",
];

/// Classify a pod returned by a status poll. `container` is the container the
/// stream will attach to.
pub fn observe(pod: &Pod, container: &str) -> Observation {
	let Some(status) = pod.status.as_ref() else {
		return Observation::Pending { scheduled: false };
	};

	match status.phase.as_deref() {
		Some("Failed") => {
			let reason = status
				.reason
				.clone()
				.or_else(|| status.message.clone())
				.unwrap_or_else(|| "pod failed".to_string());
			return Observation::Failed(reason);
		}
		Some("Succeeded") => {
			return Observation::Failed("container exited before the stream was attached".to_string());
		}
		_ => {}
	}

	let container_status = status
		.container_statuses
		.as_ref()
		.and_then(|statuses| statuses.iter().find(|s| s.name == container));

	if let Some(cs) = container_status {
		let state = cs.state.as_ref();
		if let Some(waiting) = state.and_then(|s| s.waiting.as_ref()) {
			if let Some(reason) = waiting.reason.as_deref() {
				if FATAL_WAITING_REASONS.contains(&reason) {
					return Observation::Failed(match waiting.message.as_deref() {
						Some(detail) if !detail.is_empty() => format!("{reason}: {detail}"),
						_ => reason.to_string(),
					});
				}
			}
		}
		if let Some(terminated) = state.and_then(|s| s.terminated.as_ref()) {
			let reason = terminated.reason.as_deref().unwrap_or("Terminated");
			return Observation::Failed(format!(
				"container {container} terminated ({reason}, exit code {})",
				terminated.exit_code
			));
		}
	}

	let running = status.phase.as_deref() == Some("Running");
	let pod_ready = condition_true(pod, "Ready");
	let container_ready = container_status.is_some_and(|cs| cs.ready);
	if running && (pod_ready || container_ready) {
		return Observation::Ready;
	}

	Observation::Pending {
		scheduled: condition_true(pod, "PodScheduled"),
	}
}

fn condition_true(pod: &Pod, kind: &str) -> bool {
	pod.status
		.as_ref()
		.and_then(|s| s.conditions.as_ref())
		.is_some_and(|conditions| {
			conditions
				.iter()
				.any(|c| c.type_ == kind && c.status == "True")
		})
}
