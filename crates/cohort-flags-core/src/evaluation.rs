// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::ExperimentStatus;

/// Result of evaluating a feature flag for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEvaluation {
	pub enabled: bool,
	pub reason: FlagReason,
}

impl FlagEvaluation {
	pub fn on(reason: FlagReason) -> Self {
		Self {
			enabled: true,
			reason,
		}
	}

	pub fn off(reason: FlagReason) -> Self {
		Self {
			enabled: false,
			reason,
		}
	}

	/// The safe default for a flag with no registered definition.
	pub fn not_found() -> Self {
		Self::off(FlagReason::NotFound)
	}
}

/// Why a flag evaluated the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlagReason {
	/// Master switch is off
	Disabled,
	/// Subject's school is not in the target set
	SchoolNotTargeted,
	/// Subject's role is not in the target set
	RoleNotTargeted,
	/// Rollout is 100%, bucket not consulted
	FullRollout,
	InRollout { bucket: u32 },
	OutOfRollout { bucket: u32 },
	/// No definition registered under this name
	NotFound,
}

/// Result of assigning a subject to an experiment variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAssignment {
	pub experiment: String,
	/// Empty when the experiment is unknown.
	pub variant: String,
	pub reason: AssignmentReason,
}

impl VariantAssignment {
	pub fn new(
		experiment: impl Into<String>,
		variant: impl Into<String>,
		reason: AssignmentReason,
	) -> Self {
		Self {
			experiment: experiment.into(),
			variant: variant.into(),
			reason,
		}
	}

	/// The safe default for an experiment with no registered definition.
	pub fn not_found(experiment: impl Into<String>) -> Self {
		Self::new(experiment, String::new(), AssignmentReason::NotFound)
	}

	/// True when the subject actually entered the experiment and an exposure is due.
	pub fn is_exposure(&self) -> bool {
		matches!(self.reason, AssignmentReason::Bucketed { .. })
	}
}

/// Why a subject received a given variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssignmentReason {
	/// Experiment is not active; control served
	NotActive { status: ExperimentStatus },
	/// Active but outside its start/end window; control served
	OutsideWindow,
	/// Assigned by traffic split
	Bucketed { bucket: u32 },
	/// No definition registered under this name
	NotFound,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_not_found_defaults() {
		let flag = FlagEvaluation::not_found();
		assert!(!flag.enabled);
		assert_eq!(flag.reason, FlagReason::NotFound);

		let assignment = VariantAssignment::not_found("missing");
		assert_eq!(assignment.experiment, "missing");
		assert!(assignment.variant.is_empty());
		assert!(!assignment.is_exposure());
	}

	#[test]
	fn test_only_bucketed_assignments_are_exposures() {
		let bucketed = VariantAssignment::new("exp", "b", AssignmentReason::Bucketed { bucket: 3 });
		assert!(bucketed.is_exposure());

		for reason in [
			AssignmentReason::NotActive {
				status: ExperimentStatus::Paused,
			},
			AssignmentReason::OutsideWindow,
			AssignmentReason::NotFound,
		] {
			assert!(!VariantAssignment::new("exp", "a", reason).is_exposure());
		}
	}

	#[test]
	fn test_reason_serialization() {
		let json = serde_json::to_value(FlagReason::InRollout { bucket: 7 }).unwrap();
		assert_eq!(json, serde_json::json!({"type": "in_rollout", "bucket": 7}));

		let json = serde_json::to_value(AssignmentReason::NotActive {
			status: ExperimentStatus::Draft,
		})
		.unwrap();
		assert_eq!(json, serde_json::json!({"type": "not_active", "status": "draft"}));
	}
}
