// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::ExperimentStatus;

/// Errors raised when building, registering or transitioning flags and experiments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlagsError {
	#[error("invalid name: {0:?}")]
	InvalidName(String),

	#[error("rollout percentage must be between 0 and 100, got {0}")]
	InvalidRolloutPercentage(i64),

	#[error("experiment must declare at least one variant")]
	EmptyVariants,

	#[error("{variants} variants but {splits} traffic split entries")]
	VariantSplitLengthMismatch { variants: usize, splits: usize },

	#[error("traffic split for variant {variant:?} is negative: {value}")]
	NegativeTrafficSplit { variant: String, value: i64 },

	#[error("traffic split must sum to 100, got {0}")]
	TrafficSplitSum(u64),

	#[error("duplicate variant: {0}")]
	DuplicateVariant(String),

	#[error("experiment window starts after it ends")]
	InvalidWindow,

	#[error("cannot transition experiment from {from} to {to}")]
	InvalidTransition {
		from: ExperimentStatus,
		to: ExperimentStatus,
	},

	#[error("experiment {0} is completed and can no longer change")]
	ExperimentCompleted(String),

	#[error("experiment not found: {0}")]
	ExperimentNotFound(String),
}

impl FlagsError {
	/// Returns true for malformed definitions rejected at registration time.
	pub fn is_validation(&self) -> bool {
		matches!(
			self,
			FlagsError::InvalidName(_)
				| FlagsError::InvalidRolloutPercentage(_)
				| FlagsError::EmptyVariants
				| FlagsError::VariantSplitLengthMismatch { .. }
				| FlagsError::NegativeTrafficSplit { .. }
				| FlagsError::TrafficSplitSum(_)
				| FlagsError::DuplicateVariant(_)
				| FlagsError::InvalidWindow
		)
	}
}

pub type Result<T> = std::result::Result<T, FlagsError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn validation_errors_are_classified() {
		assert!(FlagsError::TrafficSplitSum(80).is_validation());
		assert!(FlagsError::DuplicateVariant("a".to_string()).is_validation());
		assert!(FlagsError::InvalidRolloutPercentage(101).is_validation());
		assert!(!FlagsError::ExperimentNotFound("x".to_string()).is_validation());
		assert!(!FlagsError::InvalidTransition {
			from: ExperimentStatus::Completed,
			to: ExperimentStatus::Active,
		}
		.is_validation());
	}

	#[test]
	fn display_messages() {
		assert_eq!(
			FlagsError::TrafficSplitSum(80).to_string(),
			"traffic split must sum to 100, got 80"
		);
		assert_eq!(
			FlagsError::InvalidTransition {
				from: ExperimentStatus::Draft,
				to: ExperimentStatus::Completed,
			}
			.to_string(),
			"cannot transition experiment from draft to completed"
		);
	}
}
