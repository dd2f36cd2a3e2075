// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{FlagsError, Result};
use crate::evaluation::{FlagEvaluation, FlagReason};
use crate::hash::{self, HashVersion, BUCKET_HASH_VERSION};
use crate::subject::{validate_name, Subject};

/// A named boolean gate with optional tenant/role targeting and gradual rollout.
///
/// Flags are replaced wholesale in the registry, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
	pub name: String,
	/// Master kill switch.
	pub enabled: bool,
	/// 0-100, applied after targeting.
	pub rollout_percentage: u32,
	/// Empty = all schools.
	#[serde(default)]
	pub target_schools: BTreeSet<String>,
	/// Empty = all roles.
	#[serde(default)]
	pub target_roles: BTreeSet<String>,
	#[serde(default)]
	pub description: Option<String>,
}

impl FeatureFlag {
	/// Creates an enabled flag rolled out to every subject.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			enabled: true,
			rollout_percentage: 100,
			target_schools: BTreeSet::new(),
			target_roles: BTreeSet::new(),
			description: None,
		}
	}

	pub fn with_enabled(mut self, enabled: bool) -> Self {
		self.enabled = enabled;
		self
	}

	pub fn with_rollout(mut self, percentage: u32) -> Self {
		self.rollout_percentage = percentage;
		self
	}

	pub fn with_target_schools<I, S>(mut self, schools: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.target_schools = schools.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_target_roles<I, S>(mut self, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.target_roles = roles.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	/// Checks the flag's invariants.
	pub fn validate(&self) -> Result<()> {
		if !validate_name(&self.name) {
			return Err(FlagsError::InvalidName(self.name.clone()));
		}
		if self.rollout_percentage > 100 {
			return Err(FlagsError::InvalidRolloutPercentage(i64::from(
				self.rollout_percentage,
			)));
		}
		Ok(())
	}

	/// Evaluates the flag for a subject.
	///
	/// The evaluation order is:
	/// 1. Master switch
	/// 2. School targeting (skipped when no schools are targeted)
	/// 3. Role targeting (skipped when no roles are targeted)
	/// 4. Rollout percentage, comparing the subject's bucket against the threshold
	pub fn evaluate(&self, subject: &Subject) -> FlagEvaluation {
		if !self.enabled {
			return FlagEvaluation::off(FlagReason::Disabled);
		}

		if !is_targeted(&self.target_schools, subject.school_id.as_deref()) {
			return FlagEvaluation::off(FlagReason::SchoolNotTargeted);
		}

		if !is_targeted(&self.target_roles, subject.role.as_deref()) {
			return FlagEvaluation::off(FlagReason::RoleNotTargeted);
		}

		if self.rollout_percentage >= 100 {
			return FlagEvaluation::on(FlagReason::FullRollout);
		}

		let bucket = hash::bucket(&self.name, &subject.id);
		if bucket < self.rollout_percentage {
			FlagEvaluation::on(FlagReason::InRollout { bucket })
		} else {
			FlagEvaluation::off(FlagReason::OutOfRollout { bucket })
		}
	}

	pub fn is_enabled(&self, subject: &Subject) -> bool {
		self.evaluate(subject).enabled
	}

	pub fn summary(&self) -> FlagSummary {
		FlagSummary {
			name: self.name.clone(),
			enabled: self.enabled,
			rollout_percentage: self.rollout_percentage,
			target_schools: self.target_schools.iter().cloned().collect(),
			target_roles: self.target_roles.iter().cloned().collect(),
			description: self.description.clone(),
			hash_version: BUCKET_HASH_VERSION,
		}
	}
}

/// An empty target set admits everyone; otherwise the attribute must be present and listed.
fn is_targeted(targets: &BTreeSet<String>, value: Option<&str>) -> bool {
	if targets.is_empty() {
		return true;
	}
	value.is_some_and(|v| targets.contains(v))
}

/// Read-only view of a flag for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSummary {
	pub name: String,
	pub enabled: bool,
	pub rollout_percentage: u32,
	pub target_schools: Vec<String>,
	pub target_roles: Vec<String>,
	pub description: Option<String>,
	pub hash_version: HashVersion,
}
