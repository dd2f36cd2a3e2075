// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::definition::ExperimentDefinition;
use crate::error::{FlagsError, Result};
use crate::evaluation::{AssignmentReason, VariantAssignment};
use crate::hash::{self, HashVersion, BUCKET_HASH_VERSION};
use crate::subject::validate_name;

/// Lifecycle state of an experiment.
///
/// ```text
/// draft -> active <-> paused
///            |          |
///            +-> completed <-+
/// ```
///
/// Nothing leaves `completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
	#[default]
	Draft,
	Active,
	Paused,
	Completed,
}

impl ExperimentStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			ExperimentStatus::Draft => "draft",
			ExperimentStatus::Active => "active",
			ExperimentStatus::Paused => "paused",
			ExperimentStatus::Completed => "completed",
		}
	}

	pub fn can_transition_to(&self, to: ExperimentStatus) -> bool {
		use ExperimentStatus::*;
		matches!(
			(self, to),
			(Draft, Active) | (Active, Paused) | (Paused, Active) | (Active, Completed) | (Paused, Completed)
		)
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, ExperimentStatus::Completed)
	}
}

impl std::fmt::Display for ExperimentStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for ExperimentStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"draft" => Ok(ExperimentStatus::Draft),
			"active" => Ok(ExperimentStatus::Active),
			"paused" => Ok(ExperimentStatus::Paused),
			"completed" => Ok(ExperimentStatus::Completed),
			other => Err(format!("unknown experiment status: {other}")),
		}
	}
}

/// A named A/B(/n) test with an ordered variant list and a traffic split.
///
/// `variants[0]` is the control. Construction rejects malformed definitions,
/// so every `Experiment` value satisfies:
/// - `variants.len() == traffic_split.len()`
/// - `traffic_split` sums to exactly 100
/// - variant names are unique and non-empty
/// - `start_date <= end_date` when both are set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExperimentDefinition", into = "ExperimentDefinition")]
pub struct Experiment {
	name: String,
	variants: Vec<String>,
	traffic_split: Vec<u32>,
	status: ExperimentStatus,
	start_date: Option<DateTime<Utc>>,
	end_date: Option<DateTime<Utc>>,
	description: Option<String>,
}

impl Experiment {
	/// Creates a draft experiment, validating the variant list and split.
	pub fn new<V, S>(name: impl Into<String>, variants: V, traffic_split: Vec<u32>) -> Result<Self>
	where
		V: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let experiment = Self {
			name: name.into(),
			variants: variants.into_iter().map(Into::into).collect(),
			traffic_split,
			status: ExperimentStatus::Draft,
			start_date: None,
			end_date: None,
			description: None,
		};
		experiment.validate()?;
		Ok(experiment)
	}

	/// Sets the initial status, e.g. for definitions loaded already running.
	pub fn with_status(mut self, status: ExperimentStatus) -> Self {
		self.status = status;
		self
	}

	/// Bounds when an active experiment admits traffic. Either end may be open.
	pub fn with_window(
		mut self,
		start_date: Option<DateTime<Utc>>,
		end_date: Option<DateTime<Utc>>,
	) -> Result<Self> {
		if let (Some(start), Some(end)) = (start_date, end_date) {
			if start > end {
				return Err(FlagsError::InvalidWindow);
			}
		}
		self.start_date = start_date;
		self.end_date = end_date;
		Ok(self)
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	fn validate(&self) -> Result<()> {
		if !validate_name(&self.name) {
			return Err(FlagsError::InvalidName(self.name.clone()));
		}

		if self.variants.is_empty() {
			return Err(FlagsError::EmptyVariants);
		}

		if self.variants.len() != self.traffic_split.len() {
			return Err(FlagsError::VariantSplitLengthMismatch {
				variants: self.variants.len(),
				splits: self.traffic_split.len(),
			});
		}

		let mut seen = HashSet::with_capacity(self.variants.len());
		for variant in &self.variants {
			if variant.is_empty() {
				return Err(FlagsError::InvalidName(variant.clone()));
			}
			if !seen.insert(variant.as_str()) {
				return Err(FlagsError::DuplicateVariant(variant.clone()));
			}
		}

		let total: u64 = self.traffic_split.iter().map(|&w| u64::from(w)).sum();
		if total != 100 {
			return Err(FlagsError::TrafficSplitSum(total));
		}

		Ok(())
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn variants(&self) -> &[String] {
		&self.variants
	}

	pub fn traffic_split(&self) -> &[u32] {
		&self.traffic_split
	}

	pub fn status(&self) -> ExperimentStatus {
		self.status
	}

	pub fn start_date(&self) -> Option<DateTime<Utc>> {
		self.start_date
	}

	pub fn end_date(&self) -> Option<DateTime<Utc>> {
		self.end_date
	}

	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}

	/// The control (baseline) variant.
	pub fn control(&self) -> &str {
		&self.variants[0]
	}

	/// Returns a copy of this experiment moved to `to`, if the transition is legal.
	pub fn transition(&self, to: ExperimentStatus) -> Result<Self> {
		if !self.status.can_transition_to(to) {
			return Err(FlagsError::InvalidTransition {
				from: self.status,
				to,
			});
		}
		Ok(Self {
			status: to,
			..self.clone()
		})
	}

	pub fn activate(&self) -> Result<Self> {
		self.transition(ExperimentStatus::Active)
	}

	pub fn pause(&self) -> Result<Self> {
		self.transition(ExperimentStatus::Paused)
	}

	pub fn complete(&self) -> Result<Self> {
		self.transition(ExperimentStatus::Completed)
	}

	/// True when the experiment is active and `now` falls inside its window (inclusive).
	pub fn is_admitting(&self, now: DateTime<Utc>) -> bool {
		self.status == ExperimentStatus::Active && self.in_window(now)
	}

	fn in_window(&self, now: DateTime<Utc>) -> bool {
		self.start_date.map_or(true, |start| now >= start)
			&& self.end_date.map_or(true, |end| now <= end)
	}

	/// Assigns a subject to a variant.
	///
	/// Subjects only enter the experiment (and count as an exposure) when it is
	/// active and `now` is inside its window; otherwise they get the control.
	pub fn assign(&self, subject_id: &str, now: DateTime<Utc>) -> VariantAssignment {
		if self.status != ExperimentStatus::Active {
			return VariantAssignment::new(
				&self.name,
				self.control(),
				AssignmentReason::NotActive {
					status: self.status,
				},
			);
		}

		if !self.in_window(now) {
			return VariantAssignment::new(&self.name, self.control(), AssignmentReason::OutsideWindow);
		}

		let bucket = hash::bucket(&self.name, subject_id);
		VariantAssignment::new(
			&self.name,
			self.variant_for_bucket(bucket),
			AssignmentReason::Bucketed { bucket },
		)
	}

	/// Variant name only; see [`Experiment::assign`].
	pub fn assign_variant(&self, subject_id: &str, now: DateTime<Utc>) -> String {
		self.assign(subject_id, now).variant
	}

	/// Walks the cumulative split and returns the first variant whose running
	/// total exceeds `bucket`.
	pub fn variant_for_bucket(&self, bucket: u32) -> &str {
		let mut cumulative = 0u32;
		for (variant, weight) in self.variants.iter().zip(&self.traffic_split) {
			cumulative += weight;
			if bucket < cumulative {
				return variant;
			}
		}

		// Unreachable while the split sums to 100.
		self.variants.last().map_or("", String::as_str)
	}

	pub fn summary(&self) -> ExperimentSummary {
		ExperimentSummary {
			name: self.name.clone(),
			variants: self.variants.clone(),
			traffic_split: self.traffic_split.clone(),
			status: self.status,
			start_date: self.start_date,
			end_date: self.end_date,
			description: self.description.clone(),
			hash_version: BUCKET_HASH_VERSION,
		}
	}

	pub(crate) fn into_parts(self) -> ExperimentDefinition {
		ExperimentDefinition {
			name: self.name,
			variants: self.variants,
			traffic_split: self.traffic_split.into_iter().map(i64::from).collect(),
			status: self.status,
			start_date: self.start_date,
			end_date: self.end_date,
			description: self.description,
		}
	}
}

/// Read-only view of an experiment for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSummary {
	pub name: String,
	pub variants: Vec<String>,
	pub traffic_split: Vec<u32>,
	pub status: ExperimentStatus,
	pub start_date: Option<DateTime<Utc>>,
	pub end_date: Option<DateTime<Utc>>,
	pub description: Option<String>,
	pub hash_version: HashVersion,
}
