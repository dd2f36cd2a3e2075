// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire/config shapes for flag and experiment definitions.
//!
//! Definitions are what a definition store hands the engine. They are loosely
//! typed (signed integers, plain lists) so that malformed input reaches
//! validation and is reported as a [`FlagsError`] rather than a parse error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FlagsError, Result};
use crate::experiment::{Experiment, ExperimentStatus};
use crate::flag::FeatureFlag;

fn default_true() -> bool {
	true
}

fn default_rollout() -> i64 {
	100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
	pub name: String,
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_rollout")]
	pub rollout_percentage: i64,
	#[serde(default)]
	pub target_schools: Vec<String>,
	#[serde(default)]
	pub target_roles: Vec<String>,
	#[serde(default)]
	pub description: Option<String>,
}

impl TryFrom<FlagDefinition> for FeatureFlag {
	type Error = FlagsError;

	fn try_from(def: FlagDefinition) -> Result<Self> {
		let rollout_percentage = u32::try_from(def.rollout_percentage)
			.ok()
			.filter(|p| *p <= 100)
			.ok_or(FlagsError::InvalidRolloutPercentage(def.rollout_percentage))?;

		let flag = FeatureFlag {
			name: def.name,
			enabled: def.enabled,
			rollout_percentage,
			target_schools: def.target_schools.into_iter().collect(),
			target_roles: def.target_roles.into_iter().collect(),
			description: def.description,
		};
		flag.validate()?;
		Ok(flag)
	}
}

impl From<FeatureFlag> for FlagDefinition {
	fn from(flag: FeatureFlag) -> Self {
		Self {
			name: flag.name,
			enabled: flag.enabled,
			rollout_percentage: i64::from(flag.rollout_percentage),
			target_schools: flag.target_schools.into_iter().collect(),
			target_roles: flag.target_roles.into_iter().collect(),
			description: flag.description,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
	pub name: String,
	pub variants: Vec<String>,
	pub traffic_split: Vec<i64>,
	#[serde(default)]
	pub status: ExperimentStatus,
	#[serde(default)]
	pub start_date: Option<DateTime<Utc>>,
	#[serde(default)]
	pub end_date: Option<DateTime<Utc>>,
	#[serde(default)]
	pub description: Option<String>,
}

impl TryFrom<ExperimentDefinition> for Experiment {
	type Error = FlagsError;

	fn try_from(def: ExperimentDefinition) -> Result<Self> {
		let mut split = Vec::with_capacity(def.traffic_split.len());
		for (idx, &value) in def.traffic_split.iter().enumerate() {
			let weight = u32::try_from(value).map_err(|_| FlagsError::NegativeTrafficSplit {
				variant: def.variants.get(idx).cloned().unwrap_or_default(),
				value,
			})?;
			split.push(weight);
		}

		let mut experiment = Experiment::new(def.name, def.variants, split)?
			.with_status(def.status)
			.with_window(def.start_date, def.end_date)?;
		if let Some(description) = def.description {
			experiment = experiment.with_description(description);
		}
		Ok(experiment)
	}
}

impl From<Experiment> for ExperimentDefinition {
	fn from(experiment: Experiment) -> Self {
		experiment.into_parts()
	}
}

/// A full set of definitions as loaded from a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definitions {
	#[serde(default)]
	pub flags: Vec<FlagDefinition>,
	#[serde(default)]
	pub experiments: Vec<ExperimentDefinition>,
}

impl Definitions {
	pub fn is_empty(&self) -> bool {
		self.flags.is_empty() && self.experiments.is_empty()
	}
}
