// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The caller-facing engine: flag checks, variant assignment and conversions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cohort_flags_core::{
	ConversionEvent, Experiment, ExperimentStatus, ExperimentSummary, ExposureEvent, FeatureFlag,
	FlagEvaluation, FlagSummary, Subject, VariantAssignment,
};
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::registry::Registry;
use crate::tracking::{NoOpTracker, Tracker};

/// Evaluates flags and experiments against the current registry snapshot.
///
/// Cloning is cheap; clones share the registry and tracker.
#[derive(Clone)]
pub struct FlagsEngine {
	registry: Arc<Registry>,
	tracker: Arc<dyn Tracker>,
}

impl std::fmt::Debug for FlagsEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FlagsEngine")
			.field("registry_version", &self.registry.version())
			.finish_non_exhaustive()
	}
}

impl FlagsEngine {
	pub fn new(registry: Arc<Registry>, tracker: Arc<dyn Tracker>) -> Self {
		Self { registry, tracker }
	}

	/// An engine with an empty registry whose events go nowhere.
	pub fn without_tracking() -> Self {
		Self::new(Arc::new(Registry::new()), Arc::new(NoOpTracker))
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	pub fn register_flag(&self, flag: FeatureFlag) -> Result<()> {
		self.registry.register_flag(flag)
	}

	pub fn register_experiment(&self, experiment: Experiment) -> Result<()> {
		self.registry.register_experiment(experiment)
	}

	/// Whether `flag_name` is on for the subject. Unknown flags are off.
	pub fn is_enabled(
		&self,
		flag_name: &str,
		subject_id: &str,
		school_id: Option<&str>,
		role: Option<&str>,
	) -> bool {
		let subject = Subject {
			id: subject_id.to_string(),
			school_id: school_id.map(str::to_string),
			role: role.map(str::to_string),
		};
		self.evaluate_flag(flag_name, &subject).enabled
	}

	/// Evaluates a flag and reports why it resolved the way it did.
	pub fn evaluate_flag(&self, flag_name: &str, subject: &Subject) -> FlagEvaluation {
		match self.registry.get_flag(flag_name) {
			Some(flag) => flag.evaluate(subject),
			None => {
				warn!(flag = flag_name, "evaluated unknown flag, defaulting to off");
				FlagEvaluation::not_found()
			}
		}
	}

	/// The variant `subject_id` sees right now.
	///
	/// Returns an empty string for an unknown experiment.
	pub fn get_variant(&self, experiment_name: &str, subject_id: &str) -> String {
		self.assign(experiment_name, subject_id, Utc::now()).variant
	}

	/// Assigns a variant at `now`, emitting one exposure when the subject is
	/// actually bucketed into a running experiment.
	pub fn assign(&self, experiment_name: &str, subject_id: &str, now: DateTime<Utc>) -> VariantAssignment {
		let Some(experiment) = self.registry.get_experiment(experiment_name) else {
			warn!(experiment = experiment_name, "assigned unknown experiment");
			return VariantAssignment::not_found(experiment_name);
		};

		let assignment = experiment.assign(subject_id, now);
		if assignment.is_exposure() {
			self.tracker.track_exposure(ExposureEvent::new(
				experiment_name,
				subject_id,
				assignment.variant.clone(),
				now,
			));
		}
		assignment
	}

	/// Records a metric outcome for the subject's variant.
	///
	/// Never emits an exposure. Conversions for unknown experiments are dropped.
	pub fn track_conversion(
		&self,
		experiment_name: &str,
		subject_id: &str,
		metric_name: &str,
		value: Option<f64>,
	) {
		self.track_conversion_at(experiment_name, subject_id, metric_name, value, Utc::now());
	}

	pub fn track_conversion_at(
		&self,
		experiment_name: &str,
		subject_id: &str,
		metric_name: &str,
		value: Option<f64>,
		now: DateTime<Utc>,
	) {
		let Some(experiment) = self.registry.get_experiment(experiment_name) else {
			warn!(
				experiment = experiment_name,
				metric = metric_name,
				"conversion for unknown experiment dropped"
			);
			return;
		};

		let mut event = ConversionEvent::new(experiment_name, subject_id, metric_name, value, now);
		if experiment.is_admitting(now) {
			event = event.with_variant(experiment.assign_variant(subject_id, now));
		} else {
			debug!(
				experiment = experiment_name,
				status = %experiment.status(),
				"conversion recorded outside a running experiment"
			);
		}
		self.tracker.track_conversion(event);
	}

	pub fn list_flags(&self) -> Vec<FlagSummary> {
		self.registry.list_flags()
	}

	pub fn list_experiments(&self) -> Vec<ExperimentSummary> {
		self.registry.list_experiments()
	}

	#[instrument(skip(self))]
	pub fn activate_experiment(&self, name: &str) -> Result<Arc<Experiment>> {
		self.registry.transition_experiment(name, ExperimentStatus::Active)
	}

	#[instrument(skip(self))]
	pub fn pause_experiment(&self, name: &str) -> Result<Arc<Experiment>> {
		self.registry.transition_experiment(name, ExperimentStatus::Paused)
	}

	#[instrument(skip(self))]
	pub fn complete_experiment(&self, name: &str) -> Result<Arc<Experiment>> {
		self.registry.transition_experiment(name, ExperimentStatus::Completed)
	}
}
