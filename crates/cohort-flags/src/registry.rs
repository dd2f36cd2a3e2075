// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Copy-on-write registry of the current flag and experiment definitions.
//!
//! The registry holds one immutable [`RegistrySnapshot`] behind an `Arc`.
//! Readers clone the `Arc` under a momentary read lock and then work on the
//! snapshot without any further coordination. Writers build a new snapshot
//! from the current one and swap it in under the write lock, so a reader sees
//! either the old or the new record, never a mix of fields from both.

use std::collections::HashMap;
use std::sync::Arc;

use cohort_flags_core::{
	Definitions, Experiment, ExperimentStatus, ExperimentSummary, FeatureFlag, FlagSummary,
	FlagsError,
};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;

/// An immutable view of every registered definition.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
	flags: HashMap<String, Arc<FeatureFlag>>,
	experiments: HashMap<String, Arc<Experiment>>,
	version: u64,
}

impl RegistrySnapshot {
	pub fn flag(&self, name: &str) -> Option<&Arc<FeatureFlag>> {
		self.flags.get(name)
	}

	pub fn experiment(&self, name: &str) -> Option<&Arc<Experiment>> {
		self.experiments.get(name)
	}

	/// Incremented on every published change.
	pub fn version(&self) -> u64 {
		self.version
	}

	pub fn flag_count(&self) -> usize {
		self.flags.len()
	}

	pub fn experiment_count(&self) -> usize {
		self.experiments.len()
	}

	/// Returns true if the snapshot changed.
	fn put_flag(&mut self, flag: FeatureFlag) -> bool {
		if self.flags.get(&flag.name).is_some_and(|f| **f == flag) {
			return false;
		}
		self.flags.insert(flag.name.clone(), Arc::new(flag));
		true
	}

	/// Returns true if the snapshot changed.
	fn put_experiment(&mut self, experiment: Experiment) -> Result<bool> {
		if let Some(existing) = self.experiments.get(experiment.name()) {
			if **existing == experiment {
				return Ok(false);
			}
			if existing.status().is_terminal() {
				return Err(FlagsError::ExperimentCompleted(experiment.name().to_string()));
			}
		}
		self
			.experiments
			.insert(experiment.name().to_string(), Arc::new(experiment));
		Ok(true)
	}
}

/// Which kind of definition a load failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
	Flag,
	Experiment,
}

impl std::fmt::Display for DefinitionKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DefinitionKind::Flag => f.write_str("flag"),
			DefinitionKind::Experiment => f.write_str("experiment"),
		}
	}
}

/// A definition that was rejected during a bulk load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
	pub kind: DefinitionKind,
	pub name: String,
	pub error: FlagsError,
}

/// Outcome of [`Registry::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
	/// Definitions that are now current (changed or already identical).
	pub flags_loaded: usize,
	pub experiments_loaded: usize,
	pub failures: Vec<LoadFailure>,
}

impl LoadReport {
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty()
	}
}

/// Concurrency-safe holder of the current definition snapshot.
#[derive(Debug, Default)]
pub struct Registry {
	current: RwLock<Arc<RegistrySnapshot>>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the current snapshot.
	pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
		Arc::clone(&self.current.read())
	}

	pub fn version(&self) -> u64 {
		self.snapshot().version()
	}

	/// Applies `update` to a copy of the current snapshot and publishes it if it
	/// reports a change. On error nothing is published.
	fn publish<F>(&self, update: F) -> Result<bool>
	where
		F: FnOnce(&mut RegistrySnapshot) -> Result<bool>,
	{
		let mut current = self.current.write();
		let mut next = RegistrySnapshot::clone(&current);
		let changed = update(&mut next)?;
		if changed {
			next.version += 1;
			*current = Arc::new(next);
		}
		Ok(changed)
	}

	/// Inserts or replaces a flag.
	#[instrument(skip(self, flag), fields(flag = %flag.name))]
	pub fn register_flag(&self, flag: FeatureFlag) -> Result<()> {
		if let Err(e) = flag.validate() {
			warn!(error = %e, "rejected flag definition");
			return Err(e);
		}

		if self.publish(|snapshot| Ok(snapshot.put_flag(flag)))? {
			debug!("flag registered");
		}
		Ok(())
	}

	/// Inserts or replaces an experiment.
	///
	/// A completed experiment can only be re-registered with an identical definition.
	#[instrument(skip(self, experiment), fields(experiment = %experiment.name()))]
	pub fn register_experiment(&self, experiment: Experiment) -> Result<()> {
		match self.publish(|snapshot| snapshot.put_experiment(experiment)) {
			Ok(changed) => {
				if changed {
					debug!("experiment registered");
				}
				Ok(())
			}
			Err(e) => {
				warn!(error = %e, "rejected experiment definition");
				Err(e)
			}
		}
	}

	/// Moves a registered experiment through its lifecycle, replacing the whole record.
	#[instrument(skip(self))]
	pub fn transition_experiment(&self, name: &str, to: ExperimentStatus) -> Result<Arc<Experiment>> {
		let mut transitioned = None;
		self.publish(|snapshot| {
			let current = snapshot
				.experiment(name)
				.ok_or_else(|| FlagsError::ExperimentNotFound(name.to_string()))?;
			let next = Arc::new(current.transition(to)?);
			snapshot.experiments.insert(name.to_string(), Arc::clone(&next));
			transitioned = Some(next);
			Ok(true)
		})?;

		let experiment = transitioned.ok_or_else(|| FlagsError::ExperimentNotFound(name.to_string()))?;
		info!(status = %experiment.status(), "experiment transitioned");
		Ok(experiment)
	}

	pub fn get_flag(&self, name: &str) -> Option<Arc<FeatureFlag>> {
		self.snapshot().flag(name).cloned()
	}

	pub fn get_experiment(&self, name: &str) -> Option<Arc<Experiment>> {
		self.snapshot().experiment(name).cloned()
	}

	/// Summaries of every flag, sorted by name.
	pub fn list_flags(&self) -> Vec<FlagSummary> {
		let snapshot = self.snapshot();
		let mut flags: Vec<_> = snapshot.flags.values().map(|f| f.summary()).collect();
		flags.sort_by(|a, b| a.name.cmp(&b.name));
		flags
	}

	/// Summaries of every experiment, sorted by name.
	pub fn list_experiments(&self) -> Vec<ExperimentSummary> {
		let snapshot = self.snapshot();
		let mut experiments: Vec<_> = snapshot.experiments.values().map(|e| e.summary()).collect();
		experiments.sort_by(|a, b| a.name.cmp(&b.name));
		experiments
	}

	/// Registers a batch of definitions and publishes them as one snapshot.
	///
	/// Invalid definitions are skipped and reported; whatever was registered
	/// under their names before stays current.
	#[instrument(skip(self, definitions), fields(flags = definitions.flags.len(), experiments = definitions.experiments.len()))]
	pub fn load(&self, definitions: Definitions) -> LoadReport {
		let mut report = LoadReport::default();

		let published = self.publish(|snapshot| {
			let mut changed = false;

			for def in definitions.flags {
				let name = def.name.clone();
				match FeatureFlag::try_from(def) {
					Ok(flag) => {
						changed |= snapshot.put_flag(flag);
						report.flags_loaded += 1;
					}
					Err(error) => report.failures.push(LoadFailure {
						kind: DefinitionKind::Flag,
						name,
						error,
					}),
				}
			}

			for def in definitions.experiments {
				let name = def.name.clone();
				match Experiment::try_from(def).and_then(|exp| snapshot.put_experiment(exp)) {
					Ok(c) => {
						changed |= c;
						report.experiments_loaded += 1;
					}
					Err(error) => report.failures.push(LoadFailure {
						kind: DefinitionKind::Experiment,
						name,
						error,
					}),
				}
			}

			Ok(changed)
		});

		if let Err(e) = published {
			// The update closure never fails; failures are collected per definition.
			warn!(error = %e, "definition load was not published");
		}

		for failure in &report.failures {
			warn!(
				kind = %failure.kind,
				name = %failure.name,
				error = %failure.error,
				"skipped invalid definition"
			);
		}
		info!(
			flags = report.flags_loaded,
			experiments = report.experiments_loaded,
			failures = report.failures.len(),
			"definitions loaded"
		);

		report
	}
}
