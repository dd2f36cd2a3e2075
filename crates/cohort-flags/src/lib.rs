// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Feature flag and experiment engine for Cohort.
//!
//! Evaluation is synchronous and lock-light: callers read an immutable
//! snapshot of the registered definitions, evaluate it with the pure functions
//! from `cohort-flags-core`, and hand any resulting exposure to a [`Tracker`].
//!
//! # Features
//!
//! - **Copy-on-write registry**: definitions are replaced whole, never edited in place
//! - **Deterministic bucketing**: versioned SHA-256 buckets shared across processes
//! - **Experiment lifecycle**: draft, active, paused and completed, with checked transitions
//! - **Non-blocking tracking**: bounded drop-oldest queue with background delivery
//! - **Definition reload**: pluggable sources with periodic polling
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cohort_flags::{Experiment, ExperimentStatus, FeatureFlag, FlagsEngine, RecordingTracker, Registry};
//!
//! let tracker = Arc::new(RecordingTracker::new());
//! let engine = FlagsEngine::new(Arc::new(Registry::new()), tracker.clone());
//!
//! engine.register_flag(FeatureFlag::new("new_dashboard").with_target_schools(["S1"])).unwrap();
//! assert!(engine.is_enabled("new_dashboard", "user-1", Some("S1"), None));
//! assert!(!engine.is_enabled("new_dashboard", "user-1", Some("S2"), None));
//!
//! let experiment = Experiment::new("homepage_layout", ["control", "hero"], vec![50, 50])
//!     .unwrap()
//!     .with_status(ExperimentStatus::Active);
//! engine.register_experiment(experiment).unwrap();
//!
//! let variant = engine.get_variant("homepage_layout", "user-1");
//! assert_eq!(tracker.exposures()[0].variant, variant);
//! ```

mod definitions;
mod engine;
mod error;
mod registry;
mod tracking;

pub use definitions::{
	load_into, spawn_definition_reloader, DefinitionSource, StaticDefinitionSource,
	TomlDefinitionSource,
};
pub use engine::FlagsEngine;
pub use error::{DefinitionError, Result, TrackingError};
pub use registry::{DefinitionKind, LoadFailure, LoadReport, Registry, RegistrySnapshot};
pub use tracking::{
	BatchConfig, NoOpTracker, QueuedTracker, RecordingTracker, Tracker, TrackingSink, TracingSink,
	MIN_FLUSH_INTERVAL,
};

// Re-export core types for convenience
pub use cohort_flags_core::{
	AssignmentReason, ConversionEvent, Definitions, Experiment, ExperimentDefinition,
	ExperimentStatus, ExperimentSummary, ExposureEvent, FeatureFlag, FlagDefinition,
	FlagEvaluation, FlagReason, FlagSummary, FlagsError, HashVersion, Subject, TrackingEvent,
	VariantAssignment, BUCKET_HASH_VERSION,
};
pub use cohort_flags_core::{bucket, digest_hex};
