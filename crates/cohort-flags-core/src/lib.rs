// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Cohort feature flags and experiments engine.
//!
//! This crate holds the pure parts of the system: versioned subject bucketing,
//! feature flag evaluation, experiment variant assignment and lifecycle, and
//! the exposure/conversion event shapes. Nothing here performs I/O or holds
//! shared state; the registry and tracking dispatch live in `cohort-flags`.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use cohort_flags_core::{Experiment, ExperimentStatus, FeatureFlag, Subject};
//!
//! let flag = FeatureFlag::new("new_dashboard")
//!     .with_rollout(25)
//!     .with_target_roles(["teacher"]);
//! let teacher = Subject::new("user-2").with_role("teacher");
//! assert!(flag.is_enabled(&teacher));
//!
//! let experiment = Experiment::new("homepage_layout", ["control", "hero"], vec![50, 50])
//!     .unwrap()
//!     .with_status(ExperimentStatus::Active);
//! let variant = experiment.assign_variant("user-1", Utc::now());
//! assert!(variant == "control" || variant == "hero");
//! ```

pub mod definition;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod flag;
pub mod hash;
pub mod subject;
pub mod tracking;

pub use definition::{Definitions, ExperimentDefinition, FlagDefinition};
pub use error::{FlagsError, Result};
pub use evaluation::{AssignmentReason, FlagEvaluation, FlagReason, VariantAssignment};
pub use experiment::{Experiment, ExperimentStatus, ExperimentSummary};
pub use flag::{FeatureFlag, FlagSummary};
pub use hash::{bucket, bucket_with, digest_hex, HashVersion, BUCKET_COUNT, BUCKET_HASH_VERSION};
pub use subject::{validate_name, Subject};
pub use tracking::{ConversionEvent, EventId, ExposureEvent, TrackingEvent};
