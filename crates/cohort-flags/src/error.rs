// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the engine crate.

use std::path::PathBuf;

use thiserror::Error;

/// Failures delivering events to the analytics collaborator.
///
/// These never reach callers of the evaluation API; the dispatcher logs them.
#[derive(Debug, Error)]
pub enum TrackingError {
	/// The sink rejected or failed to deliver a batch.
	#[error("tracking sink failed: {0}")]
	Sink(String),

	/// The tracker no longer accepts events.
	#[error("tracker has been shut down")]
	Shutdown,
}

/// Failures loading definitions from a store.
#[derive(Debug, Error)]
pub enum DefinitionError {
	#[error("failed to read definitions file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse definitions file {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	/// A store-specific failure (network, database, ...).
	#[error("definition source {source_name} failed: {message}")]
	Source {
		source_name: &'static str,
		message: String,
	},
}

pub type Result<T> = std::result::Result<T, cohort_flags_core::FlagsError>;
