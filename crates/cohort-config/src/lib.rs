// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for processes embedding the Cohort flags engine.
//!
//! This crate provides:
//! - Layered configuration from defaults, a TOML file and the environment
//! - Consistent environment variable naming (`COHORT_*`)
//! - Validation of the resolved values
//!
//! # Usage
//!
//! ```ignore
//! use cohort_config::load_config;
//!
//! let config = load_config()?;
//! println!("tracking queue holds {} events", config.tracking.max_queue_size);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::EngineConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;

use tracing::{debug, info};

/// Fully resolved engine configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
	pub tracking: TrackingConfig,
	pub definitions: DefinitionsConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`COHORT_*`)
/// 2. Config file (`/etc/cohort/flags.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<EngineConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_from(config_path: impl Into<PathBuf>) -> Result<EngineConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merges `sources` in precedence order and resolves the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<EngineConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = EngineConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Resolves a merged layer and validates it.
pub fn finalize(layer: EngineConfigLayer) -> Result<EngineConfig, ConfigError> {
	let config = EngineConfig {
		tracking: layer.tracking.unwrap_or_default().finalize(),
		definitions: layer.definitions.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		tracking_enabled = config.tracking.enabled,
		max_queue_size = config.tracking.max_queue_size,
		max_batch_size = config.tracking.max_batch_size,
		definitions_configured = config.definitions.path.is_some(),
		reload_interval_secs = config.definitions.reload_interval_secs,
		"engine configuration loaded"
	);

	Ok(config)
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
	if config.tracking.max_queue_size == 0 {
		return Err(ConfigError::Validation(
			"tracking.max_queue_size must be at least 1".to_string(),
		));
	}
	if config.tracking.max_batch_size == 0 {
		return Err(ConfigError::Validation(
			"tracking.max_batch_size must be at least 1".to_string(),
		));
	}
	if config.tracking.flush_interval_ms == 0 {
		return Err(ConfigError::Validation(
			"tracking.flush_interval_ms must be at least 1".to_string(),
		));
	}
	Ok(())
}
