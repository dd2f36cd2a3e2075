// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and the environment.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::EngineConfigLayer;
use crate::sections::{DefinitionsConfigLayer, LogFormat, LoggingConfigLayer, TrackingConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<EngineConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<EngineConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(EngineConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/cohort/flags.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<EngineConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(EngineConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: EngineConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: COHORT_<SECTION>_<FIELD>
pub struct EnvSource;

impl EnvSource {
	/// Builds a layer from an arbitrary variable lookup.
	pub fn load_with<F>(lookup: F) -> Result<EngineConfigLayer, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let env = Env(&lookup);
		Ok(EngineConfigLayer {
			tracking: Some(TrackingConfigLayer {
				enabled: env.bool("COHORT_TRACKING_ENABLED"),
				max_queue_size: env.parse("COHORT_TRACKING_MAX_QUEUE_SIZE")?,
				max_batch_size: env.parse("COHORT_TRACKING_MAX_BATCH_SIZE")?,
				flush_interval_ms: env.parse("COHORT_TRACKING_FLUSH_INTERVAL_MS")?,
			}),
			definitions: Some(DefinitionsConfigLayer {
				path: env.var("COHORT_DEFINITIONS_PATH").map(PathBuf::from),
				reload_interval_secs: env.parse("COHORT_DEFINITIONS_RELOAD_INTERVAL_SECS")?,
			}),
			logging: Some(LoggingConfigLayer {
				level: env.var("COHORT_LOGGING_LEVEL"),
				format: env.parse::<LogFormat>("COHORT_LOGGING_FORMAT")?,
			}),
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<EngineConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Self::load_with(|name| std::env::var(name).ok())
	}
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
	fn var(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self
			.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T: std::str::FromStr,
		T::Err: std::fmt::Display,
	{
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|e| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid value '{v}': {e}"),
			}),
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::Write;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn test_precedence_order() {
		assert!(Precedence::Defaults < Precedence::ConfigFile);
		assert!(Precedence::ConfigFile < Precedence::Environment);
	}

	#[test]
	fn test_env_source_reads_all_sections() {
		let layer = EnvSource::load_with(lookup(&[
			("COHORT_TRACKING_ENABLED", "0"),
			("COHORT_TRACKING_MAX_QUEUE_SIZE", "200"),
			("COHORT_TRACKING_FLUSH_INTERVAL_MS", "100"),
			("COHORT_DEFINITIONS_PATH", "/srv/cohort/definitions.toml"),
			("COHORT_DEFINITIONS_RELOAD_INTERVAL_SECS", "15"),
			("COHORT_LOGGING_LEVEL", "debug"),
			("COHORT_LOGGING_FORMAT", "json"),
		]))
		.unwrap();

		let tracking = layer.tracking.unwrap();
		assert_eq!(tracking.enabled, Some(false));
		assert_eq!(tracking.max_queue_size, Some(200));
		assert_eq!(tracking.max_batch_size, None);
		assert_eq!(tracking.flush_interval_ms, Some(100));

		let definitions = layer.definitions.unwrap();
		assert_eq!(
			definitions.path,
			Some(PathBuf::from("/srv/cohort/definitions.toml"))
		);
		assert_eq!(definitions.reload_interval_secs, Some(15));

		let logging = layer.logging.unwrap();
		assert_eq!(logging.level.as_deref(), Some("debug"));
		assert_eq!(logging.format, Some(LogFormat::Json));
	}

	#[test]
	fn test_env_empty_values_are_unset() {
		let layer = EnvSource::load_with(lookup(&[("COHORT_LOGGING_LEVEL", "")])).unwrap();
		assert!(layer.logging.unwrap().level.is_none());
	}

	#[test]
	fn test_env_invalid_number() {
		let err = EnvSource::load_with(lookup(&[("COHORT_TRACKING_MAX_BATCH_SIZE", "lots")]))
			.unwrap_err();
		match err {
			ConfigError::InvalidValue { key, .. } => {
				assert_eq!(key, "COHORT_TRACKING_MAX_BATCH_SIZE")
			}
			other => panic!("unexpected error: {other}"),
		}
	}

	#[test]
	fn test_env_invalid_format() {
		let err = EnvSource::load_with(lookup(&[("COHORT_LOGGING_FORMAT", "xml")])).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}

	#[test]
	fn test_toml_source_missing_file() {
		let layer = TomlSource::new("/nonexistent/cohort/flags.toml").load().unwrap();
		assert_eq!(layer, EngineConfigLayer::default());
	}

	#[test]
	fn test_toml_source_parses_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[tracking]
max_batch_size = 25

[definitions]
path = "definitions.toml"
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.tracking.unwrap().max_batch_size, Some(25));
		assert_eq!(
			layer.definitions.unwrap().path,
			Some(PathBuf::from("definitions.toml"))
		);
	}

	#[test]
	fn test_toml_source_parse_error() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[tracking\nmax_batch_size = ").unwrap();

		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}
}
