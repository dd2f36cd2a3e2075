// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Definition stores and periodic reload into a [`Registry`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cohort_flags_core::Definitions;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::DefinitionError;
use crate::registry::{LoadReport, Registry};

/// A place flag and experiment definitions are read from.
#[async_trait::async_trait]
pub trait DefinitionSource: Send + Sync {
	fn name(&self) -> &'static str;

	async fn load(&self) -> Result<Definitions, DefinitionError>;
}

/// Reads `[[flags]]` and `[[experiments]]` tables from a TOML file.
///
/// Experiment `start_date`/`end_date` may be native TOML offset datetimes
/// (`start_date = 2025-03-01T00:00:00Z`) or quoted RFC 3339 strings.
#[derive(Debug, Clone)]
pub struct TomlDefinitionSource {
	path: PathBuf,
}

impl TomlDefinitionSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[async_trait::async_trait]
impl DefinitionSource for TomlDefinitionSource {
	fn name(&self) -> &'static str {
		"toml-definitions"
	}

	async fn load(&self) -> Result<Definitions, DefinitionError> {
		debug!(path = %self.path.display(), "reading definitions file");
		let content =
			tokio::fs::read_to_string(&self.path)
				.await
				.map_err(|e| DefinitionError::FileRead {
					path: self.path.clone(),
					source: e,
				})?;

		let definitions = parse_definitions(&content).map_err(|e| DefinitionError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!(
			flags = definitions.flags.len(),
			experiments = definitions.experiments.len(),
			"parsed definitions"
		);
		Ok(definitions)
	}
}

fn parse_definitions(content: &str) -> Result<Definitions, toml::de::Error> {
	let mut table: toml::Table = toml::from_str(content)?;

	// Window bounds deserialize from RFC 3339 text.
	if let Some(toml::Value::Array(experiments)) = table.get_mut("experiments") {
		for experiment in experiments.iter_mut().filter_map(toml::Value::as_table_mut) {
			for key in ["start_date", "end_date"] {
				if let Some(toml::Value::Datetime(dt)) = experiment.get(key) {
					let text = dt.to_string();
					experiment.insert(key.to_string(), toml::Value::String(text));
				}
			}
		}
	}

	toml::Value::Table(table).try_into()
}

/// Serves a fixed set of definitions held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticDefinitionSource {
	definitions: Definitions,
}

impl StaticDefinitionSource {
	pub fn new(definitions: Definitions) -> Self {
		Self { definitions }
	}
}

#[async_trait::async_trait]
impl DefinitionSource for StaticDefinitionSource {
	fn name(&self) -> &'static str {
		"static"
	}

	async fn load(&self) -> Result<Definitions, DefinitionError> {
		Ok(self.definitions.clone())
	}
}

/// Reads `source` once and applies the result to `registry`.
#[instrument(skip_all, fields(source = source.name()))]
pub async fn load_into(
	source: &dyn DefinitionSource,
	registry: &Registry,
) -> Result<LoadReport, DefinitionError> {
	let definitions = source.load().await?;
	Ok(registry.load(definitions))
}

/// Reloads definitions from `source` every `interval` on the current runtime.
///
/// A failed read keeps the current definitions and is retried on the next tick.
/// The first load happens immediately. A zero `interval` disables polling: the
/// task loads once and exits.
pub fn spawn_definition_reloader(
	source: Arc<dyn DefinitionSource>,
	registry: Arc<Registry>,
	interval: Duration,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		if interval.is_zero() {
			warn!(
				source = source.name(),
				"reload interval is zero, loading definitions once without polling"
			);
			if let Err(e) = load_into(source.as_ref(), &registry).await {
				error!(error = %e, "failed to load definitions");
			}
			return;
		}

		info!(
			source = source.name(),
			interval_ms = interval.as_millis() as u64,
			"starting definition reloader"
		);

		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			ticker.tick().await;
			match load_into(source.as_ref(), &registry).await {
				Ok(report) => debug!(
					version = registry.version(),
					failures = report.failures.len(),
					"definitions reloaded"
				),
				Err(e) => error!(error = %e, "failed to reload definitions"),
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	const DEFINITIONS: &str = r#"
[[flags]]
name = "new_dashboard"
rollout_percentage = 25
target_roles = ["teacher"]

[[flags]]
name = "broken"
rollout_percentage = 101

[[experiments]]
name = "homepage_layout"
variants = ["control", "hero", "compact"]
traffic_split = [30, 50, 20]
status = "active"
"#;

	fn write_file(content: &str) -> NamedTempFile {
		let mut file = NamedTempFile::new().unwrap();
		file.write_all(content.as_bytes()).unwrap();
		file
	}

	#[tokio::test]
	async fn test_toml_source_loads_into_registry() {
		let file = write_file(DEFINITIONS);
		let source = TomlDefinitionSource::new(file.path());
		let registry = Registry::new();

		let report = load_into(&source, &registry).await.unwrap();

		assert_eq!(report.flags_loaded, 1);
		assert_eq!(report.experiments_loaded, 1);
		assert_eq!(report.failures.len(), 1);
		assert_eq!(report.failures[0].name, "broken");

		let flag = registry.get_flag("new_dashboard").unwrap();
		assert_eq!(flag.rollout_percentage, 25);
		assert!(flag.target_roles.contains("teacher"));
		assert_eq!(
			registry.get_experiment("homepage_layout").unwrap().traffic_split(),
			&[30, 50, 20]
		);
	}

	#[tokio::test]
	async fn test_missing_file_is_read_error() {
		let source = TomlDefinitionSource::new("/nonexistent/cohort/definitions.toml");
		let err = source.load().await.unwrap_err();
		assert!(matches!(err, DefinitionError::FileRead { .. }));
	}

	#[tokio::test]
	async fn test_malformed_file_is_parse_error() {
		let file = write_file("[[flags]\nname = ");
		let source = TomlDefinitionSource::new(file.path());
		let err = source.load().await.unwrap_err();
		assert!(matches!(err, DefinitionError::TomlParse { .. }));
	}

	#[test]
	fn test_static_source() {
		let definitions: Definitions = toml::from_str(DEFINITIONS).unwrap();
		let source = StaticDefinitionSource::new(definitions);
		let registry = Registry::new();

		let report = tokio_test::assert_ok!(tokio_test::block_on(load_into(&source, &registry)));
		assert_eq!(report.flags_loaded, 1);
		assert_eq!(source.name(), "static");
	}

	#[tokio::test]
	async fn test_native_toml_datetimes_accepted() {
		let file = write_file(
			r#"
[[experiments]]
name = "spring_pilot"
variants = ["control", "treatment"]
traffic_split = [50, 50]
status = "active"
start_date = 2025-03-01T00:00:00Z
end_date = "2025-06-01T00:00:00Z"
"#,
		);
		let definitions = TomlDefinitionSource::new(file.path()).load().await.unwrap();

		let experiment = &definitions.experiments[0];
		assert_eq!(
			experiment.start_date.unwrap().to_rfc3339(),
			"2025-03-01T00:00:00+00:00"
		);
		assert_eq!(
			experiment.end_date.unwrap().to_rfc3339(),
			"2025-06-01T00:00:00+00:00"
		);
	}

	#[tokio::test]
	async fn test_local_datetime_is_parse_error() {
		let file = write_file(
			r#"
[[experiments]]
name = "spring_pilot"
variants = ["control"]
traffic_split = [100]
start_date = 2025-03-01T00:00:00
"#,
		);
		let err = TomlDefinitionSource::new(file.path()).load().await.unwrap_err();
		assert!(matches!(err, DefinitionError::TomlParse { .. }));
	}

	#[tokio::test]
	async fn test_zero_interval_loads_once_and_exits() {
		let definitions: Definitions = toml::from_str(DEFINITIONS).unwrap();
		let source: Arc<dyn DefinitionSource> = Arc::new(StaticDefinitionSource::new(definitions));
		let registry = Arc::new(Registry::new());

		let handle = spawn_definition_reloader(source, Arc::clone(&registry), Duration::ZERO);
		handle.await.unwrap();

		assert!(registry.get_flag("new_dashboard").is_some());
		assert_eq!(registry.version(), 1);
	}

	#[tokio::test]
	async fn test_reloader_picks_up_changes() {
		let file = write_file(DEFINITIONS);
		let source: Arc<dyn DefinitionSource> = Arc::new(TomlDefinitionSource::new(file.path()));
		let registry = Arc::new(Registry::new());

		let handle =
			spawn_definition_reloader(source, Arc::clone(&registry), Duration::from_millis(20));

		for _ in 0..250 {
			if registry.get_flag("new_dashboard").is_some() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert_eq!(registry.get_flag("new_dashboard").unwrap().rollout_percentage, 25);

		std::fs::write(
			file.path(),
			DEFINITIONS.replace("rollout_percentage = 25", "rollout_percentage = 75"),
		)
		.unwrap();

		for _ in 0..250 {
			if registry.get_flag("new_dashboard").unwrap().rollout_percentage == 75 {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert_eq!(registry.get_flag("new_dashboard").unwrap().rollout_percentage, 75);

		handle.abort();
	}
}
