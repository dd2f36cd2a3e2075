// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use cohort_config::{EngineConfig, TrackingConfig};
use cohort_flags::{
	bucket, digest_hex, load_into, spawn_definition_reloader, BatchConfig, DefinitionSource,
	FlagsEngine, LoadReport, NoOpTracker, QueuedTracker, Registry, Subject,
	TomlDefinitionSource, TracingSink, Tracker, BUCKET_HASH_VERSION,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Output {
	pub json: bool,
}

impl Output {
	fn emit(&self, value: serde_json::Value, human: impl FnOnce() -> String) {
		if self.json {
			println!("{value}");
		} else {
			println!("{}", human());
		}
	}
}

/// An engine loaded from the configured definitions, plus its tracking dispatcher.
pub struct Session {
	pub engine: FlagsEngine,
	dispatcher: Option<(Arc<QueuedTracker>, JoinHandle<()>)>,
}

impl Session {
	pub async fn start(config: &EngineConfig) -> anyhow::Result<Self> {
		let registry = Arc::new(Registry::new());
		match &config.definitions.path {
			Some(path) => {
				let source = TomlDefinitionSource::new(path);
				load_into(&source, &registry)
					.await
					.with_context(|| format!("loading definitions from {}", path.display()))?;
			}
			None => warn!("no definitions path configured, every flag evaluates off"),
		}

		let mut dispatcher = None;
		let tracker: Arc<dyn Tracker> = if config.tracking.enabled {
			let (queued, handle) =
				QueuedTracker::spawn(batch_config(&config.tracking), Arc::new(TracingSink));
			dispatcher = Some((Arc::clone(&queued), handle));
			queued
		} else {
			Arc::new(NoOpTracker)
		};

		Ok(Self {
			engine: FlagsEngine::new(registry, tracker),
			dispatcher,
		})
	}

	/// Delivers any queued events before the process exits.
	pub async fn finish(self) -> anyhow::Result<()> {
		if let Some((tracker, handle)) = self.dispatcher {
			if let Err(e) = tracker.shutdown().await {
				warn!(error = %e, "failed to deliver tracking events on shutdown");
			}
			handle.await.context("tracking dispatcher panicked")?;
		}
		Ok(())
	}
}

pub fn batch_config(tracking: &TrackingConfig) -> BatchConfig {
	BatchConfig {
		max_queue_size: tracking.max_queue_size,
		max_batch_size: tracking.max_batch_size,
		flush_interval: tracking.flush_interval(),
	}
}

pub fn flag(
	out: &Output,
	session: &Session,
	name: &str,
	subject_id: &str,
	school: Option<String>,
	role: Option<String>,
) {
	let subject = Subject {
		id: subject_id.to_string(),
		school_id: school,
		role,
	};
	let evaluation = session.engine.evaluate_flag(name, &subject);
	out.emit(
		serde_json::json!({ "flag": name, "subject": subject_id, "evaluation": evaluation }),
		|| format!("{name} = {} ({:?})", evaluation.enabled, evaluation.reason),
	);
}

pub fn variant(
	out: &Output,
	session: &Session,
	experiment: &str,
	subject_id: &str,
	at: Option<DateTime<Utc>>,
) {
	let assignment = session
		.engine
		.assign(experiment, subject_id, at.unwrap_or_else(Utc::now));
	out.emit(
		serde_json::json!({ "subject": subject_id, "assignment": assignment }),
		|| format!("{experiment} = {:?} ({:?})", assignment.variant, assignment.reason),
	);
}

pub fn list(out: &Output, session: &Session) -> anyhow::Result<()> {
	let flags = session.engine.list_flags();
	let experiments = session.engine.list_experiments();

	if out.json {
		let value = serde_json::json!({ "flags": flags, "experiments": experiments });
		println!("{}", serde_json::to_string_pretty(&value)?);
		return Ok(());
	}

	println!("flags:");
	for f in &flags {
		println!(
			"  {:<32} enabled={:<5} rollout={:>3}% schools={:?} roles={:?}",
			f.name, f.enabled, f.rollout_percentage, f.target_schools, f.target_roles
		);
	}
	println!("experiments:");
	for e in &experiments {
		println!(
			"  {:<32} status={:<9} variants={:?} split={:?}",
			e.name,
			e.status.as_str(),
			e.variants,
			e.traffic_split
		);
	}
	Ok(())
}

pub async fn check(out: &Output, config: &EngineConfig) -> anyhow::Result<()> {
	let Some(path) = &config.definitions.path else {
		bail!("no definitions file given; pass --definitions or set COHORT_DEFINITIONS_PATH");
	};

	let registry = Registry::new();
	let report = load_into(&TomlDefinitionSource::new(path), &registry)
		.await
		.with_context(|| format!("loading definitions from {}", path.display()))?;

	print_report(out, &report);
	if !report.is_clean() {
		bail!("{} invalid definition(s)", report.failures.len());
	}
	Ok(())
}

fn print_report(out: &Output, report: &LoadReport) {
	let failures: Vec<_> = report
		.failures
		.iter()
		.map(|f| {
			serde_json::json!({
				"kind": f.kind.to_string(),
				"name": f.name,
				"error": f.error.to_string(),
			})
		})
		.collect();
	out.emit(
		serde_json::json!({
			"flags_loaded": report.flags_loaded,
			"experiments_loaded": report.experiments_loaded,
			"failures": failures,
		}),
		|| {
			let mut text = format!(
				"{} flag(s), {} experiment(s) valid",
				report.flags_loaded, report.experiments_loaded
			);
			for f in &report.failures {
				text.push_str(&format!("\n  invalid {} {:?}: {}", f.kind, f.name, f.error));
			}
			text
		},
	);
}

pub fn hash(out: &Output, scope: &str, subject_id: &str) -> anyhow::Result<()> {
	let bucket = bucket(scope, subject_id);
	let digest = digest_hex(scope, subject_id);
	out.emit(
		serde_json::json!({
			"scope": scope,
			"subject": subject_id,
			"bucket": bucket,
			"digest": digest,
			"hash_version": BUCKET_HASH_VERSION,
		}),
		|| format!("bucket={bucket} digest={digest} version={BUCKET_HASH_VERSION}"),
	);
	Ok(())
}

pub async fn watch(config: &EngineConfig) -> anyhow::Result<()> {
	let Some(path) = config.definitions.path.clone() else {
		bail!("no definitions file given; pass --definitions or set COHORT_DEFINITIONS_PATH");
	};
	let interval = config
		.definitions
		.reload_interval()
		.unwrap_or(std::time::Duration::from_secs(5));

	let registry = Arc::new(Registry::new());
	let source: Arc<dyn DefinitionSource> = Arc::new(TomlDefinitionSource::new(path));
	let reloader = spawn_definition_reloader(source, Arc::clone(&registry), interval);

	info!("watching definitions, press Ctrl-C to stop");
	let mut seen = 0;
	let mut ticker = tokio::time::interval(interval);
	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			_ = ticker.tick() => {
				let snapshot = registry.snapshot();
				if snapshot.version() != seen {
					seen = snapshot.version();
					info!(
						version = seen,
						flags = snapshot.flag_count(),
						experiments = snapshot.experiment_count(),
						"definitions changed"
					);
				}
			}
		}
	}

	reloader.abort();
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const DEFINITIONS: &str = r#"
[[flags]]
name = "new_dashboard"
rollout_percentage = 100

[[experiments]]
name = "homepage_layout"
variants = ["control", "hero"]
traffic_split = [50, 50]
status = "active"
"#;

	fn config_for(file: &tempfile::NamedTempFile) -> EngineConfig {
		let mut config = EngineConfig::default();
		config.definitions.path = Some(file.path().to_path_buf());
		config
	}

	#[test]
	fn test_batch_config_from_tracking() {
		let tracking = TrackingConfig {
			enabled: true,
			max_queue_size: 10,
			max_batch_size: 2,
			flush_interval_ms: 300,
		};
		let batch = batch_config(&tracking);
		assert_eq!(batch.max_queue_size, 10);
		assert_eq!(batch.max_batch_size, 2);
		assert_eq!(batch.flush_interval, std::time::Duration::from_millis(300));
	}

	#[tokio::test]
	async fn test_session_loads_definitions() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(DEFINITIONS.as_bytes()).unwrap();

		let session = Session::start(&config_for(&file)).await.unwrap();
		assert!(session.engine.is_enabled("new_dashboard", "user-1", None, None));
		assert!(!session
			.engine
			.get_variant("homepage_layout", "user-1")
			.is_empty());
		session.finish().await.unwrap();
	}

	#[tokio::test]
	async fn test_check_fails_on_invalid_entries() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(
			br#"
[[experiments]]
name = "bad"
variants = ["a", "b"]
traffic_split = [50, 30]
"#,
		)
		.unwrap();

		let out = Output { json: true };
		assert!(check(&out, &config_for(&file)).await.is_err());
	}

	#[tokio::test]
	async fn test_check_without_path() {
		let out = Output { json: false };
		assert!(check(&out, &EngineConfig::default()).await.is_err());
	}
}
