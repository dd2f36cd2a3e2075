// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `cohort`: evaluate feature flags and experiment assignments from a definitions file.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cohort_config::{EngineConfig, LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
	name = "cohort",
	about = "Evaluate Cohort feature flags and experiments",
	version
)]
struct Args {
	/// Engine config file (defaults to /etc/cohort/flags.toml)
	#[arg(long, global = true, env = "COHORT_CONFIG")]
	config: Option<PathBuf>,

	/// Definitions file; overrides the configured path
	#[arg(long, short = 'd', global = true)]
	definitions: Option<PathBuf>,

	/// Print results as JSON
	#[arg(long, global = true)]
	json: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Evaluate a flag for one subject
	Flag {
		name: String,
		#[arg(long, short = 's')]
		subject: String,
		#[arg(long)]
		school: Option<String>,
		#[arg(long)]
		role: Option<String>,
	},

	/// Assign a subject to an experiment variant
	Variant {
		experiment: String,
		#[arg(long, short = 's')]
		subject: String,
		/// Evaluation instant (RFC 3339); defaults to now
		#[arg(long)]
		at: Option<chrono::DateTime<chrono::Utc>>,
	},

	/// Record a conversion for a subject
	Convert {
		experiment: String,
		#[arg(long, short = 's')]
		subject: String,
		#[arg(long, short = 'm')]
		metric: String,
		#[arg(long)]
		value: Option<f64>,
	},

	/// List registered flags and experiments
	List,

	/// Validate a definitions file and report rejected entries
	Check,

	/// Print the bucket and digest for a scope and subject
	Hash { scope: String, subject: String },

	/// Keep definitions loaded and log every reload until interrupted
	Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let mut config = match &args.config {
		Some(path) => cohort_config::load_config_from(path)?,
		None => cohort_config::load_config()?,
	};
	if let Some(path) = &args.definitions {
		config.definitions.path = Some(path.clone());
	}

	init_tracing(&config.logging);
	tracing::debug!(?config, "resolved configuration");

	run(args.command, args.json, config).await
}

async fn run(command: Command, json: bool, config: EngineConfig) -> anyhow::Result<()> {
	let out = commands::Output { json };
	match command {
		Command::Hash { scope, subject } => commands::hash(&out, &scope, &subject),
		Command::Check => commands::check(&out, &config).await,
		Command::Watch => commands::watch(&config).await,
		Command::Flag {
			name,
			subject,
			school,
			role,
		} => {
			let session = commands::Session::start(&config).await?;
			commands::flag(&out, &session, &name, &subject, school, role);
			session.finish().await
		}
		Command::Variant {
			experiment,
			subject,
			at,
		} => {
			let session = commands::Session::start(&config).await?;
			commands::variant(&out, &session, &experiment, &subject, at);
			session.finish().await
		}
		Command::Convert {
			experiment,
			subject,
			metric,
			value,
		} => {
			let session = commands::Session::start(&config).await?;
			session
				.engine
				.track_conversion(&experiment, &subject, &metric, value);
			session.finish().await
		}
		Command::List => {
			let session = commands::Session::start(&config).await?;
			commands::list(&out, &session)?;
			session.finish().await
		}
	}
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let json = logging.format == LogFormat::Json;

	tracing_subscriber::registry()
		.with(filter)
		.with(json.then(|| {
			tracing_subscriber::fmt::layer()
				.json()
				.with_writer(std::io::stderr)
		}))
		.with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
		.init();
}
