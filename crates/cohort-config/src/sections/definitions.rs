// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Definition store configuration section.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DefinitionsConfigLayer {
	pub path: Option<PathBuf>,
	pub reload_interval_secs: Option<u64>,
}

impl DefinitionsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.path.is_some() {
			self.path = other.path;
		}
		if other.reload_interval_secs.is_some() {
			self.reload_interval_secs = other.reload_interval_secs;
		}
	}

	pub fn finalize(self) -> DefinitionsConfig {
		DefinitionsConfig {
			path: self.path,
			reload_interval_secs: self.reload_interval_secs.unwrap_or(0),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DefinitionsConfig {
	/// TOML file holding `[[flags]]` and `[[experiments]]`.
	pub path: Option<PathBuf>,
	/// 0 disables polling.
	pub reload_interval_secs: u64,
}

impl DefinitionsConfig {
	pub fn reload_interval(&self) -> Option<Duration> {
		(self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
	}
}
