// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The mergeable, partially specified form of the whole configuration.

use serde::{Deserialize, Serialize};

use crate::sections::{DefinitionsConfigLayer, LoggingConfigLayer, TrackingConfigLayer};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfigLayer {
	pub tracking: Option<TrackingConfigLayer>,
	pub definitions: Option<DefinitionsConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
}

impl EngineConfigLayer {
	/// Overlays `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: Self) {
		merge_section(&mut self.tracking, other.tracking, TrackingConfigLayer::merge);
		merge_section(&mut self.definitions, other.definitions, DefinitionsConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	let Some(other) = other else {
		return;
	};
	if let Some(b) = base.as_mut() {
		merge(b, other);
	} else {
		*base = Some(other);
	}
}
