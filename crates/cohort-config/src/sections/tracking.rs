// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exposure/conversion tracking configuration section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;
const DEFAULT_MAX_BATCH_SIZE: usize = 50;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackingConfigLayer {
	pub enabled: Option<bool>,
	pub max_queue_size: Option<usize>,
	pub max_batch_size: Option<usize>,
	pub flush_interval_ms: Option<u64>,
}

impl TrackingConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.max_queue_size.is_some() {
			self.max_queue_size = other.max_queue_size;
		}
		if other.max_batch_size.is_some() {
			self.max_batch_size = other.max_batch_size;
		}
		if other.flush_interval_ms.is_some() {
			self.flush_interval_ms = other.flush_interval_ms;
		}
	}

	pub fn finalize(self) -> TrackingConfig {
		TrackingConfig {
			enabled: self.enabled.unwrap_or(true),
			max_queue_size: self.max_queue_size.unwrap_or(DEFAULT_MAX_QUEUE_SIZE),
			max_batch_size: self.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE),
			flush_interval_ms: self.flush_interval_ms.unwrap_or(DEFAULT_FLUSH_INTERVAL_MS),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingConfig {
	pub enabled: bool,
	/// Events buffered before the oldest is dropped.
	pub max_queue_size: usize,
	pub max_batch_size: usize,
	pub flush_interval_ms: u64,
}

impl TrackingConfig {
	pub fn flush_interval(&self) -> Duration {
		Duration::from_millis(self.flush_interval_ms)
	}
}

impl Default for TrackingConfig {
	fn default() -> Self {
		TrackingConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = TrackingConfig::default();
		assert!(config.enabled);
		assert_eq!(config.max_queue_size, 1000);
		assert_eq!(config.max_batch_size, 50);
		assert_eq!(config.flush_interval(), Duration::from_secs(5));
	}

	#[test]
	fn test_layer_finalize_with_values() {
		let layer = TrackingConfigLayer {
			enabled: Some(false),
			max_queue_size: Some(10),
			..Default::default()
		};
		let config = layer.finalize();
		assert!(!config.enabled);
		assert_eq!(config.max_queue_size, 10);
		assert_eq!(config.max_batch_size, 50);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = TrackingConfigLayer {
			enabled: Some(true),
			max_batch_size: Some(20),
			..Default::default()
		};
		base.merge(TrackingConfigLayer {
			enabled: Some(false),
			flush_interval_ms: Some(250),
			..Default::default()
		});
		assert_eq!(base.enabled, Some(false));
		assert_eq!(base.max_batch_size, Some(20));
		assert_eq!(base.flush_interval_ms, Some(250));
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let layer: TrackingConfigLayer = toml::from_str("max_queue_size = 64").unwrap();
		assert_eq!(layer.max_queue_size, Some(64));
		assert!(layer.enabled.is_none());
	}
}
