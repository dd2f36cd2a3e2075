// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exposure and conversion events handed to the analytics collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tracking event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for EventId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for EventId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Recorded when a subject is assigned a variant of an active, in-window experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureEvent {
	pub id: EventId,
	pub experiment: String,
	pub subject_id: String,
	pub variant: String,
	pub timestamp: DateTime<Utc>,
}

impl ExposureEvent {
	pub fn new(
		experiment: impl Into<String>,
		subject_id: impl Into<String>,
		variant: impl Into<String>,
		timestamp: DateTime<Utc>,
	) -> Self {
		Self {
			id: EventId::new(),
			experiment: experiment.into(),
			subject_id: subject_id.into(),
			variant: variant.into(),
			timestamp,
		}
	}

	pub fn to_event_properties(&self) -> serde_json::Value {
		serde_json::json!({
			"$experiment": self.experiment,
			"$experiment_variant": self.variant,
		})
	}
}

/// A caller-reported metric outcome attributed to a subject's experiment variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEvent {
	pub id: EventId,
	pub experiment: String,
	pub subject_id: String,
	/// The subject's variant, when the experiment was admitting traffic.
	pub variant: Option<String>,
	pub metric: String,
	pub value: Option<f64>,
	pub timestamp: DateTime<Utc>,
}

impl ConversionEvent {
	pub fn new(
		experiment: impl Into<String>,
		subject_id: impl Into<String>,
		metric: impl Into<String>,
		value: Option<f64>,
		timestamp: DateTime<Utc>,
	) -> Self {
		Self {
			id: EventId::new(),
			experiment: experiment.into(),
			subject_id: subject_id.into(),
			variant: None,
			metric: metric.into(),
			value,
			timestamp,
		}
	}

	pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
		self.variant = Some(variant.into());
		self
	}

	pub fn to_event_properties(&self) -> serde_json::Value {
		serde_json::json!({
			"$experiment": self.experiment,
			"$experiment_variant": self.variant,
			"$metric": self.metric,
			"$metric_value": self.value,
		})
	}
}

/// Either kind of tracking event, as queued for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEvent {
	Exposure(ExposureEvent),
	Conversion(ConversionEvent),
}

impl TrackingEvent {
	pub fn id(&self) -> EventId {
		match self {
			TrackingEvent::Exposure(e) => e.id,
			TrackingEvent::Conversion(e) => e.id,
		}
	}

	pub fn experiment(&self) -> &str {
		match self {
			TrackingEvent::Exposure(e) => &e.experiment,
			TrackingEvent::Conversion(e) => &e.experiment,
		}
	}

	pub fn subject_id(&self) -> &str {
		match self {
			TrackingEvent::Exposure(e) => &e.subject_id,
			TrackingEvent::Conversion(e) => &e.subject_id,
		}
	}

	pub fn event_name(&self) -> &'static str {
		match self {
			TrackingEvent::Exposure(_) => "$experiment_exposure",
			TrackingEvent::Conversion(_) => "$experiment_conversion",
		}
	}

	pub fn to_event_properties(&self) -> serde_json::Value {
		match self {
			TrackingEvent::Exposure(e) => e.to_event_properties(),
			TrackingEvent::Conversion(e) => e.to_event_properties(),
		}
	}
}

impl From<ExposureEvent> for TrackingEvent {
	fn from(event: ExposureEvent) -> Self {
		TrackingEvent::Exposure(event)
	}
}

impl From<ConversionEvent> for TrackingEvent {
	fn from(event: ConversionEvent) -> Self {
		TrackingEvent::Conversion(event)
	}
}
