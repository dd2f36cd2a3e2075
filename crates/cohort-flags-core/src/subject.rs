// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

/// The caller-supplied identity a flag or experiment is evaluated for.
///
/// Subjects are never stored; the engine only sees the opaque id and the
/// optional tenant (school) and role attributes passed in with each call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
	pub id: String,
	pub school_id: Option<String>,
	pub role: Option<String>,
}

impl Subject {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			..Default::default()
		}
	}

	pub fn with_school(mut self, school_id: impl Into<String>) -> Self {
		self.school_id = Some(school_id.into());
		self
	}

	pub fn with_role(mut self, role: impl Into<String>) -> Self {
		self.role = Some(role.into());
		self
	}
}

/// Validates a flag or experiment name.
///
/// Valid names:
/// - 1-100 characters
/// - No control characters (the bucketing separator is NUL)
pub fn validate_name(name: &str) -> bool {
	let len = name.chars().count();
	(1..=100).contains(&len) && !name.chars().any(char::is_control)
}
