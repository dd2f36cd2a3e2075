// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod definitions;
mod logging;
mod tracking;

pub use definitions::{DefinitionsConfig, DefinitionsConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use tracking::{TrackingConfig, TrackingConfigLayer};
