// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deterministic subject bucketing.
//!
//! A bucket is an integer in `[0, 100)` derived from a scope (the flag or
//! experiment name) and a subject id. Every process that evaluates the same
//! definition must compute the same bucket, so the algorithm is versioned and
//! the version is part of the public contract. Changing it reshuffles every
//! subject.
//!
//! `HashVersion::V1`:
//! 1. bytes = UTF-8(scope) ‖ `0x00` ‖ UTF-8(subject_id)
//! 2. digest = SHA-256(bytes)
//! 3. bucket = u64::from_be_bytes(digest[0..8]) mod 100

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of buckets subjects are spread over.
pub const BUCKET_COUNT: u32 = 100;

/// Separator placed between scope and subject id before hashing.
const SEPARATOR: &[u8] = b"\0";

/// The hash version used by [`bucket`].
pub const BUCKET_HASH_VERSION: HashVersion = HashVersion::V1;

/// Identifies a bucketing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashVersion {
	/// SHA-256 over `scope ‖ NUL ‖ subject`, first 8 bytes big-endian, mod 100.
	V1,
}

impl HashVersion {
	pub fn as_str(&self) -> &'static str {
		match self {
			HashVersion::V1 => "v1",
		}
	}
}

impl std::fmt::Display for HashVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Maps `(scope, subject_id)` to a bucket in `[0, 100)` using [`BUCKET_HASH_VERSION`].
pub fn bucket(scope: &str, subject_id: &str) -> u32 {
	bucket_with(BUCKET_HASH_VERSION, scope, subject_id)
}

/// Maps `(scope, subject_id)` to a bucket using an explicit hash version.
pub fn bucket_with(version: HashVersion, scope: &str, subject_id: &str) -> u32 {
	match version {
		HashVersion::V1 => {
			let digest = digest_v1(scope, subject_id);
			let mut prefix = [0u8; 8];
			prefix.copy_from_slice(&digest[..8]);
			(u64::from_be_bytes(prefix) % u64::from(BUCKET_COUNT)) as u32
		}
	}
}

/// Hex-encoded digest behind a bucket, for conformance checks across implementations.
pub fn digest_hex(scope: &str, subject_id: &str) -> String {
	hex::encode(digest_v1(scope, subject_id))
}

fn digest_v1(scope: &str, subject_id: &str) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(scope.as_bytes());
	hasher.update(SEPARATOR);
	hasher.update(subject_id.as_bytes());

	let mut digest = [0u8; 32];
	digest.copy_from_slice(&hasher.finalize());
	digest
}


#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn bucket_is_in_range(scope in ".{0,40}", subject in ".{0,40}") {
			prop_assert!(bucket(&scope, &subject) < BUCKET_COUNT);
		}

		#[test]
		fn bucket_is_deterministic(scope in "[a-z_]{1,30}", subject in "[a-zA-Z0-9@.-]{1,40}") {
			prop_assert_eq!(bucket(&scope, &subject), bucket(&scope, &subject));
		}

		#[test]
		fn digest_is_64_hex_chars(scope in ".{0,20}", subject in ".{0,20}") {
			let digest = digest_hex(&scope, &subject);
			prop_assert_eq!(digest.len(), 64);
			prop_assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
		}
	}
}
