//! Human-readable move numbers: `<type prefix>-<yyyymmddHHMMSS>-<suffix>`.
//!
//! The random suffix makes collisions unlikely but not impossible; the store
//! enforces uniqueness and callers regenerate on conflict.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::move_type::MoveType;

const SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoveNo(String);

impl MoveNo {
    /// Generate a move number using the thread-local RNG.
    pub fn generate(move_type: MoveType, now: DateTime<Utc>) -> Self {
        Self::generate_with(move_type, now, &mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(move_type: MoveType, now: DateTime<Utc>, rng: &mut R) -> Self {
        let suffix: String = rng
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        Self(format!(
            "{}-{}-{}",
            move_type.prefix(),
            now.format("%Y%m%d%H%M%S"),
            suffix
        ))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for MoveNo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_prefix_timestamp_suffix() {
        let now = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        let no = MoveNo::generate(MoveType::Transfer, now);
        let parts: Vec<&str> = no.as_str().split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TR");
        assert_eq!(parts[1], "20260309140507");
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn consecutive_numbers_differ() {
        let now = Utc::now();
        assert_ne!(
            MoveNo::generate(MoveType::Receipt, now),
            MoveNo::generate(MoveType::Receipt, now)
        );
    }
}
