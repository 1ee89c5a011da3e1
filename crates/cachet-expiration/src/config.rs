//! Expiration bounds.

use std::time::Duration;

use crate::error::{ExpirationError, Result};

/// Bounds enforced on one cache. At least one must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationConfig {
    /// Keep at most this many entries; the least recently written go first.
    pub max_entries: Option<usize>,

    /// Evict entries written longer ago than this.
    pub max_age: Option<Duration>,
}

impl ExpirationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Oldest timestamp still inside the max age at `now_millis`, or `None`
    /// without a max age. Ages beyond the representable range saturate, so
    /// nothing written after the epoch counts as expired.
    pub fn cutoff(&self, now_millis: i64) -> Option<i64> {
        self.max_age
            .map(|max_age| now_millis.saturating_sub(duration_millis(max_age)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries.is_none() && self.max_age.is_none() {
            return Err(ExpirationError::InvalidConfig(
                "at least one of max_entries or max_age must be set".to_string(),
            ));
        }
        if self.max_entries == Some(0) {
            return Err(ExpirationError::InvalidConfig(
                "max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// `duration` in whole milliseconds, saturating at `i64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
