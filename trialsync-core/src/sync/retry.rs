// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Retry policy for transient delivery failures.

use std::time::Duration;

use time::OffsetDateTime;

/// Bounded exponential backoff.
///
/// After the n-th failed attempt the next one is scheduled
/// `base_backoff * 2^(n-1)` later, capped at `max_backoff`. Once
/// `max_attempts` attempts have failed the event is stalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failed_attempts` failures.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(failed_attempts.saturating_sub(1));
        self.base_backoff
            .saturating_mul(multiplier)
            .min(self.max_backoff)
    }

    /// When to try again after `failed_attempts` failures, or `None` once the
    /// attempt budget is spent.
    pub fn next_attempt(
        &self,
        now: OffsetDateTime,
        failed_attempts: u32,
    ) -> Option<OffsetDateTime> {
        if failed_attempts >= self.max_attempts {
            return None;
        }
        Some(now + self.backoff(failed_attempts))
    }
}
