use std::time::Duration;

/// Why the worker is about to sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Nothing to do (or nothing claimable); check the backlog again later.
    Idle,
    /// A claim was denied; another book may still be workable soon.
    ClaimDenied,
    /// Generation or persistence failed.
    Failure,
    /// A chapter was written; bound the request rate.
    Pacing,
}

/// Sleep tiers of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub idle: Duration,
    pub claim_denied: Duration,
    pub failure_cooldown: Duration,
    pub pacing: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(10 * 60),
            claim_denied: Duration::from_secs(5),
            failure_cooldown: Duration::from_secs(5 * 60),
            pacing: Duration::from_secs(2),
        }
    }
}

impl Backoff {
    /// No sleeping at all.
    pub fn immediate() -> Self {
        Self {
            idle: Duration::ZERO,
            claim_denied: Duration::ZERO,
            failure_cooldown: Duration::ZERO,
            pacing: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, pause: Pause) -> Duration {
        match pause {
            Pause::Idle => self.idle,
            Pause::ClaimDenied => self.claim_denied,
            Pause::Failure => self.failure_cooldown,
            Pause::Pacing => self.pacing,
        }
    }
}
