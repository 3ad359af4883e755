//! Reconnect scheduling for the battle socket.
//!
//! Every close schedules exactly one attempt. Delays double from `base_delay`
//! up to `max_delay`, and after `max_attempts` consecutive failures the
//! session gives up and reports the server as unreachable.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based), ignoring the attempt cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// What to do after the socket closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    After { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Backoff { policy, attempt: 0 }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Called once per close event.
    pub fn on_close(&mut self) -> Retry {
        if self.attempt >= self.policy.max_attempts {
            return Retry::GiveUp { attempts: self.attempt };
        }
        self.attempt += 1;
        Retry::After {
            attempt: self.attempt,
            delay: self.policy.delay_for(self.attempt),
        }
    }

    /// Called when a connection opened successfully.
    pub fn on_open(&mut self) {
        self.attempt = 0;
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.policy.max_attempts
    }
}
