//! Saga coordinator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long the per-account lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// Hold the lock from the balance read until order registration resolves.
    #[default]
    ThroughRegistration,
    /// Release the lock right after the debit resolves.
    DebitOnly,
}

impl std::str::FromStr for LockScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "through_registration" => Ok(LockScope::ThroughRegistration),
            "debit_only" => Ok(LockScope::DebitOnly),
            other => Err(format!("unknown lock scope '{other}'")),
        }
    }
}

/// Settings passed into [`SagaCoordinator::new`](crate::SagaCoordinator::new).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    /// Deadline for the compensating credit, independent of the inbound request.
    pub compensation_timeout: Duration,
    pub lock_scope: LockScope,
    /// How long completed outcomes are remembered per idempotency key.
    pub idempotency_ttl: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            compensation_timeout: Duration::from_secs(10),
            lock_scope: LockScope::ThroughRegistration,
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}
