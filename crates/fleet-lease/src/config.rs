//! Configuration for the lease manager.

use std::time::Duration;

/// Configuration for lease reconciliation.
///
/// Desired fleet sizes and dimensions live on the [`fleet_types::MachineType`]
/// records themselves, maintained by the external configuration loader;
/// this struct only carries the knobs the reconciliation passes need.
#[derive(Debug, Clone)]
pub struct LeaseManagerConfig {
    /// Endpoint leased machines report back to, embedded in every
    /// outbound request payload.
    pub callback_url: String,

    /// Attempts per ledger transaction before giving up on contention.
    pub max_txn_attempts: u32,

    /// Initial backoff between transaction attempts; doubles per retry.
    pub txn_retry_backoff: Duration,
}

impl Default for LeaseManagerConfig {
    fn default() -> Self {
        Self {
            callback_url: "https://localhost".to_string(),
            max_txn_attempts: 5,
            txn_retry_backoff: Duration::from_millis(50),
        }
    }
}

impl LeaseManagerConfig {
    /// Config pointing at the given callback endpoint, defaults elsewhere.
    pub fn with_callback_url(callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
            ..Self::default()
        }
    }
}
