//! Wire messages exchanged with the external machine-leasing service.
//!
//! The transport itself lives outside this workspace; these types define
//! the batched request/response shapes it carries. Responses are keyed by
//! `client_request_id`, and the provider treats a resent identifier as an
//! idempotent retry of the original request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operating-system family requested for a leased machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    Linux,
    Osx,
    Windows,
}

/// Capability descriptor matched by the provider when assigning a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Required operating-system family.
    pub os_family: OsFamily,

    /// Minimum CPU count, if constrained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<u32>,

    /// Minimum memory in GiB, if constrained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<u32>,
}

impl Dimensions {
    /// Dimensions constrained only by OS family.
    pub fn os(os_family: OsFamily) -> Self {
        Self {
            os_family,
            num_cpus: None,
            memory_gb: None,
        }
    }
}

/// One outbound lease request.
///
/// Sent both for new machines and as a status refresh for a lease that is
/// still awaiting fulfillment; the two are distinguished provider-side by
/// whether the identifier has been seen before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRequest {
    /// Identifier minted by the requesting machine type, never reused.
    pub client_request_id: String,

    /// Capability descriptor for the requested machine.
    pub dimensions: Dimensions,

    /// Fingerprint of this exact payload; the provider echoes it back so
    /// payload drift between retries is detectable.
    pub request_hash: String,

    /// Endpoint the leased machine reports back to once assigned.
    pub callback_url: String,
}

impl LeaseRequest {
    /// Build a request and compute its payload fingerprint.
    pub fn new(
        client_request_id: impl Into<String>,
        dimensions: Dimensions,
        callback_url: impl Into<String>,
    ) -> Self {
        let client_request_id = client_request_id.into();
        let callback_url = callback_url.into();
        let request_hash = fingerprint(&client_request_id, &dimensions, &callback_url);
        Self {
            client_request_id,
            dimensions,
            request_hash,
            callback_url,
        }
    }
}

/// Fingerprint the fields that make up a lease request payload.
fn fingerprint(client_request_id: &str, dimensions: &Dimensions, callback_url: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(client_request_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(&[dimensions.os_family as u8]);
    hasher.update(&dimensions.num_cpus.unwrap_or(0).to_le_bytes());
    hasher.update(&dimensions.memory_gb.unwrap_or(0).to_le_bytes());
    hasher.update(&[0]);
    hasher.update(callback_url.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// A batch of outbound lease requests for one machine type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchedLeaseRequest {
    pub requests: Vec<LeaseRequest>,
}

/// Triage state reported by the provider for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseRequestState {
    /// Backed by a concrete host.
    Fulfilled,
    /// Rejected; the identifier will never be fulfilled.
    Denied,
    /// Still queued provider-side.
    Untriaged,
}

/// Error code attached to a response instead of, or alongside, a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseRequestError {
    /// The provider did not answer in time; safe to retry.
    DeadlineExceeded,
    /// Temporary provider-side failure; safe to retry.
    TransientError,
    /// The identifier collided with an earlier, different request.
    /// Retrying with the same identifier would loop forever.
    RequestIdReuse,
}

/// One provider response, keyed by the identifier it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseResponse {
    /// Identifier of the request this answers.
    pub client_request_id: String,

    /// Echo of the payload fingerprint the provider holds for this
    /// identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_hash: Option<String>,

    /// Triage state; absent when the response carries only an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<LeaseRequestState>,

    /// Hostname of the assigned machine, set on fulfillment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Lease expiration, set on fulfillment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_expiration_ts: Option<DateTime<Utc>>,

    /// Error code, if the request could not be triaged this round.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LeaseRequestError>,
}

impl LeaseResponse {
    /// A response carrying only a state, as for denials and untriaged
    /// requests.
    pub fn with_state(client_request_id: impl Into<String>, state: LeaseRequestState) -> Self {
        Self {
            client_request_id: client_request_id.into(),
            request_hash: None,
            state: Some(state),
            hostname: None,
            lease_expiration_ts: None,
            error: None,
        }
    }

    /// A response carrying only an error code.
    pub fn with_error(client_request_id: impl Into<String>, error: LeaseRequestError) -> Self {
        Self {
            client_request_id: client_request_id.into(),
            request_hash: None,
            state: None,
            hostname: None,
            lease_expiration_ts: None,
            error: Some(error),
        }
    }
}

/// A batch of provider responses for one machine type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchedLeaseResponse {
    pub responses: Vec<LeaseResponse>,
}
