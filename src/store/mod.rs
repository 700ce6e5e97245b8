#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Persistence gateway: a transactional store abstraction over
//! request, offer, and user records.
//!
//! The primary backend is relational (Postgres via sqlx). A degraded
//! in-memory backend stands in when the primary is provably
//! unreachable at process start. Switchover is evaluated exactly once
//! at startup: a process that came up in primary mode completes every
//! transaction in primary mode or fails outright, never silently
//! migrating mid-flight.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::Principal;
use crate::error::Result;
use crate::types::{HelpOffer, HelpRequest, NewHelpRequest, RequestId, RequestStatus, UserId};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which backend the process selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Primary,
    Fallback,
}

impl StoreMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of the transactional offer-help composite operation.
#[derive(Debug, Clone)]
pub struct OfferOutcome {
    pub request: HelpRequest,
    pub offer: HelpOffer,
    /// False when the (request, helper) pair already existed; the
    /// whole operation was then a no-op, never a partial state.
    pub newly_inserted: bool,
}

#[async_trait]
pub trait Store: Send + Sync {
    fn mode(&self) -> StoreMode;

    /// Upsert the durable profile projection of a verified principal.
    async fn upsert_user(&self, principal: &Principal) -> Result<()>;

    /// Insert a moderated request. Initial status is Open with zero
    /// helpers; moderation annotations are persisted verbatim.
    async fn insert_request(&self, new_request: NewHelpRequest) -> Result<HelpRequest>;

    /// Fetch by id regardless of age, status, or verdict (audit path).
    async fn request_by_id(&self, id: &RequestId) -> Result<Option<HelpRequest>>;

    /// Visible requests: created after `cutoff`, non-terminal, and not
    /// flagged (an absent verdict passes, for legacy rows). Helper
    /// counts are computed by joining the offer table at read time.
    async fn active_requests(&self, cutoff: DateTime<Utc>) -> Result<Vec<HelpRequest>>;

    /// One transaction: insert the offer (ignoring a duplicate pair),
    /// refresh the helper count, and advance Open to InProgress.
    async fn offer_help(
        &self,
        request_id: &RequestId,
        helper_id: &UserId,
        helper_name: &str,
    ) -> Result<OfferOutcome>;

    /// Flip the named offer to accepted. Idempotent on retry.
    async fn accept_offer(
        &self,
        request_id: &RequestId,
        helper_id: &UserId,
    ) -> Result<Option<HelpOffer>>;

    /// Compare-and-set status update, guarded by
    /// `WHERE id = ? AND author_id = ? AND status = ?`. Returns rows
    /// affected; zero means the caller was not the author or the
    /// status moved since it was read (the coordinator resolves which
    /// for precise error semantics). Completing a request stamps
    /// `completed_at` on its accepted offers without changing their
    /// status.
    async fn update_status(
        &self,
        request_id: &RequestId,
        expected: RequestStatus,
        status: RequestStatus,
        author_id: &UserId,
    ) -> Result<u64>;

    async fn offers_for(&self, request_id: &RequestId) -> Result<Vec<HelpOffer>>;

    /// Visible-request count for the health endpoint.
    async fn active_count(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Select the backend once at startup.
///
/// Connects to the primary with a bounded timeout; on failure, logs
/// the outage and falls back to the in-memory store. The fallback is
/// an injected implementation behind the same interface, never
/// module-level state.
pub async fn select_backend(database_url: &str, connect_timeout_ms: u64) -> Arc<dyn Store> {
    match PgStore::connect(database_url, connect_timeout_ms).await {
        Ok(store) => {
            info!("Connected to PostgreSQL request store");
            Arc::new(store)
        }
        Err(e) => {
            warn!("Primary store unavailable, serving from in-memory fallback: {e}");
            Arc::new(MemoryStore::new())
        }
    }
}
