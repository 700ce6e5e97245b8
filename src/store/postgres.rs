#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Primary relational store backed by Postgres via sqlx.
//!
//! Composite mutations run inside ACID transactions; the offer-help
//! path takes a row lock (`SELECT ... FOR UPDATE`) so two concurrent
//! offers on the same request cannot double-count helpers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::Principal;
use crate::error::{NeighborlyError, Result};
use crate::lifecycle;
use crate::types::{
    Category, CategoryAnnotation, HelpOffer, HelpRequest, NewHelpRequest, OfferStatus,
    RequestId, RequestStatus, SafetyVerdict, UrgencyLevel, UserId,
};

use super::{OfferOutcome, Store, StoreMode};

const REQUEST_COLUMNS: &str = "id, title, description, address, contact, latitude, longitude, \
     author_id, author_name, urgency, status, category, detected_urgency, estimated_minutes, \
     tags, safety_verdict, safety_reason, created_at, updated_at, \
     (SELECT COUNT(*) FROM help_offers o \
        WHERE o.request_id = help_requests.id \
          AND o.status IN ('active', 'accepted')) AS live_helpers";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the primary store with a bounded acquire timeout.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` when no connection can be
    /// established within the timeout.
    pub async fn connect(database_url: &str, connect_timeout_ms: u64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(resolve_pool_max_connections())
            .acquire_timeout(Duration::from_millis(connect_timeout_ms))
            .connect(database_url)
            .await
            .map_err(|e| NeighborlyError::StoreUnavailable(format!("connect failed: {e}")))?;

        // Probe with a trivial round-trip so a dead server fails here,
        // not on the first user-facing call.
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| NeighborlyError::StoreUnavailable(format!("probe failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create a store over an existing pool (for testing).
    #[must_use]
    pub const fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema (idempotent).
    ///
    /// # Errors
    /// Returns a database error when any statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../schema.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to apply schema: {e}")))?;
        Ok(())
    }
}

fn resolve_pool_max_connections() -> u32 {
    std::env::var("NEIGHBORLY_DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(20)
}

fn parse_status(raw: &str) -> Result<RequestStatus> {
    RequestStatus::try_from(raw).map_err(NeighborlyError::DatabaseError)
}

fn request_from_row(row: &PgRow) -> Result<HelpRequest> {
    let status: String = row.try_get("status")?;
    let urgency: String = row.try_get("urgency")?;
    let category: Option<String> = row.try_get("category")?;
    let detected_urgency: Option<String> = row.try_get("detected_urgency")?;
    let safety_verdict: Option<String> = row.try_get("safety_verdict")?;
    let estimated_minutes: Option<i32> = row.try_get("estimated_minutes")?;
    let tags: serde_json::Value = row.try_get("tags")?;
    let live_helpers: i64 = row.try_get("live_helpers")?;

    // Annotation fields are lenient: an unrecognized persisted value is
    // a compatibility concern absorbed here, not in business logic.
    // Label and icon are re-derived from the category id, keeping the
    // annotation all-or-nothing even if stored columns drifted.
    let annotation = category
        .as_deref()
        .and_then(|c| Category::try_from(c).ok())
        .map(CategoryAnnotation::of);
    if annotation.is_none() && category.is_some() {
        warn!(value = category.as_deref(), "dropping unrecognized persisted category");
    }

    Ok(HelpRequest {
        id: RequestId::new(row.try_get::<String, _>("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        address: row.try_get("address")?,
        contact: row.try_get("contact")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        author_id: UserId::new(row.try_get::<String, _>("author_id")?),
        author_name: row.try_get("author_name")?,
        urgency: UrgencyLevel::try_from(urgency.as_str())
            .map_err(NeighborlyError::DatabaseError)?,
        status: parse_status(&status)?,
        helpers_count: u32::try_from(live_helpers).unwrap_or(0),
        annotation,
        detected_urgency: detected_urgency
            .as_deref()
            .and_then(|u| UrgencyLevel::try_from(u).ok()),
        estimated_minutes: estimated_minutes.and_then(|m| u32::try_from(m).ok()),
        tags: serde_json::from_value(tags).unwrap_or_default(),
        safety_verdict: safety_verdict
            .as_deref()
            .and_then(|v| SafetyVerdict::try_from(v).ok()),
        safety_reason: row.try_get("safety_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn offer_from_row(row: &PgRow) -> Result<HelpOffer> {
    let status: String = row.try_get("status")?;
    Ok(HelpOffer {
        request_id: RequestId::new(row.try_get::<String, _>("request_id")?),
        helper_id: UserId::new(row.try_get::<String, _>("helper_id")?),
        helper_name: row.try_get("helper_name")?,
        status: OfferStatus::try_from(status.as_str()).map_err(NeighborlyError::DatabaseError)?,
        offered_at: row.try_get("offered_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Primary
    }

    async fn upsert_user(&self, principal: &Principal) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (user_id, display_name, email)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                email = EXCLUDED.email,
                last_seen_at = NOW()",
        )
        .bind(principal.user_id.value())
        .bind(&principal.display_name)
        .bind(&principal.email)
        .execute(&self.pool)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to upsert user: {e}")))?;
        Ok(())
    }

    async fn insert_request(&self, new_request: NewHelpRequest) -> Result<HelpRequest> {
        let id = RequestId::generate();
        let verdict = &new_request.verdict;
        let category = verdict.annotation.as_ref().map(|a| a.category);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to begin tx: {e}")))?;

        sqlx::query(
            "INSERT INTO help_requests
                 (id, title, description, address, contact, latitude, longitude,
                  author_id, author_name, urgency, status, helpers_count,
                  category, category_label, category_icon, detected_urgency,
                  estimated_minutes, tags, safety_verdict, safety_reason)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'open', 0,
                     $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(id.value())
        .bind(&new_request.title)
        .bind(&new_request.description)
        .bind(&new_request.address)
        .bind(&new_request.contact)
        .bind(new_request.coordinate.latitude)
        .bind(new_request.coordinate.longitude)
        .bind(new_request.author_id.value())
        .bind(&new_request.author_name)
        .bind(new_request.urgency.as_str())
        .bind(category.map(|c| c.as_str()))
        .bind(category.map(|c| c.label()))
        .bind(category.map(|c| c.icon()))
        .bind(verdict.detected_urgency.map(|u| u.as_str()))
        .bind(verdict.estimated_minutes.map(i64::from))
        .bind(serde_json::to_value(&verdict.tags)?)
        .bind(verdict.safety.as_str())
        .bind(verdict.reason.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to insert request: {e}")))?;

        sqlx::query(
            "UPDATE users SET requests_created = requests_created + 1 WHERE user_id = $1",
        )
        .bind(new_request.author_id.value())
        .execute(&mut *tx)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to bump author: {e}")))?;

        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM help_requests WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to read back insert: {e}")))?;

        let request = request_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to commit tx: {e}")))?;

        debug!(request_id = %request.id, "inserted help request");
        Ok(request)
    }

    async fn request_by_id(&self, id: &RequestId) -> Result<Option<HelpRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM help_requests WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to fetch request: {e}")))?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn active_requests(&self, cutoff: DateTime<Utc>) -> Result<Vec<HelpRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM help_requests
             WHERE created_at > $1
               AND status IN ('open', 'in_progress', 'pending_completion')
               AND (safety_verdict IS NULL OR safety_verdict <> 'flagged')
             ORDER BY created_at DESC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to list requests: {e}")))?;

        rows.iter().map(request_from_row).collect()
    }

    async fn offer_help(
        &self,
        request_id: &RequestId,
        helper_id: &UserId,
        helper_name: &str,
    ) -> Result<OfferOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to begin tx: {e}")))?;

        // Row lock serializes concurrent offers against this request.
        let locked = sqlx::query("SELECT status FROM help_requests WHERE id = $1 FOR UPDATE")
            .bind(request_id.value())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to lock request: {e}")))?;

        let Some(locked) = locked else {
            return Err(NeighborlyError::NotFound(format!("request {request_id}")));
        };
        let current = parse_status(&locked.try_get::<String, _>("status")?)?;
        if !lifecycle::accepts_offers(current) {
            return Err(NeighborlyError::InvalidTransition {
                from: current,
                to: RequestStatus::InProgress,
            });
        }

        let inserted = sqlx::query(
            "INSERT INTO help_offers (request_id, helper_id, helper_name)
             VALUES ($1, $2, $3)
             ON CONFLICT (request_id, helper_id) DO NOTHING",
        )
        .bind(request_id.value())
        .bind(helper_id.value())
        .bind(helper_name)
        .execute(&mut *tx)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to insert offer: {e}")))?
        .rows_affected()
            > 0;

        if inserted {
            // Refresh the denormalized counter from the offer table
            // and advance Open to InProgress in the same statement, so
            // no other transaction can observe one effect without the
            // other. A duplicate pair skips this entirely: the no-op
            // contract means no visible mutation, not even updated_at.
            sqlx::query(
                "UPDATE help_requests
                 SET helpers_count = (SELECT COUNT(*) FROM help_offers
                                      WHERE request_id = $1
                                        AND status IN ('active', 'accepted')),
                     status = CASE WHEN status = 'open' THEN 'in_progress' ELSE status END,
                     updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(request_id.value())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                NeighborlyError::DatabaseError(format!("Failed to refresh request: {e}"))
            })?;

            sqlx::query("UPDATE users SET offers_made = offers_made + 1 WHERE user_id = $1")
                .bind(helper_id.value())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    NeighborlyError::DatabaseError(format!("Failed to bump helper: {e}"))
                })?;
        }

        let request_row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM help_requests WHERE id = $1"
        ))
        .bind(request_id.value())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to re-read request: {e}")))?;

        let offer_row = sqlx::query(
            "SELECT request_id, helper_id, helper_name, status, offered_at, completed_at
             FROM help_offers WHERE request_id = $1 AND helper_id = $2",
        )
        .bind(request_id.value())
        .bind(helper_id.value())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to read offer: {e}")))?;

        let request = request_from_row(&request_row)?;
        let offer = offer_from_row(&offer_row)?;

        tx.commit()
            .await
            .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to commit tx: {e}")))?;

        Ok(OfferOutcome {
            request,
            offer,
            newly_inserted: inserted,
        })
    }

    async fn accept_offer(
        &self,
        request_id: &RequestId,
        helper_id: &UserId,
    ) -> Result<Option<HelpOffer>> {
        // Idempotent: re-accepting an accepted offer is a no-op match.
        let row = sqlx::query(
            "UPDATE help_offers SET status = 'accepted'
             WHERE request_id = $1 AND helper_id = $2
               AND status IN ('active', 'accepted')
             RETURNING request_id, helper_id, helper_name, status, offered_at, completed_at",
        )
        .bind(request_id.value())
        .bind(helper_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to accept offer: {e}")))?;

        row.as_ref().map(offer_from_row).transpose()
    }

    async fn update_status(
        &self,
        request_id: &RequestId,
        expected: RequestStatus,
        status: RequestStatus,
        author_id: &UserId,
    ) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to begin tx: {e}")))?;

        // Author guard and compare-and-set in the statement itself: a
        // non-author, or a write validated against a stale read,
        // observes zero rows affected.
        let rows = sqlx::query(
            "UPDATE help_requests SET status = $2, updated_at = NOW()
             WHERE id = $1 AND author_id = $3 AND status = $4",
        )
        .bind(request_id.value())
        .bind(status.as_str())
        .bind(author_id.value())
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to update status: {e}")))?
        .rows_affected();

        if rows > 0 && status == RequestStatus::Completed {
            // Accepted offers keep their accepted status; completion
            // only stamps when the help was finished.
            sqlx::query(
                "UPDATE help_offers SET completed_at = NOW()
                 WHERE request_id = $1 AND status = 'accepted' AND completed_at IS NULL",
            )
            .bind(request_id.value())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                NeighborlyError::DatabaseError(format!("Failed to stamp offers: {e}"))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to commit tx: {e}")))?;

        Ok(rows)
    }

    async fn offers_for(&self, request_id: &RequestId) -> Result<Vec<HelpOffer>> {
        let rows = sqlx::query(
            "SELECT request_id, helper_id, helper_name, status, offered_at, completed_at
             FROM help_offers WHERE request_id = $1 ORDER BY offered_at ASC",
        )
        .bind(request_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to list offers: {e}")))?;

        rows.iter().map(offer_from_row).collect()
    }

    async fn active_count(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM help_requests
             WHERE created_at > $1
               AND status IN ('open', 'in_progress', 'pending_completion')
               AND (safety_verdict IS NULL OR safety_verdict <> 'flagged')",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| NeighborlyError::DatabaseError(format!("Failed to count requests: {e}")))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}
