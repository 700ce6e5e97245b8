#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Request/offer coordinator.
//!
//! Composes the moderation pipeline, the lifecycle state machine, and
//! the persistence gateway to serve create/fetch/offer/accept/status
//! operations. Every mutating operation is safe to retry: duplicate
//! offers are rejected without side effects and a repeated status
//! change to the same target is a harmless no-op.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::Principal;
use crate::error::{NeighborlyError, Result};
use crate::lifecycle;
use crate::moderation::ModerationPipeline;
use crate::store::Store;
use crate::types::{
    Coordinate, CreateRequestPayload, HelpOffer, HelpRequest, NewHelpRequest, RequestId,
    RequestStatus, UrgencyLevel, UserId,
};

/// Rolling visibility window for listings, in hours.
pub const VISIBILITY_WINDOW_HOURS: i64 = 24;

/// Linear time-estimate model: minutes per kilometer on foot.
const ETA_MINUTES_PER_KM: f64 = 12.0;

/// Placeholder annotation used when the caller supplies no origin.
/// Presentation sugar, but deterministic by contract.
const PLACEHOLDER_DISTANCE_KM: f64 = 1.0;
const PLACEHOLDER_ETA_MINUTES: u32 = 15;

/// A visible request annotated with distance and a time estimate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedRequest {
    #[serde(flatten)]
    pub request: HelpRequest,
    pub distance_km: f64,
    pub eta_minutes: u32,
}

pub struct Coordinator {
    store: Arc<dyn Store>,
    moderation: ModerationPipeline,
    visibility_window: Duration,
}

impl Coordinator {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, moderation: ModerationPipeline) -> Self {
        Self {
            store,
            moderation,
            visibility_window: Duration::hours(VISIBILITY_WINDOW_HOURS),
        }
    }

    #[must_use]
    pub fn with_visibility_window(mut self, window: Duration) -> Self {
        self.visibility_window = window;
        self
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    /// Validate, moderate, and persist a new help request.
    ///
    /// # Errors
    /// `Validation` names every offending field; `ModerationRejected`
    /// carries the user-facing safety reason and persists nothing.
    pub async fn create_request(
        &self,
        principal: &Principal,
        payload: CreateRequestPayload,
    ) -> Result<HelpRequest> {
        let mut bad_fields = Vec::new();
        if payload.caption.trim().is_empty() {
            bad_fields.push("caption".to_string());
        }
        if payload.description.trim().is_empty() {
            bad_fields.push("description".to_string());
        }
        if payload.address.trim().is_empty() {
            bad_fields.push("address".to_string());
        }
        if payload.contact.trim().is_empty() {
            bad_fields.push("contact".to_string());
        }

        let urgency = match payload.urgency_level.as_deref() {
            None | Some("") => UrgencyLevel::default(),
            Some(raw) => match UrgencyLevel::try_from(raw) {
                Ok(level) => level,
                Err(_) => {
                    bad_fields.push("urgencyLevel".to_string());
                    UrgencyLevel::default()
                }
            },
        };

        let coordinate = match Coordinate::parse(payload.latitude, payload.longitude) {
            Ok(coordinate) => Some(coordinate),
            Err(mut fields) => {
                bad_fields.append(&mut fields);
                None
            }
        };

        if !bad_fields.is_empty() {
            return Err(NeighborlyError::Validation { fields: bad_fields });
        }
        let Some(coordinate) = coordinate else {
            return Err(NeighborlyError::Validation {
                fields: vec!["latitude".to_string(), "longitude".to_string()],
            });
        };

        let verdict = self
            .moderation
            .evaluate(&payload.caption, &payload.description, urgency)
            .await;

        if !verdict.is_safe() {
            // A flagged post is refused outright, never persisted as a
            // hidden row.
            let reason = verdict
                .reason
                .unwrap_or_else(|| "This post does not meet community guidelines.".to_string());
            info!(author = %principal.user_id, "request rejected by moderation");
            return Err(NeighborlyError::ModerationRejected { reason });
        }

        let request = self
            .store
            .insert_request(NewHelpRequest {
                title: payload.caption.trim().to_string(),
                description: payload.description.trim().to_string(),
                address: payload.address.trim().to_string(),
                contact: payload.contact.trim().to_string(),
                coordinate,
                author_id: principal.user_id.clone(),
                author_name: principal.display_name.clone(),
                urgency,
                verdict,
            })
            .await?;

        info!(request_id = %request.id, author = %principal.user_id, "created help request");
        Ok(request)
    }

    /// Visible requests, annotated with distance/ETA from the caller's
    /// origin when one is supplied.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn list_active(
        &self,
        _principal: &Principal,
        origin: Option<Coordinate>,
    ) -> Result<Vec<ListedRequest>> {
        let cutoff = Utc::now() - self.visibility_window;
        let requests = self.store.active_requests(cutoff).await?;
        Ok(requests
            .into_iter()
            .map(|request| annotate(request, origin))
            .collect())
    }

    /// Audit fetch by id: terminal, expired, and flagged rows stay
    /// reachable here even though listings exclude them.
    ///
    /// # Errors
    /// `NotFound` when the id is unknown.
    pub async fn request_by_id(&self, id: &RequestId) -> Result<HelpRequest> {
        self.store
            .request_by_id(id)
            .await?
            .ok_or_else(|| NeighborlyError::NotFound(format!("request {id}")))
    }

    /// Pledge help on someone else's request.
    ///
    /// # Errors
    /// `SelfOffer` before any storage is touched; `AlreadyOffered` for
    /// a duplicate pledge (state unchanged); `NotFound` for an unknown
    /// id.
    pub async fn offer_help(
        &self,
        principal: &Principal,
        request_id: &RequestId,
    ) -> Result<HelpRequest> {
        let request = self.request_by_id(request_id).await?;
        if request.author_id == principal.user_id {
            return Err(NeighborlyError::SelfOffer);
        }
        if !lifecycle::accepts_offers(request.status) {
            return Err(NeighborlyError::InvalidTransition {
                from: request.status,
                to: RequestStatus::InProgress,
            });
        }

        let outcome = self
            .store
            .offer_help(request_id, &principal.user_id, &principal.display_name)
            .await?;

        if !outcome.newly_inserted {
            return Err(NeighborlyError::AlreadyOffered);
        }

        info!(request_id = %request_id, helper = %principal.user_id, "offer recorded");
        Ok(outcome.request)
    }

    /// Author accepts a named helper's offer.
    ///
    /// # Errors
    /// `Forbidden` for non-authors, `NotFound` for unknown request or
    /// offer.
    pub async fn accept_helper(
        &self,
        principal: &Principal,
        request_id: &RequestId,
        helper_id: &UserId,
    ) -> Result<HelpOffer> {
        let request = self.request_by_id(request_id).await?;
        if request.author_id != principal.user_id {
            return Err(NeighborlyError::Forbidden(
                "only the request author may accept helpers".to_string(),
            ));
        }

        self.store
            .accept_offer(request_id, helper_id)
            .await?
            .ok_or_else(|| {
                NeighborlyError::NotFound(format!(
                    "offer from {helper_id} on request {request_id}"
                ))
            })
    }

    /// Author-driven status change, validated by the state machine
    /// before any write.
    ///
    /// # Errors
    /// `Forbidden` for non-authors, `InvalidTransition` for edges the
    /// lifecycle rejects, `NotFound` for unknown ids.
    pub async fn set_status(
        &self,
        principal: &Principal,
        request_id: &RequestId,
        new_status: RequestStatus,
    ) -> Result<HelpRequest> {
        // Existence first, so a non-author on a real request sees
        // Forbidden rather than a generic not-found.
        let request = self.request_by_id(request_id).await?;
        if request.author_id != principal.user_id {
            return Err(NeighborlyError::Forbidden(
                "only the request author may change its status".to_string(),
            ));
        }
        if request.status == new_status {
            // Retried status change: harmless no-op.
            return Ok(request);
        }
        lifecycle::validate_transition(request.status, new_status)?;

        let rows = self
            .store
            .update_status(request_id, request.status, new_status, &principal.user_id)
            .await?;
        if rows == 0 {
            // The compare-and-set matched nothing: the status moved
            // under us (or ownership did). Re-read to report precisely.
            let fresh = self.request_by_id(request_id).await?;
            if fresh.author_id != principal.user_id {
                return Err(NeighborlyError::Forbidden(
                    "request is not owned by caller".to_string(),
                ));
            }
            if fresh.status == new_status {
                // The racing change was this same transition.
                return Ok(fresh);
            }
            return Err(NeighborlyError::InvalidTransition {
                from: fresh.status,
                to: new_status,
            });
        }

        info!(request_id = %request_id, status = %new_status, "status updated");
        self.request_by_id(request_id).await
    }
}

fn annotate(request: HelpRequest, origin: Option<Coordinate>) -> ListedRequest {
    match origin {
        Some(origin) => {
            let distance_km = origin.haversine_km(&request.coordinate());
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let eta_minutes = (distance_km * ETA_MINUTES_PER_KM).ceil().max(1.0) as u32;
            ListedRequest {
                request,
                distance_km,
                eta_minutes,
            }
        }
        None => ListedRequest {
            request,
            distance_km: PLACEHOLDER_DISTANCE_KM,
            eta_minutes: PLACEHOLDER_ETA_MINUTES,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::annotate;
    use crate::types::{
        Coordinate, HelpRequest, RequestId, RequestStatus, UrgencyLevel, UserId,
    };
    use chrono::Utc;

    fn request_at(latitude: f64, longitude: f64) -> HelpRequest {
        let now = Utc::now();
        HelpRequest {
            id: RequestId::new("r1"),
            title: "t".to_string(),
            description: "d".to_string(),
            address: "a".to_string(),
            contact: "c".to_string(),
            latitude,
            longitude,
            author_id: UserId::new("u1"),
            author_name: "U".to_string(),
            urgency: UrgencyLevel::Medium,
            status: RequestStatus::Open,
            helpers_count: 0,
            annotation: None,
            detected_urgency: None,
            estimated_minutes: None,
            tags: Vec::new(),
            safety_verdict: None,
            safety_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn annotation_without_origin_uses_fixed_placeholders() {
        let listed = annotate(request_at(44.97, -93.26), None);
        assert!((listed.distance_km - super::PLACEHOLDER_DISTANCE_KM).abs() < f64::EPSILON);
        assert_eq!(listed.eta_minutes, super::PLACEHOLDER_ETA_MINUTES);
    }

    #[test]
    fn annotation_with_origin_is_deterministic() {
        let origin = Coordinate {
            latitude: 44.9778,
            longitude: -93.2650,
        };
        let first = annotate(request_at(44.9537, -93.0900), Some(origin));
        let second = annotate(request_at(44.9537, -93.0900), Some(origin));
        assert!((first.distance_km - second.distance_km).abs() < f64::EPSILON);
        assert_eq!(first.eta_minutes, second.eta_minutes);
        // Linear model: roughly 14 km at 12 min/km.
        assert!(first.eta_minutes >= 150 && first.eta_minutes <= 200);
    }

    #[test]
    fn zero_distance_still_estimates_at_least_one_minute() {
        let origin = Coordinate {
            latitude: 44.97,
            longitude: -93.26,
        };
        let listed = annotate(request_at(44.97, -93.26), Some(origin));
        assert_eq!(listed.eta_minutes, 1);
    }
}
