#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Degraded-mode in-memory store.
//!
//! Replicates the primary's invariants (no duplicate offers, same
//! transition rules, counter agreement) without database transactions
//! by holding one mutation lock around each entire read-modify-write
//! sequence, not just the final write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::auth::Principal;
use crate::error::{NeighborlyError, Result};
use crate::lifecycle;
use crate::types::{
    HelpOffer, HelpRequest, NewHelpRequest, OfferStatus, RequestId, RequestStatus, UserId,
    UserProfile,
};

use super::{OfferOutcome, Store, StoreMode};

#[derive(Default)]
struct MemoryState {
    requests: HashMap<String, HelpRequest>,
    // Keyed by (request_id, helper_id): at most one offer per pair.
    offers: HashMap<(String, String), HelpOffer>,
    users: HashMap<String, UserProfile>,
}

impl MemoryState {
    fn live_helper_count(&self, request_id: &str) -> u32 {
        let count = self
            .offers
            .values()
            .filter(|o| o.request_id.value() == request_id && o.status.counts_as_helping())
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| NeighborlyError::DatabaseError("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Fallback
    }

    async fn upsert_user(&self, principal: &Principal) -> Result<()> {
        let mut state = self.locked()?;
        state
            .users
            .entry(principal.user_id.value().to_string())
            .and_modify(|profile| {
                profile.display_name = principal.display_name.clone();
                profile.email = principal.email.clone();
            })
            .or_insert_with(|| UserProfile {
                user_id: principal.user_id.clone(),
                display_name: principal.display_name.clone(),
                email: principal.email.clone(),
                requests_created: 0,
                offers_made: 0,
            });
        Ok(())
    }

    async fn insert_request(&self, new_request: NewHelpRequest) -> Result<HelpRequest> {
        let mut state = self.locked()?;
        let now = Utc::now();
        let verdict = new_request.verdict;
        let request = HelpRequest {
            id: RequestId::generate(),
            title: new_request.title,
            description: new_request.description,
            address: new_request.address,
            contact: new_request.contact,
            latitude: new_request.coordinate.latitude,
            longitude: new_request.coordinate.longitude,
            author_id: new_request.author_id.clone(),
            author_name: new_request.author_name,
            urgency: new_request.urgency,
            status: RequestStatus::Open,
            helpers_count: 0,
            annotation: verdict.annotation,
            detected_urgency: verdict.detected_urgency,
            estimated_minutes: verdict.estimated_minutes,
            tags: verdict.tags,
            safety_verdict: Some(verdict.safety),
            safety_reason: verdict.reason,
            created_at: now,
            updated_at: now,
        };
        if let Some(profile) = state.users.get_mut(new_request.author_id.value()) {
            profile.requests_created = profile.requests_created.saturating_add(1);
        }
        state
            .requests
            .insert(request.id.value().to_string(), request.clone());
        Ok(request)
    }

    async fn request_by_id(&self, id: &RequestId) -> Result<Option<HelpRequest>> {
        let state = self.locked()?;
        let request = state.requests.get(id.value()).map(|r| {
            let mut request = r.clone();
            request.helpers_count = state.live_helper_count(id.value());
            request
        });
        Ok(request)
    }

    async fn active_requests(&self, cutoff: DateTime<Utc>) -> Result<Vec<HelpRequest>> {
        let state = self.locked()?;
        let mut visible: Vec<HelpRequest> = state
            .requests
            .values()
            .filter(|r| r.created_at > cutoff)
            .filter(|r| !lifecycle::is_terminal(r.status))
            .filter(|r| r.safety_verdict != Some(crate::types::SafetyVerdict::Flagged))
            .map(|r| {
                let mut request = r.clone();
                request.helpers_count = state.live_helper_count(r.id.value());
                request
            })
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(visible)
    }

    async fn offer_help(
        &self,
        request_id: &RequestId,
        helper_id: &UserId,
        helper_name: &str,
    ) -> Result<OfferOutcome> {
        // Entire read-modify-write sequence under the one lock.
        let mut state = self.locked()?;

        let current_status = state
            .requests
            .get(request_id.value())
            .map(|r| r.status)
            .ok_or_else(|| NeighborlyError::NotFound(format!("request {request_id}")))?;

        if !lifecycle::accepts_offers(current_status) {
            return Err(NeighborlyError::InvalidTransition {
                from: current_status,
                to: RequestStatus::InProgress,
            });
        }

        let key = (
            request_id.value().to_string(),
            helper_id.value().to_string(),
        );
        let newly_inserted = !state.offers.contains_key(&key);
        if newly_inserted {
            state.offers.insert(
                key.clone(),
                HelpOffer {
                    request_id: request_id.clone(),
                    helper_id: helper_id.clone(),
                    helper_name: helper_name.to_string(),
                    status: OfferStatus::Active,
                    offered_at: Utc::now(),
                    completed_at: None,
                },
            );
            if let Some(profile) = state.users.get_mut(helper_id.value()) {
                profile.offers_made = profile.offers_made.saturating_add(1);
            }
        }

        let live_helpers = state.live_helper_count(request_id.value());
        let request = state
            .requests
            .get_mut(request_id.value())
            .ok_or_else(|| NeighborlyError::NotFound(format!("request {request_id}")))?;
        request.helpers_count = live_helpers;
        if newly_inserted {
            request.status = lifecycle::status_after_offer(request.status);
            request.updated_at = Utc::now();
        }
        let request = request.clone();

        let offer = state
            .offers
            .get(&key)
            .cloned()
            .ok_or_else(|| NeighborlyError::DatabaseError("offer vanished mid-write".to_string()))?;

        Ok(OfferOutcome {
            request,
            offer,
            newly_inserted,
        })
    }

    async fn accept_offer(
        &self,
        request_id: &RequestId,
        helper_id: &UserId,
    ) -> Result<Option<HelpOffer>> {
        let mut state = self.locked()?;
        let key = (
            request_id.value().to_string(),
            helper_id.value().to_string(),
        );
        let Some(offer) = state.offers.get_mut(&key) else {
            return Ok(None);
        };
        match offer.status {
            OfferStatus::Active => {
                offer.status = OfferStatus::Accepted;
                Ok(Some(offer.clone()))
            }
            // Idempotent on retry.
            OfferStatus::Accepted => Ok(Some(offer.clone())),
            _ => Ok(None),
        }
    }

    async fn update_status(
        &self,
        request_id: &RequestId,
        expected: RequestStatus,
        status: RequestStatus,
        author_id: &UserId,
    ) -> Result<u64> {
        let mut state = self.locked()?;
        let Some(request) = state.requests.get_mut(request_id.value()) else {
            return Ok(0);
        };
        // Compare-and-set: a write validated against a stale read
        // matches zero rows instead of clobbering a concurrent change.
        if request.author_id != *author_id || request.status != expected {
            return Ok(0);
        }
        request.status = status;
        request.updated_at = Utc::now();

        if status == RequestStatus::Completed {
            // Accepted offers stay accepted; completion only stamps
            // when the help was finished.
            let completed_at = Utc::now();
            for offer in state
                .offers
                .values_mut()
                .filter(|o| o.request_id == *request_id && o.status == OfferStatus::Accepted)
            {
                offer.completed_at = Some(completed_at);
            }
        }
        Ok(1)
    }

    async fn offers_for(&self, request_id: &RequestId) -> Result<Vec<HelpOffer>> {
        let state = self.locked()?;
        let mut offers: Vec<HelpOffer> = state
            .offers
            .values()
            .filter(|o| o.request_id == *request_id)
            .cloned()
            .collect();
        offers.sort_by(|a, b| a.offered_at.cmp(&b.offered_at));
        Ok(offers)
    }

    async fn active_count(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let visible = self.active_requests(cutoff).await?;
        Ok(visible.len() as u64)
    }
}
