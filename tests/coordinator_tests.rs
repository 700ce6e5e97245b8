// Integration tests for the coordinator over the in-memory store.
//
// The deterministic classifier and static verifier keep the full
// create/offer/accept/complete flow testable without Postgres or
// network access. The in-memory store replicates the primary's
// transactional invariants, so these tests pin the engine contract
// for both backends.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use futures_util::future::join_all;

use chrono::Utc;
use neighborly::auth::Principal;
use neighborly::moderation::{FixedClassifier, ModerationPipeline};
use neighborly::store::{MemoryStore, Store};
use neighborly::types::{
    Category, Coordinate, CreateRequestPayload, ModerationVerdict, NewHelpRequest, OfferStatus,
    RequestStatus, SafetyVerdict, UrgencyLevel, UserId,
};
use neighborly::{Coordinator, NeighborlyError};

fn principal(id: &str, name: &str) -> Principal {
    Principal {
        user_id: UserId::new(id),
        email: format!("{id}@example.edu"),
        display_name: name.to_string(),
    }
}

fn coordinator() -> Arc<Coordinator> {
    coordinator_with(FixedClassifier::approving())
}

fn coordinator_with(classifier: FixedClassifier) -> Arc<Coordinator> {
    let moderation =
        ModerationPipeline::new(Arc::new(classifier), StdDuration::from_millis(200));
    Arc::new(Coordinator::new(Arc::new(MemoryStore::new()), moderation))
}

fn payload(caption: &str, description: &str) -> CreateRequestPayload {
    CreateRequestPayload {
        caption: caption.to_string(),
        description: description.to_string(),
        address: "12 Oak Lane".to_string(),
        contact: "room 4B".to_string(),
        urgency_level: Some("medium".to_string()),
        latitude: Some(44.97),
        longitude: Some(-93.26),
    }
}

#[tokio::test]
async fn created_request_starts_open_with_zero_helpers() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");

    let request = coordinator
        .create_request(&author, payload("Need a ladder", "Painting the hallway ceiling"))
        .await
        .expect("create should succeed");

    assert_eq!(request.status, RequestStatus::Open);
    assert_eq!(request.helpers_count, 0);
    assert_eq!(request.author_id, author.user_id);
    assert_eq!(request.safety_verdict, Some(SafetyVerdict::Safe));
}

#[tokio::test]
async fn validation_names_every_offending_field() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");

    let bad = CreateRequestPayload {
        caption: "  ".to_string(),
        description: String::new(),
        address: "somewhere".to_string(),
        contact: "me".to_string(),
        urgency_level: Some("asap".to_string()),
        latitude: Some(91.0),
        longitude: Some(-93.26),
    };

    let err = coordinator
        .create_request(&author, bad)
        .await
        .expect_err("invalid payload must be rejected");
    match err {
        NeighborlyError::Validation { fields } => {
            assert!(fields.contains(&"caption".to_string()));
            assert!(fields.contains(&"description".to_string()));
            assert!(fields.contains(&"urgencyLevel".to_string()));
            assert!(fields.contains(&"latitude".to_string()));
        }
        other => panic!("expected Validation, got {other}"),
    }
}

#[tokio::test]
async fn concurrent_offers_from_distinct_helpers_all_count() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");
    let request = coordinator
        .create_request(&author, payload("Moving boxes", "Two flights of stairs"))
        .await
        .expect("create");

    let offers = (0..5).map(|i| {
        let coordinator = Arc::clone(&coordinator);
        let request_id = request.id.clone();
        let helper = principal(&format!("u-helper-{i}"), "Helper");
        tokio::spawn(async move { coordinator.offer_help(&helper, &request_id).await })
    });
    let results = join_all(offers).await;
    for result in results {
        result.expect("task").expect("offer should succeed");
    }

    let refreshed = coordinator.request_by_id(&request.id).await.expect("fetch");
    assert_eq!(refreshed.helpers_count, 5);
    assert_eq!(refreshed.status, RequestStatus::InProgress);
}

#[tokio::test]
async fn duplicate_offer_is_rejected_without_side_effects() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");
    let helper = principal("u-helper", "Ben");
    let request = coordinator
        .create_request(&author, payload("Flat tire", "Parked on 5th street"))
        .await
        .expect("create");

    coordinator
        .offer_help(&helper, &request.id)
        .await
        .expect("first offer");
    let after_first = coordinator.request_by_id(&request.id).await.expect("fetch");

    let err = coordinator
        .offer_help(&helper, &request.id)
        .await
        .expect_err("second offer must be rejected");
    assert!(matches!(err, NeighborlyError::AlreadyOffered));

    let refreshed = coordinator.request_by_id(&request.id).await.expect("fetch");
    assert_eq!(refreshed.helpers_count, 1);
    assert_eq!(refreshed.status, RequestStatus::InProgress);
    // No-op means no visible mutation at all, not even a timestamp.
    assert_eq!(refreshed.updated_at, after_first.updated_at);
}

#[tokio::test]
async fn self_offer_is_rejected_before_any_write() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");
    let request = coordinator
        .create_request(&author, payload("Borrow a drill", "Hanging shelves"))
        .await
        .expect("create");

    let err = coordinator
        .offer_help(&author, &request.id)
        .await
        .expect_err("authors cannot help themselves");
    assert!(matches!(err, NeighborlyError::SelfOffer));

    let refreshed = coordinator.request_by_id(&request.id).await.expect("fetch");
    assert_eq!(refreshed.helpers_count, 0);
    assert_eq!(refreshed.status, RequestStatus::Open);
}

#[tokio::test]
async fn lifecycle_rejects_skips_and_edges_out_of_terminal_states() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");
    let request = coordinator
        .create_request(&author, payload("Dog walking", "Out of town this weekend"))
        .await
        .expect("create");

    // Open -> Completed skips the machine.
    let err = coordinator
        .set_status(&author, &request.id, RequestStatus::Completed)
        .await
        .expect_err("skip must be rejected");
    assert!(matches!(err, NeighborlyError::InvalidTransition { .. }));

    coordinator
        .set_status(&author, &request.id, RequestStatus::Cancelled)
        .await
        .expect("open -> cancelled is legal");

    // Cancelled is terminal: nothing leaves it.
    for target in [
        RequestStatus::Open,
        RequestStatus::InProgress,
        RequestStatus::PendingCompletion,
        RequestStatus::Completed,
    ] {
        let err = coordinator
            .set_status(&author, &request.id, target)
            .await
            .expect_err("terminal state has no outgoing edges");
        assert!(matches!(err, NeighborlyError::InvalidTransition { .. }));
    }

    // Offers on a terminal request are refused too.
    let helper = principal("u-helper", "Ben");
    let err = coordinator
        .offer_help(&helper, &request.id)
        .await
        .expect_err("cancelled requests accept no offers");
    assert!(matches!(err, NeighborlyError::InvalidTransition { .. }));
}

#[tokio::test]
async fn repeated_status_change_to_same_target_is_a_noop() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");
    let request = coordinator
        .create_request(&author, payload("Jump start", "Battery died overnight"))
        .await
        .expect("create");

    coordinator
        .set_status(&author, &request.id, RequestStatus::Cancelled)
        .await
        .expect("first cancel");
    let again = coordinator
        .set_status(&author, &request.id, RequestStatus::Cancelled)
        .await
        .expect("retried cancel is harmless");
    assert_eq!(again.status, RequestStatus::Cancelled);
}

#[tokio::test]
async fn only_the_author_may_change_status() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");
    let stranger = principal("u-stranger", "Mallory");
    let request = coordinator
        .create_request(&author, payload("Lost cat", "Orange tabby, answers to Leo"))
        .await
        .expect("create");

    let err = coordinator
        .set_status(&stranger, &request.id, RequestStatus::Cancelled)
        .await
        .expect_err("non-author must be refused");
    assert!(matches!(err, NeighborlyError::Forbidden(_)));
}

#[tokio::test]
async fn listing_hides_terminal_and_expired_requests() {
    let moderation = ModerationPipeline::new(
        Arc::new(FixedClassifier::approving()),
        StdDuration::from_millis(200),
    );
    let coordinator = Arc::new(
        Coordinator::new(Arc::new(MemoryStore::new()), moderation)
            .with_visibility_window(Duration::hours(24)),
    );
    let author = principal("u-author", "Ada");

    let visible = coordinator
        .create_request(&author, payload("Carpool", "Heading downtown at 8am"))
        .await
        .expect("create visible");
    let cancelled = coordinator
        .create_request(&author, payload("Nevermind", "Already solved"))
        .await
        .expect("create cancelled");
    coordinator
        .set_status(&author, &cancelled.id, RequestStatus::Cancelled)
        .await
        .expect("cancel");

    let listed = coordinator
        .list_active(&author, None)
        .await
        .expect("list");
    let ids: Vec<&str> = listed.iter().map(|l| l.request.id.value()).collect();
    assert!(ids.contains(&visible.id.value()));
    assert!(!ids.contains(&cancelled.id.value()));

    // A zero-width window expires everything, but the audit fetch
    // still resolves the id.
    let expired_view = Coordinator::new(
        coordinator.store(),
        ModerationPipeline::new(
            Arc::new(FixedClassifier::approving()),
            StdDuration::from_millis(200),
        ),
    )
    .with_visibility_window(Duration::hours(0));
    let listed = expired_view
        .list_active(&author, None)
        .await
        .expect("list expired");
    assert!(listed.is_empty());
    assert!(expired_view.request_by_id(&visible.id).await.is_ok());
}

#[tokio::test]
async fn prefiltered_content_is_refused_and_never_persisted() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");

    let err = coordinator
        .create_request(
            &author,
            payload("Study aid", "anyone selling adderall before finals week"),
        )
        .await
        .expect_err("deny-listed content must be refused");
    match err {
        NeighborlyError::ModerationRejected { reason } => assert!(!reason.is_empty()),
        other => panic!("expected ModerationRejected, got {other}"),
    }

    let listed = coordinator
        .list_active(&author, None)
        .await
        .expect("list");
    assert!(listed.is_empty());
}

#[tokio::test]
async fn classifier_outage_fails_open_with_keyword_category() {
    let coordinator = coordinator_with(FixedClassifier::unavailable());
    let author = principal("u-author", "Ada");

    let request = coordinator
        .create_request(
            &author,
            payload("Calculus", "Stuck on my calculus homework, exam friday"),
        )
        .await
        .expect("outage must not block a legitimate post");

    assert_eq!(request.status, RequestStatus::Open);
    assert_eq!(
        request.annotation.as_ref().map(|a| a.category),
        Some(Category::Academic)
    );
    assert!(request.estimated_minutes.is_some());
    assert!(!request.tags.is_empty());
}

#[tokio::test]
async fn full_lifecycle_with_two_helpers_and_one_accepted() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");
    let ben = principal("u-ben", "Ben");
    let cam = principal("u-cam", "Cam");

    let request = coordinator
        .create_request(&author, payload("Couch to third floor", "No elevator, sorry"))
        .await
        .expect("create");

    coordinator.offer_help(&ben, &request.id).await.expect("ben offers");
    coordinator.offer_help(&cam, &request.id).await.expect("cam offers");

    let accepted = coordinator
        .accept_helper(&author, &request.id, &ben.user_id)
        .await
        .expect("author accepts ben");
    assert_eq!(accepted.status, OfferStatus::Accepted);

    // Accepting again is an idempotent retry.
    let again = coordinator
        .accept_helper(&author, &request.id, &ben.user_id)
        .await
        .expect("retried accept");
    assert_eq!(again.status, OfferStatus::Accepted);

    // Only the author may accept.
    let err = coordinator
        .accept_helper(&cam, &request.id, &ben.user_id)
        .await
        .expect_err("non-author accept must fail");
    assert!(matches!(err, NeighborlyError::Forbidden(_)));

    coordinator
        .set_status(&author, &request.id, RequestStatus::PendingCompletion)
        .await
        .expect("in_progress -> pending_completion");
    let done = coordinator
        .set_status(&author, &request.id, RequestStatus::Completed)
        .await
        .expect("pending_completion -> completed");
    assert_eq!(done.status, RequestStatus::Completed);
    assert_eq!(done.helpers_count, 2);

    // Completion stamps the accepted offer but does not change its
    // status; cam's un-accepted pledge is untouched.
    let offers = coordinator
        .store()
        .offers_for(&request.id)
        .await
        .expect("offers");
    let ben_offer = offers
        .iter()
        .find(|o| o.helper_id == ben.user_id)
        .expect("ben's offer");
    let cam_offer = offers
        .iter()
        .find(|o| o.helper_id == cam.user_id)
        .expect("cam's offer");
    assert_eq!(ben_offer.status, OfferStatus::Accepted);
    assert!(ben_offer.completed_at.is_some());
    assert_eq!(cam_offer.status, OfferStatus::Active);
    assert!(cam_offer.completed_at.is_none());
}

#[tokio::test]
async fn accepting_an_unknown_helper_is_not_found() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");
    let request = coordinator
        .create_request(&author, payload("Spare charger", "USB-C, library 2nd floor"))
        .await
        .expect("create");

    let err = coordinator
        .accept_helper(&author, &request.id, &UserId::new("u-ghost"))
        .await
        .expect_err("no such offer");
    assert!(matches!(err, NeighborlyError::NotFound(_)));
}

#[tokio::test]
async fn moderation_annotations_round_trip_through_the_store() {
    let coordinator = coordinator_with(FixedClassifier::unavailable());
    let author = principal("u-author", "Ada");

    let created = coordinator
        .create_request(
            &author,
            payload("Ride to airport", "Flight at 6am saturday, can pay gas"),
        )
        .await
        .expect("create");
    let fetched = coordinator
        .request_by_id(&created.id)
        .await
        .expect("fetch");

    assert_eq!(fetched.annotation, created.annotation);
    assert_eq!(
        fetched.annotation.as_ref().map(|a| a.category),
        Some(Category::Transportation)
    );
    assert_eq!(fetched.detected_urgency, created.detected_urgency);
    assert_eq!(fetched.estimated_minutes, created.estimated_minutes);
    assert_eq!(fetched.tags, created.tags);
    assert_eq!(fetched.safety_verdict, Some(SafetyVerdict::Safe));
}

#[tokio::test]
async fn stale_status_update_cannot_exit_a_terminal_state() {
    let coordinator = coordinator();
    let author = principal("u-author", "Ada");
    let request = coordinator
        .create_request(&author, payload("Window stuck", "Second floor, paint-sealed"))
        .await
        .expect("create");
    coordinator
        .set_status(&author, &request.id, RequestStatus::Cancelled)
        .await
        .expect("cancel");

    // A writer whose transition was validated against a stale read
    // must match zero rows at the gateway instead of clobbering the
    // terminal state.
    let rows = coordinator
        .store()
        .update_status(
            &request.id,
            RequestStatus::Open,
            RequestStatus::InProgress,
            &author.user_id,
        )
        .await
        .expect("guarded update");
    assert_eq!(rows, 0);

    let fresh = coordinator.request_by_id(&request.id).await.expect("fetch");
    assert_eq!(fresh.status, RequestStatus::Cancelled);
}

#[tokio::test]
async fn listing_excludes_flagged_rows_while_audit_fetch_resolves_them() {
    // Creation refuses flagged content outright, but rows flagged
    // before that policy (or written by older code) may exist; the
    // listing filter must hide them without breaking the audit path.
    let store = MemoryStore::new();
    let flagged = store
        .insert_request(NewHelpRequest {
            title: "Old flagged row".to_string(),
            description: "persisted before creation-time refusal".to_string(),
            address: "dorm 3".to_string(),
            contact: "room 12".to_string(),
            coordinate: Coordinate {
                latitude: 44.97,
                longitude: -93.26,
            },
            author_id: UserId::new("u-legacy"),
            author_name: "Legacy".to_string(),
            urgency: UrgencyLevel::Medium,
            verdict: ModerationVerdict {
                safety: SafetyVerdict::Flagged,
                reason: Some("Requests involving controlled substances are not allowed.".to_string()),
                flag_category: Some("substances".to_string()),
                annotation: None,
                detected_urgency: None,
                estimated_minutes: None,
                tags: Vec::new(),
            },
        })
        .await
        .expect("insert");

    let cutoff = Utc::now() - Duration::hours(24);
    let visible = store.active_requests(cutoff).await.expect("list");
    assert!(visible.iter().all(|r| r.id != flagged.id));
    assert_eq!(store.active_count(cutoff).await.expect("count"), 0);

    let fetched = store
        .request_by_id(&flagged.id)
        .await
        .expect("audit fetch")
        .expect("row resolves by id");
    assert_eq!(fetched.safety_verdict, Some(SafetyVerdict::Flagged));
    assert_eq!(fetched.status, RequestStatus::Open);
}
