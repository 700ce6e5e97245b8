#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Two-stage content moderation and categorization pipeline.
//!
//! Stage 1 is a deterministic keyword prefilter; stage 2 delegates to a
//! contextual classifier. The pipeline never raises to the caller: any
//! classifier failure degrades to a fail-open safe verdict, and
//! categorization always succeeds via the local keyword fallback.
//!
//! Fail-open is a deliberate trade-off: safety-check infrastructure
//! failures must never silently block legitimate posts. The prefilter
//! still runs unconditionally, so the deterministic deny-list holds
//! even when the classifier is down.

pub mod classifier;
pub mod prefilter;
pub mod taxonomy;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::types::{
    CategoryAnnotation, ModerationVerdict, SafetyVerdict, UrgencyLevel,
};
use classifier::Categorization;

pub use classifier::{Classifier, FixedClassifier, RemoteClassifier};

pub struct ModerationPipeline {
    classifier: Arc<dyn Classifier>,
    classifier_timeout: Duration,
}

impl ModerationPipeline {
    #[must_use]
    pub fn new(classifier: Arc<dyn Classifier>, classifier_timeout: Duration) -> Self {
        Self {
            classifier,
            classifier_timeout,
        }
    }

    /// Evaluate new content. Infallible by contract: every internal
    /// failure degrades to a conservative default instead of blocking
    /// creation.
    pub async fn evaluate(
        &self,
        title: &str,
        description: &str,
        user_urgency: UrgencyLevel,
    ) -> ModerationVerdict {
        let combined = format!("{title} {description}");

        // Stage 1: deterministic prefilter short-circuits stage 2.
        if let Some(group) = prefilter::scan(&combined) {
            debug!(group = group.id, "prefilter flagged content");
            return ModerationVerdict {
                safety: SafetyVerdict::Flagged,
                reason: Some(group.reason.to_string()),
                flag_category: Some(group.id.to_string()),
                annotation: None,
                detected_urgency: None,
                estimated_minutes: None,
                tags: Vec::new(),
            };
        }

        // Stage 2: one bounded attempt against the contextual classifier.
        let safety = tokio::time::timeout(
            self.classifier_timeout,
            self.classifier.judge_safety(title, description),
        )
        .await;

        match safety {
            Ok(Ok(judgment)) if !judgment.safe => {
                return ModerationVerdict {
                    safety: SafetyVerdict::Flagged,
                    reason: Some(judgment.reason.unwrap_or_else(|| {
                        "This post does not meet community guidelines.".to_string()
                    })),
                    flag_category: judgment.category,
                    annotation: None,
                    detected_urgency: None,
                    estimated_minutes: None,
                    tags: Vec::new(),
                };
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!("safety classifier failed, failing open: {e}");
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.classifier_timeout.as_millis() as u64,
                    "safety classifier timed out, failing open"
                );
            }
        }

        // Independent categorization call; keyword fallback guarantees
        // this never fails outright.
        let categorization = tokio::time::timeout(
            self.classifier_timeout,
            self.classifier.categorize(title, description, user_urgency),
        )
        .await;

        let categorization = match categorization {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => {
                warn!("categorizer failed, using keyword fallback: {e}");
                keyword_fallback(&combined)
            }
            Err(_) => {
                warn!("categorizer timed out, using keyword fallback");
                keyword_fallback(&combined)
            }
        };

        let category = categorization.category;
        let estimated_minutes = categorization
            .estimated_minutes
            .unwrap_or_else(|| taxonomy::default_minutes(category));
        let tags = if categorization.tags.is_empty() {
            taxonomy::default_tags(category)
        } else {
            categorization.tags
        };

        ModerationVerdict {
            safety: SafetyVerdict::Safe,
            reason: None,
            flag_category: None,
            annotation: Some(CategoryAnnotation::of(category)),
            detected_urgency: Some(categorization.urgency.unwrap_or(user_urgency)),
            estimated_minutes: Some(estimated_minutes),
            tags,
        }
    }
}

fn keyword_fallback(text: &str) -> Categorization {
    let category = taxonomy::classify_keywords(text);
    Categorization {
        category,
        estimated_minutes: None,
        tags: Vec::new(),
        suggested_title: None,
        urgency: None,
    }
}
