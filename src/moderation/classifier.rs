#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Contextual classifier capability.
//!
//! One production implementation (remote LLM call over HTTP) and one
//! deterministic implementation for tests, so the lifecycle and
//! transactional logic stay testable without network access.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{NeighborlyError, Result};
use crate::types::{Category, UrgencyLevel};

/// Structured safety verdict returned by stage 2.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SafetyJudgment {
    pub safe: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Structured categorization result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorization {
    pub category: Category,
    pub estimated_minutes: Option<u32>,
    pub tags: Vec<String>,
    pub suggested_title: Option<String>,
    pub urgency: Option<UrgencyLevel>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Single-attempt contextual safety check.
    async fn judge_safety(&self, title: &str, description: &str) -> Result<SafetyJudgment>;

    /// Single-attempt topic categorization.
    async fn categorize(
        &self,
        title: &str,
        description: &str,
        user_urgency: UrgencyLevel,
    ) -> Result<Categorization>;
}

/// Remote chat-completion classifier.
pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl RemoteClassifier {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// POST a system/user prompt pair and return the model's content
    /// string. Any transport or shape problem maps to
    /// `ClassifierUnavailable`; the pipeline turns that into its
    /// fail-open default.
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NeighborlyError::ClassifierUnavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(NeighborlyError::ClassifierUnavailable(format!(
                "classifier returned HTTP {}",
                response.status()
            )));
        }

        let envelope: serde_json::Value = response.json().await.map_err(|e| {
            NeighborlyError::ClassifierUnavailable(format!("non-JSON response: {e}"))
        })?;

        envelope
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                NeighborlyError::ClassifierUnavailable(
                    "response missing choices[0].message.content".to_string(),
                )
            })
    }
}

const SAFETY_SYSTEM_PROMPT: &str = "You moderate short help-request posts for a closed \
community board. Reply with a JSON object: {\"safe\": bool, \"category\": string|null, \
\"severity\": string|null, \"reason\": string|null}. Reason is required when unsafe and \
must be suitable to show the poster.";

const CATEGORIZE_SYSTEM_PROMPT: &str = "You categorize short help-request posts. Reply \
with a JSON object: {\"category\": one of [academic, technical, social, transportation, \
moving, food, health, emergency, other], \"estimated_minutes\": int, \"tags\": [string], \
\"suggested_title\": string, \"urgency\": one of [low, medium, high, urgent]}.";

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn judge_safety(&self, title: &str, description: &str) -> Result<SafetyJudgment> {
        let user = format!("Title: {title}\nDescription: {description}");
        let content = self.complete(SAFETY_SYSTEM_PROMPT, &user).await?;
        serde_json::from_str(&content).map_err(|e| {
            NeighborlyError::ClassifierUnavailable(format!("malformed safety verdict: {e}"))
        })
    }

    async fn categorize(
        &self,
        title: &str,
        description: &str,
        user_urgency: UrgencyLevel,
    ) -> Result<Categorization> {
        #[derive(Deserialize)]
        struct Raw {
            category: String,
            #[serde(default)]
            estimated_minutes: Option<u32>,
            #[serde(default)]
            tags: Vec<String>,
            #[serde(default)]
            suggested_title: Option<String>,
            #[serde(default)]
            urgency: Option<String>,
        }

        let user = format!(
            "Title: {title}\nDescription: {description}\nPoster-selected urgency: {user_urgency}"
        );
        let content = self.complete(CATEGORIZE_SYSTEM_PROMPT, &user).await?;
        let raw: Raw = serde_json::from_str(&content).map_err(|e| {
            NeighborlyError::ClassifierUnavailable(format!("malformed categorization: {e}"))
        })?;

        let category = Category::try_from(raw.category.as_str())
            .map_err(NeighborlyError::ClassifierUnavailable)?;
        let urgency = raw
            .urgency
            .as_deref()
            .and_then(|u| UrgencyLevel::try_from(u).ok());

        Ok(Categorization {
            category,
            estimated_minutes: raw.estimated_minutes,
            tags: raw.tags,
            suggested_title: raw.suggested_title,
            urgency,
        })
    }
}

/// Deterministic classifier for tests: scripted verdicts, optional
/// scripted failure to exercise the fail-open and fallback paths.
#[derive(Debug, Clone, Default)]
pub struct FixedClassifier {
    pub safety: Option<SafetyJudgment>,
    pub categorization: Option<Categorization>,
}

impl FixedClassifier {
    /// Classifier that approves everything and categorizes nothing,
    /// forcing the keyword fallback.
    #[must_use]
    pub const fn approving() -> Self {
        Self {
            safety: Some(SafetyJudgment {
                safe: true,
                category: None,
                severity: None,
                reason: None,
            }),
            categorization: None,
        }
    }

    /// Classifier whose every call fails, as if the remote endpoint
    /// were down or timing out.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            safety: None,
            categorization: None,
        }
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn judge_safety(&self, _title: &str, _description: &str) -> Result<SafetyJudgment> {
        self.safety.clone().ok_or_else(|| {
            NeighborlyError::ClassifierUnavailable("fixed classifier: safety unavailable".to_string())
        })
    }

    async fn categorize(
        &self,
        _title: &str,
        _description: &str,
        _user_urgency: UrgencyLevel,
    ) -> Result<Categorization> {
        self.categorization.clone().ok_or_else(|| {
            NeighborlyError::ClassifierUnavailable(
                "fixed classifier: categorization unavailable".to_string(),
            )
        })
    }
}
