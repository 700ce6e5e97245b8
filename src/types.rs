#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Help request identifier (server-assigned, opaque)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verified principal identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    InProgress,
    PendingCompletion,
    Completed,
    Cancelled,
}

impl RequestStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::PendingCompletion => "pending_completion",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RequestStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "pending_completion" => Ok(Self::PendingCompletion),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown request status: {s}")),
        }
    }
}

/// Offer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Active,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl OfferStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Offers in these states count toward the request's helper count.
    #[must_use]
    pub const fn counts_as_helping(&self) -> bool {
        matches!(self, Self::Active | Self::Accepted)
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OfferStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "active" => Ok(Self::Active),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown offer status: {s}")),
        }
    }
}

/// Urgency level of a help request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Urgent,
}

impl UrgencyLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl Default for UrgencyLevel {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for UrgencyLevel {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Unknown urgency level: {s}")),
        }
    }
}

/// Fixed categorization taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Academic,
    Technical,
    Social,
    Transportation,
    Moving,
    Food,
    Health,
    Emergency,
    Other,
}

impl Category {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Technical => "technical",
            Self::Social => "social",
            Self::Transportation => "transportation",
            Self::Moving => "moving",
            Self::Food => "food",
            Self::Health => "health",
            Self::Emergency => "emergency",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Academic => "Academic Help",
            Self::Technical => "Tech Support",
            Self::Social => "Social",
            Self::Transportation => "Transportation",
            Self::Moving => "Moving & Lifting",
            Self::Food => "Food",
            Self::Health => "Health & Wellness",
            Self::Emergency => "Emergency",
            Self::Other => "Other",
        }
    }

    #[must_use]
    pub const fn icon(&self) -> &'static str {
        match self {
            Self::Academic => "book",
            Self::Technical => "laptop",
            Self::Social => "users",
            Self::Transportation => "car",
            Self::Moving => "package",
            Self::Food => "utensils",
            Self::Health => "heart-pulse",
            Self::Emergency => "siren",
            Self::Other => "hand-helping",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Category {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "academic" => Ok(Self::Academic),
            "technical" => Ok(Self::Technical),
            "social" => Ok(Self::Social),
            "transportation" => Ok(Self::Transportation),
            "moving" => Ok(Self::Moving),
            "food" => Ok(Self::Food),
            "health" => Ok(Self::Health),
            "emergency" => Ok(Self::Emergency),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown category: {s}")),
        }
    }
}

/// Safety verdict attached to a request by the moderation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    Safe,
    Flagged,
}

impl SafetyVerdict {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Flagged => "flagged",
        }
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SafetyVerdict {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "safe" => Ok(Self::Safe),
            "flagged" => Ok(Self::Flagged),
            _ => Err(format!("Unknown safety verdict: {s}")),
        }
    }
}

/// Category annotation; icon and label are always derived from the
/// category id so the three fields cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAnnotation {
    pub category: Category,
    pub label: String,
    pub icon: String,
}

impl CategoryAnnotation {
    #[must_use]
    pub fn of(category: Category) -> Self {
        Self {
            category,
            label: category.label().to_string(),
            icon: category.icon().to_string(),
        }
    }
}

/// Verdict produced by the moderation pipeline. Ephemeral: attached to
/// the request at creation, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    pub safety: SafetyVerdict,
    pub reason: Option<String>,
    /// Keyword group or classifier category that triggered a flag.
    pub flag_category: Option<String>,
    pub annotation: Option<CategoryAnnotation>,
    pub detected_urgency: Option<UrgencyLevel>,
    pub estimated_minutes: Option<u32>,
    pub tags: Vec<String>,
}

impl ModerationVerdict {
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        matches!(self.safety, SafetyVerdict::Safe)
    }
}

/// Geographic coordinate, validated at construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Validate a coordinate pair. Returns the names of the offending
    /// fields so callers can build a field-level validation error.
    pub fn parse(
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> std::result::Result<Self, Vec<String>> {
        let mut bad_fields = Vec::new();
        if !latitude.is_some_and(|lat| lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
            bad_fields.push("latitude".to_string());
        }
        if !longitude.is_some_and(|lon| lon.is_finite() && (-180.0..=180.0).contains(&lon)) {
            bad_fields.push("longitude".to_string());
        }
        match (latitude, longitude) {
            (Some(lat), Some(lon)) if bad_fields.is_empty() => Ok(Self {
                latitude: lat,
                longitude: lon,
            }),
            _ => Err(bad_fields),
        }
    }

    /// Great-circle distance in kilometers (haversine).
    #[must_use]
    pub fn haversine_km(&self, other: &Self) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// A help-seeking post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpRequest {
    pub id: RequestId,
    pub title: String,
    pub description: String,
    pub address: String,
    pub contact: String,
    pub latitude: f64,
    pub longitude: f64,
    pub author_id: UserId,
    pub author_name: String,
    pub urgency: UrgencyLevel,
    pub status: RequestStatus,
    pub helpers_count: u32,
    pub annotation: Option<CategoryAnnotation>,
    pub detected_urgency: Option<UrgencyLevel>,
    pub estimated_minutes: Option<u32>,
    pub tags: Vec<String>,
    pub safety_verdict: Option<SafetyVerdict>,
    pub safety_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HelpRequest {
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// A pledge by one principal to help with one request.
/// Unique per (request, helper) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpOffer {
    pub request_id: RequestId,
    pub helper_id: UserId,
    pub helper_name: String,
    pub status: OfferStatus,
    pub offered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Durable projection of a verified principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub email: String,
    pub requests_created: u32,
    pub offers_made: u32,
}

/// Fully-validated input for a request insert, built by the coordinator
/// after moderation has passed.
#[derive(Debug, Clone)]
pub struct NewHelpRequest {
    pub title: String,
    pub description: String,
    pub address: String,
    pub contact: String,
    pub coordinate: Coordinate,
    pub author_id: UserId,
    pub author_name: String,
    pub urgency: UrgencyLevel,
    pub verdict: ModerationVerdict,
}

/// Inbound create-request body. Clients send coordinates as number or
/// string; the lenient deserializer collapses both into `Option<f64>`
/// and `Coordinate::parse` has the final word.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestPayload {
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub urgency_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
}

/// Inbound accept-helper body. Helper ids may arrive as string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptHelperPayload {
    #[serde(deserialize_with = "lenient_string")]
    pub helper_id: String,
}

/// Inbound status-change body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub status: String,
}

/// Accept a JSON number, a numeric string, or null.
pub fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
        Missing(()),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Str(s)) => Ok(s.trim().parse::<f64>().ok()),
        Some(Raw::Missing(())) | None => Ok(None),
    }
}

/// Accept a JSON string or number as a string id.
pub fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Num(f64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Str(s) => Ok(s),
        Raw::Int(n) => Ok(n.to_string()),
        Raw::Num(n) => Ok(n.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Category, CategoryAnnotation, Coordinate, CreateRequestPayload, OfferStatus,
        RequestStatus, SafetyVerdict, UrgencyLevel,
    };

    #[test]
    fn status_string_roundtrip_and_invalid_values() {
        for status in [
            RequestStatus::Open,
            RequestStatus::InProgress,
            RequestStatus::PendingCompletion,
            RequestStatus::Completed,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(RequestStatus::try_from(status.as_str()), Ok(status));
        }
        assert!(RequestStatus::try_from("reopened").is_err());
        assert!(OfferStatus::try_from("bogus").is_err());
        assert!(SafetyVerdict::try_from("unsafe").is_err());
    }

    #[test]
    fn urgency_parsing_is_case_insensitive() {
        assert_eq!(UrgencyLevel::try_from("URGENT"), Ok(UrgencyLevel::Urgent));
        assert_eq!(UrgencyLevel::try_from("Medium"), Ok(UrgencyLevel::Medium));
        assert!(UrgencyLevel::try_from("asap").is_err());
    }

    #[test]
    fn annotation_is_all_or_nothing() {
        let annotation = CategoryAnnotation::of(Category::Academic);
        assert_eq!(annotation.category, Category::Academic);
        assert_eq!(annotation.label, Category::Academic.label());
        assert_eq!(annotation.icon, Category::Academic.icon());
    }

    #[test]
    fn coordinate_parse_rejects_nan_and_out_of_range() {
        assert!(Coordinate::parse(Some(44.97), Some(-93.26)).is_ok());

        let err = Coordinate::parse(Some(f64::NAN), Some(-93.26))
            .err()
            .unwrap_or_default();
        assert_eq!(err, vec!["latitude".to_string()]);

        let err = Coordinate::parse(Some(91.0), Some(181.0))
            .err()
            .unwrap_or_default();
        assert_eq!(
            err,
            vec!["latitude".to_string(), "longitude".to_string()]
        );

        let err = Coordinate::parse(None, None).err().unwrap_or_default();
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn haversine_is_deterministic_and_plausible() {
        let minneapolis = Coordinate {
            latitude: 44.9778,
            longitude: -93.2650,
        };
        let st_paul = Coordinate {
            latitude: 44.9537,
            longitude: -93.0900,
        };
        let distance = minneapolis.haversine_km(&st_paul);
        assert!((13.0..16.0).contains(&distance), "got {distance}");
        assert!(minneapolis.haversine_km(&minneapolis).abs() < 1e-9);
        // Symmetric by construction.
        let back = st_paul.haversine_km(&minneapolis);
        assert!((distance - back).abs() < 1e-9);
    }

    #[test]
    fn payload_accepts_string_or_numeric_coordinates() {
        let body = r#"{
            "caption": "Jump start",
            "description": "Car battery died in lot C",
            "address": "Lot C",
            "contact": "555-0100",
            "urgencyLevel": "high",
            "latitude": "44.97",
            "longitude": -93.26
        }"#;
        let payload: CreateRequestPayload =
            serde_json::from_str(body).unwrap_or_default();
        assert_eq!(payload.latitude, Some(44.97));
        assert_eq!(payload.longitude, Some(-93.26));

        let body = r#"{"caption": "x", "latitude": "not a number"}"#;
        let payload: CreateRequestPayload =
            serde_json::from_str(body).unwrap_or_default();
        assert_eq!(payload.latitude, None);
    }

    #[test]
    fn helper_id_accepts_string_or_number() {
        let payload: super::AcceptHelperPayload =
            serde_json::from_str(r#"{"helperId": 42}"#).map_or_else(
                |_| super::AcceptHelperPayload {
                    helper_id: String::new(),
                },
                |p| p,
            );
        assert_eq!(payload.helper_id, "42");
    }
}
