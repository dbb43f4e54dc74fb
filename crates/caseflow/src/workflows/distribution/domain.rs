use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for citizen cases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseId(pub String);

/// Identifier wrapper for lawyers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LawyerId(pub String);

/// Identifier wrapper for offers (matches).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferId(pub String);

/// Practice area identifier resolved by case enrichment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpecialtyId(pub String);

macro_rules! display_id {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_id!(CaseId, LawyerId, OfferId, SpecialtyId);

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Where the citizen is, as supplied by case enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitizenLocation {
    pub coordinates: Option<Coordinates>,
    pub city: String,
    pub state: String,
}

/// Lawyer office location and the area they are willing to serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceArea {
    pub coordinates: Option<Coordinates>,
    pub city: String,
    pub state: String,
    pub service_radius_km: f64,
    pub accepts_other_states: bool,
}

pub(crate) fn same_state(left: &str, right: &str) -> bool {
    !left.is_empty() && left == right
}

pub(crate) fn same_city(left: &str, right: &str) -> bool {
    !left.is_empty() && left == right
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Urgent,
}

impl Urgency {
    pub const fn is_pressing(self) -> bool {
        matches!(self, Urgency::High | Urgency::Urgent)
    }
}

/// Case status. Distribution only ever runs against `Open` cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Open,
    Matched,
    InProgress,
    Closed,
    Cancelled,
}

impl CaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::Open => "open",
            CaseStatus::Matched => "matched",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Closed => "closed",
            CaseStatus::Cancelled => "cancelled",
        }
    }
}

/// A citizen's legal matter awaiting a lawyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub location: CitizenLocation,
    pub specialty_id: Option<SpecialtyId>,
    pub urgency: Urgency,
    pub status: CaseStatus,
    pub redistribution_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    Free,
    Basic,
    Premium,
    Unlimited,
}

impl PlanTier {
    pub const fn label(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
            PlanTier::Unlimited => "unlimited",
        }
    }
}

/// Stored monthly limit meaning "no cap".
pub const UNLIMITED_LEADS: i32 = -1;

/// Legacy limits at or above this value are also treated as unlimited.
pub const UNLIMITED_LEADS_THRESHOLD: i32 = 999;

pub const fn is_unlimited_limit(limit: i32) -> bool {
    limit < 0 || limit >= UNLIMITED_LEADS_THRESHOLD
}

/// Intake counters as persisted on the lawyer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadQuota {
    pub received_this_month: u32,
    pub limit_this_month: i32,
    pub received_this_hour: u32,
    pub last_monthly_reset: DateTime<Utc>,
    pub last_hourly_reset: DateTime<Utc>,
}

impl LeadQuota {
    pub fn fresh(limit_this_month: i32, now: DateTime<Utc>) -> Self {
        Self {
            received_this_month: 0,
            limit_this_month,
            received_this_hour: 0,
            last_monthly_reset: now,
            last_hourly_reset: now,
        }
    }

    pub const fn is_unlimited(&self) -> bool {
        is_unlimited_limit(self.limit_this_month)
    }
}

/// A service provider who can receive case offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lawyer {
    pub id: LawyerId,
    pub active: bool,
    pub onboarding_complete: bool,
    pub approved: bool,
    pub specialties: BTreeSet<SpecialtyId>,
    pub service_area: ServiceArea,
    pub plan: PlanTier,
    pub quota: LeadQuota,
}

/// Offer status machine.
///
/// `Pending -> Viewed -> {Accepted, Declined, Hired}` is driven by the lawyer,
/// `{Pending, Viewed} -> Expired` by the lifecycle sweep. Everything except
/// `Pending` and `Viewed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Pending,
    Viewed,
    Accepted,
    Declined,
    Hired,
    Expired,
}

impl OfferStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Viewed => "viewed",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
            OfferStatus::Hired => "hired",
            OfferStatus::Expired => "expired",
        }
    }

    /// Counts against the per-case offer cap and the per-pair uniqueness rule.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            OfferStatus::Pending | OfferStatus::Viewed | OfferStatus::Accepted | OfferStatus::Hired
        )
    }

    /// Still awaiting a response from the lawyer, so it may expire.
    pub const fn is_awaiting_response(self) -> bool {
        matches!(self, OfferStatus::Pending | OfferStatus::Viewed)
    }

    pub const fn is_matched(self) -> bool {
        matches!(self, OfferStatus::Accepted | OfferStatus::Hired)
    }

    pub const fn can_transition_to(self, next: OfferStatus) -> bool {
        match (self, next) {
            (OfferStatus::Pending, OfferStatus::Viewed) => true,
            (
                OfferStatus::Pending | OfferStatus::Viewed,
                OfferStatus::Accepted
                | OfferStatus::Declined
                | OfferStatus::Hired
                | OfferStatus::Expired,
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A proposed pairing between one case and one lawyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub case_id: CaseId,
    pub lawyer_id: LawyerId,
    pub score: u8,
    pub distance_km: Option<f64>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Offer {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_awaiting_response() && self.expires_at <= now
    }
}
