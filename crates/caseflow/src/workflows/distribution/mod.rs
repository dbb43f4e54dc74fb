//! Case distribution and redistribution.
//!
//! An open case is matched against the lawyer pool: hard eligibility
//! constraints first, then an additive compatibility score, then a bounded
//! number of time-limited offers. Declines and expiries feed back into
//! redistribution until the case is matched or its retry budget is spent.

pub mod domain;
pub mod eligibility;
pub mod engine;
pub mod geo;
pub mod lifecycle;
pub mod memory;
pub mod quota;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod settings;

#[cfg(test)]
mod tests;

pub use domain::{
    Case, CaseId, CaseStatus, CitizenLocation, Coordinates, Lawyer, LawyerId, LeadQuota, Offer,
    OfferId, OfferStatus, PlanTier, ServiceArea, SpecialtyId, Urgency, UNLIMITED_LEADS,
};
pub use eligibility::{Candidate, EligibilityFilter, Exclusion};
pub use engine::{
    DistributionEngine, DistributionError, DistributionResult, RedistributionOutcome, SkipReason,
};
pub use lifecycle::{OfferLifecycleManager, SweepFailure, SweepReport};
pub use memory::InMemoryMarketplace;
pub use quota::{QuotaError, QuotaStatus, QuotaTracker};
pub use repository::{
    CaseRepository, Clock, LawyerRepository, OfferRepository, RepositoryError, SystemClock,
};
pub use router::distribution_router;
pub use scoring::{CompatibilityFactor, CompatibilityScore, CompatibilityScorer, ScoreComponent};
pub use service::{DeclineOutcome, DistributionService, OfferResponseError};
pub use settings::{
    DistributionSettings, EnvSettingsSource, PlanLimits, SettingsError, SettingsProvider,
    SettingsSource, StaticSettingsSource,
};
