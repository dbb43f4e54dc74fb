use chrono::{DateTime, Utc};

use super::domain::{Case, CaseId, CaseStatus, Lawyer, LawyerId, Offer, OfferId, OfferStatus};

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// An active offer for the same (case, lawyer) pair already exists.
    #[error("record already exists")]
    Conflict,
    #[error("id {0} is already taken")]
    DuplicateId(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub trait CaseRepository: Send + Sync {
    fn fetch_case(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError>;
    fn set_case_status(&self, id: &CaseId, status: CaseStatus) -> Result<(), RepositoryError>;
    /// Bump `redistribution_count` and return the new value.
    fn increment_redistribution(&self, id: &CaseId) -> Result<u32, RepositoryError>;
}

pub trait LawyerRepository: Send + Sync {
    fn fetch_lawyer(&self, id: &LawyerId) -> Result<Option<Lawyer>, RepositoryError>;
    /// Lawyers whose account is active; finer eligibility is the caller's job.
    fn active_lawyers(&self) -> Result<Vec<Lawyer>, RepositoryError>;
    fn all_lawyer_ids(&self) -> Result<Vec<LawyerId>, RepositoryError>;
    /// Atomic read-modify-write of a single lawyer.
    ///
    /// `change` runs against the current record while no other writer can touch
    /// it. Returning `false` abandons the change and yields `Ok(None)`.
    fn update_if(
        &self,
        id: &LawyerId,
        change: &mut dyn FnMut(&mut Lawyer) -> bool,
    ) -> Result<Option<Lawyer>, RepositoryError>;
}

pub trait OfferRepository: Send + Sync {
    /// Persist a new offer.
    ///
    /// Must fail with [`RepositoryError::Conflict`] when an active offer for the
    /// same (case, lawyer) pair already exists, and with
    /// [`RepositoryError::DuplicateId`] when the offer id is taken.
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError>;
    fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError>;
    fn offers_for_case(&self, case_id: &CaseId) -> Result<Vec<Offer>, RepositoryError>;
    /// Move an offer from `from` to `to`; `NotFound` if it is no longer in `from`.
    fn transition_offer(
        &self,
        id: &OfferId,
        from: OfferStatus,
        to: OfferStatus,
    ) -> Result<Offer, RepositoryError>;
    /// Bulk-expire every pending/viewed offer with `expires_at <= now`.
    fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Offer>, RepositoryError>;
    /// Remove an offer that was never handed out (compensation path).
    fn withdraw_offer(&self, id: &OfferId) -> Result<(), RepositoryError>;
}

/// Time source so expiry and quota windows can be driven in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
