use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{CaseId, CaseStatus, LawyerId, Offer, OfferId, OfferStatus};
use super::engine::{
    DistributionEngine, DistributionError, DistributionResult, RedistributionOutcome,
};
use super::lifecycle::{OfferLifecycleManager, SweepReport};
use super::quota::{QuotaError, QuotaStatus};
use super::repository::{
    CaseRepository, Clock, LawyerRepository, OfferRepository, RepositoryError,
};
use super::scoring::CompatibilityScore;
use super::settings::SettingsProvider;

/// Result of a lawyer declining an offer.
///
/// The decline is committed even when the follow-up redistribution fails;
/// the failure is reported in `redistribution_error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclineOutcome {
    pub offer: Offer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redistribution: Option<RedistributionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redistribution_error: Option<String>,
}

/// Service composing the engine, the lifecycle sweep and the offer responses.
pub struct DistributionService<C, L, O> {
    cases: Arc<C>,
    lawyers: Arc<L>,
    offers: Arc<O>,
    engine: Arc<DistributionEngine<C, L, O>>,
    lifecycle: OfferLifecycleManager<C, L, O>,
}

impl<C, L, O> DistributionService<C, L, O>
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    pub fn new(
        cases: Arc<C>,
        lawyers: Arc<L>,
        offers: Arc<O>,
        settings: Arc<SettingsProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = Arc::new(DistributionEngine::new(
            cases.clone(),
            lawyers.clone(),
            offers.clone(),
            settings.clone(),
            clock.clone(),
        ));
        let lifecycle = OfferLifecycleManager::new(offers.clone(), engine.clone(), settings, clock);

        Self {
            cases,
            lawyers,
            offers,
            engine,
            lifecycle,
        }
    }

    pub fn engine(&self) -> &Arc<DistributionEngine<C, L, O>> {
        &self.engine
    }

    /// Case lifecycle hook: a case became open.
    pub fn distribute(&self, case_id: &CaseId) -> Result<DistributionResult, DistributionError> {
        self.engine.distribute(case_id)
    }

    pub fn redistribute(
        &self,
        case_id: &CaseId,
    ) -> Result<RedistributionOutcome, DistributionError> {
        self.engine.redistribute(case_id)
    }

    /// Scheduler hook: expire stale offers and redistribute.
    pub fn sweep(&self) -> Result<SweepReport, RepositoryError> {
        self.lifecycle.sweep()
    }

    /// Scheduler hook: persist due quota window resets.
    pub fn reset_quotas(&self) -> Result<usize, QuotaError> {
        self.engine.quota().reset_all_due()
    }

    pub fn case_offers(&self, case_id: &CaseId) -> Result<Vec<Offer>, DistributionError> {
        if self.cases.fetch_case(case_id)?.is_none() {
            return Err(DistributionError::CaseNotFound(case_id.clone()));
        }
        Ok(self.offers.offers_for_case(case_id)?)
    }

    pub fn quota_status(&self, lawyer_id: &LawyerId) -> Result<QuotaStatus, DistributionError> {
        let lawyer = self
            .lawyers
            .fetch_lawyer(lawyer_id)?
            .ok_or_else(|| DistributionError::LawyerNotFound(lawyer_id.clone()))?;
        Ok(self.engine.quota().status(&lawyer))
    }

    /// Score breakdown for a (case, lawyer) pair, for dispute resolution.
    pub fn explain(
        &self,
        case_id: &CaseId,
        lawyer_id: &LawyerId,
    ) -> Result<CompatibilityScore, DistributionError> {
        let case = self
            .cases
            .fetch_case(case_id)?
            .ok_or_else(|| DistributionError::CaseNotFound(case_id.clone()))?;
        let lawyer = self
            .lawyers
            .fetch_lawyer(lawyer_id)?
            .ok_or_else(|| DistributionError::LawyerNotFound(lawyer_id.clone()))?;
        Ok(self.engine.scorer().evaluate(&case, &lawyer))
    }

    pub fn view_offer(&self, offer_id: &OfferId) -> Result<Offer, OfferResponseError> {
        let offer = self.fetch_offer(offer_id)?;
        if offer.status == OfferStatus::Viewed {
            return Ok(offer);
        }
        self.transition(offer, OfferStatus::Viewed)
    }

    /// Lawyer takes the case; the case becomes matched.
    pub fn accept_offer(&self, offer_id: &OfferId) -> Result<Offer, OfferResponseError> {
        self.close_with_match(offer_id, OfferStatus::Accepted)
    }

    pub fn mark_hired(&self, offer_id: &OfferId) -> Result<Offer, OfferResponseError> {
        self.close_with_match(offer_id, OfferStatus::Hired)
    }

    /// Lawyer passes; they are never offered this case again.
    pub fn decline_offer(&self, offer_id: &OfferId) -> Result<DeclineOutcome, OfferResponseError> {
        let offer = self.fetch_offer(offer_id)?;
        let offer = self.transition(offer, OfferStatus::Declined)?;
        info!(offer_id = %offer.id, case_id = %offer.case_id, "offer declined");

        match self.engine.redistribute(&offer.case_id) {
            Ok(redistribution) => Ok(DeclineOutcome {
                offer,
                redistribution: Some(redistribution),
                redistribution_error: None,
            }),
            Err(error) => {
                warn!(case_id = %offer.case_id, %error, "redistribution after decline failed");
                Ok(DeclineOutcome {
                    offer,
                    redistribution: None,
                    redistribution_error: Some(error.to_string()),
                })
            }
        }
    }

    fn close_with_match(
        &self,
        offer_id: &OfferId,
        status: OfferStatus,
    ) -> Result<Offer, OfferResponseError> {
        let offer = self.fetch_offer(offer_id)?;
        let _serialized = self.engine.case_lock(&offer.case_id);

        let case = self
            .cases
            .fetch_case(&offer.case_id)?
            .ok_or_else(|| DistributionError::CaseNotFound(offer.case_id.clone()))?;
        if case.status != CaseStatus::Open {
            return Err(DistributionError::InvalidState {
                case_id: case.id,
                status: case.status,
            }
            .into());
        }

        let offer = self.transition(offer, status)?;
        self.cases
            .set_case_status(&offer.case_id, CaseStatus::Matched)?;
        info!(offer_id = %offer.id, case_id = %offer.case_id, status = %offer.status, "case matched");
        Ok(offer)
    }

    fn fetch_offer(&self, offer_id: &OfferId) -> Result<Offer, OfferResponseError> {
        self.offers
            .fetch_offer(offer_id)?
            .ok_or_else(|| OfferResponseError::OfferNotFound(offer_id.clone()))
    }

    fn transition(&self, offer: Offer, to: OfferStatus) -> Result<Offer, OfferResponseError> {
        if !offer.status.can_transition_to(to) {
            return Err(OfferResponseError::InvalidTransition {
                offer_id: offer.id,
                from: offer.status,
                to,
            });
        }

        match self.offers.transition_offer(&offer.id, offer.status, to) {
            Ok(updated) => Ok(updated),
            Err(RepositoryError::NotFound) => Err(OfferResponseError::InvalidTransition {
                offer_id: offer.id,
                from: offer.status,
                to,
            }),
            Err(error) => Err(error.into()),
        }
    }
}

/// Error raised while a lawyer responds to an offer.
#[derive(Debug, thiserror::Error)]
pub enum OfferResponseError {
    #[error("offer {0} not found")]
    OfferNotFound(OfferId),
    #[error("offer {offer_id} cannot move from {from} to {to}")]
    InvalidTransition {
        offer_id: OfferId,
        from: OfferStatus,
        to: OfferStatus,
    },
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
