//! Thread-safe in-memory store used by the API binary, the demo and tests.
//!
//! All three repositories share one lock, so every trait call is a single
//! transaction against a consistent snapshot.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{Case, CaseId, CaseStatus, Lawyer, LawyerId, Offer, OfferId, OfferStatus};
use super::repository::{CaseRepository, LawyerRepository, OfferRepository, RepositoryError};

#[derive(Debug, Default)]
struct MarketplaceState {
    cases: Vec<Case>,
    lawyers: Vec<Lawyer>,
    offers: Vec<Offer>,
}

#[derive(Debug, Default)]
pub struct InMemoryMarketplace {
    state: Mutex<MarketplaceState>,
}

impl InMemoryMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MarketplaceState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("marketplace state poisoned".to_string()))
    }

    /// Add or replace a case.
    pub fn put_case(&self, case: Case) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state.cases.iter_mut().find(|existing| existing.id == case.id) {
            Some(existing) => *existing = case,
            None => state.cases.push(case),
        }
        Ok(())
    }

    /// Add or replace a lawyer. Registration order is the ranking tie-breaker.
    pub fn put_lawyer(&self, lawyer: Lawyer) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state
            .lawyers
            .iter_mut()
            .find(|existing| existing.id == lawyer.id)
        {
            Some(existing) => *existing = lawyer,
            None => state.lawyers.push(lawyer),
        }
        Ok(())
    }

    pub fn all_offers(&self) -> Result<Vec<Offer>, RepositoryError> {
        Ok(self.state()?.offers.clone())
    }

    pub fn all_cases(&self) -> Result<Vec<Case>, RepositoryError> {
        Ok(self.state()?.cases.clone())
    }
}

impl CaseRepository for InMemoryMarketplace {
    fn fetch_case(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        let state = self.state()?;
        Ok(state.cases.iter().find(|case| &case.id == id).cloned())
    }

    fn set_case_status(&self, id: &CaseId, status: CaseStatus) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let case = state
            .cases
            .iter_mut()
            .find(|case| &case.id == id)
            .ok_or(RepositoryError::NotFound)?;
        case.status = status;
        Ok(())
    }

    fn increment_redistribution(&self, id: &CaseId) -> Result<u32, RepositoryError> {
        let mut state = self.state()?;
        let case = state
            .cases
            .iter_mut()
            .find(|case| &case.id == id)
            .ok_or(RepositoryError::NotFound)?;
        case.redistribution_count += 1;
        Ok(case.redistribution_count)
    }
}

impl LawyerRepository for InMemoryMarketplace {
    fn fetch_lawyer(&self, id: &LawyerId) -> Result<Option<Lawyer>, RepositoryError> {
        let state = self.state()?;
        Ok(state.lawyers.iter().find(|lawyer| &lawyer.id == id).cloned())
    }

    fn active_lawyers(&self) -> Result<Vec<Lawyer>, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .lawyers
            .iter()
            .filter(|lawyer| lawyer.active)
            .cloned()
            .collect())
    }

    fn all_lawyer_ids(&self) -> Result<Vec<LawyerId>, RepositoryError> {
        let state = self.state()?;
        Ok(state.lawyers.iter().map(|lawyer| lawyer.id.clone()).collect())
    }

    fn update_if(
        &self,
        id: &LawyerId,
        change: &mut dyn FnMut(&mut Lawyer) -> bool,
    ) -> Result<Option<Lawyer>, RepositoryError> {
        let mut state = self.state()?;
        let stored = state
            .lawyers
            .iter_mut()
            .find(|lawyer| &lawyer.id == id)
            .ok_or(RepositoryError::NotFound)?;

        let mut draft = stored.clone();
        if !change(&mut draft) {
            return Ok(None);
        }
        *stored = draft.clone();
        Ok(Some(draft))
    }
}

impl OfferRepository for InMemoryMarketplace {
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError> {
        let mut state = self.state()?;
        if state.offers.iter().any(|existing| existing.id == offer.id) {
            return Err(RepositoryError::DuplicateId(offer.id.0));
        }
        let pair_taken = offer.status.is_active()
            && state.offers.iter().any(|existing| {
                existing.case_id == offer.case_id
                    && existing.lawyer_id == offer.lawyer_id
                    && existing.status.is_active()
            });
        if pair_taken {
            return Err(RepositoryError::Conflict);
        }
        state.offers.push(offer.clone());
        Ok(offer)
    }

    fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        let state = self.state()?;
        Ok(state.offers.iter().find(|offer| &offer.id == id).cloned())
    }

    fn offers_for_case(&self, case_id: &CaseId) -> Result<Vec<Offer>, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .offers
            .iter()
            .filter(|offer| &offer.case_id == case_id)
            .cloned()
            .collect())
    }

    fn transition_offer(
        &self,
        id: &OfferId,
        from: OfferStatus,
        to: OfferStatus,
    ) -> Result<Offer, RepositoryError> {
        let mut state = self.state()?;
        let offer = state
            .offers
            .iter_mut()
            .find(|offer| &offer.id == id && offer.status == from)
            .ok_or(RepositoryError::NotFound)?;
        offer.status = to;
        Ok(offer.clone())
    }

    fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Offer>, RepositoryError> {
        let mut state = self.state()?;
        let mut expired = Vec::new();
        for offer in state.offers.iter_mut().filter(|offer| offer.is_overdue(now)) {
            offer.status = OfferStatus::Expired;
            expired.push(offer.clone());
        }
        Ok(expired)
    }

    fn withdraw_offer(&self, id: &OfferId) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let before = state.offers.len();
        state.offers.retain(|offer| &offer.id != id);
        if state.offers.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
