use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::domain::{same_state, Case, Lawyer, LawyerId, Offer, OfferStatus};
use super::geo::distance_between;
use super::quota::QuotaTracker;
use super::repository::{LawyerRepository, OfferRepository, RepositoryError};

/// Lawyer who passed every hard constraint, with the distance already measured.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub lawyer: Lawyer,
    pub distance_km: Option<f64>,
}

/// Why a lawyer was left out of the candidate pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Exclusion {
    Inactive,
    OnboardingIncomplete,
    NotApproved,
    QuotaExhausted,
    AlreadyOffered,
    PreviouslyDeclined,
    OutsideServiceRadius { distance_km: f64, radius_km: f64 },
    OutOfState,
}

/// Per-case view over existing offers.
#[derive(Debug, Clone, Default)]
pub struct CaseOffers {
    active: BTreeSet<LawyerId>,
    declined: BTreeSet<LawyerId>,
    active_count: usize,
    matched: bool,
}

impl CaseOffers {
    pub fn from_offers(offers: &[Offer]) -> Self {
        let mut view = Self::default();
        for offer in offers {
            if offer.status.is_active() {
                view.active.insert(offer.lawyer_id.clone());
                view.active_count += 1;
            }
            if offer.status.is_matched() {
                view.matched = true;
            }
            if offer.status == OfferStatus::Declined {
                view.declined.insert(offer.lawyer_id.clone());
            }
        }
        view
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn has_match(&self) -> bool {
        self.matched
    }

    pub fn holds_active(&self, lawyer_id: &LawyerId) -> bool {
        self.active.contains(lawyer_id)
    }

    pub fn declined(&self, lawyer_id: &LawyerId) -> bool {
        self.declined.contains(lawyer_id)
    }
}

/// Hard constraints a lawyer must meet before being scored for a case.
pub struct EligibilityFilter<L, O> {
    lawyers: Arc<L>,
    offers: Arc<O>,
    quota: Arc<QuotaTracker<L>>,
}

impl<L, O> EligibilityFilter<L, O>
where
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    pub fn new(lawyers: Arc<L>, offers: Arc<O>, quota: Arc<QuotaTracker<L>>) -> Self {
        Self {
            lawyers,
            offers,
            quota,
        }
    }

    /// Candidate pool for `case`, in repository order. Read-only.
    pub fn eligible(&self, case: &Case) -> Result<Vec<Candidate>, RepositoryError> {
        let history = CaseOffers::from_offers(&self.offers.offers_for_case(&case.id)?);
        let lawyers = self.lawyers.active_lawyers()?;

        let mut candidates = Vec::with_capacity(lawyers.len());
        for lawyer in lawyers {
            match self.check(case, &lawyer, &history) {
                Ok(distance_km) => candidates.push(Candidate {
                    lawyer,
                    distance_km,
                }),
                Err(exclusion) => {
                    debug!(case_id = %case.id, lawyer_id = %lawyer.id, ?exclusion, "lawyer excluded");
                }
            }
        }

        Ok(candidates)
    }

    /// Evaluate one lawyer; on success returns the measured distance, if any.
    pub fn check(
        &self,
        case: &Case,
        lawyer: &Lawyer,
        history: &CaseOffers,
    ) -> Result<Option<f64>, Exclusion> {
        if !lawyer.active {
            return Err(Exclusion::Inactive);
        }
        if !lawyer.onboarding_complete {
            return Err(Exclusion::OnboardingIncomplete);
        }
        if !lawyer.approved {
            return Err(Exclusion::NotApproved);
        }
        if !self.quota.can_receive(lawyer) {
            return Err(Exclusion::QuotaExhausted);
        }
        if history.declined(&lawyer.id) {
            return Err(Exclusion::PreviouslyDeclined);
        }
        if history.holds_active(&lawyer.id) {
            return Err(Exclusion::AlreadyOffered);
        }

        geographic_fit(case, lawyer)
    }
}

/// Radius check when both sides have coordinates, state match otherwise.
pub fn geographic_fit(case: &Case, lawyer: &Lawyer) -> Result<Option<f64>, Exclusion> {
    let area = &lawyer.service_area;

    if let (Some(citizen), Some(office)) = (case.location.coordinates, area.coordinates) {
        let distance_km = distance_between(citizen, office);
        return if distance_km <= area.service_radius_km {
            Ok(Some(distance_km))
        } else {
            Err(Exclusion::OutsideServiceRadius {
                distance_km,
                radius_km: area.service_radius_km,
            })
        };
    }

    if area.accepts_other_states || same_state(&case.location.state, &area.state) {
        Ok(None)
    } else {
        Err(Exclusion::OutOfState)
    }
}
