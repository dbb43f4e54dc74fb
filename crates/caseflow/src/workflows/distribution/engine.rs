use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::domain::{Case, CaseId, CaseStatus, LawyerId, Offer, OfferId, OfferStatus};
use super::eligibility::{CaseOffers, Candidate, EligibilityFilter};
use super::quota::{QuotaError, QuotaTracker};
use super::repository::{
    CaseRepository, Clock, LawyerRepository, OfferRepository, RepositoryError,
};
use super::scoring::CompatibilityScorer;
use super::settings::{DistributionSettings, SettingsProvider};

/// Precondition failures surfaced to the caller; never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
    #[error("case {case_id} is {}, distribution requires an open case", .status.label())]
    InvalidState { case_id: CaseId, status: CaseStatus },
    #[error("lawyer {0} not found")]
    LawyerNotFound(LawyerId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What a distribution round produced. Partial success is normal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub case_id: CaseId,
    pub offers_created: usize,
    pub lawyer_ids: Vec<LawyerId>,
    pub offer_ids: Vec<OfferId>,
}

impl DistributionResult {
    fn empty(case_id: &CaseId) -> Self {
        Self {
            case_id: case_id.clone(),
            offers_created: 0,
            lawyer_ids: Vec::new(),
            offer_ids: Vec::new(),
        }
    }
}

/// Why a redistribution request did nothing. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    LimitReached,
    AlreadyMatched,
    SlotsFull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedistributionOutcome {
    pub case_id: CaseId,
    pub offers_created: usize,
    pub lawyer_ids: Vec<LawyerId>,
    pub offer_ids: Vec<OfferId>,
    pub redistribution_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
}

impl RedistributionOutcome {
    fn skipped(case: &Case, reason: SkipReason) -> Self {
        Self {
            case_id: case.id.clone(),
            offers_created: 0,
            lawyer_ids: Vec::new(),
            offer_ids: Vec::new(),
            redistribution_count: case.redistribution_count,
            reason: Some(reason),
        }
    }

    fn ran(result: DistributionResult, redistribution_count: u32) -> Self {
        Self {
            case_id: result.case_id,
            offers_created: result.offers_created,
            lawyer_ids: result.lawyer_ids,
            offer_ids: result.offer_ids,
            redistribution_count,
            reason: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.reason.is_some()
    }
}

/// Number of mutexes case ids are hashed onto.
pub const CASE_LOCK_STRIPES: usize = 64;

fn next_offer_id() -> OfferId {
    OfferId(format!("offer-{}", Uuid::new_v4()))
}

/// Filters, scores and ranks lawyers for a case, then creates bounded offers.
pub struct DistributionEngine<C, L, O> {
    cases: Arc<C>,
    offers: Arc<O>,
    filter: EligibilityFilter<L, O>,
    scorer: CompatibilityScorer,
    quota: Arc<QuotaTracker<L>>,
    settings: Arc<SettingsProvider>,
    clock: Arc<dyn Clock>,
    case_locks: Box<[Mutex<()>]>,
}

impl<C, L, O> DistributionEngine<C, L, O>
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
        let quota = Arc::new(QuotaTracker::new(
            lawyers.clone(),
            settings.clone(),
            clock.clone(),
        ));
        let filter = EligibilityFilter::new(lawyers, offers.clone(), quota.clone());

        Self {
            cases,
            offers,
            filter,
            scorer: CompatibilityScorer::new(),
            quota,
            settings,
            clock,
            case_locks: (0..CASE_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn quota(&self) -> &Arc<QuotaTracker<L>> {
        &self.quota
    }

    pub fn scorer(&self) -> &CompatibilityScorer {
        &self.scorer
    }

    pub fn settings(&self) -> &Arc<SettingsProvider> {
        &self.settings
    }

    /// Create offers for an open case, filling only the free slots.
    pub fn distribute(&self, case_id: &CaseId) -> Result<DistributionResult, DistributionError> {
        let _serialized = self.case_lock(case_id);

        let case = self.load_case(case_id)?;
        ensure_open(&case)?;

        let settings = self.settings.current();
        let result = self.fill_slots(&case, &settings)?;
        info!(
            case_id = %case.id,
            offers_created = result.offers_created,
            "case distributed"
        );
        Ok(result)
    }

    /// Another round for a case that lost offers, bounded by the retry budget.
    pub fn redistribute(
        &self,
        case_id: &CaseId,
    ) -> Result<RedistributionOutcome, DistributionError> {
        let _serialized = self.case_lock(case_id);

        let case = self.load_case(case_id)?;
        let settings = self.settings.current();

        if case.redistribution_count >= settings.max_redistributions_per_case {
            info!(case_id = %case.id, count = case.redistribution_count, "redistribution budget spent");
            return Ok(RedistributionOutcome::skipped(&case, SkipReason::LimitReached));
        }

        let history = CaseOffers::from_offers(&self.offers.offers_for_case(&case.id)?);
        if history.has_match() {
            return Ok(RedistributionOutcome::skipped(&case, SkipReason::AlreadyMatched));
        }
        if history.active_count() >= settings.max_offers_per_case {
            return Ok(RedistributionOutcome::skipped(&case, SkipReason::SlotsFull));
        }
        ensure_open(&case)?;

        let count = self.cases.increment_redistribution(&case.id)?;
        let result = self.fill_slots(&case, &settings)?;
        info!(
            case_id = %case.id,
            redistribution = count,
            offers_created = result.offers_created,
            "case redistributed"
        );
        Ok(RedistributionOutcome::ran(result, count))
    }

    fn fill_slots(
        &self,
        case: &Case,
        settings: &DistributionSettings,
    ) -> Result<DistributionResult, DistributionError> {
        let mut result = DistributionResult::empty(&case.id);

        let history = CaseOffers::from_offers(&self.offers.offers_for_case(&case.id)?);
        let open_slots = settings
            .max_offers_per_case
            .saturating_sub(history.active_count());
        if open_slots == 0 {
            debug!(case_id = %case.id, "no open offer slots");
            return Ok(result);
        }

        let mut ranked: Vec<(Candidate, u8)> = self
            .filter
            .eligible(case)?
            .into_iter()
            .map(|candidate| {
                let score = self.scorer.score(case, &candidate.lawyer);
                (candidate, score)
            })
            .filter(|(candidate, score)| {
                let keep = *score >= settings.min_acceptable_score;
                if !keep {
                    debug!(case_id = %case.id, lawyer_id = %candidate.lawyer.id, score, "below minimum score");
                }
                keep
            })
            .collect();
        ranked.sort_by(|left, right| right.1.cmp(&left.1));
        ranked.truncate(open_slots);

        let now = self.clock.now();
        let expires_at = settings.offer_expiry_from(now);

        for (candidate, score) in ranked {
            let offer = Offer {
                id: next_offer_id(),
                case_id: case.id.clone(),
                lawyer_id: candidate.lawyer.id.clone(),
                score,
                distance_km: candidate.distance_km,
                status: OfferStatus::Pending,
                created_at: now,
                expires_at,
            };

            match self.place_offer(offer) {
                Ok(Some(offer)) => {
                    result.lawyer_ids.push(offer.lawyer_id);
                    result.offer_ids.push(offer.id);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        case_id = %case.id,
                        lawyer_id = %candidate.lawyer.id,
                        %error,
                        "skipping lawyer after offer failure"
                    );
                }
            }
        }

        result.offers_created = result.offer_ids.len();
        Ok(result)
    }

    /// Insert then charge quota. `Ok(None)` means the pair was already offered.
    fn place_offer(&self, offer: Offer) -> Result<Option<Offer>, QuotaError> {
        let already_offered = self
            .offers
            .offers_for_case(&offer.case_id)?
            .iter()
            .any(|existing| existing.lawyer_id == offer.lawyer_id && existing.status.is_active());
        if already_offered {
            debug!(case_id = %offer.case_id, lawyer_id = %offer.lawyer_id, "pair already offered");
            return Ok(None);
        }

        let (case_id, lawyer_id) = (offer.case_id.clone(), offer.lawyer_id.clone());
        let offer = match self.offers.insert_offer(offer) {
            Ok(offer) => offer,
            Err(RepositoryError::Conflict) => {
                debug!(%case_id, %lawyer_id, "pair offered concurrently");
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        };

        if let Err(error) = self.quota.increment(&offer.lawyer_id) {
            if let Err(withdraw_error) = self.offers.withdraw_offer(&offer.id) {
                warn!(offer_id = %offer.id, %withdraw_error, "failed to withdraw uncharged offer");
            }
            return Err(error);
        }

        Ok(Some(offer))
    }

    fn load_case(&self, case_id: &CaseId) -> Result<Case, DistributionError> {
        self.cases
            .fetch_case(case_id)?
            .ok_or_else(|| DistributionError::CaseNotFound(case_id.clone()))
    }

    /// Serialises work on one case. Unrelated cases may share a stripe.
    /// Poisoning is ignored; the mutex guards no data.
    pub(crate) fn case_lock(&self, case_id: &CaseId) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        case_id.hash(&mut hasher);
        let stripe = (hasher.finish() % self.case_locks.len() as u64) as usize;
        self.case_locks[stripe]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn lock_stripes(&self) -> usize {
        self.case_locks.len()
    }
}

fn ensure_open(case: &Case) -> Result<(), DistributionError> {
    if case.status == CaseStatus::Open {
        Ok(())
    } else {
        Err(DistributionError::InvalidState {
            case_id: case.id.clone(),
            status: case.status,
        })
    }
}
