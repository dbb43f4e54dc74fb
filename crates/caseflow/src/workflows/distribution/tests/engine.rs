use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, Utc};

use super::common::*;
use crate::workflows::distribution::domain::{
    Case, CaseId, CaseStatus, Lawyer, LawyerId, Offer, OfferId, OfferStatus, PlanTier,
};
use crate::workflows::distribution::engine::{
    DistributionEngine, DistributionError, SkipReason, CASE_LOCK_STRIPES,
};
use crate::workflows::distribution::memory::InMemoryMarketplace;
use crate::workflows::distribution::repository::{
    CaseRepository, LawyerRepository, OfferRepository, RepositoryError,
};

fn ids(values: &[LawyerId]) -> Vec<&str> {
    values.iter().map(|id| id.0.as_str()).collect()
}

#[test]
fn open_case_gets_offers_for_every_qualified_lawyer() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    h.add_lawyer(rio_lawyer("lw-1", PlanTier::Premium));
    h.add_lawyer(rio_lawyer("lw-2", PlanTier::Premium));
    h.add_lawyer(niteroi_lawyer("lw-3", PlanTier::Premium));

    let result = h.service.distribute(&case_id).expect("distribution runs");

    assert_eq!(result.offers_created, 3);
    assert_eq!(ids(&result.lawyer_ids), vec!["lw-1", "lw-2", "lw-3"]);
    for offer in h.offers(&case_id) {
        assert_eq!(offer.status, OfferStatus::Pending);
        assert!(offer.score >= 85, "score {}", offer.score);
        assert_eq!(offer.created_at, t0());
        assert_eq!(offer.expires_at, t0() + Duration::hours(48));
    }
    assert_eq!(h.offer_for(&case_id, &LawyerId("lw-1".into())).distance_km, Some(0.0));
}

#[test]
fn offers_charge_each_lawyer_quota_once() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    let lawyer_id = h.add_lawyer(rio_lawyer("lw-1", PlanTier::Basic));

    h.service.distribute(&case_id).expect("distribution runs");

    let quota = h.lawyer(&lawyer_id).quota;
    assert_eq!(quota.received_this_month, 1);
    assert_eq!(quota.received_this_hour, 1);
}

#[test]
fn highest_scores_win_the_limited_slots_with_stable_ties() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    for id in ["free-1", "free-2", "free-3"] {
        h.add_lawyer(rio_lawyer(id, PlanTier::Free));
    }
    for id in ["prem-1", "prem-2", "prem-3", "prem-4"] {
        h.add_lawyer(rio_lawyer(id, PlanTier::Premium));
    }

    let result = h.service.distribute(&case_id).expect("distribution runs");

    assert_eq!(
        ids(&result.lawyer_ids),
        vec!["prem-1", "prem-2", "prem-3", "prem-4", "free-1"]
    );
    assert_eq!(h.active_offers(&case_id).len(), 5);
}

#[test]
fn repeat_distribution_only_fills_free_slots() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    for n in 1..=7 {
        h.add_lawyer(rio_lawyer(&format!("lw-{n}"), PlanTier::Premium));
    }

    assert_eq!(h.service.distribute(&case_id).expect("first").offers_created, 5);
    assert_eq!(h.service.distribute(&case_id).expect("second").offers_created, 0);
    assert_eq!(h.active_offers(&case_id).len(), 5);
}

#[test]
fn existing_active_offers_reduce_open_slots() {
    let h = Harness::with_settings(vec![("maxOffersPerCase", "2")]);
    let case_id = h.add_case(rio_case("case-1"));
    h.add_lawyer(rio_lawyer("lw-1", PlanTier::Premium));
    h.add_lawyer(rio_lawyer("lw-2", PlanTier::Premium));
    h.add_lawyer(rio_lawyer("lw-3", PlanTier::Premium));
    h.store
        .insert_offer(pending_offer("o-1", "case-1", "lw-1"))
        .expect("offer stored");

    let result = h.service.distribute(&case_id).expect("distribution runs");
    assert_eq!(ids(&result.lawyer_ids), vec!["lw-2"]);
}

#[test]
fn minimum_score_and_expiry_window_come_from_settings() {
    let h = Harness::with_settings(vec![
        ("minAcceptableScore", "90"),
        ("offerExpirationHours", "24"),
    ]);
    let case_id = h.add_case(rio_case("case-1"));
    h.add_lawyer(niteroi_lawyer("lw-85", PlanTier::Premium));
    h.add_lawyer(rio_lawyer("lw-95", PlanTier::Premium));

    let result = h.service.distribute(&case_id).expect("distribution runs");

    assert_eq!(ids(&result.lawyer_ids), vec!["lw-95"]);
    let offer = h.offer_for(&case_id, &LawyerId("lw-95".into()));
    assert_eq!(offer.expires_at, t0() + Duration::hours(24));
}

#[test]
fn absurd_expiry_setting_falls_back_to_the_default_window() {
    let h = Harness::with_settings(vec![("offerExpirationHours", "100000000000")]);
    let case_id = h.add_case(rio_case("case-1"));
    let lawyer_id = h.add_lawyer(rio_lawyer("lw-1", PlanTier::Premium));

    h.service.distribute(&case_id).expect("distribution runs");

    let offer = h.offer_for(&case_id, &lawyer_id);
    assert_eq!(offer.expires_at, t0() + Duration::hours(48));
}

#[test]
fn offers_do_not_collide_with_ids_already_in_the_store() {
    let h = Harness::new();
    for n in 1..=50 {
        let mut old = pending_offer(&format!("offer-{n:06}"), "case-old", &format!("lw-old-{n}"));
        old.status = OfferStatus::Expired;
        h.store.insert_offer(old).expect("historic offer stored");
    }
    let case_id = h.add_case(rio_case("case-1"));
    for n in 1..=3 {
        h.add_lawyer(rio_lawyer(&format!("lw-{n}"), PlanTier::Premium));
    }

    let result = h.service.distribute(&case_id).expect("distribution runs");

    assert_eq!(result.offers_created, 3);
    assert_eq!(ids(&result.lawyer_ids), vec!["lw-1", "lw-2", "lw-3"]);
    assert_eq!(h.active_offers(&case_id).len(), 3);
}

#[test]
fn duplicate_offer_id_is_not_mistaken_for_a_taken_pair() {
    let h = Harness::new();
    h.store
        .insert_offer(pending_offer("o-1", "case-1", "lw-1"))
        .expect("offer stored");

    let error = h
        .store
        .insert_offer(pending_offer("o-1", "case-2", "lw-2"))
        .expect_err("id already taken");
    assert!(matches!(error, RepositoryError::DuplicateId(id) if id == "o-1"));

    let error = h
        .store
        .insert_offer(pending_offer("o-2", "case-1", "lw-1"))
        .expect_err("pair already offered");
    assert!(matches!(error, RepositoryError::Conflict));
}

#[test]
fn weak_matches_stay_below_the_default_threshold() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    let mut lawyer = rio_lawyer("lw-family", PlanTier::Free);
    lawyer.specialties = BTreeSet::from([family_law()]);
    h.add_lawyer(lawyer);

    let result = h.service.distribute(&case_id).expect("distribution runs");
    assert_eq!(result.offers_created, 0);
    assert!(h.offers(&case_id).is_empty());
}

#[test]
fn exhausted_lawyers_are_skipped() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    let mut full = rio_lawyer("lw-full", PlanTier::Premium);
    full.quota.limit_this_month = 5;
    full.quota.received_this_month = 5;
    h.add_lawyer(full);
    h.add_lawyer(rio_lawyer("lw-ok", PlanTier::Basic));

    let result = h.service.distribute(&case_id).expect("distribution runs");
    assert_eq!(ids(&result.lawyer_ids), vec!["lw-ok"]);
}

#[test]
fn empty_pool_is_not_an_error() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    h.add_lawyer(sao_paulo_lawyer("lw-sp", PlanTier::Premium));

    let result = h.service.distribute(&case_id).expect("distribution runs");
    assert_eq!(result.offers_created, 0);
}

#[test]
fn distribution_requires_an_existing_open_case() {
    let h = Harness::new();
    assert!(matches!(
        h.service.distribute(&CaseId("missing".into())),
        Err(DistributionError::CaseNotFound(_))
    ));

    let mut closed = rio_case("case-closed");
    closed.status = CaseStatus::Closed;
    let case_id = h.add_case(closed);
    h.add_lawyer(rio_lawyer("lw-1", PlanTier::Premium));

    let error = h.service.distribute(&case_id).expect_err("closed case");
    assert!(matches!(
        error,
        DistributionError::InvalidState {
            status: CaseStatus::Closed,
            ..
        }
    ));
    assert!(h.offers(&case_id).is_empty());
}

#[test]
fn redistribution_budget_is_never_exceeded() {
    let h = Harness::new();
    let mut case = rio_case("case-1");
    case.redistribution_count = 3;
    let case_id = h.add_case(case);
    h.add_lawyer(rio_lawyer("lw-1", PlanTier::Premium));

    let outcome = h.service.redistribute(&case_id).expect("redistribution runs");

    assert_eq!(outcome.reason, Some(SkipReason::LimitReached));
    assert_eq!(outcome.redistribution_count, 3);
    assert_eq!(h.case(&case_id).redistribution_count, 3);
    assert!(h.offers(&case_id).is_empty());
}

#[test]
fn matched_case_is_not_redistributed() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    h.add_lawyer(rio_lawyer("lw-2", PlanTier::Premium));
    let mut accepted = pending_offer("o-1", "case-1", "lw-1");
    accepted.status = OfferStatus::Accepted;
    h.store.insert_offer(accepted).expect("offer stored");

    let outcome = h.service.redistribute(&case_id).expect("redistribution runs");
    assert_eq!(outcome.reason, Some(SkipReason::AlreadyMatched));
    assert_eq!(h.case(&case_id).redistribution_count, 0);
}

#[test]
fn full_slots_skip_redistribution() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    for n in 1..=5 {
        h.store
            .insert_offer(pending_offer(&format!("o-{n}"), "case-1", &format!("lw-{n}")))
            .expect("offer stored");
    }

    let outcome = h.service.redistribute(&case_id).expect("redistribution runs");
    assert!(outcome.is_skipped());
    assert_eq!(outcome.reason, Some(SkipReason::SlotsFull));
    assert_eq!(h.case(&case_id).redistribution_count, 0);
}

#[test]
fn redistribution_counts_the_round_and_fills_gaps() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    h.add_lawyer(rio_lawyer("lw-1", PlanTier::Premium));
    h.add_lawyer(rio_lawyer("lw-2", PlanTier::Premium));
    h.store
        .insert_offer(pending_offer("o-1", "case-1", "lw-1"))
        .expect("offer stored");

    let outcome = h.service.redistribute(&case_id).expect("redistribution runs");

    assert_eq!(outcome.reason, None);
    assert_eq!(outcome.redistribution_count, 1);
    assert_eq!(ids(&outcome.lawyer_ids), vec!["lw-2"]);
    assert_eq!(h.case(&case_id).redistribution_count, 1);
}

#[test]
fn redistribution_of_closed_case_without_offers_is_rejected() {
    let h = Harness::new();
    let mut case = rio_case("case-1");
    case.status = CaseStatus::Cancelled;
    let case_id = h.add_case(case);

    assert!(matches!(
        h.service.redistribute(&case_id),
        Err(DistributionError::InvalidState { .. })
    ));
    assert!(matches!(
        h.service.redistribute(&CaseId("missing".into())),
        Err(DistributionError::CaseNotFound(_))
    ));
}

#[test]
fn concurrent_rounds_on_one_case_respect_the_cap() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    for n in 1..=10 {
        h.add_lawyer(rio_lawyer(&format!("lw-{n:02}"), PlanTier::Premium));
    }

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                h.service.distribute(&case_id).expect("distribution runs");
            });
        }
    });

    let active = h.active_offers(&case_id);
    assert_eq!(active.len(), 5);
    let distinct: BTreeSet<_> = active.iter().map(|offer| offer.lawyer_id.clone()).collect();
    assert_eq!(distinct.len(), 5);

    let charged: u32 = (1..=10)
        .map(|n| h.lawyer(&LawyerId(format!("lw-{n:02}"))).quota.received_this_month)
        .sum();
    assert_eq!(charged, 5);
}

/// Offer store whose per-case reads lag behind writes.
struct StaleReads(Arc<InMemoryMarketplace>);

impl OfferRepository for StaleReads {
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError> {
        self.0.insert_offer(offer)
    }

    fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        self.0.fetch_offer(id)
    }

    fn offers_for_case(&self, _case_id: &CaseId) -> Result<Vec<Offer>, RepositoryError> {
        Ok(Vec::new())
    }

    fn transition_offer(
        &self,
        id: &OfferId,
        from: OfferStatus,
        to: OfferStatus,
    ) -> Result<Offer, RepositoryError> {
        self.0.transition_offer(id, from, to)
    }

    fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Offer>, RepositoryError> {
        self.0.expire_overdue(now)
    }

    fn withdraw_offer(&self, id: &OfferId) -> Result<(), RepositoryError> {
        self.0.withdraw_offer(id)
    }
}

#[test]
fn store_uniqueness_stops_duplicate_pairs_missed_by_stale_reads() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    let lawyer_id = h.add_lawyer(rio_lawyer("lw-1", PlanTier::Premium));
    h.store
        .insert_offer(pending_offer("o-1", "case-1", "lw-1"))
        .expect("offer stored");

    let engine = DistributionEngine::new(
        h.store.clone(),
        h.store.clone(),
        Arc::new(StaleReads(h.store.clone())),
        h.settings.clone(),
        h.clock.clone(),
    );
    let result = engine.distribute(&case_id).expect("distribution runs");

    assert_eq!(result.offers_created, 0);
    assert_eq!(h.offers(&case_id).len(), 1);
    assert_eq!(h.lawyer(&lawyer_id).quota.received_this_month, 0);
}

/// Lawyer store where capacity vanishes between the read and the write.
struct DrainedOnWrite(Arc<InMemoryMarketplace>);

impl LawyerRepository for DrainedOnWrite {
    fn fetch_lawyer(&self, id: &LawyerId) -> Result<Option<Lawyer>, RepositoryError> {
        self.0.fetch_lawyer(id)
    }

    fn active_lawyers(&self) -> Result<Vec<Lawyer>, RepositoryError> {
        self.0.active_lawyers()
    }

    fn all_lawyer_ids(&self) -> Result<Vec<LawyerId>, RepositoryError> {
        self.0.all_lawyer_ids()
    }

    fn update_if(
        &self,
        _id: &LawyerId,
        _change: &mut dyn FnMut(&mut Lawyer) -> bool,
    ) -> Result<Option<Lawyer>, RepositoryError> {
        Ok(None)
    }
}

#[test]
fn offer_is_withdrawn_when_quota_cannot_be_charged() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    h.add_lawyer(rio_lawyer("lw-1", PlanTier::Premium));

    let engine = DistributionEngine::new(
        h.store.clone(),
        Arc::new(DrainedOnWrite(h.store.clone())),
        h.store.clone(),
        h.settings.clone(),
        h.clock.clone(),
    );
    let result = engine.distribute(&case_id).expect("distribution runs");

    assert_eq!(result.offers_created, 0);
    assert!(h.offers(&case_id).is_empty());
}

/// Case store whose first read panics.
struct CrashesOnce {
    inner: Arc<InMemoryMarketplace>,
    crashed: AtomicBool,
}

impl CaseRepository for CrashesOnce {
    fn fetch_case(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        if !self.crashed.swap(true, Ordering::SeqCst) {
            panic!("storage driver crashed");
        }
        self.inner.fetch_case(id)
    }

    fn set_case_status(&self, id: &CaseId, status: CaseStatus) -> Result<(), RepositoryError> {
        self.inner.set_case_status(id, status)
    }

    fn increment_redistribution(&self, id: &CaseId) -> Result<u32, RepositoryError> {
        self.inner.increment_redistribution(id)
    }
}

#[test]
fn panic_inside_a_round_does_not_lock_the_case_out() {
    let h = Harness::new();
    let case_id = h.add_case(rio_case("case-1"));
    h.add_lawyer(rio_lawyer("lw-1", PlanTier::Premium));

    let engine = DistributionEngine::new(
        Arc::new(CrashesOnce {
            inner: h.store.clone(),
            crashed: AtomicBool::new(false),
        }),
        h.store.clone(),
        h.store.clone(),
        h.settings.clone(),
        h.clock.clone(),
    );

    let crashed = panic::catch_unwind(AssertUnwindSafe(|| engine.distribute(&case_id)));
    assert!(crashed.is_err());

    let result = engine.distribute(&case_id).expect("case usable after a crash");
    assert_eq!(ids(&result.lawyer_ids), vec!["lw-1"]);
    let outcome = engine.redistribute(&case_id).expect("redistribution runs");
    assert_eq!(outcome.reason, None);
    assert_eq!(outcome.redistribution_count, 1);
}

#[test]
fn lock_table_stays_fixed_however_many_cases_are_seen() {
    let h = Harness::new();
    for n in 0..500 {
        let _ = h.service.distribute(&CaseId(format!("case-{n}")));
    }
    assert_eq!(h.service.engine().lock_stripes(), CASE_LOCK_STRIPES);
}
