use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::distribution::domain::{
    Case, CaseId, CaseStatus, CitizenLocation, Coordinates, Lawyer, LawyerId, LeadQuota, Offer,
    OfferId, OfferStatus, PlanTier, ServiceArea, SpecialtyId, Urgency,
};
use crate::workflows::distribution::memory::InMemoryMarketplace;
use crate::workflows::distribution::repository::{
    CaseRepository, Clock, LawyerRepository, OfferRepository, RepositoryError,
};
use crate::workflows::distribution::settings::{
    PlanLimits, SettingsProvider, StaticSettingsSource,
};
use crate::workflows::distribution::DistributionService;

pub(super) const RIO_CENTRO: Coordinates = Coordinates {
    lat: -22.9068,
    lon: -43.1729,
};
pub(super) const NITEROI: Coordinates = Coordinates {
    lat: -22.8832,
    lon: -43.1034,
};
pub(super) const SAO_PAULO: Coordinates = Coordinates {
    lat: -23.5505,
    lon: -46.6333,
};

pub(super) fn consumer_law() -> SpecialtyId {
    SpecialtyId("consumer-law".to_string())
}

pub(super) fn family_law() -> SpecialtyId {
    SpecialtyId("family-law".to_string())
}

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Clock the tests move by hand.
pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard = *guard + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(super) fn rio_case(id: &str) -> Case {
    Case {
        id: CaseId(id.to_string()),
        location: CitizenLocation {
            coordinates: Some(RIO_CENTRO),
            city: "Rio de Janeiro".to_string(),
            state: "RJ".to_string(),
        },
        specialty_id: Some(consumer_law()),
        urgency: Urgency::High,
        status: CaseStatus::Open,
        redistribution_count: 0,
    }
}

pub(super) fn rio_lawyer(id: &str, plan: PlanTier) -> Lawyer {
    let limit = PlanLimits::default().monthly_for(plan);
    Lawyer {
        id: LawyerId(id.to_string()),
        active: true,
        onboarding_complete: true,
        approved: true,
        specialties: BTreeSet::from([consumer_law()]),
        service_area: ServiceArea {
            coordinates: Some(RIO_CENTRO),
            city: "Rio de Janeiro".to_string(),
            state: "RJ".to_string(),
            service_radius_km: 50.0,
            accepts_other_states: false,
        },
        plan,
        quota: LeadQuota::fresh(limit, t0()),
    }
}

pub(super) fn niteroi_lawyer(id: &str, plan: PlanTier) -> Lawyer {
    let mut lawyer = rio_lawyer(id, plan);
    lawyer.service_area.coordinates = Some(NITEROI);
    lawyer.service_area.city = "Niteroi".to_string();
    lawyer
}

pub(super) fn sao_paulo_lawyer(id: &str, plan: PlanTier) -> Lawyer {
    let mut lawyer = rio_lawyer(id, plan);
    lawyer.service_area = ServiceArea {
        coordinates: Some(SAO_PAULO),
        city: "Sao Paulo".to_string(),
        state: "SP".to_string(),
        service_radius_km: 80.0,
        accepts_other_states: true,
    };
    lawyer
}

pub(super) fn pending_offer(id: &str, case_id: &str, lawyer_id: &str) -> Offer {
    Offer {
        id: OfferId(id.to_string()),
        case_id: CaseId(case_id.to_string()),
        lawyer_id: LawyerId(lawyer_id.to_string()),
        score: 90,
        distance_km: Some(0.0),
        status: OfferStatus::Pending,
        created_at: t0(),
        expires_at: t0() + Duration::hours(48),
    }
}

pub(super) type MemoryService =
    DistributionService<InMemoryMarketplace, InMemoryMarketplace, InMemoryMarketplace>;

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryMarketplace>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) settings_source: StaticSettingsSource,
    pub(super) settings: Arc<SettingsProvider>,
    pub(super) service: MemoryService,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with_settings(Vec::<(&str, &str)>::new())
    }

    pub(super) fn with_settings(values: Vec<(&str, &str)>) -> Self {
        let store = Arc::new(InMemoryMarketplace::new());
        let clock = Arc::new(ManualClock::at(t0()));
        let settings_source = StaticSettingsSource::with_values(values);
        let settings = Arc::new(SettingsProvider::new(
            Arc::new(settings_source.clone()),
            StdDuration::ZERO,
        ));
        let service = DistributionService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            settings.clone(),
            clock.clone(),
        );

        Self {
            store,
            clock,
            settings_source,
            settings,
            service,
        }
    }

    pub(super) fn add_case(&self, case: Case) -> CaseId {
        let id = case.id.clone();
        self.store.put_case(case).expect("case stored");
        id
    }

    pub(super) fn add_lawyer(&self, lawyer: Lawyer) -> LawyerId {
        let id = lawyer.id.clone();
        self.store.put_lawyer(lawyer).expect("lawyer stored");
        id
    }

    pub(super) fn case(&self, id: &CaseId) -> Case {
        self.store
            .fetch_case(id)
            .expect("fetch succeeds")
            .expect("case present")
    }

    pub(super) fn lawyer(&self, id: &LawyerId) -> Lawyer {
        self.store
            .fetch_lawyer(id)
            .expect("fetch succeeds")
            .expect("lawyer present")
    }

    pub(super) fn offers(&self, case_id: &CaseId) -> Vec<Offer> {
        self.store.offers_for_case(case_id).expect("offers load")
    }

    pub(super) fn active_offers(&self, case_id: &CaseId) -> Vec<Offer> {
        self.offers(case_id)
            .into_iter()
            .filter(|offer| offer.status.is_active())
            .collect()
    }

    pub(super) fn offer_for(&self, case_id: &CaseId, lawyer_id: &LawyerId) -> Offer {
        self.offers(case_id)
            .into_iter()
            .rev()
            .find(|offer| &offer.lawyer_id == lawyer_id)
            .expect("offer present for lawyer")
    }
}

/// Storage that is always down.
pub(super) struct UnavailableStore;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

impl CaseRepository for UnavailableStore {
    fn fetch_case(&self, _id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        Err(offline())
    }

    fn set_case_status(&self, _id: &CaseId, _status: CaseStatus) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn increment_redistribution(&self, _id: &CaseId) -> Result<u32, RepositoryError> {
        Err(offline())
    }
}

impl LawyerRepository for UnavailableStore {
    fn fetch_lawyer(&self, _id: &LawyerId) -> Result<Option<Lawyer>, RepositoryError> {
        Err(offline())
    }

    fn active_lawyers(&self) -> Result<Vec<Lawyer>, RepositoryError> {
        Err(offline())
    }

    fn all_lawyer_ids(&self) -> Result<Vec<LawyerId>, RepositoryError> {
        Err(offline())
    }

    fn update_if(
        &self,
        _id: &LawyerId,
        _change: &mut dyn FnMut(&mut Lawyer) -> bool,
    ) -> Result<Option<Lawyer>, RepositoryError> {
        Err(offline())
    }
}

impl OfferRepository for UnavailableStore {
    fn insert_offer(&self, _offer: Offer) -> Result<Offer, RepositoryError> {
        Err(offline())
    }

    fn fetch_offer(&self, _id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        Err(offline())
    }

    fn offers_for_case(&self, _case_id: &CaseId) -> Result<Vec<Offer>, RepositoryError> {
        Err(offline())
    }

    fn transition_offer(
        &self,
        _id: &OfferId,
        _from: OfferStatus,
        _to: OfferStatus,
    ) -> Result<Offer, RepositoryError> {
        Err(offline())
    }

    fn expire_overdue(&self, _now: DateTime<Utc>) -> Result<Vec<Offer>, RepositoryError> {
        Err(offline())
    }

    fn withdraw_offer(&self, _id: &OfferId) -> Result<(), RepositoryError> {
        Err(offline())
    }
}

pub(super) fn unavailable_service(
) -> DistributionService<UnavailableStore, UnavailableStore, UnavailableStore> {
    let store = Arc::new(UnavailableStore);
    DistributionService::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(SettingsProvider::defaults()),
        Arc::new(ManualClock::at(t0())),
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
