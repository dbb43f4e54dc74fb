use caseflow::error::AppError;
use caseflow::workflows::distribution::{
    Case, Clock, DistributionService, InMemoryMarketplace, Lawyer,
    LawyerRepository, Offer, OfferRepository, RepositoryError, SettingsProvider,
};
use chrono::{DateTime, Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

pub(crate) type MarketplaceService =
    DistributionService<InMemoryMarketplace, InMemoryMarketplace, InMemoryMarketplace>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Service wired over one shared in-memory store.
pub(crate) fn marketplace_service(
    store: Arc<InMemoryMarketplace>,
    settings: Arc<SettingsProvider>,
    clock: Arc<dyn Clock>,
) -> MarketplaceService {
    DistributionService::new(store.clone(), store.clone(), store, settings, clock)
}

/// JSON dump of a marketplace, used to seed the server and for one-shot sweeps.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct MarketplaceSnapshot {
    #[serde(default)]
    pub(crate) cases: Vec<Case>,
    #[serde(default)]
    pub(crate) lawyers: Vec<Lawyer>,
    #[serde(default)]
    pub(crate) offers: Vec<Offer>,
}

impl MarketplaceSnapshot {
    pub(crate) fn read(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub(crate) fn write(&self, path: &Path) -> Result<(), AppError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub(crate) fn load_into(self, store: &InMemoryMarketplace) -> Result<(), RepositoryError> {
        for case in self.cases {
            store.put_case(case)?;
        }
        for lawyer in self.lawyers {
            store.put_lawyer(lawyer)?;
        }
        for offer in self.offers {
            store.insert_offer(offer)?;
        }
        Ok(())
    }

    pub(crate) fn capture(store: &InMemoryMarketplace) -> Result<Self, RepositoryError> {
        let mut lawyers = Vec::new();
        for lawyer_id in store.all_lawyer_ids()? {
            if let Some(lawyer) = store.fetch_lawyer(&lawyer_id)? {
                lawyers.push(lawyer);
            }
        }

        Ok(Self {
            cases: store.all_cases()?,
            lawyers,
            offers: store.all_offers()?,
        })
    }
}

/// Clock pinned to an instant; the demo and one-shot sweeps move it explicitly.
pub(crate) struct PinnedClock {
    now: Mutex<DateTime<Utc>>,
}

impl PinnedClock {
    pub(crate) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = *guard + by;
        }
    }
}

impl Clock for PinnedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}
