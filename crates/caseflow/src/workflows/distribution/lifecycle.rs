use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{CaseId, OfferId};
use super::engine::{DistributionEngine, RedistributionOutcome};
use super::repository::{
    CaseRepository, Clock, LawyerRepository, OfferRepository, RepositoryError,
};
use super::settings::SettingsProvider;

/// A case whose redistribution failed during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub case_id: CaseId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub expired_count: usize,
    pub expired_offer_ids: Vec<OfferId>,
    pub redistributions: Vec<RedistributionOutcome>,
    pub failures: Vec<SweepFailure>,
}

/// Time-driven side of the offer state machine.
pub struct OfferLifecycleManager<C, L, O> {
    offers: Arc<O>,
    engine: Arc<DistributionEngine<C, L, O>>,
    settings: Arc<SettingsProvider>,
    clock: Arc<dyn Clock>,
}

impl<C, L, O> OfferLifecycleManager<C, L, O>
where
    C: CaseRepository + 'static,
    L: LawyerRepository + 'static,
    O: OfferRepository + 'static,
{
    pub fn new(
        offers: Arc<O>,
        engine: Arc<DistributionEngine<C, L, O>>,
        settings: Arc<SettingsProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            offers,
            engine,
            settings,
            clock,
        }
    }

    /// Expire overdue offers, then give every affected case another round.
    ///
    /// A failed redistribution is recorded and the sweep moves on.
    pub fn sweep(&self) -> Result<SweepReport, RepositoryError> {
        if !self.settings.current().auto_expire_matches {
            debug!("automatic offer expiry disabled");
            return Ok(SweepReport::default());
        }

        let expired = self.offers.expire_overdue(self.clock.now())?;
        let affected: BTreeSet<CaseId> = expired.iter().map(|offer| offer.case_id.clone()).collect();

        let mut report = SweepReport {
            expired_count: expired.len(),
            expired_offer_ids: expired.into_iter().map(|offer| offer.id).collect(),
            ..SweepReport::default()
        };

        for case_id in affected {
            match self.engine.redistribute(&case_id) {
                Ok(outcome) => report.redistributions.push(outcome),
                Err(error) => {
                    warn!(%case_id, %error, "redistribution after expiry failed");
                    report.failures.push(SweepFailure {
                        case_id,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            expired = report.expired_count,
            redistributed = report.redistributions.len(),
            failed = report.failures.len(),
            "offer sweep finished"
        );
        Ok(report)
    }
}
