use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::domain::{is_unlimited_limit, Lawyer, LawyerId, LeadQuota, PlanTier};
use super::repository::{Clock, LawyerRepository, RepositoryError};
use super::settings::{PlanLimits, SettingsProvider};

const MONTHLY_WINDOW_DAYS: i64 = 30;
const HOURLY_WINDOW_HOURS: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("lawyer {lawyer_id} has no intake capacity left")]
    Exhausted { lawyer_id: LawyerId },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Which windows were rolled over by [`apply_due_resets`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    pub monthly: bool,
    pub hourly: bool,
}

impl ResetOutcome {
    pub fn any(self) -> bool {
        self.monthly || self.hourly
    }
}

/// Roll elapsed windows forward. Calling it again in the same window is a no-op.
pub fn apply_due_resets(
    quota: &mut LeadQuota,
    plan: PlanTier,
    limits: &PlanLimits,
    now: DateTime<Utc>,
) -> ResetOutcome {
    let mut outcome = ResetOutcome::default();

    if now - quota.last_monthly_reset >= Duration::days(MONTHLY_WINDOW_DAYS) {
        quota.received_this_month = 0;
        quota.limit_this_month = limits.monthly_for(plan);
        quota.last_monthly_reset = now;
        outcome.monthly = true;
    }

    if now - quota.last_hourly_reset >= Duration::hours(HOURLY_WINDOW_HOURS) {
        quota.received_this_hour = 0;
        quota.last_hourly_reset = now;
        outcome.hourly = true;
    }

    outcome
}

/// Capacity check on already-refreshed counters.
pub fn has_capacity(quota: &LeadQuota, hourly_cap: u32) -> bool {
    if quota.is_unlimited() {
        return true;
    }

    let monthly_limit = u32::try_from(quota.limit_this_month).unwrap_or(0);
    quota.received_this_month < monthly_limit && quota.received_this_hour < hourly_cap
}

/// Snapshot of a lawyer's effective intake counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub lawyer_id: LawyerId,
    pub plan: &'static str,
    pub unlimited: bool,
    pub received_this_month: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_this_month: Option<u32>,
    pub received_this_hour: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_limit: Option<u32>,
    pub can_receive: bool,
}

/// Monthly/hourly intake accounting with lazy window resets.
pub struct QuotaTracker<L> {
    lawyers: Arc<L>,
    settings: Arc<SettingsProvider>,
    clock: Arc<dyn Clock>,
}

impl<L> QuotaTracker<L>
where
    L: LawyerRepository + 'static,
{
    pub fn new(lawyers: Arc<L>, settings: Arc<SettingsProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            lawyers,
            settings,
            clock,
        }
    }

    /// Counters as they stand right now, with any due resets applied in memory.
    pub fn effective_quota(&self, lawyer: &Lawyer) -> LeadQuota {
        let limits = self.settings.current().plan_limits;
        let mut quota = lawyer.quota.clone();
        apply_due_resets(&mut quota, lawyer.plan, &limits, self.clock.now());
        quota
    }

    pub fn can_receive(&self, lawyer: &Lawyer) -> bool {
        let hourly_cap = self.settings.current().plan_limits.hourly_for(lawyer.plan);
        has_capacity(&self.effective_quota(lawyer), hourly_cap)
    }

    pub fn status(&self, lawyer: &Lawyer) -> QuotaStatus {
        let hourly_cap = self.settings.current().plan_limits.hourly_for(lawyer.plan);
        let quota = self.effective_quota(lawyer);
        let unlimited = is_unlimited_limit(quota.limit_this_month);
        let monthly_limit = (!unlimited).then(|| u32::try_from(quota.limit_this_month).unwrap_or(0));

        QuotaStatus {
            lawyer_id: lawyer.id.clone(),
            plan: lawyer.plan.label(),
            unlimited,
            received_this_month: quota.received_this_month,
            monthly_limit,
            remaining_this_month: monthly_limit
                .map(|limit| limit.saturating_sub(quota.received_this_month)),
            received_this_hour: quota.received_this_hour,
            hourly_limit: (!unlimited).then_some(hourly_cap),
            can_receive: has_capacity(&quota, hourly_cap),
        }
    }

    /// Persist any due window resets. Returns whether anything changed.
    pub fn reset_if_due(&self, lawyer_id: &LawyerId) -> Result<bool, QuotaError> {
        let limits = self.settings.current().plan_limits;
        let now = self.clock.now();

        let updated = self.lawyers.update_if(lawyer_id, &mut |lawyer: &mut Lawyer| {
            apply_due_resets(&mut lawyer.quota, lawyer.plan, &limits, now).any()
        })?;

        if updated.is_some() {
            debug!(%lawyer_id, "lead counters reset");
        }
        Ok(updated.is_some())
    }

    /// Charge one lead against both windows, refusing if that would break a cap.
    pub fn increment(&self, lawyer_id: &LawyerId) -> Result<Lawyer, QuotaError> {
        let limits = self.settings.current().plan_limits;
        let now = self.clock.now();

        let updated = self.lawyers.update_if(lawyer_id, &mut |lawyer: &mut Lawyer| {
            apply_due_resets(&mut lawyer.quota, lawyer.plan, &limits, now);
            if !has_capacity(&lawyer.quota, limits.hourly_for(lawyer.plan)) {
                return false;
            }
            lawyer.quota.received_this_month += 1;
            lawyer.quota.received_this_hour += 1;
            true
        })?;

        updated.ok_or_else(|| QuotaError::Exhausted {
            lawyer_id: lawyer_id.clone(),
        })
    }

    /// Scheduler hook: persist due resets for every lawyer.
    pub fn reset_all_due(&self) -> Result<usize, QuotaError> {
        let mut reset = 0;
        for lawyer_id in self.lawyers.all_lawyer_ids()? {
            match self.reset_if_due(&lawyer_id) {
                Ok(true) => reset += 1,
                Ok(false) => {}
                Err(QuotaError::Repository(RepositoryError::NotFound)) => {}
                Err(error) => return Err(error),
            }
        }
        info!(reset, "quota reset sweep finished");
        Ok(reset)
    }
}
