use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{PlanTier, UNLIMITED_LEADS};

pub const MAX_OFFERS_PER_CASE: &str = "maxOffersPerCase";
pub const MIN_ACCEPTABLE_SCORE: &str = "minAcceptableScore";
pub const OFFER_EXPIRATION_HOURS: &str = "offerExpirationHours";
pub const MAX_REDISTRIBUTIONS_PER_CASE: &str = "maxRedistributionsPerCase";
pub const AUTO_EXPIRE_MATCHES: &str = "autoExpireMatches";
pub const MONTHLY_LIMIT_FREE: &str = "monthlyLeadLimit.free";
pub const MONTHLY_LIMIT_BASIC: &str = "monthlyLeadLimit.basic";
pub const MONTHLY_LIMIT_PREMIUM: &str = "monthlyLeadLimit.premium";
pub const MONTHLY_LIMIT_UNLIMITED: &str = "monthlyLeadLimit.unlimited";
pub const HOURLY_LEAD_LIMIT: &str = "hourlyLeadLimit";
pub const HOURLY_LIMIT_FREE: &str = "hourlyLeadLimit.free";
pub const HOURLY_LIMIT_BASIC: &str = "hourlyLeadLimit.basic";
pub const HOURLY_LIMIT_PREMIUM: &str = "hourlyLeadLimit.premium";
pub const HOURLY_LIMIT_UNLIMITED: &str = "hourlyLeadLimit.unlimited";

/// Accepted range for `offerExpirationHours`: up to one year.
pub const OFFER_EXPIRATION_RANGE: std::ops::RangeInclusive<i64> = 1..=8760;

const DEFAULT_TTL: Duration = Duration::from_secs(120);

/// Per-plan intake caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub free_monthly: i32,
    pub basic_monthly: i32,
    pub premium_monthly: i32,
    pub unlimited_monthly: i32,
    pub free_hourly: u32,
    pub basic_hourly: u32,
    pub premium_hourly: u32,
    pub unlimited_hourly: u32,
}

impl PlanLimits {
    pub fn monthly_for(&self, plan: PlanTier) -> i32 {
        match plan {
            PlanTier::Free => self.free_monthly,
            PlanTier::Basic => self.basic_monthly,
            PlanTier::Premium => self.premium_monthly,
            PlanTier::Unlimited => self.unlimited_monthly,
        }
    }

    /// Only consulted while the lawyer's monthly limit is finite.
    pub fn hourly_for(&self, plan: PlanTier) -> u32 {
        match plan {
            PlanTier::Free => self.free_hourly,
            PlanTier::Basic => self.basic_hourly,
            PlanTier::Premium => self.premium_hourly,
            PlanTier::Unlimited => self.unlimited_hourly,
        }
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            free_monthly: 10,
            basic_monthly: 30,
            premium_monthly: 100,
            unlimited_monthly: UNLIMITED_LEADS,
            free_hourly: 5,
            basic_hourly: 5,
            premium_hourly: 5,
            unlimited_hourly: 5,
        }
    }
}

/// Tunables read by the engine, lifecycle manager and quota tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSettings {
    pub max_offers_per_case: usize,
    pub min_acceptable_score: u8,
    pub offer_expiration_hours: i64,
    pub max_redistributions_per_case: u32,
    pub auto_expire_matches: bool,
    pub plan_limits: PlanLimits,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            max_offers_per_case: 5,
            min_acceptable_score: 60,
            offer_expiration_hours: DEFAULT_OFFER_EXPIRATION_HOURS,
            max_redistributions_per_case: 3,
            auto_expire_matches: true,
            plan_limits: PlanLimits::default(),
        }
    }
}

impl DistributionSettings {
    /// Expiry stamp for an offer created at `now`.
    pub fn offer_expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::try_hours(self.offer_expiration_hours)
            .and_then(|window| now.checked_add_signed(window))
            .unwrap_or_else(|| now + chrono::Duration::hours(DEFAULT_OFFER_EXPIRATION_HOURS))
    }
}

const DEFAULT_OFFER_EXPIRATION_HOURS: i64 = 48;

/// Raised when the key/value settings store cannot be read.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store holding externally managed settings.
pub trait SettingsSource: Send + Sync {
    fn fetch(&self, key: &str) -> Result<Option<String>, SettingsError>;
}

/// In-memory source, mutable at runtime.
#[derive(Debug, Default, Clone)]
pub struct StaticSettingsSource {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl StaticSettingsSource {
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            values: Arc::new(Mutex::new(values)),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut guard) = self.values.lock() {
            guard.insert(key.into(), value.into());
        }
    }
}

impl SettingsSource for StaticSettingsSource {
    fn fetch(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let guard = self
            .values
            .lock()
            .map_err(|_| SettingsError::Unavailable("settings map poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }
}

/// Reads `CASEFLOW_*` environment variables, e.g. `maxOffersPerCase` from
/// `CASEFLOW_MAX_OFFERS_PER_CASE` and `monthlyLeadLimit.free` from
/// `CASEFLOW_MONTHLY_LEAD_LIMIT_FREE`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSettingsSource;

impl EnvSettingsSource {
    pub fn variable_name(key: &str) -> String {
        let mut name = String::from("CASEFLOW_");
        for ch in key.chars() {
            if ch == '.' {
                name.push('_');
            } else if ch.is_ascii_uppercase() {
                name.push('_');
                name.push(ch);
            } else {
                name.push(ch.to_ascii_uppercase());
            }
        }
        name
    }
}

impl SettingsSource for EnvSettingsSource {
    fn fetch(&self, key: &str) -> Result<Option<String>, SettingsError> {
        match env::var(Self::variable_name(key)) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(SettingsError::Unavailable(format!(
                "{key} is not valid unicode"
            ))),
        }
    }
}

struct CachedSettings {
    loaded_at: Instant,
    settings: DistributionSettings,
}

/// Read-through cache over a [`SettingsSource`].
///
/// Snapshots are reused for `ttl`; callers may observe values up to that old.
/// A failed read yields the built-in defaults and is not cached.
pub struct SettingsProvider {
    source: Arc<dyn SettingsSource>,
    ttl: Duration,
    cache: Mutex<Option<CachedSettings>>,
}

impl SettingsProvider {
    pub fn new(source: Arc<dyn SettingsSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub fn with_default_ttl(source: Arc<dyn SettingsSource>) -> Self {
        Self::new(source, DEFAULT_TTL)
    }

    /// Provider that never consults a store.
    pub fn defaults() -> Self {
        Self::new(Arc::new(StaticSettingsSource::default()), DEFAULT_TTL)
    }

    pub fn current(&self) -> DistributionSettings {
        if let Ok(guard) = self.cache.lock() {
            if let Some(cached) = guard.as_ref() {
                if cached.loaded_at.elapsed() < self.ttl {
                    return cached.settings.clone();
                }
            }
        }

        match self.load() {
            Ok(settings) => {
                if let Ok(mut guard) = self.cache.lock() {
                    *guard = Some(CachedSettings {
                        loaded_at: Instant::now(),
                        settings: settings.clone(),
                    });
                }
                settings
            }
            Err(error) => {
                warn!(%error, "falling back to default distribution settings");
                DistributionSettings::default()
            }
        }
    }

    /// Drop the cached snapshot so the next read hits the store.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cache.lock() {
            *guard = None;
        }
    }

    fn load(&self) -> Result<DistributionSettings, SettingsError> {
        let defaults = DistributionSettings::default();
        let limits = defaults.plan_limits.clone();
        let shared_hourly = self.value(HOURLY_LEAD_LIMIT, limits.free_hourly)?;

        Ok(DistributionSettings {
            max_offers_per_case: self.value(MAX_OFFERS_PER_CASE, defaults.max_offers_per_case)?,
            min_acceptable_score: self
                .value(MIN_ACCEPTABLE_SCORE, defaults.min_acceptable_score)?
                .min(100),
            offer_expiration_hours: self.bounded(
                OFFER_EXPIRATION_HOURS,
                defaults.offer_expiration_hours,
                OFFER_EXPIRATION_RANGE,
            )?,
            max_redistributions_per_case: self.value(
                MAX_REDISTRIBUTIONS_PER_CASE,
                defaults.max_redistributions_per_case,
            )?,
            auto_expire_matches: self.value(AUTO_EXPIRE_MATCHES, defaults.auto_expire_matches)?,
            plan_limits: PlanLimits {
                free_monthly: self.value(MONTHLY_LIMIT_FREE, limits.free_monthly)?,
                basic_monthly: self.value(MONTHLY_LIMIT_BASIC, limits.basic_monthly)?,
                premium_monthly: self.value(MONTHLY_LIMIT_PREMIUM, limits.premium_monthly)?,
                unlimited_monthly: self
                    .value(MONTHLY_LIMIT_UNLIMITED, limits.unlimited_monthly)?,
                free_hourly: self.value(HOURLY_LIMIT_FREE, shared_hourly)?,
                basic_hourly: self.value(HOURLY_LIMIT_BASIC, shared_hourly)?,
                premium_hourly: self.value(HOURLY_LIMIT_PREMIUM, shared_hourly)?,
                unlimited_hourly: self.value(HOURLY_LIMIT_UNLIMITED, shared_hourly)?,
            },
        })
    }

    fn bounded<T>(
        &self,
        key: &str,
        default: T,
        range: std::ops::RangeInclusive<T>,
    ) -> Result<T, SettingsError>
    where
        T: FromStr + PartialOrd + Copy + std::fmt::Display,
    {
        let value = self.value(key, default)?;
        if range.contains(&value) {
            Ok(value)
        } else {
            warn!(key, %value, "ignoring out-of-range setting");
            Ok(default)
        }
    }

    fn value<T>(&self, key: &str, default: T) -> Result<T, SettingsError>
    where
        T: FromStr,
    {
        let Some(raw) = self.source.fetch(key)? else {
            return Ok(default);
        };

        match raw.trim().parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparsable setting");
                Ok(default)
            }
        }
    }
}
