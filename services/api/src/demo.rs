use crate::infra::{marketplace_service, parse_timestamp, MarketplaceSnapshot, PinnedClock};
use caseflow::config::AppConfig;
use caseflow::error::AppError;
use caseflow::workflows::distribution::{
    Case, CaseId, CaseStatus, CitizenLocation, Coordinates, DeclineOutcome, DistributionError, DistributionResult,
    EnvSettingsSource, InMemoryMarketplace, Lawyer, LawyerId, LeadQuota, OfferStatus, PlanLimits,
    PlanTier, QuotaStatus, RedistributionOutcome, ServiceArea, SettingsProvider, SpecialtyId,
    StaticSettingsSource, SweepReport, Urgency,
};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Starting instant for the simulated clock (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) start: Option<DateTime<Utc>>,
    /// Print single-line JSON instead of pretty output.
    #[arg(long)]
    pub(crate) compact: bool,
}

#[derive(Args, Debug)]
pub(crate) struct SweepArgs {
    /// Marketplace snapshot (JSON with cases, lawyers and offers)
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Evaluate expiry as of this instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) at: Option<DateTime<Utc>>,
    /// Write the updated marketplace back to the snapshot file
    #[arg(long)]
    pub(crate) write: bool,
}

/// Everything the demo walked through, in the order it happened.
#[derive(Debug, Serialize)]
pub(crate) struct DemoReport {
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) initial_distribution: DistributionResult,
    pub(crate) exhausted_lawyer: QuotaStatus,
    pub(crate) decline: DeclineOutcome,
    pub(crate) sweep: SweepReport,
    pub(crate) retry_limit: RedistributionOutcome,
    pub(crate) offers_to_decliner: usize,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let started_at = args.start.unwrap_or_else(Utc::now);
    let report = demo_report(started_at)?;

    let rendered = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{rendered}");
    Ok(())
}

pub(crate) fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let SweepArgs {
        snapshot: path,
        at,
        write,
    } = args;

    let store = Arc::new(InMemoryMarketplace::new());
    MarketplaceSnapshot::read(&path)?.load_into(&store)?;

    let settings = Arc::new(SettingsProvider::new(
        Arc::new(EnvSettingsSource),
        config.scheduler.settings_ttl,
    ));
    let clock = Arc::new(PinnedClock::at(at.unwrap_or_else(Utc::now)));
    let service = marketplace_service(store.clone(), settings, clock);

    let report = service.sweep()?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if write {
        MarketplaceSnapshot::capture(&store)?.write(&path)?;
    }
    Ok(())
}

/// Rio de Janeiro marketplace: one consumer-law case with a full pool, one
/// family-law case with a single specialist, one case out of retries.
pub(crate) fn demo_report(started_at: DateTime<Utc>) -> Result<DemoReport, AppError> {
    let store = Arc::new(InMemoryMarketplace::new());
    let clock = Arc::new(PinnedClock::at(started_at));
    let settings = Arc::new(SettingsProvider::new(
        Arc::new(StaticSettingsSource::default()),
        std::time::Duration::ZERO,
    ));
    let service = marketplace_service(store.clone(), settings, clock.clone());

    let consumer = case("case-consumer", "consumer-law", Urgency::High, 0);
    let family = case("case-family", "family-law", Urgency::Normal, 0);
    let exhausted_retries = case("case-retries", "consumer-law", Urgency::Low, 3);
    for case in [consumer.clone(), family, exhausted_retries.clone()] {
        store.put_case(case)?;
    }

    let ana = lawyer("lw-ana", "consumer-law", PlanTier::Premium, RIO, started_at);
    store.put_lawyer(ana.clone())?;
    store.put_lawyer(lawyer("lw-bruno", "consumer-law", PlanTier::Premium, RIO, started_at))?;
    store.put_lawyer(lawyer(
        "lw-carla",
        "consumer-law",
        PlanTier::Premium,
        NITEROI,
        started_at,
    ))?;
    let mut diego = lawyer("lw-diego", "consumer-law", PlanTier::Free, RIO, started_at);
    diego.quota.limit_this_month = 5;
    diego.quota.received_this_month = 5;
    store.put_lawyer(diego.clone())?;
    store.put_lawyer(lawyer("lw-elisa", "family-law", PlanTier::Basic, RIO, started_at))?;

    let initial_distribution = service.distribute(&consumer.id)?;
    service.distribute(&CaseId("case-family".to_string()))?;
    let exhausted_lawyer = service.quota_status(&diego.id)?;

    let ana_offer = service
        .case_offers(&consumer.id)?
        .into_iter()
        .find(|offer| offer.lawyer_id == ana.id)
        .ok_or_else(|| DistributionError::LawyerNotFound(ana.id.clone()))?;
    let decline = service.decline_offer(&ana_offer.id)?;

    clock.advance(Duration::hours(49));
    let sweep = service.sweep()?;
    let retry_limit = service.redistribute(&exhausted_retries.id)?;

    let offers_to_decliner = service
        .case_offers(&consumer.id)?
        .iter()
        .filter(|offer| offer.lawyer_id == ana.id && offer.status != OfferStatus::Declined)
        .count();

    Ok(DemoReport {
        started_at,
        initial_distribution,
        exhausted_lawyer,
        decline,
        sweep,
        retry_limit,
        offers_to_decliner,
    })
}

const RIO: (Coordinates, &str) = (
    Coordinates {
        lat: -22.9068,
        lon: -43.1729,
    },
    "Rio de Janeiro",
);
const NITEROI: (Coordinates, &str) = (
    Coordinates {
        lat: -22.8832,
        lon: -43.1034,
    },
    "Niteroi",
);

fn case(id: &str, specialty: &str, urgency: Urgency, redistribution_count: u32) -> Case {
    Case {
        id: CaseId(id.to_string()),
        location: CitizenLocation {
            coordinates: Some(RIO.0),
            city: RIO.1.to_string(),
            state: "RJ".to_string(),
        },
        specialty_id: Some(SpecialtyId(specialty.to_string())),
        urgency,
        status: CaseStatus::Open,
        redistribution_count,
    }
}

fn lawyer(
    id: &str,
    specialty: &str,
    plan: PlanTier,
    office: (Coordinates, &str),
    now: DateTime<Utc>,
) -> Lawyer {
    Lawyer {
        id: LawyerId(id.to_string()),
        active: true,
        onboarding_complete: true,
        approved: true,
        specialties: BTreeSet::from([SpecialtyId(specialty.to_string())]),
        service_area: ServiceArea {
            coordinates: Some(office.0),
            city: office.1.to_string(),
            state: "RJ".to_string(),
            service_radius_km: 40.0,
            accepts_other_states: false,
        },
        plan,
        quota: LeadQuota::fresh(PlanLimits::default().monthly_for(plan), now),
    }
}
