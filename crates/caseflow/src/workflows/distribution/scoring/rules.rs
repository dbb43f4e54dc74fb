use super::super::domain::{same_city, same_state, Case, Lawyer, PlanTier};
use super::{CompatibilityFactor, ScoreComponent};

const SPECIALTY_MATCH: u8 = 40;
const SPECIALTY_MISMATCH: u8 = 10;
const SPECIALTY_UNKNOWN: u8 = 20;
const LOCATION_CAP: u8 = 30;
const SAME_STATE: u8 = 20;
const SAME_CITY: u8 = 10;
const URGENCY_CAP: u8 = 10;
const PLAN_CAP: u8 = 20;

pub(super) fn specialty(case: &Case, lawyer: &Lawyer) -> ScoreComponent {
    let (points, notes) = match &case.specialty_id {
        Some(specialty) if lawyer.specialties.contains(specialty) => {
            (SPECIALTY_MATCH, format!("practices {specialty}"))
        }
        Some(specialty) => (
            SPECIALTY_MISMATCH,
            format!("does not list {specialty}"),
        ),
        None => (SPECIALTY_UNKNOWN, "case specialty unresolved".to_string()),
    };

    ScoreComponent {
        factor: CompatibilityFactor::Specialty,
        points,
        notes,
    }
}

pub(super) fn location(case: &Case, lawyer: &Lawyer) -> ScoreComponent {
    let citizen = &case.location;
    let office = &lawyer.service_area;

    let (points, notes) = if same_state(&citizen.state, &office.state) {
        if same_city(&citizen.city, &office.city) {
            (SAME_STATE + SAME_CITY, format!("same city ({})", office.city))
        } else {
            (SAME_STATE, format!("same state ({})", office.state))
        }
    } else {
        (0, "different state".to_string())
    };

    ScoreComponent {
        factor: CompatibilityFactor::Location,
        points: points.min(LOCATION_CAP),
        notes,
    }
}

pub(super) fn urgency(case: &Case, lawyer: &Lawyer) -> ScoreComponent {
    let (points, notes) = if case.urgency.is_pressing() {
        match lawyer.plan {
            PlanTier::Premium | PlanTier::Unlimited => (10, "priority plan on urgent case"),
            PlanTier::Basic => (5, "basic plan on urgent case"),
            PlanTier::Free => (0, "free plan on urgent case"),
        }
    } else {
        (0, "routine urgency")
    };

    ScoreComponent {
        factor: CompatibilityFactor::Urgency,
        points: points.min(URGENCY_CAP),
        notes: notes.to_string(),
    }
}

pub(super) fn plan_tier(lawyer: &Lawyer) -> ScoreComponent {
    let points = match lawyer.plan {
        PlanTier::Premium | PlanTier::Unlimited => 15,
        PlanTier::Basic => 10,
        PlanTier::Free => 5,
    };

    ScoreComponent {
        factor: CompatibilityFactor::PlanTier,
        points: points.min(PLAN_CAP),
        notes: format!("{} plan baseline", lawyer.plan.label()),
    }
}
