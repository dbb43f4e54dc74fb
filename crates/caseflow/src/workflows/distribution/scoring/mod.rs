mod rules;

use serde::{Deserialize, Serialize};

use super::domain::{Case, Lawyer};

pub const MAX_SCORE: u8 = 100;

/// Signal that contributed points to a compatibility score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityFactor {
    Specialty,
    Location,
    Urgency,
    PlanTier,
}

/// Discrete contribution to a score so any ranking can be explained later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: CompatibilityFactor,
    pub points: u8,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityScore {
    pub total: u8,
    pub components: Vec<ScoreComponent>,
}

/// Additive, auditable case/lawyer fit in `0..=100`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompatibilityScorer;

impl CompatibilityScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, case: &Case, lawyer: &Lawyer) -> u8 {
        self.evaluate(case, lawyer).total
    }

    pub fn evaluate(&self, case: &Case, lawyer: &Lawyer) -> CompatibilityScore {
        let components = vec![
            rules::specialty(case, lawyer),
            rules::location(case, lawyer),
            rules::urgency(case, lawyer),
            rules::plan_tier(lawyer),
        ];

        let total = components
            .iter()
            .map(|component| u32::from(component.points))
            .sum::<u32>()
            .min(u32::from(MAX_SCORE)) as u8;

        CompatibilityScore { total, components }
    }
}
