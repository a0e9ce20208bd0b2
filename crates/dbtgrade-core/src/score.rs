//! Scores and badge tiers

use serde::{Deserialize, Serialize};

/// Lowest possible score
pub const SCORE_MIN: f64 = 0.0;

/// Highest possible score
pub const SCORE_MAX: f64 = 10.0;

/// A badge tier: every score at or above `threshold` earns the tier
/// unless a higher tier matches first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeTier {
    /// Tier label (e.g., "gold")
    pub label: String,

    /// Icon rendered next to the score
    #[serde(default)]
    pub icon: String,

    /// Inclusive lower bound
    pub threshold: f64,
}

impl BadgeTier {
    pub fn new(label: impl Into<String>, icon: impl Into<String>, threshold: f64) -> Self {
        Self {
            label: label.into(),
            icon: icon.into(),
            threshold,
        }
    }
}

/// The badge awarded to a score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub label: String,
    pub icon: String,
}

/// Ordered badge table, highest threshold first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeConfig {
    pub tiers: Vec<BadgeTier>,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                BadgeTier::new("gold", "🥇", 10.0),
                BadgeTier::new("silver", "🥈", 8.0),
                BadgeTier::new("bronze", "🥉", 6.0),
                BadgeTier::new("wip", "🚧", 0.0),
            ],
        }
    }
}

impl BadgeConfig {
    /// Check the table is usable
    ///
    /// Thresholds must lie within the score range, strictly decrease, and
    /// the last tier must start at the minimum score so every score maps
    /// to a badge.
    pub fn validate(&self) -> Result<(), String> {
        let Some(last) = self.tiers.last() else {
            return Err("badge table is empty".to_string());
        };

        for tier in &self.tiers {
            if !(SCORE_MIN..=SCORE_MAX).contains(&tier.threshold) {
                return Err(format!(
                    "badge '{}' threshold {} is outside {}..={}",
                    tier.label, tier.threshold, SCORE_MIN, SCORE_MAX
                ));
            }
        }

        for pair in self.tiers.windows(2) {
            if pair[0].threshold <= pair[1].threshold {
                return Err(format!(
                    "badge '{}' must have a higher threshold than '{}'",
                    pair[0].label, pair[1].label
                ));
            }
        }

        if last.threshold != SCORE_MIN {
            return Err(format!(
                "lowest badge '{}' must start at {}",
                last.label, SCORE_MIN
            ));
        }

        Ok(())
    }

    /// Look up the badge for a score (inclusive lower bound, first match)
    pub fn badge_for(&self, value: f64) -> Badge {
        self.tiers
            .iter()
            .find(|tier| value >= tier.threshold)
            .or_else(|| self.tiers.last())
            .map(|tier| Badge {
                label: tier.label.clone(),
                icon: tier.icon.clone(),
            })
            .unwrap_or_else(|| Badge {
                label: String::new(),
                icon: String::new(),
            })
    }

    /// Build a score carrying its badge
    pub fn score(&self, value: f64) -> Score {
        let value = value.clamp(SCORE_MIN, SCORE_MAX);
        Score {
            value,
            badge: self.badge_for(value),
        }
    }
}

/// A score in `SCORE_MIN..=SCORE_MAX` with its badge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub value: f64,
    pub badge: Badge,
}

impl Score {
    /// Value floored to one decimal, so 9.99 never renders as 10.0
    pub fn rounded_value(&self) -> f64 {
        (self.value * 10.0).floor() / 10.0
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.rounded_value())
    }
}
