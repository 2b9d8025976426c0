use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RulesConfig;

const LINE_INFRINGEMENT: &str = "line infringement";
const NO_FURTHER_ACTION: &str = "no further action";
const WARNING: &str = "warning";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Accumulates warnings inside the window until the threshold is reached.
    LineInfringement,
    /// Everything else: the marshal's supplied penalty decides.
    Other,
}

impl Category {
    pub fn classify(description: &str) -> Self {
        if description.to_lowercase().contains(LINE_INFRINGEMENT) {
            Self::LineInfringement
        } else {
            Self::Other
        }
    }

    pub fn is_line(&self) -> bool {
        matches!(self, Self::LineInfringement)
    }
}

/// An earlier infringement of the same kart, as the engine needs to see it.
#[derive(Debug, Clone)]
pub struct PriorInfringement {
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Penalty due now, or already served.
    pub carries_penalty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub category: Category,
    pub warning_count: u32,
    pub penalty_due: bool,
    pub penalty_description: Option<String>,
}

/// Stateless warning/penalty rules.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    penalty_threshold: u32,
    accumulated_penalty: String,
}

impl RuleEngine {
    pub fn new(config: &RulesConfig) -> Self {
        Self {
            penalty_threshold: config.penalty_threshold.max(1),
            accumulated_penalty: config.accumulated_penalty.clone(),
        }
    }

    /// Decides the warning count and penalty for an infringement at `now`.
    ///
    /// `history` holds the kart's infringements that precede this one; the
    /// engine filters by category and window itself.
    pub fn decide(
        &self,
        description: &str,
        supplied_penalty: Option<&str>,
        now: DateTime<Utc>,
        window_minutes: i64,
        history: &[PriorInfringement],
    ) -> Decision {
        let category = Category::classify(description);
        let supplied = supplied_penalty
            .map(str::trim)
            .filter(|p| !p.is_empty());

        match category {
            Category::LineInfringement => match supplied {
                Some(penalty) if !penalty.eq_ignore_ascii_case(WARNING) => Decision {
                    category,
                    warning_count: 1,
                    penalty_due: !penalty.eq_ignore_ascii_case(NO_FURTHER_ACTION),
                    penalty_description: Some(penalty.to_string()),
                },
                _ => self.accumulate(now, window_minutes, history),
            },
            Category::Other => match supplied {
                Some(penalty) => Decision {
                    category,
                    warning_count: 1,
                    penalty_due: !(penalty.eq_ignore_ascii_case(NO_FURTHER_ACTION)
                        || penalty.eq_ignore_ascii_case(WARNING)),
                    penalty_description: supplied_penalty.map(str::to_string),
                },
                None => Decision {
                    category,
                    warning_count: 1,
                    penalty_due: false,
                    penalty_description: None,
                },
            },
        }
    }

    fn accumulate(
        &self,
        now: DateTime<Utc>,
        window_minutes: i64,
        history: &[PriorInfringement],
    ) -> Decision {
        let same_category: Vec<&PriorInfringement> = history
            .iter()
            .filter(|p| p.created_at <= now && Category::classify(&p.description).is_line())
            .collect();

        // The last penalty closes the previous cycle.
        let boundary = same_category
            .iter()
            .filter(|p| p.carries_penalty)
            .map(|p| p.created_at)
            .max();
        let window_start = now - Duration::minutes(window_minutes);
        let cycle_start = boundary.map_or(window_start, |b| b.max(window_start));

        let prior_warnings = same_category
            .iter()
            .filter(|p| !p.carries_penalty && p.created_at >= cycle_start)
            .count();
        let warning_count = u32::try_from(prior_warnings)
            .unwrap_or(u32::MAX)
            .saturating_add(1);

        if warning_count >= self.penalty_threshold {
            Decision {
                category: Category::LineInfringement,
                warning_count,
                penalty_due: true,
                penalty_description: Some(self.accumulated_penalty.clone()),
            }
        } else {
            Decision {
                category: Category::LineInfringement,
                warning_count,
                penalty_due: false,
                penalty_description: Some("Warning".to_string()),
            }
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(&RulesConfig::default())
    }
}
