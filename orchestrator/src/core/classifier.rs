//! Deterministic classification of tasks into autonomy tiers.

use serde::{Deserialize, Serialize};

use crate::core::types::Autonomy;

/// Tier used when no rule matches: do it, but show me.
pub const DEFAULT_TIER: Autonomy = Autonomy::Yellow;

/// One `(keyword → tier)` entry of the rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomyRule {
    pub keyword: String,
    pub tier: Autonomy,
}

impl AutonomyRule {
    pub fn new(keyword: &str, tier: Autonomy) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            tier,
        }
    }
}

/// Ordered rule table. Evaluation is first-match-wins in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutonomyRules {
    rules: Vec<AutonomyRule>,
}

impl Default for AutonomyRules {
    /// Explicit oversight tags first, then task-type keywords, then
    /// domain-risk keywords.
    fn default() -> Self {
        use Autonomy::{Green, Red, Yellow};

        let table: [(&str, Autonomy); 20] = [
            ("#automate", Green),
            ("#review", Yellow),
            ("#decide", Red),
            ("#escalate", Red),
            ("рефакторинг", Green),
            ("тесты", Green),
            ("документация", Green),
            ("сбор информации", Green),
            ("статус", Green),
            ("код", Yellow),
            ("аналитика", Yellow),
            ("драфт", Yellow),
            ("черновик", Yellow),
            ("деплой", Red),
            ("деплоить", Red),
            ("отправить", Red),
            ("удалить", Red),
            ("коммуникац", Red),
            ("партнёр", Red),
            ("оплат", Red),
        ];
        Self::new(
            table
                .into_iter()
                .map(|(keyword, tier)| AutonomyRule::new(keyword, tier))
                .collect(),
        )
    }
}

impl AutonomyRules {
    pub fn new(rules: Vec<AutonomyRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| AutonomyRule::new(&rule.keyword, rule.tier))
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[AutonomyRule] {
        &self.rules
    }

    /// Classify a task by its text and optional note.
    ///
    /// Text and note are case-folded and joined; the first rule whose keyword
    /// occurs as a substring decides the tier. No match yields [`DEFAULT_TIER`].
    pub fn classify(&self, text: &str, note: Option<&str>) -> Autonomy {
        let haystack = format!("{} {}", text, note.unwrap_or_default()).to_lowercase();
        self.rules
            .iter()
            .find(|rule| haystack.contains(&rule.keyword))
            .map_or(DEFAULT_TIER, |rule| rule.tier)
    }
}
