use analytics::AccountStats;
use chrono::{DateTime, Utc};
use configuration::AlertRuleSettings;
use core_types::{AccountId, AlertCondition, AlertKind, AlertStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Triggers kept per account; the oldest are dropped first.
pub const HISTORY_LIMIT: usize = 500;

/// Half-width of the band `AlertCondition::Equals` accepts.
const EQUALS_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// A rule as requested by an operator or the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub threshold: Decimal,
    pub message: Option<String>,
}

impl From<&AlertRuleSettings> for NewAlert {
    fn from(rule: &AlertRuleSettings) -> Self {
        Self {
            kind: rule.kind,
            condition: rule.condition,
            threshold: rule.threshold,
            message: rule.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: u32,
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub threshold: Decimal,
    /// Replaces the generated trigger message when set.
    pub message: Option<String>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl AlertRule {
    fn matches(&self, alert: &NewAlert) -> bool {
        self.kind == alert.kind
            && self.condition == alert.condition
            && self.threshold == alert.threshold
    }

    fn describe(&self, value: Decimal) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        let label = match self.kind {
            AlertKind::Drawdown => "Drawdown",
            AlertKind::Profit => "Profit",
            AlertKind::Loss => "Loss",
            AlertKind::Balance => "Balance",
            AlertKind::Equity => "Equity",
        };
        let verb = match self.condition {
            AlertCondition::Above => "exceeded",
            AlertCondition::Below => "dropped below",
            AlertCondition::Equals => "reached",
        };
        if self.kind.is_percentage() {
            format!("{label} {verb} {}% (current: {:.2}%)", self.threshold, value)
        } else {
            format!("{label} {verb} {:.2} (current: {:.2})", self.threshold, value)
        }
    }
}

/// One firing of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTrigger {
    pub rule_id: u32,
    pub account_id: AccountId,
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub threshold: Decimal,
    pub actual_value: Decimal,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
}

/// The value of `kind` in a summary.
pub fn metric_value(kind: AlertKind, stats: &AccountStats) -> Decimal {
    match kind {
        AlertKind::Drawdown => stats.drawdown_pct,
        AlertKind::Profit => stats.profit,
        AlertKind::Loss => -stats.profit,
        AlertKind::Balance => stats.balance,
        AlertKind::Equity => stats.equity,
    }
}

pub fn condition_met(condition: AlertCondition, value: Decimal, threshold: Decimal) -> bool {
    match condition {
        AlertCondition::Above => value > threshold,
        AlertCondition::Below => value < threshold,
        AlertCondition::Equals => (value - threshold).abs() < EQUALS_TOLERANCE,
    }
}

/// The rules of one account and the record of their firings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertBook {
    pub rules: Vec<AlertRule>,
    /// Oldest first.
    pub history: Vec<AlertTrigger>,
    #[serde(default)]
    next_id: u32,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u32 {
        let floor = self.rules.iter().map(|r| r.id).max().unwrap_or(0);
        self.next_id = self.next_id.max(floor) + 1;
        self.next_id
    }

    pub fn rule(&self, id: u32) -> Option<&AlertRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Adds a rule. A rule with the same kind, condition and threshold is
    /// updated in place instead: its message is replaced and it is re-armed.
    pub fn add(&mut self, alert: NewAlert, now: DateTime<Utc>) -> AlertRule {
        if let Some(existing) = self.rules.iter_mut().find(|r| r.matches(&alert)) {
            existing.message = alert.message;
            existing.status = AlertStatus::Active;
            return existing.clone();
        }
        let rule = AlertRule {
            id: self.allocate_id(),
            kind: alert.kind,
            condition: alert.condition,
            threshold: alert.threshold,
            message: alert.message,
            status: AlertStatus::Active,
            created_at: now,
            triggered_at: None,
        };
        self.rules.push(rule.clone());
        rule
    }

    /// Installs the configured rules the book does not have yet. Returns how
    /// many were added.
    pub fn seed(&mut self, configured: &[NewAlert], now: DateTime<Utc>) -> usize {
        let mut added = 0;
        for alert in configured {
            if !self.rules.iter().any(|r| r.matches(alert)) {
                self.add(alert.clone(), now);
                added += 1;
            }
        }
        added
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    /// Changes a rule's status; `Active` re-arms a triggered rule.
    pub fn set_status(&mut self, id: u32, status: AlertStatus) -> Option<AlertRule> {
        let rule = self.rules.iter_mut().find(|r| r.id == id)?;
        rule.status = status;
        Some(rule.clone())
    }

    /// Fires every active rule whose condition holds for `stats`, moving it
    /// to `Triggered` and recording the firing.
    pub fn evaluate(&mut self, stats: &AccountStats) -> Vec<AlertTrigger> {
        let mut fired = Vec::new();
        for rule in self.rules.iter_mut() {
            if rule.status != AlertStatus::Active {
                continue;
            }
            let value = metric_value(rule.kind, stats);
            if !condition_met(rule.condition, value, rule.threshold) {
                continue;
            }
            rule.status = AlertStatus::Triggered;
            rule.triggered_at = Some(stats.as_of);
            fired.push(AlertTrigger {
                rule_id: rule.id,
                account_id: stats.account_id,
                kind: rule.kind,
                condition: rule.condition,
                threshold: rule.threshold,
                actual_value: value,
                message: rule.describe(value),
                triggered_at: stats.as_of,
            });
        }

        self.history.extend(fired.iter().cloned());
        let overflow = self.history.len().saturating_sub(HISTORY_LIMIT);
        self.history.drain(..overflow);
        fired
    }

    /// The `limit` most recent firings, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AlertTrigger> {
        self.history.iter().rev().take(limit).cloned().collect()
    }
}
