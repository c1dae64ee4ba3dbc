use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of balance-affecting occurrence recorded in an account ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Deposit,
    Withdrawal,
    TradeSettlement,
}

impl EventKind {
    /// Deposits and withdrawals move capital in or out; they are not trading results.
    pub fn is_capital_flow(&self) -> bool {
        matches!(self, EventKind::Deposit | EventKind::Withdrawal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Whether a fill opened or closed (part of) a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FillEntry {
    Open,
    Close,
}

/// The account figure an alert rule watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Current drawdown, in percent of the equity peak.
    Drawdown,
    Profit,
    /// Net loss as a positive amount: the negated profit.
    Loss,
    Balance,
    Equity,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Drawdown => "drawdown",
            AlertKind::Profit => "profit",
            AlertKind::Loss => "loss",
            AlertKind::Balance => "balance",
            AlertKind::Equity => "equity",
        }
    }

    /// Whether the watched figure is a percentage rather than an amount.
    pub fn is_percentage(&self) -> bool {
        matches!(self, AlertKind::Drawdown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    Above,
    Below,
    /// Within one cent (or one hundredth of a point) of the threshold.
    Equals,
}

impl AlertCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCondition::Above => "above",
            AlertCondition::Below => "below",
            AlertCondition::Equals => "equals",
        }
    }
}

/// An active rule fires once, then stays triggered until it is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Active,
    Triggered,
    Disabled,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Triggered => "triggered",
            AlertStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drawdown" => Ok(AlertKind::Drawdown),
            "profit" => Ok(AlertKind::Profit),
            "loss" => Ok(AlertKind::Loss),
            "balance" => Ok(AlertKind::Balance),
            "equity" => Ok(AlertKind::Equity),
            _ => Err(CoreError::InvalidInput("alert kind".to_string(), s.to_string())),
        }
    }
}

impl FromStr for AlertCondition {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "above" => Ok(AlertCondition::Above),
            "below" => Ok(AlertCondition::Below),
            "equals" => Ok(AlertCondition::Equals),
            _ => Err(CoreError::InvalidInput("alert condition".to_string(), s.to_string())),
        }
    }
}

impl FromStr for AlertStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(AlertStatus::Active),
            "triggered" => Ok(AlertStatus::Triggered),
            "disabled" => Ok(AlertStatus::Disabled),
            _ => Err(CoreError::InvalidInput("alert status".to_string(), s.to_string())),
        }
    }
}
