//! Review records emitted by downstream heuristics.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Suggested tax category for a flagged transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    /// Asset moved onto an exchange and sold, typically a taxable disposal.
    DisposalSale,
}

impl TaxCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxCategory::DisposalSale => "disposal_sale",
        }
    }
}

/// Priority weighting for the manual review queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewPriority {
    Low,
    Normal,
    High,
}

impl ReviewPriority {
    /// Weight by estimated fiat value of the disposal.
    pub fn from_estimated_value(value: Option<Decimal>) -> ReviewPriority {
        let Some(value) = value else {
            return ReviewPriority::Low;
        };
        let high = Decimal::from_str("10000").unwrap_or_else(|_| Decimal::zero());
        let normal = Decimal::from_str("100").unwrap_or_else(|_| Decimal::zero());
        if value >= high {
            ReviewPriority::High
        } else if value >= normal {
            ReviewPriority::Normal
        } else {
            ReviewPriority::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewPriority::Low => "low",
            ReviewPriority::Normal => "normal",
            ReviewPriority::High => "high",
        }
    }
}

/// A review record created by the off-ramp detector.
///
/// Pure side-effect record; never mutates the underlying transactions.
/// Keyed by `matched_tx_id` when persisted, so re-runs cannot duplicate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingClassification {
    /// The matched chain transaction this review is about.
    pub matched_tx_id: i64,
    /// The sell-side exchange event that triggered the flag.
    pub trigger_event_id: i64,
    /// Suggested category.
    pub category: TaxCategory,
    /// Review queue priority.
    pub priority: ReviewPriority,
    /// Estimated fiat value of the disposal, when known.
    pub estimated_value: Option<Decimal>,
}
