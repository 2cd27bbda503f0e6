//! Portfolio aggregation: persisted flows → per-asset holdings.

use crate::domain::{AssetId, Decimal, Direction, Flow, TimeMs, TxKind};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Aggregated holdings for one asset across the requested scopes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetPosition {
    pub asset: AssetId,
    /// Total inbound amount (all flows).
    pub total_in: Decimal,
    /// Total outbound amount (all flows).
    pub total_out: Decimal,
    /// Inbound amount restricted to priced flows, the realized-gain input.
    pub priced_in: Decimal,
    /// Outbound amount restricted to priced flows.
    pub priced_out: Decimal,
    /// Total inbound fiat value.
    pub value_in: Decimal,
    /// Total outbound fiat value.
    pub value_out: Decimal,
    /// Distinct transactions with an inbound flow of this asset.
    pub buy_tx_count: usize,
    /// Distinct transactions with an outbound flow of this asset.
    pub sell_tx_count: usize,
    pub first_activity_ms: TimeMs,
    pub last_activity_ms: TimeMs,
}

impl AssetPosition {
    /// Net holding: inbound minus outbound.
    pub fn net(&self) -> Decimal {
        self.total_in - self.total_out
    }

    fn traded_value(&self) -> Decimal {
        self.value_in + self.value_out
    }
}

#[derive(Default)]
struct Accumulator {
    total_in: Decimal,
    total_out: Decimal,
    priced_in: Decimal,
    priced_out: Decimal,
    value_in: Decimal,
    value_out: Decimal,
    buy_txs: HashSet<String>,
    sell_txs: HashSet<String>,
    first_ms: Option<TimeMs>,
    last_ms: Option<TimeMs>,
}

/// Sum flows into per-asset holdings without double-counting or phantom
/// balances. Read-only over committed state.
///
/// Exclusion rules:
/// - fee flows are never aggregated;
/// - exchange-scoped deposit/withdrawal flows are excluded: they represent
///   the very cross-ledger movement being reconciled, and would double-count
///   against the wallet side;
/// - unresolved pseudo and fiat-pseudo asset ids are excluded from the
///   token-holdings view.
///
/// Output is sorted by total traded value descending (asset id ascending as
/// the deterministic tie-break).
pub fn aggregate(flows: &[Flow]) -> Vec<AssetPosition> {
    let mut by_asset: BTreeMap<AssetId, Accumulator> = BTreeMap::new();

    for flow in flows {
        if flow.is_fee {
            continue;
        }
        if flow.scope.is_exchange()
            && matches!(flow.tx_kind, TxKind::Deposit | TxKind::Withdrawal)
        {
            continue;
        }
        if !flow.asset.is_token() {
            continue;
        }

        let acc = by_asset.entry(flow.asset.clone()).or_default();
        let value = flow.fiat_value.unwrap_or_else(Decimal::zero);

        match flow.direction {
            Direction::In => {
                acc.total_in = acc.total_in + flow.amount;
                acc.value_in = acc.value_in + value;
                if flow.fiat_value.is_some() {
                    acc.priced_in = acc.priced_in + flow.amount;
                }
                acc.buy_txs.insert(flow.tx_ref.clone());
            }
            Direction::Out => {
                acc.total_out = acc.total_out + flow.amount;
                acc.value_out = acc.value_out + value;
                if flow.fiat_value.is_some() {
                    acc.priced_out = acc.priced_out + flow.amount;
                }
                acc.sell_txs.insert(flow.tx_ref.clone());
            }
        }

        acc.first_ms = Some(match acc.first_ms {
            Some(t) if t <= flow.time_ms => t,
            _ => flow.time_ms,
        });
        acc.last_ms = Some(match acc.last_ms {
            Some(t) if t >= flow.time_ms => t,
            _ => flow.time_ms,
        });
    }

    let mut positions: Vec<AssetPosition> = by_asset
        .into_iter()
        .map(|(asset, acc)| AssetPosition {
            asset,
            total_in: acc.total_in,
            total_out: acc.total_out,
            priced_in: acc.priced_in,
            priced_out: acc.priced_out,
            value_in: acc.value_in,
            value_out: acc.value_out,
            buy_tx_count: acc.buy_txs.len(),
            sell_tx_count: acc.sell_txs.len(),
            first_activity_ms: acc.first_ms.unwrap_or(TimeMs::new(0)),
            last_activity_ms: acc.last_ms.unwrap_or(TimeMs::new(0)),
        })
        .collect();

    positions.sort_by(|a, b| {
        b.traded_value()
            .cmp(&a.traded_value())
            .then_with(|| a.asset.cmp(&b.asset))
    });

    positions
}
