//! Fiat value attribution over a transaction's flow list.

use crate::domain::{AssetId, Decimal, Flow, TxKind};

/// Canonical ids treated as stable/fiat-equivalent legs in a swap. The
/// counter-leg amount of such a leg *is* the fiat-equivalent price.
const STABLE_ASSET_IDS: &[&str] = &[
    "eth:0xusdc",
    "eth:0xusdt",
    "eth:0xdai",
    "sol:usdc-mint",
    "sol:usdt-mint",
];

fn is_stable_leg(asset: &AssetId) -> bool {
    asset.is_fiat() || STABLE_ASSET_IDS.contains(&asset.as_str())
}

/// Assign fiat values to a transaction's flows.
///
/// - Swap with a stable leg: the stable leg's value is its own amount;
///   every other flow's value is the stable leg's amount.
/// - Swap without a stable leg, and every non-swap: every flow's value is
///   the supplied total (both legs approximated as equal value).
///
/// Fires only when flows exist and the supplied total is positive;
/// otherwise the flows remain unpriced, eligible for a later backfill pass.
pub fn attribute_values(flows: &mut [Flow], kind: TxKind, total_value: Decimal) {
    if flows.is_empty() || !total_value.is_positive() {
        return;
    }

    if kind == TxKind::Swap {
        let stable_amount = flows
            .iter()
            .find(|f| !f.is_fee && is_stable_leg(&f.asset))
            .map(|f| f.amount);

        if let Some(stable_amount) = stable_amount {
            for flow in flows.iter_mut() {
                flow.fiat_value = Some(if is_stable_leg(&flow.asset) {
                    flow.amount
                } else {
                    stable_amount
                });
            }
            return;
        }
    }

    for flow in flows.iter_mut() {
        flow.fiat_value = Some(total_value);
    }
}
