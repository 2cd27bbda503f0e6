//! Flow extraction: raw transaction + balance-delta payload → signed flows.

use crate::domain::{AssetId, Flow, OwnerScope, TimeMs, TxKind};

/// Identity of the source transaction, as seen by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxContext {
    /// Chain signature or exchange event key.
    pub tx_ref: String,
    pub kind: TxKind,
    pub time_ms: TimeMs,
}

/// Normalized per-account balance-delta payload from the indexing
/// collaborator. Raw integer deltas, never floats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceDeltaPayload {
    /// Net delta of the account's primary native asset, fee-inclusive.
    pub native: Option<AssetDelta>,
    /// Explicit fee entry, when the provider breaks it out.
    pub fee: Option<AssetDelta>,
    /// Secondary-asset balance-change entries belonging to the account.
    pub secondary: Vec<AssetDelta>,
}

/// One raw integer balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDelta {
    pub asset: AssetId,
    pub raw_delta: i128,
    pub decimals: u32,
}

/// Decompose one transaction's balance deltas into signed, asset-scoped
/// flows for the owning scope.
///
/// - the native net delta becomes one flow if non-zero (it is already
///   fee-inclusive, so no separate adjustment is applied);
/// - each secondary entry becomes one flow; sign determines direction;
/// - zero deltas are dropped;
/// - an explicit fee entry becomes one fee-flagged flow;
/// - entries whose raw delta cannot be represented are skipped with a warn,
///   never fatal.
pub fn extract_flows(ctx: &TxContext, scope: OwnerScope, payload: &BalanceDeltaPayload) -> Vec<Flow> {
    let mut flows = Vec::new();

    if let Some(native) = &payload.native {
        push_flow(&mut flows, ctx, scope, native, false);
    }
    if let Some(fee) = &payload.fee {
        push_flow(&mut flows, ctx, scope, fee, true);
    }
    for entry in &payload.secondary {
        push_flow(&mut flows, ctx, scope, entry, false);
    }

    flows
}

fn push_flow(
    flows: &mut Vec<Flow>,
    ctx: &TxContext,
    scope: OwnerScope,
    delta: &AssetDelta,
    is_fee: bool,
) {
    if delta.raw_delta == 0 {
        return;
    }

    match Flow::from_raw_delta(
        &ctx.tx_ref,
        ctx.kind,
        ctx.time_ms,
        scope,
        delta.asset.clone(),
        delta.raw_delta,
        delta.decimals,
        is_fee,
    ) {
        Ok(flow) => flows.push(flow),
        Err(e) => {
            tracing::warn!(
                tx_ref = %ctx.tx_ref,
                asset = %delta.asset,
                raw_delta = delta.raw_delta,
                error = %e,
                "skipping unrepresentable balance delta"
            );
        }
    }
}
