//! Flow: one signed, asset-scoped balance delta extracted from a transaction.

use crate::domain::{AssetId, Decimal, Direction, OwnerScope, TimeMs, TxKind};
use serde::{Deserialize, Serialize};

/// One signed balance delta for one owning scope.
///
/// Created once by the flow extractor. `fiat_value` and `price_at_execution`
/// may be back-filled by a later valuation pass; everything else is immutable
/// after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Stable unique key, used for idempotent persistence.
    pub flow_key: String,
    /// Reference to the source transaction (chain signature or event key).
    pub tx_ref: String,
    /// Classification of the source transaction.
    pub tx_kind: TxKind,
    /// Timestamp of the source transaction.
    pub time_ms: TimeMs,
    /// Owning scope (wallet XOR exchange connection).
    pub scope: OwnerScope,
    /// Canonical or pseudo asset identifier.
    pub asset: AssetId,
    /// Declared decimal precision of `raw_amount`.
    pub decimals: u32,
    /// Raw integer amount (sign carried by `direction`).
    pub raw_amount: i128,
    /// Decimal amount, always non-negative.
    pub amount: Decimal,
    /// Direction of the delta.
    pub direction: Direction,
    /// Fee flows are tracked but excluded from all aggregation.
    pub is_fee: bool,
    /// Fiat value of this flow, if attributed.
    pub fiat_value: Option<Decimal>,
    /// Asset price at execution time, if known.
    pub price_at_execution: Option<Decimal>,
}

impl Flow {
    /// Build a flow from a raw integer delta, deriving direction from sign
    /// and scaling in integer space. The flow key is derived from the fields
    /// that identify the delta within its transaction.
    ///
    /// # Errors
    /// Returns an error if the raw amount is out of decimal range.
    pub fn from_raw_delta(
        tx_ref: &str,
        tx_kind: TxKind,
        time_ms: TimeMs,
        scope: OwnerScope,
        asset: AssetId,
        raw_delta: i128,
        decimals: u32,
        is_fee: bool,
    ) -> Result<Self, rust_decimal::Error> {
        let amount = Decimal::try_from_raw_units(raw_delta.abs(), decimals)?;
        let direction = Direction::from_sign(raw_delta);
        let flow_key = Self::compute_flow_key(tx_ref, &scope, &asset, raw_delta, is_fee);
        Ok(Flow {
            flow_key,
            tx_ref: tx_ref.to_string(),
            tx_kind,
            time_ms,
            scope,
            asset,
            decimals,
            raw_amount: raw_delta,
            amount,
            direction,
            is_fee,
            fiat_value: None,
            price_at_execution: None,
        })
    }

    /// Stable unique key: 128-bit truncated SHA-256 over the identifying
    /// fields. Same transaction + same delta ⇒ same key, so re-running
    /// extraction cannot duplicate flows.
    pub fn compute_flow_key(
        tx_ref: &str,
        scope: &OwnerScope,
        asset: &AssetId,
        raw_delta: i128,
        is_fee: bool,
    ) -> String {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, tx_ref);
        hash_var(&mut hasher, scope.kind_str());
        hasher.update(scope.raw_id().to_le_bytes());
        hash_var(&mut hasher, asset.as_str());
        hasher.update(raw_delta.to_le_bytes());
        hasher.update([u8::from(is_fee)]);

        let hash = hasher.finalize();
        format!("flow:{}", hex::encode(&hash[..16]))
    }

    /// Signed decimal amount (positive in, negative out).
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::In => self.amount,
            Direction::Out => -self.amount,
        }
    }
}
