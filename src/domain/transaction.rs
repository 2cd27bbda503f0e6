//! Blockchain-side transaction and transfer types.

use crate::domain::{AssetId, Decimal, Direction, TimeMs, TxKind, WalletId};
use serde::{Deserialize, Serialize};

/// An owned blockchain account.
///
/// Created by user action; wallets are deactivated, never silently deleted,
/// so historical flows keep a valid owning scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: String,
    pub address: String,
    pub network: String,
    pub active: bool,
}

/// A blockchain transaction owned by one of the user's wallets.
///
/// Created by the chain-indexing collaborator; the only field this engine
/// ever mutates is `linked_event_id`, and only through the repository's
/// atomic pair-link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    /// Database row id.
    pub id: i64,
    /// Unique on-chain signature / hash.
    pub signature: String,
    /// Block timestamp in milliseconds since Unix epoch.
    pub time_ms: TimeMs,
    /// Classification of the transaction.
    pub kind: TxKind,
    /// Owning wallet.
    pub wallet_id: WalletId,
    /// Asset movements observed in this transaction.
    pub transfers: Vec<Transfer>,
    /// Symmetric link to the matched exchange event, if any.
    pub linked_event_id: Option<i64>,
}

impl ChainTransaction {
    pub fn is_linked(&self) -> bool {
        self.linked_event_id.is_some()
    }

    /// Transfer amounts for one canonical asset, used by the scorer.
    pub fn amounts_for_asset(&self, asset: &AssetId) -> impl Iterator<Item = Decimal> + '_ {
        let asset = asset.clone();
        self.transfers
            .iter()
            .filter(move |t| t.asset == asset)
            .map(|t| t.amount)
    }
}

/// One asset movement inside a chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Canonical (or pseudo) asset identifier.
    pub asset: AssetId,
    /// Raw integer amount as reported on chain.
    pub raw_amount: i128,
    /// Declared decimal precision of `raw_amount`.
    pub decimals: u32,
    /// Direction relative to the owning wallet.
    pub direction: Direction,
    /// Decimal amount (always non-negative; sign lives in `direction`).
    pub amount: Decimal,
}

impl Transfer {
    /// Build a transfer from a raw integer delta, scaling in integer space.
    ///
    /// # Errors
    /// Returns an error if the raw amount is out of decimal range.
    pub fn from_raw(
        asset: AssetId,
        raw_amount: i128,
        decimals: u32,
    ) -> Result<Self, rust_decimal::Error> {
        let amount = Decimal::try_from_raw_units(raw_amount.abs(), decimals)?;
        Ok(Transfer {
            asset,
            raw_amount,
            decimals,
            direction: Direction::from_sign(raw_amount),
            amount,
        })
    }
}
