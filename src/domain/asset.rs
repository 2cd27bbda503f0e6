//! Asset identifiers and externally seeded symbol mappings.

use serde::{Deserialize, Serialize};

/// Prefix for placeholder identifiers assigned before true resolution.
const PSEUDO_PREFIX: &str = "pseudo:";
/// Prefix for fiat currencies carried as pseudo assets (e.g. `fiat:usd`).
const FIAT_PREFIX: &str = "fiat:";

/// Canonical asset identifier: the universal join key for an asset across
/// ledgers. Either a true canonical id (on-chain token address or designated
/// identifier) or a pseudo placeholder kept until resolution succeeds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn canonical(id: impl Into<String>) -> Self {
        AssetId(id.into())
    }

    /// Build a placeholder id from an unresolved symbol.
    pub fn pseudo(symbol: &str) -> Self {
        AssetId(format!("{}{}", PSEUDO_PREFIX, symbol.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_pseudo(&self) -> bool {
        self.0.starts_with(PSEUDO_PREFIX)
    }

    pub fn is_fiat(&self) -> bool {
        self.0.starts_with(FIAT_PREFIX)
    }

    /// Excluded from the token-holdings view: unresolved placeholders and
    /// fiat-pseudo identifiers.
    pub fn is_token(&self) -> bool {
        !self.is_pseudo() && !self.is_fiat()
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the externally seeded (symbol, network) reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMapping {
    /// Free-text symbol as reported by providers (case-insensitive).
    pub symbol: String,
    /// Network the mapping applies to (e.g. "ethereum", "solana").
    pub network: String,
    /// Canonical asset id this symbol resolves to.
    pub asset_id: AssetId,
    /// Decimal precision of the asset's raw integer amounts.
    pub decimals: u32,
    /// Fallback mapping used when no network-exact row exists.
    pub is_default: bool,
}
