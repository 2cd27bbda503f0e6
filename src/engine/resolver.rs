//! Asset resolution over a snapshot of externally seeded reference data.

use crate::domain::{AssetId, AssetMapping};
use std::collections::HashMap;

/// Outcome of resolving a free-text symbol + network hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved to a canonical asset id with its decimal precision.
    Resolved { id: AssetId, decimals: u32 },
    /// No mapping known; the pseudo id is kept and the record is excluded
    /// from matching but still counted.
    Unresolved { pseudo: AssetId },
}

impl Resolution {
    pub fn resolved(&self) -> Option<(&AssetId, u32)> {
        match self {
            Resolution::Resolved { id, decimals } => Some((id, *decimals)),
            Resolution::Unresolved { .. } => None,
        }
    }
}

/// Pure resolver over a snapshot of the mapping table, no side effects.
///
/// Tiering, highest priority first:
/// 1. exact (symbol, network) mapping
/// 2. any mapping flagged default for the symbol
/// 3. any mapping for the symbol
/// 4. Unresolved
#[derive(Debug)]
pub struct AssetResolver {
    by_symbol: HashMap<String, Vec<AssetMapping>>,
}

impl AssetResolver {
    pub fn new(mappings: Vec<AssetMapping>) -> Self {
        let mut by_symbol: HashMap<String, Vec<AssetMapping>> = HashMap::new();
        for mapping in mappings {
            by_symbol
                .entry(mapping.symbol.to_lowercase())
                .or_default()
                .push(mapping);
        }
        Self { by_symbol }
    }

    pub fn resolve(&self, symbol: &str, network_hint: Option<&str>) -> Resolution {
        let Some(rows) = self.by_symbol.get(&symbol.to_lowercase()) else {
            return Resolution::Unresolved {
                pseudo: AssetId::pseudo(symbol),
            };
        };

        if let Some(network) = network_hint {
            if let Some(row) = rows
                .iter()
                .find(|m| m.network.eq_ignore_ascii_case(network))
            {
                return Resolution::Resolved {
                    id: row.asset_id.clone(),
                    decimals: row.decimals,
                };
            }
        }

        if let Some(row) = rows.iter().find(|m| m.is_default) {
            return Resolution::Resolved {
                id: row.asset_id.clone(),
                decimals: row.decimals,
            };
        }

        match rows.first() {
            Some(row) => Resolution::Resolved {
                id: row.asset_id.clone(),
                decimals: row.decimals,
            },
            None => Resolution::Unresolved {
                pseudo: AssetId::pseudo(symbol),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(symbol: &str, network: &str, id: &str, decimals: u32, default: bool) -> AssetMapping {
        AssetMapping {
            symbol: symbol.to_string(),
            network: network.to_string(),
            asset_id: AssetId::canonical(id),
            decimals,
            is_default: default,
        }
    }

    fn resolver() -> AssetResolver {
        AssetResolver::new(vec![
            mapping("USDC", "ethereum", "eth:0xusdc", 6, true),
            mapping("USDC", "solana", "sol:usdc-mint", 6, false),
            mapping("WETH", "ethereum", "eth:0xweth", 18, false),
        ])
    }

    #[test]
    fn exact_network_match_wins() {
        let r = resolver();
        let res = r.resolve("usdc", Some("solana"));
        assert_eq!(
            res.resolved().map(|(id, d)| (id.as_str().to_string(), d)),
            Some(("sol:usdc-mint".to_string(), 6))
        );
    }

    #[test]
    fn default_mapping_when_network_unknown() {
        let r = resolver();
        let res = r.resolve("USDC", Some("base"));
        assert_eq!(
            res.resolved().map(|(id, _)| id.as_str().to_string()),
            Some("eth:0xusdc".to_string())
        );
    }

    #[test]
    fn any_mapping_when_no_default() {
        let r = resolver();
        let res = r.resolve("WETH", None);
        assert_eq!(
            res.resolved().map(|(id, _)| id.as_str().to_string()),
            Some("eth:0xweth".to_string())
        );
    }

    #[test]
    fn unknown_symbol_keeps_pseudo_id() {
        let r = resolver();
        match r.resolve("SHIB", Some("ethereum")) {
            Resolution::Unresolved { pseudo } => assert_eq!(pseudo.as_str(), "pseudo:shib"),
            other => panic!("expected Unresolved, got {:?}", other),
        }
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let r = resolver();
        assert_eq!(
            r.resolve("UsDc", Some("ETHEREUM")),
            r.resolve("usdc", Some("ethereum"))
        );
    }
}
