//! Price source abstraction for back-filling fiat values on flows.

use crate::domain::{AssetId, Decimal, TimeMs};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Historical price lookup for one asset at one point in time.
///
/// Implementations are best-effort: `Ok(None)` means "no price known", and
/// the backfill pass leaves the flow unpriced for a later attempt.
#[async_trait]
pub trait PriceSource: Send + Sync + fmt::Debug {
    /// Fiat price of one unit of `asset` at `at_ms`, if known.
    async fn price_at(
        &self,
        asset: &AssetId,
        at_ms: TimeMs,
    ) -> Result<Option<Decimal>, PriceSourceError>;
}

#[derive(Debug, Error)]
pub enum PriceSourceError {
    #[error("Price lookup failed: {0}")]
    Lookup(String),
}

/// In-memory price table. Used as the test double and for seeded backfills.
#[derive(Debug, Default)]
pub struct StaticPriceSource {
    prices: HashMap<String, Decimal>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, asset: &AssetId, price: Decimal) -> Self {
        self.prices.insert(asset.as_str().to_string(), price);
        self
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn price_at(
        &self,
        asset: &AssetId,
        _at_ms: TimeMs,
    ) -> Result<Option<Decimal>, PriceSourceError> {
        Ok(self.prices.get(asset.as_str()).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn static_source_returns_seeded_prices() {
        let usdc = AssetId::canonical("eth:0xusdc");
        let weth = AssetId::canonical("eth:0xweth");
        let source = StaticPriceSource::new().with_price(&usdc, Decimal::from_str("1").unwrap());

        let price = source.price_at(&usdc, TimeMs::new(1000)).await.unwrap();
        assert_eq!(price, Some(Decimal::from_str("1").unwrap()));

        let missing = source.price_at(&weth, TimeMs::new(1000)).await.unwrap();
        assert!(missing.is_none());
    }
}
