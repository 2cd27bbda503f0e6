//! Ingestion: persist raw records and extract their flows in one pass.

use crate::db::Repository;
use crate::domain::{
    Decimal, EventKind, ExchangeEvent, Flow, OwnerScope, TimeMs, Transfer, TxKind, WalletId,
};
use crate::engine::{
    attribute_values, extract_flows, AssetResolver, BalanceDeltaPayload, Resolution, TxContext,
};
use crate::pricing::{PriceSource, PriceSourceError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Price(#[from] PriceSourceError),
}

/// Outcome of ingesting one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestResult {
    /// Row id of the persisted transaction or event.
    pub record_id: i64,
    /// Flows extracted from the record.
    pub flows_extracted: usize,
    /// Flows actually new (idempotent re-ingest inserts zero).
    pub flows_new: usize,
}

#[derive(Clone)]
pub struct FlowIngestor {
    repo: Arc<Repository>,
}

impl FlowIngestor {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Persist one chain transaction and its extracted flows.
    ///
    /// `total_value` is the indexer's fiat estimate for the whole
    /// transaction; zero leaves the flows unpriced for a later backfill.
    ///
    /// # Errors
    /// Returns an error if persistence fails.
    pub async fn ingest_chain_transaction(
        &self,
        wallet_id: WalletId,
        signature: &str,
        time_ms: TimeMs,
        kind: TxKind,
        payload: &BalanceDeltaPayload,
        total_value: Decimal,
    ) -> Result<IngestResult, IngestError> {
        let mut transfers = Vec::new();
        for delta in payload
            .native
            .iter()
            .chain(payload.secondary.iter())
            .filter(|d| d.raw_delta != 0)
        {
            match Transfer::from_raw(delta.asset.clone(), delta.raw_delta, delta.decimals) {
                Ok(t) => transfers.push(t),
                Err(e) => {
                    tracing::warn!(
                        signature,
                        asset = %delta.asset,
                        error = %e,
                        "skipping unrepresentable transfer"
                    );
                }
            }
        }

        let tx_id = self
            .repo
            .insert_chain_transaction(signature, time_ms, kind, wallet_id, &transfers)
            .await?;

        let ctx = TxContext {
            tx_ref: signature.to_string(),
            kind,
            time_ms,
        };
        let mut flows = extract_flows(&ctx, OwnerScope::Wallet(wallet_id), payload);
        attribute_values(&mut flows, kind, total_value);
        let flows_new = self.repo.insert_flows(&flows).await?;

        Ok(IngestResult {
            record_id: tx_id,
            flows_extracted: flows.len(),
            flows_new,
        })
    }

    /// Persist one normalized exchange event and its flow.
    ///
    /// Deposits and buys are inbound to the connection scope, withdrawals
    /// and sells outbound. `Other` events are persisted without a flow.
    ///
    /// # Errors
    /// Returns an error if persistence fails.
    pub async fn ingest_exchange_event(
        &self,
        event: &ExchangeEvent,
        resolver: &AssetResolver,
    ) -> Result<IngestResult, IngestError> {
        let event_id = self.repo.insert_exchange_event(event).await?;

        let sign: i128 = match event.kind {
            EventKind::Deposit | EventKind::Buy => 1,
            EventKind::Withdrawal | EventKind::Sell => -1,
            EventKind::Other => {
                return Ok(IngestResult {
                    record_id: event_id,
                    flows_extracted: 0,
                    flows_new: 0,
                })
            }
        };

        let (asset, decimals) =
            match resolver.resolve(&event.asset_symbol, event.network_hint.as_deref()) {
                Resolution::Resolved { id, decimals } => (id, decimals),
                Resolution::Unresolved { pseudo } => {
                    // Keep the flow anyway; pseudo assets stay countable even
                    // though they never match or aggregate into the portfolio.
                    (pseudo, event.amount.inner().scale())
                }
            };

        let Some(raw) = event.amount.abs().to_raw_units(decimals) else {
            tracing::warn!(
                event = %event.event_key,
                amount = %event.amount,
                decimals,
                "event amount not representable in raw units, no flow extracted"
            );
            return Ok(IngestResult {
                record_id: event_id,
                flows_extracted: 0,
                flows_new: 0,
            });
        };

        let tx_kind = match event.kind {
            EventKind::Deposit => TxKind::Deposit,
            EventKind::Withdrawal => TxKind::Withdrawal,
            _ => TxKind::Trade,
        };

        match Flow::from_raw_delta(
            &event.event_key,
            tx_kind,
            event.time_ms,
            OwnerScope::Exchange(event.connection_id),
            asset,
            raw * sign,
            decimals,
            false,
        ) {
            Ok(mut flow) => {
                flow.fiat_value = event.fiat_value;
                let flows_new = self.repo.insert_flows(std::slice::from_ref(&flow)).await?;
                Ok(IngestResult {
                    record_id: event_id,
                    flows_extracted: 1,
                    flows_new,
                })
            }
            Err(e) => {
                tracing::warn!(event = %event.event_key, error = %e, "no flow extracted");
                Ok(IngestResult {
                    record_id: event_id,
                    flows_extracted: 0,
                    flows_new: 0,
                })
            }
        }
    }

    /// Price every unpriced flow the source knows about. Flows the source
    /// has no price for stay unpriced and are retried on the next pass.
    ///
    /// # Errors
    /// Returns an error if listing the unpriced flows fails; per-flow
    /// lookup failures are logged and skipped.
    pub async fn backfill_flow_values(
        &self,
        source: &dyn PriceSource,
    ) -> Result<usize, IngestError> {
        let unpriced = self.repo.list_unpriced_flows().await?;
        let mut priced = 0;

        for flow in &unpriced {
            let price = match source.price_at(&flow.asset, flow.time_ms).await {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(flow = %flow.flow_key, error = %e, "price lookup failed");
                    continue;
                }
            };

            let value = price * flow.amount;
            self.repo
                .set_flow_value(&flow.flow_key, value, Some(price))
                .await?;
            priced += 1;
        }

        Ok(priced)
    }
}
