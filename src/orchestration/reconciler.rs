//! Batch reconciliation: link exchange events to chain transactions.
//!
//! One run processes every unlinked deposit/withdrawal event for one user.
//! Each event degrades independently: a malformed event, an unresolvable
//! symbol, or a lost linking race becomes "no match" and the batch moves on.

use crate::db::Repository;
use crate::domain::{AssetId, EventKind, ExchangeEvent, TimeMs};
use crate::engine::{
    confidence, detect_off_ramp, select_best, AssetResolver, MatchWindows, Resolution,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Counters for one reconciliation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub events_considered: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub off_ramps_flagged: usize,
}

enum EventOutcome {
    Matched { tx_id: i64 },
    NoMatch,
}

pub struct Reconciler {
    repo: Arc<Repository>,
    windows: MatchWindows,
    fetch_cap: u32,
    off_ramp_window_ms: i64,
    // Runs for the same user are serialized; different users proceed
    // concurrently.
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(
        repo: Arc<Repository>,
        windows: MatchWindows,
        fetch_cap: u32,
        off_ramp_window_ms: i64,
    ) -> Self {
        Self {
            repo,
            windows,
            fetch_cap,
            off_ramp_window_ms,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one reconciliation pass for a user.
    ///
    /// Re-running is idempotent: already-linked events are not considered
    /// and already-flagged transactions cannot be flagged again.
    ///
    /// # Errors
    /// Returns an error only when the initial wallet/event listing fails;
    /// per-event failures are logged and counted as unmatched.
    pub async fn run_for_user(&self, user_id: &str) -> Result<ReconcileSummary, ReconcileError> {
        let lock = {
            let mut locks = self.user_locks.lock().await;
            locks.entry(user_id.to_string()).or_default().clone()
        };
        let _user_guard = lock.lock().await;

        let run_id = uuid::Uuid::new_v4();
        tracing::info!(user = user_id, run = %run_id, "starting reconciliation run");

        let wallets = self.repo.list_active_wallets(user_id).await?;
        if wallets.is_empty() {
            tracing::info!(user = user_id, run = %run_id, "no active wallets, nothing to reconcile");
            return Ok(ReconcileSummary::default());
        }

        let resolver = AssetResolver::new(self.repo.load_asset_mappings().await?);
        let events = self.repo.list_unlinked_matchable_events(user_id).await?;

        let mut summary = ReconcileSummary {
            events_considered: events.len(),
            ..Default::default()
        };

        for event in &events {
            let asset = match resolver.resolve(&event.asset_symbol, event.network_hint.as_deref()) {
                Resolution::Resolved { id, .. } => id,
                Resolution::Unresolved { pseudo } => {
                    // Pseudo assets never match by score; the exact-reference
                    // shortcut is reference-driven so it still applies.
                    tracing::debug!(
                        user = user_id,
                        event = %event.event_key,
                        symbol = %event.asset_symbol,
                        "symbol has no canonical mapping, scoring disabled"
                    );
                    pseudo
                }
            };

            match self.process_event(user_id, event, &asset).await {
                Ok(EventOutcome::Matched { tx_id }) => {
                    summary.matched += 1;
                    if event.kind == EventKind::Deposit {
                        match self.flag_off_ramp(tx_id, event, &asset).await {
                            Ok(true) => summary.off_ramps_flagged += 1,
                            Ok(false) => {}
                            Err(e) => {
                                tracing::warn!(
                                    user = user_id,
                                    event = %event.event_key,
                                    error = %e,
                                    "off-ramp scan failed, match stands"
                                );
                            }
                        }
                    }
                }
                Ok(EventOutcome::NoMatch) => summary.unmatched += 1,
                Err(e) => {
                    tracing::warn!(
                        user = user_id,
                        event = %event.event_key,
                        error = %e,
                        "event reconciliation failed, counting as unmatched"
                    );
                    summary.unmatched += 1;
                }
            }
        }

        tracing::info!(
            user = user_id,
            run = %run_id,
            considered = summary.events_considered,
            matched = summary.matched,
            unmatched = summary.unmatched,
            off_ramps = summary.off_ramps_flagged,
            "reconciliation run complete"
        );
        Ok(summary)
    }

    async fn process_event(
        &self,
        user_id: &str,
        event: &ExchangeEvent,
        asset: &AssetId,
    ) -> Result<EventOutcome, sqlx::Error> {
        // Exact claimed reference beats scoring outright.
        if let Some(claimed) = event.claimed_tx_ref.as_deref() {
            if let Some(tx) = self.repo.get_transaction_by_signature(claimed).await? {
                if tx.is_linked() {
                    // The claim points at a transaction already owned by
                    // another link; scoring could only contradict it.
                    tracing::debug!(
                        event = %event.event_key,
                        claimed,
                        "claimed transaction already linked, no match"
                    );
                    return Ok(EventOutcome::NoMatch);
                }
                if self.owned_by(user_id, tx.wallet_id.0).await? {
                    if self.repo.link_pair(tx.id, event.id, confidence(0.0)).await? {
                        return Ok(EventOutcome::Matched { tx_id: tx.id });
                    }
                    return Ok(EventOutcome::NoMatch);
                }
            }
        }

        if asset.is_pseudo() {
            return Ok(EventOutcome::NoMatch);
        }

        let Some((kind, from_ms, to_ms, window_ms)) =
            self.windows.candidate_query(event.kind, event.time_ms)
        else {
            return Ok(EventOutcome::NoMatch);
        };

        let candidates = self
            .repo
            .find_candidates(user_id, kind, from_ms, to_ms, self.fetch_cap)
            .await?;

        let Some(best) = select_best(event.amount, event.time_ms, asset, &candidates, window_ms)
        else {
            return Ok(EventOutcome::NoMatch);
        };

        if self
            .repo
            .link_pair(best.tx_id, event.id, confidence(best.score))
            .await?
        {
            tracing::debug!(
                event = %event.event_key,
                tx_id = best.tx_id,
                score = best.score,
                "linked by composite score"
            );
            Ok(EventOutcome::Matched { tx_id: best.tx_id })
        } else {
            // Lost the race to a concurrent link.
            Ok(EventOutcome::NoMatch)
        }
    }

    async fn owned_by(&self, user_id: &str, wallet_id: i64) -> Result<bool, sqlx::Error> {
        let wallets = self.repo.list_active_wallets(user_id).await?;
        Ok(wallets.iter().any(|w| w.id.0 == wallet_id))
    }

    async fn flag_off_ramp(
        &self,
        tx_id: i64,
        event: &ExchangeEvent,
        asset: &AssetId,
    ) -> Result<bool, sqlx::Error> {
        let window_end = event.time_ms.plus(self.off_ramp_window_ms);
        let sells = self
            .repo
            .list_sell_events(event.connection_id, event.time_ms, window_end)
            .await?;

        let Some(record) = detect_off_ramp(
            tx_id,
            event.time_ms,
            asset,
            &event.asset_symbol,
            &sells,
            self.off_ramp_window_ms,
        ) else {
            return Ok(false);
        };

        self.repo.insert_pending_classification(&record).await
    }
}
