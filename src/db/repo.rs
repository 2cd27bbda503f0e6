//! Repository layer for database operations.
//!
//! All link-field writes go through [`Repository::link_pair`], the single
//! unit of transactional consistency in the engine.

use crate::domain::{
    AssetId, AssetMapping, ChainTransaction, ConnectionId, Decimal, Direction, EventKind,
    ExchangeEvent, Flow, OwnerScope, PendingClassification, ReviewPriority, TaxCategory, TimeMs,
    Transfer, TxKind, Wallet, WalletId,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // --- wallets -----------------------------------------------------------

    /// Insert a wallet idempotently, returning its id.
    ///
    /// # Errors
    /// Returns an error if the insert or lookup fails.
    pub async fn upsert_wallet(
        &self,
        user_id: &str,
        address: &str,
        network: &str,
    ) -> Result<WalletId, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, address, network, active, created_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(user_id, address, network) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(address)
        .bind(network)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id FROM wallets WHERE user_id = ? AND address = ? AND network = ?",
        )
        .bind(user_id)
        .bind(address)
        .bind(network)
        .fetch_one(&self.pool)
        .await?;

        Ok(WalletId(row.get("id")))
    }

    /// Deactivate a wallet. Wallets are never deleted.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn deactivate_wallet(&self, wallet_id: WalletId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE wallets SET active = 0 WHERE id = ?")
            .bind(wallet_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Active wallets for a user.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_active_wallets(&self, user_id: &str) -> Result<Vec<Wallet>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, user_id, address, network, active FROM wallets WHERE user_id = ? AND active = 1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Wallet {
                id: WalletId(row.get("id")),
                user_id: row.get("user_id"),
                address: row.get("address"),
                network: row.get("network"),
                active: row.get::<i64, _>("active") != 0,
            })
            .collect())
    }

    // --- chain transactions ------------------------------------------------

    /// Insert a chain transaction with its transfers idempotently (keyed by
    /// signature). Returns the row id.
    ///
    /// # Errors
    /// Returns an error if any insert fails.
    pub async fn insert_chain_transaction(
        &self,
        signature: &str,
        time_ms: TimeMs,
        kind: TxKind,
        wallet_id: WalletId,
        transfers: &[Transfer],
    ) -> Result<i64, sqlx::Error> {
        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chain_transactions (signature, time_ms, kind, wallet_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(signature) DO NOTHING
            "#,
        )
        .bind(signature)
        .bind(time_ms.as_ms())
        .bind(kind.as_str())
        .bind(wallet_id.0)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut *db_tx)
        .await?;

        let row = sqlx::query("SELECT id FROM chain_transactions WHERE signature = ?")
            .bind(signature)
            .fetch_one(&mut *db_tx)
            .await?;
        let tx_id: i64 = row.get("id");

        // A re-insert must not duplicate transfers that are already there,
        // but a row that lost its transfers to an earlier partial write
        // gets them back.
        let existing: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chain_transfers WHERE tx_id = ?")
                .bind(tx_id)
                .fetch_one(&mut *db_tx)
                .await?;

        if existing.0 == 0 {
            for transfer in transfers {
                sqlx::query(
                    r#"
                    INSERT INTO chain_transfers (tx_id, asset_id, raw_amount, decimals, direction, amount)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(tx_id)
                .bind(transfer.asset.as_str())
                .bind(transfer.raw_amount.to_string())
                .bind(transfer.decimals as i64)
                .bind(transfer.direction.to_string())
                .bind(transfer.amount.to_canonical_string())
                .execute(&mut *db_tx)
                .await?;
            }
        }

        db_tx.commit().await?;
        Ok(tx_id)
    }

    /// Fetch one transaction by row id, with transfers.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_transaction(&self, tx_id: i64) -> Result<Option<ChainTransaction>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, signature, time_ms, kind, wallet_id, linked_event_id FROM chain_transactions WHERE id = ?",
        )
        .bind(tx_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_transaction(&row).await?)),
            None => Ok(None),
        }
    }

    /// Fetch one transaction by on-chain signature, with transfers. Used by
    /// the exact-reference shortcut.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_transaction_by_signature(
        &self,
        signature: &str,
    ) -> Result<Option<ChainTransaction>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, signature, time_ms, kind, wallet_id, linked_event_id FROM chain_transactions WHERE signature = ?",
        )
        .bind(signature)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_transaction(&row).await?)),
            None => Ok(None),
        }
    }

    /// Time-windowed, ownership-filtered, unlinked candidates of the
    /// expected kind, newest first, bounded by `fetch_cap`. Best-effort by
    /// design: histories larger than the cap are not searched exhaustively.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_candidates(
        &self,
        user_id: &str,
        kind: TxKind,
        from_ms: TimeMs,
        to_ms: TimeMs,
        fetch_cap: u32,
    ) -> Result<Vec<ChainTransaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.signature, t.time_ms, t.kind, t.wallet_id, t.linked_event_id
            FROM chain_transactions t
            JOIN wallets w ON w.id = t.wallet_id
            WHERE w.user_id = ? AND w.active = 1
              AND t.kind = ?
              AND t.time_ms >= ? AND t.time_ms <= ?
              AND t.linked_event_id IS NULL
            ORDER BY t.time_ms DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(from_ms.as_ms())
        .bind(to_ms.as_ms())
        .bind(fetch_cap as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            candidates.push(self.hydrate_transaction(row).await?);
        }
        Ok(candidates)
    }

    async fn hydrate_transaction(&self, row: &SqliteRow) -> Result<ChainTransaction, sqlx::Error> {
        let tx_id: i64 = row.get("id");
        let transfer_rows = sqlx::query(
            "SELECT asset_id, raw_amount, decimals, direction, amount FROM chain_transfers WHERE tx_id = ? ORDER BY id",
        )
        .bind(tx_id)
        .fetch_all(&self.pool)
        .await?;

        let transfers = transfer_rows
            .iter()
            .map(|t| {
                let raw: String = t.get("raw_amount");
                let amount: String = t.get("amount");
                let direction: String = t.get("direction");
                Transfer {
                    asset: AssetId::canonical(t.get::<String, _>("asset_id")),
                    raw_amount: raw.parse::<i128>().unwrap_or_default(),
                    decimals: t.get::<i64, _>("decimals") as u32,
                    direction: if direction == "out" {
                        Direction::Out
                    } else {
                        Direction::In
                    },
                    amount: Decimal::from_str(&amount).unwrap_or_default(),
                }
            })
            .collect();

        let kind: String = row.get("kind");
        Ok(ChainTransaction {
            id: tx_id,
            signature: row.get("signature"),
            time_ms: TimeMs::new(row.get("time_ms")),
            kind: TxKind::parse(&kind),
            wallet_id: WalletId(row.get("wallet_id")),
            transfers,
            linked_event_id: row.get("linked_event_id"),
        })
    }

    // --- exchange events ---------------------------------------------------

    /// Insert an exchange event idempotently (keyed by event_key). Returns
    /// the row id.
    ///
    /// # Errors
    /// Returns an error if the insert or lookup fails.
    pub async fn insert_exchange_event(&self, event: &ExchangeEvent) -> Result<i64, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO exchange_events (
                event_key, connection_id, user_id, kind, asset_symbol, network_hint,
                amount, time_ms, claimed_tx_ref, fiat_value, raw_payload, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_key) DO NOTHING
            "#,
        )
        .bind(event.event_key.as_str())
        .bind(event.connection_id.0)
        .bind(event.user_id.as_str())
        .bind(event.kind.as_str())
        .bind(event.asset_symbol.as_str())
        .bind(event.network_hint.as_deref())
        .bind(event.amount.to_canonical_string())
        .bind(event.time_ms.as_ms())
        .bind(event.claimed_tx_ref.as_deref())
        .bind(event.fiat_value.map(|v| v.to_canonical_string()))
        .bind(event.raw_payload.to_string())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id FROM exchange_events WHERE event_key = ?")
            .bind(event.event_key.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("id"))
    }

    /// Fetch one event by row id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_event(&self, event_id: i64) -> Result<Option<ExchangeEvent>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM exchange_events WHERE id = ?")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| event_from_row(&r)))
    }

    /// Unlinked deposit/withdrawal events for a user, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_unlinked_matchable_events(
        &self,
        user_id: &str,
    ) -> Result<Vec<ExchangeEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM exchange_events
            WHERE user_id = ? AND kind IN ('deposit', 'withdrawal') AND matched_tx_id IS NULL
            ORDER BY time_ms ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(event_from_row).collect())
    }

    /// Sell-type events on one connection within a time window, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_sell_events(
        &self,
        connection_id: ConnectionId,
        from_ms: TimeMs,
        to_ms: TimeMs,
    ) -> Result<Vec<ExchangeEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM exchange_events
            WHERE connection_id = ? AND kind = 'sell' AND time_ms >= ? AND time_ms < ?
            ORDER BY time_ms ASC, id ASC
            "#,
        )
        .bind(connection_id.0)
        .bind(from_ms.as_ms())
        .bind(to_ms.as_ms())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(event_from_row).collect())
    }

    // --- linking -----------------------------------------------------------

    /// Record a symmetric match between a chain transaction and an exchange
    /// event: both link fields plus the confidence, in one atomic step.
    ///
    /// Returns `false` (after rolling back) when either side is already
    /// linked; a lost race degrades to "no match", never to a half-linked
    /// pair.
    ///
    /// # Errors
    /// Returns an error if the transaction fails for any other reason.
    pub async fn link_pair(
        &self,
        tx_id: i64,
        event_id: i64,
        confidence: f64,
    ) -> Result<bool, sqlx::Error> {
        let mut db_tx = self.pool.begin().await?;

        let tx_side = sqlx::query(
            "UPDATE chain_transactions SET linked_event_id = ? WHERE id = ? AND linked_event_id IS NULL",
        )
        .bind(event_id)
        .bind(tx_id)
        .execute(&mut *db_tx)
        .await?;

        let event_side = sqlx::query(
            "UPDATE exchange_events SET matched_tx_id = ?, match_confidence = ? WHERE id = ? AND matched_tx_id IS NULL",
        )
        .bind(tx_id)
        .bind(confidence)
        .bind(event_id)
        .execute(&mut *db_tx)
        .await?;

        if tx_side.rows_affected() == 1 && event_side.rows_affected() == 1 {
            db_tx.commit().await?;
            Ok(true)
        } else {
            db_tx.rollback().await?;
            Ok(false)
        }
    }

    // --- flows -------------------------------------------------------------

    /// Insert flows idempotently (keyed by flow_key). Returns how many were
    /// actually new.
    ///
    /// # Errors
    /// Returns an error if any insert fails.
    pub async fn insert_flows(&self, flows: &[Flow]) -> Result<usize, sqlx::Error> {
        let mut inserted = 0;
        for flow in flows {
            let result = sqlx::query(
                r#"
                INSERT INTO flows (
                    flow_key, tx_ref, tx_kind, time_ms, scope_kind, scope_id,
                    asset_id, decimals, raw_amount, amount, direction, is_fee,
                    fiat_value, price_at_execution, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(flow_key) DO NOTHING
                "#,
            )
            .bind(flow.flow_key.as_str())
            .bind(flow.tx_ref.as_str())
            .bind(flow.tx_kind.as_str())
            .bind(flow.time_ms.as_ms())
            .bind(flow.scope.kind_str())
            .bind(flow.scope.raw_id())
            .bind(flow.asset.as_str())
            .bind(flow.decimals as i64)
            .bind(flow.raw_amount.to_string())
            .bind(flow.amount.to_canonical_string())
            .bind(flow.direction.to_string())
            .bind(flow.is_fee)
            .bind(flow.fiat_value.map(|v| v.to_canonical_string()))
            .bind(flow.price_at_execution.map(|v| v.to_canonical_string()))
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Flows for a set of owning scopes, optionally time-windowed, oldest
    /// first. Read-only input for the portfolio aggregator.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_flows(
        &self,
        scopes: &[OwnerScope],
        from_ms: Option<TimeMs>,
        to_ms: Option<TimeMs>,
    ) -> Result<Vec<Flow>, sqlx::Error> {
        let from_ms = from_ms.unwrap_or(TimeMs::new(0)).as_ms();
        let to_ms = to_ms.unwrap_or(TimeMs::new(i64::MAX)).as_ms();

        let mut flows = Vec::new();
        for scope in scopes {
            let rows = sqlx::query(
                r#"
                SELECT * FROM flows
                WHERE scope_kind = ? AND scope_id = ? AND time_ms >= ? AND time_ms <= ?
                ORDER BY time_ms ASC, id ASC
                "#,
            )
            .bind(scope.kind_str())
            .bind(scope.raw_id())
            .bind(from_ms)
            .bind(to_ms)
            .fetch_all(&self.pool)
            .await?;

            flows.extend(rows.iter().map(flow_from_row));
        }

        flows.sort_by_key(|f| f.time_ms);
        Ok(flows)
    }

    /// Flows still lacking a fiat value, for the backfill pass.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_unpriced_flows(&self) -> Result<Vec<Flow>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM flows WHERE fiat_value IS NULL ORDER BY time_ms ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(flow_from_row).collect())
    }

    /// Back-fill value fields on one flow. The only permitted mutation of a
    /// persisted flow.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn set_flow_value(
        &self,
        flow_key: &str,
        fiat_value: Decimal,
        price_at_execution: Option<Decimal>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE flows SET fiat_value = ?, price_at_execution = ? WHERE flow_key = ? AND fiat_value IS NULL",
        )
        .bind(fiat_value.to_canonical_string())
        .bind(price_at_execution.map(|p| p.to_canonical_string()))
        .bind(flow_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- asset mappings ----------------------------------------------------

    /// Seed or update one mapping row.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert_asset_mapping(&self, mapping: &AssetMapping) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO asset_mappings (symbol, network, asset_id, decimals, is_default)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(symbol, network) DO UPDATE SET
                asset_id = excluded.asset_id,
                decimals = excluded.decimals,
                is_default = excluded.is_default
            "#,
        )
        .bind(mapping.symbol.to_lowercase())
        .bind(mapping.network.to_lowercase())
        .bind(mapping.asset_id.as_str())
        .bind(mapping.decimals as i64)
        .bind(mapping.is_default)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Snapshot of the whole mapping table for the resolver.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn load_asset_mappings(&self) -> Result<Vec<AssetMapping>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT symbol, network, asset_id, decimals, is_default FROM asset_mappings ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AssetMapping {
                symbol: row.get("symbol"),
                network: row.get("network"),
                asset_id: AssetId::canonical(row.get::<String, _>("asset_id")),
                decimals: row.get::<i64, _>("decimals") as u32,
                is_default: row.get::<i64, _>("is_default") != 0,
            })
            .collect())
    }

    // --- review records ----------------------------------------------------

    /// Insert a review record keyed by the matched transaction. Returns
    /// `false` when the transaction is already flagged (idempotent re-runs).
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_pending_classification(
        &self,
        record: &PendingClassification,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO pending_classifications (
                matched_tx_id, trigger_event_id, category, priority, estimated_value, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(matched_tx_id) DO NOTHING
            "#,
        )
        .bind(record.matched_tx_id)
        .bind(record.trigger_event_id)
        .bind(record.category.as_str())
        .bind(record.priority.as_str())
        .bind(record.estimated_value.map(|v| v.to_canonical_string()))
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All review records, for the review-queue surface.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_pending_classifications(
        &self,
    ) -> Result<Vec<PendingClassification>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT matched_tx_id, trigger_event_id, category, priority, estimated_value FROM pending_classifications ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let priority: String = row.get("priority");
                let estimated: Option<String> = row.get("estimated_value");
                PendingClassification {
                    matched_tx_id: row.get("matched_tx_id"),
                    trigger_event_id: row.get("trigger_event_id"),
                    category: TaxCategory::DisposalSale,
                    priority: match priority.as_str() {
                        "high" => ReviewPriority::High,
                        "normal" => ReviewPriority::Normal,
                        _ => ReviewPriority::Low,
                    },
                    estimated_value: estimated.and_then(|s| Decimal::from_str(&s).ok()),
                }
            })
            .collect())
    }
}

fn event_from_row(row: &SqliteRow) -> ExchangeEvent {
    let kind: String = row.get("kind");
    let amount: String = row.get("amount");
    let fiat_value: Option<String> = row.get("fiat_value");
    let raw_payload: String = row.get("raw_payload");

    ExchangeEvent {
        id: row.get("id"),
        event_key: row.get("event_key"),
        connection_id: ConnectionId(row.get("connection_id")),
        user_id: row.get("user_id"),
        kind: EventKind::parse(&kind),
        asset_symbol: row.get("asset_symbol"),
        network_hint: row.get("network_hint"),
        amount: Decimal::from_str(&amount).unwrap_or_default(),
        time_ms: TimeMs::new(row.get("time_ms")),
        claimed_tx_ref: row.get("claimed_tx_ref"),
        fiat_value: fiat_value.and_then(|s| Decimal::from_str(&s).ok()),
        raw_payload: serde_json::from_str(&raw_payload).unwrap_or(serde_json::Value::Null),
        matched_tx_id: row.get("matched_tx_id"),
        match_confidence: row.get("match_confidence"),
    }
}

fn flow_from_row(row: &SqliteRow) -> Flow {
    let tx_kind: String = row.get("tx_kind");
    let scope_kind: String = row.get("scope_kind");
    let raw_amount: String = row.get("raw_amount");
    let amount: String = row.get("amount");
    let direction: String = row.get("direction");
    let fiat_value: Option<String> = row.get("fiat_value");
    let price: Option<String> = row.get("price_at_execution");

    Flow {
        flow_key: row.get("flow_key"),
        tx_ref: row.get("tx_ref"),
        tx_kind: TxKind::parse(&tx_kind),
        time_ms: TimeMs::new(row.get("time_ms")),
        scope: OwnerScope::from_parts(&scope_kind, row.get("scope_id"))
            .unwrap_or(OwnerScope::Wallet(WalletId(row.get("scope_id")))),
        asset: AssetId::canonical(row.get::<String, _>("asset_id")),
        decimals: row.get::<i64, _>("decimals") as u32,
        raw_amount: raw_amount.parse::<i128>().unwrap_or_default(),
        amount: Decimal::from_str(&amount).unwrap_or_default(),
        direction: if direction == "out" {
            Direction::Out
        } else {
            Direction::In
        },
        is_fee: row.get("is_fee"),
        fiat_value: fiat_value.and_then(|s| Decimal::from_str(&s).ok()),
        price_at_execution: price.and_then(|s| Decimal::from_str(&s).ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn usdx() -> AssetId {
        AssetId::canonical("eth:0xusdx")
    }

    fn transfer(raw: i128) -> Transfer {
        Transfer::from_raw(usdx(), raw, 6).unwrap()
    }

    fn event(key_suffix: &str, kind: EventKind, time_ms: i64) -> ExchangeEvent {
        ExchangeEvent {
            id: 0,
            event_key: format!("1:{}", key_suffix),
            connection_id: ConnectionId(1),
            user_id: "user-1".to_string(),
            kind,
            asset_symbol: "USDX".to_string(),
            network_hint: Some("ethereum".to_string()),
            amount: Decimal::from_str("5").unwrap(),
            time_ms: TimeMs::new(time_ms),
            claimed_tx_ref: None,
            fiat_value: None,
            raw_payload: serde_json::json!({"provider": "test"}),
            matched_tx_id: None,
            match_confidence: None,
        }
    }

    #[tokio::test]
    async fn test_wallet_upsert_and_deactivate() {
        let (repo, _temp) = setup_test_db().await;

        let id1 = repo.upsert_wallet("user-1", "0xabc", "ethereum").await.unwrap();
        let id2 = repo.upsert_wallet("user-1", "0xabc", "ethereum").await.unwrap();
        assert_eq!(id1, id2, "upsert must be idempotent");

        let wallets = repo.list_active_wallets("user-1").await.unwrap();
        assert_eq!(wallets.len(), 1);

        repo.deactivate_wallet(id1).await.unwrap();
        let wallets = repo.list_active_wallets("user-1").await.unwrap();
        assert!(wallets.is_empty(), "deactivated wallets drop out of the list");
    }

    #[tokio::test]
    async fn test_insert_transaction_idempotent_with_transfers() {
        let (repo, _temp) = setup_test_db().await;
        let wallet = repo.upsert_wallet("user-1", "0xabc", "ethereum").await.unwrap();

        let id1 = repo
            .insert_chain_transaction("0xsig1", TimeMs::new(1000), TxKind::TransferOut, wallet, &[transfer(-5_000_000)])
            .await
            .unwrap();
        let id2 = repo
            .insert_chain_transaction("0xsig1", TimeMs::new(1000), TxKind::TransferOut, wallet, &[transfer(-5_000_000)])
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let tx = repo.get_transaction(id1).await.unwrap().unwrap();
        assert_eq!(tx.transfers.len(), 1, "re-insert must not duplicate transfers");
        assert_eq!(tx.transfers[0].amount.to_canonical_string(), "5");
        assert_eq!(tx.transfers[0].raw_amount, -5_000_000);
    }

    #[tokio::test]
    async fn test_reinsert_restores_missing_transfers() {
        let (repo, _temp) = setup_test_db().await;
        let wallet = repo.upsert_wallet("user-1", "0xabc", "ethereum").await.unwrap();

        // A row that exists without its transfers (an interrupted earlier
        // write) must be repaired by the next ingest of the same signature.
        let id1 = repo
            .insert_chain_transaction("0xsig1", TimeMs::new(1000), TxKind::TransferOut, wallet, &[])
            .await
            .unwrap();
        let id2 = repo
            .insert_chain_transaction("0xsig1", TimeMs::new(1000), TxKind::TransferOut, wallet, &[transfer(-5_000_000)])
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let tx = repo.get_transaction(id1).await.unwrap().unwrap();
        assert_eq!(tx.transfers.len(), 1);
        assert_eq!(tx.transfers[0].amount.to_canonical_string(), "5");
    }

    #[tokio::test]
    async fn test_find_candidates_filters_and_caps() {
        let (repo, _temp) = setup_test_db().await;
        let wallet = repo.upsert_wallet("user-1", "0xabc", "ethereum").await.unwrap();
        let other_wallet = repo.upsert_wallet("user-2", "0xdef", "ethereum").await.unwrap();

        for i in 0..5 {
            repo.insert_chain_transaction(
                &format!("0xsig{}", i),
                TimeMs::new(1000 + i),
                TxKind::TransferOut,
                wallet,
                &[transfer(-5_000_000)],
            )
            .await
            .unwrap();
        }
        // Wrong kind, wrong owner, outside window: all excluded.
        repo.insert_chain_transaction("0xin", TimeMs::new(1002), TxKind::TransferIn, wallet, &[])
            .await
            .unwrap();
        repo.insert_chain_transaction("0xother", TimeMs::new(1002), TxKind::TransferOut, other_wallet, &[])
            .await
            .unwrap();
        repo.insert_chain_transaction("0xlate", TimeMs::new(9000), TxKind::TransferOut, wallet, &[])
            .await
            .unwrap();

        let candidates = repo
            .find_candidates("user-1", TxKind::TransferOut, TimeMs::new(0), TimeMs::new(2000), 3)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 3, "fetch cap applies");
        assert!(candidates.windows(2).all(|w| w[0].time_ms >= w[1].time_ms), "newest first");
    }

    #[tokio::test]
    async fn test_link_pair_is_atomic_and_symmetric() {
        let (repo, _temp) = setup_test_db().await;
        let wallet = repo.upsert_wallet("user-1", "0xabc", "ethereum").await.unwrap();
        let tx_id = repo
            .insert_chain_transaction("0xsig1", TimeMs::new(1000), TxKind::TransferOut, wallet, &[transfer(-5_000_000)])
            .await
            .unwrap();
        let event_id = repo
            .insert_exchange_event(&event("dep-1", EventKind::Deposit, 2000))
            .await
            .unwrap();

        let linked = repo.link_pair(tx_id, event_id, 0.95).await.unwrap();
        assert!(linked);

        let tx = repo.get_transaction(tx_id).await.unwrap().unwrap();
        let ev = repo.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(tx.linked_event_id, Some(event_id));
        assert_eq!(ev.matched_tx_id, Some(tx_id));
        assert_eq!(ev.match_confidence, Some(0.95));
    }

    #[tokio::test]
    async fn test_link_pair_refuses_double_link() {
        let (repo, _temp) = setup_test_db().await;
        let wallet = repo.upsert_wallet("user-1", "0xabc", "ethereum").await.unwrap();
        let tx_id = repo
            .insert_chain_transaction("0xsig1", TimeMs::new(1000), TxKind::TransferOut, wallet, &[transfer(-5_000_000)])
            .await
            .unwrap();
        let event_a = repo
            .insert_exchange_event(&event("dep-a", EventKind::Deposit, 2000))
            .await
            .unwrap();
        let event_b = repo
            .insert_exchange_event(&event("dep-b", EventKind::Deposit, 2100))
            .await
            .unwrap();

        assert!(repo.link_pair(tx_id, event_a, 1.0).await.unwrap());
        assert!(!repo.link_pair(tx_id, event_b, 1.0).await.unwrap());

        // The losing side must be left fully unlinked, not half-linked.
        let ev_b = repo.get_event(event_b).await.unwrap().unwrap();
        assert!(ev_b.matched_tx_id.is_none());
        assert!(ev_b.match_confidence.is_none());
    }

    #[tokio::test]
    async fn test_event_roundtrip_preserves_payload() {
        let (repo, _temp) = setup_test_db().await;
        let mut ev = event("dep-1", EventKind::Deposit, 2000);
        ev.claimed_tx_ref = Some("0xsig1".to_string());
        ev.fiat_value = Some(Decimal::from_str("123.45").unwrap());

        let id = repo.insert_exchange_event(&ev).await.unwrap();
        let stored = repo.get_event(id).await.unwrap().unwrap();

        assert_eq!(stored.kind, EventKind::Deposit);
        assert_eq!(stored.claimed_tx_ref.as_deref(), Some("0xsig1"));
        assert_eq!(stored.fiat_value, Some(Decimal::from_str("123.45").unwrap()));
        assert_eq!(stored.raw_payload["provider"], "test");
    }

    #[tokio::test]
    async fn test_flows_idempotent_insert_and_backfill() {
        let (repo, _temp) = setup_test_db().await;

        let flow = Flow::from_raw_delta(
            "0xsig1",
            TxKind::Swap,
            TimeMs::new(1000),
            OwnerScope::Wallet(WalletId(1)),
            usdx(),
            5_000_000,
            6,
            false,
        )
        .unwrap();

        assert_eq!(repo.insert_flows(&[flow.clone()]).await.unwrap(), 1);
        assert_eq!(repo.insert_flows(&[flow.clone()]).await.unwrap(), 0);

        let unpriced = repo.list_unpriced_flows().await.unwrap();
        assert_eq!(unpriced.len(), 1);

        repo.set_flow_value(
            &flow.flow_key,
            Decimal::from_str("5").unwrap(),
            Some(Decimal::from_str("1").unwrap()),
        )
        .await
        .unwrap();

        assert!(repo.list_unpriced_flows().await.unwrap().is_empty());
        let flows = repo
            .query_flows(&[OwnerScope::Wallet(WalletId(1))], None, None)
            .await
            .unwrap();
        assert_eq!(flows[0].fiat_value, Some(Decimal::from_str("5").unwrap()));
        assert_eq!(flows[0].raw_amount, 5_000_000);
    }

    #[tokio::test]
    async fn test_asset_mapping_snapshot() {
        let (repo, _temp) = setup_test_db().await;

        repo.upsert_asset_mapping(&AssetMapping {
            symbol: "USDX".to_string(),
            network: "Ethereum".to_string(),
            asset_id: usdx(),
            decimals: 6,
            is_default: true,
        })
        .await
        .unwrap();

        let mappings = repo.load_asset_mappings().await.unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].symbol, "usdx");
        assert!(mappings[0].is_default);
    }

    #[tokio::test]
    async fn test_pending_classification_keyed_by_matched_tx() {
        let (repo, _temp) = setup_test_db().await;
        let wallet = repo.upsert_wallet("user-1", "0xabc", "ethereum").await.unwrap();
        let tx_id = repo
            .insert_chain_transaction("0xsig1", TimeMs::new(1000), TxKind::TransferOut, wallet, &[])
            .await
            .unwrap();
        let event_id = repo
            .insert_exchange_event(&event("sell-1", EventKind::Sell, 3000))
            .await
            .unwrap();

        let record = PendingClassification {
            matched_tx_id: tx_id,
            trigger_event_id: event_id,
            category: TaxCategory::DisposalSale,
            priority: ReviewPriority::Normal,
            estimated_value: Some(Decimal::from_str("500").unwrap()),
        };

        assert!(repo.insert_pending_classification(&record).await.unwrap());
        assert!(!repo.insert_pending_classification(&record).await.unwrap());
        assert_eq!(repo.list_pending_classifications().await.unwrap().len(), 1);
    }
}
