//! Exchange-side ledger events, normalized at the ingestion boundary.
//!
//! Provider payloads arrive loosely typed; everything downstream of this
//! module sees only the canonical shape. The matcher never branches on
//! provider-specific field names.

use crate::domain::{ConnectionId, Decimal, TimeMs};
use serde::{Deserialize, Serialize};

/// Kind of an exchange-reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Deposit,
    Withdrawal,
    Buy,
    Sell,
    Other,
}

impl EventKind {
    /// Normalize a provider-reported type string. Providers spell the same
    /// concepts a dozen ways; this is the single place that knows about it.
    pub fn parse(raw: &str) -> EventKind {
        match raw.to_ascii_lowercase().as_str() {
            "deposit" | "crypto_deposit" | "transfer_in" | "receive" => EventKind::Deposit,
            "withdrawal" | "withdraw" | "crypto_withdrawal" | "transfer_out" | "send" => {
                EventKind::Withdrawal
            }
            "buy" | "market_buy" | "limit_buy" => EventKind::Buy,
            "sell" | "market_sell" | "limit_sell" => EventKind::Sell,
            _ => EventKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Deposit => "deposit",
            EventKind::Withdrawal => "withdrawal",
            EventKind::Buy => "buy",
            EventKind::Sell => "sell",
            EventKind::Other => "other",
        }
    }

    /// Deposits and withdrawals are the two kinds the matcher reconciles
    /// against the chain ledger.
    pub fn is_matchable(&self) -> bool {
        matches!(self, EventKind::Deposit | EventKind::Withdrawal)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, EventKind::Sell)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An exchange-reported ledger event.
///
/// `matched_tx_id` + `match_confidence` are the persisted (legacy) side of
/// the symmetric link; both are written only by the repository's atomic
/// pair-link, and confidence is only ever set together with the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeEvent {
    /// Database row id.
    pub id: i64,
    /// Stable unique key: the provider's external id when present, otherwise
    /// a hash of deterministic fields.
    pub event_key: String,
    /// Source exchange connection.
    pub connection_id: ConnectionId,
    /// Owning user.
    pub user_id: String,
    /// Normalized event kind.
    pub kind: EventKind,
    /// Free-text asset symbol as reported by the provider.
    pub asset_symbol: String,
    /// Network hint, when the provider reports one.
    pub network_hint: Option<String>,
    /// Reported amount (exchange ledgers are fuzzy; treated as approximate).
    pub amount: Decimal,
    /// Reported timestamp in milliseconds.
    pub time_ms: TimeMs,
    /// Chain transaction hash the provider claims this event corresponds to.
    pub claimed_tx_ref: Option<String>,
    /// Fiat value reported by the provider, when available.
    pub fiat_value: Option<Decimal>,
    /// Raw provider payload, kept for audit.
    pub raw_payload: serde_json::Value,
    /// Matched chain transaction, if linked.
    pub matched_tx_id: Option<i64>,
    /// Match confidence in [0, 1]; set only when a link exists.
    pub match_confidence: Option<f64>,
}

impl ExchangeEvent {
    pub fn is_linked(&self) -> bool {
        self.matched_tx_id.is_some()
    }

    /// Compute the stable unique key for an event.
    ///
    /// Priority: provider external id (if present) > 128-bit truncated
    /// SHA-256 over deterministic fields.
    pub fn compute_event_key(
        connection_id: ConnectionId,
        external_id: Option<&str>,
        kind: EventKind,
        asset_symbol: &str,
        amount: &Decimal,
        time_ms: TimeMs,
    ) -> String {
        if let Some(ext) = external_id.map(str::trim).filter(|s| !s.is_empty()) {
            return format!("{}:{}", connection_id.0, ext.to_lowercase());
        }

        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hasher.update(connection_id.0.to_le_bytes());
        hash_var(&mut hasher, kind.as_str());
        hash_var(&mut hasher, &asset_symbol.to_lowercase());
        hash_var(&mut hasher, &amount.to_canonical_string());
        hasher.update(time_ms.as_ms().to_le_bytes());

        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }
}
