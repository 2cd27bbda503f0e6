//! Domain primitives: TimeMs, ids, owning scope, direction, transaction kind.

use serde::{Deserialize, Serialize};

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Saturating subtraction of a millisecond span.
    pub fn minus(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_sub(ms))
    }

    /// Saturating addition of a millisecond span.
    pub fn plus(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_add(ms))
    }
}

/// Row id of an owned blockchain wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletId(pub i64);

/// Row id of an exchange connection (one API key / account at one exchange).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub i64);

/// The unit a flow is attributed to: a wallet XOR an exchange connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OwnerScope {
    Wallet(WalletId),
    Exchange(ConnectionId),
}

impl OwnerScope {
    pub fn is_exchange(&self) -> bool {
        matches!(self, OwnerScope::Exchange(_))
    }

    /// Stable string tag for persistence.
    pub fn kind_str(&self) -> &'static str {
        match self {
            OwnerScope::Wallet(_) => "wallet",
            OwnerScope::Exchange(_) => "exchange",
        }
    }

    pub fn raw_id(&self) -> i64 {
        match self {
            OwnerScope::Wallet(WalletId(id)) => *id,
            OwnerScope::Exchange(ConnectionId(id)) => *id,
        }
    }

    /// Reconstruct a scope from its persisted (kind, id) pair.
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "wallet" => Some(OwnerScope::Wallet(WalletId(id))),
            "exchange" => Some(OwnerScope::Exchange(ConnectionId(id))),
            _ => None,
        }
    }
}

/// Direction of a balance delta relative to the owning scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Balance increased (inbound).
    In,
    /// Balance decreased (outbound).
    Out,
}

impl Direction {
    /// Derive direction from the sign of a raw delta. Zero deltas never
    /// produce a flow, so the caller must filter them first.
    pub fn from_sign(raw: i128) -> Direction {
        if raw >= 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn sign(&self) -> i32 {
        match self {
            Direction::In => 1,
            Direction::Out => -1,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// Classification of a chain transaction or exchange record the flows came
/// from. The matcher only cares about the transfer kinds; the aggregator
/// additionally uses Deposit/Withdrawal for its exchange-scope exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    TransferIn,
    TransferOut,
    Swap,
    Deposit,
    Withdrawal,
    Trade,
    ContractCall,
    Unknown,
}

impl TxKind {
    /// Stable string tag for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::TransferIn => "transfer_in",
            TxKind::TransferOut => "transfer_out",
            TxKind::Swap => "swap",
            TxKind::Deposit => "deposit",
            TxKind::Withdrawal => "withdrawal",
            TxKind::Trade => "trade",
            TxKind::ContractCall => "contract_call",
            TxKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> TxKind {
        match s {
            "transfer_in" => TxKind::TransferIn,
            "transfer_out" => TxKind::TransferOut,
            "swap" => TxKind::Swap,
            "deposit" => TxKind::Deposit,
            "withdrawal" => TxKind::Withdrawal,
            "trade" => TxKind::Trade,
            "contract_call" => TxKind::ContractCall,
            _ => TxKind::Unknown,
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
