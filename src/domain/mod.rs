//! Domain types for the cross-ledger reconciliation engine.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: TimeMs, ids, OwnerScope, Direction, TxKind
//! - Canonical asset identifiers and mapping reference rows
//! - ChainTransaction / ExchangeEvent / Flow with stable idempotence keys
//! - Review records for the manual classification queue

pub mod asset;
pub mod classification;
pub mod decimal;
pub mod event;
pub mod flow;
pub mod primitives;
pub mod transaction;

pub use asset::{AssetId, AssetMapping};
pub use classification::{PendingClassification, ReviewPriority, TaxCategory};
pub use decimal::Decimal;
pub use event::{EventKind, ExchangeEvent};
pub use flow::Flow;
pub use primitives::{ConnectionId, Direction, OwnerScope, TimeMs, TxKind, WalletId};
pub use transaction::{ChainTransaction, Transfer, Wallet};
