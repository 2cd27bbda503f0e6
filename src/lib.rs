pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod pricing;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    AssetId, AssetMapping, ChainTransaction, ConnectionId, Decimal, Direction, EventKind,
    ExchangeEvent, Flow, OwnerScope, PendingClassification, TimeMs, Transfer, TxKind, Wallet,
    WalletId,
};
pub use engine::{aggregate, AssetPosition, AssetResolver, MatchWindows};
pub use error::AppError;
pub use orchestration::{FlowIngestor, ReconcileSummary, Reconciler};
pub use pricing::{PriceSource, StaticPriceSource};
