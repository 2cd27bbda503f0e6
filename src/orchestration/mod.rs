//! Orchestration: ingestion pipeline and the batch reconciler.

pub mod ingest;
pub mod reconciler;

pub use ingest::{FlowIngestor, IngestError, IngestResult};
pub use reconciler::{ReconcileError, ReconcileSummary, Reconciler};
