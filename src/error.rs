use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Reconcile(#[from] crate::orchestration::ReconcileError),
    #[error(transparent)]
    Ingest(#[from] crate::orchestration::IngestError),
}
