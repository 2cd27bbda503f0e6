use chainrecon::{config::Config, db::init_db, Reconciler, Repository};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let reconciler = Reconciler::new(
        repo,
        config.match_windows(),
        config.candidate_fetch_cap,
        config.off_ramp_window_ms,
    );

    if config.reconcile_users.is_empty() {
        tracing::warn!("RECONCILE_USERS is empty, nothing to do");
        return;
    }

    let mut failed = false;
    for user in &config.reconcile_users {
        match reconciler.run_for_user(user).await {
            Ok(summary) => {
                tracing::info!(
                    user = user.as_str(),
                    considered = summary.events_considered,
                    matched = summary.matched,
                    unmatched = summary.unmatched,
                    off_ramps = summary.off_ramps_flagged,
                    "batch complete"
                );
            }
            Err(e) => {
                tracing::error!(user = user.as_str(), error = %e, "batch failed");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
