// Entry point of the moderation sweeper.
//
// **Architecture Overview:**
// - `core/` = Business logic (storage-agnostic)
// - `infra/` = Implementations of core traits (SQLite, in-memory)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Periodically escalate stale or overloaded cases until Ctrl+C

use chrono::Utc;
use trust_moderation::config::AppConfig;
use trust_moderation::core::moderation::{ModerationPolicyService, ModerationService};
use trust_moderation::infra::moderation::SqliteModerationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database = %config.database_url,
        interval_secs = config.sweep_interval.as_secs(),
        "Starting moderation sweeper"
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let store = SqliteModerationStore::new(&config.database_url).await?;
    let policy = ModerationPolicyService::new(config.policy.clone());
    let service = ModerationService::new(store, policy);

    // ========================================================================
    // SWEEP LOOP
    // ========================================================================

    let mut ticker = tokio::time::interval(config.sweep_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                tracing::debug!("Starting escalation sweep...");

                match service.sweep_escalations(now).await {
                    Ok(escalated) if escalated.is_empty() => {
                        tracing::debug!("No cases needed escalation");
                    }
                    Ok(escalated) => {
                        tracing::info!(count = escalated.len(), "Escalated moderation cases");
                    }
                    Err(err) => tracing::warn!("Escalation sweep failed: {}", err),
                }

                match service.overdue_reports(now).await {
                    Ok(overdue) if !overdue.is_empty() => {
                        tracing::warn!(count = overdue.len(), "Reports waiting past their review deadline");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!("Overdue report check failed: {}", err),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down moderation sweeper");
                break;
            }
        }
    }

    Ok(())
}
