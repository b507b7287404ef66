use bookstore::config::{database, settings};
use bookstore::core::transaction::sync_pending_transactions;
use bookstore::errors::Result;
use bookstore::terminal::HttpTerminal;
use dotenvy::dotenv;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the main application configuration
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    info!(
        tax_rate_bps = settings.tax_rate_bps,
        device_id = %settings.terminal.device_id,
        "Configuration loaded"
    );

    // 4. Initialize database and seed reason codes
    let db = database::create_connection(&settings::database_url())
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    database::seed_adjustment_reasons(&db, &settings.adjustment_reasons)
        .await
        .inspect(|()| info!("Adjustment reasons seeded"))?;

    // 5. Payment terminal; the token is read here, directly before use
    let terminal = HttpTerminal::new(&settings.terminal, settings::terminal_access_token()?)?;

    // 6. Reconcile pending transactions until interrupted
    let mut ticker = tokio::time::interval(settings.poller.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?settings.poller.interval(), "Transaction reconciler started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                match sync_pending_transactions(&db, &terminal, &settings.terminal).await {
                    Ok(0) => {}
                    Ok(finalised) => info!(finalised, "Pending transactions reconciled"),
                    Err(e) => warn!(error = %e, "Reconciler sweep failed"),
                }
            }
        }
    }

    db.close().await?;
    Ok(())
}
