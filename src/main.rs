use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use traceo_match::config::Settings;
use traceo_match::core::{MatchEngine, WorkerPool};
use traceo_match::models::Admission;
use traceo_match::services::{GeminiClient, PostgresStore, TelegramNotifier};

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match format {
        "pretty" => subscriber.pretty().init(),
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load()?;

    init_tracing(&settings.logging.level, &settings.logging.format);

    info!("Starting Traceo match pipeline...");

    // Initialize PostgreSQL store
    let db = &settings.database;
    let db_max_conn = db.max_connections.unwrap_or(10);
    let store = Arc::new(
        PostgresStore::new(
            &db.url,
            db_max_conn,
            db.min_connections.unwrap_or(1),
            Duration::from_secs(db.acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(db.idle_timeout_secs.unwrap_or(600)),
        )
        .await
        .map_err(|e| {
            error!("Failed to connect to PostgreSQL: {}", e);
            e
        })?,
    );

    info!("PostgreSQL store initialized (max: {} connections)", db_max_conn);

    // The comparison oracle is mandatory
    let Some(api_key) = settings.gemini.api_key.clone().filter(|k| !k.is_empty()) else {
        error!("GEMINI_API_KEY is not set, refusing to start the pipeline");
        return Err("missing Gemini API key".into());
    };

    let gemini = Arc::new(GeminiClient::new(
        settings.gemini.endpoint.clone(),
        api_key,
        settings.gemini.model.clone(),
        settings.gemini.temperature,
        Duration::from_secs(settings.gemini.request_timeout_secs),
    )?);

    info!(model = %settings.gemini.model, "Gemini client initialized");

    let mut engine = MatchEngine::new(store.clone(), gemini.clone(), settings.matching_policy())
        .with_describer(gemini);

    match settings.telegram.credentials() {
        Some((token, chat_id)) => {
            let notifier = TelegramNotifier::new(
                settings.telegram.api_base.clone(),
                token.to_string(),
                chat_id.to_string(),
            )?;
            engine = engine.with_notifier(Arc::new(notifier));
            info!("Telegram notifications enabled");
        }
        None => warn!("Telegram credentials not set, match notifications disabled"),
    }

    let pool = WorkerPool::start(Arc::new(engine), settings.pool_config());

    let mut listener = store.job_listener().await?;
    info!("Listening for registration jobs");

    let listen = async {
        loop {
            match listener.next_job().await {
                Ok(job) => {
                    if pool.submit(job) == Admission::Dropped {
                        let stats = pool.stats();
                        warn!(dropped = stats.dropped, "Job not admitted");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Job listener failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    };

    tokio::select! {
        _ = listen => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, draining queued jobs");
        }
    }

    pool.shutdown().await;

    let stats = pool.stats();
    info!(
        accepted = stats.accepted,
        completed = stats.completed,
        failed = stats.failed,
        timed_out = stats.timed_out,
        dropped = stats.dropped,
        "Traceo match pipeline stopped"
    );

    Ok(())
}
