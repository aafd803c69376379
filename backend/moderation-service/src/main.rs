use actix_web::{web, App, HttpServer};
use anyhow::Context;
use moderation_service::{
    config::Config,
    db::{InMemoryStore, ModerationStore, PgModerationStore},
    http::{self, AppState},
    services::{
        AppealService, BulkActionService, EnforcementService, HttpClassificationOracle,
        ImageInspector, Lexicon, ModerationService, ScoreAggregator, TextSignalExtractor,
    },
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting moderation service...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        http_port = config.http_port,
        "Configuration loaded"
    );

    // Storage
    let store: Arc<dyn ModerationStore> = match &config.database_url {
        Some(url) => {
            let pg = PgModerationStore::connect(url, &config.pool_settings())
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Running database migrations...");
            pg.migrate().await.context("Migration failed")?;
            tracing::info!("Migrations completed successfully");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    // Text rules
    let lexicon = match &config.lexicon_path {
        Some(path) => Lexicon::from_file(path).context("Failed to load lexicon")?,
        None => Lexicon::builtin(),
    };
    tracing::info!(terms = lexicon.len(), "Lexicon loaded");
    let text = TextSignalExtractor::new(lexicon)?;

    // Services
    let enforcement = Arc::new(EnforcementService::new(
        store.clone(),
        config.enforcement_policy(),
    ));
    let mut moderation = ModerationService::new(
        store.clone(),
        enforcement.clone(),
        text,
        ImageInspector::new(config.image_policy()),
        ScoreAggregator::new(config.thresholds()),
    );
    match &config.oracle_url {
        Some(url) => {
            tracing::info!(oracle_url = %url, "Image classifier enabled");
            moderation = moderation.with_oracle(
                Arc::new(HttpClassificationOracle::new(url.clone())),
                config.oracle_timeout(),
            );
        }
        None => tracing::warn!("No image classifier configured, image evaluations will be incomplete"),
    }

    let state = AppState {
        store: store.clone(),
        moderation: Arc::new(moderation),
        enforcement: enforcement.clone(),
        bulk: Arc::new(BulkActionService::new(store.clone(), enforcement)),
        appeals: Arc::new(AppealService::new(store)),
    };

    let addr = format!("0.0.0.0:{}", config.http_port);
    tracing::info!("Moderation service listening on {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(http::configure)
    })
    .bind(&addr)
    .with_context(|| format!("Failed to bind {}", addr))?
    .run()
    .await?;

    Ok(())
}
