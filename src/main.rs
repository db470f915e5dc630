use std::sync::Arc;

use parkchat::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    http::{self, AppState},
    orchestrator::ChatOrchestrator,
    reply::{HttpReplyProvider, MockReplyProvider, ReplyProvider},
    store::{InMemoryMessageStore, MessageStore, PostgresMessageStore},
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;

    let reply = build_reply_provider(&config);
    let store = build_message_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let orchestrator = Arc::new(ChatOrchestrator::new(
        reply,
        store.clone(),
        clock,
        config.rate_limit.clone(),
    )?);

    let app = http::router(AppState {
        orchestrator,
        store,
        default_language: config.default_language.clone(),
    });
    let listener = TcpListener::bind(config.http_bind).await?;
    info!("parkchat HTTP API listening on {}", config.http_bind);

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();
}

fn build_reply_provider(config: &AppConfig) -> Arc<dyn ReplyProvider> {
    if let Some(endpoint) = config.reply_endpoint.clone() {
        Arc::new(HttpReplyProvider::new(endpoint))
    } else {
        warn!("REPLY_ENDPOINT not set; using mock reply provider");
        Arc::new(MockReplyProvider)
    }
}

async fn build_message_store(config: &AppConfig) -> anyhow::Result<Arc<dyn MessageStore>> {
    if let Some(database_url) = &config.database_url {
        let store = PostgresMessageStore::connect(database_url).await?;
        info!("Connected to Postgres message store");
        Ok(Arc::new(store))
    } else {
        warn!("DATABASE_URL not set; using in-memory message store");
        Ok(Arc::new(InMemoryMessageStore::default()))
    }
}
