use std::sync::Arc;

use healthmate::{
    analytics::AnalyticsService,
    chat::ChatService,
    config::AppConfig,
    hospitals::HospitalLocator,
    http::{self, AppState},
    model::{GeminiProvider, MockModelProvider, ModelProvider},
    safety::SafetyPolicy,
    store::{HealthStore, InMemoryHealthStore, PostgresHealthStore},
    symptoms::SymptomAnalyzer,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;

    let model = build_model_provider(&config);
    let store = build_store(&config).await?;

    let state = AppState {
        chat: Arc::new(ChatService::new(
            model.clone(),
            store.clone(),
            SafetyPolicy::default(),
        )),
        analyzer: Arc::new(SymptomAnalyzer::new(model, store.clone())),
        analytics: Arc::new(AnalyticsService::new(store.clone())),
        hospitals: Arc::new(HospitalLocator::new(config.overpass_url.clone())),
        store,
    };

    let app = http::router(state);
    let listener = TcpListener::bind(config.http_bind).await?;
    info!("HealthMate API listening on {}", config.http_bind);

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();
}

fn build_model_provider(config: &AppConfig) -> Arc<dyn ModelProvider> {
    if let Some(api_key) = config.gemini_api_key.clone() {
        Arc::new(GeminiProvider::new(api_key, config.gemini_model.clone()))
    } else {
        warn!("GEMINI_API_KEY not set; using mock model provider");
        Arc::new(MockModelProvider)
    }
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn HealthStore>> {
    if let Some(database_url) = &config.database_url {
        let store = PostgresHealthStore::connect(database_url).await?;
        info!("Connected to Postgres health store");
        Ok(Arc::new(store))
    } else {
        warn!("DATABASE_URL not set; using in-memory store");
        Ok(Arc::new(InMemoryHealthStore::default()))
    }
}
