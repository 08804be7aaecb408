use blog_db_rust::config::{AppConfig, StoreBackend};
use blog_db_rust::seed;
use blog_db_rust::store::{BlogStore, MemoryStore, PostgresStore};
use blog_db_rust::run_server;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    println!("Blog DB: users, articles and comments");

    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{} store={:?}",
        config.server.host, config.server.port, config.store.backend
    );

    match config.store.backend {
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            start(store, &config).await
        }
        StoreBackend::Postgres => {
            println!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(&database_url, config.max_connections()).await?;

            println!("Running database migrations...");
            store.migrate().await?;

            start(Arc::new(store), &config).await
        }
    }
}

async fn start<S: BlogStore + 'static>(store: Arc<S>, config: &AppConfig) -> anyhow::Result<()> {
    // Load seed data for demonstration (optional)
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        println!("Loading seed data...");
        seed::load_seed_data(&*store).await?;
        println!("Seed data loaded successfully");
    }

    run_server(store, config).await
}
