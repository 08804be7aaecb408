pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export logic types
pub use logic::{EntityIndex, ReferenceTracker, Validator};

// Export all model types
pub use model::*;

// Export store types
pub use store::{BlogStore, MemoryStore, PostgresStore};

use std::sync::Arc;

/// Build the router over `store` and serve it on the configured address
pub async fn run_server<S: BlogStore + 'static>(
    store: Arc<S>,
    config: &crate::config::AppConfig,
) -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    let app = api::routes::create_router().with_state(store);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("blog server listening on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
