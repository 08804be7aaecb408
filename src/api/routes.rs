use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::store::traits::BlogStore;

pub fn create_router<S: BlogStore + 'static>() -> Router<Arc<S>> {
    Router::new()
        // Service index and health check
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        // Field metadata for every category
        .route("/meta", get(handlers::get_meta))
        // Category collections: find (query params) and create
        .route(
            "/:category",
            get(handlers::list_category::<S>).post(handlers::create_object::<S>),
        )
        // Single objects: get, update, remove
        .route(
            "/:category/:id",
            get(handlers::get_object::<S>)
                .patch(handlers::update_object::<S>)
                .delete(handlers::delete_object::<S>),
        )
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}
