pub mod admin;
pub mod error;
pub mod forms;
pub mod rate_limit;
pub mod routes;
pub mod state;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Stores};

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/refresh-cache", post(admin::refresh_cache))
        .route("/api/admin/listings", get(admin::listings))
        .route(
            "/api/admin/curated-listings",
            get(admin::curated_listings).post(admin::save_curated_listings),
        )
        .route(
            "/api/admin/subscribers",
            get(admin::subscribers).delete(admin::delete_subscriber),
        )
        .route(
            "/api/admin/export-subscribers",
            get(admin::export_subscribers),
        )
        .route(
            "/api/admin/custom-orders",
            get(admin::custom_orders)
                .patch(admin::update_custom_order)
                .delete(admin::delete_custom_order),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin,
        ));

    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/listings", get(routes::listings))
        .route("/api/listings/:slug", get(routes::listing_by_slug))
        .route("/api/tags", get(routes::tags))
        .route("/api/materials", get(routes::materials))
        .route("/api/categories", get(routes::categories))
        .route("/api/subscribe", post(forms::subscribe))
        .route("/api/contact", post(forms::contact))
        .route(
            "/api/custom-order",
            post(forms::custom_order).layer(DefaultBodyLimit::max(forms::CUSTOM_ORDER_BODY_LIMIT)),
        )
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
