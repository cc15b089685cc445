//! HTTP API server with observability for the customer service.
//!
//! Provides REST endpoints for customers and their emails, phone numbers
//! and addresses, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{MatchedPath, Request};
use axum::routing::{get, post};
use domain::{CustomerService, CustomerStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::customers::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CustomerStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::customers;

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/customers",
            post(customers::create::<S>).get(customers::list::<S>),
        )
        .route(
            "/customers/with-details",
            post(customers::create_with_details::<S>),
        )
        .route(
            "/customers/by-email/{email}",
            get(customers::get_by_email::<S>),
        )
        .route(
            "/customers/by-phone-number/{phone_number}",
            get(customers::get_by_phone_number::<S>),
        )
        .route(
            "/customers/{id}",
            get(customers::get::<S>)
                .patch(customers::update::<S>)
                .delete(customers::delete::<S>),
        )
        .route(
            "/customers/{id}/emails",
            post(customers::add_email::<S>).get(customers::list_emails::<S>),
        )
        .route(
            "/customers/{id}/emails/{email}",
            axum::routing::delete(customers::delete_email::<S>),
        )
        .route(
            "/customers/{id}/phone-numbers",
            post(customers::add_phone_number::<S>).get(customers::list_phone_numbers::<S>),
        )
        .route(
            "/customers/{id}/phone-numbers/{phone_number}",
            axum::routing::delete(customers::delete_phone_number::<S>),
        )
        .route(
            "/customers/{id}/addresses",
            post(customers::add_address::<S>).get(customers::list_addresses::<S>),
        )
        .route(
            "/customers/{id}/addresses/{address}",
            axum::routing::delete(customers::delete_address::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}

/// Request spans carry the route template, not the URI, so child values in
/// the path stay out of the logs.
fn request_span(request: &Request) -> tracing::Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or("unmatched");
    tracing::debug_span!("request", method = %request.method(), route)
}

/// Creates the application state over a customer store.
pub fn create_default_state<S: CustomerStore + 'static>(
    store: S,
    request_timeout: Duration,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        customer_service: CustomerService::new(store),
        request_timeout,
    })
}
