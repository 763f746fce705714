use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use ridepay::{
    handlers::trip_handler,
    state::{AppConfig, AppState},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(config).await.unwrap();

    let app = Router::new()
        .route("/health", get(trip_handler::health))
        .route("/trips", post(trip_handler::begin_trip).get(trip_handler::current_trip))
        .route("/trips/pending", get(trip_handler::pending_trip))
        .route("/trips/resume", post(trip_handler::resume_trip))
        .route("/trips/discard", post(trip_handler::discard_pending))
        .route("/trips/fields", post(trip_handler::update_trip))
        .route("/trips/arrive", post(trip_handler::mark_arrived))
        .route("/trips/start", post(trip_handler::start_trip))
        .route("/trips/duration/manual", post(trip_handler::set_manual_duration))
        .route("/trips/duration/auto", post(trip_handler::use_auto_duration))
        .route("/trips/drop", post(trip_handler::mark_dropped))
        .route("/trips/preview", get(trip_handler::preview_fare))
        .route("/trips/end", post(trip_handler::end_trip))
        .route("/trips/complete", post(trip_handler::complete_trip))
        .route("/trips/ride-again", post(trip_handler::ride_again))
        .route("/trips/history", get(trip_handler::history))
        .route("/fares/quote", post(trip_handler::quote))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(app_state));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    tracing::info!("ridepay listening on {}", bind_addr);
    axum::serve(listener, app).await.unwrap();
}
