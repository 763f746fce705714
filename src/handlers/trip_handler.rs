// src/handlers/trip_handler.rs
use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    errors::RidepayError,
    models::trip::{
        BeginTripRequest, FareBreakdown, ManualDurationRequest, QuoteRequest, ResumePrompt,
        TripSummary, TripUpdate, TripView,
    },
    services::{pricing_service, trip_service::TripOperations},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserAction {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TripFieldsRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub fields: TripUpdate,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn begin_trip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BeginTripRequest>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state
        .trip_service
        .begin_trip(&request.user_id, request.service_type)
        .await?;
    Ok(Json(view))
}

pub async fn current_trip(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state.trip_service.current_trip(&query.user_id).await?;
    Ok(Json(view))
}

pub async fn pending_trip(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Option<ResumePrompt>>, RidepayError> {
    let prompt = state.trip_service.pending_trip(&query.user_id).await?;
    Ok(Json(prompt))
}

pub async fn resume_trip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAction>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state.trip_service.resume_trip(&request.user_id).await?;
    Ok(Json(view))
}

pub async fn discard_pending(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAction>,
) -> Result<Json<serde_json::Value>, RidepayError> {
    state.trip_service.discard_pending(&request.user_id).await?;
    Ok(Json(serde_json::json!({ "discarded": true })))
}

pub async fn update_trip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TripFieldsRequest>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state
        .trip_service
        .update_trip(&request.user_id, request.fields)
        .await?;
    Ok(Json(view))
}

pub async fn mark_arrived(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAction>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state.trip_service.mark_arrived(&request.user_id).await?;
    Ok(Json(view))
}

pub async fn start_trip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAction>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state.trip_service.start_trip(&request.user_id).await?;
    Ok(Json(view))
}

pub async fn set_manual_duration(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ManualDurationRequest>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state
        .trip_service
        .set_manual_duration(&request.user_id, request.hours, request.minutes, request.seconds)
        .await?;
    Ok(Json(view))
}

pub async fn use_auto_duration(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAction>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state.trip_service.use_auto_duration(&request.user_id).await?;
    Ok(Json(view))
}

pub async fn mark_dropped(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAction>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state.trip_service.mark_dropped(&request.user_id).await?;
    Ok(Json(view))
}

/// "Show current amount": a read-only projection against the live timers.
pub async fn preview_fare(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<FareBreakdown>, RidepayError> {
    let fare = state.trip_service.preview_fare(&query.user_id).await?;
    Ok(Json(fare))
}

pub async fn end_trip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAction>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state.trip_service.end_trip(&request.user_id).await?;
    Ok(Json(view))
}

pub async fn complete_trip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAction>,
) -> Result<Json<TripView>, RidepayError> {
    let view = state.trip_service.complete_trip(&request.user_id).await?;
    Ok(Json(view))
}

pub async fn ride_again(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UserAction>,
) -> Result<Json<serde_json::Value>, RidepayError> {
    state.trip_service.ride_again(&request.user_id).await?;
    Ok(Json(serde_json::json!({ "reset": true })))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<TripSummary>>, RidepayError> {
    let summaries = state.trip_service.history(&query.user_id).await?;
    Ok(Json(summaries))
}

/// Stateless fare estimate; never touches trip state.
pub async fn quote(Json(request): Json<QuoteRequest>) -> Json<FareBreakdown> {
    Json(pricing_service::quote(&request))
}
