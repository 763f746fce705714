// src/services/trip_service.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing;

use crate::{
    errors::RidepayError as AppError,
    models::trip::{
        DeliveryZone, DurationSource, FareBreakdown, ResumePrompt, ServiceType, TripArea,
        TripRecord, TripSnapshot, TripState, TripStep, TripSummary, TripUpdate, TripView,
        WaitingPhase,
    },
    services::{notify_service::CompletionNotifier, pricing_service, store_service::TripStore},
    utils::{
        clock::Clock,
        format::{duration_components, duration_from_components, format_duration},
        id_generator::{IdType, WithGeneratedId},
        ticker::Ticker,
    },
};

#[async_trait]
pub trait TripOperations: Send + Sync {
    async fn begin_trip(&self, user_id: &str, service_type: ServiceType) -> Result<TripView, AppError>;
    async fn pending_trip(&self, user_id: &str) -> Result<Option<ResumePrompt>, AppError>;
    async fn resume_trip(&self, user_id: &str) -> Result<TripView, AppError>;
    async fn discard_pending(&self, user_id: &str) -> Result<(), AppError>;
    async fn current_trip(&self, user_id: &str) -> Result<TripView, AppError>;
    async fn update_trip(&self, user_id: &str, update: TripUpdate) -> Result<TripView, AppError>;
    async fn mark_arrived(&self, user_id: &str) -> Result<TripView, AppError>;
    async fn start_trip(&self, user_id: &str) -> Result<TripView, AppError>;
    async fn set_manual_duration(&self, user_id: &str, hours: u32, minutes: u32, seconds: u32) -> Result<TripView, AppError>;
    async fn use_auto_duration(&self, user_id: &str) -> Result<TripView, AppError>;
    async fn mark_dropped(&self, user_id: &str) -> Result<TripView, AppError>;
    async fn preview_fare(&self, user_id: &str) -> Result<FareBreakdown, AppError>;
    async fn end_trip(&self, user_id: &str) -> Result<TripView, AppError>;
    async fn complete_trip(&self, user_id: &str) -> Result<TripView, AppError>;
    async fn ride_again(&self, user_id: &str) -> Result<(), AppError>;
    async fn history(&self, user_id: &str) -> Result<Vec<TripSummary>, AppError>;
}

enum TickerKind {
    Trip,
    Waiting,
}

/// One user's in-flight trip: the wizard state machine, its two timers,
/// and the autosave hook. All trip state lives behind a single lock; the
/// tick tasks only refresh derived display fields.
pub struct TripWorkflow {
    user_id: String,
    clock: Arc<dyn Clock>,
    store: Arc<dyn TripStore>,
    notifier: Arc<dyn CompletionNotifier>,
    state: Arc<RwLock<TripState>>,
    trip_ticker: Mutex<Ticker>,
    waiting_ticker: Mutex<Ticker>,
}

impl TripWorkflow {
    pub fn new(
        user_id: &str,
        service_type: ServiceType,
        clock: Arc<dyn Clock>,
        store: Arc<dyn TripStore>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            clock,
            store,
            notifier,
            state: Arc::new(RwLock::new(TripState::new(service_type))),
            trip_ticker: Mutex::new(Ticker::new()),
            waiting_ticker: Mutex::new(Ticker::new()),
        }
    }

    /// Rebuilds a workflow from a persisted snapshot. Timers that were
    /// running when the snapshot was written get the wall-clock gap since
    /// `last_updated` added back, then keep counting.
    pub fn from_snapshot(
        snapshot: TripSnapshot,
        clock: Arc<dyn Clock>,
        store: Arc<dyn TripStore>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        let now = clock.now();
        let drift = (now - snapshot.last_updated).num_seconds().max(0);
        let mut trip = snapshot.trip;

        if trip.is_waiting_timer_running() {
            trip.waiting_seconds += drift;
            trip.waiting_charge_preview = pricing_service::waiting_charge(trip.waiting_seconds);
        }
        if trip.is_timer_running() {
            trip.elapsed_seconds += drift;
            trip.trip_duration = format_duration(trip.elapsed_seconds);
        }

        Self {
            user_id: snapshot.user_id,
            clock,
            store,
            notifier,
            state: Arc::new(RwLock::new(trip)),
            trip_ticker: Mutex::new(Ticker::new()),
            waiting_ticker: Mutex::new(Ticker::new()),
        }
    }

    /// Restarts whichever tick loop the restored state needs.
    pub async fn restart_timers(&self) {
        let (waiting_running, timer_running) = {
            let trip = self.state.read().await;
            (trip.is_waiting_timer_running(), trip.is_timer_running())
        };
        if waiting_running {
            self.spawn_waiting_ticker().await;
        }
        if timer_running {
            self.spawn_trip_ticker().await;
        }
    }

    pub async fn view(&self) -> TripView {
        let now = self.clock.now();
        let trip = self.state.read().await;
        Self::project_view(&trip, now)
    }

    pub async fn update(&self, update: TripUpdate) -> TripView {
        let now = self.clock.now();
        let view = {
            let mut trip = self.state.write().await;
            if let Some(value) = update.pickup_location {
                trip.pickup_location = value;
            }
            if let Some(value) = update.pickup_area {
                trip.pickup_area = Some(value);
            }
            if let Some(value) = update.start_meter_count {
                trip.start_meter_count = Some(value.max(0.0));
            }
            if let Some(value) = update.drop_location {
                trip.drop_location = value;
            }
            if let Some(value) = update.drop_area {
                trip.drop_area = Some(value);
            }
            if let Some(value) = update.end_location_area {
                trip.end_location_area = Some(value);
            }
            if let Some(value) = update.end_meter_count {
                trip.end_meter_count = Some(value.max(0.0));
            }
            if let Some(value) = update.customer_name {
                trip.customer_name = value;
            }
            if let Some(value) = update.phone_number {
                trip.phone_number = value;
            }
            if let Some(value) = update.payment_method {
                trip.payment_method = value;
            }
            Self::project_view(&trip, now)
        };
        self.autosave().await;
        view
    }

    /// Marks the driver's arrival at pickup. The pickup timestamp is set
    /// once; pressing again is a no-op. Drink-and-drive starts the waiting
    /// tracker here, every other service starts the trip timer directly.
    pub async fn mark_arrived(&self) -> TripView {
        let now = self.clock.now();
        let started = {
            let mut trip = self.state.write().await;
            if trip.step != TripStep::Pickup || trip.pickup_timestamp.is_some() {
                None
            } else {
                trip.pickup_timestamp = Some(now);
                if trip.service_type.bills_waiting_time() {
                    trip.waiting_phase = WaitingPhase::Running;
                    trip.waiting_start_instant = Some(now);
                    trip.waiting_seconds = 0;
                    trip.waiting_charge_preview = 0;
                    Some(TickerKind::Waiting)
                } else {
                    trip.trip_start_instant = Some(now);
                    trip.duration_source = Some(DurationSource::Auto { started_at: now });
                    trip.elapsed_seconds = 0;
                    trip.trip_duration = format_duration(0);
                    Some(TickerKind::Trip)
                }
            }
        };

        match started {
            Some(TickerKind::Waiting) => {
                self.spawn_waiting_ticker().await;
                self.autosave().await;
            }
            Some(TickerKind::Trip) => {
                self.spawn_trip_ticker().await;
                self.autosave().await;
            }
            None => {}
        }

        self.view().await
    }

    /// Pickup → Dropoff. Blocked (silently) until the pickup guard is
    /// satisfied. For drink-and-drive this is also the instant waiting
    /// ends and trip time begins.
    pub async fn start_trip(&self) -> TripView {
        let now = self.clock.now();
        let advanced = {
            let mut trip = self.state.write().await;
            if trip.step != TripStep::Pickup || !trip.can_leave_pickup() {
                false
            } else {
                if trip.service_type.bills_waiting_time() {
                    if trip.waiting_phase == WaitingPhase::Running {
                        trip.waiting_seconds = trip.live_waiting_seconds(now);
                        trip.waiting_end_instant = Some(now);
                        trip.waiting_phase = WaitingPhase::Stopped;
                        trip.waiting_charge_preview =
                            pricing_service::waiting_charge(trip.waiting_seconds);
                    }
                    trip.trip_start_instant = Some(now);
                    trip.duration_source = Some(DurationSource::Auto { started_at: now });
                    trip.elapsed_seconds = 0;
                    trip.trip_duration = format_duration(0);
                }
                trip.step = TripStep::Dropoff;
                true
            }
        };

        if advanced {
            self.waiting_ticker.lock().await.stop();
            let timer_running = {
                let trip = self.state.read().await;
                trip.is_timer_running()
            };
            if timer_running {
                self.spawn_trip_ticker().await;
            }
            self.autosave().await;
        }

        self.view().await
    }

    /// Captures an operator-entered duration and halts the automatic tick.
    pub async fn set_manual_duration(&self, hours: u32, minutes: u32, seconds: u32) -> TripView {
        let applied = {
            let mut trip = self.state.write().await;
            // duration is frozen once the fare has been computed
            if trip.step > TripStep::Dropoff {
                false
            } else {
                trip.duration_source = Some(DurationSource::Manual { hours, minutes, seconds });
                trip.elapsed_seconds = duration_from_components(hours, minutes, seconds);
                trip.trip_duration = format_duration(trip.elapsed_seconds);
                true
            }
        };

        if applied {
            self.trip_ticker.lock().await.stop();
            self.autosave().await;
        }

        self.view().await
    }

    /// Back to clock-driven time. Elapsed is re-derived from the original
    /// start instant, so an edited manual duration is dropped.
    pub async fn use_auto_duration(&self) -> TripView {
        let now = self.clock.now();
        let resumed = {
            let mut trip = self.state.write().await;
            if trip.step > TripStep::Dropoff {
                false
            } else {
                match trip.trip_start_instant {
                    Some(started_at) => {
                        trip.duration_source = Some(DurationSource::Auto { started_at });
                        let elapsed = trip.live_elapsed_seconds(now);
                        trip.elapsed_seconds = elapsed;
                        trip.trip_duration = format_duration(elapsed);
                        trip.trip_end_instant.is_none()
                    }
                    None => {
                        // nothing to anchor on yet; keep the cached value
                        trip.duration_source = None;
                        false
                    }
                }
            }
        };

        if resumed {
            self.spawn_trip_ticker().await;
        }
        self.autosave().await;
        self.view().await
    }

    /// Freezes the invoiced duration. Idempotent; `end_trip` invokes it
    /// when the operator skips the button.
    pub async fn mark_dropped(&self) -> TripView {
        let now = self.clock.now();
        let dropped = {
            let mut trip = self.state.write().await;
            Self::freeze_drop(&mut trip, now)
        };

        if dropped {
            self.trip_ticker.lock().await.stop();
            self.autosave().await;
        }

        self.view().await
    }

    fn freeze_drop(trip: &mut TripState, now: DateTime<Utc>) -> bool {
        if trip.step != TripStep::Dropoff || trip.final_elapsed_seconds.is_some() {
            return false;
        }

        let elapsed = trip.live_elapsed_seconds(now);
        trip.trip_end_instant = Some(now);
        trip.elapsed_seconds = elapsed;
        trip.trip_duration = format_duration(elapsed);
        trip.final_elapsed_seconds = Some(elapsed);
        trip.final_trip_duration = Some(format_duration(elapsed));
        true
    }

    /// Read-only fare projection against the live timers and current meter
    /// fields. Nothing is frozen, advanced, or persisted.
    pub async fn preview_fare(&self) -> FareBreakdown {
        let now = self.clock.now();
        let trip = self.state.read().await;
        Self::project_fare(&trip, now)
    }

    /// Dropoff → CustomerPayment. Auto-drops if needed, then prices the
    /// trip off the frozen duration. Blocked (silently) until the dropoff
    /// guard is satisfied.
    pub async fn end_trip(&self) -> TripView {
        let now = self.clock.now();
        let (dropped, ended) = {
            let mut trip = self.state.write().await;
            if trip.step != TripStep::Dropoff {
                (false, false)
            } else {
                let dropped = Self::freeze_drop(&mut trip, now);
                if !trip.can_leave_dropoff() {
                    (dropped, false)
                } else {
                    trip.distance_km = trip.metered_distance_km();
                    let fare = Self::project_fare(&trip, now);
                    trip.fare = Some(fare);
                    trip.step = TripStep::CustomerPayment;
                    (dropped, true)
                }
            }
        };

        if ended {
            self.stop_timers().await;
            self.autosave().await;
        } else if dropped {
            self.trip_ticker.lock().await.stop();
            self.autosave().await;
        }

        self.view().await
    }

    /// CustomerPayment → DriverPayment. The trip-log append must succeed;
    /// on failure the step stays put and the operator retries without
    /// re-entering anything.
    pub async fn complete_trip(&self) -> Result<TripView, AppError> {
        let now = self.clock.now();
        let record = {
            let trip = self.state.read().await;
            match trip.step {
                TripStep::CustomerPayment => {
                    TripRecord::from_state(&trip, &self.user_id, now).with_generated_id(IdType::Trip)
                }
                TripStep::DriverPayment => return Err(AppError::TripAlreadyCompleted),
                _ => return Err(AppError::conflict("trip is not at the customer payment step")),
            }
        };

        let trip_id = self.store.append_trip(&record).await?;
        tracing::info!(
            "trip {} saved for {} - Rs.{} total, Rs.{} to driver",
            trip_id,
            self.user_id,
            record.fare.total_payment,
            record.fare.driver_payment
        );

        {
            let mut trip = self.state.write().await;
            trip.step = TripStep::DriverPayment;
        }

        if let Err(error) = self.store.clear_snapshot(&self.user_id).await {
            tracing::warn!("failed to clear trip snapshot for {}: {}", self.user_id, error);
        }
        if let Err(error) = self.notifier.trip_completed(&record).await {
            tracing::warn!("completion notification for trip {} failed: {}", record.id, error);
        }

        Ok(self.view().await)
    }

    /// Full reset back to the first step, same service. The persisted
    /// snapshot is cleared and both timers die.
    pub async fn reset(&self) {
        self.stop_timers().await;
        {
            let mut trip = self.state.write().await;
            *trip = TripState::new(trip.service_type);
        }
        if let Err(error) = self.store.clear_snapshot(&self.user_id).await {
            tracing::warn!("failed to clear trip snapshot for {}: {}", self.user_id, error);
        }
    }

    async fn stop_timers(&self) {
        self.trip_ticker.lock().await.stop();
        self.waiting_ticker.lock().await.stop();
    }

    /// Best-effort autosave after a field mutation; the trip keeps going
    /// in memory when the store misbehaves.
    pub(crate) async fn autosave(&self) {
        let snapshot = {
            let trip = self.state.read().await;
            if !trip.in_progress() {
                return;
            }
            TripSnapshot {
                user_id: self.user_id.clone(),
                trip: trip.clone(),
                last_updated: self.clock.now(),
            }
        };

        if let Err(error) = self.store.save_snapshot(&self.user_id, &snapshot).await {
            tracing::warn!("snapshot autosave failed for {}: {}", self.user_id, error);
        }
    }

    async fn spawn_trip_ticker(&self) {
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        self.trip_ticker.lock().await.start(move || {
            let state = Arc::clone(&state);
            let clock = Arc::clone(&clock);
            async move {
                let mut trip = state.write().await;
                if trip.is_timer_running() {
                    let elapsed = trip.live_elapsed_seconds(clock.now());
                    trip.elapsed_seconds = elapsed;
                    trip.trip_duration = format_duration(elapsed);
                }
            }
            .boxed()
        });
    }

    async fn spawn_waiting_ticker(&self) {
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        self.waiting_ticker.lock().await.start(move || {
            let state = Arc::clone(&state);
            let clock = Arc::clone(&clock);
            async move {
                let mut trip = state.write().await;
                if trip.is_waiting_timer_running() {
                    let waited = trip.live_waiting_seconds(clock.now());
                    trip.waiting_seconds = waited;
                    trip.waiting_charge_preview = pricing_service::waiting_charge(waited);
                }
            }
            .boxed()
        });
    }

    fn project_fare(trip: &TripState, now: DateTime<Utc>) -> FareBreakdown {
        let elapsed = trip
            .final_elapsed_seconds
            .unwrap_or_else(|| trip.live_elapsed_seconds(now));
        let duration_minutes = (elapsed + 59) / 60;

        match trip.service_type {
            ServiceType::DrinkAndDrive => {
                let waiting = pricing_service::waiting_charge(trip.live_waiting_seconds(now));
                pricing_service::drink_and_drive_fare(
                    trip.metered_distance_km(),
                    duration_minutes,
                    trip.pickup_area == Some(TripArea::OutOfColombo),
                    trip.drop_area == Some(TripArea::OutOfColombo),
                    waiting,
                )
            }
            ServiceType::DayTime => {
                pricing_service::day_time_fare(duration_minutes, trip.out_of_colombo())
            }
            ServiceType::VehicleDelivery => pricing_service::vehicle_delivery_fare(
                trip.end_location_area.unwrap_or(DeliveryZone::Colombo1To5),
            ),
        }
    }

    fn project_view(trip: &TripState, now: DateTime<Utc>) -> TripView {
        let elapsed = trip
            .final_elapsed_seconds
            .unwrap_or_else(|| trip.live_elapsed_seconds(now));
        let waiting_seconds = trip.live_waiting_seconds(now);
        let (duration_hours, duration_minutes, duration_seconds) = duration_components(elapsed);

        TripView {
            service_type: trip.service_type,
            service_title: trip.service_type.title().to_string(),
            step: trip.step,
            pickup_location: trip.pickup_location.clone(),
            pickup_area: trip.pickup_area,
            start_meter_count: trip.start_meter_count,
            pickup_timestamp: trip.pickup_timestamp,
            drop_location: trip.drop_location.clone(),
            drop_area: trip.drop_area,
            end_location_area: trip.end_location_area,
            end_meter_count: trip.end_meter_count,
            trip_duration: trip
                .final_trip_duration
                .clone()
                .unwrap_or_else(|| format_duration(elapsed)),
            elapsed_seconds: elapsed,
            duration_hours,
            duration_minutes,
            duration_seconds,
            is_timer_running: trip.is_timer_running(),
            is_manual_time: trip.is_manual_time(),
            waiting_seconds,
            waiting_charge: pricing_service::waiting_charge(waiting_seconds),
            distance_km: trip.distance_km,
            can_start_trip: trip.step == TripStep::Pickup && trip.can_leave_pickup(),
            can_end_trip: trip.step == TripStep::Dropoff && trip.can_leave_dropoff(),
            customer_name: trip.customer_name.clone(),
            phone_number: trip.phone_number.clone(),
            payment_method: trip.payment_method,
            fare: trip.fare,
        }
    }
}

/// Hands out the per-user workflow. Exactly one in-flight trip exists per
/// user at a time; beginning a new one replaces (and thereby tears down)
/// the previous workflow and its timers.
pub struct TripService {
    clock: Arc<dyn Clock>,
    store: Arc<dyn TripStore>,
    notifier: Arc<dyn CompletionNotifier>,
    workflows: RwLock<HashMap<String, Arc<TripWorkflow>>>,
}

impl TripService {
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn TripStore>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        Self {
            clock,
            store,
            notifier,
            workflows: RwLock::new(HashMap::new()),
        }
    }

    async fn workflow(&self, user_id: &str) -> Result<Arc<TripWorkflow>, AppError> {
        let workflows = self.workflows.read().await;
        workflows
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::no_active_trip(user_id))
    }

    /// Loads the user's snapshot, enforcing the ownership rule: a snapshot
    /// recorded under this key for a different user id is cleared and
    /// ignored.
    async fn owned_snapshot(&self, user_id: &str) -> Result<Option<TripSnapshot>, AppError> {
        let snapshot = self.store.load_snapshot(user_id).await.map_err(AppError::from)?;
        match snapshot {
            Some(snapshot) if snapshot.user_id != user_id => {
                tracing::warn!(
                    "snapshot under key {} belongs to {}; clearing it",
                    user_id,
                    snapshot.user_id
                );
                if let Err(error) = self.store.clear_snapshot(user_id).await {
                    tracing::warn!("failed to clear mismatched snapshot for {}: {}", user_id, error);
                }
                Ok(None)
            }
            other => Ok(other),
        }
    }
}

#[async_trait]
impl TripOperations for TripService {
    async fn begin_trip(&self, user_id: &str, service_type: ServiceType) -> Result<TripView, AppError> {
        tracing::info!("Starting {} wizard for {}", service_type.title(), user_id);

        let workflow = Arc::new(TripWorkflow::new(
            user_id,
            service_type,
            Arc::clone(&self.clock),
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
        ));
        let view = workflow.view().await;

        self.workflows.write().await.insert(user_id.to_string(), workflow);
        Ok(view)
    }

    async fn pending_trip(&self, user_id: &str) -> Result<Option<ResumePrompt>, AppError> {
        Ok(self
            .owned_snapshot(user_id)
            .await?
            .filter(|snapshot| snapshot.trip.in_progress())
            .map(|snapshot| ResumePrompt::from_snapshot(&snapshot)))
    }

    async fn resume_trip(&self, user_id: &str) -> Result<TripView, AppError> {
        let snapshot = self.owned_snapshot(user_id).await?.ok_or_else(|| {
            AppError::not_found(format!("no resumable trip for user: {}", user_id))
        })?;

        tracing::info!(
            "Resuming {} trip for {} at step {:?}",
            snapshot.trip.service_type.title(),
            user_id,
            snapshot.trip.step
        );

        let workflow = Arc::new(TripWorkflow::from_snapshot(
            snapshot,
            Arc::clone(&self.clock),
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
        ));
        workflow.restart_timers().await;
        // persist the drift-adjusted seconds right away
        workflow.autosave().await;

        let view = workflow.view().await;
        self.workflows.write().await.insert(user_id.to_string(), workflow);
        Ok(view)
    }

    async fn discard_pending(&self, user_id: &str) -> Result<(), AppError> {
        tracing::info!("Discarding pending trip snapshot for {}", user_id);
        self.store.clear_snapshot(user_id).await.map_err(AppError::from)
    }

    async fn current_trip(&self, user_id: &str) -> Result<TripView, AppError> {
        Ok(self.workflow(user_id).await?.view().await)
    }

    async fn update_trip(&self, user_id: &str, update: TripUpdate) -> Result<TripView, AppError> {
        Ok(self.workflow(user_id).await?.update(update).await)
    }

    async fn mark_arrived(&self, user_id: &str) -> Result<TripView, AppError> {
        Ok(self.workflow(user_id).await?.mark_arrived().await)
    }

    async fn start_trip(&self, user_id: &str) -> Result<TripView, AppError> {
        Ok(self.workflow(user_id).await?.start_trip().await)
    }

    async fn set_manual_duration(
        &self,
        user_id: &str,
        hours: u32,
        minutes: u32,
        seconds: u32,
    ) -> Result<TripView, AppError> {
        Ok(self
            .workflow(user_id)
            .await?
            .set_manual_duration(hours, minutes, seconds)
            .await)
    }

    async fn use_auto_duration(&self, user_id: &str) -> Result<TripView, AppError> {
        Ok(self.workflow(user_id).await?.use_auto_duration().await)
    }

    async fn mark_dropped(&self, user_id: &str) -> Result<TripView, AppError> {
        Ok(self.workflow(user_id).await?.mark_dropped().await)
    }

    async fn preview_fare(&self, user_id: &str) -> Result<FareBreakdown, AppError> {
        Ok(self.workflow(user_id).await?.preview_fare().await)
    }

    async fn end_trip(&self, user_id: &str) -> Result<TripView, AppError> {
        Ok(self.workflow(user_id).await?.end_trip().await)
    }

    async fn complete_trip(&self, user_id: &str) -> Result<TripView, AppError> {
        self.workflow(user_id).await?.complete_trip().await
    }

    async fn ride_again(&self, user_id: &str) -> Result<(), AppError> {
        tracing::info!("Resetting trip wizard for {}", user_id);

        let removed = self.workflows.write().await.remove(user_id);
        match removed {
            Some(workflow) => {
                workflow.reset().await;
                Ok(())
            }
            // no in-memory workflow; still drop any stale snapshot
            None => self.store.clear_snapshot(user_id).await.map_err(AppError::from),
        }
    }

    async fn history(&self, user_id: &str) -> Result<Vec<TripSummary>, AppError> {
        let records = self.store.trips_for_user(user_id).await.map_err(AppError::from)?;
        Ok(records.iter().map(TripSummary::from_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::{PaymentMethod, TripStatus};
    use crate::services::notify_service::MockNotifier;
    use crate::services::store_service::{MemoryTripStore, StoreError};
    use crate::utils::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn test_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 8, 4, 8, 0, 0).unwrap()))
    }

    fn service_with(clock: Arc<ManualClock>, store: Arc<dyn TripStore>) -> TripService {
        TripService::new(clock, store, Arc::new(MockNotifier))
    }

    async fn fill_pickup(service: &TripService, user: &str) {
        service
            .update_trip(
                user,
                TripUpdate {
                    pickup_location: Some("Colombo Fort".to_string()),
                    pickup_area: Some(TripArea::Colombo),
                    start_meter_count: Some(10.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    async fn fill_day_time_pickup(service: &TripService, user: &str) {
        service
            .update_trip(
                user,
                TripUpdate {
                    pickup_location: Some("Fort Station".to_string()),
                    pickup_area: Some(TripArea::Colombo),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn drink_and_drive_end_to_end() {
        let clock = test_clock();
        let store = Arc::new(MemoryTripStore::new());
        let service = service_with(clock.clone(), store.clone());

        service.begin_trip("usr-9", ServiceType::DrinkAndDrive).await.unwrap();
        fill_pickup(&service, "usr-9").await;

        let view = service.mark_arrived("usr-9").await.unwrap();
        assert_eq!(view.waiting_seconds, 0);
        assert!(!view.is_timer_running); // trip time waits for start

        clock.advance_secs(1000); // waited past the free 15 minutes
        let view = service.start_trip("usr-9").await.unwrap();
        assert_eq!(view.step, TripStep::Dropoff);
        assert!(view.is_timer_running);
        assert_eq!(view.waiting_seconds, 1000);
        assert_eq!(view.waiting_charge, 300);

        clock.advance_secs(4000);
        let view = service
            .update_trip(
                "usr-9",
                TripUpdate {
                    drop_location: Some("Negombo".to_string()),
                    drop_area: Some(TripArea::OutOfColombo),
                    end_meter_count: Some(23.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(view.can_end_trip);

        let view = service.end_trip("usr-9").await.unwrap();
        assert_eq!(view.step, TripStep::CustomerPayment);
        assert!(!view.is_timer_running);
        assert_eq!(view.elapsed_seconds, 4000);
        assert_eq!(view.trip_duration, "01:06:40");

        let fare = view.fare.expect("fare computed at end of trip");
        assert_eq!(fare.base_payment, 2400); // 4000s rounds up to 67 minutes
        assert_eq!(fare.distance_surcharge, 300);
        assert_eq!(fare.area_surcharge, 500);
        assert_eq!(fare.waiting_surcharge, 300);
        assert_eq!(fare.total_payment, 3500);
        assert_eq!(fare.company_commission, 700);
        assert_eq!(fare.driver_payment, 2800);

        service
            .update_trip(
                "usr-9",
                TripUpdate {
                    customer_name: Some("Nimal Perera".to_string()),
                    phone_number: Some("0771234567".to_string()),
                    payment_method: Some(PaymentMethod::Credit),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = service.complete_trip("usr-9").await.unwrap();
        assert_eq!(view.step, TripStep::DriverPayment);

        let trips = store.trips_for_user("usr-9").await.unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].status, TripStatus::Pending); // credit settles later
        assert_eq!(trips[0].fare.total_payment, 3500);
        assert_eq!(trips[0].distance_km, 13.0);
        assert!(trips[0].id.starts_with("trp-"));
        assert!(trips[0].receipt_number.starts_with("RP"));

        // completing the trip clears the in-flight snapshot
        assert!(store.load_snapshot("usr-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn start_trip_blocks_until_pickup_guard_passes() {
        let clock = test_clock();
        let service = service_with(clock.clone(), Arc::new(MemoryTripStore::new()));

        service.begin_trip("usr-1", ServiceType::DrinkAndDrive).await.unwrap();
        let view = service.start_trip("usr-1").await.unwrap();
        assert_eq!(view.step, TripStep::Pickup); // silently blocked
        assert!(!view.can_start_trip);

        fill_pickup(&service, "usr-1").await;
        let view = service.start_trip("usr-1").await.unwrap();
        assert_eq!(view.step, TripStep::Pickup); // still blocked: never marked arrived

        service.mark_arrived("usr-1").await.unwrap();
        let view = service.start_trip("usr-1").await.unwrap();
        assert_eq!(view.step, TripStep::Dropoff);
    }

    #[tokio::test]
    async fn end_trip_blocks_until_dropoff_guard_passes() {
        let clock = test_clock();
        let service = service_with(clock.clone(), Arc::new(MemoryTripStore::new()));

        service.begin_trip("usr-1", ServiceType::DrinkAndDrive).await.unwrap();
        fill_pickup(&service, "usr-1").await;
        service.mark_arrived("usr-1").await.unwrap();
        service.start_trip("usr-1").await.unwrap();

        let view = service.end_trip("usr-1").await.unwrap();
        assert_eq!(view.step, TripStep::Dropoff); // drop fields still missing
        assert!(view.fare.is_none());

        service
            .update_trip(
                "usr-1",
                TripUpdate {
                    drop_location: Some("Dehiwala".to_string()),
                    drop_area: Some(TripArea::Colombo),
                    end_meter_count: Some(14.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let view = service.end_trip("usr-1").await.unwrap();
        assert_eq!(view.step, TripStep::CustomerPayment);
        assert!(view.fare.is_some());
    }

    #[tokio::test]
    async fn preview_is_idempotent_and_non_mutating() {
        let clock = test_clock();
        let store = Arc::new(MemoryTripStore::new());
        let service = service_with(clock.clone(), store.clone());

        service.begin_trip("usr-2", ServiceType::DayTime).await.unwrap();
        fill_day_time_pickup(&service, "usr-2").await;
        service.mark_arrived("usr-2").await.unwrap();
        service.start_trip("usr-2").await.unwrap();
        clock.advance_secs(360 * 60);

        let saved_before = store.load_snapshot("usr-2").await.unwrap();
        let first = service.preview_fare("usr-2").await.unwrap();
        let second = service.preview_fare("usr-2").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total_payment, 3800); // six hours on the hourly table

        let view = service.current_trip("usr-2").await.unwrap();
        assert_eq!(view.step, TripStep::Dropoff);
        assert!(view.fare.is_none());
        assert_eq!(store.load_snapshot("usr-2").await.unwrap(), saved_before);
    }

    #[tokio::test]
    async fn drop_freezes_the_invoiced_duration() {
        let clock = test_clock();
        let service = service_with(clock.clone(), Arc::new(MemoryTripStore::new()));

        service.begin_trip("usr-3", ServiceType::DayTime).await.unwrap();
        fill_day_time_pickup(&service, "usr-3").await;
        service.mark_arrived("usr-3").await.unwrap();
        service.start_trip("usr-3").await.unwrap();

        clock.advance_secs(3600);
        let view = service.mark_dropped("usr-3").await.unwrap();
        assert_eq!(view.elapsed_seconds, 3600);
        assert!(!view.is_timer_running);

        // the live clock keeps moving, the invoiced duration does not
        clock.advance_secs(500);
        let view = service.current_trip("usr-3").await.unwrap();
        assert_eq!(view.elapsed_seconds, 3600);
        assert_eq!(view.trip_duration, "01:00:00");

        service
            .update_trip(
                "usr-3",
                TripUpdate {
                    drop_location: Some("Kollupitiya".to_string()),
                    drop_area: Some(TripArea::Colombo),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let view = service.end_trip("usr-3").await.unwrap();
        let fare = view.fare.expect("fare present");
        assert_eq!(fare.base_payment, 3000); // 60 minutes lands in the 4-hour band
    }

    #[tokio::test]
    async fn manual_duration_overrides_and_auto_rederives() {
        let clock = test_clock();
        let service = service_with(clock.clone(), Arc::new(MemoryTripStore::new()));

        service.begin_trip("usr-7", ServiceType::DayTime).await.unwrap();
        fill_day_time_pickup(&service, "usr-7").await;
        service.mark_arrived("usr-7").await.unwrap();
        service.start_trip("usr-7").await.unwrap();

        clock.advance_secs(600);
        let view = service.set_manual_duration("usr-7", 2, 30, 0).await.unwrap();
        assert!(view.is_manual_time);
        assert!(!view.is_timer_running);
        assert_eq!(view.elapsed_seconds, 9000);
        assert_eq!(view.trip_duration, "02:30:00");

        clock.advance_secs(300);
        // the manual value holds while the wall clock moves
        let view = service.current_trip("usr-7").await.unwrap();
        assert_eq!(view.elapsed_seconds, 9000);

        // switching back re-derives from the original start instant and the
        // manual edit is dropped
        let view = service.use_auto_duration("usr-7").await.unwrap();
        assert!(view.is_timer_running);
        assert!(!view.is_manual_time);
        assert_eq!(view.elapsed_seconds, 900);
    }

    #[tokio::test]
    async fn waiting_tracker_only_runs_for_drink_and_drive() {
        let clock = test_clock();
        let service = service_with(clock.clone(), Arc::new(MemoryTripStore::new()));

        service.begin_trip("usr-8", ServiceType::DayTime).await.unwrap();
        fill_day_time_pickup(&service, "usr-8").await;
        let view = service.mark_arrived("usr-8").await.unwrap();
        assert!(view.is_timer_running); // trip time starts at arrival

        clock.advance_secs(2000);
        let view = service.current_trip("usr-8").await.unwrap();
        assert_eq!(view.waiting_seconds, 0);
        assert_eq!(view.waiting_charge, 0);
        assert_eq!(view.elapsed_seconds, 2000);
    }

    #[tokio::test]
    async fn resume_compensates_for_downtime() {
        let clock = test_clock();
        let store: Arc<MemoryTripStore> = Arc::new(MemoryTripStore::new());
        {
            let service = service_with(clock.clone(), store.clone());
            service.begin_trip("usr-3", ServiceType::DayTime).await.unwrap();
            fill_day_time_pickup(&service, "usr-3").await;
            service.mark_arrived("usr-3").await.unwrap();
            // last autosave lands here; the process then dies
        }
        clock.advance_secs(120);

        let service = service_with(clock.clone(), store.clone());
        let prompt = service
            .pending_trip("usr-3")
            .await
            .unwrap()
            .expect("in-progress trip detected");
        assert_eq!(prompt.service_type, ServiceType::DayTime);
        assert_eq!(prompt.step, TripStep::Pickup);

        let view = service.resume_trip("usr-3").await.unwrap();
        assert!(view.is_timer_running);
        assert_eq!(view.elapsed_seconds, 120); // stored 0 + 120s of downtime
    }

    #[tokio::test]
    async fn resume_keeps_waiting_clock_for_drink_and_drive() {
        let clock = test_clock();
        let store: Arc<MemoryTripStore> = Arc::new(MemoryTripStore::new());
        {
            let service = service_with(clock.clone(), store.clone());
            service.begin_trip("usr-4", ServiceType::DrinkAndDrive).await.unwrap();
            fill_pickup(&service, "usr-4").await;
            service.mark_arrived("usr-4").await.unwrap();
        }
        clock.advance_secs(1000);

        let service = service_with(clock.clone(), store.clone());
        let view = service.resume_trip("usr-4").await.unwrap();
        assert_eq!(view.waiting_seconds, 1000);
        assert_eq!(view.waiting_charge, 300);
        assert!(!view.is_timer_running);
    }

    #[tokio::test]
    async fn snapshot_for_another_user_is_ignored_and_cleared() {
        let clock = test_clock();
        let store = Arc::new(MemoryTripStore::new());
        let service = service_with(clock.clone(), store.clone());

        let mut foreign = TripState::new(ServiceType::DrinkAndDrive);
        foreign.pickup_timestamp = Some(clock.now());
        store
            .save_snapshot(
                "alice",
                &TripSnapshot {
                    user_id: "bob".to_string(),
                    trip: foreign,
                    last_updated: clock.now(),
                },
            )
            .await
            .unwrap();

        assert!(service.pending_trip("alice").await.unwrap().is_none());
        assert!(store.load_snapshot("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_means_no_resume_prompt() {
        let store = Arc::new(MemoryTripStore::new());
        store.insert_raw_snapshot("usr-4", "{broken").await;

        let service = service_with(test_clock(), store.clone());
        assert!(service.pending_trip("usr-4").await.unwrap().is_none());
    }

    struct FlakyStore {
        inner: MemoryTripStore,
        fail_append: AtomicBool,
    }

    #[async_trait]
    impl TripStore for FlakyStore {
        async fn save_snapshot(&self, user_id: &str, snapshot: &TripSnapshot) -> Result<(), StoreError> {
            self.inner.save_snapshot(user_id, snapshot).await
        }

        async fn load_snapshot(&self, user_id: &str) -> Result<Option<TripSnapshot>, StoreError> {
            self.inner.load_snapshot(user_id).await
        }

        async fn clear_snapshot(&self, user_id: &str) -> Result<(), StoreError> {
            self.inner.clear_snapshot(user_id).await
        }

        async fn append_trip(&self, record: &TripRecord) -> Result<String, StoreError> {
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(StoreError::Operation("trip log offline".to_string()));
            }
            self.inner.append_trip(record).await
        }

        async fn trips_for_user(&self, user_id: &str) -> Result<Vec<TripRecord>, StoreError> {
            self.inner.trips_for_user(user_id).await
        }
    }

    #[tokio::test]
    async fn append_failure_keeps_customer_payment_step_for_retry() {
        let clock = test_clock();
        let store = Arc::new(FlakyStore {
            inner: MemoryTripStore::new(),
            fail_append: AtomicBool::new(true),
        });
        let service = service_with(clock.clone(), store.clone());

        service.begin_trip("usr-5", ServiceType::VehicleDelivery).await.unwrap();
        service
            .update_trip(
                "usr-5",
                TripUpdate {
                    pickup_location: Some("Wattala".to_string()),
                    start_meter_count: Some(100.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.mark_arrived("usr-5").await.unwrap();
        service.start_trip("usr-5").await.unwrap();
        service
            .update_trip(
                "usr-5",
                TripUpdate {
                    drop_location: Some("Matara".to_string()),
                    end_location_area: Some(DeliveryZone::IslandWide),
                    end_meter_count: Some(260.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = service.end_trip("usr-5").await.unwrap();
        assert_eq!(view.fare.expect("flat rate fare").total_payment, 5000);

        let error = service.complete_trip("usr-5").await.unwrap_err();
        assert!(matches!(error, AppError::StoreQuery(_)));
        let view = service.current_trip("usr-5").await.unwrap();
        assert_eq!(view.step, TripStep::CustomerPayment); // nothing lost, retry allowed

        store.fail_append.store(false, Ordering::SeqCst);
        let view = service.complete_trip("usr-5").await.unwrap();
        assert_eq!(view.step, TripStep::DriverPayment);
        assert_eq!(store.inner.trips_for_user("usr-5").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completing_twice_is_rejected() {
        let clock = test_clock();
        let service = service_with(clock.clone(), Arc::new(MemoryTripStore::new()));

        service.begin_trip("usr-6", ServiceType::VehicleDelivery).await.unwrap();
        service
            .update_trip(
                "usr-6",
                TripUpdate {
                    pickup_location: Some("Kandy".to_string()),
                    start_meter_count: Some(0.0),
                    drop_location: Some("Galle".to_string()),
                    end_location_area: Some(DeliveryZone::WesternProvince),
                    end_meter_count: Some(115.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.mark_arrived("usr-6").await.unwrap();
        service.start_trip("usr-6").await.unwrap();
        service.end_trip("usr-6").await.unwrap();
        service.complete_trip("usr-6").await.unwrap();

        let error = service.complete_trip("usr-6").await.unwrap_err();
        assert!(matches!(error, AppError::TripAlreadyCompleted));
    }

    #[tokio::test]
    async fn ride_again_resets_everything() {
        let clock = test_clock();
        let store = Arc::new(MemoryTripStore::new());
        let service = service_with(clock.clone(), store.clone());

        service.begin_trip("usr-6", ServiceType::DrinkAndDrive).await.unwrap();
        fill_pickup(&service, "usr-6").await;
        service.mark_arrived("usr-6").await.unwrap();
        assert!(store.load_snapshot("usr-6").await.unwrap().is_some());

        service.ride_again("usr-6").await.unwrap();
        assert!(store.load_snapshot("usr-6").await.unwrap().is_none());
        assert!(matches!(
            service.current_trip("usr-6").await,
            Err(AppError::NoActiveTrip(_))
        ));
    }

    #[tokio::test]
    async fn history_projects_report_rows() {
        let clock = test_clock();
        let store = Arc::new(MemoryTripStore::new());
        let service = service_with(clock.clone(), store.clone());

        service.begin_trip("usr-7", ServiceType::VehicleDelivery).await.unwrap();
        service
            .update_trip(
                "usr-7",
                TripUpdate {
                    pickup_location: Some("Union Place".to_string()),
                    start_meter_count: Some(40.0),
                    drop_location: Some("Mount Lavinia".to_string()),
                    end_location_area: Some(DeliveryZone::ColomboArea),
                    end_meter_count: Some(52.0),
                    payment_method: Some(PaymentMethod::Cash),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.mark_arrived("usr-7").await.unwrap();
        service.start_trip("usr-7").await.unwrap();
        service.end_trip("usr-7").await.unwrap();
        service.complete_trip("usr-7").await.unwrap();

        let summaries = service.history("usr-7").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].service, "Vehicle Delivery Service");
        assert_eq!(summaries[0].total_payment, 2000);
        assert_eq!(summaries[0].commission, 400);
        assert_eq!(summaries[0].rider_payment, 1600);
        assert_eq!(summaries[0].status, TripStatus::Completed); // cash settles immediately
        assert_eq!(summaries[0].date, "2025-08-04");
    }
}
