// src/models/trip.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::format::{duration_from_components, format_duration};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    DrinkAndDrive,   // Designated-driver transport, waiting time is billable
    DayTime,         // Hourly chartered ride
    VehicleDelivery, // Flat-rate vehicle relocation
}

impl ServiceType {
    pub fn title(&self) -> &'static str {
        match self {
            ServiceType::DrinkAndDrive => "Drink and Drive Service",
            ServiceType::DayTime => "Day Time Service",
            ServiceType::VehicleDelivery => "Vehicle Delivery Service",
        }
    }

    /// Meter readings are collected for every service that bills distance.
    pub fn uses_meter(&self) -> bool {
        matches!(self, ServiceType::DrinkAndDrive | ServiceType::VehicleDelivery)
    }

    /// Colombo / out-of-Colombo areas apply to everything except vehicle
    /// delivery, which uses delivery zones instead.
    pub fn uses_trip_area(&self) -> bool {
        !matches!(self, ServiceType::VehicleDelivery)
    }

    pub fn bills_waiting_time(&self) -> bool {
        matches!(self, ServiceType::DrinkAndDrive)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum TripStep {
    Pickup,          // Collect pickup details, mark arrival
    Dropoff,         // Collect drop details, end the trip
    CustomerPayment, // Show the fare, collect customer details
    DriverPayment,   // Show the driver share, close out
}

impl TripStep {
    pub fn index(&self) -> u8 {
        match self {
            TripStep::Pickup => 0,
            TripStep::Dropoff => 1,
            TripStep::CustomerPayment => 2,
            TripStep::DriverPayment => 3,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TripArea {
    #[serde(rename = "colombo")]
    Colombo,
    #[serde(rename = "out-colombo")]
    OutOfColombo,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryZone {
    #[serde(rename = "colombo-1-5")]
    Colombo1To5,
    #[serde(rename = "colombo-area")]
    ColomboArea,
    #[serde(rename = "western-province")]
    WesternProvince,
    #[serde(rename = "island-wide")]
    IslandWide,
}

impl DeliveryZone {
    /// Unrecognized zone strings fall back to the cheapest tier.
    pub fn parse_or_lowest(raw: &str) -> Self {
        match raw {
            "colombo-area" => DeliveryZone::ColomboArea,
            "western-province" => DeliveryZone::WesternProvince,
            "island-wide" => DeliveryZone::IslandWide,
            _ => DeliveryZone::Colombo1To5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Credit,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TripStatus {
    Completed, // Settled on the spot (cash)
    Pending,   // Awaiting settlement (credit)
}

impl TripStatus {
    pub fn for_payment(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cash => TripStatus::Completed,
            PaymentMethod::Credit => TripStatus::Pending,
        }
    }
}

/// Which clock governs the trip duration. Exactly one variant is in force
/// at any instant; the running/manual flags the UI shows are derived from
/// it rather than tracked separately.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum DurationSource {
    Auto { started_at: DateTime<Utc> },
    Manual { hours: u32, minutes: u32, seconds: u32 },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WaitingPhase {
    Idle,    // Tracker never started (or trip reset)
    Running, // Driver has arrived, trip not yet started
    Stopped, // Frozen at trip start
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct FareBreakdown {
    pub base_payment: i64,
    pub distance_surcharge: i64,
    pub area_surcharge: i64,
    pub waiting_surcharge: i64,
    pub total_payment: i64,
    pub company_commission: i64, // 20% of total, rounded to the rupee
    pub driver_payment: i64,     // remainder, so the split always sums back
}

/// One in-flight trip. Owned exclusively by the workflow; every mutation
/// goes through its transition operations.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripState {
    pub service_type: ServiceType,
    pub step: TripStep,

    // Pickup step
    pub pickup_location: String,
    pub pickup_area: Option<TripArea>,
    pub start_meter_count: Option<f64>,
    pub pickup_timestamp: Option<DateTime<Utc>>,

    // Dropoff step
    pub drop_location: String,
    pub drop_area: Option<TripArea>,
    pub end_location_area: Option<DeliveryZone>,
    pub end_meter_count: Option<f64>,

    // Trip timer
    pub trip_start_instant: Option<DateTime<Utc>>,
    pub trip_end_instant: Option<DateTime<Utc>>,
    pub duration_source: Option<DurationSource>,
    pub elapsed_seconds: i64,
    pub trip_duration: String, // live HH:MM:SS display, refreshed by the tick
    pub final_elapsed_seconds: Option<i64>,
    pub final_trip_duration: Option<String>,

    // Waiting tracker (drink-and-drive only)
    pub waiting_phase: WaitingPhase,
    pub waiting_start_instant: Option<DateTime<Utc>>,
    pub waiting_end_instant: Option<DateTime<Utc>>,
    pub waiting_seconds: i64,
    pub waiting_charge_preview: i64,

    // Customer payment step
    pub customer_name: String,
    pub phone_number: String,
    pub payment_method: PaymentMethod,

    // Set at the end-trip transition
    pub distance_km: f64,
    pub fare: Option<FareBreakdown>,
}

impl TripState {
    pub fn new(service_type: ServiceType) -> Self {
        Self {
            service_type,
            step: TripStep::Pickup,
            pickup_location: String::new(),
            pickup_area: None,
            start_meter_count: None,
            pickup_timestamp: None,
            drop_location: String::new(),
            drop_area: None,
            end_location_area: None,
            end_meter_count: None,
            trip_start_instant: None,
            trip_end_instant: None,
            duration_source: None,
            elapsed_seconds: 0,
            trip_duration: format_duration(0),
            final_elapsed_seconds: None,
            final_trip_duration: None,
            waiting_phase: WaitingPhase::Idle,
            waiting_start_instant: None,
            waiting_end_instant: None,
            waiting_seconds: 0,
            waiting_charge_preview: 0,
            customer_name: String::new(),
            phone_number: String::new(),
            payment_method: PaymentMethod::Cash,
            distance_km: 0.0,
            fare: None,
        }
    }

    /// A trip is worth snapshotting once the wizard moved past the first
    /// screen or the driver marked arrival.
    pub fn in_progress(&self) -> bool {
        self.step != TripStep::Pickup || self.pickup_timestamp.is_some()
    }

    pub fn is_timer_running(&self) -> bool {
        matches!(self.duration_source, Some(DurationSource::Auto { .. }))
            && self.trip_end_instant.is_none()
    }

    pub fn is_manual_time(&self) -> bool {
        matches!(self.duration_source, Some(DurationSource::Manual { .. }))
    }

    pub fn is_waiting_timer_running(&self) -> bool {
        self.waiting_phase == WaitingPhase::Running
    }

    /// Authoritative elapsed seconds at `now`. The 1-second tick only
    /// refreshes the cached display; reads derive from the governing
    /// duration source.
    pub fn live_elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        match &self.duration_source {
            Some(DurationSource::Auto { started_at }) => {
                let until = self.trip_end_instant.unwrap_or(now);
                (until - *started_at).num_seconds().max(0)
            }
            Some(DurationSource::Manual { hours, minutes, seconds }) => {
                duration_from_components(*hours, *minutes, *seconds)
            }
            None => self.elapsed_seconds,
        }
    }

    pub fn live_waiting_seconds(&self, now: DateTime<Utc>) -> i64 {
        match self.waiting_phase {
            WaitingPhase::Running => self
                .waiting_start_instant
                .map(|started| (now - started).num_seconds().max(0))
                .unwrap_or(self.waiting_seconds),
            _ => self.waiting_seconds,
        }
    }

    /// Meter-reading delta for services that bill distance; zero until both
    /// readings are in.
    pub fn metered_distance_km(&self) -> f64 {
        if !self.service_type.uses_meter() {
            return 0.0;
        }
        match (self.start_meter_count, self.end_meter_count) {
            (Some(start), Some(end)) => (end - start).max(0.0),
            _ => 0.0,
        }
    }

    pub fn can_leave_pickup(&self) -> bool {
        !self.pickup_location.trim().is_empty()
            && (!self.service_type.uses_trip_area() || self.pickup_area.is_some())
            && (!self.service_type.uses_meter() || self.start_meter_count.is_some())
            && self.pickup_timestamp.is_some()
    }

    pub fn can_leave_dropoff(&self) -> bool {
        if self.drop_location.trim().is_empty() {
            return false;
        }
        let area_set = if self.service_type.uses_trip_area() {
            self.drop_area.is_some()
        } else {
            self.end_location_area.is_some()
        };
        area_set && (!self.service_type.uses_meter() || self.end_meter_count.is_some())
    }

    pub fn out_of_colombo(&self) -> bool {
        self.pickup_area == Some(TripArea::OutOfColombo)
            || self.drop_area == Some(TripArea::OutOfColombo)
    }
}

/// Persisted copy of an in-flight trip, keyed by user. `last_updated` lets
/// a resume re-derive how long the timers kept running while the process
/// was gone.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripSnapshot {
    pub user_id: String,
    pub trip: TripState,
    pub last_updated: DateTime<Utc>,
}

/// Completed trip appended to the trip log.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripRecord {
    pub id: String,
    pub user_id: String,
    pub receipt_number: String,
    pub service_type: ServiceType,
    pub pickup_location: String,
    pub drop_location: String,
    pub pickup_area: Option<TripArea>,
    pub drop_area: Option<TripArea>,
    pub end_location_area: Option<DeliveryZone>,
    pub start_meter_count: Option<f64>,
    pub end_meter_count: Option<f64>,
    pub distance_km: f64,
    pub trip_duration: String,
    pub elapsed_seconds: i64,
    pub fare: FareBreakdown,
    pub customer_name: String,
    pub phone_number: String,
    pub payment_method: PaymentMethod,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
}

impl TripRecord {
    pub fn from_state(trip: &TripState, user_id: &str, created_at: DateTime<Utc>) -> Self {
        let receipt_number = format!(
            "RP{}",
            Uuid::new_v4().simple().to_string()[..8].to_uppercase()
        );

        Self {
            id: String::new(), // set through WithGeneratedId before persisting
            user_id: user_id.to_string(),
            receipt_number,
            service_type: trip.service_type,
            pickup_location: trip.pickup_location.clone(),
            drop_location: trip.drop_location.clone(),
            pickup_area: trip.pickup_area,
            drop_area: trip.drop_area,
            end_location_area: trip.end_location_area,
            start_meter_count: trip.start_meter_count,
            end_meter_count: trip.end_meter_count,
            distance_km: trip.distance_km,
            trip_duration: trip
                .final_trip_duration
                .clone()
                .unwrap_or_else(|| trip.trip_duration.clone()),
            elapsed_seconds: trip.final_elapsed_seconds.unwrap_or(trip.elapsed_seconds),
            fare: trip.fare.unwrap_or_default(),
            customer_name: trip.customer_name.clone(),
            phone_number: trip.phone_number.clone(),
            payment_method: trip.payment_method,
            status: TripStatus::for_payment(trip.payment_method),
            created_at,
        }
    }
}

/// Row model for the reports and payments tables.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripSummary {
    pub trip_id: String,
    pub date: String,
    pub service: String,
    pub total_payment: i64,
    pub commission: i64,
    pub rider_payment: i64,
    pub status: TripStatus,
}

impl TripSummary {
    pub fn from_record(record: &TripRecord) -> Self {
        let trip_id = record
            .id
            .rsplit('-')
            .next()
            .unwrap_or(record.id.as_str())
            .to_uppercase();

        Self {
            trip_id,
            date: record.created_at.format("%Y-%m-%d").to_string(),
            service: record.service_type.title().to_string(),
            total_payment: record.fare.total_payment,
            commission: record.fare.company_commission,
            rider_payment: record.fare.driver_payment,
            status: record.status,
        }
    }
}

// Request/Response Models
#[derive(Debug, Serialize, Deserialize)]
pub struct BeginTripRequest {
    pub user_id: String,
    pub service_type: ServiceType,
}

/// Partial update applied to whichever wizard fields the client touched.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TripUpdate {
    pub pickup_location: Option<String>,
    pub pickup_area: Option<TripArea>,
    pub start_meter_count: Option<f64>,
    pub drop_location: Option<String>,
    pub drop_area: Option<TripArea>,
    pub end_location_area: Option<DeliveryZone>,
    pub end_meter_count: Option<f64>,
    pub customer_name: Option<String>,
    pub phone_number: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManualDurationRequest {
    pub user_id: String,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

/// Everything the wizard renders for the current step.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TripView {
    pub service_type: ServiceType,
    pub service_title: String,
    pub step: TripStep,
    pub pickup_location: String,
    pub pickup_area: Option<TripArea>,
    pub start_meter_count: Option<f64>,
    pub pickup_timestamp: Option<DateTime<Utc>>,
    pub drop_location: String,
    pub drop_area: Option<TripArea>,
    pub end_location_area: Option<DeliveryZone>,
    pub end_meter_count: Option<f64>,
    pub trip_duration: String,
    pub elapsed_seconds: i64,
    // current duration split into the manual H/M/S input fields
    pub duration_hours: u32,
    pub duration_minutes: u32,
    pub duration_seconds: u32,
    pub is_timer_running: bool,
    pub is_manual_time: bool,
    pub waiting_seconds: i64,
    pub waiting_charge: i64,
    pub distance_km: f64,
    pub can_start_trip: bool,
    pub can_end_trip: bool,
    pub customer_name: String,
    pub phone_number: String,
    pub payment_method: PaymentMethod,
    pub fare: Option<FareBreakdown>,
}

/// Shown before the first wizard step when a persisted in-progress trip
/// exists for the signed-in user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResumePrompt {
    pub service_type: ServiceType,
    pub step: TripStep,
    pub pickup_location: String,
    pub drop_location: String,
    pub last_updated: DateTime<Utc>,
}

impl ResumePrompt {
    pub fn from_snapshot(snapshot: &TripSnapshot) -> Self {
        Self {
            service_type: snapshot.trip.service_type,
            step: snapshot.trip.step,
            pickup_location: snapshot.trip.pickup_location.clone(),
            drop_location: snapshot.trip.drop_location.clone(),
            last_updated: snapshot.last_updated,
        }
    }
}

/// Stateless fare estimate, evaluated outside any trip.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "kebab-case")]
pub enum QuoteRequest {
    DrinkAndDrive {
        distance_km: f64,
        duration_minutes: i64,
        pickup_out_of_colombo: bool,
        drop_out_of_colombo: bool,
        waiting_seconds: i64,
    },
    DayTime {
        duration_minutes: i64,
        out_of_colombo: bool,
    },
    DayTimeLong {
        days: i64,
    },
    VehicleDelivery {
        // Raw zone string so unknown areas fall back to the cheapest tier
        end_location_area: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_requires_service_specific_fields() {
        let mut trip = TripState::new(ServiceType::DrinkAndDrive);
        trip.pickup_location = "Galle Road".to_string();
        trip.pickup_timestamp = Some(Utc::now());
        assert!(!trip.can_leave_pickup());

        trip.pickup_area = Some(TripArea::Colombo);
        assert!(!trip.can_leave_pickup());

        trip.start_meter_count = Some(120.0);
        assert!(trip.can_leave_pickup());
    }

    #[test]
    fn day_time_skips_meter_vehicle_delivery_skips_area() {
        let mut day = TripState::new(ServiceType::DayTime);
        day.pickup_location = "Fort".to_string();
        day.pickup_area = Some(TripArea::Colombo);
        day.pickup_timestamp = Some(Utc::now());
        assert!(day.can_leave_pickup());

        let mut delivery = TripState::new(ServiceType::VehicleDelivery);
        delivery.pickup_location = "Kandy".to_string();
        delivery.start_meter_count = Some(10.0);
        delivery.pickup_timestamp = Some(Utc::now());
        assert!(delivery.can_leave_pickup());

        delivery.drop_location = "Colombo 3".to_string();
        delivery.end_meter_count = Some(125.0);
        assert!(!delivery.can_leave_dropoff());
        delivery.end_location_area = Some(DeliveryZone::ColomboArea);
        assert!(delivery.can_leave_dropoff());
    }

    #[test]
    fn metered_distance_clamps_to_zero() {
        let mut trip = TripState::new(ServiceType::DrinkAndDrive);
        trip.start_meter_count = Some(100.0);
        trip.end_meter_count = Some(90.0);
        assert_eq!(trip.metered_distance_km(), 0.0);

        trip.end_meter_count = Some(113.0);
        assert_eq!(trip.metered_distance_km(), 13.0);
    }

    #[test]
    fn zone_parsing_defaults_to_lowest_tier() {
        assert_eq!(DeliveryZone::parse_or_lowest("island-wide"), DeliveryZone::IslandWide);
        assert_eq!(DeliveryZone::parse_or_lowest("outer-space"), DeliveryZone::Colombo1To5);
    }

    #[test]
    fn status_follows_payment_method() {
        assert_eq!(TripStatus::for_payment(PaymentMethod::Cash), TripStatus::Completed);
        assert_eq!(TripStatus::for_payment(PaymentMethod::Credit), TripStatus::Pending);
    }
}
