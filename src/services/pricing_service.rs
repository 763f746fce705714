// src/services/pricing_service.rs
//
// Pure fare rules, in whole rupees. Nothing here touches the clock or the
// store; the workflow hands in accumulated seconds and meter deltas and
// gets a breakdown back. Negative inputs are clamped to zero, never
// rejected.

use crate::models::trip::{DeliveryZone, FareBreakdown, QuoteRequest};

// Waiting time: first 15 minutes free, then Rs.300 per started 15 minutes
const FREE_WAITING_SECONDS: i64 = 900;
const WAITING_BLOCK_SECONDS: i64 = 900;
const WAITING_BLOCK_CHARGE: i64 = 300;

// Drink and drive: first 10km included, Rs.100 per km beyond, Rs.500 per
// out-of-Colombo endpoint
const INCLUDED_DISTANCE_KM: f64 = 10.0;
const PER_KM_CHARGE: f64 = 100.0;
const OUT_OF_COLOMBO_CHARGE: i64 = 500;

// Day time: Rs.300 surcharge outside Colombo, Rs.500 per hour past 12,
// Rs.5500 per day on multi-day charters
const DAY_TIME_AREA_CHARGE: i64 = 300;
const DAY_TIME_EXTRA_HOUR_CHARGE: i64 = 500;
const DAY_TIME_LONG_DAILY_RATE: i64 = 5500;

const COMPANY_COMMISSION_RATE: f64 = 0.2;

/// Rs.300 per started 15-minute block beyond the free 15 minutes.
pub fn waiting_charge(waiting_seconds: i64) -> i64 {
    let seconds = waiting_seconds.max(0);
    if seconds <= FREE_WAITING_SECONDS {
        return 0;
    }

    let extra = seconds - FREE_WAITING_SECONDS;
    let blocks = (extra + WAITING_BLOCK_SECONDS - 1) / WAITING_BLOCK_SECONDS;
    blocks * WAITING_BLOCK_CHARGE
}

/// Base charge by trip duration: the single band the duration lands in,
/// not a running sum.
fn drink_and_drive_base(duration_minutes: i64) -> i64 {
    let minutes = duration_minutes.max(0);
    match minutes {
        0..=55 => 1700,
        56..=110 => 2400,
        111..=165 => 3100,
        166..=220 => 3700,
        221..=275 => 4400,
        _ => 5500 + 500 * ((minutes - 275) / 60),
    }
}

/// Rs.100 per km beyond the included 10km, rounded to the nearest rupee.
fn distance_surcharge(distance_km: f64) -> i64 {
    let distance = distance_km.max(0.0);
    if distance > INCLUDED_DISTANCE_KM {
        ((distance - INCLUDED_DISTANCE_KM) * PER_KM_CHARGE).round() as i64
    } else {
        0
    }
}

pub fn drink_and_drive_fare(
    distance_km: f64,
    duration_minutes: i64,
    pickup_out_of_colombo: bool,
    drop_out_of_colombo: bool,
    waiting_charge: i64,
) -> FareBreakdown {
    let base = drink_and_drive_base(duration_minutes);
    let distance = distance_surcharge(distance_km);

    let mut area = 0;
    if pickup_out_of_colombo {
        area += OUT_OF_COLOMBO_CHARGE;
    }
    if drop_out_of_colombo {
        area += OUT_OF_COLOMBO_CHARGE;
    }

    compose(base, distance, area, waiting_charge.max(0))
}

/// Hourly charter. Hours are counted as ceil(minutes / 60) and priced off
/// the flat table; past 12 hours every extra hour adds Rs.500.
pub fn day_time_fare(duration_minutes: i64, out_of_colombo: bool) -> FareBreakdown {
    let minutes = duration_minutes.max(0);
    let hours = (minutes + 59) / 60;

    let base = match hours {
        0..=4 => 3000,
        5 => 3400,
        6 => 3800,
        7 => 4200,
        8 => 4600,
        9 => 5000,
        10 => 5400,
        11 => 5800,
        12 => 6000,
        _ => 6000 + DAY_TIME_EXTRA_HOUR_CHARGE * (hours - 12),
    };

    let area = if out_of_colombo { DAY_TIME_AREA_CHARGE } else { 0 };
    compose(base, 0, area, 0)
}

/// Multi-day charter quote, flat daily rate.
pub fn day_time_long_fare(days: i64) -> FareBreakdown {
    compose(days.max(0) * DAY_TIME_LONG_DAILY_RATE, 0, 0, 0)
}

/// Flat rate by destination zone; time and distance never matter.
pub fn vehicle_delivery_fare(zone: DeliveryZone) -> FareBreakdown {
    let base = match zone {
        DeliveryZone::Colombo1To5 => 1500,
        DeliveryZone::ColomboArea => 2000,
        DeliveryZone::WesternProvince => 3000,
        DeliveryZone::IslandWide => 5000,
    };
    compose(base, 0, 0, 0)
}

/// 20/80 company/driver split. Commission is rounded to the rupee and the
/// driver gets the remainder, so the two always sum back to the total.
pub fn split_payment(total: i64) -> (i64, i64) {
    let commission = ((total as f64) * COMPANY_COMMISSION_RATE).round() as i64;
    (commission, total - commission)
}

/// Stateless estimate for the quote endpoint.
pub fn quote(request: &QuoteRequest) -> FareBreakdown {
    match request {
        QuoteRequest::DrinkAndDrive {
            distance_km,
            duration_minutes,
            pickup_out_of_colombo,
            drop_out_of_colombo,
            waiting_seconds,
        } => drink_and_drive_fare(
            *distance_km,
            *duration_minutes,
            *pickup_out_of_colombo,
            *drop_out_of_colombo,
            waiting_charge(*waiting_seconds),
        ),
        QuoteRequest::DayTime { duration_minutes, out_of_colombo } => {
            day_time_fare(*duration_minutes, *out_of_colombo)
        }
        QuoteRequest::DayTimeLong { days } => day_time_long_fare(*days),
        QuoteRequest::VehicleDelivery { end_location_area } => {
            vehicle_delivery_fare(DeliveryZone::parse_or_lowest(end_location_area))
        }
    }
}

fn compose(base: i64, distance: i64, area: i64, waiting: i64) -> FareBreakdown {
    let total = base + distance + area + waiting;
    let (commission, driver) = split_payment(total);

    FareBreakdown {
        base_payment: base,
        distance_surcharge: distance,
        area_surcharge: area,
        waiting_surcharge: waiting,
        total_payment: total,
        company_commission: commission,
        driver_payment: driver,
    }
}
