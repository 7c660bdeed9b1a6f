//! Synthetic demo readings for an empty store.
//!
//! Eight cities across Telangana and Andhra Pradesh, one reading per city
//! per interval, with a daily sine swing and Gaussian noise on every
//! measurement.

use std::f64::consts::PI;

use chrono::{DateTime, TimeDelta, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use uuid::Uuid;

use crate::models::StoredReading;

// ---

pub struct City {
    // ---
    pub name: &'static str,
    pub state: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

const fn city(name: &'static str, state: &'static str, latitude: f64, longitude: f64) -> City {
    City {
        name,
        state,
        latitude,
        longitude,
    }
}

pub const CITIES: [City; 8] = [
    city("Hyderabad", "Telangana", 17.3850, 78.4867),
    city("Warangal", "Telangana", 17.9689, 79.5941),
    city("Nizamabad", "Telangana", 18.6725, 78.0941),
    city("Karimnagar", "Telangana", 18.4385, 79.1288),
    city("Vijayawada", "Andhra Pradesh", 16.5062, 80.6480),
    city("Visakhapatnam", "Andhra Pradesh", 17.6868, 83.2185),
    city("Tirupati", "Andhra Pradesh", 13.6288, 79.4192),
    city("Guntur", "Andhra Pradesh", 16.3067, 80.4365),
];

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Normal sample clamped at zero. An invalid spread yields the mean.
fn gaussian(rng: &mut ChaCha8Rng, mean: f64, std_dev: f64) -> f64 {
    // ---
    let sample = Normal::new(mean, std_dev).map_or(mean, |normal| normal.sample(rng));
    sample.max(0.0)
}

/// Swing of ±10 over a 24-point cycle.
fn daily_variation(point: usize) -> f64 {
    (point as f64 / 24.0 * 2.0 * PI).sin() * 10.0
}

/// Readings covering the `days` before `now`, oldest first.
pub fn generate_readings(days: u32, interval_minutes: u32, now: DateTime<Utc>, seed: u64) -> Vec<StoredReading> {
    // ---
    if interval_minutes == 0 {
        return Vec::new();
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let total_points = (days as usize * 24 * 60) / interval_minutes as usize;
    let mut readings = Vec::with_capacity(total_points * CITIES.len());

    for point in 0..total_points {
        let minutes_back = i64::from(interval_minutes) * (total_points - point) as i64;
        let timestamp = now - TimeDelta::minutes(minutes_back);
        let variation = daily_variation(point);

        for c in &CITIES {
            let telangana = c.state == "Telangana";
            let pm25 = gaussian(&mut rng, if telangana { 40.0 } else { 35.0 } + variation, 6.0);
            let pm10 = gaussian(&mut rng, if telangana { 80.0 } else { 70.0 } + variation, 10.0);
            let co2 = gaussian(&mut rng, 550.0 + variation * 5.0, 35.0);
            let no2 = gaussian(&mut rng, 30.0 + variation * 1.5, 6.0);
            let temperature = gaussian(&mut rng, if telangana { 31.0 } else { 30.0 }, 1.8);
            let humidity = gaussian(&mut rng, 55.0 - variation, 4.0).clamp(20.0, 95.0);

            readings.push(StoredReading {
                id: Uuid::new_v4(),
                city: c.name.to_string(),
                state: c.state.to_string(),
                latitude: c.latitude,
                longitude: c.longitude,
                pm25: Some(round2(pm25)),
                pm10: Some(round2(pm10)),
                co2: Some(round2(co2)),
                no2: Some(round2(no2)),
                temperature: Some(round2(temperature)),
                humidity: Some(round2(humidity)),
                timestamp,
            });
        }
    }

    readings
}
