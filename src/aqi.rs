//! AQI scoring: pollutant concentrations to a unified Air Quality Index.
//!
//! Each tracked pollutant has a piecewise-linear breakpoint table mapping a
//! concentration range onto an AQI range. The reading's AQI is the highest
//! sub-index among the pollutants that produced a score, and that pollutant
//! is reported as the primary pollutant.
//!
//! Everything in here is pure: no I/O, no shared state beyond the static
//! tables.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

// ---

/// Category reported when no pollutant produced a score.
pub const UNKNOWN_CATEGORY: &str = "Unknown";
const UNKNOWN_COLOR: &str = "#9ca3af";
const UNKNOWN_HEALTH: &str = "Insufficient data";

/// Pollutants that participate in AQI scoring, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    No2,
    Co2,
}

/// Fixed iteration order. Ties on the sub-index go to the earlier entry.
pub const POLLUTANTS: [Pollutant; 4] = [
    Pollutant::Pm25,
    Pollutant::Pm10,
    Pollutant::No2,
    Pollutant::Co2,
];

impl Pollutant {
    // ---
    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::No2 => "no2",
            Pollutant::Co2 => "co2",
        }
    }

    pub fn breakpoints(self) -> &'static [Breakpoint] {
        // ---
        match self {
            Pollutant::Pm25 => &PM25_BREAKPOINTS,
            Pollutant::Pm10 => &PM10_BREAKPOINTS,
            Pollutant::No2 => &NO2_BREAKPOINTS,
            Pollutant::Co2 => &CO2_BREAKPOINTS,
        }
    }
}

/// One tier of a breakpoint table. Both concentration bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    // ---
    pub conc_low: f64,
    pub conc_high: f64,
    pub aqi_low: f64,
    pub aqi_high: f64,
}

const fn bp(conc_low: f64, conc_high: f64, aqi_low: f64, aqi_high: f64) -> Breakpoint {
    Breakpoint {
        conc_low,
        conc_high,
        aqi_low,
        aqi_high,
    }
}

impl Breakpoint {
    // ---
    fn contains(&self, value: f64) -> bool {
        self.conc_low <= value && value <= self.conc_high
    }

    /// Linear interpolation across this tier. Also used past `conc_high`
    /// for the last tier.
    fn scale(&self, value: f64) -> f64 {
        // ---
        (self.aqi_high - self.aqi_low) / (self.conc_high - self.conc_low)
            * (value - self.conc_low)
            + self.aqi_low
    }
}

static PM25_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 12.0, 0.0, 50.0),
    bp(12.1, 35.4, 51.0, 100.0),
    bp(35.5, 55.4, 101.0, 150.0),
    bp(55.5, 150.4, 151.0, 200.0),
    bp(150.5, 250.4, 201.0, 300.0),
    bp(250.5, 350.4, 301.0, 400.0),
    bp(350.5, 500.4, 401.0, 500.0),
];

static PM10_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 54.0, 0.0, 50.0),
    bp(55.0, 154.0, 51.0, 100.0),
    bp(155.0, 254.0, 101.0, 150.0),
    bp(255.0, 354.0, 151.0, 200.0),
    bp(355.0, 424.0, 201.0, 300.0),
    bp(425.0, 504.0, 301.0, 400.0),
    bp(505.0, 604.0, 401.0, 500.0),
];

static NO2_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 53.0, 0.0, 50.0),
    bp(54.0, 100.0, 51.0, 100.0),
    bp(101.0, 360.0, 101.0, 150.0),
    bp(361.0, 649.0, 151.0, 200.0),
    bp(650.0, 1249.0, 201.0, 300.0),
    bp(1250.0, 1649.0, 301.0, 400.0),
    bp(1650.0, 2049.0, 401.0, 500.0),
];

static CO2_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 600.0, 0.0, 50.0),
    bp(601.0, 1000.0, 51.0, 100.0),
    bp(1001.0, 1500.0, 101.0, 150.0),
    bp(1501.0, 2000.0, 151.0, 200.0),
    bp(2001.0, 5000.0, 201.0, 300.0),
    bp(5001.0, 10000.0, 301.0, 400.0),
    bp(10001.0, 20000.0, 401.0, 500.0),
];

/// One row of the AQI category scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AqiCategory {
    // ---
    pub name: &'static str,
    pub low: i32,
    pub high: i32,
    pub color: &'static str,
    pub health: &'static str,
}

/// Categories in ascending severity. Ranges partition 0..=500; the last one
/// also absorbs anything above 500.
pub static AQI_SCALE: [AqiCategory; 6] = [
    AqiCategory {
        name: "Good",
        low: 0,
        high: 50,
        color: "#00E400",
        health: "Air quality is satisfactory.",
    },
    AqiCategory {
        name: "Moderate",
        low: 51,
        high: 100,
        color: "#FFFF00",
        health: "Acceptable; some pollutants may be a moderate concern.",
    },
    AqiCategory {
        name: "Unhealthy for Sensitive Groups",
        low: 101,
        high: 150,
        color: "#FF7E00",
        health: "Sensitive groups should limit outdoor exertion.",
    },
    AqiCategory {
        name: "Unhealthy",
        low: 151,
        high: 200,
        color: "#FF0000",
        health: "Everyone may begin to experience effects.",
    },
    AqiCategory {
        name: "Very Unhealthy",
        low: 201,
        high: 300,
        color: "#8F3F97",
        health: "Health warnings of emergency conditions.",
    },
    AqiCategory {
        name: "Hazardous",
        low: 301,
        high: 500,
        color: "#7E0023",
        health: "Serious risk for entire population.",
    },
];

/// Pollutant inputs to [`compute_aqi`]. Any of them may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pollutants {
    // ---
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub co2: Option<f64>,
}

impl Pollutants {
    // ---
    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        // ---
        match pollutant {
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::No2 => self.no2,
            Pollutant::Co2 => self.co2,
        }
    }
}

/// Derived AQI metadata for one set of pollutant readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AqiResult {
    // ---
    pub aqi: i32,
    pub category: &'static str,
    pub color: &'static str,
    pub health: &'static str,
    pub primary_pollutant: Option<Pollutant>,
}

impl AqiResult {
    /// The "no data" result. Distinguished from a real "Good" reading by
    /// its category.
    pub fn unknown() -> Self {
        // ---
        AqiResult {
            aqi: 0,
            category: UNKNOWN_CATEGORY,
            color: UNKNOWN_COLOR,
            health: UNKNOWN_HEALTH,
            primary_pollutant: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.category == UNKNOWN_CATEGORY
    }
}

/// Sub-index for a single pollutant concentration.
///
/// Returns `None` when the value is missing, below the first tier, or falls
/// into a gap between two tiers. Values above the last tier are extrapolated
/// with the last tier's slope.
pub fn sub_index(pollutant: Pollutant, value: f64) -> Option<f64> {
    // ---
    let table = pollutant.breakpoints();

    if let Some(tier) = table.iter().find(|tier| tier.contains(value)) {
        return Some(tier.scale(value));
    }

    match table.last() {
        Some(last) if value > last.conc_high => Some(last.scale(value)),
        _ => None,
    }
}

/// Category for an integer AQI. Falls back to the most severe category.
pub fn category_for(aqi: i32) -> &'static AqiCategory {
    // ---
    AQI_SCALE
        .iter()
        .find(|cat| cat.low <= aqi && aqi <= cat.high)
        .unwrap_or(&AQI_SCALE[AQI_SCALE.len() - 1])
}

/// Compute the AQI, category and primary pollutant for a set of readings.
pub fn compute_aqi(pollutants: &Pollutants) -> AqiResult {
    // ---
    let mut primary: Option<(Pollutant, f64)> = None;

    for pollutant in POLLUTANTS {
        let Some(score) = pollutants
            .get(pollutant)
            .and_then(|value| sub_index(pollutant, value))
        else {
            continue;
        };

        // Strict comparison keeps the earlier pollutant on ties.
        if primary.map_or(true, |(_, best)| score > best) {
            primary = Some((pollutant, score));
        }
    }

    let Some((pollutant, score)) = primary else {
        return AqiResult::unknown();
    };

    // f64::round rounds half away from zero.
    let aqi = score.round() as i32;
    let category = category_for(aqi);

    AqiResult {
        aqi,
        category: category.name,
        color: category.color,
        health: category.health,
        primary_pollutant: Some(pollutant),
    }
}

/// Category name to color, in a stable order.
pub fn get_category_palette() -> &'static BTreeMap<&'static str, &'static str> {
    // ---
    static PALETTE: OnceLock<BTreeMap<&'static str, &'static str>> = OnceLock::new();
    PALETTE.get_or_init(|| AQI_SCALE.iter().map(|cat| (cat.name, cat.color)).collect())
}

/// Mean of the last `window` values, or 0.0 when there are none.
pub fn rolling_average(values: &[f64], window: usize) -> f64 {
    // ---
    let start = values.len().saturating_sub(window);
    let tail = &values[start..];
    if tail.is_empty() {
        return 0.0;
    }
    tail.iter().sum::<f64>() / tail.len() as f64
}
