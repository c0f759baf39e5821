use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Display order: 4AM-9AM, 10AM-3PM, 4PM-9PM, 10PM-3AM. The declaration
/// order is the ordinal used for sorting, not the hour the bucket starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeOfDay {
    Morning,
    Midday,
    Evening,
    Overnight,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Midday,
        TimeOfDay::Evening,
        TimeOfDay::Overnight,
    ];

    pub fn from_hour(hour: u32) -> Option<Self> {
        match hour {
            4..=9 => Some(TimeOfDay::Morning),
            10..=15 => Some(TimeOfDay::Midday),
            16..=21 => Some(TimeOfDay::Evening),
            22 | 23 | 0..=3 => Some(TimeOfDay::Overnight),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "4AM-9AM",
            TimeOfDay::Midday => "10AM-3PM",
            TimeOfDay::Evening => "4PM-9PM",
            TimeOfDay::Overnight => "10PM-3AM",
        }
    }

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }
}

/// Eight half-open 45 degree bins starting at 0. The declaration order is
/// both the bin order (0-45 is E, 45-90 is NE, ... 315-360 is SE) and the
/// display order required downstream. This labeling is deliberately not the
/// rotational compass order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cardinal {
    East,
    NorthEast,
    North,
    NorthWest,
    West,
    SouthWest,
    South,
    SouthEast,
}

impl Cardinal {
    pub const ALL: [Cardinal; 8] = [
        Cardinal::East,
        Cardinal::NorthEast,
        Cardinal::North,
        Cardinal::NorthWest,
        Cardinal::West,
        Cardinal::SouthWest,
        Cardinal::South,
        Cardinal::SouthEast,
    ];

    /// Out-of-range directions (negative, 360 or more) match no bin and
    /// yield None. No modulo wrapping.
    pub fn from_degrees(degrees: f64) -> Option<Self> {
        if !degrees.is_finite() || degrees < 0.0 || degrees >= 360.0 {
            return None;
        }
        let bin = (degrees / 45.0).floor() as usize;
        Some(Self::ALL[bin])
    }

    pub fn label(&self) -> &'static str {
        match self {
            Cardinal::East => "E",
            Cardinal::NorthEast => "NE",
            Cardinal::North => "N",
            Cardinal::NorthWest => "NW",
            Cardinal::West => "W",
            Cardinal::SouthWest => "SW",
            Cardinal::South => "S",
            Cardinal::SouthEast => "SE",
        }
    }

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }
}

/// Source-to-canonical column mapping for the measurement file. Downstream
/// stages only ever see the canonical names, so pointing these fields at the
/// raw schema is the only change needed for a differently labeled export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementColumns {
    pub timestamp: String,
    pub site: String,
    pub power: String,
    pub temp: String,
    pub angle: String,
    pub rotor_speed: String,
    pub direction: String,
    pub wind_speed: String,
}

impl Default for MeasurementColumns {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".to_string(),
            site: "site".to_string(),
            power: "power".to_string(),
            temp: "temp".to_string(),
            angle: "angle".to_string(),
            rotor_speed: "rotor_speed".to_string(),
            direction: "direction".to_string(),
            wind_speed: "wind_speed".to_string(),
        }
    }
}

impl MeasurementColumns {
    /// (source name, canonical name) pairs for the six sensor columns.
    pub fn sensor_pairs(&self) -> [(&str, &'static str); 6] {
        [
            (self.power.as_str(), "power"),
            (self.temp.as_str(), "temp"),
            (self.angle.as_str(), "angle"),
            (self.rotor_speed.as_str(), "rotor_speed"),
            (self.direction.as_str(), "direction"),
            (self.wind_speed.as_str(), "wind_speed"),
        ]
    }
}

/// Source-to-canonical column mapping for the site metadata file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataColumns {
    pub site: String,
    pub turbine_count: String,
    pub rated_capacity: String,
    pub latitude: String,
    pub longitude: String,
    pub jurisdiction: String,
    pub country: String,
}

impl Default for MetadataColumns {
    fn default() -> Self {
        Self {
            site: "site".to_string(),
            turbine_count: "turbine_count".to_string(),
            rated_capacity: "rated_capacity".to_string(),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            jurisdiction: "jurisdiction".to_string(),
            country: "country".to_string(),
        }
    }
}

impl MetadataColumns {
    pub fn pairs(&self) -> [(&str, &'static str); 7] {
        [
            (self.site.as_str(), "site"),
            (self.turbine_count.as_str(), "turbine_count"),
            (self.rated_capacity.as_str(), "rated_capacity"),
            (self.latitude.as_str(), "latitude"),
            (self.longitude.as_str(), "longitude"),
            (self.jurisdiction.as_str(), "jurisdiction"),
            (self.country.as_str(), "country"),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The full set of known site identifiers. Grid expansion covers every
    /// one of these even when a site has no readings at all.
    pub site_ids: Vec<i64>,
    /// Wind is considered present only when speed is strictly above this.
    pub wind_speed_threshold: f64,
    /// Drop rows before this date ahead of rolling aggregation. None keeps
    /// the full range; callers pass the dataset's stabilization date.
    pub rolling_cutoff: Option<NaiveDate>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            site_ids: vec![1, 2, 3, 4],
            wind_speed_threshold: 0.0,
            rolling_cutoff: None,
        }
    }
}

impl PipelineConfig {
    pub fn new(site_ids: Vec<i64>) -> Self {
        Self {
            site_ids,
            ..Default::default()
        }
    }

    pub fn with_rolling_cutoff(mut self, cutoff: NaiveDate) -> Self {
        self.rolling_cutoff = Some(cutoff);
        self
    }

    pub fn with_wind_speed_threshold(mut self, threshold: f64) -> Self {
        self.wind_speed_threshold = threshold;
        self
    }
}
