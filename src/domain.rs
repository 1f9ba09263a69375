use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// the three series the hub stores, each in its own append-only table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Temperature,
    Humidity,
    Mq6,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Temperature, Metric::Humidity, Metric::Mq6];

    pub fn table(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature_data",
            Metric::Humidity => "humidity_data",
            Metric::Mq6 => "mq6_data",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Mq6 => "mq6_reading",
        }
    }

    /// chart caption
    pub fn title(self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature Data",
            Metric::Humidity => "Humidity Data",
            Metric::Mq6 => "MQ6 Sensor Data",
        }
    }

    /// chart y-axis description
    pub fn axis_label(self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature (°C)",
            Metric::Humidity => "Humidity (%)",
            Metric::Mq6 => "MQ6 Reading",
        }
    }
}

/// one stored sample; immutable once written
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

// listings go out as `[timestamp, value]` pairs
impl Serialize for Reading {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.timestamp, self.value).serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// body of `POST /temperature_humidity_data` (aht21 on esp32_1)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClimatePayload {
    pub temperature: f64,
    pub humidity: f64,
}

/// body of `POST /mq6_data` (mq6 on esp32_2)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GasPayload {
    pub mq6_reading: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}
