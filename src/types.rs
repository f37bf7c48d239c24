//! Domain types shared across the calibration pipeline.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A raw instrument channel as laid out in a logger export.
///
/// Raw files are positional CSV with no usable header: a timestamp column,
/// one placeholder column the loggers emit but nothing consumes, and the
/// eight measurement channels below at fixed positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "CO")]
    Co,
    #[serde(rename = "NO")]
    No,
    #[serde(rename = "NO2")]
    No2,
    #[serde(rename = "O3")]
    O3,
    #[serde(rename = "CO2")]
    Co2,
    #[serde(rename = "T")]
    Temp,
    #[serde(rename = "RH")]
    Rh,
    #[serde(rename = "PM2.5")]
    Pm25,
}

impl Channel {
    pub const ALL: [Channel; 8] = [
        Channel::Co,
        Channel::No,
        Channel::No2,
        Channel::O3,
        Channel::Co2,
        Channel::Temp,
        Channel::Rh,
        Channel::Pm25,
    ];

    /// Column position of this channel in the raw export.
    ///
    /// Column 0 is the timestamp and column 1 is the unused placeholder, so
    /// measurement channels start at 2.
    pub fn raw_column(self) -> usize {
        match self {
            Channel::Co => 2,
            Channel::No => 3,
            Channel::No2 => 4,
            Channel::O3 => 5,
            Channel::Co2 => 6,
            Channel::Temp => 7,
            Channel::Rh => 8,
            Channel::Pm25 => 9,
        }
    }

    /// Index of this channel in a [`RawReading`]'s value array.
    pub fn index(self) -> usize {
        self.raw_column() - 2
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Co => "CO",
            Channel::No => "NO",
            Channel::No2 => "NO2",
            Channel::O3 => "O3",
            Channel::Co2 => "CO2",
            Channel::Temp => "T",
            Channel::Rh => "RH",
            Channel::Pm25 => "PM2.5",
        }
    }
}

/// A pollutant with a calibrated concentration in the output table.
///
/// Temperature and humidity are model features only and never appear here.
/// The declaration order of [`Pollutant::AQHI`] doubles as the documented
/// tie-break order for contributor attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pollutant {
    #[serde(rename = "CO")]
    Co,
    #[serde(rename = "NO")]
    No,
    #[serde(rename = "NO2")]
    No2,
    #[serde(rename = "O3")]
    O3,
    #[serde(rename = "CO2")]
    Co2,
    #[serde(rename = "PM2.5")]
    Pm25,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Co,
        Pollutant::No,
        Pollutant::No2,
        Pollutant::O3,
        Pollutant::Co2,
        Pollutant::Pm25,
    ];

    /// The three pollutants that feed the composite health index, in
    /// tie-break order.
    pub const AQHI: [Pollutant; 3] = [Pollutant::No2, Pollutant::O3, Pollutant::Pm25];

    pub fn index(self) -> usize {
        match self {
            Pollutant::Co => 0,
            Pollutant::No => 1,
            Pollutant::No2 => 2,
            Pollutant::O3 => 3,
            Pollutant::Co2 => 4,
            Pollutant::Pm25 => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Pollutant::Co => "CO",
            Pollutant::No => "NO",
            Pollutant::No2 => "NO2",
            Pollutant::O3 => "O3",
            Pollutant::Co2 => "CO2",
            Pollutant::Pm25 => "PM2.5",
        }
    }
}

impl std::fmt::Display for Pollutant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One timestamped row from a raw logger export.
///
/// The timestamp carries the fixed source offset and has already had the
/// DST shim applied. Channel cells that failed to parse hold NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub timestamp: DateTime<FixedOffset>,
    channels: [f64; 8],
}

impl RawReading {
    pub fn new(timestamp: DateTime<FixedOffset>, channels: [f64; 8]) -> Self {
        Self {
            timestamp,
            channels,
        }
    }

    pub fn channel(&self, channel: Channel) -> f64 {
        self.channels[channel.index()]
    }
}

/// A calibrated row before the rolling/index step.
///
/// Timestamps are in the display timezone. A `None` value means the hybrid
/// model declined that row (out-of-band with no tail model, missing input,
/// or no model for the pollutant at all).
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedRow {
    pub timestamp: DateTime<FixedOffset>,
    values: [Option<f64>; 6],
}

impl CalibratedRow {
    pub fn new(timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            timestamp,
            values: [None; 6],
        }
    }

    pub fn value(&self, pollutant: Pollutant) -> Option<f64> {
        self.values[pollutant.index()]
    }

    pub fn set_value(&mut self, pollutant: Pollutant, value: Option<f64>) {
        self.values[pollutant.index()] = value;
    }
}

/// One row of the calibrated output CSV.
///
/// `None` serializes as an empty field, which is the explicit missing
/// marker downstream consumers look for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedRecord {
    pub date: DateTime<FixedOffset>,
    pub co: Option<f64>,
    pub no: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub co2: Option<f64>,
    pub pm25: Option<f64>,
    pub aqhi: Option<f64>,
    pub top_contributor: Option<Pollutant>,
}

impl CalibratedRecord {
    pub fn from_row(
        row: &CalibratedRow,
        aqhi: Option<f64>,
        top_contributor: Option<Pollutant>,
    ) -> Self {
        Self {
            date: row.timestamp,
            co: row.value(Pollutant::Co),
            no: row.value(Pollutant::No),
            no2: row.value(Pollutant::No2),
            o3: row.value(Pollutant::O3),
            co2: row.value(Pollutant::Co2),
            pm25: row.value(Pollutant::Pm25),
            aqhi,
            top_contributor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_positions_are_contiguous() {
        for (i, c) in Channel::ALL.iter().enumerate() {
            assert_eq!(c.raw_column(), i + 2);
            assert_eq!(c.index(), i);
        }
    }

    #[test]
    fn test_pollutant_serde_labels() {
        let json = serde_json::to_string(&Pollutant::Pm25).unwrap();
        assert_eq!(json, "\"PM2.5\"");
        let back: Pollutant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Pollutant::Pm25);
    }

    #[test]
    fn test_aqhi_order_is_tie_break_order() {
        assert_eq!(
            Pollutant::AQHI,
            [Pollutant::No2, Pollutant::O3, Pollutant::Pm25]
        );
    }
}
