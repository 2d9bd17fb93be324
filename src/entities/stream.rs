// 🎚️ Stream Entity - one channel epoch (e.g. BHZ) of a sensor location
//
// A stream points at exactly one sensor and one datalogger through their
// publicIDs. Those are weak references: the stream does not own the
// equipment and the Inventory resolves them on demand.

use super::{
    check_epoch, check_not_empty, check_range, epoch_field, format_bool, format_number,
    parse_bool, parse_f64, parse_text, parse_u32, set_epoch_field, unknown_field, Entity,
    EntityKind, Record, Violation,
};
use crate::temporal::Epoch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    /// Channel code, e.g. "BHZ"
    pub code: String,
    pub epoch: Epoch,

    // ========================================================================
    // EQUIPMENT REFERENCES (publicIDs, resolved by the Inventory)
    // ========================================================================
    pub sensor: String,
    pub datalogger: String,

    pub sensor_serial_number: Option<String>,
    pub sensor_channel: Option<u32>,
    pub datalogger_serial_number: Option<String>,
    pub datalogger_channel: Option<u32>,
    pub clock_serial_number: Option<String>,

    // ========================================================================
    // ACQUISITION
    // ========================================================================
    pub sample_rate_numerator: Option<u32>,
    pub sample_rate_denominator: Option<u32>,
    pub depth: Option<f64>,

    /// Degrees clockwise from north, [0, 360]
    pub azimuth: Option<f64>,

    /// Degrees from horizontal, [-90, 90]
    pub dip: Option<f64>,

    pub gain: Option<f64>,
    pub gain_frequency: Option<f64>,
    pub gain_unit: Option<String>,
    pub format: Option<String>,
    pub flags: Option<String>,
    pub restricted: Option<bool>,
    pub shared: Option<bool>,
}

impl Stream {
    pub fn new(code: &str, start: DateTime<Utc>, sensor: &str, datalogger: &str) -> Self {
        Stream {
            code: code.to_string(),
            epoch: Epoch::open(start),
            sensor: sensor.to_string(),
            datalogger: datalogger.to_string(),
            ..Default::default()
        }
    }

    /// Builder pattern: close the epoch
    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.epoch.end = Some(end);
        self
    }

    /// Builder pattern: sample rate as numerator / denominator
    pub fn with_sample_rate(mut self, numerator: u32, denominator: u32) -> Self {
        self.sample_rate_numerator = Some(numerator);
        self.sample_rate_denominator = Some(denominator);
        self
    }

    /// Builder pattern: orientation
    pub fn with_orientation(mut self, azimuth: f64, dip: f64) -> Self {
        self.azimuth = Some(azimuth);
        self.dip = Some(dip);
        self
    }

    /// Samples per second; a missing denominator counts as 1.
    pub fn sample_rate(&self) -> Option<f64> {
        let numerator = self.sample_rate_numerator?;
        let denominator = self.sample_rate_denominator.unwrap_or(1);
        if denominator == 0 {
            return None;
        }
        Some(numerator as f64 / denominator as f64)
    }
}

impl Record for Stream {
    const KIND: EntityKind = EntityKind::Stream;
    const ATTRIBUTES: &'static [&'static str] = &["code", "datalogger", "sensor"];
    const FIELDS: &'static [&'static str] = &[
        "start",
        "end",
        "dataloggerSerialNumber",
        "dataloggerChannel",
        "sensorSerialNumber",
        "sensorChannel",
        "clockSerialNumber",
        "sampleRateNumerator",
        "sampleRateDenominator",
        "depth",
        "azimuth",
        "dip",
        "gain",
        "gainFrequency",
        "gainUnit",
        "format",
        "flags",
        "restricted",
        "shared",
    ];

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "code" => Some(self.code.clone()),
            "sensor" => Some(self.sensor.clone()).filter(|v| !v.is_empty()),
            "datalogger" => Some(self.datalogger.clone()).filter(|v| !v.is_empty()),
            "start" | "end" => epoch_field(&self.epoch, name),
            "dataloggerSerialNumber" => self.datalogger_serial_number.clone(),
            "dataloggerChannel" => self.datalogger_channel.map(|c| c.to_string()),
            "sensorSerialNumber" => self.sensor_serial_number.clone(),
            "sensorChannel" => self.sensor_channel.map(|c| c.to_string()),
            "clockSerialNumber" => self.clock_serial_number.clone(),
            "sampleRateNumerator" => self.sample_rate_numerator.map(|n| n.to_string()),
            "sampleRateDenominator" => self.sample_rate_denominator.map(|d| d.to_string()),
            "depth" => self.depth.map(format_number),
            "azimuth" => self.azimuth.map(format_number),
            "dip" => self.dip.map(format_number),
            "gain" => self.gain.map(format_number),
            "gainFrequency" => self.gain_frequency.map(format_number),
            "gainUnit" => self.gain_unit.clone(),
            "format" => self.format.clone(),
            "flags" => self.flags.clone(),
            "restricted" => self.restricted.map(format_bool),
            "shared" => self.shared.map(format_bool),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Option<&str>) -> Result<(), Violation> {
        let kind = Self::KIND;
        if set_epoch_field(&mut self.epoch, kind, name, value)? {
            return Ok(());
        }
        match name {
            "code" => self.code = value.unwrap_or_default().trim().to_string(),
            "sensor" => self.sensor = parse_text(value).unwrap_or_default(),
            "datalogger" => self.datalogger = parse_text(value).unwrap_or_default(),
            "dataloggerSerialNumber" => self.datalogger_serial_number = parse_text(value),
            "dataloggerChannel" => self.datalogger_channel = parse_u32(kind, name, value)?,
            "sensorSerialNumber" => self.sensor_serial_number = parse_text(value),
            "sensorChannel" => self.sensor_channel = parse_u32(kind, name, value)?,
            "clockSerialNumber" => self.clock_serial_number = parse_text(value),
            "sampleRateNumerator" => self.sample_rate_numerator = parse_u32(kind, name, value)?,
            "sampleRateDenominator" => {
                self.sample_rate_denominator = parse_u32(kind, name, value)?
            }
            "depth" => self.depth = parse_f64(kind, name, value)?,
            "azimuth" => self.azimuth = parse_f64(kind, name, value)?,
            "dip" => self.dip = parse_f64(kind, name, value)?,
            "gain" => self.gain = parse_f64(kind, name, value)?,
            "gainFrequency" => self.gain_frequency = parse_f64(kind, name, value)?,
            "gainUnit" => self.gain_unit = parse_text(value),
            "format" => self.format = parse_text(value),
            "flags" => self.flags = parse_text(value),
            "restricted" => self.restricted = parse_bool(kind, name, value)?,
            "shared" => self.shared = parse_bool(kind, name, value)?,
            _ => return Err(unknown_field(kind, name)),
        }
        Ok(())
    }

    fn validate(&self) -> Vec<Violation> {
        let kind = Self::KIND;
        let mut errors = Vec::new();
        check_not_empty(kind, "code", &self.code, &mut errors);
        check_epoch(kind, &self.epoch, &mut errors);
        check_range(kind, "azimuth", self.azimuth, 0.0, 360.0, &mut errors);
        check_range(kind, "dip", self.dip, -90.0, 90.0, &mut errors);

        if self.sample_rate_denominator == Some(0) {
            errors.push(Violation::new(
                kind,
                "sampleRateDenominator",
                "must not be zero",
            ));
        }
        if let Some(frequency) = self.gain_frequency {
            if frequency < 0.0 {
                errors.push(Violation::new(
                    kind,
                    "gainFrequency",
                    format!("must not be negative, got {}", frequency),
                ));
            }
        }
        errors
    }
}

impl From<Stream> for Entity {
    fn from(stream: Stream) -> Self {
        Entity::Stream(stream)
    }
}
