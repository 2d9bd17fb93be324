// 🔧 Sensor Entity - shared equipment catalog entry
//
// Sensors are not owned by any station. Streams point at them through the
// publicID; the name is unique among sensors.

use super::{
    check_not_empty, format_number, parse_f64, parse_text, unknown_field, Entity, EntityKind,
    Record, Violation,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub public_id: String,
    pub name: String,

    /// publicID of the response (PAZ / polynomial / FAP) description
    pub response: Option<String>,

    pub description: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub sensor_type: Option<String>,
    pub unit: Option<String>,
    pub low_frequency: Option<f64>,
    pub high_frequency: Option<f64>,
}

impl Sensor {
    pub fn new(public_id: &str, name: &str) -> Self {
        Sensor {
            public_id: public_id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Builder pattern: model and manufacturer
    pub fn with_model(mut self, model: &str, manufacturer: &str) -> Self {
        self.model = Some(model.to_string());
        self.manufacturer = Some(manufacturer.to_string());
        self
    }
}

impl Record for Sensor {
    const KIND: EntityKind = EntityKind::Sensor;
    const ATTRIBUTES: &'static [&'static str] = &["publicID", "name", "response"];
    const FIELDS: &'static [&'static str] = &[
        "description",
        "model",
        "manufacturer",
        "type",
        "unit",
        "lowFrequency",
        "highFrequency",
    ];

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "publicID" => Some(self.public_id.clone()).filter(|v| !v.is_empty()),
            "name" => Some(self.name.clone()),
            "response" => self.response.clone(),
            "description" => self.description.clone(),
            "model" => self.model.clone(),
            "manufacturer" => self.manufacturer.clone(),
            "type" => self.sensor_type.clone(),
            "unit" => self.unit.clone(),
            "lowFrequency" => self.low_frequency.map(format_number),
            "highFrequency" => self.high_frequency.map(format_number),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Option<&str>) -> Result<(), Violation> {
        let kind = Self::KIND;
        match name {
            "publicID" => self.public_id = parse_text(value).unwrap_or_default(),
            "name" => self.name = value.unwrap_or_default().trim().to_string(),
            "response" => self.response = parse_text(value),
            "description" => self.description = parse_text(value),
            "model" => self.model = parse_text(value),
            "manufacturer" => self.manufacturer = parse_text(value),
            "type" => self.sensor_type = parse_text(value),
            "unit" => self.unit = parse_text(value),
            "lowFrequency" => self.low_frequency = parse_f64(kind, name, value)?,
            "highFrequency" => self.high_frequency = parse_f64(kind, name, value)?,
            _ => return Err(unknown_field(kind, name)),
        }
        Ok(())
    }

    fn validate(&self) -> Vec<Violation> {
        let kind = Self::KIND;
        let mut errors = Vec::new();
        check_not_empty(kind, "publicID", &self.public_id, &mut errors);
        check_not_empty(kind, "name", &self.name, &mut errors);

        for (field, value) in [
            ("lowFrequency", self.low_frequency),
            ("highFrequency", self.high_frequency),
        ] {
            if let Some(v) = value {
                if v < 0.0 {
                    errors.push(Violation::new(
                        kind,
                        field,
                        format!("must not be negative, got {}", v),
                    ));
                }
            }
        }
        if let (Some(low), Some(high)) = (self.low_frequency, self.high_frequency) {
            if low > high {
                errors.push(Violation::new(
                    kind,
                    "lowFrequency",
                    format!("must not exceed highFrequency ({} > {})", low, high),
                ));
            }
        }
        errors
    }
}

impl From<Sensor> for Entity {
    fn from(sensor: Sensor) -> Self {
        Entity::Sensor(sensor)
    }
}
