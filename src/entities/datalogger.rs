// 💾 Datalogger Entity - shared equipment catalog entry
//
// Same lifetime rules as sensors: owned by the Inventory, referenced (never
// owned) by streams, name unique among dataloggers.

use super::{
    check_not_empty, format_number, parse_f64, parse_text, unknown_field, Entity, EntityKind,
    Record, Violation,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datalogger {
    pub public_id: String,
    pub name: String,

    pub description: Option<String>,
    pub digitizer_model: Option<String>,
    pub digitizer_manufacturer: Option<String>,
    pub recorder_model: Option<String>,
    pub recorder_manufacturer: Option<String>,
    pub clock_model: Option<String>,
    pub clock_manufacturer: Option<String>,
    pub clock_type: Option<String>,
    pub gain: Option<f64>,

    /// Seconds per second
    pub max_clock_drift: Option<f64>,
}

impl Datalogger {
    pub fn new(public_id: &str, name: &str) -> Self {
        Datalogger {
            public_id: public_id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Record for Datalogger {
    const KIND: EntityKind = EntityKind::Datalogger;
    const ATTRIBUTES: &'static [&'static str] = &["publicID", "name"];
    const FIELDS: &'static [&'static str] = &[
        "description",
        "digitizerModel",
        "digitizerManufacturer",
        "recorderModel",
        "recorderManufacturer",
        "clockModel",
        "clockManufacturer",
        "clockType",
        "gain",
        "maxClockDrift",
    ];

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "publicID" => Some(self.public_id.clone()).filter(|v| !v.is_empty()),
            "name" => Some(self.name.clone()),
            "description" => self.description.clone(),
            "digitizerModel" => self.digitizer_model.clone(),
            "digitizerManufacturer" => self.digitizer_manufacturer.clone(),
            "recorderModel" => self.recorder_model.clone(),
            "recorderManufacturer" => self.recorder_manufacturer.clone(),
            "clockModel" => self.clock_model.clone(),
            "clockManufacturer" => self.clock_manufacturer.clone(),
            "clockType" => self.clock_type.clone(),
            "gain" => self.gain.map(format_number),
            "maxClockDrift" => self.max_clock_drift.map(format_number),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Option<&str>) -> Result<(), Violation> {
        let kind = Self::KIND;
        match name {
            "publicID" => self.public_id = parse_text(value).unwrap_or_default(),
            "name" => self.name = value.unwrap_or_default().trim().to_string(),
            "description" => self.description = parse_text(value),
            "digitizerModel" => self.digitizer_model = parse_text(value),
            "digitizerManufacturer" => self.digitizer_manufacturer = parse_text(value),
            "recorderModel" => self.recorder_model = parse_text(value),
            "recorderManufacturer" => self.recorder_manufacturer = parse_text(value),
            "clockModel" => self.clock_model = parse_text(value),
            "clockManufacturer" => self.clock_manufacturer = parse_text(value),
            "clockType" => self.clock_type = parse_text(value),
            "gain" => self.gain = parse_f64(kind, name, value)?,
            "maxClockDrift" => self.max_clock_drift = parse_f64(kind, name, value)?,
            _ => return Err(unknown_field(kind, name)),
        }
        Ok(())
    }

    fn validate(&self) -> Vec<Violation> {
        let kind = Self::KIND;
        let mut errors = Vec::new();
        check_not_empty(kind, "publicID", &self.public_id, &mut errors);
        check_not_empty(kind, "name", &self.name, &mut errors);
        if let Some(drift) = self.max_clock_drift {
            if drift < 0.0 {
                errors.push(Violation::new(
                    kind,
                    "maxClockDrift",
                    format!("must not be negative, got {}", drift),
                ));
            }
        }
        errors
    }
}

impl From<Datalogger> for Entity {
    fn from(datalogger: Datalogger) -> Self {
        Entity::Datalogger(datalogger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datalogger_fields() {
        let mut dl = Datalogger::new("Datalogger/Q330", "Q330");
        dl.set_field("digitizerManufacturer", Some("Quanterra")).unwrap();
        dl.set_field("maxClockDrift", Some("0.0001")).unwrap();

        assert_eq!(dl.field("digitizerManufacturer").as_deref(), Some("Quanterra"));
        assert_eq!(dl.max_clock_drift, Some(0.0001));
        assert!(dl.validate().is_empty());
    }

    #[test]
    fn test_datalogger_negative_drift() {
        let mut dl = Datalogger::new("Datalogger/Q330", "Q330");
        dl.max_clock_drift = Some(-1.0);
        assert_eq!(dl.validate().len(), 1);
    }

    #[test]
    fn test_datalogger_unknown_field() {
        let mut dl = Datalogger::new("Datalogger/Q330", "Q330");
        assert!(dl.set_field("serialNumber", Some("1234")).is_err());
    }
}
