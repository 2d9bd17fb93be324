// 📍 Location Entity - a sensor location (SeisComP `sensorLocation`)
//
// The code may be empty; SeisComP displays that as "--". Coordinates may
// differ from the owning station's.

use super::{
    check_epoch, epoch_field, parse_text, set_epoch_field, unknown_field, Coordinates, Entity,
    EntityKind, Record, Violation,
};
use crate::temporal::Epoch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub public_id: String,
    pub code: String,
    pub epoch: Epoch,
    pub coordinates: Coordinates,
}

impl Location {
    pub fn new(code: &str, start: DateTime<Utc>) -> Self {
        Location {
            code: code.to_string(),
            epoch: Epoch::open(start),
            ..Default::default()
        }
    }

    /// Builder pattern: close the epoch
    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.epoch.end = Some(end);
        self
    }

    /// Builder pattern: set position
    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = coordinates;
        self
    }
}

impl Record for Location {
    const KIND: EntityKind = EntityKind::Location;
    const ATTRIBUTES: &'static [&'static str] = &["publicID", "code"];
    const FIELDS: &'static [&'static str] = &["start", "end", "latitude", "longitude", "elevation"];

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "publicID" => Some(self.public_id.clone()).filter(|v| !v.is_empty()),
            "code" => Some(self.code.clone()),
            "start" | "end" => epoch_field(&self.epoch, name),
            _ => self.coordinates.field(name),
        }
    }

    fn set_field(&mut self, name: &str, value: Option<&str>) -> Result<(), Violation> {
        let kind = Self::KIND;
        if set_epoch_field(&mut self.epoch, kind, name, value)?
            || self.coordinates.set_field(kind, name, value)?
        {
            return Ok(());
        }
        match name {
            "publicID" => self.public_id = parse_text(value).unwrap_or_default(),
            "code" => self.code = value.unwrap_or_default().trim().to_string(),
            _ => return Err(unknown_field(kind, name)),
        }
        Ok(())
    }

    fn validate(&self) -> Vec<Violation> {
        let mut errors = Vec::new();
        check_epoch(Self::KIND, &self.epoch, &mut errors);
        self.coordinates.validate_into(Self::KIND, &mut errors);
        errors
    }
}

impl From<Location> for Entity {
    fn from(location: Location) -> Self {
        Entity::Location(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_location_code_is_valid() {
        let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let location = Location::new("", start);
        assert!(location.validate().is_empty());
    }

    #[test]
    fn test_location_has_no_description_field() {
        let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let mut location = Location::new("00", start);
        let err = location.set_field("description", Some("vault")).unwrap_err();
        assert_eq!(err.field, "description");
    }

    #[test]
    fn test_location_latitude_range() {
        let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let location = Location::new("00", start).with_coordinates(Coordinates {
            latitude: Some(90.5),
            ..Default::default()
        });
        let errors = location.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "latitude");
    }
}
