// 📡 Station Entity - a site within a network
//
// Station codes are unique within their network for overlapping epochs.
// Sensor locations are owned by the station.

use super::{
    check_epoch, check_not_empty, epoch_field, format_bool, parse_bool, parse_text,
    set_epoch_field, unknown_field, Coordinates, Entity, EntityKind, Record, Violation,
};
use crate::temporal::Epoch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub public_id: String,
    pub code: String,

    pub epoch: Epoch,
    pub description: Option<String>,
    pub coordinates: Coordinates,
    pub place: Option<String>,
    pub country: Option<String>,
    pub affiliation: Option<String>,
    pub station_type: Option<String>,
    pub archive: Option<String>,
    pub restricted: Option<bool>,
    pub shared: Option<bool>,
}

impl Station {
    pub fn new(code: &str, start: DateTime<Utc>) -> Self {
        Station {
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

impl Record for Station {
    const KIND: EntityKind = EntityKind::Station;
    const ATTRIBUTES: &'static [&'static str] = &["publicID", "code"];
    const FIELDS: &'static [&'static str] = &[
        "start",
        "end",
        "description",
        "latitude",
        "longitude",
        "elevation",
        "place",
        "country",
        "affiliation",
        "type",
        "archive",
        "restricted",
        "shared",
    ];

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "publicID" => Some(self.public_id.clone()).filter(|v| !v.is_empty()),
            "code" => Some(self.code.clone()),
            "start" | "end" => epoch_field(&self.epoch, name),
            "latitude" | "longitude" | "elevation" => self.coordinates.field(name),
            "description" => self.description.clone(),
            "place" => self.place.clone(),
            "country" => self.country.clone(),
            "affiliation" => self.affiliation.clone(),
            "type" => self.station_type.clone(),
            "archive" => self.archive.clone(),
            "restricted" => self.restricted.map(format_bool),
            "shared" => self.shared.map(format_bool),
            _ => None,
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
            "description" => self.description = parse_text(value),
            "place" => self.place = parse_text(value),
            "country" => self.country = parse_text(value),
            "affiliation" => self.affiliation = parse_text(value),
            "type" => self.station_type = parse_text(value),
            "archive" => self.archive = parse_text(value),
            "restricted" => self.restricted = parse_bool(kind, name, value)?,
            "shared" => self.shared = parse_bool(kind, name, value)?,
            _ => return Err(unknown_field(kind, name)),
        }
        Ok(())
    }

    fn validate(&self) -> Vec<Violation> {
        let mut errors = Vec::new();
        check_not_empty(Self::KIND, "code", &self.code, &mut errors);
        check_epoch(Self::KIND, &self.epoch, &mut errors);
        self.coordinates.validate_into(Self::KIND, &mut errors);
        errors
    }
}

impl From<Station> for Entity {
    fn from(station: Station) -> Self {
        Entity::Station(station)
    }
}
