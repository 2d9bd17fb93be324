// 🌐 Network Entity - top level of the station hierarchy
//
// A network code (e.g. "XX", "GE") may be reused for several epochs as long
// as those epochs do not overlap. Stations are owned by the network and kept
// in insertion order by the Inventory.

use super::{
    check_epoch, check_not_empty, epoch_field, format_bool, parse_bool, parse_text,
    set_epoch_field, unknown_field, Entity, EntityKind, Record, Violation,
};
use crate::temporal::Epoch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    // ========================================================================
    // IDENTITY (XML attributes)
    // ========================================================================
    /// SeisComP publicID; generated by the Inventory when left empty
    pub public_id: String,

    /// Network code, unique among networks for any overlapping epoch
    pub code: String,

    // ========================================================================
    // VALUES
    // ========================================================================
    pub epoch: Epoch,
    pub description: Option<String>,
    pub institutions: Option<String>,
    pub region: Option<String>,
    pub network_type: Option<String>,
    pub net_class: Option<String>,
    pub archive: Option<String>,
    pub restricted: Option<bool>,
    pub shared: Option<bool>,
}

impl Network {
    pub fn new(code: &str, start: DateTime<Utc>) -> Self {
        Network {
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

    /// Builder pattern: add description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

impl Record for Network {
    const KIND: EntityKind = EntityKind::Network;
    const ATTRIBUTES: &'static [&'static str] = &["publicID", "code"];
    const FIELDS: &'static [&'static str] = &[
        "start",
        "end",
        "description",
        "institutions",
        "region",
        "type",
        "netClass",
        "archive",
        "restricted",
        "shared",
    ];

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "publicID" => Some(self.public_id.clone()).filter(|v| !v.is_empty()),
            "code" => Some(self.code.clone()),
            "start" | "end" => epoch_field(&self.epoch, name),
            "description" => self.description.clone(),
            "institutions" => self.institutions.clone(),
            "region" => self.region.clone(),
            "type" => self.network_type.clone(),
            "netClass" => self.net_class.clone(),
            "archive" => self.archive.clone(),
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
            "publicID" => self.public_id = parse_text(value).unwrap_or_default(),
            "code" => self.code = value.unwrap_or_default().trim().to_string(),
            "description" => self.description = parse_text(value),
            "institutions" => self.institutions = parse_text(value),
            "region" => self.region = parse_text(value),
            "type" => self.network_type = parse_text(value),
            "netClass" => self.net_class = parse_text(value),
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
        errors
    }
}

impl From<Network> for Entity {
    fn from(network: Network) -> Self {
        Entity::Network(network)
    }
}
