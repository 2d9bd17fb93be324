// Entity Models - the six record types of a SeisComP inventory
//
// Each entity has:
// - Stable identity (EntityId) allocated by the owning Inventory, never reused
// - Mutable attribute values (code, epoch, coordinates, ...)
// - A structural validate() that only looks at the record itself
//
// Field names used by `field` / `set_field` are the SeisComP XML names, so the
// editor and the codec address the same attribute with the same key.

pub mod datalogger;
pub mod location;
pub mod network;
pub mod sensor;
pub mod station;
pub mod stream;

pub use datalogger::Datalogger;
pub use location::Location;
pub use network::Network;
pub use sensor::Sensor;
pub use station::Station;
pub use stream::Stream;

use crate::temporal::{format_time, parse_time, Epoch};
use serde::{Deserialize, Serialize};

// ============================================================================
// IDENTITY
// ============================================================================

/// Internal identifier, distinct from the user-visible code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Network,
    Station,
    Location,
    Stream,
    Sensor,
    Datalogger,
}

impl EntityKind {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Network => "Network",
            EntityKind::Station => "Station",
            EntityKind::Location => "Location",
            EntityKind::Stream => "Stream",
            EntityKind::Sensor => "Sensor",
            EntityKind::Datalogger => "Datalogger",
        }
    }

    /// Element name in the SeisComP schema
    pub fn element(&self) -> &'static str {
        match self {
            EntityKind::Network => "network",
            EntityKind::Station => "station",
            EntityKind::Location => "sensorLocation",
            EntityKind::Stream => "stream",
            EntityKind::Sensor => "sensor",
            EntityKind::Datalogger => "datalogger",
        }
    }

    /// Prefix used when generating publicIDs (`Station/<uuid>`)
    pub fn public_id_prefix(&self) -> Option<&'static str> {
        match self {
            EntityKind::Network => Some("Network"),
            EntityKind::Station => Some("Station"),
            EntityKind::Location => Some("SensorLocation"),
            EntityKind::Stream => None,
            EntityKind::Sensor => Some("Sensor"),
            EntityKind::Datalogger => Some("Datalogger"),
        }
    }

    /// Kind of the owned children, if any
    pub fn child(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Network => Some(EntityKind::Station),
            EntityKind::Station => Some(EntityKind::Location),
            EntityKind::Location => Some(EntityKind::Stream),
            _ => None,
        }
    }

    /// Shared catalog entries (not owned by any station)
    pub fn is_equipment(&self) -> bool {
        matches!(self, EntityKind::Sensor | EntityKind::Datalogger)
    }

    /// XML attributes carried by the element, in emission order
    pub fn attributes(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Network => Network::ATTRIBUTES,
            EntityKind::Station => Station::ATTRIBUTES,
            EntityKind::Location => Location::ATTRIBUTES,
            EntityKind::Stream => Stream::ATTRIBUTES,
            EntityKind::Sensor => Sensor::ATTRIBUTES,
            EntityKind::Datalogger => Datalogger::ATTRIBUTES,
        }
    }

    /// Simple child elements, in schema order
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Network => Network::FIELDS,
            EntityKind::Station => Station::FIELDS,
            EntityKind::Location => Location::FIELDS,
            EntityKind::Stream => Stream::FIELDS,
            EntityKind::Sensor => Sensor::FIELDS,
            EntityKind::Datalogger => Datalogger::FIELDS,
        }
    }

    /// Fields that must be present for a record to be loadable
    pub fn required(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Network | EntityKind::Station | EntityKind::Location => {
                &["code", "start"]
            }
            EntityKind::Stream => &["code", "start"],
            EntityKind::Sensor | EntityKind::Datalogger => &["publicID", "name"],
        }
    }

    pub fn knows(&self, name: &str) -> bool {
        self.attributes().contains(&name) || self.fields().contains(&name)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// VIOLATIONS
// ============================================================================

/// A single validation finding, used both for record-local checks and for
/// graph-wide ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Owning entity, once known (records validated before insertion have none)
    pub entity: Option<EntityId>,
    pub kind: EntityKind,
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(kind: EntityKind, field: &str, message: impl Into<String>) -> Self {
        Violation {
            entity: None,
            kind,
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Attach the owning entity
    pub fn on(mut self, id: EntityId) -> Self {
        self.entity = Some(id);
        self
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.entity {
            Some(id) => write!(f, "[{} {}] {}: {}", self.kind, id, self.field, self.message),
            None => write!(f, "[{}] {}: {}", self.kind, self.field, self.message),
        }
    }
}

// ============================================================================
// SHARED ATTRIBUTES
// ============================================================================

/// Geographic position of a station or sensor location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Decimal degrees, [-90, 90]
    pub latitude: Option<f64>,

    /// Decimal degrees, [-180, 180]
    pub longitude: Option<f64>,

    /// Metres
    pub elevation: Option<f64>,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Coordinates {
            latitude: Some(latitude),
            longitude: Some(longitude),
            elevation: Some(elevation),
        }
    }

    pub(crate) fn validate_into(&self, kind: EntityKind, errors: &mut Vec<Violation>) {
        check_range(kind, "latitude", self.latitude, -90.0, 90.0, errors);
        check_range(kind, "longitude", self.longitude, -180.0, 180.0, errors);
        if let Some(elevation) = self.elevation {
            if !elevation.is_finite() {
                errors.push(Violation::new(kind, "elevation", "must be a finite number"));
            }
        }
    }

    pub(crate) fn field(&self, name: &str) -> Option<String> {
        match name {
            "latitude" => self.latitude.map(format_number),
            "longitude" => self.longitude.map(format_number),
            "elevation" => self.elevation.map(format_number),
            _ => None,
        }
    }

    /// Returns `Ok(false)` if `name` is not a coordinate field.
    pub(crate) fn set_field(
        &mut self,
        kind: EntityKind,
        name: &str,
        value: Option<&str>,
    ) -> Result<bool, Violation> {
        let slot = match name {
            "latitude" => &mut self.latitude,
            "longitude" => &mut self.longitude,
            "elevation" => &mut self.elevation,
            _ => return Ok(false),
        };
        *slot = parse_f64(kind, name, value)?;
        Ok(true)
    }
}

// ============================================================================
// RECORD TRAIT
// ============================================================================

/// Passive record with field access by XML name and a structural check.
pub trait Record: Clone + Default + Into<Entity> {
    const KIND: EntityKind;

    /// XML attributes, in emission order
    const ATTRIBUTES: &'static [&'static str];

    /// Simple child elements, in schema order
    const FIELDS: &'static [&'static str];

    /// Current value of a field as text, `None` when unset
    fn field(&self, name: &str) -> Option<String>;

    /// Set a field from text. `None` or empty text clears optional fields.
    fn set_field(&mut self, name: &str, value: Option<&str>) -> Result<(), Violation>;

    /// Type-local checks only; never fails, returns every finding.
    fn validate(&self) -> Vec<Violation>;
}

// ============================================================================
// ENTITY
// ============================================================================

/// Any inventory record, as stored in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    Network(Network),
    Station(Station),
    Location(Location),
    Stream(Stream),
    Sensor(Sensor),
    Datalogger(Datalogger),
}

macro_rules! dispatch {
    ($entity:expr, $record:ident => $body:expr) => {
        match $entity {
            Entity::Network($record) => $body,
            Entity::Station($record) => $body,
            Entity::Location($record) => $body,
            Entity::Stream($record) => $body,
            Entity::Sensor($record) => $body,
            Entity::Datalogger($record) => $body,
        }
    };
}

impl Entity {
    /// Blank record of the given kind, used by the decoder before fields arrive
    pub fn empty(kind: EntityKind) -> Entity {
        match kind {
            EntityKind::Network => Network::default().into(),
            EntityKind::Station => Station::default().into(),
            EntityKind::Location => Location::default().into(),
            EntityKind::Stream => Stream::default().into(),
            EntityKind::Sensor => Sensor::default().into(),
            EntityKind::Datalogger => Datalogger::default().into(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Network(_) => EntityKind::Network,
            Entity::Station(_) => EntityKind::Station,
            Entity::Location(_) => EntityKind::Location,
            Entity::Stream(_) => EntityKind::Stream,
            Entity::Sensor(_) => EntityKind::Sensor,
            Entity::Datalogger(_) => EntityKind::Datalogger,
        }
    }

    /// User-visible code (equipment: name)
    pub fn code(&self) -> &str {
        match self {
            Entity::Network(n) => &n.code,
            Entity::Station(s) => &s.code,
            Entity::Location(l) => &l.code,
            Entity::Stream(s) => &s.code,
            Entity::Sensor(s) => &s.name,
            Entity::Datalogger(d) => &d.name,
        }
    }

    pub fn set_code(&mut self, code: String) {
        match self {
            Entity::Network(n) => n.code = code,
            Entity::Station(s) => s.code = code,
            Entity::Location(l) => l.code = code,
            Entity::Stream(s) => s.code = code,
            Entity::Sensor(s) => s.name = code,
            Entity::Datalogger(d) => d.name = code,
        }
    }

    /// Validity interval; equipment has none
    pub fn epoch(&self) -> Option<&Epoch> {
        match self {
            Entity::Network(n) => Some(&n.epoch),
            Entity::Station(s) => Some(&s.epoch),
            Entity::Location(l) => Some(&l.epoch),
            Entity::Stream(s) => Some(&s.epoch),
            Entity::Sensor(_) | Entity::Datalogger(_) => None,
        }
    }

    pub fn epoch_mut(&mut self) -> Option<&mut Epoch> {
        match self {
            Entity::Network(n) => Some(&mut n.epoch),
            Entity::Station(s) => Some(&mut s.epoch),
            Entity::Location(l) => Some(&mut l.epoch),
            Entity::Stream(s) => Some(&mut s.epoch),
            Entity::Sensor(_) | Entity::Datalogger(_) => None,
        }
    }

    /// publicID, if the kind has one and it is set
    pub fn public_id(&self) -> Option<&str> {
        let id = match self {
            Entity::Network(n) => &n.public_id,
            Entity::Station(s) => &s.public_id,
            Entity::Location(l) => &l.public_id,
            Entity::Stream(_) => return None,
            Entity::Sensor(s) => &s.public_id,
            Entity::Datalogger(d) => &d.public_id,
        };
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    pub(crate) fn public_id_mut(&mut self) -> Option<&mut String> {
        match self {
            Entity::Network(n) => Some(&mut n.public_id),
            Entity::Station(s) => Some(&mut s.public_id),
            Entity::Location(l) => Some(&mut l.public_id),
            Entity::Stream(_) => None,
            Entity::Sensor(s) => Some(&mut s.public_id),
            Entity::Datalogger(d) => Some(&mut d.public_id),
        }
    }

    pub fn field(&self, name: &str) -> Option<String> {
        dispatch!(self, record => record.field(name))
    }

    pub fn set_field(&mut self, name: &str, value: Option<&str>) -> Result<(), Violation> {
        dispatch!(self, record => record.set_field(name, value))
    }

    pub fn validate(&self) -> Vec<Violation> {
        dispatch!(self, record => record.validate())
    }

    /// Display text for tree views, e.g. `Station: AAA`
    pub fn label(&self) -> String {
        let code = self.code();
        match self {
            Entity::Location(_) if code.is_empty() => "Location: --".to_string(),
            _ => format!("{}: {}", self.kind().name(), code),
        }
    }

    pub fn as_network(&self) -> Option<&Network> {
        match self {
            Entity::Network(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_station(&self) -> Option<&Station> {
        match self {
            Entity::Station(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&Location> {
        match self {
            Entity::Location(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Entity::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sensor(&self) -> Option<&Sensor> {
        match self {
            Entity::Sensor(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datalogger(&self) -> Option<&Datalogger> {
        match self {
            Entity::Datalogger(d) => Some(d),
            _ => None,
        }
    }
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

pub(crate) fn format_number(value: f64) -> String {
    value.to_string()
}

pub(crate) fn format_bool(value: bool) -> String {
    value.to_string()
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn parse_text(value: Option<&str>) -> Option<String> {
    present(value).map(str::to_string)
}

pub(crate) fn parse_f64(
    kind: EntityKind,
    field: &str,
    value: Option<&str>,
) -> Result<Option<f64>, Violation> {
    match present(value) {
        None => Ok(None),
        Some(text) => text
            .parse::<f64>()
            .map(Some)
            .map_err(|_| Violation::new(kind, field, format!("expected a number, got '{}'", text))),
    }
}

pub(crate) fn parse_u32(
    kind: EntityKind,
    field: &str,
    value: Option<&str>,
) -> Result<Option<u32>, Violation> {
    match present(value) {
        None => Ok(None),
        Some(text) => text.parse::<u32>().map(Some).map_err(|_| {
            Violation::new(
                kind,
                field,
                format!("expected a non-negative integer, got '{}'", text),
            )
        }),
    }
}

pub(crate) fn parse_bool(
    kind: EntityKind,
    field: &str,
    value: Option<&str>,
) -> Result<Option<bool>, Violation> {
    match present(value) {
        None => Ok(None),
        Some("true") | Some("1") => Ok(Some(true)),
        Some("false") | Some("0") => Ok(Some(false)),
        Some(text) => Err(Violation::new(
            kind,
            field,
            format!("expected true or false, got '{}'", text),
        )),
    }
}

/// Required text: empty input is rejected rather than cleared.
pub(crate) fn parse_required(
    kind: EntityKind,
    field: &str,
    value: Option<&str>,
) -> Result<String, Violation> {
    present(value)
        .map(str::to_string)
        .ok_or_else(|| Violation::new(kind, field, "is required"))
}

/// Reads and writes `start` / `end`. Returns `Ok(false)` for other names.
pub(crate) fn set_epoch_field(
    epoch: &mut Epoch,
    kind: EntityKind,
    name: &str,
    value: Option<&str>,
) -> Result<bool, Violation> {
    match name {
        "start" => {
            let text = parse_required(kind, name, value)?;
            epoch.start = parse_time(&text)
                .ok_or_else(|| Violation::new(kind, name, format!("invalid time '{}'", text)))?;
            Ok(true)
        }
        "end" => {
            epoch.end = match present(value) {
                None => None,
                Some(text) => Some(parse_time(text).ok_or_else(|| {
                    Violation::new(kind, name, format!("invalid time '{}'", text))
                })?),
            };
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub(crate) fn epoch_field(epoch: &Epoch, name: &str) -> Option<String> {
    match name {
        "start" => Some(format_time(&epoch.start)),
        "end" => epoch.end.as_ref().map(format_time),
        _ => None,
    }
}

pub(crate) fn check_epoch(kind: EntityKind, epoch: &Epoch, errors: &mut Vec<Violation>) {
    if !epoch.is_ordered() {
        errors.push(Violation::new(
            kind,
            "end",
            format!("end must be after start, got {}", epoch),
        ));
    }
}

pub(crate) fn check_range(
    kind: EntityKind,
    field: &str,
    value: Option<f64>,
    min: f64,
    max: f64,
    errors: &mut Vec<Violation>,
) {
    if let Some(v) = value {
        if !(min..=max).contains(&v) {
            errors.push(Violation::new(
                kind,
                field,
                format!("must be within [{}, {}], got {}", min, max, v),
            ));
        }
    }
}

pub(crate) fn check_not_empty(
    kind: EntityKind,
    field: &str,
    value: &str,
    errors: &mut Vec<Violation>,
) {
    if value.trim().is_empty() {
        errors.push(Violation::new(kind, field, "Required field is empty"));
    }
}

pub(crate) fn unknown_field(kind: EntityKind, name: &str) -> Violation {
    Violation::new(kind, name, format!("{} has no field '{}'", kind, name))
}

// ============================================================================
// TESTS
// ============================================================================
