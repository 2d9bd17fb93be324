// 🗂️ Inventory Graph - owns every entity and guards the cross-entity rules
//
// The graph is the sole authority for identifier allocation and the only
// mutation surface. Every mutation validates the complete candidate state
// first and only then writes, so a rejected call leaves the graph untouched.
//
// Invariants enforced on mutation:
// 1. Sibling codes repeat only with non-overlapping epochs
// 2. Stream equipment references resolve; referenced equipment can't be removed
// 3. Epoch end strictly after start
// 4. Removing a network/station/location cascades to its descendants
// 5. Siblings keep insertion order

pub mod epoch_index;
pub mod extensions;
pub mod validation;

pub use epoch_index::EpochIndex;
pub use extensions::{Anchor, ExtensionData, ExtensionTable, OpaqueNode, Owner, RawAttribute};
pub use validation::{Violations, Walk};

use crate::entities::{
    Datalogger, Entity, EntityId, EntityKind, Location, Network, Sensor, Station, Stream,
    Violation,
};
use crate::error::InventoryError;
use crate::temporal::Epoch;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// STORAGE
// ============================================================================

#[derive(Debug, Clone)]
struct Node {
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    entity: Entity,
}

/// Index keys of an entity, captured before a record is moved.
struct IndexKeys {
    code: String,
    epoch: Option<Epoch>,
    public_id: Option<String>,
}

impl IndexKeys {
    fn of(entity: &Entity) -> Self {
        IndexKeys {
            code: entity.code().to_string(),
            epoch: entity.epoch().copied(),
            public_id: entity.public_id().map(str::to_string),
        }
    }
}

/// The whole inventory: networks down to streams plus the equipment catalog.
///
/// Owned by the host (editor session, CLI run) and passed by reference; there
/// is no global instance.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    nodes: HashMap<EntityId, Node>,
    networks: Vec<EntityId>,
    sensors: Vec<EntityId>,
    dataloggers: Vec<EntityId>,

    /// Sibling epochs per parent and code
    epochs: EpochIndex,

    /// publicID -> holders (more than one only after loading a broken file)
    public_ids: HashMap<String, Vec<EntityId>>,

    /// Unknown XML content, keyed by owner
    extensions: ExtensionTable,

    next_id: u64,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.nodes.get(&id).map(|n| &n.entity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.get(id).map(Entity::kind)
    }

    /// Owning entity; `None` for networks, equipment and unknown ids
    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Direct children in insertion order
    pub fn children(&self, id: EntityId) -> Result<&[EntityId], InventoryError> {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .ok_or(InventoryError::NotFound(id))
    }

    pub fn networks(&self) -> &[EntityId] {
        &self.networks
    }

    pub fn sensors(&self) -> &[EntityId] {
        &self.sensors
    }

    pub fn dataloggers(&self) -> &[EntityId] {
        &self.dataloggers
    }

    /// Number of live entities of every kind
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.nodes.values().filter(|n| n.entity.kind() == kind).count()
    }

    /// Tree display text, e.g. `Network: XX`
    pub fn label(&self, id: EntityId) -> Option<String> {
        self.get(id).map(Entity::label)
    }

    /// First network with this code, in document order
    pub fn find_network(&self, code: &str) -> Option<EntityId> {
        self.find_in(&self.networks, code)
    }

    /// First child of `parent` with this code, in insertion order
    pub fn find_child(&self, parent: EntityId, code: &str) -> Option<EntityId> {
        let children = self.nodes.get(&parent)?.children.as_slice();
        self.find_in(children, code)
    }

    pub fn find_sensor(&self, name: &str) -> Option<EntityId> {
        self.find_in(&self.sensors, name)
    }

    pub fn find_datalogger(&self, name: &str) -> Option<EntityId> {
        self.find_in(&self.dataloggers, name)
    }

    pub fn find_by_public_id(&self, public_id: &str) -> Option<EntityId> {
        self.public_ids
            .get(public_id)
            .and_then(|ids| ids.first())
            .copied()
    }

    fn find_in(&self, ids: &[EntityId], code: &str) -> Option<EntityId> {
        ids.iter()
            .copied()
            .find(|id| self.get(*id).map_or(false, |e| e.code() == code))
    }

    /// Streams whose sensor/datalogger reference points at `equipment`
    pub fn streams_referencing(&self, equipment: EntityId) -> Vec<EntityId> {
        let Some(entity) = self.get(equipment) else {
            return Vec::new();
        };
        let (kind, Some(public_id)) = (entity.kind(), entity.public_id()) else {
            return Vec::new();
        };
        self.walk()
            .filter_map(|(id, _)| {
                let stream = self.get(id)?.as_stream()?;
                let reference = match kind {
                    EntityKind::Sensor => &stream.sensor,
                    EntityKind::Datalogger => &stream.datalogger,
                    _ => return None,
                };
                (reference == public_id).then_some(id)
            })
            .collect()
    }

    /// Follow a stream's weak references into the catalog.
    pub fn resolve_reference(
        &self,
        stream: EntityId,
    ) -> Result<(&Sensor, &Datalogger), InventoryError> {
        let record = self
            .get(stream)
            .and_then(Entity::as_stream)
            .ok_or(InventoryError::NotFound(stream))?;

        let dangling = |reference: &str| InventoryError::DanglingReference {
            stream,
            reference: reference.to_string(),
        };
        let sensor = self
            .find_by_public_id(&record.sensor)
            .and_then(|id| self.get(id))
            .and_then(Entity::as_sensor)
            .ok_or_else(|| dangling(&record.sensor))?;
        let datalogger = self
            .find_by_public_id(&record.datalogger)
            .and_then(|id| self.get(id))
            .and_then(Entity::as_datalogger)
            .ok_or_else(|| dangling(&record.datalogger))?;
        Ok((sensor, datalogger))
    }

    /// Streams of a location sorted the way seismologists read them: band
    /// code, instrument code, then orientation E/1, N/2, Z. Display only;
    /// the stored order is unchanged.
    pub fn streams_in_display_order(
        &self,
        location: EntityId,
    ) -> Result<Vec<EntityId>, InventoryError> {
        if self.kind(location) != Some(EntityKind::Location) {
            return Err(InventoryError::NotFound(location));
        }
        let mut streams = self.children(location)?.to_vec();
        streams.sort_by_key(|id| display_key(self.get(*id).map_or("", Entity::code)));
        Ok(streams)
    }

    pub fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    pub(crate) fn extensions_mut(&mut self) -> &mut ExtensionTable {
        &mut self.extensions
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    pub fn add_network(&mut self, network: Network) -> Result<EntityId, InventoryError> {
        self.insert_checked(None, network.into())
    }

    pub fn add_station(
        &mut self,
        network: EntityId,
        station: Station,
    ) -> Result<EntityId, InventoryError> {
        self.insert_checked(Some(network), station.into())
    }

    pub fn add_location(
        &mut self,
        station: EntityId,
        location: Location,
    ) -> Result<EntityId, InventoryError> {
        self.insert_checked(Some(station), location.into())
    }

    pub fn add_stream(
        &mut self,
        location: EntityId,
        stream: Stream,
    ) -> Result<EntityId, InventoryError> {
        self.insert_checked(Some(location), stream.into())
    }

    pub fn add_sensor(&mut self, sensor: Sensor) -> Result<EntityId, InventoryError> {
        self.insert_checked(None, sensor.into())
    }

    pub fn add_datalogger(&mut self, datalogger: Datalogger) -> Result<EntityId, InventoryError> {
        self.insert_checked(None, datalogger.into())
    }

    /// Remove an entity and, for networks/stations/locations, everything it
    /// owns. Returns the removed ids, the requested one first.
    pub fn remove(&mut self, id: EntityId) -> Result<Vec<EntityId>, InventoryError> {
        let node = self.nodes.get(&id).ok_or(InventoryError::NotFound(id))?;
        let kind = node.entity.kind();
        let parent = node.parent;

        if kind.is_equipment() {
            let streams = self.streams_referencing(id);
            if !streams.is_empty() {
                debug!(%id, streams = streams.len(), "removal blocked by references");
                return Err(InventoryError::ReferencedEntity { id, streams });
            }
        }

        // Content that followed this child in the owner's element now
        // follows whatever preceded the child.
        let owner = parent.map_or(Owner::Inventory, Owner::Entity);
        let replacement = self.predecessor_anchor(parent, id);
        if self.extensions.get(owner).is_some() {
            self.extensions
                .get_mut(owner)
                .reanchor(&Anchor::AfterChild(id), &replacement);
        }

        match parent {
            Some(p) => {
                if let Some(parent_node) = self.nodes.get_mut(&p) {
                    parent_node.children.retain(|c| *c != id);
                }
            }
            None => {
                if let Some(list) = self.root_list_mut(kind) {
                    list.retain(|c| *c != id);
                }
            }
        }

        let removed = self.subtree(id);
        for rid in &removed {
            if let Some(node) = self.nodes.remove(rid) {
                self.unindex(*rid, node.parent, &IndexKeys::of(&node.entity));
            }
            self.extensions.remove(*rid);
        }
        debug!(%id, kind = %kind, removed = removed.len(), "removed entity");
        Ok(removed)
    }

    /// Change the code (equipment: the name).
    pub fn rename(&mut self, id: EntityId, code: &str) -> Result<(), InventoryError> {
        let mut candidate = self.candidate(id)?;
        candidate.set_code(code.trim().to_string());
        self.replace_checked(id, candidate)
    }

    /// Change the validity interval.
    pub fn set_dates(
        &mut self,
        id: EntityId,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(), InventoryError> {
        let mut candidate = self.candidate(id)?;
        let kind = candidate.kind();
        let epoch = candidate.epoch_mut().ok_or_else(|| {
            InventoryError::violation(
                Violation::new(kind, "start", format!("{} has no validity interval", kind)).on(id),
            )
        })?;
        *epoch = Epoch::new(start, end);
        self.replace_checked(id, candidate)
    }

    /// Set any field by its XML name from text, the way editor widgets do.
    /// `None` or empty text clears optional fields.
    pub fn set_attribute(
        &mut self,
        id: EntityId,
        field: &str,
        value: Option<&str>,
    ) -> Result<(), InventoryError> {
        let mut candidate = self.candidate(id)?;
        candidate
            .set_field(field, value)
            .map_err(|v| InventoryError::violation(v.on(id)))?;
        self.replace_checked(id, candidate)
    }

    /// Point a stream at a sensor from the catalog. A given serial is
    /// recorded as the stream's `sensorSerialNumber`; `None` keeps the
    /// current one.
    pub fn link_sensor(
        &mut self,
        stream: EntityId,
        sensor: EntityId,
        serial: Option<&str>,
    ) -> Result<(), InventoryError> {
        let public_id = self.equipment_public_id(sensor, EntityKind::Sensor)?;
        self.link(stream, ("sensor", public_id.as_str()), ("sensorSerialNumber", serial))
    }

    /// Point a stream at a datalogger from the catalog, optionally recording
    /// its serial as `dataloggerSerialNumber`.
    pub fn link_datalogger(
        &mut self,
        stream: EntityId,
        datalogger: EntityId,
        serial: Option<&str>,
    ) -> Result<(), InventoryError> {
        let public_id = self.equipment_public_id(datalogger, EntityKind::Datalogger)?;
        self.link(
            stream,
            ("datalogger", public_id.as_str()),
            ("dataloggerSerialNumber", serial),
        )
    }

    fn link(
        &mut self,
        stream: EntityId,
        (reference, public_id): (&str, &str),
        (serial_field, serial): (&str, Option<&str>),
    ) -> Result<(), InventoryError> {
        let mut candidate = self.candidate(stream)?;
        if candidate.kind() != EntityKind::Stream {
            return Err(InventoryError::NotFound(stream));
        }
        let mistyped = |v: Violation| InventoryError::violation(v.on(stream));
        candidate.set_field(reference, Some(public_id)).map_err(mistyped)?;
        if serial.is_some() {
            candidate.set_field(serial_field, serial).map_err(mistyped)?;
        }
        self.replace_checked(stream, candidate)
    }

    // ========================================================================
    // VALIDATION
    // ========================================================================

    /// Entities in document order: sensors, dataloggers, then each network
    /// depth-first. Yields `(id, depth)`.
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(self)
    }

    /// Every current violation across the graph, computed lazily and afresh
    /// on each call.
    pub fn validate_all(&self) -> Violations<'_> {
        Violations::new(self)
    }

    /// Findings for one entity (record checks plus sibling/reference checks)
    pub fn violations_for(&self, id: EntityId) -> Vec<Violation> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        self.check_candidate(Some(id), node.parent, &node.entity)
            .into_iter()
            .map(|v| v.on(id))
            .collect()
    }

    fn check_candidate(
        &self,
        self_id: Option<EntityId>,
        parent: Option<EntityId>,
        candidate: &Entity,
    ) -> Vec<Violation> {
        let kind = candidate.kind();
        let code = candidate.code();
        let mut violations = candidate.validate();

        if let Some(epoch) = candidate.epoch() {
            for other in self.epochs.overlapping(parent, code, epoch, self_id) {
                let other_epoch = self.get(other).and_then(Entity::epoch).copied();
                violations.push(Violation::new(
                    kind,
                    "code",
                    match other_epoch {
                        Some(o) => format!(
                            "'{}' {} overlaps sibling {} with epoch {}",
                            code, epoch, other, o
                        ),
                        None => format!("'{}' {} overlaps sibling {}", code, epoch, other),
                    },
                ));
            }
        }

        if kind.is_equipment() {
            let duplicates = self
                .root_list(kind)
                .iter()
                .filter(|other| Some(**other) != self_id)
                .filter(|other| self.get(**other).map_or(false, |e| e.code() == code))
                .count();
            if duplicates > 0 && !code.is_empty() {
                violations.push(Violation::new(
                    kind,
                    "name",
                    format!("{} name '{}' is already in use", kind, code),
                ));
            }
        }

        if let Some(public_id) = candidate.public_id() {
            let taken = self
                .public_ids
                .get(public_id)
                .map_or(false, |ids| ids.iter().any(|other| Some(*other) != self_id));
            if taken {
                violations.push(Violation::new(
                    kind,
                    "publicID",
                    format!("publicID '{}' is already in use", public_id),
                ));
            }
        }

        if let Entity::Stream(stream) = candidate {
            self.check_reference(&stream.sensor, EntityKind::Sensor, &mut violations);
            self.check_reference(&stream.datalogger, EntityKind::Datalogger, &mut violations);
        }

        violations
    }

    fn check_reference(&self, reference: &str, kind: EntityKind, violations: &mut Vec<Violation>) {
        let field = kind.element();
        if reference.is_empty() {
            violations.push(Violation::new(
                EntityKind::Stream,
                field,
                format!("a stream must reference a {}", field),
            ));
            return;
        }
        let resolves = self
            .find_by_public_id(reference)
            .and_then(|id| self.kind(id))
            .map_or(false, |k| k == kind);
        if !resolves {
            violations.push(Violation::new(
                EntityKind::Stream,
                field,
                format!("unknown {} '{}'", field, reference),
            ));
        }
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn allocate_id(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    fn root_list(&self, kind: EntityKind) -> &[EntityId] {
        match kind {
            EntityKind::Network => &self.networks,
            EntityKind::Sensor => &self.sensors,
            EntityKind::Datalogger => &self.dataloggers,
            _ => &[],
        }
    }

    fn root_list_mut(&mut self, kind: EntityKind) -> Option<&mut Vec<EntityId>> {
        match kind {
            EntityKind::Network => Some(&mut self.networks),
            EntityKind::Sensor => Some(&mut self.sensors),
            EntityKind::Datalogger => Some(&mut self.dataloggers),
            _ => None,
        }
    }

    /// Children of an owner in the order the encoder writes them.
    pub(crate) fn encode_order(&self, owner: Option<EntityId>) -> Vec<EntityId> {
        match owner {
            Some(id) => self
                .nodes
                .get(&id)
                .map(|n| n.children.clone())
                .unwrap_or_default(),
            None => self
                .sensors
                .iter()
                .chain(&self.dataloggers)
                .chain(&self.networks)
                .copied()
                .collect(),
        }
    }

    fn predecessor_anchor(&self, owner: Option<EntityId>, child: EntityId) -> Anchor {
        let order = self.encode_order(owner);
        let position = order.iter().position(|c| *c == child).unwrap_or(0);
        match (position, owner) {
            (0, Some(_)) => Anchor::AfterFields,
            (0, None) => Anchor::Leading,
            (p, _) => Anchor::AfterChild(order[p - 1]),
        }
    }

    /// `id` and all of its descendants, pre-order
    fn subtree(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn candidate(&self, id: EntityId) -> Result<Entity, InventoryError> {
        self.get(id).cloned().ok_or(InventoryError::NotFound(id))
    }

    fn equipment_public_id(&self, id: EntityId, kind: EntityKind) -> Result<String, InventoryError> {
        self.get(id)
            .filter(|e| e.kind() == kind)
            .and_then(|e| e.public_id())
            .map(str::to_string)
            .ok_or(InventoryError::NotFound(id))
    }

    fn expect_parent(
        &self,
        parent: Option<EntityId>,
        kind: EntityKind,
    ) -> Result<(), InventoryError> {
        let expected = match kind {
            EntityKind::Station => Some(EntityKind::Network),
            EntityKind::Location => Some(EntityKind::Station),
            EntityKind::Stream => Some(EntityKind::Location),
            _ => None,
        };
        match (expected, parent) {
            (None, None) => Ok(()),
            // A parent of the wrong kind is not a valid parent at all
            (Some(expected), Some(p)) if self.kind(p) == Some(expected) => Ok(()),
            (Some(_), Some(p)) => Err(InventoryError::NotFound(p)),
            _ => Err(InventoryError::violation(Violation::new(
                kind,
                "parent",
                format!("{} has the wrong owner", kind),
            ))),
        }
    }

    fn insert_checked(
        &mut self,
        parent: Option<EntityId>,
        mut entity: Entity,
    ) -> Result<EntityId, InventoryError> {
        self.expect_parent(parent, entity.kind())?;

        if let (Some(prefix), Some(public_id)) =
            (entity.kind().public_id_prefix(), entity.public_id_mut())
        {
            if public_id.trim().is_empty() {
                *public_id = format!("{}/{}", prefix, uuid::Uuid::new_v4().simple());
            }
        }

        let violations = self.check_candidate(None, parent, &entity);
        if !violations.is_empty() {
            debug!(kind = %entity.kind(), code = entity.code(), "insert rejected");
            return Err(InventoryError::ConstraintViolation { violations });
        }

        let id = self.attach(parent, entity);
        debug!(%id, "inserted entity");
        Ok(id)
    }

    /// Insert without any invariant checks; the decoder loads files as they
    /// are and reports problems through `validate_all`.
    pub(crate) fn insert_unchecked(&mut self, parent: Option<EntityId>, entity: Entity) -> EntityId {
        self.attach(parent, entity)
    }

    /// Swap a record without invariant checks, keeping the indexes current.
    pub(crate) fn replace_unchecked(&mut self, id: EntityId, entity: Entity) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let parent = node.parent;
        let new_keys = IndexKeys::of(&entity);
        let old = std::mem::replace(&mut node.entity, entity);
        self.unindex(id, parent, &IndexKeys::of(&old));
        self.index(id, parent, new_keys);
    }

    fn replace_checked(&mut self, id: EntityId, candidate: Entity) -> Result<(), InventoryError> {
        let node = self.nodes.get(&id).ok_or(InventoryError::NotFound(id))?;
        let current = &node.entity;

        if candidate.kind() != current.kind() {
            return Err(InventoryError::violation(
                Violation::new(current.kind(), "kind", "entity kind cannot change").on(id),
            ));
        }

        let mut violations = self.check_candidate(Some(id), node.parent, &candidate);
        if current.kind().is_equipment() && current.public_id() != candidate.public_id() {
            let streams = self.streams_referencing(id);
            if !streams.is_empty() {
                violations.push(Violation::new(
                    current.kind(),
                    "publicID",
                    format!("publicID is referenced by {} stream(s)", streams.len()),
                ));
            }
        }
        if !violations.is_empty() {
            debug!(%id, count = violations.len(), "update rejected");
            return Err(InventoryError::ConstraintViolation {
                violations: violations.into_iter().map(|v| v.on(id)).collect(),
            });
        }

        self.replace_unchecked(id, candidate);
        Ok(())
    }

    fn attach(&mut self, parent: Option<EntityId>, entity: Entity) -> EntityId {
        let id = self.allocate_id();
        let kind = entity.kind();
        self.index(id, parent, IndexKeys::of(&entity));

        match parent {
            Some(p) => {
                if let Some(parent_node) = self.nodes.get_mut(&p) {
                    parent_node.children.push(id);
                }
            }
            None => {
                if let Some(list) = self.root_list_mut(kind) {
                    list.push(id);
                }
            }
        }

        self.nodes.insert(
            id,
            Node {
                parent,
                children: Vec::new(),
                entity,
            },
        );
        id
    }

    fn index(&mut self, id: EntityId, parent: Option<EntityId>, keys: IndexKeys) {
        if let Some(epoch) = keys.epoch {
            self.epochs.insert(parent, &keys.code, epoch, id);
        }
        if let Some(public_id) = keys.public_id {
            self.public_ids.entry(public_id).or_default().push(id);
        }
    }

    fn unindex(&mut self, id: EntityId, parent: Option<EntityId>, keys: &IndexKeys) {
        if keys.epoch.is_some() {
            self.epochs.remove(parent, &keys.code, id);
        }
        if let Some(public_id) = &keys.public_id {
            if let Some(ids) = self.public_ids.get_mut(public_id) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.public_ids.remove(public_id);
                }
            }
        }
    }
}

/// Sort key for stream codes: band, instrument, orientation rank.
fn display_key(code: &str) -> (String, String, u8) {
    let chars: Vec<char> = code.chars().collect();
    if chars.len() < 3 {
        return (String::new(), String::new(), u8::MAX);
    }
    let orientation = match chars[2] {
        'E' | '1' => 0,
        'N' | '2' => 1,
        'Z' => 2,
        _ => 3,
    };
    (chars[0].to_string(), chars[1].to_string(), orientation)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Coordinates;
    use chrono::TimeZone;

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    struct Fixture {
        inv: Inventory,
        network: EntityId,
        station: EntityId,
        location: EntityId,
        stream: EntityId,
        sensor: EntityId,
        datalogger: EntityId,
    }

    /// XX / AAA (2000-01-01, open) / 00 / BHZ -> SENSOR1 + DL1
    fn fixture() -> Fixture {
        let mut inv = Inventory::new();
        let sensor = inv.add_sensor(Sensor::new("Sensor/S1", "SENSOR1")).unwrap();
        let datalogger = inv
            .add_datalogger(Datalogger::new("Datalogger/D1", "DL1"))
            .unwrap();
        let network = inv.add_network(Network::new("XX", ymd(2000, 1, 1))).unwrap();
        let station = inv
            .add_station(
                network,
                Station::new("AAA", ymd(2000, 1, 1))
                    .with_coordinates(Coordinates::new(52.0, 13.0, 100.0)),
            )
            .unwrap();
        let location = inv
            .add_location(station, Location::new("00", ymd(2000, 1, 1)))
            .unwrap();
        let stream = inv
            .add_stream(
                location,
                Stream::new("BHZ", ymd(2000, 1, 1), "Sensor/S1", "Datalogger/D1"),
            )
            .unwrap();
        Fixture {
            inv,
            network,
            station,
            location,
            stream,
            sensor,
            datalogger,
        }
    }

    #[test]
    fn test_build_hierarchy() {
        let f = fixture();
        assert_eq!(f.inv.len(), 6);
        assert_eq!(f.inv.networks(), &[f.network]);
        assert_eq!(f.inv.children(f.network).unwrap(), &[f.station]);
        assert_eq!(f.inv.children(f.station).unwrap(), &[f.location]);
        assert_eq!(f.inv.children(f.location).unwrap(), &[f.stream]);
        assert_eq!(f.inv.parent(f.stream), Some(f.location));
        assert_eq!(f.inv.validate_all().count(), 0);
    }

    #[test]
    fn test_generated_public_ids() {
        let f = fixture();
        let network = f.inv.get(f.network).unwrap();
        assert!(network.public_id().unwrap().starts_with("Network/"));
        let location = f.inv.get(f.location).unwrap();
        assert!(location.public_id().unwrap().starts_with("SensorLocation/"));
        assert_eq!(f.inv.get(f.sensor).unwrap().public_id(), Some("Sensor/S1"));
    }

    #[test]
    fn test_remove_referenced_sensor_fails() {
        let mut f = fixture();
        let before = f.inv.len();

        match f.inv.remove(f.sensor) {
            Err(InventoryError::ReferencedEntity { id, streams }) => {
                assert_eq!(id, f.sensor);
                assert_eq!(streams, vec![f.stream]);
            }
            other => panic!("expected ReferencedEntity, got {:?}", other),
        }
        assert_eq!(f.inv.len(), before);
        assert!(f.inv.contains(f.sensor));
    }

    #[test]
    fn test_cascade_then_equipment_removal() {
        let mut f = fixture();

        let removed = f.inv.remove(f.station).unwrap();
        assert_eq!(removed, vec![f.station, f.location, f.stream]);
        assert!(!f.inv.contains(f.location));
        assert!(!f.inv.contains(f.stream));
        assert!(f.inv.children(f.network).unwrap().is_empty());

        // Equipment survives the cascade and is now free to go
        assert!(f.inv.contains(f.sensor));
        f.inv.remove(f.sensor).unwrap();
        f.inv.remove(f.datalogger).unwrap();
        assert_eq!(f.inv.sensors().len(), 0);
    }

    #[test]
    fn test_remove_stream_keeps_equipment() {
        let mut f = fixture();
        f.inv.remove(f.stream).unwrap();
        assert!(f.inv.contains(f.sensor));
        assert!(f.inv.streams_referencing(f.sensor).is_empty());
    }

    #[test]
    fn test_remove_unknown_id() {
        let mut f = fixture();
        assert!(matches!(
            f.inv.remove(EntityId(999)),
            Err(InventoryError::NotFound(EntityId(999)))
        ));
    }

    #[test]
    fn test_station_epochs_touching_boundary() {
        let mut inv = Inventory::new();
        let xx = inv.add_network(Network::new("XX", ymd(1990, 1, 1))).unwrap();

        inv.add_station(xx, Station::new("AAA", ymd(2000, 1, 1)).with_end(ymd(2010, 1, 1)))
            .unwrap();
        inv.add_station(xx, Station::new("AAA", ymd(2010, 1, 1))).unwrap();

        let before = inv.len();
        let err = inv
            .add_station(xx, Station::new("AAA", ymd(2005, 1, 1)).with_end(ymd(2008, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, InventoryError::ConstraintViolation { .. }));
        assert_eq!(inv.len(), before);
        assert_eq!(inv.children(xx).unwrap().len(), 2);
    }

    #[test]
    fn test_same_code_under_different_parents() {
        let mut inv = Inventory::new();
        let xx = inv.add_network(Network::new("XX", ymd(2000, 1, 1))).unwrap();
        let yy = inv.add_network(Network::new("YY", ymd(2000, 1, 1))).unwrap();
        inv.add_station(xx, Station::new("AAA", ymd(2000, 1, 1))).unwrap();
        inv.add_station(yy, Station::new("AAA", ymd(2000, 1, 1))).unwrap();
    }

    #[test]
    fn test_duplicate_network_epochs() {
        let mut inv = Inventory::new();
        inv.add_network(Network::new("XX", ymd(2000, 1, 1))).unwrap();
        assert!(inv.add_network(Network::new("XX", ymd(2001, 1, 1))).is_err());
        inv.add_network(Network::new("XX", ymd(1990, 1, 1)).with_end(ymd(2000, 1, 1)))
            .unwrap();
    }

    #[test]
    fn test_set_dates_rejects_reversed_interval() {
        let mut f = fixture();
        let err = f
            .inv
            .set_dates(f.stream, ymd(2005, 1, 1), Some(ymd(2004, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, InventoryError::ConstraintViolation { .. }));

        let epoch = f.inv.get(f.stream).unwrap().epoch().copied().unwrap();
        assert_eq!(epoch, Epoch::open(ymd(2000, 1, 1)));
    }

    #[test]
    fn test_set_dates_on_equipment_fails() {
        let mut f = fixture();
        assert!(f.inv.set_dates(f.sensor, ymd(2000, 1, 1), None).is_err());
    }

    #[test]
    fn test_set_dates_moves_epoch_in_index() {
        let mut inv = Inventory::new();
        let xx = inv.add_network(Network::new("XX", ymd(2000, 1, 1))).unwrap();
        let first = inv.add_station(xx, Station::new("AAA", ymd(2000, 1, 1))).unwrap();

        inv.set_dates(first, ymd(2000, 1, 1), Some(ymd(2005, 1, 1))).unwrap();
        inv.add_station(xx, Station::new("AAA", ymd(2005, 1, 1))).unwrap();

        // Re-opening the first epoch would now collide
        assert!(inv.set_dates(first, ymd(2000, 1, 1), None).is_err());
    }

    #[test]
    fn test_rename_checks_siblings() {
        let mut inv = Inventory::new();
        let xx = inv.add_network(Network::new("XX", ymd(2000, 1, 1))).unwrap();
        inv.add_station(xx, Station::new("AAA", ymd(2000, 1, 1))).unwrap();
        let bbb = inv.add_station(xx, Station::new("BBB", ymd(2000, 1, 1))).unwrap();

        assert!(inv.rename(bbb, "AAA").is_err());
        assert_eq!(inv.get(bbb).unwrap().code(), "BBB");

        inv.rename(bbb, "CCC").unwrap();
        assert_eq!(inv.find_child(xx, "CCC"), Some(bbb));
    }

    #[test]
    fn test_rename_to_itself_is_fine() {
        let mut f = fixture();
        f.inv.rename(f.station, "AAA").unwrap();
    }

    #[test]
    fn test_set_attribute_validates_then_applies() {
        let mut f = fixture();
        f.inv.set_attribute(f.station, "latitude", Some("45.1")).unwrap();
        let station = f.inv.get(f.station).unwrap().as_station().unwrap();
        assert_eq!(station.coordinates.latitude, Some(45.1));

        assert!(f.inv.set_attribute(f.station, "latitude", Some("95")).is_err());
        assert!(f.inv.set_attribute(f.station, "latitude", Some("north")).is_err());
        let station = f.inv.get(f.station).unwrap().as_station().unwrap();
        assert_eq!(station.coordinates.latitude, Some(45.1));
    }

    #[test]
    fn test_stream_reference_must_resolve() {
        let mut f = fixture();
        assert!(f
            .inv
            .set_attribute(f.stream, "sensor", Some("Sensor/missing"))
            .is_err());
        // A datalogger publicID is not a sensor
        assert!(f
            .inv
            .set_attribute(f.stream, "sensor", Some("Datalogger/D1"))
            .is_err());

        let bad = Stream::new("BHN", ymd(2000, 1, 1), "", "Datalogger/D1");
        assert!(f.inv.add_stream(f.location, bad).is_err());
    }

    #[test]
    fn test_link_equipment() {
        let mut f = fixture();
        let s2 = f.inv.add_sensor(Sensor::new("Sensor/S2", "SENSOR2")).unwrap();

        f.inv.link_sensor(f.stream, s2, None).unwrap();
        assert_eq!(f.inv.streams_referencing(s2), vec![f.stream]);
        assert!(f.inv.streams_referencing(f.sensor).is_empty());

        // Wrong kind for the equipment id
        assert!(f.inv.link_sensor(f.stream, f.datalogger, None).is_err());
        assert!(f.inv.link_datalogger(f.stream, f.datalogger, None).is_ok());
        // Only streams carry equipment references
        assert!(f.inv.link_sensor(f.location, s2, None).is_err());
    }

    #[test]
    fn test_link_records_serial_numbers() {
        let mut f = fixture();
        let s2 = f.inv.add_sensor(Sensor::new("Sensor/S2", "SENSOR2")).unwrap();

        f.inv.link_sensor(f.stream, s2, Some("T3310")).unwrap();
        f.inv
            .link_datalogger(f.stream, f.datalogger, Some("Q330-5521"))
            .unwrap();
        let stream = f.inv.get(f.stream).unwrap().as_stream().unwrap();
        assert_eq!(stream.sensor, "Sensor/S2");
        assert_eq!(stream.sensor_serial_number.as_deref(), Some("T3310"));
        assert_eq!(stream.datalogger_serial_number.as_deref(), Some("Q330-5521"));

        // No serial given: the recorded one stays
        f.inv.link_sensor(f.stream, f.sensor, None).unwrap();
        let stream = f.inv.get(f.stream).unwrap().as_stream().unwrap();
        assert_eq!(stream.sensor, "Sensor/S1");
        assert_eq!(stream.sensor_serial_number.as_deref(), Some("T3310"));
    }

    #[test]
    fn test_resolve_reference() {
        let f = fixture();
        let (sensor, datalogger) = f.inv.resolve_reference(f.stream).unwrap();
        assert_eq!(sensor.name, "SENSOR1");
        assert_eq!(datalogger.name, "DL1");

        assert!(matches!(
            f.inv.resolve_reference(f.station),
            Err(InventoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_dangling_after_unchecked_load() {
        let mut f = fixture();
        let stream = Stream::new("BHN", ymd(2000, 1, 1), "Sensor/gone", "Datalogger/D1");
        let id = f.inv.insert_unchecked(Some(f.location), stream.into());

        match f.inv.resolve_reference(id) {
            Err(InventoryError::DanglingReference { reference, .. }) => {
                assert_eq!(reference, "Sensor/gone")
            }
            other => panic!("expected DanglingReference, got {:?}", other),
        }
        assert_eq!(f.inv.validate_all().count(), 1);
    }

    #[test]
    fn test_equipment_names_unique_per_catalog() {
        let mut f = fixture();
        assert!(f.inv.add_sensor(Sensor::new("Sensor/S9", "SENSOR1")).is_err());
        // Sensor and datalogger catalogs are separate namespaces
        f.inv
            .add_datalogger(Datalogger::new("Datalogger/D9", "SENSOR1"))
            .unwrap();
    }

    #[test]
    fn test_public_id_must_be_unique() {
        let mut f = fixture();
        assert!(f.inv.add_sensor(Sensor::new("Sensor/S1", "OTHER")).is_err());
    }

    #[test]
    fn test_referenced_equipment_keeps_public_id() {
        let mut f = fixture();
        assert!(f
            .inv
            .set_attribute(f.sensor, "publicID", Some("Sensor/renamed"))
            .is_err());
        // The name is free to change
        f.inv.rename(f.sensor, "STS-2").unwrap();
        assert_eq!(f.inv.find_sensor("STS-2"), Some(f.sensor));
    }

    #[test]
    fn test_wrong_parent_kind() {
        let mut f = fixture();
        let err = f
            .inv
            .add_location(f.network, Location::new("10", ymd(2000, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound(id) if id == f.network));
        assert!(matches!(
            f.inv
                .add_station(EntityId(404), Station::new("ZZZ", ymd(2000, 1, 1))),
            Err(InventoryError::NotFound(EntityId(404)))
        ));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut inv = Inventory::new();
        let xx = inv.add_network(Network::new("XX", ymd(2000, 1, 1))).unwrap();
        let codes = ["ZZZ", "AAA", "MMM"];
        for code in codes {
            inv.add_station(xx, Station::new(code, ymd(2000, 1, 1))).unwrap();
        }
        let got: Vec<&str> = inv
            .children(xx)
            .unwrap()
            .iter()
            .map(|id| inv.get(*id).unwrap().code())
            .collect();
        assert_eq!(got, codes);
    }

    #[test]
    fn test_streams_in_display_order() {
        let mut f = fixture();
        for code in ["BHN", "BHE", "HHZ", "BH1"] {
            f.inv
                .add_stream(
                    f.location,
                    Stream::new(code, ymd(2000, 1, 1), "Sensor/S1", "Datalogger/D1"),
                )
                .unwrap();
        }
        let ordered: Vec<&str> = f
            .inv
            .streams_in_display_order(f.location)
            .unwrap()
            .iter()
            .map(|id| f.inv.get(*id).unwrap().code())
            .collect();
        assert_eq!(ordered, vec!["BHE", "BH1", "BHN", "BHZ", "HHZ"]);

        // Stored order untouched
        let stored = f.inv.children(f.location).unwrap();
        assert_eq!(f.inv.get(stored[0]).unwrap().code(), "BHZ");
    }

    #[test]
    fn test_remove_reanchors_owner_extensions() {
        let mut inv = Inventory::new();
        let xx = inv.add_network(Network::new("XX", ymd(2000, 1, 1))).unwrap();
        let a = inv.add_station(xx, Station::new("AAA", ymd(2000, 1, 1))).unwrap();
        let b = inv.add_station(xx, Station::new("BBB", ymd(2000, 1, 1))).unwrap();

        let ext = inv.extensions_mut().get_mut(Owner::Entity(xx));
        ext.push_node(Anchor::AfterChild(a), "<!-- after a -->");
        ext.push_node(Anchor::AfterChild(b), "<!-- after b -->");
        inv.extensions_mut()
            .get_mut(Owner::Entity(b))
            .push_node(Anchor::Leading, "<x/>");

        inv.remove(b).unwrap();
        let ext = inv.extensions().get(Owner::Entity(xx)).unwrap();
        let after_a: Vec<&str> = ext.at(&Anchor::AfterChild(a)).collect();
        assert_eq!(after_a, vec!["<!-- after a -->", "<!-- after b -->"]);
        assert!(inv.extensions().get(Owner::Entity(b)).is_none());

        inv.remove(a).unwrap();
        let ext = inv.extensions().get(Owner::Entity(xx)).unwrap();
        assert_eq!(ext.at(&Anchor::AfterFields).count(), 2);
    }

    #[test]
    fn test_labels() {
        let f = fixture();
        assert_eq!(f.inv.label(f.network).as_deref(), Some("Network: XX"));
        assert_eq!(f.inv.label(f.sensor).as_deref(), Some("Sensor: SENSOR1"));
        assert_eq!(f.inv.label(EntityId(0)), None);
    }
}
