// ✅ Graph Validation - document-order walk and lazy violation stream
//
// validate_all() never caches: each call walks the current graph and checks
// every entity on demand, so a host can stop after the first finding.

use super::Inventory;
use crate::entities::{EntityId, Violation};

/// Pre-order traversal in the order the encoder writes entities.
pub struct Walk<'a> {
    inventory: &'a Inventory,
    stack: Vec<(EntityId, usize)>,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(inventory: &'a Inventory) -> Self {
        let roots = inventory.encode_order(None);
        let stack = roots.into_iter().rev().map(|id| (id, 0)).collect();
        Walk { inventory, stack }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = (EntityId, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, depth) = self.stack.pop()?;
        if let Ok(children) = self.inventory.children(id) {
            self.stack
                .extend(children.iter().rev().map(|child| (*child, depth + 1)));
        }
        Some((id, depth))
    }
}

/// Lazy stream of every violation in the graph.
pub struct Violations<'a> {
    inventory: &'a Inventory,
    walk: Walk<'a>,
    pending: std::vec::IntoIter<Violation>,
}

impl<'a> Violations<'a> {
    pub(crate) fn new(inventory: &'a Inventory) -> Self {
        Violations {
            inventory,
            walk: inventory.walk(),
            pending: Vec::new().into_iter(),
        }
    }
}

impl<'a> Iterator for Violations<'a> {
    type Item = Violation;

    fn next(&mut self) -> Option<Violation> {
        loop {
            if let Some(violation) = self.pending.next() {
                return Some(violation);
            }
            let (id, _) = self.walk.next()?;
            self.pending = self.inventory.violations_for(id).into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::entities::{
        Datalogger, Entity, EntityKind, Location, Network, Sensor, Station, Stream,
    };
    use crate::inventory::Inventory;
    use chrono::{DateTime, TimeZone, Utc};

    fn ymd(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_walk_is_document_order() {
        let mut inv = Inventory::new();
        let xx = inv.add_network(Network::new("XX", ymd(2000))).unwrap();
        let s = inv.add_sensor(Sensor::new("Sensor/1", "S1")).unwrap();
        let d = inv.add_datalogger(Datalogger::new("Datalogger/1", "D1")).unwrap();
        let aaa = inv.add_station(xx, Station::new("AAA", ymd(2000))).unwrap();
        let loc = inv.add_location(aaa, Location::new("", ymd(2000))).unwrap();
        let yy = inv.add_network(Network::new("YY", ymd(2000))).unwrap();

        let walked: Vec<_> = inv.walk().collect();
        assert_eq!(
            walked,
            vec![(s, 0), (d, 0), (xx, 0), (aaa, 1), (loc, 2), (yy, 0)]
        );
    }

    #[test]
    fn test_clean_graph_has_no_violations() {
        let inv = Inventory::new();
        assert_eq!(inv.validate_all().count(), 0);
    }

    #[test]
    fn test_overlap_reported_for_both_parties() {
        let mut inv = Inventory::new();
        let xx = inv.insert_unchecked(None, Network::new("XX", ymd(2000)).into());
        let a = inv.insert_unchecked(Some(xx), Station::new("AAA", ymd(2000)).into());
        let b = inv.insert_unchecked(Some(xx), Station::new("AAA", ymd(2005)).into());

        let owners: Vec<_> = inv.validate_all().map(|v| v.entity).collect();
        assert_eq!(owners, vec![Some(a), Some(b)]);
    }

    #[test]
    fn test_loaded_defects_are_all_reported() {
        let mut inv = Inventory::new();
        inv.insert_unchecked(None, Sensor::new("Sensor/1", "S1").into());
        inv.insert_unchecked(None, Sensor::new("Sensor/1", "S1").into());
        let xx = inv.insert_unchecked(None, Network::new("XX", ymd(2000)).into());
        let aaa = inv.insert_unchecked(Some(xx), Station::new("AAA", ymd(2000)).into());
        let loc = inv.insert_unchecked(Some(aaa), Location::new("00", ymd(2000)).into());

        let mut stream = Stream::new("BHZ", ymd(2000), "Sensor/1", "");
        stream.dip = Some(-95.0);
        inv.insert_unchecked(Some(loc), Entity::Stream(stream));

        let violations: Vec<_> = inv.validate_all().collect();
        let fields: Vec<(EntityKind, &str)> = violations
            .iter()
            .map(|v| (v.kind, v.field.as_str()))
            .collect();

        // Two sensors, each with a duplicate name and publicID
        assert_eq!(
            fields,
            vec![
                (EntityKind::Sensor, "name"),
                (EntityKind::Sensor, "publicID"),
                (EntityKind::Sensor, "name"),
                (EntityKind::Sensor, "publicID"),
                (EntityKind::Stream, "dip"),
                (EntityKind::Stream, "datalogger"),
            ]
        );
        assert!(violations.iter().all(|v| v.entity.is_some()));
    }

    #[test]
    fn test_validate_all_is_lazy() {
        let mut inv = Inventory::new();
        for i in 0..3 {
            inv.insert_unchecked(None, Sensor::new("", &format!("S{}", i)).into());
        }
        let first = inv.validate_all().next().unwrap();
        assert_eq!(first.field, "publicID");
    }
}
