// 🧩 Extension Side-Table - XML content the model does not interpret
//
// Unknown elements, comments and attributes are kept verbatim and keyed by
// the owning entity plus an anchor that says where inside the owner's
// element they appeared. The encoder re-emits them at the same spot.
// The Inventory prunes entries of removed entities and re-anchors content
// that sat right after a removed child.

use crate::entities::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Position of opaque content inside its owner's element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anchor {
    /// Before any modeled field
    Leading,

    /// Right after the named modeled field (schema order)
    AfterField(String),

    /// After all modeled fields, before the first child entity
    AfterFields,

    /// Right after the given child entity
    AfterChild(EntityId),
}

/// An unrecognised attribute, kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttribute {
    /// Index among all attributes of the element in the source document
    pub position: usize,

    /// Qualified name as written (may carry a prefix, e.g. `xmlns:foo`)
    pub name: String,

    /// Value still escaped, as it appeared between the quotes
    pub raw_value: String,

    /// `"` or `'`, whichever the value was written with
    pub quote: char,
}

impl RawAttribute {
    /// `name=` plus the value in its original quotes.
    pub fn to_xml(&self) -> String {
        format!("{}={q}{}{q}", self.name, self.raw_value, q = self.quote)
    }
}

/// An unrecognised element, comment or text run, byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueNode {
    pub anchor: Anchor,
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionData {
    pub attributes: Vec<RawAttribute>,
    pub nodes: Vec<OpaqueNode>,
}

impl ExtensionData {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.nodes.is_empty()
    }

    /// Opaque content at an anchor, in document order.
    pub fn at<'a, 'b>(&'a self, anchor: &'b Anchor) -> impl Iterator<Item = &'a str> + 'b
    where
        'a: 'b,
    {
        self.nodes
            .iter()
            .filter(move |n| &n.anchor == anchor)
            .map(|n| n.raw.as_str())
    }

    pub fn push_node(&mut self, anchor: Anchor, raw: impl Into<String>) {
        self.nodes.push(OpaqueNode {
            anchor,
            raw: raw.into(),
        });
    }

    /// Move everything anchored at `from` to `to`, keeping document order.
    pub fn reanchor(&mut self, from: &Anchor, to: &Anchor) {
        for node in self.nodes.iter_mut().filter(|n| &n.anchor == from) {
            node.anchor = to.clone();
        }
    }

    /// Children referenced by `AfterChild` anchors
    pub fn anchored_children(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.nodes.iter().filter_map(|n| match n.anchor {
            Anchor::AfterChild(id) => Some(id),
            _ => None,
        })
    }
}

/// Who owns a block of opaque content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    /// The `<Inventory>` element itself
    Inventory,
    Entity(EntityId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionTable {
    inventory: ExtensionData,
    entities: HashMap<EntityId, ExtensionData>,
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: Owner) -> Option<&ExtensionData> {
        match owner {
            Owner::Inventory => Some(&self.inventory),
            Owner::Entity(id) => self.entities.get(&id),
        }
    }

    pub fn get_mut(&mut self, owner: Owner) -> &mut ExtensionData {
        match owner {
            Owner::Inventory => &mut self.inventory,
            Owner::Entity(id) => self.entities.entry(id).or_default(),
        }
    }

    /// Store decoded extension data; empty data is not kept.
    pub fn insert(&mut self, owner: Owner, data: ExtensionData) {
        match owner {
            Owner::Inventory => self.inventory = data,
            Owner::Entity(id) => {
                if data.is_empty() {
                    self.entities.remove(&id);
                } else {
                    self.entities.insert(id, data);
                }
            }
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<ExtensionData> {
        self.entities.remove(&id)
    }

    /// Entities that currently own extension data
    pub fn owners(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.inventory.is_empty()
    }
}
