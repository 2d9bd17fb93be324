// 📤 Encoder - Document -> XML text
//
// Modeled content is written in schema order with two-space indentation.
// Retained unknown content is written back byte-for-byte at its anchor.
// Invariant violations never block encoding; only side-table entries that
// point at entities the graph no longer has fail the encode.

use super::Document;
use crate::entities::{Entity, EntityId, EntityKind};
use crate::error::CodecError;
use crate::inventory::{Anchor, ExtensionData, Inventory, Owner, RawAttribute};
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::debug;

const INDENT: &str = "  ";

/// Depth of `<Inventory>` below the document root
const INVENTORY_DEPTH: usize = 1;

/// Serialize a document. Deterministic: the same graph always gives the
/// same text.
pub fn encode(doc: &Document) -> Result<String, CodecError> {
    check_extensions(&doc.inventory)?;

    let header = &doc.header;
    let mut encoder = Encoder {
        inventory: &doc.inventory,
        prefix: header.prefix.as_deref(),
        writer: Writer::new(Vec::new()),
    };
    encoder.raw(&header.prolog);
    encoder.raw(&header.root_open);
    encoder.raw(&header.before_inventory);
    encoder.inventory_element()?;
    encoder.raw(&header.after_inventory);
    encoder.raw(&header.root_close);
    encoder.raw(&header.epilogue);

    let bytes = encoder.writer.into_inner();
    debug!(bytes = bytes.len(), entities = doc.inventory.len(), "encoded inventory");
    String::from_utf8(bytes).map_err(|e| CodecError::Internal(e.to_string()))
}

/// Every side-table entry must belong to a live owner and every anchor must
/// name something the owner still has.
fn check_extensions(inventory: &Inventory) -> Result<(), CodecError> {
    let extensions = inventory.extensions();
    for owner in extensions.owners() {
        let entity = inventory.get(owner).ok_or_else(|| {
            CodecError::Internal(format!("extension data for removed entity {}", owner))
        })?;
        if let Some(data) = extensions.get(Owner::Entity(owner)) {
            check_anchors(inventory, Some(owner), Some(entity.kind()), data)?;
        }
    }
    if let Some(data) = extensions.get(Owner::Inventory) {
        check_anchors(inventory, None, None, data)?;
    }
    Ok(())
}

fn check_anchors(
    inventory: &Inventory,
    owner: Option<EntityId>,
    kind: Option<EntityKind>,
    data: &ExtensionData,
) -> Result<(), CodecError> {
    for node in &data.nodes {
        match &node.anchor {
            Anchor::AfterChild(child) => {
                if !inventory.contains(*child) || inventory.parent(*child) != owner {
                    return Err(CodecError::Internal(format!(
                        "content anchored after {} which its owner does not contain",
                        child
                    )));
                }
            }
            Anchor::AfterField(field) => {
                if !kind.map_or(false, |k| k.fields().contains(&field.as_str())) {
                    return Err(CodecError::Internal(format!(
                        "content anchored after unknown field '{}'",
                        field
                    )));
                }
            }
            Anchor::Leading | Anchor::AfterFields => {}
        }
    }
    Ok(())
}

/// One attribute of an entity element, in output order.
enum Attr<'a> {
    Known(&'static str, String),
    Raw(&'a RawAttribute),
}

/// Modeled attributes in schema order, with retained ones slotted back in at
/// their original index.
fn merged_attributes<'a>(entity: &Entity, ext: Option<&'a ExtensionData>) -> Vec<Attr<'a>> {
    let mut out: Vec<Attr<'a>> = entity
        .kind()
        .attributes()
        .iter()
        .filter_map(|name| entity.field(name).map(|value| Attr::Known(*name, value)))
        .collect();

    if let Some(ext) = ext {
        let mut raw: Vec<&RawAttribute> = ext.attributes.iter().collect();
        raw.sort_by_key(|r| r.position);
        for attribute in raw {
            let at = attribute.position.min(out.len());
            out.insert(at, Attr::Raw(attribute));
        }
    }
    out
}

/// Start tag with attributes already rendered as `name=<quoted value>`.
///
/// `BytesStart::push_attribute` always double-quotes, which would break a
/// retained single-quoted value that contains `"`.
fn start_tag(name: &str, attributes: &[String]) -> BytesStart<'static> {
    let mut content = name.to_string();
    for attribute in attributes {
        content.push(' ');
        content.push_str(attribute);
    }
    BytesStart::from_content(content, name.len())
}

struct Encoder<'a> {
    inventory: &'a Inventory,
    prefix: Option<&'a str>,
    writer: Writer<Vec<u8>>,
}

impl<'a> Encoder<'a> {
    fn raw(&mut self, text: &str) {
        self.writer.get_mut().extend_from_slice(text.as_bytes());
    }

    fn indent(&mut self, depth: usize) {
        self.raw("\n");
        for _ in 0..depth {
            self.raw(INDENT);
        }
    }

    fn qualified(&self, name: &str) -> String {
        match self.prefix {
            Some(prefix) => format!("{}:{}", prefix, name),
            None => name.to_string(),
        }
    }

    fn nodes(&mut self, ext: Option<&ExtensionData>, anchor: &Anchor, depth: usize) {
        let Some(ext) = ext else {
            return;
        };
        for raw in ext.at(anchor) {
            self.indent(depth);
            self.raw(raw);
        }
    }

    fn inventory_element(&mut self) -> Result<(), CodecError> {
        let inventory = self.inventory;
        let ext = inventory.extensions().get(Owner::Inventory);
        let name = self.qualified("Inventory");

        let mut raw: Vec<&RawAttribute> = ext
            .map(|e| e.attributes.iter().collect())
            .unwrap_or_default();
        raw.sort_by_key(|r| r.position);
        let attributes: Vec<String> = raw.iter().map(|r| r.to_xml()).collect();
        let start = start_tag(&name, &attributes);

        let children = inventory.encode_order(None);
        let has_nodes = ext.map_or(false, |e| !e.nodes.is_empty());
        if children.is_empty() && !has_nodes {
            self.writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        let depth = INVENTORY_DEPTH + 1;
        self.writer.write_event(Event::Start(start))?;
        self.nodes(ext, &Anchor::Leading, depth);
        self.nodes(ext, &Anchor::AfterFields, depth);
        for child in children {
            self.entity(child, depth)?;
            self.nodes(ext, &Anchor::AfterChild(child), depth);
        }
        self.indent(INVENTORY_DEPTH);
        self.writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        Ok(())
    }

    fn entity(&mut self, id: EntityId, depth: usize) -> Result<(), CodecError> {
        let inventory = self.inventory;
        let entity = inventory
            .get(id)
            .ok_or_else(|| CodecError::Internal(format!("entity {} is listed but missing", id)))?;
        let kind = entity.kind();
        let ext = inventory.extensions().get(Owner::Entity(id));
        let children = inventory
            .children(id)
            .map_err(|e| CodecError::Internal(e.to_string()))?;

        let name = self.qualified(kind.element());
        let attributes: Vec<String> = merged_attributes(entity, ext)
            .into_iter()
            .map(|attribute| match attribute {
                Attr::Known(key, value) => format!("{}=\"{}\"", key, escape(value.as_str())),
                Attr::Raw(raw) => raw.to_xml(),
            })
            .collect();
        let start = start_tag(&name, &attributes);

        let has_fields = kind.fields().iter().any(|f| entity.field(f).is_some());
        let has_nodes = ext.map_or(false, |e| !e.nodes.is_empty());

        self.indent(depth);
        if !has_fields && children.is_empty() && !has_nodes {
            self.writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        self.writer.write_event(Event::Start(start))?;

        let inner = depth + 1;
        self.nodes(ext, &Anchor::Leading, inner);
        for field in kind.fields() {
            if let Some(value) = entity.field(field) {
                let tag = self.qualified(field);
                self.indent(inner);
                self.writer
                    .create_element(tag.as_str())
                    .write_text_content(BytesText::new(&value))?;
            }
            if ext.is_some() {
                self.nodes(ext, &Anchor::AfterField(field.to_string()), inner);
            }
        }
        self.nodes(ext, &Anchor::AfterFields, inner);

        for child in children {
            self.entity(*child, inner)?;
            self.nodes(ext, &Anchor::AfterChild(*child), inner);
        }

        self.indent(depth);
        self.writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::entities::{Datalogger, Location, Network, Sensor, Station, Stream};
    use chrono::{TimeZone, Utc};

    const EXTENDED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- exported by hand -->
<seiscomp xmlns="http://geofon.gfz-potsdam.de/ns/seiscomp3-schema/0.10" version="0.10">
  <Inventory source="archive">
    <responsePAZ publicID="RESP/1" name="paz"><type>A</type><poles>(-0.037,0.037)</poles></responsePAZ>
    <sensor publicID="Sensor/S1" vendor:tag="a&amp;b" name="SENSOR1" response="RESP/1">
      <description>broadband</description>
      <x-note>keep me</x-note>
      <model>STS-2</model>
    </sensor>
    <datalogger publicID="Datalogger/D1" name="DL1">
      <decimation sampleRateNumerator="20" sampleRateDenominator="1"/>
    </datalogger>
    <network publicID="Network/XX" code="XX">
      <start>2000-01-01T00:00:00.0000Z</start>
      <station publicID="Station/AAA" code="AAA">
        <start>2000-01-01T00:00:00.0000Z</start>
      </station>
      <!-- between stations -->
      <station publicID="Station/BBB" code="BBB">
        <start>2000-01-01T00:00:00.0000Z</start>
        <sensorLocation publicID="SensorLocation/BBB00" code="00">
          <start>2000-01-01T00:00:00.0000Z</start>
          <stream code="HHZ" datalogger="Datalogger/D1" sensor="Sensor/S1">
            <start>2000-01-01T00:00:00.0000Z</start>
            <comment><text>swapped 2004</text></comment>
          </stream>
        </sensorLocation>
      </station>
    </network>
  </Inventory>
</seiscomp>
"#;

    const UNKNOWN_FRAGMENTS: &[&str] = &[
        "<!-- exported by hand -->",
        r#"source="archive""#,
        r#"<responsePAZ publicID="RESP/1" name="paz"><type>A</type><poles>(-0.037,0.037)</poles></responsePAZ>"#,
        r#"vendor:tag="a&amp;b""#,
        "<x-note>keep me</x-note>",
        r#"<decimation sampleRateNumerator="20" sampleRateDenominator="1"/>"#,
        "<!-- between stations -->",
        "<comment><text>swapped 2004</text></comment>",
    ];

    fn entities(inventory: &Inventory) -> Vec<(usize, Entity)> {
        inventory
            .walk()
            .map(|(id, depth)| (depth, inventory.get(id).cloned().unwrap()))
            .collect()
    }

    #[test]
    fn test_unknown_content_survives_round_trip() {
        let loaded = decode(EXTENDED).unwrap();
        let xml = encode(&loaded.document).unwrap();

        let mut last = 0;
        for fragment in UNKNOWN_FRAGMENTS {
            let at = xml[last..]
                .find(fragment)
                .unwrap_or_else(|| panic!("missing or out of order: {}\n{}", fragment, xml));
            last += at + fragment.len();
        }
        assert!(xml.contains(
            r#"<seiscomp xmlns="http://geofon.gfz-potsdam.de/ns/seiscomp3-schema/0.10" version="0.10">"#
        ));
    }

    #[test]
    fn test_retained_attribute_keeps_its_position() {
        let loaded = decode(EXTENDED).unwrap();
        let xml = encode(&loaded.document).unwrap();
        assert!(xml.contains(
            r#"<sensor publicID="Sensor/S1" vendor:tag="a&amp;b" name="SENSOR1" response="RESP/1">"#
        ));
    }

    #[test]
    fn test_retained_attribute_keeps_its_quotes() {
        let xml = r#"<seiscomp><Inventory note='a "b"'><sensor publicID="Sensor/S1" name="S" note='say "hi"' alt="x&apos;y"/></Inventory></seiscomp>"#;
        let encoded = encode(&decode(xml).unwrap().document).unwrap();
        assert!(encoded.contains(r#"<Inventory note='a "b"'>"#), "{}", encoded);
        assert!(encoded.contains(r#"<sensor publicID="Sensor/S1" name="S" note='say "hi"' alt="x&apos;y"/>"#));

        let again = decode(&encoded).unwrap().document;
        let s1 = again.inventory.find_sensor("S").unwrap();
        let attributes = &again.inventory.extensions().get(Owner::Entity(s1)).unwrap().attributes;
        assert_eq!(attributes[0].raw_value, r#"say "hi""#);
        assert_eq!(encode(&again).unwrap(), encoded);
    }

    #[test]
    fn test_foreign_prefixed_elements_written_back_verbatim() {
        let xml = r#"<seiscomp><Inventory><x:network xmlns:x="urn:x" code="Q"><x:start>2000-01-01</x:start></x:network><network code="XX"><start>2000-01-01</start><x:station xmlns:x="urn:x" code="S"/></network></Inventory></seiscomp>"#;
        let loaded = decode(xml).unwrap();
        assert_eq!(loaded.document.inventory.len(), 1);

        let encoded = encode(&loaded.document).unwrap();
        assert!(encoded.contains(
            r#"<x:network xmlns:x="urn:x" code="Q"><x:start>2000-01-01</x:start></x:network>"#
        ));
        assert!(encoded.contains(r#"<x:station xmlns:x="urn:x" code="S"/>"#));
        assert_eq!(encoded.matches("<network").count(), 1);
    }

    #[test]
    fn test_loaded_scenario_survives_edits() {
        let xml = r#"<seiscomp><Inventory>
  <sensor publicID="Sensor/S1" name="SENSOR1"/>
  <datalogger publicID="Datalogger/D1" name="DL1"/>
  <network code="XX"><start>2000-01-01</start>
    <station code="AAA"><start>2000-01-01</start>
      <sensorLocation code="00"><start>2000-01-01</start>
        <stream code="BHZ" sensor="Sensor/S1" datalogger="Datalogger/D1"><start>2000-01-01</start></stream>
      </sensorLocation>
    </station>
  </network>
</Inventory></seiscomp>"#;
        let mut doc = decode(xml).unwrap().document;
        let s1 = doc.inventory.find_sensor("SENSOR1").unwrap();
        let xx = doc.inventory.find_network("XX").unwrap();
        let aaa = doc.inventory.find_child(xx, "AAA").unwrap();

        assert!(doc.inventory.remove(s1).is_err());
        assert_eq!(encode(&doc).unwrap().matches(r#"code="BHZ""#).count(), 1);

        doc.inventory.remove(aaa).unwrap();
        doc.inventory.remove(s1).unwrap();
        let encoded = encode(&doc).unwrap();
        assert!(!encoded.contains("SENSOR1"));
        assert!(!encoded.contains("AAA"));

        let reloaded = decode(&encoded).unwrap();
        assert!(reloaded.violations.is_empty());
        assert_eq!(reloaded.document.inventory.len(), 2);
    }

    #[test]
    fn test_encode_is_stable() {
        let first = encode(&decode(EXTENDED).unwrap().document).unwrap();
        let second = encode(&decode(&first).unwrap().document).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_of_encode_matches_graph() {
        let original = decode(EXTENDED).unwrap().document;
        let again = decode(&encode(&original).unwrap()).unwrap().document;
        assert_eq!(entities(&original.inventory), entities(&again.inventory));
    }

    #[test]
    fn test_api_built_graph_round_trip() {
        let start = Utc.with_ymd_and_hms(2001, 2, 3, 4, 5, 6).unwrap();
        let mut inventory = Inventory::new();
        inventory
            .add_sensor(Sensor::new("Sensor/S1", "STS-2").with_model("STS-2", "Streckeisen"))
            .unwrap();
        inventory
            .add_datalogger(Datalogger::new("Datalogger/D1", "Q330"))
            .unwrap();
        let xx = inventory
            .add_network(Network::new("XX", start).with_description("A & B <c>"))
            .unwrap();
        let aaa = inventory.add_station(xx, Station::new("AAA", start)).unwrap();
        let loc = inventory.add_location(aaa, Location::new("", start)).unwrap();
        inventory
            .add_stream(
                loc,
                Stream::new("BHZ", start, "Sensor/S1", "Datalogger/D1")
                    .with_sample_rate(40, 1)
                    .with_orientation(0.0, -90.0),
            )
            .unwrap();

        let doc = Document::from_inventory(inventory);
        let xml = encode(&doc).unwrap();
        assert!(xml.contains("<description>A &amp; B &lt;c&gt;</description>"));
        assert!(xml.contains("<start>2001-02-03T04:05:06.0000Z</start>"));

        let loaded = decode(&xml).unwrap();
        assert!(loaded.violations.is_empty());
        assert_eq!(entities(&doc.inventory), entities(&loaded.document.inventory));
    }

    #[test]
    fn test_empty_document() {
        let xml = encode(&Document::new()).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<Inventory/>"));
        let loaded = decode(&xml).unwrap();
        assert!(loaded.document.inventory.is_empty());
    }

    #[test]
    fn test_removed_child_keeps_following_comment() {
        let mut doc = decode(EXTENDED).unwrap().document;
        let xx = doc.inventory.find_network("XX").unwrap();
        let aaa = doc.inventory.find_child(xx, "AAA").unwrap();
        doc.inventory.remove(aaa).unwrap();

        let xml = encode(&doc).unwrap();
        assert!(!xml.contains(r#"code="AAA""#));
        let comment = xml.find("<!-- between stations -->").unwrap();
        let start = xml.find("<start>2000-01-01T00:00:00.0000Z</start>").unwrap();
        let bbb = xml.find(r#"code="BBB""#).unwrap();
        assert!(start < comment && comment < bbb);
    }

    #[test]
    fn test_cascade_prunes_stream_extensions() {
        let mut doc = decode(EXTENDED).unwrap().document;
        let xx = doc.inventory.find_network("XX").unwrap();
        let bbb = doc.inventory.find_child(xx, "BBB").unwrap();
        doc.inventory.remove(bbb).unwrap();

        let xml = encode(&doc).unwrap();
        assert!(!xml.contains("swapped 2004"));
        assert!(xml.contains("<!-- between stations -->"));
    }

    #[test]
    fn test_orphaned_extension_is_internal_error() {
        let mut doc = decode(EXTENDED).unwrap().document;
        doc.inventory
            .extensions_mut()
            .get_mut(Owner::Entity(EntityId(9999)))
            .push_node(Anchor::Leading, "<lost/>");
        assert!(matches!(encode(&doc), Err(CodecError::Internal(_))));
    }

    #[test]
    fn test_dangling_anchor_is_internal_error() {
        let mut doc = decode(EXTENDED).unwrap().document;
        doc.inventory
            .extensions_mut()
            .get_mut(Owner::Inventory)
            .push_node(Anchor::AfterChild(EntityId(9999)), "<lost/>");
        assert!(matches!(encode(&doc), Err(CodecError::Internal(_))));
    }

    #[test]
    fn test_violations_do_not_block_encode() {
        let xml = r#"<seiscomp><Inventory><network code="XX"><start>2010-01-01</start><end>2000-01-01</end></network></Inventory></seiscomp>"#;
        let loaded = decode(xml).unwrap();
        assert_eq!(loaded.violations.len(), 1);
        assert!(encode(&loaded.document).is_ok());
    }
}
