// 📥 Decoder - XML text -> Document
//
// One pass over the source with quick-xml. Modeled attributes and fields go
// into records; everything else (unknown elements, comments, CDATA, stray
// text, unknown attributes) is sliced out of the source text and parked in
// the extension side-table with the anchor where it appeared.
//
// Invariants are not checked here. The loaded graph is validated afterwards
// and the findings are returned next to the document.

use super::{Document, DocumentHeader, Loaded, SchemaVersion};
use crate::entities::{Entity, EntityId, EntityKind, Violation};
use crate::error::CodecError;
use crate::inventory::{Anchor, ExtensionData, Inventory, Owner, RawAttribute};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use std::ops::Range;
use tracing::{debug, info, warn};

const ROOT: &str = "seiscomp";
const INVENTORY: &str = "Inventory";

/// Parse a SeisComP inventory document.
pub fn decode(xml: &str) -> Result<Loaded, CodecError> {
    let document = Decoder::new(xml).document()?;
    let violations: Vec<Violation> = document.inventory.validate_all().collect();
    info!(
        entities = document.inventory.len(),
        violations = violations.len(),
        version = %document.header.version,
        "decoded inventory"
    );
    Ok(Loaded {
        document,
        violations,
    })
}

/// One step of element content, with insignificant whitespace dropped.
enum Content<'a> {
    Element {
        start: BytesStart<'a>,
        empty: bool,
        span: Range<usize>,
    },
    /// Comment, CDATA, processing instruction or non-blank text, verbatim
    Opaque(String),
    Close,
}

/// An entity record before and after it enters the graph.
enum Slot {
    Pending(Entity),
    Stored(EntityId),
}

struct Decoder<'a> {
    src: &'a str,
    reader: Reader<&'a [u8]>,

    /// Byte offset just past the last consumed event
    cursor: usize,

    /// Prefix and namespace of SeisComP elements, taken from the root
    prefix: Option<String>,
    namespace: String,

    inventory: Inventory,
}

impl<'a> Decoder<'a> {
    fn new(src: &'a str) -> Self {
        let mut reader = Reader::from_str(src);
        reader.config_mut().trim_text(false);
        Decoder {
            src,
            reader,
            cursor: 0,
            prefix: None,
            namespace: String::new(),
            inventory: Inventory::new(),
        }
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    /// Next event plus the byte range it occupies in the source.
    ///
    /// Markup ends where the reader stops; text runs up to the next `<`.
    fn next(&mut self) -> Result<(Event<'a>, Range<usize>), CodecError> {
        let event = self.reader.read_event().map_err(|e| self.malformed(e))?;
        let rest = &self.src[self.cursor..];
        let span = match &event {
            Event::Text(_) => {
                let end = rest.find('<').map_or(self.src.len(), |i| self.cursor + i);
                self.cursor..end
            }
            Event::Eof => self.cursor..self.src.len(),
            _ => {
                let start = rest.find('<').map_or(self.cursor, |i| self.cursor + i);
                start..(self.reader.buffer_position() as usize).max(start)
            }
        };
        self.cursor = span.end;
        Ok((event, span))
    }

    fn next_content(&mut self) -> Result<Content<'a>, CodecError> {
        loop {
            let (event, span) = self.next()?;
            return Ok(match event {
                Event::Start(start) => Content::Element {
                    start,
                    empty: false,
                    span,
                },
                Event::Empty(start) => Content::Element {
                    start,
                    empty: true,
                    span,
                },
                Event::End(_) => Content::Close,
                Event::Eof => return Err(self.unexpected_eof()),
                Event::Text(_) if self.src[span.clone()].trim().is_empty() => continue,
                _ => Content::Opaque(self.src[span].to_string()),
            });
        }
    }

    /// Consume an element the model does not know and return it verbatim.
    fn capture(
        &mut self,
        start: &BytesStart<'_>,
        empty: bool,
        span: Range<usize>,
    ) -> Result<String, CodecError> {
        if empty {
            return Ok(self.src[span].to_string());
        }
        self.skip(start.name())?;
        Ok(self.src[span.start..self.cursor].to_string())
    }

    fn skip(&mut self, name: QName<'_>) -> Result<(), CodecError> {
        self.reader.read_to_end(name).map_err(|e| self.malformed(e))?;
        self.cursor = self.reader.buffer_position() as usize;
        Ok(())
    }

    /// Text content of a simple field element like `<start>...</start>`.
    fn field_text(&mut self, start: &BytesStart<'_>, empty: bool) -> Result<String, CodecError> {
        let mut text = String::new();
        if empty {
            return Ok(text);
        }
        loop {
            let (event, span) = self.next()?;
            match event {
                Event::Text(t) => {
                    let value = t.unescape().map_err(|e| self.malformed_at(span.start, e))?;
                    text.push_str(&value);
                }
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
                Event::Comment(_) | Event::PI(_) => {}
                Event::End(_) => return Ok(text),
                Event::Start(_) | Event::Empty(_) => {
                    return Err(CodecError::schema(
                        &name_of(start.local_name().as_ref()),
                        "unexpected element inside a value",
                    ))
                }
                Event::Eof => return Err(self.unexpected_eof()),
                Event::Decl(_) | Event::DocType(_) => {
                    return Err(self.malformed_at(self.cursor, "misplaced declaration"))
                }
            }
        }
    }

    // ========================================================================
    // DOCUMENT
    // ========================================================================

    fn document(mut self) -> Result<Document, CodecError> {
        let (root, root_span, root_empty) = loop {
            let (event, span) = self.next()?;
            match event {
                Event::Start(e) => break (e, span, false),
                Event::Empty(e) => break (e, span, true),
                Event::Eof => return Err(CodecError::schema(ROOT, "document has no root element")),
                Event::Text(_) if !self.src[span.clone()].trim().is_empty() => {
                    return Err(self.malformed_at(span.start, "text before the root element"))
                }
                _ => {}
            }
        };

        let root_name = name_of(root.local_name().as_ref());
        if root_name != ROOT {
            return Err(CodecError::schema(
                &root_name,
                format!("root element must be <{}>", ROOT),
            ));
        }
        self.prefix = root.name().prefix().map(|p| name_of(p.as_ref()));
        let version = self.schema_version(&root, root_span.start)?;
        self.namespace = version.namespace();
        if !version.is_supported() {
            warn!(version = %version, "unsupported schema version, loading anyway");
        }
        if root_empty {
            return Err(CodecError::schema(ROOT, "missing <Inventory>"));
        }

        let mut inventory_span: Option<Range<usize>> = None;
        let root_close = loop {
            let (event, span) = self.next()?;
            let empty = matches!(event, Event::Empty(_));
            match event {
                Event::Start(e) | Event::Empty(e)
                    if e.local_name().as_ref() == INVENTORY.as_bytes()
                        && self.in_schema(&e, span.start)? =>
                {
                    if inventory_span.is_some() {
                        return Err(CodecError::schema(INVENTORY, "more than one <Inventory>"));
                    }
                    self.inventory_element(&e, empty, span.start)?;
                    inventory_span = Some(span.start..self.cursor);
                }
                Event::Start(e) => self.skip(e.name())?,
                Event::End(_) => break span,
                Event::Eof => return Err(self.unexpected_eof()),
                _ => {}
            }
        };
        let inventory_span =
            inventory_span.ok_or_else(|| CodecError::schema(ROOT, "missing <Inventory>"))?;

        loop {
            let (event, span) = self.next()?;
            match event {
                Event::Eof => break,
                Event::Start(_) | Event::Empty(_) => {
                    return Err(self.malformed_at(span.start, "content after the root element"))
                }
                Event::Text(_) if !self.src[span.clone()].trim().is_empty() => {
                    return Err(self.malformed_at(span.start, "text after the root element"))
                }
                _ => {}
            }
        }

        let src = self.src;
        let header = DocumentHeader {
            prolog: src[..root_span.start].to_string(),
            root_open: src[root_span.clone()].to_string(),
            before_inventory: src[root_span.end..inventory_span.start].to_string(),
            prefix: self.prefix,
            after_inventory: src[inventory_span.end..root_close.start].to_string(),
            root_close: src[root_close.clone()].to_string(),
            epilogue: src[root_close.end..].to_string(),
            version,
        };
        Ok(Document {
            header,
            inventory: self.inventory,
        })
    }

    /// Namespace bound to the root element's prefix.
    fn schema_version(&self, root: &BytesStart<'_>, at: usize) -> Result<SchemaVersion, CodecError> {
        let declaration = xmlns_key(self.prefix.as_deref());
        for attribute in root.attributes() {
            let attribute = attribute.map_err(|e| self.bad_attribute(at, e))?;
            if attribute.key.as_ref() == declaration.as_bytes() {
                let namespace = attribute
                    .unescape_value()
                    .map_err(|e| self.malformed_at(at, e))?;
                return Ok(SchemaVersion::from_namespace(&namespace));
            }
        }
        Ok(SchemaVersion::Unknown(String::new()))
    }

    /// Whether an element is in the document's SeisComP namespace. A
    /// different prefix, or a local rebinding of ours, makes it foreign.
    fn in_schema(&self, start: &BytesStart<'_>, at: usize) -> Result<bool, CodecError> {
        let prefix = start.name().prefix().map(|p| name_of(p.as_ref()));
        if prefix != self.prefix {
            return Ok(false);
        }
        let declaration = xmlns_key(prefix.as_deref());
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| self.bad_attribute(at, e))?;
            if attribute.key.as_ref() == declaration.as_bytes() {
                let namespace = attribute
                    .unescape_value()
                    .map_err(|e| self.malformed_at(at, e))?;
                return Ok(*namespace == *self.namespace);
            }
        }
        Ok(true)
    }

    fn inventory_element(
        &mut self,
        start: &BytesStart<'_>,
        empty: bool,
        at: usize,
    ) -> Result<(), CodecError> {
        let mut ext = ExtensionData::default();
        ext.attributes = self.raw_attributes(start, at, &[])?;

        let mut anchor = Anchor::Leading;
        if !empty {
            loop {
                match self.next_content()? {
                    Content::Close => break,
                    Content::Opaque(raw) => ext.push_node(anchor.clone(), raw),
                    Content::Element { start, empty, span } => {
                        let kind = match start.local_name().as_ref() {
                            b"sensor" => Some(EntityKind::Sensor),
                            b"datalogger" => Some(EntityKind::Datalogger),
                            b"network" => Some(EntityKind::Network),
                            _ => None,
                        };
                        let kind = match kind {
                            Some(kind) if self.in_schema(&start, span.start)? => Some(kind),
                            _ => None,
                        };
                        match kind {
                            Some(kind) => {
                                let id = self.entity(&start, empty, span.start, kind, None)?;
                                anchor = Anchor::AfterChild(id);
                            }
                            None => {
                                let raw = self.capture(&start, empty, span)?;
                                debug!(element = %name_of(start.name().as_ref()), "kept unknown inventory element");
                                ext.push_node(anchor.clone(), raw);
                            }
                        }
                    }
                }
            }
        }
        self.inventory.extensions_mut().insert(Owner::Inventory, ext);
        Ok(())
    }

    // ========================================================================
    // ENTITIES
    // ========================================================================

    fn entity(
        &mut self,
        start: &BytesStart<'_>,
        empty: bool,
        at: usize,
        kind: EntityKind,
        parent: Option<EntityId>,
    ) -> Result<EntityId, CodecError> {
        let mut slot = Slot::Pending(Entity::empty(kind));
        let mut seen: Vec<&'static str> = Vec::new();
        let mut ext = ExtensionData::default();

        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| self.bad_attribute(at, e))?;
            let key = attribute.key.as_ref();
            if let Some(name) = kind.attributes().iter().find(|a| a.as_bytes() == key) {
                let value = attribute
                    .unescape_value()
                    .map_err(|e| self.malformed_at(at, e))?;
                self.set_field(&mut slot, kind, name, &value)?;
                seen.push(*name);
            }
        }
        ext.attributes = self.raw_attributes(start, at, kind.attributes())?;

        let mut anchor = Anchor::Leading;
        if !empty {
            loop {
                match self.next_content()? {
                    Content::Close => break,
                    Content::Opaque(raw) => ext.push_node(anchor.clone(), raw),
                    Content::Element {
                        start: element,
                        empty: element_empty,
                        span,
                    } => {
                        let local = element.local_name();
                        let local = local.as_ref();
                        let field = kind.fields().iter().find(|f| f.as_bytes() == local);
                        let child = kind.child().filter(|c| c.element().as_bytes() == local);
                        let ours = (field.is_some() || child.is_some())
                            && self.in_schema(&element, span.start)?;

                        if let Some(field) = field.filter(|_| ours) {
                            let text = self.field_text(&element, element_empty)?;
                            self.set_field(&mut slot, kind, field, &text)?;
                            seen.push(*field);
                            anchor = Anchor::AfterField(field.to_string());
                        } else if let Some(child_kind) = child.filter(|_| ours) {
                            let owner = self.store(&mut slot, kind, parent);
                            let child = self.entity(
                                &element,
                                element_empty,
                                span.start,
                                child_kind,
                                Some(owner),
                            )?;
                            anchor = Anchor::AfterChild(child);
                        } else {
                            let raw = self.capture(&element, element_empty, span)?;
                            ext.push_node(anchor.clone(), raw);
                        }
                    }
                }
            }
        }

        for required in kind.required() {
            if !seen.contains(required) {
                return Err(CodecError::schema(
                    kind.element(),
                    format!("missing required '{}'", required),
                ));
            }
        }

        let id = self.store(&mut slot, kind, parent);
        self.inventory
            .extensions_mut()
            .insert(Owner::Entity(id), ext);
        Ok(id)
    }

    fn set_field(
        &mut self,
        slot: &mut Slot,
        kind: EntityKind,
        name: &str,
        value: &str,
    ) -> Result<(), CodecError> {
        let mistyped =
            |v: Violation| CodecError::schema(kind.element(), format!("{}: {}", v.field, v.message));
        match slot {
            Slot::Pending(entity) => entity.set_field(name, Some(value)).map_err(mistyped),
            Slot::Stored(id) => {
                let id = *id;
                let mut entity = self
                    .inventory
                    .get(id)
                    .cloned()
                    .ok_or_else(|| CodecError::Internal(format!("decoded entity {} vanished", id)))?;
                entity.set_field(name, Some(value)).map_err(mistyped)?;
                self.inventory.replace_unchecked(id, entity);
                Ok(())
            }
        }
    }

    /// Put a pending record into the graph (once) and return its id.
    fn store(&mut self, slot: &mut Slot, kind: EntityKind, parent: Option<EntityId>) -> EntityId {
        let id = match std::mem::replace(slot, Slot::Pending(Entity::empty(kind))) {
            Slot::Stored(id) => id,
            Slot::Pending(entity) => self.inventory.insert_unchecked(parent, entity),
        };
        *slot = Slot::Stored(id);
        id
    }

    /// Attributes not in `known`, with their index among all attributes.
    fn raw_attributes(
        &self,
        start: &BytesStart<'_>,
        at: usize,
        known: &[&str],
    ) -> Result<Vec<RawAttribute>, CodecError> {
        let quotes = attribute_quotes(start);
        let mut raw = Vec::new();
        for (position, attribute) in start.attributes().enumerate() {
            let attribute = attribute.map_err(|e| self.bad_attribute(at, e))?;
            let name = name_of(attribute.key.as_ref());
            if !known.contains(&name.as_str()) {
                raw.push(RawAttribute {
                    position,
                    name,
                    raw_value: name_of(&attribute.value),
                    quote: quotes.get(position).copied().unwrap_or('"'),
                });
            }
        }
        Ok(raw)
    }

    // ========================================================================
    // ERRORS
    // ========================================================================

    fn malformed(&self, error: impl std::fmt::Display) -> CodecError {
        let at = self.reader.error_position() as usize;
        self.malformed_at(at, error)
    }

    /// Attribute errors carry an offset into the tag that starts at `tag`.
    fn bad_attribute(&self, tag: usize, error: AttrError) -> CodecError {
        let offset = match &error {
            AttrError::ExpectedEq(p)
            | AttrError::ExpectedValue(p)
            | AttrError::UnquotedValue(p)
            | AttrError::ExpectedQuote(p, _)
            | AttrError::Duplicated(p, _) => *p,
        };
        // +1 for the '<' in front of the tag content
        self.malformed_at(tag + 1 + offset, error)
    }

    fn malformed_at(&self, at: usize, message: impl std::fmt::Display) -> CodecError {
        let (line, column) = line_column(self.src, at);
        CodecError::MalformedDocument {
            line,
            column,
            message: message.to_string(),
        }
    }

    fn unexpected_eof(&self) -> CodecError {
        self.malformed_at(self.src.len(), "unexpected end of document")
    }
}

fn name_of(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn xmlns_key(prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) => format!("xmlns:{}", prefix),
        None => "xmlns".to_string(),
    }
}

/// Quote character of each attribute in a start tag's content, in order.
fn attribute_quotes(tag: &[u8]) -> Vec<char> {
    let mut quotes = Vec::new();
    let mut open: Option<u8> = None;
    for &byte in tag {
        match open {
            Some(quote) if byte == quote => open = None,
            Some(_) => {}
            None if byte == b'"' || byte == b'\'' => {
                quotes.push(byte as char);
                open = Some(byte);
            }
            None => {}
        }
    }
    quotes
}

/// 1-based line and column of a byte offset.
fn line_column(src: &str, at: usize) -> (usize, usize) {
    let before = &src.as_bytes()[..at.min(src.len())];
    let line = before.iter().filter(|b| **b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);
    (line, before.len() - line_start + 1)
}
