// 📄 XML Codec - SeisComP inventory documents <-> Inventory graph
//
// decode: single top-down pass, unknown content kept verbatim
// encode: graph walk in sibling order, unknown content re-emitted in place
//
// Everything outside <Inventory> (prolog, root tag, sibling elements,
// epilogue) is kept as raw text in the DocumentHeader and written back
// untouched.

pub mod decode;
pub mod encode;

pub use decode::decode;
pub use encode::encode;

use crate::entities::Violation;
use crate::error::CodecError;
use crate::inventory::Inventory;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SEISCOMP3_NAMESPACE: &str = "http://geofon.gfz-potsdam.de/ns/seiscomp3-schema/";
const SEISCOMP_NAMESPACE: &str = "http://geofon.gfz-potsdam.de/ns/seiscomp-schema/";

/// Schema versions this crate reads and writes under the seiscomp3 namespace
pub const SUPPORTED_VERSIONS: &[&str] = &["0.10", "0.11", "0.12", "0.13"];

/// Version written into documents created from scratch
pub const DEFAULT_VERSION: &str = "0.12";

// ============================================================================
// SCHEMA VERSION
// ============================================================================

/// Schema version detected from the root element's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaVersion {
    /// `.../seiscomp3-schema/<version>`
    Seiscomp3(String),

    /// `.../seiscomp-schema/<version>` (SeisComP 4 and later)
    Seiscomp(String),

    /// Any other namespace (or none), kept verbatim
    Unknown(String),
}

impl SchemaVersion {
    pub fn from_namespace(namespace: &str) -> Self {
        if let Some(version) = namespace.strip_prefix(SEISCOMP3_NAMESPACE) {
            SchemaVersion::Seiscomp3(version.to_string())
        } else if let Some(version) = namespace.strip_prefix(SEISCOMP_NAMESPACE) {
            SchemaVersion::Seiscomp(version.to_string())
        } else {
            SchemaVersion::Unknown(namespace.to_string())
        }
    }

    pub fn is_supported(&self) -> bool {
        match self {
            SchemaVersion::Seiscomp3(version) => SUPPORTED_VERSIONS.contains(&version.as_str()),
            SchemaVersion::Seiscomp(_) => true,
            SchemaVersion::Unknown(_) => false,
        }
    }

    pub fn namespace(&self) -> String {
        match self {
            SchemaVersion::Seiscomp3(version) => format!("{}{}", SEISCOMP3_NAMESPACE, version),
            SchemaVersion::Seiscomp(version) => format!("{}{}", SEISCOMP_NAMESPACE, version),
            SchemaVersion::Unknown(namespace) => namespace.clone(),
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaVersion::Seiscomp3(version) => write!(f, "seiscomp3-schema {}", version),
            SchemaVersion::Seiscomp(version) => write!(f, "seiscomp-schema {}", version),
            SchemaVersion::Unknown(ns) if ns.is_empty() => f.write_str("no namespace"),
            SchemaVersion::Unknown(ns) => write!(f, "unknown namespace '{}'", ns),
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Raw text surrounding the `<Inventory>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHeader {
    /// XML declaration, comments and whitespace before the root element
    pub prolog: String,

    /// Root start tag exactly as written, namespace declarations included
    pub root_open: String,

    /// Content between the root start tag and `<Inventory>`
    pub before_inventory: String,

    /// Namespace prefix of `<Inventory>`, reused for every modeled element
    pub prefix: Option<String>,

    /// Content between `</Inventory>` and the root end tag
    pub after_inventory: String,

    pub root_close: String,

    /// Anything after the root element
    pub epilogue: String,

    pub version: SchemaVersion,
}

impl Default for DocumentHeader {
    fn default() -> Self {
        let version = SchemaVersion::Seiscomp3(DEFAULT_VERSION.to_string());
        DocumentHeader {
            prolog: "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n".to_string(),
            root_open: format!(
                "<seiscomp xmlns=\"{}\" version=\"{}\">",
                version.namespace(),
                DEFAULT_VERSION
            ),
            before_inventory: "\n  ".to_string(),
            prefix: None,
            after_inventory: "\n".to_string(),
            root_close: "</seiscomp>".to_string(),
            epilogue: "\n".to_string(),
            version,
        }
    }
}

/// An inventory plus the document text it was loaded from.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub header: DocumentHeader,
    pub inventory: Inventory,
}

impl Document {
    /// Empty document with a fresh header
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an inventory built through the API in a fresh header
    pub fn from_inventory(inventory: Inventory) -> Self {
        Document {
            header: DocumentHeader::default(),
            inventory,
        }
    }
}

/// Result of a successful load: the document plus every violation found in
/// it. Violations never block loading.
#[derive(Debug)]
pub struct Loaded {
    pub document: Document,
    pub violations: Vec<Violation>,
}

// ============================================================================
// FILE I/O
// ============================================================================

pub fn load_file(path: impl AsRef<Path>) -> Result<Loaded, CodecError> {
    let path = path.as_ref();
    let xml = fs::read_to_string(path).map_err(|e| CodecError::io(path, e))?;
    let loaded = decode(&xml)?;
    info!(
        path = %path.display(),
        entities = loaded.document.inventory.len(),
        violations = loaded.violations.len(),
        "loaded inventory"
    );
    Ok(loaded)
}

/// `inventory.xml` -> `inventory.xml.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    path.with_extension("xml.bak")
}

/// Encode and write `doc` to `path`.
///
/// With `backup`, an existing file is copied to [`backup_path`] first and
/// copied back if the write fails. Encoding happens before anything on disk
/// is touched.
pub fn save_file(doc: &Document, path: impl AsRef<Path>, backup: bool) -> Result<(), CodecError> {
    let path = path.as_ref();
    let xml = encode(doc)?;

    let backup_file = backup_path(path);
    let backed_up = backup && path.exists();
    if backed_up {
        fs::copy(path, &backup_file).map_err(|e| CodecError::io(&backup_file, e))?;
    }

    if let Err(e) = fs::write(path, xml.as_bytes()) {
        if backed_up {
            if let Err(restore) = fs::copy(&backup_file, path) {
                warn!(path = %path.display(), error = %restore, "could not restore backup");
            }
        }
        return Err(CodecError::io(path, e));
    }

    info!(path = %path.display(), bytes = xml.len(), backup = backed_up, "saved inventory");
    Ok(())
}

/// Copy the backup over `path`. Returns `false` when there is no backup.
pub fn restore_backup(path: impl AsRef<Path>) -> Result<bool, CodecError> {
    let path = path.as_ref();
    let backup_file = backup_path(path);
    if !backup_file.exists() {
        return Ok(false);
    }
    fs::copy(&backup_file, path).map_err(|e| CodecError::io(path, e))?;
    info!(path = %path.display(), "restored backup");
    Ok(true)
}
