//! Versioned JSON document wrapping an animation set.
//!
//! This is the on-disk form used by the CLI for downloads and uploads. The
//! animation data itself is validated by the model's serde impls, so a
//! document that parses is always transferable.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::model::AnimationSet;

/// Current document schema version.
pub const DOCUMENT_VERSION: u32 = 1;
/// Timestamp used when the clock cannot be formatted.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported document version {found} (expected {})", DOCUMENT_VERSION)]
    Version { found: u32 },
}

/// Tool metadata embedded in documents.
///
/// # Examples
/// ```
/// use cubesync_core::ToolInfo;
///
/// let tool = ToolInfo::current();
/// assert_eq!(tool.name, "cubesync");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl ToolInfo {
    pub fn current() -> Self {
        Self {
            name: "cubesync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Animation set plus provenance metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationDocument {
    /// Document schema version (not the binary version).
    pub document_version: u32,
    pub tool: ToolInfo,
    /// RFC3339 timestamp of when the document was produced.
    pub generated_at: String,
    /// Port the animations were downloaded from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub animations: AnimationSet,
}

/// Wrap `animations` in a document stamped with the current time.
///
/// # Examples
/// ```
/// use cubesync_core::{AnimationSet, DOCUMENT_VERSION, make_document};
///
/// let doc = make_document(AnimationSet::new(), Some("/dev/ttyUSB0"));
/// assert_eq!(doc.document_version, DOCUMENT_VERSION);
/// assert_eq!(doc.source.as_deref(), Some("/dev/ttyUSB0"));
/// ```
pub fn make_document(animations: AnimationSet, source: Option<&str>) -> AnimationDocument {
    AnimationDocument {
        document_version: DOCUMENT_VERSION,
        tool: ToolInfo::current(),
        generated_at: now_rfc3339(),
        source: source.map(str::to_string),
        animations,
    }
}

/// Parse a document from JSON text, rejecting unknown schema versions.
pub fn parse_document(json: &str) -> Result<AnimationDocument, DocumentError> {
    let doc: AnimationDocument = serde_json::from_str(json)?;
    if doc.document_version != DOCUMENT_VERSION {
        return Err(DocumentError::Version {
            found: doc.document_version,
        });
    }
    Ok(doc)
}

pub fn load_document(path: &Path) -> Result<AnimationDocument, DocumentError> {
    parse_document(&fs::read_to_string(path)?)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| DEFAULT_GENERATED_AT.to_string())
}
