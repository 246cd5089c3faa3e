//! Property list and keyed archive readers.
//!
//! Sub-modules split the reader into focused areas:
//!
//! - [`binary`] – `bplist00` decoding
//! - [`xml`] – XML plist decoding
//! - [`unarchiver`] – keyed archive validation and object graph decoding
//! - [`helpers`] – Cocoa date and base64 conversions
//! - [`source`] – File I/O abstraction (filesystem vs. memory)

pub mod binary;
pub mod helpers;
pub mod source;
pub mod unarchiver;
pub mod xml;

pub use binary::parse_binary;
pub use helpers::{ns_date_to_time, time_to_ns_date};
pub use source::*;
pub use unarchiver::{Unarchiver, top_references, verify_archive};
pub use xml::parse_xml;

use crate::error::{ArchiveError, Result};
use crate::model::{Object, Value};
use tracing::debug;

/// On-disk encoding of a property list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    #[value(alias = "bin")]
    Binary,
    Xml,
}

impl Format {
    /// Guess the format from the leading bytes.
    pub fn detect(bytes: &[u8]) -> Format {
        if bytes.starts_with(binary::MAGIC) {
            Format::Binary
        } else {
            Format::Xml
        }
    }

    /// File extension used for fixture files of this format.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Binary => "bin",
            Format::Xml => "xml",
        }
    }

    pub const ALL: [Format; 2] = [Format::Binary, Format::Xml];
}

/// Decode a binary or XML property list.
pub fn parse_plist(bytes: &[u8]) -> Result<Value> {
    match Format::detect(bytes) {
        Format::Binary => parse_binary(bytes),
        Format::Xml => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| ArchiveError::Xml(format!("Not UTF-8: {}", e)))?;
            parse_xml(text)
        }
    }
}

/// Extract the objects of a keyed archive, either in XML or binary format.
///
/// Primitives come back as themselves. `NSArray`/`NSMutableArray` become
/// [`Object::Array`], `NSSet`/`NSMutableSet` become [`Object::Set`],
/// `NSDictionary`/`NSMutableDictionary` become [`Object::Dictionary`] and any
/// other class becomes an [`Object::Custom`] holding its fields.
pub fn unarchive(bytes: &[u8]) -> Result<Vec<Object>> {
    let plist = parse_plist(bytes)?;
    unarchive_value(&plist)
}

/// Same as [`unarchive`] for an already decoded plist.
pub fn unarchive_value(plist: &Value) -> Result<Vec<Object>> {
    let root = plist
        .as_dictionary()
        .ok_or_else(|| ArchiveError::unexpected("dict", plist.type_name(), "archive root"))?;
    verify_archive(root)?;

    let top = root["$top"]
        .as_dictionary()
        .ok_or_else(|| ArchiveError::unexpected("dict", root["$top"].type_name(), "$top"))?;
    let objects = root["$objects"].as_array().ok_or_else(|| {
        ArchiveError::unexpected("array", root["$objects"].type_name(), "$objects")
    })?;

    let refs = top_references(top)?;
    debug!("Archive has {} top-level objects", refs.len());
    Unarchiver::new(objects).decode_all(&refs)
}
