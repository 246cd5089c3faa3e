//! Archive generator – produce plists and keyed archives from in-memory values.
//!
//! This module provides:
//! - [`binary`] – Encode a [`Value`](crate::model::Value) as a `bplist00` file.
//! - [`plist_xml`] – Encode a [`Value`](crate::model::Value) as XML plist text.
//! - [`archiver`] – Build `NSKeyedArchiver` archives from [`Object`](crate::model::Object) graphs.
//! - [`fixtures`] – Write the fixture sets consumed by unarchiver tests.

pub mod archiver;
pub mod binary;
pub mod fixtures;
pub mod plist_xml;

pub use archiver::{KeyedArchiver, archive, archive_root};
pub use binary::write_binary;
pub use fixtures::{FixtureSet, GenerationReport, create_archive_files, generate_all};
pub use plist_xml::write_xml;

use crate::model::Value;
use crate::parser::Format;

/// Encode a plist in the requested format.
pub fn write_plist(value: &Value, format: Format) -> Vec<u8> {
    match format {
        Format::Binary => write_binary(value),
        Format::Xml => write_xml(value).into_bytes(),
    }
}
