//! NSKeyedArchiver reader and writer.
//!
//! This crate decodes keyed archives (binary or XML property lists) into
//! [`model::Object`] graphs with [`parser::unarchive`], and produces them with
//! [`generator::KeyedArchiver`]. The fixture generator writes every archive
//! twice, as `<name>.bin` and `<name>.xml`.
//!
//! The binary `keyedarchive` generates fixtures and decodes archives to JSON.

pub mod error;
pub mod generator;
pub mod logging;
pub mod model;
pub mod parser;

pub use error::{ArchiveError, Result};
pub use model::{ClassInfo, Object, Uid, Value};
pub use parser::{Format, unarchive};
