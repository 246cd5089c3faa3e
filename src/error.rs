use thiserror::Error;

use crate::model::Uid;

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Everything that can go wrong reading or writing a keyed archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    // ---- Property list decoding --------------------------------------------
    #[error("Invalid binary plist: {0}")]
    Binary(String),

    #[error("Invalid XML plist: {0}")]
    Xml(String),

    /// roxmltree rejected the document outright.
    #[error("Malformed XML: {0}")]
    XmlSyntax(#[from] roxmltree::Error),

    // ---- Keyed archive structure -------------------------------------------
    #[error("invalid NSKeyedArchiver object, missing key '{0}'")]
    MissingKey(String),

    #[error("invalid value: {found} for key '$archiver', expected: 'NSKeyedArchiver'")]
    WrongArchiver { found: String },

    #[error("invalid value: {found} for key '$version', expected: '100000'")]
    WrongVersion { found: String },

    #[error("Expected {expected} at {context}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
        context: String,
    },

    #[error("Object reference {uid} is out of range ({count} objects)")]
    DanglingReference { uid: Uid, count: usize },

    #[error("Object reference {0} refers back to itself")]
    Cycle(Uid),

    #[error("Object reference {uid} is nested more than {limit} levels deep")]
    TooDeep { uid: Uid, limit: usize },

    #[error("Archive expands to more than {limit} objects")]
    TooLarge { limit: usize },

    #[error("Dictionary key must be a string, found {0}")]
    NonStringKey(String),

    #[error("Could not find class for object at {0}")]
    MissingClass(String),

    // ---- Archiver state ----------------------------------------------------
    #[error("Archiver error: {0}")]
    Archiver(String),

    // ---- Plumbing ------------------------------------------------------------
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub(crate) fn unexpected(
        expected: &'static str,
        found: &'static str,
        context: impl Into<String>,
    ) -> Self {
        ArchiveError::UnexpectedType {
            expected,
            found,
            context: context.into(),
        }
    }
}
