use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

// ────────────────────────────────────────────────────────────────────────────
// Uid
// ────────────────────────────────────────────────────────────────────────────

/// Reference into the `$objects` table of a keyed archive.
///
/// Binary plists store these natively (marker `0x8n`); XML plists spell them
/// as `<dict><key>CF$UID</key><integer>N</integer></dict>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub u64);

impl Uid {
    /// Slot 0 of `$objects` always holds the `$null` marker.
    pub const NULL: Uid = Uid(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Value – raw property list tree
// ────────────────────────────────────────────────────────────────────────────

/// A property list value as stored on disk, before any keyed-archive
/// interpretation. Dictionaries keep their key order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Date(DateTime<Utc>),
    Data(Vec<u8>),
    String(String),
    Uid(Uid),
    Array(Vec<Value>),
    Dictionary(IndexMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_uid(&self) -> Option<Uid> {
        match self {
            Value::Uid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Name of the plist element this value would be written as.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Date(_) => "date",
            Value::Data(_) => "data",
            Value::String(_) => "string",
            Value::Uid(_) => "uid",
            Value::Array(_) => "array",
            Value::Dictionary(_) => "dict",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<Uid> for Value {
    fn from(u: Uid) -> Self {
        Value::Uid(u)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ClassInfo
// ────────────────────────────────────────────────────────────────────────────

/// Class of an archived object: its name plus the superclass chain written
/// to `$classes`, most specific first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub hierarchy: Vec<String>,
}

impl ClassInfo {
    /// A class deriving directly from `NSObject`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let hierarchy = if name == "NSObject" {
            vec![name.clone()]
        } else {
            vec![name.clone(), "NSObject".to_string()]
        };
        Self { name, hierarchy }
    }

    pub fn with_hierarchy(name: impl Into<String>, hierarchy: Vec<String>) -> Self {
        Self {
            name: name.into(),
            hierarchy,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Object – archived object graph
// ────────────────────────────────────────────────────────────────────────────

/// An object graph as fed to the archiver or returned by the unarchiver.
///
/// Serializing an `Object` (e.g. to JSON) flattens Foundation semantics away:
/// data becomes base64, sets become arrays and custom objects become maps of
/// their fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Data(Vec<u8>),
    Date(DateTime<Utc>),
    Array(Vec<Object>),
    Set(Vec<Object>),
    Dictionary(IndexMap<String, Object>),
    Custom {
        class: ClassInfo,
        fields: IndexMap<String, Object>,
    },
}

impl Object {
    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Object::Data(bytes.into())
    }

    pub fn array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Object>,
    {
        Object::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Object>,
    {
        Object::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn dictionary<I, K, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Object>,
    {
        Object::Dictionary(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Class name a keyed archiver records for this object, if it is stored
    /// as a class instance rather than an inline plist primitive.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Object::Date(_) => Some("NSDate"),
            Object::Array(_) => Some("NSArray"),
            Object::Set(_) => Some("NSSet"),
            Object::Dictionary(_) => Some("NSDictionary"),
            Object::Custom { class, .. } => Some(&class.name),
            _ => None,
        }
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Bool(b)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Integer(i)
    }
}

impl From<i32> for Object {
    fn from(i: i32) -> Self {
        Object::Integer(i64::from(i))
    }
}

impl From<f64> for Object {
    fn from(r: f64) -> Self {
        Object::Real(r)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Object::String(s.to_string())
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Object::String(s)
    }
}

impl From<DateTime<Utc>> for Object {
    fn from(d: DateTime<Utc>) -> Self {
        Object::Date(d)
    }
}

impl From<Vec<Object>> for Object {
    fn from(items: Vec<Object>) -> Self {
        Object::Array(items)
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Object::Null => serializer.serialize_unit(),
            Object::Bool(b) => serializer.serialize_bool(*b),
            Object::Integer(i) => serializer.serialize_i64(*i),
            Object::Real(r) => serializer.serialize_f64(*r),
            Object::String(s) => serializer.serialize_str(s),
            Object::Data(d) => serializer.serialize_str(&STANDARD.encode(d)),
            Object::Date(d) => {
                serializer.serialize_str(&d.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Object::Array(items) | Object::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Object::Dictionary(entries) | Object::Custom { fields: entries, .. } => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}
