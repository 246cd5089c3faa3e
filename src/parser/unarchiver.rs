//! Decoding of keyed archives into [`Object`] graphs.
//!
//! A keyed archive is a plist dictionary:
//!
//! ```text
//! $archiver => "NSKeyedArchiver"
//! $version  => 100000
//! $top      => { "root" => UID(1) }  or  { "$0" => UID(1), "$1" => ... }
//! $objects  => [ "$null", ..., { "$class" => UID(n), "NS.objects" => [...] }, ... ]
//! ```
//!
//! Every non-primitive object carries a `$class` reference to a class
//! dictionary holding `$classname` and `$classes`.

use crate::error::{ArchiveError, Result};
use crate::model::{ClassInfo, Object, Uid, Value};
use crate::parser::helpers::ns_date_to_time;
use indexmap::IndexMap;
use tracing::debug;

pub const ARCHIVER_NAME: &str = "NSKeyedArchiver";
pub const ARCHIVER_VERSION: i64 = 100_000;
pub const NULL_MARKER: &str = "$null";

/// Deepest chain of references followed before giving up.
pub const MAX_DEPTH: usize = 256;
/// Upper bound on the number of objects an archive may decode to, counting
/// every copy of a shared object.
pub const MAX_OBJECTS: usize = 1 << 20;

/// Check that a decoded plist dictionary has the shape of a keyed archive.
///
/// Keys are checked in the order `$archiver`, `$top`, `$objects`, `$version`
/// and the first violation is reported.
pub fn verify_archive(root: &IndexMap<String, Value>) -> Result<()> {
    match root.get("$archiver") {
        None => return Err(ArchiveError::MissingKey("$archiver".into())),
        Some(Value::String(s)) if s == ARCHIVER_NAME => {}
        Some(Value::String(s)) => return Err(ArchiveError::WrongArchiver { found: s.clone() }),
        Some(other) => {
            return Err(ArchiveError::WrongArchiver {
                found: other.type_name().to_string(),
            });
        }
    }
    if !root.contains_key("$top") {
        return Err(ArchiveError::MissingKey("$top".into()));
    }
    if !root.contains_key("$objects") {
        return Err(ArchiveError::MissingKey("$objects".into()));
    }
    match root.get("$version") {
        None => Err(ArchiveError::MissingKey("$version".into())),
        Some(Value::Integer(v)) if *v == ARCHIVER_VERSION => Ok(()),
        Some(Value::Integer(v)) => Err(ArchiveError::WrongVersion {
            found: v.to_string(),
        }),
        Some(other) => Err(ArchiveError::WrongVersion {
            found: other.type_name().to_string(),
        }),
    }
}

/// Object references named by `$top`.
///
/// A `root` entry wins on its own; otherwise the archive was written with
/// unkeyed top-level encodes, stored as `$0`, `$1`, ...
pub fn top_references(top: &IndexMap<String, Value>) -> Result<Vec<Uid>> {
    if let Some(root) = top.get("root") {
        let uid = root
            .as_uid()
            .ok_or_else(|| ArchiveError::unexpected("uid", root.type_name(), "$top.root"))?;
        return Ok(vec![uid]);
    }
    (0..top.len())
        .map(|i| {
            let key = format!("${}", i);
            let value = top
                .get(&key)
                .ok_or_else(|| ArchiveError::MissingKey(format!("$top.{}", key)))?;
            value
                .as_uid()
                .ok_or_else(|| ArchiveError::unexpected("uid", value.type_name(), format!("$top.{}", key)))
        })
        .collect()
}

/// Walks the `$objects` table, turning references into [`Object`]s.
pub struct Unarchiver<'a> {
    objects: &'a [Value],
    /// References currently being decoded; seeing one again means a cycle.
    stack: Vec<Uid>,
    /// Finished objects by UID, with the number of objects each expands to.
    cache: Vec<Option<(Object, usize)>>,
    /// Objects produced so far.
    produced: usize,
}

impl<'a> Unarchiver<'a> {
    pub fn new(objects: &'a [Value]) -> Self {
        Self {
            objects,
            stack: Vec::new(),
            cache: vec![None; objects.len()],
            produced: 0,
        }
    }

    fn charge(&mut self, count: usize) -> Result<()> {
        let total = self.produced.saturating_add(count);
        if total > MAX_OBJECTS {
            return Err(ArchiveError::TooLarge { limit: MAX_OBJECTS });
        }
        self.produced = total;
        Ok(())
    }

    fn cached(&mut self, index: usize) -> Result<Option<Object>> {
        let size = match &self.cache[index] {
            Some((_, size)) => *size,
            None => return Ok(None),
        };
        self.charge(size)?;
        Ok(self.cache[index].as_ref().map(|(object, _)| object.clone()))
    }

    fn lookup(&self, uid: Uid) -> Result<&'a Value> {
        self.objects
            .get(uid.index())
            .ok_or(ArchiveError::DanglingReference {
                uid,
                count: self.objects.len(),
            })
    }

    pub fn decode_all(&mut self, refs: &[Uid]) -> Result<Vec<Object>> {
        debug!(
            "Extracting {} objects from list of {} total objects",
            refs.len(),
            self.objects.len()
        );
        refs.iter().map(|uid| self.decode(*uid)).collect()
    }

    /// Decode the object stored at `uid`.
    pub fn decode(&mut self, uid: Uid) -> Result<Object> {
        let value = self.lookup(uid)?;
        if uid == Uid::NULL && value.as_str() == Some(NULL_MARKER) {
            return Ok(Object::Null);
        }
        if let Some(object) = self.cached(uid.index())? {
            return Ok(object);
        }
        if self.stack.contains(&uid) {
            return Err(ArchiveError::Cycle(uid));
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(ArchiveError::TooDeep {
                uid,
                limit: MAX_DEPTH,
            });
        }
        let before = self.produced;
        self.charge(1)?;
        self.stack.push(uid);
        let result = self.decode_value(uid, value);
        self.stack.pop();
        let object = result?;
        self.cache[uid.index()] = Some((object.clone(), self.produced - before));
        Ok(object)
    }

    fn decode_value(&mut self, uid: Uid, value: &'a Value) -> Result<Object> {
        if let Some(primitive) = primitive(value) {
            return Ok(primitive);
        }
        let dict = value.as_dictionary().ok_or_else(|| {
            ArchiveError::unexpected("object", value.type_name(), format!("$objects[{}]", uid))
        })?;
        let class = self.resolve_class(dict, uid)?;
        let context = |key: &str| format!("$objects[{}].{}", uid, key);

        match class.name.as_str() {
            "NSDate" | "__NSDate" => {
                let time = dict
                    .get("NS.time")
                    .and_then(Value::as_real)
                    .ok_or_else(|| ArchiveError::MissingKey(context("NS.time")))?;
                Ok(Object::Date(ns_date_to_time(time)?))
            }
            "NSString" | "NSMutableString" => match dict.get("NS.string") {
                Some(Value::String(s)) => Ok(Object::String(s.clone())),
                Some(other) => Err(ArchiveError::unexpected(
                    "string",
                    other.type_name(),
                    context("NS.string"),
                )),
                None => Err(ArchiveError::MissingKey(context("NS.string"))),
            },
            "NSData" | "NSMutableData" => match dict.get("NS.bytes") {
                Some(Value::Data(d)) => Ok(Object::Data(d.clone())),
                Some(other) => Err(ArchiveError::unexpected(
                    "data",
                    other.type_name(),
                    context("NS.bytes"),
                )),
                None => Err(ArchiveError::MissingKey(context("NS.bytes"))),
            },
            "NSArray" | "NSMutableArray" => {
                let refs = uid_list(dict, "NS.objects", &context("NS.objects"))?;
                Ok(Object::Array(self.decode_all(&refs)?))
            }
            "NSSet" | "NSMutableSet" => {
                let refs = uid_list(dict, "NS.objects", &context("NS.objects"))?;
                Ok(Object::Set(self.decode_all(&refs)?))
            }
            "NSDictionary" | "NSMutableDictionary" => self.decode_dictionary(dict, uid),
            _ => self.decode_custom(class, dict),
        }
    }

    fn decode_dictionary(&mut self, dict: &'a IndexMap<String, Value>, uid: Uid) -> Result<Object> {
        let key_refs = uid_list(dict, "NS.keys", &format!("$objects[{}].NS.keys", uid))?;
        let value_refs = uid_list(dict, "NS.objects", &format!("$objects[{}].NS.objects", uid))?;
        if key_refs.len() != value_refs.len() {
            return Err(ArchiveError::unexpected(
                "matching key and value counts",
                "mismatched lists",
                format!("$objects[{}]", uid),
            ));
        }
        let keys = self.decode_all(&key_refs)?;
        let values = self.decode_all(&value_refs)?;
        let mut result = IndexMap::with_capacity(keys.len());
        for (key, value) in keys.into_iter().zip(values) {
            match key {
                Object::String(k) => {
                    result.insert(k, value);
                }
                other => {
                    return Err(ArchiveError::NonStringKey(format!("{:?}", other)));
                }
            }
        }
        Ok(Object::Dictionary(result))
    }

    /// Any class we do not know becomes a map of its encoded fields.
    fn decode_custom(
        &mut self,
        class: ClassInfo,
        dict: &'a IndexMap<String, Value>,
    ) -> Result<Object> {
        let mut fields = IndexMap::with_capacity(dict.len());
        for (key, value) in dict {
            if key == "$class" || key == "$classes" {
                debug!("Ignoring class definition {}", key);
                continue;
            }
            fields.insert(key.clone(), self.decode_field(value)?);
        }
        Ok(Object::Custom { class, fields })
    }

    /// Fields of custom objects hold either references or inline values.
    fn decode_field(&mut self, value: &'a Value) -> Result<Object> {
        match value {
            Value::Uid(uid) => self.decode(*uid),
            Value::Array(items) => items
                .iter()
                .map(|item| self.decode_field(item))
                .collect::<Result<Vec<_>>>()
                .map(Object::Array),
            Value::Dictionary(entries) => {
                let mut result = IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    result.insert(k.clone(), self.decode_field(v)?);
                }
                Ok(Object::Dictionary(result))
            }
            other => {
                debug!("Adding primitive directly {:?}", other);
                primitive(other).ok_or_else(|| {
                    ArchiveError::unexpected("field value", other.type_name(), "custom object")
                })
            }
        }
    }

    fn resolve_class(&self, dict: &IndexMap<String, Value>, uid: Uid) -> Result<ClassInfo> {
        let class_ref = dict
            .get("$class")
            .and_then(Value::as_uid)
            .ok_or_else(|| ArchiveError::MissingClass(format!("$objects[{}]", uid)))?;
        let class_dict = self.lookup(class_ref)?.as_dictionary().ok_or_else(|| {
            ArchiveError::MissingClass(format!("$objects[{}] (class {})", uid, class_ref))
        })?;
        let name = class_dict
            .get("$classname")
            .and_then(Value::as_str)
            .ok_or_else(|| ArchiveError::MissingClass(format!("$objects[{}].$classname", class_ref)))?;
        let hierarchy = class_dict
            .get("$classes")
            .and_then(Value::as_array)
            .map(|classes| {
                classes
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| vec![name.to_string()]);
        Ok(ClassInfo::with_hierarchy(name, hierarchy))
    }
}

/// Plist values that stand for themselves inside `$objects`.
fn primitive(value: &Value) -> Option<Object> {
    match value {
        Value::Boolean(b) => Some(Object::Bool(*b)),
        Value::Integer(i) => Some(Object::Integer(*i)),
        Value::Real(r) => Some(Object::Real(*r)),
        Value::String(s) => Some(Object::String(s.clone())),
        Value::Data(d) => Some(Object::Data(d.clone())),
        Value::Date(d) => Some(Object::Date(*d)),
        _ => None,
    }
}

fn uid_list(dict: &IndexMap<String, Value>, key: &str, context: &str) -> Result<Vec<Uid>> {
    let items = match dict.get(key) {
        Some(Value::Array(items)) => items,
        Some(other) => return Err(ArchiveError::unexpected("array", other.type_name(), context)),
        None => return Err(ArchiveError::MissingKey(context.to_string())),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_uid().ok_or_else(|| {
                ArchiveError::unexpected("uid", item.type_name(), format!("{}[{}]", context, i))
            })
        })
        .collect()
}
