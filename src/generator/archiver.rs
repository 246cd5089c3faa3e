//! Keyed archiver: turns [`Object`] graphs into `NSKeyedArchiver` plists.
//!
//! Usage mirrors Foundation's API: create an archiver for an output format,
//! encode values, call [`KeyedArchiver::finish_encoding`] and take the
//! [`KeyedArchiver::encoded_data`].

use crate::error::{ArchiveError, Result};
use crate::generator::binary::{ScalarKey, write_binary};
use crate::generator::plist_xml::write_xml;
use crate::model::{ClassInfo, Object, Uid, Value};
use crate::parser::Format;
use crate::parser::helpers::time_to_ns_date;
use crate::parser::unarchiver::{ARCHIVER_NAME, ARCHIVER_VERSION, NULL_MARKER};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

pub struct KeyedArchiver {
    format: Format,
    objects: Vec<Value>,
    top: IndexMap<String, Value>,
    next_top_index: usize,
    scalars: HashMap<ScalarKey, Uid>,
    classes: HashMap<String, Uid>,
    encoded: Option<Vec<u8>>,
}

impl KeyedArchiver {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            objects: vec![Value::String(NULL_MARKER.to_string())],
            top: IndexMap::new(),
            next_top_index: 0,
            scalars: HashMap::new(),
            classes: HashMap::new(),
            encoded: None,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    fn ensure_open(&self) -> Result<()> {
        if self.encoded.is_some() {
            return Err(ArchiveError::Archiver(
                "cannot encode after finish_encoding".into(),
            ));
        }
        Ok(())
    }

    /// Encode a top-level object without a key. Successive calls are stored
    /// under `$0`, `$1`, ...
    pub fn encode(&mut self, object: &Object) -> Result<()> {
        self.ensure_open()?;
        let key = format!("${}", self.next_top_index);
        self.next_top_index += 1;
        let uid = self.encode_object(object);
        self.top.insert(key, Value::Uid(uid));
        Ok(())
    }

    /// Encode a top-level object under `key` (conventionally `root`).
    pub fn encode_with_key(&mut self, object: &Object, key: &str) -> Result<()> {
        self.ensure_open()?;
        if key.starts_with('$') {
            return Err(ArchiveError::Archiver(format!(
                "key '{}' is reserved: keys starting with '$' name unkeyed values",
                key
            )));
        }
        let uid = self.encode_object(object);
        self.top.insert(key.to_string(), Value::Uid(uid));
        Ok(())
    }

    /// Top-level dictionary of the archive, keys in Apple's sorted order.
    pub fn archive_root_dict(&self) -> IndexMap<String, Value> {
        let mut root = IndexMap::with_capacity(4);
        root.insert("$archiver".to_string(), Value::from(ARCHIVER_NAME));
        root.insert("$objects".to_string(), Value::Array(self.objects.clone()));
        root.insert("$top".to_string(), Value::Dictionary(self.top.clone()));
        root.insert("$version".to_string(), Value::Integer(ARCHIVER_VERSION));
        root
    }

    /// The archive as a plist value. Valid before and after finishing.
    pub fn archive_plist(&self) -> Value {
        Value::Dictionary(self.archive_root_dict())
    }

    /// Seal the archive and serialize it. Further encodes fail; calling
    /// this twice is a no-op.
    pub fn finish_encoding(&mut self) {
        if self.encoded.is_some() {
            return;
        }
        let plist = self.archive_plist();
        let bytes = match self.format {
            Format::Binary => write_binary(&plist),
            Format::Xml => write_xml(&plist).into_bytes(),
        };
        debug!(
            "Finished {:?} archive: {} top-level objects, {} table entries, {} bytes",
            self.format,
            self.top.len(),
            self.objects.len(),
            bytes.len()
        );
        self.encoded = Some(bytes);
    }

    /// Bytes produced by [`finish_encoding`](Self::finish_encoding).
    pub fn encoded_data(&self) -> Result<&[u8]> {
        self.encoded.as_deref().ok_or_else(|| {
            ArchiveError::Archiver("encoded_data requested before finish_encoding".into())
        })
    }

    pub fn into_encoded_data(mut self) -> Vec<u8> {
        self.finish_encoding();
        self.encoded.unwrap_or_default()
    }

    fn push(&mut self, value: Value) -> Uid {
        self.objects.push(value);
        Uid(self.objects.len() as u64 - 1)
    }

    /// Reserve a slot so a container gets a lower UID than its children.
    fn reserve(&mut self) -> Uid {
        self.push(Value::Boolean(false))
    }

    fn fill(&mut self, uid: Uid, value: Value) {
        self.objects[uid.index()] = value;
    }

    fn encode_scalar(&mut self, value: Value) -> Uid {
        match ScalarKey::of(&value) {
            Some(key) => {
                if let Some(uid) = self.scalars.get(&key) {
                    return *uid;
                }
                let uid = self.push(value);
                self.scalars.insert(key, uid);
                uid
            }
            None => self.push(value),
        }
    }

    fn encode_class(&mut self, class: &ClassInfo) -> Uid {
        if let Some(uid) = self.classes.get(&class.name) {
            return *uid;
        }
        let mut dict = IndexMap::with_capacity(2);
        dict.insert(
            "$classes".to_string(),
            Value::Array(class.hierarchy.iter().map(|c| Value::from(c.as_str())).collect()),
        );
        dict.insert("$classname".to_string(), Value::from(class.name.as_str()));
        let uid = self.push(Value::Dictionary(dict));
        self.classes.insert(class.name.clone(), uid);
        uid
    }

    fn encode_list(&mut self, items: &[Object]) -> Value {
        Value::Array(
            items
                .iter()
                .map(|item| Value::Uid(self.encode_object(item)))
                .collect(),
        )
    }

    fn encode_object(&mut self, object: &Object) -> Uid {
        match object {
            Object::Null => Uid::NULL,
            Object::Bool(b) => self.encode_scalar(Value::Boolean(*b)),
            Object::Integer(i) => self.encode_scalar(Value::Integer(*i)),
            Object::Real(r) => self.encode_scalar(Value::Real(*r)),
            Object::String(s) => self.encode_scalar(Value::String(s.clone())),
            Object::Data(d) => self.encode_scalar(Value::Data(d.clone())),
            Object::Date(d) => {
                let uid = self.reserve();
                let class = self.encode_class(&ClassInfo::new("NSDate"));
                let mut dict = IndexMap::with_capacity(2);
                dict.insert("$class".to_string(), Value::Uid(class));
                dict.insert("NS.time".to_string(), Value::Real(time_to_ns_date(d)));
                self.fill(uid, Value::Dictionary(dict));
                uid
            }
            Object::Array(items) | Object::Set(items) => {
                let uid = self.reserve();
                let list = self.encode_list(items);
                let name = if matches!(object, Object::Set(_)) {
                    "NSSet"
                } else {
                    "NSArray"
                };
                let class = self.encode_class(&ClassInfo::new(name));
                let mut dict = IndexMap::with_capacity(2);
                dict.insert("$class".to_string(), Value::Uid(class));
                dict.insert("NS.objects".to_string(), list);
                self.fill(uid, Value::Dictionary(dict));
                uid
            }
            Object::Dictionary(entries) => {
                let uid = self.reserve();
                let keys: Vec<Value> = entries
                    .keys()
                    .map(|k| Value::Uid(self.encode_scalar(Value::String(k.clone()))))
                    .collect();
                let values: Vec<Value> = entries
                    .values()
                    .map(|v| Value::Uid(self.encode_object(v)))
                    .collect();
                let class = self.encode_class(&ClassInfo::new("NSDictionary"));
                let mut dict = IndexMap::with_capacity(3);
                dict.insert("$class".to_string(), Value::Uid(class));
                dict.insert("NS.keys".to_string(), Value::Array(keys));
                dict.insert("NS.objects".to_string(), Value::Array(values));
                self.fill(uid, Value::Dictionary(dict));
                uid
            }
            Object::Custom { class, fields } => {
                let uid = self.reserve();
                let mut dict = IndexMap::with_capacity(fields.len() + 1);
                dict.insert("$class".to_string(), Value::Uid(Uid::NULL));
                for (name, field) in fields {
                    let field_uid = self.encode_object(field);
                    dict.insert(name.clone(), Value::Uid(field_uid));
                }
                let class_uid = self.encode_class(class);
                dict.insert("$class".to_string(), Value::Uid(class_uid));
                self.fill(uid, Value::Dictionary(dict));
                uid
            }
        }
    }
}

/// Archive `objects` as unkeyed top-level values (`$0`, `$1`, ...).
pub fn archive(objects: &[Object], format: Format) -> Result<Vec<u8>> {
    let mut archiver = KeyedArchiver::new(format);
    for object in objects {
        archiver.encode(object)?;
    }
    Ok(archiver.into_encoded_data())
}

/// Archive a single object under the `root` key.
pub fn archive_root(object: &Object, format: Format) -> Result<Vec<u8>> {
    let mut archiver = KeyedArchiver::new(format);
    archiver.encode_with_key(object, "root")?;
    Ok(archiver.into_encoded_data())
}
