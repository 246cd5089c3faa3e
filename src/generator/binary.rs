//! Binary property list (`bplist00`) writer.
//!
//! The value tree is first flattened into an object table (containers before
//! their children, equal scalars shared), then serialized together with the
//! offset table and trailer. Reference and offset widths are the smallest
//! that fit.

use crate::model::Value;
use crate::parser::binary::{MAGIC, TRAILER_LEN};
use crate::parser::helpers::datetime_to_absolute;
use std::collections::HashMap;

/// Identity of a scalar value for de-duplication. Reals and dates compare
/// by bit pattern so `NaN` and `-0.0` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ScalarKey {
    Boolean(bool),
    Integer(i64),
    Real(u64),
    Date(u64),
    Data(Vec<u8>),
    String(String),
    Uid(u64),
}

impl ScalarKey {
    pub(crate) fn of(value: &Value) -> Option<ScalarKey> {
        Some(match value {
            Value::Boolean(b) => ScalarKey::Boolean(*b),
            Value::Integer(i) => ScalarKey::Integer(*i),
            Value::Real(r) => ScalarKey::Real(r.to_bits()),
            Value::Date(d) => ScalarKey::Date(datetime_to_absolute(d).to_bits()),
            Value::Data(d) => ScalarKey::Data(d.clone()),
            Value::String(s) => ScalarKey::String(s.clone()),
            Value::Uid(u) => ScalarKey::Uid(u.0),
            Value::Array(_) | Value::Dictionary(_) => return None,
        })
    }
}

enum Flat<'v> {
    Scalar(&'v Value),
    /// Dictionary key; shares its slot with equal string values.
    Key(&'v str),
    Array(Vec<usize>),
    Dictionary(Vec<usize>, Vec<usize>),
}

#[derive(Default)]
struct Flattener<'v> {
    table: Vec<Flat<'v>>,
    scalars: HashMap<ScalarKey, usize>,
}

impl<'v> Flattener<'v> {
    fn reserve(&mut self) -> usize {
        self.table.push(Flat::Array(Vec::new()));
        self.table.len() - 1
    }

    fn shared(&mut self, key: ScalarKey, entry: Flat<'v>) -> usize {
        if let Some(index) = self.scalars.get(&key) {
            return *index;
        }
        let index = self.table.len();
        self.table.push(entry);
        self.scalars.insert(key, index);
        index
    }

    fn add(&mut self, value: &'v Value) -> usize {
        match value {
            Value::Array(items) => {
                let index = self.reserve();
                let refs = items.iter().map(|item| self.add(item)).collect();
                self.table[index] = Flat::Array(refs);
                index
            }
            Value::Dictionary(entries) => {
                let index = self.reserve();
                let mut key_refs = Vec::with_capacity(entries.len());
                let mut value_refs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    key_refs.push(self.shared(ScalarKey::String(k.clone()), Flat::Key(k)));
                    value_refs.push(self.add(v));
                }
                self.table[index] = Flat::Dictionary(key_refs, value_refs);
                index
            }
            scalar => match ScalarKey::of(scalar) {
                Some(key) => self.shared(key, Flat::Scalar(scalar)),
                None => {
                    self.table.push(Flat::Scalar(scalar));
                    self.table.len() - 1
                }
            },
        }
    }
}

/// Smallest of 1, 2, 4 or 8 bytes that holds `value`.
fn int_width(value: u64) -> usize {
    if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFFFF_FFFF {
        4
    } else {
        8
    }
}

fn push_uint(out: &mut Vec<u8>, value: u64, width: usize) {
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

fn push_integer(out: &mut Vec<u8>, value: i64) {
    if value < 0 {
        out.push(0x13);
        out.extend_from_slice(&value.to_be_bytes());
        return;
    }
    let width = int_width(value as u64);
    out.push(0x10 | width.trailing_zeros() as u8);
    push_uint(out, value as u64, width);
}

fn push_marker(out: &mut Vec<u8>, kind: u8, len: usize) {
    if len < 0x0F {
        out.push((kind << 4) | len as u8);
    } else {
        out.push((kind << 4) | 0x0F);
        push_integer(out, len as i64);
    }
}

/// ASCII strings are stored as bytes, everything else as UTF-16BE.
fn push_string(out: &mut Vec<u8>, s: &str) {
    if s.is_ascii() {
        push_marker(out, 0x5, s.len());
        out.extend_from_slice(s.as_bytes());
    } else {
        let units: Vec<u16> = s.encode_utf16().collect();
        push_marker(out, 0x6, units.len());
        for unit in units {
            out.extend_from_slice(&unit.to_be_bytes());
        }
    }
}

fn push_scalar(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Boolean(false) => out.push(0x08),
        Value::Boolean(true) => out.push(0x09),
        Value::Integer(i) => push_integer(out, *i),
        Value::Real(r) => {
            out.push(0x23);
            out.extend_from_slice(&r.to_bits().to_be_bytes());
        }
        Value::Date(d) => {
            out.push(0x33);
            out.extend_from_slice(&datetime_to_absolute(d).to_bits().to_be_bytes());
        }
        Value::Data(d) => {
            push_marker(out, 0x4, d.len());
            out.extend_from_slice(d);
        }
        Value::String(s) => push_string(out, s),
        Value::Uid(u) => {
            let width = int_width(u.0);
            out.push(0x80 | (width as u8 - 1));
            push_uint(out, u.0, width);
        }
        Value::Array(_) | Value::Dictionary(_) => {}
    }
}

/// Encode a value tree as a binary plist.
pub fn write_binary(value: &Value) -> Vec<u8> {
    let mut flat = Flattener::default();
    flat.add(value);

    let count = flat.table.len();
    let ref_size = int_width(count.saturating_sub(1) as u64);

    let mut out = Vec::with_capacity(64 + count * 8);
    out.extend_from_slice(MAGIC);
    let mut offsets = Vec::with_capacity(count);

    for entry in &flat.table {
        offsets.push(out.len());
        match entry {
            Flat::Scalar(value) => push_scalar(&mut out, value),
            Flat::Key(key) => push_string(&mut out, key),
            Flat::Array(refs) => {
                push_marker(&mut out, 0xA, refs.len());
                for r in refs {
                    push_uint(&mut out, *r as u64, ref_size);
                }
            }
            Flat::Dictionary(keys, values) => {
                push_marker(&mut out, 0xD, keys.len());
                for r in keys.iter().chain(values) {
                    push_uint(&mut out, *r as u64, ref_size);
                }
            }
        }
    }

    let table_offset = out.len();
    let offset_size = int_width(table_offset as u64);
    for offset in &offsets {
        push_uint(&mut out, *offset as u64, offset_size);
    }

    let mut trailer = [0u8; TRAILER_LEN];
    trailer[6] = offset_size as u8;
    trailer[7] = ref_size as u8;
    trailer[8..16].copy_from_slice(&(count as u64).to_be_bytes());
    trailer[16..24].copy_from_slice(&0u64.to_be_bytes());
    trailer[24..32].copy_from_slice(&(table_offset as u64).to_be_bytes());
    out.extend_from_slice(&trailer);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_binary;
    use indexmap::IndexMap;

    #[test]
    fn single_true() {
        let bytes = write_binary(&Value::Boolean(true));
        assert!(bytes.starts_with(b"bplist00"));
        assert_eq!(bytes[8], 0x09);
        // header + one object + one offset + trailer
        assert_eq!(bytes.len(), 8 + 1 + 1 + 32);
    }

    #[test]
    fn equal_strings_are_written_once() {
        let value = Value::Array(vec!["test".into(), "test".into(), "other".into()]);
        let bytes = write_binary(&value);
        let trailer = &bytes[bytes.len() - 32..];
        // array + "test" + "other"
        assert_eq!(u64::from_be_bytes(trailer[8..16].try_into().unwrap()), 3);
        assert_eq!(parse_binary(&bytes).unwrap(), value);
    }

    #[test]
    fn dictionary_key_shared_with_string_value() {
        let mut dict = IndexMap::new();
        dict.insert("name".to_string(), Value::from("name"));
        let value = Value::Dictionary(dict);
        let bytes = write_binary(&value);
        let trailer = &bytes[bytes.len() - 32..];
        assert_eq!(u64::from_be_bytes(trailer[8..16].try_into().unwrap()), 2);
        assert_eq!(parse_binary(&bytes).unwrap(), value);
    }

    #[test]
    fn integer_widths() {
        let mut out = Vec::new();
        push_integer(&mut out, 42);
        assert_eq!(out, [0x10, 42]);
        out.clear();
        push_integer(&mut out, 100_000);
        assert_eq!(out, [0x12, 0x00, 0x01, 0x86, 0xA0]);
        out.clear();
        push_integer(&mut out, -1);
        assert_eq!(out, [0x13, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn long_and_unicode_strings() {
        let long = "x".repeat(300);
        let value = Value::Array(vec![Value::String(long), "héllo ☃".into()]);
        assert_eq!(parse_binary(&write_binary(&value)).unwrap(), value);
    }
}
