//! XML property list reader.

use crate::error::{ArchiveError, Result};
use crate::model::{Uid, Value};
use crate::parser::helpers::decode_base64;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use roxmltree::{Document, Node, ParsingOptions};

const MAX_DEPTH: usize = 512;

fn err(msg: impl Into<String>) -> ArchiveError {
    ArchiveError::Xml(msg.into())
}

/// Parse an XML plist document (`<plist version="1.0">` with a single value).
pub fn parse_xml(text: &str) -> Result<Value> {
    // Apple's writer always emits the plist DOCTYPE, which roxmltree refuses
    // unless DTDs are allowed.
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options)?;
    let root = doc.root_element();
    if !root.has_tag_name("plist") {
        return Err(err(format!(
            "Root element is <{}>, expected <plist>",
            root.tag_name().name()
        )));
    }
    let mut values = element_children(root);
    let first = values
        .next()
        .ok_or_else(|| err("<plist> has no value"))?;
    if let Some(extra) = values.next() {
        return Err(err(format!(
            "<plist> has more than one value (unexpected <{}>)",
            extra.tag_name().name()
        )));
    }
    parse_element(first, 0)
}

fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

/// Concatenated text content of an element (entities already resolved).
fn element_text(node: Node) -> String {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

fn parse_integer(text: &str) -> Result<i64> {
    let t = text.trim();
    let invalid = |reason: String| err(format!("Invalid <integer> '{}': {}", t, reason));
    let (sign, digits) = match t.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", t.strip_prefix('+').unwrap_or(t)),
    };
    let hex = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"));
    // The sign is re-attached so that i64::MIN parses.
    let unsigned = hex.unwrap_or(digits);
    if unsigned.starts_with(['+', '-']) {
        return Err(invalid("misplaced sign".to_string()));
    }
    let signed = format!("{}{}", sign, unsigned);
    let parsed = match hex {
        Some(_) => i64::from_str_radix(&signed, 16),
        None => signed.parse::<i64>(),
    };
    parsed.map_err(|e| invalid(e.to_string()))
}

fn parse_element(node: Node, depth: usize) -> Result<Value> {
    if depth >= MAX_DEPTH {
        return Err(err("Nesting too deep"));
    }
    let tag = node.tag_name().name();
    match tag {
        "true" => Ok(Value::Boolean(true)),
        "false" => Ok(Value::Boolean(false)),
        "string" => Ok(Value::String(element_text(node))),
        "integer" => Ok(Value::Integer(parse_integer(&element_text(node))?)),
        "real" => {
            let text = element_text(node);
            text.trim()
                .parse::<f64>()
                .map(Value::Real)
                .map_err(|e| err(format!("Invalid <real> '{}': {}", text.trim(), e)))
        }
        "date" => {
            let text = element_text(node);
            DateTime::parse_from_rfc3339(text.trim())
                .map(|d| Value::Date(d.with_timezone(&Utc)))
                .map_err(|e| err(format!("Invalid <date> '{}': {}", text.trim(), e)))
        }
        "data" => Ok(Value::Data(decode_base64(&element_text(node))?)),
        "array" => element_children(node)
            .map(|child| parse_element(child, depth + 1))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        "dict" => parse_dict(node, depth),
        other => Err(err(format!("Unknown element <{}>", other))),
    }
}

fn parse_dict(node: Node, depth: usize) -> Result<Value> {
    let mut dict = IndexMap::new();
    let mut children = element_children(node);
    while let Some(key_node) = children.next() {
        if !key_node.has_tag_name("key") {
            return Err(err(format!(
                "Expected <key> in <dict>, found <{}>",
                key_node.tag_name().name()
            )));
        }
        let key = element_text(key_node);
        let value_node = children
            .next()
            .ok_or_else(|| err(format!("Key '{}' has no value", key)))?;
        let value = parse_element(value_node, depth + 1)?;
        dict.insert(key, value);
    }

    // XML has no UID element; CoreFoundation writes them as one-key dicts.
    if dict.len() == 1 {
        if let Some(Value::Integer(n)) = dict.get("CF$UID") {
            if *n >= 0 {
                return Ok(Value::Uid(Uid(*n as u64)));
            }
        }
    }
    Ok(Value::Dictionary(dict))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cf_uid_dict_becomes_uid() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0"><dict><key>CF$UID</key><integer>7</integer></dict></plist>"#;
        assert_eq!(parse_xml(xml).unwrap(), Value::Uid(Uid(7)));
    }

    #[test]
    fn hex_and_negative_integers() {
        assert_eq!(parse_integer("0x1F").unwrap(), 31);
        assert_eq!(parse_integer(" -42 ").unwrap(), -42);
        assert_eq!(parse_integer("+7").unwrap(), 7);
        assert_eq!(parse_integer("-0x10").unwrap(), -16);
        assert_eq!(parse_integer("-9223372036854775808").unwrap(), i64::MIN);
        assert_eq!(parse_integer("-0x8000000000000000").unwrap(), i64::MIN);
        assert!(parse_integer("--1").is_err());
        assert!(parse_integer("9223372036854775808").is_err());
        assert!(parse_integer("forty-two").is_err());
    }

    #[test]
    fn rejects_non_plist_root() {
        let result = parse_xml("<dict/>");
        assert!(matches!(result, Err(ArchiveError::Xml(_))));
    }
}
