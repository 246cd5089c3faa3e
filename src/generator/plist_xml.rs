//! Generate XML property list text from a [`Value`] tree.
//!
//! The output follows the layout of Apple's writer: XML declaration, the
//! plist DOCTYPE, tab indentation, one element per line.

use crate::model::Value;
use crate::parser::helpers::encode_base64;

const HEADER: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
    "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
    "<plist version=\"1.0\">\n",
);

/// Generate the XML text for a plist.
pub fn write_xml(value: &Value) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str(HEADER);
    write_value(&mut out, value, 0);
    out.push_str("</plist>\n");
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push('\t');
    }
}

/// Escape text content. Only `&`, `<` and `>` need it outside attributes.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn write_leaf(out: &mut String, level: usize, tag: &str, text: &str) {
    indent(out, level);
    out.push_str(&format!("<{tag}>{text}</{tag}>\n"));
}

fn write_value(out: &mut String, value: &Value, level: usize) {
    match value {
        Value::Boolean(true) => {
            indent(out, level);
            out.push_str("<true/>\n");
        }
        Value::Boolean(false) => {
            indent(out, level);
            out.push_str("<false/>\n");
        }
        Value::Integer(i) => write_leaf(out, level, "integer", &i.to_string()),
        Value::Real(r) => write_leaf(out, level, "real", &r.to_string()),
        Value::Date(d) => write_leaf(
            out,
            level,
            "date",
            &d.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ),
        Value::Data(d) => write_leaf(out, level, "data", &encode_base64(d)),
        Value::String(s) => write_leaf(out, level, "string", &xml_escape(s)),
        Value::Uid(u) => {
            indent(out, level);
            out.push_str("<dict>\n");
            write_leaf(out, level + 1, "key", "CF$UID");
            write_leaf(out, level + 1, "integer", &u.0.to_string());
            indent(out, level);
            out.push_str("</dict>\n");
        }
        Value::Array(items) if items.is_empty() => {
            indent(out, level);
            out.push_str("<array/>\n");
        }
        Value::Array(items) => {
            indent(out, level);
            out.push_str("<array>\n");
            for item in items {
                write_value(out, item, level + 1);
            }
            indent(out, level);
            out.push_str("</array>\n");
        }
        Value::Dictionary(entries) if entries.is_empty() => {
            indent(out, level);
            out.push_str("<dict/>\n");
        }
        Value::Dictionary(entries) => {
            indent(out, level);
            out.push_str("<dict>\n");
            for (k, v) in entries {
                write_leaf(out, level + 1, "key", &xml_escape(k));
                write_value(out, v, level + 1);
            }
            indent(out, level);
            out.push_str("</dict>\n");
        }
    }
}
