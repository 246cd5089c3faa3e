use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use keyedarchive::error::ArchiveError;
use keyedarchive::generator::{write_binary, write_plist, write_xml};
use keyedarchive::model::{Uid, Value};
use keyedarchive::parser::{Format, parse_binary, parse_plist, parse_xml};

fn sample() -> Value {
    let mut inner = IndexMap::new();
    inner.insert("CF$UID-like".to_string(), Value::Uid(Uid(300)));
    inner.insert("empty".to_string(), Value::Array(vec![]));
    inner.insert("nested".to_string(), Value::Dictionary(IndexMap::new()));

    let mut root = IndexMap::new();
    root.insert("yes".to_string(), Value::Boolean(true));
    root.insert("no".to_string(), Value::Boolean(false));
    root.insert("small".to_string(), Value::Integer(7));
    root.insert("big".to_string(), Value::Integer(5_000_000_000));
    root.insert("negative".to_string(), Value::Integer(-12));
    root.insert("real".to_string(), Value::Real(-0.125));
    root.insert(
        "date".to_string(),
        Value::Date(Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).unwrap()),
    );
    root.insert("data".to_string(), Value::Data((0u8..=255).collect()));
    root.insert("ascii".to_string(), Value::from("plain <text> & more"));
    root.insert("unicode".to_string(), Value::from("Grüße 👋"));
    root.insert("inner".to_string(), Value::Dictionary(inner));
    Value::Dictionary(root)
}

#[test]
fn binary_round_trip() {
    let value = sample();
    let bytes = write_binary(&value);
    assert_eq!(Format::detect(&bytes), Format::Binary);
    assert_eq!(parse_binary(&bytes).unwrap(), value);
}

#[test]
fn xml_round_trip() {
    let value = sample();
    let text = write_xml(&value);
    assert!(text.contains("<key>ascii</key>\n\t<string>plain &lt;text&gt; &amp; more</string>"));
    assert!(text.contains("<date>2024-02-29T23:59:58Z</date>"));
    assert_eq!(parse_xml(&text).unwrap(), value);
}

#[test]
fn converting_between_formats_preserves_values() {
    let value = sample();
    let xml = write_plist(&value, Format::Xml);
    let from_xml = parse_plist(&xml).unwrap();
    let bin = write_plist(&from_xml, Format::Binary);
    assert_eq!(parse_plist(&bin).unwrap(), value);
}

#[test]
fn dictionary_order_is_preserved() {
    let value = sample();
    let parsed = parse_plist(&write_binary(&value)).unwrap();
    let keys: Vec<&str> = parsed
        .as_dictionary()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(
        keys,
        vec![
            "yes", "no", "small", "big", "negative", "real", "date", "data", "ascii", "unicode",
            "inner"
        ]
    );
}

#[test]
fn many_objects_use_wider_references() {
    let items: Vec<Value> = (0..1000).map(Value::Integer).collect();
    let value = Value::Array(items);
    let bytes = write_binary(&value);
    let trailer = &bytes[bytes.len() - 32..];
    assert_eq!(trailer[7], 2, "object reference size");
    assert_eq!(parse_binary(&bytes).unwrap(), value);
}

fn with_trailer(objects: &[u8], offsets: &[u8], num: u64, top: u64) -> Vec<u8> {
    let mut bytes = b"bplist00".to_vec();
    bytes.extend_from_slice(objects);
    let table = bytes.len() as u64;
    bytes.extend_from_slice(offsets);
    let mut trailer = [0u8; 32];
    trailer[6] = 1;
    trailer[7] = 1;
    trailer[8..16].copy_from_slice(&num.to_be_bytes());
    trailer[16..24].copy_from_slice(&top.to_be_bytes());
    trailer[24..32].copy_from_slice(&table.to_be_bytes());
    bytes.extend_from_slice(&trailer);
    bytes
}

#[test]
fn hand_built_binary_plist() {
    // [1, "ab"] with 16-bit UTF-16 string and 1-byte int
    let objects = [0xA2, 0x01, 0x02, 0x10, 0x01, 0x62, 0x00, 0x61, 0x00, 0x62];
    let bytes = with_trailer(&objects, &[8, 11, 13], 3, 0);
    assert_eq!(
        parse_binary(&bytes).unwrap(),
        Value::Array(vec![Value::Integer(1), Value::from("ab")])
    );
}

#[test]
fn binary_cycle_is_rejected() {
    // An array whose only element is itself.
    let bytes = with_trailer(&[0xA1, 0x00], &[8], 1, 0);
    assert!(matches!(parse_binary(&bytes), Err(ArchiveError::Binary(_))));
}

#[test]
fn binary_reference_out_of_range() {
    let bytes = with_trailer(&[0xA1, 0x05], &[8], 1, 0);
    let err = parse_binary(&bytes).unwrap_err();
    assert!(err.to_string().contains("out of range"), "{}", err);
}

#[test]
fn binary_bad_top_object() {
    let bytes = with_trailer(&[0x09], &[8], 1, 4);
    assert!(parse_binary(&bytes).is_err());
}

#[test]
fn binary_too_short() {
    assert!(matches!(parse_binary(b"bplist00"), Err(ArchiveError::Binary(_))));
}

#[test]
fn xml_errors() {
    assert!(matches!(
        parse_xml("<plist><string>a</string><string>b</string></plist>"),
        Err(ArchiveError::Xml(_))
    ));
    assert!(matches!(
        parse_xml("<plist><dict><key>a</key></dict></plist>"),
        Err(ArchiveError::Xml(_))
    ));
    assert!(matches!(
        parse_xml("<plist><integer>abc</integer></plist>"),
        Err(ArchiveError::Xml(_))
    ));
    assert!(matches!(
        parse_xml("<plist><blob/></plist>"),
        Err(ArchiveError::Xml(_))
    ));
    assert!(matches!(
        parse_xml("<plist><string>unclosed</plist>"),
        Err(ArchiveError::XmlSyntax(_))
    ));
}

#[test]
fn xml_data_spanning_lines() {
    let text = "<plist version=\"1.0\">\n<data>\n\tAAEC\n\tAwQ=\n</data>\n</plist>";
    assert_eq!(parse_xml(text).unwrap(), Value::Data(vec![0, 1, 2, 3, 4]));
}

#[test]
fn integer_extremes_round_trip() {
    for n in [i64::MIN, -1, 0, i64::MAX] {
        let value = Value::Array(vec![Value::Integer(n)]);
        assert_eq!(parse_xml(&write_xml(&value)).unwrap(), value, "{}", n);
        assert_eq!(parse_binary(&write_binary(&value)).unwrap(), value, "{}", n);
    }
}

/// `levels` arrays where each one holds the next one twice, ending in `true`.
fn doubling_chain(levels: usize) -> Vec<u8> {
    let mut objects = Vec::new();
    let mut offsets = Vec::new();
    for i in 0..levels {
        offsets.push((8 + objects.len()) as u8);
        let next = (i + 1) as u8;
        objects.extend_from_slice(&[0xA2, next, next]);
    }
    offsets.push((8 + objects.len()) as u8);
    objects.push(0x09);
    with_trailer(&objects, &offsets, levels as u64 + 1, 0)
}

fn leaves(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.iter().map(leaves).sum(),
        _ => 1,
    }
}

#[test]
fn shared_objects_are_decoded_once() {
    let value = parse_binary(&doubling_chain(12)).unwrap();
    assert_eq!(leaves(&value), 1 << 12);
}

#[test]
fn exponential_sharing_is_rejected() {
    let started = std::time::Instant::now();
    let err = parse_binary(&doubling_chain(30)).unwrap_err();
    assert!(err.to_string().contains("More than"), "{}", err);
    assert!(started.elapsed().as_secs() < 10);
}

#[test]
fn null_marker_is_rejected() {
    let bytes = with_trailer(&[0x00], &[8], 1, 0);
    let err = parse_binary(&bytes).unwrap_err();
    assert!(err.to_string().contains("Unsupported singleton"), "{}", err);
}

#[test]
fn ascii_strings_must_be_ascii() {
    let ok = with_trailer(&[0x52, b'h', b'i'], &[8], 1, 0);
    assert_eq!(parse_binary(&ok).unwrap(), Value::from("hi"));

    let latin1 = with_trailer(&[0x52, b'h', 0xE9], &[8], 1, 0);
    let err = parse_binary(&latin1).unwrap_err();
    assert!(err.to_string().contains("Non-ASCII"), "{}", err);
}
