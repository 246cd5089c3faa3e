//! Test fixture generation.
//!
//! Every fixture set is archived twice, once per [`Format`], and written next
//! to each other as `<name>.bin` and `<name>.xml`. Invalid fixtures exercise
//! the unarchiver's validation and only exist in binary form.

use crate::generator::archiver::KeyedArchiver;
use crate::generator::binary::write_binary;
use crate::model::{Object, Uid, Value};
use crate::parser::Format;
use crate::parser::unarchiver::{ARCHIVER_NAME, ARCHIVER_VERSION, NULL_MARKER};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use tracing::{error, info};

/// A named list of top-level objects.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureSet {
    pub name: String,
    pub objects: Vec<Object>,
}

impl FixtureSet {
    pub fn new(name: impl Into<String>, objects: Vec<Object>) -> Self {
        Self {
            name: name.into(),
            objects,
        }
    }
}

/// Outcome of [`generate_all`].
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub written: Vec<Utf8PathBuf>,
    pub failed: Vec<String>,
}

impl GenerationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Path of the fixture file for `filename` in `format`. The extension is
/// appended, never substituted, so dotted names survive.
pub fn fixture_path(filename: &Utf8Path, format: Format) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}.{}", filename, format.extension()))
}

fn write_file(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Create directory {}", parent))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path))
}

/// Archive `objects` in both formats and write `<filename>.bin` and
/// `<filename>.xml`. Returns the written paths, binary first.
pub fn create_archive_files(objects: &[Object], filename: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut xml_archiver = KeyedArchiver::new(Format::Xml);
    for object in objects {
        xml_archiver.encode(object)?;
    }
    xml_archiver.finish_encoding();

    let mut bin_archiver = KeyedArchiver::new(Format::Binary);
    for object in objects {
        bin_archiver.encode(object)?;
    }
    bin_archiver.finish_encoding();

    let bin_path = fixture_path(filename, Format::Binary);
    write_file(&bin_path, bin_archiver.encoded_data()?)?;
    let xml_path = fixture_path(filename, Format::Xml);
    write_file(&xml_path, xml_archiver.encoded_data()?)?;
    Ok(vec![bin_path, xml_path])
}

const HELLO: &str = "Hello, World!";

fn primitives() -> Vec<Object> {
    vec![
        Object::Integer(1),
        Object::Integer(1),
        Object::Integer(1),
        Object::Real(1.5),
        Object::data(b"asdfasdfadsfadsf".to_vec()),
        Object::Bool(true),
        Object::from(HELLO),
        Object::from(HELLO),
        Object::from(HELLO),
        Object::Bool(false),
        Object::Bool(false),
        Object::Integer(42),
    ]
}

/// The valid fixture sets, in generation order.
pub fn standard_fixtures() -> Vec<FixtureSet> {
    vec![
        FixtureSet::new("boolean", vec![Object::Bool(true)]),
        FixtureSet::new(
            "test",
            vec![
                Object::Bool(true),
                Object::Integer(2),
                Object::Integer(3),
                Object::from("test"),
                Object::from("test"),
            ],
        ),
        FixtureSet::new("onevalue", vec![Object::Bool(true)]),
        FixtureSet::new("primitives", primitives()),
        FixtureSet::new(
            "arrays",
            vec![
                Object::Array(primitives()),
                Object::array([Object::Bool(true), Object::from(HELLO), Object::Integer(42)]),
                Object::set([true]),
                Object::set([Object::Integer(42), Object::Bool(true), Object::from(HELLO)]),
            ],
        ),
        FixtureSet::new(
            "nestedarrays",
            vec![Object::array([
                Object::array([true]),
                Object::array([Object::Integer(42), Object::Bool(true), Object::from(HELLO)]),
            ])],
        ),
        FixtureSet::new(
            "dict",
            vec![Object::dictionary([
                (
                    "array",
                    Object::array([Object::Bool(true), Object::from(HELLO), Object::Integer(42)]),
                ),
                ("int", Object::Integer(1)),
                ("string", Object::from("string")),
            ])],
        ),
    ]
}

fn variant(
    base: &IndexMap<String, Value>,
    edit: impl FnOnce(&mut IndexMap<String, Value>),
) -> Vec<u8> {
    let mut root = base.clone();
    edit(&mut root);
    write_binary(&Value::Dictionary(root))
}

/// Binary plists that each break one rule of the keyed archive format.
pub fn invalid_fixtures() -> Vec<(String, Vec<u8>)> {
    // Equivalent to archiving `[true]`.
    let mut top = IndexMap::new();
    top.insert("$0".to_string(), Value::Uid(Uid(1)));
    let mut base = IndexMap::new();
    base.insert("$archiver".to_string(), Value::from(ARCHIVER_NAME));
    base.insert(
        "$objects".to_string(),
        Value::Array(vec![Value::from(NULL_MARKER), Value::Boolean(true)]),
    );
    base.insert("$top".to_string(), Value::Dictionary(top));
    base.insert("$version".to_string(), Value::Integer(ARCHIVER_VERSION));

    let valid = write_binary(&Value::Dictionary(base.clone()));
    let broken = valid[..valid.len() / 2].to_vec();

    vec![
        (
            "missing_archiver".to_string(),
            variant(&base, |r| {
                r.shift_remove("$archiver");
            }),
        ),
        (
            "wrong_archiver".to_string(),
            variant(&base, |r| {
                r.insert("$archiver".into(), Value::from("NSArchiver"));
            }),
        ),
        (
            "missing_top".to_string(),
            variant(&base, |r| {
                r.shift_remove("$top");
            }),
        ),
        (
            "missing_objects".to_string(),
            variant(&base, |r| {
                r.shift_remove("$objects");
            }),
        ),
        (
            "missing_version".to_string(),
            variant(&base, |r| {
                r.shift_remove("$version");
            }),
        ),
        (
            "wrong_version".to_string(),
            variant(&base, |r| {
                r.insert("$version".into(), Value::Integer(99_999));
            }),
        ),
        ("broken_plist".to_string(), broken),
    ]
}

/// Names of every fixture [`generate_all`] can produce.
pub fn fixture_names() -> Vec<String> {
    standard_fixtures()
        .into_iter()
        .map(|f| f.name)
        .chain(invalid_fixtures().into_iter().map(|(name, _)| name))
        .collect()
}

/// Write all selected fixtures into `out_dir`.
///
/// `only` restricts generation to the named sets (empty means all). A set
/// that fails to write is reported and skipped; the others still run.
pub fn generate_all(
    out_dir: &Utf8Path,
    only: &[String],
    include_invalid: bool,
) -> Result<GenerationReport> {
    let known = fixture_names();
    if let Some(unknown) = only.iter().find(|name| !known.contains(*name)) {
        bail!(
            "Unknown fixture set '{}' (known: {})",
            unknown,
            known.join(", ")
        );
    }
    let selected = |name: &str| only.is_empty() || only.iter().any(|o| o == name);

    let mut report = GenerationReport::default();
    for set in standard_fixtures() {
        if !selected(set.name.as_str()) {
            continue;
        }
        let filename = out_dir.join(&set.name);
        match create_archive_files(&set.objects, &filename) {
            Ok(paths) => {
                info!("Wrote fixture set '{}' ({} objects)", set.name, set.objects.len());
                report.written.extend(paths);
            }
            Err(e) => {
                error!("Fixture set '{}' failed: {:#}", set.name, e);
                eprintln!("Couldn't write file {}: {:#}", filename, e);
                report.failed.push(set.name);
            }
        }
    }

    if include_invalid {
        for (name, bytes) in invalid_fixtures() {
            if !selected(name.as_str()) {
                continue;
            }
            let path = fixture_path(&out_dir.join(&name), Format::Binary);
            match write_file(&path, &bytes) {
                Ok(()) => {
                    info!("Wrote invalid fixture '{}'", name);
                    report.written.push(path);
                }
                Err(e) => {
                    error!("Invalid fixture '{}' failed: {:#}", name, e);
                    eprintln!("Couldn't write file {}: {:#}", path, e);
                    report.failed.push(name);
                }
            }
        }
    }
    Ok(report)
}
