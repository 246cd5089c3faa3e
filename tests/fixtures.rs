use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use keyedarchive::generator::fixtures::{
    create_archive_files, fixture_names, generate_all, standard_fixtures,
};
use keyedarchive::model::Object;
use keyedarchive::parser::unarchive;
use tempfile::TempDir;

fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir")
}

#[test]
fn writes_bin_and_xml_next_to_each_other() -> Result<()> {
    let dir = TempDir::new()?;
    let base = utf8_dir(&dir).join("boolean");
    let paths = create_archive_files(&[Object::Bool(true)], &base)?;

    assert_eq!(
        paths,
        vec![
            utf8_dir(&dir).join("boolean.bin"),
            utf8_dir(&dir).join("boolean.xml")
        ]
    );
    let bin = std::fs::read(&paths[0])?;
    let xml = std::fs::read(&paths[1])?;
    assert!(bin.starts_with(b"bplist00"));
    assert!(xml.starts_with(b"<?xml"));
    assert_eq!(unarchive(&bin)?, vec![Object::Bool(true)]);
    assert_eq!(unarchive(&xml)?, vec![Object::Bool(true)]);
    Ok(())
}

#[test]
fn extension_is_appended_to_dotted_names() -> Result<()> {
    let dir = TempDir::new()?;
    let paths = create_archive_files(&[Object::Integer(2)], &utf8_dir(&dir).join("v1.2"))?;
    assert!(paths[0].as_str().ends_with("v1.2.bin"));
    assert!(paths[1].as_str().ends_with("v1.2.xml"));
    Ok(())
}

#[test]
fn creates_missing_parent_directories() -> Result<()> {
    let dir = TempDir::new()?;
    let base = utf8_dir(&dir).join("archiver/fixtures/test");
    create_archive_files(&[Object::from("test"), Object::from("test")], &base)?;
    assert!(Utf8Path::new(&format!("{}.bin", base)).is_file());
    assert!(Utf8Path::new(&format!("{}.xml", base)).is_file());
    Ok(())
}

#[test]
fn generate_all_writes_every_set() -> Result<()> {
    let dir = TempDir::new()?;
    let out = utf8_dir(&dir);
    let report = generate_all(&out, &[], true)?;

    assert!(report.is_success());
    // two files per valid set, one per invalid fixture
    let valid = standard_fixtures().len();
    let invalid = fixture_names().len() - valid;
    assert_eq!(report.written.len(), valid * 2 + invalid);

    for set in standard_fixtures() {
        for ext in ["bin", "xml"] {
            let path = out.join(format!("{}.{}", set.name, ext));
            let bytes = std::fs::read(&path)?;
            assert!(!bytes.is_empty());
            assert_eq!(unarchive(&bytes)?, set.objects, "{}", path);
        }
    }
    assert!(out.join("wrong_version.bin").is_file());
    assert!(!out.join("wrong_version.xml").exists());
    Ok(())
}

#[test]
fn generate_only_selected_sets() -> Result<()> {
    let dir = TempDir::new()?;
    let out = utf8_dir(&dir);
    let report = generate_all(&out, &["test".to_string(), "broken_plist".to_string()], true)?;
    assert_eq!(report.written.len(), 3);
    assert!(out.join("test.bin").is_file());
    assert!(out.join("broken_plist.bin").is_file());
    assert!(!out.join("boolean.bin").exists());

    let bytes = std::fs::read(out.join("test.bin"))?;
    let json = serde_json::to_string(&unarchive(&bytes)?)?;
    assert_eq!(json, "[true,2,3,\"test\",\"test\"]");
    Ok(())
}

#[test]
fn skip_invalid_fixtures() -> Result<()> {
    let dir = TempDir::new()?;
    let out = utf8_dir(&dir);
    let report = generate_all(&out, &[], false)?;
    assert_eq!(report.written.len(), standard_fixtures().len() * 2);
    assert!(!out.join("missing_top.bin").exists());
    Ok(())
}

#[test]
fn unknown_set_is_rejected_before_writing() -> Result<()> {
    let dir = TempDir::new()?;
    let out = utf8_dir(&dir);
    let err = generate_all(&out, &["nope".to_string()], true).unwrap_err();
    assert!(err.to_string().contains("Unknown fixture set 'nope'"));
    assert_eq!(std::fs::read_dir(&out)?.count(), 0);
    Ok(())
}

#[test]
fn failed_set_does_not_stop_the_others() -> Result<()> {
    let dir = TempDir::new()?;
    let out = utf8_dir(&dir);
    // A directory where the binary file should go makes that one write fail.
    std::fs::create_dir(out.join("boolean.bin"))?;

    let report = generate_all(&out, &[], false)?;
    assert_eq!(report.failed, vec!["boolean".to_string()]);
    assert!(!report.is_success());
    assert!(out.join("test.bin").is_file());
    assert!(out.join("dict.xml").is_file());
    Ok(())
}
