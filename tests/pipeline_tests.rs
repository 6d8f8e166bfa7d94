//! Integration tests for a full processing run.
//!
//! A small iOS extraction is packed into each container kind, then the
//! registry, scheduler and JSON report sink run over it the way the binary
//! does.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;

use leapp_engine::artifacts::{
    builtin_plugins, Artifact, ArtifactContext, ArtifactInfo, ArtifactRegistry, DeviceType,
    PluginSet, Row, Scheduler,
};
use leapp_engine::report::{JsonReportSink, NullSink, TIMELINE_FILE_NAME};
use leapp_engine::search::{CacheOptions, Seeker, SourceKind};
use leapp_engine::utils::summary::{create_run_summary, RunDetails};

/// Lay out a minimal iOS filesystem extraction below `root`
fn build_extraction(root: &Path) -> Result<()> {
    let address_book = root.join("private/var/mobile/Library/AddressBook");
    fs::create_dir_all(&address_book)?;
    let db = Connection::open(address_book.join("AddressBook.sqlitedb"))?;
    db.execute_batch(
        "CREATE TABLE ABStore (ROWID INTEGER PRIMARY KEY, Name TEXT);
         CREATE TABLE ABPerson (ROWID INTEGER PRIMARY KEY, First TEXT, Middle TEXT, Last TEXT,
             CreationDate INTEGER, ModificationDate INTEGER, StoreID INTEGER);
         CREATE TABLE ABPersonFullTextSearch_content (ROWID INTEGER PRIMARY KEY, c16Phone TEXT, c17Email TEXT);
         INSERT INTO ABPerson VALUES (1, 'Grace', NULL, 'Hopper', 0, 0, NULL);",
    )?;
    drop(db);

    let wireless = root.join("private/var/wireless/Library/Databases");
    fs::create_dir_all(&wireless)?;
    let db = Connection::open(wireless.join("DataUsage.sqlite"))?;
    db.execute_batch(
        "CREATE TABLE ZPROCESS (Z_PK INTEGER PRIMARY KEY, ZTIMESTAMP REAL, ZFIRSTTIMESTAMP REAL,
             ZPROCNAME TEXT, ZBUNDLENAME TEXT);
         INSERT INTO ZPROCESS VALUES (1, 0, 0, 'locationd', NULL);",
    )?;
    drop(db);

    let mmkv = root.join("private/var/mobile/Containers/Data/Application/ABCD/Documents/mmkv");
    fs::create_dir_all(&mmkv)?;
    fs::write(mmkv.join("mmkv.default"), b"\x00\x0duser_id_cache\x12\x00\x1a112233445566\x00")?;
    Ok(())
}

fn pack_tar(root: &Path, dest: &Path) -> Result<()> {
    let mut builder = tar::Builder::new(File::create(dest)?);
    builder.append_dir_all("extraction", root)?;
    builder.into_inner()?.flush()?;
    Ok(())
}

fn pack_zip(root: &Path, dest: &Path) -> Result<()> {
    let mut writer = zip::ZipWriter::new(File::create(dest)?);
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.path().strip_prefix(root)?.to_string_lossy().replace('\\', "/");
        writer.start_file(name, zip::write::FileOptions::default())?;
        writer.write_all(&fs::read(entry.path())?)?;
    }
    writer.finish()?;
    Ok(())
}

/// Store every file of the extraction the way a manifest-indexed backup does
fn pack_itunes(root: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let manifest = Connection::open(dest.join("Manifest.db"))?;
    manifest.execute_batch(
        "CREATE TABLE Files (fileID TEXT PRIMARY KEY, domain TEXT, relativePath TEXT, flags INTEGER, file BLOB);",
    )?;
    let mut count = 0u32;
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        count += 1;
        let key = format!("{:040x}", count);
        let object_dir = dest.join(&key[..2]);
        fs::create_dir_all(&object_dir)?;
        fs::copy(entry.path(), object_dir.join(&key))?;
        let relative = entry.path().strip_prefix(root)?.to_string_lossy().replace('\\', "/");
        manifest.execute(
            "INSERT INTO Files VALUES (?1, 'HomeDomain', ?2, 1, NULL)",
            [key.as_str(), relative.as_str()],
        )?;
    }
    Ok(())
}

fn run_all(kind: SourceKind, input: &Path, output: &Path) -> Result<leapp_engine::artifacts::RunSummary> {
    let mut registry = ArtifactRegistry::build(DeviceType::Ios, &builtin_plugins())?;
    registry.select_all(false);

    let mut seeker = Seeker::open(kind, input, &output.join("data"), CacheOptions::default())?;
    let mut sink = JsonReportSink::new(&output.join("reports"))?;
    let summary = Scheduler::new(registry)
        .with_report_folder(output.join("reports"))
        .run(&mut seeker, &mut sink);
    seeker.cleanup()?;
    Ok(summary)
}

/// Every container kind produces the same findings
#[test]
fn test_full_run_on_every_container() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let extraction = temp_dir.path().join("extraction");
    build_extraction(&extraction)?;
    let tar_path = temp_dir.path().join("extraction.tar");
    pack_tar(&extraction, &tar_path)?;
    let zip_path = temp_dir.path().join("extraction.zip");
    pack_zip(&extraction, &zip_path)?;
    let backup = temp_dir.path().join("backup");
    pack_itunes(&extraction, &backup)?;

    for (kind, input) in [
        (SourceKind::Fs, extraction.as_path()),
        (SourceKind::Tar, tar_path.as_path()),
        (SourceKind::Zip, zip_path.as_path()),
        (SourceKind::Itunes, backup.as_path()),
    ] {
        let output = temp_dir.path().join(format!("case-{}", kind));
        let summary = run_all(kind, input, &output)?;

        assert_eq!(summary.selected, 5, "{}", kind);
        assert_eq!(summary.failed, 0, "{}: {:?}", kind, summary.outcomes);
        let rows = |id: &str| summary.outcomes.iter().find(|o| o.id == id).map(|o| o.rows);
        assert_eq!(rows("ADDRESS_BOOK"), Some(1));
        assert_eq!(rows("DATA_USAGE_PROCESS"), Some(1));
        assert_eq!(rows("DISCORD_ACCOUNT"), Some(1));
        // No aggregate dictionary in this extraction
        assert_eq!(rows("AGG_DICT"), Some(0));

        let report: Value = serde_json::from_str(&fs::read_to_string(
            output.join("reports/Address Book/ADDRESS_BOOK.json"),
        )?)?;
        assert_eq!(report["rows"][0][2], "Grace");

        let timeline = fs::read_to_string(output.join("reports").join(TIMELINE_FILE_NAME))?;
        assert_eq!(timeline.lines().count(), 1);
        assert!(timeline.contains("locationd"));

        let accounts = fs::read_to_string(output.join("reports/Discord Account.tsv"))?;
        assert!(accounts.contains("User ID\t112233445566"), "{}", kind);
    }
    Ok(())
}

#[derive(Default)]
struct Broken;

impl Artifact for Broken {
    fn info(&self) -> ArtifactInfo {
        ArtifactInfo::new("Broken Parser", "Test").core()
    }

    fn patterns(&self) -> &'static [&'static str] {
        &["**/AddressBook.sqlitedb"]
    }

    fn process(&mut self, ctx: &mut ArtifactContext<'_>) -> anyhow::Result<Vec<Row>> {
        let found = ctx.found()?;
        let db = found.first().and_then(|h| h.database()).unwrap();
        db.query_row("SELECT missing_column FROM ABPerson", [], |_| Ok(()))?;
        Ok(Vec::new())
    }
}

/// A failing core artifact is reported and the optional ones still run
#[test]
fn test_failing_artifact_does_not_stop_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    build_extraction(temp_dir.path())?;

    let mut sets = builtin_plugins();
    sets.push(PluginSet::new("extra", DeviceType::Ios).register::<Broken>());
    let mut registry = ArtifactRegistry::build(DeviceType::Ios, &sets)?;
    registry.select(&["ADDRESS_BOOK"], true)?;

    let mut seeker = Seeker::open(SourceKind::Fs, temp_dir.path(), temp_dir.path(), CacheOptions::default())?;
    let summary = Scheduler::new(registry).run(&mut seeker, &mut NullSink);

    let order: Vec<&str> = summary.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(order, vec!["BROKEN", "ADDRESS_BOOK"]);
    assert!(!summary.outcomes[0].processed);
    assert!(summary.outcomes[0].error.as_deref().unwrap().contains("missing_column"));
    assert!(summary.outcomes[1].processed);
    assert_eq!((summary.processed, summary.failed), (1, 1));

    // Both artifacts shared one cached handle
    assert_eq!(seeker.handles().patterns(), vec!["**/AddressBook.sqlitedb"]);
    Ok(())
}

/// The run summary records source and per-artifact outcomes
#[test]
fn test_run_summary_document() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let extraction = temp_dir.path().join("extraction");
    build_extraction(&extraction)?;
    let output = temp_dir.path().join("case");
    let summary = run_all(SourceKind::Fs, &extraction, &output)?;

    let details = RunDetails {
        hostname: "examiner",
        started: "2024-01-01T00:00:00Z",
        finished: "2024-01-01T00:00:05Z",
        device: DeviceType::Ios,
        source_kind: SourceKind::Fs,
        input: &extraction,
        container_sha256: None,
        indexed: 0,
        extraction_failures: 0,
    };
    let document: Value = serde_json::from_str(&create_run_summary(&details, &summary)?)?;
    assert_eq!(document["artifacts"]["selected"], 5);
    assert_eq!(document["artifacts"]["outcomes"].as_array().map(Vec::len), Some(5));
    assert!(document["source"]["sha256"].is_null());
    Ok(())
}
