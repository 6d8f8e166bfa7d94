use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::debug;
use regex::bytes::Regex;
use serde_json::{json, Value};

use crate::artifacts::artifact::{Artifact, ArtifactContext, ArtifactInfo, Row};
use crate::search::SearchOptions;

lazy_static! {
    static ref PRINTABLE: Regex = Regex::new(r"(?-u)[\x20-\x7e]{4,}").unwrap();
}

const HEADERS: &[&str] = &["Key", "Value", "Source"];

/// Keys whose value follows them in the key-value store
const ACCOUNT_KEYS: &[(&str, &str)] = &[
    ("user_id_cache", "User ID"),
    ("email_cache", "Email"),
];

/// Metadata file at the root of every app data container
const CONTAINER_METADATA: &str = "**/.com.apple.mobile_container_manager.metadata.plist";

const DISCORD_BUNDLE_ID: &[u8] = b"com.hammerandchisel.discord";

/// Side file written next to the reports
const TSV_NAME: &str = "Discord Account.tsv";

/// Account details from the Discord key-value store
#[derive(Debug, Default)]
pub struct DiscordAccount;

impl Artifact for DiscordAccount {
    fn info(&self) -> ArtifactInfo {
        ArtifactInfo::new("Discord Account", "Discord")
            .description("Account identifiers cached by the Discord app")
            .headers(HEADERS)
    }

    fn patterns(&self) -> &'static [&'static str] {
        &["**/mmkv/mmkv.default"]
    }

    fn search_options(&self) -> SearchOptions {
        SearchOptions::all()
    }

    fn process(&mut self, ctx: &mut ArtifactContext<'_>) -> Result<Vec<Row>> {
        let mut stores = Vec::new();
        for handle in ctx.found()?.iter() {
            let data = handle
                .read_bytes()
                .context(format!("Failed to read {}", handle.path().display()))?;
            stores.push((handle.path().to_path_buf(), data));
        }

        // mmkv is a common library, other apps keep stores under the same name
        let metadata: Vec<PathBuf> = ctx
            .seeker()
            .find(&[CONTAINER_METADATA], SearchOptions::all().names_only())?
            .paths()
            .into_iter()
            .map(Path::to_path_buf)
            .collect();

        let mut rows = Vec::new();
        for (path, data) in &stores {
            if !belongs_to_discord(path, &metadata)? {
                debug!("Skipping {}, container belongs to another app", path.display());
                continue;
            }
            let source = path.display().to_string();
            for (label, value) in account_values(data) {
                rows.push(vec![json!(label), json!(value), json!(source)]);
            }
        }

        if let Some(folder) = ctx.report_folder() {
            if !rows.is_empty() {
                write_tsv(&folder.join(TSV_NAME), &rows)?;
            }
        }
        Ok(rows)
    }
}

/// Printable strings following each known key, in file order
fn account_values(data: &[u8]) -> Vec<(&'static str, String)> {
    let strings: Vec<String> = PRINTABLE
        .find_iter(data)
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        .collect();

    let mut values = Vec::new();
    for pair in strings.windows(2) {
        for (key, label) in ACCOUNT_KEYS {
            if pair[0].contains(key) {
                values.push((*label, pair[1].clone()));
            }
        }
    }
    values
}

/// Whether the app container holding `store` is Discord's. Stores without
/// container metadata are kept.
fn belongs_to_discord(store: &Path, metadata: &[PathBuf]) -> Result<bool> {
    // <container>/Documents/mmkv/mmkv.default
    let Some(container) = store.ancestors().nth(3) else {
        return Ok(true);
    };
    match metadata.iter().find(|plist| plist.parent() == Some(container)) {
        Some(plist) => {
            let bytes = fs::read(plist).context(format!("Failed to read {}", plist.display()))?;
            Ok(bytes
                .windows(DISCORD_BUNDLE_ID.len())
                .any(|window| window == DISCORD_BUNDLE_ID))
        }
        None => Ok(true),
    }
}

fn write_tsv(path: &Path, rows: &[Row]) -> Result<()> {
    let mut out = HEADERS.join("\t");
    out.push('\n');
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect();
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, out).context(format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ios::run_over;
    use crate::artifacts::ArtifactDescriptor;
    use crate::search::{CacheOptions, DirectorySource, Seeker};
    use tempfile::TempDir;

    const STORE: &[u8] = b"\x00\x0duser_id_cache\x12\x00\x1a862731558402916378\x00\x0bemail_cache\x01\x14someone@example.com\x00";

    fn write_container(root: &Path, guid: &str, bundle: Option<&str>) {
        let container = root.join("Containers/Data/Application").join(guid);
        fs::create_dir_all(container.join("Documents/mmkv")).unwrap();
        fs::write(container.join("Documents/mmkv/mmkv.default"), STORE).unwrap();
        if let Some(bundle) = bundle {
            let plist = format!("bplist00\u{1}MCMMetadataIdentifier_\u{10}{}", bundle);
            fs::write(container.join(".com.apple.mobile_container_manager.metadata.plist"), plist).unwrap();
        }
    }

    #[test]
    fn test_account_values() {
        let values = account_values(STORE);
        assert_eq!(
            values,
            vec![
                ("User ID", "862731558402916378".to_string()),
                ("Email", "someone@example.com".to_string()),
            ]
        );
    }

    #[test]
    fn test_account_from_stream() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("Documents/mmkv");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("mmkv.default"), STORE).unwrap();

        let descriptor = run_over(temp_dir.path(), Box::new(DiscordAccount));
        assert!(descriptor.processed(), "{:?}", descriptor.error());
        assert_eq!(descriptor.rows().len(), 2);
        assert_eq!(descriptor.rows()[1][1], json!("someone@example.com"));
    }

    #[test]
    fn test_other_app_containers_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write_container(temp_dir.path(), "AAAA", Some("com.example.notes"));
        write_container(temp_dir.path(), "BBBB", Some("com.hammerandchisel.discord"));

        let descriptor = run_over(temp_dir.path(), Box::new(DiscordAccount));
        assert!(descriptor.processed(), "{:?}", descriptor.error());
        assert_eq!(descriptor.source_paths().len(), 2);
        assert_eq!(descriptor.rows().len(), 2);
        let source = descriptor.rows()[0][2].as_str().unwrap();
        assert!(source.contains("BBBB"), "{}", source);
    }

    #[test]
    fn test_tsv_written_to_report_folder() {
        let temp_dir = TempDir::new().unwrap();
        let evidence = temp_dir.path().join("evidence");
        write_container(&evidence, "CCCC", None);
        let reports = temp_dir.path().join("reports");

        let source = DirectorySource::open(&evidence).unwrap();
        let mut seeker = Seeker::with_source(Box::new(source), CacheOptions::default());
        let mut descriptor = ArtifactDescriptor::new("DISCORD_ACCOUNT", Box::new(DiscordAccount));
        let (_, processed) = descriptor.process_in(&mut seeker, Some(&reports));
        assert!(processed, "{:?}", descriptor.error());

        let tsv = fs::read_to_string(reports.join(TSV_NAME)).unwrap();
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines[0], "Key\tValue\tSource");
        assert!(lines[1].starts_with("User ID\t862731558402916378\t"));
        assert!(lines[2].starts_with("Email\tsomeone@example.com\t"));
    }
}
