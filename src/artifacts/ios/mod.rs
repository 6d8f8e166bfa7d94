//! Reference artifacts for iOS extractions.
//!
//! These parse a few small, well-known databases and files so the plugin
//! contract runs end to end. Real deployments register their own
//! [`PluginSet`]s next to (or instead of) this one.

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;

use crate::artifacts::artifact::Row;
use crate::artifacts::registry::{DeviceType, PluginSet};
use crate::search::Handle;

mod address_book;
mod agg_dict;
mod data_usage;
mod discord;

pub use address_book::AddressBook;
pub use agg_dict::{AggDict, AggDictPasscodeType};
pub use data_usage::DataUsageProcess;
pub use discord::DiscordAccount;

/// Every reference iOS artifact
pub fn plugins() -> PluginSet {
    PluginSet::new("ios", DeviceType::Ios)
        .register::<AddressBook>()
        .register::<AggDict>()
        .register::<AggDictPasscodeType>()
        .register::<DataUsageProcess>()
        .register::<DiscordAccount>()
}

/// Seconds between the Unix epoch and the Cocoa epoch (2001-01-01)
pub(crate) const COCOA_EPOCH_OFFSET: i64 = 978_307_200;

pub(crate) fn database(handle: &Handle) -> Result<&Connection> {
    handle
        .database()
        .with_context(|| format!("{} is not a SQLite database", handle.path().display()))
}

/// Run `sql` and convert every column of every row to JSON
pub(crate) fn query_rows(db: &Connection, sql: &str) -> Result<Vec<Row>> {
    let mut stmt = db.prepare(sql).context("Failed to prepare query")?;
    let width = stmt.column_count();
    let mut rows = stmt.query([])?;

    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for index in 0..width {
            values.push(to_json(row.get_ref(index)?));
        }
        result.push(values);
    }
    Ok(result)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::from(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::from(blob.iter().map(|b| format!("{:02x}", b)).collect::<String>()),
    }
}

/// Run one artifact over a directory tree and return its descriptor
#[cfg(test)]
pub(crate) fn run_over(root: &std::path::Path, artifact: Box<dyn crate::artifacts::Artifact>) -> crate::artifacts::ArtifactDescriptor {
    use crate::search::{CacheOptions, DirectorySource, Seeker};

    let source = DirectorySource::open(root).unwrap();
    let mut seeker = Seeker::with_source(Box::new(source), CacheOptions::default());
    let mut descriptor = crate::artifacts::ArtifactDescriptor::new("UNDER_TEST", artifact);
    descriptor.process(&mut seeker);
    descriptor
}
