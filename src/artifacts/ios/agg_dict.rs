use anyhow::Result;

use crate::artifacts::artifact::{Artifact, ArtifactContext, ArtifactInfo, Row};
use crate::artifacts::ios::{database, query_rows};

const PATTERNS: &[&str] = &["**/AggregateDictionary/ADDataStore.sqlitedb"];

const DISTRIBUTION_QUERY: &str = "
    SELECT
        DATE(DISTRIBUTIONKEYS.DAYSSINCE1970 * 86400, 'unixepoch'),
        DISTRIBUTIONKEYS.KEY,
        DISTRIBUTIONVALUES.VALUE,
        DISTRIBUTIONVALUES.SECONDSINDAYOFFSET,
        DISTRIBUTIONVALUES.DISTRIBUTIONID
    FROM DISTRIBUTIONKEYS
    LEFT JOIN DISTRIBUTIONVALUES ON DISTRIBUTIONKEYS.ROWID = DISTRIBUTIONVALUES.DISTRIBUTIONID
    ORDER BY DISTRIBUTIONKEYS.DAYSSINCE1970, DISTRIBUTIONKEYS.KEY";

const PASSCODE_QUERY: &str = "
    SELECT DATE(DAYSSINCE1970 * 86400, 'unixepoch'), KEY, VALUE
    FROM SCALARS
    WHERE KEY LIKE 'com.apple.passcode.passcodetype%'
    ORDER BY DAYSSINCE1970";

/// Distribution counters from the aggregate dictionary
#[derive(Debug, Default)]
pub struct AggDict;

impl Artifact for AggDict {
    fn info(&self) -> ArtifactInfo {
        ArtifactInfo::new("Aggregate Dictionary Distributed Keys", "Aggregate Dictionary")
            .description("Daily usage counters kept by the aggregate dictionary")
            .headers(&[
                "Day",
                "Key",
                "Value",
                "Seconds in Day Offset",
                "Distribution Values Table ID",
            ])
    }

    fn patterns(&self) -> &'static [&'static str] {
        PATTERNS
    }

    fn process(&mut self, ctx: &mut ArtifactContext<'_>) -> Result<Vec<Row>> {
        let found = ctx.found()?;
        let mut rows = Vec::new();
        for handle in found.iter() {
            rows.extend(query_rows(database(handle)?, DISTRIBUTION_QUERY)?);
        }
        Ok(rows)
    }
}

/// Passcode type history from the aggregate dictionary scalars
#[derive(Debug, Default)]
pub struct AggDictPasscodeType;

impl Artifact for AggDictPasscodeType {
    fn info(&self) -> ArtifactInfo {
        ArtifactInfo::new("Aggregate Dictionary Passcode Type", "Aggregate Dictionary")
            .description("Passcode type recorded per day")
            .headers(&["Day", "Key", "Value"])
    }

    fn patterns(&self) -> &'static [&'static str] {
        PATTERNS
    }

    fn process(&mut self, ctx: &mut ArtifactContext<'_>) -> Result<Vec<Row>> {
        let found = ctx.found()?;
        let mut rows = Vec::new();
        for handle in found.iter() {
            rows.extend(query_rows(database(handle)?, PASSCODE_QUERY)?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ios::run_over;
    use rusqlite::Connection;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn build_store() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("root/private/var/mobile/Library/AggregateDictionary");
        fs::create_dir_all(&folder).unwrap();
        let db = Connection::open(folder.join("ADDataStore.sqlitedb")).unwrap();
        db.execute_batch(
            "CREATE TABLE SCALARS (KEY TEXT, DAYSSINCE1970 INTEGER, VALUE INTEGER);
             CREATE TABLE DISTRIBUTIONKEYS (ROWID INTEGER PRIMARY KEY, KEY TEXT, DAYSSINCE1970 INTEGER);
             CREATE TABLE DISTRIBUTIONVALUES (ROWID INTEGER PRIMARY KEY, DISTRIBUTIONID INTEGER,
                 VALUE INTEGER, SECONDSINDAYOFFSET INTEGER);
             INSERT INTO SCALARS VALUES ('com.apple.passcode.PasscodeType', 18628, 1);
             INSERT INTO SCALARS VALUES ('com.apple.springboard.unlock', 18628, 40);
             INSERT INTO DISTRIBUTIONKEYS VALUES (1, 'com.apple.battery.cycles', 18628);
             INSERT INTO DISTRIBUTIONVALUES VALUES (1, 1, 7, 3600);",
        )
        .unwrap();
        temp_dir
    }

    #[test]
    fn test_distribution_keys() {
        let temp_dir = build_store();
        let descriptor = run_over(temp_dir.path(), Box::new(AggDict));
        assert!(descriptor.processed(), "{:?}", descriptor.error());
        assert_eq!(
            descriptor.rows(),
            &[vec![
                json!("2021-01-01"),
                json!("com.apple.battery.cycles"),
                json!(7),
                json!(3600),
                json!(1)
            ]]
        );
    }

    #[test]
    fn test_passcode_type_filters_scalars() {
        let temp_dir = build_store();
        let descriptor = run_over(temp_dir.path(), Box::new(AggDictPasscodeType));
        assert!(descriptor.processed(), "{:?}", descriptor.error());
        assert_eq!(descriptor.rows().len(), 1);
        assert_eq!(descriptor.rows()[0][1], json!("com.apple.passcode.PasscodeType"));
    }
}
