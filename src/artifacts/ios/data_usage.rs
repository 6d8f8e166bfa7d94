use anyhow::Result;

use crate::artifacts::artifact::{Artifact, ArtifactContext, ArtifactInfo, Row};
use crate::artifacts::ios::{database, query_rows, COCOA_EPOCH_OFFSET};

/// Processes that used the network, from the wireless data usage database
#[derive(Debug, Default)]
pub struct DataUsageProcess;

impl Artifact for DataUsageProcess {
    fn info(&self) -> ArtifactInfo {
        ArtifactInfo::new("Data Usage Process", "Data Usage")
            .description("Processes and bundles that used cellular or wifi data")
            .headers(&[
                "Process Timestamp",
                "Process First Timestamp",
                "Process Name",
                "Bundle ID",
                "Table ID",
            ])
            .timeline()
    }

    fn patterns(&self) -> &'static [&'static str] {
        &["**/wireless/Library/Databases/DataUsage.sqlite", "**/DataUsage.sqlite"]
    }

    fn process(&mut self, ctx: &mut ArtifactContext<'_>) -> Result<Vec<Row>> {
        let query = format!(
            "SELECT
                DATETIME(ZPROCESS.ZTIMESTAMP + {offset}, 'unixepoch'),
                DATETIME(ZPROCESS.ZFIRSTTIMESTAMP + {offset}, 'unixepoch'),
                ZPROCESS.ZPROCNAME,
                ZPROCESS.ZBUNDLENAME,
                ZPROCESS.Z_PK
            FROM ZPROCESS
            ORDER BY ZPROCESS.ZTIMESTAMP",
            offset = COCOA_EPOCH_OFFSET
        );

        let found = ctx.found()?;
        let mut rows = Vec::new();
        for handle in found.iter() {
            rows.extend(query_rows(database(handle)?, &query)?);
        }
        Ok(rows)
    }
}
