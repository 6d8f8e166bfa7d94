use anyhow::Result;

use crate::artifacts::artifact::{Artifact, ArtifactContext, ArtifactInfo, Row};
use crate::artifacts::ios::{database, query_rows};

const QUERY: &str = "
    SELECT
        ABPerson.ROWID,
        ABPersonFullTextSearch_content.c16Phone,
        ABPerson.First,
        ABPerson.Middle,
        ABPerson.Last,
        ABPersonFullTextSearch_content.c17Email,
        DATETIME(ABPerson.CreationDate + 978307200, 'unixepoch'),
        DATETIME(ABPerson.ModificationDate + 978307200, 'unixepoch'),
        ABStore.Name
    FROM ABPerson
    LEFT OUTER JOIN ABStore ON ABPerson.StoreID = ABStore.ROWID
    LEFT OUTER JOIN ABPersonFullTextSearch_content
        ON ABPerson.ROWID = ABPersonFullTextSearch_content.ROWID
    ORDER BY ABPerson.ROWID";

/// Contacts from the address book database
#[derive(Debug, Default)]
pub struct AddressBook;

impl Artifact for AddressBook {
    fn info(&self) -> ArtifactInfo {
        ArtifactInfo::new("Address Book Contacts", "Address Book")
            .description("Contact information stored in the Address Book")
            .headers(&[
                "Contact ID",
                "Contact Number",
                "First Name",
                "Middle Name",
                "Last Name",
                "Email Address",
                "Creation Date",
                "Modification Date",
                "Storage Place",
            ])
    }

    fn patterns(&self) -> &'static [&'static str] {
        &["**/AddressBook.sqlitedb"]
    }

    fn process(&mut self, ctx: &mut ArtifactContext<'_>) -> Result<Vec<Row>> {
        let found = ctx.found()?;
        let mut rows = Vec::new();
        for handle in found.iter() {
            let mut contacts = query_rows(database(handle)?, QUERY)?;
            for contact in &mut contacts {
                // c16Phone holds every formatting variant of each number
                if let Some(phones) = contact[1].as_str() {
                    let first = phones.split_whitespace().next().unwrap_or_default().to_string();
                    contact[1] = first.into();
                }
            }
            rows.append(&mut contacts);
        }
        Ok(rows)
    }
}
