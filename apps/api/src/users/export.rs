use std::collections::HashSet;
use std::io;

use crate::guide::Catalog;
use crate::users::UserRecord;

const HEADER: [&str; 5] = ["company", "venue", "booth", "status", "note"];

/// One row per catalog company, then any tracked company the catalog no
/// longer lists.
pub fn export_csv(catalog: &Catalog, record: &UserRecord) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    let mut listed: HashSet<&str> = HashSet::new();
    for company in catalog.companies() {
        listed.insert(company.name.as_str());
        let venue = company.venue.to_string();
        writer.write_record([
            company.name.as_str(),
            venue.as_str(),
            company.booth_label.as_str(),
            record.status_of(&company.name).as_str(),
            record.note_of(&company.name),
        ])?;
    }

    for (name, interaction) in &record.interactions {
        if listed.contains(name.as_str()) {
            continue;
        }
        writer.write_record([
            name.as_str(),
            "",
            "",
            interaction.status.as_str(),
            interaction.note.as_str(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| csv::Error::from(io::Error::new(io::ErrorKind::InvalidData, e)))
}
