/// CSV decode/encode over the shared tabular model. The first record is the
/// header row; row count and column order are preserved through the round
/// trip.
use crate::error::{ServiceError, ServiceResult};

use super::table::Table;

pub fn decode(bytes: &[u8]) -> ServiceResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = match reader.headers() {
        Ok(record) => record.iter().map(|s| s.to_string()).collect(),
        Err(e) => return Err(ServiceError::Validation(format!("CSV parse error: {}", e))),
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| ServiceError::Validation(format!("CSV parse error: {}", e)))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    // An upload with no content at all decodes to an empty table rather
    // than a single empty header row.
    if rows.is_empty() && headers.iter().all(|h| h.is_empty()) {
        return Ok(Table { sheets: Vec::new() });
    }

    Ok(Table::single_sheet(headers, rows))
}

pub fn encode(table: &Table) -> ServiceResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());

    for sheet in &table.sheets {
        if !sheet.headers.is_empty() {
            writer
                .write_record(&sheet.headers)
                .map_err(|e| ServiceError::Validation(format!("CSV write error: {}", e)))?;
        }
        for row in &sheet.rows {
            writer
                .write_record(row)
                .map_err(|e| ServiceError::Validation(format!("CSV write error: {}", e)))?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| ServiceError::Validation(format!("CSV write error: {}", e)))
}
