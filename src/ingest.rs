//! Upload boundary: file bytes in, validated [`Dataset`] out.
//!
//! Ingestion is all-or-nothing. Every failure is reported as one
//! [`IngestError`] and no partial dataset escapes; callers that hold a
//! previous dataset keep it (see [`crate::session`]).

use std::{fs, path::Path};

use encoding_rs::{Encoding, UTF_8};
use itertools::Itertools;
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    data::{Cell, Dataset, Row},
    io_utils::{self, DEFAULT_CSV_DELIMITER, RawTable, SourceFormat},
    schema::{Schema, ValidationReport, ValidationStatus},
    text,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported file type for '{file_name}': expected a .csv or .xlsx file")]
    UnsupportedFileType { file_name: String },
    #[error("Failed to parse '{file_name}': {reason}")]
    ParseFailure { file_name: String, reason: String },
    #[error("'{file_name}' is missing required column(s) for {view}: {}", missing.join(", "))]
    MissingRequiredColumns {
        file_name: String,
        view: String,
        missing: Vec<String>,
    },
    #[error("Reading '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
        }
    }
}

/// A successfully ingested upload and the validation outcome it passed with.
#[derive(Debug)]
pub struct Ingested {
    pub dataset: Dataset,
    pub report: ValidationReport,
}

impl Ingested {
    pub fn warnings(&self) -> Vec<String> {
        if self.report.status == ValidationStatus::SoftWarn {
            vec![format!(
                "Missing column(s) treated as empty: {}",
                self.report.missing.join(", ")
            )]
        } else {
            Vec::new()
        }
    }
}

pub fn ingest_path(
    path: &Path,
    schema: &Schema,
    options: &IngestOptions,
) -> Result<Ingested, IngestError> {
    let file_name = path.display().to_string();
    if io_utils::detect_format(&file_name).is_none() {
        return Err(IngestError::UnsupportedFileType { file_name });
    }
    let bytes = fs::read(path).map_err(|source| IngestError::Io {
        path: file_name.clone(),
        source,
    })?;
    ingest_bytes(&bytes, &file_name, schema, options)
}

pub fn ingest_bytes(
    bytes: &[u8],
    file_name: &str,
    schema: &Schema,
    options: &IngestOptions,
) -> Result<Ingested, IngestError> {
    let format =
        io_utils::detect_format(file_name).ok_or_else(|| IngestError::UnsupportedFileType {
            file_name: file_name.to_string(),
        })?;
    let parse_failure = |err: anyhow::Error| IngestError::ParseFailure {
        file_name: file_name.to_string(),
        reason: format!("{err:#}"),
    };

    let table = match format {
        SourceFormat::Csv => {
            // Gate on the header row before touching any record.
            let raw_headers =
                io_utils::read_csv_headers(bytes, options.delimiter, options.encoding)
                    .map_err(parse_failure)?;
            check_headers(schema, &raw_headers, file_name)?;
            io_utils::read_csv_table(bytes, options.delimiter, options.encoding)
                .map_err(parse_failure)?
        }
        SourceFormat::Xlsx => io_utils::read_xlsx_table(bytes).map_err(parse_failure)?,
    };

    let report = check_headers(schema, &table.headers, file_name)?;
    let dataset = build_dataset(file_name, schema, table);
    info!(
        "Ingested {} row(s) across {} column(s) from '{}' for {}",
        dataset.len(),
        dataset.headers().len(),
        file_name,
        schema.name()
    );
    Ok(Ingested { dataset, report })
}

fn check_headers(
    schema: &Schema,
    raw_headers: &[String],
    file_name: &str,
) -> Result<ValidationReport, IngestError> {
    let canonical = canonical_headers(schema, raw_headers);
    let report = schema.validate(&canonical);
    match report.status {
        ValidationStatus::HardFail => Err(IngestError::MissingRequiredColumns {
            file_name: file_name.to_string(),
            view: schema.name().to_string(),
            missing: report.missing,
        }),
        ValidationStatus::SoftWarn => {
            warn!(
                "'{}' lacks column(s) {} for {}; their aggregates will read as zero",
                file_name,
                report.missing.iter().map(|m| format!("'{m}'")).join(", "),
                schema.name()
            );
            Ok(report)
        }
        ValidationStatus::Ok => Ok(report),
    }
}

/// Distinct canonical names of the non-blank headers, in file order.
pub fn canonical_headers(schema: &Schema, raw_headers: &[String]) -> Vec<String> {
    raw_headers
        .iter()
        .map(|raw| schema.resolve(raw))
        .filter(|name| !name.is_empty())
        .unique()
        .collect()
}

fn build_dataset(file_name: &str, schema: &Schema, table: RawTable) -> Dataset {
    let keys: Vec<Option<String>> = table
        .headers
        .iter()
        .map(|raw| Some(schema.resolve(raw)).filter(|name| !name.is_empty()))
        .collect();
    let skipped = keys.iter().filter(|key| key.is_none()).count();
    if skipped > 0 {
        debug!("Dropping {skipped} column(s) with blank headers from '{file_name}'");
    }

    let mut rows = Vec::with_capacity(table.records.len());
    for record in table.records {
        let mut row = Row::new();
        let mut cells = record.into_iter();
        for key in &keys {
            let cell = cells.next().map(normalize_cell).unwrap_or_default();
            if let Some(key) = key {
                row.insert(key.as_str(), cell);
            }
        }
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }
    Dataset::new(file_name, canonical_headers(schema, &table.headers), rows)
}

fn normalize_cell(cell: Cell) -> Cell {
    match cell {
        Cell::Text(value) => Cell::text(text::normalize(&value)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValidationMode;

    fn schema(mode: ValidationMode) -> Schema {
        Schema::new("department summary", mode, ["Dept", "Total"])
            .with_aliases("Dept", ["Department"])
            .with_aliases("Register Number", ["Reg Number"])
    }

    #[test]
    fn unsupported_extension_is_rejected_before_parsing() {
        let err = ingest_bytes(
            b"Dept\nCSE\n",
            "data.txt",
            &schema(ValidationMode::Strict),
            &IngestOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType { .. }));
    }

    #[test]
    fn strict_schema_rejects_missing_columns() {
        let err = ingest_bytes(
            b"Department\nCSE\n",
            "data.csv",
            &schema(ValidationMode::Strict),
            &IngestOptions::default(),
        )
        .unwrap_err();
        match err {
            IngestError::MissingRequiredColumns { missing, .. } => {
                assert_eq!(missing, vec!["Total".to_string()])
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn lenient_schema_keeps_rows_and_warns() {
        let ingested = ingest_bytes(
            b"Department\nCSE\nECE\n",
            "data.csv",
            &schema(ValidationMode::Lenient),
            &IngestOptions::default(),
        )
        .expect("lenient ingest");
        assert_eq!(ingested.report.status, ValidationStatus::SoftWarn);
        assert_eq!(ingested.dataset.len(), 2);
        assert_eq!(ingested.warnings().len(), 1);
        assert_eq!(ingested.dataset.rows()[0].number("Total"), 0.0);
    }

    #[test]
    fn aliased_columns_share_one_key() {
        let bytes = "Dept,Total,Reg Number,Register Number\n CSE ,10,,21CS01\n\u{00A0},,,\n";
        let ingested = ingest_bytes(
            bytes.as_bytes(),
            "data.csv",
            &schema(ValidationMode::Strict),
            &IngestOptions::default(),
        )
        .expect("ingest");
        let dataset = ingested.dataset;
        assert_eq!(dataset.headers(), ["Dept", "Total", "Register Number"]);
        assert_eq!(dataset.len(), 1, "blank rows are skipped");
        let row = &dataset.rows()[0];
        assert_eq!(row.string("Dept"), "CSE");
        assert_eq!(row.string("Register Number"), "21CS01");
    }

    #[test]
    fn malformed_workbook_is_a_parse_failure() {
        let err = ingest_bytes(
            b"PK\x03\x04 not really",
            "data.xlsx",
            &schema(ValidationMode::Lenient),
            &IngestOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::ParseFailure { .. }));
    }
}
