//! Byte-level readers for uploaded spreadsheets and the CSV export writer.
//!
//! - **Format detection**: by file extension only (`.csv`, `.xlsx`).
//! - **CSV**: parsed with the `csv` crate; fields are decoded through
//!   `encoding_rs` (UTF-8 by default, BOM stripped) and rows may be ragged.
//! - **XLSX**: first worksheet via `calamine`; numeric cells stay numeric,
//!   dates are rendered as ISO text.
//! - **Export**: filtered rows are written with `QuoteStyle::Always` to a
//!   file or stdout (`-`).
//!
//! Nothing here knows about schemas. Every reader returns a [`RawTable`] of
//! un-normalized headers and cells.

use std::{
    fs::File,
    io::{BufWriter, Cursor, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, Xlsx};
use chrono::Timelike;
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::data::Cell;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Xlsx,
}

/// Lowercased extension of `file_name`, if any.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn detect_format(file_name: &str) -> Option<SourceFormat> {
    match extension_of(file_name)?.as_str() {
        "csv" => Some(SourceFormat::Csv),
        "xlsx" => Some(SourceFormat::Xlsx),
        _ => None,
    }
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Header cells plus data records, exactly as read from the file.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<Cell>>,
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

/// Reads only the header row of a CSV upload.
pub fn read_csv_headers(
    bytes: &[u8],
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<String>> {
    let mut reader = open_csv_reader(bytes, delimiter, true);
    let headers = reader_headers(&mut reader, encoding).context("Reading header row")?;
    ensure_header_row(&headers)?;
    Ok(headers)
}

pub fn read_csv_table(
    bytes: &[u8],
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<RawTable> {
    let mut reader = open_csv_reader(bytes, delimiter, true);
    let headers = reader_headers(&mut reader, encoding).context("Reading header row")?;
    ensure_header_row(&headers)?;

    let mut records = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        records.push(decoded.into_iter().map(Cell::text).collect());
    }
    debug!("Read {} CSV record(s)", records.len());
    Ok(RawTable { headers, records })
}

pub fn read_xlsx_table(bytes: &[u8]) -> Result<RawTable> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).map_err(|err| anyhow!("Opening workbook: {err}"))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("Workbook contains no worksheets"))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|err| anyhow!("Reading worksheet '{sheet_name}': {err}"))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|cell| xlsx_cell(cell).to_string()).collect())
        .unwrap_or_default();
    ensure_header_row(&headers)?;

    let records: Vec<Vec<Cell>> = rows
        .map(|row| row.iter().map(xlsx_cell).collect())
        .collect();
    debug!(
        "Read {} record(s) from worksheet '{}'",
        records.len(),
        sheet_name
    );
    Ok(RawTable { headers, records })
}

fn ensure_header_row(headers: &[String]) -> Result<()> {
    if headers.iter().all(|h| h.trim().is_empty()) {
        bail!("File has no header row");
    }
    Ok(())
}

fn xlsx_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if value.num_seconds_from_midnight() == 0 => {
                Cell::Text(value.format("%Y-%m-%d").to_string())
            }
            Some(value) => Cell::Text(value.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.clone()),
        Data::Error(err) => {
            debug!("Treating spreadsheet error cell {err:?} as empty");
            Cell::Empty
        }
    }
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}
