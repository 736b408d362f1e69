//! Reading uploads and writing exports.
//!
//! Delimited text and the first worksheet of a workbook both parse into a
//! [`ParsedSheet`]: the header row as written plus one [`Row`] per data line.
//! Header names are trimmed; blank headers are kept in `headers` (so they can
//! be reported) but never become row fields.

use std::{collections::HashSet, path::Path};

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use log::{debug, warn};
use rust_xlsxwriter::{Format, Workbook};

use crate::{
    io_utils::{self, FileFormat},
    row::Row,
};

#[derive(Debug, Clone, Default)]
pub struct SheetOptions {
    pub delimiter: Option<u8>,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl ParsedSheet {
    pub fn from_records<I>(headers: Vec<String>, records: I) -> Self
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let headers = dedupe_headers(headers);
        let rows = records
            .into_iter()
            .map(|values| {
                Row::from_pairs(
                    headers
                        .iter()
                        .cloned()
                        .zip(values.into_iter().chain(std::iter::repeat(String::new()))),
                )
            })
            .collect();
        Self { headers, rows }
    }

    /// Header names that are not blank.
    pub fn named_headers(&self) -> Vec<&str> {
        self.headers
            .iter()
            .map(String::as_str)
            .filter(|h| !h.is_empty())
            .collect()
    }

    /// No usable header, or no row with any value.
    pub fn is_unusable(&self) -> bool {
        self.named_headers().is_empty() || self.rows.iter().all(Row::is_empty)
    }

    /// Drops rows with no non-blank value; returns how many were dropped.
    pub fn drop_empty_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row.is_empty());
        before - self.rows.len()
    }
}

/// Renames repeated headers to `name_1`, `name_2`, ... so no column shadows
/// another. Blank headers are left alone.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut used = headers.iter().cloned().collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    headers
        .into_iter()
        .map(|header| {
            if header.is_empty() || seen.insert(header.clone()) {
                return header;
            }
            let mut suffix = 1;
            let renamed = loop {
                let candidate = format!("{header}_{suffix}");
                if used.insert(candidate.clone()) {
                    break candidate;
                }
                suffix += 1;
            };
            warn!("Duplicate header '{header}' renamed to '{renamed}'");
            seen.insert(renamed.clone());
            renamed
        })
        .collect()
}

pub fn read_sheet(path: &Path, options: &SheetOptions) -> Result<ParsedSheet> {
    let sheet = match io_utils::detect_format(path) {
        FileFormat::Workbook => read_workbook(path)?,
        FileFormat::Delimited => read_delimited(path, options)?,
    };
    debug!(
        "Parsed {:?}: {} header(s), {} row(s)",
        path,
        sheet.headers.len(),
        sheet.rows.len()
    );
    Ok(sheet)
}

fn read_delimited(path: &Path, options: &SheetOptions) -> Result<ParsedSheet> {
    let encoding = io_utils::resolve_encoding(options.encoding.as_deref())?;
    let bytes = io_utils::read_input_bytes(path)?;
    let text = io_utils::decode_bytes(&bytes, encoding)
        .with_context(|| format!("Decoding {path:?}"))?;
    let header_line = text.lines().next().unwrap_or_default();
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter, header_line);

    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter);
    let headers = reader
        .headers()
        .with_context(|| format!("Reading headers from {path:?}"))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();
    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    Ok(ParsedSheet::from_records(headers, records))
}

fn read_workbook(path: &Path) -> Result<ParsedSheet> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| anyhow!("Failed to open workbook {path:?}: {e}"))?;
    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Ok(ParsedSheet::default());
    };
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| anyhow!("Failed to read worksheet '{first}': {e}"))?;

    let mut lines = range
        .rows()
        .map(|cells| cells.iter().map(cell_text).collect::<Vec<_>>());
    let Some(header_row) = lines.next() else {
        return Ok(ParsedSheet::default());
    };
    let headers = header_row
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();
    Ok(ParsedSheet::from_records(headers, lines))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(d) => match d.as_datetime() {
            Some(dt) if dt.time() == chrono::NaiveTime::MIN => dt.format("%Y-%m-%d").to_string(),
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format_number(d.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERROR {e:?}"),
    }
}

/// Whole floats print without a fractional part, as spreadsheets show them.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn write_csv(
    path: Option<&Path>,
    columns: &[String],
    rows: &[Row],
    encoding: Option<&str>,
) -> Result<()> {
    let encoding = io_utils::resolve_encoding(encoding)?;
    let delimiter = io_utils::resolve_output_delimiter(path, None);
    let mut writer = io_utils::open_csv_writer(path, delimiter, encoding)?;
    writer.write_record(columns).context("Writing header row")?;
    for row in rows {
        writer
            .write_record(columns.iter().map(|c| row.get(c).unwrap_or_default()))
            .context("Writing data row")?;
    }
    writer.flush().context("Flushing output")?;
    Ok(())
}

pub fn write_xlsx(path: &Path, sheet_name: &str, columns: &[String], rows: &[Row]) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name)
        .map_err(|e| anyhow!("Invalid worksheet name '{sheet_name}': {e}"))?;

    for (col, name) in columns.iter().enumerate() {
        let col = u16::try_from(col).context("Too many columns for a worksheet")?;
        worksheet
            .write_string_with_format(0, col, name, &bold)
            .map_err(|e| anyhow!("Writing header '{name}': {e}"))?;
    }
    for (idx, row) in rows.iter().enumerate() {
        let line = u32::try_from(idx + 1).context("Too many rows for a worksheet")?;
        for (col, name) in columns.iter().enumerate() {
            let col = u16::try_from(col).context("Too many columns for a worksheet")?;
            let value = row.get(name).unwrap_or_default();
            if !value.is_empty() {
                worksheet
                    .write_string(line, col, value)
                    .map_err(|e| anyhow!("Writing cell {line}:{col}: {e}"))?;
            }
        }
    }
    workbook
        .save(path)
        .map_err(|e| anyhow!("Saving workbook {path:?}: {e}"))?;
    Ok(())
}
