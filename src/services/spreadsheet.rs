//! Spreadsheet decoding
//!
//! Reads the first sheet of an uploaded workbook into ordered rows keyed by
//! the header row. Supports every format calamine can sniff
//! (xlsx, xlsm, xlsb, xls, ods).

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::error::ImportError;
use crate::types::{CellValue, SheetRecord, SheetRow};

/// File extensions accepted for client import
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "xlsb", "ods"];

/// Largest serial Excel can represent (9999-12-31)
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Check a file name against the accepted spreadsheet extensions
pub fn is_spreadsheet_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            SPREADSHEET_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Convert an Excel serial day number (epoch 1899-12-30) to a date-time
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(chrono::Duration::milliseconds(millis))
}

/// Parse workbook bytes on a blocking thread
pub async fn parse_workbook_blocking(bytes: Vec<u8>) -> Result<Vec<SheetRecord>, ImportError> {
    tokio::task::spawn_blocking(move || parse_workbook(&bytes))
        .await
        .map_err(|e| ImportError::Parse(format!("parser task failed: {}", e)))?
}

/// Parse the first sheet of a workbook.
///
/// The first used row is the header. Rows whose cells are all empty are
/// dropped; an empty cell inside a kept row stays as `CellValue::Empty`.
/// Each record carries its 1-based row number in the sheet, so blank rows
/// and leading empty rows do not shift it.
pub fn parse_workbook(bytes: &[u8]) -> Result<Vec<SheetRecord>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ImportError::Parse(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::Parse("Excel file contains no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::Parse(format!("Failed to read sheet '{}': {}", sheet_name, e)))?;

    // 0-based index of the header row within the sheet
    let header_row = range.start().map(|(row, _)| row).unwrap_or(0);

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_cells) => unique_headers(header_cells.iter().map(header_text).collect()),
        None => return Err(ImportError::EmptyFile),
    };

    let mut parsed = Vec::new();
    for (offset, row) in rows.enumerate() {
        let mut cells = SheetRow::with_capacity(headers.len());
        for (idx, header) in headers.iter().enumerate() {
            let value = row.get(idx).map(convert_cell).unwrap_or(CellValue::Empty);
            cells.insert(header.clone(), value);
        }
        if cells.values().all(CellValue::is_empty) {
            continue;
        }
        parsed.push(SheetRecord::new(header_row + offset as u32 + 2, cells));
    }

    if parsed.is_empty() {
        return Err(ImportError::EmptyFile);
    }

    debug!(
        "Parsed sheet '{}': {} columns, {} data rows",
        sheet_name,
        headers.len(),
        parsed.len()
    );
    Ok(parsed)
}

fn header_text(cell: &Data) -> String {
    convert_cell(cell).as_text()
}

/// Blank headers become `__EMPTY`, `__EMPTY_1`, ...; repeats get `_1`, `_2`, ...
fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut used: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(raw.len());

    for header in raw {
        let base = if header.is_empty() { "__EMPTY".to_string() } else { header };
        let counter = counters.entry(base.clone()).or_insert(0);
        let mut name = if *counter == 0 {
            base.clone()
        } else {
            format!("{}_{}", base, counter)
        };
        while used.contains(&name) {
            *counter += 1;
            name = format!("{}_{}", base, counter);
        }
        *counter += 1;
        used.insert(name.clone());
        headers.push(name);
    }

    headers
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(s.clone())
            }
        }
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
            Some(value) => CellValue::Date(value),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso(s)
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

fn parse_iso(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use rust_xlsxwriter::{Format, Workbook};

    fn workbook_bytes(rows: &[&[&str]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    sheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_accepts_spreadsheet_extensions_case_insensitive() {
        assert!(is_spreadsheet_file("clients.xlsx"));
        assert!(is_spreadsheet_file("CLIENTS.XLS"));
        assert!(is_spreadsheet_file("export.ods"));
        assert!(!is_spreadsheet_file("clients.csv"));
        assert!(!is_spreadsheet_file("xlsx"));
    }

    #[test]
    fn test_serial_uses_1899_12_30_epoch() {
        let dt = excel_serial_to_datetime(45366.0).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 3, 15));
        let dt = excel_serial_to_datetime(45000.0).unwrap();
        assert_eq!((dt.month(), dt.day()), (3, 15));
    }

    #[test]
    fn test_serial_rejects_out_of_range() {
        assert!(excel_serial_to_datetime(-1.0).is_none());
        assert!(excel_serial_to_datetime(f64::NAN).is_none());
        assert!(excel_serial_to_datetime(3_000_000.0).is_none());
    }

    #[test]
    fn test_parses_rows_keyed_by_header() {
        let bytes = workbook_bytes(&[
            &["Name", "Phone", "DOB"],
            &["Ann Lee", "0821234567", "2024-03-15"],
            &["Bob Stone", "0831234567", "7/1"],
        ]);
        let rows = parse_workbook(&bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells["Name"], CellValue::Text("Ann Lee".into()));
        assert_eq!(rows[1].cells["DOB"], CellValue::Text("7/1".into()));
        assert_eq!((rows[0].row, rows[1].row), (2, 3));
        let keys: Vec<&String> = rows[0].cells.keys().collect();
        assert_eq!(keys, vec!["Name", "Phone", "DOB"]);
    }

    #[test]
    fn test_numeric_cells_and_blank_rows() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Name").unwrap();
        sheet.write_string(0, 1, "Mobile").unwrap();
        sheet.write_string(1, 0, "Ann").unwrap();
        sheet.write_number(1, 1, 821234567.0).unwrap();
        // Row 3 left blank
        sheet.write_string(3, 0, "Bob").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let rows = parse_workbook(&bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells["Mobile"].as_text(), "821234567");
        assert_eq!(rows[1].cells["Mobile"], CellValue::Empty);
        // Bob keeps his sheet row number past the blank row
        assert_eq!((rows[0].row, rows[1].row), (2, 4));
    }

    #[test]
    fn test_row_numbers_follow_sheet_when_table_starts_lower() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(2, 0, "Name").unwrap();
        sheet.write_string(3, 0, "Ann").unwrap();
        sheet.write_string(5, 0, "Bob").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let rows = parse_workbook(&bytes).unwrap();
        let numbered: Vec<(u32, String)> = rows
            .iter()
            .map(|r| (r.row, r.cells["Name"].as_text()))
            .collect();
        assert_eq!(numbered, vec![(4, "Ann".to_string()), (6, "Bob".to_string())]);
    }

    #[test]
    fn test_date_formatted_cell_reads_as_date_or_serial() {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Birthday").unwrap();
        sheet.write_number_with_format(1, 0, 45366.0, &date_format).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let rows = parse_workbook(&bytes).unwrap();
        match &rows[0].cells["Birthday"] {
            CellValue::Date(dt) => assert_eq!((dt.month(), dt.day()), (3, 15)),
            CellValue::Number(n) => assert_eq!(*n, 45366.0),
            other => panic!("unexpected cell {:?}", other),
        }
    }

    #[test]
    fn test_blank_and_repeated_headers_are_renamed() {
        let headers = unique_headers(vec![
            "Name".into(),
            "".into(),
            "Name".into(),
            "".into(),
            "Name_1".into(),
        ]);
        assert_eq!(headers, vec!["Name", "__EMPTY", "Name_1", "__EMPTY_1", "Name_1_1"]);
    }

    #[test]
    fn test_header_only_sheet_is_empty_file() {
        let bytes = workbook_bytes(&[&["Name", "Phone"]]);
        assert!(matches!(parse_workbook(&bytes), Err(ImportError::EmptyFile)));
    }

    #[test]
    fn test_garbage_bytes_are_parse_error() {
        let result = parse_workbook(b"definitely not a workbook");
        assert!(matches!(result, Err(ImportError::Parse(_))));
    }

    #[tokio::test]
    async fn test_blocking_parse_matches_inline_parse() {
        let bytes = workbook_bytes(&[&["Name"], &["Ann"]]);
        let rows = parse_workbook_blocking(bytes).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
