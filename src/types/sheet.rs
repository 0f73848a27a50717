//! Spreadsheet row types
//!
//! Rows keep the workbook's own headers until normalization, so they are
//! modelled as an ordered map instead of a fixed struct.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single decoded cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the cell as trimmed text. Integral numbers have no decimal part,
    /// so a phone number stored as a number reads back as its digits.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Date(dt) => dt.format("%Y-%m-%d").to_string(),
        }
    }
}

/// One data row: header → cell, in column order
pub type SheetRow = IndexMap<String, CellValue>;

/// A data row together with its 1-based row number in the sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRecord {
    pub row: u32,
    pub cells: SheetRow,
}

impl SheetRecord {
    pub fn new(row: u32, cells: SheetRow) -> Self {
        Self { row, cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_integral_number_renders_without_decimals() {
        assert_eq!(CellValue::Number(5551234.0).as_text(), "5551234");
        assert_eq!(CellValue::Number(12.5).as_text(), "12.5");
    }

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(CellValue::Text("  Jane Doe ".into()).as_text(), "Jane Doe");
        assert!(CellValue::Text("   ".into()).is_empty());
    }

    #[test]
    fn test_cell_value_serializes_tagged() {
        let date = NaiveDate::from_ymd_opt(1990, 3, 15).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let json = serde_json::to_string(&CellValue::Date(date)).unwrap();
        assert!(json.contains("\"type\":\"date\""));

        let back: CellValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CellValue::Date(date));
    }

    #[test]
    fn test_sheet_row_keeps_column_order() {
        let mut row = SheetRow::new();
        row.insert("Phone".into(), CellValue::Text("555".into()));
        row.insert("Name".into(), CellValue::Text("Ann".into()));

        let json = serde_json::to_string(&row).unwrap();
        let back: SheetRow = serde_json::from_str(&json).unwrap();
        let keys: Vec<&String> = back.keys().collect();
        assert_eq!(keys, vec!["Phone", "Name"]);
    }

    #[test]
    fn test_sheet_record_keeps_row_number() {
        let record = SheetRecord::new(7, SheetRow::from([("Name".to_string(), CellValue::Text("Ann".into()))]));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["row"], 7);
        assert_eq!(json["cells"]["Name"]["value"], "Ann");
    }
}
