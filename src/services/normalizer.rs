//! Row normalization
//!
//! Turns a spreadsheet row with arbitrary headers into a `ClientDraft`.
//! Columns are matched to roles by case-insensitive substring; birthdays
//! are reduced to month/day whatever encoding the sheet used.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::services::spreadsheet::excel_serial_to_datetime;
use crate::types::{CellValue, ClientDraft, SheetRow};

/// Why a row was not imported
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("Missing required data (name, phone number, or date of birth)")]
    MissingRequiredData,

    #[error("Missing branch (no branch in row and no default branch selected)")]
    MissingBranch,

    #[error("Branch \"{0}\" does not exist")]
    BranchNotFound(String),

    #[error("Duplicate phone number \"{phone}\" in file (same branch)")]
    DuplicateInFile { phone: String },

    #[error("Phone number \"{phone}\" already exists in database (same branch)")]
    AlreadyExists { phone: String },
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::MissingRequiredData => "missing_required_data",
            SkipReason::MissingBranch => "missing_branch",
            SkipReason::BranchNotFound(_) => "branch_not_found",
            SkipReason::DuplicateInFile { .. } => "duplicate_in_file",
            SkipReason::AlreadyExists { .. } => "already_exists",
        }
    }
}

/// Canonical field a column can feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Name,
    Phone,
    DateOfBirth,
    Branch,
}

/// Role → header substrings (lowercase)
#[derive(Debug, Clone)]
pub struct ColumnRules {
    rules: Vec<(ColumnRole, Vec<String>)>,
}

impl Default for ColumnRules {
    fn default() -> Self {
        Self::new(vec![
            (ColumnRole::Name, vec!["name"]),
            (ColumnRole::Phone, vec!["phone", "mobile"]),
            (ColumnRole::DateOfBirth, vec!["dob", "birth", "date"]),
            (ColumnRole::Branch, vec!["branch"]),
        ])
    }
}

impl ColumnRules {
    pub fn new(rules: Vec<(ColumnRole, Vec<&str>)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(role, keys)| (role, keys.into_iter().map(str::to_lowercase).collect()))
                .collect(),
        }
    }

    /// First column, in row order, whose header contains one of the role's substrings
    pub fn find<'a>(&self, role: ColumnRole, row: &'a SheetRow) -> Option<&'a CellValue> {
        let keys = self
            .rules
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, keys)| keys)?;

        row.iter()
            .find(|(header, _)| {
                let header = header.to_lowercase();
                keys.iter().any(|key| header.contains(key.as_str()))
            })
            .map(|(_, value)| value)
    }
}

pub struct RowNormalizer {
    rules: ColumnRules,
    year: i32,
}

impl RowNormalizer {
    /// Synthetic birth dates use the current local year
    pub fn new(rules: ColumnRules) -> Self {
        Self::with_year(rules, Local::now().year())
    }

    pub fn with_year(rules: ColumnRules, year: i32) -> Self {
        Self { rules, year }
    }

    /// Normalize one row. A non-empty branch cell overrides `default_branch`.
    pub fn normalize(
        &self,
        row: &SheetRow,
        default_branch: Option<&str>,
    ) -> Result<ClientDraft, SkipReason> {
        let name = self.text(ColumnRole::Name, row);
        let phone = self.text(ColumnRole::Phone, row);
        let birthday = self
            .rules
            .find(ColumnRole::DateOfBirth, row)
            .and_then(parse_birthday);

        let (name, phone, (month, day)) = match (name, phone, birthday) {
            (Some(name), Some(phone), Some(birthday)) => (name, phone, birthday),
            _ => return Err(SkipReason::MissingRequiredData),
        };

        let branch = self
            .text(ColumnRole::Branch, row)
            .or_else(|| {
                default_branch
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(str::to_string)
            })
            .ok_or(SkipReason::MissingBranch)?;

        Ok(ClientDraft {
            name,
            phone_number: phone,
            birth_month: month,
            birth_day: day,
            date_of_birth: synthetic_birth_date(self.year, month, day),
            branch,
        })
    }

    /// Name used to label a row in the job summary
    pub fn row_label(&self, row: &SheetRow) -> String {
        self.text(ColumnRole::Name, row)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn text(&self, role: ColumnRole, row: &SheetRow) -> Option<String> {
        self.rules
            .find(role, row)
            .map(CellValue::as_text)
            .filter(|s| !s.is_empty())
    }
}

/// Month/day of a birthday cell
pub fn parse_birthday(cell: &CellValue) -> Option<(u32, u32)> {
    match cell {
        CellValue::Empty => None,
        CellValue::Number(serial) => excel_serial_to_datetime(*serial).map(|dt| (dt.month(), dt.day())),
        CellValue::Date(dt) => Some((dt.month(), dt.day())),
        CellValue::Text(text) => parse_birthday_text(text),
    }
}

/// Month/day from text: ISO date-times, `YYYY-M-D` / `YYYY/M/D`, or bare `M-D` / `M/D`
pub fn parse_birthday_text(text: &str) -> Option<(u32, u32)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(dt) = parse_datetime(text) {
        return Some((dt.month(), dt.day()));
    }

    let groups = first_digit_chain(text);
    let (month, day) = match groups.as_slice() {
        [year, month, day, ..] if year.len() == 4 && short(month) && short(day) => {
            (month.parse().ok()?, day.parse().ok()?)
        }
        [month, day, ..] if short(month) && short(day) => (month.parse().ok()?, day.parse().ok()?),
        _ => return None,
    };

    is_valid_month_day(month, day).then_some((month, day))
}

/// Month/day must exist in some year; Feb 29 counts
pub fn is_valid_month_day(month: u32, day: u32) -> bool {
    NaiveDate::from_ymd_opt(2000, month, day).is_some()
}

/// Display-only date in `year`; Feb 29 falls back to Feb 28 outside leap years
pub fn synthetic_birth_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, month, day.saturating_sub(1)))
        .or_else(|| NaiveDate::from_ymd_opt(year, 1, 1))
        .unwrap_or(NaiveDate::MIN)
}

fn short(group: &str) -> bool {
    (1..=2).contains(&group.len())
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Digit runs of the first `-` / `/` separated chain, e.g. "on 3/15/90" → ["3", "15", "90"]
fn first_digit_chain(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut groups = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            if !groups.is_empty() {
                break;
            }
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        groups.push(&text[start..i]);

        let joined = i + 1 < bytes.len()
            && (bytes[i] == b'-' || bytes[i] == b'/')
            && bytes[i + 1].is_ascii_digit();
        if joined {
            i += 1;
        } else if groups.len() >= 2 {
            break;
        } else {
            groups.clear();
        }
    }

    if groups.len() >= 2 {
        groups
    } else {
        Vec::new()
    }
}
