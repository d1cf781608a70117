//! In-memory survey table: trimmed header names plus typed cells.
//!
//! Tables are loaded from `.xlsx` (see [`crate::office`]) or `.csv`. Every
//! respondent is one row; every question or multi-select option is one column.

use std::fmt;
use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{Result, SurveyError};
use crate::office;

/// A single cell of survey data.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    /// Infer a typed value from raw text, the way spreadsheet importers do.
    pub fn infer(raw: &str) -> CellValue {
        if raw.is_empty() {
            return CellValue::Empty;
        }
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return CellValue::Number(n);
            }
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return CellValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Bool(false);
        }
        CellValue::Text(raw.to_string())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// True for the "selected" encoding of a multi-select sub-column.
    pub fn is_one(&self) -> bool {
        match self {
            CellValue::Number(n) => *n == 1.0,
            CellValue::Bool(b) => *b,
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            CellValue::Empty => None,
        }
    }

    /// Human-readable rendering; integral numbers print without a fraction.
    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            CellValue::Bool(true) => f.write_str("TRUE"),
            CellValue::Bool(false) => f.write_str("FALSE"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// Inferred kind of a column, used by the data preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Text,
    Boolean,
    Mixed,
    Empty,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::Numeric => "numeric",
            FieldKind::Text => "text",
            FieldKind::Boolean => "boolean",
            FieldKind::Mixed => "mixed",
            FieldKind::Empty => "empty",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct TableSummary {
    pub rows: usize,
    pub columns: usize,
    pub missing: usize,
    pub fields: Vec<(String, FieldKind)>,
}

#[derive(Debug, Clone, Default)]
pub struct SurveyTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SurveyTable {
    /// Build a table from raw rows; the first row is the header.
    pub fn from_rows(mut raw: Vec<Vec<CellValue>>) -> SurveyTable {
        if raw.is_empty() {
            return SurveyTable::default();
        }
        let header_row = raw.remove(0);
        let width = raw
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header_row.len()))
            .max()
            .unwrap_or(0);

        let headers = (0..width)
            .map(|i| {
                let name = header_row
                    .get(i)
                    .map(|c| c.display().trim().to_string())
                    .unwrap_or_default();
                if name.is_empty() {
                    format!("Unnamed: {i}")
                } else {
                    name
                }
            })
            .collect();

        let rows = raw
            .into_iter()
            .map(|mut r| {
                r.resize(width, CellValue::Empty);
                r
            })
            .collect();

        SurveyTable { headers, rows }
    }

    /// Load the first worksheet of an `.xlsx` file or a `.csv` file.
    pub fn load(path: &Path) -> Result<SurveyTable> {
        Self::load_sheet(path, None)
    }

    /// Load a table, optionally choosing a worksheet by name (xlsx only).
    pub fn load_sheet(path: &Path, sheet: Option<&str>) -> Result<SurveyTable> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let table = match ext.as_str() {
            "xlsx" | "xlsm" => SurveyTable::from_rows(office::read_xlsx_rows(path, sheet)?),
            "csv" => SurveyTable::from_csv_bytes(&fs::read(path)?)?,
            other => {
                return Err(SurveyError::UnsupportedFormat(format!(
                    "{} (extension '{other}', expected xlsx or csv)",
                    path.display()
                )));
            }
        };
        debug!(
            "Loaded {} rows x {} columns from {}",
            table.len(),
            table.headers.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse CSV bytes: UTF-8 first, Latin-1 when the bytes are not valid UTF-8.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<SurveyTable> {
        let text = match std::str::from_utf8(bytes) {
            Ok(s) => s.strip_prefix('\u{feff}').unwrap_or(s).to_string(),
            Err(_) => {
                debug!("CSV is not valid UTF-8, decoding as Latin-1");
                bytes.iter().map(|&b| b as char).collect()
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut raw = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let row = record
                .iter()
                .map(|field| {
                    // header cells stay text even when they look numeric
                    if i == 0 {
                        if field.is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::Text(field.to_string())
                        }
                    } else {
                        CellValue::infer(field)
                    }
                })
                .collect();
            raw.push(row);
        }
        Ok(SurveyTable::from_rows(raw))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name)
            .ok_or_else(|| SurveyError::UnknownColumn(name.to_string()))
    }

    pub fn values(&self, idx: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().map(move |r| &r[idx])
    }

    /// Replace the column `name` or append it when absent.
    pub fn set_column(&mut self, name: &str, values: Vec<CellValue>) {
        match self.column(name) {
            Some(idx) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.headers.push(name.trim().to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
    }

    pub fn summary(&self) -> TableSummary {
        let missing = self
            .rows
            .iter()
            .flat_map(|r| r.iter())
            .filter(|c| c.is_missing())
            .count();

        let fields = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), self.field_kind(i)))
            .collect();

        TableSummary {
            rows: self.len(),
            columns: self.headers.len(),
            missing,
            fields,
        }
    }

    fn field_kind(&self, idx: usize) -> FieldKind {
        let mut kind: Option<FieldKind> = None;
        for value in self.values(idx) {
            let k = match value {
                CellValue::Empty => continue,
                CellValue::Number(_) => FieldKind::Numeric,
                CellValue::Bool(_) => FieldKind::Boolean,
                CellValue::Text(_) => FieldKind::Text,
            };
            match kind {
                None => kind = Some(k),
                Some(prev) if prev != k => return FieldKind::Mixed,
                _ => {}
            }
        }
        kind.unwrap_or(FieldKind::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_cell_types() {
        assert_eq!(CellValue::infer(""), CellValue::Empty);
        assert_eq!(CellValue::infer("3"), CellValue::Number(3.0));
        assert_eq!(CellValue::infer(" 2.5 "), CellValue::Number(2.5));
        assert_eq!(CellValue::infer("True"), CellValue::Bool(true));
        assert_eq!(CellValue::infer("abc"), CellValue::Text("abc".into()));
        assert_eq!(CellValue::infer("NaN"), CellValue::Text("NaN".into()));
    }

    #[test]
    fn display_integral_numbers() {
        assert_eq!(CellValue::Number(1.0).display(), "1");
        assert_eq!(CellValue::Number(2.5).display(), "2.5");
        assert_eq!(CellValue::Empty.display(), "");
        assert!(CellValue::Number(1.0).is_one());
        assert!(CellValue::Bool(true).is_one());
        assert!(!CellValue::Text("1".into()).is_one());
    }

    #[test]
    fn csv_headers_are_trimmed_and_named() {
        let t = SurveyTable::from_csv_bytes(b" Q1 ,,Q3\n1,2\n4,5,6\n").unwrap();
        assert_eq!(t.headers, vec!["Q1", "Unnamed: 1", "Q3"]);
        assert_eq!(t.rows[0][2], CellValue::Empty);
        assert_eq!(t.rows[1][2], CellValue::Number(6.0));
    }

    #[test]
    fn csv_latin1_fallback() {
        let bytes = b"name\ncaf\xe9\n";
        let t = SurveyTable::from_csv_bytes(bytes).unwrap();
        assert_eq!(t.rows[0][0], CellValue::Text("caf\u{e9}".into()));
    }

    #[test]
    fn summary_counts_missing_and_kinds() {
        let t = SurveyTable::from_csv_bytes("a,b,c\n1,x,\n2,3,\n".as_bytes()).unwrap();
        let s = t.summary();
        assert_eq!(s.rows, 2);
        assert_eq!(s.columns, 3);
        assert_eq!(s.missing, 2);
        assert_eq!(s.fields[0].1, FieldKind::Numeric);
        assert_eq!(s.fields[1].1, FieldKind::Mixed);
        assert_eq!(s.fields[2].1, FieldKind::Empty);
    }

    #[test]
    fn set_column_appends_and_replaces() {
        let mut t = SurveyTable::from_csv_bytes(b"a\n1\n2\n").unwrap();
        t.set_column("b", vec![CellValue::Number(9.0), CellValue::Empty]);
        assert_eq!(t.headers, vec!["a", "b"]);
        t.set_column("a", vec![CellValue::Empty, CellValue::Empty]);
        assert!(t.rows[0][0].is_missing());
        assert_eq!(t.rows[0][1], CellValue::Number(9.0));
    }

    #[test]
    fn unsupported_extension() {
        let err = SurveyTable::load(Path::new("survey.xls")).unwrap_err();
        assert!(matches!(err, SurveyError::UnsupportedFormat(_)));
    }
}
