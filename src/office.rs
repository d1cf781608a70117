use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Result, SurveyError};
use crate::table::CellValue;

/// Read one worksheet of an `.xlsx` file as raw rows (header row included).
/// Without a sheet name the first sheet of the workbook is used.
pub fn read_xlsx_rows(p: &Path, sheet: Option<&str>) -> Result<Vec<Vec<CellValue>>> {
    let file = File::open(p)?;
    let mut zip = ZipArchive::new(file)?;

    let shared = match read_member(&mut zip, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_path = resolve_sheet_path(&mut zip, sheet)?;
    let xml = read_member(&mut zip, &sheet_path)?
        .ok_or_else(|| SurveyError::Xlsx(format!("Missing {sheet_path}")))?;
    parse_sheet_xml(&xml, &shared)
}

/// Worksheet names in workbook order.
pub fn sheet_names(p: &Path) -> Result<Vec<String>> {
    let file = File::open(p)?;
    let mut zip = ZipArchive::new(file)?;
    let xml = read_member(&mut zip, "xl/workbook.xml")?
        .ok_or_else(|| SurveyError::Xlsx("Missing xl/workbook.xml".to_string()))?;
    Ok(parse_workbook_xml(&xml)?
        .into_iter()
        .map(|(name, _)| name)
        .collect())
}

// ---- Internal helpers ----

fn read_member<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let mut member = match zip.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    member
        .read_to_string(&mut xml)
        .map_err(|e| SurveyError::Xlsx(format!("Read {name} failed: {e}")))?;
    Ok(Some(xml))
}

fn resolve_sheet_path<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    sheet: Option<&str>,
) -> Result<String> {
    let fallback = "xl/worksheets/sheet1.xml".to_string();
    let Some(workbook) = read_member(zip, "xl/workbook.xml")? else {
        return match sheet {
            Some(name) => Err(SurveyError::Xlsx(format!("Sheet '{name}' not found"))),
            None => Ok(fallback),
        };
    };
    let sheets = parse_workbook_xml(&workbook)?;
    let chosen = match sheet {
        Some(name) => sheets
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| SurveyError::Xlsx(format!("Sheet '{name}' not found")))?,
        None => match sheets.first() {
            Some(first) => first,
            None => return Ok(fallback),
        },
    };

    let rels = match read_member(zip, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => parse_rels_xml(&xml)?,
        None => HashMap::new(),
    };
    match rels.get(&chosen.1) {
        Some(target) => Ok(match target.strip_prefix('/') {
            Some(abs) => abs.to_string(),
            None => format!("xl/{target}"),
        }),
        None if sheet.is_none() => Ok(fallback),
        None => Err(SurveyError::Xlsx(format!(
            "No relationship for sheet '{}'",
            chosen.0
        ))),
    }
}

/// `(sheet name, relationship id)` pairs.
fn parse_workbook_xml(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"sheet" {
                    let name = attr_value(&e, b"name")?.unwrap_or_default();
                    let rid = attr_value(&e, b"id")?.unwrap_or_default();
                    out.push((name, rid));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SurveyError::Xlsx(format!("Parse workbook.xml failed: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn parse_rels_xml(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"Relationship" {
                    if let (Some(id), Some(target)) =
                        (attr_value(&e, b"Id")?, attr_value(&e, b"Target")?)
                    {
                        out.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SurveyError::Xlsx(format!("Parse workbook rels failed: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // phonetic runs repeat the reading of the string, not its value
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"si" => current.clear(),
                b"t" if !in_phonetic => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"si" => out.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"si" {
                    out.push(String::new());
                }
            }
            Ok(Event::Text(t)) if in_text => push_text(&mut current, &t)?,
            Ok(Event::CData(t)) if in_text => push_raw(&mut current, &t)?,
            Ok(Event::GeneralRef(r)) if in_text => push_entity(&mut current, &r)?,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SurveyError::Xlsx(format!(
                    "Parse sharedStrings.xml failed: {e}"
                )));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

struct PendingCell {
    col: usize,
    kind: String,
    value: String,
}

fn parse_sheet_xml(xml: &str, shared: &[String]) -> Result<Vec<Vec<CellValue>>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    let mut row_idx: usize = 0;
    let mut next_col: usize = 0;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"row" => {
                    row_idx = row_number(&e)?.unwrap_or(rows.len() + 1);
                    next_col = 0;
                    ensure_row(&mut rows, row_idx);
                }
                b"c" => {
                    let col = cell_column(&e)?.unwrap_or(next_col);
                    next_col = col + 1;
                    let kind = attr_value(&e, b"t")?.unwrap_or_else(|| "n".to_string());
                    cell = Some(PendingCell {
                        col,
                        kind,
                        value: String::new(),
                    });
                }
                b"v" | b"t" if cell.is_some() => in_value = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"row" => {
                    row_idx = row_number(&e)?.unwrap_or(rows.len() + 1);
                    ensure_row(&mut rows, row_idx);
                }
                b"c" => {
                    let col = cell_column(&e)?.unwrap_or(next_col);
                    next_col = col + 1;
                }
                _ => {}
            },
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(done) = cell.take() {
                        let value = convert_cell(&done, shared)?;
                        if row_idx > 0 {
                            let row = &mut rows[row_idx - 1];
                            if row.len() <= done.col {
                                row.resize(done.col + 1, CellValue::Empty);
                            }
                            row[done.col] = value;
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_value => {
                if let Some(c) = cell.as_mut() {
                    push_text(&mut c.value, &t)?;
                }
            }
            Ok(Event::GeneralRef(r)) if in_value => {
                if let Some(c) = cell.as_mut() {
                    push_entity(&mut c.value, &r)?;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SurveyError::Xlsx(format!("Parse worksheet XML failed: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn convert_cell(cell: &PendingCell, shared: &[String]) -> Result<CellValue> {
    let raw = cell.value.as_str();
    let value = match cell.kind.as_str() {
        "s" => {
            let idx: usize = raw
                .trim()
                .parse()
                .map_err(|_| SurveyError::Xlsx(format!("Bad shared string index '{raw}'")))?;
            let s = shared
                .get(idx)
                .ok_or_else(|| SurveyError::Xlsx(format!("Shared string {idx} out of range")))?;
            text_or_empty(s)
        }
        "str" | "inlineStr" | "d" => text_or_empty(raw),
        "b" => CellValue::Bool(raw.trim() == "1"),
        "e" => CellValue::Empty,
        _ => match raw.trim() {
            "" => CellValue::Empty,
            n => n
                .parse::<f64>()
                .map(CellValue::Number)
                .map_err(|_| SurveyError::Xlsx(format!("Bad numeric cell '{n}'")))?,
        },
    };
    Ok(value)
}

fn text_or_empty(s: &str) -> CellValue {
    if s.is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(s.to_string())
    }
}

fn ensure_row(rows: &mut Vec<Vec<CellValue>>, row_idx: usize) {
    while rows.len() < row_idx {
        rows.push(Vec::new());
    }
}

fn row_number(e: &BytesStart) -> Result<Option<usize>> {
    Ok(attr_value(e, b"r")?.and_then(|r| r.parse::<usize>().ok()))
}

fn cell_column(e: &BytesStart) -> Result<Option<usize>> {
    Ok(attr_value(e, b"r")?.and_then(|r| column_index(&r)))
}

/// Zero-based column index of an A1 reference ("C7" -> 2).
pub(crate) fn column_index(reference: &str) -> Option<usize> {
    let mut col = 0usize;
    let mut seen = false;
    for ch in reference.chars() {
        if ch.is_ascii_alphabetic() {
            col = col * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1);
            seen = true;
        } else {
            break;
        }
    }
    if seen { Some(col - 1) } else { None }
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SurveyError::Xlsx(format!("Bad XML attribute: {e}")))?;
        if local_name(attr.key.as_ref()) == key {
            let raw = std::str::from_utf8(&attr.value)
                .map_err(|e| SurveyError::Xlsx(format!("Attribute is not UTF-8: {e}")))?;
            let value = unescape(raw)
                .map_err(|e| SurveyError::Xlsx(format!("Bad XML escape: {e}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn push_text(out: &mut String, bytes: &[u8]) -> Result<()> {
    let raw = std::str::from_utf8(bytes)
        .map_err(|e| SurveyError::Xlsx(format!("Text is not UTF-8: {e}")))?;
    let text = unescape(raw).map_err(|e| SurveyError::Xlsx(format!("Bad XML escape: {e}")))?;
    out.push_str(&text);
    Ok(())
}

fn push_raw(out: &mut String, bytes: &[u8]) -> Result<()> {
    let raw = std::str::from_utf8(bytes)
        .map_err(|e| SurveyError::Xlsx(format!("Text is not UTF-8: {e}")))?;
    out.push_str(raw);
    Ok(())
}

fn push_entity(out: &mut String, name: &[u8]) -> Result<()> {
    let name = std::str::from_utf8(name)
        .map_err(|e| SurveyError::Xlsx(format!("Entity is not UTF-8: {e}")))?;
    match resolve_entity(name) {
        Some(ch) => out.push(ch),
        None => {
            out.push('&');
            out.push_str(name);
            out.push(';');
        }
    }
    Ok(())
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("C7"), Some(2));
        assert_eq!(column_index("AA10"), Some(26));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn shared_strings_with_runs_and_phonetics() {
        let xml = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
            <si><t>plain</t></si>
            <si><r><t>rich </t></r><r><t>text</t></r><rPh><t>ignored</t></rPh></si>
            <si><t>a &amp; b</t></si>
        </sst>"#;
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["plain", "rich text", "a & b"]);
    }

    #[test]
    fn sheet_cells_by_reference() {
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>Q2</t></is></c></row>
            <row r="3"><c r="B3"><v>1</v></c><c r="C3" t="b"><v>1</v></c></row>
        </sheetData></worksheet>"#;
        let shared = vec!["Q1".to_string()];
        let rows = parse_sheet_xml(xml, &shared).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], CellValue::Text("Q1".into()));
        assert_eq!(rows[0][2], CellValue::Text("Q2".into()));
        assert!(rows[1].is_empty());
        assert_eq!(rows[2][1], CellValue::Number(1.0));
        assert_eq!(rows[2][2], CellValue::Bool(true));
    }

    #[test]
    fn formulas_are_not_values() {
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1"><f>1+1</f><v>2</v></c></row>
        </sheetData></worksheet>"#;
        let rows = parse_sheet_xml(xml, &[]).unwrap();
        assert_eq!(rows[0][0], CellValue::Number(2.0));
    }

    #[test]
    fn workbook_sheets_in_order() {
        let xml = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
            <sheets><sheet name="Data" sheetId="1" r:id="rId3"/><sheet name="Other" sheetId="2" r:id="rId1"/></sheets>
        </workbook>"#;
        let sheets = parse_workbook_xml(xml).unwrap();
        assert_eq!(
            sheets,
            vec![
                ("Data".to_string(), "rId3".to_string()),
                ("Other".to_string(), "rId1".to_string())
            ]
        );
    }
}
