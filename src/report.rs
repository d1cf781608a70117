//! Styled cross-tab workbook.
//!
//! Sheets:
//! - `交叉分析`: frequency and percentage per column category, data bars
//! - `显著性检验`: raw p-values
//! - `带星号显著性`: p-values with significance stars

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::info;
use rust_xlsxwriter::{
    Color, ConditionalFormatDataBar, ConditionalFormatType, Format, FormatAlign, FormatBorder,
    FormatPattern, Workbook, Worksheet,
};
use unicode_width::UnicodeWidthStr;

use crate::config::{ReportStyle, parse_hex_color};
use crate::crosstab::{CrossTab, CrossTabAnalysis};
use crate::error::{Result, SurveyError};
use crate::stats::SigMarker;

pub const SHEET_CROSSTAB: &str = "交叉分析";
pub const SHEET_P_VALUES: &str = "显著性检验";
pub const SHEET_STARS: &str = "带星号显著性";

const HEAD_QUESTION: &str = "问题";
const HEAD_OPTION: &str = "选项";
const SUFFIX_FREQ: &str = "（频数）";
const SUFFIX_PERCENT: &str = "（百分比）";
const TOTAL_KEYWORDS: [&str; 3] = ["总计", "Total", "合计"];

/// First data column; A and B hold the row labels.
const FIRST_DATA_COL: u16 = 2;

struct Formats {
    header: Format,
    body: Format,
    percent: Format,
    p_value: Format,
    centered: Format,
}

impl Formats {
    fn new(style: &ReportStyle) -> Result<Formats> {
        let body = Format::new()
            .set_font_name(style.body_font_name.as_str())
            .set_border(FormatBorder::Thin)
            .set_text_wrap()
            .set_align(FormatAlign::Top)
            .set_align(FormatAlign::Left);
        let header = Format::new()
            .set_font_name(style.header_font_name.as_str())
            .set_font_size(style.header_font_size)
            .set_bold()
            .set_font_color(Color::RGB(parse_hex_color(&style.header_font_color)?))
            .set_background_color(Color::RGB(parse_hex_color(&style.header_fill_color)?))
            .set_pattern(FormatPattern::Solid)
            .set_border(FormatBorder::Thin)
            .set_text_wrap()
            .set_align(FormatAlign::Top)
            .set_align(FormatAlign::Left);
        let centered = Format::new()
            .set_font_name(style.body_font_name.as_str())
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::Center);
        Ok(Formats {
            percent: body.clone().set_num_format(style.percent_format.as_str()),
            p_value: centered.clone().set_num_format(style.p_value_format.as_str()),
            header,
            body,
            centered,
        })
    }
}

/// Remove a previous output so a fresh workbook can take its place.
pub(crate) fn prepare_output(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Err(SurveyError::OutputLocked(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn write_crosstab_report(
    path: &Path,
    analysis: &CrossTabAnalysis,
    marker: &SigMarker,
    style: &ReportStyle,
) -> Result<()> {
    let formats = Formats::new(style)?;
    prepare_output(path)?;

    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_CROSSTAB)?;
    write_crosstab_sheet(sheet, &analysis.crosstab, style, &formats)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_P_VALUES)?;
    write_significance_sheet(sheet, &analysis.crosstab, style, &formats, |row, col| {
        match analysis.significance.p_values[row][col] {
            Some(p) => SigCell::Number(p),
            None => SigCell::Blank,
        }
    })?;

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_STARS)?;
    write_significance_sheet(sheet, &analysis.crosstab, style, &formats, |row, col| {
        SigCell::Text(marker.mark(analysis.significance.p_values[row][col]))
    })?;

    workbook.save(path)?;
    info!("Cross-tab report written to {}", path.display());
    Ok(())
}

fn write_crosstab_sheet(
    sheet: &mut Worksheet,
    ct: &CrossTab,
    style: &ReportStyle,
    f: &Formats,
) -> Result<()> {
    write_label_header(sheet, f)?;
    let mut headers = Vec::with_capacity(ct.columns.len() * 2);
    for label in &ct.columns {
        headers.push(format!("{label}{SUFFIX_FREQ}"));
        headers.push(format!("{label}{SUFFIX_PERCENT}"));
    }
    for (j, h) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, data_col(j)?, h.as_str(), &f.header)?;
    }

    write_row_labels(sheet, ct, f)?;
    for (i, counts) in ct.counts.iter().enumerate() {
        let row = body_row(i)?;
        for (j, &count) in counts.iter().enumerate() {
            sheet.write_number_with_format(row, data_col(2 * j)?, count as f64, &f.body)?;
            match ct.percent(i, j) {
                Some(p) => {
                    sheet.write_number_with_format(row, data_col(2 * j + 1)?, p, &f.percent)?
                }
                None => sheet.write_blank(row, data_col(2 * j + 1)?, &f.percent)?,
            };
        }
    }

    let freq_bar = data_bar(&style.freq_data_bar_color)?;
    let percent_bar = data_bar(&style.percent_data_bar_color)?;
    for (first, last) in non_total_runs(ct) {
        for j in 0..ct.columns.len() {
            let (r1, r2) = (body_row(first)?, body_row(last)?);
            let (c_freq, c_pct) = (data_col(2 * j)?, data_col(2 * j + 1)?);
            sheet.add_conditional_format(r1, c_freq, r2, c_freq, &freq_bar)?;
            sheet.add_conditional_format(r1, c_pct, r2, c_pct, &percent_bar)?;
        }
    }

    let cells: Vec<Vec<String>> = ct
        .counts
        .iter()
        .enumerate()
        .map(|(i, counts)| {
            (0..counts.len())
                .flat_map(|j| {
                    let pct = ct
                        .percent(i, j)
                        .map(|p| format!("{:.2}%", p * 100.0))
                        .unwrap_or_default();
                    [counts[j].to_string(), pct]
                })
                .collect()
        })
        .collect();
    apply_layout(sheet, ct.rows.len(), &headers, &cells, style)?;
    sheet.set_freeze_panes(1, FIRST_DATA_COL)?;
    sheet.set_screen_gridlines(false);
    Ok(())
}

enum SigCell {
    Number(f64),
    Text(String),
    Blank,
}

fn write_significance_sheet<F>(
    sheet: &mut Worksheet,
    ct: &CrossTab,
    style: &ReportStyle,
    f: &Formats,
    cell: F,
) -> Result<()>
where
    F: Fn(usize, usize) -> SigCell,
{
    write_label_header(sheet, f)?;
    for (j, label) in ct.columns.iter().enumerate() {
        sheet.write_string_with_format(0, data_col(j)?, label.as_str(), &f.header)?;
    }
    write_row_labels(sheet, ct, f)?;

    let mut texts = Vec::with_capacity(ct.rows.len());
    for i in 0..ct.rows.len() {
        let row = body_row(i)?;
        let mut line = Vec::with_capacity(ct.columns.len());
        for j in 0..ct.columns.len() {
            let col = data_col(j)?;
            match cell(i, j) {
                SigCell::Number(p) => {
                    sheet.write_number_with_format(row, col, p, &f.p_value)?;
                    line.push(format!("{p:.3}"));
                }
                SigCell::Text(s) => {
                    sheet.write_string_with_format(row, col, s.as_str(), &f.centered)?;
                    line.push(s);
                }
                SigCell::Blank => {
                    sheet.write_blank(row, col, &f.centered)?;
                    line.push(String::new());
                }
            }
        }
        texts.push(line);
    }
    apply_layout(sheet, ct.rows.len(), &ct.columns, &texts, style)?;
    sheet.set_freeze_panes(1, FIRST_DATA_COL)?;
    Ok(())
}

fn write_label_header(sheet: &mut Worksheet, f: &Formats) -> Result<()> {
    sheet.write_string_with_format(0, 0, HEAD_QUESTION, &f.header)?;
    sheet.write_string_with_format(0, 1, HEAD_OPTION, &f.header)?;
    Ok(())
}

/// Question in column A, merged over its options; option in column B.
fn write_row_labels(sheet: &mut Worksheet, ct: &CrossTab, f: &Formats) -> Result<()> {
    for (question, first, last) in ct.question_spans() {
        let (r1, r2) = (body_row(first)?, body_row(last)?);
        if r1 == r2 {
            sheet.write_string_with_format(r1, 0, question, &f.body)?;
        } else {
            sheet.merge_range(r1, 0, r2, 0, question, &f.body)?;
        }
    }
    for (i, label) in ct.rows.iter().enumerate() {
        sheet.write_string_with_format(body_row(i)?, 1, label.option.as_str(), &f.body)?;
    }
    Ok(())
}

fn apply_layout(
    sheet: &mut Worksheet,
    n_rows: usize,
    headers: &[String],
    cells: &[Vec<String>],
    style: &ReportStyle,
) -> Result<()> {
    sheet.set_row_height(0, style.header_height)?;
    for i in 0..n_rows {
        sheet.set_row_height(body_row(i)?, style.body_row_height)?;
    }
    sheet.set_column_width(0, style.label_column_width)?;
    sheet.set_column_width(1, style.label_column_width)?;
    for (j, header) in headers.iter().enumerate() {
        let width = match style.data_column_width {
            Some(w) => w,
            None => {
                let longest = std::iter::once(header.as_str())
                    .chain(cells.iter().filter_map(|r| r.get(j).map(String::as_str)))
                    .map(longest_line_width)
                    .max()
                    .unwrap_or(0);
                ((longest + 2) as f64).min(style.max_column_width)
            }
        };
        sheet.set_column_width(data_col(j)?, width)?;
    }
    Ok(())
}

fn data_bar(hex: &str) -> Result<ConditionalFormatDataBar> {
    Ok(ConditionalFormatDataBar::new()
        .set_minimum(ConditionalFormatType::Number, 0)
        .set_maximum(ConditionalFormatType::Highest, 0)
        .set_fill_color(Color::RGB(parse_hex_color(hex)?))
        .set_bar_only(true))
}

/// A row is a total when its option label names one; the question text is
/// not consulted.
fn is_total_label(option: &str) -> bool {
    let clean: String = option
        .chars()
        .filter(|c| *c != '\n' && *c != ' ')
        .collect();
    TOTAL_KEYWORDS.iter().any(|k| clean.contains(k))
}

/// Contiguous `(first, last)` body-row ranges that carry no totals.
fn non_total_runs(ct: &CrossTab) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, r) in ct.rows.iter().enumerate() {
        let total = r.is_total || is_total_label(&r.option);
        match (total, start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                runs.push((s, i - 1));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, ct.rows.len() - 1));
    }
    runs
}

/// Display width of the longest line; CJK characters count as two columns.
fn longest_line_width(s: &str) -> usize {
    s.split('\n').map(UnicodeWidthStr::width).max().unwrap_or(0)
}

fn body_row(i: usize) -> Result<u32> {
    u32::try_from(i + 1)
        .map_err(|_| SurveyError::InvalidConfig(format!("row index overflow: {i}")))
}

fn data_col(j: usize) -> Result<u16> {
    u16::try_from(j + FIRST_DATA_COL as usize)
        .map_err(|_| SurveyError::InvalidConfig(format!("column index overflow: {j}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crosstab::RowLabel;

    fn label(q: &str, o: &str, total: bool) -> RowLabel {
        RowLabel {
            question: q.into(),
            option: o.into(),
            is_total: total,
        }
    }

    #[test]
    fn runs_skip_totals() {
        let ct = CrossTab {
            rows: vec![
                label("A", "1", false),
                label("A", "2", false),
                label("A", "总计", true),
                label("B", "x", false),
                label("B", "Total score", false),
                label("B", "y", false),
            ],
            columns: vec![],
            counts: vec![vec![]; 6],
            column_totals: vec![],
        };
        assert_eq!(non_total_runs(&ct), vec![(0, 1), (3, 3), (5, 5)]);
    }

    #[test]
    fn total_words_in_question_keep_bars() {
        let ct = CrossTab {
            rows: vec![
                label("月合计消费", "1 低", false),
                label("月合计消费", "2 高", false),
                label("月合计消费", "总计", true),
                label("Total spend", "1 Low", false),
            ],
            columns: vec![],
            counts: vec![vec![]; 4],
            column_totals: vec![],
        };
        assert_eq!(non_total_runs(&ct), vec![(0, 1), (3, 3)]);
    }

    #[test]
    fn widths_use_longest_line() {
        assert_eq!(longest_line_width("Gender #1\n1 Male（频数）"), 14);
        assert_eq!(longest_line_width("abc"), 3);
        assert_eq!(longest_line_width("性别 #1\n男"), 7);
    }

    #[test]
    fn style_colours_are_validated() {
        let style = ReportStyle {
            header_fill_color: "not-a-colour".into(),
            ..ReportStyle::default()
        };
        assert!(Formats::new(&style).is_err());
    }
}
