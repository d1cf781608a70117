//! Output of the text-mining pipeline: result workbook and word-frequency
//! export.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::ValueEnum;
use csv::WriterBuilder;
use log::info;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use serde::Serialize;

use crate::clean::Response;
use crate::cluster::ClusterSummary;
use crate::error::{Result, SurveyError};
use crate::report::prepare_output;
use crate::table::CellValue;
use crate::tagging::TagMatch;

pub const SHEET_RESULTS: &str = "分析结果";
pub const SHEET_CLUSTERS: &str = "聚类统计";
const HEAD_TAGS: &str = "匹配标签";
const HEAD_KEYWORDS: &str = "匹配关键词";
const HEAD_CLUSTER: &str = "聚类标签";

/// One cleaned answer with its tags and cluster.
#[derive(Debug, Clone)]
pub struct AnalyzedResponse {
    pub response: Response,
    pub tags: TagMatch,
    pub cluster: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Txt,
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }
}

/// Neutralise cells a spreadsheet would evaluate as a formula.
pub fn csv_safe_cell(cell: String) -> String {
    match cell.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{cell}"),
        _ => cell,
    }
}

fn sheet_row(i: usize) -> Result<u32> {
    u32::try_from(i + 1).map_err(|_| SurveyError::InvalidConfig(format!("row index overflow: {i}")))
}

fn sheet_col(j: usize) -> Result<u16> {
    u16::try_from(j).map_err(|_| SurveyError::InvalidConfig(format!("column index overflow: {j}")))
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    f: &Format,
) -> Result<()> {
    match value {
        CellValue::Empty => sheet.write_blank(row, col, f)?,
        CellValue::Number(n) => sheet.write_number_with_format(row, col, *n, f)?,
        CellValue::Bool(b) => sheet.write_boolean_with_format(row, col, *b, f)?,
        CellValue::Text(s) => sheet.write_string_with_format(row, col, s.as_str(), f)?,
    };
    Ok(())
}

/// Write the per-answer results and the cluster overview.
pub fn write_text_report(
    path: &Path,
    text_column: &str,
    keep_columns: &[String],
    rows: &[AnalyzedResponse],
    clusters: &[ClusterSummary],
) -> Result<()> {
    prepare_output(path)?;
    let header = Format::new().set_bold().set_border(FormatBorder::Thin);
    let body = Format::new()
        .set_text_wrap()
        .set_align(FormatAlign::Top)
        .set_align(FormatAlign::Left);

    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_RESULTS)?;
    let mut headers: Vec<&str> = vec![text_column];
    headers.extend(keep_columns.iter().map(String::as_str));
    headers.extend([HEAD_TAGS, HEAD_KEYWORDS, HEAD_CLUSTER]);
    for (j, h) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, sheet_col(j)?, *h, &header)?;
    }
    for (i, r) in rows.iter().enumerate() {
        let row = sheet_row(i)?;
        sheet.write_string_with_format(row, 0, r.response.text.as_str(), &body)?;
        for (j, v) in r.response.extra.iter().enumerate() {
            write_cell(sheet, row, sheet_col(j + 1)?, v, &body)?;
        }
        let next = r.response.extra.len() + 1;
        sheet.write_string_with_format(row, sheet_col(next)?, r.tags.tags_joined(), &body)?;
        sheet.write_string_with_format(row, sheet_col(next + 1)?, r.tags.keywords_joined(), &body)?;
        sheet.write_number_with_format(row, sheet_col(next + 2)?, r.cluster as f64, &body)?;
    }
    sheet.set_column_width(0, 50)?;
    sheet.set_freeze_panes(1, 0)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_CLUSTERS)?;
    for (j, h) in ["cluster", "count", "examples"].iter().enumerate() {
        sheet.write_string_with_format(0, sheet_col(j)?, *h, &header)?;
    }
    for (i, c) in clusters.iter().enumerate() {
        let row = sheet_row(i)?;
        sheet.write_number_with_format(row, 0, c.cluster as f64, &body)?;
        sheet.write_number_with_format(row, 1, c.count as f64, &body)?;
        sheet.write_string_with_format(row, 2, c.examples.join("\n"), &body)?;
    }
    sheet.set_column_width(2, 80)?;

    workbook.save(path)?;
    info!("Text analysis report written to {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct FreqItem<'a> {
    item: &'a str,
    count: u32,
}

/// Export the frequency table to `<stem>_<YYYYmmdd_HHMMSS>_wordfreq.<ext>`
/// inside `dir`.
pub fn export_word_frequencies(
    freqs: &[(String, u32)],
    dir: &Path,
    stem: &str,
    format: ExportFormat,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{stem}_{stamp}_wordfreq.{}", format.extension()));
    let file = BufWriter::new(File::create(&path)?);

    match format {
        ExportFormat::Txt => {
            let mut w = file;
            for (word, count) in freqs {
                writeln!(w, "{word}\t{count}")?;
            }
            w.flush()?;
        }
        ExportFormat::Csv | ExportFormat::Tsv => {
            let delimiter = if format == ExportFormat::Tsv { b'\t' } else { b',' };
            let mut wtr = WriterBuilder::new().delimiter(delimiter).from_writer(file);
            wtr.write_record(["item", "count"])?;
            for (word, count) in freqs {
                wtr.write_record([csv_safe_cell(word.clone()), count.to_string()])?;
            }
            wtr.flush()?;
        }
        ExportFormat::Json => {
            let items: Vec<FreqItem> = freqs
                .iter()
                .map(|(w, c)| FreqItem { item: w, count: *c })
                .collect();
            let mut w = file;
            serde_json::to_writer_pretty(&mut w, &items)?;
            w.flush()?;
        }
    }
    info!("Word frequencies exported to {}", path.display());
    Ok(path)
}
