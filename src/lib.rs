//! # survey_analysis
//!
//! Cross-tabulation of survey questions with per-cell significance testing,
//! and mining of open-ended answers (tagging, word cloud, clustering).
//!
//! The cross-tab engine recovers multi-select questions from column headers
//! of the form `Q<n>.<k> <question>:<option>`, builds a boolean mask per
//! category, counts every row/column mask pair, and tests each cell with a
//! 2x2 chi-square (Yates) or Fisher's exact test. Results are written to a
//! styled `.xlsx` workbook.
//!
//! ## Example
//! ```no_run
//! use std::path::Path;
//! use survey_analysis::{CrosstabOptions, run_crosstab};
//!
//! let rows = vec!["Q3.".to_string()];
//! let cols = vec!["Gender".to_string()];
//! run_crosstab(
//!     Path::new("survey.xlsx"),
//!     None,
//!     &rows,
//!     &cols,
//!     &CrosstabOptions::default(),
//!     Path::new("crosstab.xlsx"),
//! )
//! .unwrap();
//! ```

pub mod clean;
pub mod cluster;
pub mod conditions;
pub mod config;
pub mod crosstab;
pub mod error;
pub mod header;
pub mod office;
pub mod recode;
pub mod report;
pub mod stats;
pub mod table;
pub mod tagging;
pub mod text_report;
pub mod tokenize;
pub mod wordcloud;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use log::info;

pub use crate::clean::{Response, clean_responses};
pub use crate::cluster::{ClusterSummary, Clustering, cluster_texts};
pub use crate::config::{CrosstabOptions, ReportStyle, TextOptions, load_json_config};
pub use crate::crosstab::{CrossTab, CrossTabAnalysis, analyze};
pub use crate::error::{Result, SurveyError};
pub use crate::stats::SigMarker;
pub use crate::table::{CellValue, SurveyTable};
pub use crate::tagging::{TagMatch, TagRule, Tagger};
pub use crate::text_report::{AnalyzedResponse, ExportFormat, csv_safe_cell};
pub use crate::tokenize::Tokenizer;
pub use crate::wordcloud::WordCloudOptions;

/// `<prefix>_<YYYYmmdd_HHMMSS>.<ext>` from the local clock.
pub fn timestamped_name(prefix: &str, ext: &str) -> String {
    let local: DateTime<Local> = Local::now();
    format!("{prefix}_{}.{ext}", local.format("%Y%m%d_%H%M%S"))
}

/// Read a word list, one entry per line; blank lines are ignored.
pub fn load_word_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Load, recode, cross-tabulate, and write the report to `out`.
pub fn run_crosstab(
    input: &Path,
    sheet: Option<&str>,
    rows: &[String],
    cols: &[String],
    opts: &CrosstabOptions,
    out: &Path,
) -> Result<CrossTabAnalysis> {
    let marker = SigMarker::new(&opts.sig_levels, &opts.sig_symbols)?;
    let mut table = SurveyTable::load_sheet(input, sheet)?;
    info!(
        "Loaded {} respondents x {} columns from {}",
        table.len(),
        table.headers.len(),
        input.display()
    );
    recode::apply_recodes(&mut table, &opts.recode)?;
    let analysis = analyze(&table, rows, cols)?;
    report::write_crosstab_report(out, &analysis, &marker, &opts.style)?;
    Ok(analysis)
}

/// Where the text pipeline wrote its outputs.
#[derive(Debug, Clone)]
pub struct TextAnalysisOutput {
    pub report: PathBuf,
    pub wordcloud: PathBuf,
    pub export: Option<PathBuf>,
    pub responses: usize,
    pub word_frequencies: Vec<(String, u32)>,
    pub clusters: Vec<ClusterSummary>,
}

/// Clean, tag, count, cluster, and write every text output into `out_dir`.
pub fn run_text_analysis(
    input: &Path,
    sheet: Option<&str>,
    text_column: &str,
    keep_columns: &[String],
    opts: &TextOptions,
    out_dir: &Path,
    export: Option<ExportFormat>,
) -> Result<TextAnalysisOutput> {
    let table = SurveyTable::load_sheet(input, sheet)?;
    let responses = clean_responses(&table, text_column, keep_columns, &opts.invalid_words)?;
    if responses.is_empty() {
        return Err(SurveyError::EmptyInput(format!(
            "column '{text_column}' has no usable answers"
        )));
    }

    let tagger = Tagger::new(opts.tags.clone(), opts.negation_words.clone(), opts.max_context);
    let mut tokenizer = Tokenizer::new(tagger.keywords());
    for w in &opts.lexicon {
        tokenizer.add_word(w.as_str());
    }

    let texts: Vec<String> = responses.iter().map(|r| r.text.clone()).collect();
    let freqs = tokenizer.word_frequencies(&texts, &opts.stopwords, opts.min_freq);
    let wordcloud = out_dir.join(timestamped_name("词云图", "svg"));
    let cloud_opts = WordCloudOptions {
        max_words: opts.max_words,
        ..WordCloudOptions::default()
    };
    wordcloud::render_wordcloud(&freqs, &wordcloud, &cloud_opts)?;

    let clustering = cluster_texts(
        &texts,
        &tokenizer,
        opts.n_clusters,
        opts.max_samples,
        opts.max_features,
    )?;

    let analyzed: Vec<AnalyzedResponse> = responses
        .into_iter()
        .zip(&clustering.labels)
        .map(|(response, &cluster)| AnalyzedResponse {
            tags: tagger.tag_text(&response.text),
            response,
            cluster,
        })
        .collect();
    let tagged = analyzed.iter().filter(|a| !a.tags.tags.is_empty()).count();
    info!("{tagged} of {} answers matched at least one tag", analyzed.len());

    let report = out_dir.join(timestamped_name("文本分析结果", "xlsx"));
    text_report::write_text_report(
        &report,
        text_column,
        keep_columns,
        &analyzed,
        &clustering.summaries,
    )?;

    let export = match export {
        Some(format) => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("survey");
            Some(text_report::export_word_frequencies(&freqs, out_dir, stem, format)?)
        }
        None => None,
    };

    Ok(TextAnalysisOutput {
        report,
        wordcloud,
        export,
        responses: analyzed.len(),
        word_frequencies: freqs,
        clusters: clustering.summaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use tempfile::tempdir;

    #[test]
    fn names_carry_timestamp() {
        let re = Regex::new(r"^交叉分析结果_\d{8}_\d{6}\.xlsx$").unwrap();
        assert!(re.is_match(&timestamped_name("交叉分析结果", "xlsx")));
    }

    #[test]
    fn word_lists_skip_blank_lines() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("stop.txt");
        fs::write(&p, "的\n\n  了 \n").unwrap();
        assert_eq!(load_word_list(&p).unwrap(), vec!["的", "了"]);
    }
}
