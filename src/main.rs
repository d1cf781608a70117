#![forbid(unsafe_code)]
//! # Survey Analysis CLI
//!
//! Command-line front end of the `survey_analysis` crate.
//!
//! ## Subcommands
//! - `crosstab`: cross-tabulate row questions against column questions and
//!   write a styled workbook with significance sheets.
//! - `text`: clean, tag, and cluster an open-ended column; writes a result
//!   workbook, an SVG word cloud, and optionally a word-frequency export.
//! - `inspect`: preview a data file (size, missing cells, field kinds,
//!   detected multi-select groups).
//!
//! ## Example
//! ```bash
//! survey_analysis crosstab survey.xlsx --rows Q3. Q5. --cols Gender --sig-levels 0.05,0.01
//! ```
//!
//! Set `RUST_LOG=info` for progress output.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use log::error;
use survey_analysis::header::detect_groups;
use survey_analysis::{
    CrosstabOptions, ExportFormat, Result, SurveyTable, TagRule, TextOptions, load_json_config,
    load_word_list, office, run_crosstab, run_text_analysis, timestamped_name,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cross-tabulate survey questions with significance tests
    Crosstab(CrosstabArgs),
    /// Mine an open-ended answer column
    Text(TextArgs),
    /// Preview a data file
    Inspect(InspectArgs),
}

#[derive(Args)]
struct CrosstabArgs {
    /// Survey data (.xlsx or .csv)
    input: PathBuf,

    /// Worksheet to read (default: first sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// Row questions: column names or multi-select roots such as `Q3.`
    #[arg(long, num_args = 1.., required = true)]
    rows: Vec<String>,

    /// Column questions
    #[arg(long, num_args = 1.., required = true)]
    cols: Vec<String>,

    /// Output workbook (default: 交叉分析结果_<timestamp>.xlsx)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Significance levels, comma separated (e.g. 0.05,0.01,0.001)
    #[arg(long, value_delimiter = ',')]
    sig_levels: Option<Vec<f64>>,

    /// Symbols matching the levels, comma separated (e.g. *,**,***)
    #[arg(long, value_delimiter = ',')]
    sig_symbols: Option<Vec<String>>,

    /// Excel number format of percentage cells
    #[arg(long)]
    percent_format: Option<String>,

    /// Fixed width of data columns
    #[arg(long, conflicts_with = "autofit")]
    data_column_width: Option<f64>,

    /// Fit data columns to their content
    #[arg(long, default_value_t = false)]
    autofit: bool,

    /// JSON options file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct TextArgs {
    /// Survey data (.xlsx or .csv)
    input: PathBuf,

    /// Worksheet to read (default: first sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// Column holding the open-ended answers
    #[arg(long)]
    text_column: String,

    /// Extra columns copied next to each answer, comma separated
    #[arg(long, value_delimiter = ',')]
    keep: Vec<String>,

    /// Output directory
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Number of clusters
    #[arg(long)]
    clusters: Option<usize>,

    /// Example answers listed per cluster
    #[arg(long)]
    samples: Option<usize>,

    /// Additional stopword file (.txt, one word per line)
    #[arg(long)]
    stopwords: Option<PathBuf>,

    /// Tag rules (JSON list of {"tag": ..., "keywords": [...]}) replacing the defaults
    #[arg(long)]
    tags: Option<PathBuf>,

    /// User dictionary for the tokenizer (.txt, one word per line)
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Also export word frequencies (txt, csv, tsv, json)
    #[arg(long)]
    export_format: Option<ExportFormat>,

    /// JSON options file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct InspectArgs {
    /// Survey data (.xlsx or .csv)
    input: PathBuf,

    /// Worksheet to read (default: first sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// Number of data rows to preview
    #[arg(long, default_value_t = 5)]
    head: usize,
}

fn crosstab(args: CrosstabArgs) -> Result<()> {
    let mut opts: CrosstabOptions = match &args.config {
        Some(p) => load_json_config(p)?,
        None => CrosstabOptions::default(),
    };
    if let Some(levels) = args.sig_levels {
        opts.sig_levels = levels;
    }
    if let Some(symbols) = args.sig_symbols {
        opts.sig_symbols = symbols;
    }
    if let Some(fmt) = args.percent_format {
        opts.style.percent_format = fmt;
    }
    if args.autofit {
        opts.style.data_column_width = None;
    } else if let Some(w) = args.data_column_width {
        opts.style.data_column_width = Some(w);
    }

    let out = args
        .output
        .unwrap_or_else(|| PathBuf::from(timestamped_name("交叉分析结果", "xlsx")));
    let analysis = run_crosstab(
        &args.input,
        args.sheet.as_deref(),
        &args.rows,
        &args.cols,
        &opts,
        &out,
    )?;
    println!(
        "Cross-tab: {} row categories x {} column categories",
        analysis.crosstab.rows.len(),
        analysis.crosstab.columns.len()
    );
    println!("Report written to {}", out.display());
    Ok(())
}

fn text(args: TextArgs) -> Result<()> {
    let mut opts: TextOptions = match &args.config {
        Some(p) => load_json_config(p)?,
        None => TextOptions::default(),
    };
    if let Some(n) = args.clusters {
        opts.n_clusters = n;
    }
    if let Some(n) = args.samples {
        opts.max_samples = n;
    }
    if let Some(p) = &args.stopwords {
        opts.stopwords.extend(load_word_list(p)?);
    }
    if let Some(p) = &args.tags {
        let rules: Vec<TagRule> = load_json_config(p)?;
        opts.tags = rules;
    }
    if let Some(p) = &args.lexicon {
        opts.lexicon.extend(load_word_list(p)?);
    }

    let out = run_text_analysis(
        &args.input,
        args.sheet.as_deref(),
        &args.text_column,
        &args.keep,
        &opts,
        &args.out_dir,
        args.export_format,
    )?;

    println!("{} answers analysed", out.responses);
    println!("Top words:");
    for (word, count) in out.word_frequencies.iter().take(10) {
        println!("  {word}\t{count}");
    }
    println!("Clusters:");
    for c in &out.clusters {
        println!("  {}\t{}", c.cluster, c.count);
    }
    println!("Report written to {}", out.report.display());
    println!("Word cloud written to {}", out.wordcloud.display());
    if let Some(p) = &out.export {
        println!("Word frequencies exported to {}", p.display());
    }
    Ok(())
}

fn is_xlsx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "xlsx" | "xlsm"))
        .unwrap_or(false)
}

fn inspect(args: InspectArgs) -> Result<()> {
    if is_xlsx(&args.input) {
        println!("Sheets: {}", office::sheet_names(&args.input)?.join(", "));
    }
    let table = SurveyTable::load_sheet(&args.input, args.sheet.as_deref())?;
    let summary = table.summary();
    println!("Rows: {}", summary.rows);
    println!("Columns: {}", summary.columns);
    println!("Missing cells: {}", summary.missing);
    println!("Fields:");
    for (name, kind) in &summary.fields {
        println!("  {name}\t{kind}");
    }

    let groups = detect_groups(&table.headers);
    if !groups.is_empty() {
        println!("Multi-select groups:");
        for g in groups.values() {
            println!("  {}\t{} options\t{}", g.root, g.subcols.len(), g.question_text());
        }
    }

    println!("Preview:");
    println!("  {}", table.headers.join("\t"));
    for row in table.rows.iter().take(args.head) {
        let cells: Vec<String> = row.iter().map(|c| c.display()).collect();
        println!("  {}", cells.join("\t"));
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Crosstab(args) => crosstab(args),
        Command::Text(args) => text(args),
        Command::Inspect(args) => inspect(args),
    };
    if let Err(e) = result {
        error!("Error: {}", e);
        process::exit(1);
    }
}
