//! Analysis options and their defaults.
//!
//! Every option struct deserializes from JSON with `#[serde(default)]`, so a
//! config file only needs the keys it overrides. CLI flags are applied on top
//! of the loaded values in `main.rs`.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, SurveyError};
use crate::recode::RecodeRule;
use crate::tagging::TagRule;

/// Load a JSON config file into any option struct.
pub fn load_json_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)?;
    let cfg = serde_json::from_str(&raw)?;
    Ok(cfg)
}

/// Styling of the cross-tab workbook.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportStyle {
    pub header_height: f64,
    pub body_row_height: f64,
    pub header_fill_color: String,
    pub header_font_color: String,
    pub header_font_name: String,
    pub header_font_size: f64,
    pub body_font_name: String,
    pub freq_data_bar_color: String,
    pub percent_data_bar_color: String,
    pub percent_format: String,
    pub p_value_format: String,
    pub label_column_width: f64,
    /// Fixed width of data columns; `None` autofits up to `max_column_width`.
    pub data_column_width: Option<f64>,
    pub max_column_width: f64,
}

impl Default for ReportStyle {
    fn default() -> Self {
        ReportStyle {
            header_height: 55.0,
            body_row_height: 20.0,
            header_fill_color: "4F81BD".to_string(),
            header_font_color: "FFFFFF".to_string(),
            header_font_name: "微软雅黑".to_string(),
            header_font_size: 12.0,
            body_font_name: "微软雅黑".to_string(),
            freq_data_bar_color: "638EC6".to_string(),
            percent_data_bar_color: "C00000".to_string(),
            percent_format: "0.00%".to_string(),
            p_value_format: "0.000".to_string(),
            label_column_width: 25.0,
            data_column_width: Some(20.0),
            max_column_width: 40.0,
        }
    }
}

/// Parse an `RRGGBB` (optionally `#`-prefixed) colour.
pub fn parse_hex_color(s: &str) -> Result<u32> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return Err(SurveyError::InvalidConfig(format!("Bad colour '{s}'")));
    }
    u32::from_str_radix(hex, 16)
        .map_err(|_| SurveyError::InvalidConfig(format!("Bad colour '{s}'")))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrosstabOptions {
    pub sig_levels: Vec<f64>,
    pub sig_symbols: Vec<String>,
    pub style: ReportStyle,
    pub recode: Vec<RecodeRule>,
}

impl Default for CrosstabOptions {
    fn default() -> Self {
        CrosstabOptions {
            sig_levels: vec![0.05, 0.01, 0.001],
            sig_symbols: vec!["*".to_string(), "**".to_string(), "***".to_string()],
            style: ReportStyle::default(),
            recode: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    pub invalid_words: Vec<String>,
    pub stopwords: Vec<String>,
    pub tags: Vec<TagRule>,
    pub negation_words: Vec<String>,
    pub max_context: usize,
    pub n_clusters: usize,
    pub max_samples: usize,
    pub min_freq: u32,
    pub max_words: usize,
    pub max_features: usize,
    /// Extra words the tokenizer keeps whole.
    pub lexicon: Vec<String>,
}

fn strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for TextOptions {
    fn default() -> Self {
        TextOptions {
            invalid_words: strings(&["无", " ", "没有", "不知道"]),
            stopwords: strings(&[
                "的", "了", "是", "有些", "因为", "游戏", "世界", "而且", "非常", "建议", "希望",
                "什么", "不要",
            ]),
            tags: default_tag_rules(),
            negation_words: strings(&["不", "没", "未", "无", "非", "勿"]),
            max_context: 3,
            n_clusters: 10,
            max_samples: 20,
            min_freq: 2,
            max_words: 40,
            max_features: 500,
            lexicon: Vec::new(),
        }
    }
}

pub fn default_tag_rules() -> Vec<TagRule> {
    let rule = |tag: &str, keywords: &[&str]| TagRule {
        tag: tag.to_string(),
        keywords: strings(keywords),
    };
    vec![
        rule("核心玩法", &["好玩", "生存", "创造", "红石", "指令"]),
        rule("社交联机", &["联机", "好友", "服务器", "多人游戏"]),
        rule("性能体验", &["卡顿", "闪退", "加载慢", "掉帧"]),
        rule("版本特性", &["更新", "版本", "1.20", "新功能"]),
        rule("模组组件", &["模组", "MOD", "mod", "光影", "材质包"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{"sig_levels":[0.1],"sig_symbols":["+"],"style":{"percent_format":"0%"}}"#;
        let cfg: CrosstabOptions = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.sig_levels, vec![0.1]);
        assert_eq!(cfg.style.percent_format, "0%");
        assert_eq!(cfg.style.header_height, 55.0);
        assert_eq!(cfg.style.data_column_width, Some(20.0));
    }

    #[test]
    fn autofit_from_null_width() {
        let style: ReportStyle = serde_json::from_str(r#"{"data_column_width":null}"#).unwrap();
        assert_eq!(style.data_column_width, None);
    }

    #[test]
    fn hex_colours() {
        assert_eq!(parse_hex_color("4F81BD").unwrap(), 0x4F81BD);
        assert_eq!(parse_hex_color("#ffffff").unwrap(), 0xFFFFFF);
        assert!(parse_hex_color("blue").is_err());
    }

    #[test]
    fn text_defaults() {
        let t = TextOptions::default();
        assert_eq!(t.n_clusters, 10);
        assert_eq!(t.tags.len(), 5);
        assert!(t.negation_words.contains(&"不".to_string()));
    }
}
