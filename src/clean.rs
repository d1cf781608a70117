//! Selection and cleaning of open-ended responses.

use log::info;

use crate::error::Result;
use crate::table::{CellValue, SurveyTable};

/// One usable open-ended answer plus the columns kept alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub text: String,
    pub extra: Vec<CellValue>,
}

/// Keep trimmed, non-empty answers that are not placeholder words such as
/// "无" or "不知道".
pub fn clean_responses(
    table: &SurveyTable,
    text_column: &str,
    keep_columns: &[String],
    invalid_words: &[String],
) -> Result<Vec<Response>> {
    let text_idx = table.require_column(text_column)?;
    let keep_idx = keep_columns
        .iter()
        .map(|c| table.require_column(c))
        .collect::<Result<Vec<usize>>>()?;

    let responses: Vec<Response> = table
        .rows
        .iter()
        .filter_map(|row| {
            let cell = &row[text_idx];
            if cell.is_missing() {
                return None;
            }
            let text = cell.display().trim().to_string();
            if text.is_empty() || invalid_words.iter().any(|w| w.trim() == text) {
                return None;
            }
            Some(Response {
                text,
                extra: keep_idx.iter().map(|&i| row[i].clone()).collect(),
            })
        })
        .collect();

    info!(
        "{} of {} responses kept after cleaning",
        responses.len(),
        table.len()
    );
    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurveyError;

    fn words(w: &[&str]) -> Vec<String> {
        w.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn drops_missing_blank_and_placeholder_answers() {
        let t = SurveyTable::from_csv_bytes(
            "id,answer\n1, 很好玩 \n2,无\n3,\n4,   \n5,不知道\n6,卡顿\n".as_bytes(),
        )
        .unwrap();
        let invalid = words(&["无", " ", "不知道"]);
        let out = clean_responses(&t, "answer", &words(&["id"]), &invalid).unwrap();
        let texts: Vec<&str> = out.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["很好玩", "卡顿"]);
        assert_eq!(out[0].extra, vec![CellValue::Number(1.0)]);
        assert_eq!(out[1].extra, vec![CellValue::Number(6.0)]);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let t = SurveyTable::from_csv_bytes("a\nx\n".as_bytes()).unwrap();
        assert!(matches!(
            clean_responses(&t, "b", &[], &[]),
            Err(SurveyError::UnknownColumn(_))
        ));
        assert!(matches!(
            clean_responses(&t, "a", &words(&["zzz"]), &[]),
            Err(SurveyError::UnknownColumn(_))
        ));
    }
}
