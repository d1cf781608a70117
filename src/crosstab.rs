//! Frequency and percentage cross-tabulation.

use log::info;

use crate::conditions::{ColumnCondition, ConditionBuilder, RowCondition};
use crate::error::{Result, SurveyError};
use crate::stats::SignificanceTable;
use crate::table::SurveyTable;

/// Row label of the cross-tab body: question plus option.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLabel {
    pub question: String,
    pub option: String,
    pub is_total: bool,
}

/// Counts of respondents in each (row category, column category) pair.
/// Percentages are relative to the column total.
#[derive(Debug, Clone)]
pub struct CrossTab {
    pub rows: Vec<RowLabel>,
    pub columns: Vec<String>,
    pub counts: Vec<Vec<u64>>,
    pub column_totals: Vec<u64>,
}

impl CrossTab {
    pub fn tabulate(rows: &[RowCondition], cols: &[ColumnCondition]) -> CrossTab {
        let counts = rows
            .iter()
            .map(|r| cols.iter().map(|c| r.mask.and_count(&c.mask)).collect())
            .collect();
        CrossTab {
            rows: rows
                .iter()
                .map(|r| RowLabel {
                    question: r.question.clone(),
                    option: r.option.clone(),
                    is_total: r.is_total,
                })
                .collect(),
            columns: cols.iter().map(|c| c.label.clone()).collect(),
            counts,
            column_totals: cols.iter().map(|c| c.total).collect(),
        }
    }

    /// Share of the column total, rounded to three decimals; `None` when the
    /// column is empty.
    pub fn percent(&self, row: usize, col: usize) -> Option<f64> {
        let total = self.column_totals[col];
        if total == 0 {
            return None;
        }
        let share = self.counts[row][col] as f64 / total as f64;
        Some((share * 1000.0).round() / 1000.0)
    }

    /// Spans of consecutive rows sharing a question: `(question, first, last)`.
    pub fn question_spans(&self) -> Vec<(&str, usize, usize)> {
        let mut spans: Vec<(&str, usize, usize)> = Vec::new();
        for (i, r) in self.rows.iter().enumerate() {
            match spans.last_mut() {
                Some((q, _, last)) if *q == r.question && *last + 1 == i => *last = i,
                _ => spans.push((r.question.as_str(), i, i)),
            }
        }
        spans
    }
}

/// Everything the report renderer needs.
#[derive(Debug, Clone)]
pub struct CrossTabAnalysis {
    pub crosstab: CrossTab,
    pub significance: SignificanceTable,
}

/// Resolve questions, tabulate, and test every cell.
pub fn analyze(
    table: &SurveyTable,
    row_questions: &[String],
    col_questions: &[String],
) -> Result<CrossTabAnalysis> {
    let builder = ConditionBuilder::new(table, row_questions, col_questions);
    if !builder.groups().is_empty() {
        info!(
            "Multi-select groups: {}",
            builder
                .groups()
                .values()
                .map(|g| format!("{} ({} options)", g.root, g.subcols.len()))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let rows = builder.row_conditions(row_questions);
    let cols = builder.column_conditions(col_questions);
    if rows.is_empty() {
        return Err(SurveyError::NoValidQuestions(format!(
            "none of the row questions {row_questions:?} matched"
        )));
    }
    if cols.is_empty() {
        return Err(SurveyError::NoValidQuestions(format!(
            "none of the column questions {col_questions:?} matched"
        )));
    }

    info!(
        "Cross-tabulating {} row categories x {} column categories over {} respondents",
        rows.len(),
        cols.len(),
        table.len()
    );
    Ok(CrossTabAnalysis {
        crosstab: CrossTab::tabulate(&rows, &cols),
        significance: SignificanceTable::compute(&rows, &cols),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn survey() -> SurveyTable {
        SurveyTable::from_csv_bytes(
            "Gender,Q2.1 Likes:Apples,Q2.2 Likes:Pears\n\
             1 Male,1,0\n\
             1 Male,1,1\n\
             2 Female,0,1\n\
             2 Female,0,0\n\
             2 Female,1,0\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn counts_and_percentages() {
        let t = survey();
        let a = analyze(&t, &q(&["Q2."]), &q(&["Gender"])).unwrap();
        let ct = &a.crosstab;
        assert_eq!(ct.columns, vec!["Gender #1\n1 Male", "Gender #1\n2 Female", "Gender #1\n总计"]);
        assert_eq!(ct.column_totals, vec![2, 3, 5]);
        // Apples row
        assert_eq!(ct.counts[0], vec![2, 1, 3]);
        assert_eq!(ct.percent(0, 0), Some(1.0));
        assert_eq!(ct.percent(0, 1), Some(0.333));
        // total row: anyone who likes something
        assert_eq!(ct.counts[2], vec![2, 2, 4]);
        assert!(ct.rows[2].is_total);
        assert_eq!(a.significance.p_values.len(), 3);
        assert_eq!(a.significance.p_values[0].len(), 3);
    }

    #[test]
    fn empty_column_has_no_percentage() {
        let t = SurveyTable::from_csv_bytes("A,B\n1,\n2,\n".as_bytes()).unwrap();
        let a = analyze(&t, &q(&["A"]), &q(&["B"])).unwrap();
        // B has no categories, only an empty total column
        assert_eq!(a.crosstab.columns, vec!["B #1\n总计"]);
        assert_eq!(a.crosstab.percent(0, 0), None);
    }

    #[test]
    fn question_spans_group_rows() {
        let t = survey();
        let a = analyze(&t, &q(&["Gender", "Q2."]), &q(&["Gender"])).unwrap();
        let spans = a.crosstab.question_spans();
        assert_eq!(spans, vec![("Gender", 0, 2), ("Q2.", 3, 5)]);
    }

    #[test]
    fn no_valid_questions() {
        let t = survey();
        assert!(matches!(
            analyze(&t, &q(&["Missing"]), &q(&["Gender"])),
            Err(SurveyError::NoValidQuestions(_))
        ));
        assert!(matches!(
            analyze(&t, &q(&["Gender"]), &q(&["Q7."])),
            Err(SurveyError::NoValidQuestions(_))
        ));
    }
}
