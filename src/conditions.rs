//! Row and column condition sets.
//!
//! Every category of a question becomes a boolean mask over respondents. Row
//! conditions label the body of the cross-tab, column conditions its header.

use std::collections::{BTreeMap, HashMap};

use log::warn;

use crate::header::{self, MultiGroup};
use crate::table::{CellValue, SurveyTable};

/// Label of total rows and columns.
pub const TOTAL_LABEL: &str = "总计";

/// One boolean per respondent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(Vec<bool>);

impl Mask {
    pub fn from_fn<F: Fn(&[CellValue]) -> bool>(table: &SurveyTable, f: F) -> Mask {
        Mask(table.rows.iter().map(|r| f(r.as_slice())).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self) -> u64 {
        self.0.iter().filter(|&&b| b).count() as u64
    }

    fn zip_with<F: Fn(bool, bool) -> bool>(&self, other: &Mask, f: F) -> Mask {
        Mask(self.0.iter().zip(&other.0).map(|(&a, &b)| f(a, b)).collect())
    }

    /// `self ∧ other`
    pub fn and(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && b)
    }

    /// `self ∧ ¬other`
    pub fn and_not(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && !b)
    }

    pub fn not(&self) -> Mask {
        Mask(self.0.iter().map(|&b| !b).collect())
    }

    /// `|self ∧ other|` without building the intersection.
    pub fn and_count(&self, other: &Mask) -> u64 {
        self.0
            .iter()
            .zip(&other.0)
            .filter(|&(&a, &b)| a && b)
            .count() as u64
    }
}

impl From<Vec<bool>> for Mask {
    fn from(v: Vec<bool>) -> Self {
        Mask(v)
    }
}

/// How a requested question maps onto the table.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionKind {
    Single(String),
    Multi(String),
}

#[derive(Debug, Clone)]
pub struct RowCondition {
    pub question: String,
    pub option: String,
    pub mask: Mask,
    pub is_total: bool,
}

#[derive(Debug, Clone)]
pub struct ColumnCondition {
    pub label: String,
    pub mask: Mask,
    pub total: u64,
    pub is_total: bool,
}

/// Builds condition sets for one table and one set of requested questions.
pub struct ConditionBuilder<'a> {
    table: &'a SurveyTable,
    groups: BTreeMap<String, MultiGroup>,
}

impl<'a> ConditionBuilder<'a> {
    pub fn new(table: &'a SurveyTable, row_questions: &[String], col_questions: &[String]) -> Self {
        let roots = header::requested_roots(row_questions.iter().chain(col_questions));
        let groups = header::collect_groups(&table.headers, &roots);
        ConditionBuilder { table, groups }
    }

    pub fn groups(&self) -> &BTreeMap<String, MultiGroup> {
        &self.groups
    }

    /// A `Q<n>.`-prefixed question whose group exists selects the whole group;
    /// otherwise the question must be a column name.
    pub fn resolve(&self, q: &str) -> Option<QuestionKind> {
        let q = q.trim();
        if let Some(root) = header::question_root(q) {
            if self.groups.contains_key(root) {
                return Some(QuestionKind::Multi(root.to_string()));
            }
        }
        self.table
            .column(q)
            .map(|_| QuestionKind::Single(q.to_string()))
    }

    pub fn row_conditions(&self, questions: &[String]) -> Vec<RowCondition> {
        let mut out = Vec::new();
        for q in questions {
            match self.resolve(q) {
                Some(QuestionKind::Multi(root)) => {
                    let group = &self.groups[&root];
                    for subcol in &group.subcols {
                        out.push(RowCondition {
                            question: root.clone(),
                            option: header::remainder(subcol, &root).to_string(),
                            mask: self.selected(subcol),
                            is_total: false,
                        });
                    }
                    out.push(RowCondition {
                        question: root.clone(),
                        option: TOTAL_LABEL.to_string(),
                        mask: self.any_selected(group),
                        is_total: true,
                    });
                }
                Some(QuestionKind::Single(col)) => {
                    let Some(idx) = self.table.column(&col) else {
                        continue;
                    };
                    for value in self.categories(idx) {
                        out.push(RowCondition {
                            question: col.clone(),
                            option: value.display(),
                            mask: Mask::from_fn(self.table, |r| r[idx] == value),
                            is_total: false,
                        });
                    }
                    out.push(RowCondition {
                        question: col.clone(),
                        option: TOTAL_LABEL.to_string(),
                        mask: Mask::from_fn(self.table, |r| !r[idx].is_missing()),
                        is_total: true,
                    });
                }
                None => warn!("Invalid row question skipped: {q}"),
            }
        }
        out
    }

    /// Column questions keep their order and may repeat; repeats get
    /// increasing instance numbers so every header stays unique.
    pub fn column_conditions(&self, questions: &[String]) -> Vec<ColumnCondition> {
        let mut out = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for q in questions {
            let q_clean = q.trim().to_string();
            let instance = {
                let n = seen.entry(q_clean.clone()).or_insert(0);
                *n += 1;
                *n
            };

            match self.resolve(&q_clean) {
                Some(QuestionKind::Multi(root)) => {
                    let group = &self.groups[&root];
                    let full_question = format!("{root}{} #{instance}", group.question_text());
                    for subcol in &group.subcols {
                        let (_, option) =
                            header::split_question_option(header::remainder(subcol, &root));
                        push_column(
                            &mut out,
                            format!("{full_question}\n{option}"),
                            self.selected(subcol),
                            false,
                        );
                    }
                    push_column(
                        &mut out,
                        format!("{full_question}\n{TOTAL_LABEL}"),
                        self.any_selected(group),
                        true,
                    );
                }
                Some(QuestionKind::Single(col)) => {
                    let Some(idx) = self.table.column(&col) else {
                        continue;
                    };
                    let unique_question = format!("{col} #{instance}");
                    for value in self.categories(idx) {
                        push_column(
                            &mut out,
                            format!("{unique_question}\n{}", value.display()),
                            Mask::from_fn(self.table, |r| r[idx] == value),
                            false,
                        );
                    }
                    push_column(
                        &mut out,
                        format!("{unique_question}\n{TOTAL_LABEL}"),
                        Mask::from_fn(self.table, |r| !r[idx].is_missing()),
                        true,
                    );
                }
                None => warn!("Invalid column question skipped: {q}"),
            }
        }
        out
    }

    fn selected(&self, subcol: &str) -> Mask {
        match self.table.column(subcol) {
            Some(idx) => Mask::from_fn(self.table, |r| r[idx].is_one()),
            None => Mask(vec![false; self.table.len()]),
        }
    }

    fn any_selected(&self, group: &MultiGroup) -> Mask {
        let idxs: Vec<usize> = group
            .subcols
            .iter()
            .filter_map(|s| self.table.column(s))
            .collect();
        Mask::from_fn(self.table, |r| idxs.iter().any(|&i| r[i].is_one()))
    }

    /// Distinct non-missing values, first-seen order; sorted by leading
    /// integer when every value starts with one.
    fn categories(&self, idx: usize) -> Vec<CellValue> {
        let mut values: Vec<CellValue> = Vec::new();
        for v in self.table.values(idx) {
            if !v.is_missing() && !values.contains(v) {
                values.push(v.clone());
            }
        }
        let keys: Option<Vec<u64>> = values
            .iter()
            .map(|v| header::leading_int(&v.display()))
            .collect();
        if let Some(keys) = keys {
            let mut keyed: Vec<(u64, CellValue)> = keys.into_iter().zip(values).collect();
            keyed.sort_by_key(|(k, _)| *k);
            values = keyed.into_iter().map(|(_, v)| v).collect();
        }
        values
    }
}

fn push_column(out: &mut Vec<ColumnCondition>, label: String, mask: Mask, is_total: bool) {
    let total = mask.count();
    out.push(ColumnCondition {
        label,
        mask,
        total,
        is_total,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn survey() -> SurveyTable {
        SurveyTable::from_csv_bytes(
            "Gender,Grade,Q5.1 Apps:WeChat,Q5.2 Apps:QQ\n\
             2 Female,10 senior,1,0\n\
             1 Male,9 junior,1,1\n\
             1 Male,,0,0\n\
             2 Female,9 junior,0,1\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn single_choice_rows_sorted_by_leading_int() {
        let t = survey();
        let b = ConditionBuilder::new(&t, &q(&["Grade"]), &[]);
        let rows = b.row_conditions(&q(&["Grade"]));
        let options: Vec<&str> = rows.iter().map(|r| r.option.as_str()).collect();
        assert_eq!(options, vec!["9 junior", "10 senior", TOTAL_LABEL]);
        assert_eq!(rows[0].mask.count(), 2);
        assert_eq!(rows[2].mask.count(), 3);
        assert!(rows[2].is_total);
    }

    #[test]
    fn unsortable_values_keep_first_seen_order() {
        let t = SurveyTable::from_csv_bytes("City\nOslo\n3 Bergen\nOslo\n".as_bytes()).unwrap();
        let b = ConditionBuilder::new(&t, &q(&["City"]), &[]);
        let rows = b.row_conditions(&q(&["City"]));
        assert_eq!(rows[0].option, "Oslo");
        assert_eq!(rows[1].option, "3 Bergen");
    }

    #[test]
    fn multi_select_rows_and_total() {
        let t = survey();
        let b = ConditionBuilder::new(&t, &q(&["Q5."]), &q(&["Gender"]));
        let rows = b.row_conditions(&q(&["Q5."]));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].question, "Q5.");
        assert_eq!(rows[0].option, "1 Apps:WeChat");
        assert_eq!(rows[1].mask.count(), 2);
        // any option selected
        assert_eq!(rows[2].mask.count(), 3);
    }

    #[test]
    fn column_labels_with_instances() {
        let t = survey();
        let b = ConditionBuilder::new(&t, &[], &q(&["Gender", "Q5.", "Gender"]));
        let cols = b.column_conditions(&q(&["Gender", "Q5.", "Gender"]));
        let labels: Vec<&str> = cols.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Gender #1\n1 Male",
                "Gender #1\n2 Female",
                "Gender #1\n总计",
                "Q5.1 Apps #1\nWeChat",
                "Q5.1 Apps #1\nQQ",
                "Q5.1 Apps #1\n总计",
                "Gender #2\n1 Male",
                "Gender #2\n2 Female",
                "Gender #2\n总计",
            ]
        );
        assert_eq!(cols[0].total, 2);
        assert_eq!(cols[5].total, 3);
    }

    #[test]
    fn subcolumn_question_resolves_to_group_when_root_requested() {
        let t = survey();
        let b = ConditionBuilder::new(&t, &q(&["Q5.2 Apps:QQ"]), &q(&["Q5."]));
        assert_eq!(
            b.resolve("Q5.2 Apps:QQ"),
            Some(QuestionKind::Multi("Q5.".to_string()))
        );
        let alone = ConditionBuilder::new(&t, &q(&["Q5.2 Apps:QQ"]), &[]);
        assert_eq!(
            alone.resolve("Q5.2 Apps:QQ"),
            Some(QuestionKind::Single("Q5.2 Apps:QQ".to_string()))
        );
    }

    #[test]
    fn unknown_questions_are_skipped() {
        let t = survey();
        let b = ConditionBuilder::new(&t, &q(&["Nope"]), &q(&["Q9."]));
        assert!(b.row_conditions(&q(&["Nope"])).is_empty());
        assert!(b.column_conditions(&q(&["Q9."])).is_empty());
    }

    #[test]
    fn mask_ops() {
        let a = Mask::from(vec![true, true, false, false]);
        let b = Mask::from(vec![true, false, true, false]);
        assert_eq!(a.and_count(&b), 1);
        assert_eq!(a.count(), 2);
        assert_eq!(a.len(), 4);
        assert_eq!(a.and(&b), Mask::from(vec![true, false, false, false]));
        assert_eq!(a.and_not(&b), Mask::from(vec![false, true, false, false]));
        assert_eq!(a.not(), Mask::from(vec![false, false, true, true]));
        assert_eq!(a.not().and_not(&b).count(), 1);
        assert_eq!(a.and(&b).count(), a.and_count(&b));
    }
}
