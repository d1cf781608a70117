//! Derived variables: map answers to new codes or bin numeric answers.

use std::collections::HashMap;

use log::{info, warn};
use serde::Deserialize;

use crate::error::{Result, SurveyError};
use crate::table::{CellValue, SurveyTable};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecodeMethod {
    /// Keys are the displayed source value; unmapped values become empty.
    Map { mapping: HashMap<String, String> },
    /// Right-closed intervals `(bins[i], bins[i + 1]]`, one label each.
    Cut { bins: Vec<f64>, labels: Vec<String> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecodeRule {
    pub source: String,
    pub target: String,
    pub method: RecodeMethod,
}

impl RecodeRule {
    fn recode(&self, value: &CellValue) -> CellValue {
        match &self.method {
            RecodeMethod::Map { mapping } => {
                if value.is_missing() {
                    return CellValue::Empty;
                }
                mapping
                    .get(&value.display())
                    .map(|v| CellValue::infer(v))
                    .unwrap_or(CellValue::Empty)
            }
            RecodeMethod::Cut { bins, labels } => {
                let Some(x) = value.as_f64() else {
                    return CellValue::Empty;
                };
                bins.windows(2)
                    .position(|w| x > w[0] && x <= w[1])
                    .map(|i| CellValue::Text(labels[i].clone()))
                    .unwrap_or(CellValue::Empty)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if let RecodeMethod::Cut { bins, labels } = &self.method {
            if bins.len() < 2 || labels.len() != bins.len() - 1 {
                return Err(SurveyError::InvalidConfig(format!(
                    "recode '{}': {} bins need {} labels, got {}",
                    self.target,
                    bins.len(),
                    bins.len().saturating_sub(1),
                    labels.len()
                )));
            }
            if bins.windows(2).any(|w| w[0] >= w[1]) {
                return Err(SurveyError::InvalidConfig(format!(
                    "recode '{}': bins must increase monotonically",
                    self.target
                )));
            }
        }
        Ok(())
    }
}

/// Apply recode rules in order; later rules may read columns created by
/// earlier ones.
pub fn apply_recodes(table: &mut SurveyTable, rules: &[RecodeRule]) -> Result<()> {
    for rule in rules {
        rule.validate()?;
        let Some(src) = table.column(&rule.source) else {
            warn!(
                "Source column '{}' does not exist, skipping recode",
                rule.source
            );
            continue;
        };
        let values: Vec<CellValue> = table.values(src).map(|v| rule.recode(v)).collect();
        table.set_column(&rule.target, values);
        info!("Recoded '{}' into '{}'", rule.source, rule.target);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SurveyTable {
        SurveyTable::from_csv_bytes("age,sex\n17,1\n25,2\n40,\n61,3\n".as_bytes()).unwrap()
    }

    #[test]
    fn cut_into_bins() {
        let mut t = table();
        let rules: Vec<RecodeRule> = serde_json::from_str(
            r#"[{"source":"age","target":"age_group",
                 "method":{"cut":{"bins":[0,18,40,100],"labels":["minor","young","older"]}}}]"#,
        )
        .unwrap();
        apply_recodes(&mut t, &rules).unwrap();
        let idx = t.column("age_group").unwrap();
        let got: Vec<String> = t.values(idx).map(|v| v.display()).collect();
        assert_eq!(got, vec!["minor", "young", "young", "older"]);
    }

    #[test]
    fn map_values_and_unmapped_become_empty() {
        let mut t = table();
        let rules: Vec<RecodeRule> = serde_json::from_str(
            r#"[{"source":"sex","target":"sex","method":{"map":{"mapping":{"1":"M","2":"F"}}}}]"#,
        )
        .unwrap();
        apply_recodes(&mut t, &rules).unwrap();
        let idx = t.column("sex").unwrap();
        let got: Vec<CellValue> = t.values(idx).cloned().collect();
        assert_eq!(
            got,
            vec![
                CellValue::Text("M".into()),
                CellValue::Text("F".into()),
                CellValue::Empty,
                CellValue::Empty
            ]
        );
        assert_eq!(t.headers.len(), 2);
    }

    #[test]
    fn missing_source_is_skipped() {
        let mut t = table();
        let rules: Vec<RecodeRule> = serde_json::from_str(
            r#"[{"source":"nope","target":"x","method":{"map":{"mapping":{}}}}]"#,
        )
        .unwrap();
        apply_recodes(&mut t, &rules).unwrap();
        assert!(t.column("x").is_none());
    }

    #[test]
    fn label_count_mismatch_is_rejected() {
        let mut t = table();
        let rules: Vec<RecodeRule> = serde_json::from_str(
            r#"[{"source":"age","target":"g","method":{"cut":{"bins":[0,10,20],"labels":["a"]}}}]"#,
        )
        .unwrap();
        assert!(matches!(
            apply_recodes(&mut t, &rules),
            Err(SurveyError::InvalidConfig(_))
        ));
    }
}
