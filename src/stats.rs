//! Per-cell significance testing of a cross-tab.
//!
//! Each (row category, column category) pair is reduced to a 2x2 contingency
//! table of respondents in/out of the row and in/out of the column. Pearson's
//! chi-square with Yates' continuity correction is used when its expected
//! frequencies are large enough, Fisher's exact test otherwise.

use log::debug;
use rayon::prelude::*;
use statrs::distribution::{ChiSquared, ContinuousCDF, Discrete, Hypergeometric};

use crate::conditions::{ColumnCondition, Mask, RowCondition};
use crate::error::{Result, SurveyError};

/// `[[a, b], [c, d]]`: rows = in/out of the row category, columns = in/out of
/// the column category.
pub type Table2x2 = [[u64; 2]; 2];

/// Share of expected cells below 5 above which Fisher's test is used.
const SPARSE_SHARE: f64 = 0.2;

pub fn contingency(row: &Mask, col: &Mask) -> Table2x2 {
    let a = row.and(col).count();
    let b = row.and_not(col).count();
    let c = col.and_not(row).count();
    let d = row.not().and_not(col).count();
    [[a, b], [c, d]]
}

fn margins(t: &Table2x2) -> ([f64; 2], [f64; 2], f64) {
    let rows = [(t[0][0] + t[0][1]) as f64, (t[1][0] + t[1][1]) as f64];
    let cols = [(t[0][0] + t[1][0]) as f64, (t[0][1] + t[1][1]) as f64];
    (rows, cols, rows[0] + rows[1])
}

pub fn expected(t: &Table2x2) -> [[f64; 2]; 2] {
    let (rows, cols, n) = margins(t);
    let mut e = [[0.0; 2]; 2];
    for i in 0..2 {
        for j in 0..2 {
            e[i][j] = if n > 0.0 { rows[i] * cols[j] / n } else { 0.0 };
        }
    }
    e
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquare {
    pub statistic: f64,
    pub p_value: f64,
    pub expected: [[f64; 2]; 2],
}

/// Pearson chi-square with Yates' correction (one degree of freedom).
/// `None` when an expected frequency is zero.
pub fn chi_square(t: &Table2x2) -> Option<ChiSquare> {
    let e = expected(t);
    if e.iter().flatten().any(|&x| x <= 0.0) {
        return None;
    }
    let mut statistic = 0.0;
    for i in 0..2 {
        for j in 0..2 {
            let observed = t[i][j] as f64;
            let diff = e[i][j] - observed;
            let corrected = if diff == 0.0 {
                observed
            } else {
                observed + diff.signum() * diff.abs().min(0.5)
            };
            statistic += (corrected - e[i][j]).powi(2) / e[i][j];
        }
    }
    let p_value = ChiSquared::new(1.0).ok()?.sf(statistic);
    Some(ChiSquare {
        statistic,
        p_value,
        expected: e,
    })
}

/// Two-sided Fisher exact test: total probability of every table with the
/// observed margins that is no more likely than the observed one.
/// `None` when the hypergeometric model cannot be built.
pub fn fisher_exact(t: &Table2x2) -> Option<f64> {
    let (rows, cols, _) = margins(t);
    if rows.contains(&0.0) || cols.contains(&0.0) {
        return Some(1.0);
    }
    let total = t[0][0] + t[0][1] + t[1][0] + t[1][1];
    let successes = t[0][0] + t[0][1];
    let draws = t[0][0] + t[1][0];
    let dist = Hypergeometric::new(total, successes, draws).ok()?;

    let lo = draws.saturating_sub(total - successes);
    let hi = successes.min(draws);
    let threshold = dist.ln_pmf(t[0][0]) + (1.0 + 1e-7f64).ln();

    let p: f64 = (lo..=hi)
        .map(|k| dist.ln_pmf(k))
        .filter(|&lp| lp <= threshold)
        .map(f64::exp)
        .sum();
    p.is_finite().then_some(p.min(1.0))
}

/// Chi-square first; Fisher when the table is sparse or chi-square is not
/// defined.
pub fn significance_test(t: &Table2x2) -> Option<f64> {
    match chi_square(t) {
        Some(chi) => {
            let small = chi.expected.iter().flatten().filter(|&&x| x < 5.0).count();
            if small as f64 / 4.0 > SPARSE_SHARE {
                fisher_exact(t)
            } else {
                Some(chi.p_value)
            }
        }
        None => {
            debug!("chi-square undefined for {t:?}, using Fisher exact test");
            fisher_exact(t)
        }
    }
}

/// p-values for every row/column condition pair; `None` where no test applies.
#[derive(Debug, Clone)]
pub struct SignificanceTable {
    pub p_values: Vec<Vec<Option<f64>>>,
}

impl SignificanceTable {
    pub fn compute(rows: &[RowCondition], cols: &[ColumnCondition]) -> SignificanceTable {
        let p_values = rows
            .par_iter()
            .map(|r| {
                cols.iter()
                    .map(|c| significance_test(&contingency(&r.mask, &c.mask)))
                    .collect()
            })
            .collect();
        SignificanceTable { p_values }
    }
}

/// Star notation for p-values, e.g. `**(0.004)`.
#[derive(Debug, Clone)]
pub struct SigMarker {
    levels: Vec<(f64, String)>,
}

impl SigMarker {
    pub fn new(levels: &[f64], symbols: &[String]) -> Result<SigMarker> {
        if levels.len() != symbols.len() {
            return Err(SurveyError::InvalidConfig(format!(
                "{} significance levels but {} symbols",
                levels.len(),
                symbols.len()
            )));
        }
        if let Some(bad) = levels.iter().find(|l| !(**l > 0.0 && **l < 1.0)) {
            return Err(SurveyError::InvalidConfig(format!(
                "significance level {bad} is outside (0, 1)"
            )));
        }
        Ok(SigMarker {
            levels: levels.iter().copied().zip(symbols.iter().cloned()).collect(),
        })
    }

    /// Symbol of the most stringent level met, followed by the rounded p-value.
    /// Only that one symbol is shown: with the default levels p = 0.004 gives
    /// `**(0.004)`, not the `*` and `**` of every level met joined together.
    pub fn mark(&self, p: Option<f64>) -> String {
        let Some(p) = p else {
            return String::new();
        };
        let symbol = self
            .levels
            .iter()
            .filter(|(level, _)| p <= *level)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, s)| s.as_str())
            .unwrap_or("");
        format!("{symbol}({p:.3})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1e-300)
    }

    #[test]
    fn yates_corrected_chi_square() {
        let chi = chi_square(&[[30, 20], [10, 40]]).unwrap();
        assert!(close(chi.statistic, 15.041_666_666_666_668, 1e-12));
        assert!(close(chi.p_value, 0.000_105_163_554_033_630_91, 1e-8));
        let even = chi_square(&[[100, 100], [100, 100]]).unwrap();
        assert_eq!(even.statistic, 0.0);
        assert_eq!(even.p_value, 1.0);
    }

    #[test]
    fn chi_square_undefined_with_empty_margin() {
        assert!(chi_square(&[[0, 5], [0, 5]]).is_none());
        assert_eq!(fisher_exact(&[[0, 5], [0, 5]]), Some(1.0));
        assert_eq!(significance_test(&[[0, 5], [0, 5]]), Some(1.0));
    }

    #[test]
    fn fisher_two_sided() {
        let p = fisher_exact(&[[8, 2], [1, 5]]).unwrap();
        assert!(close(p, 0.034_965_034_965_034_95, 1e-9));
        let p = fisher_exact(&[[3, 1], [1, 3]]).unwrap();
        assert!(close(p, 0.485_714_285_714_284_93, 1e-9));
    }

    #[test]
    fn fisher_handles_large_samples() {
        // factorials of these margins overflow f64
        let p = fisher_exact(&[[1200, 800], [800, 1200]]).unwrap();
        assert!(p.is_finite() && p < 1e-20);
        let even = fisher_exact(&[[1000, 1000], [1000, 1000]]).unwrap();
        assert!(close(even, 1.0, 1e-6));
    }

    #[test]
    fn sparse_tables_fall_back_to_fisher() {
        let t = [[8, 2], [1, 5]];
        assert_eq!(significance_test(&t), fisher_exact(&t));
        let dense = [[30, 20], [10, 40]];
        assert_eq!(significance_test(&dense), Some(chi_square(&dense).unwrap().p_value));
    }

    #[test]
    fn contingency_from_masks() {
        let r = Mask::from(vec![true, true, false, false, true]);
        let c = Mask::from(vec![true, false, true, false, false]);
        assert_eq!(contingency(&r, &c), [[1, 2], [1, 1]]);
        let table = contingency(&r, &c);
        let n: u64 = table.iter().flatten().sum();
        assert_eq!(n, r.len() as u64);
        assert_eq!(contingency(&c, &r), [[1, 1], [2, 1]]);
    }

    #[test]
    fn star_marks() {
        let m = SigMarker::new(
            &[0.05, 0.01, 0.001],
            &["*".to_string(), "**".to_string(), "***".to_string()],
        )
        .unwrap();
        assert_eq!(m.mark(Some(0.2)), "(0.200)");
        assert_eq!(m.mark(Some(0.03)), "*(0.030)");
        assert_eq!(m.mark(Some(0.004)), "**(0.004)");
        assert_eq!(m.mark(Some(0.01)), "**(0.010)");
        assert_eq!(m.mark(Some(0.0001)), "***(0.000)");
        assert_eq!(m.mark(None), "");
    }

    #[test]
    fn marker_rejects_mismatched_config() {
        assert!(SigMarker::new(&[0.05, 0.01], &["*".to_string()]).is_err());
        assert!(SigMarker::new(&[1.5], &["*".to_string()]).is_err());
    }
}
