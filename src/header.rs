//! Multi-select question groups encoded in flat column headers.
//!
//! Survey exports spread a multi-select question over several columns that
//! share a `Q<n>.` prefix, e.g. `Q3.1 Which apps:WeChat`, `Q3.2 Which apps:QQ`.
//! Asking for the bare root `Q3.` selects the whole group.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

static ROOT_EXACT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Q\d+\.$").unwrap());
static ROOT_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Q\d+\.").unwrap());
static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)").unwrap());

/// True when `q` names a whole multi-select group (`Q12.`).
pub fn is_group_root(q: &str) -> bool {
    ROOT_EXACT.is_match(q.trim())
}

/// The `Q<n>.` prefix of a question, if it has one.
pub fn question_root(q: &str) -> Option<&str> {
    ROOT_PREFIX.find(q.trim()).map(|m| m.as_str())
}

/// Leading integer of `s`, if any.
pub fn leading_int(s: &str) -> Option<u64> {
    LEADING_INT
        .captures(s)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Text after `root` in a sub-column header, trimmed.
pub fn remainder<'a>(subcol: &'a str, root: &str) -> &'a str {
    subcol.trim().strip_prefix(root).unwrap_or(subcol).trim()
}

/// Ordering key of a sub-column: the number right after the root, 0 if none.
pub fn subcol_number(subcol: &str, root: &str) -> u64 {
    leading_int(remainder(subcol, root)).unwrap_or(0)
}

/// Split a remainder into question text and option text at the first colon.
pub fn split_question_option(rest: &str) -> (&str, &str) {
    match rest.find([':', '：']) {
        Some(i) => {
            let sep_len = rest[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            (rest[..i].trim(), rest[i + sep_len..].trim())
        }
        None => (rest, rest),
    }
}

/// Sub-column headers of one multi-select question, in option order.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiGroup {
    pub root: String,
    pub subcols: Vec<String>,
}

impl MultiGroup {
    /// Question text taken from the first sub-column.
    pub fn question_text(&self) -> &str {
        self.subcols
            .first()
            .map(|s| split_question_option(remainder(s, &self.root)).0)
            .unwrap_or("")
    }
}

/// Roots requested by the user among row and column questions.
pub fn requested_roots<'a, I>(questions: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    questions
        .into_iter()
        .map(|q| q.trim())
        .filter(|q| is_group_root(q))
        .map(str::to_string)
        .collect()
}

/// Recover multi-select groups from headers. Groups with a single column are
/// not multi-select and are dropped.
pub fn collect_groups(
    headers: &[String],
    roots: &BTreeSet<String>,
) -> BTreeMap<String, MultiGroup> {
    let mut groups = BTreeMap::new();
    for root in roots {
        let mut subcols: Vec<String> = headers
            .iter()
            .filter(|h| h.trim().starts_with(root.as_str()))
            .cloned()
            .collect();
        if subcols.len() <= 1 {
            continue;
        }
        subcols.sort_by_key(|s| subcol_number(s, root));
        groups.insert(
            root.clone(),
            MultiGroup {
                root: root.clone(),
                subcols,
            },
        );
    }
    groups
}

/// Scan every header for `Q<n>.` prefixes and report groups of two or more
/// columns; used by the data preview.
pub fn detect_groups(headers: &[String]) -> BTreeMap<String, MultiGroup> {
    let roots: BTreeSet<String> = headers
        .iter()
        .filter_map(|h| question_root(h))
        .map(str::to_string)
        .collect();
    collect_groups(headers, &roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn root_patterns() {
        assert!(is_group_root("Q3."));
        assert!(is_group_root(" Q12. "));
        assert!(!is_group_root("Q3.1"));
        assert!(!is_group_root("q3."));
        assert_eq!(question_root("Q3.2 apps:QQ"), Some("Q3."));
        assert_eq!(question_root("Gender"), None);
    }

    #[test]
    fn subcol_numbers() {
        assert_eq!(subcol_number("Q3.10 apps:QQ", "Q3."), 10);
        assert_eq!(subcol_number("Q3. other", "Q3."), 0);
    }

    #[test]
    fn split_on_ascii_and_fullwidth_colon() {
        assert_eq!(split_question_option("1 apps:QQ"), ("1 apps", "QQ"));
        assert_eq!(split_question_option("1 常用应用：微信"), ("1 常用应用", "微信"));
        assert_eq!(split_question_option("no colon"), ("no colon", "no colon"));
    }

    #[test]
    fn groups_sorted_and_singletons_dropped() {
        let h = headers(&[
            "Q3.10 apps:X",
            "Gender",
            "Q3.2 apps:QQ",
            "Q3.1 apps:WeChat",
            "Q4.1 only",
        ]);
        let roots = requested_roots(&headers(&["Q3.", "Q4.", "Gender"]));
        let groups = collect_groups(&h, &roots);
        assert_eq!(groups.len(), 1);
        let g = &groups["Q3."];
        assert_eq!(g.subcols, vec!["Q3.1 apps:WeChat", "Q3.2 apps:QQ", "Q3.10 apps:X"]);
        assert_eq!(g.question_text(), "1 apps");
    }

    #[test]
    fn q1_does_not_swallow_q10() {
        let h = headers(&["Q1.1 a", "Q1.2 b", "Q10.1 c", "Q10.2 d"]);
        let groups = detect_groups(&h);
        assert_eq!(groups["Q1."].subcols.len(), 2);
        assert_eq!(groups["Q10."].subcols.len(), 2);
    }
}
