//! Rule-based tagging of open-ended answers with negation handling.

use serde::Deserialize;

/// A tag and the keywords that trigger it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TagRule {
    pub tag: String,
    pub keywords: Vec<String>,
}

/// Matched tags and keywords, de-duplicated in first-match order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMatch {
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
}

impl TagMatch {
    pub fn tags_joined(&self) -> String {
        self.tags.join(", ")
    }

    pub fn keywords_joined(&self) -> String {
        self.keywords.join(", ")
    }

    fn record(&mut self, tag: &str, keyword: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
        if !self.keywords.iter().any(|k| k == keyword) {
            self.keywords.push(keyword.to_string());
        }
    }
}

const SENTENCE_BREAKS: [char; 8] = [',', '.', '，', '。', '！', '？', '；', '\n'];

#[derive(Debug, Clone)]
pub struct Tagger {
    rules: Vec<TagRule>,
    negations: Vec<String>,
    max_context: usize,
}

impl Tagger {
    pub fn new(rules: Vec<TagRule>, negations: Vec<String>, max_context: usize) -> Tagger {
        let negations = negations.into_iter().filter(|n| !n.is_empty()).collect();
        let rules = rules
            .into_iter()
            .map(|r| TagRule {
                keywords: r.keywords.into_iter().filter(|k| !k.is_empty()).collect(),
                ..r
            })
            .collect();
        Tagger {
            rules,
            negations,
            max_context,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(|r| r.keywords.is_empty())
    }

    /// All keywords, used to seed the tokenizer lexicon.
    pub fn keywords(&self) -> impl Iterator<Item = &str> + '_ {
        self.rules
            .iter()
            .flat_map(|r| r.keywords.iter().map(String::as_str))
    }

    fn negated(&self, s: &str) -> bool {
        self.negations.iter().any(|n| s.contains(n.as_str()))
    }

    /// Sentences containing a negation word are skipped entirely; otherwise a
    /// keyword counts unless a negation word sits within `max_context`
    /// characters of it.
    pub fn tag_text(&self, text: &str) -> TagMatch {
        let mut found = TagMatch::default();
        for sentence in text.split(SENTENCE_BREAKS) {
            let sentence = sentence.trim();
            if sentence.is_empty() || self.negated(sentence) {
                continue;
            }
            let chars: Vec<char> = sentence.chars().collect();
            for rule in &self.rules {
                for kw in &rule.keywords {
                    let Some(byte_pos) = sentence.find(kw.as_str()) else {
                        continue;
                    };
                    let pos = sentence[..byte_pos].chars().count();
                    let start = pos.saturating_sub(self.max_context);
                    let end = (pos + kw.chars().count() + self.max_context).min(chars.len());
                    let context: String = chars[start..end].iter().collect();
                    if !self.negated(&context) {
                        found.record(&rule.tag, kw);
                    }
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextOptions;

    fn tagger() -> Tagger {
        let o = TextOptions::default();
        Tagger::new(o.tags, o.negation_words, o.max_context)
    }

    #[test]
    fn tags_positive_mentions() {
        let m = tagger().tag_text("红石电路很好玩，联机也方便");
        assert_eq!(m.tags, vec!["核心玩法", "社交联机"]);
        assert_eq!(m.keywords, vec!["好玩", "红石", "联机"]);
        assert_eq!(m.tags_joined(), "核心玩法, 社交联机");
    }

    #[test]
    fn negated_sentences_are_ignored() {
        let m = tagger().tag_text("一点也不好玩。经常卡顿");
        assert_eq!(m.tags, vec!["性能体验"]);
        assert_eq!(m.keywords_joined(), "卡顿");
    }

    #[test]
    fn duplicates_collapse() {
        let m = tagger().tag_text("卡顿, 卡顿, 闪退");
        assert_eq!(m.tags, vec!["性能体验"]);
        assert_eq!(m.keywords, vec!["卡顿", "闪退"]);
    }

    #[test]
    fn empty_text_matches_nothing() {
        assert_eq!(tagger().tag_text(""), TagMatch::default());
        let none = Tagger::new(vec![], vec![], 3);
        assert!(none.is_empty());
    }

    #[test]
    fn ascii_keywords_respect_case() {
        let m = tagger().tag_text("I love MOD packs");
        assert_eq!(m.keywords, vec!["MOD"]);
    }
}
