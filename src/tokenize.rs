//! Tokenizer and word-frequency counting for mixed CJK / Latin answers.

use std::collections::{HashMap, HashSet};

/// Placeholder entry used when no word survives filtering.
pub const NO_DATA: &str = "暂无数据";

pub(crate) fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Run {
    Cjk,
    Word,
    Break,
}

fn classify(c: char) -> Run {
    if is_cjk(c) {
        Run::Cjk
    } else if c.is_alphanumeric() {
        Run::Word
    } else {
        Run::Break
    }
}

/// Splits text into words. Latin runs are kept whole; CJK runs are cut by
/// forward maximum matching against the lexicon, and stretches the lexicon
/// does not cover fall back to two-character chunks.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    lexicon: HashSet<String>,
    max_len: usize,
}

impl Tokenizer {
    pub fn new<I, S>(words: I) -> Tokenizer
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokenizer = Tokenizer::default();
        for w in words {
            tokenizer.add_word(w);
        }
        tokenizer
    }

    pub fn add_word<S: Into<String>>(&mut self, word: S) {
        let word = word.into();
        let word = word.trim();
        let len = word.chars().count();
        if len > 1 && word.chars().all(is_cjk) {
            self.max_len = self.max_len.max(len);
            self.lexicon.insert(word.to_string());
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut run = String::new();
        let mut kind = Run::Break;
        for c in text.chars() {
            let k = classify(c);
            if k != kind {
                self.flush(&mut tokens, &run, kind);
                run.clear();
                kind = k;
            }
            if k != Run::Break {
                run.push(c);
            }
        }
        self.flush(&mut tokens, &run, kind);
        tokens
    }

    fn flush(&self, tokens: &mut Vec<String>, run: &str, kind: Run) {
        match kind {
            Run::Break => {}
            Run::Word if !run.is_empty() => tokens.push(run.to_string()),
            Run::Word => {}
            Run::Cjk => self.segment_cjk(tokens, run),
        }
    }

    fn segment_cjk(&self, tokens: &mut Vec<String>, run: &str) {
        let chars: Vec<char> = run.chars().collect();
        let mut unmatched: Vec<char> = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let longest = (2..=self.max_len.min(chars.len() - i))
                .rev()
                .find(|&n| {
                    let cand: String = chars[i..i + n].iter().collect();
                    self.lexicon.contains(&cand)
                });
            match longest {
                Some(n) => {
                    push_chunks(tokens, &unmatched);
                    unmatched.clear();
                    tokens.push(chars[i..i + n].iter().collect());
                    i += n;
                }
                None => {
                    unmatched.push(chars[i]);
                    i += 1;
                }
            }
        }
        push_chunks(tokens, &unmatched);
    }

    /// Count tokens longer than one character that are not stopwords, drop
    /// those seen fewer than `min_freq` times, and sort by count then word.
    pub fn word_frequencies<S: AsRef<str>>(
        &self,
        texts: &[S],
        stopwords: &[String],
        min_freq: u32,
    ) -> Vec<(String, u32)> {
        let stop: HashSet<&str> = stopwords.iter().map(|s| s.trim()).collect();
        let words: Vec<String> = texts
            .iter()
            .flat_map(|t| self.tokenize(t.as_ref()))
            .filter(|w| w.chars().count() > 1 && !stop.contains(w.as_str()))
            .collect();
        let mut frequency = count_words(&words);
        frequency.retain(|_, n| *n >= min_freq);
        if frequency.is_empty() {
            return vec![(NO_DATA.to_string(), 1)];
        }
        sort_map_to_vec(frequency)
    }
}

fn push_chunks(tokens: &mut Vec<String>, chars: &[char]) {
    tokens.extend(chars.chunks(2).map(|c| c.iter().collect::<String>()));
}

/// Count occurrences of each word.
pub fn count_words(words: &[String]) -> HashMap<String, u32> {
    let mut frequency: HashMap<String, u32> = HashMap::new();
    for word in words {
        *frequency.entry(word.to_owned()).or_insert(0) += 1;
    }
    frequency
}

/// Sort by frequency descending; ties alphabetically.
pub fn sort_map_to_vec(frequency: HashMap<String, u32>) -> Vec<(String, u32)> {
    let mut vec_sorted: Vec<(String, u32)> = frequency.into_iter().collect();
    vec_sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    vec_sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicon_words_stay_whole() {
        let t = Tokenizer::new(["红石", "好玩"]);
        assert_eq!(t.tokenize("红石电路很好玩"), vec!["红石", "电路", "很", "好玩"]);
    }

    #[test]
    fn longest_match_wins() {
        let t = Tokenizer::new(["多人", "多人游戏"]);
        assert_eq!(t.tokenize("多人游戏好"), vec!["多人游戏", "好"]);
    }

    #[test]
    fn latin_runs_and_punctuation() {
        let t = Tokenizer::new(["光影"]);
        assert_eq!(
            t.tokenize("I love MOD光影, v1.20!"),
            vec!["I", "love", "MOD", "光影", "v1", "20"]
        );
        assert!(t.tokenize("  ，。 ").is_empty());
    }

    #[test]
    fn no_lexicon_falls_back_to_bigrams() {
        let t = Tokenizer::default();
        assert_eq!(t.tokenize("经常卡顿了"), vec!["经常", "卡顿", "了"]);
    }

    #[test]
    fn counts_sorted_and_filtered() {
        let t = Tokenizer::new(["卡顿", "闪退"]);
        let texts = ["卡顿 卡顿", "闪退的卡顿", "mod mod lag"];
        let freq = t.word_frequencies(&texts, &["的".to_string(), "lag".to_string()], 2);
        assert_eq!(
            freq,
            vec![("卡顿".to_string(), 3), ("mod".to_string(), 2)]
        );
    }

    #[test]
    fn empty_counts_fall_back() {
        let t = Tokenizer::default();
        let none: [&str; 0] = [];
        assert_eq!(t.word_frequencies(&none, &[], 2), vec![(NO_DATA.to_string(), 1)]);
    }

    #[test]
    fn test_count() {
        let words = vec!["one".to_string(), "two".to_string(), "two".to_string()];
        let counted = count_words(&words);
        let mut expected = HashMap::new();
        expected.insert("one".to_string(), 1_u32);
        expected.insert("two".to_string(), 2_u32);
        assert_eq!(counted, expected);
        assert_eq!(
            sort_map_to_vec(counted),
            vec![("two".to_string(), 2), ("one".to_string(), 1)]
        );
    }
}
