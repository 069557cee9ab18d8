use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn word_re() -> &'static Regex {
    static WORD_RE: OnceLock<Regex> = OnceLock::new();
    WORD_RE.get_or_init(|| Regex::new(r"\w+").expect("valid regex"))
}

/// Lower-cased `\w+` tokens of a name, in order.
pub fn tokenize(name: &str) -> Vec<String> {
    word_re()
        .find_iter(name)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Token → occurrence count over the canonical company name corpus.
///
/// Pure function of the corpus. In consume mode (1:1 ticker linking) the
/// index is decremented as candidates are claimed, so a token shared by
/// two claimed names eventually disappears from the index entirely.
#[derive(Debug, Clone, Default)]
pub struct TokenFrequencyIndex {
    counts: HashMap<String, u32>,
}

impl TokenFrequencyIndex {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for name in names {
            for token in tokenize(name.as_ref()) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
        Self { counts }
    }

    /// Occurrence count for a token; 0 for tokens absent from the corpus.
    pub fn count(&self, token: &str) -> u32 {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Decrement every token of a consumed name, pruning counts at zero.
    pub fn consume(&mut self, name: &str) {
        for token in tokenize(name) {
            if let Some(count) = self.counts.get_mut(&token) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.counts.remove(&token);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
