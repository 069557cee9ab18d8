use tracing::debug;

use sgxpipe_common::types::{CanonicalCompany, MatchResult};

use crate::freq::{tokenize, TokenFrequencyIndex};

/// Trailing corporate suffix tokens stripped during canonicalization.
/// The strip runs twice per name so compound suffixes like
/// "HOLDINGS LTD" reduce fully.
const CORPORATE_SUFFIXES: &[&str] = &[
    "ltd", "limited", "pte", "inc", "incorporated", "corp", "corporation", "company", "co", "llc",
    "llp", "plc", "holdings", "holding", "bhd", "berhad", "sa", "ag", "nv", "gmbh",
];

/// English stopwords removed before building the comparison string.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Confidence assigned to an exact or post-normalization equal match.
const EXACT_CONFIDENCE: f32 = 100.0;
/// Matches below this floor carry `matched_name = None`.
const CONFIDENCE_FLOOR: f32 = 100.0;
/// Penalty applied to a 100-score match whose tokens are all generic.
const GENERIC_PENALTY: f32 = 0.5;

/// Rarity-weighted fuzzy matcher from scraped names to canonical names.
///
/// The scoring ladder: exact match, suffix-stripped + stopword-free
/// equality, then a substring-aware partial ratio. A perfect partial ratio
/// on non-identical strings only counts when the scraped name contains at
/// least one rare token — otherwise a generic phrase like "Common
/// International" would claim any catalog name it happens to sit inside.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    rarity_threshold: u32,
}

impl EntityResolver {
    pub fn new(rarity_threshold: u32) -> Self {
        Self { rarity_threshold }
    }

    /// Resolve one scraped name against the candidate pool.
    ///
    /// Deterministic for a fixed (name, candidates, index) triple; ties
    /// keep the first-seen candidate.
    pub fn resolve(
        &self,
        name: &str,
        candidates: &[CanonicalCompany],
        index: &TokenFrequencyIndex,
    ) -> MatchResult {
        let entity = clean(name);
        if entity.is_empty() || candidates.is_empty() {
            return MatchResult::unmatched(name, 0.0, "");
        }

        // Exact-match fast path: no fuzzy scan needed.
        for candidate in candidates {
            if entity == clean(&candidate.name) {
                return MatchResult {
                    original_name: name.to_string(),
                    matched_name: Some(candidate.name.clone()),
                    confidence: EXACT_CONFIDENCE,
                    source_id: candidate.company_id.clone(),
                };
            }
        }

        let entity_key = comparison_key(&entity);
        let mut best: Option<(&CanonicalCompany, f32, bool)> = None;

        for candidate in candidates {
            let (score, matched) = self.score(&entity, &entity_key, &candidate.name, index);
            if best.as_ref().is_none_or(|(_, s, _)| score > *s) {
                best = Some((candidate, score, matched));
            }
        }

        match best {
            Some((candidate, score, true)) if score >= CONFIDENCE_FLOOR => MatchResult {
                original_name: name.to_string(),
                matched_name: Some(candidate.name.clone()),
                confidence: score,
                source_id: candidate.company_id.clone(),
            },
            Some((_, score, _)) => MatchResult::unmatched(name, score, ""),
            None => MatchResult::unmatched(name, 0.0, ""),
        }
    }

    /// Resolve with 1:1 consumption, for ticker-to-company linking.
    ///
    /// When exactly one candidate reaches full confidence, it is removed
    /// from the pool and its tokens decremented in the index, so no later
    /// input can claim it again. Ambiguous inputs (two full-confidence
    /// candidates) consume nothing.
    pub fn resolve_consuming(
        &self,
        name: &str,
        pool: &mut Vec<CanonicalCompany>,
        index: &mut TokenFrequencyIndex,
    ) -> MatchResult {
        let entity = clean(name);
        if entity.is_empty() || pool.is_empty() {
            return MatchResult::unmatched(name, 0.0, "");
        }

        let entity_key = comparison_key(&entity);
        let mut best: Option<(usize, f32, bool)> = None;
        let mut full_matches = 0usize;

        for (i, candidate) in pool.iter().enumerate() {
            let (score, matched) = if entity == clean(&candidate.name) {
                (EXACT_CONFIDENCE, true)
            } else {
                self.score(&entity, &entity_key, &candidate.name, index)
            };
            if matched && score >= CONFIDENCE_FLOOR {
                full_matches += 1;
            }
            if best.as_ref().is_none_or(|(_, s, _)| score > *s) {
                best = Some((i, score, matched));
            }
        }

        match best {
            Some((i, score, true)) if score >= CONFIDENCE_FLOOR && full_matches == 1 => {
                let candidate = pool.remove(i);
                index.consume(&candidate.name);
                debug!(
                    name,
                    matched = candidate.name.as_str(),
                    "Consumed candidate from pool"
                );
                MatchResult {
                    original_name: name.to_string(),
                    matched_name: Some(candidate.name.clone()),
                    confidence: score,
                    source_id: candidate.company_id,
                }
            }
            Some((_, score, _)) => MatchResult::unmatched(name, score, ""),
            None => MatchResult::unmatched(name, 0.0, ""),
        }
    }

    /// Score one candidate. Returns (confidence, reliable-match flag).
    fn score(
        &self,
        entity: &str,
        entity_key: &str,
        official: &str,
        index: &TokenFrequencyIndex,
    ) -> (f32, bool) {
        // Multi-listing names carry variants after '/'; match the first.
        let official = clean(official);
        let official = official.split('/').next().unwrap_or("").trim();
        let official_key = comparison_key(official);

        if !entity_key.is_empty() && entity_key == official_key {
            return (EXACT_CONFIDENCE, true);
        }

        let score = partial_ratio(entity_key, &official_key);
        if score < 100 {
            return (score as f32, false);
        }

        // Perfect substring alignment on non-identical strings: only trust
        // it when the scraped name carries at least one rare token.
        if self.has_rare_token(entity, index) {
            (EXACT_CONFIDENCE, true)
        } else {
            (score as f32 * GENERIC_PENALTY, false)
        }
    }

    /// True when any token of the (suffix-stripped) original name occurs
    /// fewer than `rarity_threshold` times in the corpus. Tokens absent
    /// from the index count as rare.
    fn has_rare_token(&self, entity: &str, index: &TokenFrequencyIndex) -> bool {
        let stripped = strip_suffixes(&strip_suffixes(entity));
        tokenize(&stripped)
            .iter()
            .any(|token| index.count(token) < self.rarity_threshold)
    }
}

/// Shared pre-normalization: drop `&` and `'s`, trim whitespace.
fn clean(name: &str) -> String {
    name.replace('&', "").replace("'s", "").trim().to_string()
}

/// Remove one trailing corporate suffix token, if present.
fn strip_suffixes(name: &str) -> String {
    let trimmed = name.trim();
    if let Some((head, last)) = trimmed.rsplit_once(char::is_whitespace) {
        let token = last
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if CORPORATE_SUFFIXES.contains(&token.as_str()) {
            return head.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Build the comparison string: strip suffixes twice, lower-case, map
/// punctuation to spaces, drop stopwords, concatenate the rest.
fn comparison_key(name: &str) -> String {
    let stripped = strip_suffixes(&strip_suffixes(name)).to_lowercase();
    let spaced: String = stripped
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced
        .split_whitespace()
        .filter(|token| !STOPWORDS.contains(token))
        .collect()
}

/// Substring-aware similarity in [0, 100]: the best normalized Levenshtein
/// ratio between the shorter string and every equal-length window of the
/// longer one. 100 whenever the shorter is a verbatim substring.
fn partial_ratio(a: &str, b: &str) -> u32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (&a_chars, &b_chars)
    } else {
        (&b_chars, &a_chars)
    };

    if short.is_empty() {
        return if long.is_empty() { 100 } else { 0 };
    }

    let short_str: String = short.iter().collect();
    let mut best = 0.0f64;
    for start in 0..=(long.len() - short.len()) {
        let window: String = long[start..start + short.len()].iter().collect();
        let sim = strsim::normalized_levenshtein(&short_str, &window);
        if sim > best {
            best = sim;
        }
        if best >= 1.0 {
            break;
        }
    }

    (best * 100.0).round() as u32
}
