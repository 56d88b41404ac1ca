use std::collections::HashSet;
use std::path::Path;

use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A sentence cut out of the analysed text.
///
/// `start` and `end` are byte offsets into the original input (half-open), so
/// `&text[start..end] == sentence.text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sentence {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// One member of a duplicate group. Every sentence in a group of two or more
/// gets its own range; `group_index` is shared by the whole group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DuplicateRange {
    pub start: usize,
    pub end: usize,
    pub group_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TextStats {
    pub chars_with_spaces: usize,
    pub chars_without_spaces: usize,
    pub bytes_with_spaces: usize,
    pub bytes_without_spaces: usize,
}

/// A slice of the analysed text ready for rendering. Marked spans carry a
/// palette slot in `color`; gaps between duplicates have `color: None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    pub color: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub stats: TextStats,
    pub sentence_count: usize,
    pub group_count: usize,
    pub duplicates: Vec<DuplicateRange>,
}

// ---------------------------------------------------------------------------
// Hyperparameters
// ---------------------------------------------------------------------------

struct Hyperparameters {
    word_weight: f64,
    char_weight: f64,
    max_length_diff_ratio: f64,
    default_threshold: f64,
    default_min_sentence_chars: usize,
}

static HP: Hyperparameters = Hyperparameters {
    word_weight: 0.7,
    char_weight: 0.3,
    max_length_diff_ratio: 0.5,
    default_threshold: 0.6,
    default_min_sentence_chars: 3,
};

/// Number of highlight colours; marked spans use `group_index % PALETTE_SIZE`.
pub const PALETTE_SIZE: usize = 6;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum similarity for a sentence to join an anchor's group.
    pub threshold: f64,
    /// Lines and sentences with this many characters or fewer are ignored.
    pub min_sentence_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: HP.default_threshold,
            min_sentence_chars: HP.default_min_sentence_chars,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::InvalidThreshold(self.threshold));
        }
        Ok(())
    }

    /// Parses a JSON config. Missing fields fall back to their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid threshold {0}: expected a value between 0 and 1")]
    InvalidThreshold(f64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Compiled patterns
// ---------------------------------------------------------------------------

// A run of non-terminators plus at most one terminator (ASCII and full-width).
static SENTENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?。！？]+[.!?。！？]?").unwrap());

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Byte offset of the first occurrence of `needle` in `text` at or after `from`.
fn locate(text: &str, needle: &str, from: usize) -> Option<usize> {
    text.get(from..)?.find(needle).map(|i| from + i)
}

// ---------------------------------------------------------------------------
// Segmentation
// ---------------------------------------------------------------------------

pub fn segment(text: &str) -> Vec<Sentence> {
    segment_with(text, HP.default_min_sentence_chars)
}

/// Splits `text` into sentences line by line.
///
/// Lines whose trimmed length is `min_chars` characters or less are skipped,
/// as are sentence candidates of that length. Each kept candidate is located
/// in the full text by searching forward from the scan cursor; a candidate
/// that cannot be found is dropped.
pub fn segment_with(text: &str, min_chars: usize) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut current_position = 0usize;

    for line in text.split('\n') {
        if char_len(line.trim()) > min_chars {
            let mut cursor = current_position;
            for m in SENTENCE_RE.find_iter(line) {
                let sentence_text = m.as_str().trim();
                if char_len(sentence_text) <= min_chars {
                    continue;
                }
                match locate(text, sentence_text, cursor) {
                    Some(start) => {
                        let end = start + sentence_text.len();
                        cursor = end;
                        sentences.push(Sentence {
                            text: sentence_text.to_string(),
                            start,
                            end,
                        });
                    }
                    None => {
                        warn!("dropping sentence not found at or after byte {cursor}: {sentence_text:?}");
                    }
                }
            }
        }
        current_position += line.len() + 1;
    }

    debug!("found {} sentences", sentences.len());
    sentences
}

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// Blended similarity in `[0, 1]`: 70% word-set Jaccard overlap plus 30%
/// positional character agreement, both over the lowercased,
/// whitespace-collapsed strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    let s1 = normalize(a);
    let s2 = normalize(b);

    if s1 == s2 {
        trace!("exact match: {s1:?}");
        return 1.0;
    }

    let len1 = char_len(&s1);
    let len2 = char_len(&s2);
    let max_len = len1.max(len2);
    if max_len == 0 {
        return 1.0;
    }

    let length_diff = len1.abs_diff(len2) as f64 / max_len as f64;
    if length_diff > HP.max_length_diff_ratio {
        return 0.0;
    }

    let set1: HashSet<&str> = s1.split_whitespace().collect();
    let set2: HashSet<&str> = s2.split_whitespace().collect();
    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }

    let intersection = set1.intersection(&set2).count();
    let union = set1.union(&set2).count();
    let word_similarity = intersection as f64 / union as f64;

    let matches = s1
        .chars()
        .zip(s2.chars())
        .filter(|(x, y)| x == y)
        .count();
    let char_similarity = matches as f64 / max_len as f64;

    HP.word_weight * word_similarity + HP.char_weight * char_similarity
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Star clustering: each unclaimed sentence becomes an anchor and claims every
/// later unclaimed sentence scoring `>= threshold` against it. Members are
/// never compared with each other. Singletons produce no output.
pub fn group(sentences: &[Sentence], threshold: f64) -> Vec<DuplicateRange> {
    let mut ranges = Vec::new();
    let mut processed: HashSet<usize> = HashSet::new();
    let mut group_index = 0usize;

    for (i, anchor) in sentences.iter().enumerate() {
        if processed.contains(&i) {
            continue;
        }

        let anchor_text = anchor.text.trim();
        let mut members = vec![i];

        for (j, candidate) in sentences.iter().enumerate().skip(i + 1) {
            if processed.contains(&j) {
                continue;
            }
            let score = similarity(anchor_text, candidate.text.trim());
            trace!("comparing #{i} {anchor_text:?} with #{j} {:?}: {score:.3}", candidate.text);
            if score >= threshold {
                members.push(j);
                processed.insert(j);
            }
        }

        if members.len() > 1 {
            processed.insert(i);
            debug!(
                "duplicate group {group_index} anchored at sentence {i} with {} members",
                members.len()
            );
            ranges.extend(members.iter().map(|&m| DuplicateRange {
                start: sentences[m].start,
                end: sentences[m].end,
                group_index,
            }));
            group_index += 1;
        }
    }

    ranges
}

pub fn find_duplicates(text: &str, config: &Config) -> Vec<DuplicateRange> {
    let sentences = segment_with(text, config.min_sentence_chars);
    group(&sentences, config.threshold)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Cuts `text` into plain and marked spans in document order.
///
/// Ranges are sorted by `start` first. A range that overlaps one already
/// emitted, or does not fall on character boundaries, is skipped.
pub fn highlight<'a>(text: &'a str, ranges: &[DuplicateRange]) -> Vec<Span<'a>> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| r.start);

    let mut spans = Vec::new();
    let mut last_index = 0usize;

    for range in &sorted {
        if range.start < last_index || range.start >= range.end {
            warn!(
                "skipping range {}..{} overlapping text already highlighted up to {last_index}",
                range.start, range.end
            );
            continue;
        }
        let (Some(gap), Some(marked)) = (
            text.get(last_index..range.start),
            text.get(range.start..range.end),
        ) else {
            warn!("skipping range {}..{} outside the text", range.start, range.end);
            continue;
        };

        if !gap.is_empty() {
            spans.push(Span {
                text: gap,
                start: last_index,
                end: range.start,
                color: None,
            });
        }
        spans.push(Span {
            text: marked,
            start: range.start,
            end: range.end,
            color: Some(range.group_index % PALETTE_SIZE),
        });
        last_index = range.end;
    }

    if last_index < text.len() {
        spans.push(Span {
            text: &text[last_index..],
            start: last_index,
            end: text.len(),
            color: None,
        });
    }
    spans
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

pub fn text_stats(text: &str) -> TextStats {
    let stripped: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    TextStats {
        chars_with_spaces: char_len(text),
        chars_without_spaces: char_len(&stripped),
        bytes_with_spaces: text.len(),
        bytes_without_spaces: stripped.len(),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn analyze(text: &str) -> AnalysisResult {
    run_analysis(text, &Config::default())
}

/// Runs one analysis pass with custom settings. Fails only when `config` is
/// invalid.
pub fn analyze_with(text: &str, config: &Config) -> Result<AnalysisResult> {
    config.validate()?;
    Ok(run_analysis(text, config))
}

fn run_analysis(text: &str, config: &Config) -> AnalysisResult {
    let stats = text_stats(text);

    if text.trim().is_empty() {
        return AnalysisResult {
            stats,
            sentence_count: 0,
            group_count: 0,
            duplicates: vec![],
        };
    }

    let sentences = segment_with(text, config.min_sentence_chars);
    let duplicates = group(&sentences, config.threshold);
    let group_count = duplicates
        .iter()
        .map(|d| d.group_index + 1)
        .max()
        .unwrap_or(0);

    debug!(
        "{} duplicate ranges in {group_count} groups",
        duplicates.len()
    );

    AnalysisResult {
        stats,
        sentence_count: sentences.len(),
        group_count,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  The\tQUICK \n fox  "), "the quick fox");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn locate_searches_forward_from_cursor() {
        let text = "abc def abc";
        assert_eq!(locate(text, "abc", 0), Some(0));
        assert_eq!(locate(text, "abc", 1), Some(8));
        assert_eq!(locate(text, "abc", 9), None);
        assert_eq!(locate(text, "abc", 100), None);
    }

    #[test]
    fn locate_rejects_cursor_inside_a_char() {
        // '한' is three bytes long.
        assert_eq!(locate("한글", "글", 1), None);
        assert_eq!(locate("한글", "글", 3), Some(3));
    }

    #[test]
    fn default_config_matches_hyperparameters() {
        let config = Config::default();
        assert!((config.threshold - 0.6).abs() < 1e-12);
        assert_eq!(config.min_sentence_chars, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn weights_sum_to_one() {
        assert!((HP.word_weight + HP.char_weight - 1.0).abs() < 1e-12);
    }
}
