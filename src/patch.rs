//! Surgical find/replace patching with layered matching.
//!
//! Generator-proposed edits rarely survive contact with the real file:
//! trailing whitespace drifts, a comment moved, a line got reflowed. Each
//! patch is therefore resolved with three tiers, tried in order:
//!
//! 1. exact substring match (first occurrence)
//! 2. whitespace-normalized line match (trailing whitespace stripped)
//! 3. fuzzy line-window match scored by a similarity ratio
//!
//! A batch is all-or-nothing per file: if any patch fails every tier, the
//! caller must keep the original text untouched.

use crate::change::Patch;
use crate::util::truncate;

/// Default acceptance threshold for the fuzzy tier.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// One patch that failed all three match tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFailure {
    /// Zero-based position of the patch within its batch.
    pub index: usize,
    /// Truncated preview of the `find` fragment, for reporting.
    pub find_preview: String,
}

impl PatchFailure {
    fn new(index: usize, find: &str) -> Self {
        Self {
            index,
            find_preview: truncate(find, 80),
        }
    }
}

/// Apply `patches` in order against a running buffer.
///
/// Returns the fully patched text only when every patch matched. On any
/// failure the original text must be used instead; the failure list names
/// each unmatched patch so the caller can report cause per patch.
pub fn apply_patches(
    text: &str,
    patches: &[Patch],
    fuzzy_threshold: f64,
) -> Result<String, Vec<PatchFailure>> {
    let mut buffer = text.to_string();
    let mut failures = Vec::new();

    for (index, patch) in patches.iter().enumerate() {
        if patch.find.is_empty() {
            failures.push(PatchFailure::new(index, &patch.find));
            continue;
        }
        match apply_one(&buffer, patch, fuzzy_threshold) {
            Some(updated) => buffer = updated,
            None => failures.push(PatchFailure::new(index, &patch.find)),
        }
    }

    if failures.is_empty() {
        Ok(buffer)
    } else {
        Err(failures)
    }
}

fn apply_one(buffer: &str, patch: &Patch, fuzzy_threshold: f64) -> Option<String> {
    if buffer.contains(&patch.find) {
        return Some(buffer.replacen(&patch.find, &patch.replace, 1));
    }
    if let Some(updated) = match_normalized(buffer, patch) {
        return Some(updated);
    }
    match_fuzzy(buffer, patch, fuzzy_threshold)
}

/// Tier 2: line-by-line comparison with trailing whitespace stripped from
/// both sides. The unstripped `replace` lines are spliced in at the first
/// matching window, in file order.
fn match_normalized(buffer: &str, patch: &Patch) -> Option<String> {
    let lines: Vec<&str> = buffer.lines().collect();
    let needle: Vec<&str> = patch.find.lines().collect();
    if needle.is_empty() || lines.len() < needle.len() {
        return None;
    }

    for start in 0..=lines.len() - needle.len() {
        let matched = needle
            .iter()
            .enumerate()
            .all(|(i, want)| lines[start + i].trim_end() == want.trim_end());
        if matched {
            return Some(splice(buffer, &lines, start, needle.len(), &patch.replace));
        }
    }
    None
}

/// Tier 3: slide a window of the same line count as `find` across the
/// buffer and score each window with [`similarity_ratio`]. The highest
/// score wins, earliest position on ties, and only if it clears the
/// threshold.
fn match_fuzzy(buffer: &str, patch: &Patch, threshold: f64) -> Option<String> {
    let lines: Vec<&str> = buffer.lines().collect();
    let needle_len = patch.find.lines().count();
    if needle_len == 0 || lines.len() < needle_len {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for start in 0..=lines.len() - needle_len {
        let window = lines[start..start + needle_len].join("\n");
        let score = similarity_ratio(&window, &patch.find);
        // Strict comparison keeps the earliest window on a tied score.
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((start, score));
        }
    }

    match best {
        Some((start, score)) if score >= threshold => {
            Some(splice(buffer, &lines, start, needle_len, &patch.replace))
        }
        _ => None,
    }
}

/// Replace `count` lines starting at `start` with the replacement text,
/// preserving the buffer's trailing-newline state.
fn splice(buffer: &str, lines: &[&str], start: usize, count: usize, replacement: &str) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..start]);
    out.extend(replacement.lines());
    out.extend_from_slice(&lines[start + count..]);

    let mut text = out.join("\n");
    if buffer.ends_with('\n') && !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Normalized sequence similarity over characters: `2*M / (len_a + len_b)`
/// where `M` is the longest-common-subsequence length. 0.0 means disjoint,
/// 1.0 means identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // Two-row LCS; windows are small (a handful of lines), so quadratic
    // time over characters is acceptable here.
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    let lcs = prev[b.len()];

    2.0 * lcs as f64 / (a.len() + b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(find: &str, replace: &str) -> Patch {
        Patch {
            find: find.to_string(),
            replace: replace.to_string(),
        }
    }

    #[test]
    fn test_exact_replaces_first_occurrence_only() {
        let text = "A\nB\nC\nB\n";
        let out = apply_patches(text, &[patch("B", "B2")], DEFAULT_FUZZY_THRESHOLD).unwrap();
        assert_eq!(out, "A\nB2\nC\nB\n");
    }

    #[test]
    fn test_exact_substring_mid_line() {
        let text = "let total = old_sum(values);\n";
        let out = apply_patches(
            text,
            &[patch("old_sum", "checked_sum")],
            DEFAULT_FUZZY_THRESHOLD,
        )
        .unwrap();
        assert_eq!(out, "let total = checked_sum(values);\n");
    }

    #[test]
    fn test_normalized_matches_trailing_whitespace_drift() {
        // find carries trailing spaces the source lines lack
        let text = "fn main() {\n    work();\n}\n";
        let p = patch("fn main() {   \n    work();  ", "fn main() {\n    work_twice();");
        let out = apply_patches(text, &[p], DEFAULT_FUZZY_THRESHOLD).unwrap();
        assert_eq!(out, "fn main() {\n    work_twice();\n}\n");
    }

    #[test]
    fn test_normalized_rejects_non_trailing_difference() {
        let text = "alpha\nbeta\ngamma\n";
        // interior character differs, so tier 2 must not fire; the fragment
        // is also too dissimilar for tier 3 at the default threshold
        let failures =
            apply_patches(text, &[patch("bXta", "beta2")], DEFAULT_FUZZY_THRESHOLD).unwrap_err();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 0);
    }

    #[test]
    fn test_fuzzy_accepts_near_identical_window() {
        let text = "fn compute(input: &str) -> usize {\n    input.len() + 1\n}\n";
        // one character off from the real first line
        let p = patch(
            "fn compute(input: &str) -> usize {\n    input.len() + 2\n}",
            "fn compute(input: &str) -> usize {\n    input.len()\n}",
        );
        let out = apply_patches(text, &[p], DEFAULT_FUZZY_THRESHOLD).unwrap();
        assert_eq!(out, "fn compute(input: &str) -> usize {\n    input.len()\n}\n");
    }

    #[test]
    fn test_fuzzy_rejects_below_threshold() {
        let text = "completely unrelated line\n";
        let failures = apply_patches(
            text,
            &[patch("zzzz qqqq xxxx", "whatever")],
            DEFAULT_FUZZY_THRESHOLD,
        )
        .unwrap_err();
        assert_eq!(failures[0].index, 0);
    }

    #[test]
    fn test_fuzzy_threshold_is_configurable() {
        let text = "abcdef\n";
        let p = patch("abcxyz", "replaced");
        // ratio is 0.5 (LCS "abc" over 6+6 chars); passes at 0.4, not 0.85
        assert!(apply_patches(text, std::slice::from_ref(&p), 0.85).is_err());
        let out = apply_patches(text, &[p], 0.4).unwrap();
        assert_eq!(out, "replaced\n");
    }

    #[test]
    fn test_batch_failure_reports_index_and_leaves_choice_to_caller() {
        let text = "A\nB\nC\n";
        let patches = vec![patch("B", "B2"), patch("not here at all", "x")];
        let failures = apply_patches(text, &patches, DEFAULT_FUZZY_THRESHOLD).unwrap_err();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        // the engine's contract: on Err the caller keeps the original text
    }

    #[test]
    fn test_empty_find_fails_without_mutating() {
        let text = "A\nB\n";
        let failures =
            apply_patches(text, &[patch("", "X")], DEFAULT_FUZZY_THRESHOLD).unwrap_err();
        assert_eq!(failures[0].index, 0);
    }

    #[test]
    fn test_multiline_splice_preserves_trailing_newline_state() {
        let with_newline = "one\ntwo\nthree\n";
        let without = "one\ntwo\nthree";
        let p = patch("two   ", "TWO");
        let out = apply_patches(with_newline, std::slice::from_ref(&p), 0.85).unwrap();
        assert_eq!(out, "one\nTWO\nthree\n");
        let out = apply_patches(without, &[p], 0.85).unwrap();
        assert_eq!(out, "one\nTWO\nthree");
    }

    #[test]
    fn test_replace_with_empty_deletes_lines() {
        let text = "keep\ndrop me   \nkeep too\n";
        // extra trailing whitespace keeps tier 1 from firing; tier 2 splices
        let out =
            apply_patches(text, &[patch("drop me     ", "")], DEFAULT_FUZZY_THRESHOLD).unwrap();
        assert_eq!(out, "keep\nkeep too\n");
    }

    #[test]
    fn test_patches_apply_in_order_against_running_buffer() {
        let text = "start\n";
        let patches = vec![patch("start", "middle"), patch("middle", "end")];
        let out = apply_patches(text, &patches, DEFAULT_FUZZY_THRESHOLD).unwrap();
        assert_eq!(out, "end\n");
    }

    #[test]
    fn test_similarity_ratio_bounds() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
        assert_eq!(similarity_ratio("abc", "abc"), 1.0);
        let mid = similarity_ratio("abcdef", "abcxyz");
        assert!(mid > 0.49 && mid < 0.51);
    }

    #[test]
    fn test_fuzzy_tie_break_prefers_earliest_window() {
        // two identical candidate windows; the earlier one must be edited
        let text = "dup\ndup\n";
        let p = patch("dup!", "edited");
        let out = apply_patches(text, &[p], 0.7).unwrap();
        assert_eq!(out, "edited\ndup\n");
    }
}
