//! Matching strategies for the replace engine.
//!
//! Each strategy maps `(content, find)` to the byte spans of `content` it
//! considers a match for `find`. Spans always point into the original
//! content, so replacing a span never rewrites text outside it. The engine
//! walks [`Strategy::CASCADE`] in order and stops at the first strategy that
//! produces anything.

use regex::Regex;

use crate::similarity::similarity;

/// Candidate span found by a strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Span {
    /// Byte offset of the first matched byte.
    pub start: usize,
    /// Byte offset one past the last matched byte.
    pub end: usize,
    /// Confidence in `[0.0, 1.0]`; `1.0` for literal matches.
    pub score: f64,
}

impl Span {
    fn exact(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            score: 1.0,
        }
    }
}

/// One way of locating approximately-specified text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Literal substring search.
    Exact,
    /// Per-line comparison ignoring leading/trailing whitespace.
    LineTrimmed,
    /// First/last line anchors with the most similar interior.
    BlockAnchor,
    /// Every whitespace run treated as equivalent.
    WhitespaceNormalized,
    /// Blocks equal once their common indentation is removed.
    IndentationFlexible,
    /// Literal search after undoing over-escaped sequences.
    EscapeNormalized,
    /// Literal search for the whole string trimmed at both ends.
    TrimmedBoundary,
    /// Loosely anchored same-length blocks ranked by interior similarity.
    ContextAware,
    /// Non-overlapping literal occurrences, left to right (used for
    /// replace-all).
    MultiOccurrence,
}

impl Strategy {
    /// Order tried for single-match requests.
    pub const CASCADE: [Strategy; 8] = [
        Strategy::Exact,
        Strategy::LineTrimmed,
        Strategy::BlockAnchor,
        Strategy::WhitespaceNormalized,
        Strategy::IndentationFlexible,
        Strategy::EscapeNormalized,
        Strategy::TrimmedBoundary,
        Strategy::ContextAware,
    ];

    /// Stable name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::LineTrimmed => "line-trimmed",
            Self::BlockAnchor => "block-anchor",
            Self::WhitespaceNormalized => "whitespace-normalized",
            Self::IndentationFlexible => "indentation-flexible",
            Self::EscapeNormalized => "escape-normalized",
            Self::TrimmedBoundary => "trimmed-boundary",
            Self::ContextAware => "context-aware",
            Self::MultiOccurrence => "multi-occurrence",
        }
    }

    /// Spans of `content` this strategy matches for `find`, in content order.
    ///
    /// Only [`Exact`](Self::Exact) and [`MultiOccurrence`](Self::MultiOccurrence)
    /// accept an empty `find`; both yield one empty span at offset 0.
    pub fn candidates(self, content: &str, find: &str) -> Vec<Span> {
        if find.is_empty() {
            return match self {
                Self::Exact | Self::MultiOccurrence => vec![Span::exact(0, 0)],
                _ => Vec::new(),
            };
        }
        match self {
            Self::Exact => literal(content, find),
            Self::MultiOccurrence => disjoint(content, find),
            Self::LineTrimmed => line_trimmed(content, find),
            Self::BlockAnchor => block_anchor(content, find),
            Self::WhitespaceNormalized => whitespace_normalized(content, find),
            Self::IndentationFlexible => indentation_flexible(content, find),
            Self::EscapeNormalized => escape_normalized(content, find),
            Self::TrimmedBoundary => trimmed_boundary(content, find),
            Self::ContextAware => context_aware(content, find),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Line bookkeeping ────────────────────────────────────────────────────────

/// `content` split on `\n` with the byte range of each line (newline excluded).
struct Lines<'a> {
    text: &'a str,
    ranges: Vec<(usize, usize)>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        let mut ranges = Vec::new();
        let mut start = 0;
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                ranges.push((start, i));
                start = i + 1;
            }
        }
        ranges.push((start, text.len()));
        Self { text, ranges }
    }

    fn len(&self) -> usize {
        self.ranges.len()
    }

    fn line(&self, i: usize) -> &'a str {
        let (s, e) = self.ranges[i];
        &self.text[s..e]
    }

    /// Span covering lines `first..=last`, without the final newline.
    fn block(&self, first: usize, last: usize) -> (usize, usize) {
        (self.ranges[first].0, self.ranges[last].1)
    }

    fn window(&self, start: usize, len: usize) -> Vec<&'a str> {
        (start..start + len).map(|i| self.line(i)).collect()
    }
}

/// Lines of a search string. A single trailing newline does not add a line.
fn search_lines(find: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = find.split('\n').collect();
    if lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
        let _ = lines.pop();
    }
    lines
}

/// Start indices of every `len`-line window over `total` lines.
fn window_starts(total: usize, len: usize) -> std::ops::Range<usize> {
    if len == 0 || len > total {
        0..0
    } else {
        0..total - len + 1
    }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Strategies ──────────────────────────────────────────────────────────────

/// Byte width of the char starting at `at`, so a scan can resume just past
/// a match start without splitting a code point.
fn step_at(content: &str, at: usize) -> usize {
    content[at..].chars().next().map_or(1, char::len_utf8)
}

/// Every literal occurrence, including ones that overlap an earlier hit.
fn literal(content: &str, find: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut from = 0;
    while from <= content.len() {
        let Some(offset) = content[from..].find(find) else {
            break;
        };
        let start = from + offset;
        spans.push(Span::exact(start, start + find.len()));
        from = start + step_at(content, start);
    }
    spans
}

/// Left-to-right occurrences that can be rewritten side by side.
fn disjoint(content: &str, find: &str) -> Vec<Span> {
    content
        .match_indices(find)
        .map(|(start, m)| Span::exact(start, start + m.len()))
        .collect()
}

fn line_trimmed(content: &str, find: &str) -> Vec<Span> {
    let lines = Lines::new(content);
    let needle = search_lines(find);
    let m = needle.len();

    window_starts(lines.len(), m)
        .filter(|&i| (0..m).all(|k| lines.line(i + k).trim() == needle[k].trim()))
        .map(|i| {
            let (start, end) = lines.block(i, i + m - 1);
            Span::exact(start, end)
        })
        .collect()
}

/// Mean similarity of the interior lines of `content[first..=last]` against
/// the interior of `needle`, compared positionally.
#[allow(clippy::cast_precision_loss)]
fn interior_similarity(lines: &Lines<'_>, first: usize, last: usize, needle: &[&str]) -> f64 {
    let block_len = last - first + 1;
    let to_check = (needle.len() - 2).min(block_len - 2);
    if to_check == 0 {
        return 1.0;
    }
    let total: f64 = (1..=to_check)
        .map(|k| similarity(lines.line(first + k).trim(), needle[k].trim()))
        .sum();
    total / to_check as f64
}

fn block_anchor(content: &str, find: &str) -> Vec<Span> {
    const SINGLE_CANDIDATE_THRESHOLD: f64 = 0.0;
    const MULTIPLE_CANDIDATES_THRESHOLD: f64 = 0.3;

    let needle = search_lines(find);
    if needle.len() < 3 {
        return Vec::new();
    }
    let first = needle[0].trim();
    let last = needle[needle.len() - 1].trim();
    if first.is_empty() || last.is_empty() {
        return Vec::new();
    }

    let lines = Lines::new(content);
    let mut blocks = Vec::new();
    for i in 0..lines.len() {
        if lines.line(i).trim() != first {
            continue;
        }
        if let Some(j) = (i + 2..lines.len()).find(|&j| lines.line(j).trim() == last) {
            blocks.push((i, j));
        }
    }

    let threshold = if blocks.len() == 1 {
        SINGLE_CANDIDATE_THRESHOLD
    } else {
        MULTIPLE_CANDIDATES_THRESHOLD
    };

    let mut best: Option<(usize, usize, f64)> = None;
    for (i, j) in blocks {
        let score = interior_similarity(&lines, i, j, &needle);
        // strict comparison keeps the earliest block on ties
        if score >= threshold && best.is_none_or(|(_, _, b)| score > b) {
            best = Some((i, j, score));
        }
    }

    best.map(|(i, j, score)| {
        let (start, end) = lines.block(i, j);
        Span { start, end, score }
    })
    .into_iter()
    .collect()
}

fn whitespace_normalized(content: &str, find: &str) -> Vec<Span> {
    let tokens: Vec<String> = find.split_whitespace().map(regex::escape).collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    let Ok(re) = Regex::new(&tokens.join(r"\s+")) else {
        return Vec::new();
    };
    let mut spans = Vec::new();
    let mut from = 0;
    while from <= content.len() {
        let Some(m) = re.find_at(content, from) else {
            break;
        };
        spans.push(Span::exact(m.start(), m.end()));
        from = m.start() + step_at(content, m.start());
    }
    spans
}

/// Join `lines` after removing the indentation common to all non-blank lines.
fn strip_common_indent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| {
            if l.trim().is_empty() {
                ""
            } else {
                l.get(indent..).unwrap_or_else(|| l.trim_start())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn indentation_flexible(content: &str, find: &str) -> Vec<Span> {
    let needle = search_lines(find);
    let target = strip_common_indent(&needle);
    let lines = Lines::new(content);
    let m = needle.len();

    window_starts(lines.len(), m)
        .filter(|&i| strip_common_indent(&lines.window(i, m)) == target)
        .map(|i| {
            let (start, end) = lines.block(i, i + m - 1);
            Span::exact(start, end)
        })
        .collect()
}

/// Undo backslash escapes a model applied to text that was never escaped.
pub(crate) fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let replacement = match chars.peek() {
            Some('n') => Some('\n'),
            Some('t') => Some('\t'),
            Some('r') => Some('\r'),
            Some('\n') => Some('\n'),
            Some(&q @ ('\'' | '"' | '`' | '\\' | '$')) => Some(q),
            _ => None,
        };
        match replacement {
            Some(r) => {
                out.push(r);
                let _ = chars.next();
            }
            None => out.push(c),
        }
    }
    out
}

fn escape_normalized(content: &str, find: &str) -> Vec<Span> {
    let unescaped = unescape(find);
    if unescaped.is_empty() {
        return Vec::new();
    }

    let mut spans = if unescaped == find {
        Vec::new()
    } else {
        literal(content, &unescaped)
    };

    // content itself may hold the escaped form
    let lines = Lines::new(content);
    let m = search_lines(&unescaped).len();
    for i in window_starts(lines.len(), m) {
        let (start, end) = lines.block(i, i + m - 1);
        if unescape(&content[start..end]) == unescaped {
            spans.push(Span::exact(start, end));
        }
    }
    spans.sort_by_key(|s| (s.start, s.end));
    spans.dedup_by_key(|s| (s.start, s.end));
    spans
}

fn trimmed_boundary(content: &str, find: &str) -> Vec<Span> {
    let trimmed = find.trim();
    if trimmed == find || trimmed.is_empty() {
        return Vec::new();
    }
    literal(content, trimmed)
}

#[allow(clippy::cast_precision_loss)]
fn context_aware(content: &str, find: &str) -> Vec<Span> {
    let needle = search_lines(find);
    let m = needle.len();
    if m < 3 {
        return Vec::new();
    }
    let first = normalize_ws(needle[0]);
    let last = normalize_ws(needle[m - 1]);
    if first.is_empty() || last.is_empty() {
        return Vec::new();
    }

    let lines = Lines::new(content);
    let interior = m - 2;
    let mut best: Option<(usize, f64)> = None;

    for i in window_starts(lines.len(), m) {
        if normalize_ws(lines.line(i)) != first || normalize_ws(lines.line(i + m - 1)) != last {
            continue;
        }
        let scores: Vec<f64> = (1..=interior)
            .map(|k| similarity(lines.line(i + k).trim(), needle[k].trim()))
            .collect();
        let similar = scores.iter().filter(|&&s| s >= 0.5).count();
        if (similar as f64) < interior as f64 * 0.5 {
            continue;
        }
        let score = scores.iter().sum::<f64>() / interior as f64;
        if best.is_none_or(|(_, b)| score > b) {
            best = Some((i, score));
        }
    }

    best.map(|(i, score)| {
        let (start, end) = lines.block(i, i + m - 1);
        Span { start, end, score }
    })
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(content: &'a str, spans: &[Span]) -> Vec<&'a str> {
        spans.iter().map(|s| &content[s.start..s.end]).collect()
    }

    #[test]
    fn exact_empty_find_is_single_empty_span() {
        let spans = Strategy::Exact.candidates("abc", "");
        assert_eq!(spans, vec![Span::exact(0, 0)]);
        assert!(Strategy::LineTrimmed.candidates("abc", "").is_empty());
    }

    #[test]
    fn exact_yields_every_occurrence() {
        let content = "dog cat dog";
        let spans = Strategy::Exact.candidates(content, "dog");
        assert_eq!(texts(content, &spans), vec!["dog", "dog"]);
    }

    #[test]
    fn exact_counts_overlapping_occurrences() {
        let spans = Strategy::Exact.candidates("aaa", "aa");
        assert_eq!(spans, vec![Span::exact(0, 2), Span::exact(1, 3)]);

        let spans = Strategy::Exact.candidates("é_é_é", "é_é");
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn multi_occurrence_takes_disjoint_spans() {
        let spans = Strategy::MultiOccurrence.candidates("aaaa", "aa");
        assert_eq!(spans, vec![Span::exact(0, 2), Span::exact(2, 4)]);
    }

    #[test]
    fn whitespace_normalized_counts_overlapping_blocks() {
        let content = "aba  aba\taba";
        let spans = Strategy::WhitespaceNormalized.candidates(content, "aba aba");
        assert_eq!(texts(content, &spans), vec!["aba  aba", "aba\taba"]);
    }

    #[test]
    fn line_trimmed_returns_original_span() {
        let content = "function x() {\n  return 1;\n}";
        let spans = Strategy::LineTrimmed.candidates(content, "function x() {\nreturn 1;\n}");
        assert_eq!(texts(content, &spans), vec![content]);
    }

    #[test]
    fn line_trimmed_ignores_trailing_newline_in_find() {
        let content = "a\n    b\nc\n";
        let spans = Strategy::LineTrimmed.candidates(content, "b\n");
        assert_eq!(texts(content, &spans), vec!["    b"]);
    }

    #[test]
    fn block_anchor_picks_most_similar_interior() {
        let content = "fn a() {\n    let x = 1;\n}\nfn a() {\n    let y = 2;\n}";
        let find = "fn a() {\n    let y = 3;\n}";
        let spans = Strategy::BlockAnchor.candidates(content, find);
        assert_eq!(texts(content, &spans), vec!["fn a() {\n    let y = 2;\n}"]);
    }

    #[test]
    fn block_anchor_single_candidate_accepts_any_interior() {
        let content = "start\ncompletely different\nend";
        let spans = Strategy::BlockAnchor.candidates(content, "start\nzzz\nend");
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn block_anchor_needs_three_lines() {
        assert!(Strategy::BlockAnchor.candidates("a\nb", "a\nb").is_empty());
    }

    #[test]
    fn block_anchor_ties_prefer_earliest() {
        let content = "{\nsame\n}\n{\nsame\n}";
        let spans = Strategy::BlockAnchor.candidates(content, "{\nsame\n}");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
    }

    #[test]
    fn block_anchor_multiple_candidates_need_threshold() {
        let content = "{\nsame\n}\n{\nsame\n}";
        assert!(Strategy::BlockAnchor.candidates(content, "{\nother\n}").is_empty());
    }

    #[test]
    fn whitespace_normalized_crosses_newlines() {
        let content = "let  x =\n\t1;";
        let spans = Strategy::WhitespaceNormalized.candidates(content, "let x = 1;");
        assert_eq!(texts(content, &spans), vec![content]);
    }

    #[test]
    fn whitespace_normalized_escapes_regex_metachars() {
        let content = "call(a,  b)";
        let spans = Strategy::WhitespaceNormalized.candidates(content, "call(a, b)");
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn indentation_flexible_matches_shifted_block() {
        let content = "mod m {\n        if x {\n            y();\n        }\n}";
        let find = "if x {\n    y();\n}";
        let spans = Strategy::IndentationFlexible.candidates(content, find);
        assert_eq!(
            texts(content, &spans),
            vec!["        if x {\n            y();\n        }"]
        );
    }

    #[test]
    fn indentation_flexible_rejects_inconsistent_offsets() {
        let content = "    if x {\n  y();\n    }";
        let find = "if x {\n    y();\n}";
        assert!(Strategy::IndentationFlexible.candidates(content, find).is_empty());
    }

    #[test]
    fn unescape_sequences() {
        assert_eq!(unescape(r"a\nb\tc"), "a\nb\tc");
        assert_eq!(unescape(r#"say \"hi\""#), "say \"hi\"");
        assert_eq!(unescape(r"cost \$5 \\ \q"), r"cost $5 \ \q");
    }

    #[test]
    fn escape_normalized_matches_over_escaped_find() {
        let content = "line one\nline two";
        let spans = Strategy::EscapeNormalized.candidates(content, r"line one\nline two");
        assert_eq!(texts(content, &spans), vec![content]);
    }

    #[test]
    fn trimmed_boundary_only_when_trimming_changes_find() {
        let content = "x foo y foo";
        assert!(Strategy::TrimmedBoundary.candidates(content, "foo").is_empty());
        assert_eq!(Strategy::TrimmedBoundary.candidates(content, "  foo\n").len(), 2);
    }

    #[test]
    fn context_aware_tolerates_anchor_whitespace() {
        let content = "if  (a)  {\n  doThing();\n  more();\n}";
        let find = "if (a) {\n  doThing();\n  less();\n}";
        let spans = Strategy::ContextAware.candidates(content, find);
        assert_eq!(texts(content, &spans), vec![content]);
    }

    #[test]
    fn context_aware_rejects_dissimilar_interior() {
        let content = "begin\naaaa\nbbbb\ncccc\nend";
        let find = "begin\nzzzz\nyyyy\nxxxx\nend";
        assert!(Strategy::ContextAware.candidates(content, find).is_empty());
    }

    #[test]
    fn cascade_order_is_stable() {
        let names: Vec<&str> = Strategy::CASCADE.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "exact",
                "line-trimmed",
                "block-anchor",
                "whitespace-normalized",
                "indentation-flexible",
                "escape-normalized",
                "trimmed-boundary",
                "context-aware",
            ]
        );
    }
}
