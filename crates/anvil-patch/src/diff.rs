//! Unified diff rendering for tool output.

use similar::TextDiff;

/// Render a unified diff of `old` → `new` with three lines of context.
///
/// Returns an empty string when the inputs are identical.
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut hunks = String::new();
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        hunks.push_str(&hunk.to_string());
    }
    if hunks.is_empty() {
        return hunks;
    }
    format!("--- {path}\n+++ {path}\n{hunks}")
}
