//! Apply-patch envelope: parsing, chunk location, and application to disk.
//!
//! ```text
//! *** Begin Patch
//! *** Add File: path
//! +line
//! *** Update File: path
//! *** Move to: new/path
//! @@ context line
//!  kept
//! -removed
//! +added
//! *** End of File
//! *** Delete File: path
//! *** End Patch
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::errors::{PatchError, Result};

const BEGIN_MARKER: &str = "*** Begin Patch";
const END_MARKER: &str = "*** End Patch";
const ADD_FILE: &str = "*** Add File:";
const DELETE_FILE: &str = "*** Delete File:";
const UPDATE_FILE: &str = "*** Update File:";
const MOVE_TO: &str = "*** Move to:";
const END_OF_FILE: &str = "*** End of File";

/// One file operation in a patch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hunk {
    /// Create a file with `contents`.
    Add {
        /// Target path, relative to the patch root.
        path: String,
        /// Full file contents.
        contents: String,
    },
    /// Remove a file.
    Delete {
        /// Target path.
        path: String,
    },
    /// Rewrite a file chunk by chunk, optionally moving it.
    Update {
        /// Source path.
        path: String,
        /// Destination path when the file is renamed.
        move_path: Option<String>,
        /// Line-level changes, in file order.
        chunks: Vec<UpdateChunk>,
    },
}

/// A contiguous change inside an updated file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateChunk {
    /// Lines expected in the current file.
    pub old_lines: Vec<String>,
    /// Lines that replace them.
    pub new_lines: Vec<String>,
    /// `@@` line used to position the chunk.
    pub change_context: Option<String>,
    /// Chunk is anchored at the end of the file.
    pub is_end_of_file: bool,
}

/// Absolute paths touched by [`apply_hunks`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AffectedPaths {
    /// Created files.
    pub added: Vec<PathBuf>,
    /// Rewritten files (destination path for moves).
    pub modified: Vec<PathBuf>,
    /// Removed files.
    pub deleted: Vec<PathBuf>,
}

static HEREDOC: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"^(?:cat\s+)?<<['"]?(\w+)['"]?\s*\n((?s).*?)\n(\w+)\s*$"#).ok()
});

/// Unwrap `<<EOF ... EOF` (optionally `cat <<'EOF'`) around a patch.
fn strip_heredoc(input: &str) -> &str {
    let Some(re) = HEREDOC.as_ref() else {
        return input;
    };
    match re.captures(input) {
        Some(caps) if caps.get(1).map(|m| m.as_str()) == caps.get(3).map(|m| m.as_str()) => {
            caps.get(2).map_or(input, |m| m.as_str())
        }
        _ => input,
    }
}

fn header_path(line: &str, prefix: &str) -> Option<String> {
    let path = line.strip_prefix(prefix)?.trim();
    (!path.is_empty()).then(|| path.to_owned())
}

/// Parse a patch envelope into hunks.
pub fn parse_patch(text: &str) -> Result<Vec<Hunk>> {
    let cleaned = strip_heredoc(text.trim());
    let lines: Vec<&str> = cleaned.split('\n').collect();

    let begin = lines.iter().position(|l| l.trim() == BEGIN_MARKER);
    let end = lines.iter().position(|l| l.trim() == END_MARKER);
    let (begin, end) = match (begin, end) {
        (Some(b), Some(e)) if b < e => (b, e),
        _ => {
            return Err(PatchError::InvalidPatch(
                "missing Begin/End markers".into(),
            ));
        }
    };

    let body = &lines[begin + 1..end];
    let mut hunks = Vec::new();
    let mut i = 0;

    while i < body.len() {
        let line = body[i];
        if let Some(path) = header_path(line, ADD_FILE) {
            let (contents, next) = parse_add_contents(body, i + 1);
            hunks.push(Hunk::Add { path, contents });
            i = next;
        } else if let Some(path) = header_path(line, DELETE_FILE) {
            hunks.push(Hunk::Delete { path });
            i += 1;
        } else if let Some(path) = header_path(line, UPDATE_FILE) {
            i += 1;
            let move_path = body.get(i).and_then(|l| header_path(l, MOVE_TO));
            if move_path.is_some() {
                i += 1;
            }
            let (chunks, next) = parse_update_chunks(body, i);
            hunks.push(Hunk::Update {
                path,
                move_path,
                chunks,
            });
            i = next;
        } else {
            i += 1;
        }
    }

    debug!(hunks = hunks.len(), "patch parsed");
    Ok(hunks)
}

fn parse_add_contents(lines: &[&str], start: usize) -> (String, usize) {
    let mut out = Vec::new();
    let mut i = start;
    while i < lines.len() && !lines[i].starts_with("***") {
        if let Some(rest) = lines[i].strip_prefix('+') {
            out.push(rest);
        }
        i += 1;
    }
    (out.join("\n"), i)
}

fn parse_update_chunks(lines: &[&str], start: usize) -> (Vec<UpdateChunk>, usize) {
    let mut chunks = Vec::new();
    let mut i = start;

    while i < lines.len() && !lines[i].starts_with("***") {
        let Some(context) = lines[i].strip_prefix("@@") else {
            i += 1;
            continue;
        };
        let context = context.trim();
        i += 1;

        let mut chunk = UpdateChunk {
            change_context: (!context.is_empty()).then(|| context.to_owned()),
            ..UpdateChunk::default()
        };

        while i < lines.len() && !lines[i].starts_with("@@") {
            let line = lines[i];
            if line == END_OF_FILE {
                chunk.is_end_of_file = true;
                i += 1;
                break;
            }
            if line.starts_with("***") {
                break;
            }
            if let Some(kept) = line.strip_prefix(' ') {
                chunk.old_lines.push(kept.to_owned());
                chunk.new_lines.push(kept.to_owned());
            } else if let Some(removed) = line.strip_prefix('-') {
                chunk.old_lines.push(removed.to_owned());
            } else if let Some(added) = line.strip_prefix('+') {
                chunk.new_lines.push(added.to_owned());
            }
            i += 1;
        }
        chunks.push(chunk);
    }

    (chunks, i)
}

// ── Chunk location ──────────────────────────────────────────────────────────

/// Fold typographic punctuation to ASCII.
fn normalize_punctuation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => out.push('"'),
            '\u{2010}'..='\u{2015}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

fn matches_at<F>(lines: &[&str], pattern: &[String], at: usize, eq: &F) -> bool
where
    F: Fn(&str, &str) -> bool,
{
    pattern
        .iter()
        .enumerate()
        .all(|(k, p)| lines.get(at + k).is_some_and(|&l| eq(l, p.as_str())))
}

fn try_pass<F>(lines: &[&str], pattern: &[String], start: usize, eof: bool, eq: F) -> Option<usize>
where
    F: Fn(&str, &str) -> bool,
{
    if pattern.len() > lines.len() {
        return None;
    }
    let last_start = lines.len() - pattern.len();
    if eof && last_start >= start && matches_at(lines, pattern, last_start, &eq) {
        return Some(last_start);
    }
    (start..=last_start).find(|&i| matches_at(lines, pattern, i, &eq))
}

/// Locate `pattern` in `lines` at or after `start`.
///
/// Four passes of decreasing strictness: exact, trailing whitespace ignored,
/// surrounding whitespace ignored, punctuation folded. With `eof`, each pass
/// first tries the position that ends at the last line.
pub fn seek_sequence(lines: &[&str], pattern: &[String], start: usize, eof: bool) -> Option<usize> {
    if pattern.is_empty() {
        return None;
    }
    try_pass(lines, pattern, start, eof, |a, b| a == b)
        .or_else(|| try_pass(lines, pattern, start, eof, |a, b| a.trim_end() == b.trim_end()))
        .or_else(|| try_pass(lines, pattern, start, eof, |a, b| a.trim() == b.trim()))
        .or_else(|| {
            try_pass(lines, pattern, start, eof, |a, b| {
                normalize_punctuation(a.trim()) == normalize_punctuation(b.trim())
            })
        })
}

/// Apply `chunks` to `original`, the current contents of `path`.
///
/// The result always ends with a newline.
pub fn derive_new_contents(path: &Path, original: &str, chunks: &[UpdateChunk]) -> Result<String> {
    let mut lines: Vec<&str> = original.split('\n').collect();
    if lines.last() == Some(&"") {
        let _ = lines.pop();
    }

    let mut replacements: Vec<(usize, usize, Vec<String>)> = Vec::new();
    let mut cursor = 0;

    for chunk in chunks {
        if let Some(context) = &chunk.change_context {
            let idx = seek_sequence(&lines, std::slice::from_ref(context), cursor, false)
                .ok_or_else(|| PatchError::ContextNotFound {
                    context: context.clone(),
                    path: path.to_path_buf(),
                })?;
            cursor = idx + 1;
        }

        if chunk.old_lines.is_empty() {
            replacements.push((lines.len(), 0, chunk.new_lines.clone()));
            continue;
        }

        let mut pattern: &[String] = &chunk.old_lines;
        let mut new_slice: &[String] = &chunk.new_lines;
        let mut found = seek_sequence(&lines, pattern, cursor, chunk.is_end_of_file);

        // a trailing blank line in the chunk often stands for the final newline
        if found.is_none() && pattern.last().is_some_and(String::is_empty) {
            pattern = &pattern[..pattern.len() - 1];
            if new_slice.last().is_some_and(String::is_empty) {
                new_slice = &new_slice[..new_slice.len() - 1];
            }
            found = seek_sequence(&lines, pattern, cursor, chunk.is_end_of_file);
        }

        let Some(idx) = found else {
            return Err(PatchError::LinesNotFound {
                lines: chunk.old_lines.join("\n"),
                path: path.to_path_buf(),
            });
        };
        replacements.push((idx, pattern.len(), new_slice.to_vec()));
        cursor = idx + pattern.len();
    }

    replacements.sort_by_key(|r| r.0);

    let mut result: Vec<String> = lines.iter().map(|l| (*l).to_owned()).collect();
    for (idx, old_len, new_lines) in replacements.into_iter().rev() {
        let _ = result.splice(idx..idx + old_len, new_lines);
    }
    if result.last().is_none_or(|l| !l.is_empty()) {
        result.push(String::new());
    }
    Ok(result.join("\n"))
}

// ── Application ─────────────────────────────────────────────────────────────

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PatchError::io("creating directory", parent, e))?;
    }
    Ok(())
}

/// Perform `hunks` relative to `cwd`.
///
/// Hunks run in order; the first failure stops the patch, leaving earlier
/// hunks applied.
pub async fn apply_hunks(hunks: &[Hunk], cwd: &Path) -> Result<AffectedPaths> {
    if hunks.is_empty() {
        return Err(PatchError::NoHunks);
    }

    let mut affected = AffectedPaths::default();

    for hunk in hunks {
        match hunk {
            Hunk::Add { path, contents } => {
                let target = cwd.join(path);
                ensure_parent(&target).await?;
                tokio::fs::write(&target, contents)
                    .await
                    .map_err(|e| PatchError::io("writing", &target, e))?;
                debug!(path = %target.display(), "file added");
                affected.added.push(target);
            }
            Hunk::Delete { path } => {
                let target = cwd.join(path);
                tokio::fs::remove_file(&target)
                    .await
                    .map_err(|e| PatchError::io("deleting", &target, e))?;
                debug!(path = %target.display(), "file deleted");
                affected.deleted.push(target);
            }
            Hunk::Update {
                path,
                move_path,
                chunks,
            } => {
                let source = cwd.join(path);
                let original = tokio::fs::read_to_string(&source)
                    .await
                    .map_err(|e| PatchError::io("reading", &source, e))?;
                let updated = derive_new_contents(&source, &original, chunks)?;

                let target = match move_path {
                    Some(dest) => {
                        let dest = cwd.join(dest);
                        ensure_parent(&dest).await?;
                        tokio::fs::write(&dest, &updated)
                            .await
                            .map_err(|e| PatchError::io("writing", &dest, e))?;
                        tokio::fs::remove_file(&source)
                            .await
                            .map_err(|e| PatchError::io("deleting", &source, e))?;
                        dest
                    }
                    None => {
                        tokio::fs::write(&source, &updated)
                            .await
                            .map_err(|e| PatchError::io("writing", &source, e))?;
                        source
                    }
                };
                debug!(path = %target.display(), "file updated");
                affected.modified.push(target);
            }
        }
    }

    Ok(affected)
}
