use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static FILE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^diff --git a/(.+?) b/(.+)$").expect("file header pattern is valid")
});
static OLD_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--- (?:a/)?(.+)$").expect("old file pattern is valid"));
static NEW_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+\+\+ (?:b/)?(.+)$").expect("new file pattern is valid"));
static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$")
        .expect("hunk header pattern is valid")
});

const NULL_DEVICE: &str = "/dev/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    Added,
    Removed,
    Context,
}

impl DiffLineKind {
    fn sigil(&self) -> char {
        match self {
            DiffLineKind::Added => '+',
            DiffLineKind::Removed => '-',
            DiffLineKind::Context => ' ',
        }
    }
}

/// A single line inside a hunk. For added lines only `new_line` is set, for
/// removed lines only `old_line`; context lines carry both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    /// Line text without the leading +/-/space sigil.
    pub content: String,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
}

/// A contiguous block of changes covering one span of old/new line ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// The original `@@ ... @@` header text.
    pub header: String,
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// All changes to a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// New path of the file.
    pub filename: String,
    /// Old path, present only when it differs from the new path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_filename: Option<String>,
    pub status: FileStatus,
    pub additions: u32,
    pub deletions: u32,
    /// Reconstructed per-file diff text (hunk headers plus re-prefixed lines).
    pub patch: String,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    fn new(old_path: &str, new_path: &str) -> Self {
        let renamed = old_path != new_path;
        FileDiff {
            filename: new_path.to_string(),
            old_filename: renamed.then(|| old_path.to_string()),
            status: if renamed {
                FileStatus::Renamed
            } else {
                FileStatus::Modified
            },
            additions: 0,
            deletions: 0,
            patch: String::new(),
            hunks: Vec::new(),
        }
    }
}

/// A fully parsed unified diff. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDiff {
    pub files: Vec<FileDiff>,
    pub total_additions: u32,
    pub total_deletions: u32,
}

impl ParsedDiff {
    /// True when at least one file contains an added line.
    pub fn has_additions(&self) -> bool {
        self.files.iter().any(|f| f.additions > 0)
    }
}

/// Parse raw unified diff text (the output of `git diff`) into a structured
/// [`ParsedDiff`].
///
/// Best-effort: never fails on malformed input. Lines that match none of the
/// known shapes (file headers, hunk headers, +/-/space content) are silently
/// skipped, as are in-hunk anomalies such as "\ No newline at end of file".
pub fn parse_diff(raw: &str) -> ParsedDiff {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut in_hunk = false;
    let mut old_line: u32 = 0;
    let mut new_line: u32 = 0;

    for line in raw.split('\n') {
        if let Some(caps) = FILE_HEADER_RE.captures(line) {
            files.push(FileDiff::new(&caps[1], &caps[2]));
            in_hunk = false;
            continue;
        }

        if !files.is_empty() {
            if let Some(caps) = OLD_FILE_RE.captures(line) {
                if &caps[1] == NULL_DEVICE {
                    if let Some(file) = files.last_mut() {
                        file.status = FileStatus::Added;
                    }
                }
                continue;
            }

            if let Some(caps) = NEW_FILE_RE.captures(line) {
                if &caps[1] == NULL_DEVICE {
                    if let Some(file) = files.last_mut() {
                        file.status = FileStatus::Deleted;
                    }
                }
                continue;
            }

            if let Some(caps) = HUNK_HEADER_RE.captures(line) {
                let old_start = caps[1].parse().unwrap_or(0);
                let old_lines = caps.get(2).map_or(1, |m| m.as_str().parse().unwrap_or(1));
                let new_start = caps[3].parse().unwrap_or(0);
                let new_lines = caps.get(4).map_or(1, |m| m.as_str().parse().unwrap_or(1));

                old_line = old_start;
                new_line = new_start;
                in_hunk = true;

                if let Some(file) = files.last_mut() {
                    file.hunks.push(Hunk {
                        header: line.to_string(),
                        old_start,
                        old_lines,
                        new_start,
                        new_lines,
                        lines: Vec::new(),
                    });
                }
                continue;
            }
        }

        if in_hunk {
            if let Some(file) = files.last_mut() {
                let diff_line = if let Some(rest) = line.strip_prefix('+') {
                    file.additions += 1;
                    let l = DiffLine {
                        kind: DiffLineKind::Added,
                        content: rest.to_string(),
                        old_line: None,
                        new_line: Some(new_line),
                    };
                    new_line += 1;
                    Some(l)
                } else if let Some(rest) = line.strip_prefix('-') {
                    file.deletions += 1;
                    let l = DiffLine {
                        kind: DiffLineKind::Removed,
                        content: rest.to_string(),
                        old_line: Some(old_line),
                        new_line: None,
                    };
                    old_line += 1;
                    Some(l)
                } else if let Some(rest) = line.strip_prefix(' ') {
                    let l = DiffLine {
                        kind: DiffLineKind::Context,
                        content: rest.to_string(),
                        old_line: Some(old_line),
                        new_line: Some(new_line),
                    };
                    old_line += 1;
                    new_line += 1;
                    Some(l)
                } else {
                    None
                };

                if let Some(diff_line) = diff_line {
                    if let Some(hunk) = file.hunks.last_mut() {
                        hunk.lines.push(diff_line);
                    }
                }
            }
        }
    }

    for file in &mut files {
        file.patch = file
            .hunks
            .iter()
            .map(|h| {
                let body = h
                    .lines
                    .iter()
                    .map(|l| format!("{}{}", l.kind.sigil(), l.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{}\n{}", h.header, body)
            })
            .collect::<Vec<_>>()
            .join("\n");
    }

    let total_additions = files.iter().map(|f| f.additions).sum();
    let total_deletions = files.iter().map(|f| f.deletions).sum();

    ParsedDiff {
        files,
        total_additions,
        total_deletions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_DIFF: &str = "\
diff --git a/src/app.ts b/src/app.ts
--- a/src/app.ts
+++ b/src/app.ts
@@ -10,6 +10,8 @@ function setup() {
 const a = 1;
-const b = 2;
+const b = 3;
+const c = 4;
 const d = 5;";

    #[test]
    fn test_parse_counts_additions_and_deletions() {
        let parsed = parse_diff(SIMPLE_DIFF);
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].additions, 2);
        assert_eq!(parsed.files[0].deletions, 1);
        assert_eq!(parsed.total_additions, 2);
        assert_eq!(parsed.total_deletions, 1);

        // Totals agree with the per-line classification
        let added: u32 = parsed.files[0]
            .hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| l.kind == DiffLineKind::Added)
            .count() as u32;
        assert_eq!(added, parsed.total_additions);
    }

    #[test]
    fn test_parse_line_numbers() {
        let parsed = parse_diff(SIMPLE_DIFF);
        let hunk = &parsed.files[0].hunks[0];
        assert_eq!(hunk.old_start, 10);
        assert_eq!(hunk.old_lines, 6);
        assert_eq!(hunk.new_start, 10);
        assert_eq!(hunk.new_lines, 8);

        // context, removed, added, added, context
        assert_eq!(hunk.lines[0].old_line, Some(10));
        assert_eq!(hunk.lines[0].new_line, Some(10));
        assert_eq!(hunk.lines[1].kind, DiffLineKind::Removed);
        assert_eq!(hunk.lines[1].old_line, Some(11));
        assert_eq!(hunk.lines[1].new_line, None);
        assert_eq!(hunk.lines[2].kind, DiffLineKind::Added);
        assert_eq!(hunk.lines[2].old_line, None);
        assert_eq!(hunk.lines[2].new_line, Some(11));
        assert_eq!(hunk.lines[3].new_line, Some(12));
        assert_eq!(hunk.lines[4].old_line, Some(12));
        assert_eq!(hunk.lines[4].new_line, Some(13));
    }

    #[test]
    fn test_added_line_numbers_strictly_increase_within_hunk() {
        let parsed = parse_diff(SIMPLE_DIFF);
        for hunk in &parsed.files[0].hunks {
            let mut last = 0;
            for line in hunk.lines.iter().filter(|l| l.kind == DiffLineKind::Added) {
                assert!(line.old_line.is_none());
                let n = line.new_line.expect("added lines carry a new line number");
                assert!(n > last);
                last = n;
            }
        }
    }

    #[test]
    fn test_new_file_is_marked_added() {
        let diff = "\
diff --git a/new.ts b/new.ts
--- /dev/null
+++ b/new.ts
@@ -0,0 +1,2 @@
+line one
+line two";
        let parsed = parse_diff(diff);
        assert_eq!(parsed.files[0].status, FileStatus::Added);
        assert_eq!(parsed.files[0].additions, 2);
        assert_eq!(parsed.files[0].deletions, 0);
    }

    #[test]
    fn test_deleted_file_is_marked_deleted() {
        let diff = "\
diff --git a/gone.ts b/gone.ts
--- a/gone.ts
+++ /dev/null
@@ -1,2 +0,0 @@
-line one
-line two";
        let parsed = parse_diff(diff);
        assert_eq!(parsed.files[0].status, FileStatus::Deleted);
        assert_eq!(parsed.files[0].deletions, 2);
    }

    #[test]
    fn test_renamed_file_without_rename_marker() {
        let diff = "\
diff --git a/old_name.ts b/new_name.ts
--- a/old_name.ts
+++ b/new_name.ts
@@ -1 +1 @@
-x
+y";
        let parsed = parse_diff(diff);
        assert_eq!(parsed.files[0].status, FileStatus::Renamed);
        assert_eq!(parsed.files[0].filename, "new_name.ts");
        assert_eq!(parsed.files[0].old_filename.as_deref(), Some("old_name.ts"));
    }

    #[test]
    fn test_hunk_header_with_omitted_counts_defaults_to_one() {
        let diff = "\
diff --git a/x b/x
--- a/x
+++ b/x
@@ -5 +5 @@
-a
+b";
        let parsed = parse_diff(diff);
        let hunk = &parsed.files[0].hunks[0];
        assert_eq!(hunk.old_lines, 1);
        assert_eq!(hunk.new_lines, 1);
        assert_eq!(hunk.old_start, 5);
        assert_eq!(hunk.new_start, 5);
    }

    #[test]
    fn test_empty_diff_yields_empty_result() {
        let parsed = parse_diff("");
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.total_additions, 0);
        assert_eq!(parsed.total_deletions, 0);
    }

    #[test]
    fn test_malformed_input_is_skipped_not_fatal() {
        let parsed = parse_diff("this is not a diff\nat all\n@@ bogus @@");
        assert!(parsed.files.is_empty());
    }

    #[test]
    fn test_no_newline_marker_is_ignored() {
        let diff = "\
diff --git a/x b/x
--- a/x
+++ b/x
@@ -1 +1 @@
-a
+b
\\ No newline at end of file";
        let parsed = parse_diff(diff);
        assert_eq!(parsed.files[0].hunks[0].lines.len(), 2);
    }

    #[test]
    fn test_additions_only_file_parses() {
        let diff = "\
diff --git a/x b/x
--- a/x
+++ b/x
@@ -0,0 +1,3 @@
+one
+two
+three";
        let parsed = parse_diff(diff);
        assert_eq!(parsed.files[0].additions, 3);
        assert_eq!(parsed.files[0].hunks[0].lines.len(), 3);
        assert_eq!(parsed.files[0].hunks[0].lines[2].new_line, Some(3));
    }

    #[test]
    fn test_multiple_files() {
        let diff = "\
diff --git a/a.ts b/a.ts
--- a/a.ts
+++ b/a.ts
@@ -1 +1 @@
-x
+y
diff --git a/b.ts b/b.ts
--- a/b.ts
+++ b/b.ts
@@ -1 +1,2 @@
 x
+z";
        let parsed = parse_diff(diff);
        assert_eq!(parsed.files.len(), 2);
        assert_eq!(parsed.total_additions, 2);
        assert_eq!(parsed.total_deletions, 1);
        assert_eq!(parsed.files[1].filename, "b.ts");
    }

    #[test]
    fn test_patch_reparse_is_idempotent() {
        let parsed = parse_diff(SIMPLE_DIFF);
        let file = &parsed.files[0];

        // Re-parse the reconstructed patch as a one-file diff
        let one_file = format!("diff --git a/{} b/{}\n{}", file.filename, file.filename, file.patch);
        let reparsed = parse_diff(&one_file);

        assert_eq!(reparsed.files.len(), 1);
        assert_eq!(reparsed.files[0].hunks, file.hunks);
        assert_eq!(reparsed.files[0].additions, file.additions);
        assert_eq!(reparsed.files[0].deletions, file.deletions);
    }
}
