//! Line classification for `git diff/log --raw --numstat --shortstat` output.
//!
//! The stream interleaves four line shapes:
//! ```text
//! # 9d0ccb54c743424109751a82a742984699e365fe 63aa0c07bcd16ddac52d5275b9513712b780bc25
//! :100644 100644 0cbabf4 d641678 M	src/fold.c
//! 2	0	src/fold.c
//!  1 file changed, 2 insertions(+)
//! ```
//! The marker line introduces the commit and its parents; record lines carry
//! one file change each; numstat and shortstat lines trail the records.
//! Anything else is a parse anomaly: skipped with a warning, never fatal.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static SHORTSTAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+ files? changed").unwrap());
static NUMSTAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+|-)\t(\d+|-)\t(.+)$").unwrap());
static RENAME_BRACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]* => ([^{}]*)\}").unwrap());

/// Change status of one file in a diff record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Copied,
    Deleted,
    Modified,
    Renamed,
    TypeChanged,
    Unmerged,
    Unknown,
    Broken,
}

impl ChangeStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(Self::Added),
            b'C' => Some(Self::Copied),
            b'D' => Some(Self::Deleted),
            b'M' => Some(Self::Modified),
            b'R' => Some(Self::Renamed),
            b'T' => Some(Self::TypeChanged),
            b'U' => Some(Self::Unmerged),
            b'X' => Some(Self::Unknown),
            b'B' => Some(Self::Broken),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Copied => 'C',
            Self::Deleted => 'D',
            Self::Modified => 'M',
            Self::Renamed => 'R',
            Self::TypeChanged => 'T',
            Self::Unmerged => 'U',
            Self::Unknown => 'X',
            Self::Broken => 'B',
        }
    }
}

/// One file change as parsed from a `--raw` record line. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub blob_before: String,
    pub blob_after: String,
    pub status: ChangeStatus,
    /// Similarity score for renames/copies (`R086` → 86).
    pub similarity: Option<u8>,
    pub path_before: String,
    /// Empty unless the record is a rename or copy.
    pub path_after: String,
}

impl FileRecord {
    /// The path the change lands at: the rename target when present.
    pub fn display_path(&self) -> &str {
        if self.path_after.is_empty() {
            &self.path_before
        } else {
            &self.path_after
        }
    }

    pub fn file_name(&self) -> &str {
        let path = self.display_path();
        path.rsplit('/').next().unwrap_or(path)
    }
}

/// A record line fanned out to one parent of the current commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRecord {
    pub parent_index: usize,
    pub record: FileRecord,
}

/// One classified input line.
#[derive(Debug, Clone, PartialEq)]
pub enum GitLine {
    /// `# <commit> [<parent>...]`
    Marker {
        commit: String,
        parents: Vec<String>,
    },
    /// `:<mode> <mode> <blob> <blob> <status>\t<path>[\t<path>]`; combined
    /// merge rows (`c` leading colons) yield one entry per affected parent.
    Records(Vec<ParentRecord>),
    /// `<added>\t<deleted>\t<path>`; `path` already rename-resolved.
    NumStat {
        added: String,
        deleted: String,
        path: String,
    },
    /// ` N files changed, X insertions(+), Y deletions(-)`
    ShortStat(String),
    Blank,
}

/// Classify one line of stream output. `None` means the line matches no
/// expected shape (a parse anomaly; the caller logs and skips it).
pub fn classify(line: &str) -> Option<GitLine> {
    if line.trim().is_empty() {
        return Some(GitLine::Blank);
    }
    if let Some(rest) = line.strip_prefix("# ") {
        return parse_marker(rest);
    }
    if line.starts_with(':') {
        return parse_record(line).map(GitLine::Records);
    }
    if let Some(caps) = NUMSTAT_RE.captures(line) {
        return Some(GitLine::NumStat {
            added: caps[1].to_string(),
            deleted: caps[2].to_string(),
            path: resolve_rename(&caps[3]),
        });
    }
    if SHORTSTAT_RE.is_match(line) {
        return Some(GitLine::ShortStat(line.trim().to_string()));
    }
    None
}

/// Resolve a numstat rename marker to the post-rename path.
///
/// `a/{old => new}/b` → `a/new/b`, `old => new` → `new`; an empty side of
/// the braces leaves a doubled slash that is collapsed.
pub fn resolve_rename(path: &str) -> String {
    if path.contains('{') && path.contains(" => ") {
        let resolved = RENAME_BRACES_RE.replace_all(path, "$1");
        return resolved.replace("//", "/");
    }
    if let Some((_, new_path)) = path.split_once(" => ") {
        return new_path.to_string();
    }
    path.to_string()
}

fn parse_marker(rest: &str) -> Option<GitLine> {
    let mut fields = rest.split_whitespace();
    let commit = fields.next()?.to_string();
    let parents = fields.map(str::to_string).collect();
    Some(GitLine::Marker { commit, parents })
}

fn parse_status(field: &str) -> Option<(ChangeStatus, Option<u8>)> {
    let status = ChangeStatus::from_byte(*field.as_bytes().first()?)?;
    let similarity = if field.len() > 1 {
        Some(field[1..].parse().ok()?)
    } else {
        None
    };
    Some((status, similarity))
}

fn parse_record(line: &str) -> Option<Vec<ParentRecord>> {
    let colons = line.bytes().take_while(|b| *b == b':').count();
    let rest = &line[colons..];
    let (fields_part, paths_part) = rest.split_once('\t')?;
    let fields: Vec<&str> = fields_part.split_whitespace().collect();

    // c parents: c+1 modes, c+1 blobs, then the status field.
    if fields.len() != 2 * (colons + 1) + 1 {
        return None;
    }
    let blobs = &fields[colons + 1..2 * (colons + 1)];
    let status_field = fields[2 * (colons + 1)];

    let mut paths = paths_part.split('\t');
    let path_before = paths.next()?.to_string();
    let path_after = paths.next().unwrap_or("").to_string();

    if colons == 1 {
        let (status, similarity) = parse_status(status_field)?;
        return Some(vec![ParentRecord {
            parent_index: 0,
            record: FileRecord {
                blob_before: blobs[0].to_string(),
                blob_after: blobs[1].to_string(),
                status,
                similarity,
                path_before,
                path_after,
            },
        }]);
    }

    // Combined merge row: one status byte per parent, the final blob last.
    let final_blob = blobs[colons];
    let mut out = Vec::new();
    for (index, byte) in status_field.bytes().enumerate().take(colons) {
        if byte == b'.' || byte == b' ' {
            continue;
        }
        let status = ChangeStatus::from_byte(byte)?;
        out.push(ParentRecord {
            parent_index: index,
            record: FileRecord {
                blob_before: blobs[index].to_string(),
                blob_after: final_blob.to_string(),
                status,
                similarity: None,
                path_before: path_before.clone(),
                path_after: path_after.clone(),
            },
        });
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_marker_with_parents() {
        let line = "# 9d0ccb54 63aa0c07 7f3c2a10";
        match classify(line) {
            Some(GitLine::Marker { commit, parents }) => {
                assert_eq!(commit, "9d0ccb54");
                assert_eq!(parents, vec!["63aa0c07", "7f3c2a10"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn classifies_root_commit_marker() {
        match classify("# 9d0ccb54") {
            Some(GitLine::Marker { commit, parents }) => {
                assert_eq!(commit, "9d0ccb54");
                assert!(parents.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_plain_record() {
        let line = ":100644 100644 0cbabf4 d641678 M\tsrc/fold.c";
        let Some(GitLine::Records(records)) = classify(line) else {
            panic!("not a record");
        };
        assert_eq!(records.len(), 1);
        let rec = &records[0].record;
        assert_eq!(rec.blob_before, "0cbabf4");
        assert_eq!(rec.blob_after, "d641678");
        assert_eq!(rec.status, ChangeStatus::Modified);
        assert_eq!(rec.path_before, "src/fold.c");
        assert!(rec.path_after.is_empty());
        assert_eq!(rec.display_path(), "src/fold.c");
        assert_eq!(rec.file_name(), "fold.c");
    }

    #[test]
    fn parses_rename_record_with_score() {
        let line = ":100644 100644 9af3a24 0cbabf4 R098\tREADME.txt\tREADME.rst";
        let Some(GitLine::Records(records)) = classify(line) else {
            panic!("not a record");
        };
        let rec = &records[0].record;
        assert_eq!(rec.status, ChangeStatus::Renamed);
        assert_eq!(rec.similarity, Some(98));
        assert_eq!(rec.path_before, "README.txt");
        assert_eq!(rec.path_after, "README.rst");
        assert_eq!(rec.display_path(), "README.rst");
    }

    #[test]
    fn fans_out_combined_merge_record() {
        let line = "::100644 100644 100644 fabadb8 cc95eb0 4866510 MM\tdesc.c";
        let Some(GitLine::Records(records)) = classify(line) else {
            panic!("not a record");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].parent_index, 0);
        assert_eq!(records[0].record.blob_before, "fabadb8");
        assert_eq!(records[0].record.blob_after, "4866510");
        assert_eq!(records[1].parent_index, 1);
        assert_eq!(records[1].record.blob_before, "cc95eb0");
        assert_eq!(records[1].record.blob_after, "4866510");
    }

    #[test]
    fn combined_record_skips_untouched_parent() {
        let line = "::100644 100644 100644 fabadb8 cc95eb0 4866510 .M\tdesc.c";
        let Some(GitLine::Records(records)) = classify(line) else {
            panic!("not a record");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].parent_index, 1);
    }

    #[test]
    fn classifies_numstat_and_shortstat() {
        match classify("2\t0\tsrc/fold.c") {
            Some(GitLine::NumStat {
                added,
                deleted,
                path,
            }) => {
                assert_eq!(added, "2");
                assert_eq!(deleted, "0");
                assert_eq!(path, "src/fold.c");
            }
            other => panic!("unexpected: {other:?}"),
        }
        // Binary files show dashes.
        assert!(matches!(
            classify("-\t-\tassets/logo.png"),
            Some(GitLine::NumStat { .. })
        ));
        assert!(matches!(
            classify(" 1 file changed, 2 insertions(+)"),
            Some(GitLine::ShortStat(_))
        ));
        assert!(matches!(
            classify(" 3 files changed, 2 insertions(+), 1 deletion(-)"),
            Some(GitLine::ShortStat(_))
        ));
    }

    #[test]
    fn numstat_resolves_rename_markers() {
        match classify("1\t1\tsrc/{old => new}/mod.rs") {
            Some(GitLine::NumStat { path, .. }) => assert_eq!(path, "src/new/mod.rs"),
            other => panic!("unexpected: {other:?}"),
        }
        match classify("1\t1\tREADME.txt => README.rst") {
            Some(GitLine::NumStat { path, .. }) => assert_eq!(path, "README.rst"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn resolve_rename_handles_empty_sides() {
        assert_eq!(resolve_rename("src/{ => core}/lib.rs"), "src/core/lib.rs");
        assert_eq!(resolve_rename("src/{core => }/lib.rs"), "src/lib.rs");
        assert_eq!(resolve_rename("plain/path.rs"), "plain/path.rs");
    }

    #[test]
    fn unrecognized_lines_are_anomalies() {
        assert!(classify("diff --git a/x b/x").is_none());
        assert!(classify(":bad record").is_none());
        assert!(matches!(classify("   "), Some(GitLine::Blank)));
    }
}
