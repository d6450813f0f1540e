//! Per-file provenance of a flattened shader unit.
//!
//! Every line of the flattened unit is either contributed by exactly one file
//! (an "own" line, tracked in contiguous [`Segment`]s) or is a blank
//! placeholder emitted for a repeated `#include`. Line numbers are 1-based in
//! both flattened and local coordinates; `0` never names a content line.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

/// A maximal run of consecutive flattened lines owned by one file whose local
/// line numbers are consecutive as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: u32,
    pub end: u32,
    pub local_start: u32,
}

impl Segment {
    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }

    pub fn local_line(&self, line: u32) -> u32 {
        line - self.start + self.local_start
    }

    pub fn line_count(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// Inclusive flattened line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub display: String,
    #[serde(skip)]
    pub modified: Option<SystemTime>,
    pub segments: Vec<Segment>,
}

impl FileRecord {
    /// First to last own line. `None` when the file contributed no lines.
    pub fn span(&self) -> Option<LineRange> {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        Some(LineRange {
            start: first.start,
            end: last.end,
        })
    }

    pub fn contributed_lines(&self) -> u32 {
        self.segments.iter().map(Segment::line_count).sum()
    }

    fn push_own_line(&mut self, line: u32, local_line: u32) {
        if let Some(last) = self.segments.last_mut() {
            if last.end + 1 == line && last.local_line(last.end) + 1 == local_line {
                last.end = line;
                return;
            }
        }
        self.segments.push(Segment {
            start: line,
            end: line,
            local_start: local_line,
        });
    }
}

/// Blank line emitted in place of an already-resolved include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    pub line: u32,
    pub record: usize,
    pub local_line: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    pub record: &'a FileRecord,
    pub local_line: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum Attribution<'a> {
    /// The line is the file's own content.
    Own(Located<'a>),
    /// The line is a placeholder; attributed to the includer's directive line.
    Enclosing(Located<'a>),
    Unresolved,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileRecords {
    root: PathBuf,
    records: Vec<FileRecord>,
    placeholders: Vec<Placeholder>,
    total_lines: u32,
}

impl FileRecords {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Directory that display paths are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn total_lines(&self) -> u32 {
        self.total_lines
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.iter()
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.iter().find(|record| record.path == path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    /// Strict lookup: only lines owned by some file.
    pub fn locate(&self, line: u32) -> Option<Located<'_>> {
        if line == 0 {
            return None;
        }
        self.records.iter().find_map(|record| {
            record
                .segments
                .iter()
                .find(|segment| segment.contains(line))
                .map(|segment| Located {
                    record,
                    local_line: segment.local_line(line),
                })
        })
    }

    /// Lookup with the placeholder fallback used when reporting diagnostics.
    pub fn attribute(&self, line: u32) -> Attribution<'_> {
        if let Some(located) = self.locate(line) {
            return Attribution::Own(located);
        }
        self.placeholders
            .iter()
            .find(|placeholder| placeholder.line == line)
            .and_then(|placeholder| {
                self.records.get(placeholder.record).map(|record| Located {
                    record,
                    local_line: placeholder.local_line,
                })
            })
            .map_or(Attribution::Unresolved, Attribution::Enclosing)
    }

    pub fn stamps(&self) -> Vec<FileStamp> {
        self.records
            .iter()
            .map(|record| FileStamp {
                path: record.path.clone(),
                modified: record.modified,
            })
            .collect()
    }

    pub(crate) fn push_record(&mut self, path: PathBuf, modified: Option<SystemTime>) -> usize {
        let display = display_path(&self.root, &path);
        self.records.push(FileRecord {
            path,
            display,
            modified,
            segments: Vec::new(),
        });
        self.records.len() - 1
    }

    pub(crate) fn push_own_line(&mut self, record: usize, local_line: u32) -> u32 {
        self.total_lines += 1;
        let line = self.total_lines;
        self.records[record].push_own_line(line, local_line);
        line
    }

    pub(crate) fn push_placeholder(&mut self, record: usize, local_line: u32) -> u32 {
        self.total_lines += 1;
        let line = self.total_lines;
        self.placeholders.push(Placeholder {
            line,
            record,
            local_line,
        });
        line
    }
}

/// Path relative to `root` when it lives below it, otherwise the full path.
pub fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Recorded modification time of a file contributing to a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub path: PathBuf,
    /// `None` when the file did not exist at resolution time.
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn capture(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let modified = modified_time(&path);
        Self { path, modified }
    }

    pub fn is_stale(&self) -> bool {
        modified_time(&self.path) != self.modified
    }
}

pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
}
