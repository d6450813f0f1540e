//! Expands `#include "path"` directives into a single flattened unit.
//!
//! Resolution is depth-first and pre-order: an included file's content lands
//! before the remaining lines of its includer. Every file is expanded at most
//! once per pass; later includes of the same file (including cycles) leave a
//! single blank placeholder line so the total line count stays predictable.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ResolveError, ResolveResult};
use crate::line_index::{modified_time, FileRecords, FileStamp};

const INCLUDE_DIRECTIVE: &str = "#include";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IncludeLimits {
    /// Deepest allowed nesting below the entry file.
    pub max_depth: usize,
    /// Distinct files allowed in one unit, entry included.
    pub max_files: usize,
}

impl Default for IncludeLimits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_files: 1024,
        }
    }
}

/// The flattened program text, one entry per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceUnit {
    lines: Vec<String>,
}

impl SourceUnit {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// 1-based access, matching diagnostic line numbers.
    pub fn line(&self, line: u32) -> Option<&str> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        self.lines.get(index).map(String::as_str)
    }

    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|line| line.len() + 1).sum());
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

impl fmt::Display for SourceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub unit: SourceUnit,
    pub records: FileRecords,
}

/// A failed pass, with the stamps of every file it touched so a watcher can
/// retry once one of them changes (or a missing one appears).
#[derive(Debug)]
pub struct ResolveFailure {
    pub error: ResolveError,
    pub stamps: Vec<FileStamp>,
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ResolveFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeLine<'a> {
    Code,
    Include(&'a str),
    Malformed,
}

/// Classifies one raw source line. Anything containing `#include` must carry a
/// double-quoted, non-empty path after the directive.
pub fn parse_include(line: &str) -> IncludeLine<'_> {
    let Some(position) = line.find(INCLUDE_DIRECTIVE) else {
        return IncludeLine::Code;
    };
    let after = &line[position + INCLUDE_DIRECTIVE.len()..];
    let Some(open) = after.find('"') else {
        return IncludeLine::Malformed;
    };
    let quoted = &after[open + 1..];
    match quoted.find('"') {
        Some(close) if close > 0 => IncludeLine::Include(&quoted[..close]),
        _ => IncludeLine::Malformed,
    }
}

struct ResolveContext {
    limits: IncludeLimits,
    lines: Vec<String>,
    records: FileRecords,
    visited: HashSet<PathBuf>,
    missing: Option<FileStamp>,
}

pub fn resolve(entry: &Path, limits: IncludeLimits) -> Result<Resolved, ResolveFailure> {
    if !entry.is_file() {
        return Err(ResolveFailure {
            error: ResolveError::MissingFile {
                path: entry.to_path_buf(),
                included_from: None,
            },
            stamps: vec![FileStamp::capture(entry)],
        });
    }

    let entry = fs::canonicalize(entry).map_err(|source| ResolveFailure {
        error: ResolveError::Io {
            path: entry.to_path_buf(),
            source,
        },
        stamps: vec![FileStamp::capture(entry)],
    })?;
    let root = entry
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let mut context = ResolveContext {
        limits,
        lines: Vec::new(),
        records: FileRecords::new(root),
        visited: HashSet::new(),
        missing: None,
    };

    match visit(&mut context, &entry, 0) {
        Ok(()) => {
            debug!(
                entry = %entry.display(),
                files = context.records.len(),
                lines = context.lines.len(),
                "resolved shader unit"
            );
            Ok(Resolved {
                unit: SourceUnit {
                    lines: context.lines,
                },
                records: context.records,
            })
        }
        Err(error) => {
            let mut stamps = context.records.stamps();
            stamps.extend(context.missing);
            Err(ResolveFailure { error, stamps })
        }
    }
}

fn visit(context: &mut ResolveContext, path: &Path, depth: usize) -> ResolveResult<()> {
    if depth > context.limits.max_depth {
        return Err(ResolveError::TooManyIncludes {
            file: path.to_path_buf(),
            limit: context.limits.max_depth,
        });
    }
    if context.records.len() >= context.limits.max_files {
        return Err(ResolveError::TooManyIncludes {
            file: path.to_path_buf(),
            limit: context.limits.max_files,
        });
    }

    context.visited.insert(path.to_path_buf());
    let record = context
        .records
        .push_record(path.to_path_buf(), modified_time(path));

    let contents = fs::read_to_string(path).map_err(|source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let directory = path.parent().unwrap_or_else(|| Path::new("."));

    for (index, raw) in contents.lines().enumerate() {
        let local_line = index as u32 + 1;
        match parse_include(raw) {
            IncludeLine::Code => {
                context.lines.push(raw.to_owned());
                context.records.push_own_line(record, local_line);
            }
            IncludeLine::Malformed => {
                return Err(ResolveError::MalformedInclude {
                    file: path.to_path_buf(),
                    line: local_line,
                    text: raw.trim().to_owned(),
                });
            }
            IncludeLine::Include(target) => {
                let candidate = directory.join(target);
                if !candidate.is_file() {
                    context.missing = Some(FileStamp::capture(&candidate));
                    return Err(ResolveError::MissingFile {
                        path: candidate,
                        included_from: Some((path.to_path_buf(), local_line)),
                    });
                }
                let target_path =
                    fs::canonicalize(&candidate).map_err(|source| ResolveError::Io {
                        path: candidate.clone(),
                        source,
                    })?;

                if context.visited.contains(&target_path) {
                    debug!(
                        file = %target_path.display(),
                        from = %path.display(),
                        line = local_line,
                        "skipping repeated include"
                    );
                    context.lines.push(String::new());
                    context.records.push_placeholder(record, local_line);
                } else {
                    visit(context, &target_path, depth + 1)?;
                }
            }
        }
    }

    Ok(())
}
