//! Rewrites backend diagnostics from flattened line numbers to the file and
//! local line the programmer edited.
//!
//! Parsing the backend's message shape is delegated to a [`DiagnosticFormat`];
//! swapping compilers only means swapping the format.

use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::line_index::{Attribution, FileRecords};

pub const COMPILE_ERROR_HEADER: &str = "Shader compilation error";

/// One backend line split around its flattened line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDiagnostic<'a> {
    /// Text kept in front of the rewritten location (severity tags etc.).
    pub prefix: &'a str,
    pub line: u32,
    /// Everything after the location, unchanged.
    pub rest: &'a str,
}

pub trait DiagnosticFormat: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the line does not carry a usable line number.
    fn parse_line<'a>(&self, raw: &'a str) -> Option<RawDiagnostic<'a>>;
}

/// `<unit>(<line>)<rest>`, e.g. `0(12) : error C0000: syntax error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParenLineFormat;

impl DiagnosticFormat for ParenLineFormat {
    fn name(&self) -> &'static str {
        "paren"
    }

    fn parse_line<'a>(&self, raw: &'a str) -> Option<RawDiagnostic<'a>> {
        static PAREN_RE: OnceLock<Regex> = OnceLock::new();
        let re = PAREN_RE.get_or_init(|| {
            Regex::new(r"^\s*[^\s()]*\((\d+)\)").expect("paren diagnostic regex should compile")
        });
        let capture = re.captures(raw)?;
        let whole = capture.get(0)?;
        let line = capture.get(1)?.as_str().parse::<u32>().ok()?;
        Some(RawDiagnostic {
            prefix: "",
            line,
            rest: &raw[whole.end()..],
        })
    }
}

/// `[ERROR: ]<unit>:<line>:<rest>` or `<unit>:<line>(<col>)<rest>`, the
/// glslang and Mesa shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColonLineFormat;

impl DiagnosticFormat for ColonLineFormat {
    fn name(&self) -> &'static str {
        "colon"
    }

    fn parse_line<'a>(&self, raw: &'a str) -> Option<RawDiagnostic<'a>> {
        static COLON_RE: OnceLock<Regex> = OnceLock::new();
        let re = COLON_RE.get_or_init(|| {
            Regex::new(r"^(\s*(?:[A-Za-z]+:\s*)?)\d+:(\d+)")
                .expect("colon diagnostic regex should compile")
        });
        let capture = re.captures(raw)?;
        let whole = capture.get(0)?;
        let prefix = capture.get(1).map_or("", |prefix| prefix.as_str());
        let line = capture.get(2)?.as_str().parse::<u32>().ok()?;
        Some(RawDiagnostic {
            prefix,
            line,
            rest: &raw[whole.end()..],
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticFormatKind {
    #[default]
    Paren,
    Colon,
}

impl DiagnosticFormatKind {
    pub fn format(self) -> &'static dyn DiagnosticFormat {
        static PAREN: ParenLineFormat = ParenLineFormat;
        static COLON: ColonLineFormat = ColonLineFormat;
        match self {
            Self::Paren => &PAREN,
            Self::Colon => &COLON,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub source_file: PathBuf,
    pub display: String,
    pub local_line: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RemapReport {
    /// Aggregated message for the diagnostic sink.
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Lines that could not be attributed to a file, as emitted in `text`.
    pub unresolved: Vec<String>,
}

impl RemapReport {
    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.len() + self.unresolved.len()
    }
}

pub fn remap(raw: &str, records: &FileRecords, format: &dyn DiagnosticFormat) -> RemapReport {
    let mut report = RemapReport {
        text: COMPILE_ERROR_HEADER.to_owned(),
        ..RemapReport::default()
    };

    for raw_line in raw.lines().filter(|line| !line.trim().is_empty()) {
        let rewritten = match format.parse_line(raw_line) {
            Some(parsed) if parsed.line > 0 => match records.attribute(parsed.line) {
                Attribution::Own(located) | Attribution::Enclosing(located) => {
                    report.diagnostics.push(Diagnostic {
                        source_file: located.record.path.clone(),
                        display: located.record.display.clone(),
                        local_line: located.local_line,
                        message: clean_message(parsed.rest),
                    });
                    format!(
                        "{}{} => {}{}",
                        parsed.prefix, located.record.display, located.local_line, parsed.rest
                    )
                }
                Attribution::Unresolved => {
                    let line = format!(
                        "{}<unresolved> line {}{}",
                        parsed.prefix, parsed.line, parsed.rest
                    );
                    report.unresolved.push(line.clone());
                    line
                }
            },
            _ => {
                report.unresolved.push(raw_line.to_owned());
                raw_line.to_owned()
            }
        };
        let _ = write!(report.text, "\n{rewritten}");
    }

    report
}

fn clean_message(rest: &str) -> String {
    rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .trim_end()
        .to_owned()
}
