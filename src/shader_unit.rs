//! Owns the compile/link state of one live shader and decides when it is
//! stale.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::backend::{CompileOutcome, CompilerBackend, ShaderStage};
use crate::error::LoadError;
use crate::line_index::{FileRecords, FileStamp};
use crate::remap::{remap, DiagnosticFormat, DiagnosticFormatKind, RemapReport};
use crate::resolver::{resolve, IncludeLimits, ResolveFailure, Resolved, SourceUnit};
use crate::sink::{DiagnosticSink, Severity};

/// Full-screen quad stage every fragment shader is linked against.
pub const PASSTHROUGH_VERTEX_SHADER: &str = "#version 450 core
layout(location = 0) in vec3 vPos;
layout(location = 2) in vec2 vTexCoord;
layout(location = 0) out vec2 fragCoord;
void main() {
    fragCoord = vTexCoord;
    gl_Position = vec4(vPos, 1.0);
}
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Empty,
    Resolving,
    Compiled,
    Failed,
}

pub struct Build<U> {
    pub resolved: Resolved,
    pub unit: U,
}

pub enum BuildFailure {
    Resolve(ResolveFailure),
    Compile {
        resolved: Resolved,
        report: RemapReport,
    },
}

/// Resolves `entry` and compiles the flattened unit as `stage`. Backend
/// diagnostics come back already remapped to source files.
pub fn build_unit<B: CompilerBackend>(
    backend: &mut B,
    entry: &Path,
    stage: ShaderStage,
    limits: IncludeLimits,
    format: &dyn DiagnosticFormat,
) -> Result<Build<B::Unit>, BuildFailure> {
    let resolved = resolve(entry, limits).map_err(BuildFailure::Resolve)?;
    match backend.compile(&resolved.unit.text(), stage) {
        CompileOutcome::Compiled(unit) => Ok(Build { resolved, unit }),
        CompileOutcome::Failed { raw_diagnostics } => {
            let report = remap(&raw_diagnostics, &resolved.records, format);
            Err(BuildFailure::Compile { resolved, report })
        }
    }
}

pub struct DynamicShader<B: CompilerBackend> {
    backend: B,
    limits: IncludeLimits,
    format_override: Option<DiagnosticFormatKind>,
    vertex: Option<B::Unit>,
    program: Option<B::Program>,
    state: UnitState,
    entry: Option<PathBuf>,
    unit: Option<SourceUnit>,
    records: Option<FileRecords>,
    stamps: Vec<FileStamp>,
    last_report: Option<RemapReport>,
}

impl<B: CompilerBackend> DynamicShader<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            limits: IncludeLimits::default(),
            format_override: None,
            vertex: None,
            program: None,
            state: UnitState::Empty,
            entry: None,
            unit: None,
            records: None,
            stamps: Vec::new(),
            last_report: None,
        }
    }

    pub fn with_limits(mut self, limits: IncludeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Parse backend output with `kind` instead of the backend's own format.
    pub fn with_diagnostic_format(mut self, kind: DiagnosticFormatKind) -> Self {
        self.format_override = Some(kind);
        self
    }

    /// Compiles the built-in vertex stage. Must run once before `load`.
    pub fn initialize(&mut self) -> Result<(), LoadError> {
        match self
            .backend
            .compile(PASSTHROUGH_VERTEX_SHADER, ShaderStage::Vertex)
        {
            CompileOutcome::Compiled(vertex) => {
                self.vertex = Some(vertex);
                Ok(())
            }
            CompileOutcome::Failed { raw_diagnostics } => {
                Err(LoadError::Vertex(raw_diagnostics.trim_end().to_owned()))
            }
        }
    }

    pub fn load(&mut self, path: &Path, sink: &mut dyn DiagnosticSink) -> Result<(), LoadError> {
        let format = self.diagnostic_format();
        let Some(vertex) = self.vertex.as_ref() else {
            let error = LoadError::NotInitialized;
            sink.report(Severity::Error, &error.to_string());
            self.state = UnitState::Failed;
            return Err(error);
        };

        self.state = UnitState::Resolving;
        self.entry = Some(path.to_path_buf());
        self.last_report = None;

        match build_unit(
            &mut self.backend,
            path,
            ShaderStage::Fragment,
            self.limits,
            format,
        ) {
            Err(BuildFailure::Resolve(failure)) => {
                warn!(entry = %path.display(), "shader resolution failed: {}", failure.error);
                sink.report(Severity::Error, &failure.error.to_string());
                self.unit = None;
                self.records = None;
                self.stamps = failure.stamps;
                self.state = UnitState::Failed;
                Err(failure.error.into())
            }
            Err(BuildFailure::Compile { resolved, report }) => {
                let diagnostics = report.diagnostic_count();
                warn!(entry = %path.display(), diagnostics, "shader compilation failed");
                sink.report(Severity::Error, &report.text);
                self.keep_resolution(resolved);
                self.last_report = Some(report);
                self.state = UnitState::Failed;
                Err(LoadError::Compile { diagnostics })
            }
            Ok(Build { resolved, unit }) => {
                let files = resolved.records.len();
                let lines = resolved.unit.line_count();
                let linked = self.backend.link(vertex, unit);
                self.keep_resolution(resolved);

                match linked {
                    Ok(program) => {
                        info!(entry = %path.display(), files, lines, "shader compiled");
                        self.program = Some(program);
                        self.state = UnitState::Compiled;
                        Ok(())
                    }
                    Err(message) => {
                        warn!(entry = %path.display(), "shader link failed: {message}");
                        sink.report(
                            Severity::Error,
                            &format!("Cannot link shader program => {message}"),
                        );
                        self.state = UnitState::Failed;
                        Err(LoadError::Link(message))
                    }
                }
            }
        }
    }

    /// Full re-resolution of the last entry path.
    pub fn reload(&mut self, sink: &mut dyn DiagnosticSink) -> Result<(), LoadError> {
        match self.entry.clone() {
            Some(entry) => self.load(&entry, sink),
            None => Ok(()),
        }
    }

    /// Any file read by the last build changed, vanished, or appeared.
    pub fn was_updated(&self) -> bool {
        self.stamps.iter().any(FileStamp::is_stale)
    }

    pub fn has_failed(&self) -> bool {
        self.state == UnitState::Failed
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// The last program that compiled and linked, even if a later build failed.
    pub fn program(&self) -> Option<&B::Program> {
        self.program.as_ref()
    }

    pub fn source_unit(&self) -> Option<&SourceUnit> {
        self.unit.as_ref()
    }

    pub fn file_records(&self) -> Option<&FileRecords> {
        self.records.as_ref()
    }

    pub fn watched_files(&self) -> impl Iterator<Item = &Path> {
        self.stamps.iter().map(|stamp| stamp.path.as_path())
    }

    pub fn entry(&self) -> Option<&Path> {
        self.entry.as_deref()
    }

    pub fn last_report(&self) -> Option<&RemapReport> {
        self.last_report.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn diagnostic_format(&self) -> &'static dyn DiagnosticFormat {
        match self.format_override {
            Some(kind) => kind.format(),
            None => self.backend.diagnostic_format(),
        }
    }

    fn keep_resolution(&mut self, resolved: Resolved) {
        self.stamps = resolved.records.stamps();
        self.unit = Some(resolved.unit);
        self.records = Some(resolved.records);
    }
}
