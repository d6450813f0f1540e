//! Live GLSL shader loading with `#include` resolution and diagnostics mapped
//! back to the files that were edited.

pub mod backend;
pub mod config;
pub mod error;
pub mod error_codes;
pub mod line_index;
pub mod remap;
pub mod resolver;
pub mod shader_unit;
pub mod sink;
pub mod watch;

pub use backend::{CompileOutcome, CompilerBackend, NagaGlslBackend, ShaderStage};
pub use error::{LoadError, ResolveError};
pub use line_index::{FileRecord, FileRecords};
pub use remap::{remap, DiagnosticFormatKind, RemapReport};
pub use resolver::{resolve, IncludeLimits, SourceUnit};
pub use shader_unit::{DynamicShader, UnitState};
pub use sink::{DiagnosticSink, Mailbox, Severity, TracingSink};
