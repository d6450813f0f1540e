//! Error types for include resolution and shader loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for include resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Fatal failures of one resolution pass. No partial unit is produced.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("\"{}\" doesn't exist!{}", path.display(), describe_origin(included_from))]
    MissingFile {
        path: PathBuf,
        /// Includer and its 1-based local line, `None` for the entry file.
        included_from: Option<(PathBuf, u32)>,
    },

    #[error("{} => {line}: malformed include, expected #include \"path\": '{text}'", file.display())]
    MalformedInclude {
        file: PathBuf,
        line: u32,
        text: String,
    },

    #[error("too many includes while resolving {} (limit {limit})", file.display())]
    TooManyIncludes { file: PathBuf, limit: usize },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ResolveError {
    /// Stable machine-readable code, shared with the CLI error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFile { .. } => "MISSING_FILE",
            Self::MalformedInclude { .. } => "MALFORMED_INCLUDE",
            Self::TooManyIncludes { .. } => "TOO_MANY_INCLUDES",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}

fn describe_origin(included_from: &Option<(PathBuf, u32)>) -> String {
    match included_from {
        Some((file, line)) => format!(" (included from {}:{})", file.display(), line),
        None => String::new(),
    }
}

/// Why a call to `DynamicShader::load` did not produce a new program.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("shader was not initialized, call initialize() before load()")]
    NotInitialized,

    #[error("built-in vertex stage failed to compile: {0}")]
    Vertex(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("shader compilation failed with {diagnostics} diagnostic(s)")]
    Compile { diagnostics: usize },

    #[error("cannot link shader program => {0}")]
    Link(String),
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Vertex(_) => "VERTEX_FAILED",
            Self::Resolve(error) => error.code(),
            Self::Compile { .. } => "COMPILE_FAILED",
            Self::Link(_) => "LINK_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_include_names_the_includer() {
        let error = ResolveError::MissingFile {
            path: PathBuf::from("shaders/missing.glsl"),
            included_from: Some((PathBuf::from("shaders/main.glsl"), 3)),
        };
        let message = error.to_string();
        assert!(message.contains("missing.glsl"));
        assert!(message.contains("main.glsl:3"));
        assert_eq!(error.code(), "MISSING_FILE");
    }

    #[test]
    fn load_error_forwards_resolve_codes() {
        let error = LoadError::from(ResolveError::TooManyIncludes {
            file: PathBuf::from("deep.glsl"),
            limit: 4,
        });
        assert_eq!(error.code(), "TOO_MANY_INCLUDES");
        assert_eq!(LoadError::Link("x".to_owned()).code(), "LINK_FAILED");
    }
}
