use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::LoadError;
use crate::remap::RemapReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodedErrorKind {
    Usage,
    Resolve,
    Build,
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind: CodedErrorKind::Usage,
        }
    }

    /// Wraps a failed load, attaching remapped diagnostics when there are any.
    pub fn from_load(error: &LoadError, report: Option<&RemapReport>) -> Self {
        let kind = match error {
            LoadError::Resolve(_) => CodedErrorKind::Resolve,
            LoadError::NotInitialized
            | LoadError::Vertex(_)
            | LoadError::Compile { .. }
            | LoadError::Link(_) => CodedErrorKind::Build,
        };
        let coded = Self {
            code: error.code(),
            message: error.to_string(),
            details: None,
            kind,
        };
        match report {
            Some(report) => coded.with_details(json!({
                "diagnostics": report.diagnostics,
                "unresolved": report.unresolved,
            })),
            None => coded,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                kind: self.kind,
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub kind: CodedErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn coded_error_survives_context_layers() {
        let error = Err::<(), _>(anyhow!(CodedError::usage("MISSING_ENTRY", "no entry")))
            .context("while checking")
            .unwrap_err();
        let coded = find_coded_error(&error).expect("coded error should be found");
        assert_eq!(coded.code, "MISSING_ENTRY");

        let envelope = serde_json::to_value(coded.envelope()).unwrap();
        assert_eq!(envelope["ok"], false);
        assert_eq!(envelope["error"]["kind"], "usage");
        assert!(envelope["error"].get("details").is_none());
    }

    #[test]
    fn load_errors_carry_their_code_and_diagnostics() {
        let report = RemapReport {
            unresolved: vec!["odd line".to_owned()],
            ..RemapReport::default()
        };
        let coded = CodedError::from_load(&LoadError::Compile { diagnostics: 1 }, Some(&report));
        assert_eq!(coded.code, "COMPILE_FAILED");
        assert_eq!(coded.kind, CodedErrorKind::Build);
        assert_eq!(
            coded.details.unwrap()["unresolved"],
            json!(["odd line"])
        );
    }
}
