use std::fmt;

use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// Receives human-readable diagnostics. Fire-and-forget.
pub trait DiagnosticSink {
    fn report(&mut self, severity: Severity, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxMessage {
    pub severity: Severity,
    pub message: String,
}

/// Collects reported messages until the host reads or clears them.
#[derive(Debug, Default)]
pub struct Mailbox {
    messages: Vec<MailboxMessage>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[MailboxMessage] {
        &self.messages
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|message| message.severity == Severity::Error)
            .map(|message| message.message.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl DiagnosticSink for Mailbox {
    fn report(&mut self, severity: Severity, message: &str) {
        self.messages.push(MailboxMessage {
            severity,
            message: message.to_owned(),
        });
    }
}

/// Forwards diagnostics to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, severity: Severity, message: &str) {
        match severity {
            Severity::Error => error!("{message}"),
            Severity::Warning => warn!("{message}"),
        }
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn report(&mut self, severity: Severity, message: &str) {
        (**self).report(severity, message);
    }
}
