//! Diagnostics accumulated during one statement compilation.
//!
//! Diagnostics are records for reporting, never for control flow: builders
//! still return `Err` to stop work. The statement entry point consults the
//! recorded list before trusting an `Ok` result.

use std::fmt;

use xasl_types::NodeId;

use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub node: Option<NodeId>,
    pub message: String,
    /// The error this diagnostic was recorded from, for `Severity::Error`.
    pub error: Option<Error>,
}

impl Diagnostic {
    pub fn warning(node: Option<NodeId>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            node,
            message: message.into(),
            error: None,
        }
    }

    pub fn from_error(error: Error) -> Self {
        Self {
            severity: Severity::Error,
            node: error.node(),
            message: error.to_string(),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Convert back into the error that should reject the statement.
    pub fn into_error(self) -> Error {
        match self.error {
            Some(err) => err,
            None => Error::Internal(self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.node {
            Some(node) => write!(f, "{level} at {node}: {}", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_diagnostic_round_trips_to_error() {
        let err = Error::unsupported(NodeId::new(3), "LIKE on SET");
        let diag = Diagnostic::from_error(err.clone());
        assert!(diag.is_error());
        assert_eq!(diag.node, Some(NodeId::new(3)));
        assert_eq!(diag.into_error(), err);
    }

    #[test]
    fn warnings_render_without_node() {
        let diag = Diagnostic::warning(None, "hints ignored");
        assert_eq!(diag.to_string(), "warning: hints ignored");
    }
}
