use std::fmt;

use thiserror::Error;
use xasl_types::{ClassId, NodeId};

/// Unified error type for plan compilation.
///
/// Variants map onto the failure taxonomy of the compiler. Semantic variants
/// carry the [`NodeId`] of the parse-tree node that triggered them when one is
/// known, so the caller can point a diagnostic at the user's SQL.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Arena allocation failed or the plan-node budget was exhausted.
    ///
    /// The whole statement compilation is abandoned immediately.
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// The static type of an operand could not be determined, and no expected
    /// domain was recorded for it either.
    #[error("cannot determine the domain of {detail}")]
    UnresolvedDomain {
        node: Option<NodeId>,
        detail: String,
    },

    /// An operator, argument combination or target shape that the compiler
    /// does not implement.
    #[error("unsupported: {detail}")]
    Unsupported {
        node: Option<NodeId>,
        detail: String,
    },

    /// A name referenced in the statement is not an attribute of its class.
    #[error("attribute '{name}' not found on class {class}")]
    AttributeNotFound { class: ClassId, name: String },

    /// A DML statement would violate a declared constraint.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The catalog collaborator failed to answer a lookup.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// The finished plan graph violates a structural invariant.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Internal invariant violated; indicates a bug in the compiler or a
    /// malformed input tree.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Domain-resolution failure attached to a parse-tree node.
    #[inline]
    pub fn unresolved_domain(node: impl Into<Option<NodeId>>, detail: impl fmt::Display) -> Self {
        Error::UnresolvedDomain {
            node: node.into(),
            detail: detail.to_string(),
        }
    }

    /// Unsupported-construct failure attached to a parse-tree node.
    #[inline]
    pub fn unsupported(node: impl Into<Option<NodeId>>, detail: impl fmt::Display) -> Self {
        Error::Unsupported {
            node: node.into(),
            detail: detail.to_string(),
        }
    }

    /// Create an internal error from any displayable value.
    #[inline]
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        Error::Internal(err.to_string())
    }

    /// The parse-tree node this error is attributed to, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Error::UnresolvedDomain { node, .. } | Error::Unsupported { node, .. } => *node,
            _ => None,
        }
    }

    /// True for errors that abort compilation regardless of context.
    pub fn is_resource(&self) -> bool {
        matches!(self, Error::Resource(_))
    }
}
