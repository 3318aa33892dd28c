//! Error types, diagnostics and result definitions for the XASL plan compiler.
//!
//! Every builder in the compiler returns [`Result<T>`]. A failing builder never
//! hands back a partially-built plan; the `Err` propagates with `?` until the
//! statement entry point, which turns it into the user-facing rejection.
//!
//! # Error Categories
//!
//! - **Resource errors** ([`Error::Resource`]): arena allocation failed or the
//!   configured plan-node budget was exhausted. Always fatal.
//! - **Semantic-compile errors** ([`Error::UnresolvedDomain`],
//!   [`Error::Unsupported`], [`Error::Internal`], [`Error::InvalidPlan`]):
//!   fatal to the statement, reported against the offending parse-tree node.
//! - **Domain/constraint errors** ([`Error::AttributeNotFound`],
//!   [`Error::Constraint`]): raised by the DML compilers.
//! - **Collaborator errors** ([`Error::Catalog`]): the catalog could not
//!   answer a lookup.
//!
//! Optimizer unavailability is *not* an error: the plan-shape selector retries
//! and falls back, recording a [`Severity::Warning`] [`Diagnostic`] instead.

pub mod diagnostic;
pub mod error;
pub mod result;

pub use diagnostic::{Diagnostic, Severity};
pub use error::Error;
pub use result::Result;
