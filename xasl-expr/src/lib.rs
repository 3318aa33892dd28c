//! Input model of the plan compiler: statements whose names, classes and
//! static types have already been bound.
//!
//! Every expression node carries a [`NodeId`](xasl_types::NodeId). Two
//! expression sites holding the same id are the same logical node; the
//! compiler relies on this to compile a shared subquery once.

pub mod build;
pub mod expr;
pub mod format;
pub mod statement;
pub mod visit;

pub use build::AstBuilder;
pub use expr::*;
pub use statement::*;
