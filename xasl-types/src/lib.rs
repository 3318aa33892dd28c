//! Identifiers, value domains and literal values shared across XASL crates.
//!
//! These types live in `xasl-types` so the parse tree, the plan model and the
//! compiler can agree on them without depending on one another.

pub mod domain;
pub mod ids;
pub mod value;

pub use domain::{CollectionKind, Domain};
pub use ids::{AttrId, ClassId, HeapId, IndexId, NodeId, SpecId};
pub use value::{DbValue, Oid};
