//! Executable plan ("XASL") data model.
//!
//! A plan is a graph of [`XaslNode`]s stored in a [`PlanArena`] and linked by
//! index handles. Each node owns its output [`ValueList`] shape, an out-list
//! of [`ReguVar`]s, its access specs and its subquery lists; subquery plans
//! referenced from several expression sites are shared by handle.
//!
//! The crate also carries the graph utilities the compiler and its consumers
//! need: iterative [`traversal`], structural [`validation`] and a textual
//! [`explain`] renderer.

pub mod access;
pub mod arena;
pub mod explain;
pub mod node;
pub mod predicate;
pub mod regu;
pub mod traversal;
pub mod validation;

pub use access::{
    AccessMethod, AccessSpec, AccessTarget, AttrProjection, IndexRange, IndexRangeKind, KeyRange,
    RangeKind,
};
pub use arena::{AttrCacheId, PlanArena, ValueList, ValueListId, ValueSlot, XaslId, XaslPlan};
pub use node::{
    AggregateDesc, BuildListProc, BuildValueProc, ConnectByProc, DeleteProc, DmlTarget, GroupBy,
    IndexAggregateHint, InsertProc, InsertSource, ProcKind, SetOpProc, SortItem, UpdateProc,
    XaslNode,
};
pub use predicate::{EvalTerm, PredExpr, UnaryPredOp};
pub use regu::{
    ArithExpr, ArithKind, AttrKind, AttrRef, FuncCall, FuncKind, PseudoSlot, ReguVar, SlotRef,
};
pub use validation::{validate_from, validate_plan};
