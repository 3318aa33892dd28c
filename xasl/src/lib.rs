//! XASL query-plan compiler.
//!
//! This crate re-exports the workspace's public surface:
//!
//! - [`expr`]: the bound parse tree the compiler consumes.
//! - [`plan`]: the plan graph it produces, with validation and explain output.
//! - [`compile_statement`] and the [`Catalog`] / [`PlanOptimizer`]
//!   collaborator traits.
//!
//! ```
//! use xasl::expr::{AstBuilder, Query, Statement};
//! use xasl::{AttributeInfo, Catalog, CompilerOptions, NoOptimizer, compile_statement};
//! use xasl::types::{AttrId, ClassId, Domain, HeapId, IndexId};
//!
//! struct OneColumn;
//!
//! impl Catalog for OneColumn {
//!     fn attribute_info(&self, class: ClassId, name: &str) -> xasl::Result<AttributeInfo> {
//!         match name {
//!             "a" => Ok(AttributeInfo::new(AttrId::new(1), Domain::Integer)),
//!             _ => Err(xasl::Error::AttributeNotFound { class, name: name.into() }),
//!         }
//!     }
//!     fn class_heap(&self, _: ClassId) -> xasl::Result<HeapId> {
//!         Ok(HeapId::new(1))
//!     }
//!     fn class_index(&self, _: ClassId, _: &[AttrId]) -> Option<IndexId> {
//!         None
//!     }
//!     fn attributes(&self, _: ClassId) -> xasl::Result<Vec<(String, AttributeInfo)>> {
//!         Ok(vec![("a".into(), AttributeInfo::new(AttrId::new(1), Domain::Integer))])
//!     }
//! }
//!
//! let mut b = AstBuilder::new();
//! let t = b.from_class(ClassId::new(7), "t");
//! let a = b.name(t.spec, "a", Domain::Integer);
//! let mut block = b.select(vec![a]);
//! block.from.push(t);
//! let stmt = Statement::Query(Query::Select(Box::new(block)));
//!
//! let compiled =
//!     compile_statement(&OneColumn, &NoOptimizer, CompilerOptions::default(), &stmt).unwrap();
//! assert_eq!(compiled.plan.root_node().unwrap().proc.name(), "BUILDLIST");
//! ```

pub use xasl_compiler::{
    AccessPlan, AttributeInfo, Catalog, CompiledStatement, CompilerOptions, NoOptimizer,
    OptimizerRequest, PlanOptimizer, PlannedMethod, TableAccess, TableRef, TranslationContext,
    compile_in, compile_statement,
};
pub use xasl_result::{Diagnostic, Error, Result, Severity};

pub mod expr {
    pub use xasl_expr::*;
}

pub mod plan {
    pub use xasl_plan::*;
}

pub mod types {
    pub use xasl_types::*;
}
