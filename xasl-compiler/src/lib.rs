//! Compiles bound statements into executable XASL plans.
//!
//! The input is a parse tree whose names are already resolved
//! ([`xasl_expr::Statement`]); the output is an [`XaslPlan`]: an arena of plan
//! nodes rooted at the statement's node. Compilation is a single synchronous
//! recursive descent over one [`TranslationContext`]. Schema questions go to
//! a [`Catalog`], join order and access methods come from a
//! [`PlanOptimizer`].
//!
//! A statement either compiles completely or is rejected with the first
//! recorded error; no partial plan is ever returned.

mod access;
mod aggregate;
pub mod catalog;
mod connect_by;
pub mod context;
mod dml;
mod index_range;
pub mod optimizer;
pub mod options;
mod predicate;
mod regu;
pub mod scope;
mod select;
mod set_op;

pub use catalog::{AttributeInfo, Catalog};
pub use context::{ScopeGuard, TranslationContext};
pub use optimizer::{
    AccessPlan, NoOptimizer, OptimizerRequest, PlanOptimizer, PlannedMethod, TableAccess,
    TableRef,
};
pub use options::CompilerOptions;

use xasl_expr::Statement;
use xasl_plan::{XaslId, XaslPlan, explain::explain, validate_plan};
use xasl_result::{Diagnostic, Result};

/// A successfully compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub plan: XaslPlan,
    /// Recoverable degradations noticed while compiling, such as optimizer
    /// hints that had to be dropped.
    pub warnings: Vec<Diagnostic>,
}

/// Compile one statement with a fresh context.
pub fn compile_statement(
    catalog: &dyn Catalog,
    optimizer: &dyn PlanOptimizer,
    options: CompilerOptions,
    statement: &Statement,
) -> Result<CompiledStatement> {
    let span = tracing::debug_span!(
        "compile_statement",
        kind = statement.kind_name(),
        node = %statement.id()
    );
    let _enter = span.enter();

    let mut ctx = TranslationContext::new(catalog, optimizer, options);
    let root = compile_in(&mut ctx, statement)?;
    let warnings = ctx.take_diagnostics();
    let options = ctx.options().clone();
    let plan = XaslPlan {
        arena: ctx.into_arena(),
        root,
    };

    if options.validate_plans {
        validate_plan(&plan)?;
    }
    if options.debug_plan {
        tracing::debug!(plan = %explain(&plan)?, "compiled plan");
    }
    tracing::debug!(
        nodes = plan.arena.node_count(),
        value_lists = plan.arena.value_list_count(),
        warnings = warnings.len(),
        "statement compiled"
    );
    Ok(CompiledStatement { plan, warnings })
}

/// Compile `statement` into `ctx`'s arena and return its root node.
///
/// A builder error is recorded on the context and the first recorded error
/// is returned. An `Ok` from the builders is only trusted when no error
/// diagnostic is outstanding.
pub fn compile_in(ctx: &mut TranslationContext<'_>, statement: &Statement) -> Result<XaslId> {
    let compiled = match statement {
        Statement::Query(query) => select::compile_query(ctx, query).map(|q| q.xasl),
        Statement::Insert(insert) => dml::compile_insert(ctx, insert),
        Statement::Update(update) => dml::compile_update(ctx, update),
        Statement::Delete(delete) => dml::compile_delete(ctx, delete),
        Statement::Do(stmt) => dml::compile_do(ctx, stmt),
    };
    match compiled {
        Ok(root) => match ctx.first_error() {
            Some(diag) => Err(diag.clone().into_error()),
            None => Ok(root),
        },
        Err(err) => {
            let err = ctx.record_error(err);
            tracing::debug!(error = %err, "statement rejected");
            Err(ctx.first_error().cloned().map_or(err, Diagnostic::into_error))
        }
    }
}
