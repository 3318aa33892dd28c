//! Translation context threaded through every builder.
//!
//! The context owns the per-statement [`PlanArena`], the scope stack, the
//! forward-reference map used to bind aggregate and hierarchical
//! pseudo-column call sites to their value holders, the shared-subquery cache
//! and the diagnostics list. Scopes are only pushed through
//! [`TranslationContext::push_scope`], whose [`ScopeGuard`] pops on every exit
//! path.

use std::ops::{Deref, DerefMut};

use rustc_hash::{FxHashMap, FxHashSet};
use xasl_expr::{Expr, NameRef};
use xasl_plan::{AttrRef, PlanArena, ReguVar, ValueList, ValueListId, XaslId, XaslNode};
use xasl_result::{Diagnostic, Error, Result};
use xasl_types::{Domain, NodeId, SpecId};

use crate::catalog::Catalog;
use crate::connect_by::PriorMap;
use crate::optimizer::PlanOptimizer;
use crate::options::CompilerOptions;
use crate::scope::Scope;

/// Name-resolution state that belongs to the block being compiled and must
/// not leak into nested blocks.
#[derive(Debug, Default)]
pub(crate) struct BlockState {
    /// Names of this spec compile to attribute references (its access spec
    /// is being built).
    pub current_class: Option<SpecId>,
    /// Added to slot positions resolved in the innermost scope.
    pub slot_offset: usize,
    pub prior: Option<PriorMap>,
    /// ORDERBY_NUM() compiles as INST_NUM() (sort elided).
    pub ordbynum_as_instnum: bool,
}

pub struct TranslationContext<'c> {
    pub(crate) catalog: &'c dyn Catalog,
    pub(crate) optimizer: &'c dyn PlanOptimizer,
    pub(crate) options: CompilerOptions,
    pub(crate) arena: PlanArena,
    pub(crate) block: BlockState,
    scopes: Vec<Scope>,
    forward: FxHashMap<NodeId, ReguVar>,
    forward_log: Vec<NodeId>,
    subqueries: FxHashMap<NodeId, XaslId>,
    /// Subquery plans some reference reads as a whole list.
    list_linked: FxHashSet<XaslId>,
    expected: FxHashMap<NodeId, Domain>,
    diagnostics: Vec<Diagnostic>,
    next_synthetic: u32,
}

impl<'c> TranslationContext<'c> {
    pub fn new(
        catalog: &'c dyn Catalog,
        optimizer: &'c dyn PlanOptimizer,
        options: CompilerOptions,
    ) -> Self {
        Self {
            catalog,
            optimizer,
            arena: PlanArena::with_budget(options.max_plan_nodes),
            options,
            block: BlockState::default(),
            scopes: Vec::new(),
            forward: FxHashMap::default(),
            forward_log: Vec::new(),
            subqueries: FxHashMap::default(),
            list_linked: FxHashSet::default(),
            expected: FxHashMap::default(),
            diagnostics: Vec::new(),
            next_synthetic: u32::MAX,
        }
    }

    #[inline]
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    #[inline]
    pub fn arena(&self) -> &PlanArena {
        &self.arena
    }

    /// Consume the context, keeping only the arena.
    pub fn into_arena(self) -> PlanArena {
        self.arena
    }

    /// Number of scopes currently pushed.
    #[inline]
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    // ----- scopes -----

    /// Push a scope for `block`. The scope is popped, and the enclosing
    /// block's resolution state restored, when the guard is dropped.
    pub fn push_scope(&mut self, block: NodeId) -> ScopeGuard<'_, 'c> {
        let depth = self.scopes.len();
        let forward_mark = self.forward_log.len();
        let saved = std::mem::take(&mut self.block);
        self.scopes.push(Scope::new(block));
        tracing::trace!(%block, depth = depth + 1, "push scope");
        ScopeGuard {
            ctx: self,
            depth,
            forward_mark,
            saved: Some(saved),
        }
    }

    pub(crate) fn scope(&self) -> Result<&Scope> {
        self.scopes
            .last()
            .ok_or_else(|| Error::Internal("no active translation scope".into()))
    }

    pub(crate) fn scope_mut(&mut self) -> Result<&mut Scope> {
        self.scopes
            .last_mut()
            .ok_or_else(|| Error::Internal("no active translation scope".into()))
    }

    /// Resolve a bound name to a regu variable.
    ///
    /// Order: attribute of the spec whose access spec is being built, slot
    /// of a table in the innermost scope (shifted by the block's slot
    /// offset), slot of a table in an outer scope. An outer hit marks the
    /// innermost block as correlated at that distance and, when the outer
    /// block is grouped, reads the name's post-group slot.
    pub(crate) fn resolve_name(&mut self, expr: &Expr, name: &NameRef) -> Result<ReguVar> {
        let top = self
            .scopes
            .len()
            .checked_sub(1)
            .ok_or_else(|| Error::Internal("name resolved outside any scope".into()))?;

        if self.block.current_class == Some(name.spec)
            && let Some(table) = self.scopes[top].table(name.spec)
            && let Some(attr) = table.attr(&name.name)
            && let Some(attr_id) = attr.attr_id
        {
            return Ok(ReguVar::Attribute(AttrRef {
                spec: name.spec,
                attr: attr_id,
                kind: attr.kind,
                domain: self.refine_domain(expr, &attr.domain),
            }));
        }

        for depth in (0..=top).rev() {
            let Some(table) = self.scopes[depth].table(name.spec) else {
                continue;
            };
            let pos = table.position(&name.name).ok_or_else(|| {
                Error::Internal(format!(
                    "attribute '{}' of s{} was not registered with its scope",
                    name.name,
                    name.spec.raw()
                ))
            })?;
            let list = table.value_list;
            let domain = self.refine_domain(expr, &table.attrs[pos].domain);
            let index = if depth == top {
                pos + self.block.slot_offset
            } else {
                let level = u32::try_from(top - depth).unwrap_or(u32::MAX);
                self.scopes[top].note_reference(level);
                if let Some(slot) = self.scopes[depth]
                    .group
                    .as_ref()
                    .and_then(|group| group.lookup_name(name))
                {
                    return Ok(slot);
                }
                pos
            };
            return Ok(ReguVar::slot(list, index, domain));
        }

        Err(Error::Internal(format!(
            "name s{}.{} is not bound in any enclosing scope",
            name.spec.raw(),
            name.name
        )))
    }

    /// `declared` unless it is unknown, then the expression's static type,
    /// then any expected domain recorded for it.
    pub(crate) fn refine_domain(&self, expr: &Expr, declared: &Domain) -> Domain {
        if !declared.is_variable() {
            return declared.clone();
        }
        expr.static_domain()
            .or_else(|| self.expected.get(&expr.id))
            .cloned()
            .unwrap_or(Domain::Variable)
    }

    // ----- forward references -----

    /// Bind `node`'s call site to `value` until the current scope is popped.
    pub(crate) fn bind_forward(&mut self, node: NodeId, value: ReguVar) {
        self.forward.insert(node, value);
        self.forward_log.push(node);
    }

    pub(crate) fn forward(&self, node: NodeId) -> Option<&ReguVar> {
        self.forward.get(&node)
    }

    pub(crate) fn clear_forward(&mut self, node: NodeId) {
        self.forward.remove(&node);
    }

    // ----- expected domains -----

    pub(crate) fn expect_domain(&mut self, node: NodeId, domain: Domain) {
        if !domain.is_variable() && domain != Domain::Null {
            self.expected.entry(node).or_insert(domain);
        }
    }

    pub(crate) fn expected_domain(&self, node: NodeId) -> Option<&Domain> {
        self.expected.get(&node)
    }

    // ----- shared subqueries -----

    pub(crate) fn cached_subquery(&self, query: NodeId) -> Option<XaslId> {
        self.subqueries.get(&query).copied()
    }

    pub(crate) fn cache_subquery(&mut self, query: NodeId, xasl: XaslId) {
        self.subqueries.insert(query, xasl);
    }

    /// Record that `xasl`'s result is consumed as a list. A plan shared by
    /// a list reference and a scalar reference must keep every row.
    pub(crate) fn mark_list_linked(&mut self, xasl: XaslId) {
        self.list_linked.insert(xasl);
    }

    pub(crate) fn is_list_linked(&self, xasl: XaslId) -> bool {
        self.list_linked.contains(&xasl)
    }

    // ----- arena -----

    #[inline]
    pub(crate) fn alloc_node(&mut self, node: XaslNode) -> Result<XaslId> {
        self.arena.alloc_node(node)
    }

    #[inline]
    pub(crate) fn alloc_value_list(&mut self, list: ValueList) -> Result<ValueListId> {
        self.arena.alloc_value_list(list)
    }

    /// Parse-tree id for expressions the compiler builds itself. Counts down
    /// from the top of the id space, away from binder-assigned ids.
    pub(crate) fn synthetic_node(&mut self) -> NodeId {
        let id = NodeId::new(self.next_synthetic);
        self.next_synthetic = self.next_synthetic.saturating_sub(1);
        id
    }

    // ----- diagnostics -----

    /// Record a recoverable degradation.
    pub(crate) fn warn(&mut self, node: Option<NodeId>, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(node = ?node, "{message}");
        self.diagnostics.push(Diagnostic::warning(node, message));
    }

    /// Record `err` as a diagnostic and hand it back for propagation.
    pub(crate) fn record_error(&mut self, err: Error) -> Error {
        self.diagnostics.push(Diagnostic::from_error(err.clone()));
        err
    }

    pub(crate) fn first_error(&self) -> Option<&Diagnostic> {
        self.diagnostics.iter().find(|d| d.is_error())
    }
}

/// Pops the scope pushed by [`TranslationContext::push_scope`] when dropped.
pub struct ScopeGuard<'g, 'c> {
    ctx: &'g mut TranslationContext<'c>,
    depth: usize,
    forward_mark: usize,
    saved: Option<BlockState>,
}

impl ScopeGuard<'_, '_> {
    /// Pop the scope now and return it.
    pub fn finish(mut self) -> Result<Scope> {
        if self.ctx.scopes.len() != self.depth + 1 {
            return Err(Error::Internal(format!(
                "scope stack at depth {} while closing scope pushed at {}",
                self.ctx.scopes.len(),
                self.depth + 1
            )));
        }
        self.ctx
            .scopes
            .pop()
            .ok_or_else(|| Error::Internal("scope stack underflow".into()))
    }
}

impl<'c> Deref for ScopeGuard<'_, 'c> {
    type Target = TranslationContext<'c>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for ScopeGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for ScopeGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.scopes.truncate(self.depth);
        for node in self.ctx.forward_log.drain(self.forward_mark..) {
            self.ctx.forward.remove(&node);
        }
        if let Some(saved) = self.saved.take() {
            self.ctx.block = saved;
        }
        tracing::trace!(depth = self.depth, "pop scope");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AttributeInfo;
    use crate::optimizer::NoOptimizer;
    use crate::scope::{TableAttr, TableInfo, TableSource};
    use xasl_expr::{AstBuilder, ExprKind};
    use xasl_plan::AttrKind;
    use xasl_types::{AttrId, ClassId, HeapId, IndexId};

    struct EmptyCatalog;

    impl Catalog for EmptyCatalog {
        fn attribute_info(&self, class: ClassId, name: &str) -> Result<AttributeInfo> {
            Err(Error::AttributeNotFound {
                class,
                name: name.into(),
            })
        }
        fn class_heap(&self, class: ClassId) -> Result<HeapId> {
            Ok(HeapId::new(u64::from(class.raw())))
        }
        fn class_index(&self, _: ClassId, _: &[AttrId]) -> Option<IndexId> {
            None
        }
        fn attributes(&self, _: ClassId) -> Result<Vec<(String, AttributeInfo)>> {
            Ok(Vec::new())
        }
    }

    fn register(ctx: &mut TranslationContext<'_>, spec: SpecId) -> ValueListId {
        let list = ctx
            .alloc_value_list(ValueList::with_domains([Domain::Integer]))
            .unwrap();
        ctx.scope_mut().unwrap().tables.push(TableInfo {
            spec,
            source: TableSource::Class(ClassId::new(1)),
            value_list: list,
            attrs: vec![TableAttr {
                name: "a".into(),
                attr_id: Some(AttrId::new(4)),
                domain: Domain::Integer,
                kind: AttrKind::Instance,
                column: None,
            }],
        });
        list
    }

    #[test]
    fn guard_pops_on_early_return() {
        fn fails(ctx: &mut TranslationContext<'_>) -> Result<()> {
            let mut guard = ctx.push_scope(NodeId::new(1));
            let _inner = guard.push_scope(NodeId::new(2));
            Err(Error::Internal("boom".into()))
        }

        let catalog = EmptyCatalog;
        let mut ctx = TranslationContext::new(&catalog, &NoOptimizer, CompilerOptions::default());
        assert!(fails(&mut ctx).is_err());
        assert_eq!(ctx.scope_depth(), 0);
    }

    #[test]
    fn outer_names_mark_correlation() {
        let catalog = EmptyCatalog;
        let mut ctx = TranslationContext::new(&catalog, &NoOptimizer, CompilerOptions::default());
        let mut b = AstBuilder::new();
        let spec = b.spec_id();
        let name = b.name(spec, "A", Domain::Integer);
        let ExprKind::Name(name_ref) = &name.kind else {
            unreachable!()
        };

        let mut outer = ctx.push_scope(NodeId::new(1));
        let list = register(&mut outer, spec);
        let mut inner = outer.push_scope(NodeId::new(2));
        let regu = inner.resolve_name(&name, name_ref).unwrap();
        assert_eq!(regu, ReguVar::slot(list, 0, Domain::Integer));
        let scope = inner.finish().unwrap();
        assert_eq!(scope.correlation_level, 1);
        assert_eq!(outer.scope().unwrap().correlation_level, 0);
    }

    #[test]
    fn current_class_names_become_attributes() {
        let catalog = EmptyCatalog;
        let mut ctx = TranslationContext::new(&catalog, &NoOptimizer, CompilerOptions::default());
        let mut b = AstBuilder::new();
        let spec = b.spec_id();
        let name = b.name(spec, "a", Domain::Integer);
        let ExprKind::Name(name_ref) = &name.kind else {
            unreachable!()
        };

        let mut guard = ctx.push_scope(NodeId::new(1));
        register(&mut guard, spec);
        guard.block.current_class = Some(spec);
        let regu = guard.resolve_name(&name, name_ref).unwrap();
        assert!(matches!(regu, ReguVar::Attribute(AttrRef { attr, .. }) if attr == AttrId::new(4)));

        // Nested blocks start with clean resolution state.
        let inner = guard.push_scope(NodeId::new(2));
        assert_eq!(inner.block.current_class, None);
        drop(inner);
        assert_eq!(guard.block.current_class, Some(spec));
    }

    #[test]
    fn forward_bindings_end_with_their_scope() {
        let catalog = EmptyCatalog;
        let mut ctx = TranslationContext::new(&catalog, &NoOptimizer, CompilerOptions::default());
        {
            let mut guard = ctx.push_scope(NodeId::new(1));
            guard.bind_forward(NodeId::new(9), ReguVar::Constant(xasl_types::DbValue::Null));
            assert!(guard.forward(NodeId::new(9)).is_some());
        }
        assert!(ctx.forward(NodeId::new(9)).is_none());
    }
}
