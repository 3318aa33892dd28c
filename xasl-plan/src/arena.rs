//! Per-statement arena holding every plan node and value list.
//!
//! Nodes refer to each other through [`XaslId`] and to value lists through
//! [`ValueListId`]; nothing in the plan graph holds a pointer. A finished
//! [`XaslPlan`] is the arena plus its root handle and can be moved freely.

use std::fmt;

use xasl_result::{Error, Result};
use xasl_types::Domain;

use crate::node::XaslNode;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// Handle of a plan node inside a [`PlanArena`].
    XaslId,
    "x"
);
define_handle!(
    /// Handle of a value list inside a [`PlanArena`].
    ValueListId,
    "v"
);
define_handle!(
    /// Opaque attribute-cache handle owned by the execution engine.
    AttrCacheId,
    "c"
);

/// One runtime value slot of a value list.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueSlot {
    pub domain: Domain,
    pub label: Option<String>,
}

/// Ordered sequence of value slots defining a tuple shape.
///
/// Positions are stable once assigned: slots are only ever appended.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueList {
    slots: Vec<ValueSlot>,
}

impl ValueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domains(domains: impl IntoIterator<Item = Domain>) -> Self {
        Self {
            slots: domains
                .into_iter()
                .map(|domain| ValueSlot {
                    domain,
                    label: None,
                })
                .collect(),
        }
    }

    /// Append a slot and return its position.
    pub fn push(&mut self, domain: Domain, label: Option<String>) -> usize {
        self.slots.push(ValueSlot { domain, label });
        self.slots.len() - 1
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&ValueSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[ValueSlot] {
        &self.slots
    }

    /// Refine a slot's domain in place. Used when a `Variable` slot is
    /// narrowed after its producer has been compiled.
    pub fn set_domain(&mut self, index: usize, domain: Domain) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| Error::Internal(format!("value slot {index} out of range")))?;
        slot.domain = domain;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanArena {
    nodes: Vec<XaslNode>,
    value_lists: Vec<ValueList>,
    next_cache: u32,
    max_nodes: usize,
}

impl Default for PlanArena {
    fn default() -> Self {
        Self::with_budget(usize::MAX)
    }
}

impl PlanArena {
    /// Create an arena that refuses to hold more than `max_nodes` plan nodes.
    pub fn with_budget(max_nodes: usize) -> Self {
        Self {
            nodes: Vec::new(),
            value_lists: Vec::new(),
            next_cache: 0,
            max_nodes,
        }
    }

    pub fn alloc_node(&mut self, node: XaslNode) -> Result<XaslId> {
        if self.nodes.len() >= self.max_nodes {
            return Err(Error::Resource(format!(
                "plan node budget of {} exceeded",
                self.max_nodes
            )));
        }
        self.nodes
            .try_reserve(1)
            .map_err(|e| Error::Resource(format!("plan node allocation failed: {e}")))?;
        let id = handle(self.nodes.len(), XaslId)?;
        self.nodes.push(node);
        Ok(id)
    }

    pub fn alloc_value_list(&mut self, list: ValueList) -> Result<ValueListId> {
        self.value_lists
            .try_reserve(1)
            .map_err(|e| Error::Resource(format!("value list allocation failed: {e}")))?;
        let id = handle(self.value_lists.len(), ValueListId)?;
        self.value_lists.push(list);
        Ok(id)
    }

    pub fn alloc_cache(&mut self) -> AttrCacheId {
        let id = AttrCacheId(self.next_cache);
        self.next_cache = self.next_cache.wrapping_add(1);
        id
    }

    pub fn node(&self, id: XaslId) -> Result<&XaslNode> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| Error::Internal(format!("dangling plan handle {id}")))
    }

    pub fn node_mut(&mut self, id: XaslId) -> Result<&mut XaslNode> {
        self.nodes
            .get_mut(id.index())
            .ok_or_else(|| Error::Internal(format!("dangling plan handle {id}")))
    }

    pub fn value_list(&self, id: ValueListId) -> Result<&ValueList> {
        self.value_lists
            .get(id.index())
            .ok_or_else(|| Error::Internal(format!("dangling value list handle {id}")))
    }

    pub fn value_list_mut(&mut self, id: ValueListId) -> Result<&mut ValueList> {
        self.value_lists
            .get_mut(id.index())
            .ok_or_else(|| Error::Internal(format!("dangling value list handle {id}")))
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn value_list_count(&self) -> usize {
        self.value_lists.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (XaslId, &XaslNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (XaslId(i as u32), node))
    }
}

fn handle<T>(index: usize, make: fn(u32) -> T) -> Result<T> {
    u32::try_from(index)
        .map(make)
        .map_err(|_| Error::Resource("arena handle space exhausted".into()))
}

/// A compiled plan: the arena that owns every node and the root handle.
#[derive(Debug, Clone, PartialEq)]
pub struct XaslPlan {
    pub arena: PlanArena,
    pub root: XaslId,
}

impl XaslPlan {
    pub fn root_node(&self) -> Result<&XaslNode> {
        self.arena.node(self.root)
    }

    pub fn node(&self, id: XaslId) -> Result<&XaslNode> {
        self.arena.node(id)
    }
}
