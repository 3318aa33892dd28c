//! Identifier newtypes.
//!
//! Catalog identifiers ([`ClassId`], [`AttrId`], [`HeapId`], [`IndexId`]) are
//! handed out by the catalog collaborator. Parse-tree identifiers ([`NodeId`],
//! [`SpecId`]) are handed out by the binder and are unique within a statement.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($inner);

        impl $name {
            #[inline]
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A class (table) in the catalog.
    ClassId(u32),
    "class"
);

define_id!(
    /// An attribute (column) of a class, unique within its class.
    AttrId(u32),
    "attr"
);

define_id!(
    /// The heap file holding a class's instances.
    HeapId(u64),
    "heap"
);

define_id!(
    /// A B-tree index on a class.
    IndexId(u32),
    "index"
);

define_id!(
    /// Identity of one parse-tree node.
    ///
    /// Two nodes carrying the same id are the same logical node; the compiler
    /// relies on this to share the plan of a subquery referenced from several
    /// expression sites.
    NodeId(u32),
    "node"
);

define_id!(
    /// Identity of one FROM-clause entry (or path entity) of a statement.
    SpecId(u32),
    "spec"
);
