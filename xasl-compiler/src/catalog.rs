//! Catalog collaborator interface.

use xasl_plan::AttrKind;
use xasl_result::{Error, Result};
use xasl_types::{AttrId, ClassId, Domain, HeapId, IndexId};

/// What the catalog knows about one attribute of a class.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeInfo {
    pub attr_id: AttrId,
    pub domain: Domain,
    pub kind: AttrKind,
    pub not_null: bool,
    pub has_default: bool,
}

impl AttributeInfo {
    #[inline]
    pub fn new(attr_id: AttrId, domain: Domain) -> Self {
        Self {
            attr_id,
            domain,
            kind: AttrKind::Instance,
            not_null: false,
            has_default: false,
        }
    }

    #[inline]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    #[inline]
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    #[inline]
    pub fn with_kind(mut self, kind: AttrKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Synchronous schema lookups used while compiling.
///
/// Implementations report a missing attribute with
/// [`Error::AttributeNotFound`] and any other failure with [`Error::Catalog`].
pub trait Catalog {
    fn attribute_info(&self, class: ClassId, name: &str) -> Result<AttributeInfo>;

    fn class_heap(&self, class: ClassId) -> Result<HeapId>;

    /// An index whose leading key columns are exactly `columns`. An empty
    /// slice asks for any index on the class.
    fn class_index(&self, class: ClassId, columns: &[AttrId]) -> Option<IndexId>;

    /// Every attribute of the class in declaration order, with its name.
    fn attributes(&self, class: ClassId) -> Result<Vec<(String, AttributeInfo)>>;

    /// Partition classes of a partitioned class; empty for plain classes.
    fn partitions(&self, _class: ClassId) -> Result<Vec<ClassId>> {
        Ok(Vec::new())
    }

    /// Attributes declared NOT NULL, in declaration order.
    fn not_null_attributes(&self, class: ClassId) -> Result<Vec<(String, AttributeInfo)>> {
        Ok(self
            .attributes(class)?
            .into_iter()
            .filter(|(_, info)| info.not_null)
            .collect())
    }
}

/// Resolve `name`, mapping a catalog miss onto the class it was looked up in.
pub(crate) fn require_attribute(
    catalog: &dyn Catalog,
    class: ClassId,
    name: &str,
) -> Result<AttributeInfo> {
    catalog.attribute_info(class, name).map_err(|err| match err {
        Error::AttributeNotFound { .. } => Error::AttributeNotFound {
            class,
            name: name.to_string(),
        },
        other => other,
    })
}
