#![allow(dead_code)]

use std::cell::RefCell;

use rustc_hash::FxHashMap;
use xasl_compiler::{
    AccessPlan, AttributeInfo, Catalog, CompiledStatement, CompilerOptions, NoOptimizer,
    OptimizerRequest, PlanOptimizer, compile_statement,
};
use xasl_expr::{Query, SelectBlock, Statement};
use xasl_plan::{AccessSpec, XaslNode, XaslPlan};
use xasl_result::{Error, Result};
use xasl_types::{AttrId, ClassId, Domain, HeapId, IndexId};

use xasl_test_utils::init_tracing_for_tests;

pub const T: ClassId = ClassId::new(1);
pub const U: ClassId = ClassId::new(2);
pub const EMP: ClassId = ClassId::new(3);
pub const PARTS: ClassId = ClassId::new(4);
pub const PARTS_P0: ClassId = ClassId::new(40);
pub const PARTS_P1: ClassId = ClassId::new(41);

pub const T_PK_INDEX: IndexId = IndexId::new(10);
pub const T_K_INDEX: IndexId = IndexId::new(11);
pub const U_XY_INDEX: IndexId = IndexId::new(20);

#[derive(Debug, Default)]
struct ClassDef {
    attrs: Vec<(String, AttributeInfo)>,
    indexes: Vec<(Vec<AttrId>, IndexId)>,
    partitions: Vec<ClassId>,
}

/// Catalog backed by hash maps. Attribute ids are `class * 100 + ordinal`,
/// heaps are `class * 1000`.
#[derive(Debug, Default)]
pub struct MemCatalog {
    classes: FxHashMap<ClassId, ClassDef>,
}

impl MemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: ClassId, attrs: &[(&str, Domain)]) -> Self {
        let def = self.classes.entry(class).or_default();
        for (i, (name, domain)) in attrs.iter().enumerate() {
            let id = AttrId::new(class.raw() * 100 + i as u32 + 1);
            def.attrs
                .push((name.to_string(), AttributeInfo::new(id, domain.clone())));
        }
        self
    }

    pub fn not_null(mut self, class: ClassId, name: &str, has_default: bool) -> Self {
        if let Some(def) = self.classes.get_mut(&class)
            && let Some((_, info)) = def.attrs.iter_mut().find(|(n, _)| n == name)
        {
            info.not_null = true;
            info.has_default = has_default;
        }
        self
    }

    pub fn index(mut self, class: ClassId, columns: &[&str], index: IndexId) -> Self {
        let ids = columns.iter().map(|c| attr_id(class, self.ordinal(class, c))).collect();
        self.classes.entry(class).or_default().indexes.push((ids, index));
        self
    }

    pub fn partitioned(mut self, class: ClassId, partitions: &[ClassId]) -> Self {
        self.classes.entry(class).or_default().partitions = partitions.to_vec();
        self
    }

    fn ordinal(&self, class: ClassId, name: &str) -> usize {
        self.classes[&class]
            .attrs
            .iter()
            .position(|(n, _)| n == name)
            .expect("unknown fixture column")
    }
}

pub fn attr_id(class: ClassId, ordinal: usize) -> AttrId {
    AttrId::new(class.raw() * 100 + ordinal as u32 + 1)
}

pub fn heap(class: ClassId) -> HeapId {
    HeapId::new(u64::from(class.raw()) * 1000)
}

impl Catalog for MemCatalog {
    fn attribute_info(&self, class: ClassId, name: &str) -> Result<AttributeInfo> {
        let def = self
            .classes
            .get(&class)
            .ok_or_else(|| Error::Catalog(format!("unknown class {class}")))?;
        def.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, info)| info.clone())
            .ok_or(Error::AttributeNotFound {
                class,
                name: name.into(),
            })
    }

    fn class_heap(&self, class: ClassId) -> Result<HeapId> {
        Ok(heap(class))
    }

    fn class_index(&self, class: ClassId, columns: &[AttrId]) -> Option<IndexId> {
        self.classes.get(&class)?.indexes.iter().find_map(|(keys, index)| {
            keys.starts_with(columns).then_some(*index)
        })
    }

    fn attributes(&self, class: ClassId) -> Result<Vec<(String, AttributeInfo)>> {
        Ok(self
            .classes
            .get(&class)
            .map(|def| def.attrs.clone())
            .unwrap_or_default())
    }

    fn partitions(&self, class: ClassId) -> Result<Vec<ClassId>> {
        Ok(self
            .classes
            .get(&class)
            .map(|def| def.partitions.clone())
            .unwrap_or_default())
    }
}

/// The catalog most tests run against.
///
/// - `t(pk INTEGER, k INTEGER, a INTEGER, b VARCHAR)`, indexes on `pk` and `k`
/// - `u(x INTEGER, y BIGINT, z INTEGER)`, composite index on `(x, y)`
/// - `emp(id INTEGER NOT NULL, mgr INTEGER, name VARCHAR NOT NULL DEFAULT)`
/// - `parts(id INTEGER, qty INTEGER)` with two partitions
pub fn fixture_catalog() -> MemCatalog {
    init_tracing_for_tests();
    MemCatalog::new()
        .class(
            T,
            &[
                ("pk", Domain::Integer),
                ("k", Domain::Integer),
                ("a", Domain::Integer),
                ("b", Domain::Varchar),
            ],
        )
        .index(T, &["pk"], T_PK_INDEX)
        .index(T, &["k"], T_K_INDEX)
        .class(
            U,
            &[
                ("x", Domain::Integer),
                ("y", Domain::BigInt),
                ("z", Domain::Integer),
            ],
        )
        .index(U, &["x", "y"], U_XY_INDEX)
        .class(
            EMP,
            &[
                ("id", Domain::Integer),
                ("mgr", Domain::Integer),
                ("name", Domain::Varchar),
            ],
        )
        .not_null(EMP, "id", false)
        .not_null(EMP, "name", true)
        .class(PARTS, &[("id", Domain::Integer), ("qty", Domain::Integer)])
        .partitioned(PARTS, &[PARTS_P0, PARTS_P1])
}

type Script = Box<dyn Fn(&OptimizerRequest<'_>) -> Option<AccessPlan>>;

/// Optimizer answering from a closure and recording the hint count of every
/// request it sees.
pub struct ScriptedOptimizer {
    script: Script,
    requests: RefCell<Vec<usize>>,
}

impl ScriptedOptimizer {
    pub fn new(script: impl Fn(&OptimizerRequest<'_>) -> Option<AccessPlan> + 'static) -> Self {
        Self {
            script: Box::new(script),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Always answer with `plan`.
    pub fn fixed(plan: AccessPlan) -> Self {
        Self::new(move |_| Some(plan.clone()))
    }

    /// Hint counts of the requests received so far, in call order.
    pub fn requests(&self) -> Vec<usize> {
        self.requests.borrow().clone()
    }
}

impl PlanOptimizer for ScriptedOptimizer {
    fn propose_plan(&self, request: &OptimizerRequest<'_>) -> Option<AccessPlan> {
        self.requests.borrow_mut().push(request.hints.len());
        (self.script)(request)
    }
}

pub fn select_stmt(block: SelectBlock) -> Statement {
    Statement::Query(Query::Select(Box::new(block)))
}

pub fn compile(catalog: &dyn Catalog, statement: &Statement) -> Result<CompiledStatement> {
    compile_statement(catalog, &NoOptimizer, CompilerOptions::default(), statement)
}

pub fn compile_with(
    catalog: &dyn Catalog,
    optimizer: &dyn PlanOptimizer,
    statement: &Statement,
) -> Result<CompiledStatement> {
    compile_statement(catalog, optimizer, CompilerOptions::default(), statement)
}

pub fn root(plan: &XaslPlan) -> &XaslNode {
    plan.root_node().expect("root node")
}

pub fn first_spec(plan: &XaslPlan) -> &AccessSpec {
    root(plan).spec_list.first().expect("root has a scan")
}
