/// Knobs for one compiler instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Plan nodes one statement may allocate before compilation fails with a
    /// resource error.
    pub max_plan_nodes: usize,
    /// Attach the index fast-path hint to eligible COUNT/MIN/MAX aggregates.
    pub enable_index_aggregate: bool,
    /// Ask the optimizer a second time with hints stripped before falling
    /// back to the naive plan.
    pub retry_without_hints: bool,
    /// Run structural validation on every finished plan.
    pub validate_plans: bool,
    /// Log the explain rendering of every finished plan at debug level.
    pub debug_plan: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_plan_nodes: 4096,
            enable_index_aggregate: true,
            retry_without_hints: true,
            validate_plans: true,
            debug_plan: false,
        }
    }
}

impl CompilerOptions {
    /// Defaults overlaid with `XASL_*` environment switches.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay switches read through `lookup`. Split out so tests do not have
    /// to mutate the process environment.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("XASL_MAX_PLAN_NODES") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.max_plan_nodes = n,
                _ => tracing::warn!(value = %raw, "ignoring invalid XASL_MAX_PLAN_NODES"),
            }
        }
        if lookup("XASL_DISABLE_INDEX_AGGREGATE").is_some() {
            self.enable_index_aggregate = false;
        }
        if lookup("XASL_NO_HINT_RETRY").is_some() {
            self.retry_without_hints = false;
        }
        if lookup("XASL_DEBUG_PLAN").is_some() {
            self.debug_plan = true;
        }
        self
    }
}
