/// Component model: the contract shared by statistics and reducers.
///
/// ```text
///   ComponentClass (registry)      Instance<T>
///   ┌──────────────────────┐       ┌─────────────────────────────┐
///   │ name, kind, schema    │ ───▶ │ id, module, class, scheme,  │
///   │ factory(&Params)      │      │ params, Box<dyn Statistic>   │
///   └──────────────────────┘       │       or Box<dyn Reducer>    │
///                                  └─────────────────────────────┘
/// ```
pub mod params;
pub mod reducer;
pub mod statistic;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub use params::{ParamSchema, ParamValue, Params};
pub use reducer::{Reducer, Reduction};
pub use statistic::{
    ComparisonAxis, Contract, PairwiseMeasure, PairwiseStatistic, Statistic, StatisticOutput,
};

// ---------------------------------------------------------------------------
// Archetype – the three partitions of a configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Archetype {
    Statistic,
    Reducer,
    ReducedStatistic,
}

impl Archetype {
    pub const ALL: [Archetype; 3] = [
        Archetype::Statistic,
        Archetype::Reducer,
        Archetype::ReducedStatistic,
    ];

    /// Top-level configuration key holding this archetype's definitions.
    pub fn section(&self) -> &'static str {
        match self {
            Archetype::Statistic => "Statistics",
            Archetype::Reducer => "Reducers",
            Archetype::ReducedStatistic => "ReducedStatistics",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Archetype::Statistic => write!(f, "Statistic"),
            Archetype::Reducer => write!(f, "Reducer"),
            Archetype::ReducedStatistic => write!(f, "ReducedStatistic"),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque, process-unique handle of a component instance. Cache keys use it
/// instead of the instance's address or contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ComponentId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Human-facing description every component exposes before computing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    pub name: String,
    pub identifier: String,
    pub labels: Vec<String>,
}

impl ComponentInfo {
    pub fn new(name: &str, identifier: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            identifier: identifier.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Append `suffix` to the identifier, e.g. `cov` → `cov.sq`.
    pub fn suffixed(mut self, suffix: &str) -> Self {
        self.identifier.push_str(suffix);
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.labels.push(label.to_string());
        self
    }
}

pub trait Component: Send + Sync {
    fn info(&self) -> &ComponentInfo;

    fn name(&self) -> &str {
        &self.info().name
    }

    fn identifier(&self) -> &str {
        &self.info().identifier
    }

    fn labels(&self) -> &[String] {
        &self.info().labels
    }
}

// ---------------------------------------------------------------------------
// Instance – a configured component
// ---------------------------------------------------------------------------

/// A component together with where it came from and how it was parameterised.
pub struct Instance<T: ?Sized> {
    id: ComponentId,
    module: String,
    class_name: String,
    scheme: Option<String>,
    params: Params,
    inner: Box<T>,
}

pub type StatisticInstance = Instance<dyn Statistic>;
pub type ReducerInstance = Instance<dyn Reducer>;

impl<T: Component + ?Sized> Instance<T> {
    pub fn new(module: &str, class_name: &str, params: Params, inner: Box<T>) -> Self {
        Self {
            id: ComponentId::next(),
            module: module.to_string(),
            class_name: class_name.to_string(),
            scheme: None,
            params,
            inner,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// `None` until the instance is registered into a scheme.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub(crate) fn set_scheme(&mut self, scheme: &str) {
        self.scheme = Some(scheme.to_string());
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn component(&self) -> &T {
        &self.inner
    }

    /// `module.class.scheme`, available once a scheme has been assigned.
    pub fn qualified_name(&self) -> Option<String> {
        self.scheme
            .as_deref()
            .map(|scheme| qualified_name(&self.module, &self.class_name, scheme))
    }
}

impl<T: Component + ?Sized> fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("module", &self.module)
            .field("class", &self.class_name)
            .field("scheme", &self.scheme)
            .field("name", &self.inner.name())
            .field("params", &self.params)
            .finish()
    }
}

impl<T: Component + ?Sized> fmt::Display for Instance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}.{}", self.module, self.class_name)?;
        writeln!(f, "Name: {}", self.inner.name())?;
        write!(f, "Active Parameters: {{")?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        writeln!(f, "}}")?;
        write!(f, "Scheme: {}", self.scheme.as_deref().unwrap_or("None"))
    }
}

/// Fully-qualified instance name: `module_reference.class_name.scheme_name`.
pub fn qualified_name(module: &str, class_name: &str, scheme: &str) -> String {
    format!("{module}.{class_name}.{scheme}")
}
