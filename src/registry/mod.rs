/// Component registry: class descriptors grouped into namespaces, and the
/// resolver that finds them from textual module references.
///
/// ```text
///   "rusty_spoc.statistics.basic" ─┐
///   "my_registered_namespace"     ─┼─▶ Resolver ──▶ Namespace ──▶ ComponentClass
///   "./modules/custom.yaml"       ─┘   (cached)      (classes)     (schema, factory)
/// ```
pub mod manifest;
pub mod namespace;
pub mod resolver;

use std::fmt;
use std::sync::Arc;

use crate::component::{Archetype, ParamSchema, ParamValue, Params, Reducer, Statistic};
use crate::error::{ConfigError, ConfigResult};

pub use namespace::{ModuleOrigin, Namespace};
pub use resolver::{Resolution, Resolver, SkipReason};

// ---------------------------------------------------------------------------
// ClassKind – what a class produces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Statistic,
    ReducedStatistic,
    Reducer,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassKind::Statistic => write!(f, "Statistic"),
            ClassKind::ReducedStatistic => write!(f, "ReducedStatistic"),
            ClassKind::Reducer => write!(f, "Reducer"),
        }
    }
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

pub type StatisticFactory = Arc<dyn Fn(&Params) -> ConfigResult<Box<dyn Statistic>> + Send + Sync>;
pub type ReducerFactory = Arc<dyn Fn(&Params) -> ConfigResult<Box<dyn Reducer>> + Send + Sync>;

#[derive(Clone)]
enum Factory {
    Statistic(StatisticFactory),
    Reducer(ReducerFactory),
}

// ---------------------------------------------------------------------------
// ComponentClass
// ---------------------------------------------------------------------------

/// Descriptor of an implementation that configurations can refer to by name.
///
/// A class without a factory is abstract: it can be found but never
/// instantiated.
#[derive(Clone)]
pub struct ComponentClass {
    name: String,
    kind: ClassKind,
    schema: ParamSchema,
    factory: Option<Factory>,
}

impl ComponentClass {
    pub fn statistic<F>(name: &str, schema: ParamSchema, factory: F) -> Self
    where
        F: Fn(&Params) -> ConfigResult<Box<dyn Statistic>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            kind: ClassKind::Statistic,
            schema,
            factory: Some(Factory::Statistic(Arc::new(factory))),
        }
    }

    pub fn reduced_statistic<F>(name: &str, schema: ParamSchema, factory: F) -> Self
    where
        F: Fn(&Params) -> ConfigResult<Box<dyn Statistic>> + Send + Sync + 'static,
    {
        Self {
            kind: ClassKind::ReducedStatistic,
            ..Self::statistic(name, schema, factory)
        }
    }

    pub fn reducer<F>(name: &str, schema: ParamSchema, factory: F) -> Self
    where
        F: Fn(&Params) -> ConfigResult<Box<dyn Reducer>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            kind: ClassKind::Reducer,
            schema,
            factory: Some(Factory::Reducer(Arc::new(factory))),
        }
    }

    pub fn abstract_class(name: &str, kind: ClassKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            schema: ParamSchema::new(),
            factory: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    pub fn is_abstract(&self) -> bool {
        self.factory.is_none()
    }

    /// Whether instances of this class may be placed in `archetype`'s section.
    /// Reduced statistics are statistics too.
    pub fn satisfies(&self, archetype: Archetype) -> bool {
        matches!(
            (archetype, self.kind),
            (Archetype::Statistic, ClassKind::Statistic)
                | (Archetype::Statistic, ClassKind::ReducedStatistic)
                | (Archetype::ReducedStatistic, ClassKind::ReducedStatistic)
                | (Archetype::Reducer, ClassKind::Reducer)
        )
    }

    /// A subclass sharing kind and factory, with some defaults replaced.
    /// Fails with the names the base does not declare.
    pub fn derive(
        &self,
        name: &str,
        defaults: &std::collections::BTreeMap<String, ParamValue>,
    ) -> Result<ComponentClass, Vec<String>> {
        Ok(Self {
            name: name.to_string(),
            kind: self.kind,
            schema: self.schema.with_defaults(defaults)?,
            factory: self.factory.clone(),
        })
    }

    pub fn instantiate_statistic(&self, params: &Params) -> ConfigResult<Box<dyn Statistic>> {
        match &self.factory {
            Some(Factory::Statistic(f)) => f(params),
            _ => Err(self.not_instantiable("statistic")),
        }
    }

    pub fn instantiate_reducer(&self, params: &Params) -> ConfigResult<Box<dyn Reducer>> {
        match &self.factory {
            Some(Factory::Reducer(f)) => f(params),
            _ => Err(self.not_instantiable("reducer")),
        }
    }

    fn not_instantiable(&self, wanted: &str) -> ConfigError {
        let what = if self.is_abstract() { "abstract" } else { "not a" };
        ConfigError::IncompatibleConfiguration(format!(
            "class {} ({}) is {what} {wanted}",
            self.name, self.kind
        ))
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("schema", &self.schema)
            .field("abstract", &self.is_abstract())
            .finish()
    }
}
