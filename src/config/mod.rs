/// Configuration layer: a validated [`Scheme`] of instantiated components.
///
/// ```text
///   YAML / JSON / serde_yaml::Value
///        │
///        ▼
///   ┌────────────────┐   resolve_module / resolve_class
///   │ SchemeBuilder   │ ─────────────────────────────▶ Resolver
///   └────────────────┘
///        │ merge params, instantiate, register, compile filters
///        ▼
///   ┌────────────────────────────────────────────────┐
///   │ Scheme                                          │
///   │   statistics          module.Class.scheme → inst│
///   │   reducers            module.Class.scheme → inst│
///   │   reduced_statistics  module.Class.scheme → inst│
///   │   filters             reducer → StatisticFilter │
///   └────────────────────────────────────────────────┘
///        │
///        ▼  to_yaml / to_json
/// ```
pub mod builder;
pub mod export;
pub mod filter;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use indexmap::map::Entry;
use indexmap::IndexMap;
use log::info;
use serde_yaml::Value;

use crate::component::{
    Archetype, Component, Instance, Reducer, ReducerInstance, Statistic, StatisticInstance,
};
use crate::error::{ConfigError, ConfigResult};
use crate::registry::resolver::TICK;
use crate::registry::Resolver;

pub use builder::SchemeBuilder;
pub use filter::{glob_to_regex, StatisticFilter};

// ---------------------------------------------------------------------------
// Partition – insertion-ordered, uniquely named instances
// ---------------------------------------------------------------------------

pub struct Partition<T: ?Sized> {
    archetype: Archetype,
    entries: IndexMap<String, Instance<T>>,
}

impl<T: Component + ?Sized> Partition<T> {
    fn new(archetype: Archetype) -> Self {
        Self {
            archetype,
            entries: IndexMap::new(),
        }
    }

    fn insert(&mut self, name: String, instance: Instance<T>) -> ConfigResult<()> {
        match self.entries.entry(name) {
            Entry::Occupied(entry) => Err(ConfigError::DuplicateComponent {
                archetype: self.archetype,
                name: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(instance);
                Ok(())
            }
        }
    }

    /// Removal keeps the remaining instances in insertion order.
    fn remove(&mut self, name: &str) -> Option<Instance<T>> {
        self.entries.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Instance<T>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// `(qualified name, instance)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Instance<T>)> {
        self.entries.iter().map(|(name, inst)| (name.as_str(), inst))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Scheme
// ---------------------------------------------------------------------------

/// The product of one configuration: which statistics and reducers run, and
/// which reducers are restricted to which statistics.
pub struct Scheme {
    name: String,
    statistics: Partition<dyn Statistic>,
    reducers: Partition<dyn Reducer>,
    reduced_statistics: Partition<dyn Statistic>,
    filters: HashMap<String, StatisticFilter>,
}

impl Scheme {
    /// An empty scheme, to be filled with the `add_*` methods.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            statistics: Partition::new(Archetype::Statistic),
            reducers: Partition::new(Archetype::Reducer),
            reduced_statistics: Partition::new(Archetype::ReducedStatistic),
            filters: HashMap::new(),
        }
    }

    /// Build from a parsed configuration mapping using the default resolver.
    pub fn from_value(name: &str, config: &Value) -> ConfigResult<Self> {
        SchemeBuilder::new(&mut Resolver::default()).build(name, config)
    }

    pub fn from_yaml_str(name: &str, yaml: &str) -> ConfigResult<Self> {
        info!("Registering YAML string.");
        SchemeBuilder::new(&mut Resolver::default()).build_str(name, yaml)
    }

    pub fn from_yaml_file(name: &str, path: impl AsRef<Path>) -> ConfigResult<Self> {
        info!("Registering YAML configuration file: {}.", path.as_ref().display());
        SchemeBuilder::new(&mut Resolver::default()).build_file(name, path.as_ref())
    }

    /// JSON is a subset of YAML and goes through the same parser.
    pub fn from_json_file(name: &str, path: impl AsRef<Path>) -> ConfigResult<Self> {
        info!("Registering JSON configuration file: {}.", path.as_ref().display());
        SchemeBuilder::new(&mut Resolver::default()).build_file(name, path.as_ref())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statistics(&self) -> &Partition<dyn Statistic> {
        &self.statistics
    }

    pub fn reducers(&self) -> &Partition<dyn Reducer> {
        &self.reducers
    }

    pub fn reduced_statistics(&self) -> &Partition<dyn Statistic> {
        &self.reduced_statistics
    }

    /// The statistic filter of a reducer, if it has one.
    pub fn reducer_filter(&self, reducer: &str) -> Option<&StatisticFilter> {
        self.filters.get(reducer)
    }

    // -- mutation -----------------------------------------------------------

    /// Register a statistic under `scheme_name`. Returns its qualified name.
    pub fn add_statistic(
        &mut self,
        mut statistic: StatisticInstance,
        scheme_name: &str,
    ) -> ConfigResult<String> {
        let name = register_name(&mut statistic, scheme_name);
        self.statistics.insert(name.clone(), statistic)?;
        self.refresh_filters();
        log_added(Archetype::Statistic, &name);
        Ok(name)
    }

    /// Register a reducer, optionally restricted to the statistics matching
    /// `patterns`.
    pub fn add_reducer(
        &mut self,
        mut reducer: ReducerInstance,
        scheme_name: &str,
        filter: Option<StatisticFilter>,
    ) -> ConfigResult<String> {
        let name = register_name(&mut reducer, scheme_name);
        self.reducers.insert(name.clone(), reducer)?;
        if let Some(mut filter) = filter {
            filter.resolve(self.statistics.names());
            self.filters.insert(name.clone(), filter);
        }
        log_added(Archetype::Reducer, &name);
        Ok(name)
    }

    pub fn add_reduced_statistic(
        &mut self,
        mut statistic: StatisticInstance,
        scheme_name: &str,
    ) -> ConfigResult<String> {
        let name = register_name(&mut statistic, scheme_name);
        self.reduced_statistics.insert(name.clone(), statistic)?;
        log_added(Archetype::ReducedStatistic, &name);
        Ok(name)
    }

    pub fn remove_statistic_by_name(
        &mut self,
        module: &str,
        class: &str,
        scheme: &str,
    ) -> Option<StatisticInstance> {
        let removed = self.statistics.remove(&qualified(module, class, scheme))?;
        self.refresh_filters();
        log_removed(Archetype::Statistic, &removed);
        Some(removed)
    }

    pub fn remove_reducer_by_name(
        &mut self,
        module: &str,
        class: &str,
        scheme: &str,
    ) -> Option<ReducerInstance> {
        let name = qualified(module, class, scheme);
        let removed = self.reducers.remove(&name)?;
        self.filters.remove(&name);
        log_removed(Archetype::Reducer, &removed);
        Some(removed)
    }

    pub fn remove_reduced_statistic_by_name(
        &mut self,
        module: &str,
        class: &str,
        scheme: &str,
    ) -> Option<StatisticInstance> {
        let removed = self.reduced_statistics.remove(&qualified(module, class, scheme))?;
        log_removed(Archetype::ReducedStatistic, &removed);
        Some(removed)
    }

    /// Re-match every reducer filter against the current statistics.
    fn refresh_filters(&mut self) {
        for filter in self.filters.values_mut() {
            filter.resolve(self.statistics.names());
        }
    }

    /// A usable scheme has a statistic with a reducer, or a reduced statistic.
    pub fn validate(&self) -> ConfigResult<()> {
        let pair = !self.statistics.is_empty() && !self.reducers.is_empty();
        if pair || !self.reduced_statistics.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::NoComponents)
        }
    }

    // -- export -------------------------------------------------------------

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }

    pub fn export_yaml(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    pub fn export_json(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

fn qualified(module: &str, class: &str, scheme: &str) -> String {
    crate::component::qualified_name(module, class, scheme)
}

fn register_name<T: Component + ?Sized>(instance: &mut Instance<T>, scheme_name: &str) -> String {
    instance.set_scheme(scheme_name);
    qualified(instance.module(), instance.class_name(), scheme_name)
}

fn log_added(archetype: Archetype, name: &str) {
    info!("  {TICK} {archetype} {name} added successfully.");
}

fn log_removed<T: Component + ?Sized>(archetype: Archetype, instance: &Instance<T>) {
    info!(
        "  {archetype} {} scheme '{}' removed successfully.",
        instance.class_name(),
        instance.scheme().unwrap_or_default()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentInfo, Params, Reduction};
    use crate::error::ComputeResult;
    use ndarray::ArrayD;

    struct Noop(ComponentInfo);

    impl Component for Noop {
        fn info(&self) -> &ComponentInfo {
            &self.0
        }
    }

    impl Statistic for Noop {
        fn compute(&self, data: ArrayD<f64>) -> ComputeResult<ArrayD<f64>> {
            Ok(data)
        }
    }

    impl Reducer for Noop {
        fn compute(&self, _: ArrayD<f64>) -> ComputeResult<Reduction> {
            Ok(Reduction::Scalar(0.0))
        }
    }

    fn stat(class: &str) -> StatisticInstance {
        let inner: Box<dyn Statistic> = Box::new(Noop(ComponentInfo::new(class, class, &[])));
        Instance::new("mod", class, Params::new(), inner)
    }

    fn reducer(class: &str) -> ReducerInstance {
        let inner: Box<dyn Reducer> = Box::new(Noop(ComponentInfo::new(class, class, &[])));
        Instance::new("mod", class, Params::new(), inner)
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut scheme = Scheme::new("test");
        scheme.add_statistic(stat("A"), "std").unwrap();
        let err = scheme.add_statistic(stat("A"), "std").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateComponent { .. }));
        scheme.add_statistic(stat("A"), "alt").unwrap();
        assert_eq!(scheme.statistics().len(), 2);
    }

    #[test]
    fn filters_follow_the_statistic_partition() {
        let mut scheme = Scheme::new("test");
        scheme.add_statistic(stat("A"), "std").unwrap();
        let filter = StatisticFilter::new(["mod.A.*"]).unwrap();
        let name = scheme.add_reducer(reducer("R"), "std", Some(filter)).unwrap();
        assert_eq!(scheme.reducer_filter(&name).unwrap().matched().len(), 1);

        scheme.add_statistic(stat("A"), "alt").unwrap();
        scheme.add_statistic(stat("B"), "std").unwrap();
        assert_eq!(scheme.reducer_filter(&name).unwrap().matched().len(), 2);

        scheme.remove_statistic_by_name("mod", "A", "std").unwrap();
        let matched: Vec<&String> =
            scheme.reducer_filter(&name).unwrap().matched().iter().collect();
        assert_eq!(matched, vec!["mod.A.alt"]);

        assert!(scheme.remove_reducer_by_name("mod", "R", "std").is_some());
        assert!(scheme.reducer_filter(&name).is_none());
    }

    #[test]
    fn removal_keeps_insertion_order() {
        let mut scheme = Scheme::new("test");
        for class in ["A", "B", "C"] {
            scheme.add_statistic(stat(class), "s").unwrap();
        }
        scheme.remove_statistic_by_name("mod", "A", "s").unwrap();
        let names: Vec<&str> = scheme.statistics().names().collect();
        assert_eq!(names, vec!["mod.B.s", "mod.C.s"]);
        assert_eq!(scheme.statistics().get("mod.C.s").unwrap().class_name(), "C");
    }

    #[test]
    fn validation_requires_a_pair_or_a_reduced_statistic() {
        let mut scheme = Scheme::new("test");
        scheme.add_statistic(stat("A"), "s").unwrap();
        assert!(matches!(scheme.validate(), Err(ConfigError::NoComponents)));
        scheme.add_reducer(reducer("R"), "s", None).unwrap();
        assert!(scheme.validate().is_ok());
    }
}
