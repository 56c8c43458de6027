//! Scheme → configuration mapping, in the same shape the builder reads.

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use super::builder::FILTER_KEY;
use super::{Partition, Scheme};
use crate::component::{Archetype, Component, Instance, Params};

impl Scheme {
    /// Sections with no components are left out. Reducer filter patterns are
    /// merged per class, since the configuration format keeps them there.
    pub fn to_value(&self) -> Value {
        let mut root = Mapping::new();

        if !self.statistics.is_empty() {
            root.insert(
                Archetype::Statistic.section().into(),
                Value::Mapping(export_partition(&self.statistics, |_| None)),
            );
        }
        if !self.reducers.is_empty() {
            let reducers = export_partition(&self.reducers, |name| {
                self.filters.get(name).map(|f| f.patterns().to_vec())
            });
            root.insert(Archetype::Reducer.section().into(), Value::Mapping(reducers));
        }
        if !self.reduced_statistics.is_empty() {
            root.insert(
                Archetype::ReducedStatistic.section().into(),
                Value::Mapping(export_partition(&self.reduced_statistics, |_| None)),
            );
        }
        Value::Mapping(root)
    }
}

#[derive(Default)]
struct ClassEntry {
    schemes: Mapping,
    patterns: Vec<String>,
}

fn export_partition<T, F>(partition: &Partition<T>, patterns_of: F) -> Mapping
where
    T: Component + ?Sized,
    F: Fn(&str) -> Option<Vec<String>>,
{
    let mut modules: IndexMap<String, IndexMap<String, ClassEntry>> = IndexMap::new();
    for (name, instance) in partition.iter() {
        let class = modules
            .entry(instance.module().to_string())
            .or_default()
            .entry(instance.class_name().to_string())
            .or_default();

        class.schemes.insert(scheme_key(instance), params_value(instance.params()));
        for pattern in patterns_of(name).unwrap_or_default() {
            if !class.patterns.contains(&pattern) {
                class.patterns.push(pattern);
            }
        }
    }

    let mut out = Mapping::new();
    for (module, classes) in modules {
        let mut class_map = Mapping::new();
        for (class_name, entry) in classes {
            let mut block = Mapping::new();
            block.insert("schemes".into(), Value::Mapping(entry.schemes));
            if !entry.patterns.is_empty() {
                let patterns = entry.patterns.into_iter().map(Value::String).collect();
                block.insert(FILTER_KEY.into(), Value::Sequence(patterns));
            }
            class_map.insert(class_name.into(), Value::Mapping(block));
        }
        out.insert(module.into(), Value::Mapping(class_map));
    }
    out
}

fn scheme_key<T: Component + ?Sized>(instance: &Instance<T>) -> Value {
    Value::String(instance.scheme().unwrap_or_default().to_string())
}

/// Empty parameter sets become `null`, matching how schemes without
/// arguments are usually written.
fn params_value(params: &Params) -> Value {
    if params.is_empty() {
        return Value::Null;
    }
    let mut mapping = Mapping::new();
    for (name, value) in params.iter() {
        mapping.insert(name.into(), value.to_yaml());
    }
    Value::Mapping(mapping)
}
