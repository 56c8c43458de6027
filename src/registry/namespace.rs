use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{ClassKind, ComponentClass};
use crate::component::{ParamSchema, Params, Reducer, Statistic};
use crate::error::ConfigResult;

/// Where a namespace came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Compiled into the crate.
    Package,
    /// Registered at runtime by the embedding program.
    Registered,
    /// Loaded from a module manifest on disk.
    File(PathBuf),
}

/// A named symbol table of component classes.
#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    origin: ModuleOrigin,
    classes: BTreeMap<String, Arc<ComponentClass>>,
}

impl Namespace {
    pub fn new(name: &str) -> Self {
        Self::with_origin(name, ModuleOrigin::Registered)
    }

    pub fn with_origin(name: &str, origin: ModuleOrigin) -> Self {
        Self {
            name: name.to_string(),
            origin,
            classes: BTreeMap::new(),
        }
    }

    /// Adds the abstract base classes every namespace exposes.
    pub fn with_abstract_bases(self) -> Self {
        self.class(ComponentClass::abstract_class("Statistic", ClassKind::Statistic))
            .class(ComponentClass::abstract_class("PairwiseStatistic", ClassKind::Statistic))
            .class(ComponentClass::abstract_class("DynamicStatistic", ClassKind::Statistic))
            .class(ComponentClass::abstract_class("ReducedStatistic", ClassKind::ReducedStatistic))
            .class(ComponentClass::abstract_class("Reducer", ClassKind::Reducer))
    }

    pub fn class(mut self, class: ComponentClass) -> Self {
        self.insert(class);
        self
    }

    pub fn statistic<F>(self, name: &str, schema: ParamSchema, factory: F) -> Self
    where
        F: Fn(&Params) -> ConfigResult<Box<dyn Statistic>> + Send + Sync + 'static,
    {
        self.class(ComponentClass::statistic(name, schema, factory))
    }

    pub fn reduced_statistic<F>(self, name: &str, schema: ParamSchema, factory: F) -> Self
    where
        F: Fn(&Params) -> ConfigResult<Box<dyn Statistic>> + Send + Sync + 'static,
    {
        self.class(ComponentClass::reduced_statistic(name, schema, factory))
    }

    pub fn reducer<F>(self, name: &str, schema: ParamSchema, factory: F) -> Self
    where
        F: Fn(&Params) -> ConfigResult<Box<dyn Reducer>> + Send + Sync + 'static,
    {
        self.class(ComponentClass::reducer(name, schema, factory))
    }

    pub fn insert(&mut self, class: ComponentClass) {
        self.classes.insert(class.name().to_string(), Arc::new(class));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    pub fn get(&self, class_name: &str) -> Option<&Arc<ComponentClass>> {
        self.classes.get(class_name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
