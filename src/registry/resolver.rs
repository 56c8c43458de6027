use std::collections::{BTreeSet, HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde_yaml::Value;
use thiserror::Error;

use super::manifest::{load_manifest, Manifest};
use super::{ClassKind, ComponentClass, ModuleOrigin, Namespace};
use crate::component::Archetype;
use crate::error::{ConfigError, ConfigResult};
use crate::library;

pub const TICK: char = '✔';
pub const CROSS: char = '✖';

/// Optional external tools some components declare as `dependencies`.
const OPTIONAL_DEPENDENCIES: [&str; 2] = ["octave", "java"];

// ---------------------------------------------------------------------------
// Resolution outcome
// ---------------------------------------------------------------------------

/// Tolerable reasons a configured class is left out of a scheme.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("module could not be found")]
    ModuleNotFound,

    #[error("could not be found")]
    NotFound,

    #[error("is of kind {0}")]
    WrongArchetype(ClassKind),

    #[error("is abstract")]
    Abstract,

    #[error("is missing dependencies: {}", .0.iter().cloned().collect::<Vec<_>>().join(", "))]
    MissingDependencies(BTreeSet<String>),
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Arc<ComponentClass>),
    Skipped(SkipReason),
}

impl Resolution {
    pub fn found(self) -> Option<Arc<ComponentClass>> {
        match self {
            Resolution::Found(class) => Some(class),
            Resolution::Skipped(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Turns module references and class names into class descriptors.
///
/// Both lookups are memoized for the lifetime of the resolver: a module
/// reference is resolved once, a `(archetype, module.Class)` pair once.
#[derive(Debug)]
pub struct Resolver {
    packages: HashMap<String, Arc<Namespace>>,
    registered: HashMap<String, Arc<Namespace>>,
    modules: HashMap<String, Arc<Namespace>>,
    classes: HashMap<(Archetype, String), Arc<ComponentClass>>,
    available_dependencies: BTreeSet<String>,
    /// Canonical paths of the manifests currently being loaded.
    loading: HashSet<PathBuf>,
}

impl Default for Resolver {
    /// Built-in packages and the optional dependencies found on `PATH`.
    fn default() -> Self {
        let mut resolver = Self::empty();
        for package in library::packages() {
            resolver
                .packages
                .insert(package.name().to_string(), Arc::new(package));
        }
        resolver.available_dependencies = detect_dependencies();
        resolver
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// No packages, no registered namespaces, no optional dependencies.
    pub fn empty() -> Self {
        Self {
            packages: HashMap::new(),
            registered: HashMap::new(),
            modules: HashMap::new(),
            classes: HashMap::new(),
            available_dependencies: BTreeSet::new(),
            loading: HashSet::new(),
        }
    }

    pub fn with_available_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn available_dependencies(&self) -> &BTreeSet<String> {
        &self.available_dependencies
    }

    /// Make a namespace resolvable by its (case-insensitive) name.
    ///
    /// Replacing a namespace drops every module and class resolved from the
    /// previous one.
    pub fn register_namespace(&mut self, namespace: Namespace) {
        let key = namespace.name().to_lowercase();
        let Some(previous) = self.registered.insert(key, Arc::new(namespace)) else {
            return;
        };
        self.modules.retain(|_, module| !Arc::ptr_eq(module, &previous));
        let prefix = format!("{}.", previous.name());
        self.classes.retain(|(_, name), _| !name.starts_with(&prefix));
        info!("Namespace {} replaced; cached classes dropped.", previous.name());
    }

    /// Load a manifest file and register it under `name`.
    pub fn register_manifest(&mut self, name: &str, path: &Path) -> ConfigResult<()> {
        let manifest = load_manifest(path)?;
        let namespace = self.build_manifest_namespace(name, path, manifest)?;
        self.register_namespace(namespace);
        Ok(())
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    // -- modules ------------------------------------------------------------

    /// Find the namespace a module reference points at.
    ///
    /// Tried in order: the module cache, built-in packages, runtime-registered
    /// namespaces, then a manifest file on disk. Package and namespace names
    /// are matched case-insensitively.
    pub fn resolve_module(&mut self, reference: &str) -> ConfigResult<Option<Arc<Namespace>>> {
        if let Some(module) = self.modules.get(reference) {
            info!("  {TICK} Module {reference} already loaded.");
            return Ok(Some(Arc::clone(module)));
        }

        let lowered = reference.to_lowercase();
        if let Some(module) = self.packages.get(&lowered).cloned() {
            info!("  {TICK} Module {reference} loaded successfully.");
            return Ok(Some(self.remember(reference, module)));
        }

        if let Some(module) = self.registered.get(&lowered).cloned() {
            info!("  {TICK} Module {reference} loaded from registered namespaces.");
            return Ok(Some(self.remember(reference, module)));
        }

        let path = Path::new(reference);
        if path.is_file() {
            let manifest = load_manifest(path)?;
            let namespace = self.build_manifest_namespace(reference, path, manifest)?;
            info!("  {TICK} Module {reference} loaded from file.");
            return Ok(Some(self.remember(reference, Arc::new(namespace))));
        }

        Ok(None)
    }

    fn remember(&mut self, reference: &str, module: Arc<Namespace>) -> Arc<Namespace> {
        self.modules.insert(reference.to_string(), Arc::clone(&module));
        module
    }

    /// Derive the classes of a manifest. Bases may live in other manifests;
    /// a chain that leads back to a manifest still loading is an error.
    fn build_manifest_namespace(
        &mut self,
        name: &str,
        path: &Path,
        manifest: Manifest,
    ) -> ConfigResult<Namespace> {
        let canonical = fs::canonicalize(path).map_err(|e| ConfigError::ModuleLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !self.loading.insert(canonical.clone()) {
            return Err(ConfigError::ModuleLoad {
                path: path.to_path_buf(),
                reason: "cyclic manifest reference".to_string(),
            });
        }
        let namespace = self.derive_manifest_classes(name, path, manifest);
        self.loading.remove(&canonical);
        namespace
    }

    fn derive_manifest_classes(
        &mut self,
        name: &str,
        path: &Path,
        manifest: Manifest,
    ) -> ConfigResult<Namespace> {
        let load_error = |reason: String| ConfigError::ModuleLoad {
            path: path.to_path_buf(),
            reason,
        };

        let mut namespace = Namespace::with_origin(name, ModuleOrigin::File(path.to_path_buf()));
        for (class_name, entry) in manifest {
            let (module_ref, base_name) = entry.split_base().ok_or_else(|| {
                load_error(format!("'{}' is not of the form module.Class", entry.base))
            })?;
            if module_ref == name {
                return Err(load_error(format!("{class_name} derives from its own module")));
            }

            let module = self.resolve_module(module_ref)?.ok_or_else(|| {
                load_error(format!("base module '{module_ref}' could not be found"))
            })?;
            let base = module.get(base_name).ok_or_else(|| {
                load_error(format!("base class '{}' could not be found", entry.base))
            })?;
            let derived = base.derive(&class_name, &entry.defaults).map_err(|unknown| {
                load_error(format!(
                    "{class_name} sets defaults {} not declared by {}",
                    unknown.join(", "),
                    entry.base
                ))
            })?;
            namespace.insert(derived);
        }
        Ok(namespace)
    }

    // -- classes ------------------------------------------------------------

    /// Find `class_name` in `namespace` and check it may be used as `archetype`.
    ///
    /// `params` is the class's configuration block; only its `dependencies`
    /// entry is consulted here.
    pub fn resolve_class(
        &mut self,
        archetype: Archetype,
        class_name: &str,
        params: &Value,
        namespace: &Namespace,
    ) -> Resolution {
        let key = (archetype, format!("{}.{}", namespace.name(), class_name));
        if let Some(class) = self.classes.get(&key) {
            return Resolution::Found(Arc::clone(class));
        }

        let skip = |reason: SkipReason| {
            info!("  {CROSS} {archetype} {class_name} {reason}. Skipping.");
            Resolution::Skipped(reason)
        };

        let Some(class) = namespace.get(class_name) else {
            return skip(SkipReason::NotFound);
        };
        if !class.satisfies(archetype) {
            return skip(SkipReason::WrongArchetype(class.kind()));
        }
        if class.is_abstract() {
            return skip(SkipReason::Abstract);
        }

        let missing: BTreeSet<String> = declared_dependencies(params)
            .into_iter()
            .filter(|dep| !self.available_dependencies.contains(dep))
            .collect();
        if !missing.is_empty() {
            warn!(
                "  {CROSS} {archetype} {class_name} is missing dependencies: {}. Skipping.",
                missing.iter().cloned().collect::<Vec<_>>().join(", ")
            );
            return Resolution::Skipped(SkipReason::MissingDependencies(missing));
        }

        let class = Arc::clone(class);
        self.classes.insert(key, Arc::clone(&class));
        Resolution::Found(class)
    }
}

/// `dependencies` may be a whitespace-separated string or a list of strings.
fn declared_dependencies(params: &Value) -> Vec<String> {
    match params.get("dependencies") {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn detect_dependencies() -> BTreeSet<String> {
    let Some(path) = env::var_os("PATH") else {
        return BTreeSet::new();
    };
    let dirs: Vec<_> = env::split_paths(&path).collect();
    OPTIONAL_DEPENDENCIES
        .iter()
        .filter(|tool| {
            dirs.iter().any(|dir| {
                dir.join(tool).is_file() || dir.join(format!("{tool}.exe")).is_file()
            })
        })
        .map(|tool| tool.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentInfo, ParamSchema, Statistic};
    use crate::error::ComputeResult;
    use ndarray::ArrayD;
    use std::io::Write;

    struct Identity(ComponentInfo);

    impl Component for Identity {
        fn info(&self) -> &ComponentInfo {
            &self.0
        }
    }

    impl Statistic for Identity {
        fn compute(&self, data: ArrayD<f64>) -> ComputeResult<ArrayD<f64>> {
            Ok(data)
        }
    }

    fn namespace() -> Namespace {
        Namespace::new("Custom").with_abstract_bases().statistic(
            "Identity",
            ParamSchema::new().optional("scale", 1.0),
            |_| Ok(Box::new(Identity(ComponentInfo::new("Identity", "id", &[])))),
        )
    }

    fn no_params() -> Value {
        Value::Null
    }

    #[test]
    fn registered_namespaces_resolve_case_insensitively() {
        let mut resolver = Resolver::empty();
        resolver.register_namespace(namespace());
        assert!(resolver.resolve_module("custom").unwrap().is_some());
        assert!(resolver.resolve_module("CUSTOM").unwrap().is_some());
        assert!(resolver.resolve_module("missing.module").unwrap().is_none());
    }

    #[test]
    fn built_in_packages_resolve_by_dotted_path() {
        let mut resolver = Resolver::new();
        let first = resolver.resolve_module("rusty_spoc.statistics.basic").unwrap().unwrap();
        let second = resolver.resolve_module("rusty_spoc.statistics.basic").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.origin(), &ModuleOrigin::Package);
    }

    #[test]
    fn class_resolution_reports_skip_reasons() {
        let mut resolver = Resolver::empty();
        let ns = namespace();

        let found = resolver.resolve_class(Archetype::Statistic, "Identity", &no_params(), &ns);
        assert!(matches!(found, Resolution::Found(_)));

        let skipped = |r: Resolution| match r {
            Resolution::Skipped(reason) => reason,
            Resolution::Found(c) => panic!("unexpectedly found {c:?}"),
        };
        assert_eq!(
            skipped(resolver.resolve_class(Archetype::Statistic, "Nope", &no_params(), &ns)),
            SkipReason::NotFound
        );
        assert_eq!(
            skipped(resolver.resolve_class(Archetype::Reducer, "Identity", &no_params(), &ns)),
            SkipReason::WrongArchetype(ClassKind::Statistic)
        );
        assert_eq!(
            skipped(resolver.resolve_class(
                Archetype::Statistic,
                "PairwiseStatistic",
                &no_params(),
                &ns
            )),
            SkipReason::Abstract
        );
    }

    #[test]
    fn missing_dependencies_skip_the_class() {
        let mut resolver = Resolver::empty().with_available_dependencies(["java"]);
        let ns = namespace();
        let params: Value = serde_yaml::from_str("dependencies: octave java").unwrap();
        match resolver.resolve_class(Archetype::Statistic, "Identity", &params, &ns) {
            Resolution::Skipped(SkipReason::MissingDependencies(missing)) => {
                assert_eq!(missing, BTreeSet::from(["octave".to_string()]));
            }
            other => panic!("unexpected {other:?}"),
        }

        let params: Value = serde_yaml::from_str("dependencies: [java]").unwrap();
        assert!(resolver
            .resolve_class(Archetype::Statistic, "Identity", &params, &ns)
            .found()
            .is_some());
    }

    #[test]
    fn manifest_files_derive_classes() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "Scaled:\n  base: custom.Identity\n  defaults:\n    scale: 2.0").unwrap();
        let reference = file.path().to_string_lossy().to_string();

        let mut resolver = Resolver::empty();
        resolver.register_namespace(namespace());
        let module = resolver.resolve_module(&reference).unwrap().unwrap();
        let class = module.get("Scaled").unwrap();
        assert_eq!(class.kind(), ClassKind::Statistic);
        assert_eq!(
            class.schema().decls()[0].default,
            Some(crate::component::ParamValue::Float(2.0))
        );
    }

    #[test]
    fn package_references_ignore_case() {
        let mut resolver = Resolver::new();
        let module = resolver.resolve_module("Rusty_Spoc.Reducers.Basic").unwrap();
        assert_eq!(module.unwrap().name(), "rusty_spoc.reducers.basic");
    }

    #[test]
    fn replacing_a_namespace_evicts_its_cached_classes() {
        let mut resolver = Resolver::empty();
        resolver.register_namespace(namespace());
        let old = resolver.resolve_module("custom").unwrap().unwrap();
        let found = resolver.resolve_class(Archetype::Statistic, "Identity", &no_params(), &old);
        assert!(matches!(found, Resolution::Found(_)));

        resolver.register_namespace(Namespace::new("Custom"));
        let new = resolver.resolve_module("custom").unwrap().unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        match resolver.resolve_class(Archetype::Statistic, "Identity", &no_params(), &new) {
            Resolution::Skipped(reason) => assert_eq!(reason, SkipReason::NotFound),
            Resolution::Found(c) => panic!("stale class {c:?}"),
        }
    }

    #[test]
    fn mutually_derived_manifests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.yaml");
        let b = dir.path().join("b.yaml");
        std::fs::write(&a, format!("X:\n  base: {}.Y\n", b.display())).unwrap();
        std::fs::write(&b, format!("Y:\n  base: {}.X\n", a.display())).unwrap();

        let mut resolver = Resolver::empty();
        match resolver.resolve_module(&a.display().to_string()) {
            Err(ConfigError::ModuleLoad { reason, .. }) => assert!(reason.contains("cyclic")),
            other => panic!("expected a module load error, got {other:?}"),
        }
        // The guard is released once loading fails.
        assert!(resolver.loading.is_empty());
    }

    #[test]
    fn broken_manifest_is_fatal() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "Broken:\n  base: nowhere.Thing").unwrap();
        let reference = file.path().to_string_lossy().to_string();

        let mut resolver = Resolver::empty();
        let err = resolver.resolve_module(&reference).unwrap_err();
        assert!(matches!(err, ConfigError::ModuleLoad { .. }));
    }
}
