/// Orchestration: runs a [`Scheme`] against one dataset.
///
/// ```text
///   Scheme ──┐
///            ▼
///   ┌────────────────┐  calculate_statistic   ┌───────────────────┐
///   │   Calculator    │ ─────────────────────▶ │ ComputationCache   │
///   │  (one Dataset)  │  calculate_reduction   │  dataset tier      │
///   └────────────────┘ ─────────────────────▶ │  reducer tier      │
///            │                                 └───────────────────┘
///            ▼
///      ResultsTable  (statistic, reducer) → value
/// ```
///
/// Every compute call runs inside the cache's failure boundary. A failed
/// component is recorded and left out of the table; siblings still run.
pub mod table;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log::{debug, info, warn};
use ndarray::ArrayD;

use crate::cache::{CacheStats, ComputationCache};
use crate::config::Scheme;
use crate::data::Dataset;
use crate::error::ComputeError;

pub use table::{Column, ResultsTable, SELF_REDUCED};

/// One excluded computation.
#[derive(Debug)]
pub struct Failure {
    pub statistic: String,
    /// `None` when the statistic itself failed.
    pub reducer: Option<String>,
    pub error: ComputeError,
}

type StatisticResults = Vec<(String, Arc<ArrayD<f64>>)>;

pub struct Calculator {
    dataset: Dataset,
    name: String,
    labels: Vec<String>,
    cache: ComputationCache,
    results: ResultsTable,
    failures: Vec<Failure>,
}

impl Calculator {
    pub fn new(dataset: Dataset) -> Self {
        let name = dataset.name().to_string();
        Self {
            results: ResultsTable::new(&name),
            dataset,
            name,
            labels: Vec::new(),
            cache: ComputationCache::new(),
            failures: Vec::new(),
        }
    }

    /// Row label of the results table. Defaults to the dataset's name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Tags carried into every results table this calculator builds.
    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn results(&self) -> &ResultsTable {
        &self.results
    }

    /// Computations excluded from the last [`Calculator::compute`].
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Run every component of `scheme`, in configuration order, and rebuild
    /// the results table.
    pub fn compute(&mut self, scheme: &Scheme) -> &ResultsTable {
        let started = Instant::now();
        info!(
            "Processing dataset '{}' ({:?}) with scheme '{}'.",
            self.name,
            self.dataset.shape(),
            scheme.name()
        );
        self.failures.clear();

        // Statistics
        let mut succeeded = HashSet::new();
        for (name, statistic) in scheme.statistics().iter() {
            match self.cache.calculate_statistic(&self.dataset, statistic) {
                Ok(_) => {
                    succeeded.insert(name);
                }
                Err(error) => self.fail(name, None, error),
            }
        }

        let mut results: Vec<(String, StatisticResults)> = scheme
            .statistics()
            .names()
            .filter(|name| succeeded.contains(name))
            .map(|name| (name.to_string(), Vec::new()))
            .collect();

        // Reducers
        for (reducer_name, reducer) in scheme.reducers().iter() {
            let filter = scheme.reducer_filter(reducer_name);
            for (statistic_name, slot) in results.iter_mut() {
                if filter.is_some_and(|f| !f.contains(statistic_name)) {
                    continue;
                }
                let Some(statistic) = scheme.statistics().get(statistic_name) else {
                    continue;
                };
                let output = self
                    .cache
                    .statistic_result(self.dataset.id(), statistic.id())
                    .cloned();
                match output {
                    Some(output) if output.is_self_reduced() => {
                        if !slot.iter().any(|(r, _)| r == SELF_REDUCED) {
                            slot.push((SELF_REDUCED.to_string(), Arc::clone(output.result())));
                        }
                    }
                    Some(_) => {
                        let reduction =
                            self.cache.calculate_reduction(&self.dataset, statistic, reducer);
                        match reduction {
                            Ok(result) => slot.push((reducer_name.to_string(), result)),
                            Err(error) => self.fail(statistic_name, Some(reducer_name), error),
                        }
                    }
                    None => {
                        let error = ComputeError::MissingStatistic(statistic_name.clone());
                        self.fail(statistic_name, Some(reducer_name), error);
                    }
                }
            }
        }

        // Reduced statistics
        for (name, statistic) in scheme.reduced_statistics().iter() {
            match self.cache.calculate_statistic(&self.dataset, statistic) {
                Ok(output) => results.push((
                    name.to_string(),
                    vec![(SELF_REDUCED.to_string(), Arc::clone(output.result()))],
                )),
                Err(error) => self.fail(name, None, error),
            }
        }

        let mut table = ResultsTable::new(&self.name).with_labels(&self.labels);
        for (statistic, reductions) in &results {
            for (reducer, result) in reductions {
                table.push(statistic, reducer, result);
            }
        }
        self.results = table;

        info!(
            "Calculation complete in {:.3}s: {} values, {} failures.",
            started.elapsed().as_secs_f64(),
            self.results.len(),
            self.failures.len()
        );
        &self.results
    }

    /// Swap in new contents for the dataset. Cached results for it are
    /// dropped first.
    pub fn replace_data(&mut self, data: ArrayD<f64>) -> Result<()> {
        self.uncache(false);
        self.dataset.replace(data)
    }

    /// Drop every cached result derived from this calculator's dataset.
    pub fn uncache(&mut self, reclaim: bool) {
        debug!("Uncaching dataset '{}'.", self.name);
        self.cache.uncache(self.dataset.id(), reclaim);
    }

    fn fail(&mut self, statistic: &str, reducer: Option<&str>, error: ComputeError) {
        match reducer {
            Some(reducer) => warn!("Reducer {reducer} failed on statistic {statistic}: {error}"),
            None => warn!("Statistic {statistic} failed: {error}"),
        }
        self.failures.push(Failure {
            statistic: statistic.to_string(),
            reducer: reducer.map(str::to_string),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{
        Component, ComponentInfo, Contract, Instance, Params, Reducer, Reduction, Statistic,
        StatisticInstance,
    };
    use crate::config::StatisticFilter;
    use crate::error::ComputeResult;
    use ndarray::{arr1, Array2};

    struct ColumnMeans {
        info: ComponentInfo,
        contract: Contract,
    }

    impl Component for ColumnMeans {
        fn info(&self) -> &ComponentInfo {
            &self.info
        }
    }

    impl Statistic for ColumnMeans {
        fn contract(&self) -> Contract {
            self.contract
        }

        fn compute(&self, data: ArrayD<f64>) -> ComputeResult<ArrayD<f64>> {
            data.mean_axis(ndarray::Axis(0))
                .ok_or_else(|| ComputeError::Shape("no observations".into()))
        }
    }

    struct Explodes(ComponentInfo);

    impl Component for Explodes {
        fn info(&self) -> &ComponentInfo {
            &self.0
        }
    }

    impl Statistic for Explodes {
        fn compute(&self, _: ArrayD<f64>) -> ComputeResult<ArrayD<f64>> {
            panic!("exploded")
        }
    }

    struct Total(ComponentInfo);

    impl Component for Total {
        fn info(&self) -> &ComponentInfo {
            &self.0
        }
    }

    impl Reducer for Total {
        fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction> {
            Ok(Reduction::Scalar(data.sum()))
        }
    }

    fn means(contract: Contract) -> StatisticInstance {
        let info = ComponentInfo::new("Column means", "means", &[]);
        Instance::new("test", "Means", Params::new(), Box::new(ColumnMeans { info, contract }))
    }

    fn scheme() -> Scheme {
        let mut scheme = Scheme::new("test");
        scheme.add_statistic(means(Contract::Static), "a").unwrap();
        let boom = Explodes(ComponentInfo::new("Boom", "boom", &[]));
        scheme
            .add_statistic(Instance::new("test", "Boom", Params::new(), Box::new(boom)), "b")
            .unwrap();
        scheme.add_statistic(means(Contract::Reduced), "c").unwrap();
        let total = Total(ComponentInfo::new("Total", "total", &[]));
        scheme
            .add_reducer(Instance::new("test", "Total", Params::new(), Box::new(total)), "x", None)
            .unwrap();
        scheme
    }

    fn dataset() -> Dataset {
        Dataset::new(Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap().into_dyn())
            .unwrap()
            .with_name("ds")
    }

    #[test]
    fn failing_statistic_is_isolated() {
        let mut calc = Calculator::new(dataset());
        let table = calc.compute(&scheme());
        assert_eq!(table.get("test.Means.a", "test.Total.x"), Some(5.0));
        assert!(!table.has_statistic("test.Boom.b"));
        assert_eq!(table.get("test.Means.c", SELF_REDUCED), None);
        assert_eq!(table.get("test.Means.c", "self_1"), Some(2.0));
        assert_eq!(calc.failures().len(), 1);
        assert!(matches!(calc.failures()[0].error, ComputeError::Panicked(_)));
    }

    #[test]
    fn filters_restrict_reducers() {
        let mut scheme = scheme();
        let total = Total(ComponentInfo::new("Total", "total", &[]));
        let filter = StatisticFilter::new(["test.Means.c"]).unwrap();
        scheme
            .add_reducer(
                Instance::new("test", "Total", Params::new(), Box::new(total)),
                "y",
                Some(filter),
            )
            .unwrap();
        let mut calc = Calculator::new(dataset()).with_name("row").with_labels(&["healthy"]);
        let table = calc.compute(&scheme);
        assert_eq!(table.get("test.Means.a", "test.Total.y"), None);
        assert_eq!(table.row(), "row");
        assert_eq!(table.labels().to_vec(), vec!["healthy".to_string()]);
    }

    #[test]
    fn recompute_hits_the_cache_until_data_changes() {
        let scheme = scheme();
        let mut calc = Calculator::new(dataset());
        calc.compute(&scheme);
        let misses = calc.cache_stats().misses;
        calc.compute(&scheme);
        assert_eq!(calc.cache_stats().misses, misses + 1);

        calc.replace_data(arr1(&[10.0, 20.0]).into_shape_with_order((1, 2)).unwrap().into_dyn())
            .unwrap();
        let table = calc.compute(&scheme);
        assert_eq!(table.get("test.Means.a", "test.Total.x"), Some(30.0));
    }
}
