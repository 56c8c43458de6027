//! Two-tier memoized computation graph: dataset → statistic → reducer.
//!
//! ```text
//!   DatasetId ──▶ ComponentId (statistic) ──▶ StatisticOutput
//!                          │
//!                          ▼ StatisticKey(dataset, statistic)
//!                 ComponentId (reducer)   ──▶ reduced result
//! ```
//!
//! Entries are keyed by identity only. Invalidating a dataset walks the
//! statistic keys it owned and drops every reduction derived from them.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ndarray::ArrayD;

use crate::component::statistic::evaluate;
use crate::component::{ComponentId, ReducerInstance, StatisticInstance, StatisticOutput};
use crate::data::{Dataset, DatasetId};
use crate::error::{ComputeError, ComputeResult};

/// Identity of one statistic result: which statistic, computed on which dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatisticKey {
    pub dataset: DatasetId,
    pub statistic: ComponentId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub struct ComputationCache {
    statistics: HashMap<DatasetId, HashMap<ComponentId, StatisticOutput>>,
    reductions: HashMap<StatisticKey, HashMap<ComponentId, Arc<ArrayD<f64>>>>,
    stats: CacheStats,
}

impl ComputationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result of `statistic` on `dataset`, computed at most once until the
    /// dataset is uncached.
    pub fn calculate_statistic(
        &mut self,
        dataset: &Dataset,
        statistic: &StatisticInstance,
    ) -> ComputeResult<StatisticOutput> {
        if let Some(output) = self.statistic_result(dataset.id(), statistic.id()).cloned() {
            self.stats.hits += 1;
            return Ok(output);
        }

        self.stats.misses += 1;
        let data = dataset.data().clone();
        let output = guarded(|| evaluate(statistic.component(), data))?;

        // A fresh statistic result invalidates reductions of the previous one.
        self.reductions.remove(&StatisticKey {
            dataset: dataset.id(),
            statistic: statistic.id(),
        });
        self.statistics
            .entry(dataset.id())
            .or_default()
            .insert(statistic.id(), output.clone());
        Ok(output)
    }

    pub fn statistic_result(
        &self,
        dataset: DatasetId,
        statistic: ComponentId,
    ) -> Option<&StatisticOutput> {
        self.statistics.get(&dataset)?.get(&statistic)
    }

    /// Reduce the cached result of `statistic` on `dataset`, computing the
    /// statistic first if it is not cached.
    pub fn calculate_reduction(
        &mut self,
        dataset: &Dataset,
        statistic: &StatisticInstance,
        reducer: &ReducerInstance,
    ) -> ComputeResult<Arc<ArrayD<f64>>> {
        let key = StatisticKey {
            dataset: dataset.id(),
            statistic: statistic.id(),
        };
        if let Some(result) = self.reductions.get(&key).and_then(|r| r.get(&reducer.id())) {
            self.stats.hits += 1;
            return Ok(Arc::clone(result));
        }

        let source = self.calculate_statistic(dataset, statistic)?;
        self.stats.misses += 1;
        let data = source.result().as_ref().clone();
        let result = Arc::new(guarded(|| reducer.component().compute(data))?.into_array());

        self.reductions
            .entry(key)
            .or_default()
            .insert(reducer.id(), Arc::clone(&result));
        Ok(result)
    }

    pub fn reduction_result(
        &self,
        key: StatisticKey,
        reducer: ComponentId,
    ) -> Option<&Arc<ArrayD<f64>>> {
        self.reductions.get(&key)?.get(&reducer)
    }

    /// Drop every statistic result for `dataset` and every reduction derived
    /// from them. `reclaim` also releases the maps' spare capacity.
    pub fn uncache(&mut self, dataset: DatasetId, reclaim: bool) {
        if let Some(results) = self.statistics.remove(&dataset) {
            for statistic in results.into_keys() {
                self.reductions.remove(&StatisticKey { dataset, statistic });
            }
            log::debug!("Uncached dataset {dataset}");
        }
        if reclaim {
            self.statistics.shrink_to_fit();
            self.reductions.shrink_to_fit();
        }
    }

    /// Drop one statistic result and its reductions.
    pub fn uncache_statistic(&mut self, key: StatisticKey) {
        if let Some(results) = self.statistics.get_mut(&key.dataset) {
            results.remove(&key.statistic);
        }
        self.reductions.remove(&key);
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of cached statistic results across all datasets.
    pub fn len(&self) -> usize {
        self.statistics.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Failure boundary around a single `compute` call: errors pass through,
/// panics become [`ComputeError::Panicked`].
pub fn guarded<T>(f: impl FnOnce() -> ComputeResult<T>) -> ComputeResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ComputeError::Panicked(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
