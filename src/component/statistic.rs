use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Axis};

use super::{Component, ComponentInfo};
use crate::error::{ComputeError, ComputeResult, ConfigError, ConfigResult};

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// How a statistic's `compute` step is driven by the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Contract {
    /// n×p → p×p. 3-D input is passed through untouched.
    #[default]
    Static,
    /// n×p → p×p, n×p×t → p×p×t computed slice by slice.
    Dynamic,
    /// Fully reduced output: flattened, never handed to a reducer.
    Reduced,
}

/// A measure computed from a whole dataset.
pub trait Statistic: Component {
    fn contract(&self) -> Contract {
        Contract::Static
    }

    /// Receives its own copy of the data.
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<ArrayD<f64>>;
}

/// Result of a statistic, tagged so callers never need a type check to
/// know whether reducers apply.
#[derive(Debug, Clone)]
pub enum StatisticOutput {
    Plain(Arc<ArrayD<f64>>),
    SelfReduced(Arc<ArrayD<f64>>),
}

impl StatisticOutput {
    pub fn result(&self) -> &Arc<ArrayD<f64>> {
        match self {
            StatisticOutput::Plain(r) | StatisticOutput::SelfReduced(r) => r,
        }
    }

    pub fn is_self_reduced(&self) -> bool {
        matches!(self, StatisticOutput::SelfReduced(_))
    }
}

/// Run a statistic against `data` according to its contract.
pub fn evaluate(statistic: &dyn Statistic, data: ArrayD<f64>) -> ComputeResult<StatisticOutput> {
    match statistic.contract() {
        Contract::Dynamic if data.ndim() == 3 => {
            let steps = data.len_of(Axis(2));
            if steps == 0 {
                return Err(ComputeError::Shape("time series has no time steps".into()));
            }
            let mut slices = Vec::with_capacity(steps);
            for k in 0..steps {
                slices.push(statistic.compute(data.index_axis(Axis(2), k).to_owned())?);
            }
            let trailing = Axis(slices[0].ndim());
            let views: Vec<_> = slices.iter().map(|s| s.view()).collect();
            Ok(StatisticOutput::Plain(Arc::new(ndarray::stack(trailing, &views)?)))
        }
        Contract::Static | Contract::Dynamic => {
            Ok(StatisticOutput::Plain(Arc::new(statistic.compute(data)?)))
        }
        Contract::Reduced => {
            let result = statistic.compute(data)?;
            let flat: Array1<f64> = result.iter().copied().collect();
            Ok(StatisticOutput::SelfReduced(Arc::new(flat.into_dyn())))
        }
    }
}

// ---------------------------------------------------------------------------
// Pairwise statistics
// ---------------------------------------------------------------------------

/// Dataset axis over which all-pairs comparisons are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonAxis {
    Observations,
    Variables,
    Time,
}

impl ComparisonAxis {
    /// Accepts both the long names and the `n`/`p`/`t` shorthand.
    pub fn parse(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "observations" => Ok(ComparisonAxis::Observations),
            "p" | "variables" => Ok(ComparisonAxis::Variables),
            "t" | "time" => Ok(ComparisonAxis::Time),
            other => Err(ConfigError::InvalidParameter {
                param: "dim".to_string(),
                expected: "one of observations (n), variables (p), time (t)",
                found: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonAxis::Observations => "n",
            ComparisonAxis::Variables => "p",
            ComparisonAxis::Time => "t",
        }
    }

    fn index(&self) -> usize {
        match self {
            ComparisonAxis::Observations => 0,
            ComparisonAxis::Variables => 1,
            ComparisonAxis::Time => 2,
        }
    }
}

/// A scalar comparison of two slices of the data. May be directed:
/// `pairwise_compute(x, y)` need not equal `pairwise_compute(y, x)`.
pub trait PairwiseMeasure: Send + Sync {
    fn info(&self) -> &ComponentInfo;

    fn pairwise_compute(
        &self,
        x: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> ComputeResult<f64>;
}

/// Turns a [`PairwiseMeasure`] into a statistic producing a dense m×m matrix,
/// m being the length of the comparison axis.
pub struct PairwiseStatistic<M> {
    measure: M,
    axis: ComparisonAxis,
    ordered: bool,
    contract: Contract,
}

impl<M: PairwiseMeasure> PairwiseStatistic<M> {
    pub fn new(measure: M, axis: ComparisonAxis, ordered: bool) -> Self {
        Self {
            measure,
            axis,
            ordered,
            contract: Contract::Static,
        }
    }

    /// A per-time-step statistic cannot also compare across time steps.
    pub fn with_contract(
        measure: M,
        axis: ComparisonAxis,
        ordered: bool,
        contract: Contract,
    ) -> ConfigResult<Self> {
        if contract == Contract::Dynamic && axis == ComparisonAxis::Time {
            return Err(ConfigError::IncompatibleConfiguration(format!(
                "{} compares over time but is a dynamic statistic: timewise methods compute one \
                 statistic for an entire time series, dynamic methods one per time point",
                measure.info().name
            )));
        }
        Ok(Self {
            measure,
            axis,
            ordered,
            contract,
        })
    }

    pub fn axis(&self) -> ComparisonAxis {
        self.axis
    }

    pub fn ordered(&self) -> bool {
        self.ordered
    }

    pub fn measure(&self) -> &M {
        &self.measure
    }

    /// Bring the comparison axis to the front and sort along it if required.
    fn arrange(&self, mut data: ArrayD<f64>) -> ComputeResult<ArrayD<f64>> {
        let axis = self.axis.index();
        if axis >= data.ndim() {
            return Err(ComputeError::Shape(format!(
                "comparison axis '{}' needs at least {} dimensions, data has {}",
                self.axis.as_str(),
                axis + 1,
                data.ndim()
            )));
        }
        data.swap_axes(0, axis);

        if self.ordered {
            for mut lane in data.lanes_mut(Axis(0)) {
                let mut sorted = lane.to_vec();
                sorted.sort_by(f64::total_cmp);
                for (dst, src) in lane.iter_mut().zip(sorted) {
                    *dst = src;
                }
            }
        }
        Ok(data)
    }
}

impl<M: PairwiseMeasure> Component for PairwiseStatistic<M> {
    fn info(&self) -> &ComponentInfo {
        self.measure.info()
    }
}

impl<M: PairwiseMeasure> Statistic for PairwiseStatistic<M> {
    fn contract(&self) -> Contract {
        self.contract
    }

    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<ArrayD<f64>> {
        let data = self.arrange(data)?;
        let m = data.len_of(Axis(0));
        let mut out = Array2::<f64>::zeros((m, m));

        for i in 0..m {
            let x = data.index_axis(Axis(0), i);
            for j in 0..m {
                let y = data.index_axis(Axis(0), j);
                out[[i, j]] = self.measure.pairwise_compute(x.view(), y)?;
            }
        }
        Ok(out.into_dyn())
    }
}
