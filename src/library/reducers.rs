//! `rusty_spoc.reducers.basic`: elementary summaries of a statistic's matrix.

use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2};

use super::linalg;
use crate::component::reducer::per_slice;
use crate::component::{Component, ComponentInfo, ParamSchema, Params, Reducer, Reduction};
use crate::error::{ComputeError, ComputeResult, ConfigError, ConfigResult};
use crate::registry::{ModuleOrigin, Namespace};

pub const PACKAGE: &str = "rusty_spoc.reducers.basic";

pub fn namespace() -> Namespace {
    Namespace::with_origin(PACKAGE, ModuleOrigin::Package)
        .with_abstract_bases()
        .reducer("Trace", ParamSchema::new(), |_| Ok(Box::new(Trace::new())))
        .reducer("Diag", ParamSchema::new().optional("num_values", 2i64), |p| {
            Ok(Box::new(Diag::from_params(p)?))
        })
        .reducer("Moment", ParamSchema::new().required("moments"), |p| {
            Ok(Box::new(Moment::from_params(p)?))
        })
        .reducer("Determinant", ParamSchema::new().optional("scaled", true), |p| {
            Ok(Box::new(Determinant::from_params(p)?))
        })
        .reducer("Mean", ParamSchema::new(), |_| Ok(Box::new(Mean::new())))
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

pub struct Trace {
    info: ComponentInfo,
}

impl Trace {
    pub fn new() -> Self {
        Self {
            info: ComponentInfo::new("Trace", "tr", &["scalar", "linear"]),
        }
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Trace {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Reducer for Trace {
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction> {
        per_slice(&data, |m| Ok(m.diag().sum()))
    }
}

// ---------------------------------------------------------------------------
// Diag
// ---------------------------------------------------------------------------

/// Leading entries of the diagonal: `num_values` values per matrix.
pub struct Diag {
    info: ComponentInfo,
    num_values: usize,
}

impl Diag {
    pub fn from_params(params: &Params) -> ConfigResult<Self> {
        Ok(Self {
            info: ComponentInfo::new("Diagonal", "diag", &["vector"]),
            num_values: params.usize("num_values")?,
        })
    }

    fn leading(&self, m: ArrayView2<'_, f64>) -> ComputeResult<Vec<f64>> {
        let diag = m.diag();
        if self.num_values > diag.len() {
            return Err(ComputeError::Shape(format!(
                "requested {} diagonal values from a {}x{} matrix",
                self.num_values,
                m.nrows(),
                m.ncols()
            )));
        }
        Ok(diag.iter().take(self.num_values).copied().collect())
    }
}

impl Component for Diag {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Reducer for Diag {
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction> {
        match data.ndim() {
            2 => Ok(Reduction::Vector(self.leading(data.view().into_dimensionality::<Ix2>()?)?)),
            3 => {
                let steps = data.len_of(Axis(2));
                let mut out = Array2::<f64>::zeros((self.num_values, steps));
                for (k, slice) in data.axis_iter(Axis(2)).enumerate() {
                    let values = self.leading(slice.into_dimensionality::<Ix2>()?)?;
                    for (i, v) in values.into_iter().enumerate() {
                        out[[i, k]] = v;
                    }
                }
                Ok(Reduction::Array(out.into_dyn()))
            }
            n => Err(ComputeError::Shape(format!("diagonal of a {n}-dimensional array"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Moment
// ---------------------------------------------------------------------------

/// Moments of all entries: the first is the mean, higher orders are central.
pub struct Moment {
    info: ComponentInfo,
    moments: Vec<i32>,
}

impl Moment {
    pub fn from_params(params: &Params) -> ConfigResult<Self> {
        let moments = moment_orders(params)?;
        let suffix: Vec<String> = moments.iter().map(|m| m.to_string()).collect();
        Ok(Self {
            info: ComponentInfo::new("Moment", "mom", &["vector", "distribution"])
                .suffixed(&format!(".{}", suffix.join("-"))),
            moments,
        })
    }
}

/// The `moments` parameter as exponents; orders beyond `i32` are rejected.
pub(crate) fn moment_orders(params: &Params) -> ConfigResult<Vec<i32>> {
    params
        .usize_list("moments")?
        .into_iter()
        .map(|k| {
            i32::try_from(k).map_err(|_| ConfigError::InvalidParameter {
                param: "moments".to_string(),
                expected: "moment orders that fit in 32 bits",
                found: k.to_string(),
            })
        })
        .collect()
}

pub(crate) fn moment(values: &[f64], order: i32) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    match order {
        0 => 1.0,
        1 => mean,
        k => values.iter().map(|v| (v - mean).powi(k)).sum::<f64>() / n,
    }
}

impl Component for Moment {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Reducer for Moment {
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction> {
        if data.is_empty() {
            return Err(ComputeError::Shape("moments of an empty array".into()));
        }
        let values: Vec<f64> = data.iter().copied().collect();
        Ok(Reduction::Vector(
            self.moments.iter().map(|&k| moment(&values, k)).collect(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Determinant
// ---------------------------------------------------------------------------

/// `scaled` takes the p-th root, keeping the sign: comparable across sizes.
pub struct Determinant {
    info: ComponentInfo,
    scaled: bool,
}

impl Determinant {
    pub fn from_params(params: &Params) -> ConfigResult<Self> {
        let scaled = params.bool("scaled")?;
        let mut info = ComponentInfo::new("Determinant", "det", &["scalar", "linear"]);
        if scaled {
            info = info.suffixed(".scaled");
        }
        Ok(Self { info, scaled })
    }
}

impl Component for Determinant {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Reducer for Determinant {
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction> {
        per_slice(&data, |m| {
            let det = linalg::determinant(m)?;
            if self.scaled && m.nrows() > 0 {
                Ok(det.signum() * det.abs().powf(1.0 / m.nrows() as f64))
            } else {
                Ok(det)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Mean
// ---------------------------------------------------------------------------

pub struct Mean {
    info: ComponentInfo,
}

impl Mean {
    pub fn new() -> Self {
        Self {
            info: ComponentInfo::new("Mean", "mean", &["scalar"]),
        }
    }
}

impl Default for Mean {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Mean {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Reducer for Mean {
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction> {
        data.mean()
            .map(Reduction::Scalar)
            .ok_or_else(|| ComputeError::Shape("mean of an empty array".into()))
    }
}
