//! `rusty_spoc.rstatistics.basic`: statistics whose output is already a summary.

use ndarray::{Array1, ArrayD, Axis, Ix2};

use super::linalg;
use super::reducers::{moment, moment_orders};
use crate::component::{Component, ComponentInfo, Contract, ParamSchema, Params, Statistic};
use crate::error::{ComputeError, ComputeResult, ConfigError, ConfigResult};
use crate::registry::{ModuleOrigin, Namespace};

pub const PACKAGE: &str = "rusty_spoc.rstatistics.basic";

pub fn namespace() -> Namespace {
    Namespace::with_origin(PACKAGE, ModuleOrigin::Package)
        .with_abstract_bases()
        .reduced_statistic(
            "PcaVarianceExplainedRatio",
            ParamSchema::new().required("components"),
            |p| Ok(Box::new(PcaVarianceExplainedRatio::from_params(p)?)),
        )
        .reduced_statistic(
            "MarginalMoments",
            ParamSchema::new().optional("moments", vec![1i64, 2]),
            |p| Ok(Box::new(MarginalMoments::from_params(p)?)),
        )
}

// ---------------------------------------------------------------------------
// PCA variance explained
// ---------------------------------------------------------------------------

/// Share of total variance carried by the selected principal components
/// (1-based, as listed).
pub struct PcaVarianceExplainedRatio {
    info: ComponentInfo,
    components: Vec<usize>,
}

impl PcaVarianceExplainedRatio {
    pub fn from_params(params: &Params) -> ConfigResult<Self> {
        let components = params.usize_list("components")?;
        if components.is_empty() || components.contains(&0) {
            return Err(ConfigError::InvalidParameter {
                param: "components".to_string(),
                expected: "a non-empty list of 1-based component indices",
                found: format!("{components:?}"),
            });
        }
        Ok(Self {
            info: ComponentInfo::new(
                "Principal Components Analysis - Variance Explained Ratio",
                "pca-var",
                &["scalar", "linear"],
            ),
            components,
        })
    }
}

impl Component for PcaVarianceExplainedRatio {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Statistic for PcaVarianceExplainedRatio {
    fn contract(&self) -> Contract {
        Contract::Reduced
    }

    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<ArrayD<f64>> {
        let data = data
            .into_dimensionality::<Ix2>()
            .map_err(|_| ComputeError::Shape("PCA needs n x p data".into()))?;
        let cov = linalg::covariance(data.view())?;
        let eigenvalues = linalg::symmetric_eigenvalues(cov.view())?;
        let total: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();
        if total <= 0.0 {
            return Err(ComputeError::Numeric("data has no variance".into()));
        }

        let ratios = self
            .components
            .iter()
            .map(|&c| {
                eigenvalues
                    .get(c - 1)
                    .map(|v| v.max(0.0) / total)
                    .ok_or_else(|| {
                        ComputeError::Shape(format!(
                            "component {c} requested from {} variables",
                            eigenvalues.len()
                        ))
                    })
            })
            .collect::<ComputeResult<Vec<f64>>>()?;
        Ok(Array1::from(ratios).into_dyn())
    }
}

// ---------------------------------------------------------------------------
// Marginal moments
// ---------------------------------------------------------------------------

/// Moments of every variable across realisations, `p x k` before flattening.
pub struct MarginalMoments {
    info: ComponentInfo,
    moments: Vec<i32>,
}

impl MarginalMoments {
    pub fn from_params(params: &Params) -> ConfigResult<Self> {
        Ok(Self {
            info: ComponentInfo::new("Marginal moments", "marg-mom", &["vector", "distribution"]),
            moments: moment_orders(params)?,
        })
    }
}

impl Component for MarginalMoments {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Statistic for MarginalMoments {
    fn contract(&self) -> Contract {
        Contract::Reduced
    }

    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<ArrayD<f64>> {
        if data.ndim() < 2 || data.len_of(Axis(0)) == 0 {
            return Err(ComputeError::Shape("moments need at least one realisation".into()));
        }
        let mut out = Vec::with_capacity(data.len_of(Axis(1)) * self.moments.len());
        for variable in data.axis_iter(Axis(1)) {
            let values: Vec<f64> = variable.iter().copied().collect();
            out.extend(self.moments.iter().map(|&k| moment(&values, k)));
        }
        Ok(Array1::from(out).into_dyn())
    }
}
