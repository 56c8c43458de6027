//! `rusty_spoc.statistics.basic`: covariance-family and correlation statistics.

use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Ix2};

use super::linalg;
use crate::component::{
    ComparisonAxis, Component, ComponentInfo, Contract, PairwiseMeasure, PairwiseStatistic,
    ParamSchema, Params, Statistic,
};
use crate::error::{ComputeError, ComputeResult, ConfigError, ConfigResult};
use crate::registry::{ModuleOrigin, Namespace};

pub const PACKAGE: &str = "rusty_spoc.statistics.basic";

/// Shrinkage intensity of the `ShrunkCovariance` estimator.
const SHRINKAGE: f64 = 0.1;

pub fn namespace() -> Namespace {
    let covariance_schema = || {
        ParamSchema::new()
            .optional("estimator", "EmpiricalCovariance")
            .optional("squared", false)
    };
    let correlation_schema = || ParamSchema::new().required("squared").optional("dim", "p");

    Namespace::with_origin(PACKAGE, ModuleOrigin::Package)
        .with_abstract_bases()
        .statistic("Covariance", covariance_schema(), |p| {
            Ok(Box::new(Covariance::from_params(p, CovarianceKind::Covariance, Contract::Static)?))
        })
        .statistic("DynamicCovariance", covariance_schema(), |p| {
            Ok(Box::new(Covariance::from_params(p, CovarianceKind::Covariance, Contract::Dynamic)?))
        })
        .statistic("Precision", covariance_schema(), |p| {
            Ok(Box::new(Covariance::from_params(p, CovarianceKind::Precision, Contract::Static)?))
        })
        .statistic("PearsonR", correlation_schema(), |p| {
            correlation(p, Correlation::Pearson, Contract::Static)
        })
        .statistic("SpearmanR", correlation_schema(), |p| {
            correlation(p, Correlation::Spearman, Contract::Static)
        })
        .statistic("KendallTau", correlation_schema(), |p| {
            correlation(p, Correlation::Kendall, Contract::Static)
        })
        .statistic(
            "DynamicPearsonR",
            ParamSchema::new().optional("squared", false).optional("dim", "p"),
            |p| correlation(p, Correlation::Pearson, Contract::Dynamic),
        )
}

/// Adds `.sq` and the `unsigned` label for squared statistics, `signed` otherwise.
pub(crate) fn signed_info(info: ComponentInfo, squared: bool) -> ComponentInfo {
    if squared {
        info.suffixed(".sq").label("unsigned")
    } else {
        info.label("signed")
    }
}

// ---------------------------------------------------------------------------
// Covariance family
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimator {
    Empirical,
    Shrunk,
}

impl Estimator {
    fn parse(name: &str) -> ConfigResult<Self> {
        match name {
            "EmpiricalCovariance" => Ok(Estimator::Empirical),
            "ShrunkCovariance" => Ok(Estimator::Shrunk),
            other => Err(ConfigError::InvalidParameter {
                param: "estimator".to_string(),
                expected: "EmpiricalCovariance or ShrunkCovariance",
                found: other.to_string(),
            }),
        }
    }

    fn fit(&self, data: ArrayViewD<'_, f64>) -> ComputeResult<Array2<f64>> {
        let data = data.into_dimensionality::<Ix2>().map_err(|_| {
            ComputeError::Shape(
                "covariance needs n x p data; use DynamicCovariance for time series".into(),
            )
        })?;
        let cov = linalg::covariance(data)?;
        match self {
            Estimator::Empirical => Ok(cov),
            Estimator::Shrunk => {
                let n = cov.nrows();
                let mu = cov.diag().sum() / n.max(1) as f64;
                Ok(cov * (1.0 - SHRINKAGE) + Array2::<f64>::eye(n) * (SHRINKAGE * mu))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovarianceKind {
    Covariance,
    Precision,
}

pub struct Covariance {
    info: ComponentInfo,
    kind: CovarianceKind,
    estimator: Estimator,
    squared: bool,
    contract: Contract,
}

impl Covariance {
    pub fn from_params(
        params: &Params,
        kind: CovarianceKind,
        contract: Contract,
    ) -> ConfigResult<Self> {
        let squared = params.bool("squared")?;
        let labels = ["basic", "unordered", "linear"];
        let info = match kind {
            CovarianceKind::Covariance => ComponentInfo::new("Covariance", "cov", &labels),
            CovarianceKind::Precision => ComponentInfo::new("Precision", "prec", &labels),
        };
        Ok(Self {
            info: signed_info(info, squared),
            kind,
            estimator: Estimator::parse(params.str("estimator")?)?,
            squared,
            contract,
        })
    }
}

impl Component for Covariance {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Statistic for Covariance {
    fn contract(&self) -> Contract {
        self.contract
    }

    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<ArrayD<f64>> {
        let cov = self.estimator.fit(data.view())?;
        let mut out = match self.kind {
            CovarianceKind::Covariance => cov,
            CovarianceKind::Precision => linalg::inverse(cov.view())?,
        };
        if self.squared {
            out.mapv_inplace(|v| v * v);
        }
        Ok(out.into_dyn())
    }
}

// ---------------------------------------------------------------------------
// Correlations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    Pearson,
    Spearman,
    Kendall,
}

pub struct CorrelationMeasure {
    info: ComponentInfo,
    method: Correlation,
    squared: bool,
}

impl CorrelationMeasure {
    pub fn new(method: Correlation, squared: bool) -> Self {
        let info = match method {
            Correlation::Pearson => ComponentInfo::new(
                "Pearson's correlation coefficient",
                "pearsonr",
                &["basic", "linear", "undirected"],
            ),
            Correlation::Spearman => ComponentInfo::new(
                "Spearman's correlation coefficient",
                "spearmanr",
                &["basic", "rank", "linear", "undirected"],
            ),
            Correlation::Kendall => ComponentInfo::new(
                "Kendall's tau",
                "kendalltau",
                &["basic", "unordered", "rank", "linear", "undirected"],
            ),
        };
        Self {
            info: signed_info(info, squared),
            method,
            squared,
        }
    }
}

/// Pairwise measures see whole slices; correlations treat them as flat series.
pub(crate) fn flatten(view: ArrayViewD<'_, f64>) -> Array1<f64> {
    view.iter().copied().collect()
}

impl PairwiseMeasure for CorrelationMeasure {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn pairwise_compute(
        &self,
        x: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> ComputeResult<f64> {
        let (x, y) = (flatten(x), flatten(y));
        let corr = match self.method {
            Correlation::Pearson => linalg::pearson(x.view(), y.view())?,
            Correlation::Spearman => {
                let (rx, ry) = (linalg::ranks(x.view()), linalg::ranks(y.view()));
                linalg::pearson(rx.view(), ry.view())?
            }
            Correlation::Kendall => linalg::kendall_tau_b(x.view(), y.view())?,
        };
        Ok(if self.squared { corr * corr } else { corr })
    }
}

fn correlation(
    params: &Params,
    method: Correlation,
    contract: Contract,
) -> ConfigResult<Box<dyn Statistic>> {
    let measure = CorrelationMeasure::new(method, params.bool("squared")?);
    let axis = ComparisonAxis::parse(params.str("dim")?)?;
    Ok(Box::new(PairwiseStatistic::with_contract(measure, axis, false, contract)?))
}
