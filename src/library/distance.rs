//! `rusty_spoc.statistics.distance`: distances and directed model-fit errors.

use ndarray::{ArrayView1, ArrayViewD};

use super::statistics::flatten;
use crate::component::{
    ComparisonAxis, ComponentInfo, PairwiseMeasure, PairwiseStatistic, ParamSchema, Params,
    Statistic,
};
use crate::error::{ComputeError, ComputeResult, ConfigError, ConfigResult};
use crate::registry::{ModuleOrigin, Namespace};

pub const PACKAGE: &str = "rusty_spoc.statistics.distance";

pub fn namespace() -> Namespace {
    Namespace::with_origin(PACKAGE, ModuleOrigin::Package)
        .with_abstract_bases()
        .statistic(
            "PairwiseDistance",
            ParamSchema::new().optional("metric", "euclidean").optional("dim", "p"),
            |p| {
                let measure = Distance::new(Metric::parse(p.str("metric")?)?);
                pairwise(measure, p)
            },
        )
        .statistic("LinearFit", ParamSchema::new().optional("dim", "p"), |p| {
            pairwise(LinearFit::new(), p)
        })
}

fn pairwise<M: PairwiseMeasure + 'static>(
    measure: M,
    params: &Params,
) -> ConfigResult<Box<dyn Statistic>> {
    let axis = ComparisonAxis::parse(params.str("dim")?)?;
    Ok(Box::new(PairwiseStatistic::new(measure, axis, false)))
}

fn same_length(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> ComputeResult<()> {
    if x.len() != y.len() {
        return Err(ComputeError::Shape(format!(
            "cannot compare series of length {} and {}",
            x.len(),
            y.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PairwiseDistance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Euclidean,
    Manhattan,
    Chebyshev,
    Cosine,
}

impl Metric {
    pub fn parse(name: &str) -> ConfigResult<Self> {
        match name {
            "euclidean" => Ok(Metric::Euclidean),
            "manhattan" | "cityblock" => Ok(Metric::Manhattan),
            "chebyshev" => Ok(Metric::Chebyshev),
            "cosine" => Ok(Metric::Cosine),
            other => Err(ConfigError::InvalidParameter {
                param: "metric".to_string(),
                expected: "euclidean, manhattan, chebyshev or cosine",
                found: other.to_string(),
            }),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
            Metric::Chebyshev => "chebyshev",
            Metric::Cosine => "cosine",
        }
    }
}

pub struct Distance {
    info: ComponentInfo,
    metric: Metric,
}

impl Distance {
    pub fn new(metric: Metric) -> Self {
        let labels = ["distance", "unsigned", "unordered", "undirected"];
        let info = ComponentInfo::new("Pairwise distance", "pdist", &labels)
            .suffixed(&format!(".{}", metric.as_str()));
        Self { info, metric }
    }
}

impl PairwiseMeasure for Distance {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn pairwise_compute(
        &self,
        x: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> ComputeResult<f64> {
        let (x, y) = (flatten(x), flatten(y));
        same_length(x.view(), y.view())?;
        let diffs = x.iter().zip(y.iter()).map(|(a, b)| (a - b).abs());
        Ok(match self.metric {
            Metric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            Metric::Manhattan => diffs.sum(),
            Metric::Chebyshev => diffs.fold(0.0, f64::max),
            Metric::Cosine => {
                let norm = |v: &ndarray::Array1<f64>| v.dot(v).sqrt();
                1.0 - x.dot(&y) / (norm(&x) * norm(&y))
            }
        })
    }
}

// ---------------------------------------------------------------------------
// LinearFit
// ---------------------------------------------------------------------------

/// Mean squared residual of an ordinary least-squares fit of `y` on `x`.
/// Directed: regressing `y` on `x` differs from regressing `x` on `y`.
pub struct LinearFit {
    info: ComponentInfo,
}

impl LinearFit {
    pub fn new() -> Self {
        Self {
            info: ComponentInfo::new(
                "Linear model regression",
                "lmfit",
                &["misc", "unsigned", "unordered", "normal", "linear", "directed"],
            ),
        }
    }
}

impl Default for LinearFit {
    fn default() -> Self {
        Self::new()
    }
}

impl PairwiseMeasure for LinearFit {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }

    fn pairwise_compute(
        &self,
        x: ArrayViewD<'_, f64>,
        y: ArrayViewD<'_, f64>,
    ) -> ComputeResult<f64> {
        let (x, y) = (flatten(x), flatten(y));
        same_length(x.view(), y.view())?;
        let n = x.len() as f64;
        if n == 0.0 {
            return Err(ComputeError::Shape("cannot fit a model to empty series".into()));
        }

        let (mx, my) = (x.sum() / n, y.sum() / n);
        let sxx: f64 = x.iter().map(|a| (a - mx).powi(2)).sum();
        let sxy: f64 = x.iter().zip(y.iter()).map(|(a, b)| (a - mx) * (b - my)).sum();
        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        let intercept = my - slope * mx;

        let sse: f64 = x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| (b - (intercept + slope * a)).powi(2))
            .sum();
        Ok(sse / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn euclidean_distance_matrix_is_symmetric_with_zero_diagonal() {
        let p = Params::new().with("metric", "euclidean").with("dim", "p");
        let stat = pairwise(Distance::new(Metric::Euclidean), &p).unwrap();
        let out = stat.compute(array![[0.0, 3.0], [0.0, 4.0]].into_dyn()).unwrap();
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[0, 1]], 5.0);
        assert_eq!(out[[1, 0]], 5.0);
    }

    #[test]
    fn linear_fit_is_directed() {
        let p = Params::new().with("dim", "p");
        let stat = pairwise(LinearFit::new(), &p).unwrap();
        let data = array![[0.0, 1.0], [1.0, 0.0], [2.0, 3.0], [3.0, 2.0], [4.0, 9.0]].into_dyn();
        let out = stat.compute(data).unwrap();
        assert!(out[[0, 0]].abs() < 1e-12);
        assert!((out[[0, 1]] - out[[1, 0]]).abs() > 1e-6);
    }

    #[test]
    fn unknown_metric_is_rejected() {
        assert!(Metric::parse("mahalanobis").is_err());
        assert_eq!(Distance::new(Metric::Cosine).info().identifier, "pdist.cosine");
    }
}
