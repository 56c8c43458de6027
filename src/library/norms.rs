//! `rusty_spoc.reducers.norms`: matrix norms.

use ndarray::{ArrayD, ArrayView2, Axis};

use super::linalg;
use crate::component::reducer::per_slice;
use crate::component::{
    Component, ComponentInfo, ParamSchema, ParamValue, Params, Reducer, Reduction,
};
use crate::error::{ComputeError, ComputeResult, ConfigError, ConfigResult};
use crate::registry::{ModuleOrigin, Namespace};

pub const PACKAGE: &str = "rusty_spoc.reducers.norms";

pub fn namespace() -> Namespace {
    Namespace::with_origin(PACKAGE, ModuleOrigin::Package)
        .with_abstract_bases()
        .reducer("Norm", ParamSchema::new().required("order"), |p| {
            Ok(Box::new(Norm::from_params(p)?))
        })
        .reducer(
            "EntryWiseMatrixNorm",
            ParamSchema::new().required("p").required("q"),
            |p| Ok(Box::new(EntryWiseMatrixNorm::from_params(p)?)),
        )
        .reducer("SchattenNorm", ParamSchema::new().required("p"), |p| {
            Ok(Box::new(SchattenNorm::from_params(p)?))
        })
}

// ---------------------------------------------------------------------------
// Norm
// ---------------------------------------------------------------------------

/// Matrix norm orders, named as in the usual `ord` convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormOrder {
    Frobenius,
    Nuclear,
    /// Largest entry in absolute value.
    Max,
    /// Max (or min, when negative) absolute column sum.
    Column { max: bool },
    /// Max (or min) absolute row sum.
    Row { max: bool },
    /// Largest (or smallest) singular value.
    Spectral { max: bool },
}

impl NormOrder {
    pub fn parse(value: &ParamValue) -> ConfigResult<Self> {
        let order = match value {
            ParamValue::String(s) => match s.as_str() {
                "fro" => Some(NormOrder::Frobenius),
                "nuc" => Some(NormOrder::Nuclear),
                "max" => Some(NormOrder::Max),
                "inf" => Some(NormOrder::Row { max: true }),
                "-inf" => Some(NormOrder::Row { max: false }),
                _ => None,
            },
            ParamValue::Integer(1) => Some(NormOrder::Column { max: true }),
            ParamValue::Integer(-1) => Some(NormOrder::Column { max: false }),
            ParamValue::Integer(2) => Some(NormOrder::Spectral { max: true }),
            ParamValue::Integer(-2) => Some(NormOrder::Spectral { max: false }),
            _ => None,
        };
        order.ok_or_else(|| ConfigError::InvalidParameter {
            param: "order".to_string(),
            expected: "one of fro, nuc, max, inf, -inf, 1, -1, 2, -2",
            found: value.to_string(),
        })
    }

    fn apply(&self, m: ArrayView2<'_, f64>) -> ComputeResult<f64> {
        let pick = |values: Vec<f64>, max: bool| {
            let fold = if max { f64::max } else { f64::min };
            let start = if max { f64::NEG_INFINITY } else { f64::INFINITY };
            values.into_iter().fold(start, fold)
        };
        let abs_sums = |axis: Axis| m.mapv(f64::abs).sum_axis(axis).to_vec();

        Ok(match *self {
            NormOrder::Frobenius => m.iter().map(|v| v * v).sum::<f64>().sqrt(),
            NormOrder::Nuclear => linalg::singular_values(m)?.into_iter().sum(),
            NormOrder::Max => m.iter().fold(0.0, |acc, v| acc.max(v.abs())),
            NormOrder::Column { max } => pick(abs_sums(Axis(0)), max),
            NormOrder::Row { max } => pick(abs_sums(Axis(1)), max),
            NormOrder::Spectral { max } => pick(linalg::singular_values(m)?, max),
        })
    }
}

pub struct Norm {
    info: ComponentInfo,
    order: NormOrder,
}

impl Norm {
    pub fn from_params(params: &Params) -> ConfigResult<Self> {
        let value = params.get("order").cloned().unwrap_or(ParamValue::Null);
        Ok(Self {
            info: ComponentInfo::new("Norm", "norm", &["scalar"]),
            order: NormOrder::parse(&value)?,
        })
    }
}

impl Component for Norm {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Reducer for Norm {
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction> {
        per_slice(&data, |m| self.order.apply(m))
    }
}

// ---------------------------------------------------------------------------
// Entry-wise L_{p,q}
// ---------------------------------------------------------------------------

pub struct EntryWiseMatrixNorm {
    info: ComponentInfo,
    p: f64,
    q: f64,
}

impl EntryWiseMatrixNorm {
    pub fn from_params(params: &Params) -> ConfigResult<Self> {
        let (p, q) = (params.f64("p")?, params.f64("q")?);
        if p <= 0.0 || q <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                param: "p, q".to_string(),
                expected: "positive numbers",
                found: format!("{p}, {q}"),
            });
        }
        Ok(Self {
            info: ComponentInfo::new("Entry Wise Norm (L_p,q)", "ew-norm", &["scalar"]),
            p,
            q,
        })
    }
}

impl Component for EntryWiseMatrixNorm {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Reducer for EntryWiseMatrixNorm {
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction> {
        per_slice(&data, |m| {
            let inner = m.mapv(|v| v.abs().powf(self.p)).sum_axis(Axis(1));
            let outer: f64 = inner.iter().map(|s| s.powf(self.q / self.p)).sum();
            Ok(outer.powf(1.0 / self.q))
        })
    }
}

// ---------------------------------------------------------------------------
// Schatten p-norm
// ---------------------------------------------------------------------------

pub struct SchattenNorm {
    info: ComponentInfo,
    p: f64,
}

impl SchattenNorm {
    pub fn from_params(params: &Params) -> ConfigResult<Self> {
        let p = params.f64("p")?;
        if p <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                param: "p".to_string(),
                expected: "a positive number",
                found: p.to_string(),
            });
        }
        Ok(Self {
            info: ComponentInfo::new("Schatten Norm", "sch-norm", &["scalar"]),
            p,
        })
    }
}

impl Component for SchattenNorm {
    fn info(&self) -> &ComponentInfo {
        &self.info
    }
}

impl Reducer for SchattenNorm {
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction> {
        per_slice(&data, |m| {
            let sum: f64 = linalg::singular_values(m)?
                .into_iter()
                .map(|s| s.powf(self.p))
                .sum();
            if !sum.is_finite() {
                return Err(ComputeError::Numeric("singular values overflowed".into()));
            }
            Ok(sum.powf(1.0 / self.p))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn scalar(r: Reduction) -> f64 {
        match r {
            Reduction::Scalar(v) => v,
            other => panic!("expected a scalar, got {other:?}"),
        }
    }

    fn norm(order: impl Into<ParamValue>) -> Norm {
        Norm::from_params(&Params::new().with("order", order)).unwrap()
    }

    #[test]
    fn standard_orders() {
        let m = array![[1.0, -2.0], [3.0, 4.0]].into_dyn();
        assert!((scalar(norm("fro").compute(m.clone()).unwrap()) - 30f64.sqrt()).abs() < 1e-12);
        assert_eq!(scalar(norm(1i64).compute(m.clone()).unwrap()), 6.0);
        assert_eq!(scalar(norm(-1i64).compute(m.clone()).unwrap()), 4.0);
        assert_eq!(scalar(norm("inf").compute(m.clone()).unwrap()), 7.0);
        assert_eq!(scalar(norm("max").compute(m).unwrap()), 4.0);
    }

    #[test]
    fn spectral_and_nuclear_norms_of_a_diagonal_matrix() {
        let m = array![[3.0, 0.0], [0.0, -2.0]].into_dyn();
        assert!((scalar(norm(2i64).compute(m.clone()).unwrap()) - 3.0).abs() < 1e-9);
        assert!((scalar(norm(-2i64).compute(m.clone()).unwrap()) - 2.0).abs() < 1e-9);
        assert!((scalar(norm("nuc").compute(m).unwrap()) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn unsupported_order_is_a_configuration_error() {
        let err = Norm::from_params(&Params::new().with("order", 7i64)).err();
        assert!(matches!(err, Some(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn entry_wise_l22_is_frobenius() {
        let params = Params::new().with("p", 2i64).with("q", 2i64);
        let ew = EntryWiseMatrixNorm::from_params(&params).unwrap();
        let m = array![[1.0, -2.0], [3.0, 4.0]].into_dyn();
        assert!((scalar(ew.compute(m).unwrap()) - 30f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn schatten_one_is_nuclear() {
        let sch = SchattenNorm::from_params(&Params::new().with("p", 1i64)).unwrap();
        let m = array![[3.0, 0.0], [0.0, -2.0]].into_dyn();
        assert!((scalar(sch.compute(m).unwrap()) - 5.0).abs() < 1e-9);
    }
}
