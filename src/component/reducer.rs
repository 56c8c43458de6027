use ndarray::{Array1, ArrayD, ArrayView2, Axis, Ix2};

use super::Component;
use crate::error::{ComputeError, ComputeResult};

/// Output of a reducer before it is stored: scalars and vectors are wrapped
/// into arrays by [`Reduction::into_array`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction {
    Scalar(f64),
    Vector(Vec<f64>),
    Array(ArrayD<f64>),
}

impl Reduction {
    pub fn into_array(self) -> ArrayD<f64> {
        match self {
            Reduction::Scalar(v) => Array1::from(vec![v]).into_dyn(),
            Reduction::Vector(v) => Array1::from(v).into_dyn(),
            Reduction::Array(a) => a,
        }
    }
}

impl From<f64> for Reduction {
    fn from(v: f64) -> Self {
        Reduction::Scalar(v)
    }
}

impl From<Vec<f64>> for Reduction {
    fn from(v: Vec<f64>) -> Self {
        Reduction::Vector(v)
    }
}

impl From<ArrayD<f64>> for Reduction {
    fn from(a: ArrayD<f64>) -> Self {
        Reduction::Array(a)
    }
}

/// Summarises a statistic's output. Receives its own copy of that output.
pub trait Reducer: Component {
    fn compute(&self, data: ArrayD<f64>) -> ComputeResult<Reduction>;
}

/// Apply a matrix summary to a p×p result, or to every slice of a p×p×t
/// result (giving one value per time step).
pub fn per_slice<F>(data: &ArrayD<f64>, f: F) -> ComputeResult<Reduction>
where
    F: Fn(ArrayView2<'_, f64>) -> ComputeResult<f64>,
{
    match data.ndim() {
        2 => {
            let matrix = data.view().into_dimensionality::<Ix2>()?;
            Ok(Reduction::Scalar(f(matrix)?))
        }
        3 => {
            let mut values = Vec::with_capacity(data.len_of(Axis(2)));
            for slice in data.axis_iter(Axis(2)) {
                values.push(f(slice.into_dimensionality::<Ix2>()?)?);
            }
            Ok(Reduction::Vector(values))
        }
        n => Err(ComputeError::Shape(format!(
            "expected a matrix or a stack of matrices, got {n} dimensions"
        ))),
    }
}
