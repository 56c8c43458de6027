//! Small dense linear-algebra and rank helpers used by the built-in library.

use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{ComputeError, ComputeResult};

const PIVOT_EPS: f64 = 1e-12;
const JACOBI_MAX_SWEEPS: usize = 100;

/// Population covariance (1/n) of an n×p matrix, giving p×p.
pub fn covariance(data: ArrayView2<'_, f64>) -> ComputeResult<Array2<f64>> {
    let n = data.nrows();
    if n == 0 {
        return Err(ComputeError::Shape("covariance of zero realisations".into()));
    }
    let mean = data.sum_axis(Axis(0)) / n as f64;
    let centred = &data - &mean;
    Ok(centred.t().dot(&centred) / n as f64)
}

fn require_square(m: ArrayView2<'_, f64>, what: &str) -> ComputeResult<usize> {
    let (rows, cols) = m.dim();
    if rows != cols {
        return Err(ComputeError::Shape(format!("{what} of a non-square {rows}x{cols} matrix")));
    }
    Ok(rows)
}

/// Inverse by Gauss-Jordan elimination with partial pivoting.
pub fn inverse(m: ArrayView2<'_, f64>) -> ComputeResult<Array2<f64>> {
    let n = require_square(m, "inverse")?;
    let mut a = m.to_owned();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < PIVOT_EPS {
            return Err(ComputeError::Numeric("matrix is singular".into()));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
                inv.swap([pivot, k], [col, k]);
            }
        }

        let scale = a[[col, col]];
        a.row_mut(col).mapv_inplace(|v| v / scale);
        inv.row_mut(col).mapv_inplace(|v| v / scale);

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[row, k]] -= factor * a[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Ok(inv)
}

/// Determinant by LU decomposition with partial pivoting.
pub fn determinant(m: ArrayView2<'_, f64>) -> ComputeResult<f64> {
    let n = require_square(m, "determinant")?;
    let mut a = m.to_owned();
    let mut det = 1.0;

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]] == 0.0 {
            return Ok(0.0);
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            det = -det;
        }
        det *= a[[col, col]];
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
        }
    }
    Ok(det)
}

/// Eigenvalues of a symmetric matrix by cyclic Jacobi rotations, largest first.
pub fn symmetric_eigenvalues(m: ArrayView2<'_, f64>) -> ComputeResult<Vec<f64>> {
    let n = require_square(m, "eigen-decomposition")?;
    let mut a = m.to_owned();

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| a[[i, j]].powi(2))
            .sum();
        if off < 1e-22 {
            break;
        }
        for p in 0..n {
            for q in p + 1..n {
                if a[[p, q]].abs() < 1e-300 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * a[[p, q]]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
            }
        }
    }

    let mut values: Vec<f64> = a.diag().to_vec();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ComputeError::Numeric("eigenvalues did not converge".into()));
    }
    values.sort_by(|x, y| y.total_cmp(x));
    Ok(values)
}

/// Singular values of any matrix, largest first.
pub fn singular_values(m: ArrayView2<'_, f64>) -> ComputeResult<Vec<f64>> {
    let gram = m.t().dot(&m);
    Ok(symmetric_eigenvalues(gram.view())?
        .into_iter()
        .map(|v| v.max(0.0).sqrt())
        .collect())
}

/// Ranks starting at 1; ties share their average rank.
pub fn ranks(x: ArrayView1<'_, f64>) -> Array1<f64> {
    let mut order: Vec<usize> = (0..x.len()).collect();
    order.sort_by(|&i, &j| x[i].total_cmp(&x[j]));

    let mut ranks = Array1::<f64>::zeros(x.len());
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && x[order[end]] == x[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

fn require_same_length(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> ComputeResult<usize> {
    if x.len() != y.len() {
        return Err(ComputeError::Shape(format!(
            "cannot compare series of length {} and {}",
            x.len(),
            y.len()
        )));
    }
    Ok(x.len())
}

/// Pearson correlation. Zero-variance inputs yield NaN.
pub fn pearson(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> ComputeResult<f64> {
    let n = require_same_length(x, y)? as f64;
    if n == 0.0 {
        return Ok(f64::NAN);
    }
    let (mx, my) = (x.sum() / n, y.sum() / n);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    Ok(sxy / (sxx * syy).sqrt())
}

/// Kendall's tau-b, which corrects for ties in either series.
pub fn kendall_tau_b(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> ComputeResult<f64> {
    let n = require_same_length(x, y)?;
    let mut concordant = 0i64;
    let mut discordant = 0i64;
    let mut ties_x = 0i64;
    let mut ties_y = 0i64;

    for i in 0..n {
        for j in i + 1..n {
            match (x[i].total_cmp(&x[j]), y[i].total_cmp(&y[j])) {
                (Ordering::Equal, Ordering::Equal) => {}
                (Ordering::Equal, _) => ties_x += 1,
                (_, Ordering::Equal) => ties_y += 1,
                (dx, dy) if dx == dy => concordant += 1,
                _ => discordant += 1,
            }
        }
    }

    let untied_x = (concordant + discordant + ties_y) as f64;
    let untied_y = (concordant + discordant + ties_x) as f64;
    Ok((concordant - discordant) as f64 / (untied_x * untied_y).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, array};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn covariance_uses_population_normalisation() {
        let data = array![[1.0, 2.0], [3.0, 6.0]];
        let cov = covariance(data.view()).unwrap();
        assert_eq!(cov, array![[1.0, 2.0], [2.0, 4.0]]);
    }

    #[test]
    fn inverse_and_determinant_agree() {
        let m = array![[4.0, 7.0], [2.0, 6.0]];
        assert!(close(determinant(m.view()).unwrap(), 10.0));
        let inv = inverse(m.view()).unwrap();
        let identity = m.dot(&inv);
        for ((i, j), v) in identity.indexed_iter() {
            assert!(close(*v, if i == j { 1.0 } else { 0.0 }));
        }
        assert!(matches!(
            inverse(array![[1.0, 2.0], [2.0, 4.0]].view()),
            Err(ComputeError::Numeric(_))
        ));
    }

    #[test]
    fn jacobi_recovers_known_eigenvalues() {
        let m = array![[2.0, 1.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 5.0]];
        let values = symmetric_eigenvalues(m.view()).unwrap();
        assert!(close(values[0], 5.0));
        assert!(close(values[1], 3.0));
        assert!(close(values[2], 1.0));
    }

    #[test]
    fn ties_share_average_ranks() {
        let r = ranks(arr1(&[10.0, 20.0, 10.0, 30.0]).view());
        assert_eq!(r, arr1(&[1.5, 3.0, 1.5, 4.0]));
    }

    #[test]
    fn correlation_measures() {
        let x = arr1(&[1.0, 2.0, 3.0, 4.0]);
        let y = arr1(&[2.0, 4.0, 6.0, 8.0]);
        assert!(close(pearson(x.view(), y.view()).unwrap(), 1.0));
        let rev = arr1(&[4.0, 3.0, 2.0, 1.0]);
        assert!(close(kendall_tau_b(x.view(), rev.view()).unwrap(), -1.0));
        assert!(pearson(x.view(), arr1(&[1.0]).view()).is_err());
    }
}
