//! Small dense linear algebra for p x p normal equations
//!
//! Design matrices here have one column per level of a single factor, so the
//! systems are tiny and a hand-written Cholesky is all that is needed.

use ndarray::Array2;

/// X' diag(w) X
pub(crate) fn weighted_crossprod(design: &Array2<f64>, weights: &[f64]) -> Array2<f64> {
    let p = design.ncols();
    let mut xtwx = Array2::zeros((p, p));
    for (i, row) in design.outer_iter().enumerate() {
        let w = weights[i];
        for j in 0..p {
            let xj = row[j];
            if xj == 0.0 {
                continue;
            }
            for k in 0..p {
                xtwx[[j, k]] += w * xj * row[k];
            }
        }
    }
    xtwx
}

/// X' diag(w) z
pub(crate) fn weighted_crossprod_vec(design: &Array2<f64>, weights: &[f64], z: &[f64]) -> Vec<f64> {
    let p = design.ncols();
    let mut out = vec![0.0; p];
    for (i, row) in design.outer_iter().enumerate() {
        let wz = weights[i] * z[i];
        for j in 0..p {
            out[j] += row[j] * wz;
        }
    }
    out
}

/// Lower-triangular Cholesky factor; `None` unless `a` is positive definite.
pub(crate) fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn cholesky_solve(l: &Array2<f64>, b: &[f64]) -> Vec<f64> {
    let n = l.nrows();
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[[i, j]] * y[j];
        }
        y[i] = sum / l[[i, i]];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[[j, i]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Solve A x = b for symmetric positive definite A
pub(crate) fn solve_symmetric(a: &Array2<f64>, b: &[f64]) -> Option<Vec<f64>> {
    let l = cholesky(a)?;
    Some(cholesky_solve(&l, b))
}

/// Inverse of a symmetric positive definite matrix
pub(crate) fn invert_symmetric(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let l = cholesky(a)?;
    let mut inv = Array2::zeros((n, n));
    let mut e = vec![0.0; n];
    for i in 0..n {
        e.iter_mut().for_each(|v| *v = 0.0);
        e[i] = 1.0;
        let col = cholesky_solve(&l, &e);
        for j in 0..n {
            inv[[j, i]] = col[j];
        }
    }
    Some(inv)
}

/// log|A| for symmetric positive definite A
pub(crate) fn log_determinant_symmetric(a: &Array2<f64>) -> Option<f64> {
    let l = cholesky(a)?;
    Some(2.0 * l.diag().iter().map(|d| d.ln()).sum::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve_and_invert() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let x = solve_symmetric(&a, &[2.0, 1.0]).unwrap();
        // 4x + 2y = 2, 2x + 3y = 1 -> x = 0.5, y = 0
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);

        let inv = invert_symmetric(&a).unwrap();
        let prod = a.dot(&inv);
        assert!((prod[[0, 0]] - 1.0).abs() < 1e-12);
        assert!(prod[[0, 1]].abs() < 1e-12);
    }

    #[test]
    fn test_log_determinant() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        assert!((log_determinant_symmetric(&a).unwrap() - 8f64.ln()).abs() < 1e-12);
        assert!(cholesky(&array![[1.0, 2.0], [2.0, 1.0]]).is_none());
    }

    #[test]
    fn test_weighted_crossprod() {
        let x = array![[1.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        let xtwx = weighted_crossprod(&x, &[1.0, 2.0, 3.0]);
        assert_eq!(xtwx, array![[6.0, 3.0], [3.0, 3.0]]);
        let xtwz = weighted_crossprod_vec(&x, &[1.0, 2.0, 3.0], &[1.0, 1.0, 2.0]);
        assert_eq!(xtwz, vec![9.0, 6.0]);
    }
}
