//! Small dense linear algebra for normal equations.

/// Row-major square matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    pub fn add(&mut self, i: usize, j: usize, v: f64) {
        self.data[i * self.n + j] += v;
    }

    /// Accumulate `w * x xᵀ`.
    pub fn add_outer(&mut self, x: &[f64], w: f64) {
        for (i, &xi) in x.iter().enumerate() {
            if xi == 0.0 {
                continue;
            }
            let row = &mut self.data[i * self.n..(i + 1) * self.n];
            for (r, &xj) in row.iter_mut().zip(x) {
                *r += w * xi * xj;
            }
        }
    }
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
/// Returns `None` when `A` is singular to working precision.
pub fn solve(a: &Matrix, b: &[f64]) -> Option<Vec<f64>> {
    let n = a.n;
    debug_assert_eq!(b.len(), n);
    if n == 0 {
        return Some(Vec::new());
    }

    let scale = a.data.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    let eps = scale * 1e-12;

    let mut m = a.data.clone();
    let mut rhs = b.to_vec();

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&r1, &r2| {
            m[r1 * n + col].abs().total_cmp(&m[r2 * n + col].abs())
        })?;
        if m[pivot_row * n + col].abs() <= eps {
            return None;
        }
        if pivot_row != col {
            for j in 0..n {
                m.swap(col * n + j, pivot_row * n + j);
            }
            rhs.swap(col, pivot_row);
        }

        let pivot = m[col * n + col];
        for row in col + 1..n {
            let factor = m[row * n + col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                let upper = m[col * n + j];
                m[row * n + j] -= factor * upper;
            }
            let upper_rhs = rhs[col];
            rhs[row] -= factor * upper_rhs;
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = rhs[row];
        for j in row + 1..n {
            acc -= m[row * n + j] * x[j];
        }
        x[row] = acc / m[row * n + row];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_2x2() {
        let mut a = Matrix::zeros(2);
        a.add(0, 0, 2.0);
        a.add(0, 1, 1.0);
        a.add(1, 0, 1.0);
        a.add(1, 1, 3.0);
        let x = solve(&a, &[3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_solve_needs_pivoting() {
        let mut a = Matrix::zeros(2);
        a.add(0, 1, 1.0);
        a.add(1, 0, 1.0);
        let x = solve(&a, &[2.0, 3.0]).unwrap();
        assert_eq!(x, vec![3.0, 2.0]);
    }

    #[test]
    fn test_singular() {
        let mut a = Matrix::zeros(2);
        a.add_outer(&[1.0, 2.0], 1.0);
        assert!(solve(&a, &[1.0, 2.0]).is_none());
        assert!(solve(&Matrix::zeros(3), &[0.0; 3]).is_none());
    }

    #[test]
    fn test_add_outer() {
        let mut a = Matrix::zeros(2);
        a.add_outer(&[1.0, 2.0], 0.5);
        assert_eq!(a.get(0, 1), 1.0);
        assert_eq!(a.get(1, 1), 2.0);
    }
}
