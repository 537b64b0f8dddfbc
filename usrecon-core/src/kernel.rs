//! Dense kernels over flat row-major buffers.
//!
//! All functions assume the caller has already checked dimensions; a length
//! mismatch is a caller bug, not a runtime condition. With the `rayon`
//! feature enabled, `matvec` and `matvec_t` split the work across rows.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Sum of elementwise products.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean norm, `dot(v, v)`.
pub fn norm_sq(v: &[f64]) -> f64 {
    dot(v, v)
}

/// `out[i] = a[i] + scale * b[i]`.
///
/// When the output is one of the inputs use [`axpy_in_place`] or
/// [`xpby_in_place`] instead.
pub fn axpy(out: &mut [f64], a: &[f64], scale: f64, b: &[f64]) {
    debug_assert_eq!(out.len(), a.len());
    debug_assert_eq!(a.len(), b.len());
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x + scale * y;
    }
}

/// `acc[i] = acc[i] + scale * b[i]`, i.e. `axpy` with `out` aliasing `a`.
pub fn axpy_in_place(acc: &mut [f64], scale: f64, b: &[f64]) {
    debug_assert_eq!(acc.len(), b.len());
    for (o, y) in acc.iter_mut().zip(b) {
        *o += scale * y;
    }
}

/// `acc[i] = a[i] + scale * acc[i]`, i.e. `axpy` with `out` aliasing `b`.
pub fn xpby_in_place(acc: &mut [f64], a: &[f64], scale: f64) {
    debug_assert_eq!(acc.len(), a.len());
    for (o, x) in acc.iter_mut().zip(a) {
        *o = x + scale * *o;
    }
}

/// Computes `H v` for a `rows x cols` row-major `h`.
pub fn matvec(h: &[f64], rows: usize, cols: usize, v: &[f64]) -> Vec<f64> {
    debug_assert_eq!(h.len(), rows * cols);
    debug_assert_eq!(v.len(), cols);
    if cols == 0 {
        return vec![0.0; rows];
    }

    #[cfg(feature = "rayon")]
    {
        h.par_chunks_exact(cols).map(|row| dot(row, v)).collect()
    }

    #[cfg(not(feature = "rayon"))]
    {
        h.chunks_exact(cols).map(|row| dot(row, v)).collect()
    }
}

/// Computes `Hᵗ v` without materializing the transpose: rows are visited in
/// order and accumulated into the column-indexed output.
pub fn matvec_t(h: &[f64], rows: usize, cols: usize, v: &[f64]) -> Vec<f64> {
    debug_assert_eq!(h.len(), rows * cols);
    debug_assert_eq!(v.len(), rows);
    if cols == 0 {
        return Vec::new();
    }

    #[cfg(feature = "rayon")]
    {
        h.par_chunks_exact(cols)
            .zip(v.par_iter())
            .fold(
                || vec![0.0; cols],
                |mut acc, (row, &vi)| {
                    axpy_in_place(&mut acc, vi, row);
                    acc
                },
            )
            .reduce(
                || vec![0.0; cols],
                |mut left, right| {
                    axpy_in_place(&mut left, 1.0, &right);
                    left
                },
            )
    }

    #[cfg(not(feature = "rayon"))]
    {
        let mut out = vec![0.0; cols];
        for (row, &vi) in h.chunks_exact(cols).zip(v) {
            axpy_in_place(&mut out, vi, row);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::SmallRng;

    fn random_vec(rng: &mut SmallRng, len: usize) -> Vec<f64> {
        (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
    }

    #[test]
    fn dot_and_norm() {
        assert_eq!(dot(&[1.0, 2.0, 3.0], &[4.0, -5.0, 6.0]), 12.0);
        assert_eq!(norm_sq(&[3.0, 4.0]), 25.0);
        assert_eq!(dot(&[], &[]), 0.0);
    }

    #[test]
    fn axpy_variants_agree() {
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];
        let mut out = [0.0; 3];
        axpy(&mut out, &a, 0.5, &b);
        assert_eq!(out, [6.0, 12.0, 18.0]);

        let mut acc = a;
        axpy_in_place(&mut acc, 0.5, &b);
        assert_eq!(acc, out);

        // p <- z + beta * p
        let mut p = b;
        xpby_in_place(&mut p, &a, 0.5);
        assert_eq!(p, [6.0, 12.0, 18.0]);
    }

    #[test]
    fn matvec_small() {
        // [[1 2 3], [4 5 6]]
        let h = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(matvec(&h, 2, 3, &[1.0, 0.0, -1.0]), vec![-2.0, -2.0]);
        assert_eq!(matvec_t(&h, 2, 3, &[1.0, 1.0]), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn matches_nalgebra() {
        let mut rng = SmallRng::seed_from_u64(7);
        let (rows, cols) = (13, 9);
        let h = random_vec(&mut rng, rows * cols);
        let v = random_vec(&mut rng, cols);
        let w = random_vec(&mut rng, rows);

        let m = nalgebra::DMatrix::from_row_slice(rows, cols, &h);
        let expected = &m * nalgebra::DVector::from_column_slice(&v);
        let expected_t = m.transpose() * nalgebra::DVector::from_column_slice(&w);

        for (x, y) in matvec(&h, rows, cols, &v).iter().zip(expected.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
        for (x, y) in matvec_t(&h, rows, cols, &w).iter().zip(expected_t.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn adjoint_identity() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..20 {
            let rows = rng.random_range(1..40);
            let cols = rng.random_range(1..40);
            let h = random_vec(&mut rng, rows * cols);
            let v = random_vec(&mut rng, cols);
            let w = random_vec(&mut rng, rows);

            let lhs = dot(&matvec(&h, rows, cols, &v), &w);
            let rhs = dot(&v, &matvec_t(&h, rows, cols, &w));
            assert!(
                (lhs - rhs).abs() <= 1e-10 * (1.0 + lhs.abs()),
                "{lhs} != {rhs} for {rows}x{cols}"
            );
        }
    }
}
