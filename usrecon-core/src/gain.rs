//! Depth-dependent signal gain.
//!
//! Measurements are stored as `s` row groups (depth samples) of `n` entries
//! each. Row group `l` is multiplied by `sqrt(100 + l² / 20)` to offset the
//! attenuation that grows with depth.
//!
//! The gain compounds: applying it twice to the same buffer is wrong, and
//! cannot be detected here. The pipeline applies it once, right after
//! loading `g`.

use crate::error::{ReconError, Result};

/// Gain applied to row group `l`.
pub fn gamma(l: usize) -> f64 {
    let l = l as f64;
    (100.0 + l * l / 20.0).sqrt()
}

/// Scales `g` in place, one gain per row group of `n` entries.
pub fn apply_depth_gain(g: &mut [f64], s: usize, n: usize) -> Result<()> {
    let expected = s
        .checked_mul(n)
        .ok_or_else(|| ReconError::InvalidDimensions(format!("{s} x {n} overflows")))?;
    if g.len() != expected {
        return Err(ReconError::DimensionMismatch {
            what: "g",
            expected,
            got: g.len(),
        });
    }
    if n == 0 {
        return Ok(());
    }

    for (l, group) in g.chunks_exact_mut(n).enumerate() {
        let gain = gamma(l);
        group.iter_mut().for_each(|v| *v *= gain);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gains_for_two_groups() {
        assert_eq!(gamma(0), 10.0);
        assert_eq!(gamma(1), 100.05_f64.sqrt());

        let mut g = vec![1.0, 1.0];
        apply_depth_gain(&mut g, 2, 1).unwrap();
        assert_eq!(g, vec![10.0, 100.05_f64.sqrt()]);
    }

    #[test]
    fn whole_group_shares_one_gain() {
        let mut g = vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 0.0, 0.0, 0.0];
        apply_depth_gain(&mut g, 3, 3).unwrap();
        assert_eq!(&g[0..3], &[10.0, 20.0, 30.0]);
        let g1 = gamma(1);
        assert_eq!(&g[3..6], &[g1, 2.0 * g1, 3.0 * g1]);
        assert_eq!(&g[6..9], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn applying_twice_compounds() {
        let mut g = vec![1.0];
        apply_depth_gain(&mut g, 1, 1).unwrap();
        apply_depth_gain(&mut g, 1, 1).unwrap();
        assert_eq!(g, vec![100.0]);
    }

    #[test]
    fn rejects_wrong_length() {
        let mut g = vec![1.0; 5];
        assert!(matches!(
            apply_depth_gain(&mut g, 2, 3),
            Err(ReconError::DimensionMismatch { what: "g", expected: 6, got: 5 })
        ));
        // Untouched on error.
        assert_eq!(g, vec![1.0; 5]);
    }
}
