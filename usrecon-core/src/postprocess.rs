//! Turns raw solver output into displayable images.
//!
//! Two variants are produced from the same solution:
//! - raw: sanitized and normalized to `[0, 1]`;
//! - clean: raw, then percentile thresholding, then 3x3 non-maximum
//!   suppression, leaving isolated point sources.
//!
//! Every stage returns a new buffer; the solver's output is never modified.

use crate::error::{ReconError, Result};

/// Ranges narrower than this are treated as 1.0 during normalization.
pub const DEGENERATE_RANGE: f64 = 1e-12;

/// Pixels below this percentile of the normalized image are zeroed.
pub const NOISE_PERCENTILE: f64 = 0.97;

/// Slack allowed when comparing a pixel against its neighborhood maximum.
pub const NMS_EPSILON: f64 = 1e-9;

/// Replaces NaN with 0, +inf with 1 and -inf with 0.
pub fn sanitize(image: &[f64]) -> Vec<f64> {
    image
        .iter()
        .map(|&v| {
            if v.is_nan() {
                0.0
            } else if v == f64::INFINITY {
                1.0
            } else if v == f64::NEG_INFINITY {
                0.0
            } else {
                v
            }
        })
        .collect()
}

/// Maps `v` to `(v - min) / (max - min)`. A constant input maps to zeros.
pub fn normalize(image: &[f64]) -> Vec<f64> {
    let (min, max) = image
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let mut range = max - min;
    if range < DEGENERATE_RANGE {
        range = 1.0;
    }
    image.iter().map(|v| (v - min) / range).collect()
}

/// Zeroes every pixel strictly below the value at `floor(percentile * len)`
/// of a sorted copy (index clamped to the last element).
pub fn percentile_threshold(image: &[f64], percentile: f64) -> Vec<f64> {
    if image.is_empty() {
        return Vec::new();
    }
    let mut sorted = image.to_vec();
    sorted.sort_by(f64::total_cmp);
    let cut = ((sorted.len() as f64 * percentile) as usize).min(sorted.len() - 1);
    let threshold = sorted[cut];

    image
        .iter()
        .map(|&v| if v < threshold { 0.0 } else { v })
        .collect()
}

/// Keeps a non-zero pixel only if it is within [`NMS_EPSILON`] of the largest
/// value in its 3x3 neighborhood (clipped at the borders). Ties survive
/// together.
pub fn non_max_suppression(image: &[f64], width: usize, height: usize) -> Result<Vec<f64>> {
    check_shape(image, width, height)?;
    let mut out = vec![0.0; image.len()];

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let value = image[idx];
            if value == 0.0 {
                continue;
            }

            let mut neighborhood_max = f64::NEG_INFINITY;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    neighborhood_max = neighborhood_max.max(image[ny * width + nx]);
                }
            }

            if value >= neighborhood_max - NMS_EPSILON {
                out[idx] = value;
            }
        }
    }
    Ok(out)
}

fn check_shape(image: &[f64], width: usize, height: usize) -> Result<()> {
    let expected = width
        .checked_mul(height)
        .ok_or_else(|| ReconError::InvalidDimensions(format!("{width} x {height} overflows")))?;
    if image.len() != expected {
        return Err(ReconError::DimensionMismatch {
            what: "image",
            expected,
            got: image.len(),
        });
    }
    Ok(())
}

/// Post-processing settings for one image geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PostProcessor {
    pub width: usize,
    pub height: usize,
    pub percentile: f64,
}

impl PostProcessor {
    pub fn new(width: usize, height: usize) -> Self {
        PostProcessor {
            width,
            height,
            percentile: NOISE_PERCENTILE,
        }
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = percentile;
        self
    }

    /// Sanitized and normalized copy of `image`.
    pub fn raw(&self, image: &[f64]) -> Result<Vec<f64>> {
        check_shape(image, self.width, self.height)?;
        Ok(normalize(&sanitize(image)))
    }

    /// Normalized, thresholded and suppressed copy of `image`.
    pub fn clean(&self, image: &[f64]) -> Result<Vec<f64>> {
        let normalized = self.raw(image)?;
        let thresholded = percentile_threshold(&normalized, self.percentile);
        non_max_suppression(&thresholded, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::SmallRng;

    #[test]
    fn sanitize_replaces_non_finite() {
        let out = sanitize(&[f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.5]);
        assert_eq!(out, vec![0.0, 1.0, 0.0, 0.5]);
    }

    #[test]
    fn normalize_spans_unit_interval() {
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..10 {
            let image: Vec<f64> = (0..50).map(|_| rng.random_range(-100.0..100.0)).collect();
            let out = normalize(&image);
            let min = out.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = out.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(min, 0.0);
            assert!((max - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn normalize_constant_is_zero() {
        assert_eq!(normalize(&[7.5; 4]), vec![0.0; 4]);
    }

    #[test]
    fn normalize_degenerate_range_is_shift_only() {
        let out = normalize(&[1.0, 1.0 + 1e-13]);
        assert_eq!(out[0], 0.0);
        assert!(out[1] < 1e-12);
    }

    #[test]
    fn threshold_keeps_top_three_percent() {
        let image: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let out = percentile_threshold(&image, NOISE_PERCENTILE);
        let kept: Vec<usize> = (0..100).filter(|&i| out[i] != 0.0).collect();
        assert_eq!(kept, vec![97, 98, 99]);
        assert_eq!(out[98], image[98]);
    }

    #[test]
    fn threshold_clamps_index() {
        assert_eq!(percentile_threshold(&[0.3], NOISE_PERCENTILE), vec![0.3]);
        assert_eq!(percentile_threshold(&[0.1, 0.9], 1.5), vec![0.0, 0.9]);
        assert!(percentile_threshold(&[], NOISE_PERCENTILE).is_empty());
    }

    #[test]
    fn nms_keeps_local_maxima() {
        #[rustfmt::skip]
        let image = [
            0.2, 0.5, 0.0, 0.0,
            0.1, 0.3, 0.0, 0.9,
            0.0, 0.0, 0.0, 0.4,
        ];
        let out = non_max_suppression(&image, 4, 3).unwrap();
        #[rustfmt::skip]
        let expected = [
            0.0, 0.5, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.9,
            0.0, 0.0, 0.0, 0.0,
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn nms_keeps_ties() {
        let out = non_max_suppression(&[0.0, 1.0, 1.0 - 1e-10, 0.2], 4, 1).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 1.0 - 1e-10, 0.0]);
    }

    #[test]
    fn nms_is_idempotent() {
        let mut rng = SmallRng::seed_from_u64(9);
        let (width, height) = (17, 11);
        for _ in 0..10 {
            let image: Vec<f64> = (0..width * height)
                .map(|_| if rng.random_bool(0.3) { 0.0 } else { rng.random::<f64>() })
                .collect();
            let once = non_max_suppression(&image, width, height).unwrap();
            let twice = non_max_suppression(&once, width, height).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn nms_rejects_wrong_shape() {
        assert!(matches!(
            non_max_suppression(&[1.0; 5], 2, 2),
            Err(ReconError::DimensionMismatch { what: "image", .. })
        ));
    }

    #[test]
    fn two_pixel_clean_keeps_brightest() {
        let processor = PostProcessor::new(2, 1);
        assert_eq!(processor.raw(&[3.0, 4.0]).unwrap(), vec![0.0, 1.0]);
        assert_eq!(processor.clean(&[3.0, 4.0]).unwrap(), vec![0.0, 1.0]);
        // Does not touch the input.
        let raw = vec![4.0, 3.0];
        let _ = processor.clean(&raw).unwrap();
        assert_eq!(raw, vec![4.0, 3.0]);
    }

    #[test]
    fn clean_isolates_point_sources() {
        let (width, height) = (10, 10);
        let mut image = vec![0.01; width * height];
        image[22] = 5.0;
        image[23] = 4.0;
        image[77] = 3.0;
        let out = PostProcessor::new(width, height).clean(&image).unwrap();
        let kept: Vec<usize> = (0..image.len()).filter(|&i| out[i] != 0.0).collect();
        assert_eq!(kept, vec![22, 77]);
        assert_eq!(out[22], 1.0);
    }
}
