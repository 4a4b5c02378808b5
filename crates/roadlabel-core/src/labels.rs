//! Soft and hard road labels derived from a distance field.
//!
//! Soft label: `exp(-0.5 · d² / σ²)`, exactly 1 on the road centerline and
//! decaying monotonically towards 0. Hard label: soft label thresholded with
//! a strict `>`, used only for QA overlays.
use crate::grid::{DistanceField, Grid, HardLabel, SoftLabel};

#[cfg(feature = "threading")]
use rayon::prelude::*;

/// Gaussian falloff of a single distance value.
#[inline]
pub fn gaussian(d: f32, sigma: f32) -> f32 {
    let d = d as f64;
    let s = sigma as f64;
    (-0.5 * d * d / (s * s)).exp() as f32
}

/// Map a distance field to a gaussian soft label with bandwidth `sigma`
/// (pixels). Pointwise, so rows are evaluated in parallel when the
/// `threading` feature is enabled.
pub fn gaussian_label(field: &DistanceField, sigma: f32) -> SoftLabel {
    #[cfg(feature = "threading")]
    let data: Vec<f32> = field.data.par_iter().map(|&d| gaussian(d, sigma)).collect();
    #[cfg(not(feature = "threading"))]
    let data: Vec<f32> = field.data.iter().map(|&d| gaussian(d, sigma)).collect();

    Grid {
        data,
        width: field.width,
        height: field.height,
    }
}

/// Binarise a soft label: 1 where `soft > threshold`, else 0.
pub fn hard_label(soft: &SoftLabel, threshold: f32) -> HardLabel {
    soft.map(|v| u8::from(v > threshold))
}

/// Distance (pixels) at which the gaussian crosses `threshold`, i.e. the
/// half-width of the hard label around a centerline.
pub fn threshold_radius(sigma: f32, threshold: f32) -> f32 {
    let t = threshold.clamp(f32::MIN_POSITIVE, 1.0) as f64;
    (sigma as f64 * (2.0 * (1.0 / t).ln()).sqrt()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::distance_field;
    use approx::assert_relative_eq;

    const SIGMA: f32 = 15.0;
    const THRESHOLD: f32 = 0.76;

    #[test]
    fn gaussian_is_one_at_zero_and_non_increasing() {
        assert_eq!(gaussian(0.0, SIGMA), 1.0);
        let mut prev = 1.0f32;
        for i in 0..400 {
            let v = gaussian(i as f32 * 0.25, SIGMA);
            assert!(v <= prev, "gaussian increased at d = {}", i as f32 * 0.25);
            assert!((0.0..=1.0).contains(&v));
            prev = v;
        }
    }

    #[test]
    fn lower_threshold_never_shrinks_road_area() {
        let field = Grid::from_vec(6, 1, vec![0.0f32, 3.0, 8.0, 12.0, 20.0, 40.0]).unwrap();
        let soft = gaussian_label(&field, SIGMA);
        let thresholds = [0.1f32, 0.3, 0.5, 0.76, 0.9, 0.99];
        for pair in thresholds.windows(2) {
            let lo = hard_label(&soft, pair[0]);
            let hi = hard_label(&soft, pair[1]);
            for (a, b) in lo.data.iter().zip(hi.data.iter()) {
                assert!(a >= b, "t={} must cover t={}", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn all_zero_mask_gives_near_zero_soft_and_empty_hard() {
        let mask = Grid::new(64, 64, 0u8);
        let soft = gaussian_label(&distance_field(&mask), SIGMA);
        assert!(soft.data.iter().all(|&v| v < 1e-6));
        assert_eq!(hard_label(&soft, THRESHOLD).count_on(), 0);
    }

    #[test]
    fn horizontal_line_profile() {
        let (w, h) = (101usize, 101usize);
        let mut mask = Grid::new(w, h, 0u8);
        for c in 0..w {
            mask.set(50, c, 1);
        }
        let soft = gaussian_label(&distance_field(&mask), SIGMA);

        for c in 0..w {
            assert_eq!(soft.get(50, c), 1.0);
        }
        assert_relative_eq!(soft.get(65, 40), (-0.5f32).exp(), epsilon = 1e-5);
        assert_relative_eq!(soft.get(35, 40), (-0.5f32).exp(), epsilon = 1e-5);
        // d = 21 is just short of σ·√2 ≈ 21.2, where the label reaches e⁻¹.
        assert!((soft.get(71, 40) - (-1.0f32).exp()).abs() < 0.02);
        assert!(soft.get(71, 40) < THRESHOLD);

        // Cutoff radius for σ=15, t=0.76 is ≈ 11.11 px, so rows 39..=61 are on.
        let hard = hard_label(&soft, THRESHOLD);
        let width = (0..h).filter(|&r| hard.get(r, 40) == 1).count();
        let radius = threshold_radius(SIGMA, THRESHOLD);
        assert_eq!(width, 2 * radius.floor() as usize + 1);
        assert_eq!(width, 23);
    }

    #[test]
    fn threshold_radius_matches_closed_form() {
        let r = threshold_radius(SIGMA, THRESHOLD);
        assert_relative_eq!(gaussian(r, SIGMA), THRESHOLD, epsilon = 1e-5);
    }
}
