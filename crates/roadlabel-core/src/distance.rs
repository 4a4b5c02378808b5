//! Exact Euclidean distance transform.
//!
//! Felzenszwalb & Huttenlocher (2012) separable algorithm: a 1D squared
//! distance transform (lower envelope of parabolas) is run down every column,
//! then along every row of the column result. Cost is O(w·h).
//!
//! Distances are measured from each pixel to the nearest *on* pixel of the
//! mask, so on pixels get 0.
use crate::grid::{BinaryMask, DistanceField, Grid};

#[cfg(feature = "threading")]
use rayon::prelude::*;

/// Stand-in for "no source along this line". Finite so the envelope
/// intersection arithmetic never produces NaN.
const FAR: f64 = 1e20;

/// Compute the distance from every pixel to the nearest nonzero mask pixel.
///
/// An all-zero mask has no source; every pixel then receives the image
/// diagonal `sqrt(w² + h²)`, which is larger than any in-image distance.
pub fn distance_field(mask: &BinaryMask) -> DistanceField {
    let (w, h) = mask.shape();
    if w == 0 || h == 0 {
        return Grid::new(w, h, 0.0);
    }
    if mask.count_on() == 0 {
        let diag = ((w * w + h * h) as f64).sqrt() as f32;
        return Grid::new(w, h, diag);
    }

    // --- Pass 1: columns ---
    let mut sq = vec![0f64; w * h];
    {
        let mut f = vec![0f64; h];
        let mut d = vec![0f64; h];
        let mut scratch = Envelope::new(h);
        for c in 0..w {
            for r in 0..h {
                f[r] = if mask.get(r, c) != 0 { 0.0 } else { FAR };
            }
            scratch.transform(&f, &mut d);
            for r in 0..h {
                sq[r * w + c] = d[r];
            }
        }
    }

    // --- Pass 2: rows ---
    let row_pass = |row: &mut [f64]| {
        let f = row.to_vec();
        let mut scratch = Envelope::new(f.len());
        scratch.transform(&f, row);
    };
    #[cfg(feature = "threading")]
    sq.par_chunks_mut(w).for_each(row_pass);
    #[cfg(not(feature = "threading"))]
    sq.chunks_mut(w).for_each(row_pass);

    Grid {
        data: sq.into_iter().map(|v| v.sqrt() as f32).collect(),
        width: w,
        height: h,
    }
}

/// Scratch buffers for the 1D lower-envelope transform, reused across lines.
struct Envelope {
    /// Locations of the parabolas forming the lower envelope.
    v: Vec<usize>,
    /// Boundaries between envelope parabolas; `z.len() == v.len() + 1`.
    z: Vec<f64>,
}

impl Envelope {
    fn new(n: usize) -> Self {
        Self {
            v: vec![0; n],
            z: vec![0.0; n + 1],
        }
    }

    /// 1D squared distance transform of sampled function `f` into `d`:
    /// `d[q] = min_p ((q - p)² + f[p])`.
    fn transform(&mut self, f: &[f64], d: &mut [f64]) {
        let n = f.len();
        if n == 0 {
            return;
        }
        let v = &mut self.v;
        let z = &mut self.z;

        let mut k = 0usize;
        v[0] = 0;
        z[0] = f64::NEG_INFINITY;
        z[1] = f64::INFINITY;

        for q in 1..n {
            let qf = q as f64;
            let mut s;
            loop {
                let p = v[k] as f64;
                s = ((f[q] + qf * qf) - (f[v[k]] + p * p)) / (2.0 * qf - 2.0 * p);
                if s <= z[k] && k > 0 {
                    k -= 1;
                } else {
                    break;
                }
            }
            // k == 0 with s <= z[0] is impossible since z[0] = -inf.
            k += 1;
            v[k] = q;
            z[k] = s;
            z[k + 1] = f64::INFINITY;
        }

        k = 0;
        for (q, out) in d.iter_mut().enumerate().take(n) {
            let qf = q as f64;
            while z[k + 1] < qf {
                k += 1;
            }
            let dq = qf - v[k] as f64;
            *out = dq * dq + f[v[k]];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn brute_force(mask: &BinaryMask) -> Vec<f32> {
        let on: Vec<(usize, usize)> = (0..mask.height)
            .flat_map(|r| (0..mask.width).map(move |c| (r, c)))
            .filter(|&(r, c)| mask.get(r, c) != 0)
            .collect();
        let mut out = Vec::with_capacity(mask.data.len());
        for r in 0..mask.height {
            for c in 0..mask.width {
                let best = on
                    .iter()
                    .map(|&(pr, pc)| {
                        let dr = r as f64 - pr as f64;
                        let dc = c as f64 - pc as f64;
                        dr * dr + dc * dc
                    })
                    .fold(f64::INFINITY, f64::min);
                out.push(best.sqrt() as f32);
            }
        }
        out
    }

    #[test]
    fn zero_exactly_on_mask_and_positive_elsewhere() {
        let mut mask = Grid::new(17, 11, 0u8);
        mask.set(2, 3, 1);
        mask.set(8, 14, 1);
        mask.set(5, 9, 1);
        let d = distance_field(&mask);
        for (i, (&m, &v)) in mask.data.iter().zip(d.data.iter()).enumerate() {
            if m != 0 {
                assert_eq!(v, 0.0, "on pixel {i} must be zero");
            } else {
                assert!(v > 0.0, "off pixel {i} must be positive, got {v}");
            }
        }
    }

    #[test]
    fn matches_brute_force_on_scattered_points() {
        let mut mask = Grid::new(23, 19, 0u8);
        for &(r, c) in &[(0, 0), (18, 22), (9, 4), (3, 17), (12, 12), (15, 1)] {
            mask.set(r, c, 1);
        }
        let d = distance_field(&mask);
        let expected = brute_force(&mask);
        for (got, want) in d.data.iter().zip(expected.iter()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-4);
        }
    }

    #[test]
    fn all_zero_mask_uses_image_diagonal() {
        let mask = Grid::new(30, 40, 0u8);
        let d = distance_field(&mask);
        assert!(d.data.iter().all(|&v| (v - 50.0).abs() < 1e-4));
    }

    #[test]
    fn single_pixel_field_is_radial() {
        let mut mask = Grid::new(21, 21, 0u8);
        mask.set(10, 10, 1);
        let d = distance_field(&mask);
        assert_relative_eq!(d.get(10, 13), 3.0, epsilon = 1e-5);
        assert_relative_eq!(d.get(13, 14), 5.0, epsilon = 1e-5);
        assert_relative_eq!(d.get(0, 0), (200.0f32).sqrt(), epsilon = 1e-4);
    }

    #[test]
    fn empty_grid_is_handled() {
        let mask = Grid::new(0, 0, 0u8);
        assert!(distance_field(&mask).data.is_empty());
    }
}
