//! Maximum-likelihood cluster assignment
//!
//! Models each cluster as a bivariate Gaussian in (magnitude, phase) whose
//! variances come from the carrier-only reference window, then assigns every
//! frame sample to the most likely seed. Samples below the likelihood floor
//! stay unassigned.

use num::complex::Complex;
use rayon::prelude::*;

use crate::error::ExtractError;

/// Bivariate Gaussian over magnitude and phase deviations, axis-aligned and
/// shared by all four clusters.
#[derive(Debug, Clone, Copy)]
pub struct BivariateNormal {
    mag_var: f64,
    phase_var: f64,
    norm_const: f64,
}

impl BivariateNormal {
    /// Build the model from reference variances.
    ///
    /// Both variances must be finite and strictly positive; anything else
    /// means the reference window was degenerate and the frame cannot be
    /// scored.
    pub fn new(mag_var: f64, phase_var: f64) -> Result<Self, ExtractError> {
        if !(mag_var.is_finite() && phase_var.is_finite() && mag_var > 0.0 && phase_var > 0.0) {
            return Err(ExtractError::InvalidVariance { mag_var, phase_var });
        }
        Ok(Self {
            mag_var,
            phase_var,
            norm_const: 1.0 / (2.0 * std::f64::consts::PI * (mag_var * phase_var).sqrt()),
        })
    }

    /// Likelihood of a deviation from a cluster center
    #[inline]
    pub fn pdf(&self, dmag: f64, dphase: f64) -> f64 {
        let quad = dmag * dmag / self.mag_var + dphase * dphase / self.phase_var;
        self.norm_const * (-0.5 * quad).exp()
    }

    /// Ratio of the magnitude variance to the phase variance; weights the
    /// phase axis of the clustering metric.
    pub fn metric_scale(&self) -> f64 {
        self.mag_var / self.phase_var
    }
}

/// Unbiased magnitude and phase variances of the carrier-only reference
/// window, both measured against the DC estimate.
pub fn reference_variances(
    dc_samples: &[Complex<f64>],
    dc_est: Complex<f64>,
) -> Result<(f64, f64), ExtractError> {
    let m = dc_samples.len();
    if m < 2 {
        return Err(ExtractError::InvalidVariance {
            mag_var: 0.0,
            phase_var: 0.0,
        });
    }

    // deviations are measured against the DC estimate, not the window mean
    let dc_mag = dc_est.norm();
    let mag_var = dc_samples
        .iter()
        .map(|x| (x.norm() - dc_mag).powi(2))
        .sum::<f64>()
        / (m - 1) as f64;
    let phase_var = dc_samples
        .iter()
        .map(|x| (x * dc_est.conj()).arg().powi(2))
        .sum::<f64>()
        / (m - 1) as f64;
    Ok((mag_var, phase_var))
}

/// Result of assigning every frame sample to a seed
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Cluster label per sample, 0..=3 or -1 for unassigned
    pub labels: Vec<i8>,
    /// Complex sum of the samples in each cluster
    pub sums: [Complex<f64>; 4],
    /// Number of samples in each cluster
    pub counts: [usize; 4],
}

/// Assign each sample to the seed with the highest likelihood.
///
/// A sample whose best likelihood does not exceed `min_prob` is labeled -1
/// and contributes to no centroid. Ties go to the lower seed index.
pub fn assign_clusters(
    samples: &[Complex<f64>],
    seeds: &[usize; 4],
    model: &BivariateNormal,
    min_prob: f64,
) -> Assignment {
    let centers: Vec<(Complex<f64>, f64)> =
        seeds.iter().map(|&s| (samples[s], samples[s].norm())).collect();

    let labels: Vec<i8> = samples
        .par_iter()
        .map(|&x| {
            let mag = x.norm();
            let mut best = -1i8;
            let mut best_prob = min_prob;
            for (k, &(center, center_mag)) in centers.iter().enumerate() {
                let dmag = mag - center_mag;
                let dphase = (x * center.conj()).arg();
                let prob = model.pdf(dmag, dphase);
                if prob > best_prob {
                    best_prob = prob;
                    best = k as i8;
                }
            }
            best
        })
        .collect();

    let (sums, counts) = samples
        .par_iter()
        .zip(labels.par_iter())
        .fold(
            || ([Complex::new(0.0f64, 0.0); 4], [0usize; 4]),
            |(mut sums, mut counts), (&x, &label)| {
                if label >= 0 {
                    sums[label as usize] += x;
                    counts[label as usize] += 1;
                }
                (sums, counts)
            },
        )
        .reduce(
            || ([Complex::new(0.0f64, 0.0); 4], [0usize; 4]),
            |(mut sums_a, mut counts_a), (sums_b, counts_b)| {
                for k in 0..4 {
                    sums_a[k] += sums_b[k];
                    counts_a[k] += counts_b[k];
                }
                (sums_a, counts_a)
            },
        );

    Assignment {
        labels,
        sums,
        counts,
    }
}
