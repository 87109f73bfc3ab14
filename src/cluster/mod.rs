//! Per-frame clustering pipeline
//!
//! Runs on each completed reply frame: estimate reference variances from the
//! carrier-only window, find the four modulation-state clusters by density
//! peaks, assign every sample by maximum likelihood, and read the
//! inter-channel crosstalk off the centroid geometry. All heavy stages fan
//! out over the rayon pool; the streaming detector never waits on them.

mod density;
mod gaussian;
mod quadrant;

use num::complex::Complex;
use tracing::{debug, instrument};

pub use gaussian::{assign_clusters, reference_variances, Assignment, BivariateNormal};
pub use quadrant::{crosstalk_vector, finalize_centroids, map_quadrants, QuadrantMap};

use crate::config::ExtractorConfig;
use crate::detector::ReplyFrame;
use crate::error::ExtractError;

/// Result of clustering one reply frame
#[derive(Debug, Clone)]
pub struct CrosstalkEstimate {
    /// Inter-channel crosstalk vector
    pub s_int: Complex<f64>,
    /// The four cluster centroids, in label order
    pub centroids: [Complex<f64>; 4],
    /// Modulation state of each centroid
    pub quadrants: QuadrantMap,
    /// Cluster label per frame sample, -1 for unassigned
    pub labels: Vec<i8>,
}

fn widen(samples: &[Complex<f32>]) -> Vec<Complex<f64>> {
    samples
        .iter()
        .map(|x| Complex::new(x.re as f64, x.im as f64))
        .collect()
}

/// Extract the inter-channel crosstalk from one reply frame.
///
/// `frame` holds the synchronized reply samples, `dc_samples` the
/// carrier-only reference window, and `dc_est` / `h_est` the carrier and
/// both-high references from the detector. Any degeneracy rejects the frame
/// with a specific [`ExtractError`]; the caller discards it and keeps
/// scanning.
#[instrument(skip_all, fields(frame_len = frame.len(), refs = dc_samples.len()))]
pub fn extract_inter_channel(
    frame: &[Complex<f32>],
    dc_samples: &[Complex<f32>],
    dc_est: Complex<f32>,
    h_est: Complex<f32>,
    config: &ExtractorConfig,
) -> Result<CrosstalkEstimate, ExtractError> {
    let samples = widen(frame);
    let refs = widen(dc_samples);
    let dc_est = Complex::new(dc_est.re as f64, dc_est.im as f64);
    let h_est = Complex::new(h_est.re as f64, h_est.im as f64);

    let (mag_var, phase_var) = reference_variances(&refs, dc_est)?;
    let model = BivariateNormal::new(mag_var, phase_var)?;

    let seeds = density::find_seeds(&samples, model.metric_scale(), config.center_min_rho)?;
    let assignment = assign_clusters(&samples, &seeds, &model, config.cluster_min_prob);
    let centroids = finalize_centroids(&assignment.sums, &assignment.counts)?;
    let quadrants = map_quadrants(&centroids, dc_est, h_est)?;
    let s_int = crosstalk_vector(&centroids, &quadrants);

    debug!(
        s_mag = s_int.norm(),
        s_phase = s_int.arg(),
        assigned = assignment.counts.iter().sum::<usize>(),
        "crosstalk extracted"
    );
    Ok(CrosstalkEstimate {
        s_int,
        centroids,
        quadrants,
        labels: assignment.labels,
    })
}

/// Convenience wrapper over [`extract_inter_channel`] for a detector frame
pub fn extract_from_frame(
    frame: &ReplyFrame,
    config: &ExtractorConfig,
) -> Result<CrosstalkEstimate, ExtractError> {
    extract_inter_channel(
        &frame.samples,
        &frame.dc_samples,
        frame.dc_est,
        frame.h_est,
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{cluster_blob, dc_reference};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SIGMA: f32 = 0.01;

    struct Scenario {
        frame: Vec<Complex<f32>>,
        dc_samples: Vec<Complex<f32>>,
        dc_est: Complex<f32>,
        h_est: Complex<f32>,
        crosstalk: Complex<f32>,
        per_cluster: usize,
    }

    /// Four blobs in the deployed geometry with the both-high blob displaced
    /// by the crosstalk vector.
    fn scenario(crosstalk: Complex<f32>, rng: &mut StdRng) -> Scenario {
        let dc = Complex::from_polar(0.6f32, 0.4);
        let h1 = Complex::new(0.8f32, 0.1);
        let h2 = Complex::new(0.15f32, -0.4);
        let per_cluster = 60usize;

        let mut frame = Vec::new();
        for state in [dc, dc + h1, dc + h2, dc + h1 + h2 + crosstalk] {
            frame.extend(cluster_blob(state, SIGMA, per_cluster, rng));
        }
        let dc_samples = dc_reference(230, dc, SIGMA, SIGMA / 0.6, rng);
        Scenario {
            frame,
            dc_samples,
            dc_est: dc,
            h_est: dc + h1 + h2 + crosstalk,
            crosstalk,
            per_cluster,
        }
    }

    fn test_config() -> ExtractorConfig {
        ExtractorConfig {
            center_min_rho: 1.0,
            ..ExtractorConfig::default()
        }
    }

    #[test]
    fn test_partition_and_crosstalk_recovery() {
        let mut rng = StdRng::seed_from_u64(21);
        let s = scenario(Complex::new(0.04, -0.03), &mut rng);
        let config = test_config();
        let estimate =
            extract_inter_channel(&s.frame, &s.dc_samples, s.dc_est, s.h_est, &config).unwrap();

        // recovered crosstalk opposes the injected displacement
        let injected = Complex::new(s.crosstalk.re as f64, s.crosstalk.im as f64);
        assert!(
            (estimate.s_int + injected).norm() < 0.01,
            "s_int = {} vs injected {}",
            estimate.s_int,
            injected
        );

        // labels partition the blobs: each generator group maps to one
        // dominant label and the four dominants are distinct
        let mut dominants = Vec::new();
        for group in 0..4 {
            let slice = &estimate.labels[group * s.per_cluster..(group + 1) * s.per_cluster];
            let mut histogram = [0usize; 4];
            let mut assigned = 0usize;
            for &label in slice {
                if label >= 0 {
                    histogram[label as usize] += 1;
                    assigned += 1;
                }
            }
            assert!(
                assigned * 10 >= s.per_cluster * 9,
                "group {} kept only {} of {}",
                group,
                assigned,
                s.per_cluster
            );
            let dominant = histogram
                .iter()
                .enumerate()
                .max_by_key(|&(_, c)| *c)
                .map(|(k, _)| k)
                .unwrap_or(0);
            assert!(histogram[dominant] * 10 >= assigned * 9);
            dominants.push(dominant);
        }
        dominants.sort_unstable();
        dominants.dedup();
        assert_eq!(dominants.len(), 4);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(22);
        let s = scenario(Complex::new(0.02, 0.01), &mut rng);
        let config = test_config();

        let first =
            extract_inter_channel(&s.frame, &s.dc_samples, s.dc_est, s.h_est, &config).unwrap();
        let second =
            extract_inter_channel(&s.frame, &s.dc_samples, s.dc_est, s.h_est, &config).unwrap();

        assert_eq!(first.labels, second.labels);
        assert_eq!(first.quadrants, second.quadrants);
        assert!((first.s_int - second.s_int).norm() < 1e-12);
    }

    #[test]
    fn test_no_crosstalk_reads_near_zero() {
        let mut rng = StdRng::seed_from_u64(23);
        let s = scenario(Complex::new(0.0, 0.0), &mut rng);
        let config = test_config();
        let estimate =
            extract_inter_channel(&s.frame, &s.dc_samples, s.dc_est, s.h_est, &config).unwrap();
        assert!(estimate.s_int.norm() < 0.01);
    }

    #[test]
    fn test_insufficient_seeds_on_tiny_frame() {
        let mut rng = StdRng::seed_from_u64(24);
        let s = scenario(Complex::new(0.0, 0.0), &mut rng);
        let config = test_config();
        let tiny = &s.frame[..5];
        assert!(matches!(
            extract_inter_channel(tiny, &s.dc_samples, s.dc_est, s.h_est, &config),
            Err(ExtractError::InsufficientSeeds { found: 0 })
        ));
    }

    #[test]
    fn test_insufficient_seeds_on_unreachable_density() {
        let mut rng = StdRng::seed_from_u64(25);
        let s = scenario(Complex::new(0.0, 0.0), &mut rng);
        let config = ExtractorConfig {
            center_min_rho: 1e9,
            ..ExtractorConfig::default()
        };
        assert!(matches!(
            extract_inter_channel(&s.frame, &s.dc_samples, s.dc_est, s.h_est, &config),
            Err(ExtractError::InsufficientSeeds { .. })
        ));
    }

    #[test]
    fn test_empty_cluster_on_impossible_likelihood_floor() {
        let mut rng = StdRng::seed_from_u64(26);
        let s = scenario(Complex::new(0.0, 0.0), &mut rng);
        let config = ExtractorConfig {
            center_min_rho: 1.0,
            cluster_min_prob: 1e12,
            ..ExtractorConfig::default()
        };
        assert!(matches!(
            extract_inter_channel(&s.frame, &s.dc_samples, s.dc_est, s.h_est, &config),
            Err(ExtractError::EmptyCluster { label: 0 })
        ));
    }

    #[test]
    fn test_degenerate_references_rejected() {
        let mut rng = StdRng::seed_from_u64(27);
        let s = scenario(Complex::new(0.0, 0.0), &mut rng);
        let config = test_config();
        // both references at the carrier: LL and HH collapse
        assert!(matches!(
            extract_inter_channel(&s.frame, &s.dc_samples, s.dc_est, s.dc_est, &config),
            Err(ExtractError::DegenerateQuadrantMapping { .. })
        ));
    }

    #[test]
    fn test_invalid_variance_on_constant_references() {
        let mut rng = StdRng::seed_from_u64(28);
        let s = scenario(Complex::new(0.0, 0.0), &mut rng);
        let config = test_config();
        let constant = vec![s.dc_est; 230];
        assert!(matches!(
            extract_inter_channel(&s.frame, &constant, s.dc_est, s.h_est, &config),
            Err(ExtractError::InvalidVariance { .. })
        ));
    }
}
