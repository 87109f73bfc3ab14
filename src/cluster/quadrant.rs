//! Centroid finalization and quadrant identification
//!
//! Turns the four cluster sums into centroids, identifies which centroid is
//! which modulation state using the DC and channel estimates, and forms the
//! inter-channel crosstalk vector.

use num::complex::Complex;

use crate::error::ExtractError;

/// Indices of the four modulation states among the cluster centroids.
///
/// LL is both channels low (carrier only), HH both high; LH and HL are the
/// two single-channel states in centroid index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadrantMap {
    pub ll: usize,
    pub lh: usize,
    pub hl: usize,
    pub hh: usize,
}

/// Divide each cluster sum by its population.
///
/// A cluster that attracted no samples has no centroid and the frame is
/// rejected with [`ExtractError::EmptyCluster`].
pub fn finalize_centroids(
    sums: &[Complex<f64>; 4],
    counts: &[usize; 4],
) -> Result<[Complex<f64>; 4], ExtractError> {
    let mut centroids = [Complex::new(0.0f64, 0.0); 4];
    for label in 0..4 {
        if counts[label] == 0 {
            return Err(ExtractError::EmptyCluster { label });
        }
        centroids[label] = sums[label] / counts[label] as f64;
    }
    Ok(centroids)
}

/// Identify the modulation state of each centroid.
///
/// LL is the centroid nearest the DC estimate and HH the one nearest the
/// channel estimate; the remaining two become LH and HL in index order. The
/// split between LH and HL is arbitrary but it cancels in the crosstalk sum.
pub fn map_quadrants(
    centroids: &[Complex<f64>; 4],
    dc_est: Complex<f64>,
    h_est: Complex<f64>,
) -> Result<QuadrantMap, ExtractError> {
    let nearest = |target: Complex<f64>| {
        let mut best = 0usize;
        let mut best_dist = f64::INFINITY;
        for (k, &c) in centroids.iter().enumerate() {
            let d = (c - target).norm();
            if d < best_dist {
                best_dist = d;
                best = k;
            }
        }
        best
    };

    let ll = nearest(dc_est);
    let hh = nearest(h_est);
    if ll == hh {
        return Err(ExtractError::DegenerateQuadrantMapping { index: ll });
    }

    let mut rest = (0..4).filter(|&k| k != ll && k != hh);
    let lh = rest.next().ok_or(ExtractError::DegenerateQuadrantMapping { index: ll })?;
    let hl = rest.next().ok_or(ExtractError::DegenerateQuadrantMapping { index: ll })?;
    Ok(QuadrantMap { ll, lh, hl, hh })
}

/// Crosstalk vector from the DC-referenced centroids.
///
/// With x_q = centroid(q) - centroid(LL), the both-high state of a linear
/// channel satisfies x_HH = x_LH + x_HL; any excess is the inter-channel
/// term, reported so that x_HH = x_LH + x_HL - s_int.
pub fn crosstalk_vector(centroids: &[Complex<f64>; 4], map: &QuadrantMap) -> Complex<f64> {
    let ll = centroids[map.ll];
    let lh = centroids[map.lh] - ll;
    let hl = centroids[map.hl] - ll;
    let hh = centroids[map.hh] - ll;
    lh + hl - hh
}
