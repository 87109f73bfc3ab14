//! Density-peak seed selection
//!
//! Selects the four cluster representatives of a reply frame: samples with
//! both high local density and large separation from any denser sample.
//! Distances live in (magnitude, phase) space with the phase axis scaled so
//! that phase noise and magnitude noise contribute comparably.

use num::complex::Complex;
use rayon::prelude::*;
use tracing::debug;

use crate::error::ExtractError;

/// Fraction of the pairwise distances that fall inside the cutoff radius
const CUTOFF_PERCENTILE: f64 = 0.02;

/// Anisotropic sample distance: magnitude difference plus the wrapped phase
/// difference weighted by `scale` = mag_var / phase_var.
#[inline]
fn metric(a: Complex<f64>, mag_a: f64, b: Complex<f64>, mag_b: f64, scale: f64) -> f64 {
    let dmag = mag_a - mag_b;
    let dphase = (a * b.conj()).arg();
    (dmag * dmag + scale * dphase * dphase).sqrt()
}

/// Full N x N distance matrix, row-major.
///
/// Symmetric with a zero diagonal by construction; rows are computed in
/// parallel.
pub(crate) fn distance_matrix(samples: &[Complex<f64>], scale: f64) -> Vec<f64> {
    let n = samples.len();
    let mags: Vec<f64> = samples.iter().map(|x| x.norm()).collect();

    let mut dists = vec![0.0f64; n * n];
    dists.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for j in 0..n {
            row[j] = metric(samples[i], mags[i], samples[j], mags[j], scale);
        }
    });
    dists
}

/// Neighborhood radius for density estimation: the distance at the 2nd
/// percentile rank of the flattened matrix, found with a partial order
/// statistic. The extra `n` skips the zero diagonal entries.
pub(crate) fn cutoff_distance(dists: &[f64], n: usize) -> f64 {
    let position = ((n * (n - 1)) as f64 * CUTOFF_PERCENTILE) as usize;
    let k = (position + n).min(dists.len() - 1);
    let mut flat = dists.to_vec();
    let (_, pivot, _) =
        flat.select_nth_unstable_by(k, |a, b| a.partial_cmp(b).unwrap_or(core::cmp::Ordering::Equal));
    *pivot
}

/// Local density of every sample under a Gaussian kernel; the -1 removes the
/// self term (dist(i, i) = 0).
pub(crate) fn local_densities(dists: &[f64], n: usize, dc: f64) -> Vec<f64> {
    dists
        .par_chunks(n)
        .map(|row| {
            row.iter()
                .map(|&d| {
                    let r = d / dc;
                    (-r * r).exp()
                })
                .sum::<f64>()
                - 1.0
        })
        .collect()
}

/// Sample indices in descending density order (stable: ties keep index order)
fn density_order(rhos: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rhos.len()).collect();
    order.sort_by(|&a, &b| {
        rhos[b]
            .partial_cmp(&rhos[a])
            .unwrap_or(core::cmp::Ordering::Equal)
    });
    order
}

/// For each sample, the minimum distance to any sample of strictly higher
/// rank in the density order. The densest sample gets the maximum of all
/// other deltas, since no denser sample exists.
fn separation_distances(dists: &[f64], n: usize, order: &[usize]) -> Vec<f64> {
    let mut deltas = vec![0.0f64; n];
    let ranked: Vec<(usize, f64)> = (1..n)
        .into_par_iter()
        .map(|rank| {
            let index = order[rank];
            let mut min_dist = f64::INFINITY;
            for &j in &order[..rank] {
                let d = dists[index * n + j];
                if d < min_dist {
                    min_dist = d;
                }
            }
            (index, min_dist)
        })
        .collect();
    for (index, delta) in ranked {
        deltas[index] = delta;
    }
    let max_delta = deltas.iter().cloned().fold(0.0f64, f64::max);
    deltas[order[0]] = max_delta;
    deltas
}

/// Select the four cluster seeds of a frame.
///
/// Ranks samples by decision value lambda = rho * delta and takes the first
/// four whose density exceeds `min_rho`. Frames too small or too degenerate
/// to yield four peaks are rejected with [`ExtractError::InsufficientSeeds`].
pub(crate) fn find_seeds(
    samples: &[Complex<f64>],
    scale: f64,
    min_rho: f64,
) -> Result<[usize; 4], ExtractError> {
    let n = samples.len();
    if n < 8 {
        return Err(ExtractError::InsufficientSeeds { found: 0 });
    }

    let dists = distance_matrix(samples, scale);
    let dc = cutoff_distance(&dists, n);
    if !(dc > 0.0) {
        // more than 2% of the sample pairs coincide; no meaningful peaks
        return Err(ExtractError::InsufficientSeeds { found: 0 });
    }

    let rhos = local_densities(&dists, n, dc);
    let order = density_order(&rhos);
    let deltas = separation_distances(&dists, n, &order);

    let lambdas: Vec<f64> = rhos.iter().zip(deltas.iter()).map(|(r, d)| r * d).collect();
    let mut ranking: Vec<usize> = (0..n).collect();
    ranking.sort_by(|&a, &b| {
        lambdas[b]
            .partial_cmp(&lambdas[a])
            .unwrap_or(core::cmp::Ordering::Equal)
    });

    let mut seeds = [0usize; 4];
    let mut found = 0usize;
    for &index in &ranking {
        if rhos[index] > min_rho {
            seeds[found] = index;
            found += 1;
            if found == 4 {
                break;
            }
        }
    }
    if found < 4 {
        return Err(ExtractError::InsufficientSeeds { found });
    }

    debug!(cutoff = dc, ?seeds, "cluster seeds selected");
    Ok(seeds)
}
