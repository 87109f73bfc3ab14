//! Synthetic capture generation
//!
//! Builds reader commands and tag replies sample-for-sample the way a
//! monostatic receiver sees them, for tests and experiments. All randomness
//! flows through a caller-supplied RNG so runs are reproducible.

use num::complex::Complex;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::{ExtractorConfig, FM0_PREAMBLE};

/// Circularly symmetric complex Gaussian noise sample with per-axis
/// standard deviation `sigma`.
pub fn complex_jitter<R: Rng>(sigma: f32, rng: &mut R) -> Complex<f32> {
    let re: f32 = rng.sample(StandardNormal);
    let im: f32 = rng.sample(StandardNormal);
    Complex::new(re * sigma, im * sigma)
}

/// `count` noisy samples scattered around `center`
pub fn cluster_blob<R: Rng>(
    center: Complex<f32>,
    sigma: f32,
    count: usize,
    rng: &mut R,
) -> Vec<Complex<f32>> {
    (0..count).map(|_| center + complex_jitter(sigma, rng)).collect()
}

/// Carrier-only samples with independent magnitude and phase jitter, as seen
/// during the guard interval before a tag reply.
pub fn dc_reference<R: Rng>(
    count: usize,
    dc_est: Complex<f32>,
    mag_sigma: f32,
    phase_sigma: f32,
    rng: &mut R,
) -> Vec<Complex<f32>> {
    let (mag, phase) = dc_est.to_polar();
    (0..count)
        .map(|_| {
            let dm: f32 = rng.sample(StandardNormal);
            let dp: f32 = rng.sample(StandardNormal);
            Complex::from_polar(mag + dm * mag_sigma, phase + dp * phase_sigma)
        })
        .collect()
}

/// Reader command section: carrier lead-in, `n_pulses` PIE low pulses, then
/// carrier for the rest of the T1 guard interval.
///
/// Returns the samples and the index at which the detector declares the
/// command (the last sample of the section).
pub fn reader_command<R: Rng>(
    config: &ExtractorConfig,
    n_pulses: usize,
    sigma: f32,
    rng: &mut R,
) -> (Vec<Complex<f32>>, usize) {
    let carrier = Complex::new(1.0f32, 0.0);
    let npw = config.n_pulse_width;
    let mut samples = Vec::new();
    for _ in 0..2 * npw {
        samples.push(carrier + complex_jitter(sigma, rng));
    }
    for _ in 0..n_pulses {
        for _ in 0..npw {
            samples.push(complex_jitter(sigma, rng));
        }
        for _ in 0..npw {
            samples.push(carrier + complex_jitter(sigma, rng));
        }
    }
    // high dwell long enough for the command timer to expire
    for _ in 0..config.n_t1 + 2 - npw {
        samples.push(carrier + complex_jitter(sigma, rng));
    }
    let fire_index = samples.len() - 1;
    (samples, fire_index)
}

/// Channel geometry of a simulated tag reply
#[derive(Debug, Clone)]
pub struct ReplyParams {
    /// Carrier leakage level
    pub dc: Complex<f32>,
    /// First backscatter channel response
    pub h1: Complex<f32>,
    /// Second backscatter channel response
    pub h2: Complex<f32>,
    /// Displacement of the both-high state from the linear sum
    pub crosstalk: Complex<f32>,
    /// Carrier-only samples between the command and the reply
    pub gap: usize,
    /// Additive noise standard deviation per axis
    pub sigma: f32,
}

/// Tag reply section: `gap` carrier samples, the FM0 preamble, then random
/// data chips. Both channels answer in lockstep during the preamble; data
/// chips toggle the channels independently and the both-high state carries
/// the crosstalk displacement.
///
/// Total length is `gap + n_frame` so the last data sample completes the
/// frame the detector is accumulating.
pub fn tag_reply<R: Rng>(
    config: &ExtractorConfig,
    params: &ReplyParams,
    rng: &mut R,
) -> Vec<Complex<f32>> {
    let mut samples = Vec::new();
    for _ in 0..params.gap {
        samples.push(params.dc + complex_jitter(params.sigma, rng));
    }
    let both_high = params.dc + params.h1 + params.h2 + params.crosstalk;
    for &bit in FM0_PREAMBLE.iter() {
        let state = if bit == 1 { both_high } else { params.dc };
        for _ in 0..config.sps {
            samples.push(state + complex_jitter(params.sigma, rng));
        }
    }
    let data_samples = config.n_frame - FM0_PREAMBLE.len() * config.sps;
    let mut emitted = 0usize;
    while emitted < data_samples {
        let a = rng.random_bool(0.5);
        let b = rng.random_bool(0.5);
        let mut state = params.dc;
        if a {
            state += params.h1;
        }
        if b {
            state += params.h2;
        }
        if a && b {
            state += params.crosstalk;
        }
        let chip = config.sps.min(data_samples - emitted);
        for _ in 0..chip {
            samples.push(state + complex_jitter(params.sigma, rng));
        }
        emitted += chip;
    }
    samples
}
