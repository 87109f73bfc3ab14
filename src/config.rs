//! Capture and algorithm configuration
//!
//! All tunables are fixed at construction time; the defaults describe a
//! 2 MS/s capture of an EPC Gen2 exchange (12 µs reader pulses, FM0 tag
//! replies at 25 samples per chip).

/// FM0 preamble bit pattern transmitted at the start of every tag reply.
pub const FM0_PREAMBLE: [u8; 12] = [1, 1, 0, 1, 0, 0, 1, 0, 0, 0, 1, 1];

/// Configuration for frame detection and crosstalk extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Capture sample rate in Hz
    pub samp_rate: f32,
    /// Amplitude threshold separating reader pulse lows from carrier highs
    pub pulse_threshold: f32,
    /// A command is declared only when the pulse count exceeds this
    pub reader_min_pulses: u32,
    /// Nominal reader pulse width in samples (12 µs at 2 MS/s)
    pub n_pulse_width: usize,
    /// Guard interval T1 in samples; the DC window holds `n_t1 / 2` samples
    pub n_t1: usize,
    /// Reply frame length in samples
    pub n_frame: usize,
    /// Chips per preamble bit
    pub sps: usize,
    /// Number of candidate start offsets scanned during preamble sync
    pub correlation_len: usize,
    /// Minimum local density for a sample to qualify as a cluster seed
    pub center_min_rho: f64,
    /// Minimum Gaussian likelihood for a sample to be assigned to a cluster
    pub cluster_min_prob: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            samp_rate: 2e6,
            pulse_threshold: 0.02,
            reader_min_pulses: 5,
            n_pulse_width: 24,
            n_t1: 460,
            n_frame: 1150,
            sps: 25,
            correlation_len: 100,
            center_min_rho: 10.0,
            cluster_min_prob: 1.0,
        }
    }
}

impl ExtractorConfig {
    /// Capacity of the rolling DC window
    pub fn dc_window_len(&self) -> usize {
        self.n_t1 / 2
    }

    /// Preamble template: each FM0 bit replicated `sps` times
    pub fn preamble_template(&self) -> Vec<f32> {
        let mut template = Vec::with_capacity(FM0_PREAMBLE.len() * self.sps);
        for &bit in FM0_PREAMBLE.iter() {
            for _ in 0..self.sps {
                template.push(bit as f32);
            }
        }
        template
    }
}
