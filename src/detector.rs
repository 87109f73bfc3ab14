//! Reader command detection and tag reply synchronization
//!
//! Implements the streaming front end of the crosstalk extractor as a
//! three-state machine driven one sample at a time:
//!
//! 1. **Seeking** - count reader pulses with an amplitude-threshold edge
//!    detector while keeping a rolling window of recent samples for the DC
//!    estimate. A command is declared once enough pulses are followed by a
//!    carrier dwell longer than the T1 guard interval.
//! 2. **Synchronizing** - slide a correlation window over the post-command
//!    samples against the FM0 preamble template; the offset with the largest
//!    correlation magnitude marks the reply start and yields the channel
//!    estimate from the mid-chip samples of the preamble one bits.
//! 3. **Accumulating** - buffer exactly `n_frame` samples from the reply
//!    start, then hand the completed frame off and return to seeking.
//!
//! Every call to [`FrameDetector::push`] advances the machine by exactly one
//! step; the streaming path never blocks and allocates only on state
//! transitions.

use std::collections::VecDeque;

use num::complex::Complex;
use tracing::{debug, info};

use crate::config::{ExtractorConfig, FM0_PREAMBLE};

/// Hysteresis state of the amplitude threshold detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalLevel {
    Low,
    High,
}

/// Fixed-capacity rolling window of recent samples.
///
/// Holds the `n_t1 / 2` samples preceding a detected command; they provide
/// both the DC estimate and the reference population for the magnitude and
/// phase variances used by the clustering stage.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    buf: VecDeque<Complex<f32>>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest if the window is full
    pub fn push(&mut self, sample: Complex<f32>) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Complex mean of the window contents (zero for an empty window)
    pub fn mean(&self) -> Complex<f32> {
        if self.buf.is_empty() {
            return Complex::new(0.0, 0.0);
        }
        let sum: Complex<f32> = self.buf.iter().sum();
        sum / self.buf.len() as f32
    }

    /// Copy the current contents, oldest first
    pub fn snapshot(&self) -> Vec<Complex<f32>> {
        self.buf.iter().copied().collect()
    }
}

/// A complete reply frame ready for the clustering stage.
///
/// Immutable once delivered; frames are emitted in arrival order, one per
/// synchronized reply.
#[derive(Debug, Clone)]
pub struct ReplyFrame {
    /// Exactly `n_frame` samples starting at the synchronized reply start
    pub samples: Vec<Complex<f32>>,
    /// DC window snapshot frozen when the command was declared
    pub dc_samples: Vec<Complex<f32>>,
    /// Complex mean of `dc_samples`
    pub dc_est: Complex<f32>,
    /// Channel estimate from the preamble one-bit mid-chip samples
    pub h_est: Complex<f32>,
    /// Winning preamble correlation magnitude
    pub sync_corr: f32,
    /// Absolute sample index of the first frame sample
    pub start_index: u64,
}

/// Events reported by [`FrameDetector::push`]
#[derive(Debug, Clone)]
pub enum DetectorEvent {
    /// A reader command was declared at the given absolute sample index
    CommandDetected { index: u64, dc_est: Complex<f32> },
    /// A reply frame completed
    FrameReady(ReplyFrame),
}

enum DetectorState {
    Seeking {
        dc_window: SampleWindow,
        signal_level: SignalLevel,
        pulse_nsamples: usize,
        pulse_count: u32,
    },
    Synchronizing {
        buffer: Vec<Complex<f32>>,
        cursor: usize,
        best_corr: f32,
        best_offset: usize,
        dc_samples: Vec<Complex<f32>>,
        dc_est: Complex<f32>,
        command_index: u64,
    },
    Accumulating {
        frame: Vec<Complex<f32>>,
        dc_samples: Vec<Complex<f32>>,
        dc_est: Complex<f32>,
        h_est: Complex<f32>,
        sync_corr: f32,
        start_index: u64,
    },
}

/// Streaming reply-frame detector.
///
/// Accepts push-style sample delivery and is resumable across delivery
/// boundaries; feed it samples one at a time and act on the returned events.
pub struct FrameDetector {
    config: ExtractorConfig,
    template: Vec<f32>,
    state: DetectorState,
    nsamples: u64,
}

impl FrameDetector {
    pub fn new(config: ExtractorConfig) -> Self {
        let template = config.preamble_template();
        let state = Self::seeking_state(&config);
        Self {
            config,
            template,
            state,
            nsamples: 0,
        }
    }

    fn seeking_state(config: &ExtractorConfig) -> DetectorState {
        DetectorState::Seeking {
            dc_window: SampleWindow::new(config.dc_window_len()),
            signal_level: SignalLevel::High,
            pulse_nsamples: 0,
            pulse_count: 0,
        }
    }

    /// Advance the detector by one sample.
    ///
    /// Returns a [`DetectorEvent`] when a command is declared or a frame
    /// completes, `None` otherwise.
    pub fn push(&mut self, sample: Complex<f32>) -> Option<DetectorEvent> {
        let index = self.nsamples;
        self.nsamples += 1;

        let config = &self.config;
        let template = &self.template;
        let mut event = None;

        let next = match &mut self.state {
            DetectorState::Seeking {
                dc_window,
                signal_level,
                pulse_nsamples,
                pulse_count,
            } => {
                dc_window.push(sample);
                let ampl = sample.norm();
                *pulse_nsamples += 1;

                // negative edge: carrier drops below the pulse threshold
                if ampl <= config.pulse_threshold && *signal_level == SignalLevel::High {
                    *signal_level = SignalLevel::Low;
                    *pulse_nsamples = 0;
                }
                // positive edge: count the pulse only if the low dwell was
                // long enough to be a real reader pulse
                if ampl > config.pulse_threshold && *signal_level == SignalLevel::Low {
                    *signal_level = SignalLevel::High;
                    if *pulse_nsamples > config.n_pulse_width / 2 {
                        *pulse_count += 1;
                    } else {
                        *pulse_count = 0;
                    }
                    *pulse_nsamples = 0;
                }

                if *pulse_nsamples > config.n_t1
                    && *signal_level == SignalLevel::High
                    && *pulse_count > config.reader_min_pulses
                {
                    let dc_samples = dc_window.snapshot();
                    let dc_est = dc_window.mean();
                    info!(
                        index,
                        pulses = *pulse_count,
                        dc_mag = dc_est.norm(),
                        "reader command detected"
                    );
                    event = Some(DetectorEvent::CommandDetected { index, dc_est });
                    Some(DetectorState::Synchronizing {
                        buffer: Vec::with_capacity(config.n_frame),
                        cursor: 0,
                        best_corr: 0.0,
                        best_offset: 0,
                        dc_samples,
                        dc_est,
                        command_index: index,
                    })
                } else {
                    None
                }
            }

            DetectorState::Synchronizing {
                buffer,
                cursor,
                best_corr,
                best_offset,
                dc_samples,
                dc_est,
                command_index,
            } => {
                buffer.push(sample);

                if buffer.len() >= *cursor + template.len() {
                    let mut corr = Complex::new(0.0f32, 0.0);
                    for (j, &chip) in template.iter().enumerate() {
                        corr += (buffer[*cursor + j] - *dc_est) * chip;
                    }
                    let corr_mag = corr.norm();
                    // first offset to reach the maximum wins
                    if corr_mag > *best_corr {
                        *best_corr = corr_mag;
                        *best_offset = *cursor;
                    }
                    *cursor += 1;
                }

                if *cursor >= config.correlation_len {
                    let mut h_sum = Complex::new(0.0f32, 0.0);
                    let mut ones = 0usize;
                    for (bit_idx, &bit) in FM0_PREAMBLE.iter().enumerate() {
                        if bit == 1 {
                            h_sum += buffer[*best_offset + bit_idx * config.sps + config.sps / 2];
                            ones += 1;
                        }
                    }
                    let h_est = h_sum / ones as f32;
                    let start_index = *command_index + 1 + *best_offset as u64;
                    debug!(
                        start_index,
                        corr = *best_corr,
                        h_mag = h_est.norm(),
                        "preamble synchronized"
                    );

                    let mut frame = std::mem::take(buffer);
                    frame.drain(..*best_offset);
                    Some(DetectorState::Accumulating {
                        frame,
                        dc_samples: std::mem::take(dc_samples),
                        dc_est: *dc_est,
                        h_est,
                        sync_corr: *best_corr,
                        start_index,
                    })
                } else {
                    None
                }
            }

            DetectorState::Accumulating {
                frame,
                dc_samples,
                dc_est,
                h_est,
                sync_corr,
                start_index,
            } => {
                if frame.len() < config.n_frame {
                    frame.push(sample);
                }
                if frame.len() == config.n_frame {
                    info!(
                        start_index = *start_index,
                        end_index = index,
                        "reply frame complete"
                    );
                    event = Some(DetectorEvent::FrameReady(ReplyFrame {
                        samples: std::mem::take(frame),
                        dc_samples: std::mem::take(dc_samples),
                        dc_est: *dc_est,
                        h_est: *h_est,
                        sync_corr: *sync_corr,
                        start_index: *start_index,
                    }));
                    Some(Self::seeking_state(config))
                } else {
                    None
                }
            }
        };

        if let Some(state) = next {
            self.state = state;
        }
        event
    }

    /// Total number of samples consumed so far
    pub fn samples_seen(&self) -> u64 {
        self.nsamples
    }
}
