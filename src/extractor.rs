//! Capture-level extraction driver
//!
//! Streams a captured signal through the frame detector and runs the
//! clustering pipeline on each completed frame. Frames that fail extraction
//! are logged and dropped; scanning continues from the sample after the
//! failed frame.

use num::complex::Complex;
use tracing::{debug, info};

use crate::cluster::{extract_from_frame, CrosstalkEstimate};
use crate::config::ExtractorConfig;
use crate::detector::{DetectorEvent, FrameDetector, ReplyFrame};

/// Scan a capture and deliver one crosstalk estimate per decodable reply.
///
/// The callback receives each estimate with its source frame and returns
/// whether scanning should continue. Returns the number of estimates
/// delivered.
pub fn extract_crosstalk<F>(
    signal: &[Complex<f32>],
    config: &ExtractorConfig,
    mut callback: F,
) -> usize
where
    F: FnMut(CrosstalkEstimate, &ReplyFrame) -> bool,
{
    let mut detector = FrameDetector::new(config.clone());
    let mut delivered = 0usize;

    for &sample in signal {
        let frame = match detector.push(sample) {
            Some(DetectorEvent::FrameReady(frame)) => frame,
            _ => continue,
        };
        match extract_from_frame(&frame, config) {
            Ok(estimate) => {
                delivered += 1;
                if !callback(estimate, &frame) {
                    break;
                }
            }
            Err(err) => {
                debug!(%err, start_index = frame.start_index, "frame discarded");
            }
        }
    }

    info!(
        delivered,
        consumed = detector.samples_seen(),
        "capture scan finished"
    );
    delivered
}
