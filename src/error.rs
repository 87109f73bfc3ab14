use snafu::Snafu;

/// Per-frame extraction failures.
///
/// All variants are recoverable: the detector has already returned to the
/// seeking state when the clustering pipeline runs, so a failed frame is
/// simply discarded and scanning continues.
#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum ExtractError {
    /// A reference variance estimate is degenerate
    #[snafu(display(
        "reference variances must be positive (mag_var={mag_var}, phase_var={phase_var})"
    ))]
    InvalidVariance { mag_var: f64, phase_var: f64 },

    /// Fewer than 4 density peaks qualified as cluster seeds
    #[snafu(display("only {found} of 4 cluster seeds exceed the minimum density"))]
    InsufficientSeeds { found: usize },

    /// A cluster seed attracted no samples, leaving its centroid undefined
    #[snafu(display("cluster {label} attracted no samples"))]
    EmptyCluster { label: usize },

    /// The DC and channel references resolved to the same centroid
    #[snafu(display("LL and HH both mapped to cluster {index}"))]
    DegenerateQuadrantMapping { index: usize },
}
