//! Pipeline-wide configuration.

use std::time::Duration;

/// Tunables shared by every stage of a [`crate::pipeline::Pipeline`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Bound on how long a consumer blocks on an empty input pipe before
    /// marking itself idle. Keeping this short is what makes
    /// [`crate::pipeline::Pipeline::wait`] able to detect quiescence without
    /// a dedicated shutdown signal from every stage.
    pub consumer_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            consumer_timeout: Duration::from_micros(100_000),
        }
    }
}

impl PipelineConfig {
    /// Builds a config, clamping a zero timeout up to 1 microsecond so stages
    /// never spin a hot loop against an expired-on-arrival deadline.
    #[must_use]
    pub fn new(consumer_timeout: Duration) -> Self {
        Self {
            consumer_timeout: consumer_timeout.max(Duration::from_micros(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_100ms() {
        assert_eq!(PipelineConfig::default().consumer_timeout, Duration::from_micros(100_000));
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let cfg = PipelineConfig::new(Duration::ZERO);
        assert_eq!(cfg.consumer_timeout, Duration::from_micros(1));
    }
}
