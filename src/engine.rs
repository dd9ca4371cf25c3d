use crate::artifacts::ModelArtifacts;
use crate::config::RecognizerConfig;
use crate::error::Result;

/// Builds recognizer engines from model artifacts.
///
/// This is the seam between the model lifecycle (manager, prober) and the actual
/// inference runtime. Construction is the expensive step; the prober builds and
/// discards throwaway engines to test whether a device id is usable.
pub trait RecognizerFactory {
    /// The engine type produced by this factory.
    type Engine: RecognizerEngine;

    /// Construct a recognizer bound to `config`'s provider and device.
    ///
    /// Construction failures on the accelerated provider are expected on machines
    /// without a usable adapter; callers fold them into fallback decisions rather than
    /// escalating.
    fn build(&self, artifacts: &ModelArtifacts, config: &RecognizerConfig) -> Result<Self::Engine>;
}

/// A loaded recognition model.
///
/// Each call runs one synchronous recognition pass over a single audio window. Windows
/// are independent: no acoustic context is carried between calls.
pub trait RecognizerEngine {
    /// Recognize one window of mono `f32` samples in `[-1, 1]` and return its text.
    fn recognize(&mut self, sample_rate: u32, samples: &[f32]) -> Result<String>;
}
