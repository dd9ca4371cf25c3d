//! Bounded-cost accelerator probing.
//!
//! Each probe is a full throwaway model construction, so the candidate list must stay
//! short and fixed. Two candidates cover the hardware we actually see in the field.

use tracing::{debug, info, warn};

use crate::artifacts::ModelArtifacts;
use crate::config::RecognizerConfig;
use crate::engine::RecognizerFactory;

/// Canonical probe order.
///
/// Device id 1 goes first: on dual-adapter laptops it conventionally addresses the
/// discrete accelerator, while id 0 addresses the primary/integrated adapter (or the
/// sole accelerator on single-GPU machines).
pub const PROBE_DEVICE_ORDER: [i32; 2] = [1, 0];

/// Try each candidate device id in order and return the first that can construct a
/// minimal recognizer, or `None` when every candidate fails (meaning "use CPU").
///
/// Probe failures are expected on machines without a usable accelerator; they are
/// logged and folded into the fallback decision, never escalated as errors.
pub fn probe_accelerator<F: RecognizerFactory>(
    factory: &F,
    artifacts: &ModelArtifacts,
    candidates: &[i32],
) -> Option<i32> {
    for &device_id in candidates {
        debug!(device_id, "probing accelerator device");

        match factory.build(artifacts, &RecognizerConfig::probe(device_id)) {
            Ok(_engine) => {
                // The probe engine is dropped immediately; only the id survives.
                info!(device_id, "accelerator probe succeeded");
                return Some(device_id);
            }
            Err(err) => {
                warn!(device_id, error = %err, "accelerator probe failed");
            }
        }
    }

    info!("no usable accelerator found, falling back to CPU");
    None
}
