//! Recognizer configuration and config reconciliation.
//!
//! A [`RecognizerConfig`] records exactly what a loaded model instance was built with.
//! Reconciliation between a request and the currently loaded config is an explicit pure
//! function ([`needs_reload`]) so the reload trigger stays testable in isolation.

use serde::{Deserialize, Serialize};

/// Sentinel device id meaning "probe for the best accelerator".
///
/// Requests that don't care about a specific adapter pass this and let the prober pick
/// from [`crate::probe::PROBE_DEVICE_ORDER`].
pub const AUTO_DEVICE_ID: i32 = -1;

/// Execution path the model was actually built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Cpu,
    Accelerated,
}

impl Provider {
    /// Human-readable device label exposed to callers (never the raw provider token).
    pub fn device_label(self) -> &'static str {
        match self {
            Provider::Cpu => "CPU",
            Provider::Accelerated => "Accelerated (GPU)",
        }
    }
}

/// Identifies exactly what a loaded recognizer instance was built with.
///
/// `use_acceleration` records what the caller asked for; `provider` records what the
/// build actually resolved to. Keeping both prevents reload flapping: when an
/// accelerated request falls back to CPU, the stored `use_acceleration` still matches
/// subsequent accelerated requests, so we don't rebuild (and re-fail) on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Whether the caller asked for hardware acceleration.
    pub use_acceleration: bool,

    /// Accelerator device id ([`AUTO_DEVICE_ID`] means "probe for me").
    pub device_id: i32,

    /// Threads handed to the recognizer for CPU inference.
    pub thread_count: usize,

    /// The execution path the model was actually built against.
    pub provider: Provider,
}

impl RecognizerConfig {
    /// Config as requested by a caller, before provider resolution.
    pub fn requested(use_acceleration: bool, device_id: i32, thread_count: usize) -> Self {
        Self {
            use_acceleration,
            device_id,
            thread_count,
            provider: if use_acceleration {
                Provider::Accelerated
            } else {
                Provider::Cpu
            },
        }
    }

    /// CPU-only config (used for the transparent fallback path).
    pub fn cpu(thread_count: usize) -> Self {
        Self {
            use_acceleration: false,
            device_id: AUTO_DEVICE_ID,
            thread_count,
            provider: Provider::Cpu,
        }
    }

    /// Accelerated config bound to a concrete device id.
    pub fn accelerated(device_id: i32, thread_count: usize) -> Self {
        Self {
            use_acceleration: true,
            device_id,
            thread_count,
            provider: Provider::Accelerated,
        }
    }

    /// Minimal throwaway config used by the device prober.
    ///
    /// Single-threaded on purpose: the probe result is discarded, so we spend as little
    /// as possible on construction.
    pub fn probe(device_id: i32) -> Self {
        Self::accelerated(device_id, 1)
    }
}

/// Default recognizer thread count when a caller doesn't specify one.
pub fn default_thread_count() -> usize {
    num_cpus::get()
}

/// Decide whether an incoming request requires a model reload.
///
/// Reload triggers:
/// - no model is loaded at all
/// - the acceleration preference changed
/// - the thread count changed
/// - an accelerated request names a concrete device that differs from the loaded one
///
/// The resolved `provider` is deliberately *not* compared: an accelerated request that
/// fell back to CPU must not retrigger a reload on every subsequent request.
pub fn needs_reload(current: Option<&RecognizerConfig>, requested: &RecognizerConfig) -> bool {
    let Some(current) = current else {
        return true;
    };

    current.use_acceleration != requested.use_acceleration
        || current.thread_count != requested.thread_count
        || (requested.use_acceleration
            && requested.device_id >= 0
            && current.device_id != requested.device_id)
}
