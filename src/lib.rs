//! `sotto` — a local speech-to-text sidecar with adaptive accelerator selection.
//!
//! This crate provides:
//! - Model lifecycle management against a single shared model slot
//! - Bounded-cost accelerator probing with transparent CPU fallback
//! - Chunked WAVE decoding into normalized mono float PCM
//! - A chunk-by-chunk recognize-and-report loop emitting an ordered event stream
//!
//! The library is designed to serve one logical desktop client over a long-lived
//! process, with an emphasis on predictable resource lifecycle and streaming progress.

// High-level API (most consumers should start here).
pub mod transcribe;

// Recognizer configuration and reconciliation.
pub mod config;

// Model artifact resolution and lifecycle.
pub mod artifacts;
pub mod manager;

// Accelerator probing and adapter ranking.
pub mod adapters;
pub mod probe;

// Audio decoding.
pub mod wav;

// Recognition backend seam and built-in backends.
pub mod backends;
pub mod engine;

// Error types.
pub mod error;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use crate::adapters::{AcceleratorStatus, accelerator_status};
pub use crate::artifacts::ModelArtifacts;
pub use crate::backends::whisper::WhisperFactory;
pub use crate::config::{Provider, RecognizerConfig, needs_reload};
pub use crate::engine::{RecognizerEngine, RecognizerFactory};
pub use crate::error::{Error, Result};
pub use crate::manager::ModelManager;
pub use crate::transcribe::{
    CancelToken, EventSink, ServiceStatus, TranscribeRequest, Transcriber, TranscriptionEvent,
};
