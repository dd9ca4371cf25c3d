//! High-level API for running transcriptions with Sotto.
//!
//! [`Transcriber`] is the top-level driver: it reconciles the requested recognizer
//! config against the loaded one (reloading when they drift), pulls windows from the
//! chunked decoder, feeds each to the loaded model, and emits an ordered
//! [`TranscriptionEvent`] sequence through an [`EventSink`].
//!
//! Event ordering is part of the contract: zero or one `Loading`, then one
//! `Processing` per recognized window in production order, then exactly one terminal
//! `Success` or `Error`. Already-emitted `Processing` events are never retracted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backends::whisper::WhisperFactory;
use crate::config::{AUTO_DEVICE_ID, RecognizerConfig, default_thread_count, needs_reload};
use crate::engine::{RecognizerEngine, RecognizerFactory};
use crate::error::{Error, Result};
use crate::manager::ModelManager;
use crate::wav::{DEFAULT_CHUNK_SECONDS, WavChunks};

/// One transcription request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeRequest {
    /// Path to a WAVE file on local disk.
    pub audio_path: PathBuf,

    /// Whether to run on an accelerated provider (with transparent CPU fallback).
    #[serde(default = "default_use_acceleration")]
    pub use_acceleration: bool,

    /// Recognizer thread count for CPU inference.
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    /// Accelerator device id; negative means "probe for the best one".
    #[serde(default = "default_device_id")]
    pub device_id: i32,
}

fn default_use_acceleration() -> bool {
    true
}

fn default_device_id() -> i32 {
    AUTO_DEVICE_ID
}

/// Incremental progress and terminal outcome of a transcription request.
///
/// Serialized with a `status` tag so the wire format matches what the desktop client
/// expects: `loading_model`, `processing`, `success`, `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TranscriptionEvent {
    /// The model is being (re)loaded before any audio is touched.
    #[serde(rename = "loading_model")]
    Loading,

    /// One recognized window. `progress` is clamped to `[0.01, 0.99]` so intermediate
    /// values are never exactly 0 or 1.
    Processing { progress: f64 },

    /// Terminal success: the full transcript plus timing details.
    Success {
        text: String,
        /// Wall-clock processing time for the whole request.
        duration_ms: u64,
        /// Human-readable label of the device the model ran on.
        device: String,
        /// Real-time factor: processing time divided by audio duration.
        rtf: f64,
    },

    /// Terminal failure. Prior `Processing` events are not retracted.
    Error { error: String },
}

impl TranscriptionEvent {
    /// Whether this event terminates the request's event sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TranscriptionEvent::Success { .. } | TranscriptionEvent::Error { .. }
        )
    }
}

/// Consumer callback for the ordered event stream.
///
/// Implementations decide delivery: collect into memory, write SSE frames, push into a
/// channel. Returning an error aborts the transcription (the caller went away).
pub trait EventSink {
    fn emit(&mut self, event: TranscriptionEvent) -> Result<()>;
}

/// Collecting sink, mostly useful for tests and the CLI.
impl EventSink for Vec<TranscriptionEvent> {
    fn emit(&mut self, event: TranscriptionEvent) -> Result<()> {
        self.push(event);
        Ok(())
    }
}

/// Cooperative cancellation flag, polled at chunk boundaries.
///
/// Cancellation is not preemptive: a window already inside the recognizer finishes
/// before the flag is observed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Service status as reported by the status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub model_loaded: bool,
    pub device: String,
}

/// The main high-level transcription entry point.
///
/// `Transcriber` owns the single shared model slot behind a mutex: load, unload, and
/// transcribe all acquire it, so a reload can never interleave with another request's
/// in-flight recognition and a model can never be unloaded mid-recognition.
pub struct Transcriber<F: RecognizerFactory = WhisperFactory> {
    manager: Mutex<ModelManager<F>>,
    chunk_seconds: u32,
}

impl Transcriber<WhisperFactory> {
    /// Create a transcriber using the built-in Whisper backend.
    pub fn new(models_dir: PathBuf) -> Self {
        Self::with_factory(WhisperFactory::new(), models_dir)
    }
}

impl<F: RecognizerFactory> Transcriber<F> {
    /// Create a transcriber using a custom recognizer factory.
    pub fn with_factory(factory: F, models_dir: PathBuf) -> Self {
        Self {
            manager: Mutex::new(ModelManager::new(factory, models_dir)),
            chunk_seconds: DEFAULT_CHUNK_SECONDS,
        }
    }

    /// Override the recognition window length (mainly for tests).
    pub fn with_chunk_seconds(mut self, chunk_seconds: u32) -> Self {
        self.chunk_seconds = chunk_seconds.max(1);
        self
    }

    /// Load (or reload) the model explicitly.
    ///
    /// Returns the resulting device label.
    pub fn load(&self, use_acceleration: bool, device_id: i32) -> Result<String> {
        let mut manager = self.lock_manager();
        manager
            .load(use_acceleration, device_id, default_thread_count())
            .map(str::to_owned)
    }

    /// Drop the loaded model. The next transcribe call reloads on demand.
    pub fn unload(&self) {
        self.lock_manager().unload();
    }

    pub fn status(&self) -> ServiceStatus {
        let manager = self.lock_manager();
        ServiceStatus {
            model_loaded: manager.is_loaded(),
            device: manager.device_label().to_owned(),
        }
    }

    /// Run one transcription request, emitting the ordered event sequence into `sink`.
    ///
    /// Domain failures become a terminal `Error` event and `Ok(())` is returned; an
    /// `Err` from this function means the sink itself failed (the caller went away).
    pub fn transcribe(
        &self,
        request: &TranscribeRequest,
        cancel: &CancelToken,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        let started = Instant::now();
        let mut manager = self.lock_manager();

        let terminal = match self.run(&mut manager, request, cancel, sink, started) {
            Ok(success) => success,
            Err(err) => {
                info!(error = %err, audio = %request.audio_path.display(), "transcription failed");
                TranscriptionEvent::Error {
                    error: err.to_string(),
                }
            }
        };

        sink.emit(terminal)
    }

    /// The per-request state machine: reconcile config, verify audio, then the
    /// recognize-and-report loop. Returns the terminal `Success` event; every failure
    /// maps to an error the caller turns into the terminal `Error` event.
    fn run(
        &self,
        manager: &mut ModelManager<F>,
        request: &TranscribeRequest,
        cancel: &CancelToken,
        sink: &mut dyn EventSink,
        started: Instant,
    ) -> Result<TranscriptionEvent> {
        let requested = RecognizerConfig::requested(
            request.use_acceleration,
            request.device_id,
            request.thread_count,
        );

        if needs_reload(manager.current_config(), &requested) {
            debug!(?requested, "config drift detected, reloading model");
            sink.emit(TranscriptionEvent::Loading)?;
            manager
                .load(
                    request.use_acceleration,
                    request.device_id,
                    request.thread_count,
                )
                .map_err(|err| match err {
                    load @ Error::ModelLoad(_) => load,
                    other => Error::ModelLoad(other.to_string()),
                })?;
        }

        if !request.audio_path.is_file() {
            return Err(Error::AudioNotFound(request.audio_path.clone()));
        }

        let chunks = WavChunks::open(&request.audio_path, self.chunk_seconds)?;
        let total_audio_ms = chunks.total_duration_ms();

        let device = manager.device_label().to_owned();
        let engine = manager
            .engine_mut()
            .ok_or_else(|| Error::ModelLoad("no model loaded".into()))?;

        info!(
            audio = %request.audio_path.display(),
            total_audio_ms,
            device = %device,
            "starting chunked transcription"
        );

        let mut fragments: Vec<String> = Vec::new();
        for chunk in chunks {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let chunk = chunk?;
            if chunk.is_last {
                break;
            }
            if chunk.samples.is_empty() {
                continue;
            }

            // Each window is recognized independently; fragments concatenate in
            // arrival order. No acoustic context crosses a window boundary.
            let text = engine
                .recognize(chunk.sample_rate, &chunk.samples)
                .map_err(|err| Error::Recognition(err.to_string()))?;
            if !text.is_empty() {
                fragments.push(text);
            }

            sink.emit(TranscriptionEvent::Processing {
                progress: clamp_progress(chunk.progress),
            })?;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let rtf = real_time_factor(duration_ms, total_audio_ms);

        info!(duration_ms, rtf, "transcription complete");

        Ok(TranscriptionEvent::Success {
            text: fragments.concat(),
            duration_ms,
            device,
            rtf,
        })
    }

    fn lock_manager(&self) -> std::sync::MutexGuard<'_, ModelManager<F>> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clamp display progress so intermediate events never read exactly 0 or 1.
fn clamp_progress(progress: f64) -> f64 {
    progress.clamp(0.01, 0.99)
}

/// Real-time factor: wall-clock processing time over audio duration (0 when the audio
/// has no duration). Rounded to three decimals for the wire.
fn real_time_factor(wall_ms: u64, audio_ms: u64) -> f64 {
    if audio_ms == 0 {
        return 0.0;
    }
    let rtf = wall_ms as f64 / audio_ms as f64;
    (rtf * 1000.0).round() / 1000.0
}
