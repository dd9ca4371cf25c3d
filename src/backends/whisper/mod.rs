//! Built-in backend powered by `whisper-rs` / `whisper.cpp`.
//!
//! Construction binds the context to the requested provider: `use_gpu` plus a concrete
//! `gpu_device` for accelerated configs, CPU otherwise. Construction failures on the
//! accelerated path are expected on machines without a usable adapter; the manager and
//! prober fold them into their fallback decisions.

use anyhow::{Context, Result as AnyResult};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::artifacts::ModelArtifacts;
use crate::config::{Provider, RecognizerConfig};
use crate::engine::{RecognizerEngine, RecognizerFactory};
use crate::error::{Error, Result};

mod logging;

use logging::init_whisper_logging;

/// whisper.cpp's expected input sample rate (Hz).
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Factory for [`WhisperEngine`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhisperFactory;

impl WhisperFactory {
    pub fn new() -> Self {
        Self
    }
}

impl RecognizerFactory for WhisperFactory {
    type Engine = WhisperEngine;

    fn build(&self, artifacts: &ModelArtifacts, config: &RecognizerConfig) -> Result<Self::Engine> {
        Ok(WhisperEngine::new(artifacts, config)?)
    }
}

/// A loaded whisper.cpp model bound to one provider and device.
pub struct WhisperEngine {
    ctx: WhisperContext,
    thread_count: usize,
}

impl WhisperEngine {
    fn new(artifacts: &ModelArtifacts, config: &RecognizerConfig) -> AnyResult<Self> {
        // We keep whisper.cpp logs quiet so the sidecar fully controls stdout/stderr.
        // This function is idempotent (safe to call multiple times).
        init_whisper_logging();

        let weights = artifacts
            .weights
            .to_str()
            .context("model weights path is not valid UTF-8")?;

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(config.provider == Provider::Accelerated);
        ctx_params.gpu_device(config.device_id.max(0));

        let ctx = WhisperContext::new_with_params(weights, ctx_params)
            .with_context(|| format!("failed to load model from '{weights}'"))?;

        Ok(Self {
            ctx,
            thread_count: config.thread_count.max(1),
        })
    }

    fn full_params(&self) -> FullParams<'_, '_> {
        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: 5,
            patience: 1.0,
        });

        params.set_n_threads(self.thread_count as i32);
        // No language hint: let whisper auto-detect per window.
        params.set_language(None);
        params.set_no_context(true);
        params.set_single_segment(false);

        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        params
    }
}

impl RecognizerEngine for WhisperEngine {
    /// Run one synchronous recognition pass over a single window.
    ///
    /// A fresh state is created per window, so no acoustic context crosses window
    /// boundaries.
    fn recognize(&mut self, sample_rate: u32, samples: &[f32]) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        if sample_rate != WHISPER_SAMPLE_RATE {
            return Err(Error::Recognition(format!(
                "whisper requires {WHISPER_SAMPLE_RATE} Hz input, got {sample_rate} Hz"
            )));
        }

        let run = || -> AnyResult<String> {
            let mut state = self
                .ctx
                .create_state()
                .context("failed to create whisper state")?;

            state
                .full(self.full_params(), samples)
                .context("failed to run whisper full()")?;

            let mut text = String::new();
            for segment in state.as_iter() {
                text.push_str(segment.to_str().context("failed to get segment text")?);
            }

            Ok(text.trim().to_owned())
        };

        Ok(run()?)
    }
}
