use anyhow::Result;
use clap::Parser;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use sotto::config::{AUTO_DEVICE_ID, default_thread_count};
use sotto::wav::DEFAULT_CHUNK_SECONDS;
use sotto::{
    CancelToken, EventSink, TranscribeRequest, Transcriber, TranscriptionEvent, artifacts,
};

#[derive(Parser, Debug)]
#[command(name = "sotto")]
#[command(about = "A speech-to-text CLI")]
struct Params {
    /// Path to a WAVE file to transcribe.
    #[arg(short = 'a', long = "audio")]
    pub audio_path: PathBuf,

    /// Directory holding the model weights and vocabulary.
    /// Defaults to `SOTTO_MODELS_DIR`, then the per-user data directory.
    #[arg(short = 'm', long = "models-dir")]
    pub models_dir: Option<PathBuf>,

    /// Run on the CPU even when an accelerator is present.
    #[arg(long = "cpu", default_value_t = false)]
    pub cpu: bool,

    /// Accelerator device id; negative probes for the best one.
    #[arg(
        short = 'd',
        long = "device",
        default_value_t = AUTO_DEVICE_ID,
        allow_negative_numbers = true
    )]
    pub device_id: i32,

    /// Recognizer thread count for CPU inference.
    #[arg(short = 't', long = "threads", default_value_t = default_thread_count())]
    pub thread_count: usize,

    /// Recognition window length in seconds.
    #[arg(long = "chunk-seconds", default_value_t = DEFAULT_CHUNK_SECONDS)]
    pub chunk_seconds: u32,
}

/// Sink that prints every event as one JSON line.
struct JsonLineSink<W: Write> {
    writer: W,
    failed: bool,
}

impl<W: Write> EventSink for JsonLineSink<W> {
    fn emit(&mut self, event: TranscriptionEvent) -> sotto::Result<()> {
        if matches!(event, TranscriptionEvent::Error { .. }) {
            self.failed = true;
        }
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

fn main() -> ExitCode {
    sotto::logging::init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("sotto: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<bool> {
    let params = Params::parse();

    let models_dir = params
        .models_dir
        .unwrap_or_else(artifacts::default_models_dir);
    let transcriber = Transcriber::new(models_dir).with_chunk_seconds(params.chunk_seconds);

    let request = TranscribeRequest {
        audio_path: params.audio_path,
        use_acceleration: !params.cpu,
        thread_count: params.thread_count.max(1),
        device_id: params.device_id,
    };

    let stdout = io::stdout();
    let mut sink = JsonLineSink {
        writer: BufWriter::new(stdout.lock()),
        failed: false,
    };

    transcriber.transcribe(&request, &CancelToken::new(), &mut sink)?;
    Ok(!sink.failed)
}
