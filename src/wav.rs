//! Chunked WAVE decoding into normalized mono float PCM.
//!
//! [`WavChunks`] reads container metadata once, then lazily emits fixed-duration
//! windows of mono `f32` samples in `[-1.0, 1.0]` with running progress. The stream is
//! finite, ordered, and non-restartable; the final item is a zero-sample sentinel with
//! `is_last = true` so consumers can finalize without carrying decodable audio.
//!
//! Format requirements:
//! - WAVE container, mono or stereo
//! - 16-bit or 32-bit signed integer PCM
//!
//! Anything else fails with `UnsupportedAudioFormat` before any chunk is emitted.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavIntoSamples, WavReader};

use crate::error::{Error, Result};

/// Default recognition window length in seconds.
pub const DEFAULT_CHUNK_SECONDS: u32 = 30;

/// One fixed-duration window of decoded audio.
///
/// Chunks are ephemeral: produced by the decoder, consumed once by the orchestrator,
/// never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Mono samples normalized to `[-1.0, 1.0]`. Empty for the sentinel chunk.
    pub samples: Vec<f32>,

    /// Source sample rate (the recognizer binds each window to this rate).
    pub sample_rate: u32,

    /// End-of-stream marker. The sentinel carries no decodable audio.
    pub is_last: bool,

    /// `processed_frames / total_frames`, strictly increasing; exactly `1.0` on the
    /// sentinel.
    pub progress: f64,

    /// Total audio duration of the whole file in milliseconds.
    pub total_duration_ms: u64,
}

/// Lazy iterator over fixed-duration windows of a WAVE file.
pub struct WavChunks {
    samples: WavIntoSamples<BufReader<File>, i32>,
    sample_rate: u32,
    channels: u16,
    /// Normalization divisor: 32768 for 16-bit input, 2147483648 for 32-bit.
    norm: f32,
    frames_per_chunk: u64,
    total_frames: u64,
    processed_frames: u64,
    total_duration_ms: u64,
    finished: bool,
}

impl WavChunks {
    /// Open `path` and validate the container before any chunk is emitted.
    pub fn open(path: &Path, chunk_seconds: u32) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();

        if spec.sample_format != SampleFormat::Int {
            return Err(Error::UnsupportedAudioFormat(format!(
                "{}-bit float PCM (supported: 16-bit or 32-bit signed integer)",
                spec.bits_per_sample
            )));
        }

        let norm = match spec.bits_per_sample {
            16 => 32768.0,
            32 => 2_147_483_648.0,
            bits => {
                return Err(Error::UnsupportedAudioFormat(format!(
                    "{bits}-bit PCM (supported: 16-bit or 32-bit signed integer)"
                )));
            }
        };

        if spec.channels == 0 || spec.channels > 2 {
            return Err(Error::UnsupportedAudioFormat(format!(
                "{} channels (supported: mono or stereo)",
                spec.channels
            )));
        }

        let total_frames = u64::from(reader.duration());
        let sample_rate = spec.sample_rate;
        let total_duration_ms = total_frames * 1000 / u64::from(sample_rate);

        Ok(Self {
            samples: reader.into_samples::<i32>(),
            sample_rate,
            channels: spec.channels,
            norm,
            frames_per_chunk: u64::from(sample_rate) * u64::from(chunk_seconds.max(1)),
            total_frames,
            processed_frames: 0,
            total_duration_ms,
            finished: false,
        })
    }

    /// Total audio duration of the underlying file in milliseconds.
    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    fn sentinel(&mut self) -> AudioChunk {
        self.finished = true;
        AudioChunk {
            samples: Vec::new(),
            sample_rate: self.sample_rate,
            is_last: true,
            progress: 1.0,
            total_duration_ms: self.total_duration_ms,
        }
    }

    /// Read up to `frames_per_chunk` frames, downmixing to mono as we go.
    ///
    /// Stereo downmix is exact by contract: `mono[i] = (left[i] + right[i]) / 2`,
    /// applied after normalization to floating range.
    fn read_chunk_frames(&mut self) -> Result<Vec<f32>> {
        let want = self
            .frames_per_chunk
            .min(self.total_frames - self.processed_frames) as usize;
        let mut mono = Vec::with_capacity(want);

        'frames: for _ in 0..want {
            let mut frame = [0.0f32; 2];
            for slot in frame.iter_mut().take(usize::from(self.channels)) {
                match self.samples.next() {
                    Some(Ok(raw)) => *slot = raw as f32 / self.norm,
                    Some(Err(err)) => return Err(err.into()),
                    // Header promised more frames than the data chunk holds; treat it
                    // as end of stream and drop the partial frame.
                    None => break 'frames,
                }
            }

            mono.push(match self.channels {
                1 => frame[0],
                _ => (frame[0] + frame[1]) / 2.0,
            });
        }

        self.processed_frames += mono.len() as u64;
        Ok(mono)
    }
}

impl Iterator for WavChunks {
    type Item = Result<AudioChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if self.processed_frames >= self.total_frames {
            return Some(Ok(self.sentinel()));
        }

        let mono = match self.read_chunk_frames() {
            Ok(mono) => mono,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };

        if mono.is_empty() {
            return Some(Ok(self.sentinel()));
        }

        Some(Ok(AudioChunk {
            samples: mono,
            sample_rate: self.sample_rate,
            is_last: false,
            progress: self.processed_frames as f64 / self.total_frames as f64,
            total_duration_ms: self.total_duration_ms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::path::PathBuf;

    fn spec(channels: u16, sample_rate: u32, bits: u16, format: SampleFormat) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: bits,
            sample_format: format,
        }
    }

    fn write_wav_i16(path: &PathBuf, channels: u16, sample_rate: u32, samples: &[i16]) {
        let mut writer =
            WavWriter::create(path, spec(channels, sample_rate, 16, SampleFormat::Int))
                .expect("create wav");
        for &s in samples {
            writer.write_sample(s).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    fn write_wav_i32(path: &PathBuf, channels: u16, sample_rate: u32, samples: &[i32]) {
        let mut writer =
            WavWriter::create(path, spec(channels, sample_rate, 32, SampleFormat::Int))
                .expect("create wav");
        for &s in samples {
            writer.write_sample(s).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    fn collect_chunks(path: &PathBuf, chunk_seconds: u32) -> Vec<AudioChunk> {
        WavChunks::open(path, chunk_seconds)
            .expect("open wav")
            .map(|c| c.expect("decode chunk"))
            .collect()
    }

    #[test]
    fn decodes_16_bit_sine_within_epsilon() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sine16.wav");

        let amplitude = 16384i16;
        let samples: Vec<i16> = (0..1600)
            .map(|i| {
                let t = i as f32 / 1600.0;
                (amplitude as f32 * (t * std::f32::consts::TAU * 5.0).sin()) as i16
            })
            .collect();
        write_wav_i16(&path, 1, 16_000, &samples);

        let chunks = collect_chunks(&path, 30);
        assert_eq!(chunks.len(), 2); // one data chunk + sentinel

        for (decoded, &raw) in chunks[0].samples.iter().zip(&samples) {
            let expected = raw as f32 / 32768.0;
            assert!(
                (decoded - expected).abs() < 1e-6,
                "decoded {decoded} != expected {expected}"
            );
        }
    }

    #[test]
    fn decodes_32_bit_sine_within_epsilon() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sine32.wav");

        let amplitude = 1i64 << 30;
        let samples: Vec<i32> = (0..800)
            .map(|i| {
                let t = i as f64 / 800.0;
                (amplitude as f64 * (t * std::f64::consts::TAU * 3.0).sin()) as i32
            })
            .collect();
        write_wav_i32(&path, 1, 8_000, &samples);

        let chunks = collect_chunks(&path, 30);
        assert_eq!(chunks.len(), 2);

        for (decoded, &raw) in chunks[0].samples.iter().zip(&samples) {
            let expected = raw as f32 / 2_147_483_648.0;
            assert!((decoded - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn stereo_downmix_is_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stereo.wav");

        let left: Vec<i16> = vec![1000, -2000, 30000, -32768, 0, 7];
        let right: Vec<i16> = vec![500, 2000, -30000, 32767, 1, -7];
        let interleaved: Vec<i16> = left
            .iter()
            .zip(&right)
            .flat_map(|(&l, &r)| [l, r])
            .collect();
        write_wav_i16(&path, 2, 16_000, &interleaved);

        let chunks = collect_chunks(&path, 30);
        assert_eq!(chunks[0].samples.len(), left.len());

        for ((decoded, &l), &r) in chunks[0].samples.iter().zip(&left).zip(&right) {
            let expected = (l as f32 / 32768.0 + r as f32 / 32768.0) / 2.0;
            assert_eq!(*decoded, expected);
        }
    }

    #[test]
    fn emits_fixed_duration_windows_then_sentinel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("long.wav");

        // 2.5 chunks of audio at 1-second windows.
        let sample_rate = 1_000u32;
        let samples = vec![100i16; 2_500];
        write_wav_i16(&path, 1, sample_rate, &samples);

        let chunks = collect_chunks(&path, 1);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].samples.len(), 1_000);
        assert_eq!(chunks[1].samples.len(), 1_000);
        assert_eq!(chunks[2].samples.len(), 500);

        let sentinel = chunks.last().expect("sentinel");
        assert!(sentinel.is_last);
        assert!(sentinel.samples.is_empty());
        assert_eq!(sentinel.progress, 1.0);
        assert_eq!(sentinel.total_duration_ms, 2_500);
    }

    #[test]
    fn intermediate_progress_is_strictly_increasing_and_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("progress.wav");
        write_wav_i16(&path, 1, 1_000, &vec![1i16; 3_500]);

        let chunks = collect_chunks(&path, 1);
        let intermediate: Vec<f64> = chunks
            .iter()
            .filter(|c| !c.is_last)
            .map(|c| c.progress)
            .collect();

        for pair in intermediate.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        for p in &intermediate {
            assert!(*p > 0.0 && *p <= 1.0);
        }
        // The last data chunk reaches exactly the end of the file.
        assert_eq!(*intermediate.last().expect("data chunks"), 1.0);
    }

    #[test]
    fn rejects_8_bit_samples_before_any_chunk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("eight.wav");

        let mut writer =
            WavWriter::create(&path, spec(1, 16_000, 8, SampleFormat::Int)).expect("create wav");
        for _ in 0..64 {
            writer.write_sample(0i8).expect("write sample");
        }
        writer.finalize().expect("finalize wav");

        let err = WavChunks::open(&path, 30).err().expect("open should fail");
        assert!(matches!(err, Error::UnsupportedAudioFormat(_)));
        assert!(err.to_string().contains("8-bit"));
    }

    #[test]
    fn rejects_float_samples_before_any_chunk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("float.wav");

        let mut writer =
            WavWriter::create(&path, spec(1, 16_000, 32, SampleFormat::Float)).expect("create wav");
        for _ in 0..64 {
            writer.write_sample(0.25f32).expect("write sample");
        }
        writer.finalize().expect("finalize wav");

        let err = WavChunks::open(&path, 30).err().expect("open should fail");
        assert!(matches!(err, Error::UnsupportedAudioFormat(_)));
    }

    #[test]
    fn empty_file_yields_only_the_sentinel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.wav");
        write_wav_i16(&path, 1, 16_000, &[]);

        let chunks = collect_chunks(&path, 30);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_last);
        assert_eq!(chunks[0].total_duration_ms, 0);
    }
}
