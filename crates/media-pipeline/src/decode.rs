//! Source probing and the per-pipeline decode worker.
//!
//! The worker thread decodes packets with Symphonia, converts them to the
//! output rate and pushes interleaved `f32` into the pipeline queue. It stays
//! alive after end of stream so a later seek can restart decoding, and only
//! exits on [`DecodeCommand::Shutdown`] or when its pipeline is dropped.

use std::fs::File;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use stream_core::MediaLocator;
use stream_core::engine::BusMessage;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::playback::PlaybackShared;
use crate::queue::SharedAudio;
use crate::resample::StreamResampler;

/// Metadata captured while probing the source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub sample_rate: u32,
    pub channels: usize,
    pub duration: Option<Duration>,
    /// Codec label, best-effort.
    pub codec: Option<String>,
}

/// A probed source ready to hand to a [`DecodeWorker`].
pub struct OpenedSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    pub info: SourceInfo,
}

/// Probe a local media file and build its decoder.
///
/// Only `file://` locators (or bare paths) are supported.
pub fn open_source(media: &MediaLocator) -> Result<OpenedSource> {
    let Some(path) = media.to_file_path() else {
        bail!("unsupported media scheme '{}'", media.scheme());
    };
    let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;

    let mut hint = Hint::new();
    if let Some(ext) = media.extension() {
        hint.with_extension(&ext);
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("probe {media}"))?;
    let format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let codec_params = track.codec_params.clone();
    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;

    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .with_context(|| format!("no decoder for {media}"))?;

    Ok(OpenedSource {
        track_id: track.id,
        format,
        decoder,
        info: SourceInfo {
            sample_rate,
            channels,
            duration: duration_from_codec_params(&codec_params),
            codec: codec_name_from_params(&codec_params),
        },
    })
}

pub enum DecodeCommand {
    Seek {
        position: Duration,
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

/// Owner side of a decode worker thread.
pub struct DecodeWorker {
    commands: Sender<DecodeCommand>,
    queue: Arc<SharedAudio>,
    join: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    pub fn spawn(
        source: OpenedSource,
        resampler: StreamResampler,
        queue: Arc<SharedAudio>,
        shared: Arc<PlaybackShared>,
        bus: Sender<BusMessage>,
        label: String,
    ) -> Result<Self> {
        let (commands, rx) = crossbeam_channel::unbounded();
        let mut worker = WorkerLoop {
            format: source.format,
            decoder: source.decoder,
            track_id: source.track_id,
            resampler,
            queue: queue.clone(),
            shared,
            bus,
            commands: rx,
            label,
            finished: false,
            skip_frames: 0,
        };
        let join = thread::Builder::new()
            .name("stream-decode".to_string())
            .spawn(move || worker.run())
            .context("spawn decode thread")?;

        Ok(Self {
            commands,
            queue,
            join: Some(join),
        })
    }

    /// Reposition decoding and wait for the worker to confirm.
    pub fn seek(&self, position: Duration, timeout: Duration) -> Result<()> {
        let (reply, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(DecodeCommand::Seek { position, reply })
            .map_err(|_| anyhow!("decode worker stopped"))?;
        // Wakes a worker blocked on a full queue so it can see the command.
        self.queue.flush();
        reply_rx
            .recv_timeout(timeout)
            .map_err(|_| anyhow!("seek not confirmed within {timeout:?}"))?
    }

    /// Stop the worker and join it. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        let _ = self.commands.send(DecodeCommand::Shutdown);
        self.queue.close();
        if join.join().is_err() {
            tracing::warn!("decode thread panicked");
        }
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WorkerLoop {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    resampler: StreamResampler,
    queue: Arc<SharedAudio>,
    shared: Arc<PlaybackShared>,
    bus: Sender<BusMessage>,
    commands: Receiver<DecodeCommand>,
    label: String,
    finished: bool,
    /// Decoded frames to drop after an accurate seek landed early.
    skip_frames: u64,
}

impl WorkerLoop {
    fn run(&mut self) {
        loop {
            let next = if self.finished {
                self.commands.recv().ok()
            } else {
                match self.commands.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(TryRecvError::Empty) => {
                        self.decode_next();
                        continue;
                    }
                    Err(TryRecvError::Disconnected) => None,
                }
            };
            match next {
                Some(DecodeCommand::Seek { position, reply }) => {
                    let _ = reply.send(self.seek(position));
                }
                Some(DecodeCommand::Shutdown) | None => break,
            }
        }
        self.queue.close();
        tracing::debug!(media = %self.label, "decode worker exited");
    }

    fn decode_next(&mut self) {
        let packet = match self.format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.end_of_stream();
                return;
            }
            Err(e) => {
                self.fail(format!("read packet failed: {e}"));
                return;
            }
        };
        if packet.track_id() != self.track_id {
            return;
        }

        let decoded = match self.decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(media = %self.label, "skipping corrupt packet: {e}");
                return;
            }
            Err(SymphoniaError::ResetRequired) => {
                self.decoder.reset();
                return;
            }
            Err(e) => {
                self.fail(format!("decode failed: {e}"));
                return;
            }
        };
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);

        let channels = self.queue.channels();
        let mut samples = sample_buf.samples();
        if self.skip_frames > 0 {
            let frames = (samples.len() / channels) as u64;
            let skip = self.skip_frames.min(frames);
            self.skip_frames -= skip;
            samples = &samples[skip as usize * channels..];
        }
        if samples.is_empty() {
            return;
        }

        let queue = &self.queue;
        if let Err(e) = self
            .resampler
            .process(samples, |out| queue.push_interleaved_blocking(out))
        {
            self.fail(format!("{e:#}"));
        }
    }

    fn end_of_stream(&mut self) {
        let queue = &self.queue;
        if let Err(e) = self
            .resampler
            .finish(|out| queue.push_interleaved_blocking(out))
        {
            tracing::warn!(media = %self.label, "resampler tail failed: {e:#}");
        }
        self.queue.close();
        self.finished = true;
        tracing::debug!(media = %self.label, "decode reached end of stream");
    }

    fn fail(&mut self, message: String) {
        tracing::warn!(media = %self.label, "{message}");
        let _ = self.bus.send(BusMessage::Error {
            message,
            debug: Some(self.label.clone()),
        });
        self.queue.close();
        self.finished = true;
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let time = Time::new(
            position.as_secs(),
            f64::from(position.subsec_nanos()) / 1_000_000_000.0,
        );
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| anyhow!("seek failed: {e}"))?;

        self.decoder.reset();
        self.resampler.reset();
        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.queue.reopen();
        self.shared.reset_progress();
        self.finished = false;
        tracing::debug!(media = %self.label, ?position, "decode repositioned");
        Ok(())
    }
}

/// Duration from codec metadata, when the container reports total frames.
fn duration_from_codec_params(codec_params: &CodecParameters) -> Option<Duration> {
    let frames = codec_params.n_frames?;
    let rate = u64::from(codec_params.sample_rate?);
    if rate == 0 {
        return None;
    }
    let secs = frames / rate;
    let nanos = (frames % rate).saturating_mul(1_000_000_000) / rate;
    Some(Duration::new(secs, nanos as u32))
}

fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use symphonia::core::codecs::*;

    /// Write a mono 16-bit PCM WAV ramp and return its path.
    fn write_test_wav(name: &str, rate: u32, frames: u32) -> PathBuf {
        let path = std::env::temp_dir().join(format!("media-pipeline-{}-{name}.wav", std::process::id()));
        let data_len = frames * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames {
            let sample = ((i % 200) as i16 - 100) * 100;
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        let mut file = File::create(&path).unwrap();
        file.write_all(&bytes).unwrap();
        path
    }

    fn drain(queue: &SharedAudio) -> usize {
        let mut frames = 0;
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(chunk) = queue.pop_up_to(4096) {
                frames += chunk.len() / queue.channels();
            } else if queue.is_drained() || std::time::Instant::now() > deadline {
                return frames;
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn duration_from_codec_params_handles_zero_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(0);
        params.n_frames = Some(100);
        assert!(duration_from_codec_params(&params).is_none());
    }

    #[test]
    fn duration_from_codec_params_computes() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(48_000);
        params.n_frames = Some(108_000);
        assert_eq!(
            duration_from_codec_params(&params),
            Some(Duration::from_millis(2250))
        );
    }

    #[test]
    fn codec_name_from_params_maps_known_codecs() {
        let mut params = CodecParameters::new();
        params.codec = CODEC_TYPE_FLAC;
        assert_eq!(codec_name_from_params(&params), Some("FLAC".to_string()));
        params.codec = CODEC_TYPE_PCM_S16LE;
        assert_eq!(codec_name_from_params(&params), Some("PCM_S16".to_string()));
        assert!(codec_name_from_params(&CodecParameters::new()).is_none());
    }

    #[test]
    fn non_file_locator_is_rejected() {
        let err = open_source(&MediaLocator::new("http://example.com/a.mp3"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let media = MediaLocator::new("/definitely/not/here.wav");
        assert!(open_source(&media).is_err());
    }

    #[test]
    fn wav_probe_reports_format_and_duration() {
        let path = write_test_wav("probe", 8_000, 8_000);
        let source = open_source(&MediaLocator::from_path(&path)).unwrap();
        assert_eq!(source.info.sample_rate, 8_000);
        assert_eq!(source.info.channels, 1);
        assert_eq!(source.info.duration, Some(Duration::from_secs(1)));
        assert_eq!(source.info.codec.as_deref(), Some("PCM_S16"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn worker_decodes_to_end_and_seeks_back() {
        let path = write_test_wav("worker", 8_000, 8_000);
        let source = open_source(&MediaLocator::from_path(&path)).unwrap();
        let queue = Arc::new(SharedAudio::new(1, 4_096));
        let shared = Arc::new(PlaybackShared::new());
        let (bus, bus_rx) = crossbeam_channel::unbounded();
        let resampler = StreamResampler::new(8_000, 8_000, 1, 256).unwrap();
        let mut worker = DecodeWorker::spawn(
            source,
            resampler,
            queue.clone(),
            shared,
            bus,
            "worker.wav".to_string(),
        )
        .unwrap();

        assert_eq!(drain(&queue), 8_000);
        assert!(queue.is_drained());

        worker
            .seek(Duration::from_millis(500), Duration::from_secs(5))
            .unwrap();
        let rest = drain(&queue);
        assert!((3_990..=4_010).contains(&rest), "decoded {rest} frames after seek");

        worker.shutdown();
        assert!(bus_rx.try_recv().is_err());
        let _ = std::fs::remove_file(path);
    }
}
