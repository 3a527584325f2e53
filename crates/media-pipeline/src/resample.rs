//! Streaming sample-rate conversion.
//!
//! Wraps Rubato's asynchronous sinc resampler behind a push interface: feed
//! any number of decoded frames, receive converted frames through a callback.
//! Matching rates pass audio through untouched.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

pub struct StreamResampler {
    inner: Option<Async<f32>>,
    channels: usize,
    chunk_frames: usize,
    pending: Vec<f32>,
    out: Vec<f32>,
}

impl StreamResampler {
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        let channels = channels.max(1);
        let chunk_frames = chunk_frames.max(1);
        if src_rate == dst_rate {
            return Ok(Self {
                inner: None,
                channels,
                chunk_frames,
                pending: Vec::new(),
                out: Vec::new(),
            });
        }
        if src_rate == 0 || dst_rate == 0 {
            return Err(anyhow!("invalid sample rates {src_rate} -> {dst_rate}"));
        }

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let resampler = Async::<f32>::new_sinc(
            dst_rate as f64 / src_rate as f64,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| anyhow!("resampler init: {e}"))?;
        let out = vec![0.0f32; channels * resampler.output_frames_max()];

        Ok(Self {
            inner: Some(resampler),
            channels,
            chunk_frames,
            pending: Vec::with_capacity(channels * chunk_frames * 2),
            out,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Convert `input` and hand every produced block to `emit`.
    ///
    /// Frames short of a full chunk are held until more input or
    /// [`finish`](Self::finish).
    pub fn process(&mut self, input: &[f32], mut emit: impl FnMut(&[f32])) -> Result<()> {
        if self.inner.is_none() {
            emit(input);
            return Ok(());
        }
        self.pending.extend_from_slice(input);

        let chunk_samples = self.chunk_frames * self.channels;
        let mut consumed = 0;
        while self.pending.len() - consumed >= chunk_samples {
            let produced = self.run(consumed, self.chunk_frames, None)?;
            emit(&self.out[..produced]);
            consumed += chunk_samples;
        }
        self.pending.drain(..consumed);
        Ok(())
    }

    /// Flush held frames at end of stream.
    pub fn finish(&mut self, mut emit: impl FnMut(&[f32])) -> Result<()> {
        if self.inner.is_none() || self.pending.is_empty() {
            return Ok(());
        }
        let tail_frames = self.pending.len() / self.channels;
        self.pending.truncate(tail_frames * self.channels);
        if tail_frames > 0 {
            // The resampler always reads a full chunk; pad the tail with silence.
            self.pending.resize(self.chunk_frames * self.channels, 0.0);
            let produced = self.run(0, self.chunk_frames, Some(tail_frames))?;
            if produced > 0 {
                emit(&self.out[..produced]);
            }
        }
        self.pending.clear();
        Ok(())
    }

    /// Drop held frames and filter state, e.g. after a seek.
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(inner) = self.inner.as_mut() {
            inner.reset();
        }
    }

    /// Resample `frames` frames of `pending` starting at sample `offset`.
    /// Returns the number of output samples written to `out`.
    fn run(&mut self, offset: usize, frames: usize, partial_len: Option<usize>) -> Result<usize> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(0);
        };
        let channels = self.channels;
        let input = &self.pending[offset..offset + frames * channels];
        let input_adapter = InterleavedSlice::new(input, channels, frames)
            .map_err(|e| anyhow!("interleaved input: {e}"))?;
        let out_frames = self.out.len() / channels;
        let mut output_adapter = InterleavedSlice::new_mut(&mut self.out, channels, out_frames)
            .map_err(|e| anyhow!("interleaved output: {e}"))?;

        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len,
        };
        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resample: {e}"))?;
        Ok(nbr_out * channels)
    }
}
