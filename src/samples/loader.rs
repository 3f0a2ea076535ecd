// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Sample decoding.
//!
//! Samples are decoded entirely into memory with symphonia. Decoding is slow
//! enough that the instrument always runs it off the event thread.

use std::fs::File;
use std::io::{self, Cursor};

use rubato::{
    SincFixedIn, SincInterpolationParameters, SincInterpolationType, VecResampler, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

use super::store::{SampleRef, SampleSource};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("audio format error: {0}")]
    Format(#[from] SymphoniaError),

    #[error("no audio track found")]
    NoTrack,

    #[error("sample rate not specified")]
    NoSampleRate,

    #[error("sample contains no audio")]
    Empty,

    #[error("unable to resample from {0} Hz to {1} Hz")]
    Resample(u32, u32),
}

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// A fully decoded sample. Channels are planar.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedSample {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl DecodedSample {
    /// Builds a decoded sample from planar channel data. All channels are
    /// truncated to the shortest one.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> DecodedSample {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        channels.iter_mut().for_each(|channel| channel.truncate(frames));
        DecodedSample {
            channels,
            sample_rate,
        }
    }

    /// Builds a decoded sample from interleaved data.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        DecodedSample::new(channels, sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Interleaves the channels into a single buffer.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut output = Vec::with_capacity(self.frames() * self.channel_count());
        for frame in 0..self.frames() {
            output.extend(self.channels.iter().map(|channel| channel[frame]));
        }
        output
    }

    /// Resamples every channel to `target_rate` with a sinc resampler. The
    /// result keeps the same duration; the resampler delay is trimmed off.
    pub fn resample(&self, target_rate: u32) -> Result<DecodedSample, LoadError> {
        let source_rate = self.sample_rate;
        if source_rate == target_rate || source_rate == 0 || self.frames() == 0 {
            return Ok(self.clone());
        }
        debug!(source_rate, target_rate, "Resampling sample");

        let failed = |_| LoadError::Resample(source_rate, target_rate);
        let sinc_params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            oversampling_factor: 128,
            interpolation: SincInterpolationType::Linear,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = target_rate as f64 / source_rate as f64;
        let mut resampler = SincFixedIn::<f32>::new(
            ratio,
            1.0,
            sinc_params,
            INPUT_BLOCK_SIZE,
            self.channel_count(),
        )
        .map_err(|_| LoadError::Resample(source_rate, target_rate))?;

        let frames = self.frames();
        let expected = (frames as f64 * ratio).round() as usize;
        let delay = resampler.output_delay();
        let mut output = vec![Vec::with_capacity(expected + delay); self.channel_count()];
        let append = |output: &mut Vec<Vec<f32>>, processed: Vec<Vec<f32>>| {
            for (channel, chunk) in output.iter_mut().zip(processed) {
                channel.extend_from_slice(&chunk);
            }
        };

        let mut position = 0;
        while position < frames {
            let needed = resampler.input_frames_next();
            let end = (position + needed).min(frames);
            let chunk: Vec<Vec<f32>> = self
                .channels
                .iter()
                .map(|channel| channel[position..end].to_vec())
                .collect();
            let processed = if end - position == needed {
                resampler.process(&chunk, None)
            } else {
                resampler.process_partial(Some(chunk.as_slice()), None)
            }
            .map_err(failed)?;
            append(&mut output, processed);
            position = end;
        }

        // Flush the tail still held in the filter.
        while output.first().map(Vec::len).unwrap_or(0) < expected + delay {
            let processed = resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(failed)?;
            if processed.first().map(Vec::is_empty).unwrap_or(true) {
                break;
            }
            append(&mut output, processed);
        }

        for channel in output.iter_mut() {
            channel.drain(..delay.min(channel.len()));
            channel.truncate(expected);
        }
        Ok(DecodedSample::new(output, target_rate))
    }

    /// Min/max peaks of the first channel over `[start, end]` seconds, one
    /// pair per column. Used to draw waveforms.
    pub fn peaks(&self, start: f64, end: f64, columns: usize) -> Vec<(f32, f32)> {
        let channel = match self.channels.first() {
            Some(channel) if !channel.is_empty() && columns > 0 => channel,
            _ => return Vec::new(),
        };

        let rate = self.sample_rate as f64;
        let to_frame = |time: f64| ((time.max(0.0) * rate) as usize).min(channel.len());
        let first = to_frame(start);
        let last = to_frame(end).max(first);
        let span = (last - first) as f64 / columns as f64;

        (0..columns)
            .map(|column| {
                let from = first + (column as f64 * span) as usize;
                let to = (first + ((column + 1) as f64 * span) as usize)
                    .max(from + 1)
                    .min(channel.len());
                channel[from.min(to)..to]
                    .iter()
                    .fold((0.0f32, 0.0f32), |(min, max), sample| {
                        (min.min(*sample), max.max(*sample))
                    })
            })
            .collect()
    }
}

/// Decodes the given sample into memory.
pub fn decode(sample: &SampleRef) -> Result<DecodedSample, LoadError> {
    let source: Box<dyn MediaSource> = match sample.source() {
        SampleSource::File(path) => Box::new(File::open(path).map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
        })?),
        SampleSource::Bytes(bytes) => Box::new(Cursor::new(bytes.clone())),
    };
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = sample.extension() {
        hint.with_extension(&extension);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(LoadError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channel_count = track
        .codec_params
        .channels
        .map(|channels| channels.count())
        .unwrap_or(0);

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if decoded.frames() == 0 {
                    continue;
                }
                channel_count = spec.channels.count();
                sample_rate.get_or_insert(spec.rate);

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(sample = sample.name(), err = e, "Skipping undecodable packet");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let sample_rate = sample_rate.ok_or(LoadError::NoSampleRate)?;
    if interleaved.is_empty() || channel_count == 0 {
        return Err(LoadError::Empty);
    }

    let decoded = DecodedSample::from_interleaved(&interleaved, channel_count, sample_rate);
    info!(
        sample = sample.name(),
        channels = decoded.channel_count(),
        sample_rate,
        duration_ms = (decoded.duration() * 1000.0) as u64,
        "Sample decoded"
    );
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::testutil::wav_bytes;

    #[test]
    fn test_decode_wav_bytes() {
        let sample = SampleRef::from_bytes("kick.wav", wav_bytes(0.5, 8000, 2));
        let decoded = decode(&sample).unwrap();

        assert_eq!(2, decoded.channel_count());
        assert_eq!(8000, decoded.sample_rate());
        assert_eq!(4000, decoded.frames());
        assert!((decoded.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snare.wav");
        std::fs::write(&path, &*wav_bytes(1.0, 8000, 1)).unwrap();

        let decoded = decode(&SampleRef::from_file(path)).unwrap();
        assert_eq!(1, decoded.channel_count());
        assert!((decoded.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_failures() {
        let missing = SampleRef::from_file(PathBuf::from("/nonexistent/clap.wav"));
        assert!(matches!(decode(&missing), Err(LoadError::Io(_))));

        let garbage = SampleRef::from_bytes("garbage.wav", b"definitely not audio".to_vec());
        assert!(decode(&garbage).is_err());
    }

    #[test]
    fn test_peaks() {
        let decoded = DecodedSample::new(vec![vec![0.0, 0.5, -1.0, 0.25]], 4);

        let peaks = decoded.peaks(0.0, 1.0, 2);
        assert_eq!(vec![(0.0, 0.5), (-1.0, 0.25)], peaks);

        // More columns than frames still yields one pair per column.
        assert_eq!(8, decoded.peaks(0.0, 1.0, 8).len());
        assert!(decoded.peaks(0.0, 1.0, 0).is_empty());
        assert!(DecodedSample::new(vec![], 4).peaks(0.0, 1.0, 4).is_empty());
    }

    #[test]
    fn test_interleave_round_trip() {
        let interleaved = vec![1.0, -1.0, 0.5, -0.5, 0.25, -0.25];
        let decoded = DecodedSample::from_interleaved(&interleaved, 2, 3);
        assert_eq!(Some(&[1.0, 0.5, 0.25][..]), decoded.channel(0));
        assert_eq!(interleaved, decoded.interleaved());
        assert_eq!(1.0, decoded.duration());
    }

    #[test]
    fn test_resample_mono() {
        let source_rate = 44100;
        let tone: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / source_rate as f32).sin())
            .collect();
        let decoded = DecodedSample::new(vec![tone], source_rate);

        let resampled = decoded.resample(48000).unwrap();

        assert_eq!(48000, resampled.sample_rate());
        assert_eq!(4800, resampled.frames());
        assert!((resampled.duration() - decoded.duration()).abs() < 1e-3);
        // A sine stays a sine: no clipping, energy in the body.
        let body = &resampled.channel(0).unwrap()[1000..3800];
        assert!(body.iter().all(|sample| sample.abs() <= 1.1));
        assert!(body.iter().any(|sample| sample.abs() > 0.9));
    }

    #[test]
    fn test_resample_stereo() {
        let decoded = DecodedSample::new(vec![vec![0.5; 2205], vec![-0.5; 2205]], 22050);

        let resampled = decoded.resample(48000).unwrap();

        assert_eq!(2, resampled.channel_count());
        assert_eq!(4800, resampled.frames());
        let left = resampled.channel(0).unwrap();
        let right = resampled.channel(1).unwrap();
        assert!((left[2400] - 0.5).abs() < 0.05);
        assert!((right[2400] + 0.5).abs() < 0.05);
    }

    #[test]
    fn test_resample_same_rate_is_unchanged() {
        let decoded = DecodedSample::new(vec![vec![1.0, -1.0, 0.5]], 48000);
        assert_eq!(decoded, decoded.resample(48000).unwrap());
        assert_eq!(
            DecodedSample::new(vec![], 44100),
            DecodedSample::new(vec![], 44100).resample(48000).unwrap()
        );
    }
}
