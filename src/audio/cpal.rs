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
use std::{
    collections::HashMap,
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use parking_lot::RwLock;
use tracing::{debug, error, info, span, Level};

use crate::audio::{Device as AudioDevice, PlaybackError, PlaybackHandle};
use crate::config;
use crate::pads::NUM_PADS;
use crate::samples::{DecodedSample, SampleId, SampleRef, MAX_CONCURRENT_VOICES};

/// Sources the mixer holds without reallocating: a full pool on every pad
/// plus the editor preview.
const MIXER_CAPACITY: usize = NUM_PADS * MAX_CONCURRENT_VOICES + 1;

/// A small wrapper around a cpal::Device. Devices returned by `list` are
/// descriptions only; `get` opens the output stream.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The running output, once opened.
    output: Option<Output>,
}

/// Playback state shared between a handle and the audio callback.
struct SourceState {
    frame: AtomicUsize,
    stopped: AtomicBool,
    finished: AtomicBool,
}

/// A playing sample as the mixer sees it.
struct Source {
    pcm: Arc<[f32]>,
    state: Arc<SourceState>,
}

/// Sums every playing source into the output buffer. Lives inside the audio
/// callback.
struct Mixer {
    channels: usize,
    sources: Vec<Source>,
    source_rx: crossbeam_channel::Receiver<Source>,
    scratch: Vec<f32>,
}

impl Mixer {
    fn new(channels: usize, source_rx: crossbeam_channel::Receiver<Source>) -> Mixer {
        Mixer {
            channels: channels.max(1),
            sources: Vec::with_capacity(MIXER_CAPACITY),
            source_rx,
            scratch: Vec::new(),
        }
    }

    /// Mixes one interleaved block.
    fn mix(&mut self, out: &mut [f32]) {
        while let Ok(source) = self.source_rx.try_recv() {
            self.sources.push(source);
        }

        out.fill(0.0);
        let channels = self.channels;
        let frames = out.len() / channels;
        self.sources.retain(|source| {
            if source.state.stopped.load(Ordering::Acquire) {
                return false;
            }

            let total = source.pcm.len() / channels;
            let start = source.state.frame.load(Ordering::Relaxed).min(total);
            let count = frames.min(total - start);
            let pcm = &source.pcm[start * channels..(start + count) * channels];
            for (dst, src) in out.iter_mut().zip(pcm) {
                *dst += *src;
            }

            let next = start + count;
            source.state.frame.store(next, Ordering::Release);
            if next >= total {
                source.state.finished.store(true, Ordering::Release);
                false
            } else {
                true
            }
        });
    }

    fn write<T>(&mut self, data: &mut [T])
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(data.len(), 0.0);
        self.mix(&mut scratch);
        for (dst, src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src.clamp(-1.0, 1.0));
        }
        self.scratch = scratch;
    }
}

/// The open output stream and the PCM registered for it.
struct Output {
    channels: u16,
    sample_rate: u32,
    /// Interleaved PCM at the device's rate and channel count.
    buffers: RwLock<HashMap<SampleId, Arc<[f32]>>>,
    source_tx: crossbeam_channel::Sender<Source>,
    /// Dropping this stops the output thread.
    shutdown_tx: Option<crossbeam_channel::Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Drop for Output {
    fn drop(&mut self) {
        self.shutdown_tx.take();
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| mixer.write(data),
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

impl Output {
    /// Starts the output thread, which owns the cpal stream for its whole
    /// life. Returns once the stream is playing or failed to start.
    fn open(
        device: cpal::Device,
        channels: u16,
        sample_rate: u32,
        sample_format: cpal::SampleFormat,
    ) -> Result<Output, Box<dyn Error>> {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let output_thread = thread::spawn(move || {
            let config = cpal::StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };
            let mixer = Mixer::new(channels.into(), source_rx);

            let stream = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer),
                cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer),
                other => {
                    let _ = ready_tx.send(Err(format!("unsupported sample format {}", other)));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to create CPAL stream: {}", e)));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start CPAL stream: {}", e)));
                return;
            }
            info!("CPAL output stream started successfully");
            let _ = ready_tx.send(Ok(()));

            // Keep the stream alive until the output is dropped.
            let _ = shutdown_rx.recv();
            debug!("CPAL output stream stopping");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Output {
                channels,
                sample_rate,
                buffers: RwLock::new(HashMap::new()),
                source_tx,
                shutdown_tx: Some(shutdown_tx),
                output_thread: Some(output_thread),
            }),
            Ok(Err(e)) => {
                let _ = output_thread.join();
                Err(e.into())
            }
            Err(_) => {
                let _ = output_thread.join();
                Err("CPAL output thread exited before the stream started".into())
            }
        }
    }
}

/// Spreads interleaved audio across the device's channels. Mono goes to
/// every output channel; otherwise channels map one to one and extra
/// channels on either side are left silent or dropped.
fn map_channels(samples: &[f32], source_channels: usize, target_channels: usize) -> Vec<f32> {
    if source_channels == 0 || target_channels == 0 {
        return Vec::new();
    }
    if source_channels == target_channels {
        return samples.to_vec();
    }

    let frames = samples.len() / source_channels;
    let mut mapped = vec![0.0; frames * target_channels];
    for (frame, out) in samples
        .chunks_exact(source_channels)
        .zip(mapped.chunks_exact_mut(target_channels))
    {
        for (channel, dst) in out.iter_mut().enumerate() {
            if source_channels == 1 {
                *dst = frame[0];
            } else if let Some(src) = frame.get(channel) {
                *dst = *src;
            }
        }
    }
    mapped
}

struct Handle {
    state: Arc<SourceState>,
    sample_rate: f64,
    frames: usize,
}

impl PlaybackHandle for Handle {
    fn position(&self) -> f64 {
        self.state.frame.load(Ordering::Acquire) as f64 / self.sample_rate
    }

    fn duration(&self) -> f64 {
        self.frames as f64 / self.sample_rate
    }

    fn is_finished(&self) -> bool {
        !self.state.stopped.load(Ordering::Acquire) && self.state.finished.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        self.state.stopped.store(true, Ordering::Release);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices that have at least one output channel.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let max_channels = match device.supported_output_configs() {
                    Ok(configs) => configs.map(|config| config.channels()).max().unwrap_or(0),
                    Err(_) => continue,
                };

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        output: None,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device and opens its output stream.
    pub fn get(config: config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        let mut device = Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| format!("no device found with name {}", name))?;

        let span = span!(Level::INFO, "open device (cpal)");
        let _enter = span.enter();

        let default_config = device.device.default_output_config()?;
        let sample_rate = config
            .sample_rate()
            .unwrap_or(default_config.sample_rate().0);
        let channels = default_config.channels();
        info!(
            device = device.name,
            sample_rate,
            channels,
            format = %default_config.sample_format(),
            "Opening output stream."
        );

        device.output = Some(Output::open(
            device.device.clone(),
            channels,
            sample_rate,
            default_config.sample_format(),
        )?);
        Ok(device)
    }

    fn output(&self) -> Result<&Output, PlaybackError> {
        self.output
            .as_ref()
            .ok_or_else(|| PlaybackError::Stream(format!("{} is not open", self.name)))
    }
}

impl AudioDevice for Device {
    fn register(
        &self,
        sample: &SampleRef,
        decoded: Arc<DecodedSample>,
    ) -> Result<(), PlaybackError> {
        let output = self.output()?;
        let resampled = decoded
            .resample(output.sample_rate)
            .map_err(|e| PlaybackError::Rejected(e.to_string()))?;
        let pcm: Arc<[f32]> = map_channels(
            &resampled.interleaved(),
            resampled.channel_count(),
            output.channels.into(),
        )
        .into();
        debug!(
            device = self.name,
            sample = sample.name(),
            frames = pcm.len() / usize::from(output.channels.max(1)),
            "Registered sample"
        );
        output.buffers.write().insert(sample.id(), pcm);
        Ok(())
    }

    fn unregister(&self, sample: SampleId) {
        if let Some(output) = self.output.as_ref() {
            output.buffers.write().remove(&sample);
        }
    }

    fn start(
        &self,
        sample: SampleId,
        offset: f64,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        let output = self.output()?;
        let pcm = output
            .buffers
            .read()
            .get(&sample)
            .cloned()
            .ok_or(PlaybackError::NotLoaded(sample))?;

        let sample_rate = f64::from(output.sample_rate);
        let frames = pcm.len() / usize::from(output.channels.max(1));
        let start_frame = ((offset.max(0.0) * sample_rate).round() as usize).min(frames);
        let state = Arc::new(SourceState {
            frame: AtomicUsize::new(start_frame),
            stopped: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });

        output
            .source_tx
            .send(Source {
                pcm,
                state: state.clone(),
            })
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        Ok(Box::new(Handle {
            state,
            sample_rate,
            frames,
        }))
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn source(pcm: Vec<f32>, frame: usize) -> (Source, Arc<SourceState>) {
        let state = Arc::new(SourceState {
            frame: AtomicUsize::new(frame),
            stopped: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        });
        (
            Source {
                pcm: pcm.into(),
                state: state.clone(),
            },
            state,
        )
    }

    #[test]
    fn test_mixer_sums_sources() {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        let mut mixer = Mixer::new(1, source_rx);

        let (first, first_state) = source(vec![0.25; 4], 0);
        let (second, second_state) = source(vec![0.5; 2], 0);
        source_tx.send(first).unwrap();
        source_tx.send(second).unwrap();

        let mut out = vec![0.0; 3];
        mixer.mix(&mut out);
        assert_eq!(vec![0.75, 0.75, 0.25], out);
        assert!(second_state.finished.load(Ordering::Acquire));
        assert!(!first_state.finished.load(Ordering::Acquire));
        assert_eq!(3, first_state.frame.load(Ordering::Acquire));

        mixer.mix(&mut out);
        assert_eq!(vec![0.25, 0.0, 0.0], out);
        assert!(first_state.finished.load(Ordering::Acquire));
        assert!(mixer.sources.is_empty());
    }

    #[test]
    fn test_mixer_offset_and_stop() {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        let mut mixer = Mixer::new(2, source_rx);

        // Two stereo frames, starting from the second one.
        let (playing, state) = source(vec![0.1, 0.2, 0.3, 0.4], 1);
        source_tx.send(playing).unwrap();
        let mut out = vec![0.0; 4];
        mixer.mix(&mut out);
        assert_eq!(vec![0.3, 0.4, 0.0, 0.0], out);

        let (stopped, stopped_state) = source(vec![1.0; 8], 0);
        stopped_state.stopped.store(true, Ordering::Release);
        source_tx.send(stopped).unwrap();
        mixer.mix(&mut out);
        assert_eq!(vec![0.0; 4], out);
        assert!(!stopped_state.finished.load(Ordering::Acquire));
        assert!(state.finished.load(Ordering::Acquire));
    }

    #[test]
    fn test_mixer_converts_output_format() {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        let mut mixer = Mixer::new(1, source_rx);
        let (loud, _) = source(vec![1.0, 1.0], 0);
        let (louder, _) = source(vec![1.0, 1.0], 0);
        source_tx.send(loud).unwrap();
        source_tx.send(louder).unwrap();

        let mut out = vec![0i16; 2];
        mixer.write(&mut out);
        // Clipped rather than wrapped.
        assert_eq!(vec![i16::MAX, i16::MAX], out);
    }

    #[test]
    fn test_map_channels() {
        assert_eq!(
            vec![0.5, 0.5, 0.5, -0.5, -0.5, -0.5],
            map_channels(&[0.5, -0.5], 1, 3)
        );
        assert_eq!(
            vec![0.1, 0.2, 0.0, 0.3, 0.4, 0.0],
            map_channels(&[0.1, 0.2, 0.3, 0.4], 2, 3)
        );
        assert_eq!(vec![0.1, 0.3], map_channels(&[0.1, 0.2, 0.3, 0.4], 2, 1));
        assert!(map_channels(&[0.1], 0, 2).is_empty());
    }

    #[test]
    fn test_handle_reports_position() {
        let (_, state) = source(vec![0.0; 100], 50);
        let mut handle = Handle {
            state: state.clone(),
            sample_rate: 100.0,
            frames: 100,
        };
        assert_eq!(0.5, handle.position());
        assert_eq!(1.0, handle.duration());
        assert!(!handle.is_finished());

        state.frame.store(100, Ordering::Release);
        state.finished.store(true, Ordering::Release);
        assert!(handle.is_finished());

        handle.stop();
        assert!(!handle.is_finished());
    }

    #[test]
    fn test_mixer_preallocates_sources() {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        let mut mixer = Mixer::new(1, source_rx);
        let capacity = mixer.sources.capacity();
        assert!(capacity >= MIXER_CAPACITY);

        for _ in 0..MIXER_CAPACITY {
            let (playing, _) = source(vec![0.1; 64], 0);
            source_tx.send(playing).unwrap();
        }
        let mut out = vec![0.0; 16];
        mixer.mix(&mut out);
        assert_eq!(MIXER_CAPACITY, mixer.sources.len());
        assert_eq!(capacity, mixer.sources.capacity());
    }
}
