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
use std::{error::Error, fmt, sync::Arc};

use crate::config;
use crate::samples::{DecodedSample, SampleId, SampleRef};

pub mod cpal;
pub mod mock;

/// Errors starting playback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaybackError {
    #[error("{0} is not loaded on the audio device")]
    NotLoaded(SampleId),

    #[error("playback rejected: {0}")]
    Rejected(String),

    #[error("audio stream error: {0}")]
    Stream(String),
}

/// A single running playback on a device.
///
/// Handles never stop on their own before the end of the sample. Stopping at
/// a chop boundary is up to the caller.
pub trait PlaybackHandle: Send {
    /// Current position in seconds from the start of the sample.
    fn position(&self) -> f64;

    /// Full duration of the sample in seconds.
    fn duration(&self) -> f64;

    /// True once playback reached the natural end of the sample.
    fn is_finished(&self) -> bool;

    /// Halts playback immediately. Safe to call more than once.
    fn stop(&mut self);
}

pub trait Device: fmt::Display + Send + Sync {
    /// Makes a decoded sample playable on this device.
    fn register(&self, sample: &SampleRef, decoded: Arc<DecodedSample>)
        -> Result<(), PlaybackError>;

    /// Releases a previously registered sample. Running playbacks of it keep
    /// their own reference to the audio.
    fn unregister(&self, sample: SampleId);

    /// Starts playing a registered sample from the given offset in seconds.
    fn start(&self, sample: SampleId, offset: f64)
        -> Result<Box<dyn PlaybackHandle>, PlaybackError>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets a device with the given name.
pub fn get_device(config: Option<config::Audio>) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let config = match config {
        Some(config) => config,
        None => return Err("there must be an audio device specified".into()),
    };

    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device)));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
