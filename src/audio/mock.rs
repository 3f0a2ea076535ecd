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
use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::{PlaybackError, PlaybackHandle};
use crate::samples::{DecodedSample, SampleId, SampleRef};

/// A mock device. Doesn't actually play anything. Time only moves when
/// `advance` is called, so playback positions are deterministic.
#[derive(Clone)]
pub struct Device {
    name: String,
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    clock: f64,
    durations: HashMap<SampleId, f64>,
    playbacks: HashMap<u64, Playback>,
    next_playback: u64,
    reject_next: bool,
    starts: Vec<(SampleId, f64)>,
}

struct Playback {
    started_at: f64,
    offset: f64,
    duration: f64,
    stopped_at: Option<f64>,
}

impl Playback {
    fn position(&self, clock: f64) -> f64 {
        match self.stopped_at {
            Some(position) => position,
            None => (self.offset + (clock - self.started_at)).min(self.duration),
        }
    }
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Moves the device clock forward.
    pub fn advance(&self, seconds: f64) {
        self.state.lock().clock += seconds;
    }

    /// Makes the next call to start fail.
    pub fn reject_next_start(&self) {
        self.state.lock().reject_next = true;
    }

    /// Registers a sample by duration alone.
    pub fn register_duration(&self, sample: SampleId, duration: f64) {
        self.state.lock().durations.insert(sample, duration);
    }

    pub fn is_registered(&self, sample: SampleId) -> bool {
        self.state.lock().durations.contains_key(&sample)
    }

    /// Every successful start so far, as (sample, offset).
    pub fn starts(&self) -> Vec<(SampleId, f64)> {
        self.state.lock().starts.clone()
    }

    /// Number of playbacks that are neither stopped nor finished.
    pub fn playing_count(&self) -> usize {
        let state = self.state.lock();
        state
            .playbacks
            .values()
            .filter(|playback| {
                playback.stopped_at.is_none() && playback.position(state.clock) < playback.duration
            })
            .count()
    }
}

impl crate::audio::Device for Device {
    fn register(
        &self,
        sample: &SampleRef,
        decoded: Arc<DecodedSample>,
    ) -> Result<(), PlaybackError> {
        debug!(device = self.name, sample = sample.name(), "Registering sample");
        self.register_duration(sample.id(), decoded.duration());
        Ok(())
    }

    fn unregister(&self, sample: SampleId) {
        self.state.lock().durations.remove(&sample);
    }

    fn start(
        &self,
        sample: SampleId,
        offset: f64,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        let mut state = self.state.lock();
        if state.reject_next {
            state.reject_next = false;
            return Err(PlaybackError::Rejected("mock rejection".to_string()));
        }
        let duration = *state
            .durations
            .get(&sample)
            .ok_or(PlaybackError::NotLoaded(sample))?;

        let id = state.next_playback;
        state.next_playback += 1;
        let clock = state.clock;
        state.playbacks.insert(
            id,
            Playback {
                started_at: clock,
                offset: offset.clamp(0.0, duration),
                duration,
                stopped_at: None,
            },
        );
        state.starts.push((sample, offset));
        info!(device = self.name, sample = %sample, offset, "Starting playback (mock)");

        Ok(Box::new(Handle {
            id,
            duration,
            state: self.state.clone(),
        }))
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn std::error::Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}

struct Handle {
    id: u64,
    duration: f64,
    state: Arc<Mutex<State>>,
}

impl PlaybackHandle for Handle {
    fn position(&self) -> f64 {
        let state = self.state.lock();
        state
            .playbacks
            .get(&self.id)
            .map(|playback| playback.position(state.clock))
            .unwrap_or(0.0)
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn is_finished(&self) -> bool {
        let state = self.state.lock();
        state.playbacks.get(&self.id).is_some_and(|playback| {
            playback.stopped_at.is_none() && playback.position(state.clock) >= playback.duration
        })
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        let clock = state.clock;
        if let Some(playback) = state.playbacks.get_mut(&self.id) {
            if playback.stopped_at.is_none() {
                playback.stopped_at = Some(playback.position(clock));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Device as _;

    #[test]
    fn test_mock_clock() {
        let device = Device::get("mock-device");
        let sample = SampleRef::from_bytes("kick.wav", Vec::<u8>::new());
        device
            .register(
                &sample,
                Arc::new(DecodedSample::new(vec![vec![0.0; 40]], 10)),
            )
            .unwrap();

        let mut handle = device.start(sample.id(), 1.0).unwrap();
        assert_eq!(4.0, handle.duration());
        assert_eq!(1.0, handle.position());
        assert_eq!(1, device.playing_count());

        device.advance(1.5);
        assert_eq!(2.5, handle.position());
        assert!(!handle.is_finished());

        handle.stop();
        device.advance(10.0);
        assert_eq!(2.5, handle.position());
        assert!(!handle.is_finished());
        assert_eq!(0, device.playing_count());
    }

    #[test]
    fn test_mock_natural_end() {
        let device = Device::get("mock-device");
        let sample = SampleRef::from_bytes("kick.wav", Vec::<u8>::new());
        device.register_duration(sample.id(), 2.0);

        let handle = device.start(sample.id(), 0.0).unwrap();
        device.advance(3.0);
        assert_eq!(2.0, handle.position());
        assert!(handle.is_finished());
    }

    #[test]
    fn test_mock_start_failures() {
        let device = Device::get("mock-device");
        let sample = SampleRef::from_bytes("kick.wav", Vec::<u8>::new());
        assert_eq!(
            Some(PlaybackError::NotLoaded(sample.id())),
            device.start(sample.id(), 0.0).err()
        );

        device.register_duration(sample.id(), 1.0);
        device.reject_next_start();
        assert!(matches!(
            device.start(sample.id(), 0.0).err(),
            Some(PlaybackError::Rejected(_))
        ));
        assert!(device.start(sample.id(), 0.0).is_ok());

        device.unregister(sample.id());
        assert!(!device.is_registered(sample.id()));
    }
}
