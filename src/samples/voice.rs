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

//! Voices and the per-pad voice pool.
//!
//! Each pad owns a bounded FIFO of voices. When a trigger pushes the pool over
//! its limit the oldest voice is evicted.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::debug;

use super::store::SampleId;
use crate::audio::PlaybackHandle;
use crate::chops::Chop;
use crate::pads::PadId;

/// Default number of concurrent voices per pad.
pub const MAX_CONCURRENT_VOICES: usize = 8;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique voice identifier. Ids are never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    pub(crate) fn next() -> VoiceId {
        VoiceId(NEXT_VOICE_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice-{}", self.0)
    }
}

/// What a voice is doing at the moment it is polled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VoiceStatus {
    Playing { position: f64, progress: f64 },
    /// The sample played to its natural end.
    Finished,
    /// Playback reached the end of the voice's window.
    WindowEnd,
}

/// One in-flight playback of a pad's sample.
pub struct Voice {
    id: VoiceId,
    pad: PadId,
    sample: SampleId,
    handle: Box<dyn PlaybackHandle>,
    window: Chop,
    started_at: Instant,
}

impl Voice {
    pub fn new(
        id: VoiceId,
        pad: PadId,
        sample: SampleId,
        handle: Box<dyn PlaybackHandle>,
        window: Chop,
    ) -> Self {
        Self {
            id,
            pad,
            sample,
            handle,
            window,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn pad(&self) -> PadId {
        self.pad
    }

    pub fn sample(&self) -> SampleId {
        self.sample
    }

    pub fn window(&self) -> Chop {
        self.window
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Full sample duration in seconds.
    pub fn duration(&self) -> f64 {
        self.handle.duration()
    }

    /// Position in seconds, never past the end of the window.
    pub fn position(&self) -> f64 {
        self.handle.position().min(self.window.end())
    }

    /// Position relative to the full sample duration.
    pub fn progress(&self) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 || !duration.is_finite() {
            return 1.0;
        }
        (self.position() / duration).clamp(0.0, 1.0)
    }

    pub fn poll(&self) -> VoiceStatus {
        if self.handle.is_finished() {
            VoiceStatus::Finished
        } else if self.handle.position() >= self.window.end() {
            VoiceStatus::WindowEnd
        } else {
            VoiceStatus::Playing {
                position: self.position(),
                progress: self.progress(),
            }
        }
    }

    pub fn stop(&mut self) {
        self.handle.stop();
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("pad", &self.pad)
            .field("sample", &self.sample)
            .field("window", &self.window)
            .finish()
    }
}

/// Bounded, oldest-first collection of a pad's voices.
pub struct VoicePool {
    voices: VecDeque<Voice>,
    max_voices: usize,
}

impl VoicePool {
    pub fn new(max_voices: usize) -> Self {
        Self {
            voices: VecDeque::new(),
            max_voices: max_voices.max(1),
        }
    }

    /// Adds a voice as the newest. Returns the voices evicted to get back
    /// under the limit, oldest first. The caller is expected to stop them.
    pub fn push(&mut self, voice: Voice) -> Vec<Voice> {
        self.voices.push_back(voice);
        let mut evicted = Vec::new();
        while self.voices.len() > self.max_voices {
            match self.evict_oldest() {
                Some(voice) => evicted.push(voice),
                None => break,
            }
        }
        evicted
    }

    /// Removes the oldest voice.
    pub fn evict_oldest(&mut self) -> Option<Voice> {
        let voice = self.voices.pop_front()?;
        debug!(
            voice = %voice.id(),
            pad = %voice.pad(),
            max_voices = self.max_voices,
            age_ms = voice.started_at().elapsed().as_millis() as u64,
            "Voice limit reached, evicting oldest"
        );
        Some(voice)
    }

    /// Keeps only the voices for which the predicate returns true.
    pub fn retain_mut<F>(&mut self, f: F)
    where
        F: FnMut(&mut Voice) -> bool,
    {
        self.voices.retain_mut(f);
    }

    /// Removes every voice.
    pub fn drain(&mut self) -> Vec<Voice> {
        self.voices.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices
    }
}

impl fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoicePool")
            .field("active_voices", &self.voices.len())
            .field("max_voices", &self.max_voices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::{mock, Device as _};
    use crate::samples::SampleRef;

    fn make_voice(device: &mock::Device, sample: SampleId, window: Chop) -> Voice {
        let handle = device.start(sample, window.start()).unwrap();
        Voice::new(
            VoiceId::next(),
            PadId::from_index(0).unwrap(),
            sample,
            handle,
            window,
        )
    }

    fn setup() -> (Arc<mock::Device>, SampleId) {
        let device = Arc::new(mock::Device::get("mock-device"));
        let sample = SampleRef::from_bytes("kick.wav", Vec::<u8>::new()).id();
        device.register_duration(sample, 4.0);
        (device, sample)
    }

    #[test]
    fn test_voice_pool_evicts_oldest() {
        let (device, sample) = setup();
        let mut pool = VoicePool::new(MAX_CONCURRENT_VOICES);

        let mut ids = Vec::new();
        for _ in 0..MAX_CONCURRENT_VOICES {
            let voice = make_voice(&device, sample, Chop::full(4.0));
            ids.push(voice.id());
            assert!(pool.push(voice).is_empty());
        }
        assert_eq!(MAX_CONCURRENT_VOICES, pool.len());

        let evicted = pool.push(make_voice(&device, sample, Chop::full(4.0)));
        assert_eq!(1, evicted.len());
        assert_eq!(ids[0], evicted[0].id());
        assert_eq!(MAX_CONCURRENT_VOICES, pool.len());
        assert_eq!(ids[1], pool.iter().next().unwrap().id());
    }

    #[test]
    fn test_voice_pool_drain() {
        let (device, sample) = setup();
        let mut pool = VoicePool::new(3);
        let first = make_voice(&device, sample, Chop::full(4.0));
        let first_id = first.id();
        pool.push(first);
        pool.push(make_voice(&device, sample, Chop::full(4.0)));
        let started: Vec<_> = pool.iter().map(Voice::started_at).collect();
        assert!(started[0] <= started[1]);

        let drained = pool.drain();
        assert_eq!(2, drained.len());
        assert_eq!(first_id, drained[0].id());
        assert!(pool.is_empty());
        assert_eq!(1, VoicePool::new(0).max_voices());
    }

    #[test]
    fn test_voice_status() {
        let (device, sample) = setup();
        let voice = make_voice(&device, sample, Chop::new(1.0, 2.5).unwrap());
        assert_eq!(
            VoiceStatus::Playing {
                position: 1.0,
                progress: 0.25
            },
            voice.poll()
        );

        device.advance(2.0);
        assert_eq!(VoiceStatus::WindowEnd, voice.poll());
        // Reported position is pinned to the window end.
        assert_eq!(2.5, voice.position());

        let natural = make_voice(&device, sample, Chop::full(4.0));
        device.advance(5.0);
        assert_eq!(VoiceStatus::Finished, natural.poll());
        assert_eq!(1.0, natural.progress());
    }
}
