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

//! The trigger engine starts voices, bounds them to their pad's chop, and
//! reports their lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use super::store::{SampleId, SampleStore};
use super::voice::{Voice, VoiceId, VoicePool, VoiceStatus};
use crate::audio::{Device, PlaybackError};
use crate::chops::{Chop, ChopStore};
use crate::events::VoiceEvent;
use crate::pads::PadId;

pub struct TriggerEngine {
    device: Arc<dyn Device>,
    pools: HashMap<PadId, VoicePool>,
    /// The editor's single preview voice, outside of any pool.
    preview: Option<Voice>,
    max_voices: usize,
    events_tx: Sender<VoiceEvent>,
}

impl TriggerEngine {
    /// Creates a new engine. Events are sent on `events_tx`; if nobody is
    /// listening they are dropped.
    pub fn new(device: Arc<dyn Device>, max_voices: usize, events_tx: Sender<VoiceEvent>) -> Self {
        Self {
            device,
            pools: HashMap::new(),
            preview: None,
            max_voices: max_voices.max(1),
            events_tx,
        }
    }

    fn emit(&self, event: VoiceEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Plays the pad's sample, bounded to the pad's chop if it has one.
    /// Returns the new voice's id, or None if nothing is playing as a result.
    pub fn trigger(
        &mut self,
        pad: PadId,
        samples: &SampleStore,
        chops: &ChopStore,
    ) -> Option<VoiceId> {
        let sample = match samples.get(pad) {
            Some(sample) => sample,
            None => {
                debug!(pad = %pad, "No sample bound to pad");
                return None;
            }
        };

        let id = VoiceId::next();
        let chop = chops.get(pad);
        let offset = chop.map(|chop| chop.start()).unwrap_or(0.0);

        let handle = match self.device.start(sample.id(), offset) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(pad = %pad, sample = sample.name(), err = %e, "Unable to start playback");
                self.emit(VoiceEvent::Ended { id });
                return None;
            }
        };

        let duration = handle.duration();
        let window = chop.unwrap_or_else(|| Chop::full(duration));
        let voice = Voice::new(id, pad, sample.id(), handle, window);

        let max_voices = self.max_voices;
        let evicted = self
            .pools
            .entry(pad)
            .or_insert_with(|| VoicePool::new(max_voices))
            .push(voice);
        for mut voice in evicted {
            voice.stop();
            self.emit(VoiceEvent::Ended { id: voice.id() });
        }

        debug!(
            pad = %pad,
            voice = %id,
            sample = sample.name(),
            start = window.start(),
            end = window.end(),
            "Sample triggered"
        );
        self.emit(VoiceEvent::Started {
            id,
            pad,
            sample: sample.id(),
            duration,
        });
        Some(id)
    }

    /// Polls every voice once. Voices at their natural end or past their
    /// window end are released; the rest report progress.
    pub fn tick(&mut self) {
        let mut events = Vec::new();
        for pool in self.pools.values_mut() {
            pool.retain_mut(|voice| Self::poll_voice(voice, &mut events));
        }

        let preview_done = match self.preview.as_ref() {
            Some(voice) => !matches!(voice.poll(), VoiceStatus::Playing { .. }),
            None => false,
        };
        if preview_done {
            if let Some(mut voice) = self.preview.take() {
                voice.stop();
                events.push(VoiceEvent::PreviewEnded { id: voice.id() });
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    fn poll_voice(voice: &mut Voice, events: &mut Vec<VoiceEvent>) -> bool {
        match voice.poll() {
            VoiceStatus::Playing { progress, .. } => {
                events.push(VoiceEvent::Progress {
                    id: voice.id(),
                    progress,
                    duration: voice.duration(),
                });
                true
            }
            VoiceStatus::Finished => {
                events.push(VoiceEvent::Ended { id: voice.id() });
                false
            }
            VoiceStatus::WindowEnd => {
                voice.stop();
                events.push(VoiceEvent::Ended { id: voice.id() });
                false
            }
        }
    }

    /// Starts the single preview voice, replacing any running preview. When
    /// `end` is None the preview runs to the natural end of the sample.
    pub fn play_preview(
        &mut self,
        pad: PadId,
        sample: SampleId,
        start: f64,
        end: Option<f64>,
    ) -> Result<VoiceId, PlaybackError> {
        self.stop_preview();

        let handle = self.device.start(sample, start)?;
        let duration = handle.duration();
        let window = Chop::clamped(start, end.unwrap_or(duration), duration);
        let id = VoiceId::next();
        info!(
            pad = %pad,
            voice = %id,
            start = window.start(),
            end = window.end(),
            "Preview started"
        );
        self.preview = Some(Voice::new(id, pad, sample, handle, window));
        Ok(id)
    }

    /// Stops the preview voice, if any.
    pub fn stop_preview(&mut self) {
        if let Some(mut voice) = self.preview.take() {
            voice.stop();
            self.emit(VoiceEvent::PreviewEnded { id: voice.id() });
        }
    }

    pub fn preview_id(&self) -> Option<VoiceId> {
        self.preview.as_ref().map(Voice::id)
    }

    /// Position of the preview voice in seconds.
    pub fn preview_position(&self) -> Option<f64> {
        self.preview.as_ref().map(Voice::position)
    }

    /// Stops and releases every voice of the given pad.
    pub fn stop_pad(&mut self, pad: PadId) {
        let voices = match self.pools.get_mut(&pad) {
            Some(pool) => pool.drain(),
            None => return,
        };
        for mut voice in voices {
            voice.stop();
            self.emit(VoiceEvent::Ended { id: voice.id() });
        }
    }

    /// Stops every voice on every pad, including the preview.
    pub fn stop_all(&mut self) {
        let pads: Vec<PadId> = self.pools.keys().copied().collect();
        for pad in pads {
            self.stop_pad(pad);
        }
        self.stop_preview();
    }

    /// Number of voices playing on the given pad.
    pub fn active_count(&self, pad: PadId) -> usize {
        self.pools.get(&pad).map(VoicePool::len).unwrap_or(0)
    }

    /// Number of voices playing across all pads, not counting the preview.
    pub fn total_active(&self) -> usize {
        self.pools.values().map(VoicePool::len).sum()
    }

    /// The bound window of a live voice.
    pub fn voice_window(&self, id: VoiceId) -> Option<Chop> {
        self.pools
            .values()
            .flat_map(VoicePool::iter)
            .find(|voice| voice.id() == id)
            .map(Voice::window)
    }

    /// Current position of a live voice in seconds.
    pub fn voice_position(&self, id: VoiceId) -> Option<f64> {
        self.pools
            .values()
            .flat_map(VoicePool::iter)
            .find(|voice| voice.id() == id)
            .map(Voice::position)
    }
}

impl fmt::Debug for TriggerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerEngine")
            .field("device", &self.device.to_string())
            .field("active_voices", &self.total_active())
            .field("previewing", &self.preview.is_some())
            .field("max_voices", &self.max_voices)
            .finish()
    }
}
