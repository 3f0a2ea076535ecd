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

//! Voice lifecycle events reported by the trigger engine.

use std::collections::BTreeMap;

use crate::pads::PadId;
use crate::samples::{SampleId, VoiceId};

#[derive(Clone, Debug, PartialEq)]
pub enum VoiceEvent {
    /// A voice began playing.
    Started {
        id: VoiceId,
        pad: PadId,
        sample: SampleId,
        duration: f64,
    },

    /// Periodic position report. `progress` is relative to the full sample
    /// duration and lies in `[0, 1]`.
    Progress {
        id: VoiceId,
        progress: f64,
        duration: f64,
    },

    /// A voice is gone: natural end, chop end, eviction, stop, or a start
    /// that failed. Sent exactly once per voice id.
    Ended { id: VoiceId },

    /// The editor's preview voice is gone.
    PreviewEnded { id: VoiceId },
}

/// A voice as seen by an observer of the event stream.
#[derive(Clone, Debug, PartialEq)]
pub struct NowPlaying {
    pub pad: PadId,
    pub sample: SampleId,
    pub duration: f64,
    pub progress: f64,
}

/// Folds voice events into the set of currently audible voices, the way a
/// "now playing" display would.
#[derive(Debug, Default)]
pub struct NowPlayingTracker {
    voices: BTreeMap<VoiceId, NowPlaying>,
}

impl NowPlayingTracker {
    pub fn new() -> NowPlayingTracker {
        NowPlayingTracker::default()
    }

    pub fn apply(&mut self, event: &VoiceEvent) {
        match event {
            VoiceEvent::Started {
                id,
                pad,
                sample,
                duration,
            } => {
                self.voices.insert(
                    *id,
                    NowPlaying {
                        pad: *pad,
                        sample: *sample,
                        duration: *duration,
                        progress: 0.0,
                    },
                );
            }
            VoiceEvent::Progress { id, progress, .. } => {
                if let Some(voice) = self.voices.get_mut(id) {
                    voice.progress = *progress;
                }
            }
            VoiceEvent::Ended { id } => {
                self.voices.remove(id);
            }
            VoiceEvent::PreviewEnded { .. } => {}
        }
    }

    pub fn get(&self, id: VoiceId) -> Option<&NowPlaying> {
        self.voices.get(&id)
    }

    /// Active voices, oldest first.
    pub fn voices(&self) -> impl Iterator<Item = (VoiceId, &NowPlaying)> {
        self.voices.iter().map(|(id, voice)| (*id, voice))
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::SampleRef;

    #[test]
    fn test_now_playing_tracker() {
        let pad = PadId::from_index(2).unwrap();
        let sample = SampleRef::from_bytes("hat.wav", Vec::<u8>::new()).id();
        let first = VoiceId::next();
        let second = VoiceId::next();
        let mut tracker = NowPlayingTracker::new();

        for id in [first, second] {
            tracker.apply(&VoiceEvent::Started {
                id,
                pad,
                sample,
                duration: 2.0,
            });
        }
        tracker.apply(&VoiceEvent::Progress {
            id: first,
            progress: 0.5,
            duration: 2.0,
        });
        assert_eq!(2, tracker.len());
        assert_eq!(0.5, tracker.get(first).unwrap().progress);

        tracker.apply(&VoiceEvent::Ended { id: first });
        // Progress after an end is ignored.
        tracker.apply(&VoiceEvent::Progress {
            id: first,
            progress: 0.75,
            duration: 2.0,
        });
        assert_eq!(vec![second], tracker.voices().map(|(id, _)| id).collect::<Vec<_>>());

        tracker.apply(&VoiceEvent::Ended { id: second });
        assert!(tracker.is_empty());
    }
}
