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

//! Pad samples and polyphonic playback.
//!
//! This module provides:
//! - Sample references bound to pads and their decoded waveforms
//! - Decoding with symphonia
//! - Per-pad voice pools with oldest-first eviction
//! - The trigger engine that applies chops and reports voice lifecycles

mod engine;
pub mod loader;
mod store;
mod voice;

pub use engine::TriggerEngine;
pub use loader::{DecodedSample, LoadError};
pub use store::{
    audio_files, is_audio_file, SampleId, SampleRef, SampleSource, SampleStore, WaveformState,
    AUDIO_EXTENSIONS,
};
pub use voice::{Voice, VoiceId, VoicePool, VoiceStatus, MAX_CONCURRENT_VOICES};
