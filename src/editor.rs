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

//! The chop editor: a zoomable waveform view and the selection session that
//! runs on top of it.

mod session;
mod view;

pub use session::{EditSession, EditorError, EditorKey, EditorState};
pub use view::{WaveformView, DEFAULT_ZOOM_MAX};

/// Selections narrower than this many seconds are treated as clicks.
pub const DEFAULT_CLICK_THRESHOLD: f64 = 0.01;

/// Tunables for edit sessions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EditorSettings {
    pub zoom_max: f64,
    pub click_threshold: f64,
}

impl Default for EditorSettings {
    fn default() -> Self {
        EditorSettings {
            zoom_max: DEFAULT_ZOOM_MAX,
            click_threshold: DEFAULT_CLICK_THRESHOLD,
        }
    }
}
