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
use std::io;
use std::path::PathBuf;

use tokio::{sync::mpsc::Sender, task::JoinHandle};

use crate::editor::EditorKey;
use crate::pads::PadId;

pub mod keyboard;

/// Controller events that drive the instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A key press. Resolved through the key map to a pad.
    Key(char),

    /// Plays a pad directly.
    Trigger(PadId),

    /// Opens the chop editor on a pad.
    Edit(PadId),

    /// A completed drag across the editor, as fractions of the view width.
    /// `from == to` is a click.
    Drag { from: f64, to: f64 },

    /// Multiplies the editor zoom around an anchor fraction of the view.
    Zoom { factor: f64, anchor: f64 },

    /// Scrolls the editor by a fraction of the view width.
    Pan { delta: f64 },

    /// A key bound inside the editor.
    EditorKey(EditorKey),

    /// Files dropped onto a pad. The first lands on `start`, the rest on the
    /// following pads.
    Drop { start: PadId, paths: Vec<PathBuf> },

    /// Writes the chop store to a file.
    Export(PathBuf),

    /// Replaces the chop store from a file.
    Import(PathBuf),

    /// Stops every voice.
    Stop,

    /// Shuts the instrument down.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}
