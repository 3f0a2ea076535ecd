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

//! One chop editing session for one pad.
//!
//! A session starts in `Loading` until the pad's waveform is decoded, then
//! moves between `Ready` and `Dragging` as the user sweeps out a selection.
//! Preview playback is orthogonal to those states. `apply` and `exit` both
//! close the session; only `apply` touches the chop store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use super::view::WaveformView;
use super::EditorSettings;
use crate::audio::PlaybackError;
use crate::chops::{Chop, ChopStore};
use crate::pads::PadId;
use crate::samples::{DecodedSample, SampleId, TriggerEngine, VoiceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorState {
    Loading,
    Ready,
    Dragging,
    Closed,
}

/// Keys bound while a session is open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorKey {
    TogglePreview,
    Apply,
    Exit,
}

impl FromStr for EditorKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            " " | "space" | "preview" => Ok(EditorKey::TogglePreview),
            "enter" | "return" | "apply" => Ok(EditorKey::Apply),
            "esc" | "escape" | "exit" => Ok(EditorKey::Exit),
            _ => Err(format!("unknown editor key '{}'", s)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("no selection to apply")]
    NoSelection,

    #[error("waveform is still loading")]
    Loading,

    #[error("editor session is closed")]
    Closed,

    #[error("no drag in progress")]
    NotDragging,

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

pub struct EditSession {
    pad: PadId,
    sample: SampleId,
    settings: EditorSettings,
    state: EditorState,
    view: WaveformView,
    waveform: Option<Arc<DecodedSample>>,
    selection: Option<Chop>,
    drag_anchor: Option<f64>,
    click_point: Option<f64>,
    preview: Option<VoiceId>,
}

impl EditSession {
    /// Opens a session for the given pad. `existing` is the pad's saved chop,
    /// shown as the initial selection once the waveform is loaded.
    pub fn new(
        pad: PadId,
        sample: SampleId,
        existing: Option<Chop>,
        settings: EditorSettings,
    ) -> EditSession {
        info!(pad = %pad, sample = %sample, "Opening chop editor");
        EditSession {
            pad,
            sample,
            settings,
            state: EditorState::Loading,
            view: WaveformView::with_zoom_max(0.0, settings.zoom_max),
            waveform: None,
            selection: existing,
            drag_anchor: None,
            click_point: None,
            preview: None,
        }
    }

    /// Leaves `Loading`. A missing waveform means decoding failed: the
    /// session is still usable but has nothing to draw.
    pub fn loaded(&mut self, waveform: Option<Arc<DecodedSample>>) {
        if self.state != EditorState::Loading {
            return;
        }
        let duration = waveform.as_ref().map(|w| w.duration()).unwrap_or(0.0);
        self.view = WaveformView::with_zoom_max(duration, self.settings.zoom_max);
        self.selection = self
            .selection
            .filter(|chop| chop.width() > 0.0 && chop.fits(duration));
        self.waveform = waveform;
        self.state = EditorState::Ready;
        debug!(pad = %self.pad, duration, "Chop editor ready");
    }

    pub fn pad(&self) -> PadId {
        self.pad
    }

    pub fn sample(&self) -> SampleId {
        self.sample
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn view(&self) -> &WaveformView {
        &self.view
    }

    pub fn selection(&self) -> Option<Chop> {
        self.selection
    }

    pub fn is_previewing(&self) -> bool {
        self.preview.is_some()
    }

    pub fn has_waveform(&self) -> bool {
        self.waveform.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state == EditorState::Closed
    }

    fn ensure_open(&self) -> Result<(), EditorError> {
        match self.state {
            EditorState::Closed => Err(EditorError::Closed),
            EditorState::Loading => Err(EditorError::Loading),
            EditorState::Ready | EditorState::Dragging => Ok(()),
        }
    }

    fn valid_selection(&self) -> Option<Chop> {
        self.selection
            .filter(|chop| chop.width() > 0.0 && chop.fits(self.view.duration()))
    }

    /// True if `apply` would succeed.
    pub fn can_apply(&self) -> bool {
        self.ensure_open().is_ok() && self.valid_selection().is_some()
    }

    pub fn begin_drag(&mut self, x: f64, width: f64) -> Result<(), EditorError> {
        self.ensure_open()?;
        let time = self.view.screen_to_time(x, width);
        self.drag_anchor = Some(time);
        self.click_point = None;
        self.selection = Some(Chop::clamped(time, time, self.view.duration()));
        self.state = EditorState::Dragging;
        Ok(())
    }

    pub fn update_drag(&mut self, x: f64, width: f64) -> Result<(), EditorError> {
        let anchor = match (self.state, self.drag_anchor) {
            (EditorState::Dragging, Some(anchor)) => anchor,
            _ => return Err(EditorError::NotDragging),
        };
        let time = self.view.screen_to_time(x, width);
        self.selection = Some(Chop::clamped(
            anchor.min(time),
            anchor.max(time),
            self.view.duration(),
        ));
        Ok(())
    }

    /// Finishes a drag. A drag narrower than the click threshold is a click:
    /// the selection is dropped and the sample previews from that point.
    pub fn end_drag(&mut self, engine: &mut TriggerEngine) -> Result<(), EditorError> {
        let anchor = match (self.state, self.drag_anchor.take()) {
            (EditorState::Dragging, Some(anchor)) => anchor,
            _ => return Err(EditorError::NotDragging),
        };
        self.state = EditorState::Ready;

        let width = self.selection.map(|chop| chop.width()).unwrap_or(0.0);
        if width < self.settings.click_threshold {
            self.selection = None;
            self.click_point = Some(anchor);
            self.preview_play(engine)?;
        } else {
            debug!(pad = %self.pad, selection = ?self.selection, "Selection made");
        }
        Ok(())
    }

    /// Plays the selection, or from the last click point to the end, or the
    /// whole sample.
    pub fn preview_play(&mut self, engine: &mut TriggerEngine) -> Result<VoiceId, EditorError> {
        self.ensure_open()?;
        let (start, end) = match self.valid_selection() {
            Some(chop) => (chop.start(), Some(chop.end())),
            None => (self.click_point.unwrap_or(0.0), None),
        };
        self.preview = None;
        let id = engine.play_preview(self.pad, self.sample, start, end)?;
        self.preview = Some(id);
        Ok(id)
    }

    pub fn preview_stop(&mut self, engine: &mut TriggerEngine) {
        if let Some(id) = self.preview.take() {
            if engine.preview_id() == Some(id) {
                engine.stop_preview();
            }
        }
    }

    pub fn toggle_preview(&mut self, engine: &mut TriggerEngine) -> Result<(), EditorError> {
        if self.is_previewing() {
            self.preview_stop(engine);
        } else {
            self.preview_play(engine)?;
        }
        Ok(())
    }

    /// Drops the preview flag once the engine's preview voice has ended.
    pub fn sync(&mut self, engine: &TriggerEngine) {
        if let Some(id) = self.preview {
            if engine.preview_id() != Some(id) {
                self.preview = None;
            }
        }
    }

    /// Normalized screen position of the preview playhead.
    pub fn playhead(&self, engine: &TriggerEngine) -> Option<f64> {
        let id = self.preview?;
        if engine.preview_id() != Some(id) {
            return None;
        }
        engine
            .preview_position()
            .map(|time| self.view.time_to_screen(time))
    }

    /// Saves the selection as the pad's chop, stops all playback and closes
    /// the session.
    pub fn apply(
        &mut self,
        chops: &mut ChopStore,
        engine: &mut TriggerEngine,
    ) -> Result<Chop, EditorError> {
        self.ensure_open()?;
        let chop = self.valid_selection().ok_or(EditorError::NoSelection)?;

        chops.set(self.pad, chop);
        engine.stop_all();
        self.preview = None;
        self.drag_anchor = None;
        self.state = EditorState::Closed;
        info!(
            pad = %self.pad,
            start = chop.start(),
            end = chop.end(),
            "Chop applied"
        );
        Ok(chop)
    }

    /// Closes the session without saving.
    pub fn exit(&mut self, engine: &mut TriggerEngine) {
        if self.is_closed() {
            return;
        }
        self.preview_stop(engine);
        self.drag_anchor = None;
        self.state = EditorState::Closed;
        info!(pad = %self.pad, "Chop editor closed");
    }

    /// Wheel with modifier or pinch: multiplies the zoom around the pointer.
    pub fn zoom_gesture(&mut self, factor: f64, x: f64, width: f64) {
        if self.is_closed() || !factor.is_finite() || factor <= 0.0 {
            return;
        }
        if width.is_nan() || width <= 0.0 {
            return;
        }
        self.view.zoom_at(self.view.zoom() * factor, x / width);
    }

    /// Horizontal scroll in pixels. Only pans when zoomed in.
    pub fn scroll(&mut self, delta_x: f64, width: f64) {
        if self.is_closed() || self.view.zoom() <= 1.0 || width.is_nan() || width <= 0.0 {
            return;
        }
        self.view.pan_by(delta_x / width / self.view.zoom());
    }

    pub fn handle_key(
        &mut self,
        key: EditorKey,
        chops: &mut ChopStore,
        engine: &mut TriggerEngine,
    ) -> Result<(), EditorError> {
        match key {
            EditorKey::TogglePreview => self.toggle_preview(engine),
            EditorKey::Apply => self.apply(chops, engine).map(|_| ()),
            EditorKey::Exit => {
                self.exit(engine);
                Ok(())
            }
        }
    }

    /// Waveform peaks across the visible range, one pair per column.
    pub fn peaks(&self, columns: usize) -> Vec<(f32, f32)> {
        match self.waveform.as_ref() {
            Some(waveform) => {
                let (start, end) = self.view.visible_range();
                waveform.peaks(start, end, columns)
            }
            None => Vec::new(),
        }
    }

    /// The selection in normalized screen coordinates.
    pub fn selection_on_screen(&self) -> Option<(f64, f64)> {
        self.selection.map(|chop| {
            (
                self.view.time_to_screen(chop.start()),
                self.view.time_to_screen(chop.end()),
            )
        })
    }
}

impl fmt::Debug for EditSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditSession")
            .field("pad", &self.pad)
            .field("state", &self.state)
            .field("selection", &self.selection)
            .field("zoom", &self.view.zoom())
            .field("pan", &self.view.pan())
            .field("previewing", &self.preview.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock;
    use crate::samples::SampleRef;

    const WIDTH: f64 = 400.0;

    struct Fixture {
        device: Arc<mock::Device>,
        engine: TriggerEngine,
        chops: ChopStore,
        session: EditSession,
    }

    /// A session over a 4 second sample, already loaded.
    fn fixture() -> Fixture {
        let device = Arc::new(mock::Device::get("mock-device"));
        let (events_tx, _) = crossbeam_channel::unbounded();
        let engine = TriggerEngine::new(device.clone(), 8, events_tx);
        let sample = SampleRef::from_bytes("perc.wav", Vec::<u8>::new());
        device.register_duration(sample.id(), 4.0);

        let pad = PadId::from_key('g').unwrap();
        let mut session = EditSession::new(pad, sample.id(), None, EditorSettings::default());
        session.loaded(Some(Arc::new(DecodedSample::new(vec![vec![0.0; 400]], 100))));
        Fixture {
            device,
            engine,
            chops: ChopStore::new(),
            session,
        }
    }

    fn x(time: f64) -> f64 {
        time / 4.0 * WIDTH
    }

    #[test]
    fn test_loading_blocks_editing() {
        let pad = PadId::from_key('g').unwrap();
        let sample = SampleRef::from_bytes("perc.wav", Vec::<u8>::new());
        let mut session = EditSession::new(pad, sample.id(), None, EditorSettings::default());
        assert_eq!(EditorState::Loading, session.state());
        assert!(matches!(
            session.begin_drag(0.0, WIDTH),
            Err(EditorError::Loading)
        ));

        session.loaded(None);
        assert_eq!(EditorState::Ready, session.state());
        assert!(!session.has_waveform());
        assert!(session.peaks(10).is_empty());
        assert_eq!(0.0, session.view().duration());
    }

    #[test]
    fn test_drag_builds_ordered_selection() {
        let mut f = fixture();
        f.session.begin_drag(x(2.5), WIDTH).unwrap();
        assert_eq!(EditorState::Dragging, f.session.state());
        f.session.update_drag(x(3.0), WIDTH).unwrap();
        f.session.update_drag(x(1.0), WIDTH).unwrap();
        f.session.end_drag(&mut f.engine).unwrap();

        assert_eq!(EditorState::Ready, f.session.state());
        assert_eq!(Some(Chop::new(1.0, 2.5).unwrap()), f.session.selection());
        assert_eq!(Some((0.25, 0.625)), f.session.selection_on_screen());
        assert!(!f.session.is_previewing());
        assert!(f.session.can_apply());
    }

    #[test]
    fn test_click_previews_to_natural_end() {
        let mut f = fixture();
        f.session.begin_drag(x(1.5), WIDTH).unwrap();
        f.session.end_drag(&mut f.engine).unwrap();

        assert_eq!(None, f.session.selection());
        assert!(f.session.is_previewing());
        assert_eq!(vec![(f.session.sample(), 1.5)], f.device.starts());

        // Plays past where any selection would have been, to the end.
        f.device.advance(2.0);
        f.engine.tick();
        f.session.sync(&f.engine);
        assert!(f.session.is_previewing());
        f.device.advance(1.0);
        f.engine.tick();
        f.session.sync(&f.engine);
        assert!(!f.session.is_previewing());
    }

    #[test]
    fn test_preview_toggle_and_playhead() {
        let mut f = fixture();
        f.session.begin_drag(x(1.0), WIDTH).unwrap();
        f.session.update_drag(x(2.0), WIDTH).unwrap();
        f.session.end_drag(&mut f.engine).unwrap();

        f.session.handle_key(EditorKey::TogglePreview, &mut f.chops, &mut f.engine).unwrap();
        assert!(f.session.is_previewing());
        f.device.advance(0.5);
        assert_eq!(Some(0.375), f.session.playhead(&f.engine));

        f.session.handle_key(EditorKey::TogglePreview, &mut f.chops, &mut f.engine).unwrap();
        assert!(!f.session.is_previewing());
        assert_eq!(None, f.engine.preview_id());
        assert_eq!(0, f.device.playing_count());
    }

    #[test]
    fn test_apply_writes_chop_and_stops_everything() {
        let mut f = fixture();
        let pad = f.session.pad();
        let mut samples = crate::samples::SampleStore::new();
        let drum = SampleRef::from_bytes("drum.wav", Vec::<u8>::new());
        f.device.register_duration(drum.id(), 1.0);
        let drum_pad = PadId::from_key('v').unwrap();
        samples.bind(drum_pad, drum);
        f.engine.trigger(drum_pad, &samples, &f.chops).unwrap();

        f.session.begin_drag(x(1.0), WIDTH).unwrap();
        f.session.update_drag(x(2.5), WIDTH).unwrap();
        f.session.end_drag(&mut f.engine).unwrap();
        f.session.preview_play(&mut f.engine).unwrap();

        let chop = f.session.apply(&mut f.chops, &mut f.engine).unwrap();
        assert_eq!(Chop::new(1.0, 2.5).unwrap(), chop);
        assert_eq!(Some(chop), f.chops.get(pad));
        assert!(f.session.is_closed());
        assert_eq!(0, f.device.playing_count());
        assert_eq!(0, f.engine.total_active());
        assert!(matches!(
            f.session.apply(&mut f.chops, &mut f.engine),
            Err(EditorError::Closed)
        ));
    }

    #[test]
    fn test_apply_without_selection_is_refused() {
        let mut f = fixture();
        assert!(!f.session.can_apply());
        assert!(matches!(
            f.session.handle_key(EditorKey::Apply, &mut f.chops, &mut f.engine),
            Err(EditorError::NoSelection)
        ));
        assert!(f.chops.is_empty());
        assert_eq!(EditorState::Ready, f.session.state());
    }

    #[test]
    fn test_exit_discards() {
        let mut f = fixture();
        f.session.begin_drag(x(1.0), WIDTH).unwrap();
        f.session.update_drag(x(2.0), WIDTH).unwrap();
        f.session.end_drag(&mut f.engine).unwrap();
        f.session.preview_play(&mut f.engine).unwrap();

        f.session.handle_key(EditorKey::Exit, &mut f.chops, &mut f.engine).unwrap();
        assert!(f.session.is_closed());
        assert!(f.chops.is_empty());
        assert_eq!(0, f.device.playing_count());
    }

    #[test]
    fn test_existing_chop_is_initial_selection() {
        let pad = PadId::from_key('g').unwrap();
        let sample = SampleRef::from_bytes("perc.wav", Vec::<u8>::new());
        let decoded = Arc::new(DecodedSample::new(vec![vec![0.0; 400]], 100));

        let existing = Chop::new(0.5, 1.5).unwrap();
        let mut session =
            EditSession::new(pad, sample.id(), Some(existing), EditorSettings::default());
        session.loaded(Some(decoded.clone()));
        assert_eq!(Some(existing), session.selection());

        // A saved chop that no longer fits the sample is dropped.
        let stale = Chop::new(3.0, 9.0).unwrap();
        let mut session =
            EditSession::new(pad, sample.id(), Some(stale), EditorSettings::default());
        session.loaded(Some(decoded));
        assert_eq!(None, session.selection());
    }

    #[test]
    fn test_zoom_and_scroll_gestures() {
        let mut f = fixture();
        f.session.scroll(100.0, WIDTH);
        assert_eq!(0.0, f.session.view().pan());

        f.session.zoom_gesture(4.0, WIDTH / 2.0, WIDTH);
        assert_eq!(4.0, f.session.view().zoom());
        assert_eq!(2.0, f.session.view().screen_to_time(WIDTH / 2.0, WIDTH));

        // A quarter of the view width scrolls a quarter of the visible span.
        let before = f.session.view().visible_range();
        f.session.scroll(WIDTH / 4.0, WIDTH);
        let after = f.session.view().visible_range();
        assert!((after.0 - before.0 - 0.25).abs() < 1e-9);

        f.session.zoom_gesture(0.0, 0.0, WIDTH);
        f.session.zoom_gesture(f64::NAN, 0.0, WIDTH);
        assert_eq!(4.0, f.session.view().zoom());

        // Drags map through the zoomed view.
        let (start, _) = f.session.view().visible_range();
        f.session.begin_drag(0.0, WIDTH).unwrap();
        f.session.update_drag(WIDTH, WIDTH).unwrap();
        let selection = f.session.selection().unwrap();
        assert!((selection.start() - start).abs() < 1e-9);
        assert!((selection.width() - 1.0).abs() < 1e-9);
        assert_eq!(40, f.session.peaks(40).len());
    }

    #[test]
    fn test_editor_keys() {
        assert_eq!(Ok(EditorKey::TogglePreview), "space".parse::<EditorKey>());
        assert_eq!(Ok(EditorKey::Apply), "enter".parse::<EditorKey>());
        assert_eq!(Ok(EditorKey::Exit), "escape".parse::<EditorKey>());
        assert!("q".parse::<EditorKey>().is_err());
    }
}
