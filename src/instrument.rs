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

//! The instrument owns the pads' samples, their chops, the trigger engine and
//! the open edit session, and runs them all on one event loop.
//!
//! Decoding is the only work that leaves the loop. It runs on the blocking
//! pool and its results come back over a channel, so every state change still
//! happens on the loop's thread.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, span, warn, Level};

use crate::audio::Device;
use crate::chops::codec::{self, CodecError};
use crate::chops::{Chop, ChopStore};
use crate::controller::{Driver, Event};
use crate::editor::{EditSession, EditorError, EditorKey, EditorSettings};
use crate::events::VoiceEvent;
use crate::pads::{KeyMap, PadId};
use crate::samples::{
    audio_files, loader, DecodedSample, LoadError, SampleId, SampleRef, SampleStore,
    TriggerEngine, VoiceId, WaveformState, MAX_CONCURRENT_VOICES,
};

/// Roughly 60 position polls per second.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Instrument tunables.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub max_voices: usize,
    /// Extra keys on top of the default pad keys.
    pub key_bindings: HashMap<char, PadId>,
    pub editor: EditorSettings,
    pub tick_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_voices: MAX_CONCURRENT_VOICES,
            key_bindings: HashMap::new(),
            editor: EditorSettings::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error("no sample bound to pad {0}")]
    NoSample(PadId),

    #[error("the chop editor is already open on pad {0}")]
    EditorOpen(PadId),

    #[error("the chop editor is not open")]
    NoSession,

    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("chop file error: {0}")]
    Io(#[from] io::Error),
}

/// A finished decode on its way back to the event loop.
struct Decoded {
    sample: SampleId,
    result: Result<DecodedSample, LoadError>,
}

pub struct Instrument {
    device: Arc<dyn Device>,
    samples: SampleStore,
    chops: ChopStore,
    engine: TriggerEngine,
    keys: KeyMap,
    editor_settings: EditorSettings,
    session: Option<EditSession>,
    tick_interval: Duration,
    decode_tx: mpsc::UnboundedSender<Decoded>,
    decode_rx: mpsc::UnboundedReceiver<Decoded>,
    pending_decodes: usize,
}

impl Instrument {
    /// Creates an instrument with no samples bound. Voice events are sent on
    /// `events_tx`.
    pub fn new(
        device: Arc<dyn Device>,
        settings: Settings,
        events_tx: crossbeam_channel::Sender<VoiceEvent>,
    ) -> Instrument {
        let (decode_tx, decode_rx) = mpsc::unbounded_channel();
        Instrument {
            engine: TriggerEngine::new(device.clone(), settings.max_voices, events_tx),
            device,
            samples: SampleStore::new(),
            chops: ChopStore::new(),
            keys: KeyMap::new(&settings.key_bindings),
            editor_settings: settings.editor,
            session: None,
            tick_interval: settings.tick_interval,
            decode_tx,
            decode_rx,
            pending_decodes: 0,
        }
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    pub fn chops(&self) -> &ChopStore {
        &self.chops
    }

    pub fn engine(&self) -> &TriggerEngine {
        &self.engine
    }

    pub fn keys(&self) -> &KeyMap {
        &self.keys
    }

    /// The open edit session, if any.
    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    /// Number of decodes whose results have not been applied yet.
    pub fn pending_decodes(&self) -> usize {
        self.pending_decodes
    }

    /// Replaces a pad's sample. The pad's voices stop, its chop is cleared,
    /// an edit session on it is closed and the new sample starts decoding.
    pub fn bind_sample(&mut self, pad: PadId, sample: SampleRef) {
        info!(pad = %pad, sample = sample.name(), "Assigning sample");
        self.engine.stop_pad(pad);
        if self.session.as_ref().is_some_and(|session| session.pad() == pad) {
            self.close_editor();
        }
        self.chops.clear(pad);
        if let Some(previous) = self.samples.bind(pad, sample.clone()) {
            self.device.unregister(previous.id());
        }
        self.schedule_decode(sample);
    }

    fn schedule_decode(&mut self, sample: SampleRef) {
        self.samples.begin_decode(sample.id());
        self.pending_decodes += 1;

        let decode_tx = self.decode_tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = loader::decode(&sample);
            // The instrument may already be gone.
            let _ = decode_tx.send(Decoded {
                sample: sample.id(),
                result,
            });
        });
    }

    fn apply_decode(&mut self, decoded: Decoded) {
        self.pending_decodes = self.pending_decodes.saturating_sub(1);

        let Decoded { sample, result } = decoded;
        let waveform = match self.samples.finish_decode(sample, result) {
            None => return,
            Some(Ok(waveform)) => {
                if let Some((pad, sample_ref)) = self.samples.find(sample) {
                    match self.device.register(sample_ref, waveform.clone()) {
                        Ok(()) => info!(
                            pad = %pad,
                            sample = sample_ref.name(),
                            duration = waveform.duration(),
                            "Sample ready"
                        ),
                        Err(e) => error!(
                            pad = %pad,
                            sample = sample_ref.name(),
                            err = %e,
                            "Unable to load sample on device"
                        ),
                    }
                    self.fit_chop(pad, waveform.duration());
                }
                Some(waveform)
            }
            Some(Err(_)) => None,
        };

        if let Some(session) = self.session.as_mut() {
            if session.sample() == sample {
                session.loaded(waveform);
            }
        }
    }

    /// Pulls a chop imported before its sample finished decoding back
    /// inside the sample. A chop that starts past the end is dropped.
    fn fit_chop(&mut self, pad: PadId, duration: f64) {
        let Some(chop) = self.chops.get(pad) else {
            return;
        };
        if chop.fits(duration) {
            return;
        }
        let clamped = Chop::clamped(chop.start(), chop.end(), duration);
        if clamped.width() > 0.0 {
            warn!(
                pad = %pad,
                end = chop.end(),
                duration,
                "Chop ends past its sample, clamping"
            );
            self.chops.set(pad, clamped);
        } else {
            warn!(
                pad = %pad,
                start = chop.start(),
                duration,
                "Chop starts past its sample, clearing"
            );
            self.chops.clear(pad);
        }
    }

    /// Waits for every scheduled decode and applies the results.
    pub async fn settle(&mut self) {
        while self.pending_decodes > 0 {
            match self.decode_rx.recv().await {
                Some(decoded) => self.apply_decode(decoded),
                None => break,
            }
        }
    }

    /// Binds dropped samples to consecutive pads, starting at `start`.
    /// Samples that would land past the last pad are ignored. Returns the
    /// pads that were assigned, in order.
    pub fn assign_dropped(&mut self, start: PadId, samples: Vec<SampleRef>) -> Vec<PadId> {
        let total = samples.len();
        let mut assigned = Vec::with_capacity(total);
        for (i, sample) in samples.into_iter().enumerate() {
            let Some(pad) = start.offset(i) else {
                warn!(ignored = total - i, "Dropped more samples than there are pads");
                break;
            };
            self.bind_sample(pad, sample);
            assigned.push(pad);
        }
        assigned
    }

    /// Drops files from disk. Anything that isn't an audio file is skipped
    /// and the rest are assigned in file name order.
    pub fn drop_files(&mut self, start: PadId, paths: Vec<PathBuf>) -> Vec<PadId> {
        let dropped = paths.len();
        let files = audio_files(paths);
        if files.len() < dropped {
            debug!(skipped = dropped - files.len(), "Skipped non-audio files");
        }
        self.assign_dropped(start, files.into_iter().map(SampleRef::from_file).collect())
    }

    /// Plays a pad with its chop applied.
    pub fn trigger(&mut self, pad: PadId) -> Option<VoiceId> {
        self.engine.trigger(pad, &self.samples, &self.chops)
    }

    /// Plays the pad bound to a key. Pad keys do nothing while editing.
    pub fn press_key(&mut self, key: char) -> Option<VoiceId> {
        if let Some(session) = self.session.as_ref() {
            debug!(key = %key, editing = %session.pad(), "Ignoring pad key while editing");
            return None;
        }
        match self.keys.resolve(key) {
            Some(pad) => self.trigger(pad),
            None => {
                debug!(key = %key, "Key is not bound to a pad");
                None
            }
        }
    }

    /// Opens the chop editor on a pad. The session stays in `Loading` until
    /// the pad's waveform is decoded.
    pub fn open_editor(&mut self, pad: PadId) -> Result<(), InstrumentError> {
        if let Some(session) = self.session.as_ref() {
            return Err(InstrumentError::EditorOpen(session.pad()));
        }
        let sample = self
            .samples
            .get(pad)
            .cloned()
            .ok_or(InstrumentError::NoSample(pad))?;

        let mut session =
            EditSession::new(pad, sample.id(), self.chops.get(pad), self.editor_settings);
        let mut needs_decode = false;
        match self.samples.waveform(sample.id()) {
            Some(WaveformState::Ready(waveform)) => session.loaded(Some(waveform.clone())),
            Some(WaveformState::Failed) => session.loaded(None),
            Some(WaveformState::Pending) => {}
            None => needs_decode = true,
        }
        self.session = Some(session);
        if needs_decode {
            self.schedule_decode(sample);
        }
        Ok(())
    }

    /// Closes the edit session without saving.
    pub fn close_editor(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.exit(&mut self.engine);
        }
    }

    /// A drag across the editor between two fractions of the view width.
    pub fn drag(&mut self, from: f64, to: f64) -> Result<(), InstrumentError> {
        let session = self.session.as_mut().ok_or(InstrumentError::NoSession)?;
        session.begin_drag(from, 1.0)?;
        session.update_drag(to, 1.0)?;
        session.end_drag(&mut self.engine)?;
        log_view(session);
        Ok(())
    }

    pub fn zoom(&mut self, factor: f64, anchor: f64) -> Result<(), InstrumentError> {
        let session = self.session.as_mut().ok_or(InstrumentError::NoSession)?;
        session.zoom_gesture(factor, anchor, 1.0);
        log_view(session);
        Ok(())
    }

    pub fn pan(&mut self, delta: f64) -> Result<(), InstrumentError> {
        let session = self.session.as_mut().ok_or(InstrumentError::NoSession)?;
        session.scroll(delta, 1.0);
        log_view(session);
        Ok(())
    }

    /// Forwards an editor key. The session is dropped once it closes.
    pub fn editor_key(&mut self, key: EditorKey) -> Result<(), InstrumentError> {
        let session = self.session.as_mut().ok_or(InstrumentError::NoSession)?;
        let result = session.handle_key(key, &mut self.chops, &mut self.engine);
        if session.is_closed() {
            self.session = None;
        }
        Ok(result?)
    }

    /// Stops every voice, including the editor preview.
    pub fn stop(&mut self) {
        self.engine.stop_all();
    }

    /// Advances playback by one clock tick.
    pub fn tick(&mut self) {
        self.engine.tick();
        if let Some(session) = self.session.as_mut() {
            session.sync(&self.engine);
        }
    }

    /// Writes the chop store to a file. Returns the number of chops written.
    pub fn export_chops(&self, path: &Path) -> Result<usize, InstrumentError> {
        fs::write(path, codec::export(&self.chops)?)?;
        info!(path = %path.display(), chops = self.chops.len(), "Exported chops");
        Ok(self.chops.len())
    }

    /// Replaces the chop store from a file. Chops are checked against the
    /// decoded length of each pad's sample; on any error nothing changes.
    pub fn import_chops(&mut self, path: &Path) -> Result<usize, InstrumentError> {
        let text = fs::read_to_string(path)?;
        let samples = &self.samples;
        Ok(codec::import(&mut self.chops, &text, |pad| samples.duration(pad))?)
    }

    /// Applies one controller event. Returns false when the instrument should
    /// shut down.
    pub fn handle_event(&mut self, event: Event) -> bool {
        let result = match event {
            Event::Key(key) => {
                self.press_key(key);
                Ok(())
            }
            Event::Trigger(pad) => {
                if self.session.is_none() {
                    self.trigger(pad);
                }
                Ok(())
            }
            Event::Edit(pad) => self.open_editor(pad),
            Event::Drag { from, to } => self.drag(from, to),
            Event::Zoom { factor, anchor } => self.zoom(factor, anchor),
            Event::Pan { delta } => self.pan(delta),
            Event::EditorKey(key) => self.editor_key(key),
            Event::Drop { start, paths } => {
                self.drop_files(start, paths);
                Ok(())
            }
            Event::Export(path) => self.export_chops(&path).map(|_| ()),
            Event::Import(path) => self.import_chops(&path).map(|_| ()),
            Event::Stop => {
                self.stop();
                Ok(())
            }
            Event::Quit => return false,
        };

        if let Err(e) = result {
            error!("Error handling event: {}", e);
        }
        true
    }

    /// Runs the event loop until the driver quits or closes.
    pub async fn run(mut self, driver: Arc<dyn Driver>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "instrument");
        let _enter = span.enter();

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            pads = self.samples.iter().count(),
            device = %self.device,
            "Instrument started."
        );

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(),
                Some(decoded) = self.decode_rx.recv() => self.apply_decode(decoded),
                event = events_rx.recv() => match event {
                    Some(event) => {
                        info!(event = ?event, "Received event.");
                        if !self.handle_event(event) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        info!("Instrument closing.");
        self.close_editor();
        self.engine.stop_all();
        drop(events_rx);
        match join_handle.await {
            Ok(Err(e)) => error!("Controller driver failed: {}", e),
            Err(e) => error!("Error waiting for controller driver to stop: {}", e),
            Ok(Ok(())) => {}
        }
        Ok(())
    }
}

fn log_view(session: &EditSession) {
    let (start, end) = session.view().visible_range();
    debug!(
        pad = %session.pad(),
        zoom = session.view().zoom(),
        visible_start = start,
        visible_end = end,
        selection = ?session.selection_on_screen(),
        "Editor view"
    );
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("device", &self.device.to_string())
            .field("samples", &self.samples)
            .field("chops", &self.chops.len())
            .field("engine", &self.engine)
            .field("session", &self.session)
            .field("pending_decodes", &self.pending_decodes)
            .finish()
    }
}
