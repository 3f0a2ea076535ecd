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
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use config::{Config, File};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use super::audio::Audio;
use super::error::ConfigError;
use crate::editor::{EditorSettings, DEFAULT_CLICK_THRESHOLD, DEFAULT_ZOOM_MAX};
use crate::instrument::Settings;
use crate::pads::PadId;
use crate::samples::MAX_CONCURRENT_VOICES;

/// Chop editor settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Editor {
    /// Maximum zoom factor of the waveform view (default: 50).
    zoom_max: Option<f64>,

    /// Drags narrower than this many seconds count as clicks (default: 0.01).
    click_threshold: Option<f64>,
}

impl Editor {
    pub fn settings(&self) -> Result<EditorSettings, ConfigError> {
        let zoom_max = self.zoom_max.unwrap_or(DEFAULT_ZOOM_MAX);
        if !zoom_max.is_finite() || zoom_max < 1.0 {
            return Err(ConfigError::InvalidValue(
                "editor.zoom_max",
                format!("{} is less than 1", zoom_max),
            ));
        }
        let click_threshold = self.click_threshold.unwrap_or(DEFAULT_CLICK_THRESHOLD);
        if !click_threshold.is_finite() || click_threshold < 0.0 {
            return Err(ConfigError::InvalidValue(
                "editor.click_threshold",
                format!("{} is negative", click_threshold),
            ));
        }
        Ok(EditorSettings {
            zoom_max,
            click_threshold,
        })
    }
}

/// The instrument configuration file.
#[derive(Deserialize, Clone, Debug)]
pub struct Instrument {
    /// The audio output.
    audio: Option<Audio>,

    /// Samples bound to specific pads, keyed by pad key.
    #[serde(default)]
    samples: HashMap<String, PathBuf>,

    /// Samples handed out to the pads left unbound by `samples`.
    #[serde(default)]
    sample_pool: Vec<PathBuf>,

    /// Shuffle the sample pool before handing it out.
    #[serde(default)]
    shuffle: bool,

    /// Extra keys that play a pad, e.g. `a: "4"`.
    #[serde(default)]
    key_bindings: HashMap<String, String>,

    /// Maximum concurrent voices per pad (default: 8).
    max_voices: Option<usize>,

    #[serde(default)]
    editor: Editor,

    /// Directory relative sample paths are resolved against.
    #[serde(skip)]
    base_path: PathBuf,
}

impl Instrument {
    /// Parse an instrument from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Instrument, ConfigError> {
        let mut instrument = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Instrument>()?;
        instrument.base_path = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(instrument)
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> Option<Audio> {
        self.audio.clone()
    }

    pub fn max_voices(&self) -> Result<usize, ConfigError> {
        match self.max_voices {
            Some(0) => Err(ConfigError::InvalidValue(
                "max_voices",
                "must be at least 1".to_string(),
            )),
            Some(max_voices) => Ok(max_voices),
            None => Ok(MAX_CONCURRENT_VOICES),
        }
    }

    /// Extra key bindings on top of the default pad keys.
    pub fn key_bindings(&self) -> Result<HashMap<char, PadId>, ConfigError> {
        self.key_bindings
            .iter()
            .map(|(key, pad)| {
                let mut chars = key.chars();
                match (chars.next(), chars.next()) {
                    (Some(key), None) => Ok((key, pad.parse::<PadId>()?)),
                    _ => Err(ConfigError::KeyBinding(key.clone())),
                }
            })
            .collect()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    /// Works out the startup sample of each pad. Explicit bindings win; the
    /// pool fills the remaining pads in grid order, shuffled first if asked.
    pub fn assignments<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<(PadId, PathBuf)>, ConfigError> {
        let mut assignments: Vec<(PadId, PathBuf)> = Vec::new();
        let mut bound: HashSet<PadId> = HashSet::new();
        for (key, path) in &self.samples {
            let pad: PadId = key.parse()?;
            bound.insert(pad);
            assignments.push((pad, self.resolve(path)));
        }

        let mut pool: Vec<PathBuf> = self.sample_pool.iter().map(|p| self.resolve(p)).collect();
        if self.shuffle {
            pool.shuffle(rng);
        }

        let free = PadId::all().filter(|pad| !bound.contains(pad));
        let mut pool = pool.into_iter();
        for (pad, path) in free.zip(pool.by_ref()) {
            assignments.push((pad, path));
        }
        let leftover = pool.count();
        if leftover > 0 {
            warn!(leftover, "More pool samples than free pads");
        }

        assignments.sort_by_key(|(pad, _)| *pad);
        debug!(pads = assignments.len(), "Resolved sample assignments");
        Ok(assignments)
    }

    /// Everything the instrument needs from this file apart from samples.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let tick_interval = match &self.audio {
            Some(audio) => audio.tick_interval()?,
            None => Settings::default().tick_interval,
        };
        Ok(Settings {
            max_voices: self.max_voices()?,
            key_bindings: self.key_bindings()?,
            editor: self.editor.settings()?,
            tick_interval,
        })
    }
}
