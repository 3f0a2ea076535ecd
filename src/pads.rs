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

//! Pad identifiers and the keyboard to pad lookup.
//!
//! The instrument has a fixed 4x4 grid of pads. Each pad is named by the
//! keyboard key that plays it by default, which is also how pads are written
//! in config files and exported chop documents.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of pads on the instrument.
pub const NUM_PADS: usize = 16;

/// Default keys for each pad, row by row.
pub const PAD_KEYS: [char; NUM_PADS] = [
    '4', '5', '6', '7', //
    'r', 't', 'y', 'u', //
    'f', 'g', 'h', 'j', //
    'v', 'b', 'n', 'm',
];

/// Errors produced when naming a pad.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PadError {
    #[error("unknown pad '{0}'")]
    UnknownPad(String),

    #[error("pad index {0} is out of range")]
    OutOfRange(usize),
}

/// A stable pad identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PadId(u8);

impl PadId {
    /// Returns the pad at the given grid index (row major).
    pub fn from_index(index: usize) -> Result<PadId, PadError> {
        if index < NUM_PADS {
            Ok(PadId(index as u8))
        } else {
            Err(PadError::OutOfRange(index))
        }
    }

    /// Returns the pad whose default key is the given key. Case insensitive.
    pub fn from_key(key: char) -> Option<PadId> {
        let key = key.to_ascii_lowercase();
        PAD_KEYS
            .iter()
            .position(|pad_key| *pad_key == key)
            .map(|index| PadId(index as u8))
    }

    /// Every pad in grid order.
    pub fn all() -> impl Iterator<Item = PadId> {
        (0..NUM_PADS as u8).map(PadId)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// The default key for this pad.
    pub fn key(&self) -> char {
        PAD_KEYS[self.index()]
    }

    /// Returns the pad `count` positions after this one, if still on the grid.
    pub fn offset(&self, count: usize) -> Option<PadId> {
        PadId::from_index(self.index() + count).ok()
    }

    /// Grid row and column.
    pub fn position(&self) -> (usize, usize) {
        (self.index() / 4, self.index() % 4)
    }
}

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for PadId {
    type Err = PadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) => {
                PadId::from_key(key).ok_or_else(|| PadError::UnknownPad(trimmed.to_string()))
            }
            _ => Err(PadError::UnknownPad(trimmed.to_string())),
        }
    }
}

impl From<PadId> for String {
    fn from(pad: PadId) -> Self {
        pad.to_string()
    }
}

impl TryFrom<String> for PadId {
    type Error = PadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Many-to-one keyboard lookup. Built once at startup and never re-derived
/// while handling input.
#[derive(Clone, Debug)]
pub struct KeyMap {
    bindings: HashMap<char, PadId>,
}

impl KeyMap {
    /// Creates a key map with the default pad keys plus the given extra
    /// bindings. Extra bindings win over default keys.
    pub fn new(extra: &HashMap<char, PadId>) -> KeyMap {
        let mut bindings: HashMap<char, PadId> = PadId::all().map(|pad| (pad.key(), pad)).collect();
        for (key, pad) in extra {
            bindings.insert(key.to_ascii_lowercase(), *pad);
        }
        KeyMap { bindings }
    }

    /// Resolves a pressed key to a pad.
    pub fn resolve(&self, key: char) -> Option<PadId> {
        self.bindings.get(&key.to_ascii_lowercase()).copied()
    }

    /// All keys bound to the given pad, sorted.
    pub fn keys_for(&self, pad: PadId) -> Vec<char> {
        let mut keys: Vec<char> = self
            .bindings
            .iter()
            .filter(|(_, bound)| **bound == pad)
            .map(|(key, _)| *key)
            .collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        KeyMap::new(&HashMap::new())
    }
}
