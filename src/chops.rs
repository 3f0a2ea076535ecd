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

//! Per-pad trim ("chop") points.
//!
//! A chop is a non-destructive `[start, end]` window in seconds over a pad's
//! sample. Chops only live for the session; the codec module is the only way
//! they leave the process.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pads::PadId;

pub mod codec;

/// Errors produced when building a chop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChopError {
    #[error("chop bounds must be finite (start={start}, end={end})")]
    NotFinite { start: f64, end: f64 },

    #[error("chop start {0} is negative")]
    NegativeStart(f64),

    #[error("chop start {start} is after end {end}")]
    Inverted { start: f64, end: f64 },
}

/// Unvalidated wire form of a chop.
#[derive(Deserialize)]
struct RawChop {
    start: f64,
    end: f64,
}

/// A validated window over a sample, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChop")]
pub struct Chop {
    start: f64,
    end: f64,
}

impl Chop {
    /// Creates a chop, validating `0 <= start <= end`.
    pub fn new(start: f64, end: f64) -> Result<Chop, ChopError> {
        if !start.is_finite() || !end.is_finite() {
            return Err(ChopError::NotFinite { start, end });
        }
        if start < 0.0 {
            return Err(ChopError::NegativeStart(start));
        }
        if start > end {
            return Err(ChopError::Inverted { start, end });
        }
        Ok(Chop { start, end })
    }

    /// The window covering an entire sample.
    pub fn full(duration: f64) -> Chop {
        Chop::clamped(0.0, duration, duration)
    }

    /// Builds a window from arbitrary bounds by clamping both into
    /// `[0, duration]` and forcing `start <= end`. Never fails.
    pub fn clamped(start: f64, end: f64, duration: f64) -> Chop {
        let duration = if duration.is_finite() {
            duration.max(0.0)
        } else {
            0.0
        };
        let clamp = |value: f64| {
            if value.is_finite() {
                value.clamp(0.0, duration)
            } else {
                0.0
            }
        };
        let start = clamp(start);
        let end = clamp(end).max(start);
        Chop { start, end }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    /// True if this chop lies within a sample of the given duration.
    pub fn fits(&self, duration: f64) -> bool {
        self.end <= duration
    }
}

impl TryFrom<RawChop> for Chop {
    type Error = ChopError;

    fn try_from(raw: RawChop) -> Result<Self, Self::Error> {
        Chop::new(raw.start, raw.end)
    }
}

/// Saved chops keyed by pad. At most one chop per pad.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChopStore {
    chops: HashMap<PadId, Chop>,
}

impl ChopStore {
    pub fn new() -> ChopStore {
        ChopStore::default()
    }

    pub fn get(&self, pad: PadId) -> Option<Chop> {
        self.chops.get(&pad).copied()
    }

    /// Saves the chop for the given pad, replacing any previous one.
    pub fn set(&mut self, pad: PadId, chop: Chop) {
        self.chops.insert(pad, chop);
    }

    /// Removes the chop for the given pad.
    pub fn clear(&mut self, pad: PadId) -> Option<Chop> {
        self.chops.remove(&pad)
    }

    /// Replaces every chop at once.
    pub fn replace_all(&mut self, chops: HashMap<PadId, Chop>) {
        self.chops = chops;
    }

    pub fn iter(&self) -> impl Iterator<Item = (PadId, Chop)> + '_ {
        self.chops.iter().map(|(pad, chop)| (*pad, *chop))
    }

    pub fn len(&self) -> usize {
        self.chops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chop_validation() {
        assert!(Chop::new(0.0, 0.0).is_ok());
        assert!(Chop::new(1.0, 2.5).is_ok());
        assert_eq!(
            Err(ChopError::Inverted {
                start: 2.0,
                end: 1.0
            }),
            Chop::new(2.0, 1.0)
        );
        assert_eq!(Err(ChopError::NegativeStart(-0.5)), Chop::new(-0.5, 1.0));
        assert!(matches!(
            Chop::new(0.0, f64::NAN),
            Err(ChopError::NotFinite { .. })
        ));
        assert!(matches!(
            Chop::new(0.0, f64::INFINITY),
            Err(ChopError::NotFinite { .. })
        ));
    }

    #[test]
    fn test_chop_clamped() {
        let chop = Chop::clamped(-1.0, 10.0, 4.0);
        assert_eq!((0.0, 4.0), (chop.start(), chop.end()));

        let chop = Chop::clamped(3.0, 1.0, 4.0);
        assert_eq!((3.0, 3.0), (chop.start(), chop.end()));

        let chop = Chop::full(f64::NAN);
        assert_eq!((0.0, 0.0), (chop.start(), chop.end()));
    }

    #[test]
    fn test_chop_fits() {
        let chop = Chop::new(1.0, 2.5).unwrap();
        assert!(chop.fits(2.5));
        assert!(chop.fits(4.0));
        assert!(!chop.fits(2.0));
        assert_eq!(1.5, chop.width());
    }

    #[test]
    fn test_chop_deserialize_rejects_invalid() {
        assert!(serde_json::from_str::<Chop>(r#"{"start": 1.0, "end": 2.0}"#).is_ok());
        assert!(serde_json::from_str::<Chop>(r#"{"start": 2.0, "end": 1.0}"#).is_err());
        assert!(serde_json::from_str::<Chop>(r#"{"start": -1.0, "end": 1.0}"#).is_err());
        assert!(serde_json::from_str::<Chop>(r#"{"start": 1.0}"#).is_err());
    }

    #[test]
    fn test_chop_store() {
        let pad = PadId::from_index(0).unwrap();
        let other = PadId::from_index(1).unwrap();
        let mut store = ChopStore::new();
        assert!(store.is_empty());

        store.set(pad, Chop::new(0.5, 1.0).unwrap());
        store.set(pad, Chop::new(1.0, 2.0).unwrap());
        store.set(other, Chop::new(0.0, 0.1).unwrap());
        assert_eq!(2, store.len());
        assert_eq!(Some(Chop::new(1.0, 2.0).unwrap()), store.get(pad));

        assert!(store.clear(pad).is_some());
        assert_eq!(None, store.get(pad));
        assert!(store.clear(pad).is_none());

        store.replace_all(HashMap::new());
        assert!(store.is_empty());
    }
}
