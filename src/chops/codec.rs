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

//! JSON export and import of the chop store.
//!
//! The document looks like `{"version": 1, "chops": {"r": {"start": 1.0, "end": 2.5}}}`.
//! Import is all or nothing: any unknown version, unknown pad or invalid chop
//! rejects the whole document.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Chop, ChopStore};
use crate::pads::PadId;

/// The only document version this codec reads or writes.
pub const CHOPS_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed chop document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported chop document version {0}")]
    UnsupportedVersion(u32),

    #[error("chop for pad {pad} ends at {end}s but the sample is only {duration}s long")]
    OutOfRange { pad: PadId, end: f64, duration: f64 },
}

#[derive(Serialize, Deserialize)]
struct ChopDocument {
    version: u32,
    chops: BTreeMap<PadId, Chop>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Serializes the store. Pads are written in grid order.
pub fn export(store: &ChopStore) -> Result<String, CodecError> {
    let document = ChopDocument {
        version: CHOPS_FORMAT_VERSION,
        chops: store.iter().collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Parses a chop document without touching any store.
pub fn parse(text: &str) -> Result<HashMap<PadId, Chop>, CodecError> {
    // Check the version first so a newer document isn't reported as malformed.
    let probe: VersionProbe = serde_json::from_str(text)?;
    if probe.version != CHOPS_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(probe.version));
    }

    let document: ChopDocument = serde_json::from_str(text)?;
    Ok(document.chops.into_iter().collect())
}

/// Replaces the store's contents with the document's chops. `duration` gives
/// the decoded length of a pad's sample where known; chops running past it
/// reject the document. On error the store is left unchanged.
pub fn import<F>(store: &mut ChopStore, text: &str, duration: F) -> Result<usize, CodecError>
where
    F: Fn(PadId) -> Option<f64>,
{
    let parsed = parse(text).and_then(|chops| {
        for (pad, chop) in &chops {
            if let Some(duration) = duration(*pad) {
                if !chop.fits(duration) {
                    return Err(CodecError::OutOfRange {
                        pad: *pad,
                        end: chop.end(),
                        duration,
                    });
                }
            }
        }
        Ok(chops)
    });

    match parsed {
        Ok(chops) => {
            let count = chops.len();
            store.replace_all(chops);
            info!(chops = count, "Imported chops");
            Ok(count)
        }
        Err(e) => {
            warn!(err = %e, "Ignoring chop document");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(key: char) -> PadId {
        PadId::from_key(key).unwrap()
    }

    #[test]
    fn test_export_format() {
        let mut store = ChopStore::new();
        store.set(pad('t'), Chop::new(1.0, 2.5).unwrap());
        store.set(pad('4'), Chop::new(0.0, 0.25).unwrap());

        let value: serde_json::Value = serde_json::from_str(&export(&store).unwrap()).unwrap();
        assert_eq!(1, value["version"]);
        assert_eq!(1.0, value["chops"]["t"]["start"]);
        assert_eq!(2.5, value["chops"]["t"]["end"]);
        assert_eq!(0.25, value["chops"]["4"]["end"]);
        assert_eq!(2, value["chops"].as_object().unwrap().len());
    }

    #[test]
    fn test_import_replaces_store() {
        let mut store = ChopStore::new();
        store.set(pad('m'), Chop::new(0.0, 1.0).unwrap());

        let count = import(
            &mut store,
            r#"{"version": 1, "chops": {"r": {"start": 0.5, "end": 0.75}}}"#,
            |_| None,
        )
        .unwrap();

        assert_eq!(1, count);
        assert_eq!(None, store.get(pad('m')));
        assert_eq!(Some(Chop::new(0.5, 0.75).unwrap()), store.get(pad('r')));
    }

    #[test]
    fn test_import_rejects_whole_document() {
        let mut store = ChopStore::new();
        store.set(pad('m'), Chop::new(0.0, 1.0).unwrap());
        let before = store.clone();

        for text in [
            "not json",
            r#"{"chops": {}}"#,
            r#"{"version": 2, "chops": {}}"#,
            r#"{"version": 1}"#,
            r#"{"version": 1, "chops": {"z": {"start": 0.0, "end": 1.0}}}"#,
            r#"{"version": 1, "chops": {"r": {"start": 0.0, "end": 1.0}, "t": {"start": 2.0, "end": 1.0}}}"#,
        ] {
            assert!(import(&mut store, text, |_| None).is_err(), "accepted {}", text);
            assert_eq!(before, store);
        }
    }

    #[test]
    fn test_import_checks_known_durations() {
        let mut store = ChopStore::new();
        let text = r#"{"version": 1, "chops": {"r": {"start": 0.5, "end": 3.0}}}"#;

        let result = import(&mut store, text, |p| (p == pad('r')).then_some(2.0));
        assert!(matches!(result, Err(CodecError::OutOfRange { .. })));
        assert!(store.is_empty());

        // Unknown durations are not checked.
        assert_eq!(1, import(&mut store, text, |_| None).unwrap());
    }

    #[test]
    fn test_unsupported_version_reported() {
        assert!(matches!(
            parse(r#"{"version": 7, "chops": "anything"}"#),
            Err(CodecError::UnsupportedVersion(7))
        ));
    }
}
