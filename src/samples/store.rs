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

//! Pad to sample bindings and the decoded waveform cache.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::loader::{DecodedSample, LoadError};
use crate::pads::PadId;

/// File extensions accepted when samples are dropped onto the pads.
pub const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "ogg", "m4a", "aac", "flac"];

static NEXT_SAMPLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one sample reference. A new id is issued every time a pad is
/// given a sample, even if it is the same file again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleId(u64);

impl SampleId {
    fn next() -> SampleId {
        SampleId(NEXT_SAMPLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample-{}", self.0)
    }
}

/// Where a sample's bytes come from.
#[derive(Clone)]
pub enum SampleSource {
    File(PathBuf),
    Bytes(Arc<[u8]>),
}

impl fmt::Debug for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleSource::File(path) => f.debug_tuple("File").field(path).finish(),
            SampleSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

/// A sample bound (or about to be bound) to a pad.
#[derive(Clone, Debug)]
pub struct SampleRef {
    id: SampleId,
    source: SampleSource,
    name: String,
}

impl SampleRef {
    pub fn from_file(path: PathBuf) -> SampleRef {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        SampleRef {
            id: SampleId::next(),
            source: SampleSource::File(path),
            name,
        }
    }

    pub fn from_bytes(name: &str, bytes: impl Into<Arc<[u8]>>) -> SampleRef {
        SampleRef {
            id: SampleId::next(),
            source: SampleSource::Bytes(bytes.into()),
            name: name.to_string(),
        }
    }

    pub fn id(&self) -> SampleId {
        self.id
    }

    pub fn source(&self) -> &SampleSource {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased file extension of the sample name.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Display label: the name without its extension, upper cased.
    pub fn label(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_uppercase())
            .unwrap_or_else(|| self.name.to_uppercase())
    }
}

/// True if the path has one of the accepted audio extensions.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

/// Keeps only audio files and orders them by file name.
pub fn audio_files(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.retain(|path| is_audio_file(path));
    paths.sort_by_key(|path| path.file_name().map(|name| name.to_os_string()));
    paths
}

/// Decode state of one sample reference.
#[derive(Clone, Debug)]
pub enum WaveformState {
    Pending,
    Ready(Arc<DecodedSample>),
    Failed,
}

/// Current sample of each pad plus the decoded buffers for those samples.
#[derive(Default)]
pub struct SampleStore {
    pads: HashMap<PadId, SampleRef>,
    waveforms: HashMap<SampleId, WaveformState>,
}

impl SampleStore {
    pub fn new() -> SampleStore {
        SampleStore::default()
    }

    /// Binds a sample to a pad, returning the sample it replaced. The
    /// replaced sample's decoded buffer is dropped.
    pub fn bind(&mut self, pad: PadId, sample: SampleRef) -> Option<SampleRef> {
        debug!(pad = %pad, sample = sample.name(), "Binding sample");
        let previous = self.pads.insert(pad, sample);
        if let Some(previous) = previous.as_ref() {
            self.waveforms.remove(&previous.id());
        }
        previous
    }

    pub fn get(&self, pad: PadId) -> Option<&SampleRef> {
        self.pads.get(&pad)
    }

    /// Finds the pad and reference currently holding the given sample id.
    pub fn find(&self, id: SampleId) -> Option<(PadId, &SampleRef)> {
        self.pads
            .iter()
            .find(|(_, sample)| sample.id() == id)
            .map(|(pad, sample)| (*pad, sample))
    }

    /// Marks a sample as being decoded.
    pub fn begin_decode(&mut self, id: SampleId) {
        self.waveforms.insert(id, WaveformState::Pending);
    }

    /// Records a decode result. Results for samples no longer bound to any
    /// pad are stale and discarded; returns the cached buffer if it was kept.
    pub fn finish_decode(
        &mut self,
        id: SampleId,
        result: Result<DecodedSample, LoadError>,
    ) -> Option<Result<Arc<DecodedSample>, LoadError>> {
        if self.find(id).is_none() {
            debug!(sample = %id, "Discarding stale decode result");
            return None;
        }

        match result {
            Ok(decoded) => {
                let decoded = Arc::new(decoded);
                self.waveforms
                    .insert(id, WaveformState::Ready(decoded.clone()));
                Some(Ok(decoded))
            }
            Err(e) => {
                warn!(sample = %id, err = %e, "Unable to decode sample");
                self.waveforms.insert(id, WaveformState::Failed);
                Some(Err(e))
            }
        }
    }

    pub fn waveform(&self, id: SampleId) -> Option<&WaveformState> {
        self.waveforms.get(&id)
    }

    pub fn decoded(&self, id: SampleId) -> Option<Arc<DecodedSample>> {
        match self.waveforms.get(&id) {
            Some(WaveformState::Ready(decoded)) => Some(decoded.clone()),
            _ => None,
        }
    }

    /// Duration of the pad's sample, if it has been decoded.
    pub fn duration(&self, pad: PadId) -> Option<f64> {
        self.get(pad)
            .and_then(|sample| self.decoded(sample.id()))
            .map(|decoded| decoded.duration())
    }

    /// Bound pads in grid order.
    pub fn iter(&self) -> impl Iterator<Item = (PadId, &SampleRef)> {
        PadId::all().filter_map(|pad| self.pads.get(&pad).map(|sample| (pad, sample)))
    }
}

impl fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleStore")
            .field("bound_pads", &self.pads.len())
            .field("waveforms", &self.waveforms.len())
            .finish()
    }
}
