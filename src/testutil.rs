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
use std::error::Error;
use std::f32::consts::PI;
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Writes a 16 bit sine tone of the given length.
fn write_tone<W: Write + Seek>(
    writer: W,
    seconds: f64,
    sample_rate: u32,
    channels: u16,
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        writer,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    let frames = (seconds * sample_rate as f64).round() as usize;
    for frame in 0..frames {
        let t = frame as f32 / sample_rate as f32;
        let value = ((2.0 * PI * 220.0 * t).sin() * 0.5 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// An in-memory WAV blob, as a dropped file would arrive.
pub fn wav_bytes(seconds: f64, sample_rate: u32, channels: u16) -> Arc<[u8]> {
    let mut cursor = Cursor::new(Vec::new());
    write_tone(&mut cursor, seconds, sample_rate, channels).expect("unable to write wav");
    cursor.into_inner().into()
}

/// Writes a WAV file to disk.
pub fn write_wav(
    path: &Path,
    seconds: f64,
    sample_rate: u32,
    channels: u16,
) -> Result<(), Box<dyn Error>> {
    write_tone(std::fs::File::create(path)?, seconds, sample_rate, channels)
}
