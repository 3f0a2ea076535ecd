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
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::{crate_version, Parser, Subcommand};
use padchop::config::Instrument as InstrumentConfig;
use padchop::controller::keyboard;
use padchop::events::{NowPlayingTracker, VoiceEvent};
use padchop::instrument::Instrument;
use padchop::pads::{KeyMap, PadId, NUM_PADS};
use padchop::samples::SampleRef;
use padchop::{audio, chops};
use tracing::{debug, info, span, Level};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sixteen pad sample trigger instrument."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the instrument, played from the keyboard.
    Start {
        /// The path to the instrument config.
        config_path: String,
    },
    /// Prints the pad layout, key bindings and sample assignments.
    Pads {
        /// The path to the instrument config.
        config_path: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Verifies an exported chop file.
    CheckChops {
        /// The path to the chop file.
        path: String,
    },
}

/// Logs voice lifecycles as they arrive. Runs until the instrument is gone.
fn watch_voices(events_rx: crossbeam_channel::Receiver<VoiceEvent>) {
    let span = span!(Level::INFO, "voices");
    let _enter = span.enter();

    let mut tracker = NowPlayingTracker::new();
    for event in events_rx.iter() {
        tracker.apply(&event);
        match event {
            VoiceEvent::Started {
                id,
                pad,
                sample,
                duration,
            } => info!(
                voice = %id,
                pad = %pad,
                sample = %sample,
                duration,
                playing = tracker.len(),
                "Voice started."
            ),
            VoiceEvent::Ended { id } => {
                debug!(voice = %id, playing = tracker.len(), "Voice ended.")
            }
            VoiceEvent::PreviewEnded { id } => debug!(voice = %id, "Preview ended."),
            VoiceEvent::Progress { .. } => {}
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            let config = InstrumentConfig::deserialize(&PathBuf::from(&config_path))?;
            let settings = config.settings()?;
            let device = audio::get_device(config.audio())?;
            let (events_tx, events_rx) = crossbeam_channel::unbounded();

            let mut instrument = Instrument::new(device, settings, events_tx);
            for (pad, path) in config.assignments(&mut rand::thread_rng())? {
                instrument.bind_sample(pad, SampleRef::from_file(path));
            }

            thread::spawn(move || watch_voices(events_rx));
            instrument
                .run(Arc::new(keyboard::Driver::new()))
                .await?;
        }
        Commands::Pads { config_path } => {
            let config = InstrumentConfig::deserialize(&PathBuf::from(&config_path))?;
            let keys = KeyMap::new(&config.key_bindings()?);
            let assignments: HashMap<PadId, PathBuf> = config
                .assignments(&mut rand::thread_rng())?
                .into_iter()
                .collect();

            println!("Layout:");
            let pads: Vec<PadId> = PadId::all().collect();
            for row in pads.chunks(NUM_PADS / 4) {
                let keys: Vec<String> = row.iter().map(|pad| pad.to_string()).collect();
                println!("  {}", keys.join(" "));
            }

            println!("\nPads (assigned: {}):", assignments.len());
            for pad in pads {
                let bindings: String = keys.keys_for(pad).into_iter().collect();
                let sample = match assignments.get(&pad) {
                    Some(path) => format!(
                        "{} ({})",
                        SampleRef::from_file(path.clone()).label(),
                        path.display()
                    ),
                    None => "(empty)".to_string(),
                };
                let (row, column) = pad.position();
                println!(
                    "- {} (row {}, column {}) [keys: {}] {}",
                    pad,
                    row + 1,
                    column + 1,
                    bindings,
                    sample
                );
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::CheckChops { path } => {
            let chops: BTreeMap<PadId, chops::Chop> =
                chops::codec::parse(&std::fs::read_to_string(&path)?)?
                    .into_iter()
                    .collect();

            println!("Chops (count: {}):", chops.len());
            for (pad, chop) in chops {
                println!(
                    "- {}: {:.3}s to {:.3}s ({:.3}s)",
                    pad,
                    chop.start(),
                    chop.end(),
                    chop.width()
                );
            }
        }
    }

    Ok(())
}
