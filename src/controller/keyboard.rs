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
use tracing::{info, span, warn, Level};

use super::Event;
use crate::editor::EditorKey;
use crate::pads::PadId;

const EDIT: &str = "edit";
const DRAG: &str = "drag";
const CLICK: &str = "click";
const ZOOM: &str = "zoom";
const PAN: &str = "pan";
const DROP: &str = "drop";
const EXPORT: &str = "export";
const IMPORT: &str = "import";
const STOP: &str = "stop";
const QUIT: &str = "quit";

/// A controller that plays the instrument from typed lines on stdin. A line
/// holding a single pad key plays that pad.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Parses one line of input.
    fn parse(input: &str) -> Option<Event> {
        let mut words = input.split_whitespace();
        let command = words.next()?.to_lowercase();
        let args: Vec<&str> = words.collect();

        let mut chars = command.chars();
        if let (Some(key), None, true) = (chars.next(), chars.next(), args.is_empty()) {
            return Some(Event::Key(key));
        }

        if let Ok(key) = command.parse::<EditorKey>() {
            return args.is_empty().then_some(Event::EditorKey(key));
        }

        let number = |index: usize| args.get(index).and_then(|arg| arg.parse::<f64>().ok());
        match (command.as_str(), args.len()) {
            (EDIT, 1) => args[0].parse::<PadId>().ok().map(Event::Edit),
            (DRAG, 2) => Some(Event::Drag {
                from: number(0)?,
                to: number(1)?,
            }),
            (CLICK, 1) => {
                let at = number(0)?;
                Some(Event::Drag { from: at, to: at })
            }
            (ZOOM, 2) => Some(Event::Zoom {
                factor: number(0)?,
                anchor: number(1)?,
            }),
            (PAN, 1) => Some(Event::Pan { delta: number(0)? }),
            (DROP, n) if n >= 2 => Some(Event::Drop {
                start: args[0].parse::<PadId>().ok()?,
                paths: args[1..].iter().map(PathBuf::from).collect(),
            }),
            (EXPORT, 1) => Some(Event::Export(PathBuf::from(args[0]))),
            (IMPORT, 1) => Some(Event::Import(PathBuf::from(args[0]))),
            (STOP, 0) => Some(Event::Stop),
            (QUIT, 0) => Some(Event::Quit),
            _ => None,
        }
    }

    /// Reads and forwards one command. Returns false once input is exhausted.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command (<pad key>, {} <pad>, {} <from> <to>, {} <x>, {} <factor> <anchor>, {} <delta>, preview, apply, exit, {} <pad> <files..>, {} <file>, {} <file>, {}, {}): ",
            EDIT, DRAG, CLICK, ZOOM, PAN, DROP, EXPORT, IMPORT, STOP, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        match Self::parse(input.trim()) {
            Some(event) => {
                let quit = event == Event::Quit;
                events_tx
                    .blocking_send(event)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(!quit)
            }
            None => {
                if !input.trim().is_empty() {
                    warn!(input = input.trim(), "Unrecognized input");
                }
                Ok(true)
            }
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufWriter};

    use tokio::sync::mpsc;

    use super::*;

    fn get_event(event: &str) -> Result<Option<Event>, io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = io::Cursor::new(format!("{}\n", event).into_bytes());

        let writer_bytes: Vec<u8> = vec![0; 255];
        let writer = BufWriter::new(writer_bytes);
        let keep_reading = Driver::monitor_io(&sender, reader, writer)?;
        assert_eq!(event != "quit", keep_reading);

        // Force the sender to close.
        drop(sender);
        Ok(receiver.blocking_recv())
    }

    fn pad(key: char) -> PadId {
        PadId::from_key(key).unwrap()
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(Event::Key('r'), get_event("r")?.unwrap());
        assert_eq!(Event::Key('a'), get_event("A")?.unwrap());
        assert_eq!(Event::Edit(pad('t')), get_event("edit t")?.unwrap());
        assert_eq!(
            Event::Drag { from: 0.25, to: 0.5 },
            get_event("drag 0.25 0.5")?.unwrap()
        );
        assert_eq!(
            Event::Drag { from: 0.3, to: 0.3 },
            get_event("click 0.3")?.unwrap()
        );
        assert_eq!(
            Event::Zoom {
                factor: 2.0,
                anchor: 0.5
            },
            get_event("zoom 2 0.5")?.unwrap()
        );
        assert_eq!(Event::Pan { delta: -0.1 }, get_event("pan -0.1")?.unwrap());
        assert_eq!(
            Event::EditorKey(EditorKey::TogglePreview),
            get_event("preview")?.unwrap()
        );
        assert_eq!(
            Event::EditorKey(EditorKey::Apply),
            get_event("apply")?.unwrap()
        );
        assert_eq!(
            Event::EditorKey(EditorKey::Exit),
            get_event("escape")?.unwrap()
        );
        assert_eq!(
            Event::Drop {
                start: pad('6'),
                paths: vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")],
            },
            get_event("drop 6 a.wav b.wav")?.unwrap()
        );
        assert_eq!(
            Event::Export(PathBuf::from("chops.json")),
            get_event("export chops.json")?.unwrap()
        );
        assert_eq!(
            Event::Import(PathBuf::from("chops.json")),
            get_event("import chops.json")?.unwrap()
        );
        assert_eq!(Event::Stop, get_event("stop")?.unwrap());
        assert_eq!(Event::Quit, get_event("quit")?.unwrap());
        Ok(())
    }

    #[test]
    fn test_unrecognized_input() -> Result<(), io::Error> {
        assert_eq!(None, get_event("unrecognized")?);
        assert_eq!(None, get_event("edit z")?);
        assert_eq!(None, get_event("drag 0.1")?);
        assert_eq!(None, get_event("zoom fast 0.5")?);
        assert_eq!(None, get_event("apply now")?);
        assert_eq!(None, get_event("")?);
        Ok(())
    }

    #[test]
    fn test_end_of_input_quits() -> Result<(), io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);
        let reader = io::Cursor::new(Vec::<u8>::new());
        assert!(!Driver::monitor_io(&sender, reader, io::sink())?);
        drop(sender);
        assert_eq!(Some(Event::Quit), receiver.blocking_recv());
        Ok(())
    }
}
