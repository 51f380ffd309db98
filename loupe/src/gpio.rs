//! Line-oriented stand-in for the GPIO daemon.
//!
//! One event per line on stdin:
//!
//! ```text
//! rotate mode 3      # encoder now at accumulated position 3
//! press zoom         # button pulled low
//! release zoom       # button released
//! quit
//! ```

use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use loupe_core::{ControlEvent, ControlId, Edge, InputSenders};

/// A parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Forward an event to a control.
    Event(ControlId, ControlEvent),
    /// Ask the preview to close.
    Quit,
}

fn control(word: Option<&str>) -> Result<ControlId> {
    let word = word.ok_or_else(|| anyhow!("missing control name"))?;
    ControlId::ALL
        .into_iter()
        .find(|control| control.name() == word)
        .ok_or_else(|| anyhow!("unknown control {:?}", word))
}

/// Parse one line; `None` for blank lines and comments.
pub fn parse_line(line: &str, at: Instant) -> Result<Option<Command>> {
    let line = line.split('#').next().unwrap_or_default().trim();
    let mut words = line.split_whitespace();

    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb {
        "rotate" => {
            let control = control(words.next())?;
            let position = words
                .next()
                .ok_or_else(|| anyhow!("missing position"))?
                .parse()
                .context("position must be an integer")?;
            Command::Event(control, ControlEvent::Rotate { position })
        }
        "press" => Command::Event(
            control(words.next())?,
            ControlEvent::Edge {
                edge: Edge::Falling,
                at,
            },
        ),
        "release" => Command::Event(
            control(words.next())?,
            ControlEvent::Edge {
                edge: Edge::Rising,
                at,
            },
        ),
        "quit" => Command::Quit,
        other => bail!("unknown command {:?}", other),
    };

    if let Some(extra) = words.next() {
        bail!("unexpected {:?} after {}", extra, verb);
    }
    Ok(Some(command))
}

/// Read stdin on a background thread until EOF or `quit`.
pub fn spawn_stdin(senders: InputSenders, quit: Arc<AtomicBool>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("loupe-gpio".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        break;
                    }
                };

                match parse_line(&line, Instant::now()) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => {
                        info!("quit requested on stdin");
                        quit.store(true, Ordering::Release);
                        return;
                    }
                    Ok(Some(Command::Event(control, event))) => {
                        debug!("{} {:?}", control.name(), event);
                        if !senders.get(control).send(event) {
                            debug!("control threads gone, stopping input");
                            return;
                        }
                    }
                    Err(e) => warn!("ignoring {:?}: {:#}", line, e),
                }
            }
            debug!("stdin closed");
        })
}
