//! Sample browsing: show one sample at a time and act on replies until quit.

use std::path::PathBuf;

use matchlens_evidence::audit::{SampleCursor, Step};
use matchlens_evidence::Tone;

use crate::command::{parse_reply, Reply};
use crate::prompt::Console;
use crate::session::CommandError;

pub const AUDIT_PROMPT: &str = "Select (P)revious, (N)ext, (W)hy, (E)xport, (Q)uit ... ";
pub const SAMPLE_PROMPT: &str = "Select (P)revious, (N)ext, (D)etail, (W)hy, (E)xport, (Q)uit ... ";

/// A reply that acts on the current sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Detail,
    Why,
    Export(Option<PathBuf>),
}

/// Position within the browsed list, 1-based for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub number: usize,
    pub of: usize,
}

impl Position {
    pub fn label(&self) -> String {
        format!("sample {} of {}", self.number, self.of)
    }
}

/// Prints a failed step and keeps browsing.
fn report(console: &mut Console<'_>, err: &CommandError) -> Result<(), CommandError> {
    let tone = if err.is_stale() { Tone::Caution } else { Tone::Bad };
    console.message(&err.to_string(), tone)?;
    Ok(())
}

/// Runs until a quit reply or end of input. An empty list shows nothing.
///
/// `show` renders the current sample; `act` handles detail, why and export.
/// `allow_detail` false turns a detail reply into a redisplay.
pub fn browse<T>(
    items: Vec<T>,
    console: &mut Console<'_>,
    prompt: &str,
    allow_detail: bool,
    mut show: impl FnMut(&T, Position, &mut Console<'_>) -> Result<(), CommandError>,
    mut act: impl FnMut(&T, Action, &mut Console<'_>) -> Result<(), CommandError>,
) -> Result<(), CommandError> {
    let Some(mut cursor) = SampleCursor::new(items) else {
        return Ok(());
    };

    let mut redisplay = true;
    loop {
        if redisplay {
            let position = Position { number: cursor.position() + 1, of: cursor.len() };
            if let Err(e) = show(cursor.current(), position, console) {
                report(console, &e)?;
            }
        }
        redisplay = false;

        let Some(line) = console.ask(prompt)? else {
            return Ok(());
        };
        let action = match parse_reply(&line) {
            Reply::Quit => return Ok(()),
            Reply::Again => {
                redisplay = true;
                continue;
            }
            Reply::Previous => {
                match cursor.prev() {
                    Step::Moved => redisplay = true,
                    _ => console.message("no prior records!", Tone::Bad)?,
                }
                continue;
            }
            Reply::Next => {
                match cursor.next() {
                    Step::Moved => redisplay = true,
                    _ => console.message("no more records!", Tone::Bad)?,
                }
                continue;
            }
            Reply::Detail if !allow_detail => {
                redisplay = true;
                continue;
            }
            Reply::Detail => Action::Detail,
            Reply::Why => Action::Why,
            Reply::Export(file) => Action::Export(file),
        };
        if let Err(e) = act(cursor.current(), action, console) {
            report(console, &e)?;
        }
    }
}
