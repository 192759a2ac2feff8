//! Console input and output.

use std::io::{self, BufRead, Write};

#[cfg(test)]
use std::collections::VecDeque;

use matchlens_evidence::{Table, Tone};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::render::Renderer;

/// Where command lines and browse replies come from.
pub trait LineSource {
    /// `Ok(None)` at end of input.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Line editing with history when stdin is a terminal, plain lines otherwise.
pub fn line_source() -> Box<dyn LineSource> {
    if atty::is(atty::Stream::Stdin) {
        match DefaultEditor::new() {
            Ok(editor) => return Box::new(EditorLines { editor }),
            Err(e) => log::warn!("line editing unavailable: {}", e),
        }
    }
    Box::new(StdinLines)
}

/// Interactive input through rustyline.
pub struct EditorLines {
    editor: DefaultEditor,
}

impl LineSource for EditorLines {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let line = readline_result(self.editor.readline(prompt))?;
        if let Some(entry) = line.as_deref().and_then(history_entry) {
            if let Err(e) = self.editor.add_history_entry(entry) {
                log::warn!("history: {}", e);
            }
        }
        Ok(line)
    }
}

/// Ctrl-D and Ctrl-C both end the current read.
fn readline_result(result: Result<String, ReadlineError>) -> io::Result<Option<String>> {
    match result {
        Ok(line) => Ok(Some(line)),
        Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => Ok(None),
        Err(ReadlineError::Io(e)) => Err(e),
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
    }
}

fn history_entry(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Piped standard input, read without a prompt.
pub struct StdinLines;

impl LineSource for StdinLines {
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        let mut buf = String::new();
        if io::stdin().lock().read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Replies fed from a list, recording every prompt asked.
#[cfg(test)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
    pub prompts: Vec<String>,
}

#[cfg(test)]
impl ScriptedLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { lines: lines.into_iter().map(Into::into).collect(), prompts: Vec::new() }
    }
}

#[cfg(test)]
impl LineSource for ScriptedLines {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }
}

/// Output sink, reply source and renderer for one session.
pub struct Console<'a> {
    out: &'a mut dyn Write,
    input: &'a mut dyn LineSource,
    pub renderer: Renderer,
}

impl<'a> Console<'a> {
    pub fn new(out: &'a mut dyn Write, input: &'a mut dyn LineSource, renderer: Renderer) -> Self {
        Self { out, input, renderer }
    }

    pub fn table(&mut self, table: &Table) -> io::Result<()> {
        let text = self.renderer.render_table(table);
        writeln!(self.out)?;
        write!(self.out, "{}", text)
    }

    /// A message set off by blank lines.
    pub fn message(&mut self, text: &str, tone: Tone) -> io::Result<()> {
        let painted = self.renderer.paint_text(text, tone);
        writeln!(self.out)?;
        writeln!(self.out, "{}", painted)?;
        writeln!(self.out)
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)
    }

    pub fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.out.flush()?;
        self.input.read_line(prompt)
    }
}
