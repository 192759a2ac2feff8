//! Renderer-independent tables: rows of multi-line cells with style tags.

use serde::Serialize;

/// Semantic colour of a span; the renderer maps it to the active scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Plain,
    Good,
    Bad,
    Caution,
    Highlight1,
    Highlight2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub text: String,
    pub tone: Tone,
    pub dim: bool,
    pub italic: bool,
    pub bold: bool,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::toned(text, Tone::Plain)
    }

    pub fn toned(text: impl Into<String>, tone: Tone) -> Self {
        Self { text: text.into(), tone, dim: false, italic: false, bold: false }
    }

    pub fn dim(mut self, dim: bool) -> Self {
        self.dim = dim;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }
}

/// A cell is a list of lines, each line a list of spans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub lines: Vec<Vec<Span>>,
}

impl Cell {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::styled(Span::plain(text))
    }

    pub fn styled(span: Span) -> Self {
        Self { lines: vec![vec![span]] }
    }

    /// One plain line per item.
    pub fn lines<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { lines: items.into_iter().map(|s| vec![Span::plain(s)]).collect() }
    }

    pub fn push_line(&mut self, spans: Vec<Span>) {
        self.lines.push(spans);
    }

    pub fn push_span(&mut self, span: Span) {
        self.push_line(vec![span]);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn plain_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| line.iter().map(|s| s.text.as_str()).collect())
            .collect()
    }

    pub fn plain_text(&self) -> String {
        self.plain_lines().join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub align: Align,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub title: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), columns: Vec::new(), rows: Vec::new() }
    }

    pub fn column(mut self, name: impl Into<String>, align: Align) -> Self {
        self.columns.push(Column { name: name.into(), align });
        self
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// First row whose first cell reads `label`.
    pub fn row(&self, label: &str) -> Option<&[Cell]> {
        self.rows
            .iter()
            .find(|r| r.first().is_some_and(|c| c.plain_text() == label))
            .map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// `1,234` below a million, `1.23m` above.
pub fn fmt_statistic(amount: i64) -> String {
    if amount > 1_000_000 {
        let millions = (amount as f64 / 1_000_000.0 * 100.0).round() / 100.0;
        let text = format!("{millions:.2}");
        let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
        return format!("{}.{}m", group_thousands(whole), frac);
    }
    group_thousands(&amount.to_string())
}

fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{sign}{out}")
}
