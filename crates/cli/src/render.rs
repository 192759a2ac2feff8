//! Terminal rendering of evidence tables.
//!
//! Tables arrive from `matchlens-evidence` as rows of styled spans; this
//! module lays them out with Unicode display widths and maps each span's
//! tone to a crossterm colour for the active scheme.

use crossterm::style::{Attribute, Color, ContentStyle};

use matchlens_config::ColorScheme;
use matchlens_evidence::{Align, Cell, Span, Table, Tone};

use crate::util;

/// Widest a column is allowed to grow before its lines are truncated.
const MAX_COLUMN_WIDTH: usize = 80;

#[derive(Debug, Clone)]
pub struct Renderer {
    scheme: ColorScheme,
    color: bool,
}

impl Renderer {
    pub fn new(scheme: ColorScheme, color: bool) -> Self {
        Self { scheme, color }
    }

    /// No escape codes, for pipes and tests.
    pub fn plain() -> Self {
        Self::new(ColorScheme::default(), false)
    }

    pub fn scheme(&self) -> ColorScheme {
        self.scheme
    }

    pub fn set_scheme(&mut self, scheme: ColorScheme) {
        self.scheme = scheme;
    }

    fn tone_color(&self, tone: Tone) -> Option<Color> {
        match (self.scheme, tone) {
            (_, Tone::Plain) => None,
            (ColorScheme::Dark, Tone::Good) => Some(Color::Green),
            (ColorScheme::Dark, Tone::Bad) => Some(Color::Red),
            (ColorScheme::Dark, Tone::Caution) => Some(Color::Yellow),
            (ColorScheme::Dark, Tone::Highlight1) => Some(Color::Cyan),
            (ColorScheme::Dark, Tone::Highlight2) => Some(Color::Magenta),
            (ColorScheme::Light, Tone::Good) => Some(Color::DarkGreen),
            (ColorScheme::Light, Tone::Bad) => Some(Color::DarkRed),
            (ColorScheme::Light, Tone::Caution) => Some(Color::DarkYellow),
            (ColorScheme::Light, Tone::Highlight1) => Some(Color::DarkBlue),
            (ColorScheme::Light, Tone::Highlight2) => Some(Color::DarkMagenta),
        }
    }

    pub fn paint(&self, span: &Span) -> String {
        if !self.color {
            return span.text.clone();
        }
        let mut style = ContentStyle::new();
        style.foreground_color = self.tone_color(span.tone);
        if span.dim {
            style.attributes.set(Attribute::Dim);
        }
        if span.italic {
            style.attributes.set(Attribute::Italic);
        }
        if span.bold {
            style.attributes.set(Attribute::Bold);
        }
        style.apply(span.text.as_str()).to_string()
    }

    pub fn paint_text(&self, text: &str, tone: Tone) -> String {
        self.paint(&Span::toned(text, tone))
    }

    /// One line of a cell, padded to `width` columns.
    fn render_line(&self, spans: &[Span], width: usize, align: Align) -> String {
        let plain: String = spans.iter().map(|s| s.text.as_str()).collect();
        let text_width = util::display_width(&plain);

        let (painted, text_width) = if text_width > width {
            let (cut, cut_width) = util::clip(&plain, width);
            let span = match spans.first() {
                Some(first) => Span { text: cut, ..first.clone() },
                None => Span::plain(cut),
            };
            (self.paint(&span), cut_width)
        } else {
            (spans.iter().map(|s| self.paint(s)).collect(), text_width)
        };

        let (before, after) = util::padding(text_width, width, align);
        format!("{}{}{}", " ".repeat(before), painted, " ".repeat(after))
    }

    pub fn render_table(&self, table: &Table) -> String {
        let widths = column_widths(table);
        let rule = rule_line(&widths);
        let mut out = String::new();

        if !table.title.is_empty() {
            out.push_str(&self.paint(&Span::toned(table.title.as_str(), Tone::Highlight1).bold()));
            out.push('\n');
        }

        out.push_str(&rule);
        out.push('\n');
        let header: Vec<String> = table
            .columns
            .iter()
            .zip(&widths)
            .map(|(column, width)| {
                self.render_line(&[Span::plain(column.name.as_str()).bold()], *width, column.align)
            })
            .collect();
        out.push_str(&format!("| {} |\n", header.join(" | ")));
        out.push_str(&rule);
        out.push('\n');

        for row in &table.rows {
            let height = row.iter().map(|c| c.lines.len()).max().unwrap_or(0).max(1);
            for line in 0..height {
                let parts: Vec<String> = table
                    .columns
                    .iter()
                    .zip(&widths)
                    .enumerate()
                    .map(|(i, (column, width))| {
                        let spans = row
                            .get(i)
                            .and_then(|cell| cell.lines.get(line))
                            .map(Vec::as_slice)
                            .unwrap_or(&[]);
                        self.render_line(spans, *width, column.align)
                    })
                    .collect();
                out.push_str(&format!("| {} |\n", parts.join(" | ")));
            }
            out.push_str(&rule);
            out.push('\n');
        }
        out
    }
}

fn cell_width(cell: &Cell) -> usize {
    cell.plain_lines().iter().map(|l| util::display_width(l)).max().unwrap_or(0)
}

fn column_widths(table: &Table) -> Vec<usize> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let widest = table
                .rows
                .iter()
                .filter_map(|row| row.get(i))
                .map(cell_width)
                .max()
                .unwrap_or(0);
            widest.max(util::display_width(&column.name)).min(MAX_COLUMN_WIDTH)
        })
        .collect()
}

fn rule_line(widths: &[usize]) -> String {
    let segments: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    format!("+{}+", segments.join("+"))
}
