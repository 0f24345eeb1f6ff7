//! Assembly rendering: syntax tinting, cycle gutter, severity shading.

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use super::{App, Status};

const TEXT: Color = Color::Rgb(0x19, 0x1a, 0x1a);
const LABEL: Color = Color::Rgb(0x00, 0x79, 0x6b);
const MNEMONIC: Color = Color::Rgb(0x00, 0x7b, 0x9a);
const REGISTER: Color = Color::Rgb(0xaf, 0x5f, 0x00);
const NUMBER: Color = Color::Rgb(0x66, 0x66, 0x66);
const COMMENT: Color = Color::Rgb(0x88, 0x88, 0x88);
const HEAT_LOW: Color = Color::Rgb(0xd1, 0xe7, 0xdd);
const HEAT_MED: Color = Color::Rgb(0xff, 0xf3, 0xcd);
const HEAT_HIGH: Color = Color::Rgb(0xf8, 0xd7, 0xda);

const GUTTER_WIDTH: usize = 7;

pub(super) fn draw(frame: &mut Frame<'_>, app: &App) {
    let [title_area, body_area, peek_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_title(frame, title_area, app);
    draw_assembly(frame, body_area, app);
    draw_peek(frame, peek_area, app);
    draw_status(frame, status_area, app);
}

fn draw_title(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let title = Line::from(vec![
        Span::styled(" asmlens ", Style::new().add_modifier(Modifier::BOLD)),
        Span::raw("— "),
        Span::styled(&app.source_name, Style::new().add_modifier(Modifier::BOLD)),
    ]);
    frame.render_widget(Paragraph::new(title).style(Style::new().fg(TEXT).bg(HEAT_LOW)), area);
}

fn draw_assembly(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let Some(snapshot) = app.snapshot.as_ref() else {
        frame.render_widget(Paragraph::new("waiting for the first compile…"), area);
        return;
    };

    let width = area.width as usize;
    let mut rows = Vec::with_capacity(area.height as usize);
    for (index, raw) in snapshot
        .assembly
        .lines()
        .enumerate()
        .skip(app.scroll)
        .take(area.height as usize)
    {
        let cycles = snapshot.cycles.get(&(index + 1)).copied();
        let mut line = highlight_line(raw, heat_style(cycles));
        append_gutter(&mut line, cycles, width);
        if index == app.cursor {
            let reversed = line.style.add_modifier(Modifier::REVERSED);
            line = line.style(reversed);
        }
        rows.push(line);
    }
    frame.render_widget(Paragraph::new(rows), area);
}

fn draw_peek(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let Some(snapshot) = app.snapshot.as_ref() else {
        frame.render_widget(Paragraph::new(""), area);
        return;
    };

    let line = if app.status == Status::Error {
        let first_error = snapshot
            .diagnostics
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("compilation failed");
        Line::from(Span::styled(
            format!(" {first_error}"),
            Style::new().fg(Color::Red).add_modifier(Modifier::BOLD),
        ))
    } else {
        match peeked_source_line(app, snapshot) {
            Some((number, text)) => Line::from(vec![
                Span::styled(format!(" src:{number} "), Style::new().fg(LABEL)),
                Span::raw(text.to_string()),
            ]),
            None => Line::from(Span::styled(
                " src:?",
                Style::new().fg(COMMENT),
            )),
        }
    };
    frame.render_widget(Paragraph::new(line), area);
}

/// Source line for the cursor: exact attribution if present, otherwise the
/// nearest attributed line above it (labels and separators carry none).
fn peeked_source_line<'a>(
    app: &App,
    snapshot: &'a crate::engine::Snapshot,
) -> Option<(u32, &'a str)> {
    let number = (0..=app.cursor)
        .rev()
        .find_map(|index| snapshot.source_line_for(index))?;
    let text = snapshot
        .source_code
        .lines()
        .nth(number.saturating_sub(1) as usize)?;
    Some((number, text.trim_end()))
}

fn draw_status(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let status_style = match app.status {
        Status::Error => Style::new().fg(Color::Red).add_modifier(Modifier::BOLD),
        _ => Style::new().fg(LABEL),
    };
    let sequence = app
        .snapshot
        .as_ref()
        .map_or(0, |snapshot| snapshot.sequence);
    let line = Line::from(vec![
        Span::styled(format!(" {} ", app.source_name), Style::new().add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
        Span::styled(app.status.label(), status_style),
        Span::raw(format!(" │ run #{sequence} │ ")),
        Span::styled("q", Style::new().add_modifier(Modifier::BOLD)),
        Span::raw(" quit · "),
        Span::styled("r", Style::new().add_modifier(Modifier::BOLD)),
        Span::raw(" recompile"),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// Heatmap background for a cycle count, as pale severity shading.
fn heat_style(cycles: Option<u32>) -> Style {
    match cycles {
        None => Style::new(),
        Some(c) if c <= 1 => Style::new().fg(TEXT).bg(HEAT_LOW),
        Some(c) if c <= 4 => Style::new().fg(TEXT).bg(HEAT_MED),
        Some(_) => Style::new().fg(TEXT).bg(HEAT_HIGH),
    }
}

/// Tint one assembly line. Label lines (no `::`, ending in `:`) are teal;
/// comments gray; otherwise the mnemonic, registers, and immediates each
/// get their own color.
fn highlight_line(raw: &str, base: Style) -> Line<'static> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return Line::from(Span::styled(
            raw.to_string(),
            base.fg(COMMENT).add_modifier(Modifier::ITALIC),
        ))
        .style(base);
    }
    if trimmed.ends_with(':') && !raw.contains("::") {
        return Line::from(Span::styled(
            raw.to_string(),
            base.fg(LABEL).add_modifier(Modifier::BOLD),
        ))
        .style(base);
    }

    let mut spans = Vec::new();
    let mut seen_mnemonic = false;
    for token in tokenize(raw) {
        let style = match token_class(token, &mut seen_mnemonic) {
            TokenClass::Mnemonic => base.fg(MNEMONIC).add_modifier(Modifier::BOLD),
            TokenClass::Register => base.fg(REGISTER).add_modifier(Modifier::BOLD),
            TokenClass::Number => base.fg(NUMBER),
            TokenClass::Plain => base,
        };
        spans.push(Span::styled(token.to_string(), style));
    }
    Line::from(spans).style(base)
}

enum TokenClass {
    Mnemonic,
    Register,
    Number,
    Plain,
}

fn token_class(token: &str, seen_mnemonic: &mut bool) -> TokenClass {
    let first = match token.chars().next() {
        Some(c) => c,
        None => return TokenClass::Plain,
    };
    if first.is_whitespace() || (!first.is_ascii_alphanumeric() && !"%$_.".contains(first)) {
        return TokenClass::Plain;
    }
    if first == '%' {
        return TokenClass::Register;
    }
    if first == '$' || first.is_ascii_digit() {
        return TokenClass::Number;
    }
    if !*seen_mnemonic {
        *seen_mnemonic = true;
        return TokenClass::Mnemonic;
    }
    TokenClass::Plain
}

/// Split into alternating word and non-word chunks, keeping everything.
fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        let word = is_token_char(c);
        let next_word = chars.peek().map(|&(_, n)| is_token_char(n));
        if next_word != Some(word) {
            let end = chars.peek().map_or(line.len(), |&(n, _)| n);
            tokens.push(&line[start..end]);
            start = end;
        }
    }
    tokens
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "%$_.".contains(c)
}

/// Pad to the right edge and append the cycle count column.
fn append_gutter(line: &mut Line<'static>, cycles: Option<u32>, width: usize) {
    let used = line.width();
    let padding = width.saturating_sub(used + GUTTER_WIDTH).max(1);
    let base = line.style;
    line.push_span(Span::styled(" ".repeat(padding), base));
    match cycles {
        Some(c) => line.push_span(Span::styled(
            format!("{c:>5}c"),
            base.add_modifier(Modifier::BOLD),
        )),
        None => line.push_span(Span::styled(" ".repeat(6), base)),
    }
}
