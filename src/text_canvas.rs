// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Paginated plain-text canvas.
//!
//! Maps the millimetre geometry of [`Canvas`] onto a character grid: one
//! column per [`TextCanvas::COLUMN_MM`] and one row per default line height.
//! Every page carries the document title centred at the top and a
//! `Page n / {nb}` footer; `{nb}` is replaced by the page count when the
//! document is finished. Pages are separated by form feeds.
//!
//! Fonts and colours are tracked so callers can query them, but plain text
//! has no way to show them. Links are printed as `text (url)`.

use crate::canvas::{Align, Canvas, Color, Font};
use crate::settings::Settings;
use tracing::debug;

/// Placeholder for the total page count.
pub const PAGE_COUNT_ALIAS: &str = "{nb}";

const HEADER_ROWS: usize = 2;
const FOOTER_ROWS: usize = 2;
const PAGE_SEPARATOR: char = '\u{c}';

#[derive(Debug, Clone, Default)]
struct Page {
    rows: Vec<Vec<char>>,
}

impl Page {
    fn put(&mut self, row: usize, col: usize, ch: char) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let line = &mut self.rows[row];
        if line.len() <= col {
            line.resize(col + 1, ' ');
        }
        line[col] = ch;
    }

    fn row_used(&self, row: usize) -> bool {
        self.rows
            .get(row)
            .is_some_and(|line| line.iter().any(|c| !c.is_whitespace()))
    }
}

/// Canvas that renders to a character grid.
#[derive(Debug, Clone)]
pub struct TextCanvas {
    pages: Vec<Page>,
    title: String,
    font: Font,
    text_color: Color,
    fill_color: Color,
    page_width: f32,
    margin: f32,
    x: f32,
    row: usize,
    /// Vertical advance not yet turned into whole rows.
    pending: f32,
    row_height: f32,
    content_rows: usize,
    last_height: f32,
}

impl TextCanvas {
    /// Width of one character column.
    pub const COLUMN_MM: f32 = 2.0;

    /// Creates a canvas on page 1, sized by the page format and orientation
    /// in `settings`.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let (page_width, page_height) = settings.page_size();
        let row_height = settings.line_height_default.max(1.0);
        let margin = settings.margin_left;
        let total_rows = ((page_height - 2.0 * margin) / row_height).floor().max(0.0) as usize;
        let content_rows = total_rows.saturating_sub(HEADER_ROWS + FOOTER_ROWS).max(1);

        Self {
            pages: vec![Page::default()],
            title: String::new(),
            font: Font::new(&settings.font_family, settings.font_size_normal, ""),
            text_color: Color::BLACK,
            fill_color: Color::WHITE,
            page_width,
            margin,
            x: margin,
            row: 0,
            pending: 0.0,
            row_height,
            content_rows,
            last_height: row_height,
        }
    }

    /// Sets the title shown on top of every page.
    #[must_use]
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_owned();
        self
    }

    /// Number of text rows between header and footer.
    #[must_use]
    pub const fn content_rows(&self) -> usize {
        self.content_rows
    }

    /// Renders all pages to a string.
    #[must_use]
    pub fn finish(self) -> String {
        let width = self.columns();
        let total = self.pages.len().to_string();
        let pages: Vec<String> = self
            .pages
            .iter()
            .enumerate()
            .map(|(index, page)| {
                let mut lines = Vec::with_capacity(self.content_rows + HEADER_ROWS + FOOTER_ROWS);
                lines.push(centered(&self.title, width));
                lines.push(String::new());
                for row in 0..self.content_rows {
                    let line: String = page.rows.get(row).map_or_else(String::new, |r| r.iter().collect());
                    lines.push(line.trim_end().to_owned());
                }
                lines.push(String::new());
                lines.push(centered(&format!("Page {} / {PAGE_COUNT_ALIAS}", index + 1), width));
                let mut page = lines.join("\n");
                page.push('\n');
                page.replace(PAGE_COUNT_ALIAS, &total)
            })
            .collect();
        pages.join(&PAGE_SEPARATOR.to_string())
    }

    const fn columns(&self) -> usize {
        column_of(self.page_width)
    }

    const fn right_column(&self) -> usize {
        column_of(self.page_width - self.margin)
    }

    const fn column(&self) -> usize {
        column_of(self.x)
    }

    fn page(&mut self) -> &mut Page {
        if self.pages.is_empty() {
            self.pages.push(Page::default());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn current_row_used(&self) -> bool {
        self.pages.last().is_some_and(|page| page.row_used(self.row))
    }

    fn top(&self) -> f32 {
        self.margin + HEADER_ROWS as f32 * self.row_height
    }

    /// Content row containing `y`, if it is on the page.
    fn row_of(&self, y: f32) -> Option<usize> {
        let row = ((y - self.top()) / self.row_height).floor();
        (row >= 0.0 && (row as usize) < self.content_rows).then_some(row as usize)
    }

    fn advance_rows(&mut self, rows: usize) {
        self.x = self.margin;
        self.row += rows;
        if self.row >= self.content_rows {
            self.add_page();
        }
    }

    fn newline(&mut self) {
        self.pending = 0.0;
        self.advance_rows(1);
    }

    fn put_char(&mut self, ch: char) {
        let (row, col) = (self.row, self.column());
        self.page().put(row, col, ch);
        self.x += Self::COLUMN_MM;
    }
}

const fn column_of(x: f32) -> usize {
    if x <= 0.0 {
        0
    } else {
        (x / TextCanvas::COLUMN_MM + 0.5) as usize
    }
}

fn centered(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let pad = width.saturating_sub(len) / 2;
    format!("{}{text}", " ".repeat(pad))
}

impl Canvas for TextCanvas {
    fn font(&self) -> &Font {
        &self.font
    }

    fn set_font(&mut self, family: &str, size: f32, style: &str) {
        self.font = Font::new(family, size, style);
    }

    fn left_margin(&self) -> f32 {
        self.margin
    }

    fn set_left_margin(&mut self, margin: f32) {
        self.margin = margin;
        if self.x < margin {
            self.x = margin;
        }
    }

    fn x(&self) -> f32 {
        self.x
    }

    fn set_x(&mut self, x: f32) {
        self.x = x;
    }

    fn y(&self) -> f32 {
        self.top() + self.row as f32 * self.row_height
    }

    fn write(&mut self, height: f32, text: &str, link: Option<&str>) {
        self.last_height = height;
        let text = match link {
            Some(url) if url != text => format!("{text} ({url})"),
            _ => text.to_owned(),
        };

        for word in text.split_inclusive(' ') {
            let word_len = word.trim_end().chars().count();
            let fits = self.column() + word_len <= self.right_column();
            let word = if !fits && self.column() > column_of(self.margin) {
                self.newline();
                word.trim_start()
            } else {
                word
            };

            for ch in word.chars() {
                if self.column() >= self.right_column() {
                    if ch == ' ' {
                        continue;
                    }
                    self.newline();
                }
                self.put_char(ch);
            }
        }
    }

    fn cell(&mut self, width: f32, _height: f32, text: &str, align: Align, fill: bool) {
        let start = self.column();
        let cols = if width > 0.0 {
            column_of(self.x + width).saturating_sub(start)
        } else {
            self.right_column().saturating_sub(start)
        };
        let len = text.chars().count();
        let offset = match align {
            Align::Left => 0,
            Align::Center => cols.saturating_sub(len) / 2,
            Align::Right => cols.saturating_sub(len),
        };

        let row = self.row;
        let page = self.page();
        if fill {
            for col in start..start + cols {
                page.put(row, col, ' ');
            }
        }
        for (i, ch) in text.chars().enumerate() {
            page.put(row, start + offset + i, ch);
        }
        self.x = if width > 0.0 {
            self.x + width
        } else {
            self.page_width - self.margin
        };
    }

    fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        if (y1 - y2).abs() > f32::EPSILON {
            debug!(x1, y1, x2, y2, "skipping non-horizontal line");
            return;
        }
        let Some(row) = self.row_of(y1) else {
            return;
        };
        let (from, to) = (column_of(x1.min(x2)), column_of(x1.max(x2)));
        let page = self.page();
        for col in from..to {
            page.put(row, col, '-');
        }
    }

    fn ln(&mut self, height: Option<f32>) {
        let height = height.unwrap_or(self.last_height);
        self.pending += height;
        let rows = (self.pending / self.row_height).round().max(0.0);
        self.pending -= rows * self.row_height;
        let rows = rows as usize;
        if rows == 0 && self.current_row_used() {
            self.newline();
        } else {
            self.advance_rows(rows);
        }
    }

    fn page_no(&self) -> u32 {
        u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
    }

    fn page_width(&self) -> f32 {
        self.page_width
    }

    fn string_width(&self, text: &str) -> f32 {
        text.chars().count() as f32 * Self::COLUMN_MM
    }

    fn text_color(&self) -> Color {
        self.text_color
    }

    fn set_text_color(&mut self, color: Color) {
        self.text_color = color;
    }

    fn set_fill_color(&mut self, color: Color) {
        self.fill_color = color;
    }

    fn add_page(&mut self) {
        self.pages.push(Page::default());
        self.row = 0;
        self.pending = 0.0;
        self.x = self.margin;
        debug!(page = self.pages.len(), "new page");
    }
}
