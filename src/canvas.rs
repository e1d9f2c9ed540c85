// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! The drawing surface the layout engine and the tag interpreter drive.
//!
//! [`Canvas`] is modelled on classic PDF page APIs: a current font, a left
//! margin, a cursor position, flowing text that wraps at the right margin,
//! and automatic page breaks. Lengths are in millimetres.
//!
//! Two implementations ship with the crate:
//! - [`TextCanvas`](crate::text_canvas::TextCanvas) renders a paginated
//!   plain-text document.
//! - [`RecordingCanvas`] records every call as an [`Op`], for tests and for
//!   the `--trace` output of the binary.

use serde::Serialize;

/// A font selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Font {
    /// Family name, e.g. `NotoSans`.
    pub family: String,
    /// Size in points.
    pub size: f32,
    /// Any combination of `B`, `I` and `U`, in that order. Empty is regular.
    pub style: String,
}

impl Font {
    /// Creates a font selection.
    #[must_use]
    pub fn new(family: &str, size: f32, style: &str) -> Self {
        Self {
            family: family.to_owned(),
            size,
            style: style.to_owned(),
        }
    }
}

/// An RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    /// Default text colour.
    pub const BLACK: Self = Self(0, 0, 0);
    /// Default fill colour.
    pub const WHITE: Self = Self(255, 255, 255);
    /// Hyperlink colour.
    pub const LINK: Self = Self(0, 0, 255);
    /// Secondary text such as the bot marker.
    pub const GREY: Self = Self(100, 100, 100);
}

/// Horizontal alignment inside a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    /// Flush left.
    Left,
    /// Centred.
    Center,
    /// Flush right.
    Right,
}

/// Page and cursor primitives.
pub trait Canvas {
    /// The current font.
    fn font(&self) -> &Font;

    /// Selects a font.
    fn set_font(&mut self, family: &str, size: f32, style: &str);

    /// The left margin new lines start at.
    fn left_margin(&self) -> f32;

    /// Moves the left margin.
    fn set_left_margin(&mut self, margin: f32);

    /// Horizontal cursor position.
    fn x(&self) -> f32;

    /// Moves the cursor horizontally.
    fn set_x(&mut self, x: f32);

    /// Vertical cursor position.
    fn y(&self) -> f32;

    /// Writes flowing text at the cursor in the current font, wrapping at the
    /// right margin. `link` turns the text into a hyperlink.
    fn write(&mut self, height: f32, text: &str, link: Option<&str>);

    /// Prints `text` in a box of `width` (0 extends to the right margin) and
    /// leaves the cursor after the box.
    fn cell(&mut self, width: f32, height: f32, text: &str, align: Align, fill: bool);

    /// Draws a straight line.
    fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32);

    /// Starts a new line at the left margin, `height` below the current one.
    /// `None` advances by the height of the last write.
    fn ln(&mut self, height: Option<f32>);

    /// Current page number, starting at 1.
    fn page_no(&self) -> u32;

    /// Width of the page.
    fn page_width(&self) -> f32;

    /// Width of `text` in the current font.
    fn string_width(&self, text: &str) -> f32;

    /// The current text colour.
    fn text_color(&self) -> Color;

    /// Sets the text colour.
    fn set_text_color(&mut self, color: Color);

    /// Sets the colour used by filled cells.
    fn set_fill_color(&mut self, color: Color);

    /// Starts a new page.
    fn add_page(&mut self);
}

/// One recorded canvas call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// [`Canvas::set_font`].
    SetFont {
        /// The selected font.
        font: Font,
    },
    /// [`Canvas::set_left_margin`].
    SetLeftMargin {
        /// New margin.
        margin: f32,
    },
    /// [`Canvas::set_x`].
    SetX {
        /// New position.
        x: f32,
    },
    /// [`Canvas::write`].
    Write {
        /// Text written.
        text: String,
        /// Link target, if any.
        link: Option<String>,
        /// Font in effect.
        font: Font,
        /// Colour in effect.
        color: Color,
        /// Left margin in effect.
        margin: f32,
        /// Page the text landed on.
        page: u32,
    },
    /// [`Canvas::cell`].
    Cell {
        /// Text printed.
        text: String,
        /// Alignment.
        align: Align,
        /// Whether the box was filled.
        fill: bool,
    },
    /// [`Canvas::line`].
    Line {
        /// Start x.
        x1: f32,
        /// Start y.
        y1: f32,
        /// End x.
        x2: f32,
        /// End y.
        y2: f32,
    },
    /// [`Canvas::ln`].
    Ln {
        /// Requested advance.
        height: Option<f32>,
    },
    /// [`Canvas::set_text_color`].
    SetTextColor {
        /// New colour.
        color: Color,
    },
    /// [`Canvas::set_fill_color`].
    SetFillColor {
        /// New colour.
        color: Color,
    },
    /// [`Canvas::add_page`], explicit or automatic.
    AddPage {
        /// Number of the new page.
        page: u32,
    },
}

/// Canvas that records calls instead of drawing.
///
/// Tracks just enough geometry to be useful: every write advances the cursor
/// by its string width, `ln` moves down, and with
/// [`with_page_height`](Self::with_page_height) a line that crosses the page
/// bottom starts a new page, the way flowing PDF text does.
#[derive(Debug, Clone)]
pub struct RecordingCanvas {
    ops: Vec<Op>,
    font: Font,
    text_color: Color,
    margin: f32,
    x: f32,
    y: f32,
    last_height: f32,
    page: u32,
    page_width: f32,
    page_height: Option<f32>,
}

impl Default for RecordingCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingCanvas {
    /// Width of one character per point of font size.
    const CHAR_WIDTH_PER_PT: f32 = 0.2;

    /// Creates an A4-wide canvas on page 1 with unlimited page height.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            font: Font::new("NotoSans", 12.0, ""),
            text_color: Color::BLACK,
            margin: 10.0,
            x: 10.0,
            y: 10.0,
            last_height: 0.0,
            page: 1,
            page_width: 210.0,
            page_height: None,
        }
    }

    /// Breaks pages once the cursor passes `height`.
    #[must_use]
    pub const fn with_page_height(mut self, height: f32) -> Self {
        self.page_height = Some(height);
        self
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Consumes the canvas and returns its calls.
    #[must_use]
    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }

    /// Texts of all writes, in order.
    #[must_use]
    pub fn written(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of all written text.
    #[must_use]
    pub fn text(&self) -> String {
        self.written().concat()
    }

    fn advance(&mut self, height: f32) {
        self.y += height;
        self.x = self.margin;
        if let Some(limit) = self.page_height
            && self.y > limit
        {
            self.add_page();
        }
    }
}

impl Canvas for RecordingCanvas {
    fn font(&self) -> &Font {
        &self.font
    }

    fn set_font(&mut self, family: &str, size: f32, style: &str) {
        self.font = Font::new(family, size, style);
        self.ops.push(Op::SetFont {
            font: self.font.clone(),
        });
    }

    fn left_margin(&self) -> f32 {
        self.margin
    }

    fn set_left_margin(&mut self, margin: f32) {
        self.margin = margin;
        if self.x < margin {
            self.x = margin;
        }
        self.ops.push(Op::SetLeftMargin { margin });
    }

    fn x(&self) -> f32 {
        self.x
    }

    fn set_x(&mut self, x: f32) {
        self.x = x;
        self.ops.push(Op::SetX { x });
    }

    fn y(&self) -> f32 {
        self.y
    }

    fn write(&mut self, height: f32, text: &str, link: Option<&str>) {
        self.last_height = height;
        self.ops.push(Op::Write {
            text: text.to_owned(),
            link: link.map(str::to_owned),
            font: self.font.clone(),
            color: self.text_color,
            margin: self.margin,
            page: self.page,
        });
        self.x += self.string_width(text);
    }

    fn cell(&mut self, width: f32, height: f32, text: &str, align: Align, fill: bool) {
        self.last_height = height;
        self.ops.push(Op::Cell {
            text: text.to_owned(),
            align,
            fill,
        });
        self.x += if width > 0.0 { width } else { self.string_width(text) };
    }

    fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.ops.push(Op::Line { x1, y1, x2, y2 });
    }

    fn ln(&mut self, height: Option<f32>) {
        self.ops.push(Op::Ln { height });
        self.advance(height.unwrap_or(self.last_height));
    }

    fn page_no(&self) -> u32 {
        self.page
    }

    fn page_width(&self) -> f32 {
        self.page_width
    }

    fn string_width(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.font.size * Self::CHAR_WIDTH_PER_PT
    }

    fn text_color(&self) -> Color {
        self.text_color
    }

    fn set_text_color(&mut self, color: Color) {
        self.text_color = color;
        self.ops.push(Op::SetTextColor { color });
    }

    fn set_fill_color(&mut self, color: Color) {
        self.ops.push(Op::SetFillColor { color });
    }

    fn add_page(&mut self) {
        self.page += 1;
        self.y = 10.0;
        self.x = self.margin;
        self.ops.push(Op::AddPage { page: self.page });
    }
}
