// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Interpreter for the constrained tag markup.
//!
//! Walks markup produced by [`MarkupTransformer`](crate::markup::MarkupTransformer)
//! and turns it into canvas calls. Supported tags:
//!
//! | Tag | Effect |
//! |-----|--------|
//! | `<b>`, `<i>`, `<u>` | bold, italic, underline |
//! | `<a href="...">` | following text is a hyperlink |
//! | `<br>` | line break |
//! | `<blockquote>` | indent by one unit on a new line |
//! | `<s fontfamily="..." size="..." style="...">` | temporary font override |
//!
//! Anything else is dropped without output. Style state lives in the
//! interpreter, not in the markup, so it carries over between calls: one
//! interpreter renders all fields of a document.

use crate::canvas::{Canvas, Color, Font};
use crate::settings::Settings;
use regex::Regex;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, error};

fn re_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^>]*)>").expect("valid regex"))
}

fn re_attribute() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([^=]*)=["']?([^"']*)"#).expect("valid regex"))
}

/// Error type for markup rendering.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum MarkupError {
    /// A custom-font span was opened while another one was still open.
    #[snafu(display("custom font spans can not be nested"))]
    NestedFontSpan,
}

/// A piece of tag markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text.
    Text(&'a str),
    /// Tag content without the angle brackets; closing tags start with `/`.
    Tag(&'a str),
}

/// Splits markup into alternating text and tag segments.
///
/// The result always starts and ends with a text segment and alternates in
/// between, so texts sit at even and tags at odd indices. Text segments may
/// be empty.
#[must_use]
pub fn split_markup(markup: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in re_tag().captures_iter(markup) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        segments.push(Segment::Text(&markup[last..whole.start()]));
        segments.push(Segment::Tag(inner.as_str()));
        last = whole.end();
    }
    segments.push(Segment::Text(&markup[last..]));
    segments
}

/// Parses `KEY="value"` pairs separated by spaces. Keys are upper-cased;
/// pieces without `=` are skipped.
#[must_use]
pub fn parse_attributes<'a>(pieces: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
    pieces
        .into_iter()
        .filter_map(|piece| {
            let caps = re_attribute().captures(piece)?;
            let key = caps.get(1)?.as_str().trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_ascii_uppercase(), caps.get(2)?.as_str().to_owned()))
        })
        .collect()
}

/// Formatting state carried across render calls.
///
/// Bold, italic and underline are counters rather than flags: a style is
/// active while its counter is above zero, and closing more than was opened
/// saturates at zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleState {
    /// Open `<b>` spans.
    pub bold: u32,
    /// Open `<i>` spans.
    pub italic: u32,
    /// Open `<u>` spans.
    pub underline: u32,
    /// Open `<blockquote>` spans.
    pub blockquote: u32,
    /// Target of the open `<a>`, if any.
    pub link: Option<String>,
    /// Font to restore when the open `<s>` closes.
    pub saved_font: Option<Font>,
}

impl StyleState {
    /// Combined style string, e.g. `BU`.
    #[must_use]
    pub fn style(&self) -> String {
        [(self.bold, 'B'), (self.italic, 'I'), (self.underline, 'U')]
            .into_iter()
            .filter(|(count, _)| *count > 0)
            .map(|(_, flag)| flag)
            .collect()
    }
}

/// Renders tag markup onto a canvas.
#[derive(Debug, Clone)]
pub struct TagInterpreter {
    state: StyleState,
    indent: f32,
    break_height: f32,
}

impl TagInterpreter {
    /// Creates an interpreter with the given blockquote indent and `<br>` advance.
    #[must_use]
    pub fn new(indent: f32, break_height: f32) -> Self {
        Self {
            state: StyleState::default(),
            indent,
            break_height,
        }
    }

    /// Creates an interpreter using the tab width and line-break height from `settings`.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.tab_width, settings.line_break_height)
    }

    /// Current formatting state.
    #[must_use]
    pub const fn state(&self) -> &StyleState {
        &self.state
    }

    /// Renders `markup`, logging and abandoning the rest of it on error.
    pub fn render(&mut self, canvas: &mut dyn Canvas, line_height: f32, markup: &str) {
        if let Err(err) = self.try_render(canvas, line_height, markup) {
            error!(%markup, "failed to render markup: {err}");
        }
    }

    /// Renders `markup`.
    ///
    /// # Errors
    ///
    /// Returns [`MarkupError::NestedFontSpan`] when a `<s>` opens inside
    /// another. Output up to that tag stays on the canvas. The interpreter
    /// then restores the font saved by the open `<s>` and moves the margin
    /// back out of any open blockquote; other styles stay active.
    pub fn try_render(
        &mut self,
        canvas: &mut dyn Canvas,
        line_height: f32,
        markup: &str,
    ) -> Result<(), MarkupError> {
        let markup = markup.replace('\n', " ");
        for segment in split_markup(&markup) {
            let result = match segment {
                Segment::Text(text) => {
                    self.text(canvas, line_height, text);
                    Ok(())
                }
                Segment::Tag(tag) => self.tag(canvas, tag),
            };
            if let Err(err) = result {
                self.reset(canvas);
                return Err(err);
            }
        }
        Ok(())
    }

    fn text(&mut self, canvas: &mut dyn Canvas, line_height: f32, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.state.link.clone() {
            Some(url) => self.link_text(canvas, line_height, text, &url),
            None => canvas.write(line_height, text, None),
        }
    }

    fn link_text(&mut self, canvas: &mut dyn Canvas, line_height: f32, text: &str, url: &str) {
        let color = canvas.text_color();
        canvas.set_text_color(Color::LINK);
        self.state.underline += 1;
        self.apply_style(canvas);
        canvas.write(line_height, text, Some(url));
        self.state.underline -= 1;
        self.apply_style(canvas);
        canvas.set_text_color(color);
    }

    fn tag(&mut self, canvas: &mut dyn Canvas, tag: &str) -> Result<(), MarkupError> {
        if let Some(name) = tag.strip_prefix('/') {
            self.close_tag(canvas, &name.trim().to_ascii_uppercase());
            return Ok(());
        }
        let mut pieces = tag.split(' ');
        let name = pieces.next().unwrap_or_default().to_ascii_uppercase();
        let attributes = parse_attributes(pieces);
        self.open_tag(canvas, &name, &attributes)
    }

    fn open_tag(
        &mut self,
        canvas: &mut dyn Canvas,
        name: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<(), MarkupError> {
        match name {
            "B" => self.state.bold += 1,
            "I" => self.state.italic += 1,
            "U" => self.state.underline += 1,
            "BLOCKQUOTE" => {
                self.state.blockquote += 1;
                canvas.set_left_margin(canvas.left_margin() + self.indent);
                canvas.set_x(canvas.x() + self.indent);
                canvas.ln(None);
                return Ok(());
            }
            "A" => {
                self.state.link = attributes.get("HREF").cloned();
                if self.state.link.is_none() {
                    debug!("anchor without href");
                }
                return Ok(());
            }
            "BR" => {
                canvas.ln(Some(self.break_height));
                return Ok(());
            }
            "S" => return self.open_font_span(canvas, attributes),
            _ => {
                debug!(tag = name, "ignoring unsupported tag");
                return Ok(());
            }
        }
        self.apply_style(canvas);
        Ok(())
    }

    fn close_tag(&mut self, canvas: &mut dyn Canvas, name: &str) {
        match name {
            "B" => self.state.bold = self.state.bold.saturating_sub(1),
            "I" => self.state.italic = self.state.italic.saturating_sub(1),
            "U" => self.state.underline = self.state.underline.saturating_sub(1),
            "BLOCKQUOTE" => {
                self.state.blockquote = self.state.blockquote.saturating_sub(1);
                let (margin, x) = (canvas.left_margin(), canvas.x());
                if margin > self.indent && x > self.indent {
                    canvas.set_left_margin(margin - self.indent);
                    canvas.set_x(x - self.indent);
                }
                canvas.ln(None);
                return;
            }
            "A" => {
                self.state.link = None;
                return;
            }
            "S" => {
                if let Some(font) = self.state.saved_font.take() {
                    canvas.set_font(&font.family, font.size, &font.style);
                }
                return;
            }
            _ => return,
        }
        self.apply_style(canvas);
    }

    fn open_font_span(
        &mut self,
        canvas: &mut dyn Canvas,
        attributes: &HashMap<String, String>,
    ) -> Result<(), MarkupError> {
        ensure!(self.state.saved_font.is_none(), NestedFontSpanSnafu);

        let current = canvas.font().clone();
        let family = attributes
            .get("FONTFAMILY")
            .map_or(current.family.as_str(), String::as_str)
            .to_owned();
        let size = match attributes.get("SIZE").map(|size| size.trim().parse::<f32>()) {
            Some(Ok(size)) => size,
            Some(Err(_)) => {
                debug!("ignoring malformed font size");
                current.size
            }
            None => current.size,
        };
        let style = attributes
            .get("STYLE")
            .map_or(current.style.as_str(), String::as_str)
            .to_owned();

        self.state.saved_font = Some(current);
        canvas.set_font(&family, size, &style);
        Ok(())
    }

    fn apply_style(&self, canvas: &mut dyn Canvas) {
        let font = canvas.font();
        let (family, size) = (font.family.clone(), font.size);
        canvas.set_font(&family, size, &self.state.style());
    }

    /// Unwinds the spans an abandoned render can leave half-applied: the
    /// custom font and any blockquote indentation. Bold, italic, underline
    /// and link state carry over like after a normal render.
    fn reset(&mut self, canvas: &mut dyn Canvas) {
        if let Some(font) = self.state.saved_font.take() {
            canvas.set_font(&font.family, font.size, &font.style);
        }
        for _ in 0..self.state.blockquote {
            let (margin, x) = (canvas.left_margin(), canvas.x());
            if margin > self.indent && x > self.indent {
                canvas.set_left_margin(margin - self.indent);
                canvas.set_x(x - self.indent);
            }
        }
        self.state.blockquote = 0;
        self.apply_style(canvas);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Op, RecordingCanvas};

    fn interpreter() -> TagInterpreter {
        TagInterpreter::new(4.0, 5.0)
    }

    /// (text, style, family) of every write.
    fn writes(canvas: &RecordingCanvas) -> Vec<(String, String, String)> {
        canvas
            .ops()
            .iter()
            .filter_map(|op| match op {
                Op::Write { text, font, .. } => {
                    Some((text.clone(), font.style.clone(), font.family.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn styles(canvas: &RecordingCanvas) -> Vec<(String, String)> {
        writes(canvas)
            .into_iter()
            .map(|(text, style, _)| (text, style))
            .collect()
    }

    fn pair(text: &str, style: &str) -> (String, String) {
        (text.to_owned(), style.to_owned())
    }

    #[test]
    fn splits_text_and_tags_alternately() {
        assert_eq!(
            split_markup("a<b>c</b>"),
            [
                Segment::Text("a"),
                Segment::Tag("b"),
                Segment::Text("c"),
                Segment::Tag("/b"),
                Segment::Text(""),
            ]
        );
        assert_eq!(split_markup("plain"), [Segment::Text("plain")]);
    }

    #[test]
    fn parses_quoted_attributes_and_skips_malformed_ones() {
        let attrs = parse_attributes(["href='https://x.io/?a=b'", "broken", "title=\"t\""]);

        assert_eq!(attrs["HREF"], "https://x.io/?a=b");
        assert_eq!(attrs["TITLE"], "t");
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn writes_plain_text_in_current_font() {
        let mut canvas = RecordingCanvas::new();
        interpreter().render(&mut canvas, 6.0, "hello world");

        assert_eq!(styles(&canvas), [pair("hello world", "")]);
    }

    #[test]
    fn applies_bold_and_italic() {
        let mut canvas = RecordingCanvas::new();
        interpreter().render(&mut canvas, 6.0, "a<b>b</b><i>c</i>");

        assert_eq!(
            styles(&canvas),
            [pair("a", ""), pair("b", "B"), pair("c", "I")]
        );
    }

    #[test]
    fn overlapping_spans_close_independently() {
        let mut canvas = RecordingCanvas::new();
        interpreter().render(&mut canvas, 6.0, "<b>a<i>b</b>c</i>d");

        assert_eq!(
            styles(&canvas),
            [pair("a", "B"), pair("b", "BI"), pair("c", "I"), pair("d", "")]
        );
    }

    #[test]
    fn extra_closes_saturate_at_zero() {
        let mut canvas = RecordingCanvas::new();
        let mut interp = interpreter();
        interp.render(&mut canvas, 6.0, "</b></b><b>x");

        assert_eq!(styles(&canvas), [pair("x", "B")]);
        assert_eq!(interp.state().bold, 1);
    }

    #[test]
    fn style_carries_over_between_calls() {
        let mut canvas = RecordingCanvas::new();
        let mut interp = interpreter();
        interp.render(&mut canvas, 6.0, "<u>");
        interp.render(&mut canvas, 6.0, "x");

        assert_eq!(styles(&canvas), [pair("x", "U")]);
    }

    #[test]
    fn writes_links_underlined_in_link_color() {
        let mut canvas = RecordingCanvas::new();
        let mut interp = interpreter();
        interp.render(
            &mut canvas,
            6.0,
            r#"<b><a href="https://example.com">site</a></b> after"#,
        );

        let link_write = canvas.ops().iter().find_map(|op| match op {
            Op::Write {
                text, link, font, color, ..
            } if text == "site" => Some((link.clone(), font.style.clone(), *color)),
            _ => None,
        });
        assert_eq!(
            link_write,
            Some((Some("https://example.com".into()), "BU".into(), Color::LINK))
        );
        assert_eq!(canvas.text_color(), Color::BLACK);
        assert_eq!(styles(&canvas).last(), Some(&pair(" after", "")));
        assert!(interp.state().link.is_none());
    }

    #[test]
    fn restores_previous_text_color_after_link() {
        let mut canvas = RecordingCanvas::new();
        canvas.set_text_color(Color::GREY);
        interpreter().render(&mut canvas, 6.0, r#"<a href="u">x</a>"#);

        assert_eq!(canvas.text_color(), Color::GREY);
    }

    #[test]
    fn anchor_without_href_writes_plain_text() {
        let mut canvas = RecordingCanvas::new();
        interpreter().render(&mut canvas, 6.0, "<a name=\"x\">text</a>");

        assert!(canvas.ops().iter().all(|op| !matches!(
            op,
            Op::Write { link: Some(_), .. }
        )));
        assert_eq!(canvas.written(), ["text"]);
    }

    #[test]
    fn line_break_advances_by_fixed_height() {
        let mut canvas = RecordingCanvas::new();
        interpreter().render(&mut canvas, 6.0, "a<br>b");

        assert!(canvas.ops().contains(&Op::Ln { height: Some(5.0) }));
        assert_eq!(canvas.written(), ["a", "b"]);
    }

    #[test]
    fn blockquote_indents_and_outdents() {
        let mut canvas = RecordingCanvas::new();
        let mut interp = interpreter();
        canvas.set_left_margin(10.0);

        interp.render(&mut canvas, 6.0, "<blockquote>quoted");
        assert_eq!(canvas.left_margin(), 14.0);
        assert_eq!(interp.state().blockquote, 1);

        interp.render(&mut canvas, 6.0, "</blockquote>");
        assert_eq!(canvas.left_margin(), 10.0);
        assert_eq!(interp.state().blockquote, 0);
    }

    #[test]
    fn blockquote_close_never_goes_below_one_indent() {
        let mut canvas = RecordingCanvas::new();
        canvas.set_left_margin(3.0);
        canvas.set_x(3.0);

        interpreter().render(&mut canvas, 6.0, "</blockquote>");

        assert_eq!(canvas.left_margin(), 3.0);
    }

    #[test]
    fn custom_font_span_overrides_and_restores() {
        let mut canvas = RecordingCanvas::new();
        canvas.set_font("Sans", 12.0, "");
        interpreter().render(
            &mut canvas,
            6.0,
            r#"<s fontfamily="Mono" size="8">code</s> text"#,
        );

        let writes = writes(&canvas);
        assert_eq!(writes[0].2, "Mono");
        assert_eq!(writes[1].2, "Sans");
        assert_eq!(canvas.font(), &Font::new("Sans", 12.0, ""));
    }

    #[test]
    fn custom_font_span_keeps_unspecified_attributes() {
        let mut canvas = RecordingCanvas::new();
        canvas.set_font("Sans", 12.0, "");
        interpreter().render(&mut canvas, 6.0, r#"<s style="B" size="huge">x"#);

        assert_eq!(canvas.font(), &Font::new("Sans", 12.0, "B"));
    }

    #[test]
    fn nested_font_span_abandons_rest_of_markup() {
        let mut canvas = RecordingCanvas::new();
        let mut interp = interpreter();

        let result = interp.try_render(
            &mut canvas,
            6.0,
            r#"before<s fontfamily="X"><s fontfamily="Y">a</s></s>"#,
        );

        assert_eq!(result, Err(MarkupError::NestedFontSpan));
        assert_eq!(canvas.written(), ["before"]);
        assert_eq!(interp.state(), &StyleState::default());
    }

    #[test]
    fn later_calls_recover_after_nesting_error() {
        let mut canvas = RecordingCanvas::new();
        canvas.set_font("Sans", 12.0, "");
        let mut interp = interpreter();

        interp.render(
            &mut canvas,
            6.0,
            r#"<b><s fontfamily="X"><s fontfamily="Y">a</s></s>"#,
        );
        interp.render(&mut canvas, 6.0, r#"<s fontfamily="Z">b</s>c"#);

        let writes = writes(&canvas);
        assert_eq!(writes[0], ("b".into(), "B".into(), "Z".into()));
        assert_eq!(writes[1], ("c".into(), "B".into(), "Sans".into()));
        assert_eq!(canvas.font(), &Font::new("Sans", 12.0, "B"));
    }

    #[test]
    fn nesting_error_keeps_styles_from_earlier_calls() {
        let mut canvas = RecordingCanvas::new();
        canvas.set_font("Sans", 12.0, "");
        let mut interp = interpreter();

        interp.render(&mut canvas, 6.0, "<i>open");
        interp.render(&mut canvas, 6.0, r#"<s fontfamily="X"><s fontfamily="Y">a"#);
        interp.render(&mut canvas, 6.0, "still</i>done");

        let writes = writes(&canvas);
        assert_eq!(writes[1], ("still".into(), "I".into(), "Sans".into()));
        assert_eq!(writes[2], ("done".into(), String::new(), "Sans".into()));
        assert_eq!(interp.state().italic, 0);
    }

    #[test]
    fn nesting_error_moves_margin_out_of_open_blockquotes() {
        let mut canvas = RecordingCanvas::new();
        canvas.set_left_margin(10.0);
        canvas.set_x(10.0);
        let mut interp = interpreter();

        let result = interp.try_render(
            &mut canvas,
            6.0,
            r#"<blockquote><blockquote>q<s fontfamily="X"><s fontfamily="Y">a"#,
        );

        assert_eq!(result, Err(MarkupError::NestedFontSpan));
        assert_eq!(canvas.left_margin(), 10.0);
        assert_eq!(interp.state().blockquote, 0);
    }

    #[test]
    fn drops_unsupported_tags() {
        let mut canvas = RecordingCanvas::new();
        interpreter().render(&mut canvas, 6.0, "<marquee speed=\"9\">hi</marquee><>!");

        assert_eq!(canvas.text(), "hi!");
    }

    #[test]
    fn newlines_render_as_spaces() {
        let mut canvas = RecordingCanvas::new();
        interpreter().render(&mut canvas, 6.0, "a\nb");

        assert_eq!(canvas.written(), ["a b"]);
    }
}
