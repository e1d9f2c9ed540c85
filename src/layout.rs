// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Message layout.
//!
//! [`LayoutEngine`] walks a channel's messages in timestamp order and decides
//! what surrounds each one:
//!
//! - a day separator with the full date whenever the calendar day changes
//! - the author header (name, `App` marker for bots, time) whenever the
//!   author differs from the previous message, the previous message of the
//!   same author is older than the configured gap, the day changed, or a
//!   new page started
//! - thread replies right after their parent, one indentation unit deeper
//!
//! Text-bearing fields go through the
//! [`MarkupTransformer`] and then the [`TagInterpreter`].

mod sections;

use crate::canvas::{Align, Canvas, Color};
use crate::dates::Dates;
use crate::interpreter::TagInterpreter;
use crate::markup::{MarkupTransformer, normalize_encoding};
use crate::parser::{Message, NameTables};
use crate::settings::Settings;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Line shown instead of messages whose author cannot be determined.
pub const UNPROCESSABLE_MESSAGE: &str = "[Can not process this message]";

/// Line shown for a channel without messages.
pub const EMPTY_CHANNEL: &str = "This channel is empty";

/// What the engine remembers about the previously rendered message.
///
/// `None` means unknown and forces the next header to be drawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutCursor {
    /// Author identity of the last message.
    pub last_user: Option<String>,
    /// Time of the last message, for the header repeat gap.
    pub last_ts: Option<DateTime<FixedOffset>>,
    /// Calendar day of the last top-level message, for day separators.
    pub last_day: Option<NaiveDate>,
    /// Page the last message started on.
    pub last_page: Option<u32>,
}

/// Resolved author of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Author {
    id: String,
    name: String,
    is_bot: bool,
}

/// Options that change what is drawn, not how.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Append each message's raw `ts` after its text.
    pub debug_info: bool,
}

/// Lays out messages on a canvas.
pub struct LayoutEngine<'a> {
    settings: &'a Settings,
    dates: &'a Dates,
    names: &'a NameTables,
    transformer: MarkupTransformer<'a>,
    interpreter: TagInterpreter,
    cursor: LayoutCursor,
    options: LayoutOptions,
}

impl<'a> LayoutEngine<'a> {
    /// Creates an engine with an empty cursor.
    #[must_use]
    pub fn new(
        settings: &'a Settings,
        dates: &'a Dates,
        names: &'a NameTables,
        options: LayoutOptions,
    ) -> Self {
        Self {
            settings,
            dates,
            names,
            transformer: MarkupTransformer::new(names, dates, &settings.font_family_mono),
            interpreter: TagInterpreter::from_settings(settings),
            cursor: LayoutCursor::default(),
            options,
        }
    }

    /// State after the last rendered message.
    #[must_use]
    pub const fn cursor(&self) -> &LayoutCursor {
        &self.cursor
    }

    /// Writes `messages` with their threads.
    ///
    /// `threads` maps a parent's `ts` to the messages of its thread; a copy
    /// of the parent in that list is skipped.
    pub fn write_messages(
        &mut self,
        canvas: &mut dyn Canvas,
        messages: &[Message],
        threads: &HashMap<String, Vec<Message>>,
    ) {
        if messages.is_empty() {
            self.set_font(canvas, self.settings.font_size_normal, "");
            canvas.ln(None);
            self.set_font(canvas, self.settings.font_size_normal, "I");
            canvas.write(self.settings.line_height_default, EMPTY_CHANNEL, None);
            return;
        }

        for msg in sorted_by_ts(messages) {
            let msg_dt = self.dates.parse_ts(&msg.ts);
            self.forget_user_after_gap(msg_dt);

            if let Some(dt) = msg_dt
                && self.cursor.last_day != Some(dt.date_naive())
            {
                self.write_day_separator(canvas, &dt);
                self.cursor.last_user = None;
            }

            self.forget_user_on_new_page(canvas);
            self.cursor.last_user = self.write_message(canvas, msg, self.settings.margin_left);

            if msg.is_thread_parent()
                && let Some(replies) = threads.get(&msg.ts)
            {
                self.write_thread(canvas, msg, replies);
            }

            if let Some(dt) = msg_dt {
                self.cursor.last_ts = Some(dt);
                self.cursor.last_day = Some(dt.date_naive());
            }
        }
    }

    /// Writes the replies of one thread below its parent.
    fn write_thread(&mut self, canvas: &mut dyn Canvas, parent: &Message, replies: &[Message]) {
        let margin = self.settings.margin_left + self.settings.tab_width;
        debug!(thread_ts = %parent.ts, replies = replies.len(), "writing thread");

        self.cursor.last_user = None;
        self.cursor.last_ts = None;

        for reply in sorted_by_ts(replies) {
            if reply.ts == parent.ts {
                continue;
            }
            let reply_dt = self.dates.parse_ts(&reply.ts);
            self.forget_user_after_gap(reply_dt);
            self.forget_user_on_new_page(canvas);
            self.cursor.last_user = self.write_message(canvas, reply, margin);
            self.cursor.last_ts = reply_dt;
        }

        self.cursor.last_user = None;
        self.cursor.last_ts = None;
    }

    fn forget_user_after_gap(&mut self, msg_dt: Option<DateTime<FixedOffset>>) {
        if let (Some(last), Some(current)) = (self.cursor.last_ts, msg_dt)
            && current - last > TimeDelta::minutes(self.settings.minutes_until_username_repeats)
        {
            self.cursor.last_user = None;
        }
    }

    fn forget_user_on_new_page(&mut self, canvas: &dyn Canvas) {
        let page = canvas.page_no();
        if self.cursor.last_page != Some(page) {
            if self.cursor.last_page.is_some() {
                debug!(page, "new page, repeating author header");
            }
            self.cursor.last_user = None;
            self.cursor.last_page = Some(page);
        }
    }

    /// Horizontal rule with the full date stamped in the middle.
    fn write_day_separator(&self, canvas: &mut dyn Canvas, dt: &DateTime<FixedOffset>) {
        let settings = self.settings;
        canvas.ln(Some(settings.line_height_small));
        canvas.ln(Some(settings.line_height_small));
        self.set_font(canvas, settings.font_size_normal, "");

        let x1 = settings.margin_left;
        let x2 = canvas.page_width() - settings.margin_left;
        let y = canvas.y() + 3.0;
        canvas.line(x1, y, x2, y);

        let date_text = self.dates.full_date(dt);
        let text_width = canvas.string_width(&date_text);
        let center = (x2 - x1) / 2.0 + x1;
        let border = 3.0;
        canvas.set_fill_color(Color::WHITE);
        canvas.set_x(center - text_width / 2.0 - border);
        canvas.cell(
            text_width + 2.0 * border,
            settings.line_height_default,
            &date_text,
            Align::Center,
            true,
        );
        canvas.ln(None);
    }

    /// Writes one message and returns its author identity.
    fn write_message(&mut self, canvas: &mut dyn Canvas, msg: &Message, margin: f32) -> Option<String> {
        let settings = self.settings;
        set_margin(canvas, margin);

        let Some(author) = self.resolve_author(msg) else {
            warn!(ts = %msg.ts, "can not determine author of message");
            self.set_font(canvas, settings.font_size_normal, "");
            canvas.write(settings.line_height_default, UNPROCESSABLE_MESSAGE, None);
            canvas.ln(None);
            return None;
        };

        if self.cursor.last_user.as_deref() != Some(author.id.as_str()) {
            self.write_header(canvas, &author, &msg.ts);
        }

        if let Some(text) = msg.text.as_deref().filter(|t| !t.is_empty()) {
            self.set_font(canvas, settings.font_size_normal, "");
            let mut markup = self.transformer.transform(text, msg.uses_markup());
            if self.options.debug_info {
                markup.push_str(&format!(
                    r#" [<s fontfamily="{}" size="8">{}]</s>"#,
                    settings.font_family_mono, msg.ts
                ));
            }
            self.interpreter
                .render(canvas, settings.line_height_default, &markup);
            canvas.ln(None);
        }

        self.write_reactions(canvas, msg, margin);
        self.write_files(canvas, msg, margin);
        self.write_attachments(canvas, msg, margin);
        self.write_blocks(canvas, msg, margin);

        Some(author.id)
    }

    fn write_header(&self, canvas: &mut dyn Canvas, author: &Author, ts: &str) {
        let settings = self.settings;
        canvas.ln(Some(settings.line_height_small));
        self.set_font(canvas, settings.font_size_normal, "B");
        canvas.write(settings.line_height_default, &format!("{} ", author.name), None);

        self.set_font(canvas, settings.font_size_small, "");
        if author.is_bot {
            let color = canvas.text_color();
            canvas.set_text_color(Color::GREY);
            canvas.write(settings.line_height_default, "App ", None);
            canvas.set_text_color(color);
        }
        canvas.write(settings.line_height_default, &self.dates.time_of_ts(ts), None);
        canvas.ln(None);
    }

    fn resolve_author(&self, msg: &Message) -> Option<Author> {
        if let Some(id) = &msg.user {
            return Some(Author {
                id: id.clone(),
                name: self.user_name(id),
                is_bot: false,
            });
        }

        if let Some(id) = &msg.bot_id {
            let name = msg
                .username
                .as_deref()
                .map(normalize_encoding)
                .or_else(|| self.names.bots.get(id).cloned())
                .unwrap_or_else(|| format!("unknown_bot_{id}"));
            return Some(Author {
                id: id.clone(),
                name,
                is_bot: true,
            });
        }

        if msg.subtype.as_deref() == Some("file_comment") {
            let id = msg.comment.as_ref()?.user.as_ref()?;
            return Some(Author {
                id: id.clone(),
                name: self.user_name(id),
                is_bot: false,
            });
        }

        None
    }

    fn user_name(&self, id: &str) -> String {
        self.names
            .users
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("unknown_user_{id}"))
    }

    /// Transforms `text` and renders it at the current position.
    fn write_markup(&mut self, canvas: &mut dyn Canvas, text: &str, use_markup: bool) {
        let markup = self.transformer.transform(text, use_markup);
        self.write_tags(canvas, &markup);
    }

    /// Renders ready-made tag markup at the current position.
    fn write_tags(&mut self, canvas: &mut dyn Canvas, markup: &str) {
        self.interpreter
            .render(canvas, self.settings.line_height_default, markup);
    }

    fn set_font(&self, canvas: &mut dyn Canvas, size: f32, style: &str) {
        canvas.set_font(&self.settings.font_family, size, style);
    }
}

fn set_margin(canvas: &mut dyn Canvas, margin: f32) {
    canvas.set_left_margin(margin);
    canvas.set_x(margin);
}

/// Messages in ascending timestamp order.
fn sorted_by_ts(messages: &[Message]) -> Vec<&Message> {
    let mut sorted: Vec<&Message> = messages.iter().collect();
    // Unparsable timestamps sort after all numeric ones
    sorted.sort_by(|a, b| {
        let (x, y) = (a.ts_seconds(), b.ts_seconds());
        x.is_none()
            .cmp(&y.is_none())
            .then_with(|| match (x, y) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => Ordering::Equal,
            })
            .then_with(|| a.ts.cmp(&b.ts))
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Op, RecordingCanvas};

    const DAY1: i64 = 1_733_356_800; // 2024-12-05 00:00:00 UTC

    fn names() -> NameTables {
        let mut names = NameTables::default();
        names.users.insert("UA".into(), "Ada".into());
        names.users.insert("UB".into(), "Bob".into());
        names.bots.insert("B1".into(), "Deploy".into());
        names
    }

    fn msg(user: &str, ts: i64, text: &str) -> Message {
        Message {
            ts: format!("{ts}.000100"),
            user: Some(user.into()),
            text: Some(text.into()),
            ..Message::default()
        }
    }

    fn render_with(
        messages: &[Message],
        threads: &HashMap<String, Vec<Message>>,
        canvas: &mut RecordingCanvas,
    ) -> LayoutCursor {
        let settings = Settings::default();
        let dates = Dates::new(&settings);
        let names = names();
        let mut engine = LayoutEngine::new(&settings, &dates, &names, LayoutOptions::default());
        engine.write_messages(canvas, messages, threads);
        engine.cursor().clone()
    }

    fn render(messages: &[Message]) -> RecordingCanvas {
        let mut canvas = RecordingCanvas::new();
        render_with(messages, &HashMap::new(), &mut canvas);
        canvas
    }

    /// Names of all drawn headers, in order.
    fn headers(canvas: &RecordingCanvas) -> Vec<String> {
        canvas
            .ops()
            .iter()
            .filter_map(|op| match op {
                Op::Write { text, font, .. } if font.style == "B" && text.ends_with(' ') => {
                    Some(text.trim_end().to_owned())
                }
                _ => None,
            })
            .collect()
    }

    fn separators(canvas: &RecordingCanvas) -> usize {
        canvas
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::Line { .. }))
            .count()
    }

    #[test]
    fn repeats_header_once_per_user_run_and_day() {
        let canvas = render(&[
            msg("UA", DAY1 + 60, "one"),
            msg("UA", DAY1 + 120, "two"),
            msg("UB", DAY1 + 180, "three"),
            msg("UB", DAY1 + 86_400, "four"),
            msg("UA", DAY1 + 86_460, "five"),
        ]);

        assert_eq!(separators(&canvas), 2);
        assert_eq!(headers(&canvas), ["Ada", "Bob", "Bob", "Ada"]);
    }

    #[test]
    fn stamps_full_date_on_separator() {
        let canvas = render(&[msg("UA", DAY1 + 60, "hi")]);

        assert!(canvas.ops().iter().any(|op| matches!(
            op,
            Op::Cell { text, align: Align::Center, fill: true } if text == "Thursday, December 5, 2024"
        )));
    }

    #[test]
    fn sorts_messages_by_timestamp() {
        let canvas = render(&[msg("UA", DAY1 + 120, "second"), msg("UA", DAY1 + 60, "first")]);

        let written = canvas.written();
        let first = written.iter().position(|t| *t == "first").unwrap();
        let second = written.iter().position(|t| *t == "second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn repeats_header_after_gap() {
        let canvas = render(&[
            msg("UA", DAY1 + 60, "one"),
            msg("UA", DAY1 + 60 + 11 * 60, "two"),
            msg("UA", DAY1 + 60 + 15 * 60, "three"),
        ]);

        assert_eq!(headers(&canvas), ["Ada", "Ada"]);
    }

    #[test]
    fn repeats_header_after_partial_minute_gap() {
        // 10 minutes 50 seconds is past the limit
        let canvas = render(&[msg("UA", DAY1 + 60, "one"), msg("UA", DAY1 + 710, "two")]);
        assert_eq!(headers(&canvas), ["Ada", "Ada"]);

        // Exactly 10 minutes is not
        let canvas = render(&[msg("UA", DAY1 + 60, "one"), msg("UA", DAY1 + 660, "two")]);
        assert_eq!(headers(&canvas), ["Ada"]);
    }

    #[test]
    fn sorts_malformed_timestamps_last() {
        let mut garbage = msg("UA", 0, "garbage");
        garbage.ts = "not-a-ts".into();
        let mut blank = msg("UA", 0, "blank");
        blank.ts = String::new();
        let canvas = render(&[
            msg("UA", DAY1 + 120, "second"),
            garbage,
            msg("UA", DAY1 + 60, "first"),
            blank,
            msg("UA", DAY1 + 90, "middle"),
        ]);

        let order: Vec<&str> = canvas
            .written()
            .into_iter()
            .filter(|t| ["first", "middle", "second", "garbage", "blank"].contains(t))
            .collect();
        assert_eq!(order, ["first", "middle", "second", "blank", "garbage"]);
        assert_eq!(separators(&canvas), 1);
    }

    #[test]
    fn repeats_header_on_new_page() {
        let mut canvas = RecordingCanvas::new().with_page_height(60.0);
        let messages: Vec<Message> = (0..12).map(|i| msg("UA", DAY1 + 60 + i, "line")).collect();
        render_with(&messages, &HashMap::new(), &mut canvas);

        let header_pages: Vec<u32> = canvas
            .ops()
            .iter()
            .filter_map(|op| match op {
                Op::Write { text, page, .. } if text == "Ada " => Some(*page),
                _ => None,
            })
            .collect();
        assert_eq!(header_pages, [1, 2]);
    }

    #[test]
    fn renders_thread_replies_indented_after_parent() {
        let mut parent = msg("UA", DAY1 + 60, "parent");
        parent.thread_ts = Some(parent.ts.clone());
        let mut replies = vec![parent.clone()];
        for (i, user) in ["UA", "UB", "UB"].into_iter().enumerate() {
            let mut reply = msg(user, DAY1 + 120 + i as i64, &format!("reply {i}"));
            reply.thread_ts = Some(parent.ts.clone());
            replies.push(reply);
        }
        let threads = HashMap::from([(parent.ts.clone(), replies)]);
        let after = msg("UB", DAY1 + 300, "after");

        let mut canvas = RecordingCanvas::new();
        let cursor = render_with(&[after, parent], &threads, &mut canvas);

        let written = canvas.written();
        assert_eq!(written.iter().filter(|t| **t == "parent").count(), 1);
        // Header reset before the first reply and after the last one
        assert_eq!(headers(&canvas), ["Ada", "Ada", "Bob", "Bob"]);

        let reply_margins: Vec<f32> = canvas
            .ops()
            .iter()
            .filter_map(|op| match op {
                Op::Write { text, margin, .. } if text.starts_with("reply") => Some(*margin),
                _ => None,
            })
            .collect();
        assert_eq!(reply_margins, [14.0, 14.0, 14.0]);
        assert_eq!(cursor.last_user.as_deref(), Some("UB"));
        assert_eq!(separators(&canvas), 1);
    }

    #[test]
    fn ignores_threads_of_non_parents() {
        let mut reply_only = msg("UA", DAY1 + 60, "not a parent");
        reply_only.thread_ts = Some("123.000000".into());
        let threads = HashMap::from([(
            reply_only.ts.clone(),
            vec![msg("UB", DAY1 + 90, "stray")],
        )]);

        let mut canvas = RecordingCanvas::new();
        render_with(&[reply_only], &threads, &mut canvas);

        assert!(!canvas.written().contains(&"stray"));
    }

    #[test]
    fn empty_channel_draws_single_placeholder() {
        let canvas = render(&[]);

        assert_eq!(canvas.written(), [EMPTY_CHANNEL]);
        assert_eq!(separators(&canvas), 0);
        assert!(canvas.ops().iter().any(|op| matches!(
            op,
            Op::Write { font, .. } if font.style == "I"
        )));
    }

    #[test]
    fn unresolvable_author_gets_placeholder() {
        let anonymous = Message {
            ts: format!("{}.000100", DAY1 + 60),
            text: Some("lost".into()),
            ..Message::default()
        };
        let canvas = render(&[anonymous, msg("UA", DAY1 + 90, "found")]);

        let written = canvas.written();
        assert!(written.contains(&UNPROCESSABLE_MESSAGE));
        assert!(!written.contains(&"lost"));
        assert_eq!(headers(&canvas), ["Ada"]);
    }

    #[test]
    fn bot_header_shows_app_marker_in_grey() {
        let bot = Message {
            ts: format!("{}.000100", DAY1 + 60),
            bot_id: Some("B1".into()),
            text: Some("deployed".into()),
            ..Message::default()
        };
        let canvas = render(&[bot]);

        assert_eq!(headers(&canvas), ["Deploy"]);
        assert!(canvas.ops().iter().any(|op| matches!(
            op,
            Op::Write { text, color, .. } if text == "App " && *color == Color::GREY
        )));
        assert_eq!(canvas.text_color(), Color::BLACK);
    }

    #[test]
    fn bot_username_overrides_bot_table() {
        let bot = Message {
            ts: format!("{}.000100", DAY1 + 60),
            bot_id: Some("B1".into()),
            username: Some("Q&amp;A".into()),
            ..Message::default()
        };
        let canvas = render(&[bot]);

        assert_eq!(headers(&canvas), ["Q&A"]);
    }

    #[test]
    fn file_comment_uses_comment_author() {
        let comment = Message {
            ts: format!("{}.000100", DAY1 + 60),
            subtype: Some("file_comment".into()),
            comment: Some(crate::parser::Comment {
                user: Some("UZ".into()),
            }),
            ..Message::default()
        };
        let canvas = render(&[comment]);

        assert_eq!(headers(&canvas), ["unknown_user_UZ"]);
    }

    #[test]
    fn renders_body_markup() {
        let canvas = render(&[msg("UA", DAY1 + 60, "hi *there*")]);

        assert!(canvas.ops().iter().any(|op| matches!(
            op,
            Op::Write { text, font, .. } if text == "there" && font.style == "B"
        )));
    }

    #[test]
    fn plain_messages_keep_markup_characters() {
        let mut plain = msg("UA", DAY1 + 60, "*not bold*");
        plain.mrkdwn = Some(false);
        let canvas = render(&[plain]);

        assert!(canvas.written().contains(&"*not bold*"));
    }

    #[test]
    fn debug_info_appends_timestamp() {
        let settings = Settings::default();
        let dates = Dates::new(&settings);
        let names = names();
        let mut engine =
            LayoutEngine::new(&settings, &dates, &names, LayoutOptions { debug_info: true });
        let mut canvas = RecordingCanvas::new();

        engine.write_messages(&mut canvas, &[msg("UA", DAY1 + 60, "hi")], &HashMap::new());

        let ts = format!("{}.000100]", DAY1 + 60);
        assert!(canvas.ops().iter().any(|op| matches!(
            op,
            Op::Write { text, font, .. } if *text == ts && font.family == "NotoSansMono"
        )));
    }
}
