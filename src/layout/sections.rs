// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Reactions, files, attachments and blocks below a message body.

use super::{LayoutEngine, set_margin};
use crate::canvas::Canvas;
use crate::parser::{Attachment, Message};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn re_document() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<document>(.+)</document>").expect("valid regex"))
}

fn re_paragraph() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<p>(.+)</p>").expect("valid regex"))
}

fn re_newline() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r?\n").expect("valid regex"))
}

/// Turns a file preview into tag markup.
fn preview_markup(preview: &str) -> String {
    let preview = re_document()
        .captures(preview)
        .and_then(|caps| caps.get(1))
        .map_or(preview, |m| m.as_str());
    let preview = re_paragraph().replace_all(preview, "$1<br>");
    re_newline().replace_all(&preview, "<br>").into_owned()
}

impl LayoutEngine<'_> {
    pub(super) fn write_reactions(&mut self, canvas: &mut dyn Canvas, msg: &Message, margin: f32) {
        if msg.reactions.is_empty() {
            return;
        }
        let tab = self.settings.tab_width;
        self.set_font(canvas, self.settings.font_size_normal, "");

        for reaction in &msg.reactions {
            set_margin(canvas, margin + tab);
            self.write_tags(canvas, &format!("[{}] ({}):", reaction.name, reaction.count));
            canvas.ln(None);

            set_margin(canvas, margin + 2.0 * tab);
            let users = reaction
                .users
                .iter()
                .map(|id| format!("<b>{}</b>", self.user_name(id)))
                .collect::<Vec<_>>()
                .join(", ");
            self.write_tags(canvas, &users);
            canvas.ln(None);
        }
        canvas.ln(Some(self.settings.line_height_small));
    }

    pub(super) fn write_files(&mut self, canvas: &mut dyn Canvas, msg: &Message, margin: f32) {
        if msg.files.is_empty() {
            return;
        }
        set_margin(canvas, margin + self.settings.tab_width);
        self.set_font(canvas, self.settings.font_size_normal, "");

        for file in &msg.files {
            self.write_tags(
                canvas,
                &format!("[{} file: <b>{}</b>]", file.pretty_type, file.name),
            );
            canvas.ln(None);
            if let Some(preview) = file.preview.as_deref().filter(|p| !p.is_empty()) {
                self.write_tags(canvas, &preview_markup(preview));
                canvas.ln(None);
            }
        }
        canvas.ln(Some(self.settings.line_height_small));
    }

    pub(super) fn write_attachments(&mut self, canvas: &mut dyn Canvas, msg: &Message, margin: f32) {
        if msg.attachments.is_empty() {
            return;
        }
        for attachment in &msg.attachments {
            self.write_attachment(canvas, attachment, margin);
        }
        canvas.ln(Some(self.settings.line_height_small));
    }

    fn write_attachment(&mut self, canvas: &mut dyn Canvas, attachment: &Attachment, margin: f32) {
        let settings = self.settings;
        let height = settings.line_height_default;

        if let Some(pretext) = &attachment.pretext {
            set_margin(canvas, margin);
            self.set_font(canvas, settings.font_size_normal, "");
            self.write_markup(canvas, pretext, attachment.markup_in("pretext"));
            canvas.ln(None);
        }

        set_margin(canvas, margin + settings.tab_width);
        canvas.ln(Some(settings.line_height_small));

        if let Some(author) = &attachment.author_name {
            self.set_font(canvas, settings.font_size_large, "B");
            let author = self.transformer.transform(author, false);
            canvas.write(height, &author, None);
            canvas.ln(None);
        }

        if let Some(title) = &attachment.title {
            self.set_font(canvas, settings.font_size_normal, "");
            let title = self.transformer.transform(title, attachment.markup_in("title"));
            let title = match &attachment.title_link {
                Some(link) => format!(r#"<a href="{link}">{title}</a>"#),
                None => title,
            };
            self.write_tags(canvas, &format!("<b>{title}</b>"));
            canvas.ln(None);
        }

        if let Some(text) = &attachment.text {
            self.set_font(canvas, settings.font_size_normal, "");
            self.write_markup(canvas, text, attachment.markup_in("text"));
            canvas.ln(None);
        }

        let fields_markup = attachment.markup_in("fields");
        for field in &attachment.fields {
            self.set_font(canvas, settings.font_size_normal, "B");
            let title = self.transformer.transform(&field.title, false);
            canvas.write(height, &title, None);
            canvas.ln(None);
            self.set_font(canvas, settings.font_size_normal, "");
            self.write_markup(canvas, &field.value, fields_markup);
            canvas.ln(None);
        }

        if let Some(footer) = &attachment.footer {
            self.set_font(canvas, settings.font_size_small, "");
            let mut text = self.transformer.transform(footer, false);
            if let Some(ts) = &attachment.ts {
                text.push('|');
                text.push_str(&self.dates.datetime_of_ts(ts));
            }
            canvas.write(height, &text, None);
            canvas.ln(None);
        }

        if let Some(url) = &attachment.image_url {
            self.set_font(canvas, settings.font_size_normal, "");
            self.write_tags(canvas, &format!(r#"<a href="{url}">[Image]</a>"#));
            canvas.ln(None);
        }

        if !attachment.actions.is_empty() {
            self.set_font(canvas, settings.font_size_small, "");
            for action in &attachment.actions {
                let text = self.transformer.transform(&action.text, false);
                self.write_tags(canvas, &format!("[{text}] "));
            }
            canvas.ln(None);
        }
    }

    pub(super) fn write_blocks(&mut self, canvas: &mut dyn Canvas, msg: &Message, margin: f32) {
        if msg.blocks.is_empty() {
            return;
        }
        set_margin(canvas, margin + self.settings.tab_width);
        self.set_font(canvas, self.settings.font_size_normal, "");

        for block in &msg.blocks {
            canvas.ln(Some(self.settings.line_height_small));
            if block.kind != "section" {
                debug!(kind = %block.kind, ts = %msg.ts, "skipping block");
                continue;
            }
            if let Some(text) = &block.text {
                self.write_markup(canvas, &text.text, text.is_markup());
                canvas.ln(None);
            }
            for field in &block.fields {
                self.write_markup(canvas, &field.text, field.is_markup());
                canvas.ln(None);
            }
        }
        canvas.ln(Some(self.settings.line_height_small));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Color, Op, RecordingCanvas};
    use crate::dates::Dates;
    use crate::layout::LayoutOptions;
    use crate::parser::{
        Action, AttachmentField, Block, File, NameTables, Reaction, TextObject,
    };
    use crate::settings::Settings;
    use std::collections::HashMap;

    fn render(msg: Message) -> RecordingCanvas {
        let settings = Settings::default();
        let dates = Dates::new(&settings);
        let mut names = NameTables::default();
        names.users.insert("UA".into(), "Ada".into());
        names.users.insert("UB".into(), "Bob".into());
        let mut engine = LayoutEngine::new(&settings, &dates, &names, LayoutOptions::default());
        let mut canvas = RecordingCanvas::new();
        engine.write_messages(&mut canvas, &[msg], &HashMap::new());
        canvas
    }

    fn message() -> Message {
        Message {
            ts: "1733356860.000100".into(),
            user: Some("UA".into()),
            ..Message::default()
        }
    }

    fn margin_of(canvas: &RecordingCanvas, needle: &str) -> Option<f32> {
        canvas.ops().iter().find_map(|op| match op {
            Op::Write { text, margin, .. } if text == needle => Some(*margin),
            _ => None,
        })
    }

    #[test]
    fn cleans_up_file_previews() {
        assert_eq!(
            preview_markup("<document><p>one</p>two\r\nthree</document>"),
            "one<br>two<br>three"
        );
        assert_eq!(preview_markup("plain\ntext"), "plain<br>text");
    }

    #[test]
    fn writes_reactions_with_user_names() {
        let mut msg = message();
        msg.reactions = vec![Reaction {
            name: "tada".into(),
            count: 2,
            users: vec!["UA".into(), "UX".into()],
        }];
        let canvas = render(msg);

        assert_eq!(margin_of(&canvas, "[tada] (2):"), Some(14.0));
        assert_eq!(margin_of(&canvas, "Ada"), Some(18.0));
        assert!(canvas.ops().iter().any(|op| matches!(
            op,
            Op::Write { text, font, .. } if text == "unknown_user_UX" && font.style == "B"
        )));
        assert!(canvas.written().contains(&", "));
    }

    #[test]
    fn writes_files_and_previews() {
        let mut msg = message();
        msg.files = vec![File {
            name: "notes.txt".into(),
            pretty_type: "Plain Text".into(),
            preview: Some("first\nsecond".into()),
        }];
        let canvas = render(msg);

        let written = canvas.written();
        assert!(written.contains(&"[Plain Text file: "));
        assert!(written.contains(&"notes.txt"));
        assert!(written.contains(&"first"));
        assert!(written.contains(&"second"));
    }

    #[test]
    fn writes_attachment_parts_in_order() {
        let mut msg = message();
        msg.attachments = vec![Attachment {
            pretext: Some("pre".into()),
            author_name: Some("Writer".into()),
            title: Some("Title".into()),
            title_link: Some("https://example.com/t".into()),
            text: Some("*body*".into()),
            fields: vec![AttachmentField {
                title: "Priority".into(),
                value: "*high*".into(),
            }],
            footer: Some("Tracker".into()),
            ts: Some("1733356800".into()),
            image_url: Some("https://example.com/i.png".into()),
            actions: vec![Action { text: "Ack".into() }],
            mrkdwn_in: vec!["fields".into()],
        }];
        let canvas = render(msg);

        let written = canvas.written();
        let order = [
            "pre",
            "Writer",
            "Title",
            "*body*",
            "Priority",
            "high",
            "Tracker|2024-12-05 00:00",
            "[Image]",
            "[Ack] ",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|needle| {
                written
                    .iter()
                    .position(|t| t == needle)
                    .unwrap_or_else(|| panic!("missing {needle}"))
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(margin_of(&canvas, "pre"), Some(10.0));
        assert_eq!(margin_of(&canvas, "Writer"), Some(14.0));
        assert!(canvas.ops().iter().any(|op| matches!(
            op,
            Op::Write { text, link, font, color, .. }
                if text == "Title"
                    && link.as_deref() == Some("https://example.com/t")
                    && font.style == "BU"
                    && *color == Color::LINK
        )));
        assert!(canvas.ops().iter().any(|op| matches!(
            op,
            Op::Write { text, font, .. } if text == "Writer" && font.size == 14.0
        )));
    }

    #[test]
    fn spaces_attachments_and_shrinks_actions() {
        let mut msg = message();
        msg.attachments = vec![
            Attachment {
                pretext: Some("pre".into()),
                actions: vec![Action { text: "Ack".into() }],
                ..Attachment::default()
            },
            Attachment {
                text: Some("second".into()),
                ..Attachment::default()
            },
        ];
        let canvas = render(msg);
        let ops = canvas.ops();

        // Small line feeds between a write and the next one
        let small_gaps_after = |after: &str| {
            ops.iter()
                .skip_while(|op| !matches!(op, Op::Write { text, .. } if text == after))
                .skip(1)
                .take_while(|op| !matches!(op, Op::Write { .. }))
                .filter(|op| matches!(op, Op::Ln { height: Some(h) } if *h == 2.0))
                .count()
        };
        assert_eq!(small_gaps_after("pre"), 1);
        assert_eq!(small_gaps_after("[Ack] "), 1);
        assert!(ops.iter().any(|op| matches!(
            op,
            Op::Write { text, font, .. } if text == "[Ack] " && font.size == 10.0
        )));
    }

    #[test]
    fn renders_only_section_blocks() {
        let mut msg = message();
        msg.blocks = vec![
            Block {
                kind: "divider".into(),
                ..Block::default()
            },
            Block {
                kind: "section".into(),
                text: Some(TextObject {
                    kind: "mrkdwn".into(),
                    text: "*headline*".into(),
                }),
                fields: vec![TextObject {
                    kind: "plain_text".into(),
                    text: "*as is*".into(),
                }],
            },
        ];
        let canvas = render(msg);

        assert!(canvas.ops().iter().any(|op| matches!(
            op,
            Op::Write { text, font, margin, .. }
                if text == "headline" && font.style == "B" && *margin == 14.0
        )));
        assert!(canvas.written().contains(&"*as is*"));
    }
}
