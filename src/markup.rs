// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Conversion of chat mrkdwn into the constrained tag markup.
//!
//! The output uses a small HTML-like vocabulary that the
//! [`TagInterpreter`](crate::interpreter::TagInterpreter) understands:
//! `<b>`, `<i>`, `<u>`, `<a href="...">`, `<br>`, `<blockquote>` and the
//! custom-font span `<s fontfamily="..." size="..." style="...">`.
//!
//! Transformation runs in three passes:
//!
//! 1. HTML entities are unescaped and tabs become four spaces.
//! 2. Every `<...>` reference is resolved: user, channel and usergroup
//!    mentions, special mentions, date directives and links.
//! 3. Inline formatting: `*bold*`, `_italic_`, `` `code` ``, `>` quotes
//!    and line breaks.
//!
//! Passes 2 and 3 only run when markup is enabled for the text. Bold and
//! italic spans are matched greedily within a line, so `*a*b*c*` pairs the
//! first and the last asterisk.
//!
//! # Example
//!
//! ```
//! use chatpages::markup::MarkupTransformer;
//! use chatpages::parser::NameTables;
//!
//! let mut names = NameTables::default();
//! names.users.insert("U1".into(), "Ada".into());
//! let format_date = |secs: f64| format!("{secs}");
//!
//! let transformer = MarkupTransformer::new(&names, &format_date, "Mono");
//! assert_eq!(
//!     transformer.transform("hi <@U1>, see *this*", true),
//!     "hi <b>@Ada</b>, see <b>this</b>"
//! );
//! ```

use crate::dates::{DATE_PARSE_FAILURE, FormatTimestamp};
use crate::parser::NameTables;
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn re_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(.*?)>").expect("valid regex"))
}

fn re_usergroup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^!subteam\^(S[A-Z0-9]+)").expect("valid regex"))
}

fn re_bold() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*(.+)\*").expect("valid regex"))
}

fn re_italic() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b_(.+)_\b").expect("valid regex"))
}

fn re_code() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`(.*)`").expect("valid regex"))
}

fn re_quote() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^>(.+)").expect("valid regex"))
}

/// Undoes HTML escaping and expands tabs.
///
/// Applied to every text, markup or not. Named entities need their closing
/// semicolon: `&copy;` decodes, a bare `&copy` stays as written.
#[must_use]
pub fn normalize_encoding(text: &str) -> String {
    html_escape::decode_html_entities(text).replace('\t', "    ")
}

/// How a resolved reference is emphasised.
enum Emphasis {
    Bold,
    Plain,
}

/// Turns chat mrkdwn into tag markup.
///
/// Holds only borrowed, read-only inputs, so one transformer can be shared
/// by every field of a document.
pub struct MarkupTransformer<'a> {
    names: &'a NameTables,
    dates: &'a dyn FormatTimestamp,
    mono_family: &'a str,
}

impl<'a> MarkupTransformer<'a> {
    /// Creates a transformer.
    ///
    /// `mono_family` is the font family named by code spans.
    #[must_use]
    pub fn new(names: &'a NameTables, dates: &'a dyn FormatTimestamp, mono_family: &'a str) -> Self {
        Self {
            names,
            dates,
            mono_family,
        }
    }

    /// Transforms `text`, resolving references and formatting only when
    /// `use_markup` is set. Never fails; unknown ids degrade to labelled
    /// placeholders.
    #[must_use]
    pub fn transform(&self, text: &str, use_markup: bool) -> String {
        let result = normalize_encoding(text);
        if !use_markup {
            return result;
        }

        let result = re_reference().replace_all(&result, |caps: &Captures| {
            self.resolve_reference(&caps[1])
        });

        let result = re_bold().replace_all(&result, "<b>$1</b>");
        let result = re_italic().replace_all(&result, "<i>$1</i>");
        let result = re_code().replace_all(&result, |caps: &Captures| {
            format!(r#"<s fontfamily="{}">{}</s>"#, self.mono_family, &caps[1])
        });
        let result = re_quote().replace_all(&result, "<blockquote>$1</blockquote>");

        result
            .replace("</blockquote><br>", "</blockquote>")
            .replace('\n', "<br>")
    }

    /// Replacement for the inside of one `<...>` reference.
    fn resolve_reference(&self, inner: &str) -> String {
        let id = inner.get(1..).unwrap_or_default();
        let id = id.split_once('|').map_or(id, |(id, _)| id);

        let (emphasis, text) = if inner.starts_with("@U") || inner.starts_with("@W") {
            (Emphasis::Bold, self.user_mention(id))
        } else if inner.starts_with("#C") {
            (Emphasis::Bold, self.channel_mention(id))
        } else if inner.starts_with("!subteam^") {
            (Emphasis::Bold, self.usergroup_mention(inner))
        } else if let Some(directive) = inner.strip_prefix('!') {
            self.special_mention(directive, id)
        } else {
            (Emphasis::Plain, link(inner))
        };

        match emphasis {
            Emphasis::Bold => format!("<b>{text}</b>"),
            Emphasis::Plain => text,
        }
    }

    fn user_mention(&self, id: &str) -> String {
        self.names
            .users
            .get(id)
            .map_or_else(|| format!("@user_{id}"), |name| format!("@{name}"))
    }

    fn channel_mention(&self, id: &str) -> String {
        self.names
            .channels
            .get(id)
            .map_or_else(|| format!("#channel_{id}"), |name| format!("#{name}"))
    }

    fn usergroup_mention(&self, inner: &str) -> String {
        let name = match re_usergroup().captures(inner) {
            Some(caps) => {
                let id = &caps[1];
                self.names
                    .usergroups
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| format!("usergroup_{id}"))
            }
            None => "usergroup_unknown".to_owned(),
        };
        format!("@{name}")
    }

    fn special_mention(&self, directive: &str, id: &str) -> (Emphasis, String) {
        match id {
            "here" | "channel" | "everyone" => (Emphasis::Bold, format!("@{id}")),
            _ if directive.starts_with("date") => (Emphasis::Plain, self.date(directive)),
            _ => (Emphasis::Bold, format!("@special_{id}")),
        }
    }

    /// `date^<epoch>^<format>|<fallback>`; only the epoch is used.
    fn date(&self, directive: &str) -> String {
        directive
            .split('^')
            .nth(1)
            .and_then(|secs| secs.trim().parse::<f64>().ok())
            .map_or_else(
                || DATE_PARSE_FAILURE.to_owned(),
                |secs| self.dates.format_timestamp(secs),
            )
    }
}

/// `url` or `url|text` as an anchor.
fn link(inner: &str) -> String {
    let mut parts = inner.split('|');
    let (url, text) = match (parts.next(), parts.next(), parts.next()) {
        (Some(url), Some(text), None) => (url, text),
        _ => (inner, inner),
    };
    format!(r#"<a href="{url}">{text}</a>"#)
}
