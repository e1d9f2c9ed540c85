// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! JSON parsing for chat channel exports.
//!
//! An export bundles everything the layout needs for one channel: the
//! top-level messages, the replies of every thread, and the lookup tables
//! that turn user, channel, usergroup and bot ids into display names.
//!
//! # Format Overview
//!
//! - `team`, `channel`, `author`: strings shown on the title page
//! - `users`, `channels`, `usergroups`, `bots`: id to name maps
//! - `messages`: the channel history as returned by the chat service
//! - `threads`: replies keyed by the thread's `thread_ts`
//!
//! Message records are lenient: only `ts` is required and unknown fields are
//! ignored, so records straight from the chat service decode unchanged.
//!
//! # Example
//!
//! ```
//! use chatpages::parser::parse_export;
//!
//! let json = r#"{
//!     "team": "Acme",
//!     "channel": "general",
//!     "users": { "U1": "Ada" },
//!     "messages": [{ "ts": "1733356800.000100", "user": "U1", "text": "Hi" }]
//! }"#;
//!
//! let export = parse_export(json).unwrap();
//! assert_eq!(export.messages.len(), 1);
//! assert_eq!(export.names.users["U1"], "Ada");
//! ```

use serde::Deserialize;
use snafu::prelude::*;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Error type for JSON parsing failures.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// Failed to parse JSON content.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },
}

/// Id to display name lookup tables.
///
/// Passed explicitly to the markup transformer and the layout engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NameTables {
    /// User id to display name.
    pub users: HashMap<String, String>,
    /// Channel id to channel name.
    pub channels: HashMap<String, String>,
    /// Usergroup id to handle.
    pub usergroups: HashMap<String, String>,
    /// Bot id to bot name.
    pub bots: HashMap<String, String>,
}

/// The root structure of a channel export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelExport {
    /// Workspace name.
    pub team: String,

    /// Channel name.
    pub channel: String,

    /// Who ran the export.
    pub author: String,

    /// Name lookups for every id that can appear in the messages.
    #[serde(flatten)]
    pub names: NameTables,

    /// Top-level channel messages, in any order.
    pub messages: Vec<Message>,

    /// Thread messages keyed by `thread_ts`, usually including the parent.
    pub threads: HashMap<String, Vec<Message>>,
}

impl ChannelExport {
    /// Number of messages including thread replies.
    ///
    /// Each thread list carries a copy of its parent, which is already
    /// counted among the top-level messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
            + self
                .threads
                .values()
                .map(|replies| replies.len().saturating_sub(1))
                .sum::<usize>()
    }

    /// Number of threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Keeps top-level messages within `[oldest, latest]` (epoch seconds) and
    /// at most the `max` newest of them.
    ///
    /// Threads whose parent was dropped are dropped as well.
    pub fn retain_between(&mut self, oldest: Option<f64>, latest: Option<f64>, max: Option<usize>) {
        self.messages.retain(|msg| {
            let Some(ts) = msg.ts_seconds() else {
                return true;
            };
            oldest.is_none_or(|oldest| ts >= oldest) && latest.is_none_or(|latest| ts <= latest)
        });

        if let Some(max) = max
            && self.messages.len() > max
        {
            self.messages.sort_by(|a, b| {
                a.ts_seconds()
                    .partial_cmp(&b.ts_seconds())
                    .unwrap_or(Ordering::Equal)
            });
            let excess = self.messages.len() - max;
            self.messages.drain(..excess);
        }

        let kept: HashSet<&str> = self.messages.iter().map(|m| m.ts.as_str()).collect();
        self.threads.retain(|thread_ts, _| kept.contains(thread_ts.as_str()));
    }
}

/// A single chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Message {
    /// Unique, monotonically increasing timestamp, e.g. `"1733356800.000100"`.
    pub ts: String,

    /// Author user id.
    #[serde(default)]
    pub user: Option<String>,

    /// Author bot id, for messages posted by integrations.
    #[serde(default)]
    pub bot_id: Option<String>,

    /// Display name override sent by bots.
    #[serde(default)]
    pub username: Option<String>,

    /// Message subtype such as `file_comment`.
    #[serde(default)]
    pub subtype: Option<String>,

    /// Comment payload of `file_comment` messages.
    #[serde(default)]
    pub comment: Option<Comment>,

    /// Message text in mrkdwn.
    #[serde(default)]
    pub text: Option<String>,

    /// Whether `text` contains markup. Absent means yes.
    #[serde(default)]
    pub mrkdwn: Option<bool>,

    /// Timestamp of the thread's parent; equals `ts` on the parent itself.
    #[serde(default)]
    pub thread_ts: Option<String>,

    /// Legacy attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Layout blocks.
    #[serde(default)]
    pub blocks: Vec<Block>,

    /// Emoji reactions.
    #[serde(default)]
    pub reactions: Vec<Reaction>,

    /// Shared files.
    #[serde(default)]
    pub files: Vec<File>,
}

impl Message {
    /// Whether this message starts a thread.
    #[must_use]
    pub fn is_thread_parent(&self) -> bool {
        self.thread_ts.as_deref() == Some(self.ts.as_str())
    }

    /// Whether the text should be read as markup.
    #[must_use]
    pub fn uses_markup(&self) -> bool {
        self.mrkdwn.unwrap_or(true)
    }

    /// The timestamp as epoch seconds.
    #[must_use]
    pub fn ts_seconds(&self) -> Option<f64> {
        self.ts.trim().parse().ok()
    }
}

/// Comment attached to a `file_comment` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Comment {
    /// Commenting user id.
    pub user: Option<String>,
}

/// A legacy message attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Attachment {
    /// Text shown above the attachment body.
    pub pretext: Option<String>,
    /// Author line.
    pub author_name: Option<String>,
    /// Title line.
    pub title: Option<String>,
    /// Link target of the title.
    pub title_link: Option<String>,
    /// Main attachment text.
    pub text: Option<String>,
    /// Title/value pairs.
    pub fields: Vec<AttachmentField>,
    /// Footer line.
    pub footer: Option<String>,
    /// Footer timestamp, numeric or string on the wire.
    #[serde(deserialize_with = "lenient_ts")]
    pub ts: Option<String>,
    /// Image shown in the attachment.
    pub image_url: Option<String>,
    /// Interactive buttons.
    pub actions: Vec<Action>,
    /// Names of the fields whose text contains markup.
    pub mrkdwn_in: Vec<String>,
}

impl Attachment {
    /// Whether `field` is listed in `mrkdwn_in`.
    #[must_use]
    pub fn markup_in(&self, field: &str) -> bool {
        self.mrkdwn_in.iter().any(|f| f == field)
    }
}

/// One title/value pair of an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AttachmentField {
    /// Field label.
    pub title: String,
    /// Field value.
    pub value: String,
}

/// A button in an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Action {
    /// Button label.
    pub text: String,
}

/// A layout block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Block {
    /// Block type such as `section`, `divider` or `actions`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Main text of a section.
    pub text: Option<TextObject>,
    /// Additional section texts.
    pub fields: Vec<TextObject>,
}

/// A block text object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TextObject {
    /// `mrkdwn` or `plain_text`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The text.
    pub text: String,
}

impl TextObject {
    /// Whether the text contains markup.
    #[must_use]
    pub fn is_markup(&self) -> bool {
        self.kind == "mrkdwn"
    }
}

/// An emoji reaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Reaction {
    /// Emoji name without colons.
    pub name: String,
    /// Number of users who reacted.
    pub count: u32,
    /// Reacting user ids.
    pub users: Vec<String>,
}

/// A shared file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct File {
    /// File name.
    pub name: String,
    /// Human readable type, e.g. `PDF`.
    pub pretty_type: String,
    /// Text preview, possibly wrapped in `<document>` and `<p>` tags.
    pub preview: Option<String>,
}

/// Accepts a timestamp written either as a JSON string or a number.
fn lenient_ts<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Parses a JSON string into a [`ChannelExport`].
///
/// # Errors
///
/// Returns an error if the JSON is malformed or a message lacks its `ts`.
///
/// # Example
///
/// ```
/// use chatpages::parser::parse_export;
///
/// let export = parse_export(r#"{ "channel": "random" }"#).unwrap();
/// assert_eq!(export.channel, "random");
/// assert!(export.messages.is_empty());
/// ```
pub fn parse_export(json_str: &str) -> Result<ChannelExport, ParseError> {
    serde_json::from_str(json_str).context(JsonSnafu)
}
