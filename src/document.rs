// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Whole-document assembly: title page, info table, then the messages.

use crate::canvas::{Align, Canvas};
use crate::dates::Dates;
use crate::layout::{LayoutEngine, LayoutOptions};
use crate::parser::ChannelExport;
use crate::settings::Settings;
use crate::text_canvas::PAGE_COUNT_ALIAS;
use chrono::{DateTime, FixedOffset};
use tracing::info;

/// Subtitle under the document title.
pub const SUBTITLE: &str = "Chat channel export";

const INFO_KEY_WIDTH: f32 = 50.0;
const INFO_ROW_HEIGHT: f32 = 10.0;

/// Per-export values that do not come from the export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Shown as "Exported at" on the title page.
    pub exported_at: DateTime<FixedOffset>,
    /// Passed through to the layout engine.
    pub layout: LayoutOptions,
}

/// Counts reported after a document was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    /// Messages including thread replies.
    pub messages: usize,
    /// Threads.
    pub threads: usize,
    /// Pages written.
    pub pages: u32,
}

/// Title shown on the first page and on top of every page.
#[must_use]
pub fn document_title(export: &ChannelExport) -> String {
    format!("{} / {}", export.team, export.channel)
}

/// Rows of the info table on the title page.
#[must_use]
pub fn info_table(
    export: &ChannelExport,
    dates: &Dates,
    exported_at: &DateTime<FixedOffset>,
) -> Vec<(&'static str, String)> {
    let stamps: Vec<DateTime<FixedOffset>> = export
        .messages
        .iter()
        .filter_map(|msg| dates.parse_ts(&msg.ts))
        .collect();
    let start = stamps.iter().min().map(|dt| dates.datetime(dt)).unwrap_or_default();
    let end = stamps.iter().max().map(|dt| dates.datetime(dt)).unwrap_or_default();

    vec![
        ("Workspace", export.team.clone()),
        ("Channel", export.channel.clone()),
        ("Exported at", dates.datetime(exported_at)),
        ("Exported by", export.author.clone()),
        ("Start date", start),
        ("End date", end),
        ("Timezone", dates.timezone_label()),
        ("Messages", export.message_count().to_string()),
        ("Threads", export.thread_count().to_string()),
        ("Pages", PAGE_COUNT_ALIAS.to_owned()),
    ]
}

/// Writes the whole document for `export` onto `canvas`.
///
/// The canvas is expected to be on its first, empty page.
pub fn write_document(
    canvas: &mut dyn Canvas,
    export: &ChannelExport,
    settings: &Settings,
    options: &DocumentOptions,
) -> ExportSummary {
    let dates = Dates::new(settings);
    let family = settings.font_family.as_str();
    let height = settings.line_height_default;

    canvas.set_font(family, settings.font_size_large, "B");
    canvas.cell(0.0, 0.0, &document_title(export), Align::Center, false);
    canvas.ln(Some(height));

    canvas.set_font(family, settings.font_size_normal, "B");
    canvas.cell(0.0, 0.0, SUBTITLE, Align::Center, false);
    canvas.ln(Some(height));

    for (key, value) in info_table(export, &dates, &options.exported_at) {
        canvas.set_font(family, settings.font_size_normal, "B");
        canvas.cell(INFO_KEY_WIDTH, INFO_ROW_HEIGHT, key, Align::Left, false);
        canvas.set_font(family, settings.font_size_normal, "");
        canvas.cell(0.0, INFO_ROW_HEIGHT, &value, Align::Left, false);
        canvas.ln(None);
    }
    canvas.add_page();

    let mut engine = LayoutEngine::new(settings, &dates, &export.names, options.layout);
    engine.write_messages(canvas, &export.messages, &export.threads);

    let summary = ExportSummary {
        messages: export.message_count(),
        threads: export.thread_count(),
        pages: canvas.page_no(),
    };
    info!(
        channel = %export.channel,
        messages = summary.messages,
        threads = summary.threads,
        pages = summary.pages,
        "document written"
    );
    summary
}
