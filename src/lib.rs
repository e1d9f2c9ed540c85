// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Lay out chat channel exports as paginated documents.
//!
//! This crate turns a channel export (messages, threads and the name tables
//! needed to resolve mentions) into a paginated document with per-day
//! separators, author headers and indented threads.
//!
//! # Overview
//!
//! Every text-bearing field passes through two stages:
//!
//! 1. [`markup::MarkupTransformer`] rewrites the chat service's lightweight
//!    markup (`*bold*`, `_italic_`, `` `code` ``, `>quote`, `<@U123>`
//!    references) into a small tag language (`<b>`, `<i>`, `<u>`, `<a>`,
//!    `<br>`, `<blockquote>`, `<s>`).
//! 2. [`interpreter::TagInterpreter`] reads the tags and drives a
//!    [`canvas::Canvas`], keeping style state across calls.
//!
//! [`layout::LayoutEngine`] decides where messages, headers and separators go,
//! and [`document::write_document`] adds the title page.
//!
//! # Example
//!
//! ```no_run
//! use chatpages::{document, parser, settings::Settings, text_canvas::TextCanvas};
//! use chrono::Utc;
//!
//! let json = std::fs::read_to_string("general.json").unwrap();
//! let export = parser::parse_export(&json).unwrap();
//! let settings = Settings::default();
//!
//! let mut canvas = TextCanvas::new(&settings).with_title(&document::document_title(&export));
//! let options = document::DocumentOptions {
//!     exported_at: Utc::now().fixed_offset(),
//!     layout: Default::default(),
//! };
//! document::write_document(&mut canvas, &export, &settings, &options);
//! println!("{}", canvas.finish());
//! ```
//!
//! # Modules
//!
//! - [`parser`]: JSON parsing and type definitions for channel exports
//! - [`settings`]: layout settings and their JSON configuration file
//! - [`dates`]: timestamp parsing and date formatting
//! - [`markup`]: chat markup to tag markup
//! - [`interpreter`]: tag markup to canvas calls
//! - [`canvas`]: the drawing boundary and a recording implementation
//! - [`text_canvas`]: paginated plain-text output
//! - [`layout`]: message layout
//! - [`document`]: title page and whole-document assembly

#![deny(missing_docs)]

pub mod canvas;
pub mod dates;
pub mod document;
pub mod interpreter;
pub mod layout;
pub mod markup;
pub mod parser;
pub mod settings;
pub mod text_canvas;
