// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Layout and formatting settings.
//!
//! All lengths are in millimetres and all font sizes in points, matching the
//! units the canvas backends work in. Every field has a default, so a
//! settings file only needs to name the values it changes:
//!
//! ```
//! use chatpages::settings::Settings;
//!
//! let settings = Settings::from_json(r#"{ "tab_width": 6.0 }"#).unwrap();
//! assert_eq!(settings.tab_width, 6.0);
//! assert_eq!(settings.font_family, "NotoSans");
//! ```

use serde::Deserialize;
use snafu::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Error type for loading settings.
#[derive(Debug, Snafu)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[snafu(display("failed to read settings {}: {source}", path.display()))]
    Read {
        /// Path of the settings file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not valid JSON or has mistyped values.
    #[snafu(display("invalid settings: {source}"))]
    Decode {
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Paper size of the generated pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    /// 297 x 420 mm.
    A3,
    /// 210 x 297 mm.
    #[default]
    A4,
    /// 148 x 210 mm.
    A5,
    /// 8.5 x 11 in.
    Letter,
    /// 8.5 x 14 in.
    Legal,
}

impl PageFormat {
    /// Width and height in millimetres, portrait.
    #[must_use]
    pub const fn size_mm(self) -> (f32, f32) {
        match self {
            Self::A3 => (297.0, 420.0),
            Self::A4 => (210.0, 297.0),
            Self::A5 => (148.0, 210.0),
            Self::Letter => (215.9, 279.4),
            Self::Legal => (215.9, 355.6),
        }
    }
}

impl FromStr for PageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a3" => Ok(Self::A3),
            "a4" => Ok(Self::A4),
            "a5" => Ok(Self::A5),
            "letter" => Ok(Self::Letter),
            "legal" => Ok(Self::Legal),
            other => Err(format!("unknown page format: {other}")),
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::A3 => "A3",
            Self::A4 => "A4",
            Self::A5 => "A5",
            Self::Letter => "Letter",
            Self::Legal => "Legal",
        };
        f.write_str(name)
    }
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Taller than wide.
    #[default]
    Portrait,
    /// Wider than tall.
    Landscape,
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" => Ok(Self::Portrait),
            "landscape" => Ok(Self::Landscape),
            other => Err(format!("unknown page orientation: {other}")),
        }
    }
}

/// Settings shared by the layout engine, the tag interpreter and the canvas.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Font family for regular text.
    pub font_family: String,
    /// Font family used for inline code spans.
    pub font_family_mono: String,
    /// Body text size in points.
    pub font_size_normal: f32,
    /// Size for titles and attachment authors.
    pub font_size_large: f32,
    /// Size for timestamps, footers and actions.
    pub font_size_small: f32,
    /// Height of one line of text.
    pub line_height_default: f32,
    /// Gap used between sections.
    pub line_height_small: f32,
    /// Vertical advance of an explicit `<br>`.
    pub line_break_height: f32,
    /// Left page margin.
    pub margin_left: f32,
    /// One indentation unit for threads, sub-sections and blockquotes.
    pub tab_width: f32,
    /// Gap after which a user's header is repeated even without a user switch.
    pub minutes_until_username_repeats: i64,
    /// Paper size.
    pub page_format: PageFormat,
    /// Portrait or landscape.
    pub page_orientation: Orientation,
    /// Offset from UTC used for every displayed date, in minutes.
    pub utc_offset_minutes: i32,
    /// `chrono` pattern for day separators.
    pub date_format_full: String,
    /// `chrono` pattern for dates embedded in messages and the info table.
    pub datetime_format: String,
    /// `chrono` pattern for message header times.
    pub time_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font_family: "NotoSans".into(),
            font_family_mono: "NotoSansMono".into(),
            font_size_normal: 12.0,
            font_size_large: 14.0,
            font_size_small: 10.0,
            line_height_default: 6.0,
            line_height_small: 2.0,
            line_break_height: 5.0,
            margin_left: 10.0,
            tab_width: 4.0,
            minutes_until_username_repeats: 10,
            page_format: PageFormat::A4,
            page_orientation: Orientation::Portrait,
            utc_offset_minutes: 0,
            date_format_full: "%A, %B %-d, %Y".into(),
            datetime_format: "%Y-%m-%d %H:%M".into(),
            time_format: "%H:%M".into(),
        }
    }
}

impl Settings {
    /// Parses settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        serde_json::from_str(json).context(DecodeSnafu)
    }

    /// Reads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not decode.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        Self::from_json(&json)
    }

    /// Page width and height in millimetres after applying the orientation.
    #[must_use]
    pub const fn page_size(&self) -> (f32, f32) {
        let (w, h) = self.page_format.size_mm();
        match self.page_orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let settings = Settings::from_json(
            r#"{ "font_family_mono": "Courier", "page_format": "letter" }"#,
        )
        .unwrap();

        assert_eq!(settings.font_family_mono, "Courier");
        assert_eq!(settings.page_format, PageFormat::Letter);
        assert_eq!(settings.tab_width, 4.0);
    }

    #[test]
    fn landscape_swaps_page_dimensions() {
        let settings = Settings {
            page_orientation: Orientation::Landscape,
            ..Settings::default()
        };
        assert_eq!(settings.page_size(), (297.0, 210.0));
    }

    #[test]
    fn parses_page_format_case_insensitively() {
        assert_eq!("A3".parse::<PageFormat>(), Ok(PageFormat::A3));
        assert_eq!("legal".parse::<PageFormat>(), Ok(PageFormat::Legal));
        assert!("b5".parse::<PageFormat>().is_err());
    }

    #[test]
    fn rejects_mistyped_values() {
        let result = Settings::from_json(r#"{ "tab_width": "wide" }"#);
        assert!(matches!(result, Err(SettingsError::Decode { .. })));
    }

    #[test]
    fn reports_missing_file() {
        let result = Settings::from_file(Path::new("/nonexistent/settings.json"));
        assert!(matches!(result, Err(SettingsError::Read { .. })));
    }
}
