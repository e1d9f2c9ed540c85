// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Command-line interface for chatpages.
//!
//! This binary provides the `chatpages` command for laying out chat channel
//! exports as paginated text documents.

use chatpages::canvas::RecordingCanvas;
use chatpages::dates::Dates;
use chatpages::document::{self, DocumentOptions};
use chatpages::layout::LayoutOptions;
use chatpages::parser::{self, ChannelExport};
use chatpages::settings::{Orientation, PageFormat, Settings, SettingsError};
use chatpages::text_canvas::TextCanvas;
use chrono::{FixedOffset, NaiveDate, NaiveTime, Utc};
use lexopt::prelude::*;
use snafu::{OptionExt, ensure, prelude::*};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Where to write the rendered output.
#[derive(Clone)]
enum OutputTarget {
    /// Write each file to the specified directory.
    Directory(PathBuf),
    /// Write to stdout.
    Stdout,
}

#[allow(clippy::struct_excessive_bools)]
struct Cli {
    input: Vec<PathBuf>,
    output: OutputTarget,
    config: Option<PathBuf>,
    page_format: Option<PageFormat>,
    page_orientation: Option<Orientation>,
    utc_offset_minutes: Option<i32>,
    oldest: Option<NaiveDate>,
    latest: Option<NaiveDate>,
    max_messages: Option<usize>,
    debug_info: bool,
    trace: bool,
    quiet: bool,
    dry_run: bool,
    force: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("{source}"))]
    LoadSettings { source: SettingsError },

    #[snafu(display("--oldest must not be after --latest"))]
    InvalidDateRange,

    #[snafu(display("at least one input file or directory is required"))]
    NoInputFiles,

    #[snafu(display("cannot output multiple files to stdout"))]
    MultipleFilesToStdout,

    #[snafu(display("failed to create output directory: {source}"))]
    CreateOutputDir { source: std::io::Error },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: parser::ParseError,
    },

    #[snafu(display("invalid input filename: no file stem"))]
    InvalidFilename,

    #[snafu(display("failed to serialize trace: {source}"))]
    SerializeTrace { source: serde_json::Error },

    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn print_help() {
    println!(
        "\
{name} {version}
Lay out chat channel exports as paginated documents

Usage: {name} [OPTIONS] -o <OUTPUT> <INPUT>...

Arguments:
  <INPUT>...  Input JSON files or directories containing exports

Options:
  -o, --output <OUTPUT>         Output directory (or - for stdout)
      --config <FILE>           Read layout settings from a JSON file

Layout (overrides the settings file):
      --page-format <FORMAT>    a3, a4, a5, letter or legal (default: a4)
      --page-orientation <O>    portrait or landscape (default: portrait)
      --utc-offset <+HH:MM>     Show dates at this offset from UTC (default: +00:00)

Selection:
      --oldest <YYYY-MM-DD>     Skip messages before this day
      --latest <YYYY-MM-DD>     Skip messages after this day
      --max-messages <N>        Keep only the N newest messages

Output:
      --debug-info              Append each message's raw timestamp
      --trace                   Write canvas operations as JSON lines instead

Other options:
  -q, --quiet                   Suppress progress messages
  -n, --dry-run                 Show what would be processed without writing
  -f, --force                   Overwrite existing output files
  -h, --help                    Print help
  -V, --version                 Print version

Logging is controlled by RUST_LOG (default: {name}=info).",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
    );
}

/// Parses `+HH:MM`, `-HH:MM` or `HH:MM` into minutes east of UTC.
fn parse_utc_offset(value: &str) -> Result<i32, String> {
    let invalid = || format!("invalid UTC offset {value:?}, expected +HH:MM");
    let (sign, rest) = match value.as_bytes().first() {
        Some(b'-') => (-1, &value[1..]),
        Some(b'+') => (1, &value[1..]),
        _ => (1, value),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(invalid());
    }
    Ok(sign * (hours * 60 + minutes))
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid date {value:?}, expected YYYY-MM-DD"))
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    // Show help if no arguments provided
    if std::env::args().len() == 1 {
        print_help();
        std::process::exit(0);
    }

    let mut input = Vec::new();
    let mut output: Option<OutputTarget> = None;
    let mut config = None;
    let mut page_format = None;
    let mut page_orientation = None;
    let mut utc_offset_minutes = None;
    let mut oldest = None;
    let mut latest = None;
    let mut max_messages = None;
    let mut debug_info = false;
    let mut trace = false;
    let mut quiet = false;
    let mut dry_run = false;
    let mut force = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output") => {
                let val: PathBuf = parser.value()?.parse()?;
                output = Some(if val == Path::new("-") {
                    OutputTarget::Stdout
                } else {
                    OutputTarget::Directory(val)
                });
            }
            Long("config") => config = Some(parser.value()?.parse()?),
            Long("page-format") => {
                page_format = Some(parser.value()?.string()?.parse::<PageFormat>()?);
            }
            Long("page-orientation") => {
                page_orientation = Some(parser.value()?.string()?.parse::<Orientation>()?);
            }
            Long("utc-offset") => {
                utc_offset_minutes = Some(parse_utc_offset(&parser.value()?.string()?)?);
            }
            Long("oldest") => oldest = Some(parse_date(&parser.value()?.string()?)?),
            Long("latest") => latest = Some(parse_date(&parser.value()?.string()?)?),
            Long("max-messages") => {
                let val: usize = parser
                    .value()?
                    .parse()
                    .map_err(|_| "max-messages must be a positive number")?;
                if val == 0 {
                    return Err("max-messages must be a positive number".into());
                }
                max_messages = Some(val);
            }
            Long("debug-info") => debug_info = true,
            Long("trace") => trace = true,
            Short('q') | Long("quiet") => quiet = true,
            Short('n') | Long("dry-run") => dry_run = true,
            Short('f') | Long("force") => force = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) => input.push(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Cli {
        input,
        output: output.ok_or("missing required option: --output")?,
        config,
        page_format,
        page_orientation,
        utc_offset_minutes,
        oldest,
        latest,
        max_messages,
        debug_info,
        trace,
        quiet,
        dry_run,
        force,
    })
}

fn init_logging(quiet: bool) {
    let default = if quiet {
        concat!(env!("CARGO_PKG_NAME"), "=warn")
    } else {
        concat!(env!("CARGO_PKG_NAME"), "=info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;
    init_logging(cli.quiet);

    ensure!(!cli.input.is_empty(), NoInputFilesSnafu);
    if let (Some(oldest), Some(latest)) = (cli.oldest, cli.latest) {
        ensure!(oldest <= latest, InvalidDateRangeSnafu);
    }

    let settings = load_settings(&cli)?;
    debug!(?settings, "settings loaded");

    // Collect all input files first
    let files = collect_input_files(&cli.input);

    match &cli.output {
        OutputTarget::Stdout => {
            ensure!(files.len() == 1, MultipleFilesToStdoutSnafu);
            process_to_stdout(&files[0], &settings, &cli)?;
        }
        OutputTarget::Directory(dir) => {
            if !cli.dry_run {
                std::fs::create_dir_all(dir).context(CreateOutputDirSnafu)?;
            }
            for file in &files {
                process_file(file, dir, &settings, &cli)?;
            }
        }
    }

    Ok(())
}

/// Reads the settings file, if any, and applies command-line overrides.
fn load_settings(cli: &Cli) -> Result<Settings, Error> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path).context(LoadSettingsSnafu)?,
        None => Settings::default(),
    };
    if let Some(format) = cli.page_format {
        settings.page_format = format;
    }
    if let Some(orientation) = cli.page_orientation {
        settings.page_orientation = orientation;
    }
    if let Some(minutes) = cli.utc_offset_minutes {
        settings.utc_offset_minutes = minutes;
    }
    Ok(settings)
}

/// Collects all JSON files from the given inputs (files and directories).
fn collect_input_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            {
                files.push(entry.path().to_path_buf());
            }
        } else {
            files.push(input.clone());
        }
    }
    files
}

/// Start of `date` at `offset`, in epoch seconds.
fn day_start(date: NaiveDate, offset: FixedOffset) -> Option<f64> {
    date.and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.timestamp() as f64)
}

/// Reads an export and applies the message selection options.
fn load_export(path: &Path, settings: &Settings, cli: &Cli) -> Result<ChannelExport, Error> {
    let json = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    let mut export = parser::parse_export(&json).context(ParseFileSnafu { path })?;

    let offset = Dates::new(settings).offset();
    let oldest = cli.oldest.and_then(|date| day_start(date, offset));
    let latest = cli
        .latest
        .and_then(|date| day_start(date, offset))
        .map(|start| start + SECONDS_PER_DAY - 1e-6);
    if oldest.is_some() || latest.is_some() || cli.max_messages.is_some() {
        let before = export.messages.len();
        export.retain_between(oldest, latest, cli.max_messages);
        debug!(before, after = export.messages.len(), "messages selected");
    }
    Ok(export)
}

/// Renders an export as a text document, or as JSON lines with `--trace`.
fn render(export: &ChannelExport, settings: &Settings, cli: &Cli) -> Result<String, Error> {
    let options = DocumentOptions {
        exported_at: Utc::now().with_timezone(&Dates::new(settings).offset()),
        layout: LayoutOptions {
            debug_info: cli.debug_info,
        },
    };

    if cli.trace {
        let (_, page_height) = settings.page_size();
        let mut canvas = RecordingCanvas::new().with_page_height(page_height - settings.margin_left);
        document::write_document(&mut canvas, export, settings, &options);
        let mut out = String::new();
        for op in canvas.ops() {
            out.push_str(&serde_json::to_string(op).context(SerializeTraceSnafu)?);
            out.push('\n');
        }
        Ok(out)
    } else {
        let mut canvas = TextCanvas::new(settings).with_title(&document::document_title(export));
        document::write_document(&mut canvas, export, settings, &options);
        Ok(canvas.finish())
    }
}

/// Processes a single file and outputs to stdout.
fn process_to_stdout(input: &Path, settings: &Settings, cli: &Cli) -> Result<(), Error> {
    if cli.dry_run {
        eprintln!("Would output {}", input.display());
        return Ok(());
    }

    let export = load_export(input, settings, cli)?;
    print!("{}", render(&export, settings, cli)?);
    Ok(())
}

/// Processes a single file and writes to the output directory.
fn process_file(input: &Path, out_dir: &Path, settings: &Settings, cli: &Cli) -> Result<(), Error> {
    let out_name = input.file_stem().context(InvalidFilenameSnafu)?;
    let extension = if cli.trace { "jsonl" } else { "txt" };
    let out_path = out_dir.join(format!("{}.{extension}", out_name.to_string_lossy()));

    // Handle dry-run mode
    if cli.dry_run {
        eprintln!("Would write {}", out_path.display());
        return Ok(());
    }

    // Check if output exists and handle overwrite
    if out_path.exists() && !cli.force {
        warn!(
            path = %out_path.display(),
            "skipping existing output, use --force to overwrite"
        );
        return Ok(());
    }

    let export = load_export(input, settings, cli)?;
    let document = render(&export, settings, cli)?;

    std::fs::write(&out_path, &document).context(WriteFileSnafu { path: &out_path })?;

    info!(path = %out_path.display(), "wrote document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_offsets() {
        assert_eq!(parse_utc_offset("+02:00"), Ok(120));
        assert_eq!(parse_utc_offset("-05:30"), Ok(-330));
        assert_eq!(parse_utc_offset("09:15"), Ok(555));
        assert!(parse_utc_offset("+2").is_err());
        assert!(parse_utc_offset("+24:00").is_err());
        assert!(parse_utc_offset("+01:60").is_err());
    }

    #[test]
    fn parses_dates() {
        assert_eq!(parse_date("2024-12-05"), Ok(NaiveDate::from_ymd_opt(2024, 12, 5).unwrap()));
        assert!(parse_date("05.12.2024").is_err());
    }

    #[test]
    fn day_start_honours_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 5).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let cet = FixedOffset::east_opt(3600).unwrap();

        assert_eq!(day_start(date, utc), Some(1_733_356_800.0));
        assert_eq!(day_start(date, cet), Some(1_733_353_200.0));
    }
}
