#![forbid(unsafe_code)]

//! Command-line front end: inspect the offered resolutions of a video or
//! download one of them without starting the web server.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tubegrab::config::{Profile, Settings, SettingsOverrides, resolve_settings};
use tubegrab::extractor::Extractor;
use tubegrab::formats::{find_by_label, is_supported_url};
use tubegrab::logging::init_tracing;
use tubegrab::page::{INVALID_URL_MESSAGE, NO_FORMATS_MESSAGE};
use tubegrab::security::ensure_not_root;

#[derive(Debug, Parser)]
#[command(name = "tubegrab", version, about = "Inspect and download videos through yt-dlp")]
struct Cli {
    /// `standard` or `restricted` (cookies + browser user agent).
    #[arg(long, global = true, value_parser = Profile::parse)]
    profile: Option<Profile>,
    /// Directory the downloaded file is written to.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// Alternative `.env` file.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print title, duration and the available resolutions.
    Info {
        url: String,
        /// Emit the summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Download a video; defaults to the highest offered resolution.
    Download {
        url: String,
        /// Resolution label such as `720p`.
        #[arg(long, short)]
        resolution: Option<String>,
    },
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        resolve_settings(SettingsOverrides {
            profile: self.profile,
            output_dir: self.output_dir.clone(),
            env_path: self.env_file.clone(),
            ..SettingsOverrides::default()
        })
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    ensure_not_root("tubegrab")?;
    let mut stdout = io::stdout().lock();
    run(cli, &mut stdout)
}

fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let settings = cli.settings()?;
    let extractor = Extractor::new(settings.extractor_options());

    match cli.command {
        Command::Info { url, json } => {
            let url = checked_url(&url)?;
            let summary = extractor
                .fetch_summary(url)
                .context("Error fetching video info")?;

            if json {
                serde_json::to_writer_pretty(&mut *out, &summary)?;
                writeln!(out)?;
                return Ok(());
            }

            writeln!(out, "{}", summary.title)?;
            if let Some(duration) = summary.duration_text() {
                writeln!(out, "Duration: {duration}")?;
            }
            if summary.formats.is_empty() {
                writeln!(out, "{NO_FORMATS_MESSAGE}")?;
            }
            for record in &summary.formats {
                writeln!(
                    out,
                    "{:>6}  {:<8} {:<5} {}",
                    record.label(),
                    record.format_id,
                    record.ext,
                    record.format_note
                )?;
            }
        }
        Command::Download { url, resolution } => {
            let url = checked_url(&url)?;
            let summary = extractor
                .fetch_summary(url)
                .context("Error fetching video info")?;
            let record = match resolution.as_deref() {
                Some(label) => find_by_label(&summary.formats, label)
                    .ok_or_else(|| anyhow!("resolution {label} is not available"))?,
                None => summary
                    .formats
                    .first()
                    .ok_or_else(|| anyhow!(NO_FORMATS_MESSAGE))?,
            };

            info!(format_id = %record.format_id, label = %record.label(), "downloading");
            let path = extractor
                .download(url, &record.format_id, &settings.output_dir)
                .context("Error downloading video")?;
            writeln!(out, "{}", path.display())?;
        }
    }

    Ok(())
}

fn checked_url(url: &str) -> Result<&str> {
    let url = url.trim();
    if !is_supported_url(url) {
        bail!(INVALID_URL_MESSAGE);
    }
    Ok(url)
}
