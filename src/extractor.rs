#![forbid(unsafe_code)]

//! Thin wrapper around the `yt-dlp` executable.
//!
//! Everything site-specific (HTTP negotiation, stream selection, merging)
//! stays inside yt-dlp. This module only builds argument lists, runs the
//! process and reads back what it printed.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, info};

use crate::formats::{FormatRecord, RawFormat, format_duration, select_formats};

/// Output template relative to the download directory.
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
/// Prefer muxed files; otherwise let yt-dlp merge the best audio in.
const FORMAT_SORT: &str = "hasvid,hasaud";

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub program: PathBuf,
    /// Passed through only when the file exists.
    pub cookie_file: Option<PathBuf>,
    pub user_agent: Option<String>,
    /// Treat playlist URLs as the single video they point at.
    pub single_video: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from(crate::config::DEFAULT_YTDLP_PROGRAM),
            cookie_file: None,
            user_agent: None,
            single_video: false,
        }
    }
}

/// Subset of `yt-dlp --dump-single-json` that the UI needs.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    formats: Option<Vec<RawFormat>>,
}

/// What the info page shows for one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub formats: Vec<FormatRecord>,
}

impl VideoSummary {
    pub fn duration_text(&self) -> Option<String> {
        self.duration.map(format_duration)
    }
}

impl VideoInfo {
    fn into_summary(self) -> Result<VideoSummary> {
        let title = self
            .title
            .filter(|title| !title.trim().is_empty())
            .context("metadata has no title")?;
        let formats = select_formats(self.formats.as_deref().unwrap_or_default());
        Ok(VideoSummary {
            title,
            thumbnail: self.thumbnail.filter(|url| !url.trim().is_empty()),
            duration: self
                .duration
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(|secs| secs as u64),
            formats,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Extractor {
    options: ExtractorOptions,
}

impl Extractor {
    pub fn new(options: ExtractorOptions) -> Self {
        Self { options }
    }

    /// Runs `<program> --version` so a missing install fails at startup
    /// rather than on the first request.
    pub fn ensure_available(&self) -> Result<()> {
        let program = &self.options.program;
        let status = Command::new(program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(_) => bail!(
                "{} is installed but returned a failure status",
                program.display()
            ),
            Err(err) => bail!("{} is not installed or not in PATH: {}", program.display(), err),
        }
    }

    /// Fetches metadata without downloading and reduces the format list to
    /// the records offered in the dropdown.
    pub fn fetch_summary(&self, url: &str) -> Result<VideoSummary> {
        let output = self.run(self.info_args(url))?;
        let raw_json =
            String::from_utf8(output.stdout).context("parsing metadata JSON response as UTF-8")?;
        let info: VideoInfo =
            serde_json::from_str(&raw_json).context("deserializing metadata JSON")?;
        let summary = info.into_summary()?;
        debug!(
            title = %summary.title,
            formats = summary.formats.len(),
            "fetched video summary"
        );
        Ok(summary)
    }

    /// Downloads `format_id` (plus the best audio when the format is video
    /// only) into `output_dir` and returns the final file path.
    pub fn download(&self, url: &str, format_id: &str, output_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("creating {}", output_dir.display()))?;

        let output = self.run(self.download_args(url, format_id, output_dir))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(PathBuf::from)
            .context("yt-dlp did not report the downloaded file")?;

        if !path.is_file() {
            bail!("downloaded file {} is missing", path.display());
        }
        info!(path = %path.display(), format_id, "download finished");
        Ok(path)
    }

    fn info_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
        ];
        self.push_shared_args(&mut args);
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn download_args(&self, url: &str, format_id: &str, output_dir: &Path) -> Vec<String> {
        let template = output_dir.join(OUTPUT_TEMPLATE);
        let mut args = vec![
            "--format".to_string(),
            format!("{format_id}+bestaudio/best"),
            "--format-sort".to_string(),
            FORMAT_SORT.to_string(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
        ];
        self.push_shared_args(&mut args);
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn push_shared_args(&self, args: &mut Vec<String>) {
        if self.options.single_video {
            args.push("--no-playlist".to_string());
        }
        if let Some(cookies) = &self.options.cookie_file
            && cookies.exists()
        {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }
        if let Some(agent) = &self.options.user_agent {
            args.push("--user-agent".to_string());
            args.push(agent.clone());
        }
    }

    fn run(&self, args: Vec<String>) -> Result<Output> {
        debug!(program = %self.options.program.display(), ?args, "running extractor");
        let output = Command::new(&self.options.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("launching {}", self.options.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .map(str::trim)
                .rfind(|line| !line.is_empty())
                .unwrap_or("no error output");
            bail!("yt-dlp exited with {}: {}", output.status, reason);
        }
        Ok(output)
    }
}
