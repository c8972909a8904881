#![forbid(unsafe_code)]

//! Format records and the small amount of logic applied to them: URL
//! validation, resolution filtering and duration rendering.

use serde::{Deserialize, Serialize};

/// Vertical resolutions offered in the resolution dropdown.
pub const ALLOWED_HEIGHTS: [i64; 4] = [360, 480, 720, 1080];

/// Height assumed for the fallback record when the extractor omits it.
pub const FALLBACK_HEIGHT: i64 = 720;

const DEFAULT_EXT: &str = "mp4";
const SUPPORTED_HOSTS: [&str; 2] = ["youtube.com", "youtu.be"];

/// One entry of the extractor's `formats` array. Every field is optional
/// because the extractor leaves out whatever it does not know.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub height: Option<i64>,
    pub ext: Option<String>,
    pub format_note: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
}

impl RawFormat {
    /// A missing codec field counts as present; only the literal `none`
    /// marks a stream without video or audio.
    fn has_video_and_audio(&self) -> bool {
        self.vcodec.as_deref() != Some("none") && self.acodec.as_deref() != Some("none")
    }
}

/// A downloadable encoding offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatRecord {
    pub format_id: String,
    pub height: i64,
    pub ext: String,
    pub format_note: String,
}

impl FormatRecord {
    fn from_raw(raw: &RawFormat, height: i64) -> Option<Self> {
        Some(Self {
            format_id: raw.format_id.clone()?,
            height,
            ext: raw.ext.clone().unwrap_or_else(|| DEFAULT_EXT.to_string()),
            format_note: raw.format_note.clone().unwrap_or_default(),
        })
    }

    /// Dropdown label, e.g. `720p`.
    pub fn label(&self) -> String {
        format!("{}p", self.height)
    }
}

/// Cheap pre-check before the extractor is ever invoked.
pub fn is_supported_url(url: &str) -> bool {
    !url.is_empty() && SUPPORTED_HOSTS.iter().any(|host| url.contains(host))
}

/// Keeps muxed formats with an allow-listed height, one per height (first
/// seen wins), highest first. When nothing qualifies, falls back to the first
/// muxed format regardless of height; the result is then at most one record.
pub fn select_formats(raw: &[RawFormat]) -> Vec<FormatRecord> {
    let mut records: Vec<FormatRecord> = Vec::new();

    for format in raw.iter().filter(|format| format.has_video_and_audio()) {
        let height = format.height.unwrap_or(0);
        if !ALLOWED_HEIGHTS.contains(&height) {
            continue;
        }
        if records.iter().any(|existing| existing.height == height) {
            continue;
        }
        if let Some(record) = FormatRecord::from_raw(format, height) {
            records.push(record);
        }
    }

    records.sort_by(|a, b| b.height.cmp(&a.height));

    if records.is_empty()
        && let Some(fallback) = raw
            .iter()
            .filter(|format| format.has_video_and_audio())
            .find_map(|format| {
                FormatRecord::from_raw(format, format.height.unwrap_or(FALLBACK_HEIGHT))
            })
    {
        records.push(fallback);
    }

    records
}

/// Looks up the record behind a dropdown label.
pub fn find_by_label<'a>(records: &'a [FormatRecord], label: &str) -> Option<&'a FormatRecord> {
    records.iter().find(|record| record.label() == label)
}

/// Renders whole seconds as `H:MM:SS`. Hours keep counting past a day.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}
