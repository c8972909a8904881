#![forbid(unsafe_code)]

//! Server-rendered HTML for the download form.
//!
//! Pages are plain strings; every value that came from the user or from
//! yt-dlp goes through [`escape_html`] before it is interpolated.

use std::fmt::Write;

use crate::extractor::VideoSummary;

pub const APP_TITLE: &str = "YouTube Video Downloader";
pub const INVALID_URL_MESSAGE: &str = "Please enter a valid YouTube URL";
pub const NO_FORMATS_MESSAGE: &str = "No supported video formats found.";
pub const THUMBNAIL_WIDTH: u32 = 400;

const STYLE: &str = "body{font-family:sans-serif;max-width:720px;margin:2rem auto;padding:0 1rem}\
input[type=text]{width:100%;padding:.4rem}\
.notice{padding:.6rem;border-radius:4px;margin:.8rem 0}\
.error{background:#fde2e2}.warning{background:#fff4ce}.success{background:#dff6dd}";

pub enum Notice<'a> {
    Error(&'a str),
    Warning(&'a str),
    Success(&'a str),
}

impl Notice<'_> {
    fn render(&self, out: &mut String) {
        let (class, text) = match self {
            Notice::Error(text) => ("error", text),
            Notice::Warning(text) => ("warning", text),
            Notice::Success(text) => ("success", text),
        };
        let _ = write!(
            out,
            "<div class=\"notice {class}\">{}</div>",
            escape_html(text)
        );
    }
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Link target for a finished download, e.g. `/files?name=My+Video.mp4`.
pub fn save_href(file_name: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("name", file_name)
        .finish();
    format!("/files?{query}")
}

/// The bare URL form.
pub fn home(url: &str) -> String {
    layout(url, "")
}

/// The URL form followed by a single banner.
pub fn notice(url: &str, notice: Notice<'_>) -> String {
    let mut content = String::new();
    notice.render(&mut content);
    layout(url, &content)
}

/// Thumbnail, title, duration and either the resolution picker or the
/// "no formats" warning.
pub fn video_info(url: &str, summary: &VideoSummary) -> String {
    let mut content = String::new();
    render_summary(&mut content, summary);

    if summary.formats.is_empty() {
        Notice::Warning(NO_FORMATS_MESSAGE).render(&mut content);
    } else {
        let _ = write!(
            content,
            "<form method=\"post\" action=\"/download\">\
<input type=\"hidden\" name=\"url\" value=\"{}\">\
<label for=\"resolution\">Select Resolution</label> \
<select id=\"resolution\" name=\"resolution\">",
            escape_html(url)
        );
        for record in &summary.formats {
            let label = escape_html(&record.label());
            let _ = write!(content, "<option value=\"{label}\">{label}</option>");
        }
        content.push_str("</select> <button type=\"submit\">Download Video</button></form>");
    }

    layout(url, &content)
}

/// Shown once the file is on disk: a save link plus the success banner.
pub fn download_ready(
    url: &str,
    summary: Option<&VideoSummary>,
    file_name: &str,
    success_message: &str,
) -> String {
    let mut content = String::new();
    if let Some(summary) = summary {
        render_summary(&mut content, summary);
    }
    let _ = write!(
        content,
        "<p><a href=\"{}\" download=\"{}\">Save Video to Device</a></p>",
        escape_html(&save_href(file_name)),
        escape_html(file_name)
    );
    Notice::Success(success_message).render(&mut content);
    layout(url, &content)
}

fn render_summary(out: &mut String, summary: &VideoSummary) {
    if let Some(thumbnail) = &summary.thumbnail {
        let _ = write!(
            out,
            "<img src=\"{}\" width=\"{THUMBNAIL_WIDTH}\" alt=\"thumbnail\">",
            escape_html(thumbnail)
        );
    }
    let _ = write!(out, "<p><strong>{}</strong></p>", escape_html(&summary.title));
    if let Some(duration) = summary.duration_text() {
        let _ = write!(out, "<p>Duration: {duration}</p>");
    }
}

fn layout(url: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
<title>{APP_TITLE}</title><style>{STYLE}</style></head><body>\
<h1>{APP_TITLE}</h1>\
<form method=\"get\" action=\"/\">\
<label for=\"url\">Enter YouTube Video URL</label>\
<input type=\"text\" id=\"url\" name=\"url\" value=\"{}\" autofocus>\
</form>{content}</body></html>",
        escape_html(url)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::FormatRecord;

    fn summary(formats: Vec<FormatRecord>) -> VideoSummary {
        VideoSummary {
            title: "Cats & <Dogs>".into(),
            thumbnail: Some("https://i.ytimg.com/vi/a/hq.jpg".into()),
            duration: Some(754),
            formats,
        }
    }

    fn record(id: &str, height: i64) -> FormatRecord {
        FormatRecord {
            format_id: id.into(),
            height,
            ext: "mp4".into(),
            format_note: String::new(),
        }
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn home_echoes_escaped_url() {
        let html = home("https://youtu.be/x?a=1&b=\"2\"");
        assert!(html.contains(APP_TITLE));
        assert!(html.contains("value=\"https://youtu.be/x?a=1&amp;b=&quot;2&quot;\""));
    }

    #[test]
    fn info_page_lists_resolutions_in_order() {
        let html = video_info(
            "https://youtu.be/a",
            &summary(vec![record("22", 720), record("18", 360)]),
        );
        assert!(html.contains("<strong>Cats &amp; &lt;Dogs&gt;</strong>"));
        assert!(html.contains("Duration: 0:12:34"));
        assert!(html.contains("width=\"400\""));
        let first = html.find("<option value=\"720p\">").unwrap();
        let second = html.find("<option value=\"360p\">").unwrap();
        assert!(first < second);
        assert!(html.contains("Download Video"));
        assert!(!html.contains(NO_FORMATS_MESSAGE));
    }

    #[test]
    fn info_page_warns_without_formats() {
        let html = video_info("https://youtu.be/a", &summary(Vec::new()));
        assert!(html.contains(NO_FORMATS_MESSAGE));
        assert!(!html.contains("<select"));
    }

    #[test]
    fn notice_page_renders_error_banner() {
        let html = notice("nope", Notice::Error(INVALID_URL_MESSAGE));
        assert!(html.contains("notice error"));
        assert!(html.contains(INVALID_URL_MESSAGE));
    }

    #[test]
    fn download_page_links_to_encoded_file() {
        let html = download_ready("u", None, "A & B.mp4", "Video downloaded successfully!");
        assert!(html.contains("href=\"/files?name=A+%26+B.mp4\""));
        assert!(html.contains("Save Video to Device"));
        assert!(html.contains("Video downloaded successfully!"));
    }

    #[test]
    fn save_href_encodes_reserved_characters() {
        assert_eq!(save_href("a/b?.mp4"), "/files?name=a%2Fb%3F.mp4");
    }
}
