#![forbid(unsafe_code)]

//! Axum server behind the download form.
//!
//! `GET /` shows the URL form and, once a URL is submitted, the video details
//! with a resolution picker. `POST /download` runs yt-dlp and links to
//! `GET /files`, which streams the finished file back to the browser.

use std::{
    collections::{HashMap, HashSet},
    fmt::Write as _,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Form, Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use mime_guess::MimeGuess;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use tubegrab::config::{Profile, Settings, SettingsOverrides, resolve_settings};
use tubegrab::extractor::{Extractor, VideoSummary};
use tubegrab::formats::{find_by_label, is_supported_url};
use tubegrab::logging::init_tracing;
use tubegrab::page::{self, INVALID_URL_MESSAGE, Notice};
use tubegrab::security::{ensure_not_root, is_plain_file_name};

/// Summaries kept in memory before the cache is reset.
const SUMMARY_CACHE_LIMIT: usize = 256;
const DEFAULT_MIME: &str = "video/mp4";

#[derive(Debug, Clone)]
struct ServerArgs {
    settings: Settings,
    listen_host: IpAddr,
}

impl ServerArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut overrides = SettingsOverrides::default();
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            let mut value = || {
                inline
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| anyhow!("{flag} requires a value"))
            };

            match flag.as_str() {
                "--host" => overrides.host = Some(value()?),
                "--port" => overrides.port = Some(parse_port_arg(&value()?)?),
                "--profile" => overrides.profile = Some(Profile::parse(&value()?)?),
                "--output-dir" => overrides.output_dir = Some(PathBuf::from(value()?)),
                "--env-file" => overrides.env_path = Some(PathBuf::from(value()?)),
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let settings = resolve_settings(overrides)?;
        let listen_host = parse_host_arg(&settings.host)?;
        Ok(Self {
            settings,
            listen_host,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/TUBEGRAB_HOST")
}

/// Shared state injected into every handler.
#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    extractor: Arc<Extractor>,
    summaries: Arc<RwLock<HashMap<String, VideoSummary>>>,
    /// File names produced by `/download`; `/files` serves nothing else.
    downloads: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    fn new(settings: Settings, extractor: Extractor) -> Self {
        Self {
            settings: Arc::new(settings),
            extractor: Arc::new(extractor),
            summaries: Arc::new(RwLock::new(HashMap::new())),
            downloads: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns the summary for `url`. With `refresh` unset a cached copy is
    /// good enough; yt-dlp runs on the blocking pool either way.
    async fn summary(&self, url: &str, refresh: bool) -> Result<VideoSummary> {
        if !refresh && let Some(cached) = self.summaries.read().get(url).cloned() {
            return Ok(cached);
        }

        let extractor = self.extractor.clone();
        let owned_url = url.to_string();
        let summary = tokio::task::spawn_blocking(move || extractor.fetch_summary(&owned_url))
            .await
            .context("metadata task failed")??;

        let mut cache = self.summaries.write();
        if cache.len() >= SUMMARY_CACHE_LIMIT {
            cache.clear();
        }
        cache.insert(url.to_string(), summary.clone());
        Ok(summary)
    }

    async fn download(&self, url: &str, format_id: &str) -> Result<PathBuf> {
        let output_dir = self.settings.output_dir.clone();
        tokio::fs::create_dir_all(&output_dir)
            .await
            .with_context(|| format!("creating {}", output_dir.display()))?;

        let extractor = self.extractor.clone();
        let url = url.to_string();
        let format_id = format_id.to_string();
        tokio::task::spawn_blocking(move || extractor.download(&url, &format_id, &output_dir))
            .await
            .context("download task failed")?
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;
type PageResponse = (StatusCode, Html<String>);

#[derive(Debug, Default, Deserialize)]
struct UrlQuery {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadForm {
    url: String,
    resolution: String,
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let ServerArgs {
        settings,
        listen_host,
    } = ServerArgs::parse()?;

    ensure_not_root("server")?;

    let extractor = Extractor::new(settings.extractor_options());
    extractor.ensure_available()?;

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| format!("creating {}", settings.output_dir.display()))?;

    let addr = SocketAddr::new(listen_host, settings.port);
    info!(
        profile = settings.profile.as_str(),
        output_dir = %settings.output_dir.display(),
        cleanup = settings.cleanup_after_serve,
        "starting server"
    );

    let app = router(AppState::new(settings, extractor));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/download", post(download))
        .route("/files", get(serve_file))
        .route("/api/info", get(api_info))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {}", err);
    }
}

async fn index(State(state): State<AppState>, Query(query): Query<UrlQuery>) -> PageResponse {
    let url = query.url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return (StatusCode::OK, Html(page::home("")));
    }
    if !is_supported_url(url) {
        return (
            StatusCode::BAD_REQUEST,
            Html(page::notice(url, Notice::Error(INVALID_URL_MESSAGE))),
        );
    }

    match state.summary(url, true).await {
        Ok(summary) => (StatusCode::OK, Html(page::video_info(url, &summary))),
        Err(err) => {
            warn!(url, "metadata lookup failed: {err:#}");
            let message = format!("Error fetching video info: {err:#}");
            (
                StatusCode::BAD_GATEWAY,
                Html(page::notice(url, Notice::Error(&message))),
            )
        }
    }
}

async fn download(State(state): State<AppState>, Form(form): Form<DownloadForm>) -> PageResponse {
    let url = form.url.trim();
    if !is_supported_url(url) {
        return (
            StatusCode::BAD_REQUEST,
            Html(page::notice(url, Notice::Error(INVALID_URL_MESSAGE))),
        );
    }

    let summary = match state.summary(url, false).await {
        Ok(summary) => summary,
        Err(err) => {
            warn!(url, "metadata lookup failed: {err:#}");
            let message = format!("Error fetching video info: {err:#}");
            return (
                StatusCode::BAD_GATEWAY,
                Html(page::notice(url, Notice::Error(&message))),
            );
        }
    };

    let Some(record) = find_by_label(&summary.formats, &form.resolution) else {
        let message = format!(
            "Error downloading video: resolution {} is not available",
            form.resolution
        );
        return (
            StatusCode::BAD_REQUEST,
            Html(page::notice(url, Notice::Error(&message))),
        );
    };

    info!(url, format_id = %record.format_id, resolution = %form.resolution, "starting download");
    let path = match state.download(url, &record.format_id).await {
        Ok(path) => path,
        Err(err) => {
            warn!(url, "download failed: {err:#}");
            let message = format!("Error downloading video: {err:#}");
            return (
                StatusCode::BAD_GATEWAY,
                Html(page::notice(url, Notice::Error(&message))),
            );
        }
    };

    let Some(file_name) = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
    else {
        let message = format!("Error downloading video: unexpected path {}", path.display());
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(page::notice(url, Notice::Error(&message))),
        );
    };

    state.downloads.lock().insert(file_name.clone());

    (
        StatusCode::OK,
        Html(page::download_ready(
            url,
            Some(&summary),
            &file_name,
            state.settings.success_message(),
        )),
    )
}

/// Streams a finished download as an attachment. Only names recorded by
/// `/download` are served. With cleanup enabled the file is unlinked right
/// after it is opened; the open handle keeps the data readable until the
/// stream ends.
async fn serve_file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Response> {
    if !is_plain_file_name(&query.name) || !state.downloads.lock().contains(&query.name) {
        return Err(ApiError::not_found("file not found"));
    }
    let path = state.settings.output_dir.join(&query.name);

    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    if !metadata.is_file() {
        return Err(ApiError::not_found("file not found"));
    }

    if state.settings.cleanup_after_serve {
        state.downloads.lock().remove(&query.name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!(path = %path.display(), "removed served file"),
            Err(err) => warn!(path = %path.display(), "could not remove served file: {err}"),
        }
    }

    let mime = MimeGuess::from_path(&path)
        .first_raw()
        .unwrap_or(DEFAULT_MIME);
    let disposition = HeaderValue::from_str(&content_disposition(&query.name))
        .map_err(|err| ApiError::internal(err.to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

async fn api_info(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> ApiResult<Json<VideoSummary>> {
    let url = query.url.as_deref().map(str::trim).unwrap_or_default();
    if !is_supported_url(url) {
        return Err(ApiError::bad_request(INVALID_URL_MESSAGE));
    }
    let summary = state
        .summary(url, false)
        .await
        .map_err(|err| ApiError::bad_gateway(format!("Error fetching video info: {err:#}")))?;
    Ok(Json(summary))
}

/// `attachment` header with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut encoded = String::with_capacity(file_name.len());
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
