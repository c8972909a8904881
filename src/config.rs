#![forbid(unsafe_code)]

//! Runtime settings resolved from CLI overrides, the process environment and
//! an optional `.env` file, in that order of precedence.

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::extractor::ExtractorOptions;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_TUBEGRAB_PORT: u16 = 8501;
pub const DEFAULT_TUBEGRAB_HOST: &str = "127.0.0.1";
pub const DEFAULT_YTDLP_PROGRAM: &str = "yt-dlp";
pub const STANDARD_OUTPUT_DIR: &str = "downloads";
pub const RESTRICTED_OUTPUT_DIR: &str = ".";
pub const RESTRICTED_COOKIE_FILE: &str = "cookies.txt";
pub const RESTRICTED_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// Preset bundles of defaults. `Restricted` is for videos that refuse
/// anonymous clients: it sends cookies and a browser user agent, writes into
/// the working directory and deletes files once served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Standard,
    Restricted,
}

impl Profile {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" | "default" => Ok(Self::Standard),
            "restricted" | "cookies" => Ok(Self::Restricted),
            other => Err(anyhow!(
                "unknown profile `{other}`; expected `standard` or `restricted`"
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Restricted => "restricted",
        }
    }

    fn default_output_dir(self) -> &'static str {
        match self {
            Self::Standard => STANDARD_OUTPUT_DIR,
            Self::Restricted => RESTRICTED_OUTPUT_DIR,
        }
    }

    fn default_cleanup(self) -> bool {
        matches!(self, Self::Restricted)
    }

    fn default_cookie_file(self) -> Option<&'static str> {
        match self {
            Self::Standard => None,
            Self::Restricted => Some(RESTRICTED_COOKIE_FILE),
        }
    }

    fn default_user_agent(self) -> Option<&'static str> {
        match self {
            Self::Standard => None,
            Self::Restricted => Some(RESTRICTED_USER_AGENT),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub profile: Profile,
    pub host: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub cleanup_after_serve: bool,
    pub cookie_file: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub ytdlp_program: PathBuf,
}

impl Settings {
    pub fn extractor_options(&self) -> ExtractorOptions {
        ExtractorOptions {
            program: self.ytdlp_program.clone(),
            cookie_file: self.cookie_file.clone(),
            user_agent: self.user_agent.clone(),
            single_video: self.profile == Profile::Restricted,
        }
    }

    /// Message shown next to the save link once a download finished.
    pub fn success_message(&self) -> &'static str {
        if self.cleanup_after_serve {
            "Video is ready for download!"
        } else {
            "Video downloaded successfully!"
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub profile: Option<Profile>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub output_dir: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Result<Settings> {
    let profile = match overrides.profile {
        Some(profile) => profile,
        None => lookup_value("TUBEGRAB_PROFILE", file_vars, &env_lookup)
            .map(|value| Profile::parse(&value))
            .transpose()?
            .unwrap_or_default(),
    };
    let host = overrides
        .host
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        })
        .or_else(|| lookup_value("TUBEGRAB_HOST", file_vars, &env_lookup))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TUBEGRAB_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("TUBEGRAB_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_TUBEGRAB_PORT);
    let output_dir = overrides
        .output_dir
        .or_else(|| lookup_value("TUBEGRAB_OUTPUT_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(profile.default_output_dir()));
    let cleanup_after_serve = match lookup_value("TUBEGRAB_CLEANUP", file_vars, &env_lookup) {
        Some(value) => parse_bool(&value)
            .with_context(|| format!("TUBEGRAB_CLEANUP has an invalid value `{value}`"))?,
        None => profile.default_cleanup(),
    };
    let cookie_file = lookup_value("TUBEGRAB_COOKIE_FILE", file_vars, &env_lookup)
        .or_else(|| profile.default_cookie_file().map(str::to_string))
        .map(PathBuf::from);
    let user_agent = lookup_value("TUBEGRAB_USER_AGENT", file_vars, &env_lookup)
        .or_else(|| profile.default_user_agent().map(str::to_string));
    let ytdlp_program = lookup_value("TUBEGRAB_YTDLP", file_vars, &env_lookup)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YTDLP_PROGRAM));

    Ok(Settings {
        profile,
        host,
        port,
        output_dir,
        cleanup_after_serve,
        cookie_file,
        user_agent,
        ytdlp_program,
    })
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("expected true/false")),
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    })
}

/// Parses `KEY=value` lines, tolerating `export` prefixes, comments and
/// single or double quotes. A missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> Settings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_settings(&vars, |_| None).unwrap()
    }

    #[test]
    fn empty_config_uses_standard_profile() {
        let settings = settings_from("");
        assert_eq!(settings.profile, Profile::Standard);
        assert_eq!(settings.host, DEFAULT_TUBEGRAB_HOST);
        assert_eq!(settings.port, DEFAULT_TUBEGRAB_PORT);
        assert_eq!(settings.output_dir, PathBuf::from("downloads"));
        assert!(!settings.cleanup_after_serve);
        assert!(settings.cookie_file.is_none());
        assert!(settings.user_agent.is_none());
        assert_eq!(settings.ytdlp_program, PathBuf::from("yt-dlp"));
        assert_eq!(settings.success_message(), "Video downloaded successfully!");
    }

    #[test]
    fn restricted_profile_fills_credential_defaults() {
        let settings = settings_from("TUBEGRAB_PROFILE=\"restricted\"\n");
        assert_eq!(settings.profile, Profile::Restricted);
        assert_eq!(settings.output_dir, PathBuf::from("."));
        assert!(settings.cleanup_after_serve);
        assert_eq!(settings.cookie_file, Some(PathBuf::from("cookies.txt")));
        assert_eq!(settings.user_agent.as_deref(), Some(RESTRICTED_USER_AGENT));
        assert_eq!(settings.success_message(), "Video is ready for download!");

        let options = settings.extractor_options();
        assert!(options.single_video);
        assert_eq!(options.cookie_file, Some(PathBuf::from("cookies.txt")));
    }

    #[test]
    fn explicit_keys_beat_profile_defaults() {
        let settings = settings_from(
            "TUBEGRAB_PROFILE=restricted\nTUBEGRAB_OUTPUT_DIR=/srv/media\nTUBEGRAB_CLEANUP=false\nTUBEGRAB_USER_AGENT=curl/8\n",
        );
        assert_eq!(settings.output_dir, PathBuf::from("/srv/media"));
        assert!(!settings.cleanup_after_serve);
        assert_eq!(settings.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn reads_port_and_host() {
        let settings = settings_from("TUBEGRAB_PORT=\"4242\"\nTUBEGRAB_HOST=\"0.0.0.0\"\n");
        assert_eq!(settings.port, 4242);
        assert_eq!(settings.host, "0.0.0.0");
    }

    #[test]
    fn invalid_port_defaults() {
        let settings = settings_from("TUBEGRAB_PORT=\"nope\"\n");
        assert_eq!(settings.port, DEFAULT_TUBEGRAB_PORT);
    }

    #[test]
    fn invalid_profile_is_an_error() {
        let vars = read_env_file(make_config("TUBEGRAB_PROFILE=fast\n").path()).unwrap();
        let err = build_settings(&vars, |_| None).unwrap_err();
        assert!(err.to_string().contains("unknown profile"));
    }

    #[test]
    fn invalid_cleanup_flag_is_an_error() {
        let vars = read_env_file(make_config("TUBEGRAB_CLEANUP=maybe\n").path()).unwrap();
        assert!(build_settings(&vars, |_| None).is_err());
    }

    #[test]
    fn env_beats_file() {
        let vars = read_env_file(make_config("TUBEGRAB_OUTPUT_DIR=\"/file\"\n").path()).unwrap();
        let settings = build_settings(&vars, |key| {
            if key == "TUBEGRAB_OUTPUT_DIR" {
                Some("/env".to_string())
            } else {
                None
            }
        })
        .unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/env"));
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export TUBEGRAB_OUTPUT_DIR="/media"
            TUBEGRAB_COOKIE_FILE='/secrets/cookies.txt'
            TUBEGRAB_HOST =  "0.0.0.0"
            TUBEGRAB_PORT=9090
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("TUBEGRAB_OUTPUT_DIR").unwrap(), "/media");
        assert_eq!(
            vars.get("TUBEGRAB_COOKIE_FILE").unwrap(),
            "/secrets/cookies.txt"
        );
        assert_eq!(vars.get("TUBEGRAB_HOST").unwrap(), "0.0.0.0");
        assert_eq!(vars.get("TUBEGRAB_PORT").unwrap(), "9090");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn override_precedence() {
        let mut vars = HashMap::new();
        vars.insert("TUBEGRAB_PROFILE".to_string(), "standard".to_string());
        vars.insert("TUBEGRAB_HOST".to_string(), "file-host".to_string());
        vars.insert("TUBEGRAB_PORT".to_string(), "7000".to_string());
        vars.insert("TUBEGRAB_OUTPUT_DIR".to_string(), "/file-out".to_string());

        let overrides = SettingsOverrides {
            profile: Some(Profile::Restricted),
            host: Some("override-host".into()),
            port: None,
            output_dir: Some(PathBuf::from("/override-out")),
            env_path: None,
        };

        let settings = build_settings_with_overrides(
            &vars,
            |key| {
                if key == "TUBEGRAB_PORT" {
                    Some("8000".to_string())
                } else {
                    None
                }
            },
            overrides,
        )
        .unwrap();

        assert_eq!(settings.profile, Profile::Restricted);
        assert_eq!(settings.host, "override-host");
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.output_dir, PathBuf::from("/override-out"));
        assert!(settings.cleanup_after_serve);
    }

    #[test]
    fn blank_host_override_is_ignored() {
        let settings = build_settings_with_overrides(
            &HashMap::new(),
            |_| None,
            SettingsOverrides {
                host: Some("   ".into()),
                ..SettingsOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.host, DEFAULT_TUBEGRAB_HOST);
    }

    #[test]
    fn resolve_settings_reads_custom_env_path() {
        let cfg = make_config("TUBEGRAB_YTDLP=/opt/bin/yt-dlp\n");
        let settings = resolve_settings(SettingsOverrides {
            env_path: Some(cfg.path().to_path_buf()),
            ..SettingsOverrides::default()
        })
        .unwrap();
        assert_eq!(settings.ytdlp_program, PathBuf::from("/opt/bin/yt-dlp"));
    }
}
