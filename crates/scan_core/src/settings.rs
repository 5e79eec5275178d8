use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const SETTINGS_FILE: &str = "scan.toml";
const SCAN_PATH: &str = "scan/";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid api base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("api base url '{0}' must use http or https")]
    UnsupportedScheme(String),
    #[error("request timeout must be at least one second")]
    ZeroTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl ScanSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `<base>/scan/`, tolerant of trailing slashes on the configured base.
    pub fn scan_endpoint(&self) -> Result<Url, SettingsError> {
        let base = normalize_base_url(&self.api_base_url);
        let parsed = Url::parse(&format!("{base}/")).map_err(|source| {
            SettingsError::InvalidBaseUrl {
                url: base.clone(),
                source,
            }
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SettingsError::UnsupportedScheme(base));
        }
        parsed
            .join(SCAN_PATH)
            .map_err(|source| SettingsError::InvalidBaseUrl { url: base, source })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::ZeroTimeout);
        }
        self.scan_endpoint().map(|_| ())
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.api_base_url {
            self.api_base_url = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = lookup("APP__API_BASE_URL") {
            self.api_base_url = v;
        }

        if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
            match v.trim().parse::<u64>() {
                Ok(parsed) => self.request_timeout_secs = parsed,
                Err(err) => warn!(value = %v, error = %err, "ignoring APP__REQUEST_TIMEOUT_SECS"),
            }
        }
    }
}

/// Defaults, then the settings file, then the process environment.
///
/// An explicitly named file must exist; the implicit `scan.toml` in the
/// working directory is optional.
pub fn load_settings(explicit_file: Option<&Path>) -> Result<ScanSettings, SettingsError> {
    load_settings_with(explicit_file, |key| std::env::var(key).ok())
}

fn load_settings_with(
    explicit_file: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ScanSettings, SettingsError> {
    let mut settings = ScanSettings::default();

    let (path, required) = match explicit_file {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(SETTINGS_FILE), false),
    };
    if let Some(file) = read_settings_file(&path, required)? {
        settings.apply_file(file);
    }

    settings.apply_env(lookup);
    Ok(settings)
}

fn read_settings_file(path: &Path, required: bool) -> Result<Option<FileSettings>, SettingsError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&raw)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_API_BASE_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_settings_file(contents: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("monument_scan_settings_{suffix}.toml"));
        fs::write(&path, contents).expect("write settings");
        path
    }

    #[test]
    fn defaults_point_at_local_service() {
        let settings = ScanSettings::default();
        assert_eq!(
            settings.scan_endpoint().expect("endpoint").as_str(),
            "http://localhost:8000/scan/"
        );
        assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn trailing_slashes_and_blank_base_are_normalized() {
        let mut settings = ScanSettings {
            api_base_url: "https://scan.example.org/api//".into(),
            ..ScanSettings::default()
        };
        assert_eq!(
            settings.scan_endpoint().expect("endpoint").as_str(),
            "https://scan.example.org/api/scan/"
        );

        settings.api_base_url = "   ".into();
        assert_eq!(
            settings.scan_endpoint().expect("endpoint").as_str(),
            "http://localhost:8000/scan/"
        );
    }

    #[test]
    fn rejects_non_http_base_and_zero_timeout() {
        let settings = ScanSettings {
            api_base_url: "ftp://files.example.org".into(),
            request_timeout_secs: 0,
        };
        assert!(matches!(
            settings.scan_endpoint(),
            Err(SettingsError::UnsupportedScheme(_))
        ));
        assert!(matches!(settings.validate(), Err(SettingsError::ZeroTimeout)));
    }

    #[test]
    fn env_overrides_file_which_overrides_defaults() {
        let path = temp_settings_file(
            "api_base_url = \"http://file.example:9000\"\nrequest_timeout_secs = 12\n",
        );

        let from_file = load_settings_with(Some(&path), |_| None).expect("file settings");
        assert_eq!(from_file.api_base_url, "http://file.example:9000");
        assert_eq!(from_file.request_timeout_secs, 12);

        let env: HashMap<&str, &str> = HashMap::from([
            ("API_BASE_URL", "http://plain.example"),
            ("APP__API_BASE_URL", "http://prefixed.example"),
            ("APP__REQUEST_TIMEOUT_SECS", "not-a-number"),
        ]);
        let merged = load_settings_with(Some(&path), |key| env.get(key).map(|v| v.to_string()))
            .expect("merged settings");
        assert_eq!(merged.api_base_url, "http://prefixed.example");
        assert_eq!(merged.request_timeout_secs, 12);

        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let missing = env::temp_dir().join("monument_scan_settings_definitely_missing.toml");
        assert!(matches!(
            load_settings_with(Some(&missing), |_| None),
            Err(SettingsError::Read { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let path = temp_settings_file("bind_addr = \"0.0.0.0:1\"\n");
        assert!(matches!(
            load_settings_with(Some(&path), |_| None),
            Err(SettingsError::Parse { .. })
        ));
        fs::remove_file(path).expect("cleanup");
    }
}
