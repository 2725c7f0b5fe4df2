//! Runtime settings.
//!
//! Every value has a default and can be overridden through a
//! `SENZING_TOOLS_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ValidationError;
use crate::operations::DEFAULT_PROMOTE_ATTEMPTS;

/// Address of the gRPC service.
pub const ENV_GRPC_URL: &str = "SENZING_TOOLS_GRPC_URL";
/// Connect timeout in seconds.
pub const ENV_CONNECT_TIMEOUT: &str = "SENZING_TOOLS_CONNECT_TIMEOUT_SECS";
/// Download timeout in seconds.
pub const ENV_DOWNLOAD_TIMEOUT: &str = "SENZING_TOOLS_DOWNLOAD_TIMEOUT_SECS";
/// Base URL for truth-set files.
pub const ENV_TRUTHSET_URL_PREFIX: &str = "SENZING_TOOLS_TRUTHSET_URL_PREFIX";
/// Comma-separated truth-set file names.
pub const ENV_TRUTHSET_FILES: &str = "SENZING_TOOLS_TRUTHSET_FILES";
/// Directory downloaded files are written to.
pub const ENV_DATA_DIR: &str = "SENZING_TOOLS_DATA_DIR";
/// Read-edit-write cycles before a configuration change gives up.
pub const ENV_PROMOTE_ATTEMPTS: &str = "SENZING_TOOLS_PROMOTE_ATTEMPTS";

/// Service address used when none is configured.
pub const DEFAULT_GRPC_URL: &str = "localhost:8261";
/// Published location of the demo truth sets.
pub const DEFAULT_TRUTHSET_URL_PREFIX: &str =
    "https://raw.githubusercontent.com/Senzing/truth-sets/refs/heads/main/truthsets/demo/";
/// Truth-set files fetched by default.
pub const DEFAULT_TRUTHSET_FILES: &[&str] = &["customers.json", "reference.json", "watchlist.json"];

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Settings shared by the binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `host:port` of the gRPC service.
    pub grpc_url: String,
    /// Timeout for opening the gRPC channel.
    pub connect_timeout: Duration,
    /// Connect and request timeout for truth-set downloads.
    pub download_timeout: Duration,
    /// Base URL the truth-set file names are appended to.
    pub truthset_url_prefix: String,
    /// Truth-set file names.
    pub truthset_files: Vec<String>,
    /// Directory downloaded files are written to.
    pub data_dir: PathBuf,
    /// Read-edit-write cycles before a configuration change gives up.
    pub promote_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grpc_url: DEFAULT_GRPC_URL.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            truthset_url_prefix: DEFAULT_TRUTHSET_URL_PREFIX.to_string(),
            truthset_files: DEFAULT_TRUTHSET_FILES.iter().map(|s| (*s).to_string()).collect(),
            data_dir: PathBuf::from("./"),
            promote_attempts: DEFAULT_PROMOTE_ATTEMPTS,
        }
    }
}

fn invalid(name: &str, value: &str) -> ValidationError {
    ValidationError::InvalidSetting {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, ValidationError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(invalid(name, value)),
    }
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`. Unset or blank values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(url) = get(ENV_GRPC_URL) {
            settings.grpc_url = url.trim().to_string();
        }
        if let Some(value) = get(ENV_CONNECT_TIMEOUT) {
            settings.connect_timeout = parse_secs(ENV_CONNECT_TIMEOUT, &value)?;
        }
        if let Some(value) = get(ENV_DOWNLOAD_TIMEOUT) {
            settings.download_timeout = parse_secs(ENV_DOWNLOAD_TIMEOUT, &value)?;
        }
        if let Some(prefix) = get(ENV_TRUTHSET_URL_PREFIX) {
            settings.truthset_url_prefix = prefix.trim().to_string();
        }
        if let Some(value) = get(ENV_TRUTHSET_FILES) {
            let files: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if files.is_empty() {
                return Err(invalid(ENV_TRUTHSET_FILES, &value));
            }
            settings.truthset_files = files;
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            settings.data_dir = PathBuf::from(dir.trim());
        }
        if let Some(value) = get(ENV_PROMOTE_ATTEMPTS) {
            settings.promote_attempts = match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid(ENV_PROMOTE_ATTEMPTS, &value)),
            };
        }
        Ok(settings)
    }

    /// Local paths of the truth-set files.
    #[must_use]
    pub fn truthset_paths(&self) -> Vec<PathBuf> {
        self.truthset_files.iter().map(|f| self.data_dir.join(f)).collect()
    }
}
