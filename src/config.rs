//! Runtime configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `METRISK_BACKEND` | `local` |
//! | `METRISK_LOCAL_STORE_PATH` | unset (memory only) |
//! | `METRISK_DB_PATH` | `metrisk.db` |
//! | `METRISK_SHEETS_URL` | unset |
//! | `METRISK_SHEETS_BULK` | `true` |
//! | `METRISK_HTTP_TIMEOUT_SECS` | `30` |
//! | `METRISK_USER` | `demo@healthcare.com` |
//! | `METRISK_OPENAI_API_KEY_FILE` / `METRISK_OPENAI_API_KEY` | unset |
//! | `METRISK_OPENAI_MODEL` | `gpt-3.5-turbo` |
//! | `METRISK_OPENAI_BASE_URL` | `https://api.openai.com` |
//! | `METRISK_RECOMMENDATION_FALLBACK` | `rules` |

use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::ports::BackendKind;

const BACKEND_ENV: &str = "METRISK_BACKEND";
const LOCAL_STORE_PATH_ENV: &str = "METRISK_LOCAL_STORE_PATH";
const DB_PATH_ENV: &str = "METRISK_DB_PATH";
const SHEETS_URL_ENV: &str = "METRISK_SHEETS_URL";
const SHEETS_BULK_ENV: &str = "METRISK_SHEETS_BULK";
const HTTP_TIMEOUT_ENV: &str = "METRISK_HTTP_TIMEOUT_SECS";
const USER_ENV: &str = "METRISK_USER";
const OPENAI_KEY_FILE_ENV: &str = "METRISK_OPENAI_API_KEY_FILE";
const OPENAI_KEY_ENV: &str = "METRISK_OPENAI_API_KEY";
const OPENAI_MODEL_ENV: &str = "METRISK_OPENAI_MODEL";
const OPENAI_BASE_URL_ENV: &str = "METRISK_OPENAI_BASE_URL";
const FALLBACK_ENV: &str = "METRISK_RECOMMENDATION_FALLBACK";

pub const DEFAULT_DB_PATH: &str = "metrisk.db";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER: &str = "demo@healthcare.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Errors building the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("METRISK_BACKEND=spreadsheet requires METRISK_SHEETS_URL")]
    MissingSheetsUrl,

    #[error("Cannot read secret file {path}: {source}")]
    SecretFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// What to store when the advisor fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecommendationFallback {
    /// Deterministic threshold-based advice
    #[default]
    RuleBased,
    /// The fixed "unavailable" message
    Placeholder,
}

impl std::str::FromStr for RecommendationFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rules" | "rule-based" | "rule_based" => Ok(Self::RuleBased),
            "placeholder" | "unavailable" => Ok(Self::Placeholder),
            other => Err(format!("unknown fallback '{other}' (expected rules or placeholder)")),
        }
    }
}

/// Spreadsheet endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetConfig {
    pub url: String,
    pub bulk_supported: bool,
}

/// Remote advisor settings.
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: Zeroizing<String>,
    pub model: String,
    pub base_url: String,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Primary record store
    pub backend: BackendKind,
    /// JSON file behind the local store; `None` keeps it in memory
    pub local_store_path: Option<PathBuf>,
    pub db_path: PathBuf,
    pub spreadsheet: Option<SpreadsheetConfig>,
    pub http_timeout_secs: u64,
    /// `createdBy` for new records
    pub user: String,
    pub openai: Option<OpenAiConfig>,
    pub recommendation_fallback: RecommendationFallback,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            local_store_path: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            spreadsheet: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user: DEFAULT_USER.to_string(),
            openai: None,
            recommendation_fallback: RecommendationFallback::RuleBased,
        }
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected 1/true/yes or 0/false/no".to_string(),
        }),
    }
}

fn read_secret_file(path: &str) -> Result<Zeroizing<String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::SecretFile {
        path: path.to_string(),
        source,
    })?;
    Ok(Zeroizing::new(content.trim_end_matches(['\n', '\r']).to_string()))
}

impl AppConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError` on unparseable values or an incomplete backend selection.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    /// Returns `ConfigError` on unparseable values or an incomplete backend selection.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let backend = match get(BACKEND_ENV) {
            Some(v) => v.parse::<BackendKind>().map_err(|reason| ConfigError::Invalid {
                var: BACKEND_ENV,
                value: v,
                reason,
            })?,
            None => defaults.backend,
        };

        let bulk_supported = match get(SHEETS_BULK_ENV) {
            Some(v) => parse_bool(SHEETS_BULK_ENV, &v)?,
            None => true,
        };
        let spreadsheet = get(SHEETS_URL_ENV).map(|url| SpreadsheetConfig {
            url: url.trim().to_string(),
            bulk_supported,
        });
        if backend == BackendKind::Spreadsheet && spreadsheet.is_none() {
            return Err(ConfigError::MissingSheetsUrl);
        }

        let http_timeout_secs = match get(HTTP_TIMEOUT_ENV) {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|&s| s > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    var: HTTP_TIMEOUT_ENV,
                    value: v.clone(),
                    reason: "expected a positive number of seconds".to_string(),
                })?,
            None => defaults.http_timeout_secs,
        };

        let api_key = match (get(OPENAI_KEY_FILE_ENV), get(OPENAI_KEY_ENV)) {
            (Some(path), _) => Some(read_secret_file(path.trim())?),
            (None, Some(key)) => Some(Zeroizing::new(key.trim().to_string())),
            (None, None) => None,
        };
        let openai = api_key.filter(|k| !k.is_empty()).map(|api_key| OpenAiConfig {
            api_key,
            model: get(OPENAI_MODEL_ENV).unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: get(OPENAI_BASE_URL_ENV)
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        });

        let recommendation_fallback = match get(FALLBACK_ENV) {
            Some(v) => v.parse().map_err(|reason| ConfigError::Invalid {
                var: FALLBACK_ENV,
                value: v,
                reason,
            })?,
            None => defaults.recommendation_fallback,
        };

        Ok(Self {
            backend,
            local_store_path: get(LOCAL_STORE_PATH_ENV).map(PathBuf::from),
            db_path: get(DB_PATH_ENV).map_or(defaults.db_path, PathBuf::from),
            spreadsheet,
            http_timeout_secs,
            user: get(USER_ENV).unwrap_or(defaults.user),
            openai,
            recommendation_fallback,
        })
    }
}
