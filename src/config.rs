//! Service configuration, read from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::digest::DEFAULT_SUBJECT_PREFIX;
use crate::error::ConfigError;
use crate::mail::{SenderAccount, SmtpSettings};
use crate::pipeline::{AggregateOptions, FollowUpPolicy, RuleVariant, RunOptions};
use crate::report::NormalizeOptions;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Where uploads are staged while they are parsed.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Sheet to read; the first sheet when unset.
    pub sheet: Option<String>,
    /// Defaults for every run; requests may override the aggregation and
    /// follow-up switches.
    pub run: RunOptions,
    pub subject_prefix: String,
    /// Idle sessions are dropped after this long.
    pub session_ttl: Duration,
    pub smtp: SmtpSettings,
    /// Daily rolling log files go here when set.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            upload_dir: PathBuf::from("./uploads"),
            max_upload_bytes: 20 * 1024 * 1024,
            sheet: None,
            run: RunOptions::default(),
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
            session_ttl: Duration::from_secs(3600), // 1 hour
            smtp: SmtpSettings::default(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let max_upload_mb: usize = parse_or(
            "REPORT_DIGEST_MAX_UPLOAD_MB",
            get("REPORT_DIGEST_MAX_UPLOAD_MB"),
            20,
        )?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| invalid("REPORT_DIGEST_MAX_UPLOAD_MB", format!("{max_upload_mb} MB is too large")))?;
        let ttl_secs: u64 = parse_or(
            "REPORT_DIGEST_SESSION_TTL_SECS",
            get("REPORT_DIGEST_SESSION_TTL_SECS"),
            defaults.session_ttl.as_secs(),
        )?;

        let run = RunOptions {
            aggregate: AggregateOptions {
                variant: parse_or(
                    "REPORT_DIGEST_VARIANT",
                    get("REPORT_DIGEST_VARIANT"),
                    RuleVariant::default(),
                )?,
                include_secondary_recipients: parse_bool(
                    "REPORT_DIGEST_SECONDARY_RECIPIENTS",
                    get("REPORT_DIGEST_SECONDARY_RECIPIENTS"),
                )?,
                cc_stewards: parse_bool(
                    "REPORT_DIGEST_CC_STEWARDS",
                    get("REPORT_DIGEST_CC_STEWARDS"),
                )?,
            },
            follow_up: FollowUpPolicy {
                enabled: parse_bool("REPORT_DIGEST_FOLLOW_UP", get("REPORT_DIGEST_FOLLOW_UP"))?,
                min_age_months: parse_or(
                    "REPORT_DIGEST_FOLLOW_UP_MONTHS",
                    get("REPORT_DIGEST_FOLLOW_UP_MONTHS"),
                    1,
                )?,
            },
            normalize: NormalizeOptions {
                strip_area_prefix: parse_bool(
                    "REPORT_DIGEST_STRIP_AREA_PREFIX",
                    get("REPORT_DIGEST_STRIP_AREA_PREFIX"),
                )?,
            },
        };

        let accounts = match get("SMTP_ACCOUNTS") {
            Some(raw) => parse_accounts(&raw, |key| get(key))?,
            None => Vec::new(),
        };

        Ok(Self {
            port: parse_or("REPORT_DIGEST_PORT", get("REPORT_DIGEST_PORT"), defaults.port)?,
            upload_dir: get("REPORT_DIGEST_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes,
            sheet: get("REPORT_DIGEST_SHEET"),
            run,
            subject_prefix: get("REPORT_DIGEST_SUBJECT_PREFIX").unwrap_or(defaults.subject_prefix),
            session_ttl: Duration::from_secs(ttl_secs),
            smtp: SmtpSettings {
                host: get("SMTP_HOST").unwrap_or(defaults.smtp.host),
                port: parse_or("SMTP_PORT", get("SMTP_PORT"), defaults.smtp.port)?,
                accounts,
            },
            log_dir: get("REPORT_DIGEST_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(key, format!("{raw:?}: {e}"))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, format!("{raw:?} is not a boolean"))),
    }
}

/// Environment key holding the password of account `id`.
pub fn password_key(id: &str) -> String {
    let suffix: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("SMTP_PASSWORD_{suffix}")
}

/// Parse `id=address=label` entries, comma separated. The label defaults
/// to the address.
fn parse_accounts<F>(raw: &str, get: F) -> Result<Vec<SenderAccount>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut accounts: Vec<SenderAccount> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.splitn(3, '=').map(str::trim);
        let id = parts.next().unwrap_or_default();
        let address = parts.next().unwrap_or_default();
        let label = parts.next().filter(|l| !l.is_empty()).unwrap_or(address);

        if id.is_empty() || !address.contains('@') {
            return Err(invalid(
                "SMTP_ACCOUNTS",
                format!("{entry:?} is not an id=address=label entry"),
            ));
        }
        if accounts.iter().any(|a| a.id == id) {
            return Err(invalid("SMTP_ACCOUNTS", format!("duplicate account id {id:?}")));
        }

        let key = password_key(id);
        let password = get(key.as_str()).ok_or(ConfigError::MissingEnvVar(key))?;
        accounts.push(SenderAccount {
            id: id.to_string(),
            address: address.to_string(),
            label: label.to_string(),
            password: SecretString::from(password),
        });
    }
    Ok(accounts)
}
