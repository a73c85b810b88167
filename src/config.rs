//! Configuration module for the uptime report.
//!
//! Loads the YAML configuration file, applies environment overrides, and
//! validates the result before any query is issued.

use chrono_tz::Tz;
use serde::{de, Deserialize, Deserializer};
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("server name not present, check the configuration file")]
    MissingServer,
    #[error("no endpoints present, check the configuration file")]
    NoEndpoints,
    #[error("endpoint {endpoint:?} has an empty success or failed query")]
    BlankQuery { endpoint: String },
    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),
    #[error("mail delivery configured without {0}")]
    IncompleteMail(&'static str),
}

const DEFAULT_SMTP_PORT: u16 = 587;

/// A named endpoint with its success and failure queries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Endpoint {
    pub name: String,
    #[serde(default, rename = "success")]
    pub success_query: String,
    #[serde(default, rename = "failed")]
    pub failure_query: String,
}

impl Endpoint {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.success_query.trim().is_empty() || self.failure_query.trim().is_empty() {
            return Err(ConfigError::BlankQuery {
                endpoint: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Optional `smtp` section. Each field falls back to the matching top-level
/// key (`smtphost`, `smtpport`, `smtpuser`, `smtppwd`, `emailfrom`,
/// `emailto`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from: String,
    /// Comma-separated recipients
    #[serde(default)]
    pub to: String,
}

/// Resolved mail delivery settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MailSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(i64),
    Text(String),
}

/// Ports are accepted as numbers or numeric strings.
fn deserialize_port<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u16>, D::Error> {
    let raw = match Option::<RawPort>::deserialize(d)? {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let port = match &raw {
        RawPort::Number(n) => u16::try_from(*n).ok(),
        RawPort::Text(t) if t.trim().is_empty() => return Ok(None),
        RawPort::Text(t) => t.trim().parse::<u16>().ok(),
    };
    match port {
        Some(p) if p > 0 => Ok(Some(p)),
        _ => Err(de::Error::custom(match raw {
            RawPort::Number(n) => format!("invalid SMTP port {}", n),
            RawPort::Text(t) => format!("invalid SMTP port {:?}", t),
        })),
    }
}

/// Section value if set, else the top-level one.
fn pick(primary: &str, fallback: &str) -> String {
    let v = if primary.trim().is_empty() { fallback } else { primary };
    v.trim().to_string()
}

/// Report configuration loaded from the YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Base address of the metrics server
    #[serde(default)]
    pub server: String,
    /// IANA timezone used for the report date (default: UTC)
    #[serde(default)]
    pub timezone: String,
    /// Per-request timeout in seconds (default: 60)
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// Include raw success/failure counts in the report
    #[serde(default, rename = "showcount")]
    pub show_count: bool,
    /// Report title prefix
    #[serde(default = "default_subject", alias = "emailsubject")]
    pub subject: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default, rename = "smtphost")]
    pub smtp_host: String,
    #[serde(default, rename = "smtpport", deserialize_with = "deserialize_port")]
    pub smtp_port: Option<u16>,
    #[serde(default, rename = "smtpuser")]
    pub smtp_user: String,
    #[serde(default, rename = "smtppwd")]
    pub smtp_password: String,
    #[serde(default, rename = "emailfrom")]
    pub email_from: String,
    #[serde(default, rename = "emailto")]
    pub email_to: String,
}

fn default_timeout() -> f64 {
    60.0
}

fn default_subject() -> String {
    "Uptime".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            timezone: String::new(),
            timeout: default_timeout(),
            show_count: false,
            subject: default_subject(),
            endpoints: Vec::new(),
            smtp: None,
            smtp_host: String::new(),
            smtp_port: None,
            smtp_user: String::new(),
            smtp_password: String::new(),
            email_from: String::new(),
            email_to: String::new(),
        }
    }
}

impl ReportConfig {
    /// Load configuration from a YAML file.
    ///
    /// Environment variables applied on top of the file:
    /// - `PROMUPTIME_SERVER`: metrics server address
    /// - `PROMUPTIME_TIMEZONE`: report timezone
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut cfg = Self::from_yaml(&contents)?;
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    fn apply_env(&mut self) {
        if let Ok(server) = env::var("PROMUPTIME_SERVER") {
            self.server = server;
        }

        if let Ok(tz) = env::var("PROMUPTIME_TIMEZONE") {
            self.timezone = tz;
        }
    }

    /// Check everything a report run needs before the first query.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::MissingServer);
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        self.timeout_duration()?;
        self.tz()?;
        self.mail()?;
        Ok(())
    }

    /// Resolve mail delivery settings. `None` when no SMTP host is set and
    /// there is no `smtp` section, in which case the report only goes to
    /// stdout or the output file.
    pub fn mail(&self) -> Result<Option<MailSettings>, ConfigError> {
        let section = self.smtp.clone().unwrap_or_default();
        let host = pick(&section.host, &self.smtp_host);
        if host.is_empty() {
            if self.smtp.is_some() {
                return Err(ConfigError::IncompleteMail("an SMTP host"));
            }
            return Ok(None);
        }

        let settings = MailSettings {
            host,
            port: section.port.or(self.smtp_port).unwrap_or(DEFAULT_SMTP_PORT),
            user: pick(&section.user, &self.smtp_user),
            // Passwords are taken verbatim.
            password: if section.password.is_empty() {
                self.smtp_password.clone()
            } else {
                section.password
            },
            from: pick(&section.from, &self.email_from),
            to: pick(&section.to, &self.email_to),
        };

        if settings.from.is_empty() {
            return Err(ConfigError::IncompleteMail("a sender address"));
        }
        if settings.to.is_empty() {
            return Err(ConfigError::IncompleteMail("a recipient address"));
        }
        Ok(Some(settings))
    }

    pub fn timeout_duration(&self) -> Result<Duration, ConfigError> {
        timeout_from_secs(self.timeout)
    }

    /// Resolve the configured timezone. Empty means UTC.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        let name = self.timezone.trim();
        if name.is_empty() {
            return Ok(Tz::UTC);
        }
        name.parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
    }
}

/// Convert a timeout in seconds, rejecting zero, negative, non-finite and
/// out-of-range values.
pub fn timeout_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidTimeout(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidTimeout(secs))
}
