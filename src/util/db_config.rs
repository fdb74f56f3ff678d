//! Database connection parameters read from a local, uncommitted env file.
//!
//! Three layouts are accepted and normalised into one lowercase field map
//! before validation:
//!   * plain `key=value` lines (`export ` prefix, quotes and ` #` comments allowed)
//!   * a JSON object spanning the whole file
//!   * a JSON object following a `DB_CONFIG=` marker inside a larger file
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_MARKER: &str = "DB_CONFIG=";

/// Literal passwords shipped in setup templates; seeing one means the file
/// was never filled in.
pub const PLACEHOLDER_PASSWORDS: &[&str] = &["[YOUR-PASSWORD]", "[mypassword]"];

const REQUIRED_FIELDS: [&str; 5] = ["host", "dbname", "user", "password", "port"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read config file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {reason}")]
    Malformed { reason: String },
    #[error("missing required database config fields: {}", missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },
    #[error("database password is still the template placeholder")]
    Unconfigured,
}

impl ConfigError {
    /// Operator-facing hint printed next to the error.
    pub fn remediation(&self) -> &'static str {
        match self {
            ConfigError::NotFound { .. } | ConfigError::Unreadable { .. } => {
                "Create the file (or pass --env-file) with host, dbname, user, password and port."
            }
            ConfigError::Malformed { .. } => {
                "Use key=value lines, a JSON object, or DB_CONFIG={...} with valid JSON and a numeric port."
            }
            ConfigError::Incomplete { .. } => {
                "Fill in every required field: host, dbname, user, password, port."
            }
            ConfigError::Unconfigured => {
                "Replace the placeholder password (e.g. [YOUR-PASSWORD]) with your actual database password."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    KeyValue,
    Json,
    Marked,
}

impl ConfigFormat {
    pub fn detect(contents: &str) -> Self {
        if contents.trim_start().starts_with('{') {
            ConfigFormat::Json
        } else if contents.contains(CONFIG_MARKER) {
            ConfigFormat::Marked
        } else {
            ConfigFormat::KeyValue
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("port", &self.port)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let fields = match ConfigFormat::detect(contents) {
            ConfigFormat::Json => json_fields(contents)?,
            ConfigFormat::Marked => marked_fields(contents)?,
            ConfigFormat::KeyValue => key_value_fields(contents)?,
        };
        Self::from_fields(fields)
    }

    fn from_fields(mut fields: HashMap<String, String>) -> Result<Self, ConfigError> {
        if !fields.contains_key("dbname") {
            if let Some(db) = fields.remove("database") {
                fields.insert("dbname".into(), db);
            }
        }

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|k| fields.get(*k).map_or(true, |v| v.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Incomplete { missing });
        }

        let mut take = |k: &str| fields.remove(k).unwrap_or_default().trim().to_string();
        let host = take("host");
        let database = take("dbname");
        let user = take("user");
        let password = take("password");
        if is_placeholder_password(&password) {
            return Err(ConfigError::Unconfigured);
        }

        let port_raw = take("port");
        let port = port_raw.parse::<u16>().map_err(|_| ConfigError::Malformed {
            reason: format!("port `{port_raw}` is not a valid TCP port"),
        })?;

        Ok(Self {
            host,
            database,
            user,
            password,
            port,
        })
    }

    /// Postgres URL with user and password masked; safe to log.
    pub fn redacted_dsn(&self) -> String {
        let host = normalize_host(&self.host);
        let built = url::Url::parse("postgresql://localhost").ok().and_then(|mut u| {
            u.set_username("***").ok()?;
            u.set_password(Some("***")).ok()?;
            u.set_host(Some(&host)).ok()?;
            u.set_port(Some(self.port)).ok()?;
            u.set_path(&format!("/{}", self.database));
            Some(u.to_string())
        });
        built.unwrap_or_else(|| format!("postgresql://***:***@{}:{}/{}", host, self.port, self.database))
    }
}

pub fn is_placeholder_password(password: &str) -> bool {
    let p = password.trim();
    PLACEHOLDER_PASSWORDS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(p))
}

fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '[' || c == ']');
    if trimmed.contains(':') {
        format!("[{trimmed}]")
    } else {
        trimmed.to_string()
    }
}

fn key_value_fields(contents: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut out = HashMap::new();
    for raw in contents.lines() {
        let mut line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("export ") {
            line = rest.trim();
        }
        let Some(eq) = line.find('=') else {
            continue;
        };
        let key = line[..eq].trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        // Later lines override earlier ones, so an appended password replaces the template's.
        let keep_hash = key == "password";
        out.insert(key, unquote(line[eq + 1..].trim(), keep_hash));
    }
    if out.is_empty() {
        return Err(ConfigError::Malformed {
            reason: "no key=value entries found".into(),
        });
    }
    Ok(out)
}

fn unquote(val: &str, keep_hash: bool) -> String {
    let quoted = val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')));
    if quoted {
        return val[1..val.len() - 1].to_string();
    }
    if keep_hash {
        return val.to_string();
    }
    // Unquoted values may carry an inline comment introduced by whitespace + '#'.
    match val.find(" #").or_else(|| val.find("\t#")) {
        Some(pos) => val[..pos].trim_end().to_string(),
        None => val.to_string(),
    }
}

fn json_fields(contents: &str) -> Result<HashMap<String, String>, ConfigError> {
    let value: Value = serde_json::from_str(contents.trim()).map_err(|e| ConfigError::Malformed {
        reason: format!("invalid JSON: {e}"),
    })?;
    object_fields(value)
}

fn marked_fields(contents: &str) -> Result<HashMap<String, String>, ConfigError> {
    let Some(pos) = contents.find(CONFIG_MARKER) else {
        return Err(ConfigError::Malformed {
            reason: format!("{CONFIG_MARKER} marker not found"),
        });
    };
    let rest = contents[pos + CONFIG_MARKER.len()..].trim_start();
    if !rest.starts_with('{') {
        return Err(ConfigError::Malformed {
            reason: format!("{CONFIG_MARKER} is not followed by a JSON object"),
        });
    }
    // Only the first JSON value matters; anything after it is ordinary file text.
    let first = serde_json::Deserializer::from_str(rest)
        .into_iter::<Value>()
        .next();
    match first {
        Some(Ok(value)) => object_fields(value),
        Some(Err(e)) => Err(ConfigError::Malformed {
            reason: format!("invalid JSON in {CONFIG_MARKER}: {e}"),
        }),
        None => Err(ConfigError::Malformed {
            reason: format!("empty {CONFIG_MARKER}"),
        }),
    }
}

fn object_fields(value: Value) -> Result<HashMap<String, String>, ConfigError> {
    let Value::Object(map) = value else {
        return Err(ConfigError::Malformed {
            reason: "expected a JSON object".into(),
        });
    };
    let mut out = HashMap::with_capacity(map.len());
    for (key, val) in map {
        let key = key.trim().to_ascii_lowercase();
        let text = match val {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(ConfigError::Malformed {
                    reason: format!("field `{key}` must be a string or number"),
                })
            }
        };
        out.insert(key, text);
    }
    Ok(out)
}
