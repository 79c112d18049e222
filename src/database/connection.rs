// Connection descriptor resolution
//
// Builds a validated descriptor from either structured fields or a raw
// connection string. Any parse failure aborts with a single user-facing error
// before the preflight checker runs and before any filesystem or database
// mutation.

use serde::{Deserialize, Serialize};

use crate::error::InstallError;
use crate::models::requests::DbConnectionInfo;

const DEFAULT_PORT: u16 = 5432;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub trusted_auth: bool,
}

impl ConnectionDescriptor {
    /// Render the descriptor as a Postgres URL, targeting `database`.
    pub fn connection_string(&self) -> String {
        self.connection_string_for(&self.database)
    }

    /// Render the descriptor as a Postgres URL against another database on the
    /// same server (used for the maintenance connection that issues
    /// CREATE/DROP DATABASE).
    pub fn connection_string_for(&self, database: &str) -> String {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (Some(user), None) => format!("{}@", user),
            _ => String::new(),
        };
        format!(
            "postgres://{}{}:{}/{}",
            credentials, self.host, self.port, database
        )
    }
}

/// Resolve the caller-supplied connection input into a descriptor.
///
/// Raw mode wins when a raw string is present; structured mode assembles the
/// descriptor from discrete fields, dropping credentials under trusted auth
/// even when they were supplied.
pub fn resolve_descriptor(info: &DbConnectionInfo) -> Result<ConnectionDescriptor, InstallError> {
    match info.raw_connection_string.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_raw(raw.trim()),
        _ => from_fields(info),
    }
}

fn from_fields(info: &DbConnectionInfo) -> Result<ConnectionDescriptor, InstallError> {
    let mut missing: Vec<&str> = Vec::new();
    if info.server.trim().is_empty() {
        missing.push("server");
    }
    if info.database.trim().is_empty() {
        missing.push("database");
    }
    if !info.use_trusted_auth {
        if info.username.trim().is_empty() {
            missing.push("username");
        }
        if info.password.is_empty() {
            missing.push("password");
        }
    }
    if !missing.is_empty() {
        return Err(InstallError::ConnectionFieldsIncomplete(missing.join(", ")));
    }

    let (username, password) = if info.use_trusted_auth {
        (None, None)
    } else {
        (
            Some(info.username.trim().to_string()),
            Some(info.password.clone()),
        )
    };

    Ok(ConnectionDescriptor {
        host: info.server.trim().to_string(),
        port: info.port.unwrap_or(DEFAULT_PORT),
        database: info.database.trim().to_string(),
        username,
        password,
        trusted_auth: info.use_trusted_auth,
    })
}

fn parse_raw(raw: &str) -> Result<ConnectionDescriptor, InstallError> {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        parse_url(raw)
    } else if raw.contains('=') {
        parse_key_value(raw)
    } else {
        Err(InstallError::ConnectionStringFormat)
    }
}

fn parse_url(raw: &str) -> Result<ConnectionDescriptor, InstallError> {
    let parsed = url::Url::parse(raw).map_err(|_| InstallError::ConnectionStringFormat)?;

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(InstallError::ConnectionStringFormat)?
        .to_string();
    let database = parsed
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|db| !db.is_empty())
        .ok_or(InstallError::ConnectionStringFormat)?
        .to_string();

    let username = Some(parsed.username())
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    let password = parsed.password().map(str::to_string);

    Ok(ConnectionDescriptor {
        host,
        port: parsed.port().unwrap_or(DEFAULT_PORT),
        database,
        trusted_auth: username.is_none(),
        username,
        password,
    })
}

fn parse_key_value(raw: &str) -> Result<ConnectionDescriptor, InstallError> {
    let mut host = None;
    let mut port = None;
    let mut database = None;
    let mut username = None;
    let mut password = None;

    for segment in raw.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment
            .split_once('=')
            .ok_or(InstallError::ConnectionStringFormat)?;
        let value = value.trim().to_string();
        match key.trim().to_ascii_lowercase().replace(' ', "").as_str() {
            "host" | "server" => host = Some(value),
            "port" => {
                port = Some(
                    value
                        .parse::<u16>()
                        .map_err(|_| InstallError::ConnectionStringFormat)?,
                )
            }
            "database" | "initialcatalog" => database = Some(value),
            "username" | "userid" | "user" | "uid" => username = Some(value),
            "password" | "pwd" => password = Some(value),
            // Unknown keys are tolerated; the engine's own parser would too.
            _ => {}
        }
    }

    let host = host
        .filter(|h| !h.is_empty())
        .ok_or(InstallError::ConnectionStringFormat)?;
    let database = database
        .filter(|d| !d.is_empty())
        .ok_or(InstallError::ConnectionStringFormat)?;

    Ok(ConnectionDescriptor {
        host,
        port: port.unwrap_or(DEFAULT_PORT),
        database,
        trusted_auth: username.is_none(),
        username,
        password,
    })
}
