// Application configuration, loaded from environment variables and CLI flags.

use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::crcon::ServerTarget;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("no CRCON server configured (set CRCON_API_BASE_URL_1)")]
    NoServers,
}

/// One configured CRCON instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub target: ServerTarget,
    pub name: String,
    /// Base URL without a trailing slash, e.g. `https://rcon.example.com/api`.
    pub base_url: String,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the OneBot webhook to.
    pub port: u16,
    /// Identities with the OWNER tier.
    pub owners: BTreeSet<String>,
    /// CRCON servers, numbered from 1 without gaps.
    pub servers: Vec<ServerConfig>,
    /// Bearer token shared by all CRCON servers.
    pub api_token: String,
    /// Command prefixes; an empty entry makes the prefix optional.
    pub command_prefixes: Vec<String>,
    /// Token the OneBot implementation must present, if any.
    pub onebot_access_token: Option<String>,
    /// Groups the bot answers in. Empty means every group.
    pub allowed_groups: BTreeSet<i64>,
    /// Value sent as `by` on moderation calls.
    pub operator_name: String,
    pub api_timeout: Duration,
    pub health_check_interval: Duration,
    /// Maximum in-flight per-index calls for one batch command.
    pub batch_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `CRCON_API_TOKEN` - bearer token for CRCON (required)
    /// - `CRCON_API_BASE_URL_1`, `_2`, ... - server base URLs (at least one)
    /// - `SERVER_NAME_1`, `_2`, ... - display names (default: `服务器<n>`)
    /// - `SUPERUSERS` - owner QQ numbers, JSON array or comma list
    /// - `COMMAND_START` - command prefixes, JSON array or comma list (default: `/`)
    /// - `ONEBOT_ACCESS_TOKEN` - required bearer token on the webhook
    /// - `ALLOWED_GROUPS` - group numbers the bot answers in
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:data/crcon-bot.db?mode=rwc`)
    /// - `PORT` - webhook port (default: 8080)
    /// - `CRCON_OPERATOR_NAME` - `by` field for moderation calls (default: `QQ机器人`)
    /// - `API_TIMEOUT`, `HEALTH_CHECK_INTERVAL` - seconds (default: 30, 300)
    /// - `BATCH_CONCURRENCY` - per-index fan-out limit (default: 4)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a configuration from explicit sources.
    pub fn from_sources<F>(args: &[String], env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url =
            var("DATABASE_URL").unwrap_or_else(|| "sqlite:data/crcon-bot.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = match Self::parse_cli_value(args, "--port").or_else(|| var("PORT")) {
            Some(raw) => raw.parse().map_err(|_| invalid("PORT", &raw, "not a port number"))?,
            None => 8080,
        };

        let api_token = var("CRCON_API_TOKEN").ok_or(ConfigError::Missing("CRCON_API_TOKEN"))?;

        let mut servers = Vec::new();
        for n in 1u32.. {
            let key = format!("CRCON_API_BASE_URL_{n}");
            let Some(raw) = var(&key) else { break };
            let base_url = Self::normalize_base_url(&key, &raw)?;
            let name = var(&format!("SERVER_NAME_{n}")).unwrap_or_else(|| format!("服务器{n}"));
            servers.push(ServerConfig {
                target: ServerTarget::new(n),
                name,
                base_url,
            });
        }
        if servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        let owners = var("SUPERUSERS")
            .map(|raw| parse_list("SUPERUSERS", &raw, false))
            .transpose()?
            .unwrap_or_default()
            .into_iter()
            .collect();

        let command_prefixes = match env("COMMAND_START") {
            Some(raw) if !raw.trim().is_empty() => parse_list("COMMAND_START", &raw, true)?,
            _ => vec!["/".to_string()],
        };

        let allowed_groups = var("ALLOWED_GROUPS")
            .map(|raw| parse_list("ALLOWED_GROUPS", &raw, false))
            .transpose()?
            .unwrap_or_default()
            .into_iter()
            .map(|g| {
                g.parse::<i64>()
                    .map_err(|_| invalid("ALLOWED_GROUPS", &g, "not a group number"))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let operator_name = var("CRCON_OPERATOR_NAME").unwrap_or_else(|| "QQ机器人".to_string());

        let api_timeout = Duration::from_secs(parse_number(&var, "API_TIMEOUT", 30)?);
        let health_check_interval =
            Duration::from_secs(parse_number(&var, "HEALTH_CHECK_INTERVAL", 300)?);
        let batch_concurrency = parse_number(&var, "BATCH_CONCURRENCY", 4)? as usize;

        Ok(Config {
            database_url,
            port,
            owners,
            servers,
            api_token,
            command_prefixes,
            onebot_access_token: var("ONEBOT_ACCESS_TOKEN"),
            allowed_groups,
            operator_name,
            api_timeout,
            health_check_interval,
            batch_concurrency,
        })
    }

    pub fn server(&self, target: ServerTarget) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.target == target)
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }

    fn normalize_base_url(key: &str, raw: &str) -> Result<String, ConfigError> {
        let url = Url::parse(raw).map_err(|e| invalid(key, raw, &e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(key, raw, "scheme must be http or https"));
        }
        Ok(raw.trim_end_matches('/').to_string())
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        reason: format!("{value:?}: {reason}"),
    }
}

/// Accepts a JSON array (`["a", 1]`) or a comma separated list.
fn parse_list(name: &str, raw: &str, keep_empty: bool) -> Result<Vec<String>, ConfigError> {
    let raw = raw.trim();
    let items: Vec<String> = if raw.starts_with('[') {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| invalid(name, raw, &e.to_string()))?;
        values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => Ok(s.trim().to_string()),
                serde_json::Value::Number(n) => Ok(n.to_string()),
                other => Err(invalid(name, &other.to_string(), "expected string or number")),
            })
            .collect::<Result<_, _>>()?
    } else {
        raw.split([',', '，']).map(|s| s.trim().to_string()).collect()
    };
    let mut out = Vec::new();
    for item in items {
        if (keep_empty || !item.is_empty()) && !out.contains(&item) {
            out.push(item);
        }
    }
    Ok(out)
}

fn parse_number<F>(var: &F, name: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) => Err(invalid(name, &raw, "must be positive")),
            Ok(n) => Ok(n),
            Err(_) => Err(invalid(name, &raw, "not a number")),
        },
    }
}
