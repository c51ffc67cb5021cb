// CRCON HTTP API client: one logical operation per request, normalized errors.

pub mod health;
pub mod types;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::{Config, ServerConfig};
use crate::error::{BotError, BotResult};
use crate::metrics;
use types::{GameState, Player, ServerSettings, VipEntry};

/// 1-based index of a configured CRCON server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerTarget(u32);

impl ServerTarget {
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for ServerTarget {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server {}", self.0)
    }
}

// ── Operations ───────────────────────────────────────────────────────

/// Every CRCON endpoint the bot talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetPlayers,
    GetGameState,
    GetVipIds,
    AddVip,
    RemoveVip,
    Kick,
    TempBan,
    PermaBan,
    Punish,
    SwitchPlayerNow,
    SwitchPlayerOnDeath,
    MessagePlayer,
    SetMap,
    GetMapRotation,
    GetIdleAutokickTime,
    SetIdleAutokickTime,
    GetAutobalanceEnabled,
    SetAutobalanceEnabled,
    GetAutobalanceThreshold,
    SetAutobalanceThreshold,
    GetTeamSwitchCooldown,
    SetTeamSwitchCooldown,
}

impl Operation {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::GetPlayers => "get_players",
            Self::GetGameState => "get_gamestate",
            Self::GetVipIds => "get_vip_ids",
            Self::AddVip => "add_vip",
            Self::RemoveVip => "remove_vip",
            Self::Kick => "kick",
            Self::TempBan => "temp_ban",
            Self::PermaBan => "perma_ban",
            Self::Punish => "punish",
            Self::SwitchPlayerNow => "switch_player_now",
            Self::SwitchPlayerOnDeath => "switch_player_on_death",
            Self::MessagePlayer => "message_player",
            Self::SetMap => "set_map",
            Self::GetMapRotation => "get_map_rotation",
            Self::GetIdleAutokickTime => "get_idle_autokick_time",
            Self::SetIdleAutokickTime => "set_idle_autokick_time",
            Self::GetAutobalanceEnabled => "get_autobalance_enabled",
            Self::SetAutobalanceEnabled => "set_autobalance_enabled",
            Self::GetAutobalanceThreshold => "get_autobalance_threshold",
            Self::SetAutobalanceThreshold => "set_autobalance_threshold",
            Self::GetTeamSwitchCooldown => "get_team_switch_cooldown",
            Self::SetTeamSwitchCooldown => "set_team_switch_cooldown",
        }
    }

    /// Actions mutate server state and are sent as POST with a JSON body.
    pub fn is_action(self) -> bool {
        !matches!(
            self,
            Self::GetPlayers
                | Self::GetGameState
                | Self::GetVipIds
                | Self::GetMapRotation
                | Self::GetIdleAutokickTime
                | Self::GetAutobalanceEnabled
                | Self::GetAutobalanceThreshold
                | Self::GetTeamSwitchCooldown
        )
    }

    pub fn method(self) -> Method {
        if self.is_action() {
            Method::POST
        } else {
            Method::GET
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Outcome of a single diagnostic round trip.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub target: ServerTarget,
    pub latency: Duration,
    pub result: Result<GameState, String>,
}

/// Authenticated client for every configured CRCON server. Cheap to clone.
#[derive(Clone)]
pub struct CrconClient {
    http: reqwest::Client,
    servers: Arc<Vec<ServerConfig>>,
    token: Arc<str>,
    operator: Arc<str>,
}

impl CrconClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .user_agent(concat!("crcon-bot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            servers: Arc::new(config.servers.clone()),
            token: Arc::from(config.api_token.as_str()),
            operator: Arc::from(config.operator_name.as_str()),
        })
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn server_name(&self, target: ServerTarget) -> String {
        self.servers
            .iter()
            .find(|s| s.target == target)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("服务器{}", target.get()))
    }

    /// Issue one request and unwrap the `result` field of the envelope.
    pub async fn call(
        &self,
        target: ServerTarget,
        op: Operation,
        payload: Option<Value>,
    ) -> BotResult<Value> {
        let endpoint = op.endpoint();
        let Some(server) = self.servers.iter().find(|s| s.target == target) else {
            return Err(BotError::ApiError {
                operation: endpoint,
                server: target,
                status: None,
                message: "server not configured".to_string(),
            });
        };
        let url = format!("{}/{}", server.base_url, endpoint);

        let mut request = self
            .http
            .request(op.method(), &url)
            .bearer_auth(&*self.token);
        if op.is_action() {
            request = request.json(&payload.unwrap_or_else(|| json!({})));
        }

        let started = Instant::now();
        let response = request.send().await;
        metrics::CRCON_REQUEST_DURATION_SECONDS
            .with_label_values(&[endpoint])
            .observe(started.elapsed().as_secs_f64());

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(server = target.get(), endpoint, error = %e, "CRCON unreachable");
                metrics::CRCON_REQUESTS_TOTAL
                    .with_label_values(&[endpoint, "unreachable"])
                    .inc();
                return Err(BotError::ApiUnreachable(target));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(server = target.get(), endpoint, error = %e, "CRCON body read failed");
                metrics::CRCON_REQUESTS_TOTAL
                    .with_label_values(&[endpoint, "unreachable"])
                    .inc();
                return Err(BotError::ApiUnreachable(target));
            }
        };
        metrics::CRCON_REQUESTS_TOTAL
            .with_label_values(&[endpoint, status.as_str()])
            .inc();

        let api_error = |status: Option<u16>, message: String| {
            tracing::warn!(server = target.get(), endpoint, ?status, %message, "CRCON call failed");
            BotError::ApiError {
                operation: endpoint,
                server: target,
                status,
                message,
            }
        };

        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        if !status.is_success() {
            let message = parsed
                .as_ref()
                .and_then(envelope_error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("HTTP error").to_string());
            return Err(api_error(Some(status.as_u16()), message));
        }
        let Some(envelope) = parsed else {
            return Err(api_error(Some(status.as_u16()), "invalid JSON response".to_string()));
        };
        if envelope.get("failed").and_then(Value::as_bool) == Some(true) {
            let message = envelope_error(&envelope).unwrap_or_else(|| "request failed".to_string());
            return Err(api_error(Some(status.as_u16()), message));
        }

        let result = envelope.get("result").cloned().unwrap_or(Value::Null);
        if op.is_action() && result == Value::Bool(false) {
            return Err(api_error(Some(status.as_u16()), "rejected".to_string()));
        }
        Ok(result)
    }

    async fn fetch<T: DeserializeOwned>(&self, target: ServerTarget, op: Operation) -> BotResult<T> {
        let value = self.call(target, op, None).await?;
        serde_json::from_value(value).map_err(|e| BotError::ApiError {
            operation: op.endpoint(),
            server: target,
            status: None,
            message: format!("unexpected response shape: {e}"),
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn players(&self, target: ServerTarget) -> BotResult<Vec<Player>> {
        let value = self.call(target, Operation::GetPlayers, None).await?;
        // Null means nobody is online.
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value).map_err(|e| BotError::ApiError {
            operation: Operation::GetPlayers.endpoint(),
            server: target,
            status: None,
            message: format!("unexpected response shape: {e}"),
        })
    }

    /// Players in roster order. Selector indices refer to this numbering.
    pub async fn roster(&self, target: ServerTarget) -> BotResult<Vec<Player>> {
        Ok(types::roster_order(self.players(target).await?))
    }

    pub async fn gamestate(&self, target: ServerTarget) -> BotResult<GameState> {
        self.fetch(target, Operation::GetGameState).await
    }

    pub async fn vip_ids(&self, target: ServerTarget) -> BotResult<Vec<VipEntry>> {
        self.fetch(target, Operation::GetVipIds).await
    }

    /// Layer ids in rotation order. Accepts plain ids or layer objects.
    pub async fn map_rotation(&self, target: ServerTarget) -> BotResult<Vec<String>> {
        let value = self.call(target, Operation::GetMapRotation, None).await?;
        let items = match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(BotError::ApiError {
                    operation: Operation::GetMapRotation.endpoint(),
                    server: target,
                    status: None,
                    message: format!("unexpected response shape: {other}"),
                })
            }
        };
        Ok(items.iter().filter_map(types::map_id).collect())
    }

    /// All four tunable settings, fetched concurrently.
    pub async fn server_settings(&self, target: ServerTarget) -> BotResult<ServerSettings> {
        let (idle, enabled, threshold, cooldown) = tokio::try_join!(
            self.fetch::<i64>(target, Operation::GetIdleAutokickTime),
            self.fetch::<bool>(target, Operation::GetAutobalanceEnabled),
            self.fetch::<i64>(target, Operation::GetAutobalanceThreshold),
            self.fetch::<i64>(target, Operation::GetTeamSwitchCooldown),
        )?;
        Ok(ServerSettings {
            idle_autokick_minutes: idle,
            autobalance_enabled: enabled,
            autobalance_threshold: threshold,
            team_switch_cooldown_minutes: cooldown,
        })
    }

    /// One timed `get_gamestate` round trip.
    pub async fn diagnose(&self, target: ServerTarget) -> Diagnosis {
        let started = Instant::now();
        let result = self.gamestate(target).await;
        Diagnosis {
            target,
            latency: started.elapsed(),
            result: result.map_err(|e| match e {
                BotError::ApiUnreachable(_) => "无法连接".to_string(),
                BotError::ApiError { status: Some(code), message, .. } => {
                    format!("HTTP {code}: {message}")
                }
                other => other.to_string(),
            }),
        }
    }

    // ── Actions ──────────────────────────────────────────────────────

    async fn act(&self, target: ServerTarget, op: Operation, payload: Value) -> BotResult<()> {
        self.call(target, op, Some(payload)).await.map(|_| ())
    }

    pub async fn kick(&self, target: ServerTarget, player_id: &str, reason: &str) -> BotResult<()> {
        let payload = json!({ "player_id": player_id, "reason": reason, "by": &*self.operator });
        self.act(target, Operation::Kick, payload).await
    }

    pub async fn punish(&self, target: ServerTarget, player_id: &str, reason: &str) -> BotResult<()> {
        let payload = json!({ "player_id": player_id, "reason": reason, "by": &*self.operator });
        self.act(target, Operation::Punish, payload).await
    }

    pub async fn temp_ban(
        &self,
        target: ServerTarget,
        player_id: &str,
        duration_hours: u32,
        reason: &str,
    ) -> BotResult<()> {
        let payload = json!({
            "player_id": player_id,
            "duration_hours": duration_hours,
            "reason": reason,
            "by": &*self.operator,
        });
        self.act(target, Operation::TempBan, payload).await
    }

    pub async fn perma_ban(&self, target: ServerTarget, player_id: &str, reason: &str) -> BotResult<()> {
        let payload = json!({ "player_id": player_id, "reason": reason, "by": &*self.operator });
        self.act(target, Operation::PermaBan, payload).await
    }

    pub async fn switch_now(&self, target: ServerTarget, player_id: &str) -> BotResult<()> {
        self.act(target, Operation::SwitchPlayerNow, json!({ "player_id": player_id }))
            .await
    }

    pub async fn switch_on_death(&self, target: ServerTarget, player_id: &str) -> BotResult<()> {
        let payload = json!({ "player_id": player_id, "by": &*self.operator });
        self.act(target, Operation::SwitchPlayerOnDeath, payload).await
    }

    pub async fn message_player(
        &self,
        target: ServerTarget,
        player_id: &str,
        message: &str,
    ) -> BotResult<()> {
        let payload = json!({ "player_id": player_id, "message": message, "by": &*self.operator });
        self.act(target, Operation::MessagePlayer, payload).await
    }

    /// `expiration` of `None` makes the VIP permanent.
    pub async fn add_vip(
        &self,
        target: ServerTarget,
        player_id: &str,
        description: &str,
        expiration: Option<chrono::DateTime<chrono::Utc>>,
    ) -> BotResult<()> {
        let payload = json!({
            "player_id": player_id,
            "description": description,
            "expiration": expiration.map(|t| t.to_rfc3339()),
        });
        self.act(target, Operation::AddVip, payload).await
    }

    pub async fn remove_vip(&self, target: ServerTarget, player_id: &str) -> BotResult<()> {
        self.act(target, Operation::RemoveVip, json!({ "player_id": player_id }))
            .await
    }

    pub async fn set_map(&self, target: ServerTarget, map_name: &str) -> BotResult<()> {
        self.act(target, Operation::SetMap, json!({ "map_name": map_name }))
            .await
    }

    pub async fn set_idle_autokick_time(&self, target: ServerTarget, minutes: i64) -> BotResult<()> {
        self.act(target, Operation::SetIdleAutokickTime, json!({ "minutes": minutes }))
            .await
    }

    pub async fn set_autobalance_enabled(&self, target: ServerTarget, value: bool) -> BotResult<()> {
        self.act(target, Operation::SetAutobalanceEnabled, json!({ "value": value }))
            .await
    }

    pub async fn set_autobalance_threshold(&self, target: ServerTarget, max_diff: i64) -> BotResult<()> {
        self.act(target, Operation::SetAutobalanceThreshold, json!({ "max_diff": max_diff }))
            .await
    }

    pub async fn set_team_switch_cooldown(&self, target: ServerTarget, minutes: i64) -> BotResult<()> {
        self.act(target, Operation::SetTeamSwitchCooldown, json!({ "minutes": minutes }))
            .await
    }
}

/// Pull a human-readable message out of a CRCON error envelope.
fn envelope_error(envelope: &Value) -> Option<String> {
    let message = envelope
        .get("error")
        .or_else(|| envelope.get("detail"))
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })?;
    Some(message.chars().take(200).collect())
}
